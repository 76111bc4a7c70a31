//! Structured logging (§10.2), reimplemented directly on `tracing-subscriber`
//! since `astria-telemetry` (OTel exporter wiring) has no buildable source in
//! this workspace (see DESIGN.md). Mirrors the call shape
//! `telemetry::init(&cfg.log, std::io::stdout)` used throughout this
//! workspace's `main.rs` files.

use std::io::IsTerminal as _;

use tracing_subscriber::{
    fmt,
    EnvFilter,
};

/// Installs the global tracing subscriber. `directives` is an
/// `EnvFilter`-syntax string (e.g. `"info"`, `"auction_platform=debug,warn"`)
/// taken from `Config::log_level`. JSON output when stdout is not a tty
/// (container/CI runs), human-readable compact output otherwise.
pub fn init(directives: &str) -> Result<(), tracing_subscriber::filter::ParseError> {
    if std::io::stdout().is_terminal() {
        fmt()
            .with_env_filter(EnvFilter::try_new(directives)?)
            .with_target(true)
            .compact()
            .init();
    } else {
        fmt()
            .with_env_filter(EnvFilter::try_new(directives)?)
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .init();
    }
    Ok(())
}
