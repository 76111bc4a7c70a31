//! Process-level CLI overrides, mirroring `astria-conductor/src/cli.rs`'s
//! `Cli`: business configuration stays in the environment (§6.4,
//! [`crate::config::Config`]); only deployment-time overrides that
//! operators reach for on the command line live here.

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "auction-platform", about = "Online auction platform service")]
pub struct Cli {
    /// Overrides `AUCTION_PLATFORM_HTTP_ADDRESS`.
    #[arg(long = "http-address")]
    pub http_address: Option<String>,

    /// Overrides `AUCTION_PLATFORM_LOG_LEVEL`.
    #[arg(long = "log-level")]
    pub log_level: Option<String>,
}

impl Cli {
    /// Applies any set override onto a loaded [`crate::config::Config`].
    pub fn apply(&self, mut cfg: crate::config::Config) -> crate::config::Config {
        if let Some(http_address) = &self.http_address {
            cfg.http_address = http_address.clone();
        }
        if let Some(log_level) = &self.log_level {
            cfg.log_level = log_level.clone();
        }
        cfg
    }
}
