//! Crate-specific metrics functionality (§10.4): registers metric
//! descriptions and lists the name constants used throughout the crate.
//! Follows `astria-bridge-withdrawer/src/metrics_init.rs`'s plain
//! `describe_*!` registration style — no bespoke metrics-registration
//! abstraction.

use metrics::{
    describe_counter,
    describe_gauge,
    describe_histogram,
    Unit,
};

/// Registers all metrics used by this crate. Call once at startup before
/// installing the Prometheus recorder.
pub fn describe() {
    describe_counter!(BIDS_SUBMITTED, Unit::Count, "Bids persisted as PENDING by the submission path");
    describe_counter!(BIDS_ACCEPTED, Unit::Count, "Bids transitioned to ACCEPTED by the evaluator");
    describe_counter!(BIDS_REJECTED, Unit::Count, "Bids transitioned to REJECTED by the evaluator");
    describe_counter!(
        BID_PLACED_FALLBACK_INVOKED,
        Unit::Count,
        "Times the local-fallback inline evaluation (§4.3 step 4) fired after an exhausted bid-placed publish"
    );
    describe_counter!(
        LOCK_ACQUIRE_FAILURES,
        Unit::Count,
        "Times the per-auction lock was already held, leaving a delivery unacknowledged"
    );
    describe_counter!(
        AUCTIONS_FINALIZED,
        Unit::Count,
        "Auctions transitioned from ACTIVE to FINISHED by the expiry finalizer"
    );
    describe_histogram!(
        FINALIZER_SWEEP_DURATION,
        Unit::Milliseconds,
        "Wall-clock duration of one expiry finalizer tick"
    );
    describe_gauge!(CIRCUIT_BREAKER_STATE, Unit::Count, "Current circuit breaker state per dependency (0=closed, 1=half_open, 2=open)");
    describe_counter!(RESILIENCE_RETRY_TOTAL, Unit::Count, "Retries attempted by the resilience envelope, per dependency");
    describe_counter!(RESILIENCE_CIRCUIT_OPEN_TOTAL, Unit::Count, "Calls short-circuited by an OPEN breaker, per dependency");
    describe_counter!(RATE_LIMIT_REJECTIONS, Unit::Count, "Requests rejected by the per-IP rate limiter");
}

pub const BIDS_SUBMITTED: &str = concat!(env!("CARGO_CRATE_NAME"), "_bids_submitted_total");
pub const BIDS_ACCEPTED: &str = concat!(env!("CARGO_CRATE_NAME"), "_bids_accepted_total");
pub const BIDS_REJECTED: &str = concat!(env!("CARGO_CRATE_NAME"), "_bids_rejected_total");
pub const BID_PLACED_FALLBACK_INVOKED: &str = concat!(env!("CARGO_CRATE_NAME"), "_bid_placed_fallback_invoked_total");
pub const LOCK_ACQUIRE_FAILURES: &str = concat!(env!("CARGO_CRATE_NAME"), "_lock_acquire_failures_total");
pub const AUCTIONS_FINALIZED: &str = concat!(env!("CARGO_CRATE_NAME"), "_auctions_finalized_total");
pub const FINALIZER_SWEEP_DURATION: &str = concat!(env!("CARGO_CRATE_NAME"), "_finalizer_sweep_duration_ms");
pub const CIRCUIT_BREAKER_STATE: &str = concat!(env!("CARGO_CRATE_NAME"), "_circuit_breaker_state");
pub const RESILIENCE_RETRY_TOTAL: &str = concat!(env!("CARGO_CRATE_NAME"), "_resilience_retry_total");
pub const RESILIENCE_CIRCUIT_OPEN_TOTAL: &str = concat!(env!("CARGO_CRATE_NAME"), "_resilience_circuit_open_total");
pub const RATE_LIMIT_REJECTIONS: &str = concat!(env!("CARGO_CRATE_NAME"), "_rate_limit_rejections_total");
