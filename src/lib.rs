pub mod api;
pub mod auctions;
pub mod builder;
pub mod bus;
pub mod cache;
pub mod cli;
pub mod config;
pub mod domain;
pub mod evaluator;
pub mod finalizer;
pub mod lock;
pub mod metrics_init;
pub mod rate_limit;
pub mod resilience;
pub mod service;
pub mod store;
pub mod submission;
pub mod telemetry;

pub use builder::Builder;
pub use config::Config;
pub use service::{
    Service,
    ShutdownHandle,
};
