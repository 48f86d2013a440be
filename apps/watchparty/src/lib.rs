pub mod cli;
pub mod config;
pub mod host;
pub mod metrics;
pub mod player;
pub mod protocol;
pub mod runtime;
pub mod session;
pub mod sync;
pub mod telemetry;
pub mod transport;
