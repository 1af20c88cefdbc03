pub mod client;
pub mod config;
pub mod reporter;
pub mod task;
pub mod telemetry;
