//! CloudWatch to Mackerel relay agent: configuration and the pass scheduler.

pub mod config;
pub mod scheduler;
