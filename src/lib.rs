pub mod config;
pub mod core;
pub mod engine;
pub mod jobs;
pub mod runner;
pub mod server;

pub use config::{get_config, init_config, RunnerConfig};
pub use jobs::Invoker;
