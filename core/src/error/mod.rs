mod build;
mod config;
mod task;

pub use build::BuildError;
pub use config::ConfigError;
pub use task::{TaskError, TaskResult};
