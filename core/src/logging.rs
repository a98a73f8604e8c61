//! Tracing subscriber setup driven by [`LoggingConfig`].

use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Install a stderr subscriber according to the config. `RUST_LOG` overrides
/// the configured level. Safe to call more than once; only the first
/// installation wins.
pub fn init(cfg: &LoggingConfig) {
    if !cfg.enabled || !cfg.console {
        return;
    }
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cfg.level.clone()));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
