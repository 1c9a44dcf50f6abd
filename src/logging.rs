//! Logging setup
//!
//! stdout carries the Git protocol, so log output goes to the configured log
//! file, or to stderr when the file cannot be opened.

use std::fs::OpenOptions;
use std::sync::Mutex;

use tracing::{warn, Level};
use tracing_subscriber::EnvFilter;

use crate::config::Config;

/// Install the global subscriber for `gitlab-shell`.
///
/// `RUST_LOG` overrides `config.log_level`.
pub fn init(config: &Config) {
    let path = config.log_path();
    let file = OpenOptions::new().create(true).append(true).open(&path);

    match file {
        Ok(file) => {
            let filter = EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init();
        }
        Err(e) => {
            init_stderr(Level::WARN);
            warn!("Unable to open log file {}: {}", path.display(), e);
        }
    }
}

/// Install a stderr subscriber at `default_level` unless `RUST_LOG` says otherwise
pub fn init_stderr(default_level: Level) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level.as_str()));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
