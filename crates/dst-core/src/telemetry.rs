//! Tracing subscriber setup

use crate::config::DstConfig;
use tracing_subscriber::EnvFilter;

/// Install a `fmt` subscriber filtered by `filter`
///
/// Falls back to `info` when the directive does not parse. Returns `false`
/// if a global subscriber was already installed.
pub fn init_tracing(filter: &str) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(filter))
        .with_target(true)
        .try_init()
        .is_ok()
}

/// Install a JSON `fmt` subscriber filtered by `filter`
pub fn init_json_tracing(filter: &str) -> bool {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(env_filter(filter))
        .try_init()
        .is_ok()
}

/// Install the subscriber described by a configuration
pub fn init_from_config(config: &DstConfig) -> bool {
    if config.json_logs {
        init_json_tracing(&config.log_filter)
    } else {
        init_tracing(&config.log_filter)
    }
}

fn env_filter(filter: &str) -> EnvFilter {
    EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_install_is_rejected_quietly() {
        let _ = init_tracing("debug");
        assert!(!init_tracing("info"));
        assert!(!init_from_config(&DstConfig::default()));
    }
}
