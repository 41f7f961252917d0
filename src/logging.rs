use anyhow::{anyhow, Result};
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter, e.g. `debug` or `taxatsv=trace`
pub const LOG_ENV_VAR: &str = "TAXATSV_LOG";

/// Filter from `TAXATSV_LOG`, else `RUST_LOG`, else `default_level`.
pub fn env_filter(default_level: &str) -> EnvFilter {
    let filter = match std::env::var(LOG_ENV_VAR) {
        Ok(level) => EnvFilter::try_new(level).ok(),
        Err(_) => EnvFilter::try_from_default_env().ok(),
    };
    filter.unwrap_or_else(|| EnvFilter::new(default_level))
}

/// Install a stderr fmt subscriber. Fails if one is already installed.
pub fn init(default_level: &str) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(default_level))
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow!("failed to install tracing subscriber: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_an_error() {
        // Another test may have installed a subscriber first.
        let _ = init("warn");
        assert!(init("warn").is_err());
    }
}
