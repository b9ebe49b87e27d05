use std::io::Write;

use anyhow::Result;
use chrono::Local;
use env_logger::{Builder, Env};

use crate::config::LoggingConfig;

/// Installs the global logger at the configured level. `RUST_LOG`, when set,
/// takes precedence.
///
/// Fails if a logger is already installed.
pub fn init(config: &LoggingConfig) -> Result<()> {
    Builder::new()
        .filter_level(config.level_filter())
        .parse_env(Env::default())
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] {}: {}",
                Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .try_init()?;

    log::info!("Logging initialized at {}", config.level_filter());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_an_error() {
        let config = LoggingConfig::default();
        let _ = init(&config);
        assert!(init(&config).is_err());
    }
}
