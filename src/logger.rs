use crate::config::LOGGING_ENABLED;
use once_cell::sync::OnceCell;
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::EnvFilter;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

static INSTALLED: OnceCell<bool> = OnceCell::new();

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub enabled: bool,
    /// Filter used when `RUST_LOG` is not set.
    pub default_filter: String,
    pub ansi: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: LOGGING_ENABLED,
            default_filter: "ssc_chat=debug,webrtc=warn".into(),
            ansi: true,
        }
    }
}

impl LogConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}

/// Installs the global subscriber. Only the first call has any effect; the
/// return value tells whether a subscriber is installed.
///
/// Output goes to stderr with local timestamps.
pub fn init(config: LogConfig) -> bool {
    *INSTALLED.get_or_init(|| {
        // логирование выключено конфигурацией
        if !config.enabled {
            return false;
        }
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(&config.default_filter));
        tracing_subscriber::fmt()
            .with_timer(ChronoLocal::new(TIMESTAMP_FORMAT.to_string()))
            .with_env_filter(filter)
            .with_ansi(config.ansi)
            .with_writer(std::io::stderr)
            .try_init()
            .is_ok()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        let first = init(LogConfig {
            ansi: false,
            ..LogConfig::default()
        });
        assert_eq!(init(LogConfig::disabled()), first);
    }
}
