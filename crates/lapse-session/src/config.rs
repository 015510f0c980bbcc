//! Configuration for the session store.
//!
//! The store recognizes a single option, the session TTL. It can be set in
//! code through [`StoreConfig::with_ttl`] or read from a TOML file:
//!
//! ```toml
//! [session]
//! ttl_ms = 5000
//! ```

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

/// Default time-to-live for sessions.
pub const DEFAULT_TTL: Duration = Duration::from_secs(5);

/// Upper bound on how long past its deadline a session may still be
/// observable under normal scheduling load.
///
/// A session last written at `t` is removed somewhere in
/// `[t + ttl, t + ttl + EXPIRY_SLACK]`.
pub const EXPIRY_SLACK: Duration = Duration::from_secs(1);

/// Result type alias for config loading.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Errors that can occur while loading store configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read a config file.
    #[error("failed to read config file '{path}': {source}")]
    ReadFile {
        path: String,
        source: std::io::Error,
    },

    /// Failed to parse TOML.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value was present but unusable.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Configuration for the session store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Time a session lives after its creation or last update.
    pub ttl: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { ttl: DEFAULT_TTL }
    }
}

/// On-disk layout of the config file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    #[serde(default)]
    session: RawSessionSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSessionSection {
    ttl_ms: Option<u64>,
}

impl StoreConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the session TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Latest point, relative to the last write, at which a session may
    /// still be observed.
    pub fn max_lifetime(&self) -> Duration {
        self.ttl + EXPIRY_SLACK
    }

    /// Parse a configuration from TOML text.
    ///
    /// Absent keys keep their defaults. A zero TTL is rejected.
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let raw: RawConfig = toml::from_str(content)?;
        let mut config = Self::default();

        if let Some(ttl_ms) = raw.session.ttl_ms {
            if ttl_ms == 0 {
                return Err(ConfigError::Invalid(
                    "session.ttl_ms must be greater than zero".to_string(),
                ));
            }
            config.ttl = Duration::from_millis(ttl_ms);
        }

        Ok(config)
    }

    /// Load a configuration from a TOML file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_ttl() {
        let config = StoreConfig::default();
        assert_eq!(config.ttl, Duration::from_secs(5));
        assert_eq!(config.max_lifetime(), Duration::from_secs(6));
    }

    #[test]
    fn test_with_ttl() {
        let config = StoreConfig::new().with_ttl(Duration::from_millis(250));
        assert_eq!(config.ttl, Duration::from_millis(250));
    }

    #[test]
    fn test_parse_ttl() {
        let config = StoreConfig::from_toml_str("[session]\nttl_ms = 1500\n").unwrap();
        assert_eq!(config.ttl, Duration::from_millis(1500));
    }

    #[test]
    fn test_empty_file_keeps_defaults() {
        let config = StoreConfig::from_toml_str("").unwrap();
        assert_eq!(config, StoreConfig::default());

        let config = StoreConfig::from_toml_str("[session]\n").unwrap();
        assert_eq!(config, StoreConfig::default());
    }

    #[test]
    fn test_zero_ttl_rejected() {
        let err = StoreConfig::from_toml_str("[session]\nttl_ms = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_unknown_key_rejected() {
        let err = StoreConfig::from_toml_str("[session]\nttl = 5\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[session]\nttl_ms = 42").unwrap();

        let config = StoreConfig::load(file.path()).unwrap();
        assert_eq!(config.ttl, Duration::from_millis(42));
    }

    #[test]
    fn test_load_missing_file() {
        let err = StoreConfig::load(Path::new("/nonexistent/lapse.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::ReadFile { .. }));
    }
}
