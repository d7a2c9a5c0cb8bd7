//! Configuration loading and management.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ut_core::{Category, CategoryTable, EngineConfig, PrivacyFilter, PrivacyMode, ValidationError};

/// Default port of the HTTP API.
pub const DEFAULT_PORT: u16 = 52847;

const DEFAULT_BLACKLIST: &[&str] = &["password", "private", "bank", "пароль", "личное", "банк"];

/// Configuration that loaded but cannot be used.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An interval or threshold was zero.
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    /// The category table is invalid.
    #[error("invalid category table: {0}")]
    Categories(#[from] ValidationError),
}

/// HTTP API settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind: IpAddr,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: DEFAULT_PORT,
        }
    }
}

/// Application configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to the database file.
    pub database_path: PathBuf,
    /// Seconds without input before the user counts as idle.
    pub idle_threshold_secs: u64,
    /// Seconds between foreground window polls.
    pub poll_interval_secs: u64,
    /// Seconds between snapshot flushes.
    pub flush_interval_secs: u64,
    pub privacy_mode: PrivacyMode,
    /// Case-insensitive title substrings that hide the whole title.
    pub blacklist: Vec<String>,
    /// Ordered category table; the first match wins.
    pub categories: Vec<Category>,
    pub server: ServerConfig,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("database_path", &self.database_path)
            .field("idle_threshold_secs", &self.idle_threshold_secs)
            .field("poll_interval_secs", &self.poll_interval_secs)
            .field("flush_interval_secs", &self.flush_interval_secs)
            .field("privacy_mode", &self.privacy_mode)
            .field("blacklist", &self.blacklist.len())
            .field("categories", &self.categories.len())
            .field("server", &self.server)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs_data_path().unwrap_or_else(|| PathBuf::from("."));
        Self {
            database_path: data_dir.join("usage.db"),
            idle_threshold_secs: 180,
            poll_interval_secs: 1,
            flush_interval_secs: 30,
            privacy_mode: PrivacyMode::Full,
            blacklist: DEFAULT_BLACKLIST.iter().map(|s| (*s).to_string()).collect(),
            categories: CategoryTable::builtin().categories().to_vec(),
            server: ServerConfig::default(),
        }
    }
}

impl Config {
    /// Loads configuration, optionally from a specific file.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        // Load from default config location
        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        // Load from specified config file
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // Load from environment variables (UT_*, nested keys as UT_SERVER__PORT)
        figment = figment.merge(Env::prefixed("UT_").split("__"));

        figment.extract()
    }

    /// Rejects values that would make tracking meaningless.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("idle_threshold_secs", self.idle_threshold_secs),
            ("poll_interval_secs", self.poll_interval_secs),
            ("flush_interval_secs", self.flush_interval_secs),
        ] {
            if value == 0 {
                return Err(ConfigError::Zero { field });
            }
        }
        self.category_table()?;
        Ok(())
    }

    pub fn category_table(&self) -> Result<CategoryTable, ConfigError> {
        Ok(CategoryTable::new(self.categories.clone())?)
    }

    pub fn privacy_filter(&self) -> PrivacyFilter {
        PrivacyFilter::new(self.privacy_mode, &self.blacklist)
    }

    pub const fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            idle_threshold: Duration::from_secs(self.idle_threshold_secs),
        }
    }

    pub const fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub const fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs)
    }

    pub const fn server_addr(&self) -> SocketAddr {
        SocketAddr::new(self.server.bind, self.server.port)
    }

    /// Lock file that keeps a second tracker off the same database.
    pub fn lock_path(&self) -> PathBuf {
        self.database_path.with_file_name("ut.lock")
    }
}

/// Returns the platform-specific config directory for ut.
fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("ut"))
}

/// Returns the platform-specific data directory for ut.
///
/// On Linux: `~/.local/share/ut`
pub fn dirs_data_path() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("ut"))
}

#[cfg(test)]
mod tests {
    use super::*;

    use figment::Jail;

    /// Points the platform directories into the jail so a real user config
    /// never leaks into the test.
    fn isolate_home(jail: &mut Jail) {
        let home = jail.directory().display().to_string();
        jail.set_env("HOME", &home);
        jail.set_env("XDG_CONFIG_HOME", format!("{home}/.config"));
        jail.set_env("XDG_DATA_HOME", format!("{home}/.local/share"));
    }

    #[test]
    fn test_dirs_data_path_ends_with_ut() {
        let path = dirs_data_path().unwrap();
        assert_eq!(path.file_name().unwrap(), "ut");
    }

    #[test]
    fn test_default_config_values() {
        let config = Config::default();
        let data_dir = dirs_data_path().unwrap();
        assert_eq!(config.database_path, data_dir.join("usage.db"));
        assert_eq!(config.idle_threshold_secs, 180);
        assert_eq!(config.poll_interval_secs, 1);
        assert_eq!(config.flush_interval_secs, 30);
        assert_eq!(config.privacy_mode, PrivacyMode::Full);
        assert!(config.blacklist.iter().any(|entry| entry == "password"));
        assert_eq!(config.server.port, DEFAULT_PORT);
        assert_eq!(config.categories[0].id, "work");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_lock_path_sits_next_to_database() {
        let config = Config {
            database_path: PathBuf::from("/data/ut/usage.db"),
            ..Config::default()
        };
        assert_eq!(config.lock_path(), PathBuf::from("/data/ut/ut.lock"));
    }

    #[test]
    fn test_load_from_file_and_env() {
        Jail::expect_with(|jail| {
            isolate_home(jail);
            jail.create_file(
                "ut.toml",
                r#"
                idle_threshold_secs = 300
                privacy_mode = "masked"
                blacklist = ["secret"]

                [server]
                port = 9000

                [[categories]]
                id = "games"
                name = "Games"
                keywords = ["steam"]
                "#,
            )?;
            jail.set_env("UT_FLUSH_INTERVAL_SECS", "10");
            jail.set_env("UT_SERVER__BIND", "0.0.0.0");

            let config = Config::load_from(Some(Path::new("ut.toml")))?;
            assert_eq!(config.idle_threshold_secs, 300);
            assert_eq!(config.flush_interval_secs, 10);
            assert_eq!(config.poll_interval_secs, 1);
            assert_eq!(config.privacy_mode, PrivacyMode::Masked);
            assert_eq!(config.blacklist, vec!["secret".to_string()]);
            assert_eq!(config.server_addr().to_string(), "0.0.0.0:9000");
            assert_eq!(config.categories.len(), 1);
            assert_eq!(config.category_table().unwrap().categorize("Steam", "", ""), "games");
            Ok(())
        });
    }

    #[test]
    fn test_env_overrides_file() {
        Jail::expect_with(|jail| {
            isolate_home(jail);
            jail.create_file("ut.toml", "poll_interval_secs = 5")?;
            jail.set_env("UT_POLL_INTERVAL_SECS", "2");

            let config = Config::load_from(Some(Path::new("ut.toml")))?;
            assert_eq!(config.poll_interval(), Duration::from_secs(2));
            Ok(())
        });
    }

    #[test]
    fn test_unknown_privacy_mode_is_rejected() {
        Jail::expect_with(|jail| {
            isolate_home(jail);
            jail.set_env("UT_PRIVACY_MODE", "hidden");
            assert!(Config::load_from(None).is_err());
            Ok(())
        });
    }

    #[test]
    fn test_validate_rejects_zero_intervals() {
        let config = Config {
            poll_interval_secs: 0,
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Zero {
                field: "poll_interval_secs"
            })
        ));

        let config = Config {
            idle_threshold_secs: 0,
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Zero {
                field: "idle_threshold_secs"
            })
        ));
    }

    #[test]
    fn test_validate_rejects_bad_categories() {
        let duplicate = Category {
            id: "work".to_string(),
            name: "Work".to_string(),
            keywords: vec!["x".to_string()],
        };
        let config = Config {
            categories: vec![duplicate.clone(), duplicate],
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Categories(ValidationError::DuplicateCategory { .. }))
        ));
    }
}
