//! Configuration loading for lockbox.
//!
//! Configuration follows a precedence chain:
//! 1. Environment variables (highest priority)
//! 2. Project config (`.lockbox/config.toml`)
//! 3. User config (`~/.lockbox/config.toml`)
//! 4. Defaults (lowest priority)
//!
//! All configuration is optional. Unknown keys in a config file are rejected
//! so that a misspelled setting never silently falls back to its default.

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::core::validate_parameter;
use crate::error::{Result, StoreError};

/// Main configuration struct for lockbox.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Identifier limits and the default application name.
    pub session: SessionConfig,
    /// Where records and payload blobs live.
    pub storage: StorageConfig,
    /// Retry budget for metadata read-modify-write sequences.
    pub retry: RetryConfig,
}

/// Session identifier configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    /// Application name used when the caller does not pass one.
    pub application_name: String,
    /// Maximum session id length, in characters.
    pub max_id_length: usize,
    /// Maximum application name length, in characters.
    pub max_application_name_length: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            application_name: "default".to_string(),
            max_id_length: 80,
            max_application_name_length: 40,
        }
    }
}

/// Storage location configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    /// Data directory. Defaults to `<lockbox_home>/data`.
    pub root: Option<PathBuf>,
    /// Name of the metadata table.
    pub table_name: String,
    /// Name of the payload blob container.
    pub container_name: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: None,
            table_name: "sessions".to_string(),
            container_name: "sessionblobs".to_string(),
        }
    }
}

/// Bounds for container names.
pub const CONTAINER_NAME_LENGTH: (usize, usize) = (3, 63);

/// Bounds for table names.
pub const TABLE_NAME_LENGTH: (usize, usize) = (3, 63);

impl StorageConfig {
    /// Check a blob container name: lowercase letters, digits and single
    /// hyphens, starting and ending with a letter or digit.
    pub fn is_valid_container_name(name: &str) -> bool {
        let (min, max) = CONTAINER_NAME_LENGTH;
        if name.len() < min || name.len() > max {
            return false;
        }
        if !name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        {
            return false;
        }
        !name.starts_with('-') && !name.ends_with('-') && !name.contains("--")
    }

    /// Check a table name: ASCII alphanumerics, starting with a letter.
    pub fn is_valid_table_name(name: &str) -> bool {
        let (min, max) = TABLE_NAME_LENGTH;
        if name.len() < min || name.len() > max {
            return false;
        }
        let mut chars = name.chars();
        chars.next().is_some_and(|c| c.is_ascii_alphabetic())
            && chars.all(|c| c.is_ascii_alphanumeric())
    }

    /// The data directory, falling back to `<lockbox_home>/data`.
    pub fn resolve_root(&self) -> Result<PathBuf> {
        match &self.root {
            Some(root) => Ok(root.clone()),
            None => data_dir()
                .ok_or_else(|| StoreError::config("cannot determine the lockbox data directory")),
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RetryConfig {
    /// Total attempts per operation, including the first one.
    pub max_attempts: u32,
    /// Pause between attempts in milliseconds.
    pub delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay_ms: 1000,
        }
    }
}

impl Config {
    /// Load configuration with full precedence chain.
    ///
    /// Precedence (highest to lowest):
    /// 1. Environment variables
    /// 2. Project config (`.lockbox/config.toml` in cwd or an ancestor)
    /// 3. User config (`~/.lockbox/config.toml`)
    /// 4. Defaults
    pub fn load() -> Result<Self> {
        match env::current_dir() {
            Ok(cwd) => Self::load_from_cwd(&cwd),
            Err(_) => {
                let mut config = Config::default();
                if let Some(user_config) = Self::load_user_config()? {
                    config = config.merge(user_config);
                }
                config.apply_env_overrides();
                Ok(config)
            }
        }
    }

    /// Load configuration with a specific working directory.
    pub fn load_from_cwd(cwd: &Path) -> Result<Self> {
        let mut config = Config::default();

        if let Some(user_config) = Self::load_user_config()? {
            config = config.merge(user_config);
        }

        if let Some(project_config) = Self::load_project_config(cwd)? {
            config = config.merge(project_config);
        }

        config.apply_env_overrides();

        Ok(config)
    }

    /// Load user config from `~/.lockbox/config.toml`.
    fn load_user_config() -> Result<Option<Config>> {
        match lockbox_home() {
            Some(home) => Self::load_optional(&home.join("config.toml")),
            None => Ok(None),
        }
    }

    /// Load project config from `.lockbox/config.toml` under the project root.
    fn load_project_config(cwd: &Path) -> Result<Option<Config>> {
        Self::load_optional(&project_lockbox_dir(cwd).join("config.toml"))
    }

    /// Load a config file that may legitimately be absent.
    fn load_optional(path: &Path) -> Result<Option<Config>> {
        match Self::load_from_file(path) {
            Ok(config) => Ok(Some(config)),
            Err(StoreError::Storage { source, .. }) if source.kind() == io::ErrorKind::NotFound => {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Load config from a specific file path.
    pub fn load_from_file(path: &Path) -> Result<Config> {
        let content = fs::read_to_string(path).map_err(|e| StoreError::storage(path, e))?;
        toml::from_str(&content)
            .map_err(|e| StoreError::config(format!("{}: {}", path.display(), e)))
    }

    /// Apply environment variable overrides.
    fn apply_env_overrides(&mut self) {
        // LOCKBOX_APPLICATION_NAME
        if let Ok(val) = env::var("LOCKBOX_APPLICATION_NAME") {
            let trimmed = val.trim();
            if trimmed.is_empty() || trimmed.contains(',') {
                eprintln!(
                    "Warning: Invalid LOCKBOX_APPLICATION_NAME value '{}'. \
                    Must be non-empty and contain no commas. Using '{}'.",
                    val, self.session.application_name
                );
            } else {
                self.session.application_name = trimmed.to_string();
            }
        }

        // LOCKBOX_TABLE_NAME
        if let Ok(val) = env::var("LOCKBOX_TABLE_NAME") {
            if StorageConfig::is_valid_table_name(&val) {
                self.storage.table_name = val;
            } else {
                eprintln!(
                    "Warning: Invalid LOCKBOX_TABLE_NAME value '{}'. \
                    Expected 3-63 alphanumerics starting with a letter. Using '{}'.",
                    val, self.storage.table_name
                );
            }
        }

        // LOCKBOX_CONTAINER_NAME
        if let Ok(val) = env::var("LOCKBOX_CONTAINER_NAME") {
            if StorageConfig::is_valid_container_name(&val) {
                self.storage.container_name = val;
            } else {
                eprintln!(
                    "Warning: Invalid LOCKBOX_CONTAINER_NAME value '{}'. \
                    Expected 3-63 lowercase letters, digits or single hyphens. Using '{}'.",
                    val, self.storage.container_name
                );
            }
        }

        // LOCKBOX_DATA_DIR
        if let Ok(val) = env::var("LOCKBOX_DATA_DIR") {
            if val.is_empty() {
                eprintln!("Warning: LOCKBOX_DATA_DIR is empty. Ignoring it.");
            } else {
                self.storage.root = Some(PathBuf::from(val));
            }
        }

        // LOCKBOX_RETRY_ATTEMPTS
        if let Ok(val) = env::var("LOCKBOX_RETRY_ATTEMPTS") {
            match val.parse::<u32>() {
                Ok(n) if n >= 1 => self.retry.max_attempts = n,
                _ => eprintln!(
                    "Warning: Invalid LOCKBOX_RETRY_ATTEMPTS value '{}'. \
                    Expected a positive integer. Using '{}'.",
                    val, self.retry.max_attempts
                ),
            }
        }

        // LOCKBOX_RETRY_DELAY_MS
        if let Ok(val) = env::var("LOCKBOX_RETRY_DELAY_MS") {
            match val.parse::<u64>() {
                Ok(ms) => self.retry.delay_ms = ms,
                Err(_) => eprintln!(
                    "Warning: Invalid LOCKBOX_RETRY_DELAY_MS value '{}'. \
                    Expected a non-negative integer. Using '{}'.",
                    val, self.retry.delay_ms
                ),
            }
        }
    }

    /// Merge another config into this one.
    ///
    /// Values from `other` take precedence field by field, but only where
    /// they differ from the default. As a consequence a higher layer cannot
    /// reset a lower layer's customization back to the default value.
    fn merge(mut self, other: Config) -> Self {
        let default_session = SessionConfig::default();
        if other.session.application_name != default_session.application_name {
            self.session.application_name = other.session.application_name;
        }
        if other.session.max_id_length != default_session.max_id_length {
            self.session.max_id_length = other.session.max_id_length;
        }
        if other.session.max_application_name_length
            != default_session.max_application_name_length
        {
            self.session.max_application_name_length = other.session.max_application_name_length;
        }

        let default_storage = StorageConfig::default();
        if other.storage.root.is_some() {
            self.storage.root = other.storage.root;
        }
        if other.storage.table_name != default_storage.table_name {
            self.storage.table_name = other.storage.table_name;
        }
        if other.storage.container_name != default_storage.container_name {
            self.storage.container_name = other.storage.container_name;
        }

        let default_retry = RetryConfig::default();
        if other.retry.max_attempts != default_retry.max_attempts {
            self.retry.max_attempts = other.retry.max_attempts;
        }
        if other.retry.delay_ms != default_retry.delay_ms {
            self.retry.delay_ms = other.retry.delay_ms;
        }

        self
    }

    /// Check the merged configuration before it is used.
    pub fn validate(&self) -> Result<()> {
        if self.session.max_id_length == 0 {
            return Err(StoreError::config("session.max_id_length must be at least 1"));
        }
        if self.session.max_application_name_length == 0 {
            return Err(StoreError::config(
                "session.max_application_name_length must be at least 1",
            ));
        }
        validate_parameter(
            &self.session.application_name,
            "session.application_name",
            self.session.max_application_name_length,
            true,
        )
        .map_err(|e| StoreError::config(e.to_string()))?;

        if !StorageConfig::is_valid_table_name(&self.storage.table_name) {
            return Err(StoreError::config(format!(
                "invalid table name '{}'",
                self.storage.table_name
            )));
        }
        if !StorageConfig::is_valid_container_name(&self.storage.container_name) {
            return Err(StoreError::config(format!(
                "invalid container name '{}'",
                self.storage.container_name
            )));
        }
        // Both live side by side under the data directory
        if self
            .storage
            .table_name
            .eq_ignore_ascii_case(&self.storage.container_name)
        {
            return Err(StoreError::config(
                "storage.table_name and storage.container_name must differ",
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(StoreError::config("retry.max_attempts must be at least 1"));
        }
        Ok(())
    }
}

/// Get the lockbox home directory.
///
/// Returns `$LOCKBOX_HOME` if set and non-empty, otherwise `~/.lockbox`.
pub fn lockbox_home() -> Option<PathBuf> {
    if let Ok(home) = env::var("LOCKBOX_HOME") {
        if home.is_empty() {
            tracing::warn!("LOCKBOX_HOME is empty, using default");
        } else {
            let path = PathBuf::from(&home);
            if path.is_absolute() {
                return Some(path);
            }
            if let Ok(canonical) = path.canonicalize() {
                return Some(canonical);
            }
            tracing::warn!("LOCKBOX_HOME is relative and doesn't exist, using as-is");
            return Some(path);
        }
    }

    if let Some(home) = dirs::home_dir() {
        return Some(home.join(".lockbox"));
    }

    let fallback_path = fallback_lockbox_home();
    tracing::warn!(
        "HOME not set, using fallback location: {}",
        fallback_path.display()
    );
    Some(fallback_path)
}

/// Get fallback lockbox home path when HOME is unavailable.
#[cfg(unix)]
fn fallback_lockbox_home() -> PathBuf {
    use std::os::unix::fs::MetadataExt;
    let uid = std::fs::metadata("/").map(|m| m.uid()).unwrap_or(0);
    PathBuf::from(format!("/tmp/lockbox-{}", uid))
}

/// Get fallback lockbox home path when HOME is unavailable.
#[cfg(not(unix))]
fn fallback_lockbox_home() -> PathBuf {
    std::env::temp_dir().join("lockbox")
}

/// Default data directory.
///
/// Returns `<lockbox_home>/data/`.
pub fn data_dir() -> Option<PathBuf> {
    lockbox_home().map(|h| h.join("data"))
}

/// Find the project root for a given working directory.
///
/// The nearest ancestor (including `cwd` itself) that contains a `.lockbox/`
/// directory; `cwd` when there is none.
pub fn find_project_root(cwd: &Path) -> PathBuf {
    cwd.ancestors()
        .find(|ancestor| ancestor.join(".lockbox").is_dir())
        .unwrap_or(cwd)
        .to_path_buf()
}

/// Get the project lockbox directory for a given working directory.
pub fn project_lockbox_dir(cwd: &Path) -> PathBuf {
    find_project_root(cwd).join(".lockbox")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    const ENV_VARS: &[&str] = &[
        "LOCKBOX_APPLICATION_NAME",
        "LOCKBOX_TABLE_NAME",
        "LOCKBOX_CONTAINER_NAME",
        "LOCKBOX_DATA_DIR",
        "LOCKBOX_RETRY_ATTEMPTS",
        "LOCKBOX_RETRY_DELAY_MS",
    ];

    fn clear_env() {
        for var in ENV_VARS {
            env::remove_var(var);
        }
    }

    /// Point LOCKBOX_HOME at an empty directory so no real user config leaks in.
    fn isolated_home() -> TempDir {
        let home = TempDir::new().unwrap();
        env::set_var("LOCKBOX_HOME", home.path());
        home
    }

    fn write_project_config(dir: &Path, content: &str) {
        let lockbox_dir = dir.join(".lockbox");
        fs::create_dir_all(&lockbox_dir).unwrap();
        fs::write(lockbox_dir.join("config.toml"), content).unwrap();
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.session.application_name, "default");
        assert_eq!(config.session.max_id_length, 80);
        assert_eq!(config.session.max_application_name_length, 40);

        assert!(config.storage.root.is_none());
        assert_eq!(config.storage.table_name, "sessions");
        assert_eq!(config.storage.container_name, "sessionblobs");

        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.delay_ms, 1000);

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("config.toml");

        let toml_content = r#"
[storage]
table_name = "webSessions"
container_name = "web-sessions"

[retry]
max_attempts = 5
"#;
        fs::write(&config_path, toml_content).unwrap();

        let config = Config::load_from_file(&config_path).unwrap();

        assert_eq!(config.storage.table_name, "webSessions");
        assert_eq!(config.storage.container_name, "web-sessions");
        assert_eq!(config.retry.max_attempts, 5);

        // Other fields should be defaults
        assert_eq!(config.retry.delay_ms, 1000);
        assert_eq!(config.session.application_name, "default");
    }

    #[test]
    fn test_load_from_file_missing() {
        let result = Config::load_from_file(Path::new("/nonexistent/config.toml"));
        assert!(matches!(result, Err(StoreError::Storage { .. })));
    }

    #[test]
    fn test_load_from_file_invalid_toml() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("config.toml");
        fs::write(&config_path, "this is not valid toml [[[").unwrap();

        let result = Config::load_from_file(&config_path);
        assert!(matches!(result, Err(StoreError::Config { .. })));
    }

    #[test]
    fn test_unknown_keys_rejected() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("config.toml");
        fs::write(&config_path, "[storage]\ntable = \"typo\"\n").unwrap();

        let err = Config::load_from_file(&config_path).unwrap_err();
        assert!(matches!(err, StoreError::Config { .. }));
        assert!(err.to_string().contains("table"));
    }

    #[test]
    #[serial]
    fn test_project_config_precedence() {
        clear_env();
        let _home = isolated_home();
        let dir = TempDir::new().unwrap();
        write_project_config(dir.path(), "[retry]\nmax_attempts = 7\n");

        let config = Config::load_from_cwd(dir.path()).unwrap();

        assert_eq!(config.retry.max_attempts, 7);
        assert_eq!(config.retry.delay_ms, 1000);

        env::remove_var("LOCKBOX_HOME");
    }

    #[test]
    #[serial]
    fn test_project_config_found_in_ancestor() {
        clear_env();
        let _home = isolated_home();
        let dir = TempDir::new().unwrap();
        write_project_config(dir.path(), "[session]\napplication_name = \"shop\"\n");
        let nested = dir.path().join("src").join("web");
        fs::create_dir_all(&nested).unwrap();

        let config = Config::load_from_cwd(&nested).unwrap();
        assert_eq!(config.session.application_name, "shop");

        env::remove_var("LOCKBOX_HOME");
    }

    #[test]
    #[serial]
    fn test_user_config_below_project_config() {
        clear_env();
        let home = isolated_home();
        fs::write(
            home.path().join("config.toml"),
            "[retry]\nmax_attempts = 9\ndelay_ms = 50\n",
        )
        .unwrap();

        let dir = TempDir::new().unwrap();
        write_project_config(dir.path(), "[retry]\nmax_attempts = 4\n");

        let config = Config::load_from_cwd(dir.path()).unwrap();

        // Project wins where it customizes, user value survives elsewhere
        assert_eq!(config.retry.max_attempts, 4);
        assert_eq!(config.retry.delay_ms, 50);

        env::remove_var("LOCKBOX_HOME");
    }

    #[test]
    #[serial]
    fn test_env_var_precedence() {
        clear_env();
        let _home = isolated_home();
        let dir = TempDir::new().unwrap();
        write_project_config(dir.path(), "[retry]\nmax_attempts = 7\n");

        env::set_var("LOCKBOX_RETRY_ATTEMPTS", "10");

        let config = Config::load_from_cwd(dir.path()).unwrap();
        assert_eq!(config.retry.max_attempts, 10);

        env::remove_var("LOCKBOX_RETRY_ATTEMPTS");
        env::remove_var("LOCKBOX_HOME");
    }

    #[test]
    #[serial]
    fn test_env_var_overrides() {
        clear_env();
        let _home = isolated_home();
        env::set_var("LOCKBOX_APPLICATION_NAME", "  shop ");
        env::set_var("LOCKBOX_TABLE_NAME", "shopSessions");
        env::set_var("LOCKBOX_CONTAINER_NAME", "shop-blobs");
        env::set_var("LOCKBOX_DATA_DIR", "/var/lib/lockbox");
        env::set_var("LOCKBOX_RETRY_ATTEMPTS", "6");
        env::set_var("LOCKBOX_RETRY_DELAY_MS", "0");

        let dir = TempDir::new().unwrap();
        let config = Config::load_from_cwd(dir.path()).unwrap();

        assert_eq!(config.session.application_name, "shop");
        assert_eq!(config.storage.table_name, "shopSessions");
        assert_eq!(config.storage.container_name, "shop-blobs");
        assert_eq!(
            config.storage.root.as_deref(),
            Some(Path::new("/var/lib/lockbox"))
        );
        assert_eq!(config.retry.max_attempts, 6);
        assert_eq!(config.retry.delay_ms, 0);

        clear_env();
        env::remove_var("LOCKBOX_HOME");
    }

    #[test]
    #[serial]
    fn test_env_var_invalid_values_ignored() {
        clear_env();
        let _home = isolated_home();
        env::set_var("LOCKBOX_APPLICATION_NAME", "a,b");
        env::set_var("LOCKBOX_TABLE_NAME", "1bad");
        env::set_var("LOCKBOX_CONTAINER_NAME", "Bad_Name");
        env::set_var("LOCKBOX_RETRY_ATTEMPTS", "0");
        env::set_var("LOCKBOX_RETRY_DELAY_MS", "soon");

        let dir = TempDir::new().unwrap();
        let config = Config::load_from_cwd(dir.path()).unwrap();

        assert_eq!(config.session.application_name, "default");
        assert_eq!(config.storage.table_name, "sessions");
        assert_eq!(config.storage.container_name, "sessionblobs");
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.delay_ms, 1000);

        clear_env();
        env::remove_var("LOCKBOX_HOME");
    }

    #[test]
    #[serial]
    fn test_invalid_project_file_is_an_error() {
        clear_env();
        let _home = isolated_home();
        let dir = TempDir::new().unwrap();
        write_project_config(dir.path(), "[retry]\nattempts = 2\n");

        let result = Config::load_from_cwd(dir.path());
        assert!(matches!(result, Err(StoreError::Config { .. })));

        env::remove_var("LOCKBOX_HOME");
    }

    #[test]
    fn test_merge_field_by_field() {
        let mut base = Config::default();
        base.retry.delay_ms = 10;
        base.storage.table_name = "userTable".to_string();

        let mut overlay = Config::default();
        overlay.retry.max_attempts = 8;

        let merged = base.merge(overlay);
        assert_eq!(merged.retry.max_attempts, 8);
        assert_eq!(merged.retry.delay_ms, 10);
        assert_eq!(merged.storage.table_name, "userTable");
    }

    #[test]
    fn test_is_valid_container_name() {
        for name in ["sessions", "web-sessions", "abc", "a1-b2-c3"] {
            assert!(StorageConfig::is_valid_container_name(name), "{}", name);
        }
        let too_long = "a".repeat(64);
        for name in [
            "ab",
            too_long.as_str(),
            "Sessions",
            "web_sessions",
            "-sessions",
            "sessions-",
            "web--sessions",
        ] {
            assert!(!StorageConfig::is_valid_container_name(name), "{}", name);
        }
    }

    #[test]
    fn test_is_valid_table_name() {
        for name in ["sessions", "Sessions2", "abc"] {
            assert!(StorageConfig::is_valid_table_name(name), "{}", name);
        }
        for name in ["ab", "2sessions", "web-sessions", "web_sessions"] {
            assert!(!StorageConfig::is_valid_table_name(name), "{}", name);
        }
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.storage.container_name = "Bad".to_string();
        assert!(matches!(config.validate(), Err(StoreError::Config { .. })));

        let mut config = Config::default();
        config.session.application_name = "a,b".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.retry.max_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.storage.container_name = "sessions".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.session.max_id_length = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_resolve_root_prefers_explicit_root() {
        let storage = StorageConfig {
            root: Some(PathBuf::from("/srv/sessions")),
            ..Default::default()
        };
        assert_eq!(storage.resolve_root().unwrap(), PathBuf::from("/srv/sessions"));
    }

    #[test]
    #[serial]
    fn test_lockbox_home_with_env() {
        env::set_var("LOCKBOX_HOME", "/custom/lockbox");
        assert_eq!(lockbox_home(), Some(PathBuf::from("/custom/lockbox")));
        assert_eq!(data_dir(), Some(PathBuf::from("/custom/lockbox/data")));
        env::remove_var("LOCKBOX_HOME");
    }

    #[test]
    #[serial]
    fn test_lockbox_home_empty_env() {
        env::set_var("LOCKBOX_HOME", "");
        let home = lockbox_home().unwrap();
        assert!(home.ends_with(".lockbox") || home.to_string_lossy().contains("lockbox"));
        env::remove_var("LOCKBOX_HOME");
    }

    #[test]
    fn test_find_project_root_fallback() {
        let dir = TempDir::new().unwrap();
        assert_eq!(find_project_root(dir.path()), dir.path().to_path_buf());
        assert_eq!(
            project_lockbox_dir(dir.path()),
            dir.path().join(".lockbox")
        );
    }

    #[test]
    fn test_full_toml_roundtrip() {
        let mut config = Config::default();
        config.session.application_name = "shop".to_string();
        config.storage.root = Some(PathBuf::from("/data"));
        config.retry.delay_ms = 5;

        let text = toml::to_string(&config).unwrap();
        let back: Config = toml::from_str(&text).unwrap();
        assert_eq!(back, config);
    }
}
