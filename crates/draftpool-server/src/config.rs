// Configuration loading and parsing (config/draftpool.toml).

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const CONFIG_FILE: &str = "draftpool.toml";

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },

    #[error("failed to initialize config from defaults: {message}")]
    DefaultsCopyError { message: String },
}

// ---------------------------------------------------------------------------
// draftpool.toml structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub allocation: AllocationConfig,
    #[serde(default)]
    pub profile_sync: ProfileSyncConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    /// Interface to bind. Defaults to loopback.
    #[serde(default = "default_bind")]
    pub bind: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AllocationConfig {
    /// Operator id recorded on automatic assignments.
    pub system_operator_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProfileSyncConfig {
    pub interval_secs: u64,
    pub batch_size: usize,
}

impl Default for ProfileSyncConfig {
    fn default() -> Self {
        Self {
            interval_secs: 5,
            batch_size: 100,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "draftpool=info,draftpool_core=info,draftpool_server=info,warn".into(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1".into()
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load and validate `config/draftpool.toml` relative to `base_dir`.
///
/// Does not auto-copy defaults; prefer `load_config()` for that.
pub fn load_config_from(base_dir: &Path) -> Result<Config, ConfigError> {
    let path = base_dir.join("config").join(CONFIG_FILE);
    let text = read_file(&path)?;
    let config: Config = toml::from_str(&text).map_err(|e| ConfigError::ParseError {
        path: path.clone(),
        source: e,
    })?;

    validate(&config)?;

    Ok(config)
}

/// Copy `defaults/draftpool.toml` to `config/` unless the operator already
/// has one. Returns the written path when a copy was made.
pub fn ensure_config_file(base_dir: &Path) -> Result<Option<PathBuf>, ConfigError> {
    let target = base_dir.join("config").join(CONFIG_FILE);
    if target.exists() {
        return Ok(None);
    }

    let source = base_dir.join("defaults").join(CONFIG_FILE);
    if !source.is_file() {
        return Err(ConfigError::DefaultsCopyError {
            message: format!(
                "no config/{CONFIG_FILE} and no defaults/{CONFIG_FILE} in {}; \
                 run from the server crate root",
                base_dir.display()
            ),
        });
    }

    let copy_err = |e: std::io::Error| ConfigError::DefaultsCopyError {
        message: format!("failed to write {}: {e}", target.display()),
    };
    if let Some(dir) = target.parent() {
        std::fs::create_dir_all(dir).map_err(copy_err)?;
    }
    std::fs::copy(&source, &target).map_err(copy_err)?;
    Ok(Some(target))
}

/// Loads config relative to the current working directory, copying defaults
/// first.
pub fn load_config() -> Result<Config, ConfigError> {
    let cwd = std::env::current_dir().map_err(|_| ConfigError::FileNotFound {
        path: PathBuf::from("."),
    })?;
    ensure_config_file(&cwd)?;
    load_config_from(&cwd)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })
}

fn invalid(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError {
        field: field.into(),
        message: message.into(),
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.database.path.trim().is_empty() {
        return Err(invalid("database.path", "must not be empty"));
    }

    if config.server.port == 0 {
        return Err(invalid("server.port", "must be greater than 0"));
    }

    if config.allocation.system_operator_id.trim().is_empty() {
        return Err(invalid("allocation.system_operator_id", "must not be empty"));
    }

    let sync = &config.profile_sync;
    if sync.interval_secs == 0 {
        return Err(invalid("profile_sync.interval_secs", "must be > 0"));
    }
    if sync.batch_size == 0 {
        return Err(invalid("profile_sync.batch_size", "must be > 0"));
    }

    if let Err(e) = tracing_subscriber::EnvFilter::try_new(&config.logging.filter) {
        return Err(invalid("logging.filter", format!("invalid filter directive: {e}")));
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const VALID: &str = r#"
[database]
path = "draftpool.db"

[server]
port = 9100

[allocation]
system_operator_id = "system:auto-assign"

[profile_sync]
interval_secs = 10
batch_size = 50

[logging]
filter = "draftpool_core=debug,warn"
"#;

    /// Fresh temp dir with `config/draftpool.toml` holding `contents`.
    fn dir_with_config(name: &str, contents: &str) -> PathBuf {
        let tmp = std::env::temp_dir().join(name);
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(tmp.join("config")).unwrap();
        fs::write(tmp.join("config").join(CONFIG_FILE), contents).unwrap();
        tmp
    }

    fn assert_invalid_field(name: &str, contents: &str, field: &str) {
        let tmp = dir_with_config(name, contents);
        match load_config_from(&tmp) {
            Err(ConfigError::ValidationError { field: f, .. }) => assert_eq!(f, field),
            other => panic!("expected ValidationError for {field}, got {other:?}"),
        }
        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn loads_valid_config() {
        let tmp = dir_with_config("draftpool_config_valid", VALID);
        let config = load_config_from(&tmp).unwrap();
        assert_eq!(config.database.path, "draftpool.db");
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.server.bind, "127.0.0.1");
        assert_eq!(config.allocation.system_operator_id, "system:auto-assign");
        assert_eq!(config.profile_sync.interval_secs, 10);
        assert_eq!(config.profile_sync.batch_size, 50);
        assert_eq!(config.logging.filter, "draftpool_core=debug,warn");
        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn optional_sections_take_defaults() {
        let contents = r#"
[database]
path = "x.db"
[server]
port = 9100
[allocation]
system_operator_id = "system"
"#;
        let tmp = dir_with_config("draftpool_config_defaults", contents);
        let config = load_config_from(&tmp).unwrap();
        assert_eq!(config.profile_sync.interval_secs, 5);
        assert_eq!(config.profile_sync.batch_size, 100);
        assert!(config.logging.filter.contains("draftpool_core=info"));
        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn shipped_defaults_are_valid() {
        let root = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
        let text = fs::read_to_string(root.join("defaults").join(CONFIG_FILE)).unwrap();
        let tmp = dir_with_config("draftpool_config_shipped", &text);
        load_config_from(&tmp).expect("shipped defaults should load");
        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn rejects_zero_port() {
        assert_invalid_field(
            "draftpool_config_zero_port",
            &VALID.replace("port = 9100", "port = 0"),
            "server.port",
        );
    }

    #[test]
    fn rejects_blank_operator() {
        assert_invalid_field(
            "draftpool_config_blank_operator",
            &VALID.replace("\"system:auto-assign\"", "\"  \""),
            "allocation.system_operator_id",
        );
    }

    #[test]
    fn rejects_zero_sync_interval() {
        assert_invalid_field(
            "draftpool_config_zero_interval",
            &VALID.replace("interval_secs = 10", "interval_secs = 0"),
            "profile_sync.interval_secs",
        );
    }

    #[test]
    fn rejects_zero_batch_size() {
        assert_invalid_field(
            "draftpool_config_zero_batch",
            &VALID.replace("batch_size = 50", "batch_size = 0"),
            "profile_sync.batch_size",
        );
    }

    #[test]
    fn rejects_bad_log_filter() {
        assert_invalid_field(
            "draftpool_config_bad_filter",
            &VALID.replace("draftpool_core=debug,warn", "draftpool_core=loudest"),
            "logging.filter",
        );
    }

    #[test]
    fn file_not_found_when_missing() {
        let tmp = std::env::temp_dir().join("draftpool_config_missing");
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(&tmp).unwrap();
        assert!(matches!(
            load_config_from(&tmp),
            Err(ConfigError::FileNotFound { .. })
        ));
        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn parse_error_for_invalid_toml() {
        let tmp = dir_with_config("draftpool_config_invalid_toml", "[database\npath = ");
        assert!(matches!(
            load_config_from(&tmp),
            Err(ConfigError::ParseError { .. })
        ));
        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn ensure_config_file_copies_then_keeps_edits() {
        let tmp = std::env::temp_dir().join("draftpool_config_ensure");
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(tmp.join("defaults")).unwrap();
        fs::write(tmp.join("defaults").join(CONFIG_FILE), VALID).unwrap();

        let copied = ensure_config_file(&tmp).unwrap();
        assert_eq!(copied, Some(tmp.join("config").join(CONFIG_FILE)));
        load_config_from(&tmp).unwrap();

        fs::write(tmp.join("config").join(CONFIG_FILE), "# edited").unwrap();
        assert_eq!(ensure_config_file(&tmp).unwrap(), None);
        assert_eq!(
            fs::read_to_string(tmp.join("config").join(CONFIG_FILE)).unwrap(),
            "# edited"
        );
        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn existing_config_needs_no_defaults() {
        let tmp = dir_with_config("draftpool_config_no_defaults", VALID);
        assert_eq!(ensure_config_file(&tmp).unwrap(), None);
        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn ensure_config_file_errors_without_config_or_defaults() {
        let tmp = std::env::temp_dir().join("draftpool_config_both_missing");
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(&tmp).unwrap();
        assert!(matches!(
            ensure_config_file(&tmp),
            Err(ConfigError::DefaultsCopyError { .. })
        ));
        let _ = fs::remove_dir_all(&tmp);
    }
}
