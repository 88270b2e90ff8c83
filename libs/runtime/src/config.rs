use anyhow::{bail, Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::home_dir::resolve_home_dir;

/// Subdirectory of the platform home used when `server.home_dir` is empty.
pub const DEFAULT_HOME_SUBDIR: &str = ".records";

/// Application configuration: typed global sections plus a per-module bag.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: Option<DatabaseConfig>,
    /// Logging sections; `None` means built-in defaults.
    pub logging: Option<LoggingConfig>,
    /// module_name → raw section, decoded on demand by [`AppConfig::module_config`].
    #[serde(default)]
    pub modules: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Normalized to an absolute path on load.
    pub home_dir: String,
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    /// Connection URL, e.g. "sqlite://database/records.db". Relative SQLite
    /// paths are resolved against `server.home_dir`.
    pub url: String,
    pub max_conns: Option<u32>,
    /// SQLite busy timeout in milliseconds.
    pub busy_timeout_ms: Option<u32>,
}

/// Logging sections keyed by target prefix; "default" is the catch-all.
pub type LoggingConfig = HashMap<String, Section>;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Section {
    pub console_level: String, // "info", "debug", "error", "off"
    #[serde(default)]
    pub file: String, // "logs/records.log"; empty disables the file sink
    #[serde(default)]
    pub file_level: String,
    #[serde(default)]
    pub max_backups: Option<usize>,
    #[serde(default)]
    pub max_size_mb: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            home_dir: String::new(),
            host: "127.0.0.1".to_string(),
            port: 8087,
        }
    }
}

pub fn default_logging_config() -> LoggingConfig {
    let mut logging = HashMap::new();
    logging.insert(
        "default".to_string(),
        Section {
            console_level: "info".to_string(),
            file: "logs/records.log".to_string(),
            file_level: "debug".to_string(),
            max_backups: Some(3),
            max_size_mb: Some(100),
        },
    );
    logging
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: Some(DatabaseConfig {
                url: "sqlite://database/records.db".to_string(),
                max_conns: Some(10),
                busy_timeout_ms: Some(5000),
            }),
            logging: Some(default_logging_config()),
            modules: HashMap::new(),
        }
    }
}

impl AppConfig {
    /// Layered load: defaults → YAML file → `APP__` environment variables.
    /// The file must exist. `server.home_dir` is normalized and created.
    pub fn load_layered<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        use figment::{
            providers::{Env, Format, Serialized, Yaml},
            Figment,
        };

        let path = config_path.as_ref();
        if !path.is_file() {
            bail!("config file not found: {}", path.display());
        }

        let figment = Figment::new()
            .merge(Serialized::defaults(AppConfig::default()))
            .merge(Yaml::file(path))
            // APP__SERVER__PORT=8087 maps to server.port
            .merge(Env::prefixed("APP__").split("__"));

        let mut config: AppConfig = figment
            .extract()
            .with_context(|| format!("invalid configuration in {}", path.display()))?;

        normalize_home_dir_inplace(&mut config.server)
            .context("Failed to resolve server.home_dir")?;
        Ok(config)
    }

    /// Load from `config_path` when given, otherwise use defaults.
    pub fn load_or_default<P: AsRef<Path>>(config_path: Option<P>) -> Result<Self> {
        match config_path {
            Some(path) => Self::load_layered(path),
            None => {
                let mut c = Self::default();
                normalize_home_dir_inplace(&mut c.server)
                    .context("Failed to resolve server.home_dir (defaults)")?;
                Ok(c)
            }
        }
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Failed to serialize config to YAML")
    }

    /// Decode one module's section; a missing section yields `T::default()`.
    pub fn module_config<T>(&self, name: &str) -> Result<T>
    where
        T: DeserializeOwned + Default,
    {
        match self.modules.get(name) {
            None | Some(serde_json::Value::Null) => Ok(T::default()),
            Some(raw) => serde_json::from_value(raw.clone())
                .with_context(|| format!("invalid configuration for module '{name}'")),
        }
    }

    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(port) = args.port {
            self.server.port = port;
        }

        let logging = self.logging.get_or_insert_with(default_logging_config);
        if let Some(default_section) = logging.get_mut("default") {
            match args.verbose {
                0 => {}
                1 => default_section.console_level = "debug".to_string(),
                _ => default_section.console_level = "trace".to_string(),
            }
        }
    }

    /// Absolute home directory (valid after load).
    pub fn home_dir(&self) -> PathBuf {
        PathBuf::from(&self.server.home_dir)
    }
}

/// Global CLI flags that influence configuration.
#[derive(Debug, Clone, Default)]
pub struct CliArgs {
    pub config: Option<String>,
    pub port: Option<u16>,
    pub print_config: bool,
    pub verbose: u8,
    pub mock: bool,
}

fn normalize_home_dir_inplace(server: &mut ServerConfig) -> Result<()> {
    let opt = if server.home_dir.trim().is_empty() {
        None
    } else {
        Some(server.home_dir.clone())
    };

    let resolved = resolve_home_dir(opt, DEFAULT_HOME_SUBDIR, true)
        .context("home_dir normalization failed")?;
    server.home_dir = resolved.to_string_lossy().to_string();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::fs;
    use tempfile::tempdir;

    #[derive(Debug, Default, Deserialize, PartialEq)]
    #[serde(deny_unknown_fields)]
    struct Sample {
        #[serde(default)]
        retention_days: u32,
    }

    fn write_config(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("config.yaml");
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn defaults_point_at_local_sqlite() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8087);
        assert_eq!(config.server.home_dir, "");
        let db = config.database.unwrap();
        assert_eq!(db.url, "sqlite://database/records.db");
        assert_eq!(config.logging.unwrap()["default"].file, "logs/records.log");
    }

    #[test]
    fn yaml_overrides_defaults_and_home_dir_is_normalized() {
        let tmp = tempdir().unwrap();
        let home = tmp.path().join("home");
        let path = write_config(
            tmp.path(),
            &format!(
                r#"
server:
  home_dir: "{}"
  host: "0.0.0.0"
  port: 9090
modules:
  student_records:
    retention_days: 7
"#,
                home.to_string_lossy().replace('\\', "/")
            ),
        );

        let config = AppConfig::load_layered(&path).unwrap();

        assert!(Path::new(&config.server.home_dir).is_absolute());
        assert!(home.is_dir());
        assert_eq!(config.server.port, 9090);
        let sample: Sample = config.module_config("student_records").unwrap();
        assert_eq!(sample.retention_days, 7);
    }

    #[test]
    fn missing_module_section_yields_default() {
        let config = AppConfig::default();
        let sample: Sample = config.module_config("student_records").unwrap();
        assert_eq!(sample, Sample::default());
    }

    #[test]
    fn invalid_module_section_is_an_error() {
        let mut config = AppConfig::default();
        config.modules.insert(
            "student_records".into(),
            serde_json::json!({ "unknown_key": true }),
        );
        assert!(config.module_config::<Sample>("student_records").is_err());
    }

    #[test]
    fn missing_file_is_an_error() {
        let tmp = tempdir().unwrap();
        assert!(AppConfig::load_layered(tmp.path().join("absent.yaml")).is_err());
    }

    #[test]
    fn unknown_top_level_key_is_rejected() {
        let tmp = tempdir().unwrap();
        let path = write_config(tmp.path(), "unexpected: 1\n");
        assert!(AppConfig::load_layered(&path).is_err());
    }

    #[test]
    fn cli_overrides_port_and_verbosity() {
        for (verbose, expected) in [(0, "info"), (1, "debug"), (2, "trace"), (5, "trace")] {
            let mut config = AppConfig::default();
            config.apply_cli_overrides(&CliArgs {
                port: Some(3000),
                verbose,
                ..Default::default()
            });
            assert_eq!(config.server.port, 3000);
            assert_eq!(config.logging.as_ref().unwrap()["default"].console_level, expected);
        }
    }

    #[test]
    fn yaml_round_trip_keeps_sections() {
        let yaml = AppConfig::default().to_yaml().unwrap();
        assert!(yaml.contains("server:"));
        assert!(yaml.contains("database:"));
        let back: AppConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back.server.port, 8087);
    }
}
