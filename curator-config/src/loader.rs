use once_cell::sync::Lazy;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use crate::models::{CuratorConfig, DatabaseConfig};
use crate::sources::{EnvConfig, FileConfig};

static DEFAULT_CONFIG_LOCATIONS: Lazy<Vec<PathBuf>> = Lazy::new(|| {
    vec![
        PathBuf::from("curator.toml"),
        PathBuf::from("curator.json"),
        PathBuf::from("config/curator.toml"),
        PathBuf::from("config/curator.json"),
    ]
});

/// Where the effective configuration came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Built-in defaults; no file or inline config was found.
    Defaults,
    /// Path passed to the loader, e.g. from `--config`.
    Explicit(PathBuf),
    /// `CURATOR_CONFIG_PATH`.
    EnvPath(PathBuf),
    /// `CURATOR_CONFIG_JSON`.
    EnvInline,
    /// One of the default locations in the working directory.
    File(PathBuf),
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigSource::Defaults => f.write_str("built-in defaults"),
            ConfigSource::Explicit(path) => write!(f, "{}", path.display()),
            ConfigSource::EnvPath(path) => write!(f, "{} (CURATOR_CONFIG_PATH)", path.display()),
            ConfigSource::EnvInline => f.write_str("CURATOR_CONFIG_JSON"),
            ConfigSource::File(path) => write!(f, "{}", path.display()),
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct ConfigLoaderOptions {
    pub config_path: Option<PathBuf>,
    pub env_file: Option<PathBuf>,
}

#[derive(Debug, Default)]
pub struct ConfigLoader {
    options: ConfigLoaderOptions,
}

/// Result of a successful load.
#[derive(Debug, Clone)]
pub struct ConfigLoad {
    pub config: CuratorConfig,
    pub source: ConfigSource,
    pub env_file_loaded: bool,
    /// Non-fatal findings worth logging at startup.
    pub warnings: Vec<String>,
}

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("configuration file {path} does not exist")]
    MissingConfig { path: PathBuf },
    #[error("failed to read configuration {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration {origin}: {message}")]
    Parse { origin: String, message: String },
    #[error("invalid configuration: {0}")]
    Invalid(#[source] curator_core::MediaError),
    #[error(transparent)]
    EnvFile(#[from] dotenvy::Error),
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: ConfigLoaderOptions) -> Self {
        Self { options }
    }

    pub fn with_config_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.config_path = Some(path.into());
        self
    }

    pub fn with_env_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.env_file = Some(path.into());
        self
    }

    /// Read `.env`, gather the environment, then compose.
    pub fn load(&self) -> Result<ConfigLoad, ConfigLoadError> {
        let env_file_loaded = match &self.options.env_file {
            Some(path) => dotenvy::from_path(path).map(|_| true).or_else(ignore_missing)?,
            None => dotenvy::dotenv().map(|_| true).or_else(ignore_missing)?,
        };

        let mut load = self.load_with_env(EnvConfig::gather())?;
        load.env_file_loaded = env_file_loaded;
        Ok(load)
    }

    /// Compose from an explicit environment snapshot. The process
    /// environment is not read.
    pub fn load_with_env(&self, env: EnvConfig) -> Result<ConfigLoad, ConfigLoadError> {
        let (file_config, source) = self.load_file_config(&env)?;
        debug!("Loading configuration from {}", source);

        let mut engine = file_config.engine;
        env.apply(&mut engine);
        engine.validate().map_err(ConfigLoadError::Invalid)?;

        let database = DatabaseConfig {
            url: env.database_url.clone().or(file_config.database.url),
            max_connections: env
                .database_max_connections
                .or(file_config.database.max_connections)
                .unwrap_or(DatabaseConfig::DEFAULT_MAX_CONNECTIONS),
        };

        let config = CuratorConfig { database, engine };
        let warnings = config.warnings();

        Ok(ConfigLoad {
            config,
            source,
            env_file_loaded: false,
            warnings,
        })
    }

    fn load_file_config(&self, env: &EnvConfig) -> Result<(FileConfig, ConfigSource), ConfigLoadError> {
        if let Some(path) = &self.options.config_path {
            let config = read_config_file(path)?;
            return Ok((config, ConfigSource::Explicit(path.clone())));
        }
        if let Some(path) = &env.config_path {
            let config = read_config_file(path)?;
            return Ok((config, ConfigSource::EnvPath(path.clone())));
        }
        if let Some(raw) = &env.config_json {
            let config = serde_json::from_str(raw).map_err(|err| ConfigLoadError::Parse {
                origin: "CURATOR_CONFIG_JSON".into(),
                message: err.to_string(),
            })?;
            return Ok((config, ConfigSource::EnvInline));
        }
        if let Some(path) = DEFAULT_CONFIG_LOCATIONS.iter().find(|path| path.exists()) {
            let config = read_config_file(path)?;
            return Ok((config, ConfigSource::File(path.clone())));
        }
        Ok((FileConfig::default(), ConfigSource::Defaults))
    }
}

fn ignore_missing(err: dotenvy::Error) -> Result<bool, dotenvy::Error> {
    match err {
        dotenvy::Error::Io(_) => Ok(false),
        other => Err(other),
    }
}

/// Parse by extension; anything else is tried as TOML, then JSON.
pub fn read_config_file(path: &Path) -> Result<FileConfig, ConfigLoadError> {
    if !path.exists() {
        return Err(ConfigLoadError::MissingConfig {
            path: path.to_path_buf(),
        });
    }
    let contents = fs::read_to_string(path).map_err(|source| ConfigLoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let origin = path.display().to_string();

    match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => serde_json::from_str(&contents).map_err(|err| ConfigLoadError::Parse {
            origin,
            message: err.to_string(),
        }),
        Some("toml") => toml::from_str(&contents).map_err(|err| ConfigLoadError::Parse {
            origin,
            message: err.to_string(),
        }),
        _ => parse_from_str(&contents, &origin),
    }
}

pub fn parse_from_str(contents: &str, origin: &str) -> Result<FileConfig, ConfigLoadError> {
    toml::from_str(contents).or_else(|toml_err| {
        serde_json::from_str(contents).map_err(|json_err| ConfigLoadError::Parse {
            origin: origin.to_string(),
            message: format!("toml error: {toml_err}; json error: {json_err}"),
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use curator_core::config::RestartPolicy;
    use std::io::Write;

    fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn explicit_toml_file_is_loaded_and_env_wins() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "curator.toml",
            r#"
                [database]
                url = "postgres://file@localhost/curator"

                [watch]
                debounce_window_ms = 10000
                restart = { mode = "backoff", initial_delay_ms = 1000, max_delay_ms = 60000, max_attempts = 5 }
            "#,
        );

        let env = EnvConfig {
            database_url: Some("postgres://env@localhost/curator".into()),
            ..EnvConfig::default()
        };
        let load = ConfigLoader::new()
            .with_config_path(&path)
            .load_with_env(env)
            .unwrap();

        assert_eq!(load.source, ConfigSource::Explicit(path));
        assert_eq!(
            load.config.database.url.as_deref(),
            Some("postgres://env@localhost/curator")
        );
        assert_eq!(load.config.engine.watch.debounce_window_ms, 10_000);
        assert!(matches!(
            load.config.engine.watch.restart,
            RestartPolicy::Backoff { max_attempts: 5, .. }
        ));
    }

    #[test]
    fn inline_json_is_used_without_a_path() {
        let env = EnvConfig {
            config_json: Some(r#"{"executor":{"max_parallel_scans":2}}"#.into()),
            ..EnvConfig::default()
        };
        let load = ConfigLoader::new().load_with_env(env).unwrap();

        assert_eq!(load.source, ConfigSource::EnvInline);
        assert_eq!(load.config.engine.executor.max_parallel_scans, 2);
        assert_eq!(load.config.engine.executor.queue_capacity, 64);
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let err = ConfigLoader::new()
            .with_config_path("/nonexistent/curator.toml")
            .load_with_env(EnvConfig::default())
            .unwrap_err();
        assert!(matches!(err, ConfigLoadError::MissingConfig { .. }));
    }

    #[test]
    fn invalid_values_fail_validation() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "curator.json",
            r#"{"permissions":{"set_permissions":true,"folder_mode":"rwxr-xr-x"}}"#,
        );
        let err = ConfigLoader::new()
            .with_config_path(path)
            .load_with_env(EnvConfig::default())
            .unwrap_err();
        assert!(matches!(err, ConfigLoadError::Invalid(_)));
    }

    #[test]
    fn extensionless_files_fall_back_to_json() {
        let parsed = parse_from_str(r#"{"watch":{"enabled":false}}"#, "inline").unwrap();
        assert!(!parsed.engine.watch.enabled);

        let err = parse_from_str("{ not valid", "inline").unwrap_err();
        assert!(matches!(err, ConfigLoadError::Parse { .. }));
    }
}
