use curator_core::config::EngineConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raw configuration as written in a TOML or JSON file. Engine sections sit
/// at the top level next to `[database]`.
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct FileConfig {
    pub database: FileDatabaseConfig,
    #[serde(flatten)]
    pub engine: EngineConfig,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct FileDatabaseConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_connections: Option<u32>,
}

/// Overrides read from the process environment.
#[derive(Debug, Default, Clone)]
pub struct EnvConfig {
    pub config_path: Option<PathBuf>,
    pub config_json: Option<String>,
    pub database_url: Option<String>,
    pub database_max_connections: Option<u32>,
    pub watch_enabled: Option<bool>,
    pub debounce_window_ms: Option<u64>,
    pub max_parallel_scans: Option<usize>,
}

impl EnvConfig {
    pub fn gather() -> Self {
        Self {
            config_path: non_empty_var("CURATOR_CONFIG_PATH").map(PathBuf::from),
            config_json: non_empty_var("CURATOR_CONFIG_JSON"),
            database_url: non_empty_var("DATABASE_URL"),
            database_max_connections: parse_var("DATABASE_MAX_CONNECTIONS"),
            watch_enabled: non_empty_var("CURATOR_WATCH_ENABLED").and_then(|raw| parse_bool(&raw)),
            debounce_window_ms: parse_var("CURATOR_DEBOUNCE_WINDOW_MS"),
            max_parallel_scans: parse_var("CURATOR_MAX_PARALLEL_SCANS"),
        }
    }

    /// Apply the engine overrides on top of `engine`.
    pub fn apply(&self, engine: &mut EngineConfig) {
        if let Some(enabled) = self.watch_enabled {
            engine.watch.enabled = enabled;
        }
        if let Some(window) = self.debounce_window_ms {
            engine.watch.debounce_window_ms = window;
        }
        if let Some(parallel) = self.max_parallel_scans {
            engine.executor.max_parallel_scans = parallel;
        }
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

fn parse_var<T: std::str::FromStr>(key: &str) -> Option<T> {
    non_empty_var(key).and_then(|raw| raw.trim().parse().ok())
}

pub(crate) fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_sections_sit_beside_database() {
        let raw = r#"
            [database]
            url = "postgres://curator@localhost/curator"

            [watch]
            debounce_window_ms = 5000

            [relocation]
            copy_using_hardlinks = false
        "#;
        let config: FileConfig = toml::from_str(raw).unwrap();

        assert_eq!(
            config.database.url.as_deref(),
            Some("postgres://curator@localhost/curator")
        );
        assert_eq!(config.engine.watch.debounce_window_ms, 5000);
        assert!(config.engine.watch.enabled);
        assert!(!config.engine.relocation.copy_using_hardlinks);
        assert_eq!(config.engine.executor.max_parallel_scans, 4);
    }

    #[test]
    fn env_overrides_only_touch_what_is_set() {
        let env = EnvConfig {
            watch_enabled: Some(false),
            max_parallel_scans: Some(8),
            ..EnvConfig::default()
        };
        let mut engine = EngineConfig::default();
        env.apply(&mut engine);

        assert!(!engine.watch.enabled);
        assert_eq!(engine.executor.max_parallel_scans, 8);
        assert_eq!(engine.watch.debounce_window_ms, 30_000);
    }

    #[test]
    fn booleans_accept_common_spellings() {
        assert_eq!(parse_bool("Yes"), Some(true));
        assert_eq!(parse_bool(" off "), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }
}
