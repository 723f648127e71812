use curator_core::config::EngineConfig;
use serde::Serialize;

/// Fully composed configuration for `curatord`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CuratorConfig {
    pub database: DatabaseConfig,
    #[serde(flatten)]
    pub engine: EngineConfig,
}

#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct DatabaseConfig {
    /// `None` keeps the catalog in memory for the life of the process.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub max_connections: u32,
}

impl DatabaseConfig {
    pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: Self::DEFAULT_MAX_CONNECTIONS,
        }
    }
}

// The URL may carry a password.
impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("url", &self.url.as_ref().map(|_| "<redacted>"))
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

impl CuratorConfig {
    /// Settings that load fine but are probably not what the operator wants.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        let engine = &self.engine;

        if self.database.url.is_none() {
            warnings.push(
                "no database configured; the catalog lives in memory and is lost on exit".into(),
            );
        }
        if engine.relocation.copy_using_hardlinks && engine.permissions.set_permissions {
            warnings.push(
                "permissions applied to hardlinked copies also change the source file".into(),
            );
        }
        if let Some(max) = engine.watch.max_debounce_ms
            && max < engine.watch.debounce_window_ms
        {
            warnings.push(format!(
                "watch.max_debounce_ms ({max}) is shorter than the debounce window ({}); bursts flush at the ceiling",
                engine.watch.debounce_window_ms
            ));
        }
        if !engine.watch.enabled {
            warnings.push("root folder watching is disabled; rescans run only on request".into());
        }
        warnings
    }
}
