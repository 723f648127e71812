//! Configuration loading for Curator.
//!
//! Sources are layered in this order, later ones winning:
//!
//! 1. built-in defaults
//! 2. one config file: `--config`, else `CURATOR_CONFIG_PATH`, else the
//!    inline `CURATOR_CONFIG_JSON`, else `curator.toml` / `config/curator.toml`
//!    in the working directory
//! 3. environment overrides (`DATABASE_URL`, `CURATOR_WATCH_ENABLED`, ...),
//!    with `.env` read first when present
//!
//! The composed engine sections are validated before they are returned.

#![allow(missing_docs)]

pub mod loader;
pub mod models;
pub mod sources;

pub use loader::{ConfigLoad, ConfigLoadError, ConfigLoader, ConfigLoaderOptions, ConfigSource};
pub use models::{CuratorConfig, DatabaseConfig};
pub use sources::{EnvConfig, FileConfig, FileDatabaseConfig};
