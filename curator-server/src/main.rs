//! # curatord
//!
//! Long-running library daemon.
//!
//! ## Overview
//!
//! `curatord` keeps the catalog in step with the disk:
//!
//! - **Watching**: every registered root folder is watched and changes are
//!   coalesced into debounced rescans of the affected root
//! - **Rescanning**: queued rescans reconcile each item folder against its
//!   catalogued rows
//! - **Housekeeping**: one-shot rescans and root folder management from the
//!   command line
//!
//! Without a database URL the catalog lives in memory and is lost on exit.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use curator_config::{ConfigLoad, ConfigLoader};
use curator_core::runtime::{EngineRepositories, LibraryRuntime, RuntimeCollaborators};
use curator_core::scan::RescanSummary;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "curatord", about = "Curator library daemon")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    global: GlobalArgs,

    #[command(flatten)]
    serve: ServeArgs,
}

#[derive(Args, Debug, Clone)]
struct GlobalArgs {
    /// Configuration file (TOML or JSON).
    #[arg(long, env = "CURATOR_CONFIG_PATH")]
    config: Option<PathBuf>,

    /// Alternate `.env` file.
    #[arg(long)]
    env_file: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
struct ServeArgs {
    /// Do not rescan the library before entering the watch loop.
    #[arg(long)]
    skip_initial_scan: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Database maintenance.
    #[command(subcommand)]
    Db(DbCommand),
    /// Manage library root folders.
    #[command(subcommand)]
    Roots(RootsCommand),
    /// Rescan every root folder once and exit.
    Scan {
        /// Re-read attributes of files whose size and mtime are unchanged.
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand, Debug)]
enum DbCommand {
    /// Apply pending migrations.
    Migrate,
}

#[derive(Subcommand, Debug)]
enum RootsCommand {
    /// List registered root folders.
    List,
    /// Register a root folder.
    Add { path: PathBuf },
    /// Unregister a root folder. Catalogued files are left alone.
    Remove { path: PathBuf },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut loader = ConfigLoader::new();
    if let Some(path) = &cli.global.config {
        loader = loader.with_config_path(path);
    }
    if let Some(path) = &cli.global.env_file {
        loader = loader.with_env_file(path);
    }
    let load = loader.load().context("failed to load configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,curator_core=info,curatord=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    report_load(&load);

    match cli.command {
        Some(Command::Db(DbCommand::Migrate)) => {
            let pool = connect(&load)
                .await?
                .context("`db migrate` needs a database url (DATABASE_URL)")?;
            info!("migrations applied");
            pool.close().await;
            Ok(())
        }
        Some(Command::Roots(command)) => {
            let runtime = build_runtime(&load).await?;
            run_roots(&runtime, command).await
        }
        Some(Command::Scan { force }) => {
            let runtime = build_runtime(&load).await?;
            let summary = runtime.rescan_all(force).await.context("rescan failed")?;
            log_summary(&summary);
            Ok(())
        }
        None => serve(&load, cli.serve).await,
    }
}

fn report_load(load: &ConfigLoad) {
    if load.env_file_loaded {
        info!("loaded .env file");
    }
    info!("configuration loaded from {}", load.source);
    for warning in &load.warnings {
        warn!(message = %warning, "configuration warning");
    }
}

/// Connect and migrate. `None` when no database is configured.
async fn connect(load: &ConfigLoad) -> anyhow::Result<Option<PgPool>> {
    let Some(url) = load.config.database.url.as_deref() else {
        return Ok(None);
    };

    let pool = PgPoolOptions::new()
        .max_connections(load.config.database.max_connections)
        .connect(url)
        .await
        .context("failed to connect to database")?;
    curator_core::MIGRATOR
        .run(&pool)
        .await
        .context("failed to run database migrations")?;
    Ok(Some(pool))
}

async fn build_runtime(load: &ConfigLoad) -> anyhow::Result<LibraryRuntime> {
    let repositories = match connect(load).await? {
        Some(pool) => EngineRepositories::postgres(pool),
        None => {
            warn!("no database configured; the catalog will not survive a restart");
            EngineRepositories::in_memory()
        }
    };

    LibraryRuntime::build(
        load.config.engine.clone(),
        repositories,
        RuntimeCollaborators::default(),
    )
    .context("failed to assemble library runtime")
}

async fn serve(load: &ConfigLoad, args: ServeArgs) -> anyhow::Result<()> {
    let runtime = build_runtime(load).await?;
    let cancel = CancellationToken::new();
    let tasks = runtime
        .start(cancel.clone())
        .await
        .context("failed to start library runtime")?;

    if args.skip_initial_scan {
        info!("initial scan skipped");
    } else {
        match runtime.rescan_all(false).await {
            Ok(summary) => log_summary(&summary),
            Err(err) => warn!("initial scan failed: {err}"),
        }
    }

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutdown signal received");

    runtime.shutdown();
    cancel.cancel();
    tasks.join().await;
    Ok(())
}

async fn run_roots(runtime: &LibraryRuntime, command: RootsCommand) -> anyhow::Result<()> {
    match command {
        RootsCommand::List => {
            let roots = runtime.roots().all().await?;
            if roots.is_empty() {
                info!("no root folders registered");
            }
            for root in roots {
                info!("{} {}", root.id, root.path.display());
            }
        }
        RootsCommand::Add { path } => {
            let root = runtime
                .roots()
                .add(&path)
                .await
                .with_context(|| format!("failed to add root folder {}", path.display()))?;
            info!("registered root folder {} as {}", root.path.display(), root.id);
        }
        RootsCommand::Remove { path } => {
            let id = find_root(runtime, &path).await?;
            runtime.roots().remove(id).await?;
            info!("removed root folder {}", path.display());
        }
    }
    Ok(())
}

async fn find_root(
    runtime: &LibraryRuntime,
    path: &Path,
) -> anyhow::Result<curator_model::RootFolderId> {
    let normalized = curator_core::fs::normalize_path(path);
    runtime
        .roots()
        .all()
        .await?
        .into_iter()
        .find(|root| root.path == normalized)
        .map(|root| root.id)
        .with_context(|| format!("{} is not a registered root folder", path.display()))
}

fn log_summary(summary: &RescanSummary) {
    info!(
        scanned = summary.scanned,
        skipped = summary.skipped,
        coalesced = summary.coalesced,
        failed = summary.failed,
        "library rescan finished"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_invocation_serves() {
        let cli = Cli::try_parse_from(["curatord", "--skip-initial-scan"]).unwrap();
        assert!(cli.command.is_none());
        assert!(cli.serve.skip_initial_scan);
    }

    #[test]
    fn subcommands_parse() {
        let cli = Cli::try_parse_from(["curatord", "scan", "--force"]).unwrap();
        assert!(matches!(cli.command, Some(Command::Scan { force: true })));

        let cli = Cli::try_parse_from(["curatord", "roots", "add", "/media/movies"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Command::Roots(RootsCommand::Add { path })) if path == Path::new("/media/movies")
        ));

        let cli = Cli::try_parse_from(["curatord", "db", "migrate"]).unwrap();
        assert!(matches!(cli.command, Some(Command::Db(DbCommand::Migrate))));
    }
}
