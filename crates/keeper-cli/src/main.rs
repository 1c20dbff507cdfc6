//! Server entry point for Keeper.
//!
//! Provides the `keeper-server` binary: `serve` (the default) wires the
//! vault, store, auth and web crates together from configuration, and
//! `check-config` prints the resolved configuration with secrets masked.

mod cli;
mod config;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use keeper_auth::{AuthService, IdentityVerifier, TokenIssuer};
use keeper_service::KeeperService;
use keeper_store::{
    Database, FileRecordStore, FileUserDirectory, SqliteUserDirectory, UserDirectory,
};
use keeper_vault::{Cipher, PasswordHasher};
use keeper_web::WebServer;

use crate::cli::{Cli, Commands};
use crate::config::{DEFAULT_CONFIG_PATH, KeeperConfig, UserBackend};

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is normal outside development.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let mut config = resolve_config(cli.config.as_deref())?;

    match cli.command.unwrap_or(Commands::Serve {
        bind: None,
        port: None,
    }) {
        Commands::Serve { bind, port } => {
            if let Some(bind) = bind {
                config.server.bind_addr = bind;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            cmd_serve(config).await
        }
        Commands::CheckConfig => cmd_check_config(&config),
    }
}

fn resolve_config(explicit: Option<&Path>) -> Result<KeeperConfig> {
    let path = explicit.unwrap_or(Path::new(DEFAULT_CONFIG_PATH));
    let mut config = KeeperConfig::load(path, explicit.is_some())?;
    config.apply_env(|name| std::env::var(name).ok())?;
    Ok(config)
}

// ---------------------------------------------------------------------------
// Subcommand: serve
// ---------------------------------------------------------------------------

async fn cmd_serve(config: KeeperConfig) -> Result<()> {
    init_tracing(&config.log.level);
    config.validate().context("invalid configuration")?;

    info!(version = env!("CARGO_PKG_VERSION"), "starting keeper");

    // 1. Encryption key.
    let cipher = Cipher::from_secret(config.security.encryption_secret.as_bytes())
        .context("failed to initialise record cipher")?;

    // 2. Record store.
    let records = FileRecordStore::open(&config.storage.dir)
        .await
        .with_context(|| {
            format!(
                "failed to open record store at {}",
                config.storage.dir.display()
            )
        })?;
    info!(root = %config.storage.dir.display(), "record store ready");

    // 3. User directory.
    let users = open_user_directory(&config).await?;

    // 4. Auth.
    let ttl = config.token_ttl()?;
    let tokens = Arc::new(
        TokenIssuer::new(config.security.token_secret.as_bytes(), ttl)
            .context("failed to initialise token issuer")?,
    );
    let hasher = PasswordHasher::with_iterations(config.security.password_iterations);
    let auth = AuthService::new(Arc::clone(&users), hasher, Arc::clone(&tokens))
        .context("failed to initialise auth service")?;
    info!(ttl_hours = tokens.ttl().num_hours(), "auth service ready");

    // 5. Keeper service and HTTP surface.
    let keeper = KeeperService::new(Arc::new(records), Arc::new(cipher));
    let identity: Arc<dyn IdentityVerifier> = tokens;
    let server = WebServer::new(config.web_config(), Arc::new(auth), identity, keeper);

    let served = server
        .start(shutdown_signal())
        .await
        .with_context(|| {
            format!(
                "web server failed on {}:{}",
                config.server.bind_addr, config.server.port
            )
        });

    // Flush user data even if serving failed.
    if let Err(e) = users.close().await {
        warn!(error = %e, "failed to close user directory");
    }

    served?;
    info!("keeper stopped");
    Ok(())
}

async fn open_user_directory(config: &KeeperConfig) -> Result<Arc<dyn UserDirectory>> {
    match config.storage.user_backend {
        UserBackend::File => {
            let path = config.storage.users_file.clone();
            ensure_parent_dir(&path)?;
            let dir = FileUserDirectory::open(path.clone())
                .await
                .with_context(|| format!("failed to load users from {}", path.display()))?;
            info!(backend = "file", path = %dir.path().display(), "user directory ready");
            Ok(Arc::new(dir))
        }
        UserBackend::Sqlite => {
            let path = config.storage.database_path.clone();
            ensure_parent_dir(&path)?;
            let db = Database::open_and_migrate(path.clone())
                .await
                .with_context(|| format!("failed to open database {}", path.display()))?;
            info!(backend = "sqlite", path = %path.display(), "user directory ready");
            Ok(Arc::new(SqliteUserDirectory::new(db)))
        }
    }
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }
    Ok(())
}

/// Resolves on Ctrl-C, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }

    info!("shutdown requested, draining in-flight requests");
}

// ---------------------------------------------------------------------------
// Subcommand: check-config
// ---------------------------------------------------------------------------

fn cmd_check_config(config: &KeeperConfig) -> Result<()> {
    print!("{}", config.redacted()?);

    match config.validate() {
        Ok(()) => {
            println!();
            println!("# configuration OK");
            Ok(())
        }
        Err(e) => Err(e.context("configuration is not usable")),
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Initialize the global tracing subscriber.
///
/// `RUST_LOG` wins over the configured level when set.
fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
