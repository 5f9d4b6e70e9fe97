#![forbid(unsafe_code)]

//! `checkup-sync` is a clinic checkup workflow sync engine.
//!
//! Bootstraps configuration and local slice storage, restores the operator
//! session, then either runs the reconciliation loop or performs a one-shot
//! backup/probe command.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use checkup_sync::backend::{self, HttpBackend, WorkflowBackend};
use checkup_sync::backup::BackupManager;
use checkup_sync::config::GlobalConfig;
use checkup_sync::persistence::{db, PersistentStore, SliceRepo};
use checkup_sync::session::inactivity::InactivityMonitor;
use checkup_sync::session::{AuthState, Credential, SessionContext};
use checkup_sync::sync::{QueueCoordinator, Reconciler, SyncScheduler, WorkflowState};
use checkup_sync::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "checkup-sync", about = "Clinic checkup workflow sync engine", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the reconciliation loop until interrupted or signed out.
    ///
    /// No operator input reaches this process, so with
    /// `[session] enforce_inactivity` on (the default) the session expires
    /// after `inactivity_timeout_seconds` and the loop stops.
    Run,
    /// Export every slice to a backup document.
    Export,
    /// Replace slices from a backup document.
    Import {
        /// Backup document to restore.
        file: PathBuf,
    },
    /// Check backend reachability.
    Probe,
    /// Print a patient's checkup history as JSON.
    History {
        /// Patient record identifier.
        patient_id: String,
    },
}

/// Shared collaborators built once at start-up.
struct Engine {
    config: GlobalConfig,
    store: Arc<PersistentStore>,
    session: Arc<SessionContext>,
    backend: Arc<dyn WorkflowBackend>,
    state: Arc<WorkflowState>,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("checkup-sync bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    let engine = bootstrap(&args).await?;

    let result = match args.command {
        Command::Run => run_engine(&engine).await,
        Command::Export => export(&engine).await,
        Command::Import { file } => import(&engine, &file).await,
        Command::Probe => {
            backend::probe(
                engine.backend.as_ref(),
                &engine.session,
                engine.config.backend.probe_timeout(),
            )
            .await
        }
        Command::History { patient_id } => history(&engine, &patient_id).await,
    };

    engine.store.flush().await;
    result
}

async fn bootstrap(args: &Cli) -> Result<Engine> {
    // ── Load configuration ──────────────────────────────
    let mut config = GlobalConfig::load_from_path(&args.config)?;
    info!(surface = %config.surface, "configuration loaded");

    // ── Initialize slice storage ────────────────────────
    let pool = db::connect(&config.storage.db_path).await?;
    info!(path = %config.storage.db_path.display(), "slice database ready");
    let storage = Arc::new(SliceRepo::new(Arc::new(pool)));
    let store = Arc::new(PersistentStore::new(storage, config.storage.debounce()));

    // ── Restore or establish the operator session ───────
    let session = Arc::new(SessionContext::new(Arc::clone(&store)));
    if !session.restore().await {
        match config.load_credentials().await {
            Ok(()) => {
                let user_id = config
                    .session
                    .user_id
                    .clone()
                    .unwrap_or_else(|| config.surface.to_string());
                session.login(Credential::new(
                    config.api_token.clone(),
                    user_id,
                    config.role(),
                ));
            }
            Err(err) => warn!(%err, "no credential available, backend calls will be skipped"),
        }
    }

    let backend: Arc<dyn WorkflowBackend> = Arc::new(HttpBackend::new(&config.backend.base_url)?);
    let state = Arc::new(WorkflowState::load(Arc::clone(&store)).await);

    Ok(Engine {
        config,
        store,
        session,
        backend,
        state,
    })
}

async fn run_engine(engine: &Engine) -> Result<()> {
    let cancel = CancellationToken::new();
    let reconciler = Arc::new(Reconciler::new(
        Arc::clone(&engine.backend),
        Arc::clone(&engine.session),
        Arc::clone(&engine.state),
    ));

    let scheduler = SyncScheduler::new(
        Arc::clone(&reconciler),
        engine.config.sync.interval(),
        cancel.clone(),
    )
    .spawn();
    let inactivity = engine.config.session.enforce_inactivity.then(|| {
        InactivityMonitor::new(
            Arc::clone(&engine.session),
            engine.config.session.inactivity_timeout(),
            engine.config.session.warning_lead(),
            cancel.clone(),
        )
        .spawn()
    });
    if inactivity.is_none() {
        info!("inactivity timeout disabled");
    }

    let mut auth_rx = engine.session.subscribe();
    let signed_in = engine.session.is_authenticated();

    tokio::select! {
        () = shutdown_signal() => info!("shutdown signal received"),
        () = wait_signed_out(&mut auth_rx), if signed_in => info!("session ended, stopping"),
    }

    cancel.cancel();
    scheduler.await_completion().await;
    if let Some(inactivity) = inactivity {
        inactivity.await_completion().await;
    }
    info!("engine stopped");
    Ok(())
}

async fn export(engine: &Engine) -> Result<()> {
    let manager = BackupManager::load(
        Arc::clone(&engine.state),
        engine.config.backup.dir.clone(),
        engine.config.backup.history_limit,
    )
    .await;
    let artifact = manager.export().await?;
    info!(path = %artifact.path.display(), "backup written");
    Ok(())
}

async fn import(engine: &Engine, file: &Path) -> Result<()> {
    let manager = BackupManager::load(
        Arc::clone(&engine.state),
        engine.config.backup.dir.clone(),
        engine.config.backup.history_limit,
    )
    .await;
    let report = manager.import_file(file).await?;
    info!(
        replaced = report.replaced.len(),
        ignored = report.ignored.len(),
        total_records = report.total_records,
        "backup restored"
    );
    Ok(())
}

async fn history(engine: &Engine, patient_id: &str) -> Result<()> {
    let reconciler = Arc::new(Reconciler::new(
        Arc::clone(&engine.backend),
        Arc::clone(&engine.session),
        Arc::clone(&engine.state),
    ));
    let coordinator = QueueCoordinator::new(
        Arc::clone(&engine.backend),
        Arc::clone(&engine.session),
        reconciler,
        engine.config.surface,
    );
    let records = coordinator.history(patient_id).await?;
    println!("{}", serde_json::to_string_pretty(&records)?);
    Ok(())
}

async fn wait_signed_out(auth_rx: &mut tokio::sync::watch::Receiver<AuthState>) {
    while auth_rx.changed().await.is_ok() {
        if matches!(*auth_rx.borrow(), AuthState::Unauthenticated { .. }) {
            return;
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
