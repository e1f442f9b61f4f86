use clap::Parser;
use connect_drive::config::AppConfig;
use connect_drive::infrastructure::{database, storage};
use connect_drive::services::jobs::JobQueue;
use connect_drive::services::monitoring::setup_reporter;
use connect_drive::services::worker::BackgroundWorker;
use connect_drive::{AppState, create_app};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Capacity of the background job queue
const JOB_QUEUE_CAPACITY: usize = 1024;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Service type to run (api, worker, all)
    #[arg(short, long, default_value = "all")]
    mode: String,

    /// Port for the API server
    #[arg(short, long, default_value_t = 3000)]
    port: u16,

    /// Load the strict production configuration
    #[arg(long, conflicts_with = "development")]
    production: bool,

    /// Shorten retention and sweep intervals for local work
    #[arg(long)]
    development: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initial Environment & Logging Setup
    dotenvy::dotenv().ok();
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "connect_drive=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if !matches!(args.mode.as_str(), "api" | "worker" | "all") {
        anyhow::bail!("Unknown mode '{}', expected api, worker or all", args.mode);
    }

    info!("🚀 Starting ConnectDrive [Mode: {}]...", args.mode);

    let config = if args.production {
        AppConfig::production()?
    } else if args.development {
        AppConfig::development()
    } else {
        AppConfig::from_env()
    };
    info!(
        "🛡️  Config: Max Upload={}MB, Default Quota={}MB, Retention={}d",
        config.max_upload_size / 1024 / 1024,
        config.default_storage_quota / 1024 / 1024,
        config.recycle_retention_days
    );

    // 2. Setup Common Infrastructure
    let db_url = std::env::var("DATABASE_URL")
        .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?;
    let db = database::setup_database(&db_url).await?;
    let storage_service = storage::setup_storage(&config.storage).await;
    let reporter = setup_reporter(config.monitoring_webhook_url.as_deref());

    let (jobs, job_rx) = JobQueue::new(JOB_QUEUE_CAPACITY);
    let state = AppState::new(db, storage_service, config.clone(), jobs.clone(), reporter);

    // 3. Setup Graceful Shutdown Channel
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let mut handles = Vec::new();

    // 4. Worker: always drains the queue, sweeps only in worker/all mode
    let mut worker = BackgroundWorker::new(
        state.worker_context(),
        jobs,
        job_rx,
        shutdown_rx.clone(),
    );
    if args.mode != "api" {
        worker = worker.with_sweep(Duration::from_secs(config.worker_interval_secs));
    }
    handles.push(tokio::spawn(worker.run()));
    info!("👷 Worker service initialized.");

    // 5. Initialize API Service
    if args.mode == "api" || args.mode == "all" {
        let app = create_app(state);
        let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
        let listener = tokio::net::TcpListener::bind(addr).await?;

        info!("✅ API Server listening on: http://0.0.0.0:{}", args.port);
        info!(
            "📖 Swagger UI documentation: http://localhost:{}/swagger-ui",
            args.port
        );

        let mut server_shutdown = shutdown_rx.clone();
        handles.push(tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = server_shutdown.changed().await;
                })
                .await
            {
                error!("❌ Server runtime error: {}", e);
            }
        }));
    }

    // 6. Wait for Shutdown Signal
    shutdown_signal().await;
    let _ = shutdown_tx.send(true);

    info!("🛑 Shutting down backend services...");
    for handle in handles {
        if let Err(e) = handle.await {
            error!("Task ended abnormally: {}", e);
        }
    }

    info!("👋 Backend exited cleanly.");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("⌨️  Ctrl+C received, initiating graceful shutdown...");
        },
        _ = terminate => {
            info!("💤 SIGTERM received, initiating graceful shutdown...");
        },
    }
}
