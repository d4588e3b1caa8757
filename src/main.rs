use clap::Parser;
use dotenvy::dotenv;
use shape_relay::config::RelayConfig;
use shape_relay::infrastructure::{extractor, storage};
use shape_relay::services::worker::RetentionWorker;
use shape_relay::{AppState, create_app};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: IpAddr,

    /// Port for the API server (overrides PORT)
    #[arg(short, long)]
    port: Option<u16>,

    /// Use development defaults instead of reading the environment
    #[arg(long)]
    dev: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initial Environment & Logging Setup
    dotenv().ok();
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shape_relay=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("🚀 Starting Shape Relay...");

    let config = if args.dev {
        RelayConfig::development()
    } else {
        RelayConfig::from_env()
    };
    info!(
        "⚙️  Config: Max Size={}MB, Workers={}, Timeout={}, Layout={}",
        config.max_file_size / 1024 / 1024,
        config.max_concurrent_jobs,
        config
            .job_timeout()
            .map(|t| format!("{}s", t.as_secs()))
            .unwrap_or_else(|| "none".to_string()),
        config.output_layout
    );

    // 2. Setup Infrastructure
    let storage_service = storage::setup_storage(&config).await?;
    let extractor_service = extractor::setup_extractor(&config).await;

    // 3. Setup Graceful Shutdown
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let jobs_shutdown = CancellationToken::new();

    let state = AppState::new(
        config.clone(),
        storage_service.clone(),
        extractor_service,
        jobs_shutdown.clone(),
    );

    // 4. Retention Worker
    if let Some(max_age) = config.retention() {
        let worker = RetentionWorker::new(
            storage_service.clone(),
            state.jobs.clone(),
            max_age,
            Duration::from_secs(config.retention_sweep_secs),
            shutdown_rx,
        );
        tokio::spawn(worker.run());
    } else {
        info!("♾️  Retention disabled, uploads and artifacts are kept forever");
    }

    let app = create_app(state);

    // 5. Serve
    let addr = SocketAddr::new(args.host, args.port.unwrap_or(config.port));
    info!("✅ Server is running on http://{}", addr);
    info!("📖 Swagger UI: http://{}/swagger-ui", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            jobs_shutdown.cancel();
            let _ = shutdown_tx.send(true);
        })
        .await?;

    info!("🛑 Server shut down gracefully.");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("⌨️  Ctrl+C received, starting graceful shutdown...");
        },
        _ = terminate => {
            info!("💤 SIGTERM received, starting graceful shutdown...");
        },
    }
}
