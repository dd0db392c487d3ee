use anyhow::anyhow;
use axum::serve;
use kma_core::create_dir_all;
use kma_gateway::{app, build_app_state, get_config_info, get_log_level, setup_logger};
use log::{error, info};
use std::{net::SocketAddr, str::FromStr};
use tokio::{net::TcpListener, signal};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = get_config_info();
    let log_level = get_log_level(&cli);

    setup_logger()
        .level(log_level)
        .level_for("sqlx", log::LevelFilter::Warn)
        .level_for("kma_gateway", log_level)
        .level_for("kma_ingest", log_level)
        .level_for("http_response", log_level)
        .level_for("http_request", log_level)
        .apply()?;

    let data_dir = cli.kma.data_dir();
    create_dir_all(&data_dir).map_err(|e| anyhow!("error creating {}: {}", data_dir, e))?;

    let host = cli.host();
    let port = cli.port();
    let socket_addr = SocketAddr::from_str(&format!("{}:{}", host, port))
        .map_err(|e| anyhow!("invalid address: {}", e))?;

    let listener = TcpListener::bind(socket_addr)
        .await
        .map_err(|e| anyhow!("error binding to socket: {}", e))?;

    info!("KMA gateway starting...");
    info!("  Listen:  http://{}", socket_addr);
    info!("  Station: {}", cli.kma.station());
    info!("  SQLite:  {}", data_dir);
    info!("  DuckDB:  {}", cli.kma.duckdb_path());

    let (app_state, pipeline) = build_app_state(&cli).await.map_err(|e| {
        error!("error building app: {}", e);
        e
    })?;

    let mut jobs = if cli.scheduler_enabled() {
        pipeline.scheduler(&cli.kma).spawn()
    } else {
        info!("scheduler disabled; ingestion runs only on manual trigger");
        tokio::task::JoinSet::new()
    };

    let database = pipeline.database.clone();
    let app = app(app_state);

    serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("shutting down ingestion jobs");
    jobs.shutdown().await;
    database.checkpoint().await;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
