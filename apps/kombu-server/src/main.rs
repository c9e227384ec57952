use kombu_server::config::ServerConfig;
use kombu_server::http::{router, AppState};
use kombu_server::metrics::ApiMetrics;
use kombu_store::{HashEmbedder, LibraryService};
use std::sync::Arc;

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    // Config file path from argv, falling back to environment variables.
    let config_path = std::env::args().nth(1).unwrap_or_else(|| "kombu.yaml".to_string());

    let config = if std::path::Path::new(&config_path).exists() {
        tracing::info!("loading configuration from {}", config_path);
        ServerConfig::load_from_file(&config_path)?
    } else {
        tracing::info!("no config file at {}, loading from environment", config_path);
        ServerConfig::load_from_env()?
    };

    tracing::info!("listen address: {}", config.listen_addr);
    tracing::info!("data directory: {}", config.data_dir.display());

    let provider = Arc::new(HashEmbedder::new(
        config.embedding.dimension,
        config.embedding.seed,
    ));
    let service = Arc::new(LibraryService::new(provider, config.index.clone()));

    let snapshot_path = config.snapshot_path();
    if config.snapshot.load_on_start {
        match service.load_snapshot(&snapshot_path) {
            Ok(()) => tracing::info!("restored snapshot from {}", snapshot_path.display()),
            Err(kombu_store::Error::SnapshotMissing { .. }) => {
                tracing::info!("no snapshot at {}, starting empty", snapshot_path.display())
            }
            Err(err) => return Err(err.into()),
        }
    }

    let state = AppState {
        service: Arc::clone(&service),
        metrics: Arc::new(ApiMetrics::new()),
        snapshot_path: snapshot_path.clone(),
        snapshot_format: config.snapshot.format,
    };

    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    tracing::info!("kombu server is ready");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("received shutdown signal");
        })
        .await?;

    if config.snapshot.save_on_shutdown {
        tracing::info!("writing shutdown snapshot to {}", snapshot_path.display());
        service.save_snapshot(&snapshot_path, config.snapshot.format)?;
    }

    tracing::info!("shutdown complete");
    Ok(())
}
