pub mod routes;
pub mod upload;

use anyhow::{anyhow, Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use visual_search::{SearchEngine, ServiceConfig};

use crate::routes::{router, AppState};

/// Environment variable naming a JSON config file.
pub const CONFIG_ENV: &str = "VISUAL_SEARCH_CONFIG";

pub fn load_config() -> Result<ServiceConfig> {
    match std::env::var(CONFIG_ENV) {
        Ok(path) => {
            let path = PathBuf::from(path);
            tracing::info!("Loading config from {}", path.display());
            ServiceConfig::from_file(&path).map_err(|e| anyhow!(e))
        }
        Err(_) => {
            let config = ServiceConfig::default();
            config.validate().map_err(|e| anyhow!(e))?;
            Ok(config)
        }
    }
}

pub async fn run() -> Result<()> {
    // Initialize tracing subscriber so tracing::info!/debug!/warn!/error! produce output
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = load_config()?;
    tracing::info!("Model directory: {:?}", config.embedding.model_dir);

    if config.upload.persist {
        std::fs::create_dir_all(&config.upload.dir)
            .with_context(|| format!("Failed to create {}", config.upload.dir.display()))?;
    }

    let engine = SearchEngine::new(&config)
        .await
        .context("Failed to initialize search engine")?;

    tracing::info!("Loaded {} products", engine.catalog().len());
    tracing::info!(
        "Model: {} ({}-dimensional features)",
        engine.model_name(),
        engine.dimension()
    );

    let state = AppState::new(Arc::new(engine), &config);
    let app = router(state, Some(config.image_root.clone()));

    let addr = format!("{}:{}", config.server.host, config.server.port);
    tracing::info!("Visual search API listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
