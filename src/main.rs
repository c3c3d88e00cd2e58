use anyhow::Result;
use axum::Router;
use std::{io::ErrorKind, path::Path, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;
use video_uploads::{
    config::AppConfig,
    routes,
    services::{
        chunk_planner::{ChunkPlanner, DEFAULT_CHUNK_SIZE},
        object_storage::S3ObjectStorage,
        upload_service::UploadService,
        upload_store::UploadStore,
    },
};

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + migrate flag ---
    let (cfg, migrate) = AppConfig::from_env_and_args()?;

    tracing::info!("Starting video-uploads with config: {:?}", cfg);

    // --- Ensure the SQLite directory exists ---
    let db_path = cfg
        .database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .trim_start_matches("file:");
    tracing::debug!("Interpreted SQLite path => {}", db_path);

    if !db_path.starts_with(":memory:") {
        if let Some(parent) = Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
                tracing::info!("Created missing directory {:?}", parent);
            }
        }
    }

    // --- Initialize SQLite connection + schema ---
    let store = UploadStore::connect(&cfg.database_url, 5).await?;
    let applied = store.migrate().await?;
    tracing::info!("Applied {} schema statements", applied);

    // --- Handle migration mode ---
    if migrate {
        tracing::info!("Database migration complete.");
        return Ok(()); // exit after migration
    }

    // --- Initialize core service ---
    let storage = S3ObjectStorage::connect(cfg.s3.clone()).await;
    let service = UploadService::new(
        Arc::new(storage),
        store,
        ChunkPlanner::new(DEFAULT_CHUNK_SIZE, cfg.max_file_size),
        cfg.key_prefix.clone(),
        cfg.presign_ttl,
    );

    // --- Build router ---
    let app: Router = routes::routes::routes().with_state(service);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
