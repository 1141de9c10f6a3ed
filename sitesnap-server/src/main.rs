use std::path::Path;

use sitesnap_server::{
    build_router, init_server_schema, AppState, CategoryCatalog, PhotoStorage, ServerConfig,
};

#[tokio::main]
async fn main() {
    env_logger::init();

    let config = ServerConfig::load();
    if let Err(e) = run(config).await {
        log::error!("Server failed: {}", e);
        std::process::exit(1);
    }
}

async fn run(config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(parent) = Path::new(&config.db_path).parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::create_dir_all(&config.storage_dir)?;

    let conn = rusqlite::Connection::open(&config.db_path)?;
    init_server_schema(&conn)?;

    let categories = match &config.categories_file {
        Some(path) => CategoryCatalog::load(path)?,
        None => CategoryCatalog::default_catalog(),
    };
    log::info!("Loaded {} photo categories", categories.len());

    let storage = PhotoStorage::new(config.storage_dir.as_str(), &config.public_base_url);
    let state = AppState::new(conn, storage, categories);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    log::info!("Listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    log::info!("Shutting down");
}
