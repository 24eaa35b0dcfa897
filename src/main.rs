use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use waystone_server::config::ServerConfig;
use waystone_server::game::effects::TemplateCatalog;
use waystone_server::game::world::StaticWorld;
use waystone_server::metrics::{self, Metrics};
use waystone_server::net::repository::SaveRepository;
use waystone_server::net::scheduler::TickScheduler;
use waystone_server::net::session::SessionStore;
use waystone_server::net::transport::{start_session_reaper, SyncServer};

/// Built-in templates, overridden by `effects.json` when present
fn load_catalog(content_dir: Option<&Path>) -> anyhow::Result<TemplateCatalog> {
    let mut catalog = TemplateCatalog::builtin();
    if let Some(path) = content_dir.map(|dir| dir.join("effects.json")).filter(|p| p.exists()) {
        let loaded = TemplateCatalog::load_file(&path)?;
        info!("Loaded {} effect templates from {}", loaded.len(), path.display());
        catalog.merge(loaded);
    }
    Ok(catalog)
}

fn load_world(content_dir: Option<&Path>) -> anyhow::Result<StaticWorld> {
    match content_dir.map(|dir| dir.join("world.json")).filter(|p| p.exists()) {
        Some(path) => {
            let world = StaticWorld::load_file(&path)?;
            info!("Loaded world from {}", path.display());
            Ok(world)
        }
        None => {
            info!("No world content configured, using the sample town");
            Ok(StaticWorld::sample())
        }
    }
}

#[cfg(feature = "json_saves")]
fn open_repository(config: &ServerConfig) -> Arc<dyn SaveRepository> {
    use waystone_server::net::repository::JsonFileRepository;
    info!("Saves stored under {}", config.saves_dir.display());
    Arc::new(JsonFileRepository::new(&config.saves_dir))
}

#[cfg(not(feature = "json_saves"))]
fn open_repository(_config: &ServerConfig) -> Arc<dyn SaveRepository> {
    use waystone_server::net::repository::MemoryRepository;
    warn!("json_saves disabled, saves are kept in memory only");
    Arc::new(MemoryRepository::new())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    info!("Waystone Server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = ServerConfig::load_or_default();
    if let Err(e) = config.validate() {
        anyhow::bail!("Invalid configuration: {}", e);
    }
    info!(
        "Configuration loaded: {}:{}, max_sessions={}, idle_timeout={}s",
        config.bind_address,
        config.port,
        config.max_sessions,
        config.session_idle_timeout.as_secs()
    );
    if config.start_location.is_none() {
        warn!("START_LOCATION not set, unknown saves will be rejected");
    }

    // Content
    let content_dir = config.content_dir.as_deref();
    let catalog = load_catalog(content_dir)?;
    let world = load_world(content_dir)?;
    info!("{} effect templates available", catalog.len());

    // Initialize metrics
    let metrics = Arc::new(Metrics::new());
    let metrics_clone = metrics.clone();
    let metrics_port = config.metrics_port;
    tokio::spawn(async move {
        if let Err(e) = metrics::start_metrics_server(metrics_clone, metrics_port).await {
            error!("Metrics server error: {}", e);
        }
    });

    // Sessions and scheduling
    let store = Arc::new(SessionStore::new(open_repository(&config), config.max_sessions));
    let scheduler = Arc::new(
        TickScheduler::new(store.clone(), Arc::new(catalog), Arc::new(world))
            .with_config(config.scheduler())
            .with_metrics(metrics.clone()),
    );

    let reaper = start_session_reaper(
        scheduler.clone(),
        config.reaper_interval,
        config.session_idle_timeout,
    );

    let server = SyncServer::new(scheduler.clone());
    let addr = SocketAddr::new(config.bind_address, config.port);

    // Shutdown signal handler
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received");
    };

    // Run server with graceful shutdown
    tokio::select! {
        result = server.run(addr) => {
            if let Err(e) = result {
                error!("Server error: {}", e);
            }
        }
        _ = shutdown => {
            info!("Shutting down...");
        }
    }

    // Persist everything still loaded
    reaper.abort();
    let persisted = tokio::task::spawn_blocking(move || store.unload_all()).await?;
    info!("Persisted {} sessions", persisted);
    info!("Server stopped");

    Ok(())
}
