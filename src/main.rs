use anyhow::Result;
use std::sync::Arc;
use tracing::{error, info, warn};

use regional_cache::cache::{
    BackendHealth, CacheBackend, CacheStore, MemoryBackend, ReadThroughCache, RedisBackend,
};
use regional_cache::config::Config;
use regional_cache::retry::RetryExecutor;
use regional_cache::sources::{HttpUpstreamClient, UpstreamClient};
use regional_cache::warming::WarmingScheduler;

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("regional_cache=debug".parse()?)
                .add_directive("reqwest=info".parse()?),
        )
        .init();

    info!("🎵 Iniciando Regional Cache v{}", env!("CARGO_PKG_VERSION"));

    // Cargar configuración
    let config = Config::load()?;
    info!("{}", config.summary());

    // Inicializar caché
    let store = Arc::new(CacheStore::new(build_backend(&config)?));

    // Manejar health check si es necesario
    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check(&store).await;
    }

    let upstream = Arc::new(HttpUpstreamClient::new(config.upstream_config())?);
    info!("🔌 Cliente upstream: {}", upstream.source_name());
    let cache = Arc::new(ReadThroughCache::new(
        Arc::clone(&store),
        upstream,
        config.resolver(),
        RetryExecutor::new(config.retry_config()),
    ));
    let scheduler = Arc::new(WarmingScheduler::new(cache, config.warming_config()));

    if std::env::args().any(|arg| arg == "--warm-now") {
        if let Some(report) = scheduler.run_pass().await {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        store.close().await;
        return Ok(());
    }

    if config.warming_enabled {
        scheduler.spawn();
    } else {
        info!("💤 Calentamiento deshabilitado");
    }

    info!("🚀 Regional Cache iniciado exitosamente");

    // Manejar shutdown graceful
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Error al registrar Ctrl+C: {:?}", e);
    }
    info!("⚠️ Señal de shutdown recibida, cerrando...");

    scheduler.shutdown().await;
    store.close().await;

    Ok(())
}

fn build_backend(config: &Config) -> Result<Arc<dyn CacheBackend>> {
    match config.redis_config() {
        Some(redis) => Ok(Arc::new(RedisBackend::new(redis)?)),
        None => Ok(Arc::new(MemoryBackend::new(config.cache_max_entries))),
    }
}

async fn health_check(store: &CacheStore) -> Result<()> {
    let stats = store.stats().await;
    println!("{}", serde_json::to_string_pretty(&stats)?);

    if stats.backend_health == BackendHealth::Healthy {
        println!("OK");
        Ok(())
    } else {
        warn!("Backend {} no disponible", stats.backend);
        anyhow::bail!("Backend de caché no disponible");
    }
}
