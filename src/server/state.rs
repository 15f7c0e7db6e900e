use crate::cache::{KvStore, MemoryStore, NoopStore, ProxyCache};
use crate::config::{CacheStoreType, Config};
use crate::fetch::ContentFetcher;
use crate::metrics;
use crate::proxy::ProxyService;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub proxy: ProxyService,
    /// Process start, for the health report
    pub started_at: Instant,
    pub metrics: PrometheusHandle,
}

impl AppState {
    /// Build the state, connecting the configured cache store.
    ///
    /// A cache store that cannot be reached degrades to no caching.
    pub async fn new(config: Config) -> Self {
        let fetcher = ContentFetcher::new(&config.default_accept_language)
            .expect("Failed to create HTTP client");

        let store = connect_store(&config).await;
        info!("Cache backend: {}", store.name());
        let cache = ProxyCache::new(store, config.cache_ttl());

        let proxy = ProxyService::new(fetcher, cache, config.rewrite_options());

        Self {
            config: Arc::new(config),
            proxy,
            started_at: Instant::now(),
            metrics: metrics::init(),
        }
    }

    pub fn cache(&self) -> &ProxyCache {
        self.proxy.cache()
    }
}

async fn connect_store(config: &Config) -> Arc<dyn KvStore> {
    match config.cache_store {
        CacheStoreType::Memory => Arc::new(MemoryStore::new()),
        CacheStoreType::Disabled => Arc::new(NoopStore),
        CacheStoreType::Valkey => connect_valkey(config.valkey_url.as_deref()).await,
    }
}

#[cfg(feature = "valkey")]
async fn connect_valkey(url: Option<&str>) -> Arc<dyn KvStore> {
    let Some(url) = url else {
        warn!("CACHE_STORE=valkey but VALKEY_URL is not set, caching disabled");
        return Arc::new(NoopStore);
    };

    match crate::cache::ValkeyStore::connect(url).await {
        Ok(store) => Arc::new(store),
        Err(e) => {
            warn!("Failed to connect to Valkey at {}: {}, caching disabled", url, e);
            Arc::new(NoopStore)
        }
    }
}

#[cfg(not(feature = "valkey"))]
async fn connect_valkey(_url: Option<&str>) -> Arc<dyn KvStore> {
    warn!("CACHE_STORE=valkey requires the `valkey` feature, caching disabled");
    Arc::new(NoopStore)
}
