//! Startup orchestration.
//!
//! # Responsibilities
//! - Open the usage store and load every destination record
//! - Seed the registry before any listener is bound
//! - Start the admin API and metrics exporter when enabled
//! - Bind the proxy listener and serve until shutdown
//! - Flush pending count writes before returning
//!
//! # Design Decisions
//! - Fail fast: a store that cannot be read is fatal, never an empty start
//! - Store open + load share one deadline (`timeouts.startup_secs`)
//! - Listeners start last (traffic only when ready)

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;

use crate::admin::{run_admin_server, AdminState};
use crate::config::ProxyConfig;
use crate::http::HttpServer;
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::store::{open_store, StoreError, UsageStore};
use crate::usage::{UsageRecorder, UsageRegistry};

/// Fatal errors before or while serving.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("usage store unavailable: {0}")]
    Store(#[from] StoreError),

    #[error("usage store did not load within {0:?}")]
    Timeout(Duration),

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),
}

/// Loaded state, ready to serve.
pub struct Ready {
    pub registry: Arc<UsageRegistry>,
    pub store: Arc<dyn UsageStore>,
}

/// Read every record from `store` into a fresh registry.
pub async fn load_registry(
    store: &dyn UsageStore,
    limit: Duration,
) -> Result<UsageRegistry, StartupError> {
    let records = tokio::time::timeout(limit, store.load_all())
        .await
        .map_err(|_| StartupError::Timeout(limit))??;

    let registry = UsageRegistry::new();
    registry.load(records);
    Ok(registry)
}

/// Open the configured store and seed the registry from it.
pub async fn bootstrap(config: &ProxyConfig) -> Result<Ready, StartupError> {
    let limit = Duration::from_secs(config.timeouts.startup_secs);

    let ready = tokio::time::timeout(limit, async {
        let store = open_store(&config.store).await?;
        let registry = load_registry(store.as_ref(), limit).await?;
        Ok::<_, StartupError>(Ready {
            registry: Arc::new(registry),
            store,
        })
    })
    .await
    .map_err(|_| StartupError::Timeout(limit))??;

    tracing::info!(
        destinations = ready.registry.len(),
        store = ready.store.kind(),
        "Usage registry loaded"
    );
    Ok(ready)
}

async fn bind(address: &str) -> Result<TcpListener, StartupError> {
    TcpListener::bind(address)
        .await
        .map_err(|source| StartupError::Bind {
            address: address.to_string(),
            source,
        })
}

/// Serve proxy traffic on `listener` until `shutdown` fires.
///
/// Starts the admin API alongside when it is enabled. Once the listener has
/// drained, waits for count writes still in flight so the last counts reach
/// the store before the runtime goes away.
pub async fn serve(
    listener: TcpListener,
    config: &ProxyConfig,
    ready: Ready,
    shutdown: &Shutdown,
) -> Result<(), StartupError> {
    if config.admin.enabled {
        let admin_listener = bind(&config.admin.bind_address).await?;
        let state = AdminState {
            registry: Arc::clone(&ready.registry),
            store_kind: ready.store.kind(),
        };
        let admin_shutdown = shutdown.subscribe();
        tokio::spawn(async move {
            if let Err(e) = run_admin_server(admin_listener, state, admin_shutdown).await {
                tracing::error!(error = %e, "Admin API stopped with error");
            }
        });
    }

    let recorder = UsageRecorder::new(
        ready.registry,
        ready.store,
        Duration::from_secs(config.timeouts.persist_secs),
    );

    let served = HttpServer::new(config, recorder.clone())
        .run(listener, shutdown.subscribe())
        .await;

    recorder.drain().await;
    served.map_err(StartupError::Serve)
}

/// Full startup sequence: load state, bind, serve until shutdown.
pub async fn run(config: ProxyConfig, shutdown: Shutdown) -> Result<(), StartupError> {
    let ready = bootstrap(&config).await?;

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = bind(&config.listener.bind_address).await?;
    tracing::info!(address = %config.listener.bind_address, "Listening for connections");

    serve(listener, &config, ready, &shutdown).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreKind;
    use crate::store::MemoryStore;
    use crate::usage::DestinationRecord;
    use async_trait::async_trait;

    struct SlowStore;

    #[async_trait]
    impl UsageStore for SlowStore {
        async fn load_all(&self) -> Result<Vec<DestinationRecord>, StoreError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Vec::new())
        }

        async fn upsert_count(&self, _: u32, _: u64) -> Result<(), StoreError> {
            Ok(())
        }

        fn kind(&self) -> &'static str {
            "slow"
        }
    }

    #[tokio::test]
    async fn registry_reflects_store() {
        let store = MemoryStore::with_records([
            DestinationRecord::new(8080, 3),
            DestinationRecord::new(9090, 0),
        ]);

        let registry = load_registry(&store, Duration::from_secs(1)).await.unwrap();

        assert_eq!(registry.get(8080), Some(DestinationRecord::new(8080, 3)));
        assert_eq!(registry.get(9090), Some(DestinationRecord::new(9090, 0)));
        assert_eq!(registry.get(7000), None);
    }

    #[tokio::test]
    async fn slow_store_is_fatal() {
        let err = load_registry(&SlowStore, Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, StartupError::Timeout(_)));
    }

    #[tokio::test]
    async fn unreadable_store_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("usage.json");
        std::fs::write(&path, "[{").unwrap();

        let mut config = ProxyConfig::default();
        config.store.kind = StoreKind::Json;
        config.store.path = path.to_string_lossy().into_owned();

        let err = bootstrap(&config).await.err().unwrap();
        assert!(matches!(err, StartupError::Store(StoreError::Decode(_))));
    }

    #[tokio::test]
    async fn bind_failure_is_reported() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = taken.local_addr().unwrap().to_string();

        let err = bind(&address).await.unwrap_err();
        assert!(matches!(err, StartupError::Bind { .. }));
    }
}
