//! Store registry (§4.2): named store collaborators plus the 30s-cached
//! `df()` that backs `recommended_store` selection.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use librarian_contracts::{SpaceInfo, StoreDriver};
use librarian_model::{Store, StoreId};

use crate::catalog::CatalogBackend;
use crate::error::{LibrarianError, Result};

const DF_CACHE_TTL: Duration = Duration::from_secs(30);

/// Maps each store to the driver that knows how to talk to it, and caches
/// `df()` results so `recommended_store` doesn't hammer every store on every
/// call (§4.2 "caller caches ~30s").
#[derive(Clone)]
pub struct StoreRegistry {
    catalog: Arc<dyn CatalogBackend>,
    drivers: Arc<DashMap<StoreId, Arc<dyn StoreDriver>>>,
    df_cache: Arc<DashMap<StoreId, (Instant, SpaceInfo)>>,
}

impl StoreRegistry {
    pub fn new(catalog: Arc<dyn CatalogBackend>) -> Self {
        Self {
            catalog,
            drivers: Arc::new(DashMap::new()),
            df_cache: Arc::new(DashMap::new()),
        }
    }

    pub fn register_driver(&self, store_id: StoreId, driver: Arc<dyn StoreDriver>) {
        self.drivers.insert(store_id, driver);
    }

    pub fn driver(&self, store_id: StoreId) -> Result<Arc<dyn StoreDriver>> {
        self.drivers
            .get(&store_id)
            .map(|d| d.clone())
            .ok_or_else(|| LibrarianError::NotFound(format!("no driver registered for store {store_id}")))
    }

    /// Current space usage, served from cache when fresher than 30s.
    pub async fn df(&self, store_id: StoreId) -> Result<SpaceInfo> {
        if let Some(entry) = self.df_cache.get(&store_id) {
            let (fetched_at, info) = *entry;
            if fetched_at.elapsed() < DF_CACHE_TTL {
                return Ok(info);
            }
        }

        let driver = self.driver(store_id)?;
        let info = driver.df().await?;
        self.df_cache.insert(store_id, (Instant::now(), info));
        Ok(info)
    }

    /// The available store with the greatest free space that can still hold
    /// `requested_bytes`, or `InsufficientCapacity` (§4.2, §6 `recommended_store`).
    pub async fn recommended_store(&self, requested_bytes: i64) -> Result<Store> {
        let stores = self.catalog.list_stores().await?;
        let mut best: Option<(Store, i64)> = None;

        for store in stores.into_iter().filter(|s| s.available) {
            let info = match self.df(store.id).await {
                Ok(info) => info,
                Err(e) => {
                    tracing::warn!(store = %store.name, error = %e, "skipping store with unreachable driver");
                    continue;
                }
            };
            if info.available_bytes < requested_bytes {
                continue;
            }
            if best.as_ref().is_none_or(|(_, avail)| info.available_bytes > *avail) {
                best = Some((store, info.available_bytes));
            }
        }

        best.map(|(store, _)| store).ok_or_else(|| {
            LibrarianError::InsufficientCapacity(format!(
                "no available store can hold {requested_bytes} bytes"
            ))
        })
    }

    /// Forces the next `df` call for `store_id` to refetch.
    pub fn invalidate(&self, store_id: StoreId) {
        self.df_cache.remove(&store_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::memory::InMemoryCatalog;
    use async_trait::async_trait;
    use librarian_contracts::{
        ByteStream, ContractError, Result as ContractResult, StagingToken, StatInfo, UploadRequest,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeDriver {
        available: i64,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl StoreDriver for FakeDriver {
        async fn stat(&self, _store_path: &str) -> ContractResult<StatInfo> {
            Err(ContractError::NotFound("n/a".into()))
        }
        async fn df(&self) -> ContractResult<SpaceInfo> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(SpaceInfo {
                used_bytes: 0,
                available_bytes: self.available,
                total_bytes: self.available,
            })
        }
        async fn stage(&self, _dest_dir: &str) -> ContractResult<StagingToken> {
            unimplemented!()
        }
        async fn write_staged(&self, _staged: &StagingToken, _data: ByteStream) -> ContractResult<()> {
            unimplemented!()
        }
        async fn commit(&self, _staged: &StagingToken, _store_path: &str) -> ContractResult<()> {
            unimplemented!()
        }
        async fn unstage(&self, _staged: &StagingToken) -> ContractResult<()> {
            unimplemented!()
        }
        async fn stream(&self, _store_path: &str) -> ContractResult<ByteStream> {
            unimplemented!()
        }
        async fn upload_to(&self, _request: UploadRequest) -> ContractResult<()> {
            unimplemented!()
        }
    }

    fn seeded_store(id: i64, name: &str, available: bool) -> Store {
        Store {
            id: StoreId(id),
            name: name.into(),
            ssh_host: format!("{name}.example.org"),
            path_prefix: "/data".into(),
            http_prefix: None,
            available,
        }
    }

    #[tokio::test]
    async fn recommended_store_picks_largest_available_store() {
        let catalog = InMemoryCatalog::new();
        catalog.seed_store(seeded_store(1, "small", true));
        catalog.seed_store(seeded_store(2, "big", true));
        catalog.seed_store(seeded_store(3, "unavailable", false));

        let registry = StoreRegistry::new(Arc::new(catalog));
        registry.register_driver(
            StoreId(1),
            Arc::new(FakeDriver { available: 100, calls: Arc::new(AtomicUsize::new(0)) }),
        );
        registry.register_driver(
            StoreId(2),
            Arc::new(FakeDriver { available: 1_000, calls: Arc::new(AtomicUsize::new(0)) }),
        );
        registry.register_driver(
            StoreId(3),
            Arc::new(FakeDriver { available: 10_000, calls: Arc::new(AtomicUsize::new(0)) }),
        );

        let chosen = registry.recommended_store(500).await.unwrap();
        assert_eq!(chosen.name, "big");
    }

    #[tokio::test]
    async fn recommended_store_fails_when_nothing_fits() {
        let catalog = InMemoryCatalog::new();
        catalog.seed_store(seeded_store(1, "small", true));
        let registry = StoreRegistry::new(Arc::new(catalog));
        registry.register_driver(
            StoreId(1),
            Arc::new(FakeDriver { available: 10, calls: Arc::new(AtomicUsize::new(0)) }),
        );

        let err = registry.recommended_store(500).await.unwrap_err();
        assert!(matches!(err, LibrarianError::InsufficientCapacity(_)));
    }

    #[tokio::test]
    async fn df_result_is_cached_within_the_ttl() {
        let catalog = InMemoryCatalog::new();
        catalog.seed_store(seeded_store(1, "only", true));
        let registry = StoreRegistry::new(Arc::new(catalog));
        let calls = Arc::new(AtomicUsize::new(0));
        registry.register_driver(StoreId(1), Arc::new(FakeDriver { available: 100, calls: calls.clone() }));

        registry.df(StoreId(1)).await.unwrap();
        registry.df(StoreId(1)).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        registry.invalidate(StoreId(1));
        registry.df(StoreId(1)).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
