//! Application state shared by every RPC handler (§3, §6).

use std::sync::Arc;

use librarian_config::Config;
use librarian_core::replication::ReplicationEngine;
use librarian_core::store_registry::StoreRegistry;
use librarian_core::tasks::TaskManager;
use librarian_core::catalog::CatalogBackend;

use crate::auth::IdentityVerifier;

#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<dyn CatalogBackend>,
    pub tasks: TaskManager,
    pub replication: ReplicationEngine,
    pub stores: StoreRegistry,
    pub config: Arc<Config>,
    pub identity_verifier: Option<Arc<dyn IdentityVerifier>>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState").finish_non_exhaustive()
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use async_trait::async_trait;
    use librarian_config::{ObsidInferenceMode, PermissionsMode, ServerSettings, SourceConfig};
    use librarian_contracts::{
        ByteStream, ContractError, PeerAck, PeerTransport, Result as ContractResult, SpaceInfo,
        StagingToken, StatInfo, StoreDriver, UploadRequest,
    };
    use librarian_core::catalog::memory::InMemoryCatalog;
    use librarian_model::{FileRecInfo, StandingOrderMode};
    use std::collections::HashMap;

    struct NoopDriver;

    #[async_trait]
    impl StoreDriver for NoopDriver {
        async fn stat(&self, _store_path: &str) -> ContractResult<StatInfo> {
            Err(ContractError::NotFound("n/a".into()))
        }
        async fn df(&self) -> ContractResult<SpaceInfo> {
            Ok(SpaceInfo { used_bytes: 0, available_bytes: 0, total_bytes: 0 })
        }
        async fn stage(&self, _dest_dir: &str) -> ContractResult<StagingToken> {
            Err(ContractError::Unavailable("test driver".into()))
        }
        async fn write_staged(&self, _staged: &StagingToken, _data: ByteStream) -> ContractResult<()> {
            Err(ContractError::Unavailable("test driver".into()))
        }
        async fn commit(&self, _staged: &StagingToken, _store_path: &str) -> ContractResult<()> {
            Err(ContractError::Unavailable("test driver".into()))
        }
        async fn unstage(&self, _staged: &StagingToken) -> ContractResult<()> {
            Ok(())
        }
        async fn stream(&self, _store_path: &str) -> ContractResult<ByteStream> {
            Err(ContractError::Unavailable("test driver".into()))
        }
        async fn upload_to(&self, _request: UploadRequest) -> ContractResult<()> {
            Err(ContractError::Unavailable("test driver".into()))
        }
    }

    struct NoopTransport;

    #[async_trait]
    impl PeerTransport for NoopTransport {
        async fn announce_record(&self, _conn_name: &str, _rec_info: &FileRecInfo) -> ContractResult<PeerAck> {
            Ok(PeerAck { accepted: true, message: None })
        }
    }

    pub fn test_state() -> AppState {
        let catalog: Arc<dyn CatalogBackend> = Arc::new(InMemoryCatalog::new());
        let tasks = TaskManager::spawn(catalog.clone(), 2);
        let replication = ReplicationEngine::new(
            catalog.clone(),
            tasks.clone(),
            Arc::new(NoopDriver),
            Arc::new(NoopTransport),
            StandingOrderMode::Normal,
            true,
        );
        let stores = StoreRegistry::new(catalog.clone());

        let mut sources = HashMap::new();
        sources.insert(
            "karoo".to_string(),
            SourceConfig { authenticator: "s3cr3t-token".to_string() },
        );

        let config = Arc::new(Config {
            secret_key: "test-secret".into(),
            database_url: "postgresql://localhost/test".into(),
            sources,
            stores: HashMap::new(),
            obsid_inference_mode: ObsidInferenceMode::None,
            host: "127.0.0.1".into(),
            server: ServerSettings::default(),
            local_disk_staging: None,
            standing_order_mode: StandingOrderMode::Normal,
            report_to_mandc: false,
            transfer: Default::default(),
            permissions_mode: PermissionsMode::Readwrite,
            log_level: Default::default(),
        });

        AppState { catalog, tasks, replication, stores, config, identity_verifier: None }
    }
}
