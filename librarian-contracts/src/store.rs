use crate::error::Result;
use async_trait::async_trait;
use std::pin::Pin;
use tokio::io::AsyncRead;

/// The kind of filesystem entry a `stat` call resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EntryKind {
    File,
    Directory,
}

/// Result of `StoreDriver::stat`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StatInfo {
    pub size: i64,
    pub digest: String,
    pub kind: EntryKind,
}

/// Result of `StoreDriver::df`; the caller is responsible for caching this
/// for up to 30 s (§4.2, §5).
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SpaceInfo {
    pub used_bytes: i64,
    pub available_bytes: i64,
    pub total_bytes: i64,
}

/// A token identifying a location in a store's staging area, returned by
/// `stage` and consumed by `commit`/`unstage`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StagingToken(pub String);

impl std::fmt::Display for StagingToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Out-of-band transport options for `upload_to`; which variant applies
/// depends on how the destination store is configured (§6: Globus options).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TransportOptions {
    /// Ship directly over the driver's own transport (e.g. SSH/rsync).
    Direct,
    /// Hand off to a bulk-transfer provider.
    Globus {
        endpoint_id: String,
        transfer_token: String,
    },
}

/// A byte stream read from a store, used by the external streaming endpoint
/// (§4.2).
pub type ByteStream = Pin<Box<dyn AsyncRead + Send>>;

/// The operational contract a store collaborator exposes (§4.2).
///
/// Implementations may be local-filesystem, SSH-driven, or a fake used in
/// tests (§9 "SSH-as-driver"); the core never assumes which.
#[async_trait]
pub trait StoreDriver: Send + Sync {
    /// Inspect a store-relative path.
    async fn stat(&self, store_path: &str) -> Result<StatInfo>;

    /// Current space usage. Callers should cache the result for ~30 s.
    async fn df(&self) -> Result<SpaceInfo>;

    /// Reserve a location under the store's staging area and return a token
    /// identifying it.
    async fn stage(&self, dest_dir: &str) -> Result<StagingToken>;

    /// Write a byte stream into the location a prior `stage` call reserved.
    /// Callers drive `stage` → `write_staged` → `commit` to move a file's
    /// actual content between two drivers (e.g. `OffloaderTask`'s batch
    /// copies), rather than just the staging bookkeeping.
    async fn write_staged(&self, staged: &StagingToken, data: ByteStream) -> Result<()>;

    /// Atomically rename a staged path into its final store-relative path.
    /// Fails with `ContractError::AlreadyExists` if the target is occupied.
    async fn commit(&self, staged: &StagingToken, store_path: &str) -> Result<()>;

    /// Idempotently remove staging artifacts for a token.
    async fn unstage(&self, staged: &StagingToken) -> Result<()>;

    /// Open a byte stream for a store-relative path.
    async fn stream(&self, store_path: &str) -> Result<ByteStream>;

    /// Ship a local file to a peer's store via out-of-band transport.
    async fn upload_to(&self, request: UploadRequest) -> Result<()>;
}

/// Parameters for `StoreDriver::upload_to` (§4.2, §6 `launch_file_copy`).
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub destination_conn_name: String,
    pub rec_info: librarian_model::FileRecInfo,
    pub local_store_path: String,
    pub remote_store_path: Option<String>,
    pub staging_hint: Option<String>,
    pub transport: TransportOptions,
}
