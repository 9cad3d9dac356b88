use crate::error::Result;
use async_trait::async_trait;
use librarian_model::FileRecInfo;

/// The response a peer librarian gives to a `create_file_record`-style
/// hand-off performed during replication.
#[derive(Debug, Clone, PartialEq)]
pub struct PeerAck {
    pub accepted: bool,
    pub message: Option<String>,
}

/// A connection to a peer librarian instance, identified by `conn_name`
/// (§3 `StandingOrder.conn_name`, §6 `launch_file_copy.connection_name`).
///
/// This is the "out-of-band transport" the store driver hands a file to in
/// `upload_to`; it is a separate trait because the peer-record handshake is
/// a catalog-level concern, not a filesystem one.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Register the rec-info on the peer's catalog ahead of (or after) the
    /// underlying byte transfer, so the peer can create its own `File` and
    /// `FileInstance` rows.
    async fn announce_record(&self, conn_name: &str, rec_info: &FileRecInfo) -> Result<PeerAck>;
}
