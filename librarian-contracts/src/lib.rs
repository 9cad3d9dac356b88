//! Trait contracts for the external collaborators `librarian-core` consumes
//! but does not implement: the per-store filesystem driver and the
//! peer-to-peer transport used by replication.

pub mod error;
pub mod store;
pub mod transport;

pub use error::{ContractError, Result};
pub use store::{
    ByteStream, EntryKind, SpaceInfo, StagingToken, StatInfo, StoreDriver, TransportOptions,
    UploadRequest,
};
pub use transport::{PeerAck, PeerTransport};
