//! Configuration loading for the data librarian: a TOML file layered with
//! environment variables and CLI overrides, recognizing exactly the options
//! enumerated in the specification's external-interfaces section.

pub mod env;
pub mod error;
pub mod loader;
pub mod model;
pub mod obsid_inference;

pub use error::{ConfigLoadError, Result};
pub use loader::{CliOverrides, ConfigLoader};
pub use model::{
    Config, FileConfig, LocalDiskStagingConfig, LogLevel, ObsidInferenceMode, PermissionsMode,
    ServerBackend, ServerSettings, SourceConfig, StoreConfig, TransferProviderConfig,
};
pub use obsid_inference::{infer_obsid, InferenceError, InferredObsid};
