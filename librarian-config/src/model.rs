use librarian_model::StandingOrderMode;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// How Files with unknown obsid are classified from their file name (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ObsidInferenceMode {
    #[default]
    None,
    Hera,
    So,
    #[serde(rename = "_testing")]
    Testing,
}

/// The HTTP server backend named in configuration. The distilled system
/// only ships an `axum`-based server (§1 Non-goals: no HTML rendering/login
/// flow), so this field is recognized and validated but otherwise has no
/// effect beyond being logged at boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerBackend {
    #[default]
    Flask,
    Tornado,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionsMode {
    Readonly,
    Readwrite,
}

impl Default for PermissionsMode {
    fn default() -> Self {
        PermissionsMode::Readwrite
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl Default for LogLevel {
    fn default() -> Self {
        LogLevel::Info
    }
}

impl LogLevel {
    /// The `tracing`/`EnvFilter` directive this level maps to.
    pub fn as_filter_directive(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// A named authentication source: an opaque authenticator string maps to
/// this source name when handlers ask "who is this request from" (§6).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SourceConfig {
    pub authenticator: String,
}

/// A store declared at boot (`add-stores` in §6).
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct StoreConfig {
    pub path_prefix: String,
    pub ssh_host: String,
    #[serde(default)]
    pub http_prefix: Option<String>,
    #[serde(default = "default_true")]
    pub available: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct ServerSettings {
    #[serde(default)]
    pub backend: ServerBackend,
    pub port: u16,
    #[serde(default = "default_n_processes")]
    pub n_server_processes: u32,
    #[serde(default = "default_n_worker_threads")]
    pub n_worker_threads: u32,
}

fn default_n_processes() -> u32 {
    1
}

fn default_n_worker_threads() -> u32 {
    8
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            backend: ServerBackend::default(),
            port: 21036,
            n_server_processes: default_n_processes(),
            n_worker_threads: default_n_worker_threads(),
        }
    }
}

/// Local-disk staging destination for `StagerTask` (§4.6, §6).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct LocalDiskStagingConfig {
    pub dest_prefix: String,
    pub ssh_host: String,
    pub chown_command: String,
}

/// Bulk-transfer provider options (§6).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct TransferProviderConfig {
    #[serde(default)]
    pub use_globus: bool,
    pub globus_client_id: Option<String>,
    pub globus_transfer_token: Option<String>,
    pub globus_endpoint_id: Option<String>,
}

/// Configuration as deserialized directly from a TOML file; optional
/// everywhere so environment overrides and defaults can fill gaps.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct FileConfig {
    pub secret_key: Option<String>,
    #[serde(default)]
    pub sources: HashMap<String, SourceConfig>,
    #[serde(rename = "add-stores", default)]
    pub add_stores: HashMap<String, StoreConfig>,
    #[serde(default)]
    pub obsid_inference_mode: ObsidInferenceMode,
    pub host: Option<String>,
    #[serde(default)]
    pub server: ServerSettings,
    pub local_disk_staging: Option<LocalDiskStagingConfig>,
    #[serde(default)]
    pub standing_order_mode: StandingOrderMode,
    #[serde(default)]
    pub report_to_mandc: bool,
    #[serde(flatten)]
    pub transfer: TransferProviderConfig,
    #[serde(default)]
    pub permissions_mode: PermissionsMode,
    #[serde(default)]
    pub log_level: LogLevel,
}

/// The fully resolved configuration used by `librarian-core` and
/// `librarian-server`; produced by `ConfigLoader::load`.
#[derive(Debug, Clone)]
pub struct Config {
    pub secret_key: String,
    pub database_url: String,
    pub sources: HashMap<String, SourceConfig>,
    pub stores: HashMap<String, StoreConfig>,
    pub obsid_inference_mode: ObsidInferenceMode,
    pub host: String,
    pub server: ServerSettings,
    pub local_disk_staging: Option<LocalDiskStagingConfig>,
    pub standing_order_mode: StandingOrderMode,
    pub report_to_mandc: bool,
    pub transfer: TransferProviderConfig,
    pub permissions_mode: PermissionsMode,
    pub log_level: LogLevel,
}

impl Config {
    pub fn is_read_only(&self) -> bool {
        matches!(self.permissions_mode, PermissionsMode::Readonly)
    }
}
