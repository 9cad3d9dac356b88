//! Boots the data librarian server: loads configuration, connects the
//! catalog, runs migrations, materializes stores, and serves the RPC
//! surface over HTTP.

mod auth;
mod collaborators;
mod errors;
mod rpc;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use librarian_config::{CliOverrides, Config, ConfigLoader, StoreConfig};
use librarian_core::catalog::postgres::PostgresCatalog;
use librarian_core::catalog::CatalogBackend;
use librarian_core::replication::ReplicationEngine;
use librarian_core::store_registry::StoreRegistry;
use librarian_core::tasks::TaskManager;
use librarian_model::{Store, StoreId};
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use collaborators::{HttpPeerTransport, LocalDiskDriver};
use state::AppState;

/// Command line arguments for the data librarian server.
#[derive(Parser, Debug)]
#[command(name = "librarian-server")]
#[command(about = "Federated catalog server for immutable scientific data files")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(long, env = "LIBRARIAN_CONFIG", default_value = "librarian.toml")]
    config: PathBuf,

    /// Server port (overrides config).
    #[arg(short, long)]
    port: Option<u16>,

    /// Server host (overrides config).
    #[arg(long)]
    host: Option<String>,

    /// Database connection URL (overrides config/environment).
    #[arg(long)]
    database_url: Option<String>,

    /// Log level (overrides config).
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let args = Args::parse();

    let cli = CliOverrides {
        host: args.host.clone(),
        port: args.port,
        database_url: args.database_url.clone(),
        log_level: args.log_level.clone(),
    };
    let config = ConfigLoader::load(&args.config, cli)?;
    let config = Arc::new(config);

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            format!(
                "librarian_server={level},librarian_core={level},tower_http=info",
                level = config.log_level.as_filter_directive()
            )
            .into()
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(host = %config.host, port = config.server.port, "configuration loaded");
    if config.is_read_only() {
        warn!("server is running in read-only mode");
    }

    let catalog = connect_catalog(&config).await?;
    let stores = materialize_stores(catalog.as_ref(), &config.stores).await?;

    let store_registry = StoreRegistry::new(catalog.clone());
    for store in &stores {
        store_registry.register_driver(store.id, Arc::new(LocalDiskDriver::new(&store.path_prefix)));
    }

    // The replication engine drives copies out of this node's own store, so
    // it needs exactly one local driver; §4.5's `is_primary` flag is about
    // HA leader election between redundant server processes, not about
    // which store is active, so the first configured store stands in for
    // "this node's local disk" until a multi-store topology needs more.
    let local_driver: Arc<dyn librarian_contracts::StoreDriver> = stores
        .first()
        .map(|s| Arc::new(LocalDiskDriver::new(&s.path_prefix)) as Arc<dyn librarian_contracts::StoreDriver>)
        .unwrap_or_else(|| Arc::new(LocalDiskDriver::new(".")));

    let tasks = TaskManager::spawn(catalog.clone(), config.server.n_worker_threads as usize);
    let replication = ReplicationEngine::new(
        catalog.clone(),
        tasks.clone(),
        local_driver,
        Arc::new(HttpPeerTransport::new()),
        config.standing_order_mode,
        true,
    );
    replication.spawn_safety_tick();

    let state = AppState {
        catalog,
        tasks,
        replication,
        stores: store_registry,
        config: config.clone(),
        identity_verifier: None,
    };

    let app = rpc::router(state).layer(tower_http::trace::TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.server.port).parse()?;
    info!(%addr, "starting data librarian server");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn connect_catalog(config: &Config) -> anyhow::Result<Arc<dyn CatalogBackend>> {
    let catalog = PostgresCatalog::connect(&config.database_url).await?;
    if let Err(e) = catalog.initialize_schema().await {
        warn!(error = %e, "schema initialization failed; continuing with existing schema");
    }
    Ok(Arc::new(catalog))
}

/// Creates or refreshes each configured store's row (§3 "Stores are created
/// from configuration at boot") and returns the resulting catalog rows.
async fn materialize_stores(
    catalog: &dyn CatalogBackend,
    configured: &std::collections::HashMap<String, StoreConfig>,
) -> anyhow::Result<Vec<Store>> {
    let mut stores = Vec::with_capacity(configured.len());
    for (name, cfg) in configured {
        let store = catalog
            .upsert_store(&Store {
                id: StoreId(0),
                name: name.clone(),
                ssh_host: cfg.ssh_host.clone(),
                path_prefix: cfg.path_prefix.clone(),
                http_prefix: cfg.http_prefix.clone(),
                available: cfg.available,
            })
            .await?;
        info!(store = %store.name, path = %store.path_prefix, "store registered");
        stores.push(store);
    }
    Ok(stores)
}
