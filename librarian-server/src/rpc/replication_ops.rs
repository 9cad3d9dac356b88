//! Copy and capacity operations (§6): `launch_file_copy`, `initiate_offload`,
//! `recommended_store`.

use axum::extract::State;
use axum::Json;
use librarian_contracts::TransportOptions;
use librarian_core::offload::plan_offload;
use librarian_core::LibrarianError;
use librarian_model::FileName;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::authenticate;
use crate::errors::AppError;
use crate::rpc::{ok, RpcRequest};
use crate::state::AppState;

#[derive(Deserialize)]
struct LaunchFileCopy {
    file_name: String,
    connection_name: String,
    remote_store_path: Option<String>,
    known_staging_store: Option<String>,
    known_staging_subdir: Option<String>,
}

pub async fn launch_file_copy(
    State(state): State<AppState>,
    RpcRequest(payload): RpcRequest,
) -> Result<Json<Value>, AppError> {
    authenticate(&state, &payload).await?;
    let req: LaunchFileCopy = serde_json::from_value(payload)?;
    let name = FileName::new(&req.file_name).map_err(LibrarianError::from)?;

    let staging_hint = match (req.known_staging_store, req.known_staging_subdir) {
        (None, None) => None,
        (store, subdir) => Some(format!(
            "{}:{}",
            store.unwrap_or_default(),
            subdir.unwrap_or_default()
        )),
    };

    let handle = state
        .replication
        .launch_direct_copy(
            &name,
            &req.connection_name,
            req.remote_store_path,
            staging_hint,
            TransportOptions::Direct,
        )
        .await?;

    Ok(ok(json!({ "task_id": handle.task_id.0.to_string() })))
}

#[derive(Deserialize)]
struct InitiateOffload {
    source_store_name: String,
    dest_store_name: String,
}

pub async fn initiate_offload(
    State(state): State<AppState>,
    RpcRequest(payload): RpcRequest,
) -> Result<Json<Value>, AppError> {
    authenticate(&state, &payload).await?;
    let req: InitiateOffload = serde_json::from_value(payload)?;

    let source = state.catalog.get_store_by_name(&req.source_store_name).await?;
    let dest = state.catalog.get_store_by_name(&req.dest_store_name).await?;
    let source_driver = state.stores.driver(source.id)?;
    let dest_driver = state.stores.driver(dest.id)?;

    let plan = plan_offload(state.catalog.as_ref(), source.id, dest.id, source_driver, dest_driver).await?;

    match plan {
        Err(LibrarianError::BadRequest(_)) => Ok(ok(json!({ "outcome": "store-shut-down" }))),
        Err(other) => Err(other.into()),
        Ok(task) => {
            let n = task.batch.len();
            state
                .tasks
                .submit(std::sync::Arc::new(task))
                .ok_or_else(|| LibrarianError::Internal("task manager is draining".into()))?;
            Ok(ok(json!({ "outcome": "task-launched", "n_instances": n })))
        }
    }
}

#[derive(Deserialize)]
struct RecommendedStore {
    file_size: i64,
}

pub async fn recommended_store(
    State(state): State<AppState>,
    RpcRequest(payload): RpcRequest,
) -> Result<Json<Value>, AppError> {
    authenticate(&state, &payload).await?;
    let req: RecommendedStore = serde_json::from_value(payload)?;
    let store = state.stores.recommended_store(req.file_size).await?;
    Ok(ok(json!({ "store_name": store.name })))
}
