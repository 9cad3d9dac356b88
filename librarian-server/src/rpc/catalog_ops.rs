//! File/instance/event operations (§6): `ping`, `create_file_event`,
//! `locate_file_instance`, `set_one_file_deletion_policy`,
//! `delete_file_instances`, `delete_file_instances_matching_query`,
//! `register_instances`, `create_file_record`, `gather_file_record`.

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use librarian_core::catalog::{deletion, DeletionMode};
use librarian_core::search::{compile_for, EntityKind};
use librarian_core::LibrarianError;
use librarian_model::{Digest, File, FileEvent, FileInstance, FileName, StoreId};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;

use crate::auth::authenticate;
use crate::errors::AppError;
use crate::rpc::{ok, RpcRequest};
use crate::state::AppState;

pub async fn ping() -> Json<Value> {
    ok(json!({ "message": "hello" }))
}

#[derive(Deserialize)]
struct CreateFileEvent {
    file_name: String,
    #[serde(rename = "type")]
    event_type: String,
    payload: Value,
}

pub async fn create_file_event(
    State(state): State<AppState>,
    RpcRequest(payload): RpcRequest,
) -> Result<Json<Value>, AppError> {
    authenticate(&state, &payload).await?;
    let req: CreateFileEvent = serde_json::from_value(payload)?;
    let name = FileName::new(&req.file_name).map_err(LibrarianError::from)?;
    state
        .catalog
        .append_event(&FileEvent::new(name, Utc::now(), req.event_type, req.payload))
        .await?;
    Ok(ok(Value::Null))
}

#[derive(Deserialize)]
struct LocateFileInstance {
    file_name: String,
}

pub async fn locate_file_instance(
    State(state): State<AppState>,
    RpcRequest(payload): RpcRequest,
) -> Result<Json<Value>, AppError> {
    authenticate(&state, &payload).await?;
    let req: LocateFileInstance = serde_json::from_value(payload)?;
    let name = FileName::new(&req.file_name).map_err(LibrarianError::from)?;

    let instance = state
        .catalog
        .first_instance(&name)
        .await?
        .ok_or_else(|| LibrarianError::NotFound(format!("no instance of {name} found")))?;
    let store = state.catalog.get_store(instance.store_id).await?;

    Ok(ok(json!({
        "path": instance.store_path(),
        "store_name": store.name,
        "ssh_host": store.ssh_host,
    })))
}

#[derive(Deserialize)]
struct SetOneFileDeletionPolicy {
    file_name: String,
    deletion_policy: librarian_model::DeletionPolicy,
    restrict_to_store: Option<String>,
}

pub async fn set_one_file_deletion_policy(
    State(state): State<AppState>,
    RpcRequest(payload): RpcRequest,
) -> Result<Json<Value>, AppError> {
    authenticate(&state, &payload).await?;
    let req: SetOneFileDeletionPolicy = serde_json::from_value(payload)?;
    let name = FileName::new(&req.file_name).map_err(LibrarianError::from)?;
    let store_id = resolve_store_id(&state, req.restrict_to_store.as_deref()).await?;

    let updated = state
        .catalog
        .set_deletion_policy(&name, store_id, req.deletion_policy)
        .await?;
    if updated != 1 {
        return Err(LibrarianError::BadRequest(format!(
            "expected to mutate exactly one instance, matched {updated}"
        ))
        .into());
    }
    Ok(ok(Value::Null))
}

fn parse_mode(raw: Option<&str>) -> Result<DeletionMode, AppError> {
    match raw {
        None | Some("standard") => Ok(DeletionMode::Standard),
        Some("noop") => Ok(DeletionMode::Noop),
        Some(other) => Err(AppError::bad_request(format!("unknown deletion mode {other:?}"))),
    }
}

async fn resolve_store_id(state: &AppState, name: Option<&str>) -> Result<Option<StoreId>, LibrarianError> {
    match name {
        None => Ok(None),
        Some(name) => Ok(Some(state.catalog.get_store_by_name(name).await?.id)),
    }
}

#[derive(Deserialize)]
struct DeleteFileInstances {
    file_name: String,
    mode: Option<String>,
    restrict_to_store: Option<String>,
}

pub async fn delete_file_instances(
    State(state): State<AppState>,
    RpcRequest(payload): RpcRequest,
) -> Result<Json<Value>, AppError> {
    authenticate(&state, &payload).await?;
    let req: DeleteFileInstances = serde_json::from_value(payload)?;
    let name = FileName::new(&req.file_name).map_err(LibrarianError::from)?;
    let mode = parse_mode(req.mode.as_deref())?;
    let store_id = resolve_store_id(&state, req.restrict_to_store.as_deref()).await?;

    let removed = deletion::delete_instances(state.catalog.as_ref(), &name, mode, store_id).await?;
    Ok(ok(json!({ "n_deleted": removed })))
}

#[derive(Deserialize)]
struct DeleteFileInstancesMatchingQuery {
    query: String,
    mode: Option<String>,
    restrict_to_store: Option<String>,
}

pub async fn delete_file_instances_matching_query(
    State(state): State<AppState>,
    RpcRequest(payload): RpcRequest,
) -> Result<Json<Value>, AppError> {
    authenticate(&state, &payload).await?;
    let req: DeleteFileInstancesMatchingQuery = serde_json::from_value(payload)?;
    let mode = parse_mode(req.mode.as_deref())?;
    let store_id = resolve_store_id(&state, req.restrict_to_store.as_deref()).await?;

    let clause = compile_for(EntityKind::File, &req.query)?;
    let names = state.catalog.search_file_names(&clause).await?;

    let mut total = 0;
    for name in &names {
        total += deletion::delete_instances(state.catalog.as_ref(), name, mode, store_id).await?;
    }
    Ok(ok(json!({ "n_matched": names.len(), "n_deleted": total })))
}

#[derive(Deserialize)]
struct FileStat {
    size: i64,
    digest: String,
    #[serde(default)]
    file_type: Option<String>,
}

#[derive(Deserialize)]
struct RegisterInstances {
    store_name: String,
    file_info: HashMap<String, FileStat>,
}

pub async fn register_instances(
    State(state): State<AppState>,
    RpcRequest(payload): RpcRequest,
) -> Result<Json<Value>, AppError> {
    let source = authenticate(&state, &payload).await?;
    let req: RegisterInstances = serde_json::from_value(payload)?;
    let store = state.catalog.get_store_by_name(&req.store_name).await?;

    let mut created = 0;
    for (path, stat) in &req.file_info {
        let (parent_dirs, base_name) = match path.rsplit_once('/') {
            Some((dir, name)) => (dir.to_string(), name.to_string()),
            None => (String::new(), path.clone()),
        };
        let name = FileName::new(&base_name).map_err(LibrarianError::from)?;

        if !state.catalog.file_exists(&name).await? {
            let obsid = librarian_core::resolve_obsid(
                state.catalog.as_ref(),
                state.config.obsid_inference_mode,
                &base_name,
            )
            .await
            .ok();
            let file = File {
                name: name.clone(),
                file_type: stat.file_type.clone().unwrap_or_else(|| "unknown".into()),
                source: source.clone(),
                size: stat.size,
                digest: Digest::new(&stat.digest).map_err(LibrarianError::from)?,
                create_time: Utc::now(),
                obsid,
            };
            state.catalog.create_file(&file).await?;
        }

        let is_new = state
            .catalog
            .register_instance(&FileInstance {
                store_id: store.id,
                parent_dirs,
                name: name.clone(),
                deletion_policy: librarian_model::DeletionPolicy::Disallowed,
            })
            .await?;

        if is_new {
            created += 1;
            state
                .catalog
                .append_event(&FileEvent::new(
                    name,
                    Utc::now(),
                    librarian_model::event::event_type::INSTANCE_CREATION,
                    json!({ "store": store.name }),
                ))
                .await?;
        }
    }

    if created > 0 {
        state.replication.queue_check();
    }

    Ok(ok(json!({ "n_created": created })))
}

#[derive(Deserialize)]
struct CreateFileRecord {
    name: String,
    #[serde(rename = "type")]
    file_type: String,
    source: String,
    size: i64,
    digest: String,
    obsid: Option<i64>,
}

pub async fn create_file_record(
    State(state): State<AppState>,
    RpcRequest(payload): RpcRequest,
) -> Result<Json<Value>, AppError> {
    authenticate(&state, &payload).await?;
    let req: CreateFileRecord = serde_json::from_value(payload)?;
    let file = File {
        name: FileName::new(&req.name).map_err(LibrarianError::from)?,
        file_type: req.file_type,
        source: req.source,
        size: req.size,
        digest: Digest::new(&req.digest).map_err(LibrarianError::from)?,
        create_time: Utc::now(),
        obsid: req.obsid.map(librarian_model::ObsId),
    };
    state.catalog.create_file(&file).await?;
    Ok(ok(Value::Null))
}

#[derive(Deserialize)]
struct GatherFileRecord {
    file_name: String,
}

pub async fn gather_file_record(
    State(state): State<AppState>,
    RpcRequest(payload): RpcRequest,
) -> Result<Json<Value>, AppError> {
    authenticate(&state, &payload).await?;
    let req: GatherFileRecord = serde_json::from_value(payload)?;
    let name = FileName::new(&req.file_name).map_err(LibrarianError::from)?;
    let rec_info = state.catalog.gather_rec_info(&name).await?;
    Ok(ok(serde_json::to_value(rec_info)?))
}
