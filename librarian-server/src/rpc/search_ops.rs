//! `search` (§4.3, §6): compiles the caller's query and either returns a
//! listing or, when `stage_user`/`stage_dest` are present, submits a
//! `StagerTask` against the matched files.

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use librarian_core::search::{compile_for, EntityKind};
use librarian_core::staging::{claim_destination, StageItem, StagerTask};
use librarian_core::LibrarianError;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::authenticate;
use crate::errors::AppError;
use crate::rpc::{ok, RpcRequest};
use crate::state::AppState;

#[derive(Deserialize)]
struct Search {
    search: String,
    #[serde(default = "default_output_format")]
    output_format: String,
    stage_user: Option<String>,
    stage_dest: Option<String>,
}

fn default_output_format() -> String {
    "file".to_string()
}

pub async fn search(
    State(state): State<AppState>,
    RpcRequest(payload): RpcRequest,
) -> Result<Json<Value>, AppError> {
    authenticate(&state, &payload).await?;
    let req: Search = serde_json::from_value(payload)?;
    let clause = compile_for(EntityKind::File, &req.search)?;

    if let (Some(user), Some(dest)) = (&req.stage_user, &req.stage_dest) {
        return stage(&state, &clause, user, dest).await;
    }

    match req.output_format.as_str() {
        "name" => {
            let names = state.catalog.search_file_names(&clause).await?;
            Ok(ok(json!({ "names": names.iter().map(|n| n.as_str()).collect::<Vec<_>>() })))
        }
        "file" => {
            let files = state.catalog.search_files(&clause).await?;
            Ok(ok(json!({ "files": files_to_json(&files) })))
        }
        other => Err(AppError::bad_request(format!("unknown output_format {other:?}"))),
    }
}

fn files_to_json(files: &[librarian_model::File]) -> Vec<Value> {
    files
        .iter()
        .map(|f| {
            json!({
                "name": f.name.as_str(),
                "type": f.file_type,
                "source": f.source,
                "size": f.size,
                "digest": f.digest.as_str(),
                "obsid": f.obsid.map(|o| o.0),
            })
        })
        .collect()
}

async fn stage(
    state: &AppState,
    clause: &librarian_core::search::Clause,
    user: &str,
    dest: &str,
) -> Result<Json<Value>, AppError> {
    let staging = state
        .config
        .local_disk_staging
        .as_ref()
        .ok_or_else(|| LibrarianError::BadRequest("no local_disk_staging configured".into()))?;

    let files = state.catalog.search_files(clause).await?;
    let mut items = Vec::with_capacity(files.len());
    for file in &files {
        let Some(instance) = state.catalog.first_instance(&file.name).await? else {
            continue;
        };
        let store = state.catalog.get_store(instance.store_id).await?;
        items.push(StageItem {
            store_prefix: PathBuf::from(store.path_prefix),
            parent_dirs: instance.parent_dirs,
            name: file.name.as_str().to_string(),
        });
    }
    if items.is_empty() {
        return Err(LibrarianError::NotFound("no instances available to stage".into()).into());
    }

    let dest_path = PathBuf::from(&staging.dest_prefix).join(dest);
    claim_destination(&dest_path)?;

    let task = Arc::new(StagerTask {
        dest: dest_path,
        items,
        user: user.to_string(),
        chown_command: staging.chown_command.split_whitespace().map(String::from).collect(),
    });
    let id = state
        .tasks
        .submit(task)
        .ok_or_else(|| LibrarianError::Internal("task manager is draining".into()))?;

    Ok(ok(json!({ "task_id": id.0.to_string() })))
}
