//! Observation/session operations (§4.1, §6): `create_or_update_observation`,
//! `assign_observing_sessions`, `describe_session_without_event`.

use axum::extract::State;
use axum::Json;
use librarian_core::catalog::sessions::assign_observing_sessions;
use librarian_model::{ObsId, Observation};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::authenticate;
use crate::errors::AppError;
use crate::rpc::{ok, RpcRequest};
use crate::state::AppState;

#[derive(Deserialize)]
struct CreateOrUpdateObservation {
    obsid: i64,
    start_time_jd: f64,
    stop_time_jd: Option<f64>,
    start_lst_hr: Option<f64>,
}

pub async fn create_or_update_observation(
    State(state): State<AppState>,
    RpcRequest(payload): RpcRequest,
) -> Result<Json<Value>, AppError> {
    authenticate(&state, &payload).await?;
    let req: CreateOrUpdateObservation = serde_json::from_value(payload)?;
    state
        .catalog
        .create_or_update_observation(&Observation {
            obsid: ObsId(req.obsid),
            start_time_jd: req.start_time_jd,
            stop_time_jd: req.stop_time_jd,
            start_lst_hr: req.start_lst_hr,
            session_id: None,
        })
        .await?;
    Ok(ok(Value::Null))
}

#[derive(Deserialize)]
struct AssignObservingSessions {
    minimum_start_jd: Option<f64>,
    maximum_start_jd: Option<f64>,
}

pub async fn assign_observing_sessions_op(
    State(state): State<AppState>,
    RpcRequest(payload): RpcRequest,
) -> Result<Json<Value>, AppError> {
    authenticate(&state, &payload).await?;
    let req: AssignObservingSessions = serde_json::from_value(payload)?;
    let n_assigned = assign_observing_sessions(
        state.catalog.as_ref(),
        req.minimum_start_jd,
        req.maximum_start_jd,
    )
    .await?;
    Ok(ok(json!({ "n_assigned": n_assigned })))
}

#[derive(Deserialize)]
struct DescribeSessionWithoutEvent {
    source: String,
    #[serde(rename = "type")]
    event_type: String,
}

pub async fn describe_session_without_event(
    State(state): State<AppState>,
    RpcRequest(payload): RpcRequest,
) -> Result<Json<Value>, AppError> {
    authenticate(&state, &payload).await?;
    let req: DescribeSessionWithoutEvent = serde_json::from_value(payload)?;
    let missing = state
        .catalog
        .describe_session_without_event(&req.source, &req.event_type)
        .await?;

    let files: Vec<Value> = missing
        .into_iter()
        .map(|m| {
            json!({
                "name": m.file.name.as_str(),
                "obsid": m.obsid.0,
            })
        })
        .collect();
    Ok(ok(json!({ "files": files })))
}
