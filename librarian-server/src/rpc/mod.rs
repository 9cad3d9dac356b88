//! The RPC surface (§4.7, §6): one route per named operation, each taking
//! a JSON payload delivered under a `request` form field (POST) or query
//! parameter (GET), and returning `{success, message?, ...fields}` with
//! HTTP 200 on success and 400 on any business or authentication error.

pub mod catalog_ops;
pub mod replication_ops;
pub mod search_ops;
pub mod session_ops;

use std::collections::HashMap;

use axum::extract::{Form, FromRequest, FromRequestParts, Query, Request};
use axum::http::Method;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::Value;

use crate::errors::AppError;
use crate::state::AppState;

/// The decoded JSON body of a `request` field, regardless of whether it
/// arrived via a GET query string or a POST form body.
pub struct RpcRequest(pub Value);

impl<S> FromRequest<S> for RpcRequest
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let raw = if req.method() == Method::GET {
            let (mut parts, _body) = req.into_parts();
            let Query(params) = Query::<HashMap<String, String>>::from_request_parts(&mut parts, state)
                .await
                .map_err(|e| AppError::bad_request(format!("bad query string: {e}")))?;
            params.get("request").cloned()
        } else {
            let Form(params) = Form::<HashMap<String, String>>::from_request(req, state)
                .await
                .map_err(|e| AppError::bad_request(format!("bad form body: {e}")))?;
            params.get("request").cloned()
        };

        let raw = raw.ok_or_else(|| AppError::bad_request("missing `request` field"))?;
        Ok(RpcRequest(serde_json::from_str(&raw)?))
    }
}

/// Builds a success envelope: `{success: true, ...fields}`. `fields` must
/// serialize to a JSON object (or `null`, for operations with no payload).
pub fn ok(fields: Value) -> Json<Value> {
    let mut body = match fields {
        Value::Object(map) => map,
        Value::Null => serde_json::Map::new(),
        other => {
            let mut map = serde_json::Map::new();
            map.insert("value".into(), other);
            map
        }
    };
    body.insert("success".into(), Value::Bool(true));
    Json(Value::Object(body))
}

pub fn router(state: AppState) -> Router {
    use catalog_ops as c;
    use replication_ops as r;
    use search_ops as s;
    use session_ops as o;

    Router::new()
        .route("/api/v2/ping", get(c::ping).post(c::ping))
        .route("/api/v2/create_file_event", post(c::create_file_event))
        .route("/api/v2/locate_file_instance", post(c::locate_file_instance))
        .route(
            "/api/v2/set_one_file_deletion_policy",
            post(c::set_one_file_deletion_policy),
        )
        .route("/api/v2/delete_file_instances", post(c::delete_file_instances))
        .route(
            "/api/v2/delete_file_instances_matching_query",
            post(c::delete_file_instances_matching_query),
        )
        .route("/api/v2/register_instances", post(c::register_instances))
        .route("/api/v2/create_file_record", post(c::create_file_record))
        .route("/api/v2/gather_file_record", post(c::gather_file_record))
        .route("/api/v2/launch_file_copy", post(r::launch_file_copy))
        .route("/api/v2/initiate_offload", post(r::initiate_offload))
        .route("/api/v2/recommended_store", post(r::recommended_store))
        .route(
            "/api/v2/create_or_update_observation",
            post(o::create_or_update_observation),
        )
        .route(
            "/api/v2/assign_observing_sessions",
            post(o::assign_observing_sessions_op),
        )
        .route(
            "/api/v2/describe_session_without_event",
            post(o::describe_session_without_event),
        )
        .route("/api/v2/search", post(s::search))
        .with_state(state)
}
