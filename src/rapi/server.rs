//! RAPI (component J, SPEC_FULL.md §4, §6): maps HTTP verbs + paths to
//! opcode submissions via the job queue. Built on `axum`, documented
//! with `utoipa`, the way `api/rest/server.rs` wires up today.

use crate::jqueue::JobQueue;
use crate::rapi::auth::{extract_basic_auth, required_role_for, Role, UsersFile};
use axum::extract::{Path, State};
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use std::sync::Arc;
use utoipa::OpenApi;

#[derive(Clone)]
pub struct RapiState {
    pub queue: Arc<JobQueue>,
    pub users: Arc<UsersFile>,
}

#[derive(OpenApi)]
#[openapi(paths(submit_group_add, get_job))]
pub struct ApiDoc;

pub fn router(state: RapiState) -> Router {
    Router::new()
        .route("/2/groups", post(submit_group_add))
        .route("/2/groups/{name}/assign-nodes", post(submit_assign_nodes))
        .route("/2/groups/{name}", axum::routing::put(submit_group_set_params))
        .route("/2/jobs/{id}", get(get_job))
        .route("/2/info", get(cluster_info))
        .with_state(state)
}

async fn check_auth(state: &RapiState, headers: &axum::http::HeaderMap, method: &Method) -> Result<(), Response> {
    let Some((user, pass)) = extract_basic_auth(headers) else {
        return Err(StatusCode::UNAUTHORIZED.into_response());
    };
    let Some(role) = state.users.authenticate(&user, &pass) else {
        return Err(StatusCode::UNAUTHORIZED.into_response());
    };
    if required_role_for(method) == Role::Write && role != Role::Write {
        return Err(StatusCode::FORBIDDEN.into_response());
    }
    Ok(())
}

/// Submit `OpGroupAdd`. Every mutating call returns a job id
/// (SPEC_FULL.md §6).
#[utoipa::path(post, path = "/2/groups", responses((status = 202, body = u64)))]
async fn submit_group_add(
    State(state): State<RapiState>,
    headers: axum::http::HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> Response {
    if let Err(resp) = check_auth(&state, &headers, &Method::POST).await {
        return resp;
    }
    submit(&state.queue, "OP_GROUP_ADD", body)
}

async fn submit_assign_nodes(
    State(state): State<RapiState>,
    Path(name): Path<String>,
    headers: axum::http::HeaderMap,
    Json(mut body): Json<serde_json::Value>,
) -> Response {
    if let Err(resp) = check_auth(&state, &headers, &Method::POST).await {
        return resp;
    }
    body["group_name"] = serde_json::Value::String(name);
    submit(&state.queue, "OP_GROUP_ASSIGN_NODES", body)
}

async fn submit_group_set_params(
    State(state): State<RapiState>,
    Path(name): Path<String>,
    headers: axum::http::HeaderMap,
    Json(mut body): Json<serde_json::Value>,
) -> Response {
    if let Err(resp) = check_auth(&state, &headers, &Method::PUT).await {
        return resp;
    }
    body["group_name"] = serde_json::Value::String(name);
    submit(&state.queue, "OP_GROUP_SET_PARAMS", body)
}

fn submit(queue: &JobQueue, opcode_kind: &str, params: serde_json::Value) -> Response {
    let opcode = serde_json::json!({ "OP_CODE": opcode_kind, "params": params });
    match queue.submit(vec![opcode]) {
        Ok(id) => (StatusCode::ACCEPTED, Json(serde_json::json!(id))).into_response(),
        Err(e) => (StatusCode::SERVICE_UNAVAILABLE, Json(e.encode())).into_response(),
    }
}

#[utoipa::path(get, path = "/2/jobs/{id}", responses((status = 200, body = serde_json::Value)))]
async fn get_job(State(state): State<RapiState>, Path(id): Path<u64>) -> Response {
    match state.queue.get(id) {
        Some(job) => Json(serde_json::json!({
            "id": job.id,
            "status": job.overall_status(),
            "ops": job.ops,
        }))
        .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn cluster_info() -> Response {
    Json(serde_json::json!({ "protocol_version": 2 })).into_response()
}
