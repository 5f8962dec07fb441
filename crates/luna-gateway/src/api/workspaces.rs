use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use luna_common::{UserId, WorkspaceId};
use luna_db::{Companion, Workspace, WorkspaceUpdate};
use luna_security::InputValidator;
use serde::Deserialize;
use serde_json::json;

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::state::{AppState, SharedState};

#[derive(Deserialize)]
pub struct WorkspaceRequest {
    pub name: Option<String>,
    pub description: Option<String>,
}

fn owned_workspace(state: &AppState, owner: &UserId, id: &WorkspaceId) -> ApiResult<Workspace> {
    state
        .db
        .get_workspace(id)?
        .filter(|w| &w.owner_id == owner)
        .ok_or_else(|| ApiError::not_found("workspace not found"))
}

fn description(raw: Option<&str>) -> ApiResult<Option<String>> {
    Ok(raw
        .map(|d| InputValidator::text("description", d, 1_000))
        .transpose()?)
}

/// GET /api/workspaces
pub async fn list(State(state): State<SharedState>, AuthUser(user): AuthUser) -> ApiResult<Json<Vec<Workspace>>> {
    Ok(Json(state.db.list_workspaces(&user.id)?))
}

/// POST /api/workspaces
pub async fn create(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
    Json(body): Json<WorkspaceRequest>,
) -> ApiResult<(StatusCode, Json<Workspace>)> {
    let name = body
        .name
        .as_deref()
        .ok_or_else(|| ApiError::bad_request("name is required"))?;
    let name = InputValidator::name("name", name)?;
    let description = description(body.description.as_deref())?;

    let workspace = state
        .db
        .create_workspace(&user.id, &name, description.as_deref())?;
    Ok((StatusCode::CREATED, Json(workspace)))
}

/// GET /api/workspaces/{id}
pub async fn get(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
    Path(id): Path<WorkspaceId>,
) -> ApiResult<Json<Workspace>> {
    Ok(Json(owned_workspace(&state, &user.id, &id)?))
}

/// PATCH /api/workspaces/{id}
pub async fn update(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
    Path(id): Path<WorkspaceId>,
    Json(body): Json<WorkspaceRequest>,
) -> ApiResult<Json<Workspace>> {
    owned_workspace(&state, &user.id, &id)?;
    let name = body
        .name
        .as_deref()
        .map(|n| InputValidator::name("name", n))
        .transpose()?;
    let description = description(body.description.as_deref())?;

    Ok(Json(
        state
            .db
            .update_workspace(&id, WorkspaceUpdate { name, description })?,
    ))
}

/// DELETE /api/workspaces/{id}
///
/// Always removes the workspace's companions along with it.
pub async fn delete(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
    Path(id): Path<WorkspaceId>,
) -> ApiResult<Json<serde_json::Value>> {
    owned_workspace(&state, &user.id, &id)?;
    let removed = state.db.delete_workspace(&id)?;
    Ok(Json(json!({ "deleted": true, "companions_deleted": removed })))
}

/// GET /api/workspaces/{id}/companions
pub async fn companions(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
    Path(id): Path<WorkspaceId>,
) -> ApiResult<Json<Vec<Companion>>> {
    let workspace = owned_workspace(&state, &user.id, &id)?;
    Ok(Json(state.db.list_workspace_companions(&workspace.id)?))
}
