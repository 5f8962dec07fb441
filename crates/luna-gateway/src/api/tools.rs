use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use luna_common::{ToolId, UserId};
use luna_db::{NewTool, Tool, ToolUpdate};
use luna_security::InputValidator;
use serde::Deserialize;

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::state::{AppState, SharedState};

#[derive(Deserialize)]
pub struct CreateToolRequest {
    pub name: String,
    pub description: String,
    #[serde(default = "empty_schema")]
    pub parameters: serde_json::Value,
    pub handler_url: String,
}

#[derive(Deserialize)]
pub struct UpdateToolRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub parameters: Option<serde_json::Value>,
    pub handler_url: Option<String>,
}

fn empty_schema() -> serde_json::Value {
    serde_json::json!({ "type": "object", "properties": {} })
}

/// Function-calling parameters must be a JSON Schema object.
fn check_parameters(parameters: &serde_json::Value) -> ApiResult<()> {
    let is_object_schema = parameters
        .get("type")
        .and_then(|t| t.as_str())
        .is_some_and(|t| t == "object");
    if !is_object_schema {
        return Err(ApiError::bad_request(
            "parameters must be a JSON Schema with \"type\": \"object\"",
        ));
    }
    Ok(())
}

fn owned_tool(state: &AppState, owner: &UserId, id: &ToolId) -> ApiResult<Tool> {
    state
        .db
        .get_tool(id)?
        .filter(|t| &t.owner_id == owner)
        .ok_or_else(|| ApiError::not_found("tool not found"))
}

/// GET /api/tools
pub async fn list(State(state): State<SharedState>, AuthUser(user): AuthUser) -> ApiResult<Json<Vec<Tool>>> {
    Ok(Json(state.db.list_tools(&user.id)?))
}

/// POST /api/tools
pub async fn create(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
    Json(body): Json<CreateToolRequest>,
) -> ApiResult<(StatusCode, Json<Tool>)> {
    InputValidator::tool_name(&body.name)?;
    InputValidator::handler_url(&body.handler_url)?;
    let description = InputValidator::text("description", &body.description, 1_000)?;
    check_parameters(&body.parameters)?;

    let tool = state.db.create_tool(NewTool {
        owner_id: user.id,
        name: body.name,
        description,
        parameters: body.parameters,
        handler_url: body.handler_url,
    })?;
    Ok((StatusCode::CREATED, Json(tool)))
}

/// GET /api/tools/{id}
pub async fn get(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
    Path(id): Path<ToolId>,
) -> ApiResult<Json<Tool>> {
    Ok(Json(owned_tool(&state, &user.id, &id)?))
}

/// PATCH /api/tools/{id}
pub async fn update(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
    Path(id): Path<ToolId>,
    Json(body): Json<UpdateToolRequest>,
) -> ApiResult<Json<Tool>> {
    owned_tool(&state, &user.id, &id)?;
    if let Some(name) = &body.name {
        InputValidator::tool_name(name)?;
    }
    if let Some(url) = &body.handler_url {
        InputValidator::handler_url(url)?;
    }
    if let Some(parameters) = &body.parameters {
        check_parameters(parameters)?;
    }
    let description = body
        .description
        .as_deref()
        .map(|d| InputValidator::text("description", d, 1_000))
        .transpose()?;

    let tool = state.db.update_tool(
        &id,
        ToolUpdate {
            name: body.name,
            description,
            parameters: body.parameters,
            handler_url: body.handler_url,
        },
    )?;
    Ok(Json(tool))
}

/// DELETE /api/tools/{id}
pub async fn delete(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
    Path(id): Path<ToolId>,
) -> ApiResult<StatusCode> {
    owned_tool(&state, &user.id, &id)?;
    state.db.delete_tool(&id)?;
    Ok(StatusCode::NO_CONTENT)
}
