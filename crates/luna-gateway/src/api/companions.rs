use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use luna_common::{CompanionId, Error, Plan, UserId, WorkspaceId};
use luna_db::{Appearance, Companion, CompanionUpdate, NewCompanion, Personality};
use luna_security::{Action, InputValidator, Usage, entitlements};
use serde::Deserialize;

use crate::api::owned_companion;
use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::state::{AppState, SharedState};

#[derive(Deserialize)]
pub struct CreateCompanionRequest {
    pub name: String,
    #[serde(default)]
    pub personality: Personality,
    #[serde(default)]
    pub appearance: Appearance,
    pub config: Option<serde_json::Value>,
    pub voice: Option<String>,
    pub workspace_id: Option<WorkspaceId>,
}

/// Absent fields are left unchanged. `voice` and `workspace_id` accept
/// `null` to clear them.
#[derive(Deserialize)]
pub struct UpdateCompanionRequest {
    pub name: Option<String>,
    pub personality: Option<Personality>,
    pub appearance: Option<Appearance>,
    pub config: Option<serde_json::Value>,
    #[serde(default, deserialize_with = "nullable")]
    pub voice: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub workspace_id: Option<Option<WorkspaceId>>,
}

/// Distinguish an explicit `null` (`Some(None)`) from an absent field (`None`).
fn nullable<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: serde::Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Plan gates that depend only on what the companion looks like.
fn check_persona(plan: Plan, personality: Option<&Personality>, appearance: Option<&Appearance>) -> ApiResult<()> {
    if let Some(advanced) = personality.and_then(|p| p.advanced) {
        entitlements::check(plan, Action::UseAdvancedPersonality, &Usage::default()).map_err(Error::from)?;
        advanced.validate()?;
    }
    if appearance.is_some_and(|a| a.uses_exclusive_avatar()) {
        entitlements::check(plan, Action::UseExclusiveAvatar, &Usage::default()).map_err(Error::from)?;
    }
    Ok(())
}

fn check_workspace(state: &AppState, owner: &UserId, workspace_id: Option<&WorkspaceId>) -> ApiResult<()> {
    if let Some(id) = workspace_id {
        state
            .db
            .get_workspace(id)?
            .filter(|w| &w.owner_id == owner)
            .ok_or_else(|| ApiError::not_found("workspace not found"))?;
    }
    Ok(())
}

fn check_config(config: Option<&serde_json::Value>) -> ApiResult<()> {
    if config.is_some_and(|c| !c.is_object()) {
        return Err(ApiError::bad_request("config must be a JSON object"));
    }
    Ok(())
}

/// GET /api/companions
pub async fn list(State(state): State<SharedState>, AuthUser(user): AuthUser) -> ApiResult<Json<Vec<Companion>>> {
    Ok(Json(state.db.list_companions(&user.id)?))
}

/// POST /api/companions
pub async fn create(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
    Json(body): Json<CreateCompanionRequest>,
) -> ApiResult<(StatusCode, Json<Companion>)> {
    let name = InputValidator::name("name", &body.name)?;
    check_config(body.config.as_ref())?;
    let plan = state.plan_of(&user.id)?;
    check_persona(plan, Some(&body.personality), Some(&body.appearance))?;
    check_workspace(&state, &user.id, body.workspace_id.as_ref())?;

    let companion = state.db.create_companion_guarded(
        NewCompanion {
            owner_id: user.id.clone(),
            workspace_id: body.workspace_id,
            name,
            personality: body.personality,
            appearance: body.appearance,
            config: body.config.unwrap_or_else(|| serde_json::json!({})),
            voice: body.voice,
        },
        |companions| {
            let usage = Usage {
                companions,
                ..Usage::default()
            };
            entitlements::check(plan, Action::CreateCompanion, &usage).map_err(Error::from)
        },
    )?;

    Ok((StatusCode::CREATED, Json(companion)))
}

/// GET /api/companions/{id}
pub async fn get(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
    Path(id): Path<CompanionId>,
) -> ApiResult<Json<Companion>> {
    Ok(Json(owned_companion(&state, &user.id, &id)?))
}

/// PATCH /api/companions/{id}
pub async fn update(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
    Path(id): Path<CompanionId>,
    Json(body): Json<UpdateCompanionRequest>,
) -> ApiResult<Json<Companion>> {
    owned_companion(&state, &user.id, &id)?;

    let name = body
        .name
        .as_deref()
        .map(|n| InputValidator::name("name", n))
        .transpose()?;
    check_config(body.config.as_ref())?;
    let plan = state.plan_of(&user.id)?;
    check_persona(plan, body.personality.as_ref(), body.appearance.as_ref())?;
    if let Some(workspace_id) = &body.workspace_id {
        check_workspace(&state, &user.id, workspace_id.as_ref())?;
    }

    let updated = state.db.update_companion(
        &id,
        CompanionUpdate {
            name,
            personality: body.personality,
            appearance: body.appearance,
            config: body.config,
            voice: body.voice,
            workspace_id: body.workspace_id,
        },
    )?;
    Ok(Json(updated))
}

/// DELETE /api/companions/{id}
pub async fn delete(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
    Path(id): Path<CompanionId>,
) -> ApiResult<StatusCode> {
    owned_companion(&state, &user.id, &id)?;
    state.db.delete_companion(&id)?;
    Ok(StatusCode::NO_CONTENT)
}
