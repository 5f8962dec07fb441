use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use luna_common::{TeamId, TeamRole, UserId};
use luna_db::{Team, TeamUpdate};
use luna_security::{InputValidator, ensure_not_creator, require_role, resolve_team_role};
use serde::{Deserialize, Serialize};

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::state::{AppState, SharedState};

#[derive(Deserialize)]
pub struct CreateTeamRequest {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Deserialize)]
pub struct UpdateTeamRequest {
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Deserialize)]
pub struct AddMemberRequest {
    pub email: String,
    pub role: TeamRole,
}

#[derive(Deserialize)]
pub struct UpdateMemberRequest {
    pub role: TeamRole,
}

#[derive(Serialize)]
pub struct TeamView {
    #[serde(flatten)]
    pub team: Team,
    /// The caller's effective role.
    pub role: TeamRole,
}

#[derive(Serialize)]
pub struct MemberView {
    pub user_id: UserId,
    pub email: String,
    pub name: String,
    pub role: TeamRole,
    pub joined_at: DateTime<Utc>,
}

/// Load a team and the caller's role in it, requiring at least `needed`.
/// Outsiders get a 404 so team ids cannot be probed.
fn team_with_role(state: &AppState, id: &TeamId, user: &UserId, needed: TeamRole) -> ApiResult<(Team, TeamRole)> {
    let team = state
        .db
        .get_team(id)?
        .ok_or_else(|| ApiError::not_found("team not found"))?;
    let membership = state.db.get_membership(&team.id, user)?;
    let role = require_role(resolve_team_role(&team.creator_id, membership, user), needed)?;
    Ok((team, role))
}

/// Everyone in the team: the creator as owner first, then stored members.
fn roster(state: &AppState, team: &Team) -> ApiResult<Vec<MemberView>> {
    let mut members = Vec::new();
    if let Some(owner) = state.db.get_user(&team.creator_id)? {
        members.push(MemberView {
            user_id: owner.id,
            email: owner.email,
            name: owner.name,
            role: TeamRole::Owner,
            joined_at: team.created_at,
        });
    }
    members.extend(state.db.list_members(&team.id)?.into_iter().map(|m| MemberView {
        user_id: m.user_id,
        email: m.email,
        name: m.name,
        role: m.role,
        joined_at: m.joined_at,
    }));
    Ok(members)
}

/// GET /api/teams
pub async fn list(State(state): State<SharedState>, AuthUser(user): AuthUser) -> ApiResult<Json<Vec<TeamView>>> {
    let mut views = Vec::new();
    for team in state.db.list_teams_for_user(&user.id)? {
        let membership = state.db.get_membership(&team.id, &user.id)?;
        if let Some(role) = resolve_team_role(&team.creator_id, membership, &user.id) {
            views.push(TeamView { team, role });
        }
    }
    Ok(Json(views))
}

/// POST /api/teams
pub async fn create(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
    Json(body): Json<CreateTeamRequest>,
) -> ApiResult<(StatusCode, Json<TeamView>)> {
    let name = InputValidator::name("name", &body.name)?;
    let description = body
        .description
        .as_deref()
        .map(|d| InputValidator::text("description", d, 1_000))
        .transpose()?;

    let team = state.db.create_team(&user.id, &name, description.as_deref())?;
    Ok((
        StatusCode::CREATED,
        Json(TeamView {
            team,
            role: TeamRole::Owner,
        }),
    ))
}

/// GET /api/teams/{id}
pub async fn get(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
    Path(id): Path<TeamId>,
) -> ApiResult<Json<serde_json::Value>> {
    let (team, role) = team_with_role(&state, &id, &user.id, TeamRole::Viewer)?;
    let members = roster(&state, &team)?;
    Ok(Json(serde_json::json!({
        "team": team,
        "role": role,
        "permissions": {
            "edit": role.can_edit(),
            "manage_members": role.can_manage_members(),
            "delete_team": role.can_delete_team(),
        },
        "members": members,
    })))
}

/// PATCH /api/teams/{id}
pub async fn update(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
    Path(id): Path<TeamId>,
    Json(body): Json<UpdateTeamRequest>,
) -> ApiResult<Json<TeamView>> {
    let (_, role) = team_with_role(&state, &id, &user.id, TeamRole::Admin)?;
    let name = body
        .name
        .as_deref()
        .map(|n| InputValidator::name("name", n))
        .transpose()?;
    let description = body
        .description
        .as_deref()
        .map(|d| InputValidator::text("description", d, 1_000))
        .transpose()?;

    let team = state.db.update_team(&id, TeamUpdate { name, description })?;
    Ok(Json(TeamView { team, role }))
}

/// DELETE /api/teams/{id}
pub async fn delete(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
    Path(id): Path<TeamId>,
) -> ApiResult<StatusCode> {
    team_with_role(&state, &id, &user.id, TeamRole::Owner)?;
    state.db.delete_team(&id)?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/teams/{id}/members
pub async fn list_members(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
    Path(id): Path<TeamId>,
) -> ApiResult<Json<Vec<MemberView>>> {
    let (team, _) = team_with_role(&state, &id, &user.id, TeamRole::Viewer)?;
    Ok(Json(roster(&state, &team)?))
}

/// POST /api/teams/{id}/members
pub async fn add_member(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
    Path(id): Path<TeamId>,
    Json(body): Json<AddMemberRequest>,
) -> ApiResult<(StatusCode, Json<Vec<MemberView>>)> {
    let (team, _) = team_with_role(&state, &id, &user.id, TeamRole::Admin)?;
    let email = InputValidator::email(&body.email)?;
    let target = state
        .db
        .find_user_by_email(&email)?
        .ok_or_else(|| ApiError::not_found("no user with that email"))?;

    ensure_not_creator(&team.creator_id, &target.id)?;
    state.db.add_member(&team.id, &target.id, body.role)?;
    Ok((StatusCode::CREATED, Json(roster(&state, &team)?)))
}

/// PATCH /api/teams/{id}/members/{user_id}
pub async fn update_member(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
    Path((id, member_id)): Path<(TeamId, UserId)>,
    Json(body): Json<UpdateMemberRequest>,
) -> ApiResult<Json<Vec<MemberView>>> {
    let (team, _) = team_with_role(&state, &id, &user.id, TeamRole::Admin)?;
    ensure_not_creator(&team.creator_id, &member_id)?;
    state.db.update_member_role(&team.id, &member_id, body.role)?;
    Ok(Json(roster(&state, &team)?))
}

/// DELETE /api/teams/{id}/members/{user_id}
///
/// Admins may remove anyone but the owner; any member may remove themselves.
pub async fn remove_member(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
    Path((id, member_id)): Path<(TeamId, UserId)>,
) -> ApiResult<StatusCode> {
    let needed = if member_id == user.id {
        TeamRole::Viewer
    } else {
        TeamRole::Admin
    };
    let (team, _) = team_with_role(&state, &id, &user.id, needed)?;
    ensure_not_creator(&team.creator_id, &member_id)?;
    state.db.remove_member(&team.id, &member_id)?;
    Ok(StatusCode::NO_CONTENT)
}
