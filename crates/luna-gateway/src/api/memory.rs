use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use luna_common::{CompanionId, ConversationId, Error, MemoryId, MemoryKind};
use luna_db::{Memory, MemoryFilter, NewMemory};
use luna_security::{Action, InputValidator, Usage, entitlements};
use serde::Deserialize;

use crate::api::owned_companion;
use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::state::SharedState;

const MAX_LIMIT: u32 = 100;

#[derive(Deserialize)]
pub struct MemoryQuery {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub min_importance: Option<u8>,
    pub limit: Option<u32>,
}

#[derive(Deserialize)]
pub struct CreateMemoryRequest {
    #[serde(rename = "type")]
    pub kind: String,
    pub content: String,
    pub importance: Option<u8>,
    pub conversation_id: Option<ConversationId>,
}

fn parse_kind(raw: &str) -> ApiResult<MemoryKind> {
    MemoryKind::parse(raw).ok_or_else(|| {
        ApiError::bad_request(format!(
            "unknown memory type '{raw}' (expected fact, preference, event or emotion)"
        ))
    })
}

/// GET /api/memory/{companion_id}
pub async fn list(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
    Path(companion_id): Path<CompanionId>,
    Query(query): Query<MemoryQuery>,
) -> ApiResult<Json<Vec<Memory>>> {
    let companion = owned_companion(&state, &user.id, &companion_id)?;
    let filter = MemoryFilter {
        kind: query.kind.as_deref().map(parse_kind).transpose()?,
        min_importance: query.min_importance,
        limit: Some(query.limit.unwrap_or(MAX_LIMIT).min(MAX_LIMIT)),
    };
    Ok(Json(state.db.list_memories(&companion.id, &filter)?))
}

/// POST /api/memory/{companion_id}
pub async fn create(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
    Path(companion_id): Path<CompanionId>,
    Json(body): Json<CreateMemoryRequest>,
) -> ApiResult<(StatusCode, Json<Memory>)> {
    let companion = owned_companion(&state, &user.id, &companion_id)?;
    let kind = parse_kind(&body.kind)?;
    let content = InputValidator::text("content", &body.content, 1_000)?;
    let importance = body.importance.unwrap_or(5);
    if !(1..=10).contains(&importance) {
        return Err(ApiError::bad_request("importance must be between 1 and 10"));
    }
    if let Some(conversation_id) = &body.conversation_id {
        let current = state.db.get_conversation(&user.id, &companion.id)?;
        if current.is_none_or(|c| &c.id != conversation_id) {
            return Err(ApiError::bad_request(
                "conversation_id does not belong to this companion",
            ));
        }
    }
    let plan = state.plan_of(&user.id)?;

    let memory = state.db.add_memory_guarded(
        NewMemory {
            companion_id: companion.id,
            user_id: user.id,
            kind,
            content,
            importance,
            conversation_id: body.conversation_id,
        },
        |memories| {
            let usage = Usage {
                memories,
                ..Usage::default()
            };
            entitlements::check(plan, Action::StoreMemory, &usage).map_err(Error::from)
        },
    )?;

    Ok((StatusCode::CREATED, Json(memory)))
}

/// DELETE /api/memory/{companion_id}/{memory_id}
pub async fn delete(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
    Path((companion_id, memory_id)): Path<(CompanionId, MemoryId)>,
) -> ApiResult<StatusCode> {
    let companion = owned_companion(&state, &user.id, &companion_id)?;
    state.db.delete_memory(&companion.id, &memory_id)?;
    Ok(StatusCode::NO_CONTENT)
}
