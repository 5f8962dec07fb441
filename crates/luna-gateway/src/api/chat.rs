use axum::Json;
use axum::extract::{Path, State};
use luna_brain::ReplyRequest;
use luna_common::{CompanionId, Error, Message, MessageSender};
use luna_db::{Memory, MemoryFilter, NewMemory};
use luna_security::{Action, InputValidator, Usage, entitlements};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use crate::api::owned_companion;
use crate::auth::AuthUser;
use crate::error::ApiResult;
use crate::state::SharedState;

const MAX_MESSAGE_CHARS: usize = 4_000;
/// How many of the most important memories are handed to the brain.
const RECALL_LIMIT: u32 = 10;

#[derive(Deserialize)]
pub struct SendMessageRequest {
    pub content: String,
    pub scenario: Option<String>,
}

#[derive(Serialize)]
pub struct SendMessageResponse {
    pub user_message: Message,
    pub reply: Message,
    pub memories_created: Vec<Memory>,
}

/// GET /api/chat/{companion_id}
pub async fn history(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
    Path(companion_id): Path<CompanionId>,
) -> ApiResult<Json<serde_json::Value>> {
    let companion = owned_companion(&state, &user.id, &companion_id)?;
    let body = match state.db.get_conversation(&user.id, &companion.id)? {
        Some(conversation) => serde_json::to_value(conversation).map_err(Error::from)?,
        None => json!({
            "id": null,
            "user_id": user.id,
            "companion_id": companion.id,
            "messages": [],
        }),
    };
    Ok(Json(body))
}

/// POST /api/chat/{companion_id}/messages
pub async fn send_message(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
    Path(companion_id): Path<CompanionId>,
    Json(body): Json<SendMessageRequest>,
) -> ApiResult<Json<SendMessageResponse>> {
    let companion = owned_companion(&state, &user.id, &companion_id)?;
    let content = InputValidator::text("content", &body.content, MAX_MESSAGE_CHARS)?;
    let plan = state.plan_of(&user.id)?;

    let scenario = match body.scenario.as_deref() {
        Some(s) => {
            entitlements::check(plan, Action::UseScenario, &Usage::default()).map_err(Error::from)?;
            Some(InputValidator::text("scenario", s, 500)?)
        }
        None => None,
    };

    let conversation = state.db.get_or_create_conversation(&user.id, &companion.id)?;
    let recalled = state.db.list_memories(
        &companion.id,
        &MemoryFilter {
            limit: Some(RECALL_LIMIT),
            ..MemoryFilter::default()
        },
    )?;

    let emotions = state.brain.analyze_emotions(&content);
    let reply_text = state
        .brain
        .reply(&ReplyRequest {
            companion: &companion,
            history: &conversation.messages,
            memories: &recalled,
            user_message: &content,
            emotions: &emotions,
            scenario: scenario.as_deref(),
        })
        .await?;

    let user_message = Message::new(MessageSender::User, content.clone()).with_emotions(emotions);
    let reply_emotions = state.brain.analyze_emotions(&reply_text);
    let reply = Message::new(MessageSender::Companion, reply_text).with_emotions(reply_emotions);
    state
        .db
        .append_messages(&conversation.id, &[user_message.clone(), reply.clone()])?;

    let mut memories_created = Vec::new();
    for candidate in state.brain.extract_memories(&content) {
        let stored = state.db.add_memory_guarded(
            NewMemory {
                companion_id: companion.id.clone(),
                user_id: user.id.clone(),
                kind: candidate.kind,
                content: candidate.content,
                importance: candidate.importance,
                conversation_id: Some(conversation.id.clone()),
            },
            |memories| {
                let usage = Usage {
                    memories,
                    ..Usage::default()
                };
                entitlements::check(plan, Action::StoreMemory, &usage).map_err(Error::from)
            },
        );
        match stored {
            Ok(memory) => memories_created.push(memory),
            Err(Error::Forbidden(reason)) => {
                warn!("skipping memory for companion {}: {reason}", companion.id);
                break;
            }
            // The turn is already stored; a failed memory must not fail it.
            Err(e) => warn!("failed to store memory for companion {}: {e}", companion.id),
        }
    }
    debug!(
        "chat turn for companion {} stored {} memories",
        companion.id,
        memories_created.len()
    );

    Ok(Json(SendMessageResponse {
        user_message,
        reply,
        memories_created,
    }))
}

/// DELETE /api/chat/{companion_id}
pub async fn clear(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
    Path(companion_id): Path<CompanionId>,
) -> ApiResult<Json<serde_json::Value>> {
    let companion = owned_companion(&state, &user.id, &companion_id)?;
    let cleared = match state.db.get_conversation(&user.id, &companion.id)? {
        Some(conversation) => state.db.clear_conversation(&conversation.id)?,
        None => 0,
    };
    Ok(Json(json!({ "cleared": cleared })))
}
