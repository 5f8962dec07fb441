use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use luna_common::{CompanionId, Error, Plan};
use luna_db::VoiceUsage;
use luna_security::{Action, InputValidator, PlanFeatures, Usage, entitlements};
use serde::{Deserialize, Serialize};

use crate::api::owned_companion;
use crate::auth::AuthUser;
use crate::error::ApiResult;
use crate::state::{SharedState, month_start, seconds_to_minutes};

const WORDS_PER_MINUTE: u64 = 150;
const MAX_VOICE_CHARS: usize = 5_000;

#[derive(Deserialize)]
pub struct VoiceRequest {
    pub text: String,
}

#[derive(Serialize)]
pub struct VoiceResponse {
    pub usage: VoiceUsage,
    pub voice: Option<String>,
    pub minutes_used: u32,
    pub minutes_limit: u32,
}

#[derive(Serialize)]
pub struct VoiceUsageResponse {
    pub plan: Plan,
    pub period_start: DateTime<Utc>,
    pub seconds_used: u64,
    pub minutes_used: u32,
    pub minutes_limit: u32,
}

/// Spoken length of `text` at a conversational pace, never below one second.
pub fn estimate_seconds(text: &str) -> u32 {
    let words = text.split_whitespace().count() as u64;
    let seconds = (words * 60).div_ceil(WORDS_PER_MINUTE).max(1);
    u32::try_from(seconds).unwrap_or(u32::MAX)
}

/// POST /api/voice/{companion_id}
///
/// Meters a synthesis request against the month's allowance and records it.
pub async fn synthesize(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
    Path(companion_id): Path<CompanionId>,
    Json(body): Json<VoiceRequest>,
) -> ApiResult<(StatusCode, Json<VoiceResponse>)> {
    let companion = owned_companion(&state, &user.id, &companion_id)?;
    let text = InputValidator::text("text", &body.text, MAX_VOICE_CHARS)?;
    let plan = state.plan_of(&user.id)?;
    let seconds = estimate_seconds(&text);
    let minutes = seconds_to_minutes(u64::from(seconds));
    let since = month_start(Utc::now());

    let usage = state.db.record_voice_usage_guarded(
        &user.id,
        Some(&companion.id),
        seconds,
        u32::try_from(text.chars().count()).unwrap_or(u32::MAX),
        since,
        |used_seconds| {
            let usage = Usage {
                voice_minutes_used: seconds_to_minutes(used_seconds),
                ..Usage::default()
            };
            entitlements::check(plan, Action::UseVoice { minutes }, &usage).map_err(Error::from)
        },
    )?;

    let used = state.db.voice_seconds_since(&user.id, since)?;
    Ok((
        StatusCode::CREATED,
        Json(VoiceResponse {
            usage,
            voice: companion.voice,
            minutes_used: seconds_to_minutes(used),
            minutes_limit: PlanFeatures::for_plan(plan).voice_minutes_per_month,
        }),
    ))
}

/// GET /api/voice/usage
pub async fn usage(State(state): State<SharedState>, AuthUser(user): AuthUser) -> ApiResult<Json<VoiceUsageResponse>> {
    let plan = state.plan_of(&user.id)?;
    let period_start = month_start(Utc::now());
    let seconds_used = state.db.voice_seconds_since(&user.id, period_start)?;
    Ok(Json(VoiceUsageResponse {
        plan,
        period_start,
        seconds_used,
        minutes_used: seconds_to_minutes(seconds_used),
        minutes_limit: PlanFeatures::for_plan(plan).voice_minutes_per_month,
    }))
}
