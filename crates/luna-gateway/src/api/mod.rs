//! REST handlers, grouped by resource.

pub mod chat;
pub mod companions;
pub mod memory;
pub mod subscriptions;
pub mod teams;
pub mod tools;
pub mod users;
pub mod voice;
pub mod workspaces;

use luna_common::{CompanionId, UserId};
use luna_db::Companion;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Load a companion the caller owns. Companions owned by someone else are
/// reported as missing.
pub(crate) fn owned_companion(state: &AppState, owner: &UserId, id: &CompanionId) -> ApiResult<Companion> {
    state
        .db
        .get_companion(id)?
        .filter(|c| &c.owner_id == owner)
        .ok_or_else(|| ApiError::not_found("companion not found"))
}
