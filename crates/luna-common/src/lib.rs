pub mod error;
pub mod message;
pub mod plan;
pub mod role;
pub mod types;

pub use error::{Error, Result};
pub use message::{Emotion, EmotionScore, MemoryKind, Message, MessageSender};
pub use plan::Plan;
pub use role::TeamRole;
pub use types::{CompanionId, ConversationId, MemoryId, TeamId, ToolId, UserId, WorkspaceId};
