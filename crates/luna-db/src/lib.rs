pub mod companions;
pub mod conversations;
pub mod database;
pub mod memories;
pub mod migrations;
pub mod subscriptions;
pub mod teams;
pub mod tools;
pub mod users;
pub mod workspaces;

pub use companions::{
    AdvancedPersonality, Appearance, Companion, CompanionUpdate, NewCompanion, Personality,
};
pub use conversations::Conversation;
pub use database::Database;
pub use memories::{Memory, MemoryFilter, NewMemory};
pub use subscriptions::{Subscription, VoiceUsage};
pub use teams::{Team, TeamMember, TeamUpdate};
pub use tools::{NewTool, Tool, ToolUpdate};
pub use users::{NewUser, User, UserUpdate};
pub use workspaces::{Workspace, WorkspaceUpdate};
