pub mod api;
pub mod auth;
pub mod bootstrap;
pub mod error;
pub mod router;
pub mod server;
pub mod state;
pub mod stripe;

pub use bootstrap::build_state;
pub use router::build_router;
pub use server::GatewayServer;
pub use state::{AppState, SharedState};
