pub mod entitlements;
pub mod password;
pub mod roles;
pub mod tokens;
pub mod validation;
pub mod webhook;

pub use entitlements::{Action, Denial, PlanFeatures, Usage};
pub use password::PasswordHasher;
pub use roles::{ensure_not_creator, require_role, resolve_team_role};
pub use tokens::{Claims, TokenIssuer, TokenKind, TokenPair};
pub use validation::InputValidator;
pub use webhook::{sign_stripe_payload, verify_stripe_signature};
