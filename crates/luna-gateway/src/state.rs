use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Datelike, TimeZone, Utc};
use luna_brain::CompanionBrain;
use luna_common::{Error, Plan, Result, UserId};
use luna_config::AppConfig;
use luna_db::Database;
use luna_security::{PasswordHasher, PlanFeatures, TokenIssuer, Usage};
use serde::Serialize;
use tracing::info;

use crate::stripe::StripeClient;

/// Shared application state accessible from all request handlers.
pub struct AppState {
    pub config: AppConfig,
    pub db: Arc<Database>,
    pub brain: Arc<dyn CompanionBrain>,
    pub tokens: TokenIssuer,
    pub passwords: PasswordHasher,
    /// `None` when no Stripe secret key is configured.
    pub stripe: Option<StripeClient>,
    pub started_at: Instant,
}

pub type SharedState = Arc<AppState>;

/// A user's plan, what it grants, and how much of it is in use.
#[derive(Debug, Clone, Serialize)]
pub struct PlanStatus {
    pub plan: Plan,
    pub features: PlanFeatures,
    pub usage: Usage,
    pub period_start: DateTime<Utc>,
}

impl AppState {
    /// Expects a validated config: both JWT secrets must be present.
    pub fn new(config: AppConfig, db: Arc<Database>, brain: Arc<dyn CompanionBrain>) -> Result<Self> {
        let (Some(access), Some(refresh)) = (
            config.auth.jwt_secret.as_deref(),
            config.auth.jwt_refresh_secret.as_deref(),
        ) else {
            return Err(Error::Config("JWT secrets are not configured".into()));
        };

        let tokens = TokenIssuer::new(
            access,
            refresh,
            chrono::Duration::minutes(config.auth.access_token_ttl_minutes),
            chrono::Duration::days(config.auth.refresh_token_ttl_days),
        );
        let passwords = PasswordHasher::new(config.auth.password_iterations)?;

        let stripe = config
            .billing
            .stripe_secret_key
            .as_deref()
            .filter(|key| !key.is_empty())
            .map(|key| StripeClient::new(key, config.billing.stripe_api_base.clone()));
        if stripe.is_none() {
            info!("stripe is not configured, checkout and cancellation calls are disabled");
        }

        Ok(Self {
            config,
            db,
            brain,
            tokens,
            passwords,
            stripe,
            started_at: Instant::now(),
        })
    }

    pub fn plan_of(&self, user_id: &UserId) -> Result<Plan> {
        Ok(self.db.get_subscription(user_id)?.plan)
    }

    /// Current plan plus usage across the user's account. Voice usage covers
    /// the current calendar month.
    pub fn plan_status(&self, user_id: &UserId) -> Result<PlanStatus> {
        let plan = self.plan_of(user_id)?;
        let period_start = month_start(Utc::now());
        let voice_seconds = self.db.voice_seconds_since(user_id, period_start)?;
        Ok(PlanStatus {
            plan,
            features: PlanFeatures::for_plan(plan),
            usage: Usage {
                companions: self.db.count_companions(user_id)?,
                voice_minutes_used: seconds_to_minutes(voice_seconds),
                memories: self.db.count_user_memories(user_id)?,
            },
            period_start,
        })
    }
}

/// Midnight UTC on the first day of `now`'s month.
pub fn month_start(now: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
        .single()
        .unwrap_or(now)
}

/// Whole minutes, rounding any partial minute up.
pub fn seconds_to_minutes(seconds: u64) -> u32 {
    u32::try_from(seconds.div_ceil(60)).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::{month_start, seconds_to_minutes};
    use chrono::{TimeZone, Utc};

    #[test]
    fn month_start_is_first_midnight() {
        let now = Utc.with_ymd_and_hms(2025, 3, 17, 15, 4, 5).unwrap();
        assert_eq!(
            month_start(now),
            Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn partial_minutes_round_up() {
        assert_eq!(seconds_to_minutes(0), 0);
        assert_eq!(seconds_to_minutes(1), 1);
        assert_eq!(seconds_to_minutes(60), 1);
        assert_eq!(seconds_to_minutes(61), 2);
    }
}
