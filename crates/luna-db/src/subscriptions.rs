use chrono::{DateTime, Utc};
use luna_common::{CompanionId, Error, Plan, Result, UserId};
use rusqlite::{OptionalExtension, params};
use serde::Serialize;
use tracing::info;

use crate::database::{Database, conversion_error, now_str, timestamp_column, ts};

#[derive(Debug, Clone, Serialize)]
pub struct Subscription {
    pub user_id: UserId,
    pub plan: Plan,
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VoiceUsage {
    pub id: String,
    pub user_id: UserId,
    pub companion_id: Option<CompanionId>,
    pub seconds: u32,
    pub characters: u32,
    pub created_at: DateTime<Utc>,
}

impl Database {
    pub fn get_subscription(&self, user_id: &UserId) -> Result<Subscription> {
        let conn = self.connection()?;
        conn.query_row(
            "SELECT user_id, plan, stripe_customer_id, stripe_subscription_id, updated_at
             FROM subscriptions WHERE user_id = ?",
            params![user_id.as_str()],
            row_to_subscription,
        )
        .optional()
        .map_err(|e| Error::Database(format!("failed to load subscription: {e}")))?
        .ok_or_else(|| Error::NotFound(format!("subscription for user {user_id}")))
    }

    /// Change the plan. Limits are derived from the plan on read, so nothing
    /// else needs to be recomputed here.
    pub fn set_plan(&self, user_id: &UserId, plan: Plan) -> Result<Subscription> {
        {
            let conn = self.connection()?;
            let changed = conn
                .execute(
                    "UPDATE subscriptions SET plan = ?, updated_at = ? WHERE user_id = ?",
                    params![plan.as_str(), now_str(), user_id.as_str()],
                )
                .map_err(|e| Error::Database(format!("failed to update plan: {e}")))?;
            if changed == 0 {
                return Err(Error::NotFound(format!("subscription for user {user_id}")));
            }
        }
        info!("user {user_id} is now on the {plan} plan");
        self.get_subscription(user_id)
    }

    pub fn set_stripe_ids(
        &self,
        user_id: &UserId,
        customer_id: Option<&str>,
        subscription_id: Option<&str>,
    ) -> Result<()> {
        let conn = self.connection()?;
        conn.execute(
            "UPDATE subscriptions SET
                stripe_customer_id = COALESCE(?2, stripe_customer_id),
                stripe_subscription_id = ?3,
                updated_at = ?4
             WHERE user_id = ?1",
            params![user_id.as_str(), customer_id, subscription_id, now_str()],
        )
        .map_err(|e| Error::Database(format!("failed to store stripe ids: {e}")))?;
        Ok(())
    }

    pub fn find_user_by_stripe_customer(&self, customer_id: &str) -> Result<Option<UserId>> {
        let conn = self.connection()?;
        conn.query_row(
            "SELECT user_id FROM subscriptions WHERE stripe_customer_id = ?",
            params![customer_id],
            |row| row.get::<_, String>(0),
        )
        .optional()
        .map(|id| id.map(UserId::from_raw))
        .map_err(|e| Error::Database(format!("failed to look up stripe customer: {e}")))
    }

    pub fn voice_seconds_since(&self, user_id: &UserId, since: DateTime<Utc>) -> Result<u64> {
        let conn = self.connection()?;
        voice_seconds_since(&conn, user_id, since)
    }

    /// Record voice usage after `guard` accepts the seconds already used
    /// since `since`. The read and the insert happen in one transaction.
    pub fn record_voice_usage_guarded(
        &self,
        user_id: &UserId,
        companion_id: Option<&CompanionId>,
        seconds: u32,
        characters: u32,
        since: DateTime<Utc>,
        guard: impl FnOnce(u64) -> Result<()>,
    ) -> Result<VoiceUsage> {
        let usage = VoiceUsage {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.clone(),
            companion_id: companion_id.cloned(),
            seconds,
            characters,
            created_at: Utc::now(),
        };

        self.transaction(|tx| {
            guard(voice_seconds_since(tx, user_id, since)?)?;
            tx.execute(
                "INSERT INTO voice_usage (id, user_id, companion_id, seconds, characters, created_at)
                 VALUES (?, ?, ?, ?, ?, ?)",
                params![
                    usage.id,
                    user_id.as_str(),
                    companion_id.map(|c| c.as_str()),
                    seconds,
                    characters,
                    ts(usage.created_at),
                ],
            )
            .map_err(|e| Error::Database(format!("failed to record voice usage: {e}")))?;
            Ok(())
        })?;

        Ok(usage)
    }
}

fn voice_seconds_since(
    conn: &rusqlite::Connection,
    user_id: &UserId,
    since: DateTime<Utc>,
) -> Result<u64> {
    conn.query_row(
        "SELECT COALESCE(SUM(seconds), 0) FROM voice_usage WHERE user_id = ? AND created_at >= ?",
        params![user_id.as_str(), ts(since)],
        |row| row.get::<_, i64>(0),
    )
    .map(|total| total.max(0) as u64)
    .map_err(|e| Error::Database(format!("failed to sum voice usage: {e}")))
}

fn row_to_subscription(row: &rusqlite::Row<'_>) -> rusqlite::Result<Subscription> {
    let plan: String = row.get(1)?;
    Ok(Subscription {
        user_id: UserId::from_raw(row.get::<_, String>(0)?),
        plan: plan.parse().map_err(conversion_error)?,
        stripe_customer_id: row.get(2)?,
        stripe_subscription_id: row.get(3)?,
        updated_at: timestamp_column(row, 4)?,
    })
}
