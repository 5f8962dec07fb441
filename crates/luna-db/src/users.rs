use chrono::{DateTime, Utc};
use luna_common::{Error, Result, UserId};
use rusqlite::{OptionalExtension, params};
use serde::Serialize;
use tracing::info;

use crate::database::{Database, is_unique_violation, now_str, timestamp_column};

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub name: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insert shape for a new account. The email must already be normalized.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub name: String,
    pub password_hash: String,
}

#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    pub name: Option<String>,
    pub password_hash: Option<String>,
}

const USER_COLUMNS: &str = "id, email, name, password_hash, created_at, updated_at";

impl Database {
    /// Create an account together with its free subscription.
    pub fn create_user(&self, new: NewUser) -> Result<User> {
        let id = UserId::new();
        let now = now_str();

        self.transaction(|tx| {
            tx.execute(
                "INSERT INTO users (id, email, name, password_hash, created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?)",
                params![id.as_str(), new.email, new.name, new.password_hash, now, now],
            )
            .map_err(|e| {
                if is_unique_violation(&e) {
                    Error::Conflict("an account with this email already exists".into())
                } else {
                    Error::Database(format!("failed to insert user: {e}"))
                }
            })?;

            tx.execute(
                "INSERT INTO subscriptions (user_id, plan, updated_at) VALUES (?, 'free', ?)",
                params![id.as_str(), now],
            )
            .map_err(|e| Error::Database(format!("failed to insert subscription: {e}")))?;

            Ok(())
        })?;

        info!("created user {id}");
        self.get_user(&id)?
            .ok_or_else(|| Error::Database("user vanished after insert".into()))
    }

    pub fn get_user(&self, id: &UserId) -> Result<Option<User>> {
        let conn = self.connection()?;
        conn.query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"),
            params![id.as_str()],
            row_to_user,
        )
        .optional()
        .map_err(|e| Error::Database(format!("failed to load user: {e}")))
    }

    pub fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let conn = self.connection()?;
        conn.query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?"),
            params![email],
            row_to_user,
        )
        .optional()
        .map_err(|e| Error::Database(format!("failed to load user by email: {e}")))
    }

    pub fn update_user(&self, id: &UserId, update: UserUpdate) -> Result<User> {
        {
            let conn = self.connection()?;
            let changed = conn
                .execute(
                    "UPDATE users SET
                        name = COALESCE(?2, name),
                        password_hash = COALESCE(?3, password_hash),
                        updated_at = ?4
                     WHERE id = ?1",
                    params![id.as_str(), update.name, update.password_hash, now_str()],
                )
                .map_err(|e| Error::Database(format!("failed to update user: {e}")))?;
            if changed == 0 {
                return Err(Error::NotFound(format!("user {id}")));
            }
        }

        self.get_user(id)?
            .ok_or_else(|| Error::NotFound(format!("user {id}")))
    }

    /// Delete an account and everything it owns in one transaction.
    pub fn delete_user(&self, id: &UserId) -> Result<()> {
        self.transaction(|tx| {
            let deleted = tx
                .execute("DELETE FROM users WHERE id = ?", params![id.as_str()])
                .map_err(|e| Error::Database(format!("failed to delete user: {e}")))?;
            if deleted == 0 {
                return Err(Error::NotFound(format!("user {id}")));
            }
            Ok(())
        })?;

        info!("deleted user {id} and owned data");
        Ok(())
    }
}

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: UserId::from_raw(row.get::<_, String>(0)?),
        email: row.get(1)?,
        name: row.get(2)?,
        password_hash: row.get(3)?,
        created_at: timestamp_column(row, 4)?,
        updated_at: timestamp_column(row, 5)?,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::{NewUser, User, UserUpdate};
    use crate::Database;
    use luna_common::{Error, Plan};

    pub(crate) fn user(db: &Database, email: &str) -> User {
        db.create_user(NewUser {
            email: email.to_string(),
            name: "Test User".to_string(),
            password_hash: "hash".to_string(),
        })
        .expect("create user")
    }

    #[test]
    fn create_user_also_creates_free_subscription() {
        let db = Database::in_memory().unwrap();
        let alice = user(&db, "alice@example.com");

        let subscription = db.get_subscription(&alice.id).unwrap();
        assert_eq!(subscription.plan, Plan::Free);
        assert_eq!(
            db.find_user_by_email("alice@example.com")
                .unwrap()
                .unwrap()
                .id,
            alice.id
        );
    }

    #[test]
    fn duplicate_email_is_a_conflict() {
        let db = Database::in_memory().unwrap();
        user(&db, "alice@example.com");
        let err = db
            .create_user(NewUser {
                email: "alice@example.com".into(),
                name: "Other".into(),
                password_hash: "hash".into(),
            })
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[test]
    fn update_user_only_touches_given_fields() {
        let db = Database::in_memory().unwrap();
        let alice = user(&db, "alice@example.com");

        let updated = db
            .update_user(
                &alice.id,
                UserUpdate {
                    name: Some("Alice".into()),
                    password_hash: None,
                },
            )
            .unwrap();
        assert_eq!(updated.name, "Alice");
        assert_eq!(updated.password_hash, "hash");
    }

    #[test]
    fn password_hash_is_never_serialized() {
        let db = Database::in_memory().unwrap();
        let alice = user(&db, "alice@example.com");
        let json = serde_json::to_value(&alice).unwrap();
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["email"], "alice@example.com");
    }

    #[test]
    fn delete_missing_user_is_not_found() {
        let db = Database::in_memory().unwrap();
        let err = db
            .delete_user(&luna_common::UserId::from_raw("ghost"))
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
