use chrono::{DateTime, Utc};
use luna_common::{CompanionId, Error, Result, UserId, WorkspaceId};
use rusqlite::{OptionalExtension, params};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::database::{Database, json_column, now_str, timestamp_column, to_json};

/// Avatars under this prefix are reserved for plans with exclusive avatars.
pub const EXCLUSIVE_AVATAR_PREFIX: &str = "exclusive/";

/// A user-owned chat persona. "Agents" grouped in a workspace are companions
/// with a `workspace_id`.
#[derive(Debug, Clone, Serialize)]
pub struct Companion {
    pub id: CompanionId,
    pub owner_id: UserId,
    pub workspace_id: Option<WorkspaceId>,
    pub name: String,
    pub personality: Personality,
    pub appearance: Appearance,
    pub config: serde_json::Value,
    pub voice: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Personality {
    #[serde(default)]
    pub traits: Vec<String>,
    #[serde(default)]
    pub tone: Option<String>,
    #[serde(default)]
    pub backstory: Option<String>,
    /// Fine-grained tuning, only available on plans with advanced personality.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub advanced: Option<AdvancedPersonality>,
}

/// Each dial ranges over `0..=100`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvancedPersonality {
    pub empathy: u8,
    pub humor: u8,
    pub formality: u8,
    pub curiosity: u8,
}

impl AdvancedPersonality {
    pub fn validate(&self) -> Result<()> {
        let dials = [
            ("empathy", self.empathy),
            ("humor", self.humor),
            ("formality", self.formality),
            ("curiosity", self.curiosity),
        ];
        for (name, value) in dials {
            if value > 100 {
                return Err(Error::Validation(format!(
                    "personality.advanced.{name} must be between 0 and 100"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Appearance {
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Appearance {
    pub fn uses_exclusive_avatar(&self) -> bool {
        self.avatar
            .as_deref()
            .is_some_and(|a| a.starts_with(EXCLUSIVE_AVATAR_PREFIX))
    }
}

#[derive(Debug, Clone)]
pub struct NewCompanion {
    pub owner_id: UserId,
    pub workspace_id: Option<WorkspaceId>,
    pub name: String,
    pub personality: Personality,
    pub appearance: Appearance,
    pub config: serde_json::Value,
    pub voice: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct CompanionUpdate {
    pub name: Option<String>,
    pub personality: Option<Personality>,
    pub appearance: Option<Appearance>,
    pub config: Option<serde_json::Value>,
    pub voice: Option<Option<String>>,
    pub workspace_id: Option<Option<WorkspaceId>>,
}

const COMPANION_COLUMNS: &str = "id, owner_id, workspace_id, name, personality, appearance, config, voice, created_at, updated_at";

impl Database {
    /// Insert a companion once `guard` accepts the owner's current companion
    /// count. Count and insert share one transaction.
    pub fn create_companion_guarded(
        &self,
        new: NewCompanion,
        guard: impl FnOnce(u32) -> Result<()>,
    ) -> Result<Companion> {
        let id = CompanionId::new();
        let now = now_str();
        let personality = to_json(&new.personality)?;
        let appearance = to_json(&new.appearance)?;
        let config = to_json(&new.config)?;

        self.transaction(|tx| {
            guard(count_companions(tx, &new.owner_id)?)?;
            tx.execute(
                &format!(
                    "INSERT INTO companions ({COMPANION_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
                ),
                params![
                    id.as_str(),
                    new.owner_id.as_str(),
                    new.workspace_id.as_ref().map(|w| w.as_str()),
                    new.name,
                    personality,
                    appearance,
                    config,
                    new.voice,
                    now,
                    now,
                ],
            )
            .map_err(|e| Error::Database(format!("failed to insert companion: {e}")))?;
            Ok(())
        })?;

        info!("user {} created companion {id}", new.owner_id);
        self.get_companion(&id)?
            .ok_or_else(|| Error::Database("companion vanished after insert".into()))
    }

    pub fn get_companion(&self, id: &CompanionId) -> Result<Option<Companion>> {
        let conn = self.connection()?;
        conn.query_row(
            &format!("SELECT {COMPANION_COLUMNS} FROM companions WHERE id = ?"),
            params![id.as_str()],
            row_to_companion,
        )
        .optional()
        .map_err(|e| Error::Database(format!("failed to load companion: {e}")))
    }

    pub fn list_companions(&self, owner_id: &UserId) -> Result<Vec<Companion>> {
        self.query_companions("owner_id", owner_id.as_str())
    }

    pub fn list_workspace_companions(&self, workspace_id: &WorkspaceId) -> Result<Vec<Companion>> {
        self.query_companions("workspace_id", workspace_id.as_str())
    }

    fn query_companions(&self, column: &str, value: &str) -> Result<Vec<Companion>> {
        let conn = self.connection()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {COMPANION_COLUMNS} FROM companions WHERE {column} = ? ORDER BY created_at"
            ))
            .map_err(|e| Error::Database(format!("failed to prepare companion query: {e}")))?;

        let rows = stmt
            .query_map(params![value], row_to_companion)
            .map_err(|e| Error::Database(format!("failed to list companions: {e}")))?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::Database(format!("failed to collect companions: {e}")))
    }

    pub fn count_companions(&self, owner_id: &UserId) -> Result<u32> {
        let conn = self.connection()?;
        count_companions(&conn, owner_id)
    }

    pub fn update_companion(&self, id: &CompanionId, update: CompanionUpdate) -> Result<Companion> {
        let mut companion = self
            .get_companion(id)?
            .ok_or_else(|| Error::NotFound(format!("companion {id}")))?;

        if let Some(name) = update.name {
            companion.name = name;
        }
        if let Some(personality) = update.personality {
            companion.personality = personality;
        }
        if let Some(appearance) = update.appearance {
            companion.appearance = appearance;
        }
        if let Some(config) = update.config {
            companion.config = config;
        }
        if let Some(voice) = update.voice {
            companion.voice = voice;
        }
        if let Some(workspace_id) = update.workspace_id {
            companion.workspace_id = workspace_id;
        }

        let conn = self.connection()?;
        conn.execute(
            "UPDATE companions SET
                workspace_id = ?2, name = ?3, personality = ?4, appearance = ?5,
                config = ?6, voice = ?7, updated_at = ?8
             WHERE id = ?1",
            params![
                id.as_str(),
                companion.workspace_id.as_ref().map(|w| w.as_str()),
                companion.name,
                to_json(&companion.personality)?,
                to_json(&companion.appearance)?,
                to_json(&companion.config)?,
                companion.voice,
                now_str(),
            ],
        )
        .map_err(|e| Error::Database(format!("failed to update companion: {e}")))?;
        drop(conn);

        self.get_companion(id)?
            .ok_or_else(|| Error::NotFound(format!("companion {id}")))
    }

    /// Delete a companion; its conversations and memories go with it.
    pub fn delete_companion(&self, id: &CompanionId) -> Result<()> {
        let conn = self.connection()?;
        let deleted = conn
            .execute("DELETE FROM companions WHERE id = ?", params![id.as_str()])
            .map_err(|e| Error::Database(format!("failed to delete companion: {e}")))?;
        if deleted == 0 {
            return Err(Error::NotFound(format!("companion {id}")));
        }
        Ok(())
    }
}

fn count_companions(conn: &rusqlite::Connection, owner_id: &UserId) -> Result<u32> {
    conn.query_row(
        "SELECT count(*) FROM companions WHERE owner_id = ?",
        params![owner_id.as_str()],
        |row| row.get(0),
    )
    .map_err(|e| Error::Database(format!("failed to count companions: {e}")))
}

fn row_to_companion(row: &rusqlite::Row<'_>) -> rusqlite::Result<Companion> {
    Ok(Companion {
        id: CompanionId::from_raw(row.get::<_, String>(0)?),
        owner_id: UserId::from_raw(row.get::<_, String>(1)?),
        workspace_id: row.get::<_, Option<String>>(2)?.map(WorkspaceId::from_raw),
        name: row.get(3)?,
        personality: json_column(row, 4)?,
        appearance: json_column(row, 5)?,
        config: json_column(row, 6)?,
        voice: row.get(7)?,
        created_at: timestamp_column(row, 8)?,
        updated_at: timestamp_column(row, 9)?,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::{Appearance, Companion, CompanionUpdate, NewCompanion, Personality};
    use crate::Database;
    use crate::users::tests::user;
    use luna_common::{Error, UserId};
    use std::sync::{Arc, Barrier};
    use std::thread;

    pub(crate) fn new_companion(owner: &UserId, name: &str) -> NewCompanion {
        NewCompanion {
            owner_id: owner.clone(),
            workspace_id: None,
            name: name.to_string(),
            personality: Personality {
                traits: vec!["kind".into()],
                tone: Some("warm".into()),
                backstory: None,
                advanced: None,
            },
            appearance: Appearance::default(),
            config: serde_json::json!({}),
            voice: None,
        }
    }

    pub(crate) fn companion(db: &Database, owner: &UserId, name: &str) -> Companion {
        db.create_companion_guarded(new_companion(owner, name), |_| Ok(()))
            .expect("create companion")
    }

    #[test]
    fn guard_sees_current_count_and_can_refuse() {
        let db = Database::in_memory().unwrap();
        let alice = user(&db, "alice@example.com");

        companion(&db, &alice.id, "Luna");
        let err = db
            .create_companion_guarded(new_companion(&alice.id, "Nova"), |count| {
                assert_eq!(count, 1);
                Err(Error::Forbidden("limit reached".into()))
            })
            .unwrap_err();

        assert!(matches!(err, Error::Forbidden(_)));
        assert_eq!(db.count_companions(&alice.id).unwrap(), 1);
    }

    #[test]
    fn concurrent_creates_cannot_both_pass_the_limit() {
        let db = Arc::new(Database::in_memory().unwrap());
        let alice = user(&db, "alice@example.com");
        let start = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let db = db.clone();
                let owner = alice.id.clone();
                let start = start.clone();
                thread::spawn(move || {
                    start.wait();
                    db.create_companion_guarded(new_companion(&owner, &format!("Luna {i}")), |count| {
                        if count >= 1 {
                            Err(Error::Forbidden("free plan allows one companion".into()))
                        } else {
                            Ok(())
                        }
                    })
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(
            results
                .iter()
                .filter_map(|r| r.as_ref().err())
                .all(|e| matches!(e, Error::Forbidden(_)))
        );
        assert_eq!(db.count_companions(&alice.id).unwrap(), 1);
    }

    #[test]
    fn personality_and_appearance_survive_storage() {
        let db = Database::in_memory().unwrap();
        let alice = user(&db, "alice@example.com");

        let mut new = new_companion(&alice.id, "Luna");
        new.appearance.avatar = Some("exclusive/aurora".into());
        new.appearance
            .extra
            .insert("hair".into(), serde_json::json!("silver"));
        let created = db.create_companion_guarded(new, |_| Ok(())).unwrap();

        let loaded = db.get_companion(&created.id).unwrap().unwrap();
        assert_eq!(loaded.personality.traits, vec!["kind".to_string()]);
        assert!(loaded.appearance.uses_exclusive_avatar());
        assert_eq!(loaded.appearance.extra["hair"], "silver");
    }

    #[test]
    fn update_applies_only_present_fields() {
        let db = Database::in_memory().unwrap();
        let alice = user(&db, "alice@example.com");
        let luna = companion(&db, &alice.id, "Luna");

        let updated = db
            .update_companion(
                &luna.id,
                CompanionUpdate {
                    name: Some("Luna II".into()),
                    voice: Some(Some("aria".into())),
                    ..CompanionUpdate::default()
                },
            )
            .unwrap();
        assert_eq!(updated.name, "Luna II");
        assert_eq!(updated.voice.as_deref(), Some("aria"));
        assert_eq!(updated.personality, luna.personality);
    }

    #[test]
    fn list_is_scoped_to_owner() {
        let db = Database::in_memory().unwrap();
        let alice = user(&db, "alice@example.com");
        let bob = user(&db, "bob@example.com");
        companion(&db, &alice.id, "Luna");
        companion(&db, &bob.id, "Sol");

        let alices = db.list_companions(&alice.id).unwrap();
        assert_eq!(alices.len(), 1);
        assert_eq!(alices[0].name, "Luna");
    }
}
