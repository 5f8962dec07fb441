use chrono::{DateTime, Utc};
use luna_common::{CompanionId, ConversationId, Error, MemoryId, MemoryKind, Result, UserId};
use rusqlite::params;
use rusqlite::types::Value;
use serde::Serialize;

use crate::database::{Database, conversion_error, timestamp_column, ts};

/// Something a companion remembers about its user.
#[derive(Debug, Clone, Serialize)]
pub struct Memory {
    pub id: MemoryId,
    pub companion_id: CompanionId,
    pub user_id: UserId,
    #[serde(rename = "type")]
    pub kind: MemoryKind,
    pub content: String,
    pub importance: u8,
    pub conversation_id: Option<ConversationId>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewMemory {
    pub companion_id: CompanionId,
    pub user_id: UserId,
    pub kind: MemoryKind,
    pub content: String,
    /// Clamped into `1..=10` on insert.
    pub importance: u8,
    pub conversation_id: Option<ConversationId>,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryFilter {
    pub kind: Option<MemoryKind>,
    pub min_importance: Option<u8>,
    pub limit: Option<u32>,
}

const MEMORY_COLUMNS: &str =
    "id, companion_id, user_id, kind, content, importance, conversation_id, created_at";

impl Database {
    /// Store a memory once `guard` accepts the companion's current memory
    /// count. Count and insert share one transaction.
    pub fn add_memory_guarded(
        &self,
        new: NewMemory,
        guard: impl FnOnce(u32) -> Result<()>,
    ) -> Result<Memory> {
        let memory = Memory {
            id: MemoryId::new(),
            companion_id: new.companion_id,
            user_id: new.user_id,
            kind: new.kind,
            content: new.content,
            importance: new.importance.clamp(1, 10),
            conversation_id: new.conversation_id,
            created_at: Utc::now(),
        };

        self.transaction(|tx| {
            guard(count_memories(tx, &memory.companion_id)?)?;
            tx.execute(
                &format!("INSERT INTO memories ({MEMORY_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?)"),
                params![
                    memory.id.as_str(),
                    memory.companion_id.as_str(),
                    memory.user_id.as_str(),
                    memory.kind.as_str(),
                    memory.content,
                    memory.importance,
                    memory.conversation_id.as_ref().map(|c| c.as_str()),
                    ts(memory.created_at),
                ],
            )
            .map_err(|e| Error::Database(format!("failed to insert memory: {e}")))?;
            Ok(())
        })?;

        Ok(memory)
    }

    /// Memories for a companion, most important first and newest first
    /// within the same importance.
    pub fn list_memories(&self, companion_id: &CompanionId, filter: &MemoryFilter) -> Result<Vec<Memory>> {
        let mut sql = format!("SELECT {MEMORY_COLUMNS} FROM memories WHERE companion_id = ?");
        let mut values: Vec<Value> = vec![Value::Text(companion_id.as_str().to_string())];

        if let Some(kind) = filter.kind {
            sql.push_str(" AND kind = ?");
            values.push(Value::Text(kind.as_str().to_string()));
        }
        if let Some(min) = filter.min_importance {
            sql.push_str(" AND importance >= ?");
            values.push(Value::Integer(i64::from(min)));
        }
        sql.push_str(" ORDER BY importance DESC, created_at DESC");
        if let Some(limit) = filter.limit {
            sql.push_str(" LIMIT ?");
            values.push(Value::Integer(i64::from(limit)));
        }

        let conn = self.connection()?;
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| Error::Database(format!("failed to prepare memory query: {e}")))?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(values), row_to_memory)
            .map_err(|e| Error::Database(format!("failed to list memories: {e}")))?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::Database(format!("failed to collect memories: {e}")))
    }

    /// Delete one memory, scoped to its companion so ids from another
    /// companion cannot be reached through this one.
    pub fn delete_memory(&self, companion_id: &CompanionId, id: &MemoryId) -> Result<()> {
        let conn = self.connection()?;
        let deleted = conn
            .execute(
                "DELETE FROM memories WHERE id = ? AND companion_id = ?",
                params![id.as_str(), companion_id.as_str()],
            )
            .map_err(|e| Error::Database(format!("failed to delete memory: {e}")))?;
        if deleted == 0 {
            return Err(Error::NotFound(format!("memory {id}")));
        }
        Ok(())
    }

    pub fn count_memories(&self, companion_id: &CompanionId) -> Result<u32> {
        let conn = self.connection()?;
        count_memories(&conn, companion_id)
    }

    /// Memories across every companion the user owns.
    pub fn count_user_memories(&self, user_id: &UserId) -> Result<u32> {
        let conn = self.connection()?;
        conn.query_row(
            "SELECT count(*) FROM memories WHERE user_id = ?",
            params![user_id.as_str()],
            |row| row.get(0),
        )
        .map_err(|e| Error::Database(format!("failed to count memories: {e}")))
    }
}

fn count_memories(conn: &rusqlite::Connection, companion_id: &CompanionId) -> Result<u32> {
    conn.query_row(
        "SELECT count(*) FROM memories WHERE companion_id = ?",
        params![companion_id.as_str()],
        |row| row.get(0),
    )
    .map_err(|e| Error::Database(format!("failed to count memories: {e}")))
}

fn row_to_memory(row: &rusqlite::Row<'_>) -> rusqlite::Result<Memory> {
    let kind: String = row.get(3)?;
    Ok(Memory {
        id: MemoryId::from_raw(row.get::<_, String>(0)?),
        companion_id: CompanionId::from_raw(row.get::<_, String>(1)?),
        user_id: UserId::from_raw(row.get::<_, String>(2)?),
        kind: MemoryKind::parse(&kind)
            .ok_or_else(|| conversion_error(format!("unknown memory kind: {kind}")))?,
        content: row.get(4)?,
        importance: row.get(5)?,
        conversation_id: row.get::<_, Option<String>>(6)?.map(ConversationId::from_raw),
        created_at: timestamp_column(row, 7)?,
    })
}

#[cfg(test)]
mod tests {
    use super::{MemoryFilter, NewMemory};
    use crate::Database;
    use crate::companions::tests::companion;
    use crate::users::tests::user;
    use luna_common::{CompanionId, Error, MemoryKind, UserId};

    fn memory(companion: &CompanionId, user: &UserId, kind: MemoryKind, importance: u8) -> NewMemory {
        NewMemory {
            companion_id: companion.clone(),
            user_id: user.clone(),
            kind,
            content: format!("{} memory", kind.as_str()),
            importance,
            conversation_id: None,
        }
    }

    #[test]
    fn guard_enforces_capacity_per_companion() {
        let db = Database::in_memory().unwrap();
        let alice = user(&db, "alice@example.com");
        let luna = companion(&db, &alice.id, "Luna");
        let capacity = 2;
        let within = |count: u32| {
            if count >= capacity {
                Err(Error::Forbidden("memory capacity reached".into()))
            } else {
                Ok(())
            }
        };

        db.add_memory_guarded(memory(&luna.id, &alice.id, MemoryKind::Fact, 5), within)
            .unwrap();
        db.add_memory_guarded(memory(&luna.id, &alice.id, MemoryKind::Fact, 5), within)
            .unwrap();
        let err = db
            .add_memory_guarded(memory(&luna.id, &alice.id, MemoryKind::Fact, 5), within)
            .unwrap_err();

        assert!(matches!(err, Error::Forbidden(_)));
        assert_eq!(db.count_memories(&luna.id).unwrap(), 2);
    }

    #[test]
    fn importance_is_clamped() {
        let db = Database::in_memory().unwrap();
        let alice = user(&db, "alice@example.com");
        let luna = companion(&db, &alice.id, "Luna");

        let high = db
            .add_memory_guarded(memory(&luna.id, &alice.id, MemoryKind::Event, 42), |_| Ok(()))
            .unwrap();
        let low = db
            .add_memory_guarded(memory(&luna.id, &alice.id, MemoryKind::Event, 0), |_| Ok(()))
            .unwrap();
        assert_eq!(high.importance, 10);
        assert_eq!(low.importance, 1);
    }

    #[test]
    fn filters_and_ordering() {
        let db = Database::in_memory().unwrap();
        let alice = user(&db, "alice@example.com");
        let luna = companion(&db, &alice.id, "Luna");
        for (kind, importance) in [
            (MemoryKind::Fact, 3),
            (MemoryKind::Preference, 8),
            (MemoryKind::Fact, 9),
            (MemoryKind::Emotion, 6),
        ] {
            db.add_memory_guarded(memory(&luna.id, &alice.id, kind, importance), |_| Ok(()))
                .unwrap();
        }

        let all = db.list_memories(&luna.id, &MemoryFilter::default()).unwrap();
        let order: Vec<u8> = all.iter().map(|m| m.importance).collect();
        assert_eq!(order, vec![9, 8, 6, 3]);

        let facts = db
            .list_memories(
                &luna.id,
                &MemoryFilter {
                    kind: Some(MemoryKind::Fact),
                    ..MemoryFilter::default()
                },
            )
            .unwrap();
        assert_eq!(facts.len(), 2);

        let important = db
            .list_memories(
                &luna.id,
                &MemoryFilter {
                    min_importance: Some(7),
                    limit: Some(1),
                    ..MemoryFilter::default()
                },
            )
            .unwrap();
        assert_eq!(important.len(), 1);
        assert_eq!(important[0].importance, 9);
    }

    #[test]
    fn delete_is_scoped_to_companion() {
        let db = Database::in_memory().unwrap();
        let alice = user(&db, "alice@example.com");
        let luna = companion(&db, &alice.id, "Luna");
        let sol = companion(&db, &alice.id, "Sol");
        let kept = db
            .add_memory_guarded(memory(&luna.id, &alice.id, MemoryKind::Fact, 5), |_| Ok(()))
            .unwrap();

        let err = db.delete_memory(&sol.id, &kept.id).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));

        db.delete_memory(&luna.id, &kept.id).unwrap();
        assert_eq!(db.count_memories(&luna.id).unwrap(), 0);
        assert_eq!(db.count_user_memories(&alice.id).unwrap(), 0);
    }
}
