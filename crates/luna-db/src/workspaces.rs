use chrono::{DateTime, Utc};
use luna_common::{Error, Result, UserId, WorkspaceId};
use rusqlite::{OptionalExtension, params};
use serde::Serialize;
use tracing::info;

use crate::database::{Database, now_str, timestamp_column};

/// A named grouping of companions owned by one user.
#[derive(Debug, Clone, Serialize)]
pub struct Workspace {
    pub id: WorkspaceId,
    pub owner_id: UserId,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct WorkspaceUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
}

const WORKSPACE_COLUMNS: &str = "id, owner_id, name, description, created_at, updated_at";

impl Database {
    pub fn create_workspace(
        &self,
        owner_id: &UserId,
        name: &str,
        description: Option<&str>,
    ) -> Result<Workspace> {
        let id = WorkspaceId::new();
        let now = now_str();
        {
            let conn = self.connection()?;
            conn.execute(
                &format!("INSERT INTO workspaces ({WORKSPACE_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?)"),
                params![id.as_str(), owner_id.as_str(), name, description, now, now],
            )
            .map_err(|e| Error::Database(format!("failed to insert workspace: {e}")))?;
        }

        self.get_workspace(&id)?
            .ok_or_else(|| Error::Database("workspace vanished after insert".into()))
    }

    pub fn get_workspace(&self, id: &WorkspaceId) -> Result<Option<Workspace>> {
        let conn = self.connection()?;
        conn.query_row(
            &format!("SELECT {WORKSPACE_COLUMNS} FROM workspaces WHERE id = ?"),
            params![id.as_str()],
            row_to_workspace,
        )
        .optional()
        .map_err(|e| Error::Database(format!("failed to load workspace: {e}")))
    }

    pub fn list_workspaces(&self, owner_id: &UserId) -> Result<Vec<Workspace>> {
        let conn = self.connection()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {WORKSPACE_COLUMNS} FROM workspaces WHERE owner_id = ? ORDER BY created_at"
            ))
            .map_err(|e| Error::Database(format!("failed to prepare workspace query: {e}")))?;

        let rows = stmt
            .query_map(params![owner_id.as_str()], row_to_workspace)
            .map_err(|e| Error::Database(format!("failed to list workspaces: {e}")))?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::Database(format!("failed to collect workspaces: {e}")))
    }

    pub fn update_workspace(&self, id: &WorkspaceId, update: WorkspaceUpdate) -> Result<Workspace> {
        {
            let conn = self.connection()?;
            let changed = conn
                .execute(
                    "UPDATE workspaces SET
                        name = COALESCE(?2, name),
                        description = COALESCE(?3, description),
                        updated_at = ?4
                     WHERE id = ?1",
                    params![id.as_str(), update.name, update.description, now_str()],
                )
                .map_err(|e| Error::Database(format!("failed to update workspace: {e}")))?;
            if changed == 0 {
                return Err(Error::NotFound(format!("workspace {id}")));
            }
        }

        self.get_workspace(id)?
            .ok_or_else(|| Error::NotFound(format!("workspace {id}")))
    }

    /// Delete a workspace together with every companion in it. Returns the
    /// number of companions removed.
    pub fn delete_workspace(&self, id: &WorkspaceId) -> Result<usize> {
        let removed = self.transaction(|tx| {
            let companions = tx
                .execute(
                    "DELETE FROM companions WHERE workspace_id = ?",
                    params![id.as_str()],
                )
                .map_err(|e| Error::Database(format!("failed to delete workspace companions: {e}")))?;
            let deleted = tx
                .execute("DELETE FROM workspaces WHERE id = ?", params![id.as_str()])
                .map_err(|e| Error::Database(format!("failed to delete workspace: {e}")))?;
            if deleted == 0 {
                return Err(Error::NotFound(format!("workspace {id}")));
            }
            Ok(companions)
        })?;

        info!("deleted workspace {id} and {removed} companions");
        Ok(removed)
    }
}

fn row_to_workspace(row: &rusqlite::Row<'_>) -> rusqlite::Result<Workspace> {
    Ok(Workspace {
        id: WorkspaceId::from_raw(row.get::<_, String>(0)?),
        owner_id: UserId::from_raw(row.get::<_, String>(1)?),
        name: row.get(2)?,
        description: row.get(3)?,
        created_at: timestamp_column(row, 4)?,
        updated_at: timestamp_column(row, 5)?,
    })
}
