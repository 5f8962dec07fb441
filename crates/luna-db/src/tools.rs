use chrono::{DateTime, Utc};
use luna_common::{Error, Result, ToolId, UserId};
use rusqlite::{OptionalExtension, params};
use serde::Serialize;

use crate::database::{Database, is_unique_violation, json_column, now_str, timestamp_column, to_json};

/// A user-defined function a companion may call, described with an OpenAI
/// function-calling parameter schema and executed by POSTing to `handler_url`.
#[derive(Debug, Clone, Serialize)]
pub struct Tool {
    pub id: ToolId,
    pub owner_id: UserId,
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
    pub handler_url: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewTool {
    pub owner_id: UserId,
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
    pub handler_url: String,
}

#[derive(Debug, Clone, Default)]
pub struct ToolUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub parameters: Option<serde_json::Value>,
    pub handler_url: Option<String>,
}

const TOOL_COLUMNS: &str =
    "id, owner_id, name, description, parameters, handler_url, created_at, updated_at";

fn name_conflict(e: rusqlite::Error) -> Error {
    if is_unique_violation(&e) {
        Error::Conflict("a tool with this name already exists".into())
    } else {
        Error::Database(format!("failed to write tool: {e}"))
    }
}

impl Database {
    pub fn create_tool(&self, new: NewTool) -> Result<Tool> {
        let id = ToolId::new();
        let now = now_str();
        {
            let conn = self.connection()?;
            conn.execute(
                &format!("INSERT INTO tools ({TOOL_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?)"),
                params![
                    id.as_str(),
                    new.owner_id.as_str(),
                    new.name,
                    new.description,
                    to_json(&new.parameters)?,
                    new.handler_url,
                    now,
                    now,
                ],
            )
            .map_err(name_conflict)?;
        }

        self.get_tool(&id)?
            .ok_or_else(|| Error::Database("tool vanished after insert".into()))
    }

    pub fn get_tool(&self, id: &ToolId) -> Result<Option<Tool>> {
        let conn = self.connection()?;
        conn.query_row(
            &format!("SELECT {TOOL_COLUMNS} FROM tools WHERE id = ?"),
            params![id.as_str()],
            row_to_tool,
        )
        .optional()
        .map_err(|e| Error::Database(format!("failed to load tool: {e}")))
    }

    pub fn list_tools(&self, owner_id: &UserId) -> Result<Vec<Tool>> {
        let conn = self.connection()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {TOOL_COLUMNS} FROM tools WHERE owner_id = ? ORDER BY name"
            ))
            .map_err(|e| Error::Database(format!("failed to prepare tool query: {e}")))?;

        let rows = stmt
            .query_map(params![owner_id.as_str()], row_to_tool)
            .map_err(|e| Error::Database(format!("failed to list tools: {e}")))?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::Database(format!("failed to collect tools: {e}")))
    }

    pub fn update_tool(&self, id: &ToolId, update: ToolUpdate) -> Result<Tool> {
        let parameters = update.parameters.as_ref().map(to_json).transpose()?;
        {
            let conn = self.connection()?;
            let changed = conn
                .execute(
                    "UPDATE tools SET
                        name = COALESCE(?2, name),
                        description = COALESCE(?3, description),
                        parameters = COALESCE(?4, parameters),
                        handler_url = COALESCE(?5, handler_url),
                        updated_at = ?6
                     WHERE id = ?1",
                    params![
                        id.as_str(),
                        update.name,
                        update.description,
                        parameters,
                        update.handler_url,
                        now_str()
                    ],
                )
                .map_err(name_conflict)?;
            if changed == 0 {
                return Err(Error::NotFound(format!("tool {id}")));
            }
        }

        self.get_tool(id)?
            .ok_or_else(|| Error::NotFound(format!("tool {id}")))
    }

    pub fn delete_tool(&self, id: &ToolId) -> Result<()> {
        let conn = self.connection()?;
        let deleted = conn
            .execute("DELETE FROM tools WHERE id = ?", params![id.as_str()])
            .map_err(|e| Error::Database(format!("failed to delete tool: {e}")))?;
        if deleted == 0 {
            return Err(Error::NotFound(format!("tool {id}")));
        }
        Ok(())
    }
}

fn row_to_tool(row: &rusqlite::Row<'_>) -> rusqlite::Result<Tool> {
    Ok(Tool {
        id: ToolId::from_raw(row.get::<_, String>(0)?),
        owner_id: UserId::from_raw(row.get::<_, String>(1)?),
        name: row.get(2)?,
        description: row.get(3)?,
        parameters: json_column(row, 4)?,
        handler_url: row.get(5)?,
        created_at: timestamp_column(row, 6)?,
        updated_at: timestamp_column(row, 7)?,
    })
}
