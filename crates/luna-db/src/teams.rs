use chrono::{DateTime, Utc};
use luna_common::{Error, Result, TeamId, TeamRole, UserId};
use rusqlite::{OptionalExtension, Transaction, params};
use serde::Serialize;
use tracing::info;

use crate::database::{Database, conversion_error, is_unique_violation, now_str, timestamp_column};

#[derive(Debug, Clone, Serialize)]
pub struct Team {
    pub id: TeamId,
    pub creator_id: UserId,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A stored membership row. The creator never has one.
#[derive(Debug, Clone, Serialize)]
pub struct TeamMember {
    pub team_id: TeamId,
    pub user_id: UserId,
    pub email: String,
    pub name: String,
    pub role: TeamRole,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct TeamUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
}

const TEAM_COLUMNS: &str = "t.id, t.creator_id, t.name, t.description, t.created_at, t.updated_at";

impl Database {
    pub fn create_team(
        &self,
        creator_id: &UserId,
        name: &str,
        description: Option<&str>,
    ) -> Result<Team> {
        let id = TeamId::new();
        let now = now_str();
        {
            let conn = self.connection()?;
            conn.execute(
                "INSERT INTO teams (id, creator_id, name, description, created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?)",
                params![id.as_str(), creator_id.as_str(), name, description, now, now],
            )
            .map_err(|e| Error::Database(format!("failed to insert team: {e}")))?;
        }

        info!("user {creator_id} created team {id}");
        self.get_team(&id)?
            .ok_or_else(|| Error::Database("team vanished after insert".into()))
    }

    pub fn get_team(&self, id: &TeamId) -> Result<Option<Team>> {
        let conn = self.connection()?;
        conn.query_row(
            &format!("SELECT {TEAM_COLUMNS} FROM teams t WHERE t.id = ?"),
            params![id.as_str()],
            row_to_team,
        )
        .optional()
        .map_err(|e| Error::Database(format!("failed to load team: {e}")))
    }

    /// Teams the user created or belongs to.
    pub fn list_teams_for_user(&self, user_id: &UserId) -> Result<Vec<Team>> {
        let conn = self.connection()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {TEAM_COLUMNS} FROM teams t
                 WHERE t.creator_id = ?1
                    OR EXISTS (SELECT 1 FROM team_members m WHERE m.team_id = t.id AND m.user_id = ?1)
                 ORDER BY t.created_at"
            ))
            .map_err(|e| Error::Database(format!("failed to prepare team query: {e}")))?;

        let rows = stmt
            .query_map(params![user_id.as_str()], row_to_team)
            .map_err(|e| Error::Database(format!("failed to list teams: {e}")))?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::Database(format!("failed to collect teams: {e}")))
    }

    pub fn update_team(&self, id: &TeamId, update: TeamUpdate) -> Result<Team> {
        {
            let conn = self.connection()?;
            let changed = conn
                .execute(
                    "UPDATE teams SET
                        name = COALESCE(?2, name),
                        description = COALESCE(?3, description),
                        updated_at = ?4
                     WHERE id = ?1",
                    params![id.as_str(), update.name, update.description, now_str()],
                )
                .map_err(|e| Error::Database(format!("failed to update team: {e}")))?;
            if changed == 0 {
                return Err(Error::NotFound(format!("team {id}")));
            }
        }

        self.get_team(id)?
            .ok_or_else(|| Error::NotFound(format!("team {id}")))
    }

    /// Delete a team and all its membership rows.
    pub fn delete_team(&self, id: &TeamId) -> Result<()> {
        let conn = self.connection()?;
        let deleted = conn
            .execute("DELETE FROM teams WHERE id = ?", params![id.as_str()])
            .map_err(|e| Error::Database(format!("failed to delete team: {e}")))?;
        if deleted == 0 {
            return Err(Error::NotFound(format!("team {id}")));
        }
        info!("deleted team {id}");
        Ok(())
    }

    /// The role stored on the user's membership row, if any.
    pub fn get_membership(&self, team_id: &TeamId, user_id: &UserId) -> Result<Option<TeamRole>> {
        let conn = self.connection()?;
        let role: Option<String> = conn
            .query_row(
                "SELECT role FROM team_members WHERE team_id = ? AND user_id = ?",
                params![team_id.as_str(), user_id.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| Error::Database(format!("failed to load membership: {e}")))?;
        role.map(|r| r.parse()).transpose()
    }

    pub fn list_members(&self, team_id: &TeamId) -> Result<Vec<TeamMember>> {
        let conn = self.connection()?;
        let mut stmt = conn
            .prepare(
                "SELECT m.team_id, m.user_id, u.email, u.name, m.role, m.joined_at
                 FROM team_members m JOIN users u ON u.id = m.user_id
                 WHERE m.team_id = ? ORDER BY m.joined_at",
            )
            .map_err(|e| Error::Database(format!("failed to prepare member query: {e}")))?;

        let rows = stmt
            .query_map(params![team_id.as_str()], |row| {
                let role: String = row.get(4)?;
                Ok(TeamMember {
                    team_id: TeamId::from_raw(row.get::<_, String>(0)?),
                    user_id: UserId::from_raw(row.get::<_, String>(1)?),
                    email: row.get(2)?,
                    name: row.get(3)?,
                    role: role.parse().map_err(conversion_error)?,
                    joined_at: timestamp_column(row, 5)?,
                })
            })
            .map_err(|e| Error::Database(format!("failed to list members: {e}")))?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::Database(format!("failed to collect members: {e}")))
    }

    pub fn add_member(&self, team_id: &TeamId, user_id: &UserId, role: TeamRole) -> Result<()> {
        ensure_assignable(role)?;
        self.transaction(|tx| {
            refuse_creator(tx, team_id, user_id)?;
            tx.execute(
                "INSERT INTO team_members (team_id, user_id, role, joined_at) VALUES (?, ?, ?, ?)",
                params![team_id.as_str(), user_id.as_str(), role.as_str(), now_str()],
            )
            .map_err(|e| {
                if is_unique_violation(&e) {
                    Error::Conflict("user is already a member of this team".into())
                } else {
                    Error::Database(format!("failed to add member: {e}"))
                }
            })?;
            Ok(())
        })?;

        info!("added {user_id} to team {team_id} as {role}");
        Ok(())
    }

    pub fn update_member_role(&self, team_id: &TeamId, user_id: &UserId, role: TeamRole) -> Result<()> {
        ensure_assignable(role)?;
        self.transaction(|tx| {
            refuse_creator(tx, team_id, user_id)?;
            let changed = tx
                .execute(
                    "UPDATE team_members SET role = ? WHERE team_id = ? AND user_id = ?",
                    params![role.as_str(), team_id.as_str(), user_id.as_str()],
                )
                .map_err(|e| Error::Database(format!("failed to update member role: {e}")))?;
            if changed == 0 {
                return Err(Error::NotFound(format!("member {user_id}")));
            }
            Ok(())
        })
    }

    pub fn remove_member(&self, team_id: &TeamId, user_id: &UserId) -> Result<()> {
        self.transaction(|tx| {
            refuse_creator(tx, team_id, user_id)?;
            let deleted = tx
                .execute(
                    "DELETE FROM team_members WHERE team_id = ? AND user_id = ?",
                    params![team_id.as_str(), user_id.as_str()],
                )
                .map_err(|e| Error::Database(format!("failed to remove member: {e}")))?;
            if deleted == 0 {
                return Err(Error::NotFound(format!("member {user_id}")));
            }
            Ok(())
        })?;

        info!("removed {user_id} from team {team_id}");
        Ok(())
    }
}

fn ensure_assignable(role: TeamRole) -> Result<()> {
    if !role.is_assignable() {
        return Err(Error::Validation(
            "role must be one of admin, editor, viewer".into(),
        ));
    }
    Ok(())
}

/// Membership rows never exist for the creator, so every write path checks
/// the target against the team's creator first.
fn refuse_creator(tx: &Transaction<'_>, team_id: &TeamId, user_id: &UserId) -> Result<()> {
    let creator: Option<String> = tx
        .query_row(
            "SELECT creator_id FROM teams WHERE id = ?",
            params![team_id.as_str()],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| Error::Database(format!("failed to load team: {e}")))?;

    match creator {
        None => Err(Error::NotFound(format!("team {team_id}"))),
        Some(creator) if creator == user_id.as_str() => Err(Error::Forbidden(
            "the team owner's membership cannot be changed or removed".into(),
        )),
        Some(_) => Ok(()),
    }
}

fn row_to_team(row: &rusqlite::Row<'_>) -> rusqlite::Result<Team> {
    Ok(Team {
        id: TeamId::from_raw(row.get::<_, String>(0)?),
        creator_id: UserId::from_raw(row.get::<_, String>(1)?),
        name: row.get(2)?,
        description: row.get(3)?,
        created_at: timestamp_column(row, 4)?,
        updated_at: timestamp_column(row, 5)?,
    })
}
