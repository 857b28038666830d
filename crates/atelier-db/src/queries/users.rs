use anyhow::Result;
use rusqlite::OptionalExtension;
use uuid::Uuid;

use atelier_types::models::{User, UserRole};

use crate::Database;
use crate::models::{now_text, user_from_row};

impl Database {
    pub fn create_user(&self, id: Uuid, nickname: &str, role: Option<UserRole>) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, nickname, role, created_at) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![
                    id.to_string(),
                    nickname,
                    role.map(|r| r.as_str()),
                    now_text()
                ],
            )?;
            Ok(())
        })
    }

    /// Users materialize on first authenticated access; the verified identity
    /// arrives from the external auth collaborator. A lost insert race
    /// degrades to "fetch existing" via the primary key.
    pub fn ensure_user(&self, id: Uuid, nickname: &str) -> Result<User> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO users (id, nickname, created_at) VALUES (?1, ?2, ?3)",
                rusqlite::params![id.to_string(), nickname, now_text()],
            )?;
            let user = conn.query_row(
                "SELECT id, nickname, role, created_at FROM users WHERE id = ?1",
                [id.to_string()],
                user_from_row,
            )?;
            Ok(user)
        })
    }

    pub fn get_user(&self, id: Uuid) -> Result<Option<User>> {
        self.with_conn(|conn| {
            let user = conn
                .query_row(
                    "SELECT id, nickname, role, created_at FROM users WHERE id = ?1",
                    [id.to_string()],
                    user_from_row,
                )
                .optional()?;
            Ok(user)
        })
    }

    pub fn nickname_of(&self, id: Uuid) -> Result<Option<String>> {
        self.with_conn(|conn| {
            let nickname = conn
                .query_row(
                    "SELECT nickname FROM users WHERE id = ?1",
                    [id.to_string()],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(nickname)
        })
    }

    /// Assign the onboarding role. Returns false if a role was already set —
    /// roles are assigned exactly once.
    pub fn set_role_once(&self, id: Uuid, role: UserRole) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users SET role = ?1 WHERE id = ?2 AND role IS NULL",
                rusqlite::params![role.as_str(), id.to_string()],
            )?;
            Ok(changed > 0)
        })
    }
}
