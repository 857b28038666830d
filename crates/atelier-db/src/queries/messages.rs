use anyhow::Result;
use rusqlite::OptionalExtension;
use uuid::Uuid;

use atelier_types::models::{Message, MessageKind};

use crate::Database;
use crate::models::{MESSAGE_COLS, message_from_row, now_text};

/// Page size used when the caller does not ask for one.
pub const DEFAULT_PAGE_SIZE: u32 = 50;
/// Upper bound on a single page, enforced unconditionally.
pub const MAX_PAGE_SIZE: u32 = 100;

impl Database {
    /// Append a message and bump the room's last-message timestamp in one
    /// committed unit.
    pub fn append_message(
        &self,
        room_id: Uuid,
        sender_id: Uuid,
        content: &str,
        kind: MessageKind,
        file_url: Option<&str>,
    ) -> Result<Message> {
        let id = Uuid::new_v4();
        let now = now_text();

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            tx.execute(
                "INSERT INTO messages (id, room_id, sender_id, kind, content, file_url, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    id.to_string(),
                    room_id.to_string(),
                    sender_id.to_string(),
                    kind.as_str(),
                    content,
                    file_url,
                    now
                ],
            )?;

            tx.execute(
                "UPDATE rooms SET last_message_at = ?1 WHERE id = ?2",
                rusqlite::params![now, room_id.to_string()],
            )?;

            let message = tx.query_row(
                &format!("SELECT {MESSAGE_COLS} FROM messages WHERE id = ?1"),
                [id.to_string()],
                message_from_row,
            )?;

            tx.commit()?;
            Ok(message)
        })
    }

    /// Cursor-based reverse-chronological page. Returns up to `take` messages
    /// strictly older than `cursor` (a message id; exclusive), in
    /// chronological order so callers prepend pages without re-sorting.
    /// An unknown cursor behaves like no cursor.
    pub fn messages_page(
        &self,
        room_id: Uuid,
        cursor: Option<Uuid>,
        take: u32,
    ) -> Result<Vec<Message>> {
        let take = if take == 0 {
            DEFAULT_PAGE_SIZE
        } else {
            take.min(MAX_PAGE_SIZE)
        };

        self.with_conn(|conn| {
            let anchor = match cursor {
                Some(cursor_id) => conn
                    .query_row(
                        "SELECT created_at, seq FROM messages WHERE id = ?1",
                        [cursor_id.to_string()],
                        |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
                    )
                    .optional()?,
                None => None,
            };

            let mut messages = match anchor {
                Some((created_at, seq)) => {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {MESSAGE_COLS} FROM messages
                         WHERE room_id = ?1
                           AND (created_at < ?2 OR (created_at = ?2 AND seq < ?3))
                         ORDER BY created_at DESC, seq DESC
                         LIMIT ?4"
                    ))?;
                    stmt.query_map(
                        rusqlite::params![room_id.to_string(), created_at, seq, take],
                        message_from_row,
                    )?
                    .collect::<std::result::Result<Vec<_>, _>>()?
                }
                None => {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {MESSAGE_COLS} FROM messages
                         WHERE room_id = ?1
                         ORDER BY created_at DESC, seq DESC
                         LIMIT ?2"
                    ))?;
                    stmt.query_map(
                        rusqlite::params![room_id.to_string(), take],
                        message_from_row,
                    )?
                    .collect::<std::result::Result<Vec<_>, _>>()?
                }
            };

            messages.reverse();
            Ok(messages)
        })
    }
}
