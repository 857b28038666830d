use anyhow::Result;
use rusqlite::OptionalExtension;
use uuid::Uuid;

use atelier_types::models::{Room, RoomMemberInfo, TransactionSummary, TransactionStatus};

use crate::Database;
use crate::models::{MESSAGE_COLS, message_from_row, now_text, parse_opt_ts, parse_ts, parse_uuid};

/// Canonical key for a two-party room: the sorted member pair. The UNIQUE
/// constraint on rooms.pair_key makes concurrent get-or-create resolve to a
/// single row; a lost insert race degrades to "fetch existing".
fn pair_key(a: Uuid, b: Uuid) -> String {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    format!("{lo}:{hi}")
}

impl Database {
    /// Fetch the 1:1 room between `user_id` and `target_id`, creating it (and
    /// both membership rows) on first contact.
    pub fn get_or_create_pair_room(&self, user_id: Uuid, target_id: Uuid) -> Result<Uuid> {
        let key = pair_key(user_id, target_id);
        let room_id = Uuid::new_v4();

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let inserted = tx.execute(
                "INSERT OR IGNORE INTO rooms (id, pair_key, created_at) VALUES (?1, ?2, ?3)",
                rusqlite::params![room_id.to_string(), key, now_text()],
            )?;

            let id: String = tx.query_row(
                "SELECT id FROM rooms WHERE pair_key = ?1",
                [&key],
                |row| row.get(0),
            )?;

            if inserted > 0 {
                for member in [user_id, target_id] {
                    tx.execute(
                        "INSERT INTO room_members (id, room_id, user_id) VALUES (?1, ?2, ?3)",
                        rusqlite::params![
                            Uuid::new_v4().to_string(),
                            id,
                            member.to_string()
                        ],
                    )?;
                }
            }

            tx.commit()?;
            Ok(parse_uuid(&id))
        })
    }

    /// Room ids the user belongs to; used to subscribe a fresh connection.
    pub fn rooms_of(&self, user_id: Uuid) -> Result<Vec<Uuid>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT room_id FROM room_members WHERE user_id = ?1")?;
            let ids = stmt
                .query_map([user_id.to_string()], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(ids.iter().map(|s| parse_uuid(s)).collect())
        })
    }

    /// Authoritative membership check; performed before every sensitive
    /// action regardless of what the in-memory subscription set says.
    pub fn is_member(&self, room_id: Uuid, user_id: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            let found: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM room_members WHERE room_id = ?1 AND user_id = ?2",
                    [room_id.to_string(), user_id.to_string()],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    pub fn room_member_ids(&self, room_id: Uuid) -> Result<Vec<Uuid>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT user_id FROM room_members WHERE room_id = ?1")?;
            let ids = stmt
                .query_map([room_id.to_string()], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(ids.iter().map(|s| parse_uuid(s)).collect())
        })
    }

    /// "Read" always means "read up to now": the timestamp is overwritten
    /// unconditionally, so repeated calls are idempotent in effect.
    pub fn mark_read(&self, room_id: Uuid, user_id: Uuid) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE room_members SET last_read_at = ?1 WHERE room_id = ?2 AND user_id = ?3",
                rusqlite::params![now_text(), room_id.to_string(), user_id.to_string()],
            )?;
            Ok(())
        })
    }

    /// Room listing for the conversations screen: members, latest message,
    /// linked transaction, most recently active first.
    pub fn list_rooms(&self, user_id: Uuid) -> Result<Vec<Room>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT r.id, r.last_message_at, r.created_at
                 FROM rooms r
                 JOIN room_members rm ON rm.room_id = r.id
                 WHERE rm.user_id = ?1
                 ORDER BY r.last_message_at IS NULL, r.last_message_at DESC",
            )?;

            let heads = stmt
                .query_map([user_id.to_string()], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            heads
                .into_iter()
                .map(|(id, last_message_at, created_at)| {
                    assemble_room(conn, &id, last_message_at, created_at)
                })
                .collect()
        })
    }

    pub fn get_room(&self, room_id: Uuid) -> Result<Option<Room>> {
        self.with_conn(|conn| {
            let head = conn
                .query_row(
                    "SELECT id, last_message_at, created_at FROM rooms WHERE id = ?1",
                    [room_id.to_string()],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, Option<String>>(1)?,
                            row.get::<_, String>(2)?,
                        ))
                    },
                )
                .optional()?;

            match head {
                Some((id, last_message_at, created_at)) => {
                    Ok(Some(assemble_room(conn, &id, last_message_at, created_at)?))
                }
                None => Ok(None),
            }
        })
    }
}

fn assemble_room(
    conn: &rusqlite::Connection,
    id: &str,
    last_message_at: Option<String>,
    created_at: String,
) -> Result<Room> {
    let mut member_stmt = conn.prepare(
        "SELECT rm.user_id, u.nickname, rm.last_read_at
         FROM room_members rm
         JOIN users u ON u.id = rm.user_id
         WHERE rm.room_id = ?1",
    )?;
    let members = member_stmt
        .query_map([id], |row| {
            let uid: String = row.get(0)?;
            Ok(RoomMemberInfo {
                user_id: parse_uuid(&uid),
                nickname: row.get(1)?,
                last_read_at: parse_opt_ts(row.get(2)?),
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let last_message = conn
        .query_row(
            &format!(
                "SELECT {MESSAGE_COLS} FROM messages WHERE room_id = ?1
                 ORDER BY created_at DESC, seq DESC LIMIT 1"
            ),
            [id],
            message_from_row,
        )
        .optional()?;

    let transaction = conn
        .query_row(
            "SELECT id, title, status FROM transactions WHERE room_id = ?1
             ORDER BY created_at DESC LIMIT 1",
            [id],
            |row| {
                let tid: String = row.get(0)?;
                let status: String = row.get(2)?;
                Ok(TransactionSummary {
                    id: parse_uuid(&tid),
                    title: row.get(1)?,
                    status: TransactionStatus::from_db(&status)
                        .unwrap_or(TransactionStatus::Requested),
                })
            },
        )
        .optional()?;

    Ok(Room {
        id: parse_uuid(id),
        members,
        transaction,
        last_message,
        last_message_at: parse_opt_ts(last_message_at),
        created_at: parse_ts(&created_at),
    })
}
