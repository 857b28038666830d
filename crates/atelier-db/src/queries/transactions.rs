use anyhow::Result;
use rusqlite::OptionalExtension;
use uuid::Uuid;

use atelier_types::models::{Party, Transaction, TransactionStatus};

use crate::Database;
use crate::models::{TRANSACTION_COLS, now_text, transaction_from_row};

impl Database {
    pub fn create_transaction(
        &self,
        client_id: Uuid,
        artist_id: Uuid,
        room_id: Uuid,
        title: &str,
        description: &str,
        agreed_price: Option<i64>,
    ) -> Result<Transaction> {
        let id = Uuid::new_v4();

        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO transactions
                     (id, client_id, artist_id, room_id, title, description,
                      agreed_price, status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                rusqlite::params![
                    id.to_string(),
                    client_id.to_string(),
                    artist_id.to_string(),
                    room_id.to_string(),
                    title,
                    description,
                    agreed_price,
                    TransactionStatus::Requested.as_str(),
                    now_text()
                ],
            )?;

            let transaction = conn.query_row(
                &format!("SELECT {TRANSACTION_COLS} FROM transactions WHERE id = ?1"),
                [id.to_string()],
                transaction_from_row,
            )?;
            Ok(transaction)
        })
    }

    pub fn get_transaction(&self, id: Uuid) -> Result<Option<Transaction>> {
        self.with_conn(|conn| {
            let transaction = conn
                .query_row(
                    &format!("SELECT {TRANSACTION_COLS} FROM transactions WHERE id = ?1"),
                    [id.to_string()],
                    transaction_from_row,
                )
                .optional()?;
            Ok(transaction)
        })
    }

    pub fn list_transactions_for(&self, user_id: Uuid, side: Party) -> Result<Vec<Transaction>> {
        let column = match side {
            Party::Client => "client_id",
            Party::Artist => "artist_id",
        };

        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {TRANSACTION_COLS} FROM transactions
                 WHERE {column} = ?1
                 ORDER BY created_at DESC"
            ))?;
            let transactions = stmt
                .query_map([user_id.to_string()], transaction_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(transactions)
        })
    }

    /// Write the new status together with its lifecycle timestamp in a single
    /// UPDATE so the pair is never separately observable.
    pub fn update_transaction_status(
        &self,
        id: Uuid,
        to: TransactionStatus,
    ) -> Result<Transaction> {
        let now = now_text();

        self.with_conn(|conn| {
            conn.execute(
                "UPDATE transactions SET
                     status = ?1,
                     accepted_at  = CASE WHEN ?1 = 'ACCEPTED'  THEN ?2 ELSE accepted_at  END,
                     completed_at = CASE WHEN ?1 = 'COMPLETED' THEN ?2 ELSE completed_at END,
                     cancelled_at = CASE WHEN ?1 = 'CANCELLED' THEN ?2 ELSE cancelled_at END
                 WHERE id = ?3",
                rusqlite::params![to.as_str(), now, id.to_string()],
            )?;

            let transaction = conn.query_row(
                &format!("SELECT {TRANSACTION_COLS} FROM transactions WHERE id = ?1"),
                [id.to_string()],
                transaction_from_row,
            )?;
            Ok(transaction)
        })
    }

    /// COMPLETED -> REVIEWED, flipped by the review flow once both reviews
    /// exist. Guarded so a replay cannot flip anything else.
    pub fn mark_transaction_reviewed(&self, id: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE transactions SET status = 'REVIEWED'
                 WHERE id = ?1 AND status = 'COMPLETED'",
                [id.to_string()],
            )?;
            Ok(changed > 0)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atelier_types::models::UserRole;

    fn seed(db: &Database) -> (Uuid, Uuid, Uuid) {
        let client = Uuid::new_v4();
        let artist = Uuid::new_v4();
        db.create_user(client, "민준", Some(UserRole::Client)).unwrap();
        db.create_user(artist, "서연", Some(UserRole::Artist)).unwrap();
        let room = db.get_or_create_pair_room(client, artist).unwrap();
        (client, artist, room)
    }

    #[test]
    fn status_and_timestamp_move_together() {
        let db = Database::open_in_memory().unwrap();
        let (client, artist, room) = seed(&db);

        let tx = db
            .create_transaction(client, artist, room, "표지 일러스트", "설명", Some(50_000))
            .unwrap();
        assert_eq!(tx.status, TransactionStatus::Requested);
        assert!(tx.accepted_at.is_none());

        let tx = db
            .update_transaction_status(tx.id, TransactionStatus::Accepted)
            .unwrap();
        assert_eq!(tx.status, TransactionStatus::Accepted);
        assert!(tx.accepted_at.is_some());
        assert!(tx.completed_at.is_none());
        assert!(tx.cancelled_at.is_none());
    }

    #[test]
    fn reviewed_flip_requires_completed() {
        let db = Database::open_in_memory().unwrap();
        let (client, artist, room) = seed(&db);
        let tx = db
            .create_transaction(client, artist, room, "엠블럼", "설명", None)
            .unwrap();

        assert!(!db.mark_transaction_reviewed(tx.id).unwrap());

        db.update_transaction_status(tx.id, TransactionStatus::Accepted)
            .unwrap();
        db.update_transaction_status(tx.id, TransactionStatus::InProgress)
            .unwrap();
        db.update_transaction_status(tx.id, TransactionStatus::Completed)
            .unwrap();

        assert!(db.mark_transaction_reviewed(tx.id).unwrap());
        // Second flip is a no-op.
        assert!(!db.mark_transaction_reviewed(tx.id).unwrap());
    }

    #[test]
    fn listing_is_scoped_by_side() {
        let db = Database::open_in_memory().unwrap();
        let (client, artist, room) = seed(&db);
        db.create_transaction(client, artist, room, "배너", "설명", None)
            .unwrap();

        assert_eq!(db.list_transactions_for(client, Party::Client).unwrap().len(), 1);
        assert_eq!(db.list_transactions_for(client, Party::Artist).unwrap().len(), 0);
        assert_eq!(db.list_transactions_for(artist, Party::Artist).unwrap().len(), 1);
    }
}
