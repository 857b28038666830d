use anyhow::Result;
use rusqlite::OptionalExtension;
use uuid::Uuid;

use atelier_types::models::{Review, ReviewKind};

use crate::Database;
use crate::models::{REVIEW_COLS, now_text, review_from_row};

impl Database {
    pub fn insert_review(
        &self,
        transaction_id: Uuid,
        kind: ReviewKind,
        author_id: Uuid,
        target_id: Uuid,
        rating: u8,
        content: &str,
    ) -> Result<Review> {
        let id = Uuid::new_v4();

        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO reviews
                     (id, transaction_id, kind, author_id, target_id, rating, content, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    id.to_string(),
                    transaction_id.to_string(),
                    kind.as_str(),
                    author_id.to_string(),
                    target_id.to_string(),
                    rating as i64,
                    content,
                    now_text()
                ],
            )?;

            let review = conn.query_row(
                &format!("SELECT {REVIEW_COLS} FROM reviews WHERE id = ?1"),
                [id.to_string()],
                review_from_row,
            )?;
            Ok(review)
        })
    }

    pub fn review_exists(&self, transaction_id: Uuid, kind: ReviewKind) -> Result<bool> {
        self.with_conn(|conn| {
            let found: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM reviews WHERE transaction_id = ?1 AND kind = ?2",
                    rusqlite::params![transaction_id.to_string(), kind.as_str()],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    pub fn count_reviews(&self, transaction_id: Uuid) -> Result<u64> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM reviews WHERE transaction_id = ?1",
                [transaction_id.to_string()],
                |row| row.get(0),
            )?;
            Ok(count as u64)
        })
    }

    pub fn reviews_for_transaction(&self, transaction_id: Uuid) -> Result<Vec<Review>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {REVIEW_COLS} FROM reviews WHERE transaction_id = ?1
                 ORDER BY created_at"
            ))?;
            let reviews = stmt
                .query_map([transaction_id.to_string()], review_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(reviews)
        })
    }
}
