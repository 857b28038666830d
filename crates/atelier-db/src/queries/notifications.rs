use anyhow::Result;
use rusqlite::OptionalExtension;
use uuid::Uuid;

use atelier_types::api::UpdateSettingsRequest;
use atelier_types::models::{Notification, NotificationKind, NotificationSettings};

use crate::Database;
use crate::models::{NOTIFICATION_COLS, notification_from_row, now_text, settings_from_row};

const SETTINGS_COLS: &str = "user_id, enable_in_app, enable_email, enable_push, \
     notify_on_message, notify_on_transaction, notify_on_review";

impl Database {
    pub fn insert_notification(
        &self,
        user_id: Uuid,
        kind: NotificationKind,
        title: &str,
        content: &str,
        metadata: Option<&serde_json::Value>,
    ) -> Result<Notification> {
        let id = Uuid::new_v4();

        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO notifications
                     (id, user_id, kind, title, content, metadata, sent_channels, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    id.to_string(),
                    user_id.to_string(),
                    kind.as_str(),
                    title,
                    content,
                    metadata.map(|m| m.to_string()),
                    r#"["IN_APP"]"#,
                    now_text()
                ],
            )?;

            let notification = conn.query_row(
                &format!("SELECT {NOTIFICATION_COLS} FROM notifications WHERE id = ?1"),
                [id.to_string()],
                notification_from_row,
            )?;
            Ok(notification)
        })
    }

    pub fn list_notifications(
        &self,
        user_id: Uuid,
        skip: u64,
        take: u64,
    ) -> Result<(Vec<Notification>, u64)> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {NOTIFICATION_COLS} FROM notifications
                 WHERE user_id = ?1
                 ORDER BY created_at DESC
                 LIMIT ?2 OFFSET ?3"
            ))?;
            let notifications = stmt
                .query_map(
                    rusqlite::params![user_id.to_string(), take as i64, skip as i64],
                    notification_from_row,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let total: i64 = conn.query_row(
                "SELECT COUNT(*) FROM notifications WHERE user_id = ?1",
                [user_id.to_string()],
                |row| row.get(0),
            )?;

            Ok((notifications, total as u64))
        })
    }

    pub fn unread_notification_count(&self, user_id: Uuid) -> Result<u64> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM notifications WHERE user_id = ?1 AND is_read = 0",
                [user_id.to_string()],
                |row| row.get(0),
            )?;
            Ok(count as u64)
        })
    }

    /// Returns None when the notification does not exist (or belongs to
    /// someone else), Some(false) when it was already read.
    pub fn mark_notification_read(
        &self,
        user_id: Uuid,
        notification_id: Uuid,
    ) -> Result<Option<bool>> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE notifications SET is_read = 1, read_at = ?1
                 WHERE id = ?2 AND user_id = ?3 AND is_read = 0",
                rusqlite::params![now_text(), notification_id.to_string(), user_id.to_string()],
            )?;
            if changed > 0 {
                return Ok(Some(true));
            }

            let exists: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM notifications WHERE id = ?1 AND user_id = ?2",
                    [notification_id.to_string(), user_id.to_string()],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(exists.map(|_| false))
        })
    }

    pub fn mark_all_notifications_read(&self, user_id: Uuid) -> Result<u64> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE notifications SET is_read = 1, read_at = ?1
                 WHERE user_id = ?2 AND is_read = 0",
                rusqlite::params![now_text(), user_id.to_string()],
            )?;
            Ok(changed as u64)
        })
    }

    /// Settings are created lazily with everything enabled. The UNIQUE
    /// constraint on user_id turns a lost creation race into "fetch existing".
    pub fn get_or_create_settings(&self, user_id: Uuid) -> Result<NotificationSettings> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO notification_settings (id, user_id, created_at)
                 VALUES (?1, ?2, ?3)",
                rusqlite::params![Uuid::new_v4().to_string(), user_id.to_string(), now_text()],
            )?;

            let settings = conn.query_row(
                &format!("SELECT {SETTINGS_COLS} FROM notification_settings WHERE user_id = ?1"),
                [user_id.to_string()],
                settings_from_row,
            )?;
            Ok(settings)
        })
    }

    pub fn update_settings(
        &self,
        user_id: Uuid,
        patch: &UpdateSettingsRequest,
    ) -> Result<NotificationSettings> {
        // Ensure the row exists before patching it.
        self.get_or_create_settings(user_id)?;

        self.with_conn(|conn| {
            conn.execute(
                "UPDATE notification_settings SET
                     enable_in_app         = COALESCE(?1, enable_in_app),
                     enable_email          = COALESCE(?2, enable_email),
                     enable_push           = COALESCE(?3, enable_push),
                     notify_on_message     = COALESCE(?4, notify_on_message),
                     notify_on_transaction = COALESCE(?5, notify_on_transaction),
                     notify_on_review      = COALESCE(?6, notify_on_review)
                 WHERE user_id = ?7",
                rusqlite::params![
                    patch.enable_in_app,
                    patch.enable_email,
                    patch.enable_push,
                    patch.notify_on_message,
                    patch.notify_on_transaction,
                    patch.notify_on_review,
                    user_id.to_string()
                ],
            )?;

            let settings = conn.query_row(
                &format!("SELECT {SETTINGS_COLS} FROM notification_settings WHERE user_id = ?1"),
                [user_id.to_string()],
                settings_from_row,
            )?;
            Ok(settings)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(db: &Database) -> Uuid {
        let id = Uuid::new_v4();
        db.create_user(id, "예린", None).unwrap();
        id
    }

    #[test]
    fn settings_default_to_all_enabled() {
        let db = Database::open_in_memory().unwrap();
        let uid = user(&db);

        let settings = db.get_or_create_settings(uid).unwrap();
        assert!(settings.enable_in_app);
        assert!(settings.enable_email);
        assert!(settings.enable_push);
        assert!(settings.notify_on_message);
        assert!(settings.notify_on_transaction);
        assert!(settings.notify_on_review);

        // Second access reuses the same row.
        let again = db.get_or_create_settings(uid).unwrap();
        assert_eq!(again.user_id, uid);
    }

    #[test]
    fn settings_patch_is_partial() {
        let db = Database::open_in_memory().unwrap();
        let uid = user(&db);

        let patch = UpdateSettingsRequest {
            notify_on_message: Some(false),
            ..Default::default()
        };
        let settings = db.update_settings(uid, &patch).unwrap();
        assert!(!settings.notify_on_message);
        assert!(settings.notify_on_transaction);
        assert!(settings.enable_in_app);
    }

    #[test]
    fn marking_read_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        let uid = user(&db);

        let n = db
            .insert_notification(uid, NotificationKind::ChatMessage, "새 메시지", "안녕", None)
            .unwrap();
        assert_eq!(db.unread_notification_count(uid).unwrap(), 1);

        assert_eq!(db.mark_notification_read(uid, n.id).unwrap(), Some(true));
        assert_eq!(db.mark_notification_read(uid, n.id).unwrap(), Some(false));
        assert_eq!(db.unread_notification_count(uid).unwrap(), 0);

        // Unknown id -> None
        assert_eq!(db.mark_notification_read(uid, Uuid::new_v4()).unwrap(), None);
    }

    #[test]
    fn mark_all_reports_how_many_flipped() {
        let db = Database::open_in_memory().unwrap();
        let uid = user(&db);

        for i in 0..3 {
            db.insert_notification(
                uid,
                NotificationKind::TransactionRequest,
                "새 의뢰 요청",
                &format!("의뢰 {i}"),
                None,
            )
            .unwrap();
        }

        assert_eq!(db.mark_all_notifications_read(uid).unwrap(), 3);
        assert_eq!(db.mark_all_notifications_read(uid).unwrap(), 0);
        assert_eq!(db.unread_notification_count(uid).unwrap(), 0);
    }
}
