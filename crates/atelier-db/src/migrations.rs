use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id          TEXT PRIMARY KEY,
            nickname    TEXT NOT NULL,
            role        TEXT,
            created_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS rooms (
            id               TEXT PRIMARY KEY,
            pair_key         TEXT UNIQUE,
            last_message_at  TEXT,
            created_at       TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS room_members (
            id            TEXT PRIMARY KEY,
            room_id       TEXT NOT NULL REFERENCES rooms(id),
            user_id       TEXT NOT NULL REFERENCES users(id),
            last_read_at  TEXT,
            UNIQUE(room_id, user_id)
        );

        CREATE INDEX IF NOT EXISTS idx_room_members_user
            ON room_members(user_id);

        -- seq is the monotonic tiebreaker for messages sharing a timestamp
        CREATE TABLE IF NOT EXISTS messages (
            seq         INTEGER PRIMARY KEY AUTOINCREMENT,
            id          TEXT NOT NULL UNIQUE,
            room_id     TEXT NOT NULL REFERENCES rooms(id),
            sender_id   TEXT NOT NULL REFERENCES users(id),
            kind        TEXT NOT NULL,
            content     TEXT NOT NULL,
            file_url    TEXT,
            created_at  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_messages_room
            ON messages(room_id, created_at, seq);

        CREATE TABLE IF NOT EXISTS transactions (
            id            TEXT PRIMARY KEY,
            client_id     TEXT NOT NULL REFERENCES users(id),
            artist_id     TEXT NOT NULL REFERENCES users(id),
            room_id       TEXT NOT NULL REFERENCES rooms(id),
            title         TEXT NOT NULL,
            description   TEXT NOT NULL,
            agreed_price  INTEGER,
            status        TEXT NOT NULL,
            created_at    TEXT NOT NULL,
            accepted_at   TEXT,
            completed_at  TEXT,
            cancelled_at  TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_transactions_client
            ON transactions(client_id, created_at);
        CREATE INDEX IF NOT EXISTS idx_transactions_artist
            ON transactions(artist_id, created_at);

        CREATE TABLE IF NOT EXISTS reviews (
            id              TEXT PRIMARY KEY,
            transaction_id  TEXT NOT NULL REFERENCES transactions(id),
            kind            TEXT NOT NULL,
            author_id       TEXT NOT NULL REFERENCES users(id),
            target_id       TEXT NOT NULL REFERENCES users(id),
            rating          INTEGER NOT NULL,
            content         TEXT NOT NULL,
            created_at      TEXT NOT NULL,
            UNIQUE(transaction_id, kind)
        );

        CREATE TABLE IF NOT EXISTS notifications (
            id             TEXT PRIMARY KEY,
            user_id        TEXT NOT NULL REFERENCES users(id),
            kind           TEXT NOT NULL,
            title          TEXT NOT NULL,
            content        TEXT NOT NULL,
            metadata       TEXT,
            is_read        INTEGER NOT NULL DEFAULT 0,
            read_at        TEXT,
            sent_channels  TEXT NOT NULL DEFAULT '[]',
            created_at     TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_notifications_user
            ON notifications(user_id, is_read, created_at);

        CREATE TABLE IF NOT EXISTS notification_settings (
            id                     TEXT PRIMARY KEY,
            user_id                TEXT NOT NULL UNIQUE REFERENCES users(id),
            enable_in_app          INTEGER NOT NULL DEFAULT 1,
            enable_email           INTEGER NOT NULL DEFAULT 1,
            enable_push            INTEGER NOT NULL DEFAULT 1,
            notify_on_message      INTEGER NOT NULL DEFAULT 1,
            notify_on_transaction  INTEGER NOT NULL DEFAULT 1,
            notify_on_review       INTEGER NOT NULL DEFAULT 1,
            created_at             TEXT NOT NULL
        );
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
