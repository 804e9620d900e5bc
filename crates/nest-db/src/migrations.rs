use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id              TEXT PRIMARY KEY,
                email           TEXT NOT NULL UNIQUE,
                name            TEXT NOT NULL,
                student_id      TEXT NOT NULL,
                course          TEXT NOT NULL,
                phone           TEXT,
                city            TEXT,
                password        TEXT NOT NULL,
                is_online       INTEGER NOT NULL DEFAULT 0,
                last_login      TEXT,
                last_activity   TEXT,
                created_at      TEXT NOT NULL,
                updated_at      TEXT NOT NULL
            );

            CREATE TABLE sessions (
                id          TEXT PRIMARY KEY,
                user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                created_at  TEXT NOT NULL,
                expires_at  TEXT NOT NULL
            );

            CREATE INDEX idx_sessions_user ON sessions(user_id);

            CREATE TABLE listings (
                id                      TEXT PRIMARY KEY,
                owner_id                TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                title                   TEXT NOT NULL,
                description             TEXT NOT NULL,
                location                TEXT NOT NULL,
                postcode                TEXT NOT NULL DEFAULT '',
                distance_to_transport   TEXT NOT NULL,
                price_pence             INTEGER NOT NULL,
                deposit_pence           INTEGER NOT NULL,
                bills                   TEXT NOT NULL,
                room_type               TEXT NOT NULL,
                furnished               TEXT NOT NULL,
                available_from          TEXT NOT NULL,
                min_stay_months         INTEGER NOT NULL DEFAULT 6,
                max_stay_months         INTEGER NOT NULL DEFAULT 12,
                image_1                 TEXT,
                image_2                 TEXT,
                image_3                 TEXT,
                image_4                 TEXT,
                image_5                 TEXT,
                amenities               TEXT NOT NULL DEFAULT '[]',
                status                  TEXT NOT NULL DEFAULT 'active',
                is_featured             INTEGER NOT NULL DEFAULT 0,
                is_verified             INTEGER NOT NULL DEFAULT 0,
                created_at              TEXT NOT NULL,
                updated_at              TEXT NOT NULL
            );

            CREATE INDEX idx_listings_status ON listings(status, created_at);
            CREATE INDEX idx_listings_owner ON listings(owner_id, created_at);

            CREATE TABLE messages (
                id              TEXT PRIMARY KEY,
                sender_id       TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                recipient_id    TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                listing_id      TEXT REFERENCES listings(id) ON DELETE CASCADE,
                subject         TEXT NOT NULL,
                content         TEXT NOT NULL,
                is_read         INTEGER NOT NULL DEFAULT 0,
                read_at         TEXT,
                created_at      TEXT NOT NULL,
                CHECK (sender_id <> recipient_id)
            );

            CREATE INDEX idx_messages_sender ON messages(sender_id, created_at);
            CREATE INDEX idx_messages_recipient ON messages(recipient_id, created_at);

            CREATE TABLE favorites (
                id          TEXT PRIMARY KEY,
                user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                listing_id  TEXT NOT NULL REFERENCES listings(id) ON DELETE CASCADE,
                created_at  TEXT NOT NULL,
                UNIQUE(user_id, listing_id)
            );

            CREATE TABLE reports (
                id              TEXT PRIMARY KEY,
                reporter_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                listing_id      TEXT REFERENCES listings(id) ON DELETE SET NULL,
                report_type     TEXT NOT NULL,
                description     TEXT NOT NULL,
                status          TEXT NOT NULL DEFAULT 'pending',
                admin_notes     TEXT NOT NULL DEFAULT '',
                reviewed_at     TEXT,
                created_at      TEXT NOT NULL,
                updated_at      TEXT NOT NULL
            );

            CREATE INDEX idx_reports_status ON reports(status, created_at);
            CREATE INDEX idx_reports_reporter ON reports(reporter_id, created_at);
            CREATE INDEX idx_reports_listing ON reports(listing_id, created_at);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();
        run(&conn).unwrap();

        let versions: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_version", [], |r| r.get(0))
            .unwrap();
        assert_eq!(versions, 1);
    }
}
