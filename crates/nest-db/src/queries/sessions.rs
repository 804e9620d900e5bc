use anyhow::Result;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::OptionalExt;
use crate::models::{SessionRow, ts_at, uuid_at};
use crate::{Database, timestamp};

impl Database {
    /// Login: marks the user online, stamps `last_login`/`last_activity` and
    /// opens a session in one transaction.
    pub fn start_session(
        &self,
        user_id: Uuid,
        session_id: Uuid,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let now = timestamp(now);
            tx.execute(
                "UPDATE users SET is_online = 1, last_login = ?1, last_activity = ?1 WHERE id = ?2",
                (&now, user_id.to_string()),
            )?;
            tx.execute(
                "INSERT INTO sessions (id, user_id, created_at, expires_at) VALUES (?1, ?2, ?3, ?4)",
                (session_id.to_string(), user_id.to_string(), &now, timestamp(expires_at)),
            )?;
            tx.commit()?;
            Ok(())
        })
    }

    pub fn get_session(&self, id: Uuid) -> Result<Option<SessionRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, user_id, created_at, expires_at FROM sessions WHERE id = ?1",
                [id.to_string()],
                |row| {
                    Ok(SessionRow {
                        id: uuid_at(row, 0)?,
                        user_id: uuid_at(row, 1)?,
                        created_at: ts_at(row, 2)?,
                        expires_at: ts_at(row, 3)?,
                    })
                },
            )
            .optional()
        })
    }

    pub fn delete_session(&self, id: Uuid) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM sessions WHERE id = ?1", [id.to_string()])?;
            Ok(())
        })
    }

    pub fn purge_expired_sessions(&self, now: DateTime<Utc>) -> Result<usize> {
        self.with_conn(|conn| {
            let purged = conn.execute("DELETE FROM sessions WHERE expires_at <= ?1", [timestamp(now)])?;
            Ok(purged)
        })
    }
}
