use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use uuid::Uuid;

use super::OptionalExt;
use crate::models::{NewUser, UserRow, opt_ts_at, ts_at, uuid_at};
use crate::{Database, timestamp};

const USER_COLUMNS: &str = "id, email, name, student_id, course, phone, city, password,
    is_online, last_login, last_activity, created_at, updated_at";

impl Database {
    /// Inserts the account already signed in: presence online, `last_login`
    /// stamped and a first session opened, all in one transaction.
    /// Returns false, writing nothing, when the email is taken.
    pub fn create_user(
        &self,
        user: &NewUser<'_>,
        session_id: Uuid,
        session_expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let now = timestamp(now);
            let inserted = tx.execute(
                "INSERT INTO users
                    (id, email, name, student_id, course, phone, city, password,
                     is_online, last_login, last_activity, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 1, ?9, ?9, ?9, ?9)
                 ON CONFLICT(email) DO NOTHING",
                rusqlite::params![
                    user.id.to_string(),
                    user.email,
                    user.name,
                    user.student_id,
                    user.course,
                    user.phone,
                    user.city,
                    user.password_hash,
                    now,
                ],
            )?;
            if inserted == 0 {
                return Ok(false);
            }

            tx.execute(
                "INSERT INTO sessions (id, user_id, created_at, expires_at) VALUES (?1, ?2, ?3, ?4)",
                (session_id.to_string(), user.id.to_string(), &now, timestamp(session_expires_at)),
            )?;
            tx.commit()?;
            Ok(true)
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "email", email))
    }

    pub fn get_user_by_id(&self, id: Uuid) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", &id.to_string()))
    }

    /// Heartbeat: stamps `last_activity` and sets the online flag.
    /// Returns false if the account does not exist.
    pub fn touch_activity(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool> {
        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE users SET last_activity = ?1, is_online = 1 WHERE id = ?2",
                (timestamp(now), id.to_string()),
            )?;
            Ok(updated == 1)
        })
    }

    pub fn mark_offline(&self, id: Uuid, now: DateTime<Utc>) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE users SET is_online = 0, updated_at = ?1 WHERE id = ?2",
                (timestamp(now), id.to_string()),
            )?;
            Ok(())
        })
    }

    /// Accounts flagged online whose last activity is at or after `since`.
    pub fn list_online_users(&self, since: DateTime<Utc>) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {USER_COLUMNS} FROM users
                 WHERE is_online = 1 AND last_activity >= ?1
                 ORDER BY last_activity DESC"
            ))?;
            let rows = stmt
                .query_map([timestamp(since)], user_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Removes the account; sessions, listings, messages, favorites and filed
    /// reports go with it.
    pub fn delete_user(&self, id: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            let deleted = conn.execute("DELETE FROM users WHERE id = ?1", [id.to_string()])?;
            Ok(deleted == 1)
        })
    }
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(&format!("SELECT {USER_COLUMNS} FROM users WHERE {column} = ?1"))?;
    stmt.query_row([value], user_from_row).optional()
}

fn user_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: uuid_at(row, 0)?,
        email: row.get(1)?,
        name: row.get(2)?,
        student_id: row.get(3)?,
        course: row.get(4)?,
        phone: row.get(5)?,
        city: row.get(6)?,
        password: row.get(7)?,
        is_online: row.get(8)?,
        last_login: opt_ts_at(row, 9)?,
        last_activity: opt_ts_at(row, 10)?,
        created_at: ts_at(row, 11)?,
        updated_at: ts_at(row, 12)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::queries::fixtures;

    #[test]
    fn duplicate_email_is_rejected_without_writing() {
        let db = Database::open_in_memory().unwrap();
        let first = fixtures::user(&db, "ana@uni.ac.uk");

        let taken = db
            .create_user(
                &NewUser {
                    id: Uuid::new_v4(),
                    email: "ana@uni.ac.uk",
                    name: "Impostor",
                    student_id: "87654321",
                    course: "Law",
                    phone: None,
                    city: None,
                    password_hash: "x",
                },
                Uuid::new_v4(),
                Utc::now(),
                Utc::now(),
            )
            .unwrap();

        assert!(!taken);
        let stored = db.get_user_by_email("ana@uni.ac.uk").unwrap().unwrap();
        assert_eq!(stored.id, first);
        assert_eq!(stored.name, "Test Student");
    }

    #[test]
    fn new_accounts_start_online() {
        let db = Database::open_in_memory().unwrap();
        let id = fixtures::user(&db, "ben@uni.ac.uk");

        let user = db.get_user_by_id(id).unwrap().unwrap();
        assert!(user.is_online);
        assert!(user.last_login.is_some());
        assert_eq!(user.last_login, user.last_activity);
    }

    #[test]
    fn online_listing_respects_flag_and_cutoff() {
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();
        let fresh = fixtures::user(&db, "fresh@uni.ac.uk");
        let stale = fixtures::user(&db, "stale@uni.ac.uk");
        let gone = fixtures::user(&db, "gone@uni.ac.uk");

        db.touch_activity(fresh, now).unwrap();
        db.touch_activity(stale, now - Duration::minutes(30)).unwrap();
        db.mark_offline(gone, now).unwrap();

        let online: Vec<Uuid> = db
            .list_online_users(now - Duration::minutes(10))
            .unwrap()
            .into_iter()
            .map(|u| u.id)
            .collect();
        assert_eq!(online, vec![fresh]);
    }
}
