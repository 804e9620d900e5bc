use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use uuid::Uuid;

use super::OptionalExt;
use crate::models::{MessageRow, NewMessage, opt_ts_at, opt_uuid_at, ts_at, uuid_at};
use crate::{Database, timestamp};

// JOIN both participants and the listing title in a single query (no N+1)
const MESSAGE_SELECT: &str = "SELECT m.id,
        m.sender_id, s.name, s.email,
        m.recipient_id, r.name, r.email,
        m.listing_id, l.title,
        m.subject, m.content, m.is_read, m.read_at, m.created_at
    FROM messages m
    JOIN users s ON s.id = m.sender_id
    JOIN users r ON r.id = m.recipient_id
    LEFT JOIN listings l ON l.id = m.listing_id";

const NEWEST_FIRST: &str = "ORDER BY m.created_at DESC, m.rowid DESC";
const OLDEST_FIRST: &str = "ORDER BY m.created_at ASC, m.rowid ASC";

impl Database {
    pub fn insert_message(&self, message: &NewMessage<'_>, now: DateTime<Utc>) -> Result<MessageRow> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (id, sender_id, recipient_id, listing_id, subject, content, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    message.id.to_string(),
                    message.sender_id.to_string(),
                    message.recipient_id.to_string(),
                    message.listing_id.map(|id| id.to_string()),
                    message.subject,
                    message.content,
                    timestamp(now),
                ],
            )?;
            query_message(conn, message.id)?
                .ok_or_else(|| anyhow::anyhow!("Message {} vanished after insert", message.id))
        })
    }

    pub fn get_message(&self, id: Uuid) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| query_message(conn, id))
    }

    /// Marks a message read on behalf of its recipient. `read_at` is only
    /// stamped on the first call. Returns `None` if no such message is
    /// addressed to `recipient_id`.
    pub fn mark_message_read(
        &self,
        id: Uuid,
        recipient_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<MessageRow>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "UPDATE messages SET is_read = 1, read_at = ?1
                 WHERE id = ?2 AND recipient_id = ?3 AND is_read = 0",
                (timestamp(now), id.to_string(), recipient_id.to_string()),
            )?;
            let row = query_message(&tx, id)?.filter(|m| m.recipient_id == recipient_id);
            tx.commit()?;
            Ok(row)
        })
    }

    pub fn list_inbox(&self, user_id: Uuid) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            query_messages(
                conn,
                &format!("{MESSAGE_SELECT} WHERE m.recipient_id = ?1 {NEWEST_FIRST}"),
                rusqlite::params![user_id.to_string()],
            )
        })
    }

    pub fn list_sent(&self, user_id: Uuid) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            query_messages(
                conn,
                &format!("{MESSAGE_SELECT} WHERE m.sender_id = ?1 {NEWEST_FIRST}"),
                rusqlite::params![user_id.to_string()],
            )
        })
    }

    /// Every message the user sent or received, newest first.
    pub fn list_messages_involving(&self, user_id: Uuid) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            query_messages(
                conn,
                &format!(
                    "{MESSAGE_SELECT} WHERE m.sender_id = ?1 OR m.recipient_id = ?1 {NEWEST_FIRST}"
                ),
                rusqlite::params![user_id.to_string()],
            )
        })
    }

    /// Opens a thread for `reader`: marks everything `other` sent them in this
    /// listing slot as read, then returns the whole thread oldest first. A
    /// `None` listing matches only messages with no listing.
    /// Returns the number of messages newly marked read alongside.
    pub fn open_thread(
        &self,
        reader: Uuid,
        other: Uuid,
        listing_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<(usize, Vec<MessageRow>)> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let reader = reader.to_string();
            let other = other.to_string();
            let listing = listing_id.map(|id| id.to_string());

            // `IS` compares NULL to NULL as equal, which is what keeps the
            // no-listing thread separate from every listing thread.
            let marked = tx.execute(
                "UPDATE messages SET is_read = 1, read_at = ?1
                 WHERE sender_id = ?2 AND recipient_id = ?3 AND listing_id IS ?4 AND is_read = 0",
                rusqlite::params![timestamp(now), other, reader, listing],
            )?;

            let thread = query_messages(
                &tx,
                &format!(
                    "{MESSAGE_SELECT}
                     WHERE ((m.sender_id = ?1 AND m.recipient_id = ?2)
                         OR (m.sender_id = ?2 AND m.recipient_id = ?1))
                       AND m.listing_id IS ?3
                     {OLDEST_FIRST}"
                ),
                rusqlite::params![reader, other, listing],
            )?;
            tx.commit()?;
            Ok((marked, thread))
        })
    }
}

fn query_message(conn: &Connection, id: Uuid) -> Result<Option<MessageRow>> {
    let mut stmt = conn.prepare(&format!("{MESSAGE_SELECT} WHERE m.id = ?1"))?;
    stmt.query_row([id.to_string()], message_from_row).optional()
}

fn query_messages(
    conn: &Connection,
    sql: &str,
    params: &[&dyn rusqlite::types::ToSql],
) -> Result<Vec<MessageRow>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, message_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn message_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: uuid_at(row, 0)?,
        sender_id: uuid_at(row, 1)?,
        sender_name: row.get(2)?,
        sender_email: row.get(3)?,
        recipient_id: uuid_at(row, 4)?,
        recipient_name: row.get(5)?,
        recipient_email: row.get(6)?,
        listing_id: opt_uuid_at(row, 7)?,
        listing_title: row.get(8)?,
        subject: row.get(9)?,
        content: row.get(10)?,
        is_read: row.get(11)?,
        read_at: opt_ts_at(row, 12)?,
        created_at: ts_at(row, 13)?,
    })
}
