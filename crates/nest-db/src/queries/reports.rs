use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use uuid::Uuid;

use nest_types::models::{ReportKind, ReportStatus};

use super::OptionalExt;
use crate::models::{ReportRow, ReportTransition, ReportedListingRow, opt_ts_at, opt_uuid_at, parsed_at, ts_at, uuid_at};
use crate::{Database, timestamp};

const REPORT_SELECT: &str = "SELECT r.id, r.reporter_id, u.name, u.email,
        r.listing_id, l.title, l.location, l.price_pence,
        r.report_type, r.description, r.status, r.admin_notes,
        r.reviewed_at, r.created_at, r.updated_at
    FROM reports r
    JOIN users u ON u.id = r.reporter_id
    LEFT JOIN listings l ON l.id = r.listing_id";

impl Database {
    pub fn insert_report(
        &self,
        id: Uuid,
        reporter_id: Uuid,
        listing_id: Uuid,
        kind: ReportKind,
        description: &str,
        now: DateTime<Utc>,
    ) -> Result<ReportRow> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO reports (id, reporter_id, listing_id, report_type, description, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
                rusqlite::params![
                    id.to_string(),
                    reporter_id.to_string(),
                    listing_id.to_string(),
                    kind.as_str(),
                    description,
                    ReportStatus::Pending.as_str(),
                    timestamp(now),
                ],
            )?;
            query_report(conn, id)?.ok_or_else(|| anyhow::anyhow!("Report {} vanished after insert", id))
        })
    }

    pub fn get_report(&self, id: Uuid) -> Result<Option<ReportRow>> {
        self.with_conn(|conn| query_report(conn, id))
    }

    pub fn list_reports_by_reporter(&self, reporter_id: Uuid) -> Result<Vec<ReportRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{REPORT_SELECT} WHERE r.reporter_id = ?1 ORDER BY r.created_at DESC, r.rowid DESC"
            ))?;
            let rows = stmt
                .query_map([reporter_id.to_string()], report_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Moderation queue, newest first, optionally restricted to one status.
    pub fn list_reports(&self, status: Option<ReportStatus>) -> Result<Vec<ReportRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{REPORT_SELECT} WHERE (?1 IS NULL OR r.status = ?1) ORDER BY r.created_at DESC, r.rowid DESC"
            ))?;
            let rows = stmt
                .query_map([status.map(ReportStatus::as_str)], report_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Moves a report forward to `next` if its current status allows it,
    /// stamping `reviewed_at`. Notes replace the existing admin notes only
    /// when supplied. The check and the write share one transaction.
    pub fn transition_report(
        &self,
        id: Uuid,
        next: ReportStatus,
        notes: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<ReportTransition> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let Some(current) = tx
                .query_row("SELECT status FROM reports WHERE id = ?1", [id.to_string()], |row| {
                    parsed_at::<ReportStatus>(row, 0)
                })
                .optional()?
            else {
                return Ok(ReportTransition::Missing);
            };
            if !current.can_transition_to(next) || !update_status_from(&tx, id, current, next, notes, now)? {
                return Ok(ReportTransition::Refused(current));
            }

            let row = query_report(&tx, id)?
                .ok_or_else(|| anyhow::anyhow!("Report {} vanished during transition", id))?;
            tx.commit()?;
            Ok(ReportTransition::Moved(row))
        })
    }
}

/// Writes `to` only while the report is still at `from`. Returns whether a
/// row changed.
fn update_status_from(
    conn: &Connection,
    id: Uuid,
    from: ReportStatus,
    to: ReportStatus,
    notes: Option<&str>,
    now: DateTime<Utc>,
) -> Result<bool> {
    let updated = conn.execute(
        "UPDATE reports
         SET status = ?1, reviewed_at = ?2, updated_at = ?2, admin_notes = COALESCE(?3, admin_notes)
         WHERE id = ?4 AND status = ?5",
        rusqlite::params![to.as_str(), timestamp(now), notes, id.to_string(), from.as_str()],
    )?;
    Ok(updated == 1)
}

fn query_report(conn: &Connection, id: Uuid) -> Result<Option<ReportRow>> {
    let mut stmt = conn.prepare(&format!("{REPORT_SELECT} WHERE r.id = ?1"))?;
    stmt.query_row([id.to_string()], report_from_row).optional()
}

fn report_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ReportRow> {
    // The listing columns are all NULL once the listing row is gone.
    let listing = match (opt_uuid_at(row, 4)?, row.get::<_, Option<String>>(5)?) {
        (Some(id), Some(title)) => Some(ReportedListingRow {
            id,
            title,
            location: row.get(6)?,
            price_pence: row.get(7)?,
        }),
        _ => None,
    };

    Ok(ReportRow {
        id: uuid_at(row, 0)?,
        reporter_id: uuid_at(row, 1)?,
        reporter_name: row.get(2)?,
        reporter_email: row.get(3)?,
        listing,
        report_type: parsed_at(row, 8)?,
        description: row.get(9)?,
        status: parsed_at(row, 10)?,
        admin_notes: row.get(11)?,
        reviewed_at: opt_ts_at(row, 12)?,
        created_at: ts_at(row, 13)?,
        updated_at: ts_at(row, 14)?,
    })
}
