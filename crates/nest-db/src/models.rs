//! Database row types. Text columns are parsed into domain types at the row
//! boundary so callers never see raw storage strings.
use std::collections::BTreeSet;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::Row;
use rusqlite::types::Type;
use uuid::Uuid;

use nest_types::models::{
    Amenity, Bills, Furnished, ImageSlots, ListingStatus, ReportKind, ReportStatus, RoomType,
};

pub struct UserRow {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub student_id: String,
    pub course: String,
    pub phone: Option<String>,
    pub city: Option<String>,
    pub password: String,
    pub is_online: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub last_activity: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub struct NewUser<'a> {
    pub id: Uuid,
    pub email: &'a str,
    pub name: &'a str,
    pub student_id: &'a str,
    pub course: &'a str,
    pub phone: Option<&'a str>,
    pub city: Option<&'a str>,
    pub password_hash: &'a str,
}

pub struct SessionRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Owner-editable listing attributes, written whole on insert and update.
#[derive(Debug, Clone, PartialEq)]
pub struct ListingFields {
    pub title: String,
    pub description: String,
    pub location: String,
    pub postcode: String,
    pub distance_to_transport: String,
    pub price_pence: i64,
    pub deposit_pence: i64,
    pub bills: Bills,
    pub room_type: RoomType,
    pub furnished: Furnished,
    pub available_from: NaiveDate,
    pub min_stay_months: i64,
    pub max_stay_months: i64,
    pub images: ImageSlots,
    pub amenities: BTreeSet<Amenity>,
}

pub struct ListingRow {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub owner_name: String,
    pub owner_email: String,
    pub fields: ListingFields,
    pub status: ListingStatus,
    pub is_featured: bool,
    pub is_verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub struct NewMessage<'a> {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub recipient_id: Uuid,
    pub listing_id: Option<Uuid>,
    pub subject: &'a str,
    pub content: &'a str,
}

/// A message joined with both participants and the listing title.
#[derive(Debug, Clone)]
pub struct MessageRow {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub sender_name: String,
    pub sender_email: String,
    pub recipient_id: Uuid,
    pub recipient_name: String,
    pub recipient_email: String,
    pub listing_id: Option<Uuid>,
    pub listing_title: Option<String>,
    pub subject: String,
    pub content: String,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

pub struct ReportedListingRow {
    pub id: Uuid,
    pub title: String,
    pub location: String,
    pub price_pence: i64,
}

pub struct ReportRow {
    pub id: Uuid,
    pub reporter_id: Uuid,
    pub reporter_name: String,
    pub reporter_email: String,
    pub listing: Option<ReportedListingRow>,
    pub report_type: ReportKind,
    pub description: String,
    pub status: ReportStatus,
    pub admin_notes: String,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Result of asking the store to move a report to a new status.
pub enum ReportTransition {
    Moved(ReportRow),
    /// The report sits at a status it cannot leave for the requested one.
    Refused(ReportStatus),
    Missing,
}

// -- Column decoding --

fn conversion_failure<E>(idx: usize, ty: Type, e: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, ty, Box::new(e))
}

pub(crate) fn uuid_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let s: String = row.get(idx)?;
    s.parse().map_err(|e| conversion_failure(idx, Type::Text, e))
}

pub(crate) fn opt_uuid_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Uuid>> {
    let s: Option<String> = row.get(idx)?;
    s.map(|s| s.parse().map_err(|e| conversion_failure(idx, Type::Text, e)))
        .transpose()
}

pub(crate) fn ts_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let s: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_failure(idx, Type::Text, e))
}

pub(crate) fn opt_ts_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let s: Option<String> = row.get(idx)?;
    s.map(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| conversion_failure(idx, Type::Text, e))
    })
    .transpose()
}

pub(crate) fn parsed_at<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let s: String = row.get(idx)?;
    s.parse().map_err(|e| conversion_failure(idx, Type::Text, e))
}

pub(crate) fn date_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<NaiveDate> {
    let s: String = row.get(idx)?;
    NaiveDate::parse_from_str(&s, "%Y-%m-%d").map_err(|e| conversion_failure(idx, Type::Text, e))
}

pub(crate) fn amenities_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<BTreeSet<Amenity>> {
    let s: String = row.get(idx)?;
    serde_json::from_str(&s).map_err(|e| conversion_failure(idx, Type::Text, e))
}
