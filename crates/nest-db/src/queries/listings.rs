use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::types::ToSql;
use uuid::Uuid;

use nest_types::api::ListingQuery;
use nest_types::models::{ImageSlots, ListingStatus, MAX_IMAGES};

use super::OptionalExt;
use crate::models::{
    ListingFields, ListingRow, amenities_at, date_at, parsed_at, ts_at, uuid_at,
};
use crate::{Database, timestamp};

/// Owner-editable columns, in the order `Encoded::values` binds them.
const FIELD_COLUMNS: [&str; 19] = [
    "title",
    "description",
    "location",
    "postcode",
    "distance_to_transport",
    "price_pence",
    "deposit_pence",
    "bills",
    "room_type",
    "furnished",
    "available_from",
    "min_stay_months",
    "max_stay_months",
    "image_1",
    "image_2",
    "image_3",
    "image_4",
    "image_5",
    "amenities",
];

pub(super) const LISTING_SELECT: &str = "SELECT l.id, l.owner_id, u.name, u.email,
        l.title, l.description, l.location, l.postcode, l.distance_to_transport,
        l.price_pence, l.deposit_pence, l.bills, l.room_type, l.furnished,
        l.available_from, l.min_stay_months, l.max_stay_months,
        l.image_1, l.image_2, l.image_3, l.image_4, l.image_5, l.amenities,
        l.status, l.is_featured, l.is_verified, l.created_at, l.updated_at
    FROM listings l
    JOIN users u ON u.id = l.owner_id";

impl Database {
    pub fn insert_listing(
        &self,
        id: Uuid,
        owner_id: Uuid,
        fields: &ListingFields,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let columns = FIELD_COLUMNS.join(", ");
        let placeholders = (4..4 + FIELD_COLUMNS.len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT INTO listings (id, owner_id, created_at, updated_at, {columns})
             VALUES (?1, ?2, ?3, ?3, {placeholders})"
        );

        self.with_conn(|conn| {
            let encoded = Encoded::new(fields)?;
            let id = id.to_string();
            let owner_id = owner_id.to_string();
            let now = timestamp(now);

            let mut params: Vec<&dyn ToSql> = vec![&id, &owner_id, &now];
            params.extend(encoded.values(fields));
            conn.execute(&sql, params.as_slice())?;
            Ok(())
        })
    }

    /// Overwrites every owner-editable column.
    pub fn update_listing(&self, id: Uuid, fields: &ListingFields, now: DateTime<Utc>) -> Result<bool> {
        let assignments = FIELD_COLUMNS
            .iter()
            .enumerate()
            .map(|(i, col)| format!("{col} = ?{}", i + 3))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!("UPDATE listings SET updated_at = ?2, {assignments} WHERE id = ?1");

        self.with_conn(|conn| {
            let encoded = Encoded::new(fields)?;
            let id = id.to_string();
            let now = timestamp(now);

            let mut params: Vec<&dyn ToSql> = vec![&id, &now];
            params.extend(encoded.values(fields));
            let updated = conn.execute(&sql, params.as_slice())?;
            Ok(updated == 1)
        })
    }

    /// Any status; callers decide whether withdrawn listings are visible.
    pub fn get_listing(&self, id: Uuid) -> Result<Option<ListingRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!("{LISTING_SELECT} WHERE l.id = ?1"))?;
            stmt.query_row([id.to_string()], listing_from_row).optional()
        })
    }

    pub fn set_listing_status(&self, id: Uuid, status: ListingStatus, now: DateTime<Utc>) -> Result<bool> {
        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE listings SET status = ?1, updated_at = ?2 WHERE id = ?3",
                (status.as_str(), timestamp(now), id.to_string()),
            )?;
            Ok(updated == 1)
        })
    }

    /// Active listings matching every supplied filter, newest first.
    pub fn list_active_listings(&self, query: &ListingQuery) -> Result<Vec<ListingRow>> {
        let mut clauses = vec!["l.status = 'active'".to_string()];
        let mut values: Vec<Box<dyn ToSql>> = Vec::new();
        let mut push = |clause: &str, value: Box<dyn ToSql>| {
            values.push(value);
            clauses.push(clause.replace('?', &format!("?{}", values.len())));
        };

        if let Some(location) = query.location.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            // Plain substring match; user text never acts as a LIKE pattern.
            push("instr(lower(l.location), lower(?)) > 0", Box::new(location.to_string()));
        }
        if let Some(min) = query.min_price {
            push("l.price_pence >= ?", Box::new(min));
        }
        if let Some(max) = query.max_price {
            push("l.price_pence <= ?", Box::new(max));
        }
        if let Some(room_type) = query.room_type {
            push("l.room_type = ?", Box::new(room_type.as_str()));
        }
        if let Some(furnished) = query.furnished {
            push("l.furnished = ?", Box::new(furnished.as_str()));
        }
        if let Some(bills) = query.bills {
            push("l.bills = ?", Box::new(bills.as_str()));
        }
        if let Some(amenity) = query.amenity {
            // amenities is a JSON array of quoted names
            push("l.amenities LIKE ?", Box::new(format!("%\"{}\"%", amenity.as_str())));
        }

        let sql = format!(
            "{LISTING_SELECT} WHERE {} ORDER BY l.created_at DESC, l.rowid DESC",
            clauses.join(" AND ")
        );

        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let params: Vec<&dyn ToSql> = values.iter().map(|v| v.as_ref()).collect();
            let rows = stmt
                .query_map(params.as_slice(), listing_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn list_listings_by_owner(&self, owner_id: Uuid) -> Result<Vec<ListingRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{LISTING_SELECT}
                 WHERE l.owner_id = ?1 AND l.status = 'active'
                 ORDER BY l.created_at DESC, l.rowid DESC"
            ))?;
            let rows = stmt
                .query_map([owner_id.to_string()], listing_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

/// Text forms of the listing columns that are not stored as-is.
struct Encoded {
    bills: &'static str,
    room_type: &'static str,
    furnished: &'static str,
    available_from: String,
    amenities: String,
}

impl Encoded {
    fn new(fields: &ListingFields) -> Result<Self> {
        Ok(Self {
            bills: fields.bills.as_str(),
            room_type: fields.room_type.as_str(),
            furnished: fields.furnished.as_str(),
            available_from: fields.available_from.format("%Y-%m-%d").to_string(),
            amenities: serde_json::to_string(&fields.amenities)?,
        })
    }

    /// Binds `FIELD_COLUMNS` in order.
    fn values<'a>(&'a self, fields: &'a ListingFields) -> Vec<&'a dyn ToSql> {
        let mut values: Vec<&dyn ToSql> = vec![
            &fields.title,
            &fields.description,
            &fields.location,
            &fields.postcode,
            &fields.distance_to_transport,
            &fields.price_pence,
            &fields.deposit_pence,
            &self.bills,
            &self.room_type,
            &self.furnished,
            &self.available_from,
            &fields.min_stay_months,
            &fields.max_stay_months,
        ];
        values.extend(fields.images.0.iter().map(|slot| slot as &dyn ToSql));
        values.push(&self.amenities);
        values
    }
}

pub(super) fn listing_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ListingRow> {
    let mut slots: [Option<String>; MAX_IMAGES] = Default::default();
    for (i, slot) in slots.iter_mut().enumerate() {
        *slot = row.get(17 + i)?;
    }

    Ok(ListingRow {
        id: uuid_at(row, 0)?,
        owner_id: uuid_at(row, 1)?,
        owner_name: row.get(2)?,
        owner_email: row.get(3)?,
        fields: ListingFields {
            title: row.get(4)?,
            description: row.get(5)?,
            location: row.get(6)?,
            postcode: row.get(7)?,
            distance_to_transport: row.get(8)?,
            price_pence: row.get(9)?,
            deposit_pence: row.get(10)?,
            bills: parsed_at(row, 11)?,
            room_type: parsed_at(row, 12)?,
            furnished: parsed_at(row, 13)?,
            available_from: date_at(row, 14)?,
            min_stay_months: row.get(15)?,
            max_stay_months: row.get(16)?,
            images: ImageSlots(slots),
            amenities: amenities_at(row, 22)?,
        },
        status: parsed_at(row, 23)?,
        is_featured: row.get(24)?,
        is_verified: row.get(25)?,
        created_at: ts_at(row, 26)?,
        updated_at: ts_at(row, 27)?,
    })
}
