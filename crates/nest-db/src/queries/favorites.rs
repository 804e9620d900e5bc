use anyhow::Result;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::listings::{LISTING_SELECT, listing_from_row};
use crate::models::ListingRow;
use crate::{Database, timestamp};

impl Database {
    /// Get-or-create on the (user, listing) pair. Returns true if a row was
    /// created, false if it already existed.
    pub fn add_favorite(&self, user_id: Uuid, listing_id: Uuid, now: DateTime<Utc>) -> Result<bool> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT INTO favorites (id, user_id, listing_id, created_at) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(user_id, listing_id) DO NOTHING",
                (
                    Uuid::new_v4().to_string(),
                    user_id.to_string(),
                    listing_id.to_string(),
                    timestamp(now),
                ),
            )?;
            Ok(inserted == 1)
        })
    }

    /// Returns false if the pair was not favorited.
    pub fn remove_favorite(&self, user_id: Uuid, listing_id: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            let deleted = conn.execute(
                "DELETE FROM favorites WHERE user_id = ?1 AND listing_id = ?2",
                (user_id.to_string(), listing_id.to_string()),
            )?;
            Ok(deleted == 1)
        })
    }

    pub fn is_favorite(&self, user_id: Uuid, listing_id: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            let exists = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM favorites WHERE user_id = ?1 AND listing_id = ?2)",
                (user_id.to_string(), listing_id.to_string()),
                |row| row.get(0),
            )?;
            Ok(exists)
        })
    }

    /// Favorited listings that are still active, most recently favorited
    /// first. Favorites of withdrawn listings are kept but not returned.
    pub fn list_favorite_listings(&self, user_id: Uuid) -> Result<Vec<ListingRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{LISTING_SELECT}
                 JOIN favorites f ON f.listing_id = l.id
                 WHERE f.user_id = ?1 AND l.status = 'active'
                 ORDER BY f.created_at DESC, f.rowid DESC"
            ))?;
            let rows = stmt
                .query_map([user_id.to_string()], listing_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

#[cfg(test)]
mod tests {
    use nest_types::models::ListingStatus;

    use super::*;
    use crate::queries::fixtures;

    #[test]
    fn adding_twice_keeps_one_row() {
        let db = Database::open_in_memory().unwrap();
        let owner = fixtures::user(&db, "owner@uni.ac.uk");
        let student = fixtures::user(&db, "student@uni.ac.uk");
        let listing = fixtures::listing(&db, owner, "Room");

        assert!(db.add_favorite(student, listing, Utc::now()).unwrap());
        assert!(!db.add_favorite(student, listing, Utc::now()).unwrap());
        assert_eq!(db.list_favorite_listings(student).unwrap().len(), 1);
    }

    #[test]
    fn withdrawn_favorites_are_hidden_not_deleted() {
        let db = Database::open_in_memory().unwrap();
        let owner = fixtures::user(&db, "owner@uni.ac.uk");
        let student = fixtures::user(&db, "student@uni.ac.uk");
        let listing = fixtures::listing(&db, owner, "Room");
        db.add_favorite(student, listing, Utc::now()).unwrap();

        db.set_listing_status(listing, ListingStatus::Withdrawn, Utc::now()).unwrap();

        assert!(db.list_favorite_listings(student).unwrap().is_empty());
        assert!(db.is_favorite(student, listing).unwrap());
    }

    #[test]
    fn removing_reports_absence() {
        let db = Database::open_in_memory().unwrap();
        let owner = fixtures::user(&db, "owner@uni.ac.uk");
        let student = fixtures::user(&db, "student@uni.ac.uk");
        let listing = fixtures::listing(&db, owner, "Room");
        db.add_favorite(student, listing, Utc::now()).unwrap();

        assert!(db.remove_favorite(student, listing).unwrap());
        assert!(!db.remove_favorite(student, listing).unwrap());
        assert!(!db.is_favorite(student, listing).unwrap());
    }
}
