//! Shared fixtures for the inline unit tests.
use std::sync::Arc;

use chrono::{Duration, NaiveDate, Utc};
use uuid::Uuid;

use nest_db::Database;
use nest_types::api::{CreateListingRequest, ListingResponse, SignupRequest};
use nest_types::models::{Bills, Furnished, RoomType};

use crate::auth;
use crate::middleware::{Caller, RequestContext, resolve};
use crate::state::{AppState, AppStateInner, Settings};

pub const PASSWORD: &str = "correct horse battery";

pub fn settings() -> Settings {
    Settings {
        jwt_secret: "unit-test-secret".to_string(),
        session_ttl: Duration::hours(24),
        media_dir: std::env::temp_dir().join(format!("nest-media-{}", Uuid::new_v4())),
        media_url: "/media/".to_string(),
        max_upload_bytes: 5 * 1024 * 1024,
        moderator_emails: vec!["mod@nest.test".to_string()],
    }
}

pub fn state() -> AppState {
    Arc::new(AppStateInner {
        db: Database::open_in_memory().unwrap(),
        settings: settings(),
    })
}

pub fn signup_request(email: &str) -> SignupRequest {
    SignupRequest {
        name: "Test Student".to_string(),
        email: email.to_string(),
        student_id: "12345678".to_string(),
        course: "Computing".to_string(),
        phone: None,
        city: Some("Leeds".to_string()),
        password: PASSWORD.to_string(),
        password_confirm: PASSWORD.to_string(),
    }
}

pub fn signup_with_token(state: &AppStateInner, email: &str) -> (Caller, String) {
    let now = Utc::now();
    let created = auth::create_account(state, signup_request(email), now).unwrap();
    let caller = resolve(state, Some(created.token.as_str()), now).unwrap().require().unwrap().clone();
    (caller, created.token)
}

pub fn signup(state: &AppStateInner, email: &str) -> RequestContext {
    RequestContext::authenticated(signup_with_token(state, email).0)
}

pub fn listing_request(title: &str, price_pence: i64) -> CreateListingRequest {
    CreateListingRequest {
        title: title.to_string(),
        description: "Bright double room ten minutes from campus".to_string(),
        location: "Hyde Park, Leeds".to_string(),
        postcode: "LS6 1AB".to_string(),
        distance_to_transport: "2 min to bus stop".to_string(),
        price_pence,
        deposit_pence: 40_000,
        bills: Bills::Included,
        room_type: RoomType::Double,
        furnished: Furnished::Fully,
        available_from: NaiveDate::from_ymd_opt(2026, 9, 1).unwrap(),
        min_stay_months: 6,
        max_stay_months: 12,
        images: Vec::new(),
        amenities: Default::default(),
    }
}

pub fn listing(state: &AppStateInner, owner: &RequestContext, title: &str) -> ListingResponse {
    crate::listings::create(state, owner, listing_request(title, 55_000), Utc::now()).unwrap()
}
