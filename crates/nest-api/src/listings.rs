use axum::{
    Extension,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use nest_db::models::{ListingFields, ListingRow};
use nest_types::api::{
    CreateListingRequest, ListingQuery, ListingResponse, ListingsResponse, Notice, UpdateListingRequest,
};
use nest_types::models::{ImageSlots, ListingStatus, MAX_IMAGES};

use crate::error::{ApiError, ValidationErrors};
use crate::extract::{Json, Path, Query};
use crate::middleware::RequestContext;
use crate::state::{AppState, AppStateInner, Settings, blocking};

/// £10,000 a month.
pub const MAX_PRICE_PENCE: i64 = 1_000_000;

pub fn listing_not_found() -> ApiError {
    ApiError::NotFound("Listing not found.".to_string())
}

pub fn listing_response(settings: &Settings, row: ListingRow) -> ListingResponse {
    let images = row.fields.images.filled().map(|r| settings.media_location(r)).collect();
    let f = row.fields;

    ListingResponse {
        id: row.id,
        owner_id: row.owner_id,
        owner_name: row.owner_name,
        owner_email: row.owner_email,
        title: f.title,
        description: f.description,
        location: f.location,
        postcode: f.postcode,
        distance_to_transport: f.distance_to_transport,
        price_pence: f.price_pence,
        deposit_pence: f.deposit_pence,
        bills: f.bills,
        room_type: f.room_type,
        furnished: f.furnished,
        available_from: f.available_from,
        min_stay_months: f.min_stay_months,
        max_stay_months: f.max_stay_months,
        images,
        amenities: f.amenities,
        status: row.status,
        is_featured: row.is_featured,
        is_verified: row.is_verified,
        created_at: row.created_at,
        updated_at: row.updated_at,
    }
}

/// Loads a listing that is still active. Missing and withdrawn listings are
/// both `NotFound`.
pub fn active_listing(state: &AppStateInner, id: Uuid) -> Result<ListingRow, ApiError> {
    match state.db.get_listing(id)? {
        Some(row) if row.status.is_active() => Ok(row),
        _ => Err(listing_not_found()),
    }
}

fn image_slots(images: Vec<String>, errors: &mut ValidationErrors) -> ImageSlots {
    let refs: Vec<String> = images.into_iter().map(|r| r.trim().to_string()).collect();
    if refs.iter().any(|r| r.is_empty()) {
        errors.add("images", "Image references cannot be blank.");
    }
    ImageSlots::from_refs(refs).unwrap_or_else(|| {
        errors.add("images", format!("A listing can have at most {MAX_IMAGES} images."));
        ImageSlots::default()
    })
}

fn validate(fields: &ListingFields, errors: &mut ValidationErrors) {
    let required = [
        ("title", &fields.title),
        ("description", &fields.description),
        ("location", &fields.location),
        ("distance_to_transport", &fields.distance_to_transport),
    ];
    for (field, value) in required {
        errors.check(!value.trim().is_empty(), field, "This field is required.");
    }
    errors.check(fields.title.chars().count() <= 200, "title", "Title must be at most 200 characters.");

    errors.check(fields.price_pence > 0, "price_pence", "Price must be greater than 0.");
    errors.check(
        fields.price_pence <= MAX_PRICE_PENCE,
        "price_pence",
        "Price cannot exceed £10,000 per month.",
    );
    errors.check(fields.deposit_pence >= 0, "deposit_pence", "Deposit cannot be negative.");

    errors.check(fields.min_stay_months >= 1, "min_stay_months", "Minimum stay must be at least 1 month.");
    errors.check(
        fields.min_stay_months <= fields.max_stay_months,
        "max_stay_months",
        "Maximum stay cannot be shorter than the minimum stay.",
    );
}

pub fn create(
    state: &AppStateInner,
    ctx: &RequestContext,
    req: CreateListingRequest,
    now: DateTime<Utc>,
) -> Result<ListingResponse, ApiError> {
    let caller = ctx.require()?;

    let mut errors = ValidationErrors::new();
    let images = image_slots(req.images, &mut errors);
    let fields = ListingFields {
        title: req.title.trim().to_string(),
        description: req.description.trim().to_string(),
        location: req.location.trim().to_string(),
        postcode: req.postcode.trim().to_string(),
        distance_to_transport: req.distance_to_transport.trim().to_string(),
        price_pence: req.price_pence,
        deposit_pence: req.deposit_pence,
        bills: req.bills,
        room_type: req.room_type,
        furnished: req.furnished,
        available_from: req.available_from,
        min_stay_months: req.min_stay_months,
        max_stay_months: req.max_stay_months,
        images,
        amenities: req.amenities,
    };
    validate(&fields, &mut errors);
    errors.finish()?;

    let id = Uuid::new_v4();
    state.db.insert_listing(id, caller.user_id, &fields, now)?;
    let row = state
        .db
        .get_listing(id)?
        .ok_or_else(|| anyhow::anyhow!("Listing {} vanished after insert", id))?;

    info!("{} created listing {} ({})", caller.email, id, fields.title);
    Ok(listing_response(&state.settings, row))
}

/// Active listings are public. A withdrawn one is only shown to its owner.
pub fn get(state: &AppStateInner, ctx: &RequestContext, id: Uuid) -> Result<ListingResponse, ApiError> {
    let row = state.db.get_listing(id)?.ok_or_else(listing_not_found)?;
    let is_owner = ctx.caller().is_some_and(|c| c.user_id == row.owner_id);
    if !row.status.is_active() && !is_owner {
        return Err(listing_not_found());
    }
    Ok(listing_response(&state.settings, row))
}

/// Loads a listing for a write by `ctx`'s caller.
fn owned_listing(state: &AppStateInner, ctx: &RequestContext, id: Uuid) -> Result<ListingRow, ApiError> {
    let caller = ctx.require()?;
    let row = state.db.get_listing(id)?.ok_or_else(listing_not_found)?;
    if row.owner_id != caller.user_id {
        if !row.status.is_active() {
            return Err(listing_not_found());
        }
        return Err(ApiError::Forbidden("You can only change your own listings.".to_string()));
    }
    Ok(row)
}

/// Partial update. Absent fields keep their stored values and the merged
/// result is validated as a whole.
pub fn update(
    state: &AppStateInner,
    ctx: &RequestContext,
    id: Uuid,
    req: UpdateListingRequest,
    now: DateTime<Utc>,
) -> Result<ListingResponse, ApiError> {
    let row = owned_listing(state, ctx, id)?;
    let mut fields = row.fields;
    let mut errors = ValidationErrors::new();

    let text = |value: Option<String>, slot: &mut String| {
        if let Some(v) = value {
            *slot = v.trim().to_string();
        }
    };
    text(req.title, &mut fields.title);
    text(req.description, &mut fields.description);
    text(req.location, &mut fields.location);
    text(req.postcode, &mut fields.postcode);
    text(req.distance_to_transport, &mut fields.distance_to_transport);

    if let Some(v) = req.price_pence {
        fields.price_pence = v;
    }
    if let Some(v) = req.deposit_pence {
        fields.deposit_pence = v;
    }
    if let Some(v) = req.bills {
        fields.bills = v;
    }
    if let Some(v) = req.room_type {
        fields.room_type = v;
    }
    if let Some(v) = req.furnished {
        fields.furnished = v;
    }
    if let Some(v) = req.available_from {
        fields.available_from = v;
    }
    if let Some(v) = req.min_stay_months {
        fields.min_stay_months = v;
    }
    if let Some(v) = req.max_stay_months {
        fields.max_stay_months = v;
    }
    if let Some(images) = req.images {
        fields.images = image_slots(images, &mut errors);
    }
    if let Some(amenities) = req.amenities {
        fields.amenities = amenities;
    }

    validate(&fields, &mut errors);
    errors.finish()?;

    if !state.db.update_listing(id, &fields, now)? {
        return Err(listing_not_found());
    }
    let row = state.db.get_listing(id)?.ok_or_else(listing_not_found)?;
    Ok(listing_response(&state.settings, row))
}

/// Withdraws the listing. Messages, favorites and reports that point at it
/// are left in place.
pub fn soft_delete(
    state: &AppStateInner,
    ctx: &RequestContext,
    id: Uuid,
    now: DateTime<Utc>,
) -> Result<Notice, ApiError> {
    let row = owned_listing(state, ctx, id)?;
    if !row.status.is_active() {
        return Err(listing_not_found());
    }
    state.db.set_listing_status(id, ListingStatus::Withdrawn, now)?;

    info!("Listing {} withdrawn by its owner", id);
    Ok(Notice::new("Listing deleted successfully."))
}

pub fn list(state: &AppStateInner, query: &ListingQuery) -> Result<ListingsResponse, ApiError> {
    let rows = state.db.list_active_listings(query)?;
    Ok(to_listings(&state.settings, rows))
}

pub fn list_mine(state: &AppStateInner, ctx: &RequestContext) -> Result<ListingsResponse, ApiError> {
    let caller = ctx.require()?;
    let rows = state.db.list_listings_by_owner(caller.user_id)?;
    Ok(to_listings(&state.settings, rows))
}

pub fn to_listings(settings: &Settings, rows: Vec<ListingRow>) -> ListingsResponse {
    let listings: Vec<ListingResponse> = rows.into_iter().map(|r| listing_response(settings, r)).collect();
    ListingsResponse {
        count: listings.len(),
        listings,
    }
}

// -- Handlers --

pub async fn list_handler(
    State(state): State<AppState>,
    Query(query): Query<ListingQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let resp = blocking(&state, move |s| list(s, &query)).await?;
    Ok(Json(resp))
}

pub async fn create_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(req): Json<CreateListingRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let resp = blocking(&state, move |s| create(s, &ctx, req, Utc::now())).await?;
    Ok((StatusCode::CREATED, Json(resp)))
}

pub async fn get_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let resp = blocking(&state, move |s| get(s, &ctx, id)).await?;
    Ok(Json(resp))
}

pub async fn update_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateListingRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let resp = blocking(&state, move |s| update(s, &ctx, id, req, Utc::now())).await?;
    Ok(Json(resp))
}

pub async fn delete_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let resp = blocking(&state, move |s| soft_delete(s, &ctx, id, Utc::now())).await?;
    Ok(Json(resp))
}

pub async fn mine_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
) -> Result<impl IntoResponse, ApiError> {
    let resp = blocking(&state, move |s| list_mine(s, &ctx)).await?;
    Ok(Json(resp))
}
