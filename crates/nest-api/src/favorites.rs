use axum::{
    Extension,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use nest_types::api::{FavoriteRequest, FavoriteStatus, ListingsResponse, Notice};

use crate::error::ApiError;
use crate::extract::{Json, Path};
use crate::listings::{active_listing, to_listings};
use crate::middleware::RequestContext;
use crate::state::{AppState, AppStateInner, blocking};

/// Outcome of [`add`]. Both are success; they only pick the status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Added {
    Created,
    AlreadyExisted,
}

impl Added {
    pub fn status(self) -> StatusCode {
        match self {
            Added::Created => StatusCode::CREATED,
            Added::AlreadyExisted => StatusCode::OK,
        }
    }
}

pub fn add(
    state: &AppStateInner,
    ctx: &RequestContext,
    listing_id: Uuid,
    now: DateTime<Utc>,
) -> Result<(Added, Notice), ApiError> {
    let caller = ctx.require()?;
    active_listing(state, listing_id)?;

    if state.db.add_favorite(caller.user_id, listing_id, now)? {
        Ok((Added::Created, Notice::new("Added to favorites.")))
    } else {
        Ok((Added::AlreadyExisted, Notice::new("Already in favorites.")))
    }
}

pub fn remove(state: &AppStateInner, ctx: &RequestContext, listing_id: Uuid) -> Result<Notice, ApiError> {
    let caller = ctx.require()?;
    if !state.db.remove_favorite(caller.user_id, listing_id)? {
        return Err(ApiError::NotFound("This listing is not in your favorites.".to_string()));
    }
    Ok(Notice::new("Removed from favorites."))
}

/// Never fails. Anonymous callers and lookup errors read as not favorited.
pub fn check(state: &AppStateInner, ctx: &RequestContext, listing_id: Uuid) -> FavoriteStatus {
    let Some(caller) = ctx.caller() else {
        return FavoriteStatus { is_favorited: false };
    };

    let is_favorited = state.db.is_favorite(caller.user_id, listing_id).unwrap_or_else(|e| {
        warn!("Favorite check failed for {}: {:#}", caller.user_id, e);
        false
    });
    FavoriteStatus { is_favorited }
}

/// The caller's favorites that are still active, newest favorite first.
pub fn list(state: &AppStateInner, ctx: &RequestContext) -> Result<ListingsResponse, ApiError> {
    let caller = ctx.require()?;
    let rows = state.db.list_favorite_listings(caller.user_id)?;
    Ok(to_listings(&state.settings, rows))
}

// -- Handlers --

pub async fn add_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(req): Json<FavoriteRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (added, notice) = blocking(&state, move |s| add(s, &ctx, req.listing_id, Utc::now())).await?;
    Ok((added.status(), Json(notice)))
}

pub async fn remove_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(listing_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let resp = blocking(&state, move |s| remove(s, &ctx, listing_id)).await?;
    Ok(Json(resp))
}

pub async fn check_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(listing_id): Path<Uuid>,
) -> Json<FavoriteStatus> {
    let status = blocking(&state, move |s| Ok(check(s, &ctx, listing_id)))
        .await
        .unwrap_or(FavoriteStatus { is_favorited: false });
    Json(status)
}

pub async fn list_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
) -> Result<impl IntoResponse, ApiError> {
    let resp = blocking(&state, move |s| list(s, &ctx)).await?;
    Ok(Json(resp))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listings;
    use crate::testing;

    #[test]
    fn adding_twice_is_success_both_times_with_one_row() {
        let state = testing::state();
        let owner = testing::signup(&state, "owner@uni.ac.uk");
        let student = testing::signup(&state, "student@uni.ac.uk");
        let listing = testing::listing(&state, &owner, "Room");

        let (first, _) = add(&state, &student, listing.id, Utc::now()).unwrap();
        let (second, _) = add(&state, &student, listing.id, Utc::now()).unwrap();
        assert_eq!(first, Added::Created);
        assert_eq!(second, Added::AlreadyExisted);
        assert_eq!(second.status(), StatusCode::OK);
        assert_eq!(list(&state, &student).unwrap().count, 1);
    }

    #[test]
    fn withdrawn_listings_cannot_be_favorited_and_drop_out_of_the_list() {
        let state = testing::state();
        let owner = testing::signup(&state, "owner@uni.ac.uk");
        let student = testing::signup(&state, "student@uni.ac.uk");
        let kept = testing::listing(&state, &owner, "Kept");
        let gone = testing::listing(&state, &owner, "Gone");
        add(&state, &student, kept.id, Utc::now()).unwrap();
        add(&state, &student, gone.id, Utc::now()).unwrap();

        listings::soft_delete(&state, &owner, gone.id, Utc::now()).unwrap();

        let favorites = list(&state, &student).unwrap();
        assert_eq!(favorites.count, 1);
        assert_eq!(favorites.listings[0].id, kept.id);
        assert!(check(&state, &student, gone.id).is_favorited);
        assert!(matches!(
            add(&state, &student, gone.id, Utc::now()),
            Err(ApiError::NotFound(_))
        ));
    }

    #[test]
    fn removing_an_absent_favorite_is_not_found() {
        let state = testing::state();
        let owner = testing::signup(&state, "owner@uni.ac.uk");
        let student = testing::signup(&state, "student@uni.ac.uk");
        let listing = testing::listing(&state, &owner, "Room");
        add(&state, &student, listing.id, Utc::now()).unwrap();

        remove(&state, &student, listing.id).unwrap();
        assert!(matches!(remove(&state, &student, listing.id), Err(ApiError::NotFound(_))));
    }

    #[test]
    fn check_never_fails() {
        let state = testing::state();
        let student = testing::signup(&state, "student@uni.ac.uk");

        assert!(!check(&state, &RequestContext::anonymous(), Uuid::new_v4()).is_favorited);
        assert!(!check(&state, &student, Uuid::new_v4()).is_favorited);
    }
}
