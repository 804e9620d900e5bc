use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware,
    routing::{delete, get, post},
};
use tower_http::services::ServeDir;

use crate::middleware::resolve_session;
use crate::state::AppState;
use crate::{auth, favorites, listings, media, messages, reports};

/// Every API route plus the static media mount. Each request passes through
/// [`resolve_session`] first; handlers that need a caller check for one.
pub fn build(state: AppState) -> Router {
    let auth_routes = Router::new()
        .route("/api/auth/signup", post(auth::signup))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/logout", post(auth::logout_handler))
        .route("/api/auth/session", get(auth::session))
        .route("/api/auth/account", delete(auth::delete_account_handler))
        .route("/api/users/online", get(auth::online));

    let listing_routes = Router::new()
        .route("/api/listings", get(listings::list_handler).post(listings::create_handler))
        .route("/api/listings/mine", get(listings::mine_handler))
        .route(
            "/api/listings/{id}",
            get(listings::get_handler)
                .patch(listings::update_handler)
                .delete(listings::delete_handler),
        )
        .route(
            "/api/media",
            post(media::upload_image).layer(DefaultBodyLimit::max(state.settings.max_upload_bytes)),
        );

    let message_routes = Router::new()
        .route("/api/messages", get(messages::inbox_handler).post(messages::send_handler))
        .route("/api/messages/sent", get(messages::sent_handler))
        .route("/api/messages/{id}/read", post(messages::read_handler))
        .route("/api/conversations", get(messages::conversations_handler))
        .route("/api/conversations/thread", get(messages::thread_handler));

    let favorite_routes = Router::new()
        .route("/api/favorites", get(favorites::list_handler).post(favorites::add_handler))
        .route(
            "/api/favorites/{listing_id}",
            get(favorites::check_handler).delete(favorites::remove_handler),
        );

    let report_routes = Router::new()
        .route("/api/reports", post(reports::create_handler))
        .route("/api/reports/mine", get(reports::mine_handler))
        .route("/api/moderation/reports", get(reports::moderation_list_handler))
        .route("/api/moderation/reports/transition", post(reports::transition_handler));

    Router::new()
        .merge(auth_routes)
        .merge(listing_routes)
        .merge(message_routes)
        .merge(favorite_routes)
        .merge(report_routes)
        .nest_service("/media", ServeDir::new(&state.settings.media_dir))
        .layer(middleware::from_fn_with_state(state.clone(), resolve_session))
        .with_state(state)
}
