use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;

use nest_api::state::{AppStateInner, Settings};
use nest_db::Database;

fn app() -> Router {
    let settings = Settings {
        jwt_secret: "integration-secret".to_string(),
        session_ttl: chrono::Duration::hours(24),
        media_dir: std::env::temp_dir().join(format!("nest-it-{}", Uuid::new_v4())),
        media_url: "/media/".to_string(),
        max_upload_bytes: 1024 * 1024,
        moderator_emails: vec!["moderator@uni.ac.uk".to_string()],
    };
    let state = Arc::new(AppStateInner {
        db: Database::open_in_memory().unwrap(),
        settings,
    });
    nest_api::router::build(state)
}

async fn call(app: &Router, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut req = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        req = req.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let req = match body {
        Some(body) => req
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => req.body(Body::empty()).unwrap(),
    };

    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn signup(app: &Router, name: &str, email: &str) -> (String, String) {
    let (status, body) = call(
        app,
        "POST",
        "/api/auth/signup",
        None,
        Some(json!({
            "name": name,
            "email": email,
            "student_id": "20261234",
            "course": "Architecture",
            "password": "a long enough password",
            "password_confirm": "a long enough password",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    (
        body["token"].as_str().unwrap().to_string(),
        body["user"]["id"].as_str().unwrap().to_string(),
    )
}

fn listing_body(title: &str) -> Value {
    json!({
        "title": title,
        "description": "Double room in a quiet shared house",
        "location": "Headingley, Leeds",
        "postcode": "LS6 3AA",
        "distance_to_transport": "3 min walk",
        "price_pence": 52000,
        "deposit_pence": 52000,
        "bills": "included",
        "room_type": "double",
        "furnished": "fully",
        "available_from": "2026-09-01",
        "amenities": ["wifi", "garden"],
    })
}

#[tokio::test]
async fn favorite_message_reply_and_read_flow() {
    let app = app();
    let (x_token, _x_id) = signup(&app, "Xavier", "x@uni.ac.uk").await;
    let (y_token, y_id) = signup(&app, "Yasmin", "y@uni.ac.uk").await;

    let (status, listing) = call(&app, "POST", "/api/listings", Some(&y_token), Some(listing_body("Sunny double"))).await;
    assert_eq!(status, StatusCode::CREATED, "{listing}");
    let listing_id = listing["id"].as_str().unwrap().to_string();

    let fav = json!({ "listing_id": listing_id });
    let (status, _) = call(&app, "POST", "/api/favorites", Some(&x_token), Some(fav.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = call(&app, "POST", "/api/favorites", Some(&x_token), Some(fav)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, sent) = call(
        &app,
        "POST",
        "/api/messages",
        Some(&x_token),
        Some(json!({ "listing_id": listing_id, "subject": "Sunny double", "content": "Is it still free?" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{sent}");
    assert_eq!(sent["recipient"]["id"], json!(y_id));

    let x_id = sent["sender"]["id"].as_str().unwrap().to_string();
    let (status, _) = call(
        &app,
        "POST",
        "/api/messages",
        Some(&y_token),
        Some(json!({
            "recipient_id": x_id,
            "listing_id": listing_id,
            "subject": "Re: Sunny double",
            "content": "Yes, viewings on Saturday.",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, convs) = call(&app, "GET", "/api/conversations", Some(&x_token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(convs["count"], json!(1));
    assert_eq!(convs["conversations"][0]["unread_count"], json!(1));
    assert_eq!(convs["conversations"][0]["message_count"], json!(2));
    assert_eq!(convs["conversations"][0]["last_message"]["content"], json!("Yes, viewings on Saturday."));

    let uri = format!("/api/conversations/thread?other_user_id={y_id}&listing_id={listing_id}");
    let (status, thread) = call(&app, "GET", &uri, Some(&x_token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(thread["count"], json!(2));
    assert_eq!(thread["messages"][0]["content"], json!("Is it still free?"));

    let (_, convs) = call(&app, "GET", "/api/conversations", Some(&x_token), None).await;
    assert_eq!(convs["conversations"][0]["unread_count"], json!(0));

    let (_, favs) = call(&app, "GET", "/api/favorites", Some(&x_token), None).await;
    assert_eq!(favs["count"], json!(1));
    let (_, check) = call(&app, "GET", &format!("/api/favorites/{listing_id}"), None, None).await;
    assert_eq!(check["is_favorited"], json!(false));
}

#[tokio::test]
async fn errors_map_to_status_codes() {
    let app = app();
    let (owner, _) = signup(&app, "Owner", "owner@uni.ac.uk").await;
    let (other, _) = signup(&app, "Other", "other@uni.ac.uk").await;

    let (status, body) = call(&app, "GET", "/api/messages", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["message"].is_string());

    let (_, listing) = call(&app, "POST", "/api/listings", Some(&owner), Some(listing_body("Room"))).await;
    let uri = format!("/api/listings/{}", listing["id"].as_str().unwrap());

    let (status, _) = call(&app, "PATCH", &uri, Some(&other), Some(json!({ "price_pence": 1 }))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = call(&app, "PATCH", &uri, Some(&owner), Some(json!({ "price_pence": 0 }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["errors"]["price_pence"].is_array());

    let (status, _) = call(&app, "DELETE", &uri, Some(&owner), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = call(&app, "GET", &uri, Some(&other), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = call(&app, "GET", &uri, Some(&owner), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = call(&app, "GET", "/api/moderation/reports", Some(&other), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn malformed_requests_are_field_validation_errors() {
    let app = app();
    let (owner, _) = signup(&app, "Owner", "owner@uni.ac.uk").await;
    let (moderator, _) = signup(&app, "Moderator", "moderator@uni.ac.uk").await;

    let (status, body) = call(&app, "POST", "/api/auth/signup", None, Some(json!({ "email": "x" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["errors"]["name"].is_array(), "{body}");

    let mut castle = listing_body("Castle");
    castle["room_type"] = json!("castle");
    let (status, body) = call(&app, "POST", "/api/listings", Some(&owner), Some(castle)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let message = body["errors"]["room_type"][0].as_str().unwrap();
    assert!(message.contains("castle"), "{message}");

    let (status, body) = call(&app, "GET", "/api/listings?room_type=castle", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["errors"]["room_type"].is_array(), "{body}");

    let (status, body) = call(&app, "GET", "/api/moderation/reports?status=bogus", Some(&moderator), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["errors"]["status"].is_array(), "{body}");

    let (status, body) = call(&app, "GET", "/api/listings/not-a-uuid", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["errors"]["path"].is_array(), "{body}");

    let (status, body) = call(&app, "POST", "/api/favorites", Some(&owner), Some(json!("not an object"))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["errors"].is_object(), "{body}");
}

#[tokio::test]
async fn session_lifecycle_and_moderation() {
    let app = app();
    let (reporter, _) = signup(&app, "Reporter", "reporter@uni.ac.uk").await;
    let (moderator, _) = signup(&app, "Moderator", "moderator@uni.ac.uk").await;

    let (_, listing) = call(&app, "POST", "/api/listings", Some(&reporter), Some(listing_body("Room"))).await;
    let (status, created) = call(
        &app,
        "POST",
        "/api/reports",
        Some(&reporter),
        Some(json!({ "listing_id": listing["id"], "report_type": "incorrect", "description": "Wrong postcode" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["status"], json!("pending"));

    let (status, moved) = call(
        &app,
        "POST",
        "/api/moderation/reports/transition",
        Some(&moderator),
        Some(json!({ "report_ids": [created["report_id"]], "status": "under_review", "notes": "checking" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(moved["updated"], json!(1));

    let (_, queue) = call(&app, "GET", "/api/moderation/reports?status=under_review", Some(&moderator), None).await;
    assert_eq!(queue["count"], json!(1));
    assert_eq!(queue["reports"][0]["admin_notes"], json!("checking"));

    let (_, mine) = call(&app, "GET", "/api/reports/mine", Some(&reporter), None).await;
    assert_eq!(mine["reports"][0]["status_display"], json!("Under Review"));
    assert!(mine["reports"][0].get("admin_notes").is_none());

    let (_, session) = call(&app, "GET", "/api/auth/session", Some(&reporter), None).await;
    assert_eq!(session["authenticated"], json!(true));
    let (_, online) = call(&app, "GET", "/api/users/online", None, None).await;
    assert_eq!(online["count"], json!(2));

    let (status, _) = call(&app, "POST", "/api/auth/logout", Some(&reporter), None).await;
    assert_eq!(status, StatusCode::OK);
    let (_, session) = call(&app, "GET", "/api/auth/session", Some(&reporter), None).await;
    assert_eq!(session["authenticated"], json!(false));

    let (status, login) = call(
        &app,
        "POST",
        "/api/auth/login",
        None,
        Some(json!({ "email": "Reporter@uni.ac.uk", "password": "a long enough password" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let token = login["token"].as_str().unwrap();
    let (status, _) = call(&app, "DELETE", "/api/auth/account", Some(token), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = call(&app, "GET", "/api/reports/mine", Some(token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn media_upload_is_served_back() {
    let app = app();
    let (token, _) = signup(&app, "Uploader", "up@uni.ac.uk").await;
    let png = b"\x89PNG\r\n\x1a\nnot really pixels".to_vec();

    let req = Request::builder()
        .method("POST")
        .uri("/api/media")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header(header::CONTENT_TYPE, "image/png")
        .body(Body::from(png.clone()))
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let body: Value = serde_json::from_slice(&resp.into_body().collect().await.unwrap().to_bytes()).unwrap();
    let url = body["url"].as_str().unwrap().to_string();
    assert!(url.starts_with("/media/listings/"));

    let resp = app
        .clone()
        .oneshot(Request::builder().uri(&url).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.into_body().collect().await.unwrap().to_bytes().to_vec(), png);

    let req = Request::builder()
        .method("POST")
        .uri("/api/media")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::from("plain text"))
        .unwrap();
    assert_eq!(app.clone().oneshot(req).await.unwrap().status(), StatusCode::BAD_REQUEST);
}
