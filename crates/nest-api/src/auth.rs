use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{
    Extension,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use nest_db::models::{NewUser, UserRow};
use nest_types::api::{
    AuthResponse, LoginRequest, Notice, OnlineUser, OnlineUsersResponse, SessionResponse, SignupRequest, UserResponse,
};
use nest_types::models::Presence;

use crate::error::{ApiError, ValidationErrors};
use crate::extract::Json;
use crate::middleware::{RequestContext, issue_token};
use crate::state::{AppState, AppStateInner, blocking};

const MIN_PASSWORD_LEN: usize = 12;
const STUDENT_ID_LEN: usize = 8;
const DUPLICATE_EMAIL: &str = "An account with this email already exists.";

/// Users flagged online with activity inside this window are listed as online.
pub const ONLINE_LIST_WINDOW_MINUTES: i64 = 10;

pub fn user_response(user: &UserRow, now: DateTime<Utc>) -> UserResponse {
    UserResponse {
        id: user.id,
        name: user.name.clone(),
        email: user.email.clone(),
        student_id: user.student_id.clone(),
        course: user.course.clone(),
        phone: user.phone.clone(),
        city: user.city.clone(),
        presence: Presence::derive(user.is_online, user.last_activity, now),
        last_login: user.last_login,
        created_at: user.created_at,
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn looks_like_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !email.chars().any(char::is_whitespace)
}

fn optional_text(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))?;
    Ok(hash.to_string())
}

/// Registers a student and signs them straight in.
pub fn create_account(state: &AppStateInner, req: SignupRequest, now: DateTime<Utc>) -> Result<AuthResponse, ApiError> {
    let email = normalize_email(&req.email);
    let name = req.name.trim();
    let student_id = req.student_id.trim();
    let course = req.course.trim();

    let mut errors = ValidationErrors::new();
    errors.check(name.chars().count() >= 3, "name", "Name must be at least 3 characters.");
    errors.check(looks_like_email(&email), "email", "Enter a valid email address.");
    errors.check(
        student_id.len() == STUDENT_ID_LEN && student_id.chars().all(|c| c.is_ascii_digit()),
        "student_id",
        "Student ID must be exactly 8 digits.",
    );
    errors.check(course.chars().count() >= 2, "course", "Course must be at least 2 characters.");
    errors.check(
        req.password.chars().count() >= MIN_PASSWORD_LEN,
        "password",
        "Password must be at least 12 characters.",
    );
    errors.check(req.password == req.password_confirm, "password_confirm", "Passwords do not match.");
    if !errors.contains("email") && state.db.get_user_by_email(&email)?.is_some() {
        errors.add("email", DUPLICATE_EMAIL);
    }
    errors.finish()?;

    let password_hash = hash_password(&req.password)?;
    let phone = optional_text(req.phone);
    let city = optional_text(req.city);
    let user_id = Uuid::new_v4();
    let session_id = Uuid::new_v4();
    let expires_at = now + state.settings.session_ttl;

    let created = state.db.create_user(
        &NewUser {
            id: user_id,
            email: &email,
            name,
            student_id,
            course,
            phone: phone.as_deref(),
            city: city.as_deref(),
            password_hash: &password_hash,
        },
        session_id,
        expires_at,
        now,
    )?;
    if !created {
        return Err(ApiError::invalid("email", DUPLICATE_EMAIL));
    }

    let user = state
        .db
        .get_user_by_id(user_id)?
        .ok_or_else(|| anyhow::anyhow!("User {} vanished after signup", user_id))?;
    let token = issue_token(&state.settings.jwt_secret, user_id, session_id, expires_at)?;

    info!("Account created for {}", email);
    Ok(AuthResponse {
        message: "Account created successfully.".to_string(),
        user: user_response(&user, now),
        token,
    })
}

pub fn authenticate(state: &AppStateInner, req: LoginRequest, now: DateTime<Utc>) -> Result<AuthResponse, ApiError> {
    let email = normalize_email(&req.email);
    let user = state
        .db
        .get_user_by_email(&email)?
        .ok_or_else(|| ApiError::NotFound("No account found with this email.".to_string()))?;

    let parsed_hash =
        PasswordHash::new(&user.password).map_err(|e| anyhow::anyhow!("stored hash for {} is invalid: {}", user.id, e))?;
    if Argon2::default().verify_password(req.password.as_bytes(), &parsed_hash).is_err() {
        warn!("Failed login for {}", email);
        return Err(ApiError::Unauthenticated("Incorrect password.".to_string()));
    }

    let session_id = Uuid::new_v4();
    let expires_at = now + state.settings.session_ttl;
    state.db.start_session(user.id, session_id, expires_at, now)?;

    let user = state
        .db
        .get_user_by_id(user.id)?
        .ok_or_else(|| ApiError::NotFound("No account found with this email.".to_string()))?;
    let token = issue_token(&state.settings.jwt_secret, user.id, session_id, expires_at)?;

    info!("{} logged in", email);
    Ok(AuthResponse {
        message: format!("Welcome back, {}!", user.name),
        user: user_response(&user, now),
        token,
    })
}

/// Reports who the caller is. Never fails: lookup problems read as signed out.
pub fn check_session(state: &AppStateInner, ctx: &RequestContext, now: DateTime<Utc>) -> SessionResponse {
    let user = ctx.caller().and_then(|caller| match state.db.get_user_by_id(caller.user_id) {
        Ok(user) => user,
        Err(e) => {
            warn!("Session check failed for {}: {:#}", caller.user_id, e);
            None
        }
    });

    SessionResponse {
        authenticated: user.is_some(),
        user: user.map(|u| user_response(&u, now)),
    }
}

pub fn logout(state: &AppStateInner, ctx: &RequestContext, now: DateTime<Utc>) -> Result<Notice, ApiError> {
    let caller = ctx.require()?;
    state.db.mark_offline(caller.user_id, now)?;
    state.db.delete_session(caller.session_id)?;

    info!("{} logged out", caller.email);
    Ok(Notice::new("You have been logged out."))
}

pub fn online_users(state: &AppStateInner, now: DateTime<Utc>) -> Result<OnlineUsersResponse, ApiError> {
    let users = state
        .db
        .list_online_users(now - Duration::minutes(ONLINE_LIST_WINDOW_MINUTES))?;
    let online_users: Vec<OnlineUser> = users
        .into_iter()
        .map(|u| OnlineUser {
            presence: Presence::derive(u.is_online, u.last_activity, now),
            id: u.id,
            name: u.name,
            email: u.email,
            last_activity: u.last_activity,
            last_login: u.last_login,
        })
        .collect();

    Ok(OnlineUsersResponse {
        count: online_users.len(),
        online_users,
    })
}

/// Removes the caller's account along with everything it owns.
pub fn delete_account(state: &AppStateInner, ctx: &RequestContext) -> Result<Notice, ApiError> {
    let caller = ctx.require()?;
    if !state.db.delete_user(caller.user_id)? {
        return Err(ApiError::NotFound("Account not found.".to_string()));
    }

    info!("Account {} deleted", caller.email);
    Ok(Notice::new("Your account has been deleted."))
}

// -- Handlers --

pub async fn signup(
    State(state): State<AppState>,
    Json(req): Json<SignupRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let resp = blocking(&state, move |s| create_account(s, req, Utc::now())).await?;
    Ok((StatusCode::CREATED, Json(resp)))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let resp = blocking(&state, move |s| authenticate(s, req, Utc::now())).await?;
    Ok(Json(resp))
}

pub async fn logout_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
) -> Result<impl IntoResponse, ApiError> {
    let resp = blocking(&state, move |s| logout(s, &ctx, Utc::now())).await?;
    Ok(Json(resp))
}

pub async fn session(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
) -> Result<impl IntoResponse, ApiError> {
    let resp = blocking(&state, move |s| Ok(check_session(s, &ctx, Utc::now()))).await?;
    Ok(Json(resp))
}

pub async fn delete_account_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
) -> Result<impl IntoResponse, ApiError> {
    let resp = blocking(&state, move |s| delete_account(s, &ctx)).await?;
    Ok(Json(resp))
}

pub async fn online(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let resp = blocking(&state, |s| online_users(s, Utc::now())).await?;
    Ok(Json(resp))
}
