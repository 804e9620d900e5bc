use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::TypedHeader;
use axum_extra::headers::{Authorization, authorization::Bearer};
use chrono::{DateTime, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use tracing::debug;
use uuid::Uuid;

use nest_types::api::Claims;

use crate::error::ApiError;
use crate::state::{AppState, AppStateInner, blocking};

/// Identity resolved for the current request.
#[derive(Debug, Clone)]
pub struct Caller {
    pub user_id: Uuid,
    pub session_id: Uuid,
    pub name: String,
    pub email: String,
    pub is_moderator: bool,
}

/// Built once per request by [`resolve_session`] and handed to every
/// operation. Anonymous requests carry no caller.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    caller: Option<Caller>,
}

impl RequestContext {
    pub fn anonymous() -> Self {
        Self { caller: None }
    }

    pub fn authenticated(caller: Caller) -> Self {
        Self { caller: Some(caller) }
    }

    pub fn caller(&self) -> Option<&Caller> {
        self.caller.as_ref()
    }

    pub fn require(&self) -> Result<&Caller, ApiError> {
        self.caller.as_ref().ok_or_else(ApiError::login_required)
    }
}

pub fn issue_token(secret: &str, user_id: Uuid, session_id: Uuid, expires_at: DateTime<Utc>) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        sid: session_id,
        exp: expires_at.timestamp() as usize,
    };

    let token = encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes()))?;
    Ok(token)
}

/// Resolves a bearer token against the session and user tables and records
/// the request as activity. Anything that does not check out yields an
/// anonymous context; only store failures are errors.
pub fn resolve(state: &AppStateInner, token: Option<&str>, now: DateTime<Utc>) -> Result<RequestContext, ApiError> {
    let Some(token) = token else {
        return Ok(RequestContext::anonymous());
    };

    let claims = match decode::<Claims>(
        token,
        &DecodingKey::from_secret(state.settings.jwt_secret.as_bytes()),
        &Validation::default(),
    ) {
        Ok(data) => data.claims,
        Err(e) => {
            debug!("Rejected bearer token: {}", e);
            return Ok(RequestContext::anonymous());
        }
    };

    let Some(session) = state.db.get_session(claims.sid)? else {
        debug!("Session {} no longer exists", claims.sid);
        return Ok(RequestContext::anonymous());
    };
    if session.user_id != claims.sub {
        return Ok(RequestContext::anonymous());
    }
    if session.expires_at <= now {
        state.db.delete_session(session.id)?;
        return Ok(RequestContext::anonymous());
    }

    let Some(user) = state.db.get_user_by_id(session.user_id)? else {
        state.db.delete_session(session.id)?;
        return Ok(RequestContext::anonymous());
    };

    state.db.touch_activity(user.id, now)?;

    Ok(RequestContext::authenticated(Caller {
        user_id: user.id,
        session_id: session.id,
        is_moderator: state.settings.is_moderator(&user.email),
        name: user.name,
        email: user.email,
    }))
}

/// Attaches a [`RequestContext`] to every request.
pub async fn resolve_session(
    State(state): State<AppState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    mut req: Request,
    next: Next,
) -> Response {
    let token = bearer.map(|TypedHeader(auth)| auth.token().to_string());

    let ctx = match blocking(&state, move |s| resolve(s, token.as_deref(), Utc::now())).await {
        Ok(ctx) => ctx,
        Err(e) => return e.into_response(),
    };

    req.extensions_mut().insert(ctx);
    next.run(req).await
}
