use std::path::PathBuf;
use std::sync::Arc;

use chrono::Duration;
use tracing::error;

use nest_db::Database;

use crate::error::ApiError;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub settings: Settings,
}

/// Runtime knobs the handlers need. Built by the server from its config.
#[derive(Debug, Clone)]
pub struct Settings {
    pub jwt_secret: String,
    pub session_ttl: Duration,
    /// Directory holding uploaded listing images.
    pub media_dir: PathBuf,
    /// Public prefix an image reference is joined onto, e.g. `/media/`.
    pub media_url: String,
    pub max_upload_bytes: usize,
    /// Lower-cased emails allowed to moderate reports.
    pub moderator_emails: Vec<String>,
}

impl Settings {
    pub fn media_location(&self, reference: &str) -> String {
        format!("{}/{}", self.media_url.trim_end_matches('/'), reference.trim_start_matches('/'))
    }

    pub fn is_moderator(&self, email: &str) -> bool {
        self.moderator_emails.iter().any(|m| m.eq_ignore_ascii_case(email))
    }
}

/// Runs store work off the async runtime.
pub async fn blocking<F, T>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&AppStateInner) -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal(anyhow::anyhow!("blocking task failed: {}", e))
        })?
}
