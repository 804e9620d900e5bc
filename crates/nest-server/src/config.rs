use std::path::PathBuf;

use anyhow::{Context, bail};
use chrono::Duration;

use nest_api::state::Settings;

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &["change-me-to-a-random-string", "dev-secret-change-me"];

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub session_ttl_hours: i64,
    pub media_dir: PathBuf,
    pub media_url: String,
    pub admin_emails: Vec<String>,
    pub max_upload_bytes: usize,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup. Unset and empty values take the
    /// defaults; the JWT secret has none.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |key: &str, default: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let jwt_secret = var("NEST_JWT_SECRET", "");
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("NEST_JWT_SECRET is unset or still a placeholder");
        }

        let port = var("NEST_PORT", "8000").parse().context("NEST_PORT must be a port number")?;
        let session_ttl_hours: i64 = var("NEST_SESSION_TTL_HOURS", "24")
            .parse()
            .context("NEST_SESSION_TTL_HOURS must be a whole number of hours")?;
        if session_ttl_hours <= 0 {
            bail!("NEST_SESSION_TTL_HOURS must be positive");
        }
        let max_upload_bytes = var("NEST_MAX_UPLOAD_BYTES", "5242880")
            .parse()
            .context("NEST_MAX_UPLOAD_BYTES must be a byte count")?;

        let admin_emails = var("NEST_ADMIN_EMAILS", "")
            .split(',')
            .map(|e| e.trim().to_lowercase())
            .filter(|e| !e.is_empty())
            .collect();

        Ok(Self {
            host: var("NEST_HOST", "0.0.0.0"),
            port,
            db_path: var("NEST_DB_PATH", "nest.db").into(),
            jwt_secret,
            session_ttl_hours,
            media_dir: var("NEST_MEDIA_DIR", "./media").into(),
            media_url: var("NEST_MEDIA_URL", "/media/"),
            admin_emails,
            max_upload_bytes,
        })
    }

    pub fn settings(&self) -> Settings {
        Settings {
            jwt_secret: self.jwt_secret.clone(),
            session_ttl: Duration::hours(self.session_ttl_hours),
            media_dir: self.media_dir.clone(),
            media_url: self.media_url.clone(),
            max_upload_bytes: self.max_upload_bytes,
            moderator_emails: self.admin_emails.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> anyhow::Result<Config> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_only_the_secret_is_set() {
        let config = config(&[("NEST_JWT_SECRET", "s3cret")]).unwrap();
        assert_eq!(config.port, 8000);
        assert_eq!(config.db_path, PathBuf::from("nest.db"));
        assert_eq!(config.media_url, "/media/");
        assert_eq!(config.max_upload_bytes, 5 * 1024 * 1024);
        assert!(config.admin_emails.is_empty());
        assert_eq!(config.settings().session_ttl, Duration::hours(24));
    }

    #[test]
    fn missing_or_placeholder_secret_is_fatal() {
        assert!(config(&[]).is_err());
        assert!(config(&[("NEST_JWT_SECRET", "dev-secret-change-me")]).is_err());
    }

    #[test]
    fn admin_emails_are_split_and_lowercased() {
        let config = config(&[
            ("NEST_JWT_SECRET", "s3cret"),
            ("NEST_ADMIN_EMAILS", " Warden@Uni.ac.uk, ,mod@uni.ac.uk "),
            ("NEST_PORT", "9100"),
        ])
        .unwrap();
        assert_eq!(config.admin_emails, vec!["warden@uni.ac.uk", "mod@uni.ac.uk"]);
        assert_eq!(config.port, 9100);
        assert!(config.settings().is_moderator("MOD@uni.ac.uk"));
    }

    #[test]
    fn bad_numbers_are_rejected() {
        assert!(config(&[("NEST_JWT_SECRET", "s"), ("NEST_PORT", "http")]).is_err());
        assert!(config(&[("NEST_JWT_SECRET", "s"), ("NEST_SESSION_TTL_HOURS", "0")]).is_err());
    }
}
