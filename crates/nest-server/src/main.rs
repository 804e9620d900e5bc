mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use chrono::Utc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use nest_api::state::{AppState, AppStateInner};

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "nest=debug,nest_api=debug,tower_http=debug".into()),
        )
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("FATAL: {:#}", e);
            eprintln!("       Set it in your .env file and restart.");
            std::process::exit(1);
        }
    };

    // Init database
    let db = nest_db::Database::open(&config.db_path)?;
    let purged = db.purge_expired_sessions(Utc::now())?;
    if purged > 0 {
        info!("Purged {} expired session(s)", purged);
    }

    tokio::fs::create_dir_all(&config.media_dir).await?;
    info!("Serving media from {}", config.media_dir.display());
    if !config.admin_emails.is_empty() {
        info!("{} moderator account(s) configured", config.admin_emails.len());
    }

    let state: AppState = Arc::new(AppStateInner {
        db,
        settings: config.settings(),
    });

    let app = nest_api::router::build(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Nest server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
