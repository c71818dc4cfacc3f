mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    routing::{get, patch, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use roster_api::session::PasswordCost;
use roster_api::state::{AppState, Backend};
use roster_api::storage::{MAX_FILE_SIZE, MockUploader};
use roster_api::{admin, files, groups, members, session};
use roster_db::Database;
use roster_sync::{MigrationSync, RestRemote};

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "roster=debug,roster_api=debug,roster_sync=debug,tower_http=debug".into()
            }),
        )
        .init();

    let config = Config::load()?;

    let db = Arc::new(Database::open(&config.db_path)?);
    let uploader = Arc::new(MockUploader::new(
        config.upload_latency,
        config.upload_base_url.clone(),
    ));
    let backend = Backend::new(db.clone(), uploader, PasswordCost::Standard)?;

    seed_directory(&backend, &config).await?;

    // One-shot migration, independent of request handling
    match &config.remote_url {
        Some(url) => {
            let remote = RestRemote::new(url, config.remote_auth.clone())?;
            let sync = MigrationSync::new(db.clone(), remote);
            tokio::spawn(async move { sync.run_logged().await });
        }
        None => info!("ROSTER_REMOTE_URL not set, remote sync disabled"),
    }

    let state: AppState = Arc::new(backend);
    let app = router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Roster server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Seed the directory on first start. Hashing every default password is slow,
/// so it runs on the blocking pool.
async fn seed_directory(backend: &Backend, config: &Config) -> anyhow::Result<()> {
    if !backend.sessions.directory_listing()?.is_empty() {
        return Ok(());
    }

    let Some(admin_password) = config.admin_password.clone() else {
        anyhow::bail!("Directory is empty and ROSTER_ADMIN_PASSWORD is unset; cannot seed");
    };

    let sessions = backend.sessions.clone();
    let ids = config.seed_member_ids();
    info!("Seeding directory with {} members", ids.len());
    tokio::task::spawn_blocking(move || sessions.seed(&admin_password, ids)).await??;

    Ok(())
}

fn router(state: AppState) -> Router {
    let auth_routes = Router::new()
        .route("/auth/login", post(session::login))
        .route("/auth/logout", post(session::logout))
        .route("/auth/session", get(session::current))
        .route("/directory", get(session::directory));

    let member_routes = Router::new()
        .route("/members/{member_id}", get(members::get_profile).put(members::update_profile))
        .route("/members/{member_id}/social-links", patch(members::update_social_links))
        .route("/members/{member_id}/avatar", post(members::upload_avatar))
        .route("/members/{member_id}/media", post(members::upload_media))
        .route("/members/{member_id}/password-reset", post(session::reset_password));

    let group_routes = Router::new()
        .route("/groups", get(groups::list_groups).post(groups::create_group))
        .route("/groups/{group_id}", get(groups::get_group))
        .route("/groups/{group_id}/join", post(groups::join_group))
        .route("/groups/{group_id}/media", post(groups::upload_media));

    let file_routes = Router::new()
        // GET takes an owner id, DELETE a file id
        .route("/files/{id}", get(files::list_files).delete(files::delete_file))
        .route("/admin/stats", get(admin::stats))
        .route("/health", get(|| async { "ok" }));

    Router::new()
        .merge(auth_routes)
        .merge(member_routes)
        .merge(group_routes)
        .merge(file_routes)
        .layer(axum::extract::DefaultBodyLimit::max(MAX_FILE_SIZE + 1024))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
