//! Web surface: admin triggers and the like-count read endpoint.
//!
//! The publish trigger runs a single cycle inline; backfill and
//! interaction passes are kicked off detached from the request so the
//! caller is not held for the duration of the scan.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::backfill;
use crate::config::Config;
use crate::db::{self, Database, Platform};
use crate::interactions;
use crate::publish;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub config: Arc<Config>,
    pub client: reqwest::Client,
}

/// Start the web server.
///
/// # Errors
///
/// Returns an error if the server fails to bind or serve.
pub async fn serve(state: AppState) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", state.config.web_host, state.config.web_port)
        .parse()
        .context("Invalid web server address")?;

    let app = router(state);

    info!(addr = %addr, "Starting web server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind web server")?;

    axum::serve(listener, app).await.context("Web server error")?;

    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/publish/:connection", post(trigger_publish))
        .route("/backfill", post(trigger_backfill))
        .route("/interactions", post(trigger_interactions))
        .route("/interactions/:item_name", get(item_interactions))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run one publish cycle for the named connection.
async fn trigger_publish(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    let Some(conn) = state.config.connection(&name) else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "unknown connection" })),
        );
    };

    match publish::publish_next(&state.client, &state.db, conn).await {
        Ok(published) => (StatusCode::OK, Json(json!({ "published": published }))),
        Err(e) => {
            error!(connection = %name, "Publish failed: {e:#}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "publish failed" })),
            )
        }
    }
}

/// Kick off a backfill pass, detached from this request.
async fn trigger_backfill(State(state): State<AppState>) -> StatusCode {
    tokio::spawn(async move {
        backfill::run_backfill(&state.client, &state.db, &state.config).await;
    });
    StatusCode::ACCEPTED
}

/// Kick off a like-count fetch pass, detached from this request.
async fn trigger_interactions(State(state): State<AppState>) -> StatusCode {
    tokio::spawn(async move {
        interactions::run_interactions(&state.client, &state.db, &state.config).await;
    });
    StatusCode::ACCEPTED
}

/// Stored like counts for one item, across all platforms.
async fn item_interactions(
    State(state): State<AppState>,
    Path(item_name): Path<String>,
) -> impl IntoResponse {
    let mut likes = Vec::new();
    for platform in [Platform::Bluesky, Platform::Pixelfed, Platform::Instagram] {
        match db::get_interaction(state.db.pool(), &item_name, platform).await {
            Ok(Some(interaction)) => likes.push(json!({
                "platform": platform,
                "likes": interaction.like_count,
            })),
            Ok(None) => {}
            Err(e) => {
                error!(item = %item_name, "Failed to read interactions: {e:#}");
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "interaction lookup failed" })),
                );
            }
        }
    }
    (StatusCode::OK, Json(json!(likes)))
}
