//! Liveness endpoint.
//!
//! `GET /health` reports whether the bot authenticated with Telegram (`getMe`
//! succeeded at startup) and when the last update arrived. Staleness of
//! `last_update_at` is the signal for a dead connection. Read-only; it never
//! touches the pipeline.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tracing::info;

use crate::relay::DedupSet;

struct HealthInner {
    started_at: DateTime<Utc>,
    authenticated: AtomicBool,
    last_update_at: RwLock<Option<DateTime<Utc>>>,
    forwarded: DedupSet,
}

/// Shared liveness state (cheap to clone).
#[derive(Clone)]
pub struct Health {
    inner: Arc<HealthInner>,
}

/// Body of the `/health` response.
#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub authenticated: bool,
    pub started_at: DateTime<Utc>,
    pub last_update_at: Option<DateTime<Utc>>,
    pub forwarded: usize,
}

impl Health {
    pub fn new(forwarded: DedupSet) -> Self {
        Self {
            inner: Arc::new(HealthInner {
                started_at: Utc::now(),
                authenticated: AtomicBool::new(false),
                last_update_at: RwLock::new(None),
                forwarded,
            }),
        }
    }

    pub fn set_authenticated(&self, authenticated: bool) {
        self.inner.authenticated.store(authenticated, Ordering::Relaxed);
    }

    /// Note that an update arrived from Telegram.
    pub fn record_update(&self) {
        *self.inner.last_update_at.write() = Some(Utc::now());
    }

    pub fn report(&self) -> HealthReport {
        let authenticated = self.inner.authenticated.load(Ordering::Relaxed);
        HealthReport {
            status: if authenticated { "ok" } else { "starting" },
            authenticated,
            started_at: self.inner.started_at,
            last_update_at: *self.inner.last_update_at.read(),
            forwarded: self.inner.forwarded.len(),
        }
    }
}

async fn health_handler(State(health): State<Health>) -> (StatusCode, Json<HealthReport>) {
    let report = health.report();
    let code = if report.authenticated {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(report))
}

/// Router exposing `/health`.
pub fn router(health: Health) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .with_state(health)
}

/// Serve the health router on its own port (polling mode).
pub async fn serve(port: u16, health: Health) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!("Health endpoint listening on {}", listener.local_addr()?);
    axum::serve(listener, router(health)).await?;
    Ok(())
}
