//! HTTP surface: status page, Telegram webhook receiver and the webhook
//! on/off admin pages.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, Path, Query, State},
    http::StatusCode,
    response::Html,
    routing::{get, post},
    Router,
};
use chrono::{DateTime, FixedOffset, Offset, Utc};
use serde::Deserialize;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::commands::dispatch;
use crate::config::ServerConfig;
use crate::error::{BotError, Result};
use crate::logbridge::AUDIT_TARGET;
use crate::transport::ChatTransport;
use crate::update::decode_update;

/// Process start, captured once.
pub struct Uptime {
    started: Instant,
    booted_at: DateTime<FixedOffset>,
}

impl Uptime {
    pub fn start(utc_offset_hours: i32) -> Self {
        let offset = FixedOffset::east_opt(utc_offset_hours * 3600).unwrap_or_else(|| Utc.fix());
        Self {
            started: Instant::now(),
            booted_at: Utc::now().with_timezone(&offset),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn booted_at(&self) -> DateTime<FixedOffset> {
        self.booted_at
    }
}

/// `H:MM:SS[.ffffff]`, prefixed with `N day(s), ` past 24 hours.
pub fn format_uptime(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    let micros = elapsed.subsec_micros();
    let days = secs / 86_400;
    let hours = secs % 86_400 / 3_600;
    let minutes = secs % 3_600 / 60;
    let seconds = secs % 60;

    let clock = if micros == 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}:{:02}.{:06}", hours, minutes, seconds, micros)
    };

    match days {
        0 => clock,
        1 => format!("1 day, {}", clock),
        n => format!("{} days, {}", n, clock),
    }
}

pub struct AppState {
    transport: Arc<dyn ChatTransport>,
    webhook_token: String,
    webhook_url: Option<String>,
    admin_password: Option<String>,
    uptime: Uptime,
}

impl AppState {
    pub fn new(config: &ServerConfig, transport: Arc<dyn ChatTransport>) -> Self {
        Self {
            transport,
            webhook_token: config.webhook_token.clone(),
            webhook_url: config.webhook_url(),
            admin_password: config.admin_password.clone(),
            uptime: Uptime::start(config.utc_offset_hours),
        }
    }

    fn authorize(&self, query: &AdminQuery, page: &str) -> Result<()> {
        // An unset password only admits requests that supply none.
        if query.password.as_deref() == self.admin_password.as_deref() {
            return Ok(());
        }
        info!(target: AUDIT_TARGET, "{} page loaded without password", page);
        Err(BotError::AuthDenied)
    }
}

#[derive(Debug, Deserialize)]
struct AdminQuery {
    password: Option<String>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(status))
        .route("/set_webhook", get(webhook_on))
        .route("/remove_webhook", get(webhook_off))
        .route("/remove_webhook/{token}", get(webhook_off_with_token))
        .route("/{token}", post(receive_update))
        .with_state(state)
}

pub async fn serve(state: Arc<AppState>, bind_address: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind_address)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_address))?;

    info!("HTTP server listening on {}", bind_address);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

async fn status(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AdminQuery>,
) -> Result<Html<String>> {
    state.authorize(&query, "Status")?;

    Ok(Html(format!(
        "<h1>This is the chatlog demo bot server</h1>\
         <p>Server uptime: {}</p>\
         <p>Server last boot at {}</p>",
        format_uptime(state.uptime.elapsed()),
        state.uptime.booted_at().format("%Y-%m-%d %H:%M:%S%.6f%:z")
    )))
}

/// Telegram webhook receiver, mounted at `/<webhook_token>`.
///
/// Always answers `200 !` on the secret path. Telegram disables a webhook that
/// keeps failing, so unreadable bodies, decode errors and handler errors are
/// logged here and never returned to the caller.
async fn receive_update(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
    body: std::result::Result<Bytes, BytesRejection>,
) -> (StatusCode, &'static str) {
    if token != state.webhook_token {
        return (StatusCode::NOT_FOUND, "");
    }

    let span = info_span!("update", request_id = %Uuid::new_v4());

    async {
        let body = match body {
            Ok(body) => body,
            Err(rejection) => {
                let err = BotError::MalformedPayload(rejection.body_text());
                warn!("Dropping unreadable webhook body: {}", err);
                return;
            }
        };
        match decode_update(&body) {
            Ok(update) => {
                debug!(?update, "New update received");
                if let Err(e) = dispatch(&update, &state.transport).await {
                    error!("Failed to handle update from chat {}: {}", update.chat_id, e);
                }
            }
            Err(e) => warn!("Dropping webhook body ({} bytes): {}", body.len(), e),
        }
    }
    .instrument(span)
    .await;

    (StatusCode::OK, "!")
}

async fn webhook_on(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AdminQuery>,
) -> Result<Html<&'static str>> {
    state.authorize(&query, "Set_webhook")?;

    let url = state
        .webhook_url
        .as_deref()
        .ok_or(BotError::InvalidUrl(url::ParseError::EmptyHost))?;

    async {
        state.transport.delete_webhook().await?;
        state.transport.set_webhook(url).await
    }
    .await
    .inspect_err(|e| error!("Failed to set webhook: {}", e))?;

    info!(target: AUDIT_TARGET, "Webhook is ON! Url: {}", url);
    Ok(Html("<h1>WebHook is ON!</h1>"))
}

async fn webhook_off(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AdminQuery>,
) -> Result<Html<&'static str>> {
    state.authorize(&query, "Remove_webhook")?;
    remove_webhook(&state).await
}

async fn webhook_off_with_token(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
    Query(query): Query<AdminQuery>,
) -> Result<Html<&'static str>> {
    if token != state.webhook_token {
        info!(target: AUDIT_TARGET, "Remove_webhook page loaded with a wrong token");
        return Err(BotError::AuthDenied);
    }
    state.authorize(&query, "Remove_webhook")?;
    remove_webhook(&state).await
}

async fn remove_webhook(state: &AppState) -> Result<Html<&'static str>> {
    state
        .transport
        .delete_webhook()
        .await
        .inspect_err(|e| error!("Failed to remove webhook: {}", e))?;

    info!(target: AUDIT_TARGET, "WebHook is OFF!");
    Ok(Html("<h1>WebHook is OFF!</h1>"))
}
