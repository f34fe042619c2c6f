//! Logging-to-chat bridge.
//!
//! - [`ChatLogger`] turns log records into Telegram messages for a fixed list of
//!   recipients. Records are queued and delivered in order by a background task,
//!   so logging never waits on the network.
//! - [`ChatFileSender`] uploads a local file to every recipient.
//! - [`AuditLayer`] is a `tracing` layer that captures events logged with
//!   `target: AUDIT_TARGET`; [`spawn_audit_forwarder`] relays them to the admins.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use teloxide::utils::html;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::field::{Field, Visit};
use tracing::{debug, warn, Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

use crate::error::Result;
use crate::transport::ChatTransport;

/// Events logged with this target are forwarded to the admin chats.
pub const AUDIT_TARGET: &str = "audit";

/// HTML body of one log record as it appears in the chat.
pub fn render_record(logger: &str, level: Level, message: &str) -> String {
    format!(
        "{} {}\n{}",
        html::bold(&html::escape(logger)),
        html::code_inline(level.as_str()),
        html::code_block(message)
    )
}

pub struct ChatLogger {
    name: String,
    min_level: Level,
    tx: mpsc::UnboundedSender<String>,
}

impl ChatLogger {
    /// Create a logger delivering to `recipients`. Must be called inside a
    /// tokio runtime; the delivery task ends once the logger is dropped and
    /// its queue is drained.
    pub fn new(
        name: impl Into<String>,
        transport: Arc<dyn ChatTransport>,
        recipients: Vec<i64>,
    ) -> Self {
        let name = name.into();
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(deliver_records(name.clone(), rx, transport, recipients));
        Self {
            name,
            min_level: Level::INFO,
            tx,
        }
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.min_level = level;
        self
    }

    pub fn log(&self, level: Level, message: &str) {
        if level > self.min_level {
            return;
        }
        debug!(logger = %self.name, %level, "Queueing chat log record: {}", message);
        if self.tx.send(render_record(&self.name, level, message)).is_err() {
            warn!("Chat logger '{}' has no delivery task; record dropped", self.name);
        }
    }

    pub fn info(&self, message: &str) {
        self.log(Level::INFO, message);
    }
}

async fn deliver_records(
    name: String,
    mut rx: mpsc::UnboundedReceiver<String>,
    transport: Arc<dyn ChatTransport>,
    recipients: Vec<i64>,
) {
    while let Some(text) = rx.recv().await {
        for &chat_id in &recipients {
            if let Err(e) = transport.send_html(chat_id, &text).await {
                warn!("Chat logger '{}' failed to deliver to {}: {}", name, chat_id, e);
            }
        }
    }
    debug!("Chat logger '{}' delivery task finished", name);
}

/// Sends files to a fixed list of recipients.
pub struct ChatFileSender {
    transport: Arc<dyn ChatTransport>,
    recipients: Vec<i64>,
}

impl ChatFileSender {
    pub fn new(transport: Arc<dyn ChatTransport>, recipients: Vec<i64>) -> Self {
        Self {
            transport,
            recipients,
        }
    }

    /// Upload `path` with `caption`. Stops at the first failed delivery.
    pub async fn send(&self, path: &Path, caption: &str) -> Result<()> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("file");
        for &chat_id in &self.recipients {
            self.transport
                .send_document(chat_id, path, file_name, caption)
                .await?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AuditRecord {
    pub level: Level,
    pub message: String,
}

/// Captures audit events into a channel. Pair with [`spawn_audit_forwarder`].
pub struct AuditLayer {
    tx: mpsc::UnboundedSender<AuditRecord>,
}

pub fn audit_channel() -> (AuditLayer, mpsc::UnboundedReceiver<AuditRecord>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (AuditLayer { tx }, rx)
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: Vec<String>,
}

impl MessageVisitor {
    fn finish(self) -> String {
        if self.fields.is_empty() {
            self.message
        } else {
            format!("{} {}", self.message, self.fields.join(" "))
        }
    }
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.fields.push(format!("{}={}", field.name(), value));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        } else {
            self.fields.push(format!("{}={:?}", field.name(), value));
        }
    }
}

impl<S: Subscriber> Layer<S> for AuditLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        if meta.target() != AUDIT_TARGET || *meta.level() > Level::INFO {
            return;
        }
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        // The forwarder may not be running (no admins configured).
        let _ = self.tx.send(AuditRecord {
            level: *meta.level(),
            message: visitor.finish(),
        });
    }
}

/// Relay captured audit records through `logger` until the layer is gone.
pub fn spawn_audit_forwarder(
    mut rx: mpsc::UnboundedReceiver<AuditRecord>,
    logger: ChatLogger,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(record) = rx.recv().await {
            logger.log(record.level, &record.message);
        }
    })
}
