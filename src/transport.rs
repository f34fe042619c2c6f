//! Chat transport boundary.
//!
//! [`ChatTransport`] is everything the bot needs from the chat platform: send an
//! HTML message, send a file, and set or clear the webhook. [`TelegramTransport`]
//! implements it on top of teloxide.

use std::path::Path;

use async_trait::async_trait;
use teloxide::payloads::{SendDocumentSetters, SendMessageSetters};
use teloxide::prelude::*;
use teloxide::types::{InputFile, ParseMode};
use tracing::debug;
use url::Url;

use crate::error::{BotError, Result};

#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Sends an HTML-formatted message to one chat.
    async fn send_html(&self, chat_id: i64, text: &str) -> Result<()>;

    /// Uploads the file at `path` to one chat, shown as `file_name`.
    async fn send_document(
        &self,
        chat_id: i64,
        path: &Path,
        file_name: &str,
        caption: &str,
    ) -> Result<()>;

    async fn set_webhook(&self, url: &str) -> Result<()>;

    async fn delete_webhook(&self) -> Result<()>;
}

/// Teloxide-based implementation of [`ChatTransport`].
#[derive(Clone)]
pub struct TelegramTransport {
    bot: Bot,
}

impl TelegramTransport {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    pub fn from_token(token: &str) -> Self {
        Self::new(Bot::new(token))
    }
}

fn delivery(err: teloxide::RequestError) -> BotError {
    BotError::Delivery(err.to_string())
}

#[async_trait]
impl ChatTransport for TelegramTransport {
    async fn send_html(&self, chat_id: i64, text: &str) -> Result<()> {
        self.bot
            .send_message(ChatId(chat_id), text)
            .parse_mode(ParseMode::Html)
            .await
            .map_err(delivery)?;
        Ok(())
    }

    async fn send_document(
        &self,
        chat_id: i64,
        path: &Path,
        file_name: &str,
        caption: &str,
    ) -> Result<()> {
        debug!("Uploading {} to chat {}", path.display(), chat_id);
        let file = InputFile::file(path.to_path_buf()).file_name(file_name.to_string());
        self.bot
            .send_document(ChatId(chat_id), file)
            .caption(caption)
            .await
            .map_err(delivery)?;
        Ok(())
    }

    async fn set_webhook(&self, url: &str) -> Result<()> {
        let url = Url::parse(url)?;
        self.bot.set_webhook(url).await.map_err(delivery)?;
        Ok(())
    }

    async fn delete_webhook(&self) -> Result<()> {
        self.bot.delete_webhook().await.map_err(delivery)?;
        Ok(())
    }
}

#[cfg(test)]
pub mod testing {
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::sync::Mutex;

    use super::*;

    /// One call observed by [`RecordingTransport`].
    #[derive(Debug, Clone, PartialEq)]
    pub enum Sent {
        Message {
            chat_id: i64,
            text: String,
        },
        Document {
            chat_id: i64,
            file_name: String,
            content: String,
            caption: String,
        },
        SetWebhook(String),
        DeleteWebhook,
    }

    /// Records every call instead of talking to Telegram. Can be switched to
    /// fail sends to exercise delivery-failure paths.
    #[derive(Default)]
    pub struct RecordingTransport {
        sent: Mutex<Vec<Sent>>,
        /// Every path handed to `send_document`, failed uploads included.
        uploads: Mutex<Vec<PathBuf>>,
        failing: AtomicBool,
        failures_left: AtomicUsize,
        fail_documents: AtomicBool,
    }

    impl RecordingTransport {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub fn failing() -> Arc<Self> {
            let transport = Self::default();
            transport.failing.store(true, Ordering::SeqCst);
            Arc::new(transport)
        }

        /// Fails the first `count` calls, then records normally.
        pub fn failing_first(count: usize) -> Arc<Self> {
            let transport = Self::default();
            transport.failures_left.store(count, Ordering::SeqCst);
            Arc::new(transport)
        }

        /// Fails every document upload; messages go through.
        pub fn failing_documents() -> Arc<Self> {
            let transport = Self::default();
            transport.fail_documents.store(true, Ordering::SeqCst);
            Arc::new(transport)
        }

        pub async fn uploads(&self) -> Vec<PathBuf> {
            self.uploads.lock().await.clone()
        }

        pub async fn sent(&self) -> Vec<Sent> {
            self.sent.lock().await.clone()
        }

        /// Polls until at least `count` calls were recorded or a second passes.
        pub async fn wait_for(&self, count: usize) -> Vec<Sent> {
            let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
            loop {
                let sent = self.sent().await;
                if sent.len() >= count || tokio::time::Instant::now() >= deadline {
                    return sent;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        }

        async fn record(&self, call: Sent) -> Result<()> {
            let fail_now = self.failing.load(Ordering::SeqCst)
                || self
                    .failures_left
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                    .is_ok();
            if fail_now {
                return Err(BotError::Delivery("transport unavailable".to_string()));
            }
            self.sent.lock().await.push(call);
            Ok(())
        }
    }

    #[async_trait]
    impl ChatTransport for RecordingTransport {
        async fn send_html(&self, chat_id: i64, text: &str) -> Result<()> {
            self.record(Sent::Message {
                chat_id,
                text: text.to_string(),
            })
            .await
        }

        async fn send_document(
            &self,
            chat_id: i64,
            path: &Path,
            file_name: &str,
            caption: &str,
        ) -> Result<()> {
            self.uploads.lock().await.push(path.to_path_buf());
            if self.fail_documents.load(Ordering::SeqCst) {
                return Err(BotError::Delivery("upload rejected".to_string()));
            }
            let content = tokio::fs::read_to_string(path).await?;
            self.record(Sent::Document {
                chat_id,
                file_name: file_name.to_string(),
                content,
                caption: caption.to_string(),
            })
            .await
        }

        async fn set_webhook(&self, url: &str) -> Result<()> {
            Url::parse(url)?;
            self.record(Sent::SetWebhook(url.to_string())).await
        }

        async fn delete_webhook(&self) -> Result<()> {
            self.record(Sent::DeleteWebhook).await
        }
    }
}
