use serde::Deserialize;
use teloxide::types::Message;

use crate::error::{BotError, Result};

/// One received chat message, reduced to what the command handlers need.
#[derive(Debug, Clone, PartialEq)]
pub struct IncomingUpdate {
    pub sender_user_id: i64,
    /// Empty when the sender has no public username.
    pub sender_username: String,
    pub chat_id: i64,
    /// Command token without the leading `/` or `@botname` suffix.
    pub command: Option<String>,
    pub raw_text: String,
}

impl IncomingUpdate {
    fn new(
        sender_user_id: i64,
        sender_username: Option<String>,
        chat_id: i64,
        text: Option<String>,
    ) -> Self {
        let raw_text = text.unwrap_or_default();
        Self {
            sender_user_id,
            sender_username: sender_username.unwrap_or_default(),
            chat_id,
            command: extract_command(&raw_text),
            raw_text,
        }
    }

    /// Build from a message received by the long-poll dispatcher.
    pub fn from_message(msg: &Message) -> Option<Self> {
        let user = msg.from.as_ref()?;
        let sender_user_id = i64::try_from(user.id.0).ok()?;
        Some(Self::new(
            sender_user_id,
            user.username.clone(),
            msg.chat.id.0,
            msg.text().map(str::to_string),
        ))
    }

    /// `@username`, or `id<user id>` for users without one.
    pub fn display_name(&self) -> String {
        if self.sender_username.is_empty() {
            format!("id{}", self.sender_user_id)
        } else {
            format!("@{}", self.sender_username)
        }
    }

    /// Name used for the user's chat logger.
    pub fn logger_name(&self) -> String {
        if self.sender_username.is_empty() {
            format!("id{}", self.sender_user_id)
        } else {
            self.sender_username.clone()
        }
    }
}

// Raw Bot API shapes. Only the fields we read are declared; serde ignores the rest.

#[derive(Debug, Deserialize)]
struct RawUpdate {
    message: Option<RawMessage>,
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    chat: Option<RawChat>,
    from: Option<RawUser>,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawChat {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct RawUser {
    id: i64,
    #[serde(default)]
    username: Option<String>,
}

/// Decode a webhook POST body into an [`IncomingUpdate`].
pub fn decode_update(body: &[u8]) -> Result<IncomingUpdate> {
    let raw: RawUpdate =
        serde_json::from_slice(body).map_err(|e| BotError::MalformedPayload(e.to_string()))?;

    let message = raw
        .message
        .ok_or_else(|| BotError::MalformedPayload("update carries no message".to_string()))?;
    let chat = message
        .chat
        .ok_or_else(|| BotError::MalformedPayload("message has no chat id".to_string()))?;
    let from = message
        .from
        .ok_or_else(|| BotError::MalformedPayload("message has no sender id".to_string()))?;

    Ok(IncomingUpdate::new(from.id, from.username, chat.id, message.text))
}

fn extract_command(text: &str) -> Option<String> {
    let token = text.split_whitespace().next()?;
    let name = token.strip_prefix('/')?;
    let name = name.split('@').next().unwrap_or_default();
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}
