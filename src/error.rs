use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use thiserror::Error;

/// Per-request failures. None of these are fatal to the process.
#[derive(Debug, Error)]
pub enum BotError {
    #[error("access denied")]
    AuthDenied,

    #[error("malformed update payload: {0}")]
    MalformedPayload(String),

    #[error("delivery to chat failed: {0}")]
    Delivery(String),

    #[error("temporary file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid webhook url: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

pub type Result<T> = std::result::Result<T, BotError>;

pub const ACCESS_DENIED_PAGE: &str = "<h1>Access denied!</h1>";

impl IntoResponse for BotError {
    fn into_response(self) -> Response {
        let (status, title) = match self {
            BotError::AuthDenied => {
                return (StatusCode::FORBIDDEN, Html(ACCESS_DENIED_PAGE.to_string())).into_response()
            }
            BotError::Delivery(_) | BotError::InvalidUrl(_) => {
                (StatusCode::BAD_GATEWAY, "Telegram request failed")
            }
            BotError::MalformedPayload(_) | BotError::Io(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
            }
        };
        let body = format!(
            "<h1>{}</h1><p>{}</p>",
            title,
            teloxide::utils::html::escape(&self.to_string())
        );
        (status, Html(body)).into_response()
    }
}
