use std::sync::Arc;

use anyhow::Result;
use teloxide::prelude::*;
use tracing::{error, info, warn};

use crate::commands::dispatch;
use crate::transport::ChatTransport;
use crate::update::IncomingUpdate;

/// Long-poll Telegram and feed every message through the command router.
/// Used when no public HTTPS endpoint is available.
pub async fn run(bot: Bot, transport: Arc<dyn ChatTransport>) -> Result<()> {
    info!("Starting Telegram long polling...");

    let handler = Update::filter_message().endpoint(handle_message);

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![transport])
        .default_handler(|upd| async move {
            warn!("Unhandled update: {:?}", upd.id);
        })
        .error_handler(LoggingErrorHandler::with_custom_text("polling"))
        .build()
        .dispatch()
        .await;

    Ok(())
}

async fn handle_message(msg: Message, transport: Arc<dyn ChatTransport>) -> ResponseResult<()> {
    let Some(update) = IncomingUpdate::from_message(&msg) else {
        return Ok(());
    };

    if let Err(e) = dispatch(&update, &transport).await {
        error!("Failed to handle update from chat {}: {}", update.chat_id, e);
    }

    Ok(())
}
