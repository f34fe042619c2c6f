use std::sync::Arc;

use tracing::debug;

use crate::error::Result;
use crate::handlers;
use crate::transport::ChatTransport;
use crate::update::IncomingUpdate;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Id,
    Example,
    File,
}

impl Command {
    /// Exact, case-sensitive match on the token without its leading `/`.
    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "start" => Some(Command::Start),
            "help" => Some(Command::Help),
            "id" => Some(Command::Id),
            "example" => Some(Command::Example),
            "file" => Some(Command::File),
            _ => None,
        }
    }
}

/// Run the handler for the update's command. Updates without a recognized
/// command are dropped without a reply.
pub async fn dispatch(update: &IncomingUpdate, transport: &Arc<dyn ChatTransport>) -> Result<()> {
    let Some(token) = update.command.as_deref() else {
        debug!("Ignoring non-command message in chat {}", update.chat_id);
        return Ok(());
    };
    let Some(command) = Command::parse(token) else {
        debug!("Ignoring unknown command /{} in chat {}", token, update.chat_id);
        return Ok(());
    };

    match command {
        Command::Start | Command::Help => handlers::start(update, transport).await,
        Command::Id => handlers::id(update, transport).await,
        Command::Example => handlers::example(update, transport).await,
        Command::File => handlers::file(update, transport).await,
    }
}
