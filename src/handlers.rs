//! Chat command handlers. Each one writes an audit record for the admins and
//! replies in the chat the command came from.

use std::sync::Arc;

use teloxide::utils::html;
use tracing::info;

use crate::error::Result;
use crate::logbridge::{ChatFileSender, ChatLogger, AUDIT_TARGET};
use crate::transport::ChatTransport;
use crate::update::IncomingUpdate;

pub const DEMO_GREETING: &str = "Hello from chatlog";
pub const DEMO_FILE_NAME: &str = "test.txt";
pub const DEMO_FILE_CAPTION: &str = "Test file";

const HELP_TEXT: &str = "<b>Hello! This bot shows how the chatlog bridge sends log records \
to Telegram and helps to set it up.</b>\n\n\
<b>You can use these commands:</b>\n\
• /example - quickstart example\n\
• /id - return your <b>user_id</b>\n\
• /file - file logging example\n\
• /help - shows this message";

const SAMPLE_HEADER: &str = "<b>This code will run and result will be shown below</b>";

fn example_sample(update: &IncomingUpdate) -> String {
    let code = format!(
        "let transport = Arc::new(TelegramTransport::from_token(YOUR_BOT_TOKEN_GOES_HERE));\n\
         let users = vec![{chat_id}];\n\n\
         let logger = ChatLogger::new(\"{name}\", transport, users);\n\
         logger.info(\"{greeting}\");",
        chat_id = update.chat_id,
        name = update.logger_name(),
        greeting = DEMO_GREETING,
    );
    format!("{}\n\n{}", SAMPLE_HEADER, html::code_block(&code))
}

fn file_sample(update: &IncomingUpdate) -> String {
    let code = format!(
        "let transport = Arc::new(TelegramTransport::from_token(YOUR_BOT_TOKEN_GOES_HERE));\n\
         let users = vec![{chat_id}];\n\n\
         let files = ChatFileSender::new(transport, users);\n\n\
         let path = Path::new(\"{file_name}\");\n\
         tokio::fs::write(path, \"{greeting}\").await?;\n\n\
         files.send(path, \"{caption}\").await?;",
        chat_id = update.chat_id,
        file_name = DEMO_FILE_NAME,
        greeting = DEMO_GREETING,
        caption = DEMO_FILE_CAPTION,
    );
    format!("{}\n\n{}", SAMPLE_HEADER, html::code_block(&code))
}

/// `/start` and `/help`
pub async fn start(update: &IncomingUpdate, transport: &Arc<dyn ChatTransport>) -> Result<()> {
    info!(
        target: AUDIT_TARGET,
        "{} ({}) used /start or /help",
        update.display_name(),
        update.chat_id
    );
    transport.send_html(update.chat_id, HELP_TEXT).await
}

/// `/id`: echo the chat id so the user can put it in a recipient list.
pub async fn id(update: &IncomingUpdate, transport: &Arc<dyn ChatTransport>) -> Result<()> {
    info!(
        target: AUDIT_TARGET,
        "{} ({}) used /id",
        update.display_name(),
        update.chat_id
    );
    let text = format!("<code>user_id = [{}]</code>", update.chat_id);
    transport.send_html(update.chat_id, &text).await
}

/// `/example`: show the quickstart code, then run it against the user's chat.
///
/// The records are queued on a logger owned by this request and delivered
/// after the handler returns.
pub async fn example(update: &IncomingUpdate, transport: &Arc<dyn ChatTransport>) -> Result<()> {
    info!(
        target: AUDIT_TARGET,
        "{} ({}) wants an example",
        update.display_name(),
        update.chat_id
    );
    transport
        .send_html(update.chat_id, &example_sample(update))
        .await?;

    let logger = ChatLogger::new(
        update.logger_name(),
        Arc::clone(transport),
        vec![update.chat_id],
    );
    logger.info(DEMO_GREETING);
    logger.info(&format!("Finishing the example for {}", update.display_name()));
    Ok(())
}

/// `/file`: show the file logging code, then upload a freshly written file.
pub async fn file(update: &IncomingUpdate, transport: &Arc<dyn ChatTransport>) -> Result<()> {
    info!(
        target: AUDIT_TARGET,
        "{} ({}) used /file",
        update.display_name(),
        update.chat_id
    );
    transport
        .send_html(update.chat_id, &file_sample(update))
        .await?;

    // Removed when `scratch` drops, on every return path.
    let scratch = tempfile::Builder::new().prefix("chatlog-file-").tempdir()?;
    let path = scratch.path().join(DEMO_FILE_NAME);
    tokio::fs::write(&path, DEMO_GREETING).await?;

    ChatFileSender::new(Arc::clone(transport), vec![update.chat_id])
        .send(&path, DEMO_FILE_CAPTION)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BotError;
    use crate::transport::testing::{RecordingTransport, Sent};

    fn update(command: &str) -> IncomingUpdate {
        IncomingUpdate {
            sender_user_id: 888,
            sender_username: "alice".to_string(),
            chat_id: 4242,
            command: Some(command.to_string()),
            raw_text: format!("/{}", command),
        }
    }

    #[test]
    fn test_example_sample_mentions_user() {
        let sample = example_sample(&update("example"));
        assert!(sample.contains("vec![4242]"));
        assert!(sample.contains("&quot;alice&quot;") || sample.contains("\"alice\""));
        assert!(sample.starts_with(SAMPLE_HEADER));
    }

    #[tokio::test]
    async fn test_id_reply_format() {
        let recorder = RecordingTransport::new();
        let transport: Arc<dyn ChatTransport> = recorder.clone();
        id(&update("id"), &transport).await.unwrap();

        assert_eq!(
            recorder.sent().await,
            vec![Sent::Message {
                chat_id: 4242,
                text: "<code>user_id = [4242]</code>".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn test_example_logs_hello_then_finishing() {
        let recorder = RecordingTransport::new();
        let transport: Arc<dyn ChatTransport> = recorder.clone();
        example(&update("example"), &transport).await.unwrap();

        let sent = recorder.wait_for(3).await;
        assert_eq!(sent.len(), 3);

        let texts: Vec<&str> = sent
            .iter()
            .map(|s| match s {
                Sent::Message { chat_id, text } => {
                    assert_eq!(*chat_id, 4242);
                    text.as_str()
                }
                other => panic!("unexpected send: {:?}", other),
            })
            .collect();
        assert!(texts[0].starts_with(SAMPLE_HEADER));
        assert!(texts[1].contains("Hello from chatlog"));
        assert!(texts[2].contains("Finishing the example for @alice"));
    }

    #[tokio::test]
    async fn test_file_sends_demo_file_once() {
        let recorder = RecordingTransport::new();
        let transport: Arc<dyn ChatTransport> = recorder.clone();
        file(&update("file"), &transport).await.unwrap();

        let sent = recorder.sent().await;
        let documents: Vec<&Sent> = sent
            .iter()
            .filter(|s| matches!(s, Sent::Document { .. }))
            .collect();
        assert_eq!(documents.len(), 1);
        assert_eq!(
            documents[0],
            &Sent::Document {
                chat_id: 4242,
                file_name: DEMO_FILE_NAME.to_string(),
                content: DEMO_GREETING.to_string(),
                caption: DEMO_FILE_CAPTION.to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_file_removes_scratch_dir_after_upload() {
        let recorder = RecordingTransport::new();
        let transport: Arc<dyn ChatTransport> = recorder.clone();
        file(&update("file"), &transport).await.unwrap();

        let uploads = recorder.uploads().await;
        assert_eq!(uploads.len(), 1);
        assert!(!uploads[0].exists());
        assert!(!uploads[0].parent().unwrap().exists());
    }

    #[tokio::test]
    async fn test_file_removes_scratch_dir_after_failed_upload() {
        let recorder = RecordingTransport::failing_documents();
        let transport: Arc<dyn ChatTransport> = recorder.clone();
        let err = file(&update("file"), &transport).await.unwrap_err();
        assert!(matches!(err, BotError::Delivery(_)));

        let uploads = recorder.uploads().await;
        assert_eq!(uploads.len(), 1);
        assert!(!uploads[0].exists());
        assert!(!uploads[0].parent().unwrap().exists());

        // The code sample still went out before the upload failed.
        let sent = recorder.sent().await;
        assert_eq!(sent.len(), 1);
        assert!(matches!(&sent[0], Sent::Message { chat_id: 4242, .. }));
    }

    #[tokio::test]
    async fn test_concurrent_file_commands_do_not_collide() {
        let recorder = RecordingTransport::new();
        let transport: Arc<dyn ChatTransport> = recorder.clone();
        let first = update("file");
        let mut second = update("file");
        second.chat_id = 7;

        let (a, b) = tokio::join!(file(&first, &transport), file(&second, &transport));
        a.unwrap();
        b.unwrap();

        let documents = recorder
            .sent()
            .await
            .into_iter()
            .filter(|s| matches!(s, Sent::Document { content, .. } if content == DEMO_GREETING))
            .count();
        assert_eq!(documents, 2);
    }
}
