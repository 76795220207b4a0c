// Text-based chat session, the terminal counterpart of the Web UI.

use anyhow::{Context, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::info;

use crate::chat::ChatSession;

const EXIT_COMMAND: &str = "/exit";

/// Reads one line per turn from `input` until EOF or `/exit`, printing replies to `output`.
pub async fn run_terminal_chat<R, W>(session: &mut ChatSession, input: R, mut output: W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();

    output
        .write_all(b"Ask me anything! (type /exit to leave)\n> ")
        .await?;
    output.flush().await?;

    while let Some(line) = lines.next_line().await.context("Failed to read from stdin")? {
        if line.trim() == EXIT_COMMAND {
            break;
        }

        session.set_input(line);
        if let Some(pending) = session.begin_submit() {
            output.write_all(b"Thinking...\n").await?;
            output.flush().await?;

            let client = session.client();
            let completion = pending.send(client.as_ref()).await;
            if let Some(reply) = session.finish(completion) {
                output.write_all(reply.content.as_bytes()).await?;
                output.write_all(b"\n").await?;
            }
        }

        output.write_all(b"> ").await?;
        output.flush().await?;
    }

    output.write_all(b"\nBye!\n").await?;
    output.flush().await?;
    info!(messages = session.transcript().len(), "Chat session finished");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::{CompletionClient, CompletionError};
    use crate::message::Message;
    use async_trait::async_trait;
    use std::sync::Arc;

    struct Echo;

    #[async_trait]
    impl CompletionClient for Echo {
        async fn complete(&self, _: &str, history: &[Message]) -> Result<String, CompletionError> {
            Ok(format!("You said {}", history.last().unwrap().content))
        }
    }

    #[tokio::test]
    async fn test_terminal_chat_round_trip() {
        let mut session = ChatSession::new(Arc::new(Echo), "sys");
        let input: &[u8] = b"hello\n\n   \nbye\n/exit\nignored\n";
        let mut output = Vec::new();

        run_terminal_chat(&mut session, input, &mut output).await.unwrap();

        let printed = String::from_utf8(output).unwrap();
        assert!(printed.contains("You said hello"));
        assert!(printed.contains("You said bye"));
        assert!(!printed.contains("ignored"));
        assert_eq!(printed.matches("Thinking...").count(), 2);
        assert_eq!(session.transcript().len(), 4);
    }

    #[tokio::test]
    async fn test_terminal_chat_stops_at_eof() {
        let mut session = ChatSession::new(Arc::new(Echo), "sys");
        let input: &[u8] = b"";
        let mut output = Vec::new();

        run_terminal_chat(&mut session, input, &mut output).await.unwrap();

        assert!(String::from_utf8(output).unwrap().ends_with("Bye!\n"));
        assert!(session.transcript().is_empty());
    }
}
