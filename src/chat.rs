// Transcript controller shared by the Web UI and the terminal chat.

use std::sync::Arc;

use tracing::{debug, error, info};

use crate::completion::CompletionClient;
use crate::constants::{EMPTY_REPLY_FALLBACK, ERROR_REPLY};
use crate::message::Message;

/// Outcome of a completion call, already stripped of error details.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Text(String),
    Failed,
}

/// A finished call, stamped with the generation of the submit that started it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub generation: u64,
    pub reply: Reply,
}

/// Everything needed to perform one completion call, detached from the session
/// so it can run on another task.
#[derive(Debug, Clone)]
pub struct PendingRequest {
    pub generation: u64,
    pub system_prompt: String,
    pub history: Vec<Message>,
}

impl PendingRequest {
    /// Performs the call. Errors are logged and folded into [`Reply::Failed`].
    pub async fn send(self, client: &dyn CompletionClient) -> Completion {
        let reply = match client.complete(&self.system_prompt, &self.history).await {
            Ok(text) => Reply::Text(text),
            Err(e) => {
                error!(generation = self.generation, "Error: {}", e);
                Reply::Failed
            }
        };
        Completion {
            generation: self.generation,
            reply,
        }
    }
}

/// One conversation: the transcript, the input field and the busy flag.
pub struct ChatSession {
    client: Arc<dyn CompletionClient>,
    system_prompt: String,
    transcript: Vec<Message>,
    input: String,
    busy: bool,
    generation: u64,
}

impl ChatSession {
    pub fn new(client: Arc<dyn CompletionClient>, system_prompt: impl Into<String>) -> Self {
        Self {
            client,
            system_prompt: system_prompt.into(),
            transcript: Vec::new(),
            input: String::new(),
            busy: false,
            generation: 0,
        }
    }

    pub fn client(&self) -> Arc<dyn CompletionClient> {
        self.client.clone()
    }

    pub fn transcript(&self) -> &[Message] {
        &self.transcript
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn set_input(&mut self, text: impl Into<String>) {
        self.input = text.into();
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Starts a submission of the current input.
    ///
    /// Returns `None` and changes nothing when the input is blank. Otherwise
    /// the user message is appended right away, the input is cleared, the
    /// session turns busy and the request to send is returned.
    pub fn begin_submit(&mut self) -> Option<PendingRequest> {
        if self.input.trim().is_empty() {
            return None;
        }

        let text = std::mem::take(&mut self.input);

        // The payload is built from the transcript as it was before this
        // submit, followed by its own copy of the new user message.
        let mut history = self.transcript.clone();
        history.push(Message::user(text.clone()));

        self.transcript.push(Message::user(text));
        self.busy = true;
        self.generation += 1;

        debug!(
            generation = self.generation,
            transcript_len = self.transcript.len(),
            "Submitting message"
        );

        Some(PendingRequest {
            generation: self.generation,
            system_prompt: self.system_prompt.clone(),
            history,
        })
    }

    /// Applies a finished call and returns the appended assistant message.
    ///
    /// Completions from an older generation are dropped: a newer submit is
    /// still outstanding, so nothing is appended and the session stays busy.
    pub fn finish(&mut self, completion: Completion) -> Option<&Message> {
        if completion.generation != self.generation {
            info!(
                stale = completion.generation,
                current = self.generation,
                "Discarding stale completion"
            );
            return None;
        }

        let content = match completion.reply {
            Reply::Text(text) if text.is_empty() => EMPTY_REPLY_FALLBACK.to_string(),
            Reply::Text(text) => text,
            Reply::Failed => ERROR_REPLY.to_string(),
        };

        self.transcript.push(Message::assistant(content));
        self.busy = false;
        self.transcript.last()
    }

    /// Runs a whole request/response cycle for the current input.
    /// Returns `false` when the input was blank and nothing happened.
    pub async fn submit(&mut self) -> bool {
        let Some(pending) = self.begin_submit() else {
            return false;
        };
        let client = self.client.clone();
        let completion = pending.send(client.as_ref()).await;
        self.finish(completion);
        true
    }
}
