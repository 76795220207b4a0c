//! KidsChat: a friendly chat for curious kids.
//!
//! A [`chat::ChatSession`] owns one transcript and drives one request per
//! submission through an injected [`completion::CompletionClient`]. The Web UI
//! ([`web_server`]) and the terminal chat ([`terminal`]) are thin shells around
//! it. [`package`] and [`dump`] are developer utilities.

pub mod chat;
pub mod completion;
pub mod constants;
pub mod dump;
pub mod markdown;
pub mod message;
pub mod package;
pub mod terminal;
pub mod web_server;

pub use chat::{ChatSession, Completion, PendingRequest, Reply};
pub use completion::{CompletionClient, CompletionError, DeepSeekClient};
pub use message::{Message, Role};
