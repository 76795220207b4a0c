// Settings loaded from the environment (after dotenvy has read .env), with defaults.

use std::env;

pub const DEFAULT_DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com";
pub const DEFAULT_MODEL: &str = "deepseek-chat";
pub const DEFAULT_PORT: u16 = 9900;

pub const SYSTEM_PROMPT: &str = "You are a helpful assistant for children. Provide simple, fun, and educational answers. Use Markdown formatting to make your responses more engaging.";

/// Appended when the endpoint answers with an empty message.
pub const EMPTY_REPLY_FALLBACK: &str = "Sorry, I couldn't generate a response.";
/// Appended when the completion call fails for any reason.
pub const ERROR_REPLY: &str = "Oops! Something went wrong. Please try again.";

pub const DEFAULT_ARCHIVE_NAME: &str = "kidschat.tar.gz";
pub const DEFAULT_DUMP_NAME: &str = "project-code-dump.txt";

lazy_static::lazy_static! {
    // VITE_DEEPSEEK_API_KEY is still honoured so existing .env files keep working.
    pub static ref DEEPSEEK_API_KEY: String = env::var("DEEPSEEK_API_KEY")
        .or_else(|_| env::var("VITE_DEEPSEEK_API_KEY"))
        .unwrap_or_default();
    pub static ref DEEPSEEK_BASE_URL: String = env::var("DEEPSEEK_BASE_URL").unwrap_or_else(|_| DEFAULT_DEEPSEEK_BASE_URL.to_string());
    pub static ref KIDSCHAT_MODEL: String = env::var("KIDSCHAT_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
    pub static ref KIDSCHAT_PORT: u16 = env::var("KIDSCHAT_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(DEFAULT_PORT);
}
