// Developer utility: concatenates the interesting project files into a single text dump.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Files included in the dump, in output order, relative to the project root.
pub const DUMP_FILES: &[&str] = &[
    "Cargo.toml",
    "src/main.rs",
    "src/lib.rs",
    "src/constants.rs",
    "src/message.rs",
    "src/completion.rs",
    "src/chat.rs",
    "src/markdown.rs",
    "src/web_server.rs",
    "src/terminal.rs",
    "src/package.rs",
    "src/dump.rs",
    "templates/index.html",
    "static/kidschat.css",
    "static/kidschat.js",
    ".env",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpSummary {
    pub output: PathBuf,
    pub included: usize,
    /// Files that could not be read; their section holds the error text instead.
    pub failed: Vec<String>,
}

/// Builds the dump text. A file that cannot be read gets an inline error
/// instead of its contents and does not stop the rest.
pub async fn render_dump(root: &Path, files: &[&str]) -> (String, Vec<String>) {
    let mut output = String::new();
    let mut failed = Vec::new();

    for file in files {
        output.push_str(&format!("\n\n--- {} ---\n\n", file));
        match tokio::fs::read(root.join(file)).await {
            // Invalid UTF-8 is replaced rather than treated as a read failure.
            Ok(bytes) => output.push_str(&String::from_utf8_lossy(&bytes)),
            Err(err) => {
                warn!(file = *file, "Could not read file for dump: {}", err);
                output.push_str(&format!("Error reading file: {}", err));
                failed.push(file.to_string());
            }
        }
    }

    (output, failed)
}

pub async fn dump_code(root: &Path, files: &[&str], output: &Path) -> Result<DumpSummary> {
    let (text, failed) = render_dump(root, files).await;

    tokio::fs::write(output, text)
        .await
        .with_context(|| format!("Failed to write dump to {}", output.display()))?;

    info!(
        files = files.len(),
        failed = failed.len(),
        output = %output.display(),
        "Code dump written"
    );
    Ok(DumpSummary {
        output: output.to_path_buf(),
        included: files.len() - failed.len(),
        failed,
    })
}
