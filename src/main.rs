use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

use kidschat::chat::ChatSession;
use kidschat::completion::{CompletionClient, DeepSeekClient};
use kidschat::constants;
use kidschat::web_server::{self, WebConfig};
use kidschat::{dump, package, terminal};

// Define the command-line interface structure using clap
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// DeepSeek API key (defaults to DEEPSEEK_API_KEY or VITE_DEEPSEEK_API_KEY).
    #[arg(long, global = true)]
    api_key: Option<String>,
    /// Base URL of the chat-completion API (defaults to DEEPSEEK_BASE_URL).
    #[arg(long, global = true)]
    base_url: Option<String>,
    /// Model name sent with every request (defaults to KIDSCHAT_MODEL).
    #[arg(long, global = true)]
    model: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

// Define the available subcommands
#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Serve the KidsChat web UI.
    Serve {
        #[arg(long, help = "Port for the web server (defaults to KIDSCHAT_PORT or 9900).")]
        port: Option<u16>,
        #[arg(long, env = "KIDSCHAT_TEMPLATES", help = "Load templates from this directory and reload them on change.")]
        templates: Option<PathBuf>,
        #[arg(long, env = "KIDSCHAT_STATIC_DIR", default_value = "static", help = "Directory served under /static.")]
        static_dir: PathBuf,
    },
    /// Chat with KidsChat in the terminal.
    Chat,
    /// Package the project into a .tar.gz archive.
    Package {
        #[arg(long, default_value = ".", help = "Project root to package.")]
        root: PathBuf,
        #[arg(long, default_value = constants::DEFAULT_ARCHIVE_NAME, help = "Archive to write.")]
        output: PathBuf,
    },
    /// Dump the main project files into a single text file.
    Dump {
        #[arg(long, default_value = ".", help = "Project root to read files from.")]
        root: PathBuf,
        #[arg(long, default_value = constants::DEFAULT_DUMP_NAME, help = "Text file to write.")]
        output: PathBuf,
    },
}

impl Cli {
    fn completion_client(&self) -> Arc<dyn CompletionClient> {
        let api_key = self
            .api_key
            .clone()
            .unwrap_or_else(|| constants::DEEPSEEK_API_KEY.clone());
        if api_key.is_empty() {
            warn!("No DeepSeek API key configured; requests will fail until DEEPSEEK_API_KEY is set");
        }
        let base_url = self
            .base_url
            .clone()
            .unwrap_or_else(|| constants::DEEPSEEK_BASE_URL.clone());
        Arc::new(DeepSeekClient::new(api_key, base_url, self.model_name()))
    }

    fn model_name(&self) -> String {
        self.model
            .clone()
            .unwrap_or_else(|| constants::KIDSCHAT_MODEL.clone())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (for the DeepSeek API key)
    dotenvy::dotenv().ok();

    // Reads log level from RUST_LOG (e.g., RUST_LOG=info,kidschat=debug)
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    info!("KidsChat starting with command: {:?}", cli.command);

    match &cli.command {
        Commands::Serve {
            port,
            templates,
            static_dir,
        } => {
            let config = WebConfig {
                port: port.unwrap_or(*constants::KIDSCHAT_PORT),
                templates_dir: templates.clone(),
                static_dir: static_dir.clone(),
            };
            let client = cli.completion_client();
            let model = cli.model_name();

            let mut web_server_handle = tokio::spawn(async move {
                if let Err(e) =
                    web_server::start_web_server(config, client, constants::SYSTEM_PROMPT, &model).await
                {
                    error!("Web server failed: {:?}", e);
                }
            });

            let ctrl_c = tokio::signal::ctrl_c();
            tokio::pin!(ctrl_c);

            tokio::select! {
                _ = &mut ctrl_c => {
                    info!("Ctrl-C received, initiating shutdown...");
                }
                res = &mut web_server_handle => {
                    match res {
                        Ok(_) => info!("Web server task completed unexpectedly."),
                        Err(e) if e.is_panic() => error!("Web server task panicked: {:?}", e),
                        Err(e) => error!("Web server task failed: {:?}", e),
                    }
                }
            }

            if !web_server_handle.is_finished() {
                info!("Aborting web server task...");
                web_server_handle.abort();
            }
            info!("Shutdown complete.");
        }
        Commands::Chat => {
            info!("Starting interactive chat session...");
            let mut session = ChatSession::new(cli.completion_client(), constants::SYSTEM_PROMPT);
            let stdin = tokio::io::BufReader::new(tokio::io::stdin());
            terminal::run_terminal_chat(&mut session, stdin, tokio::io::stdout())
                .await
                .context("Chat session failed")?;
        }
        Commands::Package { root, output } => {
            let (root, output) = (root.clone(), output.clone());
            let summary = tokio::task::spawn_blocking(move || package::package_project(&root, &output))
                .await
                .context("Packaging task panicked")??;
            println!("Project packaged as {}", summary.output.display());
        }
        Commands::Dump { root, output } => {
            let summary = dump::dump_code(root, dump::DUMP_FILES, output).await?;
            println!("All code has been dumped to {}", summary.output.display());
        }
    }

    Ok(())
}
