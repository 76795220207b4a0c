use anyhow::{Context, Result};
use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        State,
    },
    http::StatusCode,
    response::{Html, IntoResponse},
    routing::get,
    serve, Router,
};
use minijinja::{path_loader, Environment};
use minijinja_autoreload::AutoReloader;
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, path::PathBuf, sync::Arc};
use tokio::task::JoinSet;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::{debug, error, info, warn};

use crate::chat::{ChatSession, Completion, PendingRequest};
use crate::completion::CompletionClient;
use crate::markdown::render_markdown;
use crate::message::{Message, Role};

const INDEX_TEMPLATE: &str = include_str!("../templates/index.html");
pub const PAGE_TITLE: &str = "KidsChat with DeepSeek";

/// Frames the browser sends over `/ws`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "message_type", content = "payload")]
pub enum ClientMessage {
    Submit { text: String },
}

/// Frames the server pushes to the browser over `/ws`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "message_type", content = "payload")]
pub enum ServerMessage {
    Info {
        message: String,
    },
    Message {
        role: Role,
        content: String,
        // Only assistant replies are rendered; user text is shown verbatim.
        html: Option<String>,
    },
    Busy {
        busy: bool,
    },
}

impl ServerMessage {
    pub fn from_message(message: &Message) -> Self {
        let html = match message.role {
            Role::Assistant => Some(render_markdown(&message.content)),
            Role::User | Role::System => None,
        };
        ServerMessage::Message {
            role: message.role,
            content: message.content.clone(),
            html,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WebConfig {
    pub port: u16,
    /// Load templates from this directory (with auto-reload) instead of the embedded copy.
    pub templates_dir: Option<PathBuf>,
    pub static_dir: PathBuf,
}

// Shared application state
#[derive(Clone)]
pub struct AppState {
    templates: Arc<AutoReloader>,
    client: Arc<dyn CompletionClient>,
    system_prompt: Arc<str>,
    model: Arc<str>,
}

impl AppState {
    pub fn new(
        client: Arc<dyn CompletionClient>,
        system_prompt: &str,
        model: &str,
        templates_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            templates: Arc::new(create_minijinja_env(templates_dir)),
            client,
            system_prompt: Arc::from(system_prompt),
            model: Arc::from(model),
        }
    }
}

// Minijinja Environment setup
fn create_minijinja_env(templates_dir: Option<PathBuf>) -> AutoReloader {
    AutoReloader::new(move |notifier| {
        let mut env = Environment::new();
        match &templates_dir {
            Some(dir) => {
                env.set_loader(path_loader(dir.clone()));
                notifier.watch_path(dir, true);
            }
            None => env.add_template("index.html", INDEX_TEMPLATE)?,
        }
        Ok(env)
    })
}

async fn index_handler(State(state): State<AppState>) -> Result<Html<String>, (StatusCode, Html<String>)> {
    state
        .templates
        .acquire_env()
        .and_then(|env| {
            env.get_template("index.html").and_then(|tmpl| {
                let context = minijinja::context! {
                    title => PAGE_TITLE,
                    model => state.model.as_ref(),
                    placeholder => "Ask me anything!",
                };
                tmpl.render(context)
            })
        })
        .map(Html)
        .map_err(|e| {
            error!("Failed to get or render template: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Html(format!("Internal Server Error: {}", e)),
            )
        })
}

// WebSocket upgrade handler
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    info!("WebSocket connection upgrade requested");
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Applies one text frame from the browser to the session.
///
/// Returns the frames to push back and, for an accepted submit, the request
/// that still has to be sent.
pub fn apply_client_frame(
    session: &mut ChatSession,
    frame: &str,
) -> (Vec<ServerMessage>, Option<PendingRequest>) {
    let request = match serde_json::from_str::<ClientMessage>(frame) {
        Ok(request) => request,
        Err(e) => {
            warn!("Ignoring malformed client frame: {}", e);
            return (Vec::new(), None);
        }
    };

    match request {
        ClientMessage::Submit { text } => {
            session.set_input(text);
            let Some(pending) = session.begin_submit() else {
                debug!("Ignoring blank submit");
                return (Vec::new(), None);
            };
            let mut out = Vec::with_capacity(2);
            if let Some(user_message) = session.transcript().last() {
                out.push(ServerMessage::from_message(user_message));
            }
            out.push(ServerMessage::Busy { busy: true });
            (out, Some(pending))
        }
    }
}

/// Applies a finished completion; stale ones produce no frames.
pub fn apply_completion(session: &mut ChatSession, completion: Completion) -> Vec<ServerMessage> {
    match session.finish(completion) {
        Some(reply) => {
            let reply = ServerMessage::from_message(reply);
            vec![reply, ServerMessage::Busy { busy: session.is_busy() }]
        }
        None => Vec::new(),
    }
}

async fn send_frames(socket: &mut WebSocket, frames: Vec<ServerMessage>) -> Result<()> {
    for frame in frames {
        let json = serde_json::to_string(&frame).context("Failed to serialize server frame")?;
        socket
            .send(WsMessage::Text(json))
            .await
            .context("WebSocket send failed")?;
    }
    Ok(())
}

// Each connection is one page session and owns its own transcript.
async fn handle_socket(mut socket: WebSocket, state: AppState) {
    info!("New WebSocket connection established");
    let mut session = ChatSession::new(state.client.clone(), state.system_prompt.as_ref());
    // Calls still in flight are aborted when the page goes away.
    let mut in_flight: JoinSet<Completion> = JoinSet::new();

    let welcome = ServerMessage::Info {
        message: "Connected to KidsChat".to_string(),
    };
    if send_frames(&mut socket, vec![welcome]).await.is_err() {
        warn!("Failed to send welcome message to new WebSocket client");
        return;
    }

    loop {
        tokio::select! {
            Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                let completion = match joined {
                    Ok(completion) => completion,
                    Err(e) => {
                        error!("Completion task failed: {}", e);
                        continue;
                    }
                };
                let frames = apply_completion(&mut session, completion);
                if let Err(e) = send_frames(&mut socket, frames).await {
                    warn!("WebSocket client disconnected or send error: {:?}", e);
                    break;
                }
            }

            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(WsMessage::Text(text))) => {
                        let (frames, pending) = apply_client_frame(&mut session, &text);
                        if let Some(pending) = pending {
                            let client = session.client();
                            in_flight.spawn(async move { pending.send(client.as_ref()).await });
                        }
                        if let Err(e) = send_frames(&mut socket, frames).await {
                            warn!("WebSocket client disconnected or send error: {:?}", e);
                            break;
                        }
                    }
                    Some(Ok(WsMessage::Binary(_))) => {
                        warn!("Received unexpected binary message from client");
                    }
                    Some(Ok(WsMessage::Ping(_))) | Some(Ok(WsMessage::Pong(_))) => {}
                    Some(Ok(WsMessage::Close(_))) => {
                        info!("Client requested WebSocket close");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!("WebSocket receive error: {}", e);
                        break;
                    }
                    None => {
                        info!("WebSocket client disconnected");
                        break;
                    }
                }
            }
        }
    }
    if !in_flight.is_empty() {
        info!(aborted = in_flight.len(), "Aborting completion calls for closed WebSocket");
        in_flight.abort_all();
    }
    info!(
        messages = session.transcript().len(),
        "WebSocket connection closed, transcript discarded"
    );
}

pub fn build_router(state: AppState, static_dir: impl Into<PathBuf>) -> Router {
    let static_files_service = ServeDir::new(static_dir.into()).not_found_service(
        tower::service_fn(|_| async {
            Ok::<_, std::convert::Infallible>((StatusCode::NOT_FOUND, "Not Found").into_response())
        }),
    );

    Router::new()
        .route("/", get(index_handler))
        .route("/ws", get(ws_handler))
        .nest_service("/static", static_files_service)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

pub async fn start_web_server(
    config: WebConfig,
    client: Arc<dyn CompletionClient>,
    system_prompt: &str,
    model: &str,
) -> Result<()> {
    let state = AppState::new(client, system_prompt, model, config.templates_dir.clone());
    let app = build_router(state, config.static_dir.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Web server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context(format!("Failed to bind to address {}", addr))?;

    serve(listener, app.into_make_service())
        .await
        .context("Web server failed")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::Reply;
    use crate::completion::CompletionError;
    use async_trait::async_trait;

    struct NeverCalled;

    #[async_trait]
    impl CompletionClient for NeverCalled {
        async fn complete(&self, _: &str, _: &[Message]) -> Result<String, CompletionError> {
            panic!("frames are applied without calling the endpoint");
        }
    }

    fn session() -> ChatSession {
        ChatSession::new(Arc::new(NeverCalled), "sys")
    }

    #[test]
    fn test_client_message_wire_format() {
        let parsed: ClientMessage =
            serde_json::from_str(r#"{"message_type":"Submit","payload":{"text":"hi"}}"#).unwrap();
        assert_eq!(parsed, ClientMessage::Submit { text: "hi".to_string() });
    }

    #[test]
    fn test_submit_frame_echoes_user_message_and_busy() {
        let mut session = session();
        let (frames, pending) =
            apply_client_frame(&mut session, r#"{"message_type":"Submit","payload":{"text":"hi"}}"#);

        assert!(pending.is_some());
        assert_eq!(
            frames,
            vec![
                ServerMessage::Message {
                    role: Role::User,
                    content: "hi".to_string(),
                    html: None,
                },
                ServerMessage::Busy { busy: true },
            ]
        );
    }

    #[test]
    fn test_blank_and_malformed_frames_are_ignored() {
        let mut session = session();
        let (frames, pending) =
            apply_client_frame(&mut session, r#"{"message_type":"Submit","payload":{"text":"  "}}"#);
        assert!(frames.is_empty());
        assert!(pending.is_none());

        let (frames, pending) = apply_client_frame(&mut session, "not json");
        assert!(frames.is_empty());
        assert!(pending.is_none());
        assert!(session.transcript().is_empty());
    }

    #[test]
    fn test_completion_frames_render_markdown() {
        let mut session = session();
        let (_, pending) =
            apply_client_frame(&mut session, r#"{"message_type":"Submit","payload":{"text":"hi"}}"#);
        let pending = pending.unwrap();

        let frames = apply_completion(
            &mut session,
            Completion {
                generation: pending.generation,
                reply: Reply::Text("**Hello!**".to_string()),
            },
        );

        assert_eq!(frames.len(), 2);
        match &frames[0] {
            ServerMessage::Message { role, content, html } => {
                assert_eq!(*role, Role::Assistant);
                assert_eq!(content, "**Hello!**");
                assert!(html.as_deref().unwrap().contains("<strong>Hello!</strong>"));
            }
            other => panic!("unexpected frame {:?}", other),
        }
        assert_eq!(frames[1], ServerMessage::Busy { busy: false });
    }

    #[test]
    fn test_stale_completion_sends_nothing() {
        let mut session = session();
        let submit = r#"{"message_type":"Submit","payload":{"text":"hi"}}"#;
        let (_, first) = apply_client_frame(&mut session, submit);
        let (_, _second) = apply_client_frame(&mut session, submit);

        let frames = apply_completion(
            &mut session,
            Completion {
                generation: first.unwrap().generation,
                reply: Reply::Failed,
            },
        );
        assert!(frames.is_empty());
        assert!(session.is_busy());
    }
}
