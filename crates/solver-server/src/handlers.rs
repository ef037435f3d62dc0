//! HTTP/WebSocket Handlers

use axum::{
    Json,
    extract::{
        Path, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    http::StatusCode,
    response::Response,
};
use futures::{SinkExt, StreamExt, stream::SplitSink};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use solver_core::{Agent, AgentError, AgentEvent, ChatTurn, SessionId, SharedSession};

use crate::state::AppState;

// ============================================================================
// Request / Response Types
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub model: String,
    pub server_key_configured: bool,
    /// Provider answered with the server-side key; `None` without one
    pub provider_reachable: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub session_id: Option<String>,
    pub question: String,
    #[serde(default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub session_id: SessionId,
    pub turns: Vec<ChatTurn>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub session_id: SessionId,
    pub turns: Vec<ChatTurn>,
    pub steps: Vec<AgentEvent>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// Frames sent on the streaming socket
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamFrame {
    Step { event: AgentEvent },
    Token { delta: String },
    Turn { session_id: SessionId, turn: ChatTurn },
    Error { error: String, code: String },
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, code: &str, error: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
            code: code.into(),
        }),
    )
}

/// Map the errors that escape `Session::submit` or agent assembly
fn agent_error(err: &AgentError) -> ApiError {
    match err {
        AgentError::EmptyQuestion => {
            api_error(StatusCode::BAD_REQUEST, "EMPTY_QUESTION", err.to_string())
        }
        AgentError::InvalidSessionId(_) => {
            api_error(StatusCode::BAD_REQUEST, "INVALID_SESSION_ID", err.to_string())
        }
        _ => {
            tracing::error!(error = %err, "Agent setup failed");
            api_error(StatusCode::INTERNAL_SERVER_ERROR, "AGENT_ERROR", err.to_string())
        }
    }
}

/// Checks shared by the REST and WebSocket chat paths
fn validate(state: &AppState, request: &ChatRequest) -> Result<String, ApiError> {
    let api_key = state
        .resolve_api_key(request.api_key.as_deref())
        .ok_or_else(|| {
            api_error(
                StatusCode::UNAUTHORIZED,
                "MISSING_API_KEY",
                "Please add the Groq API key",
            )
        })?;

    if request.question.trim().is_empty() {
        return Err(agent_error(&AgentError::EmptyQuestion));
    }

    Ok(api_key)
}

fn session_for(
    state: &AppState,
    session_id: Option<&str>,
) -> Result<(SessionId, SharedSession), ApiError> {
    match session_id {
        Some(id) => {
            let id = SessionId::parse(id).map_err(|e| agent_error(&e))?;
            let session = state.sessions.get_or_create(&id);
            Ok((id, session))
        }
        None => Ok(state.sessions.create()),
    }
}

/// Everything a chat request needs before the agent runs
fn prepare(
    state: &AppState,
    request: &ChatRequest,
    stream: bool,
) -> Result<(Agent, SessionId, SharedSession), ApiError> {
    let api_key = validate(state, request)?;
    let agent = state.agent(&api_key, stream).map_err(|e| agent_error(&e))?;
    let (session_id, session) = session_for(state, request.session_id.as_deref())?;
    Ok((agent, session_id, session))
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let provider_reachable = match &state.default_api_key {
        Some(key) => Some((state.providers)(key).health_check().await.unwrap_or(false)),
        None => None,
    };

    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        model: state.settings.generation.model.clone(),
        server_key_configured: state.default_api_key.is_some(),
        provider_reachable,
    })
}

/// Start a new chat session
pub async fn create_session(State(state): State<AppState>) -> (StatusCode, Json<SessionResponse>) {
    let (session_id, session) = state.sessions.create();
    let turns = session.lock().await.transcript().to_vec();

    (StatusCode::CREATED, Json(SessionResponse { session_id, turns }))
}

/// Transcript of an existing session
pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionResponse>, ApiError> {
    let session_id = SessionId::from_string(id);
    let session = state.sessions.get(&session_id).ok_or_else(|| {
        api_error(StatusCode::NOT_FOUND, "SESSION_NOT_FOUND", "Session not found")
    })?;

    let turns = session.lock().await.transcript().to_vec();
    Ok(Json(SessionResponse { session_id, turns }))
}

/// Main chat endpoint (non-streaming)
pub async fn chat_handler(
    State(state): State<AppState>,
    Json(payload): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let (agent, session_id, session) = prepare(&state, &payload, false)?;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut session = session.lock().await;
    session
        .submit(&agent, &payload.question, Some(&tx))
        .await
        .map_err(|e| agent_error(&e))?;
    drop(tx);

    let mut steps = Vec::new();
    while let Ok(event) = rx.try_recv() {
        steps.push(event);
    }

    tracing::info!(session = %session_id, steps = steps.len(), "Question answered");

    Ok(Json(ChatResponse {
        session_id,
        turns: session.transcript().to_vec(),
        steps,
    }))
}

/// WebSocket streaming chat
pub async fn chat_stream_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_stream(socket, state))
}

async fn send_frame(
    sender: &mut SplitSink<WebSocket, Message>,
    frame: &StreamFrame,
) -> Result<(), axum::Error> {
    let text = serde_json::to_string(frame).map_err(axum::Error::new)?;
    sender.send(Message::Text(text.into())).await
}

/// Send agent events as frames until the run drops its sender.
/// Returns `false` once the client is gone.
async fn relay_events(
    sender: &mut SplitSink<WebSocket, Message>,
    rx: &mut mpsc::UnboundedReceiver<AgentEvent>,
) -> bool {
    while let Some(event) = rx.recv().await {
        let frame = match event {
            AgentEvent::Token { delta } => StreamFrame::Token { delta },
            event => StreamFrame::Step { event },
        };
        if send_frame(sender, &frame).await.is_err() {
            return false;
        }
    }
    true
}

async fn handle_stream(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    while let Some(msg) = receiver.next().await {
        let msg = match msg {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Err(e) => {
                tracing::error!("WebSocket error: {}", e);
                break;
            }
            _ => continue,
        };

        let prepared = serde_json::from_str::<ChatRequest>(msg.as_str())
            .map_err(|e| api_error(StatusCode::BAD_REQUEST, "BAD_REQUEST", e.to_string()))
            .and_then(|request| {
                prepare(&state, &request, true).map(|prepared| (request, prepared))
            });

        let (request, (agent, session_id, session)) = match prepared {
            Ok(ready) => ready,
            Err((_, Json(body))) => {
                let frame = StreamFrame::Error {
                    error: body.error,
                    code: body.code,
                };
                if send_frame(&mut sender, &frame).await.is_err() {
                    break;
                }
                continue;
            }
        };

        let (tx, mut rx) = mpsc::unbounded_channel();
        let run = async move {
            let mut session = session.lock().await;
            session.submit(&agent, &request.question, Some(&tx)).await
        };
        tokio::pin!(run);

        // Dropping `run` on disconnect stops the agent mid-question
        let (connected, result) = {
            let relay = relay_events(&mut sender, &mut rx);
            tokio::pin!(relay);

            let mut result = None;
            let connected = loop {
                tokio::select! {
                    outcome = &mut run, if result.is_none() => result = Some(outcome),
                    connected = &mut relay => break connected,
                    incoming = receiver.next() => match incoming {
                        Some(Ok(Message::Close(_)) | Err(_)) | None => break false,
                        Some(Ok(_)) => tracing::debug!("Ignoring frame while an answer is in flight"),
                    },
                }
            };
            (connected, result)
        };
        if !connected {
            tracing::debug!(session = %session_id, "Client left during a run");
            break;
        }

        let result = match result {
            Some(outcome) => outcome,
            None => run.await,
        };
        let frame = match result {
            Ok(turn) => StreamFrame::Turn { session_id, turn },
            Err(e) => {
                let (_, Json(body)) = agent_error(&e);
                StreamFrame::Error {
                    error: body.error,
                    code: body.code,
                }
            }
        };
        if send_frame(&mut sender, &frame).await.is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        net::SocketAddr,
        sync::{Arc, Mutex},
        time::Duration,
    };

    use axum::{
        Router,
        body::{Body, to_bytes},
        http::Request,
    };
    use math_tools::{AssistantSettings, StaticWiki};
    use serde_json::{Value, json};
    use solver_core::{
        ERROR_MARKER, LlmProvider, MemorySessionStore, mock::ScriptedProvider, session::GREETING,
    };
    use tokio::net::{TcpListener, TcpStream};
    use tokio_tungstenite::{
        MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message as WsMessage,
    };
    use tower::ServiceExt;

    use super::*;
    use crate::state::ProviderFactory;

    type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

    fn state_with(provider: ScriptedProvider, default_key: Option<&str>) -> (AppState, Arc<Mutex<Vec<String>>>) {
        let provider = Arc::new(provider);
        let keys = Arc::new(Mutex::new(Vec::new()));
        let seen = keys.clone();
        let factory: ProviderFactory = Arc::new(move |key: &str| {
            seen.lock().unwrap().push(key.to_string());
            provider.clone() as Arc<dyn LlmProvider>
        });

        let state = AppState::new(
            factory,
            Arc::new(StaticWiki::new()),
            AssistantSettings::default(),
            default_key.map(ToString::to_string),
        );
        (state, keys)
    }

    fn app_with(provider: ScriptedProvider, default_key: Option<&str>) -> (Router, Arc<Mutex<Vec<String>>>) {
        let (state, keys) = state_with(provider, default_key);
        (crate::build_router(state, "does-not-exist"), keys)
    }

    /// Serve the router on an ephemeral port, as the binary does
    async fn serve(app: Router) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        addr
    }

    async fn next_frame(ws: &mut WsClient) -> Value {
        loop {
            let msg = ws.next().await.unwrap().unwrap();
            if msg.is_text() {
                return serde_json::from_str(msg.to_text().unwrap()).unwrap();
            }
        }
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => request
                .header("content-type", "application/json")
                .body(Body::from(body.to_string())),
            None => request.body(Body::empty()),
        }
        .unwrap();

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _) = app_with(ScriptedProvider::new(), None);
        let (status, body) = send(&app, "GET", "/health", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["model"], "gemma2-9b-it");
        assert_eq!(body["server_key_configured"], false);
        assert_eq!(body["provider_reachable"], Value::Null);
    }

    #[tokio::test]
    async fn test_health_checks_provider_with_server_key() {
        let (app, keys) = app_with(ScriptedProvider::new(), Some("gsk_server"));
        let (status, body) = send(&app, "GET", "/health", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["server_key_configured"], true);
        assert_eq!(body["provider_reachable"], true);
        assert_eq!(keys.lock().unwrap().as_slice(), ["gsk_server"]);
    }

    #[tokio::test]
    async fn test_new_session_starts_with_greeting() {
        let (app, _) = app_with(ScriptedProvider::new(), None);
        let (status, body) = send(&app, "POST", "/api/session", None).await;

        assert_eq!(status, StatusCode::CREATED);
        let turns = body["turns"].as_array().unwrap();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0]["role"], "assistant");
        assert_eq!(turns[0]["text"], GREETING);

        let id = body["session_id"].as_str().unwrap();
        let (status, fetched) = send(&app, "GET", &format!("/api/session/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched["turns"], body["turns"]);
    }

    #[tokio::test]
    async fn test_unknown_session_is_404() {
        let (app, _) = app_with(ScriptedProvider::new(), None);
        let (status, body) = send(&app, "GET", "/api/session/nope", None).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "SESSION_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_missing_api_key() {
        let (app, keys) = app_with(ScriptedProvider::new(), None);
        let (status, body) = send(
            &app,
            "POST",
            "/api/chat",
            Some(json!({"question": "What is 2 + 2?", "api_key": "   "})),
        )
        .await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "MISSING_API_KEY");
        assert!(keys.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_question_appends_nothing() {
        let (app, _) = app_with(ScriptedProvider::new(), Some("gsk_server"));
        let (_, created) = send(&app, "POST", "/api/session", None).await;
        let id = created["session_id"].as_str().unwrap().to_string();

        let (status, body) = send(
            &app,
            "POST",
            "/api/chat",
            Some(json!({"session_id": id, "question": "  \n"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "EMPTY_QUESTION");
        assert_eq!(body["error"], "Please enter a question");

        let (_, fetched) = send(&app, "GET", &format!("/api/session/{id}"), None).await;
        assert_eq!(fetched["turns"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_chat_appends_question_and_answer() {
        let provider = ScriptedProvider::new()
            .reply("```tool\n{\"tool\": \"calculator\", \"arguments\": {\"expression\": \"10 / 100 * 100\"}}\n```")
            .reply("Final Answer: 10 percent of 100 is 10.");
        let (app, keys) = app_with(provider, None);

        let (status, body) = send(
            &app,
            "POST",
            "/api/chat",
            Some(json!({"question": "What is 10 percent of 100?", "api_key": "gsk_user"})),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let turns = body["turns"].as_array().unwrap();
        assert_eq!(turns.len(), 3);
        assert_eq!(turns[1]["role"], "user");
        assert_eq!(turns[1]["text"], "What is 10 percent of 100?");
        assert_eq!(turns[2]["role"], "assistant");
        assert_eq!(turns[2]["text"], "10 percent of 100 is 10.");

        let steps = body["steps"].as_array().unwrap();
        assert!(steps.iter().any(|s| s["type"] == "tool_end" && s["output"] == "Answer: 10"));
        assert_eq!(steps.last().unwrap()["type"], "answer");

        assert_eq!(keys.lock().unwrap().as_slice(), ["gsk_user"]);
    }

    #[tokio::test]
    async fn test_agent_failure_becomes_warning_turn() {
        let provider =
            ScriptedProvider::new().fail(AgentError::Auth("invalid API key".into()));
        let (app, keys) = app_with(provider, Some("gsk_server"));

        let (status, body) = send(
            &app,
            "POST",
            "/api/chat",
            Some(json!({"question": "What is 2 + 2?"})),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let turns = body["turns"].as_array().unwrap();
        assert_eq!(turns.len(), 3);
        let reply = turns[2]["text"].as_str().unwrap();
        assert!(reply.starts_with(ERROR_MARKER));
        assert!(reply.contains("invalid API key"));

        assert_eq!(keys.lock().unwrap().as_slice(), ["gsk_server"]);
    }

    #[tokio::test]
    async fn test_follow_up_uses_same_session() {
        let provider = ScriptedProvider::new().otherwise("Final Answer: 4");
        let (app, _) = app_with(provider, Some("gsk_server"));

        let (_, first) = send(&app, "POST", "/api/chat", Some(json!({"question": "2 + 2?"}))).await;
        let id = first["session_id"].as_str().unwrap();

        let (_, second) = send(
            &app,
            "POST",
            "/api/chat",
            Some(json!({"session_id": id, "question": "And again?"})),
        )
        .await;
        assert_eq!(second["session_id"], id);
        assert_eq!(second["turns"].as_array().unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_invalid_session_id_is_rejected() {
        let (state, _) = state_with(ScriptedProvider::new().otherwise("Final Answer: 4"), Some("gsk_server"));
        let sessions = state.sessions.clone();
        let app = crate::build_router(state, "does-not-exist");

        for id in ["x".repeat(65), "../etc/passwd".to_string(), String::new()] {
            let (status, body) = send(
                &app,
                "POST",
                "/api/chat",
                Some(json!({"session_id": id, "question": "2 + 2?"})),
            )
            .await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body["code"], "INVALID_SESSION_ID");
        }
        assert!(sessions.is_empty());
    }

    #[tokio::test]
    async fn test_fresh_session_ids_stay_bounded() {
        let (state, _) = state_with(ScriptedProvider::new().otherwise("Final Answer: 4"), Some("gsk_server"));
        let state = state.with_session_store(MemorySessionStore::with_limits(
            Duration::from_secs(3600),
            20,
        ));
        let sessions = state.sessions.clone();
        let app = crate::build_router(state, "does-not-exist");

        for n in 0..200 {
            let (status, _) = send(
                &app,
                "POST",
                "/api/chat",
                Some(json!({"session_id": format!("client-{n}"), "question": "2 + 2?"})),
            )
            .await;
            assert_eq!(status, StatusCode::OK);
        }
        assert_eq!(sessions.len(), 20);
    }

    #[tokio::test]
    async fn test_stream_sends_tokens_then_steps_then_one_turn() {
        let provider = ScriptedProvider::new()
            .reply("```tool\n{\"tool\": \"calculator\", \"arguments\": {\"expression\": \"2 + 2\"}}\n```")
            .reply("Final Answer: 2 + 2 is 4.");
        let (app, _) = app_with(provider, Some("gsk_server"));
        let addr = serve(app).await;

        let (mut ws, _) = connect_async(format!("ws://{addr}/api/chat/stream")).await.unwrap();
        ws.send(WsMessage::text(json!({"question": "What is 2 + 2?"}).to_string()))
            .await
            .unwrap();

        let mut frames = Vec::new();
        loop {
            let frame = next_frame(&mut ws).await;
            let done = frame["type"] == "turn" || frame["type"] == "error";
            frames.push(frame);
            if done {
                break;
            }
        }

        let kinds: Vec<&str> = frames.iter().map(|f| f["type"].as_str().unwrap()).collect();
        assert_eq!(kinds[0], "token");
        assert_eq!(kinds.iter().filter(|k| **k == "turn").count(), 1);
        assert_eq!(*kinds.last().unwrap(), "turn");

        // Tokens of the first reply arrive before the tool runs
        let first_step = kinds.iter().position(|k| *k == "step").unwrap();
        assert!(kinds[..first_step].iter().all(|k| *k == "token"));

        let steps: Vec<&Value> = frames
            .iter()
            .filter(|f| f["type"] == "step")
            .map(|f| &f["event"])
            .collect();
        assert_eq!(steps[0]["type"], "tool_start");
        assert!(steps.iter().any(|e| e["type"] == "tool_end" && e["output"] == "Answer: 4"));
        assert_eq!(steps.last().unwrap()["type"], "answer");

        let streamed: String = frames
            .iter()
            .filter(|f| f["type"] == "token")
            .map(|f| f["delta"].as_str().unwrap())
            .collect();
        assert!(streamed.contains("```tool"));
        assert!(streamed.ends_with("Final Answer: 2 + 2 is 4."));

        let turn = frames.last().unwrap();
        assert_eq!(turn["turn"]["role"], "assistant");
        assert_eq!(turn["turn"]["text"], "2 + 2 is 4.");
        assert!(turn["session_id"].is_string());
    }

    #[tokio::test]
    async fn test_stream_error_frame_keeps_socket_open() {
        let (app, _) = app_with(ScriptedProvider::new().otherwise("Final Answer: 4"), Some("gsk_server"));
        let addr = serve(app).await;
        let (mut ws, _) = connect_async(format!("ws://{addr}/api/chat/stream")).await.unwrap();

        ws.send(WsMessage::text(json!({"question": "   "}).to_string()))
            .await
            .unwrap();
        let frame = next_frame(&mut ws).await;
        assert_eq!(frame["type"], "error");
        assert_eq!(frame["code"], "EMPTY_QUESTION");

        ws.send(WsMessage::text("not json")).await.unwrap();
        let frame = next_frame(&mut ws).await;
        assert_eq!(frame["code"], "BAD_REQUEST");

        ws.send(WsMessage::text(json!({"question": "2 + 2?"}).to_string()))
            .await
            .unwrap();
        let frame = loop {
            let frame = next_frame(&mut ws).await;
            if frame["type"] != "token" && frame["type"] != "step" {
                break frame;
            }
        };
        assert_eq!(frame["type"], "turn");
        assert_eq!(frame["turn"]["text"], "4");
    }
}
