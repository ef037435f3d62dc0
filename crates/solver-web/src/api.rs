//! API Client

use std::{cell::Cell, rc::Rc};

use serde::{Deserialize, Serialize};
use wasm_bindgen::{JsCast, closure::Closure};
use web_sys::{MessageEvent, WebSocket};

/// One chat bubble as sent by the server
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: String,
    pub text: String,
}

/// Agent step reported alongside an answer
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Step {
    Thought { text: String },
    ToolStart { tool: String, input: serde_json::Value },
    ToolEnd { tool: String, success: bool, output: String },
    ParseError { message: String },
    Token { delta: String },
    Answer { text: String },
}

impl Step {
    /// Heading and body for the collapsed step list; `None` for stream noise
    pub fn describe(&self) -> Option<(String, String)> {
        match self {
            Self::Thought { text } => Some(("💭 Thought".into(), text.clone())),
            Self::ToolStart { tool, input } => Some((format!("🔧 {tool}"), input.to_string())),
            Self::ToolEnd { tool, success: true, output } => {
                Some((format!("✅ {tool} result"), output.clone()))
            }
            Self::ToolEnd { tool, success: false, output } => {
                Some((format!("❌ {tool} failed"), output.clone()))
            }
            Self::ParseError { message } => Some(("⚠️ Could not parse".into(), message.clone())),
            Self::Token { .. } | Self::Answer { .. } => None,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct Health {
    pub model: String,
    pub server_key_configured: bool,
}

#[derive(Clone, Debug, Deserialize)]
pub struct SessionReply {
    pub session_id: String,
    pub turns: Vec<ChatTurn>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ChatReply {
    pub session_id: String,
    pub turns: Vec<ChatTurn>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

/// Frames pushed by the streaming endpoint
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamFrame {
    Step { event: Step },
    Token { delta: String },
    Turn { session_id: String, turn: ChatTurn },
    Error { error: String, code: String },
}

impl StreamFrame {
    fn failure(error: impl Into<String>) -> Self {
        Self::Error {
            error: error.into(),
            code: "CONNECTION".into(),
        }
    }

    /// Turn and error frames end a question
    const fn is_final(&self) -> bool {
        matches!(self, Self::Turn { .. } | Self::Error { .. })
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

/// Absolute URL on the page's own origin
fn endpoint(path: &str) -> String {
    let origin = web_sys::window()
        .and_then(|w| w.location().origin().ok())
        .unwrap_or_else(|| "http://localhost:3000".into());
    format!("{origin}{path}")
}

/// Same URL with the scheme switched to `ws`/`wss`
fn socket_url(http_url: &str) -> String {
    if let Some(rest) = http_url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = http_url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        http_url.to_string()
    }
}

fn chat_body(session_id: Option<&str>, question: &str, api_key: Option<&str>) -> serde_json::Value {
    let mut body = serde_json::json!({ "question": question });
    if let Some(id) = session_id {
        body["session_id"] = serde_json::json!(id);
    }
    if let Some(key) = api_key {
        body["api_key"] = serde_json::json!(key);
    }
    body
}

async fn read<T: for<'de> Deserialize<'de>>(response: reqwest::Response) -> Result<T, String> {
    if response.status().is_success() {
        response.json().await.map_err(|e| e.to_string())
    } else {
        let status = response.status();
        match response.json::<ErrorBody>().await {
            Ok(body) => Err(body.error),
            Err(_) => Err(format!("Request failed ({status})")),
        }
    }
}

/// Server status and model
pub async fn health() -> Result<Health, String> {
    let response = reqwest::get(endpoint("/health"))
        .await
        .map_err(|e| e.to_string())?;
    read(response).await
}

/// Start a session; the transcript holds the greeting
pub async fn create_session() -> Result<SessionReply, String> {
    let response = reqwest::Client::new()
        .post(endpoint("/api/session"))
        .send()
        .await
        .map_err(|e| e.to_string())?;
    read(response).await
}

/// Ask a question in a session
pub async fn ask(
    session_id: Option<&str>,
    question: &str,
    api_key: Option<&str>,
) -> Result<ChatReply, String> {
    let response = reqwest::Client::new()
        .post(endpoint("/api/chat"))
        .json(&chat_body(session_id, question, api_key))
        .send()
        .await
        .map_err(|e| e.to_string())?;
    read(response).await
}

/// One question streamed over `/api/chat/stream`.
///
/// Frames are handed to the callback as they arrive; the socket closes after
/// the turn or error frame. Dropping the stream detaches the callbacks.
pub struct QuestionStream {
    socket: WebSocket,
    _on_open: Closure<dyn FnMut()>,
    _on_message: Closure<dyn FnMut(MessageEvent)>,
    _on_error: Closure<dyn FnMut()>,
    _on_close: Closure<dyn FnMut()>,
}

impl QuestionStream {
    pub fn open(
        session_id: Option<&str>,
        question: &str,
        api_key: Option<&str>,
        on_frame: impl Fn(StreamFrame) + 'static,
    ) -> Result<Self, String> {
        let socket = WebSocket::new(&socket_url(&endpoint("/api/chat/stream")))
            .map_err(|e| format!("WebSocket unavailable: {e:?}"))?;

        let finished = Rc::new(Cell::new(false));
        let deliver: Rc<dyn Fn(StreamFrame)> = {
            let finished = finished.clone();
            let socket = socket.clone();
            Rc::new(move |frame: StreamFrame| {
                if finished.get() {
                    return;
                }
                let last = frame.is_final();
                on_frame(frame);
                if last {
                    finished.set(true);
                    socket.close().ok();
                }
            })
        };

        let body = chat_body(session_id, question, api_key).to_string();
        let on_open = {
            let socket = socket.clone();
            let deliver = deliver.clone();
            Closure::<dyn FnMut()>::new(move || {
                if socket.send_with_str(&body).is_err() {
                    deliver(StreamFrame::failure("Could not send the question"));
                }
            })
        };

        let on_message = {
            let deliver = deliver.clone();
            Closure::<dyn FnMut(MessageEvent)>::new(move |event: MessageEvent| {
                let Some(text) = event.data().as_string() else {
                    return;
                };
                match serde_json::from_str::<StreamFrame>(&text) {
                    Ok(frame) => deliver(frame),
                    Err(e) => deliver(StreamFrame::failure(format!("Unreadable reply: {e}"))),
                }
            })
        };

        let on_error = {
            let deliver = deliver.clone();
            Closure::<dyn FnMut()>::new(move || {
                deliver(StreamFrame::failure("Connection to the server failed"));
            })
        };

        let on_close = Closure::<dyn FnMut()>::new(move || {
            deliver(StreamFrame::failure("Connection closed before an answer arrived"));
        });

        socket.set_onopen(Some(on_open.as_ref().unchecked_ref()));
        socket.set_onmessage(Some(on_message.as_ref().unchecked_ref()));
        socket.set_onerror(Some(on_error.as_ref().unchecked_ref()));
        socket.set_onclose(Some(on_close.as_ref().unchecked_ref()));

        Ok(Self {
            socket,
            _on_open: on_open,
            _on_message: on_message,
            _on_error: on_error,
            _on_close: on_close,
        })
    }
}

impl Drop for QuestionStream {
    fn drop(&mut self) {
        self.socket.set_onopen(None);
        self.socket.set_onmessage(None);
        self.socket.set_onerror(None);
        self.socket.set_onclose(None);
        self.socket.close().ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_reply_from_server_json() {
        let json = r#"{
            "session_id": "abc",
            "turns": [
                {"role": "assistant", "text": "Hello! I am your mathematical assistant.", "timestamp": "2024-01-01T00:00:00Z"},
                {"role": "user", "text": "What is 10 percent of 100?", "timestamp": "2024-01-01T00:00:01Z"},
                {"role": "assistant", "text": "10", "timestamp": "2024-01-01T00:00:02Z"}
            ],
            "steps": [
                {"type": "tool_start", "tool": "calculator", "input": {"expression": "0.1 * 100"}},
                {"type": "tool_end", "tool": "calculator", "success": true, "output": "Answer: 10"},
                {"type": "answer", "text": "10"}
            ]
        }"#;

        let reply: ChatReply = serde_json::from_str(json).unwrap();
        assert_eq!(reply.turns.len(), 3);
        assert_eq!(reply.steps.len(), 3);

        let described: Vec<_> = reply.steps.iter().filter_map(Step::describe).collect();
        assert_eq!(described.len(), 2);
        assert_eq!(described[1], ("✅ calculator result".to_string(), "Answer: 10".to_string()));
    }

    #[test]
    fn test_stream_frames_from_server_json() {
        let frames = [
            r#"{"type": "token", "delta": "Final "}"#,
            r#"{"type": "step", "event": {"type": "tool_end", "tool": "calculator", "success": true, "output": "Answer: 4"}}"#,
            r#"{"type": "turn", "session_id": "abc", "turn": {"role": "assistant", "text": "4", "timestamp": "2024-01-01T00:00:00Z"}}"#,
            r#"{"type": "error", "error": "Please enter a question", "code": "EMPTY_QUESTION"}"#,
        ];
        let parsed: Vec<StreamFrame> = frames
            .iter()
            .map(|f| serde_json::from_str(f).unwrap())
            .collect();

        assert_eq!(parsed[0], StreamFrame::Token { delta: "Final ".into() });
        assert!(matches!(&parsed[1], StreamFrame::Step { event: Step::ToolEnd { output, .. } } if output == "Answer: 4"));
        assert!(matches!(&parsed[2], StreamFrame::Turn { turn, .. } if turn.text == "4"));
        assert!(matches!(&parsed[3], StreamFrame::Error { code, .. } if code == "EMPTY_QUESTION"));

        assert!(!parsed[0].is_final());
        assert!(!parsed[1].is_final());
        assert!(parsed[2].is_final());
        assert!(parsed[3].is_final());
    }

    #[test]
    fn test_socket_url() {
        assert_eq!(socket_url("http://localhost:3000/api/chat/stream"), "ws://localhost:3000/api/chat/stream");
        assert_eq!(socket_url("https://solver.example/api/chat/stream"), "wss://solver.example/api/chat/stream");
    }

    #[test]
    fn test_chat_body_skips_missing_fields() {
        let body = chat_body(None, "2 + 2?", None);
        assert_eq!(body, serde_json::json!({"question": "2 + 2?"}));

        let body = chat_body(Some("abc"), "2 + 2?", Some("gsk_user"));
        assert_eq!(body["session_id"], "abc");
        assert_eq!(body["api_key"], "gsk_user");
    }
}
