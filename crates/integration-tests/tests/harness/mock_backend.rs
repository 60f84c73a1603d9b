//! Mock inference server for integration tests
//!
//! Speaks both the OpenAI chat API (under `/v1`) and the Ollama API (under
//! `/api`). Replies are chosen by looking at the prompt, so one mock can
//! serve every consultation stage.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router, routing};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

pub const SYMPTOMS: &str = r#"{"symptoms": ["severe headache", "nausea"], "pregnancy_related": true}"#;

pub const DIAGNOSIS: &str = r#"{"codes": [
    {"code": "O14.0", "description": "Mild preeclampsia", "importance": 1},
    {"code": "O21.9", "description": "Vomiting of pregnancy, unspecified", "importance": 2}
], "questions": []}"#;

pub const DIAGNOSIS_WITH_QUESTION: &str = r#"{"codes": [
    {"code": "O14.0", "description": "Mild preeclampsia", "importance": 1}
], "questions": ["Have you had any vision changes?"]}"#;

pub const PROCEDURES: &str = r#"{"codes": [
    {"code": "99214", "description": "Office visit", "importance": 1},
    {"code": "80053", "description": "Metabolic panel", "importance": 2}
], "explanation": "Evaluate blood pressure and run labs.", "questions": []}"#;

pub const EXPLANATION: &str = "They manage high risk pregnancies and monitor blood pressure closely.";

pub const CHAT_REPLY: &str = "Hello from the mock";

/// Mock backend with scripted, prompt-routed replies
pub struct MockBackend {
    addr: SocketAddr,
    shutdown: CancellationToken,
    state: Arc<MockState>,
}

#[derive(Default)]
struct MockState {
    diagnostic: Mutex<VecDeque<&'static str>>,
    failing: AtomicBool,
    requests: AtomicU32,
    warmups: AtomicU32,
}

impl MockState {
    fn reply(&self, prompt: &str) -> String {
        if prompt.contains("ICD-10") {
            let scripted = self.diagnostic.lock().expect("lock").pop_front();
            scripted.unwrap_or(DIAGNOSIS).to_owned()
        } else if prompt.contains("CPT") {
            PROCEDURES.to_owned()
        } else if prompt.contains("distinct symptoms") {
            SYMPTOMS.to_owned()
        } else if prompt.contains("explain why") {
            EXPLANATION.to_owned()
        } else {
            CHAT_REPLY.to_owned()
        }
    }

    /// Count the request and decide whether to fail it
    fn admit(&self, prompt: &str) -> Result<(), Response> {
        self.requests.fetch_add(1, Ordering::Relaxed);
        if prompt == "ping" {
            self.warmups.fetch_add(1, Ordering::Relaxed);
        }

        if self.failing.load(Ordering::Relaxed) {
            let body = json!({"error": {"message": "mock outage", "type": "server_error"}});
            return Err((StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response());
        }
        Ok(())
    }
}

impl MockBackend {
    pub async fn start() -> anyhow::Result<Self> {
        let state = Arc::new(MockState::default());

        let app = Router::new()
            .route("/v1/chat/completions", routing::post(openai_chat))
            .route("/v1/models", routing::get(openai_models))
            .route("/api/generate", routing::post(ollama_generate))
            .route("/api/chat", routing::post(ollama_chat))
            .route("/api/tags", routing::get(ollama_tags))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let shutdown = CancellationToken::new();
        let shutdown_clone = shutdown.clone();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    shutdown_clone.cancelled().await;
                })
                .await
                .ok();
        });

        Ok(Self { addr, shutdown, state })
    }

    /// Base URL for an OpenAI backend, including `/v1`
    pub fn openai_url(&self) -> String {
        format!("http://{}/v1", self.addr)
    }

    /// Base URL for an Ollama backend
    pub fn ollama_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Diagnostic replies used in order before falling back to the default
    pub fn script_diagnostic(&self, replies: &[&'static str]) {
        self.state.diagnostic.lock().expect("lock").extend(replies.iter().copied());
    }

    /// Make every generation request fail with 500
    pub fn set_failing(&self, failing: bool) {
        self.state.failing.store(failing, Ordering::Relaxed);
    }

    pub fn request_count(&self) -> u32 {
        self.state.requests.load(Ordering::Relaxed)
    }

    pub fn warmup_count(&self) -> u32 {
        self.state.warmups.load(Ordering::Relaxed)
    }
}

impl Drop for MockBackend {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    #[serde(default)]
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(default)]
    stream: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

impl ChatRequest {
    fn prompt(&self) -> &str {
        self.messages
            .last()
            .and_then(|m| m.content.as_deref())
            .unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
struct GenerateRequest {
    model: String,
    prompt: String,
    #[serde(default)]
    stream: bool,
}

// -- OpenAI --

async fn openai_chat(State(state): State<Arc<MockState>>, Json(request): Json<ChatRequest>) -> Response {
    if let Err(response) = state.admit(request.prompt()) {
        return response;
    }
    let reply = state.reply(request.prompt());

    if request.stream.unwrap_or(false) {
        let mut body = String::new();
        for (i, word) in reply.split_inclusive(' ').enumerate() {
            let delta = if i == 0 {
                json!({"role": "assistant", "content": word})
            } else {
                json!({"content": word})
            };
            body.push_str(&format!("data: {}\n\n", openai_chunk(&request.model, &delta, None)));
        }
        body.push_str(&format!("data: {}\n\n", openai_chunk(&request.model, &json!({}), Some("stop"))));
        body.push_str("data: [DONE]\n\n");

        return ([(axum::http::header::CONTENT_TYPE, "text/event-stream")], body).into_response();
    }

    Json(json!({
        "id": "chatcmpl-mock",
        "object": "chat.completion",
        "created": 1_700_000_000,
        "model": request.model,
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": reply},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
    }))
    .into_response()
}

fn openai_chunk(model: &str, delta: &Value, finish_reason: Option<&str>) -> Value {
    json!({
        "id": "chatcmpl-mock-stream",
        "object": "chat.completion.chunk",
        "created": 1_700_000_000,
        "model": model,
        "choices": [{"index": 0, "delta": delta, "finish_reason": finish_reason}]
    })
}

async fn openai_models() -> Json<Value> {
    Json(json!({
        "object": "list",
        "data": [{"id": "mock-gpt", "object": "model", "created": 1_700_000_000, "owned_by": "mock"}]
    }))
}

// -- Ollama --

async fn ollama_generate(State(state): State<Arc<MockState>>, Json(request): Json<GenerateRequest>) -> Response {
    if let Err(response) = state.admit(&request.prompt) {
        return response;
    }
    let reply = state.reply(&request.prompt);

    if request.stream {
        let mut body = String::new();
        for word in reply.split_inclusive(' ') {
            body.push_str(&json!({"model": request.model, "response": word, "done": false}).to_string());
            body.push('\n');
        }
        body.push_str(&json!({"model": request.model, "response": "", "done": true}).to_string());
        body.push('\n');

        return ([(axum::http::header::CONTENT_TYPE, "application/x-ndjson")], body).into_response();
    }

    Json(json!({"model": request.model, "response": reply, "done": true})).into_response()
}

async fn ollama_chat(State(state): State<Arc<MockState>>, Json(request): Json<ChatRequest>) -> Response {
    if let Err(response) = state.admit(request.prompt()) {
        return response;
    }
    let reply = state.reply(request.prompt());

    if request.stream.unwrap_or(false) {
        let mut body = String::new();
        for word in reply.split_inclusive(' ') {
            let line = json!({
                "model": request.model,
                "message": {"role": "assistant", "content": word},
                "done": false
            });
            body.push_str(&line.to_string());
            body.push('\n');
        }
        let last = json!({
            "model": request.model,
            "message": {"role": "assistant", "content": ""},
            "done": true,
            "done_reason": "stop",
            "prompt_eval_count": 10,
            "eval_count": 5
        });
        body.push_str(&last.to_string());
        body.push('\n');

        return ([(axum::http::header::CONTENT_TYPE, "application/x-ndjson")], body).into_response();
    }

    Json(json!({
        "model": request.model,
        "message": {"role": "assistant", "content": reply},
        "done": true,
        "done_reason": "stop",
        "prompt_eval_count": 10,
        "eval_count": 5
    }))
    .into_response()
}

async fn ollama_tags() -> Json<Value> {
    Json(json!({"models": [{"name": "mock-med"}]}))
}
