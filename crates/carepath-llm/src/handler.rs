//! Axum route handlers for the OpenAI-compatible gateway endpoints

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router, routing};
use futures_util::{Stream, StreamExt};
use http::StatusCode;

use crate::backend::{EventStream, TextStream};
use crate::convert;
use crate::error::BackendError;
use crate::protocol::openai::{
    OpenAiModel, OpenAiModelList, OpenAiRequest, OpenAiResponse, OpenAiTextChoice, OpenAiTextRequest,
    OpenAiTextResponse,
};
use crate::state::GatewayState;
use crate::types::{CompletionRequest, GenerateOptions, StreamEvent, response::now_secs};

/// Build the gateway router with all endpoints
pub fn gateway_router(state: GatewayState) -> Router {
    Router::new()
        .route("/v1/chat/completions", routing::post(chat_completions))
        .route("/v1/completions", routing::post(text_completions))
        .route("/v1/models", routing::get(list_models))
        .route("/v1/backends/health", routing::get(backend_health))
        .with_state(state)
}

// -- Chat completions --

/// Handle `POST /v1/chat/completions`
async fn chat_completions(State(state): State<GatewayState>, Json(wire_request): Json<OpenAiRequest>) -> Response {
    let is_stream = wire_request.stream.unwrap_or(false);
    let request: CompletionRequest = wire_request.into();

    if request.messages.is_empty() {
        return error_response(&BackendError::InvalidRequest("messages must not be empty".to_owned()));
    }

    if is_stream {
        match state.complete_stream(request).await {
            Ok((model, stream)) => chat_stream_response(stream, model).into_response(),
            Err(e) => error_response(&e),
        }
    } else {
        match state.complete(request).await {
            Ok(response) => Json(OpenAiResponse::from(response)).into_response(),
            Err(e) => error_response(&e),
        }
    }
}

/// Build a streaming SSE response in `OpenAI` chat chunk format
fn chat_stream_response(stream: EventStream, model: String) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let now = now_secs();
    let response_id = format!("chatcmpl-{now}");

    let events = stream.map(move |result| match result {
        Ok(StreamEvent::Delta(delta)) => {
            let chunk = convert::openai::delta_to_openai_chunk(&delta, &response_id, &model, now);
            Ok(Event::default().data(serde_json::to_string(&chunk).unwrap_or_default()))
        }
        Ok(StreamEvent::Usage(usage)) => {
            let chunk = convert::openai::usage_to_openai_chunk(usage, &response_id, &model, now);
            Ok(Event::default().data(serde_json::to_string(&chunk).unwrap_or_default()))
        }
        Ok(StreamEvent::Done) => Ok(Event::default().data("[DONE]")),
        Err(e) => Ok(streaming_error_event(&e)),
    });

    Sse::new(events).keep_alive(KeepAlive::default())
}

// -- Text completions --

/// Handle `POST /v1/completions`
async fn text_completions(State(state): State<GatewayState>, Json(wire_request): Json<OpenAiTextRequest>) -> Response {
    let defaults = GenerateOptions::default();
    let options = GenerateOptions {
        model: None,
        temperature: wire_request.temperature.unwrap_or(defaults.temperature),
        max_tokens: wire_request.max_tokens.unwrap_or(defaults.max_tokens),
    };

    if wire_request.stream.unwrap_or(false) {
        match state.generate_stream(&wire_request.model, &wire_request.prompt, options).await {
            Ok((model, stream)) => text_stream_response(stream, model).into_response(),
            Err(e) => error_response(&e),
        }
    } else {
        match state.generate(&wire_request.model, &wire_request.prompt, options).await {
            Ok((model, text)) => {
                let id = format!("cmpl-{}", now_secs());
                Json(text_completion(id, model, text, Some("stop"))).into_response()
            }
            Err(e) => error_response(&e),
        }
    }
}

fn text_stream_response(stream: TextStream, model: String) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let response_id = format!("cmpl-{}", now_secs());

    let fragments = stream.map(move |result| match result {
        Ok(text) => {
            let chunk = text_completion(response_id.clone(), model.clone(), text, None);
            Ok(Event::default().data(serde_json::to_string(&chunk).unwrap_or_default()))
        }
        Err(e) => Ok(streaming_error_event(&e)),
    });

    let done = futures_util::stream::once(async { Ok::<_, axum::Error>(Event::default().data("[DONE]")) });

    Sse::new(fragments.chain(done)).keep_alive(KeepAlive::default())
}

fn text_completion(id: String, model: String, text: String, finish_reason: Option<&str>) -> OpenAiTextResponse {
    OpenAiTextResponse {
        id,
        object: "text_completion".to_owned(),
        created: now_secs(),
        model,
        choices: vec![OpenAiTextChoice {
            index: 0,
            text,
            finish_reason: finish_reason.map(ToOwned::to_owned),
        }],
    }
}

// -- Discovery --

/// Handle `GET /v1/models`
async fn list_models(State(state): State<GatewayState>) -> Json<OpenAiModelList> {
    let now = now_secs();

    let data = state
        .inner
        .router
        .list_models()
        .into_iter()
        .map(|(name, backend)| OpenAiModel {
            id: name,
            object: "model".to_owned(),
            created: now,
            owned_by: backend.as_str().to_owned(),
        })
        .collect();

    Json(OpenAiModelList {
        object: "list".to_owned(),
        data,
    })
}

/// Handle `GET /v1/backends/health`
async fn backend_health(State(state): State<GatewayState>) -> Response {
    let health = state.backends().health().await;
    let healthy = health.values().all(|ok| *ok);

    let backends: serde_json::Map<String, serde_json::Value> = health
        .into_iter()
        .map(|(kind, ok)| (kind.as_str().to_owned(), serde_json::Value::Bool(ok)))
        .collect();

    let status = if healthy { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    let body = serde_json::json!({
        "status": if healthy { "ok" } else { "degraded" },
        "backends": backends,
    });

    (status, Json(body)).into_response()
}

// -- Errors --

fn streaming_error_event(error: &BackendError) -> Event {
    let data = serde_json::json!({
        "error": {
            "message": error.to_string(),
            "type": "streaming_error"
        }
    });

    Event::default().data(data.to_string())
}

/// Convert a backend error to an `OpenAI`-style JSON error response
fn error_response(error: &BackendError) -> Response {
    use carepath_core::HttpError;

    (error.status_code(), Json(carepath_core::error_body(error))).into_response()
}
