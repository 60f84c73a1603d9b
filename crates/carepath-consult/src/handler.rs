//! Axum route handlers for the consultation endpoints

use std::pin::Pin;

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router, routing};
use carepath_core::HttpError;
use futures_util::{Stream, StreamExt, stream};
use http::StatusCode;
use serde::Deserialize;

use crate::error::ConsultError;
use crate::event::PipelineEvent;
use crate::multiplex;
use crate::orchestrator::Orchestrator;
use crate::session::{Intake, StageName};

const DEFAULT_MORE_PROVIDERS: usize = 5;
const MAX_BATCH: usize = 16;

/// Build the consultation router
pub fn consultation_router(orchestrator: Orchestrator) -> Router {
    Router::new()
        .route("/v1/consultations", routing::post(create))
        .route("/v1/consultations/answer", routing::post(answer))
        .route("/v1/consultations/providers", routing::post(more_providers))
        .route("/v1/consultations/batch", routing::post(batch))
        .route("/v1/consultations/{id}", routing::get(snapshot).delete(remove))
        .route("/v1/consultations/{id}/stream", routing::get(stream_run))
        .with_state(orchestrator)
}

#[derive(Debug, Deserialize)]
struct CreateRequest {
    #[serde(default)]
    session_id: Option<String>,
    #[serde(flatten)]
    intake: Intake,
}

#[derive(Debug, Deserialize)]
struct AnswerRequest {
    session_id: String,
    stage: StageName,
    answer: String,
}

#[derive(Debug, Deserialize)]
struct MoreProvidersRequest {
    session_id: String,
    #[serde(default)]
    count: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct BatchRequest {
    consultations: Vec<CreateRequest>,
}

// -- Sessions --

/// Handle `POST /v1/consultations`
async fn create(State(orchestrator): State<Orchestrator>, Json(request): Json<CreateRequest>) -> Response {
    match orchestrator.start(request.session_id, request.intake) {
        Ok(session) => Json(serde_json::json!({
            "session_id": session.id,
            "status": session.status,
        }))
        .into_response(),
        Err(e) => error_response(&e),
    }
}

/// Handle `GET /v1/consultations/{id}`
async fn snapshot(State(orchestrator): State<Orchestrator>, Path(id): Path<String>) -> Response {
    match orchestrator.store().get(&id) {
        Ok(session) => Json(session).into_response(),
        Err(e) => error_response(&e),
    }
}

/// Handle `DELETE /v1/consultations/{id}`
async fn remove(State(orchestrator): State<Orchestrator>, Path(id): Path<String>) -> Response {
    if orchestrator.store().delete(&id) {
        StatusCode::NO_CONTENT.into_response()
    } else {
        error_response(&ConsultError::SessionNotFound(id))
    }
}

// -- Pipeline runs --

/// Handle `GET /v1/consultations/{id}/stream`
async fn stream_run(State(orchestrator): State<Orchestrator>, Path(id): Path<String>) -> Response {
    match orchestrator.run(&id) {
        Ok(events) => sse(events).into_response(),
        Err(e) => error_response(&e),
    }
}

/// Handle `POST /v1/consultations/answer`
async fn answer(State(orchestrator): State<Orchestrator>, Json(request): Json<AnswerRequest>) -> Response {
    match orchestrator.resume(&request.session_id, request.stage, &request.answer) {
        Ok(events) => sse(events).into_response(),
        Err(e) => error_response(&e),
    }
}

/// Handle `POST /v1/consultations/providers`
async fn more_providers(
    State(orchestrator): State<Orchestrator>,
    Json(request): Json<MoreProvidersRequest>,
) -> Response {
    let count = request.count.unwrap_or(DEFAULT_MORE_PROVIDERS);

    match orchestrator.more_providers(&request.session_id, count).await {
        Ok(providers) => Json(serde_json::json!({
            "session_id": request.session_id,
            "providers": providers,
        }))
        .into_response(),
        Err(e) => error_response(&e),
    }
}

type BatchSource = Pin<Box<dyn Stream<Item = Result<PipelineEvent, (String, ConsultError)>> + Send>>;

/// Handle `POST /v1/consultations/batch`
///
/// Starts and runs every intake, merging their events into one stream.
/// An intake that cannot start contributes a single error event.
async fn batch(State(orchestrator): State<Orchestrator>, Json(request): Json<BatchRequest>) -> Response {
    if request.consultations.is_empty() || request.consultations.len() > MAX_BATCH {
        return error_response(&ConsultError::Validation(format!(
            "batch must contain between 1 and {MAX_BATCH} consultations"
        )));
    }

    let sources: Vec<BatchSource> = request
        .consultations
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            let label = item.session_id.clone().unwrap_or_else(|| format!("batch-{index}"));
            let started = orchestrator
                .start(item.session_id, item.intake)
                .and_then(|session| orchestrator.run(&session.id));

            match started {
                Ok(events) => Box::pin(events.map(Ok::<_, (String, ConsultError)>)) as BatchSource,
                Err(e) => Box::pin(stream::once(async move { Err::<PipelineEvent, _>((label, e)) })),
            }
        })
        .collect();

    tracing::info!(count = sources.len(), "batch consultation started");
    let merged = multiplex::fan_in(sources, MAX_BATCH * 4).map(|item| match item {
        Ok(event) => event,
        Err((label, e)) => PipelineEvent::error(&label, None, e.client_message()),
    });

    sse(merged).into_response()
}

/// SSE body with one `data:` message per event and a final `[DONE]`
fn sse(events: impl Stream<Item = PipelineEvent> + Send + 'static) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let messages = events.map(|event| Ok(Event::default().data(event.to_json())));
    let done = stream::once(async { Ok::<_, axum::Error>(Event::default().data("[DONE]")) });

    Sse::new(messages.chain(done)).keep_alive(KeepAlive::default())
}

// -- Errors --

fn error_response(error: &ConsultError) -> Response {
    if error.status_code().is_server_error() {
        tracing::error!(error = %error, "consultation request failed");
    }

    (error.status_code(), Json(carepath_core::error_body(error))).into_response()
}
