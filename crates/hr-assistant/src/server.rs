//! HTTP API for the HR assistant.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/ask` | Answer a question; streamed `text/plain` body |
//! | `POST` | `/api/update_index` | Rebuild both indices from the policy folder |
//! | `GET`  | `/api/search?q=...` | Debug view of the retrieved context bundle |
//! | `GET`  | `/health` | Status, version and current index generation |
//!
//! # Error Contract
//!
//! Failures before any answer text is sent use a JSON body:
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "question must not be empty" } }
//! ```
//!
//! Codes: `bad_request` (400, or 415/422 when the body is not JSON of the
//! expected shape), `index_unavailable` (503), `rebuild_failed` (422 for an
//! empty folder or corpus, else 500), `generation_failed` (502). An error
//! after streaming has started is appended to the text as `Error: ...`,
//! since the status line is already sent.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted for browser front ends.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{rejection::JsonRejection, Query, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

use hr_retrieval_core::error::{RebuildError, RetrieveError};
use hr_retrieval_core::index::RebuildReport;

use crate::assistant::{AnswerKind, Assistant, SearchReport};

/// Response header naming how the answer was produced.
pub const ANSWER_KIND_HEADER: &str = "x-answer-kind";

/// Serve on `bind` until the process is terminated.
pub async fn run_server(bind: &str, assistant: Arc<Assistant>) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(addr = %listener.local_addr()?, "HR assistant listening");
    axum::serve(listener, router(assistant)).await?;
    Ok(())
}

pub fn router(assistant: Arc<Assistant>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/ask", post(handle_ask))
        .route("/api/update_index", post(handle_update_index))
        .route("/api/search", get(handle_search))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(assistant)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError {
            status: rejection.status(),
            code: "bad_request",
            message: rejection.body_text(),
        }
    }
}

/// Map an answer/search failure to a status: retrieval problems are 503,
/// anything else came from the generation service.
fn classify(err: anyhow::Error) -> AppError {
    let message = format!("{:#}", err);
    if err.downcast_ref::<RetrieveError>().is_some() {
        AppError {
            status: StatusCode::SERVICE_UNAVAILABLE,
            code: "index_unavailable",
            message,
        }
    } else {
        AppError {
            status: StatusCode::BAD_GATEWAY,
            code: "generation_failed",
            message,
        }
    }
}

// ============ POST /api/ask ============

#[derive(Deserialize)]
struct AskRequest {
    #[serde(default)]
    question: String,
    #[serde(default)]
    online_mode: bool,
}

fn kind_header(kind: AnswerKind) -> HeaderValue {
    let name = match kind {
        AnswerKind::Greeting => "greeting",
        AnswerKind::Identity => "identity",
        AnswerKind::Holiday => "holiday",
        AnswerKind::NoContext => "no_context",
        AnswerKind::Grounded => "grounded",
        AnswerKind::Open => "open",
    };
    HeaderValue::from_static(name)
}

async fn handle_ask(
    State(assistant): State<Arc<Assistant>>,
    body: Result<Json<AskRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(req) = body?;
    if req.question.trim().is_empty() {
        return Err(bad_request("No question provided"));
    }

    let answer = assistant
        .ask_streaming(&req.question, req.online_mode)
        .await
        .map_err(|e| {
            error!(error = %format!("{:#}", e), "ask failed");
            classify(e)
        })?;

    let text = answer.text.map(|item| {
        Ok::<_, Infallible>(match item {
            Ok(delta) => delta,
            Err(e) => {
                warn!(error = %format!("{:#}", e), "answer stream failed");
                format!("\n\nError: {:#}", e)
            }
        })
    });

    let mut response = Response::new(Body::from_stream(text));
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    headers.insert(ANSWER_KIND_HEADER, kind_header(answer.kind));
    Ok(response)
}

// ============ POST /api/update_index ============

#[derive(Serialize)]
struct UpdateIndexResponse {
    message: String,
    report: RebuildReport,
}

async fn handle_update_index(
    State(assistant): State<Arc<Assistant>>,
) -> Result<Json<UpdateIndexResponse>, AppError> {
    match assistant.rebuild().await {
        Ok(report) => Ok(Json(UpdateIndexResponse {
            message: "Indexes updated successfully".to_string(),
            report,
        })),
        Err(e) => {
            error!(error = %format!("{:#}", e), "index update failed");
            let status = match e.downcast_ref::<RebuildError>() {
                Some(RebuildError::NoDocuments) | Some(RebuildError::EmptyCorpus { .. }) => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            Err(AppError {
                status,
                code: "rebuild_failed",
                message: format!("{:#}", e),
            })
        }
    }
}

// ============ GET /api/search ============

#[derive(Deserialize)]
struct SearchParams {
    #[serde(default)]
    q: String,
}

async fn handle_search(
    State(assistant): State<Arc<Assistant>>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchReport>, AppError> {
    if params.q.trim().is_empty() {
        return Err(bad_request("query must not be empty"));
    }
    assistant.search(&params.q).await.map(Json).map_err(classify)
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    generation: u64,
    chunks: usize,
    semantic_enabled: bool,
}

async fn handle_health(State(assistant): State<Arc<Assistant>>) -> Json<HealthResponse> {
    let snapshot = assistant.index().current();
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        generation: snapshot.generation(),
        chunks: snapshot.chunks().len(),
        semantic_enabled: assistant.semantic_enabled(),
    })
}
