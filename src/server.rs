//! HTTP chat API.
//!
//! Routes:
//! - `POST /api/chat` with `{"message": "..."}`, answering
//!   `{"reponse": "...", "sources": [{"fichier", "titre",
//!   "date_modification"}]}`.
//! - `GET /api/health` answering `{"status": "healthy"}`.
//!
//! CORS is fully permissive so a browser frontend on any origin can call the
//! API. Errors come back as `{"error": {"code", "message"}}`.

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::embedding::ApiEmbedder;
use crate::rag::{self, ChatAnswer, ChatEngine};
use crate::store;

#[derive(Clone)]
struct AppState {
    engine: Arc<Mutex<ChatEngine>>,
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    message: String,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl AppError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "bad_request",
            message: message.into(),
        }
    }

    fn internal(err: anyhow::Error) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "internal",
            message: format!("{:#}", err),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": { "code": self.code, "message": self.message }
        });
        (self.status, Json(body)).into_response()
    }
}

pub async fn run_server(config: &Config) -> Result<()> {
    let store = store::open_store(&config.store).await?;
    let llm = rag::create_llm(config)?;
    let embedder = Box::new(ApiEmbedder::new(&config.embedding));
    let engine = ChatEngine::new(config.clone(), embedder, store, llm);

    let state = AppState {
        engine: Arc::new(Mutex::new(engine)),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/api/chat", post(chat))
        .route("/api/health", get(health))
        .layer(cors)
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind))?;
    println!("listening on http://{}", config.server.bind);

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}

async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatAnswer>, AppError> {
    let message = request.message.trim();
    if message.is_empty() {
        return Err(AppError::bad_request("message must not be empty"));
    }

    let mut engine = state.engine.lock().await;
    let answer = engine.ask(message).await.map_err(AppError::internal)?;
    Ok(Json(answer))
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "healthy" }))
}
