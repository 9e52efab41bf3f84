//! HTTP transport
//!
//! `POST /invoke` accepts the invocation envelope and answers with the
//! response envelope; the HTTP status mirrors `statusCode`.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, DefaultBodyLimit, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use tracing::{error, info};

use crate::core::response::InvocationResponse;
use crate::jobs::invocation::Invoker;

pub fn router(invoker: Invoker) -> Router {
    let body_limit = invoker.config().max_body_bytes;
    Router::new()
        .route("/invoke", post(invoke_handler))
        .route("/health", get(health_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(invoker)
}

pub async fn serve(addr: SocketAddr, invoker: Invoker) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("Listening on {}", addr);

    axum::serve(listener, router(invoker))
        .await
        .context("HTTP server failed")
}

async fn invoke_handler(
    State(invoker): State<Invoker>,
    body: Result<Bytes, BytesRejection>,
) -> impl IntoResponse {
    let response = match body {
        Ok(body) => run_invocation(&invoker, body).await,
        // Oversized or unreadable bodies still get the envelope
        Err(rejection) => invoker.rejection_response(rejection.body_text()),
    };

    let status =
        StatusCode::from_u16(response.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(response))
}

async fn run_invocation(invoker: &Invoker, body: Bytes) -> InvocationResponse {
    // Run on its own task so a panic becomes a 500 instead of a dropped connection
    let task_invoker = invoker.clone();
    match tokio::spawn(async move { task_invoker.handle_bytes(&body).await }).await {
        Ok(response) => response,
        Err(e) => {
            error!("Invocation task failed: {}", e);
            invoker.fault_response(e.to_string())
        }
    }
}

async fn health_handler() -> &'static str {
    "ok"
}
