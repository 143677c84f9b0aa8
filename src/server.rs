//! HTTP server for the web conversation view
//!
//! Exposes the orchestrator via REST/SSE endpoints:
//! - GET /api/status - Health check
//! - GET /api/messages - Conversation history
//! - POST /api/chat/stream - SSE streaming send
//! - POST /api/chat/reset - Clear the conversation
//! - POST /api/attachments - Multipart upload feeding the next send

use anyhow::Result;
use axum::{
    Router,
    extract::{DefaultBodyLimit, Multipart, State},
    http::{Method, header},
    response::{
        Json,
        sse::{Event, KeepAlive, Sse},
    },
    routing::{get, post},
};
use futures::stream::Stream;
use serde::Deserialize;
use serde_json::{Value, json};
use std::{convert::Infallible, sync::Arc};
use tokio::sync::{Mutex, mpsc};
use tower_http::cors::{Any, CorsLayer};

use crate::attachment::{self, Attachment};
use crate::message::Message;
use crate::orchestrator::{ChatEvent, Orchestrator};

/// Maximum upload size, shared by all files in one batch
const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

/// Server state
///
/// One conversation per process. The mutex serializes sends so exactly one
/// is in flight at a time; the frontend disables submission meanwhile.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Mutex<Orchestrator>>,
}

impl AppState {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self {
            orchestrator: Arc::new(Mutex::new(orchestrator)),
        }
    }
}

/// Chat request from the frontend
#[derive(Debug, Deserialize)]
pub struct ChatStreamRequest {
    pub message: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

/// Create the router with all endpoints
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/api/status", get(status_handler))
        .route("/api/messages", get(messages_handler))
        .route("/api/chat/stream", post(chat_stream_handler))
        .route("/api/chat/reset", post(reset_handler))
        .route("/api/attachments", post(attachments_handler))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(cors)
        .with_state(state)
}

/// Run the HTTP server
pub async fn run(port: u16, state: AppState) -> Result<()> {
    let app = create_router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    println!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============================================================================
// Handlers
// ============================================================================

async fn status_handler() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "model": "gemini-3-pro-preview",
    }))
}

async fn messages_handler(State(state): State<AppState>) -> Json<Vec<Message>> {
    let orchestrator = state.orchestrator.lock().await;
    Json(orchestrator.messages().to_vec())
}

async fn reset_handler(State(state): State<AppState>) -> Json<Message> {
    let mut orchestrator = state.orchestrator.lock().await;
    Json(orchestrator.handle_reset())
}

/// Accept a multipart batch of files for the next send
///
/// A part that fails to read is logged and dropped; the rest of the batch
/// still attaches.
async fn attachments_handler(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Json<Value> {
    let mut encoded = Vec::new();
    let mut dropped = 0usize;

    loop {
        match multipart.next_field().await {
            Ok(Some(field)) => {
                let mime_type = field
                    .content_type()
                    .map(|m| m.to_string())
                    .or_else(|| {
                        field
                            .file_name()
                            .map(|name| mime_guess::from_path(name).first_or_octet_stream().to_string())
                    })
                    .unwrap_or_else(|| "application/octet-stream".to_string());

                match field.bytes().await {
                    Ok(bytes) => encoded.push(attachment::encode_bytes(mime_type, &bytes)),
                    Err(e) => {
                        tracing::warn!("failed to read uploaded file: {}", e);
                        dropped += 1;
                    }
                }
            }
            Ok(None) => break,
            Err(e) => {
                tracing::warn!("failed to read multipart field: {}", e);
                dropped += 1;
                break;
            }
        }
    }

    let attached: Vec<Value> = encoded
        .iter()
        .map(|a| json!({ "mimeType": a.mime_type }))
        .collect();

    let mut orchestrator = state.orchestrator.lock().await;
    orchestrator.add_attachments(encoded);

    Json(json!({
        "attached": attached,
        "dropped": dropped,
        "pending": orchestrator.pending_attachments().len(),
    }))
}

async fn chat_stream_handler(
    State(state): State<AppState>,
    Json(request): Json<ChatStreamRequest>,
) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
    let (tx, rx) = mpsc::unbounded_channel::<ChatEvent>();

    // The orchestrator lock holds until the turn completes; a second send
    // queues behind it
    tokio::spawn(async move {
        let mut orchestrator = state.orchestrator.lock().await;
        orchestrator
            .handle_send(&request.message, request.attachments, &tx)
            .await;
        let _ = tx.send(ChatEvent::Done);
    });

    // Convert channel to SSE stream
    let stream = async_stream::stream! {
        let mut rx = rx;
        while let Some(event) = rx.recv().await {
            let data = serde_json::to_string(&event).unwrap_or_default();
            yield Ok(Event::default().data(data));
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}
