//! End-to-end orchestrator tests against a scripted provider

mod common;

use serde_json::{Value, json};
use tokio::sync::mpsc;

use common::{FakeProvider, Script};
use obrolan::attachment::Attachment;
use obrolan::gateway::ChatGateway;
use obrolan::message::{RESET_GREETING, Role};
use obrolan::orchestrator::{
    ChatEvent, IMAGE_FAILED_TEXT, Orchestrator, SEND_FAILED_TEXT,
};
use obrolan::provider::{GeneratedImage, StreamEvent};

fn orchestrator_with(script: Script) -> (Orchestrator, std::sync::Arc<std::sync::Mutex<common::Seen>>) {
    orchestrator_with_url(script, "http://127.0.0.1:9/api/neon")
}

fn orchestrator_with_url(
    script: Script,
    house_sales_url: &str,
) -> (Orchestrator, std::sync::Arc<std::sync::Mutex<common::Seen>>) {
    let (provider, seen) = FakeProvider::new(script);
    let gateway = ChatGateway::with_provider(Box::new(provider), house_sales_url.to_string());
    (Orchestrator::new(gateway), seen)
}

fn events_channel() -> (
    mpsc::UnboundedSender<ChatEvent>,
    mpsc::UnboundedReceiver<ChatEvent>,
) {
    mpsc::unbounded_channel()
}

fn drain(rx: &mut mpsc::UnboundedReceiver<ChatEvent>) -> Vec<ChatEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn png_attachment() -> Attachment {
    Attachment {
        mime_type: "image/png".into(),
        data: "YWJj".into(),
    }
}

/// Serve a fixed JSON payload on a local port, returning the URL
async fn spawn_sales_stub(payload: Value) -> String {
    use axum::{Json, Router, routing::get};

    let app = Router::new().route(
        "/api/neon",
        get(move || {
            let payload = payload.clone();
            async move { Json(payload) }
        }),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{}/api/neon", addr)
}

// ============================================================================
// Streaming
// ============================================================================

#[tokio::test]
async fn streamed_chunks_arrive_cumulatively_in_order() {
    let (provider, _seen) = FakeProvider::new(Script {
        stream: vec![
            StreamEvent::TextDelta("Halo".into()),
            StreamEvent::TextDelta(" dunia".into()),
            StreamEvent::TextDelta("!".into()),
        ],
        ..Script::default()
    });
    let mut gateway =
        ChatGateway::with_provider(Box::new(provider), "http://127.0.0.1:9/".to_string());

    // Snapshot the text-to-date after every chunk
    let mut snapshots = Vec::new();
    let mut accumulated = String::new();
    gateway
        .send_streaming("halo", &[], |chunk| {
            accumulated.push_str(chunk);
            snapshots.push(accumulated.clone());
        })
        .await
        .unwrap();

    assert_eq!(snapshots, vec!["Halo", "Halo dunia", "Halo dunia!"]);
}

#[tokio::test]
async fn chat_turn_patches_placeholder_with_full_text() {
    let (mut orchestrator, _seen) = orchestrator_with(Script {
        stream: vec![
            StreamEvent::TextDelta("Halo".into()),
            StreamEvent::TextDelta(" dunia".into()),
        ],
        ..Script::default()
    });
    let (tx, mut rx) = events_channel();

    orchestrator.handle_send("halo", Vec::new(), &tx).await;

    let messages = orchestrator.messages();
    assert_eq!(messages.len(), 3); // greeting + user + model
    assert_eq!(messages[1].role, Role::User);
    assert_eq!(messages[2].role, Role::Model);
    assert_eq!(messages[2].text, "Halo dunia");
    assert!(!messages[2].is_error);

    let events = drain(&mut rx);
    let deltas: Vec<&str> = events
        .iter()
        .filter_map(|e| match e {
            ChatEvent::TextDelta { delta } => Some(delta.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(deltas, vec!["Halo", " dunia"]);
}

#[tokio::test]
async fn session_history_grows_and_reset_clears_it() {
    let (mut orchestrator, seen) = orchestrator_with(Script {
        stream: vec![StreamEvent::TextDelta("Hai!".into())],
        ..Script::default()
    });
    let (tx, _rx) = events_channel();

    orchestrator.handle_send("halo", Vec::new(), &tx).await;
    orchestrator.handle_send("apa kabar?", Vec::new(), &tx).await;

    {
        let seen = seen.lock().unwrap();
        assert!(seen.requests[0].history.is_empty());
        // Second send replays the first turn
        assert_eq!(seen.requests[1].history.len(), 2);
        assert_eq!(seen.requests[1].history[0].text, "halo");
        assert_eq!(seen.requests[1].history[1].text, "Hai!");
    }

    orchestrator.handle_reset();
    assert_eq!(orchestrator.messages().len(), 1);
    assert_eq!(orchestrator.messages()[0].text, RESET_GREETING);

    // No memory of pre-reset turns
    orchestrator.handle_send("siapa saya?", Vec::new(), &tx).await;
    let seen = seen.lock().unwrap();
    assert!(seen.requests[2].history.is_empty());
}

// ============================================================================
// Intent classification
// ============================================================================

#[tokio::test]
async fn image_request_routes_to_image_mode() {
    let (mut orchestrator, seen) = orchestrator_with(Script {
        image: Some(GeneratedImage {
            mime_type: "image/png".into(),
            data: "YWJj".into(),
        }),
        ..Script::default()
    });
    let (tx, mut rx) = events_channel();

    orchestrator
        .handle_send("gambar kucing lucu", Vec::new(), &tx)
        .await;

    let messages = orchestrator.messages();
    let reply = &messages[2];
    assert_eq!(reply.text, "Berikut adalah gambar untuk: \"gambar kucing lucu\"");
    assert_eq!(reply.image.as_deref(), Some("data:image/png;base64,YWJj"));

    let seen = seen.lock().unwrap();
    assert!(seen.requests.is_empty());
    assert_eq!(seen.image_prompts, vec!["gambar kucing lucu"]);

    let events = drain(&mut rx);
    assert!(events
        .iter()
        .any(|e| matches!(e, ChatEvent::Image { data_uri } if data_uri.starts_with("data:image/png"))));
}

#[tokio::test]
async fn image_phrase_with_attachment_routes_to_chat_mode() {
    let (mut orchestrator, seen) = orchestrator_with(Script {
        stream: vec![StreamEvent::TextDelta("Itu kucing.".into())],
        ..Script::default()
    });
    let (tx, _rx) = events_channel();

    orchestrator
        .handle_send("gambar kucing lucu", vec![png_attachment()], &tx)
        .await;

    let seen = seen.lock().unwrap();
    assert!(seen.image_prompts.is_empty());
    assert_eq!(seen.requests.len(), 1);
    assert_eq!(seen.requests[0].attachments.len(), 1);
}

#[tokio::test]
async fn missing_image_payload_yields_fixed_notice() {
    let (mut orchestrator, _seen) = orchestrator_with(Script::default());
    let (tx, _rx) = events_channel();

    orchestrator
        .handle_send("buatkan gambar rumah", Vec::new(), &tx)
        .await;

    let reply = &orchestrator.messages()[2];
    assert_eq!(reply.text, IMAGE_FAILED_TEXT);
    assert!(reply.image.is_none());
    assert!(!reply.is_error);
}

// ============================================================================
// Failures
// ============================================================================

#[tokio::test]
async fn failed_send_yields_exactly_one_error_message() {
    let (mut orchestrator, _seen) = orchestrator_with(Script {
        fail_stream: true,
        ..Script::default()
    });
    let (tx, mut rx) = events_channel();

    orchestrator.handle_send("halo", Vec::new(), &tx).await;

    let messages = orchestrator.messages();
    assert_eq!(messages.len(), 3);
    let errors: Vec<_> = messages.iter().filter(|m| m.is_error).collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].text, SEND_FAILED_TEXT);

    let events = drain(&mut rx);
    assert!(events.iter().any(|e| matches!(e, ChatEvent::Error { .. })));
}

#[tokio::test]
async fn failed_image_generation_yields_exactly_one_error_message() {
    let (mut orchestrator, _seen) = orchestrator_with(Script {
        fail_image: true,
        ..Script::default()
    });
    let (tx, _rx) = events_channel();

    orchestrator
        .handle_send("gambar pemandangan", Vec::new(), &tx)
        .await;

    let messages = orchestrator.messages();
    let errors: Vec<_> = messages.iter().filter(|m| m.is_error).collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].text, SEND_FAILED_TEXT);
}

#[tokio::test]
async fn stream_error_after_partial_text_marks_placeholder() {
    let (mut orchestrator, _seen) = orchestrator_with(Script {
        stream: vec![
            StreamEvent::TextDelta("Sebentar".into()),
            StreamEvent::Error("connection reset".into()),
        ],
        ..Script::default()
    });
    let (tx, _rx) = events_channel();

    orchestrator.handle_send("halo", Vec::new(), &tx).await;

    let messages = orchestrator.messages();
    assert_eq!(messages.len(), 3);
    assert!(messages[2].is_error);
    assert_eq!(messages[2].text, SEND_FAILED_TEXT);
}

// ============================================================================
// Function calling
// ============================================================================

#[tokio::test]
async fn function_call_round_trip_reaches_the_endpoint() {
    let payload = json!({ "sales": [{ "address": "Jl. Mawar 1", "price": 750_000_000u64 }] });
    let url = spawn_sales_stub(payload.clone()).await;

    let (mut orchestrator, seen) = orchestrator_with_url(
        Script {
            stream: vec![
                StreamEvent::TextDelta("Sebentar. ".into()),
                StreamEvent::FunctionCall {
                    name: "getHouseSales".into(),
                    args: json!({}),
                },
            ],
            continuation: vec![StreamEvent::TextDelta(
                "Berikut data penjualan terbaru.".into(),
            )],
            ..Script::default()
        },
        &url,
    );
    let (tx, _rx) = events_channel();

    orchestrator
        .handle_send("Tampilkan penjualan rumah terbaru", Vec::new(), &tx)
        .await;

    // Partial text first, tool continuation appended after, one message
    let reply = &orchestrator.messages()[2];
    assert_eq!(reply.text, "Sebentar. Berikut data penjualan terbaru.");
    assert!(!reply.is_error);

    let seen = seen.lock().unwrap();
    assert_eq!(seen.continuations.len(), 1);
    let continuation = &seen.continuations[0];
    assert_eq!(continuation.tool_name, "getHouseSales");
    assert_eq!(continuation.tool_result, payload);
    // The continuation carries the user turn and the partial text
    assert_eq!(
        continuation.history.last().unwrap().text,
        "Sebentar. "
    );
}

#[tokio::test]
async fn tool_endpoint_failure_substitutes_error_payload() {
    let (mut orchestrator, seen) = orchestrator_with(Script {
        stream: vec![StreamEvent::FunctionCall {
            name: "getHouseSales".into(),
            args: json!({}),
        }],
        continuation: vec![StreamEvent::TextDelta(
            "Maaf, data penjualan sedang tidak tersedia.".into(),
        )],
        ..Script::default()
    });
    let (tx, _rx) = events_channel();

    orchestrator
        .handle_send("Tampilkan penjualan rumah terbaru", Vec::new(), &tx)
        .await;

    // The turn still completes; the model got an error payload to explain
    let reply = &orchestrator.messages()[2];
    assert_eq!(reply.text, "Maaf, data penjualan sedang tidak tersedia.");
    assert!(!reply.is_error);

    let seen = seen.lock().unwrap();
    assert_eq!(
        seen.continuations[0].tool_result["error"],
        "Gagal mengambil data penjualan"
    );
}

#[tokio::test]
async fn unknown_function_call_is_ignored() {
    let (mut orchestrator, seen) = orchestrator_with(Script {
        stream: vec![
            StreamEvent::FunctionCall {
                name: "sendEmail".into(),
                args: json!({}),
            },
            StreamEvent::TextDelta("Maaf, saya tidak bisa melakukan itu.".into()),
        ],
        ..Script::default()
    });
    let (tx, _rx) = events_channel();

    orchestrator.handle_send("kirim email", Vec::new(), &tx).await;

    assert_eq!(
        orchestrator.messages()[2].text,
        "Maaf, saya tidak bisa melakukan itu."
    );
    assert!(seen.lock().unwrap().continuations.is_empty());
}

// ============================================================================
// Attachments and reset
// ============================================================================

#[tokio::test]
async fn pending_attachments_are_consumed_by_next_send() {
    let (mut orchestrator, seen) = orchestrator_with(Script {
        stream: vec![StreamEvent::TextDelta("Itu sebuah foto.".into())],
        ..Script::default()
    });
    let (tx, _rx) = events_channel();

    orchestrator.add_attachments(vec![png_attachment()]);
    orchestrator.handle_send("apa ini?", Vec::new(), &tx).await;

    assert!(orchestrator.pending_attachments().is_empty());
    let messages = orchestrator.messages();
    assert_eq!(messages[1].attachments.len(), 1);
    assert_eq!(seen.lock().unwrap().requests[0].attachments.len(), 1);
}

#[tokio::test]
async fn reset_clears_pending_attachments() {
    let (mut orchestrator, _seen) = orchestrator_with(Script::default());

    orchestrator.add_attachments(vec![png_attachment()]);
    let greeting = orchestrator.handle_reset();

    assert!(orchestrator.pending_attachments().is_empty());
    assert_eq!(greeting.text, RESET_GREETING);
    assert_eq!(orchestrator.messages().len(), 1);
}

#[tokio::test]
async fn blank_input_without_attachments_is_ignored() {
    let (mut orchestrator, seen) = orchestrator_with(Script::default());
    let (tx, _rx) = events_channel();

    orchestrator.handle_send("   ", Vec::new(), &tx).await;

    assert_eq!(orchestrator.messages().len(), 1);
    assert!(seen.lock().unwrap().requests.is_empty());
}
