//! Conversation orchestrator
//!
//! Decides image-generation vs. chat mode from the user's text, drives the
//! gateway, and maps streamed chunks and failures onto the conversation
//! store. Exactly one visible message reports the outcome of every turn.

use serde::Serialize;
use tokio::sync::mpsc;

use crate::attachment::Attachment;
use crate::gateway::ChatGateway;
use crate::message::{ConversationStore, Message};

/// Placeholder shown while an image is being generated
pub const GENERATING_TEXT: &str = "Sedang membuat gambar...";

/// Shown when the model returned no image payload
pub const IMAGE_FAILED_TEXT: &str =
    "Saya tidak dapat membuat gambar untuk permintaan tersebut. Silakan coba lagi.";

/// Shown when a send fails outright
pub const SEND_FAILED_TEXT: &str =
    "Terjadi kesalahan saat menghubungkan ke model. Silakan coba lagi.";

/// Events sent to the frontend while a turn is processed
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ChatEvent {
    /// A model message was appended; subsequent events patch it
    #[serde(rename = "message_start")]
    MessageStart { message_id: String },

    /// Incremental streamed text
    #[serde(rename = "text_delta")]
    TextDelta { delta: String },

    /// Full text replacement (placeholders, captions, failure notices)
    #[serde(rename = "text")]
    Text { content: String },

    /// Generated image payload
    #[serde(rename = "image")]
    Image { data_uri: String },

    /// The turn failed; the message carrying this text is error-flagged
    #[serde(rename = "error")]
    Error { message: String },

    /// Turn complete
    #[serde(rename = "done")]
    Done,
}

/// Fixed drawing-intent prefixes, English and Indonesian
const IMAGE_PREFIXES: &[&str] = &[
    "draw",
    "create image",
    "generate image",
    "buatkan gambar",
    "gambar",
];

/// Classify a message as an image-generation request
///
/// Case-insensitive fixed-phrase matching; no model round trip. Attachments
/// override this in `handle_send`: text plus an upload is a question about
/// the upload.
pub fn is_image_generation_request(text: &str) -> bool {
    let lower = text.to_lowercase();
    IMAGE_PREFIXES.iter().any(|p| lower.starts_with(p)) || lower.contains("buat gambar")
}

/// UI controller: one instance per conversation
pub struct Orchestrator {
    store: ConversationStore,
    gateway: ChatGateway,
    pending_attachments: Vec<Attachment>,
}

impl Orchestrator {
    pub fn new(gateway: ChatGateway) -> Self {
        Self {
            store: ConversationStore::new(),
            gateway,
            pending_attachments: Vec::new(),
        }
    }

    pub fn messages(&self) -> &[Message] {
        self.store.messages()
    }

    /// Queue uploaded attachments for the next send
    pub fn add_attachments(&mut self, attachments: Vec<Attachment>) {
        self.pending_attachments.extend(attachments);
    }

    pub fn pending_attachments(&self) -> &[Attachment] {
        &self.pending_attachments
    }

    /// Process one user turn
    ///
    /// Failures are absorbed here: the turn always ends with exactly one
    /// visible message reporting its outcome, error-flagged when the
    /// gateway failed.
    pub async fn handle_send(
        &mut self,
        text: &str,
        attachments: Vec<Attachment>,
        events: &mpsc::UnboundedSender<ChatEvent>,
    ) {
        let text = text.trim();
        let mut all_attachments = std::mem::take(&mut self.pending_attachments);
        all_attachments.extend(attachments);

        if text.is_empty() && all_attachments.is_empty() {
            return;
        }

        self.store.push_user(text, all_attachments.clone());

        // Image generation only without attachments: text plus an upload is
        // a question about the upload
        if is_image_generation_request(text) && all_attachments.is_empty() {
            self.handle_image_turn(text, events).await;
        } else {
            self.handle_chat_turn(text, all_attachments, events).await;
        }
    }

    async fn handle_image_turn(&mut self, text: &str, events: &mpsc::UnboundedSender<ChatEvent>) {
        let id = self.store.push_placeholder(GENERATING_TEXT);
        let _ = events.send(ChatEvent::MessageStart {
            message_id: id.clone(),
        });
        let _ = events.send(ChatEvent::Text {
            content: GENERATING_TEXT.to_string(),
        });

        match self.gateway.generate_image(text).await {
            Ok(Some(data_uri)) => {
                let caption = format!("Berikut adalah gambar untuk: \"{}\"", text);
                self.store.set_image(&id, data_uri.clone(), &caption);
                let _ = events.send(ChatEvent::Text { content: caption });
                let _ = events.send(ChatEvent::Image { data_uri });
            }
            Ok(None) => {
                self.store.set_text(&id, IMAGE_FAILED_TEXT);
                let _ = events.send(ChatEvent::Text {
                    content: IMAGE_FAILED_TEXT.to_string(),
                });
            }
            Err(e) => {
                tracing::error!("image generation failed: {}", e);
                self.fail_turn(&id, events);
            }
        }
    }

    async fn handle_chat_turn(
        &mut self,
        text: &str,
        attachments: Vec<Attachment>,
        events: &mpsc::UnboundedSender<ChatEvent>,
    ) {
        let id = self.store.push_placeholder("");
        let _ = events.send(ChatEvent::MessageStart {
            message_id: id.clone(),
        });

        let mut accumulated = String::new();
        let result = {
            let store = &mut self.store;
            self.gateway
                .send_streaming(text, &attachments, |chunk| {
                    accumulated.push_str(chunk);
                    // Every redraw reflects the full text-to-date
                    store.set_text(&id, &accumulated);
                    let _ = events.send(ChatEvent::TextDelta {
                        delta: chunk.to_string(),
                    });
                })
                .await
        };

        if let Err(e) = result {
            tracing::error!("send failed: {}", e);
            self.fail_turn(&id, events);
        }
    }

    /// Convert a failure into exactly one visible error message
    fn fail_turn(&mut self, placeholder_id: &str, events: &mpsc::UnboundedSender<ChatEvent>) {
        if self.store.contains(placeholder_id) {
            self.store.mark_error(placeholder_id, SEND_FAILED_TEXT);
        } else {
            self.store.push_error(SEND_FAILED_TEXT);
        }
        let _ = events.send(ChatEvent::Error {
            message: SEND_FAILED_TEXT.to_string(),
        });
    }

    /// Reset the conversation: fresh greeting, cleared uploads, new session
    pub fn handle_reset(&mut self) -> Message {
        self.gateway.reset_session();
        self.pending_attachments.clear();
        self.store.reset()
    }
}
