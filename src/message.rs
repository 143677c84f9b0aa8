//! Conversation store and message types
//!
//! Append-only message sequence; the in-flight model message is patched in
//! place as stream chunks or a pending image result arrive.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::attachment::Attachment;

/// Greeting seeded into a fresh conversation
pub const GREETING: &str = "Halo. Saya Gemini. Saya bisa membantu Anda mengobrol, analisis gambar, \
    membuat gambar, atau mencari data real-time. Coba tanyakan: 'Tampilkan penjualan rumah terbaru' \
    atau unggah gambar untuk bertanya.";

/// Greeting seeded after a reset
pub const RESET_GREETING: &str = "Sesi dibersihkan. Siap untuk topik baru.";

/// Message author
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

/// A message in the conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub text: String,
    pub created_at: i64,
    #[serde(default)]
    pub is_error: bool,
    /// Generated image as a data URI
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Files uploaded by the user
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

impl Message {
    fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            text: text.into(),
            created_at: Utc::now().timestamp(),
            is_error: false,
            image: None,
            attachments: Vec::new(),
        }
    }
}

/// Ordered conversation history
///
/// Append-only, except for in-place patches to the message currently
/// receiving stream chunks or a pending image result. Messages are never
/// deleted individually; `reset` clears in bulk.
#[derive(Debug)]
pub struct ConversationStore {
    messages: Vec<Message>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self {
            messages: vec![Message::new(Role::Model, GREETING)],
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Append the user's message for this turn
    pub fn push_user(&mut self, text: &str, attachments: Vec<Attachment>) -> String {
        let mut message = Message::new(Role::User, text);
        message.attachments = attachments;
        let id = message.id.clone();
        self.messages.push(message);
        id
    }

    /// Append a provisional model message, to be patched in place later
    pub fn push_placeholder(&mut self, text: &str) -> String {
        let message = Message::new(Role::Model, text);
        let id = message.id.clone();
        self.messages.push(message);
        id
    }

    /// Append an error-flagged model message
    pub fn push_error(&mut self, text: &str) -> String {
        let mut message = Message::new(Role::Model, text);
        message.is_error = true;
        let id = message.id.clone();
        self.messages.push(message);
        id
    }

    pub fn contains(&self, id: &str) -> bool {
        self.messages.iter().any(|m| m.id == id)
    }

    /// Replace a message's text with the full text-to-date
    pub fn set_text(&mut self, id: &str, text: &str) {
        if let Some(message) = self.find_mut(id) {
            message.text = text.to_string();
        }
    }

    /// Attach a generated image and its caption
    pub fn set_image(&mut self, id: &str, data_uri: String, caption: &str) {
        if let Some(message) = self.find_mut(id) {
            message.text = caption.to_string();
            message.image = Some(data_uri);
        }
    }

    /// Flag a message as the turn's error outcome
    pub fn mark_error(&mut self, id: &str, text: &str) {
        if let Some(message) = self.find_mut(id) {
            message.text = text.to_string();
            message.is_error = true;
        }
    }

    /// Clear everything and seed a fresh greeting; returns the greeting
    pub fn reset(&mut self) -> Message {
        self.messages.clear();
        let message = Message::new(Role::Model, RESET_GREETING);
        self.messages.push(message.clone());
        message
    }

    fn find_mut(&mut self, id: &str) -> Option<&mut Message> {
        self.messages.iter_mut().find(|m| m.id == id)
    }
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new()
    }
}
