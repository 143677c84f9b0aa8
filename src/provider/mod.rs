//! Provider abstraction for the model backend
//!
//! Gemini 3 Pro as the primary model with:
//! - Unified streaming interface
//! - Function calling support
//! - Image generation

mod gemini;

pub use gemini::GeminiProvider;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::attachment::Attachment;
use crate::error::Result;

/// Unified provider trait for the model backend
#[async_trait]
pub trait Provider: Send + Sync {
    /// Get the provider name for logging
    fn name(&self) -> &'static str;

    /// Create a streaming chat completion
    async fn create_stream(&self, request: ChatRequest) -> Result<mpsc::Receiver<StreamEvent>>;

    /// Continue a conversation with a function-call result (streaming)
    async fn continue_with_tool_stream(
        &self,
        request: ToolContinueRequest,
    ) -> Result<mpsc::Receiver<StreamEvent>>;

    /// Generate a single image; `None` when the model returned no payload
    async fn generate_image(&self, prompt: &str) -> Result<Option<GeneratedImage>>;
}

/// Role of a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnRole {
    User,
    Model,
}

/// One prior turn of the conversation
#[derive(Debug, Clone)]
pub struct Turn {
    pub role: TurnRole,
    pub text: String,
}

/// Request for a streamed chat completion
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub system: String,
    pub history: Vec<Turn>,
    pub input: String,
    pub attachments: Vec<Attachment>,
    pub tools: Vec<ToolDefinition>,
}

/// Request to continue after executing a function call
#[derive(Debug, Clone)]
pub struct ToolContinueRequest {
    pub system: String,
    pub history: Vec<Turn>,
    pub tool_name: String,
    pub tool_args: Value,
    /// Structured tool output, handed back as the function response
    pub tool_result: Value,
    pub tools: Vec<ToolDefinition>,
}

/// Tool definition in provider-neutral format
#[derive(Debug, Clone)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// One unit of a streamed model response
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// Incremental text
    TextDelta(String),
    /// The model requested a function call
    FunctionCall { name: String, args: Value },
    /// Transport or provider failure
    Error(String),
    /// Stream complete
    Done,
}

/// Inline image returned by the image model
#[derive(Debug, Clone)]
pub struct GeneratedImage {
    pub mime_type: String,
    pub data: String,
}

impl GeneratedImage {
    /// Render as a data URI ready for an `<img>` tag
    pub fn to_data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }
}
