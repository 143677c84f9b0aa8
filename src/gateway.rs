//! Model gateway
//!
//! Owns the provider handle and the conversation session, and drives a
//! streamed send end to end, including the one-round function-call loop
//! for the house-sales tool.

use serde_json::Value;

use crate::attachment::Attachment;
use crate::error::{ChatError, Result};
use crate::provider::{
    ChatRequest, GeminiProvider, Provider, StreamEvent, ToolContinueRequest, Turn, TurnRole,
};
use crate::tools::{self, HOUSE_SALES_TOOL};

/// System instruction for the chat model
pub const SYSTEM_INSTRUCTION: &str = "Anda adalah asisten AI yang membantu, cerdas, dan ringkas. \
    Jawablah selalu pertanyaan dalam Bahasa Indonesia dengan jelas menggunakan format Markdown \
    jika sesuai. Anda juga dapat membuat gambar dan mencari data penjualan rumah real-time.";

/// Conversation context replayed to the model on every request
///
/// Gemini is client-state: the session handle is the history itself.
#[derive(Debug, Default)]
pub struct ChatSession {
    history: Vec<Turn>,
}

/// Gateway to the model provider
///
/// Holds the single owned session; reset replaces the instance instead of
/// mutating shared state.
pub struct ChatGateway {
    api_key: Option<String>,
    provider: Option<Box<dyn Provider>>,
    session: Option<ChatSession>,
    http: reqwest::Client,
    house_sales_url: String,
}

impl ChatGateway {
    /// Create a gateway that lazily constructs the Gemini provider
    ///
    /// A missing key is surfaced on the first send, not here.
    pub fn new(api_key: Option<String>, house_sales_url: String) -> Self {
        Self {
            api_key,
            provider: None,
            session: None,
            http: reqwest::Client::new(),
            house_sales_url,
        }
    }

    /// Create a gateway around an existing provider
    ///
    /// The seam used by tests and alternative backends.
    pub fn with_provider(provider: Box<dyn Provider>, house_sales_url: String) -> Self {
        Self {
            api_key: None,
            provider: Some(provider),
            session: None,
            http: reqwest::Client::new(),
            house_sales_url,
        }
    }

    /// Discard the current session; the next send starts a fresh one
    pub fn reset_session(&mut self) {
        self.session = None;
    }

    /// Send one user turn and stream the model's text back through `on_chunk`
    ///
    /// Chunks are delivered synchronously in stream order. If the model
    /// requests the house-sales tool, the call is executed after the stream
    /// completes and exactly one follow-up streamed request carries the
    /// result; its chunks flow through the same `on_chunk`. Transport and
    /// provider errors propagate to the caller.
    pub async fn send_streaming<F>(
        &mut self,
        text: &str,
        attachments: &[Attachment],
        mut on_chunk: F,
    ) -> Result<()>
    where
        F: FnMut(&str),
    {
        let Self {
            api_key,
            provider,
            session,
            http,
            house_sales_url,
        } = self;
        let provider = lazy_provider(provider, api_key.as_deref())?;
        let session = session.get_or_insert_default();

        let tools = tools::tool_definitions();
        let request = ChatRequest {
            system: SYSTEM_INSTRUCTION.to_string(),
            history: session.history.clone(),
            input: text.to_string(),
            attachments: attachments.to_vec(),
            tools: tools.clone(),
        };

        let mut rx = provider.create_stream(request).await?;

        let mut accumulated = String::new();
        let mut pending_call: Option<(String, Value)> = None;

        while let Some(event) = rx.recv().await {
            match event {
                StreamEvent::TextDelta(delta) => {
                    accumulated.push_str(&delta);
                    on_chunk(&delta);
                }
                StreamEvent::FunctionCall { name, args } => {
                    // Only the house-sales tool is recognized
                    if name == HOUSE_SALES_TOOL {
                        pending_call = Some((name, args));
                    } else {
                        tracing::warn!("ignoring unknown function call: {}", name);
                    }
                }
                StreamEvent::Error(message) => return Err(ChatError::Provider(message)),
                StreamEvent::Done => break,
            }
        }

        if let Some((name, args)) = pending_call {
            tracing::debug!(tool = %name, "executing function call");
            let data = tools::fetch_house_sales(http, house_sales_url).await;

            let mut history = session.history.clone();
            history.push(Turn {
                role: TurnRole::User,
                text: text.to_string(),
            });
            if !accumulated.is_empty() {
                history.push(Turn {
                    role: TurnRole::Model,
                    text: accumulated.clone(),
                });
            }

            let continue_request = ToolContinueRequest {
                system: SYSTEM_INSTRUCTION.to_string(),
                history,
                tool_name: name,
                tool_args: args,
                tool_result: data,
                tools,
            };

            let mut rx = provider.continue_with_tool_stream(continue_request).await?;

            while let Some(event) = rx.recv().await {
                match event {
                    StreamEvent::TextDelta(delta) => {
                        accumulated.push_str(&delta);
                        on_chunk(&delta);
                    }
                    StreamEvent::FunctionCall { name, .. } => {
                        tracing::warn!("ignoring nested function call: {}", name);
                    }
                    StreamEvent::Error(message) => return Err(ChatError::Provider(message)),
                    StreamEvent::Done => break,
                }
            }
        }

        // Commit the turn to the session
        session.history.push(Turn {
            role: TurnRole::User,
            text: text.to_string(),
        });
        session.history.push(Turn {
            role: TurnRole::Model,
            text: accumulated,
        });

        Ok(())
    }

    /// Generate one image; returns a ready-to-render data URI
    ///
    /// Single non-streaming call; does not touch session history.
    pub async fn generate_image(&mut self, prompt: &str) -> Result<Option<String>> {
        let provider = lazy_provider(&mut self.provider, self.api_key.as_deref())?;
        let image = provider.generate_image(prompt).await?;
        Ok(image.map(|image| image.to_data_uri()))
    }
}

/// Lazily construct the Gemini provider
///
/// A missing credential fails here, on the first send, rather than at
/// startup.
fn lazy_provider<'a>(
    provider: &'a mut Option<Box<dyn Provider>>,
    api_key: Option<&str>,
) -> Result<&'a dyn Provider> {
    if provider.is_none() {
        let key = api_key.ok_or_else(|| ChatError::Config("GEMINI_API_KEY not set".into()))?;
        *provider = Some(Box::new(GeminiProvider::new(key.to_string())));
    }
    Ok(provider.as_ref().unwrap().as_ref())
}
