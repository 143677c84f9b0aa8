//! Gemini provider for streaming chat, function calling and image generation
//!
//! Talks to the generateContent / streamGenerateContent REST endpoints
//! directly; streaming uses the SSE (`alt=sse`) variant.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tokio::sync::mpsc;

use super::{
    ChatRequest, GeneratedImage, Provider, StreamEvent, ToolContinueRequest, ToolDefinition, Turn,
    TurnRole,
};
use crate::error::{ChatError, Result};

const GEMINI_STREAM_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models/gemini-3-pro-preview:streamGenerateContent";
const GEMINI_IMAGE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash-image:generateContent";
const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Gemini provider
pub struct GeminiProvider {
    client: HttpClient,
    api_key: String,
}

impl GeminiProvider {
    /// Create a new Gemini provider
    pub fn new(api_key: String) -> Self {
        Self {
            client: HttpClient::new(),
            api_key,
        }
    }

    /// Create from environment variable
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .map_err(|_| ChatError::Config("GEMINI_API_KEY not set".into()))?;
        Ok(Self::new(api_key))
    }

    /// Build Gemini contents from a chat request
    fn build_contents(request: &ChatRequest) -> Vec<GeminiContent> {
        let mut contents = history_contents(&request.history);

        // Current user input: attachment parts first, then the text prompt
        let mut parts = Vec::new();
        for attachment in &request.attachments {
            parts.push(GeminiPart::InlineData {
                inline_data: GeminiInlineData {
                    mime_type: attachment.mime_type.clone(),
                    data: attachment.data.clone(),
                },
            });
        }
        if !request.input.is_empty() || parts.is_empty() {
            parts.push(GeminiPart::Text {
                text: request.input.clone(),
            });
        }
        contents.push(GeminiContent {
            role: "user".to_string(),
            parts,
        });

        contents
    }

    /// Build Gemini contents for the function-call continuation
    fn build_tool_contents(request: &ToolContinueRequest) -> Vec<GeminiContent> {
        let mut contents = history_contents(&request.history);

        // The model's call, reconstructed, followed by our response
        contents.push(GeminiContent {
            role: "model".to_string(),
            parts: vec![GeminiPart::FunctionCall {
                function_call: GeminiFunctionCall {
                    name: request.tool_name.clone(),
                    args: request.tool_args.clone(),
                },
            }],
        });
        contents.push(GeminiContent {
            role: "user".to_string(),
            parts: vec![GeminiPart::FunctionResponse {
                function_response: GeminiFunctionResponse {
                    name: request.tool_name.clone(),
                    response: serde_json::json!({ "result": request.tool_result }),
                },
            }],
        });

        contents
    }

    /// Convert tool definitions to Gemini format
    fn build_tools(tools: &[ToolDefinition]) -> Option<Vec<GeminiTool>> {
        if tools.is_empty() {
            return None;
        }

        let declarations: Vec<GeminiFunctionDeclaration> = tools
            .iter()
            .map(|t| GeminiFunctionDeclaration {
                name: t.name.clone(),
                description: t.description.clone(),
                parameters: t.parameters.clone(),
            })
            .collect();

        Some(vec![GeminiTool {
            function_declarations: declarations,
        }])
    }

    /// Post a request to the SSE endpoint and forward events through a channel
    fn spawn_stream(&self, api_request: GeminiRequest) -> mpsc::Receiver<StreamEvent> {
        let (tx, rx) = mpsc::channel(100);
        let url = format!("{}?alt=sse&key={}", GEMINI_STREAM_URL, self.api_key);
        let client = self.client.clone();

        tokio::spawn(async move {
            let response = match client
                .post(&url)
                .json(&api_request)
                .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
                .send()
                .await
            {
                Ok(response) => response,
                Err(e) => {
                    let _ = tx.send(StreamEvent::Error(e.to_string())).await;
                    return;
                }
            };

            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                let _ = tx
                    .send(StreamEvent::Error(format!(
                        "Gemini API error: {} - {}",
                        status, body
                    )))
                    .await;
                return;
            }

            let mut stream = response.bytes_stream();
            let mut buffer = String::new();

            while let Some(chunk) = stream.next().await {
                match chunk {
                    Ok(bytes) => {
                        buffer.push_str(&String::from_utf8_lossy(&bytes));

                        // Parse SSE events line by line
                        while let Some(line_end) = buffer.find('\n') {
                            let line = buffer[..line_end].to_string();
                            buffer = buffer[line_end + 1..].to_string();

                            if let Some(data) = line.strip_prefix("data: ") {
                                for event in parse_stream_data(data) {
                                    if tx.send(event).await.is_err() {
                                        return;
                                    }
                                }
                            }
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(StreamEvent::Error(e.to_string())).await;
                        break;
                    }
                }
            }

            let _ = tx.send(StreamEvent::Done).await;
        });

        rx
    }
}

#[async_trait]
impl Provider for GeminiProvider {
    fn name(&self) -> &'static str {
        "Gemini 3 Pro"
    }

    async fn create_stream(&self, request: ChatRequest) -> Result<mpsc::Receiver<StreamEvent>> {
        let api_request = GeminiRequest {
            contents: Self::build_contents(&request),
            system_instruction: Some(GeminiSystemInstruction {
                parts: vec![GeminiTextPart {
                    text: request.system,
                }],
            }),
            generation_config: None,
            tools: Self::build_tools(&request.tools),
        };

        Ok(self.spawn_stream(api_request))
    }

    async fn continue_with_tool_stream(
        &self,
        request: ToolContinueRequest,
    ) -> Result<mpsc::Receiver<StreamEvent>> {
        let api_request = GeminiRequest {
            contents: Self::build_tool_contents(&request),
            system_instruction: Some(GeminiSystemInstruction {
                parts: vec![GeminiTextPart {
                    text: request.system,
                }],
            }),
            generation_config: None,
            tools: Self::build_tools(&request.tools),
        };

        Ok(self.spawn_stream(api_request))
    }

    async fn generate_image(&self, prompt: &str) -> Result<Option<GeneratedImage>> {
        let api_request = GeminiRequest {
            contents: vec![GeminiContent {
                role: "user".to_string(),
                parts: vec![GeminiPart::Text {
                    text: prompt.to_string(),
                }],
            }],
            system_instruction: None,
            generation_config: Some(GeminiGenerationConfig {
                image_config: GeminiImageConfig {
                    aspect_ratio: "1:1".to_string(),
                },
            }),
            tools: None,
        };

        let url = format!("{}?key={}", GEMINI_IMAGE_URL, self.api_key);

        let response = self
            .client
            .post(&url)
            .json(&api_request)
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ChatError::Provider(format!(
                "Gemini API error: {} - {}",
                status, body
            )));
        }

        let api_response: GeminiResponse = response.json().await?;

        if let Some(error) = api_response.error {
            return Err(ChatError::Provider(format!(
                "Gemini error: {}",
                error.message
            )));
        }

        let parts = api_response
            .candidates
            .and_then(|candidates| candidates.into_iter().next())
            .and_then(|candidate| candidate.content)
            .map(|content| content.parts)
            .unwrap_or_default();

        for part in parts {
            if let Some(inline) = part.inline_data {
                return Ok(Some(GeneratedImage {
                    mime_type: inline.mime_type.unwrap_or_else(|| "image/png".to_string()),
                    data: inline.data,
                }));
            }
        }

        Ok(None)
    }
}

/// Convert prior turns into Gemini contents
fn history_contents(history: &[Turn]) -> Vec<GeminiContent> {
    history
        .iter()
        .map(|turn| GeminiContent {
            role: match turn.role {
                TurnRole::User => "user",
                TurnRole::Model => "model",
            }
            .to_string(),
            parts: vec![GeminiPart::Text {
                text: turn.text.clone(),
            }],
        })
        .collect()
}

/// Parse one SSE data frame into stream events, in part order
fn parse_stream_data(data: &str) -> Vec<StreamEvent> {
    let mut events = Vec::new();

    let Ok(response) = serde_json::from_str::<GeminiResponse>(data) else {
        return events;
    };

    if let Some(error) = response.error {
        events.push(StreamEvent::Error(format!("Gemini error: {}", error.message)));
        return events;
    }

    if let Some(candidates) = response.candidates {
        for candidate in candidates {
            let Some(content) = candidate.content else {
                continue;
            };
            for part in content.parts {
                if let Some(text) = part.text {
                    events.push(StreamEvent::TextDelta(text));
                }
                if let Some(function_call) = part.function_call {
                    events.push(StreamEvent::FunctionCall {
                        name: function_call.name,
                        args: function_call.args,
                    });
                }
            }
        }
    }

    events
}

// ============================================================================
// API Types
// ============================================================================

#[derive(Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(rename = "systemInstruction", skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiSystemInstruction>,
    #[serde(rename = "generationConfig", skip_serializing_if = "Option::is_none")]
    generation_config: Option<GeminiGenerationConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<GeminiTool>>,
}

#[derive(Serialize)]
struct GeminiSystemInstruction {
    parts: Vec<GeminiTextPart>,
}

#[derive(Serialize, Clone)]
struct GeminiContent {
    role: String,
    parts: Vec<GeminiPart>,
}

#[derive(Serialize, Clone)]
#[serde(untagged)]
enum GeminiPart {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: GeminiInlineData,
    },
    FunctionCall {
        #[serde(rename = "functionCall")]
        function_call: GeminiFunctionCall,
    },
    FunctionResponse {
        #[serde(rename = "functionResponse")]
        function_response: GeminiFunctionResponse,
    },
}

#[derive(Serialize, Clone)]
struct GeminiInlineData {
    #[serde(rename = "mimeType")]
    mime_type: String,
    data: String,
}

#[derive(Serialize, Deserialize, Clone)]
struct GeminiFunctionCall {
    name: String,
    args: Value,
}

#[derive(Serialize, Clone)]
struct GeminiFunctionResponse {
    name: String,
    response: Value,
}

#[derive(Serialize)]
struct GeminiTool {
    #[serde(rename = "functionDeclarations")]
    function_declarations: Vec<GeminiFunctionDeclaration>,
}

#[derive(Serialize)]
struct GeminiFunctionDeclaration {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Serialize)]
struct GeminiGenerationConfig {
    #[serde(rename = "imageConfig")]
    image_config: GeminiImageConfig,
}

#[derive(Serialize)]
struct GeminiImageConfig {
    #[serde(rename = "aspectRatio")]
    aspect_ratio: String,
}

#[derive(Serialize)]
struct GeminiTextPart {
    text: String,
}

#[derive(Deserialize)]
struct GeminiResponse {
    candidates: Option<Vec<GeminiCandidate>>,
    error: Option<GeminiError>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContentResponse>,
}

#[derive(Deserialize)]
struct GeminiContentResponse {
    #[serde(default)]
    parts: Vec<GeminiPartResponse>,
}

#[derive(Deserialize)]
struct GeminiPartResponse {
    text: Option<String>,
    #[serde(rename = "functionCall")]
    function_call: Option<GeminiFunctionCall>,
    #[serde(rename = "inlineData")]
    inline_data: Option<GeminiInlineDataResponse>,
}

#[derive(Deserialize)]
struct GeminiInlineDataResponse {
    #[serde(rename = "mimeType")]
    mime_type: Option<String>,
    data: String,
}

#[derive(Deserialize)]
struct GeminiError {
    message: String,
}
