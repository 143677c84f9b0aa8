//! Shared test support: a scripted fake provider

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

use obrolan::error::{ChatError, Result};
use obrolan::provider::{
    ChatRequest, GeneratedImage, Provider, StreamEvent, ToolContinueRequest,
};

/// What the fake provider replays for each phase of a turn
#[derive(Default)]
pub struct Script {
    /// Events for the initial stream (Done is appended automatically)
    pub stream: Vec<StreamEvent>,
    /// Events for the tool continuation stream
    pub continuation: Vec<StreamEvent>,
    /// Image returned by generate_image
    pub image: Option<GeneratedImage>,
    /// Fail create_stream outright
    pub fail_stream: bool,
    /// Fail generate_image outright
    pub fail_image: bool,
}

/// Everything the fake provider saw, for assertions
#[derive(Default)]
pub struct Seen {
    pub requests: Vec<ChatRequest>,
    pub continuations: Vec<ToolContinueRequest>,
    pub image_prompts: Vec<String>,
}

pub struct FakeProvider {
    script: Script,
    seen: Arc<Mutex<Seen>>,
}

impl FakeProvider {
    pub fn new(script: Script) -> (Self, Arc<Mutex<Seen>>) {
        let seen = Arc::new(Mutex::new(Seen::default()));
        (
            Self {
                script,
                seen: seen.clone(),
            },
            seen,
        )
    }
}

#[async_trait]
impl Provider for FakeProvider {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn create_stream(&self, request: ChatRequest) -> Result<mpsc::Receiver<StreamEvent>> {
        self.seen.lock().unwrap().requests.push(request);
        if self.script.fail_stream {
            return Err(ChatError::Provider("scripted failure".into()));
        }
        Ok(replay(self.script.stream.clone()))
    }

    async fn continue_with_tool_stream(
        &self,
        request: ToolContinueRequest,
    ) -> Result<mpsc::Receiver<StreamEvent>> {
        self.seen.lock().unwrap().continuations.push(request);
        Ok(replay(self.script.continuation.clone()))
    }

    async fn generate_image(&self, prompt: &str) -> Result<Option<GeneratedImage>> {
        self.seen.lock().unwrap().image_prompts.push(prompt.to_string());
        if self.script.fail_image {
            return Err(ChatError::Provider("scripted failure".into()));
        }
        Ok(self.script.image.clone())
    }
}

fn replay(events: Vec<StreamEvent>) -> mpsc::Receiver<StreamEvent> {
    let (tx, rx) = mpsc::channel(100);
    tokio::spawn(async move {
        for event in events {
            if tx.send(event).await.is_err() {
                return;
            }
        }
        let _ = tx.send(StreamEvent::Done).await;
    });
    rx
}
