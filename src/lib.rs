//! Obrolan - Gemini chat backend
//!
//! Library behind the `obrolan` binary:
//! - Streaming chat via Gemini 3 Pro, with multimodal attachments
//! - On-demand image generation
//! - `getHouseSales` function calling against the live sales endpoint

pub mod attachment;
pub mod config;
pub mod error;
pub mod gateway;
pub mod message;
pub mod orchestrator;
pub mod provider;
pub mod server;
pub mod tools;

pub use error::{ChatError, Result};
