//! Generation backend contracts
//!
//! The remote model service is reached only through three capability
//! contracts: produce text from a prompt and history, produce an image from
//! a description, produce spoken audio from text. Everything else in the
//! pipeline is written against the [`GenerationApi`] trait.

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub mod live;
#[cfg(test)]
pub mod mock;

pub use live::LiveBackend;
#[cfg(test)]
#[allow(unused_imports)]
pub use mock::MockBackend;

/// Narration audio is mono PCM at 24 kHz, base64-encoded in transit
pub const SPEECH_SAMPLE_RATE: u32 = 24_000;
pub const SPEECH_CHANNELS: u16 = 1;

/// Speaker role for a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

/// One prior turn of the running conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryTurn {
    pub role: Role,
    pub text: String,
}

impl HistoryTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            text: text.into(),
        }
    }
}

/// Decoded image returned by the backend
#[derive(Debug, Clone)]
pub struct GeneratedImage {
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl GeneratedImage {
    /// Render as a data URI usable as an image source
    pub fn to_data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, BASE64.encode(&self.data))
    }
}

/// Decoded narration audio
#[derive(Debug, Clone)]
pub struct AudioPayload {
    /// Raw 16-bit little-endian PCM samples
    pub data: Vec<u8>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioPayload {
    pub fn duration_secs(&self) -> f64 {
        let bytes_per_sec = self.sample_rate as f64 * self.channels as f64 * 2.0;
        self.data.len() as f64 / bytes_per_sec
    }
}

/// Generation backend trait
#[async_trait]
pub trait GenerationApi: Send + Sync {
    /// Produce text for a prompt, given the running conversation history and
    /// a fixed persona system instruction
    async fn generate_text(
        &self,
        prompt: &str,
        history: &[HistoryTurn],
        system_instruction: &str,
    ) -> Result<String>;

    /// Produce an image for a textual description
    async fn generate_image(&self, description: &str) -> Result<GeneratedImage>;

    /// Synthesize narration audio for a chunk of text
    async fn generate_speech(&self, text: &str, voice: &str) -> Result<AudioPayload>;
}
