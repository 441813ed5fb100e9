//! Mock generation backend for testing
//!
//! Scripted responses and failure injection, with call counts and captured
//! inputs for assertions. No real network calls.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{
    AudioPayload, GeneratedImage, GenerationApi, HistoryTurn, SPEECH_CHANNELS, SPEECH_SAMPLE_RATE,
};
use crate::error::{BackendError, Result};

/// Number of calls per capability, for test verification
#[derive(Default, Debug, Clone)]
pub struct CallCounts {
    pub text: usize,
    pub image: usize,
    pub speech: usize,
}

/// Inputs captured from each call
#[derive(Default, Debug, Clone)]
pub struct CapturedCalls {
    /// (prompt, history length, system instruction)
    pub text: Vec<(String, usize, String)>,
    pub image_descriptions: Vec<String>,
    pub speech_inputs: Vec<String>,
}

/// Mock backend. Clone freely; clones share state.
#[derive(Clone)]
pub struct MockBackend {
    text_response: Arc<Mutex<String>>,
    text_fails: Arc<Mutex<bool>>,
    image_fails: Arc<Mutex<bool>>,
    /// Fail this many speech calls before succeeding
    speech_failures_remaining: Arc<Mutex<usize>>,
    counts: Arc<Mutex<CallCounts>>,
    captured: Arc<Mutex<CapturedCalls>>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self {
            text_response: Arc::new(Mutex::new(
                "A fine question. Let me sketch the idea.".to_string(),
            )),
            text_fails: Arc::new(Mutex::new(false)),
            image_fails: Arc::new(Mutex::new(false)),
            speech_failures_remaining: Arc::new(Mutex::new(0)),
            counts: Arc::new(Mutex::new(CallCounts::default())),
            captured: Arc::new(Mutex::new(CapturedCalls::default())),
        }
    }
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_text(self, text: impl Into<String>) -> Self {
        *self.text_response.lock().unwrap() = text.into();
        self
    }

    pub fn failing_text(self) -> Self {
        *self.text_fails.lock().unwrap() = true;
        self
    }

    pub fn failing_image(self) -> Self {
        *self.image_fails.lock().unwrap() = true;
        self
    }

    pub fn failing_speech(self, attempts: usize) -> Self {
        *self.speech_failures_remaining.lock().unwrap() = attempts;
        self
    }

    pub fn counts(&self) -> CallCounts {
        self.counts.lock().unwrap().clone()
    }

    pub fn captured(&self) -> CapturedCalls {
        self.captured.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerationApi for MockBackend {
    async fn generate_text(
        &self,
        prompt: &str,
        history: &[HistoryTurn],
        system_instruction: &str,
    ) -> Result<String> {
        self.counts.lock().unwrap().text += 1;
        self.captured.lock().unwrap().text.push((
            prompt.to_string(),
            history.len(),
            system_instruction.to_string(),
        ));

        if *self.text_fails.lock().unwrap() {
            return Err(BackendError::ServerError("scripted text failure".to_string()).into());
        }
        Ok(self.text_response.lock().unwrap().clone())
    }

    async fn generate_image(&self, description: &str) -> Result<GeneratedImage> {
        self.counts.lock().unwrap().image += 1;
        self.captured
            .lock()
            .unwrap()
            .image_descriptions
            .push(description.to_string());

        if *self.image_fails.lock().unwrap() {
            return Err(BackendError::ServerError("scripted image failure".to_string()).into());
        }
        Ok(GeneratedImage {
            mime_type: "image/jpeg".to_string(),
            data: vec![0xFF, 0xD8, 0xFF, 0xE0, 0x42, 0x42, 0x42, 0x42],
        })
    }

    async fn generate_speech(&self, text: &str, _voice: &str) -> Result<AudioPayload> {
        self.counts.lock().unwrap().speech += 1;
        self.captured
            .lock()
            .unwrap()
            .speech_inputs
            .push(text.to_string());

        let mut remaining = self.speech_failures_remaining.lock().unwrap();
        if *remaining > 0 {
            *remaining -= 1;
            return Err(BackendError::ServerError("scripted speech failure".to_string()).into());
        }
        Ok(AudioPayload {
            data: vec![0; 4800],
            sample_rate: SPEECH_SAMPLE_RATE,
            channels: SPEECH_CHANNELS,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_counts_and_captures() {
        let mock = MockBackend::new().with_text("scripted reply");

        let text = mock.generate_text("p", &[], "sys").await.unwrap();
        assert_eq!(text, "scripted reply");

        let _ = mock.generate_image("a sketch").await.unwrap();

        let counts = mock.counts();
        assert_eq!(counts.text, 1);
        assert_eq!(counts.image, 1);
        assert_eq!(counts.speech, 0);

        let captured = mock.captured();
        assert_eq!(captured.text[0].0, "p");
        assert_eq!(captured.image_descriptions[0], "a sketch");
    }

    #[tokio::test]
    async fn test_mock_speech_failure_script() {
        let mock = MockBackend::new().failing_speech(2);

        assert!(mock.generate_speech("a", "kore").await.is_err());
        assert!(mock.generate_speech("a", "kore").await.is_err());
        assert!(mock.generate_speech("a", "kore").await.is_ok());
        assert_eq!(mock.counts().speech, 3);
    }
}
