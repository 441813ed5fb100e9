//! Generation dispatcher
//!
//! Wraps the raw backend capabilities with the persona instruction, the
//! chalkboard framing for diagrams, the text fallback policy, and the
//! bounded retry policy for narration audio. Every call, success or
//! failure, produces exactly one diagnostic log entry.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::backend::{AudioPayload, GenerationApi, HistoryTurn};
use crate::diag::{DiagCategory, DiagOutcome, DiagSink};
use crate::error::{BackendError, Result};

/// Fixed persona instruction supplied with every text call
pub const PERSONA_INSTRUCTION: &str = "You are Albert Einstein, retired in Princeton, \
    narrating the history of mathematics to a curious guest. Speak in the first person, \
    warmly and playfully, with a light German inflection, in a few short paragraphs. \
    When a sketch would help, include one line of the form [DIAGRAM: description of the sketch].";

/// Clearly-marked fallback sentence for failed follow-up text generation
pub const TEXT_FALLBACK: &str = "Ach, forgive me. My chalk has crumbled mid-thought. \
    Ask me once more and I will try again.";

/// Fixed stylistic framing prepended to every diagram description
const IMAGE_STYLE_FRAME: &str = "A hand-drawn white chalk sketch on a dark blackboard, \
    simple confident lines, lecture-hall style: ";

/// Rich prosody instruction for the first speech attempts
const SPEECH_RICH_INSTRUCTION: &str = "Read warmly in the voice of an elderly German \
    physicist, a gentle accent, unhurried, with soft emphasis on the key words:";

/// Minimal instruction for the final, degraded speech attempt
const SPEECH_MINIMAL_INSTRUCTION: &str = "Read aloud:";

const SPEECH_ATTEMPTS: u32 = 3;
const SPEECH_BACKOFF_BASE: Duration = Duration::from_millis(500);

/// What to do when text generation fails
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextFailure {
    /// Return the marked fallback sentence
    Fallback,
    /// Propagate the error so the caller can react (chapter starts)
    Propagate,
}

/// Discriminated text result, so callers can tell a real completion from
/// the fallback placeholder (which must never be cached).
#[derive(Debug, Clone)]
pub enum TextOutcome {
    Generated(String),
    Fallback(String),
}

impl TextOutcome {
    pub fn into_text(self) -> String {
        match self {
            TextOutcome::Generated(text) | TextOutcome::Fallback(text) => text,
        }
    }
}

/// Dispatcher over a generation backend
pub struct Dispatcher<B: GenerationApi> {
    backend: Arc<B>,
    diag: Arc<dyn DiagSink>,
    voice: String,
}

impl<B: GenerationApi> Dispatcher<B> {
    pub fn new(backend: Arc<B>, diag: Arc<dyn DiagSink>, voice: impl Into<String>) -> Self {
        Self {
            backend,
            diag,
            voice: voice.into(),
        }
    }

    /// Generate persona text for a prompt and conversation history
    pub async fn text(
        &self,
        prompt: &str,
        history: &[HistoryTurn],
        on_failure: TextFailure,
    ) -> Result<TextOutcome> {
        let start = Instant::now();
        let result = self
            .backend
            .generate_text(prompt, history, PERSONA_INSTRUCTION)
            .await;

        match result {
            Ok(text) if !text.trim().is_empty() => {
                self.diag.append(
                    DiagCategory::TextGeneration,
                    "generate text",
                    start.elapsed(),
                    DiagOutcome::Success,
                    format!("{} chars, {} history turns", text.len(), history.len()),
                    None,
                );
                Ok(TextOutcome::Generated(text))
            }
            Ok(_) => {
                self.diag.append(
                    DiagCategory::TextGeneration,
                    "generate text",
                    start.elapsed(),
                    DiagOutcome::Error,
                    "backend returned an empty completion".to_string(),
                    None,
                );
                match on_failure {
                    TextFailure::Fallback => Ok(TextOutcome::Fallback(TEXT_FALLBACK.to_string())),
                    TextFailure::Propagate => Err(BackendError::EmptyCompletion.into()),
                }
            }
            Err(err) => {
                self.diag.append(
                    DiagCategory::TextGeneration,
                    "generate text",
                    start.elapsed(),
                    DiagOutcome::Error,
                    err.to_string(),
                    None,
                );
                match on_failure {
                    TextFailure::Fallback => Ok(TextOutcome::Fallback(TEXT_FALLBACK.to_string())),
                    TextFailure::Propagate => Err(err),
                }
            }
        }
    }

    /// Generate a chalkboard diagram. Never fails the caller: absence means
    /// the diagram simply does not appear.
    pub async fn image(&self, description: &str) -> Option<String> {
        let start = Instant::now();
        let framed = format!("{}{}", IMAGE_STYLE_FRAME, description);

        match self.backend.generate_image(&framed).await {
            Ok(image) => {
                self.diag.append(
                    DiagCategory::ImageGeneration,
                    "generate diagram",
                    start.elapsed(),
                    DiagOutcome::Success,
                    format!("{}, {} bytes", image.mime_type, image.data.len()),
                    None,
                );
                Some(image.to_data_uri())
            }
            Err(err) => {
                self.diag.append(
                    DiagCategory::ImageGeneration,
                    "generate diagram",
                    start.elapsed(),
                    DiagOutcome::Error,
                    err.to_string(),
                    None,
                );
                None
            }
        }
    }

    /// Synthesize narration for one paragraph. Up to three attempts: the
    /// first two carry the rich prosody instruction, the last a minimal one,
    /// with exponential backoff between attempts. Exhaustion returns `None`.
    ///
    /// `cancelled` is consulted before every attempt, so a session stopped
    /// mid-backoff makes no further backend calls and appends no further
    /// log entries.
    pub async fn speech(
        &self,
        text: &str,
        cancelled: impl Fn() -> bool,
    ) -> Option<AudioPayload> {
        for attempt in 1..=SPEECH_ATTEMPTS {
            if cancelled() {
                return None;
            }
            let instruction = if attempt < SPEECH_ATTEMPTS {
                SPEECH_RICH_INSTRUCTION
            } else {
                SPEECH_MINIMAL_INSTRUCTION
            };
            let input = format!("{}\n{}", instruction, text);

            let start = Instant::now();
            match self.backend.generate_speech(&input, &self.voice).await {
                Ok(audio) => {
                    self.diag.append(
                        DiagCategory::AudioGeneration,
                        "synthesize narration",
                        start.elapsed(),
                        DiagOutcome::Success,
                        format!(
                            "attempt {}, {} bytes, {:.1}s",
                            attempt,
                            audio.data.len(),
                            audio.duration_secs()
                        ),
                        None,
                    );
                    return Some(audio);
                }
                Err(err) => {
                    self.diag.append(
                        DiagCategory::AudioGeneration,
                        "synthesize narration",
                        start.elapsed(),
                        DiagOutcome::Error,
                        format!("attempt {}: {}", attempt, err),
                        None,
                    );
                    if attempt < SPEECH_ATTEMPTS {
                        tokio::time::sleep(SPEECH_BACKOFF_BASE * 2u32.pow(attempt - 1)).await;
                    }
                }
            }
        }
        None
    }
}
