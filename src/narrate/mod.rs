//! Paragraph narration
//!
//! Splits resolved text into paragraphs and plays them through an audio
//! sink in order, synthesizing each one as it goes. Narration runs inside
//! a session; starting a new session or stopping cancels the old one at
//! the next paragraph boundary, and a cancelled session never touches the
//! playback flag again.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;

use crate::backend::{AudioPayload, GenerationApi};
use crate::error::Result;
use crate::generate::Dispatcher;

/// Playback target for synthesized narration
#[async_trait]
pub trait AudioSink: Send + Sync {
    async fn play(&self, audio: &AudioPayload) -> Result<()>;
}

/// Sequential paragraph narrator over a generation dispatcher
pub struct Narrator<B: GenerationApi> {
    dispatcher: Arc<Dispatcher<B>>,
    sink: Arc<dyn AudioSink>,
    session: Arc<AtomicU64>,
    playing: Arc<AtomicBool>,
}

impl<B: GenerationApi> Narrator<B> {
    pub fn new(dispatcher: Arc<Dispatcher<B>>, sink: Arc<dyn AudioSink>) -> Self {
        Self {
            dispatcher,
            sink,
            session: Arc::new(AtomicU64::new(0)),
            playing: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Narrate the text paragraph by paragraph. Supersedes any narration
    /// already in flight. A paragraph that cannot be synthesized is skipped;
    /// a playback error ends the session early.
    pub async fn narrate(&self, text: &str) {
        let session = self.session.fetch_add(1, Ordering::SeqCst) + 1;
        self.playing.store(true, Ordering::SeqCst);

        for paragraph in paragraphs(text) {
            if !self.is_current(session) {
                return;
            }
            // The retry loop inside speech checks the session too, so a
            // stop landing mid-backoff issues no further backend calls.
            let audio = match self
                .dispatcher
                .speech(&paragraph, || !self.is_current(session))
                .await
            {
                Some(audio) => audio,
                None => continue,
            };
            if !self.is_current(session) {
                return;
            }
            if let Err(err) = self.sink.play(&audio).await {
                log::warn!("narration playback failed: {}", err);
                break;
            }
        }

        // Only the still-current session may declare playback finished
        if self.is_current(session) {
            self.playing.store(false, Ordering::SeqCst);
        }
    }

    /// Cancel any in-flight narration
    pub fn stop(&self) {
        self.session.fetch_add(1, Ordering::SeqCst);
        self.playing.store(false, Ordering::SeqCst);
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }

    fn is_current(&self, session: u64) -> bool {
        self.session.load(Ordering::SeqCst) == session
    }
}

/// Non-empty trimmed paragraphs, split on blank lines
fn paragraphs(text: &str) -> Vec<String> {
    text.split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

/// Sink that writes each paragraph to a timestamped WAV file under the
/// given directory. Stands in for a speaker on headless installs.
pub struct WavFileSink {
    dir: PathBuf,
    counter: AtomicU64,
}

impl WavFileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            counter: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl AudioSink for WavFileSink {
    async fn play(&self, audio: &AudioPayload) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        let name = format!("narration-{}-{:03}.wav", Utc::now().format("%Y%m%d%H%M%S"), n);
        let path = self.dir.join(&name);
        write_wav(&path, audio)?;
        log::info!("narration written to {}", path.display());
        Ok(())
    }
}

/// Serialize raw PCM16 samples as a WAV file
fn write_wav(path: &Path, audio: &AudioPayload) -> Result<()> {
    let mut file = std::fs::File::create(path)?;
    file.write_all(&wav_bytes(audio))?;
    Ok(())
}

/// Standard 44-byte RIFF/WAVE header followed by the PCM payload
pub fn wav_bytes(audio: &AudioPayload) -> Vec<u8> {
    let data_len = audio.data.len() as u32;
    let byte_rate = audio.sample_rate * audio.channels as u32 * 2;
    let block_align = audio.channels * 2;

    let mut out = Vec::with_capacity(44 + audio.data.len());
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes()); // PCM
    out.extend_from_slice(&audio.channels.to_le_bytes());
    out.extend_from_slice(&audio.sample_rate.to_le_bytes());
    out.extend_from_slice(&byte_rate.to_le_bytes());
    out.extend_from_slice(&block_align.to_le_bytes());
    out.extend_from_slice(&16u16.to_le_bytes()); // bits per sample
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    out.extend_from_slice(&audio.data);
    out
}
