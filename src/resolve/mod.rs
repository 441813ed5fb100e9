//! Resolution orchestrator
//!
//! For each conversational turn, resolve text and diagram in strict
//! priority order: static archive, then persistent cache, then live
//! generation, short-circuiting on the first success. Text and image are
//! independent per-modality pipelines; a static text hit does not imply a
//! static image hit. Only live-generation results are written back to the
//! cache.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::archive::StaticArchiveResolver;
use crate::backend::{GenerationApi, HistoryTurn};
use crate::cache::{ArtifactCache, ArtifactCategory};
use crate::chapters::ChapterDescriptor;
use crate::error::Result;
use crate::fingerprint::{chapter_key, fingerprint};
use crate::generate::{Dispatcher, TextFailure, TextOutcome};

/// Marker for the machine-readable diagram directive embedded in generated
/// text
const DIRECTIVE_OPEN: &str = "[DIAGRAM:";
const DIRECTIVE_CLOSE: char = ']';

/// One conversational turn to resolve
#[derive(Debug, Clone)]
pub enum TurnRequest {
    /// Opening turn of a chapter, keyed by its identifier
    ChapterStart { chapter: ChapterDescriptor },
    /// Free-form follow-up; static lookup does not apply
    FollowUp {
        question: String,
        history: Vec<HistoryTurn>,
    },
}

/// Which pipeline stage produced an artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Origin {
    StaticArchive,
    Cache,
    Generated,
}

/// Resolved diagram reference: a URL or data URI usable as an image source
#[derive(Debug, Clone)]
pub struct ImageRef {
    pub source: String,
    pub origin: Origin,
}

/// Fully resolved turn
#[derive(Debug, Clone)]
pub struct TurnResponse {
    pub text: String,
    pub text_origin: Origin,
    pub image: Option<ImageRef>,
}

/// Cancellation token for a turn. Beginning a new turn invalidates every
/// older token; a stale resolution abandons without returning a response.
pub struct TurnToken {
    seq: u64,
    counter: Arc<AtomicU64>,
}

impl TurnToken {
    pub fn is_current(&self) -> bool {
        self.counter.load(Ordering::SeqCst) == self.seq
    }
}

/// Orchestrates the three-stage resolution pipeline
pub struct Orchestrator<B: GenerationApi> {
    archive: StaticArchiveResolver,
    cache: Arc<ArtifactCache>,
    dispatcher: Arc<Dispatcher<B>>,
    turns: Arc<AtomicU64>,
}

impl<B: GenerationApi> Orchestrator<B> {
    pub fn new(
        archive: StaticArchiveResolver,
        cache: Arc<ArtifactCache>,
        dispatcher: Arc<Dispatcher<B>>,
    ) -> Self {
        Self {
            archive,
            cache,
            dispatcher,
            turns: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Begin a new turn, invalidating any in-flight older turn
    pub fn begin_turn(&self) -> TurnToken {
        let seq = self.turns.fetch_add(1, Ordering::SeqCst) + 1;
        TurnToken {
            seq,
            counter: self.turns.clone(),
        }
    }

    /// Resolve one turn. Returns `Ok(None)` when the token was superseded
    /// mid-flight; the stale result is discarded without side effects.
    pub async fn resolve_turn(
        &self,
        request: &TurnRequest,
        token: &TurnToken,
    ) -> Result<Option<TurnResponse>> {
        if !token.is_current() {
            return Ok(None);
        }
        match request {
            TurnRequest::ChapterStart { chapter } => self.resolve_chapter_start(chapter, token).await,
            TurnRequest::FollowUp { question, history } => {
                self.resolve_follow_up(question, history, token).await
            }
        }
    }

    async fn resolve_chapter_start(
        &self,
        chapter: &ChapterDescriptor,
        token: &TurnToken,
    ) -> Result<Option<TurnResponse>> {
        let key = chapter_key(&chapter.id);

        // The two pipelines are independent once the chapter prompt is
        // known, so they run concurrently.
        let (text_result, image) = futures::future::join(
            self.chapter_text(chapter, &key),
            self.chapter_image(chapter, &key),
        )
        .await;

        if !token.is_current() {
            return Ok(None);
        }

        let (raw, text_origin) = text_result?;
        let (text, _directive) = extract_directive(&raw);
        Ok(Some(TurnResponse {
            text,
            text_origin,
            image,
        }))
    }

    async fn chapter_text(
        &self,
        chapter: &ChapterDescriptor,
        key: &str,
    ) -> Result<(String, Origin)> {
        if let Some(text) = self.archive.resolve_text(key, Some(&chapter.title)).await {
            return Ok((text, Origin::StaticArchive));
        }

        let fp = fingerprint(&generation_input(&chapter.prompt, &[])?);
        if let Some(text) = self.cache.get(ArtifactCategory::Text, &fp) {
            return Ok((text, Origin::Cache));
        }

        // Chapter starts propagate failures so the caller can retry the
        // whole turn.
        let outcome = self
            .dispatcher
            .text(&chapter.prompt, &[], TextFailure::Propagate)
            .await?;
        let text = outcome.into_text();
        self.cache.put(ArtifactCategory::Text, &fp, &text);
        Ok((text, Origin::Generated))
    }

    async fn chapter_image(&self, chapter: &ChapterDescriptor, key: &str) -> Option<ImageRef> {
        if let Some(url) = self.archive.resolve_image(key, Some(&chapter.title)).await {
            return Some(ImageRef {
                source: url,
                origin: Origin::StaticArchive,
            });
        }

        let description = fallback_description(&chapter.title);
        let fp = fingerprint(&description);
        if let Some(source) = self.cache.get(ArtifactCategory::Image, &fp) {
            return Some(ImageRef {
                source,
                origin: Origin::Cache,
            });
        }

        let source = self.dispatcher.image(&description).await?;
        self.cache.put(ArtifactCategory::Image, &fp, &source);
        Some(ImageRef {
            source,
            origin: Origin::Generated,
        })
    }

    async fn resolve_follow_up(
        &self,
        question: &str,
        history: &[HistoryTurn],
        token: &TurnToken,
    ) -> Result<Option<TurnResponse>> {
        let fp = fingerprint(&generation_input(question, history)?);

        let (raw, text_origin) = match self.cache.get(ArtifactCategory::Text, &fp) {
            Some(text) => (text, Origin::Cache),
            None => {
                let outcome = self
                    .dispatcher
                    .text(question, history, TextFailure::Fallback)
                    .await?;
                match outcome {
                    TextOutcome::Generated(text) => {
                        self.cache.put(ArtifactCategory::Text, &fp, &text);
                        (text, Origin::Generated)
                    }
                    // The fallback placeholder is never cached
                    TextOutcome::Fallback(text) => (text, Origin::Generated),
                }
            }
        };

        if !token.is_current() {
            return Ok(None);
        }

        let (text, directive) = extract_directive(&raw);
        let description = directive.unwrap_or_else(|| fallback_description(question));

        // Follow-up diagrams are always generated fresh; the result is
        // still written through under its own description fingerprint so a
        // later chapter-start lookup can reuse it.
        let image = match self.dispatcher.image(&description).await {
            Some(source) => {
                self.cache
                    .put(ArtifactCategory::Image, &fingerprint(&description), &source);
                Some(ImageRef {
                    source,
                    origin: Origin::Generated,
                })
            }
            None => None,
        };

        if !token.is_current() {
            return Ok(None);
        }

        Ok(Some(TurnResponse {
            text,
            text_origin,
            image,
        }))
    }
}

/// Canonical generation input: prompt plus the serialized history. The
/// fingerprint of this string is the text cache key.
pub(crate) fn generation_input(prompt: &str, history: &[HistoryTurn]) -> Result<String> {
    Ok(format!("{}\n{}", prompt, serde_json::to_string(history)?))
}

/// Split an embedded `[DIAGRAM: ...]` directive out of generated text.
/// Returns the display text with the directive removed, and the extracted
/// description if one was present.
pub fn extract_directive(text: &str) -> (String, Option<String>) {
    if let Some(open) = text.find(DIRECTIVE_OPEN) {
        if let Some(close_rel) = text[open..].find(DIRECTIVE_CLOSE) {
            let close = open + close_rel;
            let description = text[open + DIRECTIVE_OPEN.len()..close].trim().to_string();

            let mut display = String::with_capacity(text.len());
            display.push_str(&text[..open]);
            display.push_str(&text[close + DIRECTIVE_CLOSE.len_utf8()..]);
            let display = display.trim().to_string();

            if description.is_empty() {
                return (display, None);
            }
            return (display, Some(description));
        }
    }
    (text.trim().to_string(), None)
}

/// Generic diagram description used when the text carries no directive
pub(crate) fn fallback_description(request: &str) -> String {
    format!(
        "A diagram illustrating the mathematical ideas behind \"{}\"",
        request
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockBackend;
    use crate::diag::DiagnosticLog;
    use crate::generate::TEXT_FALLBACK;
    use tempfile::TempDir;

    struct Fixture {
        orchestrator: Orchestrator<MockBackend>,
        mock: MockBackend,
        _dir: TempDir,
    }

    fn fixture(archive_root: Option<String>, mock: MockBackend) -> Fixture {
        let dir = TempDir::new().unwrap();
        let diag = Arc::new(DiagnosticLog::new());
        let archive = StaticArchiveResolver::new(archive_root, diag.clone()).unwrap();
        let cache = Arc::new(ArtifactCache::at(dir.path().to_path_buf(), diag.clone()));
        let dispatcher = Arc::new(Dispatcher::new(Arc::new(mock.clone()), diag, "kore"));
        Fixture {
            orchestrator: Orchestrator::new(archive, cache, dispatcher),
            mock,
            _dir: dir,
        }
    }

    fn chapter(id: &str) -> ChapterDescriptor {
        ChapterDescriptor {
            id: id.to_string(),
            title: id.to_string(),
            prompt: format!("Begin our discussion of {}.", id),
        }
    }

    fn jpeg_bytes() -> Vec<u8> {
        let mut bytes = vec![0xFF, 0xD8, 0xFF, 0xE0];
        bytes.resize(256, 0x42);
        bytes
    }

    #[test]
    fn test_extract_directive() {
        let (text, directive) =
            extract_directive("Consider a circle.\n\n[DIAGRAM: a chalk circle with radius r]\n\nIts area grows as r squared.");
        assert_eq!(directive.as_deref(), Some("a chalk circle with radius r"));
        assert!(!text.contains("DIAGRAM"));
        assert!(text.starts_with("Consider a circle."));
        assert!(text.ends_with("r squared."));
    }

    #[test]
    fn test_extract_directive_absent() {
        let (text, directive) = extract_directive("Plain prose only.");
        assert_eq!(text, "Plain prose only.");
        assert!(directive.is_none());
    }

    #[test]
    fn test_extract_directive_empty_description() {
        let (text, directive) = extract_directive("Before [DIAGRAM: ] after");
        assert!(directive.is_none());
        assert_eq!(text, "Before  after".trim());
    }

    #[test]
    fn test_generation_input_is_deterministic() {
        let history = vec![HistoryTurn::user("q"), HistoryTurn::model("a")];
        let a = generation_input("prompt", &history).unwrap();
        let b = generation_input("prompt", &history).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, generation_input("prompt", &[]).unwrap());
    }

    // Chapter with no static text but a valid static image: text falls
    // through to generation, image is served statically, zero image calls.
    #[tokio::test]
    async fn test_chapter_start_static_image_generated_text() {
        let mut server = mockito::Server::new_async().await;
        let _image = server
            .mock("GET", "/images/einstein-diagram-Foundations.jpg")
            .with_status(200)
            .with_header("content-type", "image/jpeg")
            .with_body(jpeg_bytes())
            .expect_at_least(1)
            .create_async()
            .await;

        let mock = MockBackend::new().with_text("It begins with counting stones.");
        let f = fixture(Some(server.url()), mock);

        let request = TurnRequest::ChapterStart {
            chapter: chapter("Foundations"),
        };
        let token = f.orchestrator.begin_turn();
        let response = f.orchestrator.resolve_turn(&request, &token).await.unwrap().unwrap();

        assert_eq!(response.text, "It begins with counting stones.");
        assert_eq!(response.text_origin, Origin::Generated);
        let image = response.image.unwrap();
        assert_eq!(image.origin, Origin::StaticArchive);
        assert!(image.source.ends_with("einstein-diagram-Foundations.jpg"));

        let counts = f.mock.counts();
        assert_eq!(counts.text, 1);
        assert_eq!(counts.image, 0);
    }

    // Repeating the identical chapter start serves text from the cache and
    // makes zero additional backend calls.
    #[tokio::test]
    async fn test_chapter_start_is_idempotent() {
        let mut server = mockito::Server::new_async().await;
        let _image = server
            .mock("GET", "/images/einstein-diagram-Foundations.jpg")
            .with_status(200)
            .with_header("content-type", "image/jpeg")
            .with_body(jpeg_bytes())
            .expect_at_least(2)
            .create_async()
            .await;

        let mock = MockBackend::new().with_text("It begins with counting stones.");
        let f = fixture(Some(server.url()), mock);
        let request = TurnRequest::ChapterStart {
            chapter: chapter("Foundations"),
        };

        let token = f.orchestrator.begin_turn();
        let first = f.orchestrator.resolve_turn(&request, &token).await.unwrap().unwrap();

        let token = f.orchestrator.begin_turn();
        let second = f.orchestrator.resolve_turn(&request, &token).await.unwrap().unwrap();

        assert_eq!(first.text, second.text);
        assert_eq!(second.text_origin, Origin::Cache);
        assert_eq!(
            first.image.unwrap().source,
            second.image.unwrap().source
        );
        // Still exactly one generation call in total
        assert_eq!(f.mock.counts().text, 1);
        assert_eq!(f.mock.counts().image, 0);
    }

    // Static text hit does not gate the image pipeline and is never cached.
    #[tokio::test]
    async fn test_chapter_start_static_text_independent_image() {
        let mut server = mockito::Server::new_async().await;
        let transcript = "EINSTEIN: Ah, geometry. The Greeks drew their proofs in the sand, \
                          and we have been drawing ever since.";
        let _text = server
            .mock("GET", "/text/einstein-discussion-AncientGeometry.txt")
            .with_status(200)
            .with_header("content-type", "text/plain")
            .with_body(transcript)
            .create_async()
            .await;

        let mock = MockBackend::new();
        let f = fixture(Some(server.url()), mock);
        let request = TurnRequest::ChapterStart {
            chapter: chapter("Ancient Geometry"),
        };

        let token = f.orchestrator.begin_turn();
        let response = f.orchestrator.resolve_turn(&request, &token).await.unwrap().unwrap();

        assert_eq!(response.text_origin, Origin::StaticArchive);
        assert!(response.text.starts_with("Ah, geometry."));
        // No static image exists, so the image pipeline generated one
        let image = response.image.unwrap();
        assert_eq!(image.origin, Origin::Generated);

        let counts = f.mock.counts();
        assert_eq!(counts.text, 0);
        assert_eq!(counts.image, 1);
    }

    // A follow-up identical to an earlier one returns cached text with zero
    // text calls, but still triggers a fresh image generation.
    #[tokio::test]
    async fn test_follow_up_repeat_uses_cached_text_fresh_image() {
        let mock = MockBackend::new()
            .with_text("Infinity comes in sizes. [DIAGRAM: nested circles of aleph numbers]");
        let f = fixture(None, mock);

        let history = vec![HistoryTurn::user("earlier"), HistoryTurn::model("reply")];
        let request = TurnRequest::FollowUp {
            question: "How big is infinity?".to_string(),
            history: history.clone(),
        };

        let token = f.orchestrator.begin_turn();
        let first = f.orchestrator.resolve_turn(&request, &token).await.unwrap().unwrap();
        assert_eq!(first.text_origin, Origin::Generated);
        assert!(!first.text.contains("DIAGRAM"));
        assert!(first.image.is_some());

        let token = f.orchestrator.begin_turn();
        let second = f.orchestrator.resolve_turn(&request, &token).await.unwrap().unwrap();
        assert_eq!(second.text_origin, Origin::Cache);
        assert_eq!(first.text, second.text);

        let counts = f.mock.counts();
        assert_eq!(counts.text, 1);
        assert_eq!(counts.image, 2);

        // Both image calls used the directive extracted from the same text
        let descriptions = f.mock.captured().image_descriptions;
        assert!(descriptions[0].contains("nested circles"));
        assert_eq!(descriptions[0], descriptions[1]);
    }

    // Soft 404 on the static stage falls through to generation.
    #[tokio::test]
    async fn test_soft_404_falls_through_to_generation() {
        let mut server = mockito::Server::new_async().await;
        let _text = server
            .mock("GET", "/text/einstein-discussion-Foundations.txt")
            .with_status(200)
            .with_header("content-type", "text/html")
            .with_body("<html><body>404-ish</body></html>")
            .create_async()
            .await;

        let mock = MockBackend::new().with_text("Generated instead of archived.");
        let f = fixture(Some(server.url()), mock);
        let request = TurnRequest::ChapterStart {
            chapter: chapter("Foundations"),
        };

        let token = f.orchestrator.begin_turn();
        let response = f.orchestrator.resolve_turn(&request, &token).await.unwrap().unwrap();
        assert_eq!(response.text_origin, Origin::Generated);
        assert_eq!(f.mock.counts().text, 1);
    }

    // Follow-up text failure yields the fallback sentence, which must not
    // poison the cache.
    #[tokio::test]
    async fn test_follow_up_fallback_is_not_cached() {
        let mock = MockBackend::new().failing_text();
        let f = fixture(None, mock);
        let request = TurnRequest::FollowUp {
            question: "And then?".to_string(),
            history: vec![],
        };

        let token = f.orchestrator.begin_turn();
        let first = f.orchestrator.resolve_turn(&request, &token).await.unwrap().unwrap();
        assert_eq!(first.text, extract_directive(TEXT_FALLBACK).0);

        // Second identical request generates again instead of hitting a
        // cached placeholder
        let token = f.orchestrator.begin_turn();
        let _second = f.orchestrator.resolve_turn(&request, &token).await.unwrap().unwrap();
        assert_eq!(f.mock.counts().text, 2);
    }

    // Chapter-start text failure propagates so the caller can retry.
    #[tokio::test]
    async fn test_chapter_start_failure_propagates() {
        let mock = MockBackend::new().failing_text();
        let f = fixture(None, mock);
        let request = TurnRequest::ChapterStart {
            chapter: chapter("Foundations"),
        };

        let token = f.orchestrator.begin_turn();
        assert!(f.orchestrator.resolve_turn(&request, &token).await.is_err());
    }

    // A superseded token abandons the turn without a response.
    #[tokio::test]
    async fn test_stale_token_is_abandoned() {
        let mock = MockBackend::new();
        let f = fixture(None, mock);
        let request = TurnRequest::FollowUp {
            question: "still relevant?".to_string(),
            history: vec![],
        };

        let stale = f.orchestrator.begin_turn();
        let _current = f.orchestrator.begin_turn();

        let result = f.orchestrator.resolve_turn(&request, &stale).await.unwrap();
        assert!(result.is_none());
        // Abandoned before any backend work
        assert_eq!(f.mock.counts().text, 0);
    }
}
