//! Interactive discussion loop
//!
//! Wires the whole pipeline together: configuration, diagnostics, archive,
//! cache, live backend, resolution, and optional narration. One turn at a
//! time: pick or continue a chapter, resolve, display, narrate.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use chrono::Utc;
use colored::Colorize;
use dialoguer::{Input, Select, theme::ColorfulTheme};
use indicatif::{ProgressBar, ProgressStyle};

use crate::archive::StaticArchiveResolver;
use crate::backend::{HistoryTurn, LiveBackend};
use crate::cache::ArtifactCache;
use crate::chapters::{self, ChapterDescriptor};
use crate::cli::load_config;
use crate::config::BackendConfig;
use crate::diag::{DiagSink, DiagnosticLog};
use crate::error::{Error, Result};
use crate::generate::Dispatcher;
use crate::narrate::{Narrator, WavFileSink};
use crate::resolve::{Orchestrator, Origin, TurnRequest, TurnResponse};

/// Run the interactive chat command
pub async fn run(
    chapter_id: Option<&str>,
    narrate: bool,
    config_path: Option<&str>,
) -> Result<()> {
    let config = load_config(config_path)?;
    let backend_config = BackendConfig::from_config(&config)?;
    let backend = LiveBackend::new(&backend_config)?;

    let diag = Arc::new(DiagnosticLog::new());
    let archive = StaticArchiveResolver::new(config.archive_root(), diag.clone())?;
    let cache = Arc::new(ArtifactCache::new(diag.clone()));
    let dispatcher = Arc::new(Dispatcher::new(
        Arc::new(backend),
        diag.clone(),
        backend_config.voice.clone(),
    ));
    let orchestrator = Orchestrator::new(archive, cache, dispatcher.clone());

    let narrator = if narrate || config.preferences.narration {
        let sink = Arc::new(WavFileSink::new(data_dir()?.join("narration")));
        Some(Arc::new(Narrator::new(dispatcher, sink)))
    } else {
        None
    };

    let all_chapters = chapters::load()?;
    let chapter = select_chapter(&all_chapters, chapter_id)?.clone();

    println!(
        "\n{} {}\n",
        "Chapter:".bold(),
        chapter.title.bold().yellow()
    );

    let mut history: Vec<HistoryTurn> = Vec::new();
    let mut session = Session::new(diag.clone(), narrator);

    // Opening turn
    let request = TurnRequest::ChapterStart {
        chapter: chapter.clone(),
    };
    let token = orchestrator.begin_turn();
    let progress = spinner("Einstein is gathering his chalk...");
    let response = orchestrator.resolve_turn(&request, &token).await;
    progress.finish_and_clear();

    match response? {
        Some(response) => {
            history.push(HistoryTurn::user(chapter.prompt.clone()));
            history.push(HistoryTurn::model(response.text.clone()));
            session.present(&response);
        }
        None => return Ok(()),
    }

    // Follow-up loop
    loop {
        let line: String = Input::with_theme(&ColorfulTheme::default())
            .with_prompt("You")
            .allow_empty(true)
            .interact_text()?;
        let line = line.trim().to_string();

        if line.is_empty() {
            continue;
        }
        match line.as_str() {
            ":quit" | ":q" | "exit" => break,
            ":log" => {
                session.show_log();
                continue;
            }
            ":clear-log" => {
                session.diag.clear();
                println!("{}", "Diagnostic log cleared.".dimmed());
                continue;
            }
            ":stop" => {
                session.stop_narration();
                continue;
            }
            ":save" => {
                session.save_transcript(&chapter, &history)?;
                continue;
            }
            _ => {}
        }

        let request = TurnRequest::FollowUp {
            question: line.clone(),
            history: history.clone(),
        };
        let token = orchestrator.begin_turn();
        let progress = spinner("Einstein is thinking...");
        let response = orchestrator.resolve_turn(&request, &token).await;
        progress.finish_and_clear();

        match response {
            Ok(Some(response)) => {
                history.push(HistoryTurn::user(line));
                history.push(HistoryTurn::model(response.text.clone()));
                session.present(&response);
            }
            Ok(None) => continue,
            Err(err) => {
                eprintln!("{} {}", "✗".red(), err);
                continue;
            }
        }
    }

    session.stop_narration();
    println!("\n{}", "Auf Wiedersehen!".bold());
    Ok(())
}

/// Resolve the chapter to discuss: the --chapter flag when given, an
/// interactive picker otherwise.
fn select_chapter<'a>(
    chapters: &'a [ChapterDescriptor],
    chapter_id: Option<&str>,
) -> Result<&'a ChapterDescriptor> {
    if let Some(id) = chapter_id {
        return chapters::find(chapters, id).ok_or_else(|| {
            Error::Other(format!(
                "Unknown chapter '{}'. Run 'chalktalk chapters' to list them.",
                id
            ))
        });
    }

    let titles: Vec<&str> = chapters.iter().map(|c| c.title.as_str()).collect();
    let selection = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("Choose a chapter")
        .items(&titles)
        .default(0)
        .interact()?;
    Ok(&chapters[selection])
}

/// Per-chat presentation state
struct Session {
    diag: Arc<DiagnosticLog>,
    narrator: Option<Arc<Narrator<LiveBackend>>>,
    diagram_count: usize,
}

impl Session {
    fn new(diag: Arc<DiagnosticLog>, narrator: Option<Arc<Narrator<LiveBackend>>>) -> Self {
        Self {
            diag,
            narrator,
            diagram_count: 0,
        }
    }

    /// Print one resolved turn and kick off narration
    fn present(&mut self, response: &TurnResponse) {
        println!("\n{}", "EINSTEIN".bold().yellow());
        println!("{}\n", response.text);

        if let Some(image) = &response.image {
            match self.materialize_diagram(&image.source) {
                Ok(location) => println!(
                    "{} {} {}",
                    "◫ Diagram:".cyan(),
                    location,
                    origin_tag(image.origin).dimmed()
                ),
                Err(err) => log::warn!("could not save diagram: {}", err),
            }
        }
        println!("{}", origin_tag(response.text_origin).dimmed());

        if let Some(narrator) = &self.narrator {
            // Supersedes any narration still in flight
            narrator.stop();
            let narrator = narrator.clone();
            let text = response.text.clone();
            tokio::spawn(async move {
                narrator.narrate(&text).await;
            });
        }
    }

    /// Turn an image source into something the terminal user can open: a
    /// URL stays a URL, a data URI is decoded to a file.
    fn materialize_diagram(&mut self, source: &str) -> Result<String> {
        let Some((mime, data)) = parse_data_uri(source) else {
            return Ok(source.to_string());
        };

        let dir = data_dir()?.join("diagrams");
        std::fs::create_dir_all(&dir)?;
        self.diagram_count += 1;
        let name = format!(
            "diagram-{}-{:03}{}",
            Utc::now().format("%Y%m%d%H%M%S"),
            self.diagram_count,
            extension_for(&mime)
        );
        let path = dir.join(name);
        std::fs::write(&path, data)?;
        Ok(path.display().to_string())
    }

    fn show_log(&self) {
        let entries = self.diag.snapshot();
        if entries.is_empty() {
            println!("{}", "Diagnostic log is empty.".dimmed());
            return;
        }
        for entry in entries.iter().rev().take(20).rev() {
            println!(
                "{} [{}] {} {} ({} ms) {}",
                entry.timestamp.format("%H:%M:%S").to_string().dimmed(),
                entry.category.as_str(),
                entry.label,
                entry.outcome.as_str(),
                entry.elapsed_ms,
                entry.message.as_str().dimmed()
            );
        }
    }

    fn stop_narration(&self) {
        if let Some(narrator) = &self.narrator {
            if narrator.is_playing() {
                narrator.stop();
                println!("{}", "Narration stopped.".dimmed());
            }
        }
    }

    fn save_transcript(
        &self,
        chapter: &ChapterDescriptor,
        history: &[HistoryTurn],
    ) -> Result<()> {
        let dir = data_dir()?.join("transcripts");
        std::fs::create_dir_all(&dir)?;
        let path = dir.join(format!(
            "{}-{}.txt",
            chapter.id.replace(char::is_whitespace, "-").to_lowercase(),
            Utc::now().format("%Y%m%d%H%M%S")
        ));

        let mut out = format!("Chapter: {}\n\n", chapter.title);
        for turn in history {
            let speaker = match turn.role {
                crate::backend::Role::User => "YOU",
                crate::backend::Role::Model => "EINSTEIN",
            };
            out.push_str(&format!("{}: {}\n\n", speaker, turn.text));
        }
        std::fs::write(&path, out)?;
        println!("{} Transcript saved to {}", "✓".green(), path.display());
        Ok(())
    }
}

/// Application data directory (~/.chalktalk)
fn data_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| Error::Other("Could not determine home directory".to_string()))?;
    Ok(home.join(".chalktalk"))
}

fn origin_tag(origin: Origin) -> String {
    let tag = match origin {
        Origin::StaticArchive => "static archive",
        Origin::Cache => "cache",
        Origin::Generated => "generated",
    };
    format!("[{}]", tag)
}

/// Split a `data:<mime>;base64,<payload>` URI into its decoded parts
fn parse_data_uri(source: &str) -> Option<(String, Vec<u8>)> {
    let rest = source.strip_prefix("data:")?;
    let (mime, payload) = rest.split_once(";base64,")?;
    let data = BASE64.decode(payload).ok()?;
    Some((mime.to_string(), data))
}

fn extension_for(mime: &str) -> &'static str {
    match mime {
        "image/png" => ".png",
        _ => ".jpg",
    }
}

fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}
