use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{AppError, Result};
use crate::fetcher::{FetchOptions, fetch_history_with_progress};
use crate::model::{ChatRef, ExportBundle, ExportedMessage, FetchStatus, Message};
use crate::portal::{Directory, MessageSource};
use crate::users::UserNames;
use crate::ProgressCallback;

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum OutputFormat {
    #[default]
    Json,
    Txt,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Txt => "txt",
        }
    }
}

/// Where and how a conversation gets exported
#[derive(Debug, Clone)]
pub struct ExportPlan {
    pub fetch: FetchOptions,
    pub format: OutputFormat,
    pub output_dir: PathBuf,
}

/// What one `export_chat` call produced
#[derive(Debug)]
pub struct ExportReport {
    pub path: PathBuf,
    pub messages: usize,
    pub participants: usize,
    pub status: FetchStatus,
    /// Set when the fetch failed; the file then holds the partial history
    pub error: Option<AppError>,
}

/// Fetch one conversation, resolve its authors and write the bundle.
///
/// A failed fetch still writes what was accumulated, marked `failed`, and
/// hands the fetch error back in the report. Only write errors are
/// returned as `Err`.
pub fn export_chat<S, D>(
    source: &S,
    names: &mut UserNames<'_, D>,
    chat: &ChatRef,
    plan: &ExportPlan,
    progress_callback: ProgressCallback,
) -> Result<ExportReport>
where
    S: MessageSource + ?Sized,
    D: Directory + ?Sized,
{
    let dialog_id = chat.dialog_id();
    info!(chat_id = %chat.chat_id, dialog_id = %dialog_id, title = %chat.title, "exporting chat");

    let outcome = fetch_history_with_progress(source, &dialog_id, &plan.fetch, progress_callback);
    let status = outcome.status;
    if let Some(e) = &outcome.error {
        warn!(chat_id = %chat.chat_id, error = %e, kept = outcome.messages.len(), "fetch failed");
    }

    let bundle = build_bundle(chat, outcome.messages, status, names);
    let path = write_bundle(&plan.output_dir, &bundle, plan.format)?;

    info!(
        chat_id = %chat.chat_id,
        messages = bundle.messages.len(),
        %status,
        path = %path.display(),
        "chat exported"
    );

    Ok(ExportReport {
        path,
        messages: bundle.messages.len(),
        participants: bundle.participants.len(),
        status,
        error: outcome.error,
    })
}

/// Resolve authors and assemble the bundle for one conversation.
/// `messages` must already be in chronological order.
pub fn build_bundle<D: Directory + ?Sized>(
    chat: &ChatRef,
    messages: Vec<Message>,
    status: FetchStatus,
    names: &mut UserNames<'_, D>,
) -> ExportBundle {
    let mut participants = BTreeSet::new();

    let messages: Vec<ExportedMessage> = messages
        .into_iter()
        .map(|msg| {
            let author = names.resolve(&msg.author_id);
            participants.insert(author.clone());
            let kind = msg.kind();
            ExportedMessage {
                id: msg.id,
                timestamp: msg.timestamp,
                author_id: msg.author_id,
                author,
                text: msg.text,
                kind,
                attachments: msg.attachments,
            }
        })
        .collect();

    ExportBundle {
        chat_id: chat.chat_id.clone(),
        chat_name: chat.title.clone(),
        kind: chat.kind,
        status,
        participants: participants.into_iter().collect(),
        messages,
    }
}

pub fn bundle_path(dir: &Path, chat_id: &str, format: OutputFormat) -> PathBuf {
    dir.join(format!("chat_{}_export.{}", chat_id, format.extension()))
}

/// Write the bundle into `dir` in the given format, returning the file path
pub fn write_bundle(dir: &Path, bundle: &ExportBundle, format: OutputFormat) -> Result<PathBuf> {
    fs::create_dir_all(dir).map_err(|e| AppError::WriteFile {
        path: dir.display().to_string(),
        source: e,
    })?;

    let path = bundle_path(dir, &bundle.chat_id, format);
    match format {
        OutputFormat::Json => write_json(&path, bundle)?,
        OutputFormat::Txt => write_transcript(&path, bundle)?,
    }
    Ok(path)
}

fn write_json<T: Serialize>(path: &Path, data: &T) -> Result<()> {
    let file = create_file(path)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, data)
        .map_err(|e| AppError::JsonSerialize(e.to_string()))?;
    writer.flush().map_err(|e| AppError::WriteFile {
        path: path.display().to_string(),
        source: e,
    })
}

fn write_transcript(path: &Path, bundle: &ExportBundle) -> Result<()> {
    let file = create_file(path)?;
    let mut writer = BufWriter::new(file);
    render_transcript(&mut writer, bundle)
        .and_then(|_| writer.flush())
        .map_err(|e| AppError::WriteFile {
            path: path.display().to_string(),
            source: e,
        })
}

/// Plain-text rendering: a short header then one line per message
pub fn render_transcript<W: Write>(out: &mut W, bundle: &ExportBundle) -> std::io::Result<()> {
    writeln!(out, "# {} ({})", bundle.chat_name, bundle.kind)?;
    writeln!(out, "participants: {}", bundle.participants.join(", "))?;
    writeln!(out, "status: {}", bundle.status)?;
    writeln!(out)?;

    for msg in &bundle.messages {
        writeln!(
            out,
            "[{}] {}: {}",
            msg.timestamp.to_rfc3339(),
            msg.author,
            msg.text
        )?;
        for file in &msg.attachments {
            writeln!(
                out,
                "  attachment: {} ({}, {} bytes) {}",
                file.name, file.kind, file.size, file.url
            )?;
        }
    }
    Ok(())
}

fn create_file(path: &Path) -> Result<File> {
    File::create(path).map_err(|e| AppError::WriteFile {
        path: path.display().to_string(),
        source: e,
    })
}
