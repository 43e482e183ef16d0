//! Paginated history fetch.
//!
//! Pulls every message of one dialog page by page, deduplicating by id,
//! filtering by an optional date window and stopping at a guard limit.
//! The upstream page size is not trusted: termination never relies on a
//! single signal from the server.

use std::collections::HashSet;
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{AppError, Result};
use crate::model::{DateRange, FetchStatus, Message};
use crate::portal::{Cursor, MessageSource, PageRequest};
use crate::ProgressCallback;

pub const DEFAULT_PAGE_SIZE: usize = 50;
pub const DEFAULT_MAX_MESSAGES: usize = 5000;
pub const DEFAULT_PAUSE: Duration = Duration::from_millis(300);

/// How consecutive pages are requested
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum PaginationMode {
    /// `OFFSET = page * page_size`, oldest first
    #[default]
    Offset,
    /// `LAST_ID = smallest id seen`, newest first
    Cursor,
}

#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub page_size: usize,
    pub mode: PaginationMode,
    pub range: DateRange,
    pub max_messages: usize,
    pub pause: Duration,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            mode: PaginationMode::default(),
            range: DateRange::unbounded(),
            max_messages: DEFAULT_MAX_MESSAGES,
            pause: DEFAULT_PAUSE,
        }
    }
}

impl FetchOptions {
    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(AppError::InvalidInput("page size must be positive".to_string()));
        }
        if self.max_messages == 0 {
            return Err(AppError::InvalidInput(
                "max messages must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Result of a fetch. `messages` holds whatever was accumulated, even when
/// `status` is `Failed`.
#[derive(Debug)]
pub struct FetchOutcome {
    pub messages: Vec<Message>,
    pub status: FetchStatus,
    pub error: Option<AppError>,
    pub pages: usize,
}

impl FetchOutcome {
    pub fn is_complete(&self) -> bool {
        self.status == FetchStatus::Complete
    }

    pub fn is_truncated(&self) -> bool {
        self.status == FetchStatus::Truncated
    }

    /// Drop the partial result of a failed fetch and surface its error
    pub fn into_result(self) -> Result<(Vec<Message>, FetchStatus)> {
        match self.error {
            Some(err) => Err(err),
            None => Ok((self.messages, self.status)),
        }
    }
}

pub fn fetch_history<S: MessageSource + ?Sized>(
    source: &S,
    dialog_id: &str,
    options: &FetchOptions,
) -> FetchOutcome {
    fetch_history_with_progress(source, dialog_id, options, None)
}

/// Fetch a dialog's history, reporting `(pages, accumulated, dialog_id)`
/// after every page
pub fn fetch_history_with_progress<S: MessageSource + ?Sized>(
    source: &S,
    dialog_id: &str,
    options: &FetchOptions,
    progress_callback: ProgressCallback,
) -> FetchOutcome {
    let mut run = FetchRun::new(options);

    if let Err(e) = options.validate() {
        return run.finish(FetchStatus::Failed, Some(e));
    }

    let mut cursor = match options.mode {
        PaginationMode::Offset => Cursor::Offset(0),
        PaginationMode::Cursor => Cursor::Before(None),
    };

    loop {
        if run.pages > 0 && !options.pause.is_zero() {
            thread::sleep(options.pause);
        }

        let request = PageRequest {
            limit: options.page_size,
            cursor,
        };
        let page = match source.fetch_page(dialog_id, &request) {
            Ok(page) => page,
            Err(e) => {
                warn!(dialog_id, page = run.pages, error = %e, "page request failed");
                return run.finish(FetchStatus::Failed, Some(e));
            }
        };
        run.pages += 1;

        let raw = page.messages.unwrap_or_default();
        if raw.is_empty() {
            debug!(dialog_id, page = run.pages, "empty page, history exhausted");
            return run.finish(FetchStatus::Complete, None);
        }

        let parsed = decode_page(dialog_id, &raw);
        if parsed.is_empty() {
            let err = AppError::MalformedPage(format!(
                "all {} records on page {} of {} are unreadable",
                raw.len(),
                run.pages,
                dialog_id
            ));
            return run.finish(FetchStatus::Failed, Some(err));
        }

        let merge = run.merge(parsed);
        debug!(
            dialog_id,
            page = run.pages,
            raw = raw.len(),
            new = merge.new_ids,
            accumulated = run.accepted.len(),
            "merged page"
        );

        if let Some(cb) = progress_callback {
            cb(run.pages, run.accepted.len(), dialog_id);
        }

        if merge.overflowed {
            return run.finish(FetchStatus::Truncated, None);
        }

        if merge.new_ids == 0 {
            debug!(dialog_id, page = run.pages, "page had no unseen ids, stopping");
            return run.finish(FetchStatus::Complete, None);
        }

        let next = match cursor {
            Cursor::Offset(offset) => {
                if raw.len() < options.page_size {
                    return run.finish(FetchStatus::Complete, None);
                }
                Cursor::Offset(offset + options.page_size)
            }
            Cursor::Before(previous) => {
                let Some(min_id) = merge.min_id else {
                    return run.finish(FetchStatus::Complete, None);
                };
                if previous.is_some_and(|p| min_id >= p) {
                    debug!(dialog_id, min_id, "cursor did not move, stopping");
                    return run.finish(FetchStatus::Complete, None);
                }
                Cursor::Before(Some(min_id))
            }
        };

        // A full quota alone is not truncation: the next page decides,
        // and `merge` flags overflow only for an unseen in-range message.
        cursor = next;
    }
}

/// Keep only the messages inside `range`
pub fn filter_by_range(messages: &[Message], range: &DateRange) -> Vec<Message> {
    messages
        .iter()
        .filter(|m| range.contains(&m.timestamp))
        .cloned()
        .collect()
}

fn decode_page(dialog_id: &str, raw: &[serde_json::Value]) -> Vec<Message> {
    raw.iter()
        .filter_map(|record| match crate::portal::decode_message(record) {
            Ok(msg) => Some(msg),
            Err(e) => {
                warn!(dialog_id, error = %e, "skipping malformed message");
                None
            }
        })
        .collect()
}

struct MergeReport {
    new_ids: usize,
    min_id: Option<i64>,
    overflowed: bool,
}

struct FetchRun<'a> {
    options: &'a FetchOptions,
    seen: HashSet<i64>,
    accepted: Vec<Message>,
    pages: usize,
}

impl<'a> FetchRun<'a> {
    fn new(options: &'a FetchOptions) -> Self {
        Self {
            options,
            seen: HashSet::new(),
            accepted: Vec::new(),
            pages: 0,
        }
    }

    fn merge(&mut self, parsed: Vec<Message>) -> MergeReport {
        let mut report = MergeReport {
            new_ids: 0,
            min_id: None,
            overflowed: false,
        };

        for msg in parsed {
            report.min_id = Some(report.min_id.map_or(msg.id, |m| m.min(msg.id)));

            if !self.seen.insert(msg.id) {
                continue;
            }
            report.new_ids += 1;

            if !self.options.range.contains(&msg.timestamp) {
                continue;
            }
            if self.accepted.len() >= self.options.max_messages {
                report.overflowed = true;
                break;
            }
            self.accepted.push(msg);
        }

        report
    }

    fn finish(mut self, status: FetchStatus, error: Option<AppError>) -> FetchOutcome {
        self.accepted.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.id.cmp(&b.id))
        });
        FetchOutcome {
            messages: self.accepted,
            status,
            error,
            pages: self.pages,
        }
    }
}
