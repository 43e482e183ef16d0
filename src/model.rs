use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, TimeZone};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// A file attached to a message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    #[serde(rename = "filename")]
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub size: u64,
    pub url: String,
}

/// A single chat message as returned by the portal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub timestamp: DateTime<FixedOffset>,
    pub author_id: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        if self.attachments.is_empty() {
            MessageKind::Text
        } else {
            MessageKind::File
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Text,
    File,
}

/// Kind of conversation as listed by `im.recent.get`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ChatKind {
    GroupChat,
    OpenLine,
    Direct,
    Other,
}

impl ChatKind {
    pub fn label(&self) -> &'static str {
        match self {
            ChatKind::GroupChat => "group_chat",
            ChatKind::OpenLine => "open_line",
            ChatKind::Direct => "direct",
            ChatKind::Other => "other",
        }
    }
}

impl std::fmt::Display for ChatKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Reference to a conversation that can be exported
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRef {
    pub chat_id: String,
    pub title: String,
    pub kind: ChatKind,
}

impl ChatRef {
    /// The `DIALOG_ID` the messaging API expects for this conversation.
    /// Direct dialogs are addressed by the peer's user id, everything else
    /// by `chat{id}`.
    pub fn dialog_id(&self) -> String {
        match self.kind {
            ChatKind::Direct => self.chat_id.clone(),
            _ => format!("chat{}", self.chat_id),
        }
    }
}

/// How a fetch ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchStatus {
    Complete,
    Truncated,
    Failed,
}

impl std::fmt::Display for FetchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FetchStatus::Complete => "complete",
            FetchStatus::Truncated => "truncated",
            FetchStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// A message with its author resolved, as written to an export bundle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportedMessage {
    pub id: i64,
    pub timestamp: DateTime<FixedOffset>,
    pub author_id: String,
    pub author: String,
    pub text: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub attachments: Vec<Attachment>,
}

/// Everything exported for one conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportBundle {
    pub chat_id: String,
    pub chat_name: String,
    #[serde(rename = "type")]
    pub kind: ChatKind,
    pub status: FetchStatus,
    pub participants: Vec<String>,
    pub messages: Vec<ExportedMessage>,
}

/// Inclusive timestamp window used to filter messages.
///
/// Either bound may be open. Bounds built from calendar dates cover whole
/// days: `from` starts at midnight and `to` ends at the last nanosecond of
/// its day, both in the given offset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub from: Option<DateTime<FixedOffset>>,
    pub to: Option<DateTime<FixedOffset>>,
}

impl DateRange {
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn from_days(
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
        offset: FixedOffset,
    ) -> Result<Self> {
        if let (Some(f), Some(t)) = (from, to)
            && f > t
        {
            return Err(AppError::InvalidInput(format!(
                "start date {} is after end date {}",
                f, t
            )));
        }

        let start = match from {
            Some(day) => Some(local_datetime(offset, day, NaiveTime::MIN)?),
            None => None,
        };
        let end = match to {
            Some(day) => {
                let last = NaiveTime::from_hms_nano_opt(23, 59, 59, 999_999_999)
                    .ok_or_else(|| AppError::InvalidDate(day.to_string()))?;
                Some(local_datetime(offset, day, last)?)
            }
            None => None,
        };

        Ok(Self {
            from: start,
            to: end,
        })
    }

    pub fn is_unbounded(&self) -> bool {
        self.from.is_none() && self.to.is_none()
    }

    pub fn contains(&self, ts: &DateTime<FixedOffset>) -> bool {
        if let Some(from) = &self.from
            && ts < from
        {
            return false;
        }
        if let Some(to) = &self.to
            && ts > to
        {
            return false;
        }
        true
    }
}

fn local_datetime(
    offset: FixedOffset,
    day: NaiveDate,
    time: NaiveTime,
) -> Result<DateTime<FixedOffset>> {
    offset
        .from_local_datetime(&day.and_time(time))
        .single()
        .ok_or_else(|| AppError::InvalidDate(day.to_string()))
}
