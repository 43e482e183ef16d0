pub mod cli;
pub mod commands;
pub mod error;
pub mod export;
pub mod fetcher;
pub mod model;
pub mod portal;
pub mod settings;
pub mod users;

use chrono::NaiveDate;

pub use cli::{Cli, Commands, FetchArgs};
pub use error::{AppError, Result};
pub use fetcher::{FetchOptions, FetchOutcome, PaginationMode, fetch_history};
pub use model::{ChatKind, ChatRef, DateRange, ExportBundle, FetchStatus, Message};
pub use settings::Settings;

pub const WEBHOOK_ENV: &str = "CHAT_EXPORT_WEBHOOK";

/// Progress reporting callback: `(current, total, label)`
pub type ProgressCallback<'a> = Option<&'a dyn Fn(usize, usize, &str)>;

/// Webhook base URL from the environment, falling back to settings.toml
pub fn load_webhook(settings: &Settings) -> Result<String> {
    match std::env::var(WEBHOOK_ENV) {
        Ok(url) if !url.trim().is_empty() => Ok(url.trim().to_string()),
        _ if !settings.portal.webhook.trim().is_empty() => {
            Ok(settings.portal.webhook.trim().to_string())
        }
        _ => Err(AppError::MissingWebhook),
    }
}

pub fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| AppError::InvalidDate(s.to_string()))
}
