use std::path::PathBuf;

use crate::cli::FetchArgs;
use crate::error::{AppError, Result};
use crate::export::{ExportPlan, ExportReport, export_chat};
use crate::fetcher::FetchOptions;
use crate::model::{ChatKind, ChatRef, DateRange, FetchStatus};
use crate::portal::{Directory, PortalClient};
use crate::settings::Settings;
use crate::users::UserNames;
use crate::{load_webhook, parse_date};

fn open_client(settings: &Settings) -> Result<PortalClient> {
    let webhook = load_webhook(settings)?;
    PortalClient::new(&webhook, settings.portal.timeout())
}

/// Merge command line flags over settings.toml
pub fn build_plan(settings: &Settings, args: &FetchArgs) -> Result<ExportPlan> {
    let from = args.from.as_deref().map(parse_date).transpose()?;
    let to = args.to.as_deref().map(parse_date).transpose()?;
    let range = DateRange::from_days(from, to, settings.fetch.offset()?)?;

    let fetch = FetchOptions {
        page_size: args.page_size.unwrap_or(settings.fetch.page_size),
        mode: args.mode.unwrap_or(settings.fetch.mode),
        range,
        max_messages: args.max_messages.unwrap_or(settings.fetch.max_messages),
        pause: settings.fetch.pause(),
    };
    fetch.validate()?;

    Ok(ExportPlan {
        fetch,
        format: args.format.unwrap_or(settings.export.format),
        output_dir: PathBuf::from(
            args.output_dir
                .clone()
                .unwrap_or_else(|| settings.export.output_dir.clone()),
        ),
    })
}

pub fn run_chats() -> Result<()> {
    let settings = Settings::load()?;
    let client = open_client(&settings)?;

    let chats = client.recent_chats()?;
    if chats.is_empty() {
        println!("No chats found.");
        return Ok(());
    }

    for chat in &chats {
        println!("{:>10}  {:<10}  {}", chat.chat_id, chat.kind, chat.title);
    }
    println!("{} chats.", chats.len());
    Ok(())
}

pub fn run_export(
    chat_id: String,
    name: Option<String>,
    kind: ChatKind,
    args: &FetchArgs,
) -> Result<()> {
    let settings = Settings::load()?;
    let plan = build_plan(&settings, args)?;
    let client = open_client(&settings)?;
    let mut names = UserNames::new(&client, settings.export.user_pause());

    let chat = ChatRef {
        title: name.unwrap_or_else(|| format!("chat {}", chat_id)),
        chat_id,
        kind,
    };

    println!("Exporting {} ({})...", chat.title, chat.kind);
    let report = export_chat(&client, &mut names, &chat, &plan, Some(&print_progress))?;
    print_report(&chat, &report);

    match report.error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

pub fn run_export_all(include_direct: bool, args: &FetchArgs) -> Result<()> {
    let settings = Settings::load()?;
    let plan = build_plan(&settings, args)?;
    let client = open_client(&settings)?;
    let mut names = UserNames::new(&client, settings.export.user_pause());

    let chats: Vec<ChatRef> = client
        .recent_chats()?
        .into_iter()
        .filter(|c| match c.kind {
            ChatKind::GroupChat | ChatKind::OpenLine => true,
            ChatKind::Direct => include_direct,
            ChatKind::Other => false,
        })
        .collect();

    println!("Exporting {} chats to {}...", chats.len(), plan.output_dir.display());

    let mut failed = 0;
    for chat in &chats {
        println!("Exporting {} ({})...", chat.title, chat.kind);
        match export_chat(&client, &mut names, chat, &plan, Some(&print_progress)) {
            Ok(report) => {
                print_report(chat, &report);
                if report.error.is_some() {
                    failed += 1;
                }
            }
            Err(e) => {
                eprintln!("  failed to write {}: {}", chat.title, e);
                failed += 1;
            }
        }
    }

    if failed > 0 {
        return Err(AppError::ExportFailed {
            failed,
            total: chats.len(),
        });
    }

    println!("Export completed successfully! {} chats exported.", chats.len());
    Ok(())
}

fn print_progress(pages: usize, messages: usize, _dialog_id: &str) {
    println!("  page {}: {} messages so far", pages, messages);
}

fn print_report(chat: &ChatRef, report: &ExportReport) {
    match report.status {
        FetchStatus::Complete => println!(
            "  saved {} ({} messages, {} participants)",
            report.path.display(),
            report.messages,
            report.participants
        ),
        FetchStatus::Truncated => println!(
            "  saved {} ({} messages, limit reached: history of {} beyond the limit not exported)",
            report.path.display(),
            report.messages,
            chat.title
        ),
        FetchStatus::Failed => {
            let reason = report
                .error
                .as_ref()
                .map(|e| e.to_string())
                .unwrap_or_default();
            eprintln!(
                "  fetch failed after {} messages, partial history saved to {}: {}",
                report.messages,
                report.path.display(),
                reason
            );
        }
    }
}
