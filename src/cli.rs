use clap::{Args, Parser, Subcommand};

use crate::export::OutputFormat;
use crate::fetcher::PaginationMode;
use crate::model::ChatKind;

#[derive(Parser)]
#[command(name = "chat-export")]
#[command(about = "Export chat history from a portal's messaging API to JSON or text files")]
pub struct Cli {
    /// Log every page request
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List recent group chats, open lines and direct dialogs
    Chats,

    /// Export a single conversation
    Export {
        /// Chat id (or user id for a direct dialog)
        #[arg(short, long)]
        chat: String,

        /// Display name written to the bundle, defaults to "chat <id>"
        #[arg(short, long)]
        name: Option<String>,

        /// Conversation kind
        #[arg(short, long, value_enum, default_value_t = ChatKind::GroupChat)]
        kind: ChatKind,

        #[command(flatten)]
        fetch: FetchArgs,
    },

    /// Export every group chat and open line listed by the portal
    ExportAll {
        /// Also export direct dialogs
        #[arg(long)]
        include_direct: bool,

        #[command(flatten)]
        fetch: FetchArgs,
    },
}

/// Flags shared by the export commands. Unset flags fall back to settings.toml.
#[derive(Args, Debug, Clone, Default)]
pub struct FetchArgs {
    /// Start date (YYYY-MM-DD), inclusive
    #[arg(short, long)]
    pub from: Option<String>,

    /// End date (YYYY-MM-DD), inclusive to the end of the day
    #[arg(short, long)]
    pub to: Option<String>,

    /// Pagination strategy
    #[arg(long, value_enum)]
    pub mode: Option<PaginationMode>,

    /// Messages requested per page
    #[arg(long)]
    pub page_size: Option<usize>,

    /// Stop after this many messages
    #[arg(long)]
    pub max_messages: Option<usize>,

    /// Output format
    #[arg(long, value_enum)]
    pub format: Option<OutputFormat>,

    /// Output directory
    #[arg(short, long)]
    pub output_dir: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_export() {
        let cli = Cli::parse_from([
            "chat-export",
            "export",
            "--chat",
            "42",
            "--kind",
            "open-line",
            "--from",
            "2024-01-15",
            "--to",
            "2024-01-20",
            "--mode",
            "cursor",
            "--page-size",
            "20",
            "--format",
            "txt",
        ]);

        match cli.command {
            Commands::Export {
                chat, kind, fetch, ..
            } => {
                assert_eq!(chat, "42");
                assert_eq!(kind, ChatKind::OpenLine);
                assert_eq!(fetch.from.as_deref(), Some("2024-01-15"));
                assert_eq!(fetch.to.as_deref(), Some("2024-01-20"));
                assert_eq!(fetch.mode, Some(PaginationMode::Cursor));
                assert_eq!(fetch.page_size, Some(20));
                assert_eq!(fetch.format, Some(OutputFormat::Txt));
                assert!(fetch.max_messages.is_none());
            }
            _ => panic!("expected export command"),
        }
    }

    #[test]
    fn test_parse_export_all_verbose() {
        let cli = Cli::parse_from(["chat-export", "export-all", "-v", "--include-direct"]);

        assert!(cli.verbose);
        assert!(matches!(
            cli.command,
            Commands::ExportAll {
                include_direct: true,
                ..
            }
        ));
    }

    #[test]
    fn test_export_requires_chat() {
        assert!(Cli::try_parse_from(["chat-export", "export"]).is_err());
    }
}
