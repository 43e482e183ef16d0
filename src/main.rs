use chat_export::{Cli, Commands};
use clap::Parser;
use tracing_subscriber::EnvFilter;

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("chat_export={level}")));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .ok();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Chats => chat_export::commands::run_chats(),
        Commands::Export {
            chat,
            name,
            kind,
            fetch,
        } => chat_export::commands::run_export(chat, name, kind, &fetch),
        Commands::ExportAll {
            include_direct,
            fetch,
        } => chat_export::commands::run_export_all(include_direct, &fetch),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
