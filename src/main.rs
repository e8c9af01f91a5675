// ABOUTME: Entry point for the skiff CLI application.
// ABOUTME: Parses arguments, installs logging and dispatches to command handlers.

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use commands::load_config;
use skiff::deploy::RunOptions;
use skiff::error::Result;
use skiff::output::{Output, OutputMode};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, finishing current step");
            on_interrupt.cancel();
        }
    });

    if let Err(e) = run(cli, cancel).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli, cancel: CancellationToken) -> Result<()> {
    let config = load_config(cli.config.as_deref())?;
    let output = Output::new(OutputMode::from_flags(cli.quiet, cli.json));
    let options = RunOptions::default().yes(cli.yes);
    let server = cli.server.as_deref();

    match cli.command {
        Commands::Deploy { tag, force } => {
            commands::deploy(
                config,
                server,
                tag.as_deref(),
                options.force(force),
                cancel,
                output,
            )
            .await
        }
        Commands::Rollback { to, force } => {
            commands::rollback(config, server, to.as_deref(), options.force(force), cancel, output)
                .await
        }
        Commands::Exec {
            user,
            service,
            command,
        } => {
            commands::exec_command(config, server, user.as_deref(), service, &command, cancel, output)
                .await
        }
        Commands::Shell { user, service } => {
            commands::shell(config, server, user.as_deref(), service, cancel, output).await
        }
        Commands::Logs {
            tail,
            since,
            follow,
            service,
        } => {
            let options = commands::LogsOptions {
                tail: tail.as_deref(),
                since: since.as_deref(),
                follow,
            };
            commands::logs(config, server, service, options, cancel, output).await
        }
        Commands::Status => commands::status(config, server, cancel, output).await,
    }
}
