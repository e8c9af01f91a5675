// ABOUTME: Rollback command implementation.
// ABOUTME: Re-activates an older release through the same phase pipeline as deploy.

use super::connection::{connect, disconnect, emit_warnings, select_servers};
use skiff::config::Config;
use skiff::deploy::{Deployer, RunOptions};
use skiff::diagnostics::Diagnostics;
use skiff::error::{Error, Result};
use skiff::output::{Output, OutputMode};
use skiff::types::ReleaseTag;
use std::io::{BufRead, IsTerminal, Write};
use tokio_util::sync::CancellationToken;

/// Ask on an interactive terminal; non-interactive runs proceed.
fn confirm(prompt: &str) -> Result<bool> {
    if !std::io::stdin().is_terminal() {
        return Ok(true);
    }
    print!("{prompt} [y/N] ");
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}

pub async fn rollback(
    config: Config,
    server_filter: Option<&str>,
    to: Option<&str>,
    options: RunOptions,
    cancel: CancellationToken,
    mut output: Output,
) -> Result<()> {
    let servers = select_servers(&config, server_filter)?;
    let target = to.map(ReleaseTag::new).transpose()?;

    let what = match &target {
        Some(tag) => format!("release {}", tag),
        None => "the previous release".to_string(),
    };
    if !options.yes
        && output.mode() == OutputMode::Normal
        && !confirm(&format!(
            "Restore {} of {} on {} server(s)?",
            what,
            config.app,
            servers.len()
        ))?
    {
        return Err(Error::Aborted);
    }

    output.start_timer();
    output.progress(&format!("Rolling back {} to {}", config.app, what));
    let mut diag = Diagnostics::default();

    for server in servers {
        let executor = connect(&config, server, &output).await?;
        let result = Deployer::new(&executor, &config, server.host.as_str())
            .options(options)
            .cancel_token(cancel.clone())
            .restore(target.clone())
            .await;
        disconnect(&executor, server, &mut diag).await;

        match result {
            Ok(report) => {
                for warning in &report.warnings {
                    output.warning(&warning.message);
                }
                output.progress(&format!(
                    "  ✓ {} restored on {} ({})",
                    report.release, server.host, report.image
                ));
            }
            Err(e) => {
                emit_warnings(&output, &diag);
                output.error(&format!("rollback on {} failed: {}", server.host, e));
                return Err(e.into());
            }
        }
    }

    emit_warnings(&output, &diag);
    output.success("Rollback complete!");
    Ok(())
}
