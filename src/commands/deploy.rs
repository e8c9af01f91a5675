// ABOUTME: Deploy command implementation.
// ABOUTME: Runs the blue-green pipeline on each selected server in turn.

use super::connection::{connect, disconnect, emit_warnings, select_servers};
use skiff::config::Config;
use skiff::deploy::{DeployReport, Deployer, RunOptions};
use skiff::diagnostics::Diagnostics;
use skiff::error::Result;
use skiff::output::{Output, OutputMode};
use skiff::security::validate_release_tag;
use skiff::types::{ImageRef, ReleaseTag};
use tokio_util::sync::CancellationToken;

/// Image to deploy: the `--tag` override, else the pinned reference, else `latest`.
pub fn resolve_image(image: &ImageRef, tag: Option<&str>) -> Result<ImageRef> {
    match tag {
        Some(tag) => {
            validate_release_tag(tag)?;
            Ok(image.with_tag(tag))
        }
        None if image.tag().is_some() || image.digest().is_some() => Ok(image.clone()),
        None => Ok(image.with_tag("latest")),
    }
}

pub async fn deploy(
    config: Config,
    server_filter: Option<&str>,
    tag: Option<&str>,
    options: RunOptions,
    cancel: CancellationToken,
    mut output: Output,
) -> Result<()> {
    let servers = select_servers(&config, server_filter)?;
    let image = resolve_image(&config.image, tag)?.to_string();
    let release = ReleaseTag::now();

    output.start_timer();
    output.progress(&format!(
        "Deploying {} ({}) as release {} to {} server(s)",
        config.app,
        image,
        release,
        servers.len()
    ));

    let mut diag = Diagnostics::default();
    let mut reports: Vec<DeployReport> = Vec::new();

    for server in servers {
        let executor = connect(&config, server, &output).await?;

        let mode = output.mode();
        let deployer = Deployer::new(&executor, &config, server.host.as_str())
            .options(options)
            .cancel_token(cancel.clone())
            .on_phase(move |phase| {
                if mode == OutputMode::Normal {
                    println!("  → {}", phase);
                }
            });
        let result = deployer.deploy(release.clone(), &image).await;
        disconnect(&executor, server, &mut diag).await;

        match result {
            Ok(report) => {
                for warning in &report.warnings {
                    output.warning(&warning.message);
                }
                output.progress(&format!("  ✓ {} is live on {}", report.release, server.host));
                reports.push(report);
            }
            Err(e) => {
                emit_warnings(&output, &diag);
                output.error(&format!("deployment to {} failed: {}", server.host, e));
                return Err(e.into());
            }
        }
    }

    emit_warnings(&output, &diag);
    output.success_with(
        &format!("Deployed {} release {}", config.app, release),
        Some(&reports),
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_override_replaces_tag() {
        let image = ImageRef::parse("registry.example.com/shop:v1").unwrap();
        let resolved = resolve_image(&image, Some("v2")).unwrap();
        assert_eq!(resolved.to_string(), "registry.example.com/shop:v2");
    }

    #[test]
    fn pinned_tag_is_kept_and_bare_image_gets_latest() {
        let pinned = ImageRef::parse("shop:v1").unwrap();
        assert_eq!(resolve_image(&pinned, None).unwrap().to_string(), "shop:v1");

        let bare = ImageRef::parse("shop").unwrap();
        assert_eq!(resolve_image(&bare, None).unwrap().to_string(), "shop:latest");
    }

    #[test]
    fn hostile_tag_is_rejected() {
        let image = ImageRef::parse("shop").unwrap();
        assert!(resolve_image(&image, Some("v1;rm -rf /")).is_err());
    }
}
