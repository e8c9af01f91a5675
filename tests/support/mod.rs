// ABOUTME: Test support utilities.
// ABOUTME: Tracing setup, config fixtures and scripted hosts for orchestration tests.

#[allow(dead_code)]
pub mod ssh_server;

use skiff::config::Config;
use skiff::exec::{ExecResult, RecordingExecutor};
use std::path::PathBuf;
use std::sync::Once;

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for tests. Safe to call multiple times.
#[allow(dead_code)]
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        let filter = EnvFilter::from_default_env()
            .add_directive("skiff=debug".parse().unwrap())
            .add_directive("russh=debug".parse().unwrap());
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

pub const BASE_CONFIG: &str = r#"
app: shop
image: registry.example.com/shop
servers:
  - deploy@web1.example.com
healthcheck:
  path: /health
  port: 8080
  retries: 3
  interval: 10ms
  timeout: 5s
"#;

/// [`BASE_CONFIG`] with `extra` appended as further top-level keys.
#[allow(dead_code)]
pub fn config(extra: &str) -> Config {
    Config::from_yaml(&format!("{}{}", BASE_CONFIG, extra)).expect("test config should parse")
}

#[allow(dead_code)]
pub const IMAGE: &str = "registry.example.com/shop:v2";

/// Make the host answer as a healthy Docker host with `shop` serving.
///
/// Register test-specific replies before calling this: the first matching
/// script wins.
#[allow(dead_code)]
pub fn script_healthy_host(exec: &RecordingExecutor) {
    exec.on("docker ps -a", ExecResult::ok("shop\nshop-db\n"));
    exec.on(
        "readlink",
        ExecResult::ok("/opt/skiff/apps/shop/releases/20240101000000\n"),
    );
    exec.on(".State.Running", ExecResult::ok("true\n"));
    exec.on("http_code", ExecResult::ok("200\n"));
}

/// Position of the first recorded command containing `needle`.
#[allow(dead_code)]
pub fn position(commands: &[String], needle: &str) -> Option<usize> {
    commands.iter().position(|c| c.contains(needle))
}

#[allow(dead_code)]
pub fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}
