// ABOUTME: Property and scenario tests for command safety and preflight checks.
// ABOUTME: Validators must fail closed and escaping must survive a POSIX shell unchanged.

use proptest::prelude::*;
use skiff::exec::{ExecResult, RecordingExecutor};
use skiff::preflight::{
    EnvRequirement, MigrationCheckResult, MigrationLayout, check_env_vars, check_migrations,
    fill_generated, parse_env_file, warn_once_if_needed,
};
use std::process::Command;
use skiff::security::*;
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;

/// Undo POSIX single-quote escaping the way `sh` reads a word.
fn shell_unquote(word: &str) -> Option<String> {
    let mut out = String::new();
    let mut chars = word.chars();
    let mut quoted = false;
    while let Some(c) = chars.next() {
        match (quoted, c) {
            (true, '\'') => quoted = false,
            (true, c) => out.push(c),
            (false, '\'') => quoted = true,
            (false, '\\') => out.push(chars.next()?),
            // Anything else outside quotes would be interpreted by the shell.
            (false, _) => return None,
        }
    }
    (!quoted).then_some(out)
}

const METACHARACTERS: [char; 14] = [
    ';', '|', '&', '$', '`', '>', '<', ' ', '\n', '\'', '"', '(', ')', '\\',
];

type Validator = fn(&str) -> Result<(), ValidationError>;

const IDENTIFIER_VALIDATORS: [(&str, Validator); 10] = [
    ("app name", validate_app_name),
    ("server name", validate_server_name),
    ("network name", validate_network_name),
    ("release tag", validate_release_tag),
    ("user", validate_username),
    ("health path", validate_health_path),
    ("numeric", validate_numeric),
    ("duration", validate_duration),
    ("env key", validate_env_key),
    ("relative path", validate_relative_path),
];

proptest! {
    #[test]
    fn shell_escape_round_trips(value in any::<String>()) {
        let escaped = shell_escape(&value);
        prop_assert_eq!(shell_unquote(&escaped), Some(value));
    }

    #[test]
    fn identifier_validators_reject_metacharacters(
        prefix in "[a-z0-9/]{0,8}",
        meta in prop::sample::select(METACHARACTERS.to_vec()),
        suffix in "[a-z0-9]{1,8}",
    ) {
        let value = format!("{}{}{}", prefix, meta, suffix);
        for (name, validate) in IDENTIFIER_VALIDATORS {
            prop_assert!(validate(&value).is_err(), "{} accepted {:?}", name, value);
        }
        let path = format!("/{}", value);
        prop_assert!(validate_remote_path(&path).is_err());
    }

    #[test]
    fn free_form_validators_reject_forbidden_sequences(
        before in "[a-z :/-]{0,16}",
        sequence in prop::sample::select(FORBIDDEN_SEQUENCES.to_vec()),
        after in "[a-z :/-]{0,16}",
    ) {
        let value = format!("run{}{}{}", before, sequence, after);
        prop_assert!(validate_hook(&value).is_err());
        prop_assert!(validate_docker_command(&value).is_err());
    }

    #[test]
    fn accepted_app_names_are_plain_dns_labels(value in "\\PC{0,70}") {
        if validate_app_name(&value).is_ok() {
            prop_assert!(!value.is_empty() && value.len() <= 63);
            prop_assert!(value.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'));
        }
    }
}

#[test]
fn app_name_rejects_injection() {
    assert!(validate_app_name("app;rm -rf /").is_err());
    assert!(validate_app_name("my-app-1").is_ok());
}

#[test]
fn env_file_parsing_keeps_only_assignments() {
    let vars = parse_env_file("APP_ENV=prod\n# comment\nAPP_SECRET=\"abc def\"\n");
    let expected: BTreeMap<String, String> = [
        ("APP_ENV".to_string(), "prod".to_string()),
        ("APP_SECRET".to_string(), "abc def".to_string()),
    ]
    .into_iter()
    .collect();
    assert_eq!(vars, expected);
}

#[test]
fn migration_problem_needs_entities_without_migrations() {
    assert!(MigrationCheckResult::new(0, 5).has_potential_problem);
    assert!(!MigrationCheckResult::new(3, 5).has_potential_problem);
}

#[test]
fn log_sanitizing_masks_only_the_database_url() {
    let command = "docker run -d --name shop -e APP_ENV=prod -e DATABASE_URL=mysql://shop:pw@shop-db/shop registry.example.com/shop:v2";
    let sanitized = sanitize_command_for_log(command);
    assert_eq!(
        sanitized,
        "docker run -d --name shop -e APP_ENV=prod -e DATABASE_URL=**** registry.example.com/shop:v2"
    );
    assert!(!sanitized.contains("pw@"));
}

#[tokio::test]
async fn migration_counts_come_from_the_candidate_container() {
    let exec = RecordingExecutor::new();
    exec.once("find", ExecResult::ok("5\n0\n"))
        .once("find", ExecResult::ok("5\n3\n"));
    let cancel = CancellationToken::new();
    let layout = MigrationLayout::default();

    let first = check_migrations(&exec, &cancel, "shop-new", &layout).await.unwrap();
    assert_eq!(first.entity_file_count, 5);
    assert!(first.has_potential_problem);

    let second = check_migrations(&exec, &cancel, "shop-new", &layout).await.unwrap();
    assert!(!second.has_potential_problem);

    assert!(exec.commands()[0].starts_with("docker exec 'shop-new' sh -c "));
}

#[tokio::test]
async fn garbled_migration_output_is_an_error() {
    let exec = RecordingExecutor::new();
    exec.on("find", ExecResult::ok("find: not found\n"));
    let result = check_migrations(
        &exec,
        &CancellationToken::new(),
        "shop-new",
        &MigrationLayout::default(),
    )
    .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn migration_warning_is_shown_once() {
    let exec = RecordingExecutor::new();
    let cancel = CancellationToken::new();
    let marker = "/opt/skiff/apps/shop/.migration-warning";
    let problem = MigrationCheckResult::new(0, 5);

    exec.once("test -e", ExecResult::failed(1, ""));
    assert!(warn_once_if_needed(&exec, &cancel, marker, &problem).await.unwrap());
    exec.on("test -e", ExecResult::ok(""));
    assert!(!warn_once_if_needed(&exec, &cancel, marker, &problem).await.unwrap());

    let clean = MigrationCheckResult::new(2, 5);
    assert!(!warn_once_if_needed(&exec, &cancel, marker, &clean).await.unwrap());
    assert_eq!(exec.commands_containing("touch").len(), 1);
    assert_eq!(exec.commands_containing("rm -f").len(), 1);
}

#[tokio::test]
async fn missing_secrets_are_generated_and_others_reported() {
    let exec = RecordingExecutor::new();
    exec.on("cat", ExecResult::ok("APP_ENV=prod\n"));
    let cancel = CancellationToken::new();
    let env_path = "/opt/skiff/apps/shop/shared/.env";

    let requirements = vec![
        EnvRequirement::new("APP_SECRET", "signing secret").generated(),
        EnvRequirement::new("MAILER_DSN", "mail transport"),
        EnvRequirement::new("APP_ENV", "environment"),
    ];
    let result = check_env_vars(&exec, &cancel, env_path, &requirements).await.unwrap();
    assert_eq!(result.present, vec!["APP_ENV"]);
    assert_eq!(result.missing.len(), 2);

    let unresolved = fill_generated(&exec, &cancel, env_path, &result).await.unwrap();
    assert_eq!(unresolved.len(), 1);
    assert_eq!(unresolved[0].name, "MAILER_DSN");

    let appended = exec.commands_containing(">>");
    assert_eq!(appended.len(), 1);
    assert!(appended[0].contains("'APP_SECRET="));
    assert!(appended[0].ends_with(">> '/opt/skiff/apps/shop/shared/.env'"));
}

/// Let `fill_generated` append to a real file through `sh`, starting from `initial`.
async fn append_secret_through_sh(initial: &str) -> String {
    let dir = tempfile::tempdir().unwrap();
    let env_path = dir.path().join(".env");
    std::fs::write(&env_path, initial).unwrap();
    let env_path = env_path.to_str().unwrap();

    let exec = RecordingExecutor::new();
    exec.on("cat", ExecResult::ok(initial));
    let cancel = CancellationToken::new();
    let requirements = vec![EnvRequirement::new("APP_SECRET", "signing secret").generated()];
    let result = check_env_vars(&exec, &cancel, env_path, &requirements).await.unwrap();
    fill_generated(&exec, &cancel, env_path, &result).await.unwrap();

    for command in exec.commands_containing(">>") {
        let status = Command::new("sh").arg("-c").arg(&command).status().unwrap();
        assert!(status.success(), "{} failed", command);
    }
    std::fs::read_to_string(env_path).unwrap()
}

#[tokio::test]
async fn generated_secret_starts_its_own_line() {
    let content = append_secret_through_sh("APP_ENV=prod").await;
    let vars = parse_env_file(&content);
    assert_eq!(vars["APP_ENV"], "prod");
    assert_eq!(vars["APP_SECRET"].len(), 64);
    assert!(content.ends_with('\n'));
}

#[tokio::test]
async fn terminated_env_file_gets_no_blank_line() {
    let content = append_secret_through_sh("APP_ENV=prod\n").await;
    assert_eq!(content.lines().count(), 2);
    assert!(content.starts_with("APP_ENV=prod\nAPP_SECRET="));

    let content = append_secret_through_sh("").await;
    assert_eq!(content.lines().count(), 1);
    assert!(content.starts_with("APP_SECRET="));
}
