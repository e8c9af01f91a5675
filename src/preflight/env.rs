// ABOUTME: Environment file parsing and required-variable checks.
// ABOUTME: Missing generatable secrets are filled with random values on the host.

use super::Result;
use crate::exec::Executor;
use crate::security::{random_hex, shell_escape, validate_env_key};
use serde::Deserialize;
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;

/// A variable the application needs in its env file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EnvRequirement {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// A random secret may be generated when the variable is missing.
    #[serde(default, rename = "generate")]
    pub can_generate: bool,
    /// Value the application falls back to; its presence satisfies the check.
    #[serde(default, rename = "default")]
    pub default_value: Option<String>,
}

impl EnvRequirement {
    pub fn new(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            can_generate: false,
            default_value: None,
        }
    }

    pub fn generated(mut self) -> Self {
        self.can_generate = true;
        self
    }

    pub fn with_default(mut self, value: &str) -> Self {
        self.default_value = Some(value.to_string());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvCheckResult {
    pub missing: Vec<EnvRequirement>,
    pub present: Vec<String>,
}

impl EnvCheckResult {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Parse `KEY=VALUE` lines. Comments, blank lines and `export ` are handled;
/// one pair of surrounding matching quotes is removed from values.
pub fn parse_env_file(content: &str) -> BTreeMap<String, String> {
    let mut vars = BTreeMap::new();

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        vars.insert(key.to_string(), unquote(value.trim()).to_string());
    }

    vars
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

/// Built-in requirements; DATABASE_URL only matters for external databases.
pub fn default_requirements(database_external: bool) -> Vec<EnvRequirement> {
    let mut requirements = vec![
        EnvRequirement::new("APP_ENV", "application environment").with_default("prod"),
        EnvRequirement::new("APP_SECRET", "secret used for signing").generated(),
    ];
    if database_external {
        requirements.push(EnvRequirement::new(
            "DATABASE_URL",
            "connection string of the external database",
        ));
    }
    requirements
}

/// Classify requirements against the env file on the remote host.
pub async fn check_env_vars<E: Executor + ?Sized>(
    executor: &E,
    cancel: &CancellationToken,
    env_path: &str,
    requirements: &[EnvRequirement],
) -> Result<EnvCheckResult> {
    let output = executor
        .exec(cancel, &format!("cat {} 2>/dev/null || true", shell_escape(env_path)))
        .await?;
    let vars = parse_env_file(&output.stdout);

    let mut result = EnvCheckResult::default();
    for requirement in requirements {
        let set = vars
            .get(&requirement.name)
            .is_some_and(|value| !value.is_empty());
        if set || requirement.default_value.is_some() {
            result.present.push(requirement.name.clone());
        } else {
            result.missing.push(requirement.clone());
        }
    }
    Ok(result)
}

/// Append random values for missing generatable variables.
///
/// Returns the requirements that the operator still has to provide.
pub async fn fill_generated<E: Executor + ?Sized>(
    executor: &E,
    cancel: &CancellationToken,
    env_path: &str,
    result: &EnvCheckResult,
) -> Result<Vec<EnvRequirement>> {
    let mut unresolved = Vec::new();

    for requirement in &result.missing {
        if !requirement.can_generate {
            unresolved.push(requirement.clone());
            continue;
        }
        validate_env_key(&requirement.name)?;

        let line = format!("{}={}", requirement.name, random_hex(32));
        executor
            .exec_checked(cancel, &append_line_command(env_path, &line))
            .await?;
        tracing::info!(variable = %requirement.name, "generated missing secret");
    }

    Ok(unresolved)
}

/// Append `line` to `path`, first terminating a last line that lacks a newline.
pub fn append_line_command(path: &str, line: &str) -> String {
    let path = shell_escape(path);
    format!(
        "[ -s {0} ] && [ -n \"$(tail -c 1 {0})\" ] && echo >> {0}; printf '%s\\n' {1} >> {0}",
        path,
        shell_escape(line)
    )
}
