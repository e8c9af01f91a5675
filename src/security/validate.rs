// ABOUTME: Allow-list validators for every value interpolated into a remote shell command.
// ABOUTME: Each validator checks length and character class and fails closed.

use thiserror::Error;

/// Sequences that must never appear in free-form console commands.
pub const FORBIDDEN_SEQUENCES: [&str; 11] =
    [";", "&&", "||", "|", "`", "$(", "${", ">", "<", "\n", "\r"];

const MAX_COMMAND_LEN: usize = 4096;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} cannot be empty")]
    Empty { field: &'static str },

    #[error("{field} exceeds maximum length of {max} characters")]
    TooLong { field: &'static str, max: usize },

    #[error("invalid character in {field}: {ch:?}")]
    InvalidChar { field: &'static str, ch: char },

    #[error("{field} {reason}")]
    InvalidFormat {
        field: &'static str,
        reason: &'static str,
    },

    #[error("{field} contains forbidden shell sequence {sequence:?}")]
    ForbiddenSequence {
        field: &'static str,
        sequence: &'static str,
    },
}

impl ValidationError {
    /// The semantic field the rejected value was meant for.
    pub fn field(&self) -> &'static str {
        match self {
            ValidationError::Empty { field }
            | ValidationError::TooLong { field, .. }
            | ValidationError::InvalidChar { field, .. }
            | ValidationError::InvalidFormat { field, .. }
            | ValidationError::ForbiddenSequence { field, .. } => field,
        }
    }
}

type Result<T = ()> = std::result::Result<T, ValidationError>;

fn check_length(field: &'static str, value: &str, max: usize) -> Result {
    if value.is_empty() {
        return Err(ValidationError::Empty { field });
    }
    if value.len() > max {
        return Err(ValidationError::TooLong { field, max });
    }
    Ok(())
}

fn check_chars(field: &'static str, value: &str, allowed: impl Fn(char) -> bool) -> Result {
    match value.chars().find(|&c| !allowed(c)) {
        Some(ch) => Err(ValidationError::InvalidChar { field, ch }),
        None => Ok(()),
    }
}

fn dns_label(field: &'static str, value: &str) -> Result {
    check_length(field, value, 63)?;
    check_chars(field, value, |c| {
        c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'
    })?;
    if value.starts_with('-') {
        return Err(ValidationError::InvalidFormat {
            field,
            reason: "cannot start with a hyphen",
        });
    }
    if value.ends_with('-') {
        return Err(ValidationError::InvalidFormat {
            field,
            reason: "cannot end with a hyphen",
        });
    }
    Ok(())
}

/// Application names double as container names and directory names.
pub fn validate_app_name(value: &str) -> Result {
    dns_label("app name", value)
}

/// A server host: DNS name or IPv4 address, as dot-separated labels.
pub fn validate_server_name(value: &str) -> Result {
    const FIELD: &str = "server name";
    check_length(FIELD, value, 253)?;
    for label in value.split('.') {
        if label.is_empty() {
            return Err(ValidationError::InvalidFormat {
                field: FIELD,
                reason: "cannot contain an empty label",
            });
        }
        check_length(FIELD, label, 63)?;
        check_chars(FIELD, label, |c| c.is_ascii_alphanumeric() || c == '-')?;
        if label.starts_with('-') || label.ends_with('-') {
            return Err(ValidationError::InvalidFormat {
                field: FIELD,
                reason: "labels cannot start or end with a hyphen",
            });
        }
    }
    Ok(())
}

/// Docker network names share the application grammar.
pub fn validate_network_name(value: &str) -> Result {
    dns_label("network name", value)
}

pub fn validate_release_tag(value: &str) -> Result {
    const FIELD: &str = "release tag";
    check_length(FIELD, value, 128)?;
    check_chars(FIELD, value, |c| {
        c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')
    })?;
    if !value.starts_with(|c: char| c.is_ascii_alphanumeric()) {
        return Err(ValidationError::InvalidFormat {
            field: FIELD,
            reason: "must start with a letter or digit",
        });
    }
    Ok(())
}

/// Accepts a POSIX user name or a numeric `uid[:gid]`.
pub fn validate_username(value: &str) -> Result {
    const FIELD: &str = "user";
    check_length(FIELD, value, 32)?;

    if value.starts_with(|c: char| c.is_ascii_digit()) {
        let mut parts = value.splitn(2, ':');
        let uid = parts.next().unwrap_or_default();
        let gid = parts.next();
        let numeric = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit());
        if numeric(uid) && gid.is_none_or(numeric) {
            return Ok(());
        }
        return Err(ValidationError::InvalidFormat {
            field: FIELD,
            reason: "must be a user name or numeric uid[:gid]",
        });
    }

    let name = value.strip_suffix('$').unwrap_or(value);
    if name.is_empty() {
        return Err(ValidationError::Empty { field: FIELD });
    }
    if !name.starts_with(|c: char| c.is_ascii_lowercase() || c == '_') {
        return Err(ValidationError::InvalidFormat {
            field: FIELD,
            reason: "must start with a lowercase letter or underscore",
        });
    }
    check_chars(FIELD, name, |c| {
        c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '_' | '-')
    })
}

pub fn validate_health_path(value: &str) -> Result {
    const FIELD: &str = "health path";
    check_length(FIELD, value, 512)?;
    if !value.starts_with('/') {
        return Err(ValidationError::InvalidFormat {
            field: FIELD,
            reason: "must start with '/'",
        });
    }
    if value.contains("..") {
        return Err(ValidationError::InvalidFormat {
            field: FIELD,
            reason: "cannot contain '..'",
        });
    }
    check_chars(FIELD, value, |c| {
        c.is_ascii_alphanumeric() || matches!(c, '/' | '.' | '_' | '~' | '%' | '-' | '?' | '=')
    })
}

/// Plain non-negative integers such as `--tail` counts.
pub fn validate_numeric(value: &str) -> Result {
    const FIELD: &str = "numeric argument";
    check_length(FIELD, value, 9)?;
    check_chars(FIELD, value, |c| c.is_ascii_digit())
}

/// Relative durations such as `30s`, `10m`, `1h30m` or bare seconds.
pub fn validate_duration(value: &str) -> Result {
    const FIELD: &str = "duration";
    check_length(FIELD, value, 32)?;
    check_chars(FIELD, value, |c| {
        c.is_ascii_digit() || matches!(c, 's' | 'm' | 'h' | 'd')
    })?;
    if value.chars().all(|c| c.is_ascii_digit()) {
        return Ok(());
    }

    let mut digits = 0;
    for c in value.chars() {
        if c.is_ascii_digit() {
            digits += 1;
        } else if digits == 0 {
            return Err(ValidationError::InvalidFormat {
                field: FIELD,
                reason: "every unit must follow a number",
            });
        } else {
            digits = 0;
        }
    }
    if digits != 0 {
        return Err(ValidationError::InvalidFormat {
            field: FIELD,
            reason: "must end with a unit (s, m, h, d)",
        });
    }
    Ok(())
}

pub fn validate_env_key(value: &str) -> Result {
    const FIELD: &str = "environment variable name";
    check_length(FIELD, value, 128)?;
    if !value.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_') {
        return Err(ValidationError::InvalidFormat {
            field: FIELD,
            reason: "must start with a letter or underscore",
        });
    }
    check_chars(FIELD, value, |c| c.is_ascii_alphanumeric() || c == '_')
}

fn path_chars(field: &'static str, value: &str) -> Result {
    check_length(field, value, 255)?;
    check_chars(field, value, |c| {
        c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '/' | '-')
    })?;
    if value.split('/').any(|segment| segment == "..") {
        return Err(ValidationError::InvalidFormat {
            field,
            reason: "cannot contain '..' segments",
        });
    }
    Ok(())
}

/// Paths below the shared directory (shared dirs and files).
pub fn validate_relative_path(value: &str) -> Result {
    const FIELD: &str = "shared path";
    path_chars(FIELD, value)?;
    if value.starts_with('/') || value.starts_with('-') {
        return Err(ValidationError::InvalidFormat {
            field: FIELD,
            reason: "must be relative and cannot start with '-'",
        });
    }
    Ok(())
}

/// Absolute directories on the remote host, such as the deploy base.
pub fn validate_remote_path(value: &str) -> Result {
    const FIELD: &str = "remote path";
    path_chars(FIELD, value)?;
    if !value.starts_with('/') {
        return Err(ValidationError::InvalidFormat {
            field: FIELD,
            reason: "must be absolute",
        });
    }
    Ok(())
}

fn free_form(field: &'static str, value: &str) -> Result {
    if value.trim().is_empty() {
        return Err(ValidationError::Empty { field });
    }
    if value.len() > MAX_COMMAND_LEN {
        return Err(ValidationError::TooLong {
            field,
            max: MAX_COMMAND_LEN,
        });
    }
    match FORBIDDEN_SEQUENCES.iter().find(|seq| value.contains(*seq)) {
        Some(sequence) => Err(ValidationError::ForbiddenSequence { field, sequence }),
        None => Ok(()),
    }
}

/// Commands a user asks to run inside a container (`skiff exec`).
pub fn validate_docker_command(value: &str) -> Result {
    free_form("command", value)
}

/// Deployment hooks from configuration.
pub fn validate_hook(value: &str) -> Result {
    free_form("hook", value)
}
