// ABOUTME: Validation and escaping for dynamically assembled remote shell commands.
// ABOUTME: Every externally influenced value passes through here before interpolation.

mod escape;
mod validate;

pub use escape::{
    generate_heredoc_delimiter, random_hex, sanitize_command_for_log, shell_escape,
};
pub use validate::{
    FORBIDDEN_SEQUENCES, ValidationError, validate_app_name, validate_docker_command,
    validate_duration, validate_env_key, validate_health_path, validate_hook,
    validate_network_name, validate_numeric, validate_relative_path, validate_release_tag,
    validate_remote_path, validate_server_name, validate_username,
};
