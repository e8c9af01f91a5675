// ABOUTME: Shell quoting, heredoc delimiters and log-safe command rendering.
// ABOUTME: Used for values that must carry arbitrary content into a remote shell.

use rand::RngCore;
use rand::rngs::OsRng;

const MASK: &str = "****";

/// Quote a value as a single POSIX shell word.
///
/// The value is wrapped in single quotes and every embedded `'` becomes
/// `'\''`, so the shell sees exactly the original bytes.
pub fn shell_escape(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Hex encoding of `len` bytes from the operating system CSPRNG.
pub fn random_hex(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Delimiter for a quoted heredoc that user content cannot terminate early.
pub fn generate_heredoc_delimiter(prefix: &str) -> String {
    format!("{}_{}", prefix, random_hex(16))
}

/// Render a command for verbose logs with secret values masked.
///
/// Masks the value after `DATABASE_URL=`, after any `*_PASSWORD=` and the
/// password of a mysql-style `-p<password>` flag. This is a display helper
/// only; it offers no protection for the command itself.
pub fn sanitize_command_for_log(command: &str) -> String {
    let mut out = String::with_capacity(command.len());
    let mut mysql_client = false;
    let mut skip_until: Option<char> = None;

    for piece in command.split_inclusive(char::is_whitespace) {
        let token = piece.trim_end_matches(char::is_whitespace);
        let trailing = &piece[token.len()..];

        if let Some(quote) = skip_until {
            if token.contains(quote) {
                skip_until = None;
                out.push_str(trailing);
            }
            continue;
        }

        if let Some(prefix_len) = secret_prefix_len(token) {
            let value = &token[prefix_len..];
            out.push_str(&token[..prefix_len]);
            out.push_str(MASK);
            out.push_str(trailing);
            skip_until = unterminated_quote(value);
            continue;
        }

        if mysql_client && token.len() > 2 && token.starts_with("-p") {
            out.push_str("-p");
            out.push_str(MASK);
            out.push_str(trailing);
            continue;
        }

        let program = token.rsplit('/').next().unwrap_or(token);
        if program.starts_with("mysql") || program.starts_with("mariadb") {
            mysql_client = true;
        }

        out.push_str(piece);
    }

    out
}

/// Length of the `...KEY=` prefix when the token assigns a secret.
fn secret_prefix_len(token: &str) -> Option<usize> {
    const MARKERS: [&str; 2] = ["DATABASE_URL=", "_PASSWORD="];
    MARKERS
        .iter()
        .filter_map(|marker| token.find(marker).map(|pos| pos + marker.len()))
        .min()
}

/// The quote character a masked value opened without closing, if any.
fn unterminated_quote(value: &str) -> Option<char> {
    let quote = value.chars().next().filter(|c| *c == '\'' || *c == '"')?;
    let rest = &value[1..];
    if rest.contains(quote) { None } else { Some(quote) }
}
