// ABOUTME: Deployment target configuration.
// ABOUTME: Parses "host", "user@host", "host:port" and "user@host:port" plus detailed maps.

use crate::ssh::ServerTarget;
use serde::Deserialize;
use std::path::PathBuf;

pub const DEFAULT_USER: &str = "root";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub key_path: Option<PathBuf>,
    #[serde(default)]
    pub known_hosts_path: Option<PathBuf>,
    #[serde(default)]
    pub trust_first_connection: bool,
}

fn default_port() -> u16 {
    22
}

impl ServerConfig {
    pub fn parse(s: &str) -> Result<Self, String> {
        let s = s.trim();
        if s.is_empty() {
            return Err("server address cannot be empty".to_string());
        }

        let (user, rest) = match s.split_once('@') {
            Some((user, rest)) => (Some(user), rest),
            None => (None, s),
        };

        let (host, port) = match rest.rsplit_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse::<u16>()
                    .map_err(|_| format!("invalid port: {}", port))?;
                (host, port)
            }
            None => (rest, default_port()),
        };

        if host.is_empty() {
            return Err("hostname cannot be empty".to_string());
        }
        if user == Some("") {
            return Err("user cannot be empty".to_string());
        }

        Ok(ServerConfig {
            host: host.to_string(),
            port,
            user: user.map(str::to_string),
            key_path: None,
            known_hosts_path: None,
            trust_first_connection: false,
        })
    }

    pub fn user(&self) -> &str {
        self.user.as_deref().unwrap_or(DEFAULT_USER)
    }

    /// Connection target for the SSH layer.
    pub fn target(&self) -> ServerTarget {
        let mut target = ServerTarget::new(&self.host, self.user())
            .port(self.port)
            .trust_first_connection(self.trust_first_connection);
        if let Some(path) = &self.key_path {
            target = target.key_path(expand_home(path));
        }
        if let Some(path) = &self.known_hosts_path {
            target = target.known_hosts_path(expand_home(path));
        }
        target
    }
}

/// Expand a leading `~/` using `$HOME`.
fn expand_home(path: &std::path::Path) -> PathBuf {
    match (path.strip_prefix("~"), std::env::var_os("HOME")) {
        (Ok(rest), Some(home)) => PathBuf::from(home).join(rest),
        _ => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_address() {
        let server = ServerConfig::parse("deploy@web1.example.com:2222").unwrap();
        assert_eq!(server.host, "web1.example.com");
        assert_eq!(server.port, 2222);
        assert_eq!(server.user(), "deploy");
        assert!(!server.trust_first_connection);
    }

    #[test]
    fn parse_host_only_uses_defaults() {
        let server = ServerConfig::parse("10.0.0.5").unwrap();
        assert_eq!(server.port, 22);
        assert_eq!(server.user(), DEFAULT_USER);
    }

    #[test]
    fn parse_rejects_bad_input() {
        assert!(ServerConfig::parse("").is_err());
        assert!(ServerConfig::parse("host:notaport").is_err());
        assert!(ServerConfig::parse("@host").is_err());
        assert!(ServerConfig::parse("deploy@:22").is_err());
    }

    #[test]
    fn target_carries_connection_settings() {
        let mut server = ServerConfig::parse("deploy@example.com:2200").unwrap();
        server.key_path = Some(PathBuf::from("/keys/deploy"));
        let target = server.target();
        assert_eq!(target.to_string(), "deploy@example.com:2200");
        assert_eq!(target.key_path, Some(PathBuf::from("/keys/deploy")));
    }

    #[test]
    fn home_is_expanded() {
        temp_env::with_var("HOME", Some("/home/ci"), || {
            assert_eq!(
                expand_home(std::path::Path::new("~/.ssh/deploy")),
                PathBuf::from("/home/ci/.ssh/deploy")
            );
        });
    }
}
