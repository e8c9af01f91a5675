// ABOUTME: Private key resolution and host key trust policy.
// ABOUTME: Supports explicit paths, CI-injected content and default ~/.ssh locations.

use super::error::{Error, Result};
use russh::keys::known_hosts::{check_known_hosts_path, learn_known_hosts_path};
use russh::keys::{decode_secret_key, load_secret_key, ssh_key};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Private key content injected by CI.
pub const PRIVATE_KEY_ENV: &str = "SKIFF_SSH_PRIVATE_KEY";
/// known_hosts content injected by CI.
pub const KNOWN_HOSTS_ENV: &str = "SKIFF_KNOWN_HOSTS";
/// Explicit opt-out of host key verification (`1` or `true`).
pub const INSECURE_ENV: &str = "SKIFF_INSECURE_SKIP_HOST_KEY_CHECK";

const DEFAULT_KEYS: [&str; 3] = ["id_ed25519", "id_rsa", "id_ecdsa"];

fn ssh_dir() -> Option<PathBuf> {
    std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".ssh"))
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Resolve the private key: explicit path, then CI content, then defaults.
pub fn resolve_private_key(explicit: Option<&Path>) -> Result<Arc<ssh_key::PrivateKey>> {
    if let Some(path) = explicit {
        let key = load_secret_key(path, None).map_err(|e| Error::KeyLoadFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        tracing::debug!(path = %path.display(), "using configured private key");
        return Ok(Arc::new(key));
    }

    if let Some(content) = env_value(PRIVATE_KEY_ENV) {
        // CI secrets frequently arrive with literal "\n" sequences.
        let content = if !content.contains('\n') && content.contains("\\n") {
            content.replace("\\n", "\n")
        } else {
            content
        };
        let key = decode_secret_key(&content, None).map_err(|e| Error::KeyLoadFailed {
            path: PathBuf::from(format!("${}", PRIVATE_KEY_ENV)),
            reason: e.to_string(),
        })?;
        tracing::debug!("using private key from {}", PRIVATE_KEY_ENV);
        return Ok(Arc::new(key));
    }

    if let Some(dir) = ssh_dir() {
        for name in DEFAULT_KEYS {
            let path = dir.join(name);
            if !path.is_file() {
                continue;
            }
            match load_secret_key(&path, None) {
                Ok(key) => {
                    tracing::debug!(path = %path.display(), "using default private key");
                    return Ok(Arc::new(key));
                }
                Err(e) => {
                    tracing::debug!(path = %path.display(), error = %e, "skipping unusable key");
                }
            }
        }
    }

    Err(Error::KeyNotFound)
}

/// How server host keys are verified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostKeyPolicy {
    /// An OpenSSH known_hosts file, optionally learning unknown hosts.
    KnownHostsFile {
        path: PathBuf,
        trust_first_connection: bool,
    },
    /// known_hosts lines supplied through the environment.
    KnownHostsContent(String),
    /// Accept any host key. Only reachable through an explicit override.
    Insecure,
}

impl HostKeyPolicy {
    /// Pick a policy: known_hosts file, then CI content, then the insecure override.
    pub fn resolve(explicit: Option<&Path>, trust_first_connection: bool) -> Result<Self> {
        if let Some(path) = explicit {
            return Ok(HostKeyPolicy::KnownHostsFile {
                path: path.to_path_buf(),
                trust_first_connection,
            });
        }

        let default_path = ssh_dir().map(|dir| dir.join("known_hosts"));
        if let Some(path) = default_path.as_ref().filter(|p| p.is_file()) {
            return Ok(HostKeyPolicy::KnownHostsFile {
                path: path.clone(),
                trust_first_connection,
            });
        }

        if let Some(content) = env_value(KNOWN_HOSTS_ENV) {
            return Ok(HostKeyPolicy::KnownHostsContent(content));
        }

        if env_value(INSECURE_ENV).is_some_and(|v| matches!(v.trim(), "1" | "true")) {
            tracing::warn!(
                "{} is set: host key verification is DISABLED for this run",
                INSECURE_ENV
            );
            return Ok(HostKeyPolicy::Insecure);
        }

        match default_path {
            Some(path) if trust_first_connection => Ok(HostKeyPolicy::KnownHostsFile {
                path,
                trust_first_connection,
            }),
            _ => Err(Error::HostKeyUnverifiable),
        }
    }

    /// Verify the key a server presented. `Err` always means "do not connect".
    pub fn verify(&self, host: &str, port: u16, key: &ssh_key::PublicKey) -> Result<()> {
        let rejected = |reason: String| Error::HostKeyRejected {
            host: host.to_string(),
            port,
            reason,
        };

        match self {
            HostKeyPolicy::KnownHostsFile {
                path,
                trust_first_connection,
            } => match check_known_hosts_path(host, port, key, path) {
                Ok(true) => Ok(()),
                Err(russh::keys::Error::KeyChanged { line }) => Err(rejected(format!(
                    "key differs from {} line {}",
                    path.display(),
                    line
                ))),
                Ok(false) if *trust_first_connection => {
                    tracing::warn!(
                        "trusting first connection: learning host key for {}:{} into {}",
                        host,
                        port,
                        path.display()
                    );
                    if let Some(parent) = path.parent() {
                        std::fs::create_dir_all(parent)?;
                    }
                    learn_known_hosts_path(host, port, key, path)?;
                    Ok(())
                }
                Ok(false) => Err(rejected(format!("host not present in {}", path.display()))),
                Err(e) => Err(rejected(e.to_string())),
            },
            HostKeyPolicy::KnownHostsContent(content) => {
                match match_known_hosts(content, host, port, key) {
                    KnownHostMatch::Trusted => Ok(()),
                    KnownHostMatch::Mismatch => Err(rejected(format!(
                        "key does not match any {} entry for this host",
                        KNOWN_HOSTS_ENV
                    ))),
                    KnownHostMatch::Unknown => Err(rejected(format!(
                        "host not present in {}",
                        KNOWN_HOSTS_ENV
                    ))),
                }
            }
            HostKeyPolicy::Insecure => {
                tracing::debug!("accepting host key for {}:{} without verification", host, port);
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum KnownHostMatch {
    Trusted,
    /// The host is listed, but never with the presented key.
    Mismatch,
    Unknown,
}

/// Check known_hosts formatted content. Hashed entries and markers are skipped.
pub(crate) fn match_known_hosts(
    content: &str,
    host: &str,
    port: u16,
    key: &ssh_key::PublicKey,
) -> KnownHostMatch {
    let bracketed = format!("[{}]:{}", host, port);
    let mut listed = false;

    for line in content.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') || line.starts_with('@') {
            continue;
        }
        let mut fields = line.split_whitespace();
        let (Some(hosts), Some(algorithm), Some(data)) = (fields.next(), fields.next(), fields.next())
        else {
            continue;
        };
        if hosts.starts_with("|1|") {
            continue;
        }

        let host_matches = hosts
            .split(',')
            .any(|pattern| pattern == bracketed || (port == 22 && pattern == host));
        if !host_matches {
            continue;
        }
        listed = true;

        let Ok(known) = ssh_key::PublicKey::from_openssh(&format!("{} {}", algorithm, data)) else {
            continue;
        };
        if known.key_data() == key.key_data() {
            return KnownHostMatch::Trusted;
        }
    }

    if listed {
        KnownHostMatch::Mismatch
    } else {
        KnownHostMatch::Unknown
    }
}
