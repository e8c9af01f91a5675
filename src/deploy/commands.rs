// ABOUTME: Builders for the remote shell commands a deployment issues.
// ABOUTME: Every interpolated value is single-quoted through shell_escape.

use crate::security::{generate_heredoc_delimiter, shell_escape};

/// Names of every container on the host, one per line.
pub fn list_containers() -> String {
    "docker ps -a --format '{{.Names}}'".to_string()
}

pub fn stop_container(name: &str) -> String {
    format!("docker stop --time 10 {}", shell_escape(name))
}

pub fn remove_container(name: &str) -> String {
    format!("docker rm -f {}", shell_escape(name))
}

pub fn rename_container(from: &str, to: &str) -> String {
    format!("docker rename {} {}", shell_escape(from), shell_escape(to))
}

pub fn ensure_network(network: &str) -> String {
    let network = shell_escape(network);
    format!(
        "docker network inspect {0} >/dev/null 2>&1 || docker network create {0}",
        network
    )
}

pub fn pull_image(image: &str) -> String {
    format!("docker pull {}", shell_escape(image))
}

pub fn mkdir_p(paths: &[String]) -> String {
    let mut command = String::from("mkdir -p");
    for path in paths {
        command.push(' ');
        command.push_str(&shell_escape(path));
    }
    command
}

/// Create `path` empty unless it already exists.
pub fn touch_if_absent(path: &str) -> String {
    let path = shell_escape(path);
    format!("[ -e {0} ] || touch {0}", path)
}

pub fn chown_recursive(owner: &str, path: &str) -> String {
    format!("chown -R {} {}", shell_escape(owner), shell_escape(path))
}

pub fn symlink(target: &str, link: &str) -> String {
    format!("ln -sfn {} {}", shell_escape(target), shell_escape(link))
}

/// Prints nothing when the link does not exist.
pub fn read_link(link: &str) -> String {
    format!("readlink {} 2>/dev/null || true", shell_escape(link))
}

/// Entries of `dir`, newest first.
pub fn list_by_mtime(dir: &str) -> String {
    format!("ls -1t {} 2>/dev/null || true", shell_escape(dir))
}

pub fn remove_tree(path: &str) -> String {
    format!("rm -rf {}", shell_escape(path))
}

pub fn read_file(path: &str) -> String {
    format!("cat {}", shell_escape(path))
}

/// Write `content` verbatim through a quoted heredoc.
///
/// The delimiter is random, so the content cannot end the document early.
pub fn write_file(path: &str, content: &str) -> String {
    let delimiter = generate_heredoc_delimiter("SKIFF_EOF");
    let mut body = content.to_string();
    if !body.ends_with('\n') {
        body.push('\n');
    }
    format!(
        "cat > {} << '{}'\n{}{}",
        shell_escape(path),
        delimiter,
        body,
        delimiter
    )
}

/// Arguments for a detached `docker run`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSpec {
    pub name: String,
    pub image: String,
    pub network: String,
    pub env_file: Option<String>,
    /// `(host path, container path)` bind mounts.
    pub mounts: Vec<(String, String)>,
    pub labels: Vec<(String, String)>,
    pub user: Option<String>,
    /// Run through `sh -c` instead of the image's default command.
    pub command: Option<String>,
}

impl RunSpec {
    pub fn new(name: impl Into<String>, image: impl Into<String>, network: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            network: network.into(),
            ..Default::default()
        }
    }

    pub fn env_file(mut self, path: impl Into<String>) -> Self {
        self.env_file = Some(path.into());
        self
    }

    pub fn mount(mut self, host: impl Into<String>, container: impl Into<String>) -> Self {
        self.mounts.push((host.into(), container.into()));
        self
    }

    pub fn label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.push((key.into(), value.into()));
        self
    }

    pub fn user(mut self, user: Option<String>) -> Self {
        self.user = user;
        self
    }

    pub fn command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    pub fn to_command(&self) -> String {
        let mut args = vec![
            "docker run -d".to_string(),
            format!("--name {}", shell_escape(&self.name)),
            format!("--network {}", shell_escape(&self.network)),
            "--restart unless-stopped".to_string(),
        ];
        if let Some(env_file) = &self.env_file {
            args.push(format!("--env-file {}", shell_escape(env_file)));
        }
        for (host, container) in &self.mounts {
            args.push(format!("-v {}", shell_escape(&format!("{}:{}", host, container))));
        }
        for (key, value) in &self.labels {
            args.push(format!("--label {}", shell_escape(&format!("{}={}", key, value))));
        }
        if let Some(user) = &self.user {
            args.push(format!("--user {}", shell_escape(user)));
        }
        args.push(shell_escape(&self.image));
        if let Some(command) = &self.command {
            args.push(format!("sh -c {}", shell_escape(command)));
        }
        args.join(" ")
    }
}
