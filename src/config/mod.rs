// ABOUTME: Configuration types and parsing for skiff.yml.
// ABOUTME: Every value that reaches a remote command is validated at load time.

mod deserialize;
mod healthcheck;
mod server;

pub use healthcheck::HealthcheckConfig;
pub use server::{DEFAULT_USER, ServerConfig};

use crate::error::{Error, Result};
use crate::exec::DEFAULT_COMMAND_TIMEOUT;
use crate::preflight::{EnvRequirement, MigrationLayout};
use crate::security::{
    validate_docker_command, validate_env_key, validate_health_path, validate_hook,
    validate_network_name, validate_relative_path, validate_remote_path, validate_server_name,
    validate_username,
};
use crate::ssh::ConnectOptions;
use crate::types::{AppName, ImageRef};
use deserialize::deserialize_servers;
use nonempty::NonEmpty;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

pub const CONFIG_FILENAME: &str = "skiff.yml";
pub const CONFIG_FILENAME_ALT: &str = "skiff.yaml";
pub const CONFIG_FILENAME_DIR: &str = ".skiff/config.yml";

pub const DEFAULT_BASE_DIR: &str = "/opt/skiff";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub app: AppName,

    /// Image repository; the release tag is applied unless a tag is pinned here.
    pub image: ImageRef,

    #[serde(deserialize_with = "deserialize_servers")]
    pub servers: NonEmpty<ServerConfig>,

    #[serde(default = "default_base_dir")]
    pub base_dir: String,

    #[serde(default = "default_network")]
    pub network: String,

    /// Path the shared tree is mounted at inside the container.
    #[serde(default = "default_app_root")]
    pub app_root: String,

    /// Non-root identity the application runs as, e.g. "33:33".
    #[serde(default)]
    pub container_user: Option<String>,

    #[serde(default = "default_env_file")]
    pub env_file: String,

    #[serde(default)]
    pub shared: SharedConfig,

    #[serde(default)]
    pub healthcheck: HealthcheckConfig,

    #[serde(default)]
    pub hooks: HooksConfig,

    #[serde(default)]
    pub database: Option<DatabaseConfig>,

    #[serde(default)]
    pub worker: Option<WorkerConfig>,

    /// Extra environment variables the application needs.
    #[serde(default)]
    pub required_env: Vec<EnvRequirement>,

    #[serde(default)]
    pub migrations: MigrationLayout,

    #[serde(default = "default_keep_releases")]
    pub keep_releases: usize,

    #[serde(default)]
    pub ssh: SshConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SharedConfig {
    #[serde(default)]
    pub dirs: Vec<String>,
    #[serde(default)]
    pub files: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HooksConfig {
    #[serde(default)]
    pub pre_deploy: Vec<String>,
    #[serde(default)]
    pub post_deploy: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// A managed database runs as `<app>-db` and its URL is provisioned for
    /// the application; an external one must be given as DATABASE_URL.
    #[serde(default = "default_true")]
    pub managed: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    pub command: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SshConfig {
    #[serde(default = "default_connect_timeout", with = "humantime_serde")]
    pub timeout: Duration,
    #[serde(default = "default_retries")]
    pub retries: u32,
    #[serde(default = "default_initial_delay", with = "humantime_serde")]
    pub initial_delay: Duration,
    #[serde(default = "default_max_delay", with = "humantime_serde")]
    pub max_delay: Duration,
    #[serde(default = "default_command_timeout", with = "humantime_serde")]
    pub command_timeout: Duration,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            timeout: default_connect_timeout(),
            retries: default_retries(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            command_timeout: default_command_timeout(),
        }
    }
}

impl SshConfig {
    pub fn connect_options(&self) -> ConnectOptions {
        ConnectOptions::default()
            .timeout(self.timeout)
            .max_retries(self.retries)
            .initial_delay(self.initial_delay)
            .max_delay(self.max_delay)
    }
}

fn default_base_dir() -> String {
    DEFAULT_BASE_DIR.to_string()
}

fn default_network() -> String {
    "skiff".to_string()
}

fn default_app_root() -> String {
    "/app".to_string()
}

fn default_env_file() -> String {
    ".env".to_string()
}

fn default_keep_releases() -> usize {
    5
}

fn default_true() -> bool {
    true
}

fn default_connect_timeout() -> Duration {
    ConnectOptions::default().timeout
}

fn default_retries() -> u32 {
    ConnectOptions::default().max_retries
}

fn default_initial_delay() -> Duration {
    ConnectOptions::default().initial_delay
}

fn default_max_delay() -> Duration {
    ConnectOptions::default().max_delay
}

fn default_command_timeout() -> Duration {
    DEFAULT_COMMAND_TIMEOUT
}

impl Config {
    /// Parse and validate.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn discover(dir: &Path) -> Result<Self> {
        let candidates = [
            dir.join(CONFIG_FILENAME),
            dir.join(CONFIG_FILENAME_ALT),
            dir.join(CONFIG_FILENAME_DIR),
        ];

        for path in &candidates {
            if path.exists() {
                return Self::load(path);
            }
        }

        Err(Error::ConfigNotFound(dir.to_path_buf()))
    }

    /// Run every security validator over values used in remote commands.
    pub fn validate(&self) -> Result<()> {
        validate_remote_path(&self.base_dir)?;
        validate_remote_path(&self.app_root)?;
        validate_network_name(&self.network)?;
        validate_relative_path(&self.env_file)?;
        validate_health_path(&self.healthcheck.path)?;

        for server in &self.servers {
            validate_server_name(&server.host)?;
            validate_username(server.user())?;
        }
        if let Some(user) = &self.container_user {
            validate_username(user)?;
        }
        for path in self.shared.dirs.iter().chain(&self.shared.files) {
            validate_relative_path(path)?;
        }
        for hook in self.hooks.pre_deploy.iter().chain(&self.hooks.post_deploy) {
            validate_hook(hook)?;
        }
        if let Some(worker) = &self.worker {
            validate_docker_command(&worker.command)?;
        }
        for requirement in &self.required_env {
            validate_env_key(&requirement.name)?;
        }
        self.migrations.validate()?;

        if self.keep_releases == 0 {
            return Err(Error::InvalidConfig(
                "keep_releases must be at least 1".to_string(),
            ));
        }
        if self.healthcheck.retries == 0 {
            return Err(Error::InvalidConfig(
                "healthcheck.retries must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// The database is configured but not managed by skiff.
    pub fn database_external(&self) -> bool {
        self.database.as_ref().is_some_and(|db| !db.managed)
    }
}
