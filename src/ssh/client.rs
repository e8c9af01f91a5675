// ABOUTME: SSH connection management using russh.
// ABOUTME: Handles dialing with backoff, authentication, reconnects and channel creation.

use super::auth::{HostKeyPolicy, resolve_private_key};
use super::backoff::{Backoff, RetryError};
use super::error::{Error, Result};
use parking_lot::Mutex;
use russh::client::{self, Config, Handle, Msg};
use russh::keys::{PrivateKeyWithHashAlg, ssh_key};
use russh::{Channel, Disconnect};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// A remote host and the credentials used to reach it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerTarget {
    /// Remote host to connect to.
    pub host: String,
    /// SSH port (default: 22).
    pub port: u16,
    /// Username for authentication.
    pub user: String,
    /// Optional path to private key file.
    /// If None, falls back to SKIFF_SSH_PRIVATE_KEY then default key locations.
    pub key_path: Option<PathBuf>,
    /// Optional path to known_hosts file.
    /// If None, uses ~/.ssh/known_hosts when it exists.
    pub known_hosts_path: Option<PathBuf>,
    /// Learn unknown hosts into the known_hosts file (Trust On First Use).
    pub trust_first_connection: bool,
}

impl ServerTarget {
    pub fn new(host: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: 22,
            user: user.into(),
            key_path: None,
            known_hosts_path: None,
            trust_first_connection: false,
        }
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn key_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.key_path = Some(path.into());
        self
    }

    pub fn known_hosts_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.known_hosts_path = Some(path.into());
        self
    }

    pub fn trust_first_connection(mut self, trust: bool) -> Self {
        self.trust_first_connection = trust;
        self
    }
}

impl std::fmt::Display for ServerTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}:{}", self.user, self.host, self.port)
    }
}

/// Dial and retry settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectOptions {
    /// Bound on a single attempt: TCP connect, handshake and authentication.
    pub timeout: Duration,
    /// Total dial attempts before giving up.
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl ConnectOptions {
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn backoff(&self) -> Backoff {
        Backoff::new(self.max_retries, self.initial_delay, self.max_delay)
    }
}

/// SSH client handler for russh.
pub(crate) struct SshHandler {
    host: String,
    port: u16,
    policy: HostKeyPolicy,
    /// Why the server key was refused, if it was.
    rejection: Arc<Mutex<Option<Error>>>,
}

impl client::Handler for SshHandler {
    type Error = Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &ssh_key::PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        match self.policy.verify(&self.host, self.port, server_public_key) {
            Ok(()) => Ok(true),
            Err(e) => {
                tracing::error!("{}", e);
                *self.rejection.lock() = Some(e);
                Ok(false)
            }
        }
    }
}

/// Key material and trust policy resolved by the first successful connect.
struct ResolvedAuth {
    key: Arc<ssh_key::PrivateKey>,
    host_keys: HostKeyPolicy,
}

/// A managed SSH connection that can be re-established.
///
/// Lifecycle: `connect` → (`reconnect`)* → `close`. Owned by a single
/// deployment run; the internal locks only guard handle swaps.
pub struct Connection {
    target: ServerTarget,
    options: ConnectOptions,
    backoff: Backoff,
    auth: Mutex<Option<Arc<ResolvedAuth>>>,
    handle: Mutex<Option<Arc<Handle<SshHandler>>>>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("target", &self.target)
            .field("options", &self.options)
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl Connection {
    pub fn new(target: ServerTarget, options: ConnectOptions) -> Self {
        Self {
            backoff: options.backoff(),
            target,
            options,
            auth: Mutex::new(None),
            handle: Mutex::new(None),
        }
    }

    pub fn target(&self) -> &ServerTarget {
        &self.target
    }

    pub fn is_connected(&self) -> bool {
        self.handle
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_closed())
    }

    /// Resolve credentials and trust, then dial with backoff.
    pub async fn connect(&self) -> Result<()> {
        let auth = Arc::new(ResolvedAuth {
            key: resolve_private_key(self.target.key_path.as_deref())?,
            host_keys: HostKeyPolicy::resolve(
                self.target.known_hosts_path.as_deref(),
                self.target.trust_first_connection,
            )?,
        });

        self.dial(&auth).await?;
        *self.auth.lock() = Some(auth);
        Ok(())
    }

    /// Tear down any live session and dial again with the stored credentials.
    pub async fn reconnect(&self) -> Result<()> {
        let auth = self.auth.lock().clone().ok_or(Error::NotConnected)?;
        tracing::info!("reconnecting to {}", self.target);
        self.teardown().await;
        self.dial(&auth).await
    }

    /// Disconnect. Calling this more than once is a no-op.
    pub async fn close(&self) -> Result<()> {
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            tracing::debug!("disconnecting from {}", self.target);
            handle
                .disconnect(Disconnect::ByApplication, "", "en")
                .await
                .map_err(Error::Protocol)?;
        }
        Ok(())
    }

    /// Open a session channel, reconnecting once if the transport has failed.
    pub async fn open_channel(&self) -> Result<Channel<Msg>> {
        let handle = self.handle.lock().clone().ok_or(Error::NotConnected)?;

        if !handle.is_closed() {
            match handle.channel_open_session().await {
                Ok(channel) => return Ok(channel),
                Err(e) => {
                    tracing::warn!(error = %e, "failed to open channel on {}", self.target);
                }
            }
        }

        self.reconnect().await?;
        let handle = self.handle.lock().clone().ok_or(Error::NotConnected)?;
        handle
            .channel_open_session()
            .await
            .map_err(Error::ChannelOpen)
    }

    async fn teardown(&self) {
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle
                .disconnect(Disconnect::ByApplication, "", "en")
                .await
            {
                tracing::debug!(error = %e, "ignoring disconnect failure during teardown");
            }
        }
    }

    async fn dial(&self, auth: &ResolvedAuth) -> Result<()> {
        let result = self
            .backoff
            .retry(
                |attempt| async move {
                    tracing::debug!(attempt, "connecting to {}", self.target);
                    match tokio::time::timeout(self.options.timeout, self.dial_once(auth)).await {
                        Ok(result) => result,
                        Err(_) => Err(Error::ConnectTimeout(self.options.timeout)),
                    }
                },
                Error::is_retryable,
            )
            .await;

        match result {
            Ok(handle) => {
                tracing::info!("connected to {}", self.target);
                *self.handle.lock() = Some(Arc::new(handle));
                Ok(())
            }
            Err(RetryError::Permanent(e)) => Err(e),
            Err(RetryError::Exhausted { attempts, last }) => Err(Error::ConnectFailed {
                host: self.target.host.clone(),
                port: self.target.port,
                attempts,
                source: Box::new(last),
            }),
        }
    }

    async fn dial_once(&self, auth: &ResolvedAuth) -> Result<Handle<SshHandler>> {
        let config = Config {
            keepalive_interval: Some(Duration::from_secs(15)),
            keepalive_max: 3,
            ..Default::default()
        };

        let rejection = Arc::new(Mutex::new(None));
        let handler = SshHandler {
            host: self.target.host.clone(),
            port: self.target.port,
            policy: auth.host_keys.clone(),
            rejection: Arc::clone(&rejection),
        };

        let connected = client::connect(
            Arc::new(config),
            (self.target.host.as_str(), self.target.port),
            handler,
        )
        .await;

        let mut handle = match connected {
            Ok(handle) => handle,
            Err(e) => {
                if let Some(rejected) = rejection.lock().take() {
                    return Err(rejected);
                }
                return Err(match e {
                    Error::Protocol(russh::Error::IO(io))
                        if io.kind() == std::io::ErrorKind::ConnectionRefused =>
                    {
                        Error::Connection(format!(
                            "connection refused to {}:{}",
                            self.target.host, self.target.port
                        ))
                    }
                    other => other,
                });
            }
        };

        let hash_alg = handle.best_supported_rsa_hash().await?.flatten();
        let result = handle
            .authenticate_publickey(
                &self.target.user,
                PrivateKeyWithHashAlg::new(Arc::clone(&auth.key), hash_alg),
            )
            .await?;

        if !result.success() {
            return Err(Error::AuthenticationFailed(self.target.user.clone()));
        }

        Ok(handle)
    }
}
