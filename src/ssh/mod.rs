// ABOUTME: SSH connection manager for remote deployment targets.
// ABOUTME: Key-based authentication, host key trust, bounded backoff and reconnects.

mod auth;
mod backoff;
mod client;
mod error;

pub use auth::{HostKeyPolicy, INSECURE_ENV, KNOWN_HOSTS_ENV, PRIVATE_KEY_ENV, resolve_private_key};
pub use backoff::{Backoff, RetryError};
pub use client::{ConnectOptions, Connection, ServerTarget};
pub use error::{Error, Result};
