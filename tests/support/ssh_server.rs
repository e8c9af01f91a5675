// ABOUTME: In-process SSH server with scripted commands for executor tests.
// ABOUTME: Uses the russh server API on a loopback port, keyed with the test fixture.

use russh::keys::ssh_key;
use russh::server::{Auth, Config, Msg, Server as _, Session};
use russh::{Channel, ChannelId, CryptoVec, Sig};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::net::TcpListener;

/// Commands the server understands:
///
/// - `echo <text>`: `<text>\n` on stdout, exit 0
/// - `warn <text>`: `<text>\n` on stderr, exit 0
/// - `both`: `out\n` on stdout and `err\n` on stderr, exit 0
/// - `exit <n>`: exit with status `n`
/// - `kill`: terminated by SIGKILL, no exit status
/// - `cat`: echoes stdin until EOF, then exit 0
/// - `drop`: the whole session is torn down mid-command
pub struct TestSshServer {
    pub port: u16,
    sessions: Arc<AtomicUsize>,
    known_hosts: tempfile::NamedTempFile,
}

impl TestSshServer {
    pub async fn start() -> Self {
        let host_key =
            russh::keys::load_secret_key(super::fixture("test_ed25519"), None).unwrap();
        let public = host_key.public_key().to_openssh().unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let known_hosts = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(known_hosts.path(), format!("[127.0.0.1]:{} {}\n", port, public)).unwrap();

        let config = Arc::new(Config {
            keys: vec![host_key],
            auth_rejection_time: std::time::Duration::from_millis(10),
            auth_rejection_time_initial: Some(std::time::Duration::ZERO),
            ..Default::default()
        });
        let sessions = Arc::new(AtomicUsize::new(0));
        let mut server = ScriptedServer {
            sessions: Arc::clone(&sessions),
        };
        tokio::spawn(async move {
            let _ = server.run_on_socket(config, &listener).await;
        });

        Self {
            port,
            sessions,
            known_hosts,
        }
    }

    /// known_hosts file trusting this server's host key.
    pub fn known_hosts(&self) -> &Path {
        self.known_hosts.path()
    }

    /// Sessions accepted so far; a reconnect adds one.
    pub fn sessions(&self) -> usize {
        self.sessions.load(Ordering::SeqCst)
    }
}

struct ScriptedServer {
    sessions: Arc<AtomicUsize>,
}

impl russh::server::Server for ScriptedServer {
    type Handler = ScriptedSession;

    fn new_client(&mut self, _: Option<std::net::SocketAddr>) -> ScriptedSession {
        self.sessions.fetch_add(1, Ordering::SeqCst);
        ScriptedSession
    }
}

struct ScriptedSession;

fn finish(session: &mut Session, channel: ChannelId, status: u32) -> Result<(), russh::Error> {
    session.exit_status_request(channel, status)?;
    session.eof(channel)?;
    session.close(channel)
}

impl russh::server::Handler for ScriptedSession {
    type Error = russh::Error;

    async fn auth_publickey(
        &mut self,
        _user: &str,
        _key: &ssh_key::PublicKey,
    ) -> Result<Auth, Self::Error> {
        Ok(Auth::Accept)
    }

    async fn channel_open_session(
        &mut self,
        _channel: Channel<Msg>,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        Ok(true)
    }

    async fn exec_request(
        &mut self,
        channel: ChannelId,
        data: &[u8],
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        let command = String::from_utf8_lossy(data).into_owned();
        session.channel_success(channel)?;

        let (name, arg) = command.split_once(' ').unwrap_or((command.as_str(), ""));
        match name {
            "echo" => {
                session.data(channel, CryptoVec::from(format!("{}\n", arg)))?;
                finish(session, channel, 0)
            }
            "warn" => {
                session.extended_data(channel, 1, CryptoVec::from(format!("{}\n", arg)))?;
                finish(session, channel, 0)
            }
            "both" => {
                session.data(channel, CryptoVec::from("out\n"))?;
                session.extended_data(channel, 1, CryptoVec::from("err\n"))?;
                finish(session, channel, 0)
            }
            "exit" => finish(session, channel, arg.parse().unwrap_or(1)),
            "kill" => {
                session.exit_signal_request(channel, Sig::KILL, false, "killed", "en")?;
                session.eof(channel)?;
                session.close(channel)
            }
            "cat" => Ok(()),
            "drop" => Err(russh::Error::Disconnect),
            _ => finish(session, channel, 127),
        }
    }

    async fn data(
        &mut self,
        channel: ChannelId,
        data: &[u8],
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        session.data(channel, CryptoVec::from(data))
    }

    async fn channel_eof(
        &mut self,
        channel: ChannelId,
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        finish(session, channel, 0)
    }
}
