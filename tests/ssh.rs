// ABOUTME: Integration tests for the SSH layer without a live server.
// ABOUTME: Covers key and host-trust resolution, dial retries and unconnected executors.

mod support;

use skiff::exec::{ExecError, Executor, RemoteExecutor, StreamMode};
use skiff::ssh::{
    ConnectOptions, Connection, Error, HostKeyPolicy, INSECURE_ENV, KNOWN_HOSTS_ENV,
    PRIVATE_KEY_ENV, ServerTarget, resolve_private_key,
};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn fixture_key_content() -> String {
    std::fs::read_to_string(support::fixture("test_ed25519")).unwrap()
}

/// Port on localhost with nothing listening.
fn closed_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// Run `f` with HOME pointing at an empty directory and no SKIFF_* overrides.
fn with_clean_env<R>(extra: &[(&str, Option<&str>)], f: impl FnOnce() -> R) -> R {
    let home = tempfile::tempdir().unwrap();
    let home_path = home.path().to_str().unwrap().to_string();
    let mut vars: Vec<(&str, Option<&str>)> = vec![
        ("HOME", Some(home_path.as_str())),
        (PRIVATE_KEY_ENV, None),
        (KNOWN_HOSTS_ENV, None),
        (INSECURE_ENV, None),
    ];
    for (name, value) in extra {
        vars.retain(|(existing, _)| existing != name);
        vars.push((*name, *value));
    }
    temp_env::with_vars(vars, f)
}

mod key_resolution {
    use super::*;

    #[test]
    fn explicit_path_wins() {
        with_clean_env(&[(PRIVATE_KEY_ENV, Some("garbage"))], || {
            assert!(resolve_private_key(Some(&support::fixture("test_ed25519"))).is_ok());
        });
    }

    #[test]
    fn unreadable_explicit_path_is_reported() {
        let err = resolve_private_key(Some(std::path::Path::new("/nonexistent/id_ed25519")))
            .unwrap_err();
        assert!(matches!(err, Error::KeyLoadFailed { .. }), "got {:?}", err);
    }

    #[test]
    fn key_content_from_environment() {
        let content = fixture_key_content();
        with_clean_env(&[(PRIVATE_KEY_ENV, Some(content.as_str()))], || {
            assert!(resolve_private_key(None).is_ok());
        });
    }

    #[test]
    fn escaped_newlines_in_environment_are_restored() {
        let content = fixture_key_content().replace('\n', "\\n");
        with_clean_env(&[(PRIVATE_KEY_ENV, Some(content.as_str()))], || {
            assert!(resolve_private_key(None).is_ok());
        });
    }

    #[test]
    fn invalid_environment_key_is_not_skipped() {
        with_clean_env(&[(PRIVATE_KEY_ENV, Some("not a key"))], || {
            assert!(matches!(
                resolve_private_key(None),
                Err(Error::KeyLoadFailed { .. })
            ));
        });
    }

    #[test]
    fn missing_key_everywhere() {
        with_clean_env(&[], || {
            assert!(matches!(resolve_private_key(None), Err(Error::KeyNotFound)));
        });
    }
}

mod host_trust {
    use super::*;

    #[test]
    fn explicit_known_hosts_file() {
        with_clean_env(&[], || {
            let policy =
                HostKeyPolicy::resolve(Some(std::path::Path::new("/etc/ssh/known")), false)
                    .unwrap();
            assert!(matches!(policy, HostKeyPolicy::KnownHostsFile { .. }));
        });
    }

    #[test]
    fn known_hosts_content_from_environment() {
        let line = "web1.example.com ssh-ed25519 AAAA";
        with_clean_env(&[(KNOWN_HOSTS_ENV, Some(line))], || {
            assert_eq!(
                HostKeyPolicy::resolve(None, false).unwrap(),
                HostKeyPolicy::KnownHostsContent(line.to_string())
            );
        });
    }

    #[test]
    fn insecure_requires_explicit_opt_in() {
        with_clean_env(&[(INSECURE_ENV, Some("1"))], || {
            assert_eq!(HostKeyPolicy::resolve(None, false).unwrap(), HostKeyPolicy::Insecure);
        });
        with_clean_env(&[(INSECURE_ENV, Some("yes"))], || {
            assert!(matches!(
                HostKeyPolicy::resolve(None, false),
                Err(Error::HostKeyUnverifiable)
            ));
        });
    }

    #[test]
    fn nothing_to_verify_against_fails_closed() {
        with_clean_env(&[], || {
            assert!(matches!(
                HostKeyPolicy::resolve(None, false),
                Err(Error::HostKeyUnverifiable)
            ));
        });
    }

    #[test]
    fn trust_first_connection_learns_into_default_file() {
        with_clean_env(&[], || {
            match HostKeyPolicy::resolve(None, true).unwrap() {
                HostKeyPolicy::KnownHostsFile {
                    path,
                    trust_first_connection,
                } => {
                    assert!(path.ends_with(".ssh/known_hosts"));
                    assert!(trust_first_connection);
                }
                other => panic!("expected known_hosts file policy, got {:?}", other),
            }
        });
    }
}

mod dialing {
    use super::*;

    fn target(port: u16, known_hosts: &std::path::Path) -> ServerTarget {
        ServerTarget::new("127.0.0.1", "deploy")
            .port(port)
            .key_path(support::fixture("test_ed25519"))
            .known_hosts_path(known_hosts)
    }

    fn fast_options(retries: u32) -> ConnectOptions {
        ConnectOptions::default()
            .timeout(Duration::from_secs(5))
            .max_retries(retries)
            .initial_delay(Duration::from_millis(1))
            .max_delay(Duration::from_millis(5))
    }

    /// Test: A refused port is retried until attempts run out.
    /// Expected: ConnectFailed reporting every attempt.
    #[tokio::test]
    async fn refused_connection_exhausts_retries() {
        support::init_tracing();
        let known_hosts = tempfile::NamedTempFile::new().unwrap();
        let port = closed_port();
        let connection = Connection::new(target(port, known_hosts.path()), fast_options(2));

        let err = connection.connect().await.unwrap_err();

        match err {
            Error::ConnectFailed {
                host,
                port: failed_port,
                attempts,
                ..
            } => {
                assert_eq!(host, "127.0.0.1");
                assert_eq!(failed_port, port);
                assert_eq!(attempts, 2);
            }
            other => panic!("expected ConnectFailed, got {:?}", other),
        }
        assert!(!connection.is_connected());
    }

    /// Test: Credential problems are reported before any dial.
    #[tokio::test]
    async fn missing_key_fails_without_retrying() {
        let known_hosts = tempfile::NamedTempFile::new().unwrap();
        let target = ServerTarget::new("127.0.0.1", "deploy")
            .port(closed_port())
            .key_path("/nonexistent/key")
            .known_hosts_path(known_hosts.path());
        let connection = Connection::new(target, fast_options(5));

        assert!(matches!(
            connection.connect().await,
            Err(Error::KeyLoadFailed { .. })
        ));
    }

    #[test]
    fn only_transient_errors_are_retryable() {
        assert!(Error::Connection("refused".to_string()).is_retryable());
        assert!(Error::ConnectTimeout(Duration::from_secs(1)).is_retryable());
        assert!(!Error::AuthenticationFailed("deploy".to_string()).is_retryable());
        assert!(!Error::HostKeyUnverifiable.is_retryable());
        assert!(!Error::KeyNotFound.is_retryable());
    }

    #[tokio::test]
    async fn executor_on_unconnected_connection_reports_transport_error() {
        let connection = Connection::new(
            ServerTarget::new("127.0.0.1", "deploy"),
            ConnectOptions::default(),
        );
        let exec = RemoteExecutor::new(connection);

        let err = exec
            .exec(&CancellationToken::new(), "true")
            .await
            .unwrap_err();
        assert!(
            matches!(err, ExecError::Transport(Error::NotConnected)),
            "got {:?}",
            err
        );
        assert!(exec.close().await.is_ok());
    }

    #[tokio::test]
    async fn cancelled_executor_does_not_touch_the_transport() {
        let connection = Connection::new(
            ServerTarget::new("127.0.0.1", "deploy"),
            ConnectOptions::default(),
        );
        let exec = RemoteExecutor::new(connection);
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert!(matches!(
            exec.exec(&cancel, "true").await,
            Err(ExecError::Cancelled)
        ));
    }
}

mod remote_execution {
    use super::*;
    use support::ssh_server::TestSshServer;

    async fn connected(server: &TestSshServer) -> RemoteExecutor {
        support::init_tracing();
        let target = ServerTarget::new("127.0.0.1", "deploy")
            .port(server.port)
            .key_path(support::fixture("test_ed25519"))
            .known_hosts_path(server.known_hosts());
        let options = ConnectOptions::default()
            .timeout(Duration::from_secs(10))
            .initial_delay(Duration::from_millis(10));
        let connection = Connection::new(target, options);
        connection.connect().await.unwrap();
        RemoteExecutor::new(connection)
    }

    /// Test: A command's output comes back with its exit status.
    #[tokio::test]
    async fn connect_and_execute_echo() {
        let server = TestSshServer::start().await;
        let exec = connected(&server).await;

        let result = exec.exec(&CancellationToken::new(), "echo hello").await.unwrap();

        assert_eq!(result.stdout, "hello\n");
        assert!(result.stderr.is_empty());
        assert_eq!(result.exit_code, 0);
        exec.close().await.unwrap();
        exec.close().await.unwrap();
    }

    #[tokio::test]
    async fn stdout_and_stderr_are_kept_apart() {
        let server = TestSshServer::start().await;
        let exec = connected(&server).await;
        let cancel = CancellationToken::new();

        let result = exec.exec(&cancel, "both").await.unwrap();
        assert_eq!(result.stdout, "out\n");
        assert_eq!(result.stderr, "err\n");

        let result = exec.exec(&cancel, "warn disk almost full").await.unwrap();
        assert!(result.stdout.is_empty());
        assert_eq!(result.stderr, "disk almost full\n");
    }

    /// Test: Non-zero exits are results, not transport errors.
    #[tokio::test]
    async fn nonzero_exit_code() {
        let server = TestSshServer::start().await;
        let exec = connected(&server).await;

        let result = exec.exec(&CancellationToken::new(), "exit 42").await.unwrap();

        assert_eq!(result.exit_code, 42);
        let err = result.error().unwrap();
        assert!(err.to_string().contains("42"));
    }

    #[tokio::test]
    async fn exit_signal_maps_to_255() {
        let server = TestSshServer::start().await;
        let exec = connected(&server).await;

        let result = exec.exec(&CancellationToken::new(), "kill").await.unwrap();

        assert_eq!(result.exit_code, 255);
    }

    /// Test: A session lost mid-command fails that command only.
    /// Expected: The next command reconnects once and succeeds.
    #[tokio::test]
    async fn lost_session_heals_on_next_command() {
        let server = TestSshServer::start().await;
        let exec = connected(&server).await;
        let cancel = CancellationToken::new();
        assert_eq!(server.sessions(), 1);

        assert!(exec.exec(&cancel, "drop").await.is_err());

        let result = exec.exec(&cancel, "echo back").await.unwrap();
        assert_eq!(result.stdout, "back\n");
        assert_eq!(server.sessions(), 2);
        assert!(exec.connection().is_connected());
    }

    #[tokio::test]
    async fn interactive_stream_forwards_stdin() {
        let server = TestSshServer::start().await;
        let exec = connected(&server).await;
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();

        let code = exec
            .exec_piped(
                &CancellationToken::new(),
                "cat",
                StreamMode::Interactive,
                &b"ping\n"[..],
                &mut stdout,
                &mut stderr,
            )
            .await
            .unwrap();

        assert_eq!(code, 0);
        assert_eq!(stdout, b"ping\n");
        assert!(stderr.is_empty());
    }

    #[tokio::test]
    async fn follow_stream_splits_output_and_reports_exit() {
        let server = TestSshServer::start().await;
        let exec = connected(&server).await;
        let cancel = CancellationToken::new();
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();

        let code = exec
            .exec_piped(&cancel, "both", StreamMode::Follow, &b""[..], &mut stdout, &mut stderr)
            .await
            .unwrap();
        assert_eq!(code, 0);
        assert_eq!(stdout, b"out\n");
        assert_eq!(stderr, b"err\n");

        let code = exec
            .exec_piped(&cancel, "exit 7", StreamMode::Follow, &b""[..], &mut stdout, &mut stderr)
            .await
            .unwrap();
        assert_eq!(code, 7);
    }
}
