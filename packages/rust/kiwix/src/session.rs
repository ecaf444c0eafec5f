//! Lifecycle of the `kiwix-serve` subprocess.
//!
//! A [`ServerSession`] owns exactly one child process. The process is killed
//! and reaped by [`ServerSession::stop`]; if a session is dropped without
//! being stopped (panic, cancelled task) the child is killed on drop.

use std::collections::VecDeque;
use std::io::ErrorKind;
use std::net::{TcpListener, ToSocketAddrs};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use reqwest::Client;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use zimport_shared::{ArchiveReference, Result, ServerConfig, ServerHandle, ZimportError};

/// Number of trailing stderr lines kept for launch diagnostics.
const STDERR_TAIL_LINES: usize = 20;

/// How long to wait for the stderr pipe to drain after the child exits.
const STDERR_DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Upper bound on a single readiness wait.
const MAX_STARTUP_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

type LineTail = Arc<Mutex<VecDeque<String>>>;

/// A running content server bound to one archive and one port.
pub struct ServerSession {
    child: Option<Child>,
    handle: ServerHandle,
    probe: Client,
    poll_interval: Duration,
    stderr_tail: LineTail,
    stderr_task: Option<JoinHandle<()>>,
}

impl ServerSession {
    /// Launch the content server for `archive` as `<binary> --port=<port> <archive>`.
    ///
    /// Output streams are piped and drained into `tracing` so the child never
    /// blocks on a full pipe.
    #[instrument(skip_all, fields(archive = %archive.name(), port = config.port))]
    pub async fn start(archive: &ArchiveReference, config: &ServerConfig) -> Result<Self> {
        let binary = config.binary_path();
        if !binary.is_file() {
            return Err(ZimportError::BinaryNotFound { path: binary });
        }
        ensure_port_free(&config.host, config.port)?;

        let probe = Client::builder()
            .user_agent(crate::USER_AGENT)
            .no_proxy()
            .build()
            .map_err(|e| ZimportError::launch(format!("failed to build probe client: {e}")))?;

        info!(binary = %binary.display(), "spawning content server");

        let mut child = Command::new(&binary)
            .arg(format!("--port={}", config.port))
            .arg(archive.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                ZimportError::launch(format!("failed to spawn {}: {e}", binary.display()))
            })?;

        let stderr_tail: LineTail = Arc::new(Mutex::new(VecDeque::new()));
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_lines(stdout, "stdout", None));
        }
        let stderr_task = child
            .stderr
            .take()
            .map(|stderr| tokio::spawn(forward_lines(stderr, "stderr", Some(stderr_tail.clone()))));

        let handle = ServerHandle {
            pid: child.id(),
            host: config.host.clone(),
            port: config.port,
            archive: archive.clone(),
        };

        info!(pid = ?handle.pid, "content server spawned");

        Ok(Self {
            child: Some(child),
            handle,
            probe,
            poll_interval: config.poll_interval(),
            stderr_tail,
            stderr_task,
        })
    }

    /// Where the server can be reached.
    pub fn handle(&self) -> &ServerHandle {
        &self.handle
    }

    /// Poll the server root until it answers or `timeout` elapses.
    ///
    /// Any HTTP response counts as ready, provided our process is still alive
    /// after it. Fails early with [`ZimportError::LaunchFailed`] if the process
    /// exits while we wait.
    #[instrument(
        skip_all,
        fields(port = self.handle.port, timeout_ms = timeout.as_millis() as u64)
    )]
    pub async fn wait_until_ready(&mut self, timeout: Duration) -> Result<()> {
        let started = Instant::now();
        let deadline = started + timeout.min(MAX_STARTUP_TIMEOUT);
        let url = self.handle.base_url()?;

        loop {
            self.ensure_alive().await?;

            let probe = self.probe.get(url.clone()).send();
            match tokio::time::timeout_at(deadline.into(), probe).await {
                Ok(Ok(response)) => {
                    self.ensure_alive().await?;
                    info!(
                        status = response.status().as_u16(),
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "content server is ready"
                    );
                    return Ok(());
                }
                Ok(Err(e)) => debug!(error = %e, "content server not reachable yet"),
                Err(_) => {}
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(ZimportError::ReadinessTimeout {
                    port: self.handle.port,
                    waited_ms: started.elapsed().as_millis() as u64,
                });
            }
            tokio::time::sleep(self.poll_interval.min(deadline - now)).await;
        }
    }

    /// Whether the child process is still running.
    pub fn is_running(&mut self) -> bool {
        self.child
            .as_mut()
            .is_some_and(|child| matches!(child.try_wait(), Ok(None)))
    }

    /// Kill and reap the server. Safe to call repeatedly and after the process exited.
    #[instrument(skip_all, fields(pid = ?self.handle.pid))]
    pub async fn stop(&mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };

        match child.try_wait() {
            Ok(Some(status)) => {
                info!(?status, "content server had already exited");
                return;
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "could not query content server status"),
        }

        match child.kill().await {
            Ok(()) => info!("content server stopped"),
            Err(e) => warn!(error = %e, "failed to kill content server"),
        }
    }

    /// Turn an unexpected exit into a launch error carrying the stderr tail.
    pub async fn ensure_alive(&mut self) -> Result<()> {
        let Some(child) = self.child.as_mut() else {
            return Err(ZimportError::launch("content server was already stopped"));
        };

        let status = match child.try_wait() {
            Ok(None) => return Ok(()),
            Ok(Some(status)) => status,
            Err(e) => return Err(ZimportError::launch(format!("cannot query process: {e}"))),
        };
        self.child = None;

        if let Some(task) = self.stderr_task.take() {
            let _ = tokio::time::timeout(STDERR_DRAIN_TIMEOUT, task).await;
        }
        let tail = self
            .stderr_tail
            .lock()
            .map(|lines| lines.iter().cloned().collect::<Vec<_>>().join("\n"))
            .unwrap_or_default();

        let mut message = format!("content server exited unexpectedly ({status})");
        if !tail.is_empty() {
            message.push_str(": ");
            message.push_str(&tail);
        }
        Err(ZimportError::launch(message))
    }
}

impl Drop for ServerSession {
    fn drop(&mut self) {
        if let Some(child) = self.child.as_mut() {
            if matches!(child.try_wait(), Ok(None)) {
                warn!(
                    pid = ?self.handle.pid,
                    "session dropped without stop, killing content server"
                );
                let _ = child.start_kill();
            }
        }
    }
}

/// Fail with [`ZimportError::LaunchFailed`] when something already listens on
/// `host:port`, so readiness can only ever be answered by our own process.
fn ensure_port_free(host: &str, port: u16) -> Result<()> {
    let addrs = (host, port)
        .to_socket_addrs()
        .map_err(|e| ZimportError::launch(format!("cannot resolve {host}:{port}: {e}")))?;
    for addr in addrs {
        if let Err(e) = TcpListener::bind(addr) {
            if e.kind() == ErrorKind::AddrInUse {
                return Err(ZimportError::launch(format!("port {port} is already in use ({addr})")));
            }
        }
    }
    Ok(())
}

/// Forward each line of a child stream to `tracing`, optionally keeping the last few.
async fn forward_lines<R>(stream: R, name: &'static str, tail: Option<LineTail>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut lines = BufReader::new(stream).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        debug!(target: "zimport::kiwix_serve", stream = name, "{line}");
        if let Some(tail) = &tail {
            if let Ok(mut tail) = tail.lock() {
                if tail.len() == STDERR_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::test_support::{archive, fake_server, free_port, relay, temp_dir};

    fn config_for(binary: std::path::PathBuf, port: u16) -> ServerConfig {
        ServerConfig {
            binary: Some(binary),
            host: "127.0.0.1".into(),
            port,
            startup_timeout_ms: 2_000,
            poll_interval_ms: 20,
        }
    }

    #[tokio::test]
    async fn missing_binary_is_reported_before_launch() {
        let tmp = temp_dir("zimport-session-test");
        let archive = archive(&tmp, "sample");
        let config = config_for(tmp.join("no-such-binary"), free_port());

        let err = ServerSession::start(&archive, &config).await.err().unwrap();
        assert!(matches!(err, ZimportError::BinaryNotFound { .. }));

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn stop_terminates_the_process_and_is_idempotent() {
        let tmp = temp_dir("zimport-session-test");
        let archive = archive(&tmp, "sample");
        let binary = fake_server(&tmp, "exec sleep 30");

        let mut session = ServerSession::start(&archive, &config_for(binary, free_port()))
            .await
            .unwrap();
        let pid = session.handle().pid.expect("pid");
        assert!(session.is_running());

        session.stop().await;
        assert!(!session.is_running());
        if cfg!(target_os = "linux") {
            assert!(!std::path::Path::new(&format!("/proc/{pid}")).exists());
        }

        // Second stop is a no-op
        session.stop().await;

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn ready_once_server_answers() {
        let server = wiremock::MockServer::start().await;
        let tmp = temp_dir("zimport-session-test");
        let archive = archive(&tmp, "sample");
        let binary = fake_server(&tmp, "exec sleep 30");
        let port = free_port();

        let mut session = ServerSession::start(&archive, &config_for(binary, port))
            .await
            .unwrap();
        relay(port, *server.address()).await;

        // Unmatched requests get a 404, which still proves the server is up
        session
            .wait_until_ready(Duration::from_secs(2))
            .await
            .unwrap();

        session.stop().await;
        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn occupied_port_is_a_launch_failure() {
        let occupant = wiremock::MockServer::start().await;
        let tmp = temp_dir("zimport-session-test");
        let archive = archive(&tmp, "sample");
        let marker = tmp.join("launched");
        let binary = fake_server(&tmp, &format!("touch '{}'\nexec sleep 30", marker.display()));
        let config = config_for(binary, occupant.address().port());

        let err = ServerSession::start(&archive, &config).await.err().unwrap();
        match err {
            ZimportError::LaunchFailed { message } => {
                assert!(message.contains("already in use"), "got: {message}");
            }
            other => panic!("expected LaunchFailed, got {other:?}"),
        }

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!marker.exists());

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn answer_from_a_dead_process_is_not_readiness() {
        let server = wiremock::MockServer::start().await;
        let tmp = temp_dir("zimport-session-test");
        let archive = archive(&tmp, "sample");
        let binary = fake_server(&tmp, "echo 'bind failed' >&2\nexit 1");
        let port = free_port();

        let mut session = ServerSession::start(&archive, &config_for(binary, port))
            .await
            .unwrap();
        relay(port, *server.address()).await;
        tokio::time::sleep(Duration::from_millis(200)).await;

        let err = session
            .wait_until_ready(Duration::from_secs(2))
            .await
            .unwrap_err();
        match err {
            ZimportError::LaunchFailed { message } => {
                assert!(message.contains("bind failed"), "got: {message}");
            }
            other => panic!("expected LaunchFailed, got {other:?}"),
        }

        session.stop().await;
        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn readiness_times_out_when_nothing_listens() {
        let tmp = temp_dir("zimport-session-test");
        let archive = archive(&tmp, "sample");
        let binary = fake_server(&tmp, "exec sleep 30");

        let mut session = ServerSession::start(&archive, &config_for(binary, free_port()))
            .await
            .unwrap();

        let started = Instant::now();
        let err = session
            .wait_until_ready(Duration::from_millis(300))
            .await
            .unwrap_err();
        assert!(matches!(err, ZimportError::ReadinessTimeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(2));

        session.stop().await;
        assert!(!session.is_running());
        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn early_exit_is_a_launch_failure_with_stderr() {
        let tmp = temp_dir("zimport-session-test");
        let archive = archive(&tmp, "sample");
        let binary = fake_server(&tmp, "echo 'unable to open zim file' >&2\nexit 3");

        let mut session = ServerSession::start(&archive, &config_for(binary, free_port()))
            .await
            .unwrap();

        let err = session
            .wait_until_ready(Duration::from_secs(5))
            .await
            .unwrap_err();
        match err {
            ZimportError::LaunchFailed { message } => {
                assert!(message.contains("unable to open zim file"), "got: {message}");
            }
            other => panic!("expected LaunchFailed, got {other:?}"),
        }

        // Stopping an exited session must not fail
        session.stop().await;
        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn unbounded_timeout_still_reports_exit() {
        let tmp = temp_dir("zimport-session-test");
        let archive = archive(&tmp, "sample");
        let binary = fake_server(&tmp, "exit 2");

        let mut session = ServerSession::start(&archive, &config_for(binary, free_port()))
            .await
            .unwrap();

        let err = session.wait_until_ready(Duration::MAX).await.unwrap_err();
        assert!(matches!(err, ZimportError::LaunchFailed { .. }));

        session.stop().await;
        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn server_receives_port_and_archive_arguments() {
        let tmp = temp_dir("zimport-session-test");
        let archive = archive(&tmp, "sample");
        let args_file = tmp.join("args.txt");
        let binary = fake_server(
            &tmp,
            &format!("echo \"$@\" > '{}'\nexec sleep 30", args_file.display()),
        );

        let port = free_port();
        let mut session = ServerSession::start(&archive, &config_for(binary, port))
            .await
            .unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        let written = || {
            std::fs::read_to_string(&args_file)
                .map(|s| s.ends_with('\n'))
                .unwrap_or(false)
        };
        while !written() && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        session.stop().await;

        let args = std::fs::read_to_string(&args_file).unwrap();
        assert_eq!(
            args.trim(),
            format!("--port={port} {}", archive.path().display())
        );

        let _ = std::fs::remove_dir_all(&tmp);
    }
}
