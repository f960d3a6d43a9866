//! `gerrit stream-events` over SSH.
//!
//! Spawns the ssh client as a child process, forwards its stdout as stream
//! chunks and reports an end signal once stdout closes.

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tokio_util::sync::CancellationToken;

use super::connection::{ConnectError, SignalSink, StreamConnector, StreamHandle};

/// Remote command that produces the event stream.
pub const STREAM_EVENTS_COMMAND: [&str; 2] = ["gerrit", "stream-events"];

/// Time allowed for the ssh client to exit after SIGTERM.
pub const DEFAULT_TERMINATE_TIMEOUT: Duration = Duration::from_secs(3);

const READ_CHUNK_BYTES: usize = 8192;

impl ConnectError {
    /// Create a `ConnectError` from an I/O error, classifying common cases.
    fn from_spawn(binary: &str, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(binary.to_string()),
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied,
            _ => Self::Io(err),
        }
    }
}

/// Connector that runs `ssh -p <port> <host> gerrit stream-events`.
#[derive(Debug, Clone)]
pub struct SshConnector {
    binary: String,
    user: Option<String>,
    identity_file: Option<PathBuf>,
    extra_args: Vec<String>,
    terminate_timeout: Duration,
}

impl Default for SshConnector {
    fn default() -> Self {
        Self {
            binary: "ssh".to_string(),
            user: None,
            identity_file: None,
            extra_args: Vec::new(),
            terminate_timeout: DEFAULT_TERMINATE_TIMEOUT,
        }
    }
}

impl SshConnector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different ssh client binary.
    #[must_use]
    pub fn binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Log in as `user`.
    #[must_use]
    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Authenticate with the given private key.
    #[must_use]
    pub fn identity_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.identity_file = Some(path.into());
        self
    }

    /// Extra client options, placed before the host.
    #[must_use]
    pub fn extra_args(mut self, args: Vec<String>) -> Self {
        self.extra_args = args;
        self
    }

    /// How long to wait for the client to exit after SIGTERM.
    #[must_use]
    pub fn terminate_timeout(mut self, timeout: Duration) -> Self {
        self.terminate_timeout = timeout;
        self
    }

    /// Get the ssh binary.
    #[must_use]
    pub fn get_binary(&self) -> &str {
        &self.binary
    }

    /// Build the command-line arguments for `host:port`.
    #[must_use]
    pub fn build_args(&self, host: &str, port: u16) -> Vec<String> {
        let mut args = vec!["-p".to_string(), port.to_string()];

        if let Some(user) = &self.user {
            args.push("-l".to_string());
            args.push(user.clone());
        }

        if let Some(identity) = &self.identity_file {
            args.push("-i".to_string());
            args.push(identity.display().to_string());
        }

        args.extend(self.extra_args.iter().cloned());
        args.push(host.to_string());
        args.extend(STREAM_EVENTS_COMMAND.iter().map(|s| (*s).to_string()));

        args
    }
}

impl StreamConnector for SshConnector {
    fn open(
        &mut self,
        host: &str,
        port: u16,
        sink: SignalSink,
    ) -> Result<Box<dyn StreamHandle>, ConnectError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| ConnectError::NoRuntime)?;
        let args = self.build_args(host, port);

        let mut child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ConnectError::from_spawn(&self.binary, e))?;

        let stdout = child.stdout.take().ok_or(ConnectError::NoStdout)?;
        if let Some(stderr) = child.stderr.take() {
            runtime.spawn(log_stderr(stderr, host.to_string()));
        }

        tracing::info!(
            host = %host,
            port,
            pid = child.id(),
            generation = sink.generation(),
            "Spawned stream-events client"
        );

        let cancel = CancellationToken::new();
        runtime.spawn(pump(
            child,
            stdout,
            sink,
            cancel.clone(),
            self.terminate_timeout,
        ));

        Ok(Box::new(SshHandle { cancel }))
    }
}

/// Handle to a running ssh client.
#[derive(Debug)]
struct SshHandle {
    cancel: CancellationToken,
}

impl StreamHandle for SshHandle {
    fn close(self: Box<Self>) {
        self.cancel.cancel();
    }
}

impl Drop for SshHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Forward stdout to the sink until EOF or cancellation.
async fn pump<R>(
    mut child: Child,
    mut stdout: R,
    sink: SignalSink,
    cancel: CancellationToken,
    terminate_timeout: Duration,
) where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; READ_CHUNK_BYTES];
    let mut carry = Vec::new();

    let end_payload = loop {
        tokio::select! {
            () = cancel.cancelled() => {
                stop_client(&mut child, terminate_timeout).await;
                return;
            }
            read = stdout.read(&mut buf) => match read {
                Ok(0) => break None,
                Ok(n) => {
                    carry.extend_from_slice(&buf[..n]);
                    let chunk = take_utf8(&mut carry);
                    if !chunk.is_empty() && !sink.write(chunk) {
                        tracing::debug!("Signal receiver dropped, stopping stream client");
                        stop_client(&mut child, terminate_timeout).await;
                        return;
                    }
                }
                Err(e) => break Some(format!("stream read failed: {e}")),
            }
        }
    };

    let status = tokio::select! {
        () = cancel.cancelled() => {
            stop_client(&mut child, terminate_timeout).await;
            return;
        }
        status = child.wait() => status,
    };

    let payload = end_payload.unwrap_or_else(|| describe_exit(status));
    tracing::info!(generation = sink.generation(), payload = %payload, "Stream closed");
    sink.end(payload);
}

fn describe_exit(status: std::io::Result<ExitStatus>) -> String {
    match status {
        Ok(status) => format!("stream exited: {status}"),
        Err(e) => format!("stream wait failed: {e}"),
    }
}

/// Drain every complete character from `carry`.
///
/// Invalid sequences are replaced with U+FFFD. An incomplete multi-byte
/// sequence at the end is kept for the next read.
fn take_utf8(carry: &mut Vec<u8>) -> String {
    let mut text = String::with_capacity(carry.len());
    let mut rest: &[u8] = &carry[..];

    loop {
        match std::str::from_utf8(rest) {
            Ok(valid) => {
                text.push_str(valid);
                rest = &[];
                break;
            }
            Err(e) => {
                let (valid, after) = rest.split_at(e.valid_up_to());
                text.push_str(&String::from_utf8_lossy(valid));
                match e.error_len() {
                    Some(len) => {
                        text.push(char::REPLACEMENT_CHARACTER);
                        rest = &after[len..];
                    }
                    None => {
                        rest = after;
                        break;
                    }
                }
            }
        }
    }

    let consumed = carry.len() - rest.len();
    carry.drain(..consumed);
    text
}

async fn log_stderr(stderr: ChildStderr, host: String) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        tracing::warn!(host = %host, line = %line, "ssh stderr");
    }
}

async fn stop_client(child: &mut Child, timeout: Duration) {
    if let Err(e) = terminate(child, timeout).await {
        tracing::warn!(error = %e, "Failed to terminate stream client");
    }
}

/// Terminate the client: SIGTERM first on unix, SIGKILL after `timeout`.
async fn terminate(child: &mut Child, timeout: Duration) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let Some(pid) = child.id() else {
            return Ok(());
        };
        let nix_pid = Pid::from_raw(i32::try_from(pid).unwrap_or(i32::MAX));
        let _ = kill(nix_pid, Signal::SIGTERM);

        match tokio::time::timeout(timeout, child.wait()).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(e),
            Err(_) => child.kill().await,
        }
    }

    #[cfg(not(unix))]
    {
        let _ = timeout;
        child.kill().await
    }
}
