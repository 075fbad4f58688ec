//! Headless terminal host backed by shell child processes.

use super::{TerminalError, TerminalHost, TerminalResult, TerminalSession, TerminalSpec};
use async_trait::async_trait;
use lk_protocol::launch_models::TerminalId;
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::process::{ChildStdin, Command};
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, info, warn};

struct ShellTerminal {
    stdin: Option<ChildStdin>,
    kill: Option<oneshot::Sender<()>>,
}

/// Runs every terminal as a shell (`sh`, or `cmd` on Windows) reading
/// commands from a pipe. Output goes to the parent's stdout/stderr.
///
/// A terminal closes when its shell exits.
pub struct ProcessTerminalHost {
    shell: String,
    next_id: AtomicU64,
    terminals: Arc<Mutex<HashMap<TerminalId, ShellTerminal>>>,
}

impl ProcessTerminalHost {
    pub fn new() -> Self {
        let shell = if cfg!(windows) { "cmd" } else { "sh" };
        Self::with_shell(shell)
    }

    pub fn with_shell(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
            next_id: AtomicU64::new(1),
            terminals: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub async fn open_count(&self) -> usize {
        self.terminals.lock().await.len()
    }
}

impl Default for ProcessTerminalHost {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TerminalHost for ProcessTerminalHost {
    async fn open(&self, spec: TerminalSpec) -> TerminalResult<TerminalSession> {
        let mut cmd = Command::new(&self.shell);
        if cfg!(windows) {
            cmd.arg("/Q");
        }
        cmd.current_dir(&spec.cwd)
            .envs(&spec.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|source| TerminalError::Spawn {
            name: spec.name.clone(),
            source,
        })?;

        let id = TerminalId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (close_tx, close_rx) = oneshot::channel();
        let (kill_tx, kill_rx) = oneshot::channel::<()>();

        self.terminals.lock().await.insert(
            id,
            ShellTerminal {
                stdin: child.stdin.take(),
                kill: Some(kill_tx),
            },
        );
        info!(%id, name = %spec.name, cwd = ?spec.cwd, "terminal opened");

        let terminals = Arc::clone(&self.terminals);
        tokio::spawn(async move {
            tokio::select! {
                status = child.wait() => match status {
                    Ok(status) => debug!(%id, %status, "terminal shell exited"),
                    Err(err) => warn!(%id, error = %err, "failed to wait for terminal shell"),
                },
                _ = kill_rx => {
                    if let Err(err) = child.kill().await {
                        warn!(%id, error = %err, "failed to kill terminal shell");
                    }
                }
            }
            terminals.lock().await.remove(&id);
            let _ = close_tx.send(());
            info!(%id, "terminal closed");
        });

        Ok(TerminalSession {
            id,
            closed: close_rx,
        })
    }

    async fn send_text(&self, id: TerminalId, text: &str) -> TerminalResult<()> {
        let mut terminals = self.terminals.lock().await;
        let stdin = terminals
            .get_mut(&id)
            .and_then(|terminal| terminal.stdin.as_mut())
            .ok_or(TerminalError::UnknownTerminal(id))?;

        let line = format!("{text}\n");
        stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|source| TerminalError::Write { id, source })?;
        stdin
            .flush()
            .await
            .map_err(|source| TerminalError::Write { id, source })?;
        Ok(())
    }

    async fn finish_input(&self, id: TerminalId) -> TerminalResult<()> {
        let mut terminals = self.terminals.lock().await;
        let terminal = terminals
            .get_mut(&id)
            .ok_or(TerminalError::UnknownTerminal(id))?;
        // Dropping stdin sends EOF; the shell exits after the queued commands.
        terminal.stdin.take();
        Ok(())
    }

    async fn dispose(&self, id: TerminalId) -> TerminalResult<()> {
        let mut terminals = self.terminals.lock().await;
        let terminal = terminals
            .get_mut(&id)
            .ok_or(TerminalError::UnknownTerminal(id))?;
        if let Some(kill) = terminal.kill.take() {
            let _ = kill.send(());
        }
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use tokio::time::{timeout, Duration};

    #[tokio::test]
    async fn test_shell_runs_commands_and_closes_on_eof() {
        let dir = tempdir().expect("Failed to create temp dir");
        let host = ProcessTerminalHost::new();

        let session = host
            .open(TerminalSpec::new("test", dir.path()))
            .await
            .expect("open failed");
        host.send_text(session.id, "echo hello > out.txt")
            .await
            .expect("send failed");
        host.finish_input(session.id).await.expect("finish failed");

        timeout(Duration::from_secs(10), session.closed)
            .await
            .expect("terminal did not close")
            .expect("close signal dropped");

        let out = std::fs::read_to_string(dir.path().join("out.txt")).expect("no output file");
        assert_eq!(out.trim(), "hello");
        assert_eq!(host.open_count().await, 0);
    }

    #[tokio::test]
    async fn test_dispose_kills_shell() {
        let dir = tempdir().expect("Failed to create temp dir");
        let host = ProcessTerminalHost::new();

        let session = host
            .open(TerminalSpec::new("test", dir.path()))
            .await
            .expect("open failed");
        host.dispose(session.id).await.expect("dispose failed");

        timeout(Duration::from_secs(10), session.closed)
            .await
            .expect("terminal did not close")
            .expect("close signal dropped");

        let err = host.send_text(session.id, "echo late").await;
        assert!(matches!(err, Err(TerminalError::UnknownTerminal(_))));
    }
}
