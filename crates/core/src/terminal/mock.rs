//! In-memory terminal host for tests.

use super::{TerminalError, TerminalHost, TerminalResult, TerminalSession, TerminalSpec};
use async_trait::async_trait;
use lk_protocol::launch_models::TerminalId;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};

#[derive(Debug)]
struct MockTerminal {
    spec: TerminalSpec,
    sent: Vec<String>,
    input_finished: bool,
    closed: bool,
    close_tx: Option<oneshot::Sender<()>>,
}

#[derive(Debug, Default)]
struct MockState {
    next_id: u64,
    terminals: BTreeMap<TerminalId, MockTerminal>,
    fail_open: bool,
    fail_send: bool,
}

/// Records every opened terminal and the lines typed into it. Tests close
/// terminals explicitly with [`MockTerminalHost::close`].
#[derive(Clone, Default)]
pub struct MockTerminalHost {
    state: Arc<Mutex<MockState>>,
}

impl MockTerminalHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// A host whose `open` always fails.
    pub fn failing_open() -> Self {
        Self::with_state(MockState {
            fail_open: true,
            ..MockState::default()
        })
    }

    /// A host that opens terminals but rejects every `send_text`.
    pub fn failing_send() -> Self {
        Self::with_state(MockState {
            fail_send: true,
            ..MockState::default()
        })
    }

    fn with_state(state: MockState) -> Self {
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub async fn opened_count(&self) -> usize {
        self.state.lock().await.terminals.len()
    }

    pub async fn open_terminals(&self) -> Vec<TerminalId> {
        let state = self.state.lock().await;
        state
            .terminals
            .iter()
            .filter(|(_, t)| !t.closed)
            .map(|(id, _)| *id)
            .collect()
    }

    pub async fn sent_text(&self, id: TerminalId) -> Vec<String> {
        let state = self.state.lock().await;
        state
            .terminals
            .get(&id)
            .map(|t| t.sent.clone())
            .unwrap_or_default()
    }

    pub async fn spec(&self, id: TerminalId) -> Option<TerminalSpec> {
        let state = self.state.lock().await;
        state.terminals.get(&id).map(|t| t.spec.clone())
    }

    pub async fn input_finished(&self, id: TerminalId) -> bool {
        let state = self.state.lock().await;
        state.terminals.get(&id).is_some_and(|t| t.input_finished)
    }

    pub async fn is_closed(&self, id: TerminalId) -> bool {
        let state = self.state.lock().await;
        state.terminals.get(&id).is_some_and(|t| t.closed)
    }

    /// Simulate the user closing a terminal. Returns `false` if it was
    /// already closed or never existed.
    pub async fn close(&self, id: TerminalId) -> bool {
        let mut state = self.state.lock().await;
        let Some(terminal) = state.terminals.get_mut(&id) else {
            return false;
        };
        if terminal.closed {
            return false;
        }
        terminal.closed = true;
        if let Some(tx) = terminal.close_tx.take() {
            let _ = tx.send(());
        }
        true
    }
}

#[async_trait]
impl TerminalHost for MockTerminalHost {
    async fn open(&self, spec: TerminalSpec) -> TerminalResult<TerminalSession> {
        let mut state = self.state.lock().await;
        if state.fail_open {
            return Err(TerminalError::Spawn {
                name: spec.name,
                source: std::io::Error::other("mock open failure"),
            });
        }

        state.next_id += 1;
        let id = TerminalId(state.next_id);
        let (close_tx, closed) = oneshot::channel();
        state.terminals.insert(
            id,
            MockTerminal {
                spec,
                sent: Vec::new(),
                input_finished: false,
                closed: false,
                close_tx: Some(close_tx),
            },
        );
        Ok(TerminalSession { id, closed })
    }

    async fn send_text(&self, id: TerminalId, text: &str) -> TerminalResult<()> {
        let mut state = self.state.lock().await;
        let fail_send = state.fail_send;
        let terminal = state
            .terminals
            .get_mut(&id)
            .filter(|t| !t.closed)
            .ok_or(TerminalError::UnknownTerminal(id))?;
        if fail_send {
            return Err(TerminalError::Write {
                id,
                source: std::io::Error::other("mock send failure"),
            });
        }
        terminal.sent.push(text.to_string());
        Ok(())
    }

    async fn finish_input(&self, id: TerminalId) -> TerminalResult<()> {
        let mut state = self.state.lock().await;
        let terminal = state
            .terminals
            .get_mut(&id)
            .ok_or(TerminalError::UnknownTerminal(id))?;
        terminal.input_finished = true;
        Ok(())
    }

    async fn dispose(&self, id: TerminalId) -> TerminalResult<()> {
        if self.close(id).await {
            Ok(())
        } else {
            Err(TerminalError::UnknownTerminal(id))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_records_text_and_closes_once() {
        let host = MockTerminalHost::new();
        let session = host
            .open(TerminalSpec::new("t", "/tmp"))
            .await
            .expect("open failed");

        host.send_text(session.id, "echo hi").await.expect("send failed");
        assert_eq!(host.sent_text(session.id).await, vec!["echo hi".to_string()]);

        assert!(host.close(session.id).await);
        assert!(!host.close(session.id).await);
        session.closed.await.expect("close signal dropped");

        assert!(host.send_text(session.id, "late").await.is_err());
        assert!(host.open_terminals().await.is_empty());
    }

    #[tokio::test]
    async fn test_failing_open() {
        let host = MockTerminalHost::failing_open();
        let result = host.open(TerminalSpec::new("t", "/tmp")).await;
        assert!(matches!(result, Err(TerminalError::Spawn { .. })));
        assert_eq!(host.opened_count().await, 0);
    }
}
