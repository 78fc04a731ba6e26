//! UCI engine process session
//!
//! Spawns the engine as a subprocess and exposes its line-oriented stdout as a
//! stream of callbacks to a single subscriber.

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use super::encoder::{IS_READY, UCI};
use crate::config::EngineConfig;
use crate::sync::lock;

/// Error type for engine operations
#[derive(Error, Debug)]
pub enum EngineError {
    /// Failed to start the engine process
    #[error("Failed to start engine: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("Engine already started")]
    AlreadyStarted,
    /// The session was stopped, or never started
    #[error("Engine session closed")]
    Closed,
}

/// What the subscriber receives from the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineOutput<'a> {
    /// One trimmed stdout line, in the order the engine wrote it
    Line(&'a str),
    /// Stdout closed or failed; no more lines will follow
    Terminated,
}

pub type OutputHandler = Box<dyn FnMut(EngineOutput<'_>) + Send>;

/// The operations the orchestrator needs from an engine.
pub trait EngineLink {
    fn start(&mut self) -> Result<(), EngineError>;

    /// Queues a command. Commands reach the engine in send order.
    fn send(&self, command: &str) -> Result<(), EngineError>;

    /// Replaces the current subscriber.
    fn subscribe(&self, handler: OutputHandler) -> Subscription;

    /// Terminates the engine. Safe to call more than once.
    fn stop(&mut self);

    /// Engine name reported during the handshake, if any
    fn engine_name(&self) -> Option<String> {
        None
    }
}

#[derive(Default)]
struct Slot {
    next_id: u64,
    current: Option<(u64, OutputHandler)>,
}

/// Single-subscriber fan-out point for engine output
#[derive(Clone, Default)]
pub struct OutputChannel {
    slot: Arc<Mutex<Slot>>,
}

impl OutputChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, handler: OutputHandler) -> Subscription {
        let mut slot = lock(&self.slot);
        slot.next_id += 1;
        let id = slot.next_id;
        slot.current = Some((id, handler));

        Subscription {
            id,
            slot: Arc::downgrade(&self.slot),
        }
    }

    /// Hands `output` to the current subscriber. Returns false if there is none.
    pub fn deliver(&self, output: EngineOutput<'_>) -> bool {
        let mut slot = lock(&self.slot);
        match slot.current.as_mut() {
            Some((_, handler)) => {
                handler(output);
                true
            }
            None => false,
        }
    }

    pub fn has_subscriber(&self) -> bool {
        lock(&self.slot).current.is_some()
    }
}

/// Handle to a subscription. Dropping it unsubscribes, unless a newer
/// subscription has already replaced it.
pub struct Subscription {
    id: u64,
    slot: Weak<Mutex<Slot>>,
}

impl Subscription {
    pub fn is_active(&self) -> bool {
        self.slot
            .upgrade()
            .map(|slot| matches!(lock(&slot).current, Some((id, _)) if id == self.id))
            .unwrap_or(false)
    }

    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let Some(slot) = self.slot.upgrade() else {
            return;
        };
        let removed = {
            let mut slot = lock(&slot);
            let is_current = matches!(slot.current, Some((id, _)) if id == self.id);
            if is_current {
                slot.current.take()
            } else {
                None
            }
        };
        // Handler captures are dropped outside the lock
        drop(removed);
    }
}

enum State {
    NotStarted,
    Running(Running),
    Stopped,
}

struct Running {
    child: Child,
    commands: mpsc::UnboundedSender<String>,
    /// Cleared by the reader once the engine's output ends
    alive: Arc<AtomicBool>,
    writer: JoinHandle<()>,
    reader: JoinHandle<()>,
}

/// A UCI engine subprocess. Construction does not spawn anything; call
/// [`EngineLink::start`] from inside a Tokio runtime.
///
/// # Example
/// ```ignore
/// let mut session = EngineSession::new(EngineConfig::default());
/// session.start()?;
/// let _sub = session.subscribe(Box::new(|out| println!("{:?}", out)));
/// session.send("go depth 10")?;
/// ```
pub struct EngineSession {
    config: EngineConfig,
    state: State,
    output: OutputChannel,
    name: Arc<Mutex<Option<String>>>,
}

impl EngineSession {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            state: State::NotStarted,
            output: OutputChannel::new(),
            name: Arc::new(Mutex::new(None)),
        }
    }

    pub fn is_running(&self) -> bool {
        match &self.state {
            State::Running(running) => running.alive.load(Ordering::Acquire),
            _ => false,
        }
    }
}

impl EngineLink for EngineSession {
    fn start(&mut self) -> Result<(), EngineError> {
        match self.state {
            State::NotStarted => {}
            State::Running(_) => return Err(EngineError::AlreadyStarted),
            State::Stopped => return Err(EngineError::Closed),
        }

        let mut child = Command::new(&self.config.path)
            .args(&self.config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(EngineError::Spawn)?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| EngineError::Spawn(missing_pipe("stdin")))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::Spawn(missing_pipe("stdout")))?;

        let (commands, queue) = mpsc::unbounded_channel();
        let alive = Arc::new(AtomicBool::new(true));
        let writer = tokio::spawn(write_commands(stdin, queue, Arc::clone(&alive)));
        let reader = tokio::spawn(read_output(
            stdout,
            self.output.clone(),
            Arc::clone(&self.name),
            Arc::clone(&alive),
        ));

        info!(path = %self.config.path, pid = ?child.id(), "engine started");

        self.state = State::Running(Running {
            child,
            commands,
            alive,
            writer,
            reader,
        });

        self.send(UCI)?;
        self.send(IS_READY)?;
        Ok(())
    }

    fn send(&self, command: &str) -> Result<(), EngineError> {
        let State::Running(running) = &self.state else {
            return Err(EngineError::Closed);
        };
        if !running.alive.load(Ordering::Acquire) {
            return Err(EngineError::Closed);
        }
        debug!(command, "-> engine");
        running
            .commands
            .send(command.to_string())
            .map_err(|_| EngineError::Closed)
    }

    fn subscribe(&self, handler: OutputHandler) -> Subscription {
        self.output.subscribe(handler)
    }

    fn stop(&mut self) {
        if let State::Running(mut running) = std::mem::replace(&mut self.state, State::Stopped) {
            running.reader.abort();
            running.writer.abort();
            if let Err(e) = running.child.start_kill() {
                debug!("engine already exited: {}", e);
            }
            info!("engine stopped");
        }
    }

    /// Engine name from its `id name` line, once the handshake got that far
    fn engine_name(&self) -> Option<String> {
        lock(&self.name).clone()
    }
}

impl Drop for EngineSession {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Writes queued commands in order. A failed write closes the session for
/// further sends; the reader still reports `Terminated` once output ends.
async fn write_commands(
    mut stdin: ChildStdin,
    mut queue: mpsc::UnboundedReceiver<String>,
    alive: Arc<AtomicBool>,
) {
    while let Some(command) = queue.recv().await {
        if let Err(e) = write_line(&mut stdin, &command).await {
            warn!("failed to write to engine: {}", e);
            alive.store(false, Ordering::Release);
            break;
        }
    }
}

async fn write_line(stdin: &mut ChildStdin, command: &str) -> std::io::Result<()> {
    stdin.write_all(command.as_bytes()).await?;
    stdin.write_all(b"\n").await?;
    stdin.flush().await
}

async fn read_output(
    stdout: ChildStdout,
    output: OutputChannel,
    name: Arc<Mutex<Option<String>>>,
    alive: Arc<AtomicBool>,
) {
    let mut lines = BufReader::new(stdout).lines();

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim();
                trace!(line, "<- engine");
                if let Some(engine_name) = line.strip_prefix("id name ") {
                    *lock(&name) = Some(engine_name.to_string());
                }
                output.deliver(EngineOutput::Line(line));
            }
            Ok(None) => {
                warn!("engine closed its output");
                break;
            }
            Err(e) => {
                warn!("failed to read from engine: {}", e);
                break;
            }
        }
    }

    alive.store(false, Ordering::Release);
    output.deliver(EngineOutput::Terminated);
}

fn missing_pipe(which: &str) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::BrokenPipe, format!("engine {} not captured", which))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::mpsc::UnboundedReceiver;

    const FAKE_ENGINE: &str = r#"
while read -r cmd; do
  case "$cmd" in
    uci) echo "id name FakeFish 1.0"; echo "uciok" ;;
    isready) echo "readyok" ;;
    "go depth"*) echo "info depth 1 score cp 30 pv e7e5"; echo "bestmove e7e5" ;;
    crash) exit 3 ;;
  esac
done
"#;

    fn fake_engine() -> EngineSession {
        EngineSession::new(EngineConfig {
            path: "sh".to_string(),
            args: vec!["-c".to_string(), FAKE_ENGINE.to_string()],
        })
    }

    fn collect(session: &EngineSession) -> (Subscription, UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sub = session.subscribe(Box::new(move |output| {
            let text = match output {
                EngineOutput::Line(line) => line.to_string(),
                EngineOutput::Terminated => "<terminated>".to_string(),
            };
            let _ = tx.send(text);
        }));
        (sub, rx)
    }

    async fn next(rx: &mut UnboundedReceiver<String>) -> String {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for engine")
            .expect("channel closed")
    }

    #[test]
    fn test_engine_error_display() {
        assert_eq!(EngineError::Closed.to_string(), "Engine session closed");
        let spawn = EngineError::Spawn(std::io::Error::new(std::io::ErrorKind::NotFound, "nope"));
        assert!(spawn.to_string().contains("Failed to start engine"));
    }

    #[test]
    fn test_send_before_start_is_closed() {
        let session = fake_engine();
        assert!(matches!(session.send("isready"), Err(EngineError::Closed)));
    }

    #[test]
    fn test_stop_without_start_is_harmless() {
        let mut session = fake_engine();
        session.stop();
        session.stop();
        assert!(matches!(session.send("uci"), Err(EngineError::Closed)));
        assert!(matches!(session.start(), Err(EngineError::Closed)));
    }

    #[test]
    fn test_newer_subscription_replaces_older() {
        let channel = OutputChannel::new();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let tx_first = tx.clone();
        let first = channel.subscribe(Box::new(move |_| {
            let _ = tx_first.send("first");
        }));
        let second = channel.subscribe(Box::new(move |_| {
            let _ = tx.send("second");
        }));

        assert!(!first.is_active());
        assert!(second.is_active());

        // Dropping the stale handle must not remove the newer subscriber
        drop(first);
        assert!(channel.deliver(EngineOutput::Line("info")));
        assert_eq!(rx.try_recv().unwrap(), "second");

        second.unsubscribe();
        assert!(!channel.has_subscriber());
        assert!(!channel.deliver(EngineOutput::Line("info")));
    }

    #[tokio::test]
    async fn test_handshake_and_search() {
        let mut session = fake_engine();
        let (_sub, mut rx) = collect(&session);
        session.start().unwrap();

        assert_eq!(next(&mut rx).await, "id name FakeFish 1.0");
        assert_eq!(next(&mut rx).await, "uciok");
        assert_eq!(next(&mut rx).await, "readyok");
        assert_eq!(session.engine_name().as_deref(), Some("FakeFish 1.0"));

        session.send("position fen 8/8/8/8/8/8/8/K6k w - - 0 1").unwrap();
        session.send("go depth 3").unwrap();
        assert_eq!(next(&mut rx).await, "info depth 1 score cp 30 pv e7e5");
        assert_eq!(next(&mut rx).await, "bestmove e7e5");

        session.stop();
        assert!(!session.is_running());
        assert!(matches!(session.send("go depth 3"), Err(EngineError::Closed)));
    }

    #[tokio::test]
    async fn test_start_twice_fails() {
        let mut session = fake_engine();
        session.start().unwrap();
        assert!(matches!(session.start(), Err(EngineError::AlreadyStarted)));
        session.stop();
    }

    #[tokio::test]
    async fn test_engine_exit_is_reported() {
        let mut session = fake_engine();
        let (_sub, mut rx) = collect(&session);
        session.start().unwrap();
        session.send("crash").unwrap();

        loop {
            if next(&mut rx).await == "<terminated>" {
                break;
            }
        }
        assert!(!session.is_running());
        assert!(matches!(session.send("isready"), Err(EngineError::Closed)));
    }

    #[tokio::test]
    async fn test_write_failure_closes_session() {
        // Engine that stops reading its input but keeps running
        let mut session = EngineSession::new(EngineConfig {
            path: "sh".to_string(),
            args: vec!["-c".to_string(), "exec 0<&-; sleep 5".to_string()],
        });
        session.start().unwrap();

        let closed = tokio::time::timeout(Duration::from_secs(3), async {
            while session.send("isready").is_ok() {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await;
        assert!(closed.is_ok(), "send kept succeeding after writes failed");
        assert!(!session.is_running());
        session.stop();
    }

    #[tokio::test]
    async fn test_missing_binary_fails_to_start() {
        let mut session = EngineSession::new(EngineConfig {
            path: "/nonexistent/path/to/stockfish".to_string(),
            args: Vec::new(),
        });
        assert!(matches!(session.start(), Err(EngineError::Spawn(_))));
        assert!(!session.is_running());
    }
}
