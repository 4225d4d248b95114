//! Async session driver.
//!
//! [`spawn_session`] opens a [`SessionBridge`] and moves it onto a tokio
//! task that serially dispatches transport events, viewport changes, host
//! commands and the optional connect timeout through one `select!` loop.
//! The host keeps a [`SessionHandle`]; dropping it counts as destroying the
//! hosting view.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use termbridge_core::{
    BridgeConfig, Error, Key, Result, SessionId, SessionInfo, SessionState, Target,
};

use crate::bridge::{BridgeStats, SessionBridge, SessionOptions};
use crate::transport::ConnectionFactory;

/// Queued bridge events handled ahead of each host command.
const COMMAND_CATCH_UP: usize = 256;

/// What a host can ask of a running session.
#[derive(Debug)]
enum Command {
    Input(String),
    Close,
    Snapshot(oneshot::Sender<SessionSnapshot>),
}

/// Point-in-time view of a running session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    /// Session state and geometry
    pub info: SessionInfo,
    /// Visible screen as plain text
    pub screen: String,
    /// Window title set by the remote side
    pub title: Option<String>,
    /// Traffic counters
    pub stats: BridgeStats,
}

/// Final account of a session, returned once its driver has stopped.
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    /// Final session info, always `Closed`
    pub info: SessionInfo,
    /// Everything written to the surface
    pub transcript: String,
    /// Last rendered screen
    pub screen: String,
    /// Traffic counters
    pub stats: BridgeStats,
    /// Saved asciinema transcript, if recording was enabled
    pub transcript_path: Option<PathBuf>,
}

/// Host-side remote control for a running session.
#[derive(Debug)]
pub struct SessionHandle {
    id: SessionId,
    commands: mpsc::UnboundedSender<Command>,
    info: watch::Receiver<SessionInfo>,
    task: JoinHandle<SessionReport>,
}

/// Open a session for `target` and drive it on the current tokio runtime.
///
/// Startup failures do not surface here: the returned handle reports a
/// `Closed` session whose info carries the error.
///
/// # Panics
///
/// Panics if called outside a tokio runtime.
pub fn spawn_session(
    target: impl Into<Target>,
    factory: Arc<dyn ConnectionFactory>,
    config: Arc<BridgeConfig>,
    options: SessionOptions,
) -> SessionHandle {
    let timeout = config.session.connect_timeout();
    let mut bridge = SessionBridge::new(target, factory, config);
    if let Err(e) = bridge.open(options) {
        warn!("Session failed to open: id={}: {}", bridge.info().id, e);
    }

    let id = bridge.info().id;
    let (commands, command_rx) = mpsc::unbounded_channel();
    let (info_tx, info) = watch::channel(bridge.info().clone());
    let task = tokio::spawn(drive(bridge, command_rx, info_tx, timeout));

    SessionHandle {
        id,
        commands,
        info,
        task,
    }
}

impl SessionHandle {
    /// Session identifier.
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Latest session info.
    pub fn info(&self) -> SessionInfo {
        self.info.borrow().clone()
    }

    /// Receiver that observes every info change (status indicator feed).
    pub fn subscribe_info(&self) -> watch::Receiver<SessionInfo> {
        self.info.clone()
    }

    /// Wait until the session info satisfies `predicate`.
    ///
    /// Returns `None` if the driver stopped first without satisfying it.
    pub async fn wait_until<F>(&self, predicate: F) -> Option<SessionInfo>
    where
        F: FnMut(&SessionInfo) -> bool,
    {
        let mut info = self.info.clone();
        let result = info.wait_for(predicate).await;
        result.ok().map(|info| info.clone())
    }

    /// Type text into the session, as if captured from the keyboard.
    pub fn type_text(&self, data: &str) -> Result<()> {
        self.command(Command::Input(data.to_string()))
    }

    /// Press a named key such as `"enter"` or `"ctrl+c"`.
    pub fn send_key(&self, name: &str) -> Result<()> {
        let key = Key::parse(name)?;
        self.command(Command::Input(key.to_escape_sequence()))
    }

    /// Current screen, state and counters.
    pub async fn snapshot(&self) -> Result<SessionSnapshot> {
        let (reply, response) = oneshot::channel();
        self.command(Command::Snapshot(reply))?;
        response.await.map_err(|_| stopped())
    }

    /// Close the session and wait for its driver to finish.
    pub async fn close(self) -> Result<SessionReport> {
        // Driver may already have stopped on a remote close
        let _ = self.commands.send(Command::Close);
        self.join().await
    }

    /// Wait for the session to end on its own.
    pub async fn join(self) -> Result<SessionReport> {
        self.task
            .await
            .map_err(|e| Error::Driver(e.to_string()))
    }

    fn command(&self, command: Command) -> Result<()> {
        self.commands.send(command).map_err(|_| stopped())
    }
}

fn stopped() -> Error {
    Error::Driver("session driver has stopped".to_string())
}

fn publish(info: &watch::Sender<SessionInfo>, bridge: &SessionBridge) {
    info.send_if_modified(|current| {
        if current == bridge.info() {
            false
        } else {
            *current = bridge.info().clone();
            true
        }
    });
}

fn snapshot(bridge: &SessionBridge) -> SessionSnapshot {
    SessionSnapshot {
        info: bridge.info().clone(),
        screen: bridge.screen_text(),
        title: bridge
            .surface()
            .and_then(|surface| surface.title())
            .map(str::to_string),
        stats: bridge.stats(),
    }
}

async fn connect_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

async fn drive(
    mut bridge: SessionBridge,
    mut commands: mpsc::UnboundedReceiver<Command>,
    info: watch::Sender<SessionInfo>,
    timeout: Option<Duration>,
) -> SessionReport {
    let deadline = timeout.map(|timeout| Instant::now() + timeout);
    let mut sources_open = true;
    debug!("Session driver started: id={}", bridge.info().id);

    loop {
        publish(&info, &bridge);
        if bridge.state().is_closed() {
            break;
        }
        let connecting = *bridge.state() == SessionState::Connecting;

        // Host commands first so a flooding remote cannot starve them. Each
        // command catches up on a bounded slice of queued events before it
        // runs.
        tokio::select! {
            biased;
            command = commands.recv() => {
                bridge.pump_at_most(COMMAND_CATCH_UP);
                match command {
                    Some(Command::Input(data)) => {
                        bridge.dispatch_input(&data);
                    }
                    Some(Command::Close) => {
                        bridge.close();
                    }
                    Some(Command::Snapshot(reply)) => {
                        // Caller may have stopped waiting
                        let _ = reply.send(snapshot(&bridge));
                    }
                    None => {
                        bridge.host_destroyed();
                    }
                }
            },
            event = bridge.next_event(), if sources_open => match event {
                Some(event) => bridge.apply(event),
                None => sources_open = false,
            },
            () = connect_deadline(deadline), if connecting && deadline.is_some() => {
                if let Some(timeout) = timeout {
                    bridge.expire_connect(timeout);
                }
            }
        }
    }

    let id = bridge.info().id;
    let transcript_path = match bridge.take_pending_transcript() {
        // Finish the file off the async workers
        Some(pending) => match tokio::task::spawn_blocking(move || pending.wait()).await {
            Ok(Ok(path)) => Some(path),
            Ok(Err(e)) => {
                warn!("Failed to write transcript: id={}: {}", id, e);
                None
            }
            Err(e) => {
                warn!("Transcript writer failed: id={}: {}", id, e);
                None
            }
        },
        None => None,
    };

    debug!("Session driver finished: id={}", id);
    SessionReport {
        info: bridge.info().clone(),
        transcript: bridge
            .surface()
            .map(|surface| surface.transcript().to_string())
            .unwrap_or_default(),
        screen: bridge.screen_text(),
        stats: bridge.stats(),
        transcript_path,
    }
}
