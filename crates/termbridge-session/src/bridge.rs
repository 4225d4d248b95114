//! The session bridge.
//!
//! A [`SessionBridge`] drives one session through
//! `Idle -> Connecting -> Connected -> Closed` and shuttles frames between
//! its [`TerminalSurface`] and its [`Transport`]. Every way a session can end
//! (remote close, transport error, caller close, host destruction, connect
//! timeout, failed startup) goes through the same teardown, which runs at
//! most once.
//!
//! The bridge itself is synchronous. Event sources (transport subscription
//! and viewport listener) are drained either with [`SessionBridge::pump`] or
//! awaited with [`SessionBridge::next_event`]; the async driver in
//! [`crate::driver`] does the latter.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use termbridge_core::{
    BridgeConfig, CloseCode, CloseReason, Dimensions, Error, Frame, Inbound, Key, PixelSize,
    Result, SessionId, SessionInfo, SessionState, Target,
};
use termbridge_surface::{Mount, PendingCast, TerminalSurface};

use crate::transport::{ConnectionFactory, ReadyState, Subscription, Transport, TransportEvent};

const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const RESET: &str = "\x1b[0m";

/// Options supplied by the host when opening a session.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Container the terminal surface is attached to
    pub mount: Option<Mount>,
    /// Whether the host has credentials configured for the target. Only
    /// used for an advisory line after connecting.
    pub credentials_configured: bool,
}

impl SessionOptions {
    /// Options attaching to `mount`.
    pub fn with_mount(mount: Mount) -> Self {
        Self {
            mount: Some(mount),
            ..Self::default()
        }
    }

    /// Set the credentials hint.
    pub fn credentials_configured(mut self, configured: bool) -> Self {
        self.credentials_configured = configured;
        self
    }
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            mount: None,
            credentials_configured: true,
        }
    }
}

/// Frame traffic counters for one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BridgeStats {
    /// `input` frames sent
    pub input_frames_sent: u64,
    /// `resize` frames sent
    pub resize_frames_sent: u64,
    /// Inbound messages handled
    pub messages_received: u64,
    /// Inbound messages that were not frames
    pub raw_messages: u64,
    /// Keystrokes dropped because the session was not connected
    pub input_dropped: u64,
    /// Geometry updates dropped because the session was not connected
    pub resize_dropped: u64,
}

/// Something the bridge has to react to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeEvent {
    /// An event raised by the transport
    Transport(TransportEvent),
    /// The container's bounds changed
    Viewport(Option<PixelSize>),
}

/// State machine for one remote terminal session.
pub struct SessionBridge {
    info: SessionInfo,
    config: Arc<BridgeConfig>,
    factory: Arc<dyn ConnectionFactory>,
    transport: Option<Box<dyn Transport>>,
    subscription: Option<Subscription>,
    surface: Option<TerminalSurface>,
    viewport: Option<Mount>,
    input: Option<mpsc::UnboundedReceiver<String>>,
    last_sent_geometry: Option<Dimensions>,
    credentials_configured: bool,
    was_open: bool,
    stats: BridgeStats,
    transcript_path: Option<PathBuf>,
    pending_transcript: Option<PendingCast>,
}

impl std::fmt::Debug for SessionBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionBridge")
            .field("info", &self.info)
            .field("transport", &self.transport.as_ref().map(|t| t.ready_state()))
            .field("subscription", &self.subscription)
            .field("surface", &self.surface)
            .field("last_sent_geometry", &self.last_sent_geometry)
            .field("stats", &self.stats)
            .finish()
    }
}

impl SessionBridge {
    /// Create an idle session for `target`.
    pub fn new(
        target: impl Into<Target>,
        factory: Arc<dyn ConnectionFactory>,
        config: Arc<BridgeConfig>,
    ) -> Self {
        let info = SessionInfo::new(SessionId::new(), target.into());
        debug!("Session created: id={}, target={}", info.id, info.target);
        Self {
            info,
            config,
            factory,
            transport: None,
            subscription: None,
            surface: None,
            viewport: None,
            input: None,
            last_sent_geometry: None,
            credentials_configured: true,
            was_open: false,
            stats: BridgeStats::default(),
            transcript_path: None,
            pending_transcript: None,
        }
    }

    /// Open the session: attach the surface and ask the factory for a
    /// transport.
    ///
    /// On failure the session is already `Closed` when this returns.
    pub fn open(&mut self, options: SessionOptions) -> Result<()> {
        if self.info.state != SessionState::Idle {
            return Err(Error::SessionAlreadyStarted(self.info.state.to_string()));
        }
        let SessionOptions {
            mount,
            credentials_configured,
        } = options;
        self.credentials_configured = credentials_configured;

        let Some(mount) = mount.filter(Mount::is_available) else {
            warn!(
                "No terminal container available: id={}, target={}",
                self.info.id, self.info.target
            );
            self.teardown(CloseReason::AttachmentFailed, None);
            return Err(Error::Attachment("no mount point available".to_string()));
        };

        self.info.state = SessionState::Connecting;
        info!(
            "Opening session: id={}, target={}",
            self.info.id, self.info.target
        );

        let mut surface = TerminalSurface::new(&self.config.terminal);
        if self.config.recording.enabled {
            if let Err(e) =
                surface.start_recording(&self.config.recording.directory, self.info.target.as_str())
            {
                warn!("Transcript not recorded: id={}: {}", self.info.id, e);
            }
        }
        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let attached = surface.attach(Some(mount.clone())).and_then(|()| {
            surface.on_input(move |data| {
                // Receiver lives as long as the session is open
                let _ = input_tx.send(data.to_string());
            })
        });
        self.info.geometry = surface.fit();
        self.surface = Some(surface);
        if let Err(e) = attached {
            self.teardown(CloseReason::AttachmentFailed, None);
            return Err(e);
        }
        self.input = Some(input_rx);
        let connecting = self.config.session.connecting_line(&self.info.target);
        self.write_line(&connecting);

        let mut transport = match self.factory.connect(&self.info.target) {
            Ok(transport) => transport,
            Err(e) => {
                let reason = match &e {
                    Error::ConnectFailure { reason, .. } => reason.clone(),
                    other => other.to_string(),
                };
                warn!(
                    "Connect failed: id={}, target={}: {}",
                    self.info.id, self.info.target, reason
                );
                self.fail(CloseReason::ConnectFailure { code: None, reason }, None);
                return Err(e);
            }
        };

        let subscription = match transport.subscribe() {
            Ok(subscription) => subscription,
            Err(e) => {
                self.transport = Some(transport);
                self.fail(
                    CloseReason::ConnectFailure {
                        code: None,
                        reason: e.to_string(),
                    },
                    None,
                );
                return Err(e);
            }
        };

        self.transport = Some(transport);
        self.subscription = Some(subscription);
        self.viewport = Some(mount);
        Ok(())
    }

    /// React to one event.
    pub fn apply(&mut self, event: BridgeEvent) {
        match event {
            BridgeEvent::Transport(event) => self.handle_transport_event(event),
            BridgeEvent::Viewport(bounds) => {
                trace!("Viewport changed: id={}, bounds={:?}", self.info.id, bounds);
                self.viewport_changed();
            }
        }
    }

    /// React to a transport event. Events arriving after close are ignored.
    pub fn handle_transport_event(&mut self, event: TransportEvent) {
        if !self.info.state.is_live() {
            trace!(
                "Ignoring transport event after close: id={}, event={:?}",
                self.info.id,
                event
            );
            return;
        }
        match event {
            TransportEvent::Open => self.on_open(),
            TransportEvent::Message(payload) => self.on_message(&payload),
            TransportEvent::Error(message) => {
                warn!("Transport error: id={}: {}", self.info.id, message);
                self.fail(CloseReason::TransportError, Some(message));
            }
            TransportEvent::Close { code, reason } => self.on_close(code, reason),
        }
    }

    fn on_open(&mut self) {
        if self.info.state != SessionState::Connecting {
            return;
        }
        self.info.state = SessionState::Connected;
        self.was_open = true;
        info!(
            "Session connected: id={}, target={}",
            self.info.id, self.info.target
        );

        let Some(surface) = self.surface.as_mut() else {
            return;
        };
        let dimensions = surface.fit().unwrap_or_else(|| surface.dimensions());
        self.info.geometry = Some(dimensions);
        self.send_resize(dimensions);

        let connected = self.config.session.connected_message.clone();
        self.write_line(&connected);
        if !self.credentials_configured {
            let warning = format!(
                "{YELLOW}{}{RESET}",
                self.config.session.credentials_warning
            );
            self.write_line(&warning);
        }
    }

    fn on_message(&mut self, payload: &str) {
        self.stats.messages_received += 1;
        let inbound = Inbound::decode(payload);
        if let Inbound::Raw(_) = inbound {
            self.stats.raw_messages += 1;
            debug!(
                "Non-frame message, writing verbatim: id={}, {} bytes",
                self.info.id,
                payload.len()
            );
        }
        match (inbound.display_text(), self.surface.as_mut()) {
            (Some(text), Some(surface)) => surface.write(text),
            (None, _) => trace!("Ignoring inbound frame: id={}", self.info.id),
            (Some(_), None) => {}
        }
    }

    fn on_close(&mut self, code: CloseCode, reason: String) {
        let reason = CloseReason::from_remote(code, reason, self.was_open);
        info!(
            "Transport closed by remote: id={}, code={}, reason={}",
            self.info.id, code, reason
        );
        if reason.is_abnormal() {
            self.fail(reason, None);
        } else {
            self.teardown(reason, None);
        }
    }

    /// Render the failure, then tear down.
    fn fail(&mut self, reason: CloseReason, detail: Option<String>) -> bool {
        if let Some(message) = failure_message(&reason, detail.as_deref()) {
            self.write_line(&format!("{RED}{message}{RESET}"));
        }
        self.teardown(reason, detail)
    }

    fn write_line(&mut self, line: &str) {
        if let Some(surface) = self.surface.as_mut() {
            surface.write(&format!("\r\n{line}\r\n"));
        }
    }

    fn can_send(&self) -> bool {
        self.info.state.is_connected()
            && self.transport.as_ref().is_some_and(|t| t.is_open())
    }

    fn send_frame(&mut self, frame: &Frame) -> bool {
        let payload = match frame.encode() {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Failed to encode {} frame: {}", frame.kind(), e);
                return false;
            }
        };
        let Some(transport) = self.transport.as_mut() else {
            return false;
        };
        match transport.send(&payload) {
            Ok(()) => {
                debug!(
                    "Sent {} frame: id={}, {} bytes",
                    frame.kind(),
                    self.info.id,
                    payload.len()
                );
                true
            }
            Err(e) => {
                warn!("Send failed: id={}: {}", self.info.id, e);
                self.fail(CloseReason::TransportError, Some(e.to_string()));
                false
            }
        }
    }

    fn send_resize(&mut self, dimensions: Dimensions) -> bool {
        if !self.can_send() {
            self.stats.resize_dropped += 1;
            debug!(
                "Dropping resize while {}: id={}",
                self.info.state, self.info.id
            );
            return false;
        }
        if !self.send_frame(&Frame::resize(dimensions)) {
            return false;
        }
        self.last_sent_geometry = Some(dimensions);
        self.stats.resize_frames_sent += 1;
        true
    }

    /// Send one captured keystroke or paste as an `input` frame.
    ///
    /// Silently dropped unless connected with an open transport. Returns
    /// whether a frame was sent.
    pub fn keystroke(&mut self, data: &str) -> bool {
        if !self.can_send() {
            self.stats.input_dropped += 1;
            debug!(
                "Dropping input while {}: id={}, {} bytes",
                self.info.state,
                self.info.id,
                data.len()
            );
            return false;
        }
        let sent = self.send_frame(&Frame::input(data));
        if sent {
            self.stats.input_frames_sent += 1;
        }
        sent
    }

    /// Host-side keystroke capture: hand `data` to the surface, which passes
    /// it to the session's input subscription.
    ///
    /// Returns whether an `input` frame was sent.
    pub fn dispatch_input(&mut self, data: &str) -> bool {
        let delivered = self
            .surface
            .as_mut()
            .is_some_and(|surface| surface.dispatch_input(data));
        if !delivered {
            self.stats.input_dropped += 1;
            debug!("No input subscription: id={}", self.info.id);
            return false;
        }
        self.drain_input() > 0
    }

    /// Translate a named key (`"enter"`, `"ctrl+c"`, `"f5"`) and send it.
    pub fn send_key(&mut self, name: &str) -> Result<bool> {
        let key = Key::parse(name)?;
        Ok(self.dispatch_input(&key.to_escape_sequence()))
    }

    fn drain_input(&mut self) -> usize {
        let mut sent = 0;
        while let Some(data) = self.input.as_mut().and_then(|rx| rx.try_recv().ok()) {
            if self.keystroke(&data) {
                sent += 1;
            }
        }
        sent
    }

    /// Refit the surface to the container and send a `resize` frame if the
    /// geometry differs from the last one sent.
    ///
    /// Returns the geometry that was sent, if any.
    pub fn viewport_changed(&mut self) -> Option<Dimensions> {
        if !self.info.state.is_live() {
            return None;
        }
        let dimensions = self.surface.as_mut()?.fit()?;
        self.info.geometry = Some(dimensions);
        if self.last_sent_geometry == Some(dimensions) {
            trace!("Geometry unchanged: id={}, {}", self.info.id, dimensions);
            return None;
        }
        self.send_resize(dimensions).then_some(dimensions)
    }

    /// Close the session at the caller's request.
    ///
    /// Safe from any state. Returns false if it was already closed.
    pub fn close(&mut self) -> bool {
        self.teardown(CloseReason::UserClosed, None)
    }

    /// Close the session because the hosting view went away.
    pub fn host_destroyed(&mut self) -> bool {
        self.teardown(CloseReason::HostDestroyed, None)
    }

    /// Give up on a session still connecting after `timeout`.
    pub fn expire_connect(&mut self, timeout: Duration) -> bool {
        if self.info.state != SessionState::Connecting {
            return false;
        }
        let after_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        warn!(
            "Connect timed out: id={}, target={}, after {}ms",
            self.info.id, self.info.target, after_ms
        );
        self.fail(CloseReason::ConnectTimeout { after_ms }, None)
    }

    /// The single teardown path.
    fn teardown(&mut self, reason: CloseReason, detail: Option<String>) -> bool {
        if self.info.state.is_closed() {
            return false;
        }

        if let Some(mut subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
        if let Some(mut transport) = self.transport.take() {
            if transport.ready_state() != ReadyState::Closed {
                transport.close(reason.local_close_code(), &reason.to_string());
            }
        }
        if let Some(surface) = self.surface.as_mut() {
            surface.dispose();
            if let Some(recorder) = surface.take_recording() {
                let pending = recorder.finish();
                info!(
                    "Transcript closed: id={}, path={}",
                    self.info.id,
                    pending.path().display()
                );
                self.transcript_path = Some(pending.path().to_path_buf());
                self.pending_transcript = Some(pending);
            }
        }
        self.viewport = None;
        self.input = None;

        self.info.last_error = match (reason.error_message(), detail) {
            (Some(message), Some(detail)) => Some(format!("{message}: {detail}")),
            (message, _) => message,
        };
        info!(
            "Session closed: id={}, target={}, reason={}",
            self.info.id, self.info.target, reason
        );
        self.info.state = SessionState::Closed { reason };
        true
    }

    /// Handle every event that is already queued, without waiting.
    ///
    /// Returns the number of events handled.
    pub fn pump(&mut self) -> usize {
        self.pump_at_most(usize::MAX)
    }

    /// Handle at most `limit` queued events, without waiting.
    ///
    /// Returns the number of events handled.
    pub fn pump_at_most(&mut self, limit: usize) -> usize {
        let mut handled = 0;
        while handled < limit {
            if let Some(event) = self.subscription.as_mut().and_then(Subscription::try_recv) {
                self.handle_transport_event(event);
            } else if let Some(bounds) = self.viewport.as_mut().and_then(Mount::take_change) {
                self.apply(BridgeEvent::Viewport(bounds));
            } else {
                break;
            }
            handled += 1;
        }
        handled
    }

    /// Wait for the next event from the transport or the viewport.
    ///
    /// Returns `None` once neither source can produce anything, which is
    /// always the case after teardown.
    pub async fn next_event(&mut self) -> Option<BridgeEvent> {
        let Self {
            subscription,
            viewport,
            ..
        } = self;
        tokio::select! {
            biased;
            Some(event) = transport_event(subscription) => Some(BridgeEvent::Transport(event)),
            Some(bounds) = viewport_event(viewport) => Some(BridgeEvent::Viewport(bounds)),
            else => None,
        }
    }

    /// Session snapshot for status display.
    pub fn info(&self) -> &SessionInfo {
        &self.info
    }

    /// Current state.
    pub fn state(&self) -> &SessionState {
        &self.info.state
    }

    /// The terminal surface, once created. Stays readable after close.
    pub fn surface(&self) -> Option<&TerminalSurface> {
        self.surface.as_ref()
    }

    /// Visible screen as plain text.
    pub fn screen_text(&self) -> String {
        self.surface
            .as_ref()
            .map(TerminalSurface::screen_text)
            .unwrap_or_default()
    }

    /// Last geometry sent to the remote side.
    pub fn last_sent_geometry(&self) -> Option<Dimensions> {
        self.last_sent_geometry
    }

    /// Traffic counters.
    pub fn stats(&self) -> BridgeStats {
        self.stats
    }

    /// Where the transcript was written, if recording was enabled.
    pub fn transcript_path(&self) -> Option<&Path> {
        self.transcript_path.as_deref()
    }

    /// The closed transcript, which may still be flushing to disk.
    ///
    /// Available once after teardown if recording was enabled.
    pub fn take_pending_transcript(&mut self) -> Option<PendingCast> {
        self.pending_transcript.take()
    }
}

impl Drop for SessionBridge {
    fn drop(&mut self) {
        self.host_destroyed();
    }
}

fn failure_message(reason: &CloseReason, detail: Option<&str>) -> Option<String> {
    let message = reason.error_message()?;
    Some(match detail {
        Some(detail) => format!("{message}: {detail}"),
        None => message,
    })
}

async fn transport_event(subscription: &mut Option<Subscription>) -> Option<TransportEvent> {
    match subscription {
        Some(subscription) => subscription.recv().await,
        None => None,
    }
}

async fn viewport_event(viewport: &mut Option<Mount>) -> Option<Option<PixelSize>> {
    match viewport {
        Some(mount) => mount.changed().await,
        None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryConnector, RemotePeer};
    use termbridge_core::TerminalSettings;
    use termbridge_surface::MountPoint;

    fn config() -> Arc<BridgeConfig> {
        Arc::new(BridgeConfig {
            terminal: TerminalSettings {
                cell_width: 10,
                cell_height: 20,
                ..Default::default()
            },
            ..Default::default()
        })
    }

    struct Fixture {
        bridge: SessionBridge,
        peer: RemotePeer,
        point: MountPoint,
        connector: MemoryConnector,
    }

    fn open_with(options: impl FnOnce(Mount) -> SessionOptions) -> Fixture {
        let connector = MemoryConnector::new();
        let point = MountPoint::with_bounds(PixelSize::new(800, 480));
        let mut bridge = SessionBridge::new("vm-42", Arc::new(connector.clone()), config());
        bridge.open(options(point.mount())).unwrap();
        let (_, peer) = connector.try_next_peer().unwrap();
        Fixture {
            bridge,
            peer,
            point,
            connector,
        }
    }

    fn open() -> Fixture {
        open_with(SessionOptions::with_mount)
    }

    fn connected() -> Fixture {
        let mut f = open();
        f.peer.open();
        f.bridge.pump();
        f
    }

    fn transcript(bridge: &SessionBridge) -> String {
        bridge.surface().unwrap().transcript().to_string()
    }

    #[test]
    fn test_open_starts_connecting() {
        let f = open();
        assert_eq!(*f.bridge.state(), SessionState::Connecting);
        assert!(transcript(&f.bridge).contains("Connecting to vm-42..."));
        assert!(f.peer.is_subscribed());
        assert_eq!(f.bridge.info().geometry, Some(Dimensions::new(24, 80)));
    }

    #[test]
    fn test_open_sends_exactly_one_resize() {
        let f = connected();
        assert_eq!(*f.bridge.state(), SessionState::Connected);
        assert_eq!(
            f.peer.sent_frames(),
            vec![Frame::resize(Dimensions::new(24, 80))]
        );
        assert!(transcript(&f.bridge).contains("Connected."));
        assert!(!transcript(&f.bridge).contains("Warning"));
    }

    #[test]
    fn test_missing_credentials_writes_warning() {
        let mut f = open_with(|mount| SessionOptions::with_mount(mount).credentials_configured(false));
        f.peer.open();
        f.bridge.pump();
        assert!(transcript(&f.bridge).contains("no SSH credentials"));
        assert_eq!(*f.bridge.state(), SessionState::Connected);
    }

    #[test]
    fn test_open_without_mount_never_connects() {
        let connector = MemoryConnector::new();
        let mut bridge = SessionBridge::new("vm-42", Arc::new(connector.clone()), config());

        let result = bridge.open(SessionOptions::default());
        assert!(matches!(result, Err(Error::Attachment(_))));
        assert_eq!(
            bridge.state().close_reason(),
            Some(&CloseReason::AttachmentFailed)
        );
        assert_eq!(connector.connect_count(), 0);
    }

    #[test]
    fn test_open_with_unlaid_mount_fails() {
        let connector = MemoryConnector::new();
        let point = MountPoint::new();
        let mut bridge = SessionBridge::new("vm-42", Arc::new(connector.clone()), config());

        assert!(bridge.open(SessionOptions::with_mount(point.mount())).is_err());
        assert!(bridge.state().is_closed());
        assert_eq!(connector.connect_count(), 0);
    }

    #[test]
    fn test_connect_failure_is_rendered() {
        let connector = MemoryConnector::new();
        connector.refuse("no route to host");
        let point = MountPoint::with_bounds(PixelSize::new(800, 480));
        let mut bridge = SessionBridge::new("vm-42", Arc::new(connector), config());

        let result = bridge.open(SessionOptions::with_mount(point.mount()));
        assert!(matches!(result, Err(Error::ConnectFailure { .. })));
        assert_eq!(
            bridge.state().close_reason(),
            Some(&CloseReason::ConnectFailure {
                code: None,
                reason: "no route to host".to_string()
            })
        );
        assert!(transcript(&bridge).contains("Unable to connect: no route to host"));
        assert_eq!(
            bridge.info().last_error.as_deref(),
            Some("Unable to connect: no route to host")
        );
        assert_eq!(point.listener_count(), 0);
    }

    #[test]
    fn test_open_twice_fails() {
        let mut f = open();
        let result = f.bridge.open(SessionOptions::with_mount(f.point.mount()));
        assert!(matches!(result, Err(Error::SessionAlreadyStarted(_))));
        assert_eq!(f.connector.connect_count(), 1);
    }

    #[test]
    fn test_input_dropped_while_connecting() {
        let mut f = open();
        assert!(!f.bridge.dispatch_input("x"));
        assert_eq!(f.bridge.stats().input_dropped, 1);

        f.peer.open();
        f.bridge.pump();
        assert!(f.bridge.dispatch_input("y"));
        assert_eq!(
            f.peer.sent_frames(),
            vec![Frame::resize(Dimensions::new(24, 80)), Frame::input("y")]
        );
    }

    #[test]
    fn test_keystrokes_sent_in_order() {
        let mut f = connected();
        for key in ["l", "s", "\r"] {
            assert!(f.bridge.dispatch_input(key));
        }
        let inputs: Vec<Frame> = f.peer.sent_frames().into_iter().skip(1).collect();
        assert_eq!(
            inputs,
            vec![Frame::input("l"), Frame::input("s"), Frame::input("\r")]
        );
        assert_eq!(f.bridge.stats().input_frames_sent, 3);
    }

    #[test]
    fn test_send_key() {
        let mut f = connected();
        assert!(f.bridge.send_key("ctrl+c").unwrap());
        assert_eq!(f.peer.sent_frames().last(), Some(&Frame::input("\x03")));
        assert!(matches!(
            f.bridge.send_key("bogus+key"),
            Err(Error::InvalidKey(_))
        ));
    }

    #[test]
    fn test_output_written_verbatim() {
        let mut f = connected();
        f.peer.send_output("hello\r\n");
        f.bridge.pump();
        assert!(transcript(&f.bridge).ends_with("hello\r\n"));
    }

    #[test]
    fn test_malformed_frame_written_raw() {
        let mut f = connected();
        f.peer.send_raw("plain text, not json");
        f.bridge.pump();
        assert!(transcript(&f.bridge).ends_with("plain text, not json"));
        assert_eq!(f.bridge.stats().raw_messages, 1);
    }

    #[test]
    fn test_inbound_non_output_frames_ignored() {
        let mut f = connected();
        let before = transcript(&f.bridge);
        f.peer
            .send_raw(&Frame::resize(Dimensions::new(10, 10)).encode().unwrap());
        f.bridge.pump();
        assert_eq!(transcript(&f.bridge), before);
        assert_eq!(f.bridge.stats().messages_received, 1);
    }

    #[test]
    fn test_resize_deduplicated() {
        let mut f = connected();
        f.point.set_bounds(PixelSize::new(400, 200));
        f.bridge.pump();
        f.point.set_bounds(PixelSize::new(405, 205));
        f.bridge.pump();

        assert_eq!(
            f.peer.sent_frames(),
            vec![
                Frame::resize(Dimensions::new(24, 80)),
                Frame::resize(Dimensions::new(10, 40)),
            ]
        );
        assert_eq!(f.bridge.last_sent_geometry(), Some(Dimensions::new(10, 40)));
    }

    #[test]
    fn test_abnormal_close_renders_code_and_reason() {
        let mut f = connected();
        f.peer.close(CloseCode::Abnormal, "peer reset");
        f.bridge.pump();

        let text = transcript(&f.bridge);
        assert!(text.contains("1006"));
        assert!(text.contains("peer reset"));
        let reason = f.bridge.state().close_reason().unwrap();
        assert_eq!(reason.to_string(), "peer reset");
        assert!(f.bridge.info().last_error.is_some());

        assert_eq!(f.peer.unsubscribe_count(), 1);
        assert_eq!(f.point.listener_count(), 0);
        assert!(f.bridge.surface().unwrap().is_disposed());
        // Remote already closed the channel
        assert_eq!(f.peer.local_close(), None);
    }

    #[test]
    fn test_normal_remote_close() {
        let mut f = connected();
        f.peer.close(CloseCode::Normal, "logout");
        f.bridge.pump();
        assert!(matches!(
            f.bridge.state().close_reason(),
            Some(CloseReason::Normal { .. })
        ));
        assert_eq!(f.bridge.info().last_error, None);
        assert!(!transcript(&f.bridge).contains(RED));
    }

    #[test]
    fn test_close_before_open_is_connect_failure() {
        let mut f = open();
        f.peer.close(CloseCode::PolicyViolation, "VM not found");
        f.bridge.pump();
        assert!(matches!(
            f.bridge.state().close_reason(),
            Some(CloseReason::ConnectFailure { code: Some(CloseCode::PolicyViolation), .. })
        ));
        assert!(transcript(&f.bridge).contains("VM not found"));
    }

    #[test]
    fn test_user_close_sends_normal_code_once() {
        let mut f = connected();
        assert!(f.bridge.close());
        assert!(!f.bridge.close());
        assert!(!f.bridge.host_destroyed());

        assert_eq!(
            f.peer.local_close(),
            Some((CloseCode::Normal, "closed by user".to_string()))
        );
        assert_eq!(f.peer.unsubscribe_count(), 1);
        assert_eq!(f.bridge.info().last_error, None);
        assert!(!transcript(&f.bridge).contains(RED));
        assert_eq!(f.bridge.state().close_reason(), Some(&CloseReason::UserClosed));
    }

    #[test]
    fn test_close_while_connecting() {
        let mut f = open();
        assert!(f.bridge.close());
        assert_eq!(f.peer.ready_state(), ReadyState::Closed);

        // A late open is discarded
        f.peer.open();
        assert_eq!(f.bridge.pump(), 0);
        assert_eq!(f.bridge.state().close_reason(), Some(&CloseReason::UserClosed));
    }

    #[test]
    fn test_close_from_idle() {
        let mut bridge = SessionBridge::new("vm-1", Arc::new(MemoryConnector::new()), config());
        assert!(bridge.close());
        assert!(bridge.state().is_closed());
    }

    #[test]
    fn test_transport_error() {
        let mut f = connected();
        f.peer.fail("boom");
        f.bridge.pump();
        assert_eq!(
            f.bridge.state().close_reason(),
            Some(&CloseReason::TransportError)
        );
        assert_eq!(
            f.bridge.info().last_error.as_deref(),
            Some("Transport error: boom")
        );
        assert_eq!(f.peer.local_close().map(|(code, _)| code), Some(CloseCode::InternalError));
    }

    #[test]
    fn test_events_after_close_are_ignored() {
        let mut f = connected();
        f.bridge.close();
        let before = transcript(&f.bridge);
        f.bridge
            .handle_transport_event(TransportEvent::Message("late".to_string()));
        assert_eq!(transcript(&f.bridge), before);
        assert!(!f.bridge.dispatch_input("x"));
    }

    #[test]
    fn test_drop_is_host_destruction() {
        let f = connected();
        let peer = f.peer.clone();
        drop(f);
        assert_eq!(
            peer.local_close(),
            Some((CloseCode::Normal, "view closed".to_string()))
        );
        assert_eq!(peer.unsubscribe_count(), 1);
    }

    #[test]
    fn test_expire_connect() {
        let mut f = open();
        assert!(f.bridge.expire_connect(Duration::from_millis(250)));
        assert_eq!(
            f.bridge.state().close_reason(),
            Some(&CloseReason::ConnectTimeout { after_ms: 250 })
        );
        assert_eq!(
            f.peer.local_close().map(|(code, _)| code),
            Some(CloseCode::GoingAway)
        );
        assert!(transcript(&f.bridge).contains("timed out"));

        let mut g = connected();
        assert!(!g.bridge.expire_connect(Duration::from_millis(250)));
    }

    #[test]
    fn test_transcript_saved_on_teardown() {
        let dir = std::env::temp_dir().join(format!("termbridge-bridge-{}", SessionId::new()));
        let mut config = (*config()).clone();
        config.recording.enabled = true;
        config.recording.directory = dir.clone();

        let connector = MemoryConnector::new();
        let point = MountPoint::with_bounds(PixelSize::new(800, 480));
        let mut bridge = SessionBridge::new("vm-42", Arc::new(connector.clone()), Arc::new(config));
        bridge.open(SessionOptions::with_mount(point.mount())).unwrap();
        let (_, peer) = connector.try_next_peer().unwrap();
        peer.open();
        peer.send_output("$ ");
        bridge.pump();
        bridge.close();

        let path = bridge.transcript_path().unwrap().to_path_buf();
        assert!(path.starts_with(&dir));
        assert_eq!(bridge.take_pending_transcript().unwrap().wait().unwrap(), path);
        assert!(bridge.take_pending_transcript().is_none());
        let recorded = std::fs::read_to_string(&path).unwrap();
        assert!(recorded.contains("\"o\""));
        std::fs::remove_dir_all(dir).ok();
    }

    #[tokio::test]
    async fn test_next_event_yields_transport_then_viewport() {
        let mut f = open();
        f.peer.open();
        let event = f.bridge.next_event().await;
        assert_eq!(event, Some(BridgeEvent::Transport(TransportEvent::Open)));
        f.bridge.apply(event.unwrap());

        f.point.set_bounds(PixelSize::new(400, 200));
        let event = f.bridge.next_event().await.unwrap();
        assert!(matches!(event, BridgeEvent::Viewport(Some(_))));
        f.bridge.apply(event);
        assert_eq!(f.bridge.last_sent_geometry(), Some(Dimensions::new(10, 40)));

        f.bridge.close();
        assert_eq!(f.bridge.next_event().await, None);
    }
}
