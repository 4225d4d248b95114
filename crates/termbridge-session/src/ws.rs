//! WebSocket transport.
//!
//! [`WsConnector`] maps a target onto the configured endpoint template and
//! opens a client connection on the current tokio runtime. The socket is
//! owned by a background task; [`WsTransport`] talks to it over a command
//! channel and reports everything it sees through an [`EventHub`].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::{SinkExt, StreamExt};
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode as WsCloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use termbridge_core::config::TARGET_PLACEHOLDER;
use termbridge_core::{CloseCode, Error, Result, SessionSettings, Target};

use crate::transport::{
    ConnectionFactory, EventHub, ReadyState, Subscription, Transport, TransportEvent,
};

/// Bytes escaped when a target becomes one URL path segment.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'\\')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Connection factory for WebSocket session hosts.
#[derive(Debug, Clone)]
pub struct WsConnector {
    endpoint_template: String,
}

impl WsConnector {
    /// Connector for `endpoint_template`, in which `{target}` is replaced by
    /// the session target.
    pub fn new(endpoint_template: impl Into<String>) -> Self {
        Self {
            endpoint_template: endpoint_template.into(),
        }
    }

    /// Connector using the configured endpoint template.
    pub fn from_settings(settings: &SessionSettings) -> Self {
        Self::new(settings.endpoint_template.clone())
    }

    /// Endpoint URL for `target`, percent-encoded as a single path segment.
    pub fn endpoint_for(&self, target: &Target) -> String {
        let segment = utf8_percent_encode(target.as_str(), PATH_SEGMENT).to_string();
        self.endpoint_template.replace(TARGET_PLACEHOLDER, &segment)
    }
}

fn check_endpoint(target: &Target, url: &str) -> Result<()> {
    if url.starts_with("ws://") || url.starts_with("wss://") {
        Ok(())
    } else {
        Err(Error::ConnectFailure {
            target: target.to_string(),
            reason: format!("unsupported endpoint: {url}"),
        })
    }
}

impl ConnectionFactory for WsConnector {
    fn connect(&self, target: &Target) -> Result<Box<dyn Transport>> {
        let url = self.endpoint_for(target);
        check_endpoint(target, &url)?;

        let runtime =
            tokio::runtime::Handle::try_current().map_err(|_| Error::ConnectFailure {
                target: target.to_string(),
                reason: "no async runtime available".to_string(),
            })?;

        let hub = EventHub::new();
        let ready = Arc::new(Mutex::new(ReadyState::Connecting));
        let (commands, command_rx) = mpsc::unbounded_channel();

        info!("Connecting to {} for target={}", url, target);
        runtime.spawn(run_socket(url, hub.clone(), ready.clone(), command_rx));

        Ok(Box::new(WsTransport {
            hub,
            ready,
            commands,
        }))
    }
}

#[derive(Debug)]
enum Command {
    Send(String),
    Close { code: CloseCode, reason: String },
}

fn lock(ready: &Mutex<ReadyState>) -> MutexGuard<'_, ReadyState> {
    ready.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Client side of a WebSocket session channel.
#[derive(Debug)]
pub struct WsTransport {
    hub: EventHub,
    ready: Arc<Mutex<ReadyState>>,
    commands: mpsc::UnboundedSender<Command>,
}

impl Transport for WsTransport {
    fn send(&mut self, payload: &str) -> Result<()> {
        if *lock(&self.ready) != ReadyState::Open {
            return Err(Error::TransportClosed);
        }
        self.commands
            .send(Command::Send(payload.to_string()))
            .map_err(|_| Error::TransportClosed)
    }

    fn ready_state(&self) -> ReadyState {
        *lock(&self.ready)
    }

    fn close(&mut self, code: CloseCode, reason: &str) {
        {
            let mut ready = lock(&self.ready);
            if *ready == ReadyState::Closed {
                return;
            }
            *ready = ReadyState::Closed;
        }
        // The socket task may already be gone
        let _ = self.commands.send(Command::Close {
            code,
            reason: reason.to_string(),
        });
    }

    fn subscribe(&mut self) -> Result<Subscription> {
        self.hub.subscribe()
    }
}

/// Marks the transport closed. Returns false if it already was.
fn mark_closed(ready: &Mutex<ReadyState>) -> bool {
    let mut state = lock(ready);
    let was_closed = *state == ReadyState::Closed;
    *state = ReadyState::Closed;
    !was_closed
}

fn close_frame(code: CloseCode, reason: String) -> Message {
    Message::Close(Some(CloseFrame {
        code: WsCloseCode::from(u16::from(code)),
        reason: reason.into(),
    }))
}

async fn run_socket(
    url: String,
    hub: EventHub,
    ready: Arc<Mutex<ReadyState>>,
    mut commands: mpsc::UnboundedReceiver<Command>,
) {
    let connect = tokio_tungstenite::connect_async(url.as_str());
    tokio::pin!(connect);

    let stream = loop {
        tokio::select! {
            result = &mut connect => match result {
                Ok((stream, _response)) => break stream,
                Err(e) => {
                    warn!("WebSocket connect to {} failed: {}", url, e);
                    if mark_closed(&ready) {
                        hub.emit(TransportEvent::Close {
                            code: CloseCode::Abnormal,
                            reason: e.to_string(),
                        });
                    }
                    return;
                }
            },
            command = commands.recv() => match command {
                // send() refuses while connecting
                Some(Command::Send(_)) => continue,
                Some(Command::Close { .. }) | None => {
                    debug!("WebSocket to {} abandoned while connecting", url);
                    return;
                }
            },
        }
    };

    {
        let mut state = lock(&ready);
        if *state != ReadyState::Connecting {
            debug!("WebSocket to {} opened after local close", url);
            return;
        }
        *state = ReadyState::Open;
    }
    info!("WebSocket open: {}", url);
    hub.emit(TransportEvent::Open);

    let (mut sink, mut source) = stream.split();
    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Send(payload)) => {
                    if let Err(e) = sink.send(Message::Text(payload)).await {
                        warn!("WebSocket send failed: {}", e);
                        if mark_closed(&ready) {
                            hub.emit(TransportEvent::Error(e.to_string()));
                        }
                        return;
                    }
                }
                Some(Command::Close { code, reason }) => {
                    debug!("Closing WebSocket {} code={}", url, code);
                    let _ = sink.send(close_frame(code, reason)).await;
                    return;
                }
                None => {
                    debug!("WebSocket transport dropped, closing {}", url);
                    mark_closed(&ready);
                    let _ = sink.send(close_frame(CloseCode::GoingAway, String::new())).await;
                    return;
                }
            },
            message = source.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    hub.emit(TransportEvent::Message(text));
                }
                Some(Ok(Message::Binary(bytes))) => {
                    hub.emit(TransportEvent::Message(
                        String::from_utf8_lossy(&bytes).into_owned(),
                    ));
                }
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = frame
                        .map(|f| (CloseCode::from(u16::from(f.code)), f.reason.into_owned()))
                        .unwrap_or((CloseCode::NoStatus, String::new()));
                    info!("WebSocket {} closed by peer code={}", url, code);
                    if mark_closed(&ready) {
                        hub.emit(TransportEvent::Close { code, reason });
                    }
                    // Flush the queued close reply to complete the handshake
                    if let Err(e) = sink.close().await {
                        debug!("WebSocket {} close reply not sent: {}", url, e);
                    }
                    return;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("WebSocket receive failed: {}", e);
                    if mark_closed(&ready) {
                        hub.emit(TransportEvent::Error(e.to_string()));
                    }
                    return;
                }
                None => {
                    if mark_closed(&ready) {
                        hub.emit(TransportEvent::Close {
                            code: CloseCode::Abnormal,
                            reason: "connection dropped".to_string(),
                        });
                    }
                    return;
                }
            },
        }
    }
}
