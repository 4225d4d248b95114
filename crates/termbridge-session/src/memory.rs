//! In-process transport pair.
//!
//! [`MemoryTransport`] is the session side; [`RemotePeer`] plays the remote
//! session host. The peer decides when the channel opens, what it says and
//! how it closes, and records every payload the session sent. Hosts use it
//! to embed a bridge over their own channel; the test suites use it as the
//! remote end.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;
use tracing::debug;

use termbridge_core::{CloseCode, Error, Frame, Result, Target};

use crate::transport::{
    ConnectionFactory, EventHub, ReadyState, Subscription, Transport, TransportEvent,
};

#[derive(Debug)]
struct Channel {
    ready: ReadyState,
    sent: Vec<String>,
    local_close: Option<(CloseCode, String)>,
}

#[derive(Debug, Clone)]
struct Shared {
    channel: Arc<Mutex<Channel>>,
    hub: EventHub,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Channel> {
        self.channel.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Session side of an in-process channel.
#[derive(Debug)]
pub struct MemoryTransport {
    shared: Shared,
}

/// Remote side of an in-process channel.
#[derive(Debug, Clone)]
pub struct RemotePeer {
    shared: Shared,
}

impl MemoryTransport {
    /// Create a connected pair, initially connecting.
    pub fn pair() -> (MemoryTransport, RemotePeer) {
        let shared = Shared {
            channel: Arc::new(Mutex::new(Channel {
                ready: ReadyState::Connecting,
                sent: Vec::new(),
                local_close: None,
            })),
            hub: EventHub::new(),
        };
        (
            MemoryTransport {
                shared: shared.clone(),
            },
            RemotePeer { shared },
        )
    }
}

impl Transport for MemoryTransport {
    fn send(&mut self, payload: &str) -> Result<()> {
        let mut channel = self.shared.lock();
        if channel.ready != ReadyState::Open {
            return Err(Error::TransportClosed);
        }
        channel.sent.push(payload.to_string());
        Ok(())
    }

    fn ready_state(&self) -> ReadyState {
        self.shared.lock().ready
    }

    fn close(&mut self, code: CloseCode, reason: &str) {
        let mut channel = self.shared.lock();
        if channel.ready == ReadyState::Closed {
            return;
        }
        channel.ready = ReadyState::Closed;
        channel.local_close = Some((code, reason.to_string()));
    }

    fn subscribe(&mut self) -> Result<Subscription> {
        self.shared.hub.subscribe()
    }
}

impl RemotePeer {
    /// Accept the connection.
    pub fn open(&self) {
        {
            let mut channel = self.shared.lock();
            if channel.ready != ReadyState::Connecting {
                return;
            }
            channel.ready = ReadyState::Open;
        }
        self.shared.hub.emit(TransportEvent::Open);
    }

    /// Send an `output` frame.
    pub fn send_output(&self, data: &str) {
        // Frame encoding of a plain string cannot fail
        let payload = Frame::output(data).encode().unwrap_or_default();
        self.send_raw(&payload);
    }

    /// Send a payload as-is.
    pub fn send_raw(&self, payload: &str) {
        self.shared.hub.emit(TransportEvent::Message(payload.to_string()));
    }

    /// Raise a transport error.
    pub fn fail(&self, message: &str) {
        self.shared.hub.emit(TransportEvent::Error(message.to_string()));
    }

    /// Close the channel from the remote side.
    pub fn close(&self, code: CloseCode, reason: &str) {
        {
            let mut channel = self.shared.lock();
            if channel.ready == ReadyState::Closed {
                return;
            }
            channel.ready = ReadyState::Closed;
        }
        self.shared.hub.emit(TransportEvent::Close {
            code,
            reason: reason.to_string(),
        });
    }

    /// Every payload the session sent, in order.
    pub fn sent(&self) -> Vec<String> {
        self.shared.lock().sent.clone()
    }

    /// Sent payloads decoded as frames. Payloads that are not frames are
    /// skipped.
    pub fn sent_frames(&self) -> Vec<Frame> {
        self.sent()
            .iter()
            .filter_map(|payload| Frame::decode(payload).ok())
            .collect()
    }

    /// Current lifecycle state.
    pub fn ready_state(&self) -> ReadyState {
        self.shared.lock().ready
    }

    /// Close code and reason, if the session closed the channel.
    pub fn local_close(&self) -> Option<(CloseCode, String)> {
        self.shared.lock().local_close.clone()
    }

    /// Whether the session is subscribed to events.
    pub fn is_subscribed(&self) -> bool {
        self.shared.hub.is_subscribed()
    }

    /// How many times the session released its subscription.
    pub fn unsubscribe_count(&self) -> usize {
        self.shared.hub.unsubscribe_count()
    }
}

#[derive(Debug, Default)]
struct ConnectorState {
    peers: VecDeque<(Target, RemotePeer)>,
    refusal: Option<String>,
    connects: usize,
}

/// Connection factory producing in-process transports.
///
/// Each successful `connect` queues the matching [`RemotePeer`], which the
/// host claims with [`next_peer`](MemoryConnector::next_peer).
#[derive(Debug, Clone, Default)]
pub struct MemoryConnector {
    state: Arc<Mutex<ConnectorState>>,
    ready: Arc<Notify>,
}

impl MemoryConnector {
    /// Create a connector that accepts every target.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ConnectorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make every later `connect` fail with `reason`.
    pub fn refuse(&self, reason: impl Into<String>) {
        self.lock().refusal = Some(reason.into());
    }

    /// Accept connections again.
    pub fn accept(&self) {
        self.lock().refusal = None;
    }

    /// Number of `connect` calls so far, including refused ones.
    pub fn connect_count(&self) -> usize {
        self.lock().connects
    }

    /// Claim the oldest unclaimed peer, if any.
    pub fn try_next_peer(&self) -> Option<(Target, RemotePeer)> {
        self.lock().peers.pop_front()
    }

    /// Wait for the next connection and claim its peer.
    pub async fn next_peer(&self) -> (Target, RemotePeer) {
        loop {
            if let Some(peer) = self.try_next_peer() {
                return peer;
            }
            self.ready.notified().await;
        }
    }
}

impl ConnectionFactory for MemoryConnector {
    fn connect(&self, target: &Target) -> Result<Box<dyn Transport>> {
        let mut state = self.lock();
        state.connects += 1;
        if let Some(reason) = &state.refusal {
            return Err(Error::ConnectFailure {
                target: target.to_string(),
                reason: reason.clone(),
            });
        }

        let (transport, peer) = MemoryTransport::pair();
        state.peers.push_back((target.clone(), peer));
        drop(state);
        self.ready.notify_one();
        debug!("Memory transport created for target={}", target);
        Ok(Box::new(transport))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_requires_open() {
        let (mut transport, peer) = MemoryTransport::pair();
        assert!(matches!(transport.send("x"), Err(Error::TransportClosed)));
        assert_eq!(transport.ready_state(), ReadyState::Connecting);

        peer.open();
        assert!(transport.is_open());
        transport.send("x").unwrap();
        assert_eq!(peer.sent(), vec!["x"]);
    }

    #[test]
    fn test_events_reach_subscriber_in_order() {
        let (mut transport, peer) = MemoryTransport::pair();
        peer.open();
        let mut sub = transport.subscribe().unwrap();
        peer.send_output("hello\r\n");
        peer.send_raw("plain");

        assert_eq!(sub.try_recv(), Some(TransportEvent::Open));
        assert_eq!(
            sub.try_recv(),
            Some(TransportEvent::Message(
                r#"{"type":"output","data":"hello\r\n"}"#.to_string()
            ))
        );
        assert_eq!(sub.try_recv(), Some(TransportEvent::Message("plain".to_string())));
    }

    #[test]
    fn test_local_close_is_recorded_once() {
        let (mut transport, peer) = MemoryTransport::pair();
        peer.open();
        transport.close(CloseCode::Normal, "bye");
        transport.close(CloseCode::GoingAway, "again");

        assert_eq!(peer.ready_state(), ReadyState::Closed);
        assert_eq!(peer.local_close(), Some((CloseCode::Normal, "bye".to_string())));
        assert!(matches!(transport.send("x"), Err(Error::TransportClosed)));
    }

    #[test]
    fn test_remote_close() {
        let (mut transport, peer) = MemoryTransport::pair();
        let mut sub = transport.subscribe().unwrap();
        peer.open();
        peer.close(CloseCode::Abnormal, "peer reset");
        peer.close(CloseCode::Normal, "ignored");

        assert!(!transport.is_open());
        assert_eq!(sub.try_recv(), Some(TransportEvent::Open));
        assert_eq!(
            sub.try_recv(),
            Some(TransportEvent::Close {
                code: CloseCode::Abnormal,
                reason: "peer reset".to_string()
            })
        );
        assert_eq!(sub.try_recv(), None);
    }

    #[test]
    fn test_connector_queues_peers() {
        let connector = MemoryConnector::new();
        let _a = connector.connect(&Target::from("vm-1")).unwrap();
        let _b = connector.connect(&Target::from("vm-2")).unwrap();

        assert_eq!(connector.connect_count(), 2);
        assert_eq!(connector.try_next_peer().unwrap().0, Target::from("vm-1"));
        assert_eq!(connector.try_next_peer().unwrap().0, Target::from("vm-2"));
        assert!(connector.try_next_peer().is_none());
    }

    #[test]
    fn test_connector_refusal() {
        let connector = MemoryConnector::new();
        connector.refuse("no route to host");
        let result = connector.connect(&Target::from("vm-9"));
        assert!(matches!(result, Err(Error::ConnectFailure { .. })));
        assert!(connector.try_next_peer().is_none());

        connector.accept();
        assert!(connector.connect(&Target::from("vm-9")).is_ok());
    }

    #[tokio::test]
    async fn test_next_peer_waits_for_connect() {
        let connector = MemoryConnector::new();
        let remote = connector.clone();
        let waiter = tokio::spawn(async move { remote.next_peer().await.0 });

        tokio::task::yield_now().await;
        let _transport = connector.connect(&Target::from("vm-3")).unwrap();
        assert_eq!(waiter.await.unwrap(), Target::from("vm-3"));
    }
}
