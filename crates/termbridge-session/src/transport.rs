//! Transport abstraction: the duplex channel between a session and its host.
//!
//! A [`Transport`] carries one text payload per message. Events it raises
//! (open, message, error, close) are delivered through an explicit
//! [`Subscription`], which the session releases exactly once during
//! teardown. Transports are produced per target by a [`ConnectionFactory`].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tracing::trace;

use termbridge_core::{CloseCode, Error, Result, Target};

/// Event raised by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The channel is open and frames may flow
    Open,
    /// One inbound text payload
    Message(String),
    /// The channel failed
    Error(String),
    /// The channel closed
    Close {
        /// Close code reported by the remote side
        code: CloseCode,
        /// Close reason text
        reason: String,
    },
}

/// Connection lifecycle of a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    /// Handshake in progress
    Connecting,
    /// Open for traffic
    Open,
    /// Closed locally or remotely
    Closed,
}

/// A message-framed duplex channel to a remote session host.
pub trait Transport: Send {
    /// Send one payload. Fails with [`Error::TransportClosed`] unless open.
    fn send(&mut self, payload: &str) -> Result<()>;

    /// Current lifecycle state.
    fn ready_state(&self) -> ReadyState;

    /// Whether payloads can be sent.
    fn is_open(&self) -> bool {
        self.ready_state() == ReadyState::Open
    }

    /// Close the channel. No-op if already closed.
    fn close(&mut self, code: CloseCode, reason: &str);

    /// Subscribe to the transport's events.
    ///
    /// A transport has at most one active subscription.
    fn subscribe(&mut self) -> Result<Subscription>;
}

/// Produces a transport for a target.
///
/// Connecting is asynchronous: the returned transport starts in
/// [`ReadyState::Connecting`] and reports [`TransportEvent::Open`] (or a
/// close) through its subscription.
pub trait ConnectionFactory: Send + Sync {
    /// Open a transport to `target`.
    fn connect(&self, target: &Target) -> Result<Box<dyn Transport>>;
}

impl<F: ConnectionFactory + ?Sized> ConnectionFactory for Arc<F> {
    fn connect(&self, target: &Target) -> Result<Box<dyn Transport>> {
        (**self).connect(target)
    }
}

type CancelFn = Box<dyn FnOnce() + Send>;

/// An active registration for transport events.
///
/// [`unsubscribe`](Subscription::unsubscribe) runs the cancel action exactly
/// once; later calls do nothing. Dropping an active subscription
/// unsubscribes it.
pub struct Subscription {
    events: Option<mpsc::UnboundedReceiver<TransportEvent>>,
    cancel: Option<CancelFn>,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}

impl Subscription {
    /// Subscription reading from `events`, running `cancel` on unsubscribe.
    pub fn new<F>(events: mpsc::UnboundedReceiver<TransportEvent>, cancel: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            events: Some(events),
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Whether the subscription is still active.
    pub fn is_active(&self) -> bool {
        self.cancel.is_some()
    }

    /// Wait for the next event. Returns `None` once unsubscribed or when the
    /// transport went away.
    pub async fn recv(&mut self) -> Option<TransportEvent> {
        self.events.as_mut()?.recv().await
    }

    /// Next event if one is already queued.
    pub fn try_recv(&mut self) -> Option<TransportEvent> {
        self.events.as_mut()?.try_recv().ok()
    }

    /// Stop receiving events. Returns true if this call released the
    /// subscription.
    pub fn unsubscribe(&mut self) -> bool {
        let Some(cancel) = self.cancel.take() else {
            return false;
        };
        if let Some(mut events) = self.events.take() {
            events.close();
        }
        cancel();
        true
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

#[derive(Debug, Default)]
struct HubState {
    subscriber: Option<mpsc::UnboundedSender<TransportEvent>>,
    /// Events raised before anyone subscribed
    backlog: Vec<TransportEvent>,
    subscribed: bool,
    unsubscribes: usize,
}

/// Single-subscriber event fan-out shared by a transport and whatever
/// produces its events.
///
/// Events raised before the first subscription are kept and delivered on
/// subscribe; events raised after unsubscribe are discarded.
#[derive(Debug, Clone, Default)]
pub struct EventHub {
    state: Arc<Mutex<HubState>>,
}

impl EventHub {
    /// Create an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HubState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Deliver an event. Returns false if it was discarded.
    pub fn emit(&self, event: TransportEvent) -> bool {
        let mut state = self.lock();
        if let Some(tx) = &state.subscriber {
            return tx.send(event).is_ok();
        }
        if state.subscribed {
            trace!("Discarding transport event after unsubscribe: {:?}", event);
            return false;
        }
        state.backlog.push(event);
        true
    }

    /// Register the single subscriber.
    pub fn subscribe(&self) -> Result<Subscription> {
        let mut state = self.lock();
        if state.subscriber.is_some() {
            return Err(Error::Transport("transport already has a subscriber".to_string()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        for event in state.backlog.drain(..) {
            // rx is alive, so this cannot fail
            let _ = tx.send(event);
        }
        state.subscriber = Some(tx);
        state.subscribed = true;
        drop(state);

        let hub = self.clone();
        Ok(Subscription::new(rx, move || {
            let mut state = hub.lock();
            state.subscriber = None;
            state.unsubscribes += 1;
        }))
    }

    /// Whether a subscription is currently active.
    pub fn is_subscribed(&self) -> bool {
        self.lock().subscriber.is_some()
    }

    /// How many subscriptions have been released.
    pub fn unsubscribe_count(&self) -> usize {
        self.lock().unsubscribes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backlog_delivered_on_subscribe() {
        let hub = EventHub::new();
        assert!(hub.emit(TransportEvent::Open));
        assert!(hub.emit(TransportEvent::Message("a".to_string())));

        let mut sub = hub.subscribe().unwrap();
        assert_eq!(sub.try_recv(), Some(TransportEvent::Open));
        assert_eq!(sub.try_recv(), Some(TransportEvent::Message("a".to_string())));
        assert_eq!(sub.try_recv(), None);
    }

    #[test]
    fn test_single_subscriber() {
        let hub = EventHub::new();
        let _sub = hub.subscribe().unwrap();
        assert!(matches!(hub.subscribe(), Err(Error::Transport(_))));
    }

    #[test]
    fn test_unsubscribe_runs_once() {
        let hub = EventHub::new();
        let mut sub = hub.subscribe().unwrap();
        assert!(hub.is_subscribed());

        assert!(sub.unsubscribe());
        assert!(!sub.unsubscribe());
        drop(sub);

        assert!(!hub.is_subscribed());
        assert_eq!(hub.unsubscribe_count(), 1);
    }

    #[test]
    fn test_events_after_unsubscribe_are_discarded() {
        let hub = EventHub::new();
        let mut sub = hub.subscribe().unwrap();
        sub.unsubscribe();

        assert!(!hub.emit(TransportEvent::Message("late".to_string())));
        assert_eq!(sub.try_recv(), None);
    }

    #[test]
    fn test_drop_unsubscribes() {
        let hub = EventHub::new();
        drop(hub.subscribe().unwrap());
        assert_eq!(hub.unsubscribe_count(), 1);
        assert!(hub.subscribe().is_ok());
    }

    #[tokio::test]
    async fn test_recv_waits_for_event() {
        let hub = EventHub::new();
        let mut sub = hub.subscribe().unwrap();

        let producer = hub.clone();
        tokio::spawn(async move {
            producer.emit(TransportEvent::Close {
                code: CloseCode::Normal,
                reason: String::new(),
            });
        });

        assert!(matches!(
            sub.recv().await,
            Some(TransportEvent::Close { code: CloseCode::Normal, .. })
        ));
    }
}
