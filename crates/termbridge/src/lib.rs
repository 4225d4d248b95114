//! # termbridge
//!
//! Interactive remote terminal sessions for host applications.
//!
//! A host creates a [`TerminalView`] over a [`MountPoint`] and calls
//! [`TerminalView::show`] with a target. The view opens a session through a
//! [`ConnectionFactory`] (by default a WebSocket endpoint), renders remote
//! output into a headless terminal surface, forwards keystrokes and keeps
//! the remote pseudo-terminal's geometry in sync with the container.
//!
//! ## Architecture
//!
//! This is Layer 3 - it ties together termbridge-core, termbridge-surface
//! and termbridge-session behind the host UI contract.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod logging;
pub mod view;

pub use termbridge_core::{
    BridgeConfig, CloseCode, CloseReason, Dimensions, Error, Frame, Key, LoggingSettings,
    PixelSize, RecordingSettings, Result, SessionId, SessionInfo, SessionSettings, SessionState,
    Target, TerminalSettings,
};
pub use termbridge_session::{
    spawn_session, ConnectionFactory, MemoryConnector, RemotePeer, SessionHandle, SessionOptions,
    SessionReport, SessionSnapshot, Transport, TransportEvent, WsConnector,
};
pub use termbridge_surface::{Mount, MountPoint, TerminalSurface};
pub use view::TerminalView;

