//! Session identity, lifecycle states and close reasons.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Dimensions;

/// Unique identifier for a terminal session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Create a new random session ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl From<Uuid> for SessionId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque identifier of the remote host a session is brokered to.
///
/// Owned by the caller and never interpreted by the bridge itself; the
/// connection factory decides what it means (a VM id, a host:port...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Target(String);

impl Target {
    /// Wrap a target identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Target {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for Target {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// WebSocket-style close code reported by or sent to the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "u16", into = "u16")]
pub enum CloseCode {
    /// 1000, the session finished as intended
    Normal,
    /// 1001, an endpoint is going away
    GoingAway,
    /// 1002
    ProtocolError,
    /// 1003
    Unsupported,
    /// 1005, no status code was present
    NoStatus,
    /// 1006, the connection dropped without a close frame
    Abnormal,
    /// 1007
    InvalidPayload,
    /// 1008, used by the backend for unknown or incomplete targets
    PolicyViolation,
    /// 1009
    MessageTooBig,
    /// 1010
    MandatoryExtension,
    /// 1011, used by the backend when the upstream SSH session fails
    InternalError,
    /// Any other code
    Other(u16),
}

impl CloseCode {
    /// Whether this code means an intended, successful close.
    pub fn is_normal(&self) -> bool {
        matches!(self, CloseCode::Normal)
    }
}

impl From<u16> for CloseCode {
    fn from(code: u16) -> Self {
        match code {
            1000 => CloseCode::Normal,
            1001 => CloseCode::GoingAway,
            1002 => CloseCode::ProtocolError,
            1003 => CloseCode::Unsupported,
            1005 => CloseCode::NoStatus,
            1006 => CloseCode::Abnormal,
            1007 => CloseCode::InvalidPayload,
            1008 => CloseCode::PolicyViolation,
            1009 => CloseCode::MessageTooBig,
            1010 => CloseCode::MandatoryExtension,
            1011 => CloseCode::InternalError,
            other => CloseCode::Other(other),
        }
    }
}

impl From<CloseCode> for u16 {
    fn from(code: CloseCode) -> Self {
        match code {
            CloseCode::Normal => 1000,
            CloseCode::GoingAway => 1001,
            CloseCode::ProtocolError => 1002,
            CloseCode::Unsupported => 1003,
            CloseCode::NoStatus => 1005,
            CloseCode::Abnormal => 1006,
            CloseCode::InvalidPayload => 1007,
            CloseCode::PolicyViolation => 1008,
            CloseCode::MessageTooBig => 1009,
            CloseCode::MandatoryExtension => 1010,
            CloseCode::InternalError => 1011,
            CloseCode::Other(other) => other,
        }
    }
}

impl std::fmt::Display for CloseCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", u16::from(*self))
    }
}

/// Why a session reached `Closed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CloseReason {
    /// Remote side closed with a normal code
    Normal {
        /// Close code
        code: CloseCode,
        /// Close reason text
        reason: String,
    },
    /// Remote side closed with a non-normal code while connected
    Abnormal {
        /// Close code
        code: CloseCode,
        /// Close reason text
        reason: String,
    },
    /// The transport failed before it ever opened
    ConnectFailure {
        /// Close code, if the transport reported one
        code: Option<CloseCode>,
        /// Human-readable cause
        reason: String,
    },
    /// The configured connect timeout elapsed while connecting
    ConnectTimeout {
        /// Timeout that elapsed, in milliseconds
        after_ms: u64,
    },
    /// The transport raised an error event
    TransportError,
    /// The caller closed the session
    UserClosed,
    /// The hosting view was torn down
    HostDestroyed,
    /// No mount point was available to attach the surface
    AttachmentFailed,
}

impl CloseReason {
    /// Classify a close reported by the transport.
    ///
    /// Closes before the transport ever opened are connect failures; after
    /// that the close code decides between normal and abnormal.
    pub fn from_remote(code: CloseCode, reason: impl Into<String>, was_open: bool) -> Self {
        let reason = reason.into();
        if !was_open {
            CloseReason::ConnectFailure {
                code: Some(code),
                reason,
            }
        } else if code.is_normal() {
            CloseReason::Normal { code, reason }
        } else {
            CloseReason::Abnormal { code, reason }
        }
    }

    /// Whether this close should be reported to the user as a failure.
    pub fn is_abnormal(&self) -> bool {
        !matches!(
            self,
            CloseReason::Normal { .. } | CloseReason::UserClosed | CloseReason::HostDestroyed
        )
    }

    /// Close code the bridge sends when it closes a still-open transport.
    pub fn local_close_code(&self) -> CloseCode {
        match self {
            CloseReason::ConnectTimeout { .. } => CloseCode::GoingAway,
            CloseReason::TransportError => CloseCode::InternalError,
            _ => CloseCode::Normal,
        }
    }

    /// Message stored as the session's `last_error`, for abnormal closes.
    pub fn error_message(&self) -> Option<String> {
        match self {
            CloseReason::Abnormal { code, reason } if reason.is_empty() => {
                Some(format!("Connection closed abnormally (code {code})"))
            }
            CloseReason::Abnormal { code, reason } => Some(format!(
                "Connection closed abnormally (code {code}): {reason}"
            )),
            CloseReason::ConnectFailure {
                code: Some(code),
                reason,
            } => Some(format!("Unable to connect (code {code}): {reason}")),
            CloseReason::ConnectFailure { code: None, reason } => {
                Some(format!("Unable to connect: {reason}"))
            }
            CloseReason::ConnectTimeout { after_ms } => {
                Some(format!("Connection timed out after {after_ms}ms"))
            }
            CloseReason::TransportError => Some("Transport error".to_string()),
            CloseReason::AttachmentFailed => {
                Some("No terminal container available".to_string())
            }
            CloseReason::Normal { .. } | CloseReason::UserClosed | CloseReason::HostDestroyed => {
                None
            }
        }
    }
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CloseReason::Normal { reason, .. } if reason.is_empty() => f.write_str("closed"),
            CloseReason::Abnormal { code, reason } if reason.is_empty() => {
                write!(f, "code {code}")
            }
            CloseReason::Normal { reason, .. }
            | CloseReason::Abnormal { reason, .. }
            | CloseReason::ConnectFailure { reason, .. } => f.write_str(reason),
            CloseReason::ConnectTimeout { after_ms } => {
                write!(f, "connect timed out after {after_ms}ms")
            }
            CloseReason::TransportError => f.write_str("transport error"),
            CloseReason::UserClosed => f.write_str("closed by user"),
            CloseReason::HostDestroyed => f.write_str("view closed"),
            CloseReason::AttachmentFailed => f.write_str("no mount point"),
        }
    }
}

/// Lifecycle state of a session.
///
/// `Idle -> Connecting -> Connected -> Closed(reason)`; `Closed` is terminal.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionState {
    /// Created, not yet opened
    #[default]
    Idle,
    /// Transport requested, waiting for it to open
    Connecting,
    /// Transport open, frames flowing
    Connected,
    /// Torn down
    Closed {
        /// Why the session closed
        reason: CloseReason,
    },
}

impl SessionState {
    /// Whether the session still owns live resources.
    pub fn is_live(&self) -> bool {
        matches!(self, SessionState::Connecting | SessionState::Connected)
    }

    /// Whether the session is connected.
    pub fn is_connected(&self) -> bool {
        matches!(self, SessionState::Connected)
    }

    /// Whether the session has been torn down.
    pub fn is_closed(&self) -> bool {
        matches!(self, SessionState::Closed { .. })
    }

    /// Close reason, once closed.
    pub fn close_reason(&self) -> Option<&CloseReason> {
        match self {
            SessionState::Closed { reason } => Some(reason),
            _ => None,
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Idle => f.write_str("idle"),
            SessionState::Connecting => f.write_str("connecting"),
            SessionState::Connected => f.write_str("connected"),
            SessionState::Closed { reason } => write!(f, "closed ({reason})"),
        }
    }
}

/// Snapshot of a session, used to drive the status indicator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    /// Session identifier
    pub id: SessionId,
    /// Remote target
    pub target: Target,
    /// Current state
    pub state: SessionState,
    /// Failure description, set only on abnormal close
    pub last_error: Option<String>,
    /// Current terminal geometry, once a surface is attached
    pub geometry: Option<Dimensions>,
}

impl SessionInfo {
    /// Snapshot of a freshly created session.
    pub fn new(id: SessionId, target: Target) -> Self {
        Self {
            id,
            target,
            state: SessionState::Idle,
            last_error: None,
            geometry: None,
        }
    }
}
