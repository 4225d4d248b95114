//! # termbridge-core
//!
//! Core types shared by every termbridge crate.
//!
//! This crate has **no internal dependencies** on other termbridge crates.
//! It provides:
//!
//! - Geometry types (Position, Bounds, Dimensions, pixel and cell sizes)
//! - Cell and color types for the terminal grid
//! - The wire [`Frame`] exchanged with the remote session host
//! - Session types (SessionId, Target, SessionState, CloseReason, CloseCode)
//! - Named keys for input translation
//! - Configuration and error types
//!
//! ## Architecture
//!
//! This is Layer 0 - the surface, session and facade crates all build on it.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cell;
pub mod config;
pub mod error;
pub mod frame;
pub mod geometry;
pub mod key;
pub mod session;

pub use cell::{Cell, CellAttributes, Color};
pub use config::{
    BridgeConfig, LoggingSettings, RecordingSettings, SessionSettings, TerminalSettings,
};
pub use error::{Error, Result};
pub use frame::{frame_schema, Frame, Inbound};
pub use geometry::{Bounds, CellSize, Dimensions, PixelSize, Position};
pub use key::Key;
pub use session::{CloseCode, CloseReason, SessionId, SessionInfo, SessionState, Target};
