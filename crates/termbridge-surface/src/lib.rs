//! # termbridge-surface
//!
//! Terminal surface for termbridge sessions.
//!
//! This crate provides:
//! - Terminal grid state with scrolling and bounded scrollback
//! - A persistent VTE parser for ANSI/VT escape sequences
//! - Mount points publishing the host container's pixel bounds
//! - [`TerminalSurface`]: attach, fit, write, input capture, dispose
//! - Session transcripts in asciinema v2 format
//!
//! ## Architecture
//!
//! This is Layer 1 - it depends on termbridge-core and is driven by the
//! session bridge in termbridge-session.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod grid;
pub mod mount;
pub mod parser;
pub mod recording;
pub mod surface;

// Re-export commonly used types
pub use grid::{Cursor, CursorStyle, Grid};
pub use mount::{Mount, MountPoint};
pub use parser::Parser;
pub use recording::{
    AsciinemaHeader, CastWriter, EventKind, PendingCast, RecordEvent, SessionRecorder,
};
pub use surface::{InputHandler, TerminalSurface};
