//! The terminal surface: grid, parser, mount binding and input capture.

use std::path::Path;

use tracing::{debug, trace};

use termbridge_core::{CellSize, Dimensions, Error, Result, TerminalSettings};

use crate::grid::Grid;
use crate::mount::Mount;
use crate::parser::Parser;
use crate::recording::CastWriter;

/// Callback receiving captured keystrokes and pastes.
pub type InputHandler = Box<dyn FnMut(&str) + Send>;

/// Renders remote output and captures user input.
///
/// A surface lives inside exactly one session. After [`dispose`] it no
/// longer accepts output, resizes or input, but the last rendered screen and
/// the transcript stay readable. The transcript keeps only the most recent
/// `transcript_limit` bytes of output.
///
/// [`dispose`]: TerminalSurface::dispose
pub struct TerminalSurface {
    parser: Parser,
    cell: CellSize,
    mount: Option<Mount>,
    input: Option<InputHandler>,
    transcript: String,
    transcript_limit: usize,
    recorder: Option<CastWriter>,
    disposed: bool,
}

impl std::fmt::Debug for TerminalSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerminalSurface")
            .field("dimensions", &self.dimensions())
            .field("attached", &self.mount.is_some())
            .field("has_input_handler", &self.input.is_some())
            .field("recording", &self.recorder.is_some())
            .field("disposed", &self.disposed)
            .finish()
    }
}

impl TerminalSurface {
    /// Create a detached surface sized from the terminal settings.
    pub fn new(settings: &TerminalSettings) -> Self {
        let grid = Grid::with_scrollback(settings.default_dimensions(), settings.scrollback_lines);
        Self {
            parser: Parser::new(grid),
            cell: settings.cell_size(),
            mount: None,
            input: None,
            transcript: String::new(),
            transcript_limit: settings.transcript_limit,
            recorder: None,
            disposed: false,
        }
    }

    /// Start streaming an asciinema transcript of everything written,
    /// typed and resized from now on into `dir`.
    pub fn start_recording<P: AsRef<Path>>(&mut self, dir: P, title: &str) -> Result<()> {
        self.recorder = Some(CastWriter::spawn(dir, title, self.dimensions())?);
        Ok(())
    }

    /// Take the transcript writer, ending the recording.
    pub fn take_recording(&mut self) -> Option<CastWriter> {
        self.recorder.take()
    }

    /// Bind the surface to a mount point.
    ///
    /// Fails if no mount is supplied, the mount has no bounds, or the
    /// surface was already disposed. Nothing is rendered on failure.
    pub fn attach(&mut self, mount: Option<Mount>) -> Result<()> {
        if self.disposed {
            return Err(Error::Attachment("surface already disposed".to_string()));
        }
        let mount = mount.ok_or_else(|| Error::Attachment("no mount point".to_string()))?;
        if !mount.is_available() {
            return Err(Error::Attachment(
                "mount point has no layout".to_string(),
            ));
        }
        debug!("Surface attached bounds={:?}", mount.bounds());
        self.mount = Some(mount);
        Ok(())
    }

    /// Whether the surface is bound to a mount point.
    pub fn is_attached(&self) -> bool {
        self.mount.is_some()
    }

    /// Recompute rows and columns from the mount bounds.
    ///
    /// Returns the resulting geometry, or `None` when detached, disposed, or
    /// the mount currently has no layout. Calling it twice with unchanged
    /// bounds yields the same geometry and leaves the grid untouched.
    pub fn fit(&mut self) -> Option<Dimensions> {
        if self.disposed {
            return None;
        }
        let bounds = self.mount.as_ref()?.bounds()?;
        let dimensions = Dimensions::fit(bounds, self.cell);
        if dimensions != self.dimensions() {
            debug!(
                "Surface resized from {} to {}",
                self.dimensions(),
                dimensions
            );
            self.parser.grid_mut().resize(dimensions);
            if let Some(recorder) = self.recorder.as_ref() {
                recorder.record_resize(dimensions);
            }
        }
        Some(dimensions)
    }

    /// Current geometry in character cells.
    pub fn dimensions(&self) -> Dimensions {
        self.parser.grid().dimensions()
    }

    /// Render text. Escape sequences split across calls are reassembled.
    ///
    /// No-op after dispose.
    pub fn write(&mut self, text: &str) {
        if self.disposed {
            trace!("Dropping {} bytes written to disposed surface", text.len());
            return;
        }
        self.parser.process(text.as_bytes());
        self.transcript.push_str(text);
        trim_front(&mut self.transcript, self.transcript_limit);
        if let Some(recorder) = self.recorder.as_ref() {
            recorder.record_output(text);
        }
    }

    /// Register the single input handler.
    pub fn on_input<F>(&mut self, handler: F) -> Result<()>
    where
        F: FnMut(&str) + Send + 'static,
    {
        if self.input.is_some() {
            return Err(Error::InputHandlerRegistered);
        }
        if self.disposed {
            return Err(Error::Attachment("surface already disposed".to_string()));
        }
        self.input = Some(Box::new(handler));
        Ok(())
    }

    /// Deliver a captured keystroke or paste to the input handler.
    ///
    /// Returns false if there is no handler (never registered, or disposed).
    pub fn dispatch_input(&mut self, text: &str) -> bool {
        let Some(handler) = self.input.as_mut() else {
            return false;
        };
        if let Some(recorder) = self.recorder.as_ref() {
            recorder.record_input(text);
        }
        handler(text);
        true
    }

    /// Release the surface: drops the input handler and the mount binding.
    ///
    /// Returns true the first time, false on repeated calls.
    pub fn dispose(&mut self) -> bool {
        if self.disposed {
            return false;
        }
        self.disposed = true;
        self.input = None;
        self.mount = None;
        debug!("Surface disposed");
        true
    }

    /// Whether the surface has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Output written to the surface, verbatim, up to the transcript limit.
    pub fn transcript(&self) -> &str {
        &self.transcript
    }

    /// Visible screen as plain text.
    pub fn screen_text(&self) -> String {
        self.parser.grid().to_plain_text()
    }

    /// The rendered grid.
    pub fn grid(&self) -> &Grid {
        self.parser.grid()
    }

    /// Window title set by the remote side, if any.
    pub fn title(&self) -> Option<&str> {
        self.parser.grid().title()
    }

    /// Number of bells rung by the remote side.
    pub fn bell_count(&self) -> u64 {
        self.parser.bell_count()
    }
}

/// Drop the oldest text so at most `limit` bytes remain.
///
/// Trims down to three quarters of the limit at a time, so a surface at its
/// limit does not shift the whole buffer on every write.
fn trim_front(text: &mut String, limit: usize) {
    if text.len() <= limit {
        return;
    }
    let mut cut = text.len() - (limit - limit / 4);
    while !text.is_char_boundary(cut) {
        cut += 1;
    }
    text.drain(..cut);
}

impl Default for TerminalSurface {
    fn default() -> Self {
        Self::new(&TerminalSettings::default())
    }
}
