//! Session transcripts in asciinema v2 format.
//!
//! A transcript records remote output, typed input and geometry changes so a
//! session can be replayed with standard asciinema tools
//! (https://asciinema.org/).
//!
//! Live sessions record through a [`CastWriter`], which streams each event to
//! disk on its own thread. [`SessionRecorder`] holds a whole transcript in
//! memory, for building and loading `.cast` files.

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::mpsc;
use std::thread;
use std::time::Instant;

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use termbridge_core::{Dimensions, Error, Result};
use tracing::{debug, warn};

/// Asciinema v2 format header.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AsciinemaHeader {
    /// Format version (always 2)
    pub version: u8,
    /// Terminal width
    pub width: u16,
    /// Terminal height
    pub height: u16,
    /// Unix timestamp of recording start
    pub timestamp: Option<i64>,
    /// Recording title
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Environment variables
    #[serde(skip_serializing_if = "Option::is_none")]
    pub env: Option<HashMap<String, String>>,
}

impl AsciinemaHeader {
    fn new(dimensions: Dimensions, started_at: &DateTime<Utc>, title: Option<String>) -> Self {
        Self {
            version: 2,
            width: dimensions.cols,
            height: dimensions.rows,
            timestamp: Some(started_at.timestamp()),
            title,
            env: None,
        }
    }
}

/// Kind of a recorded event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// Remote output written to the surface (`"o"`)
    Output,
    /// Input typed by the user (`"i"`)
    Input,
    /// Geometry change (`"r"`, data `COLSxROWS`)
    Resize,
}

impl EventKind {
    /// Code used in the event line.
    pub fn code(&self) -> &'static str {
        match self {
            EventKind::Output => "o",
            EventKind::Input => "i",
            EventKind::Resize => "r",
        }
    }

    fn from_code(code: &str) -> Option<Self> {
        match code {
            "o" => Some(EventKind::Output),
            "i" => Some(EventKind::Input),
            "r" => Some(EventKind::Resize),
            _ => None,
        }
    }
}

/// A single recording event.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordEvent {
    /// Time offset from start in seconds
    pub time: f64,
    /// Event kind
    pub kind: EventKind,
    /// Event data
    pub data: String,
}

/// Records session events in asciinema v2 format.
///
/// The file consists of a JSON header line followed by one
/// `[time, code, data]` array per event.
///
/// # Example
///
/// ```
/// use termbridge_core::Dimensions;
/// use termbridge_surface::SessionRecorder;
///
/// let mut recorder = SessionRecorder::new(Dimensions::new(24, 80));
/// recorder.record_output("$ ");
/// recorder.record_input("ls -la\r");
/// assert_eq!(recorder.event_count(), 2);
/// ```
#[derive(Debug)]
pub struct SessionRecorder {
    events: Vec<RecordEvent>,
    start_time: Instant,
    started_at: DateTime<Utc>,
    dimensions: Dimensions,
    title: Option<String>,
    env: Option<HashMap<String, String>>,
}

impl SessionRecorder {
    /// Create a new recorder for a terminal of the given size.
    pub fn new(dimensions: Dimensions) -> Self {
        Self {
            events: Vec::new(),
            start_time: Instant::now(),
            started_at: Utc::now(),
            dimensions,
            title: None,
            env: None,
        }
    }

    /// Set the recording title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Set environment variables stored in the header.
    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = Some(env);
        self
    }

    fn push(&mut self, kind: EventKind, data: String) {
        self.events.push(RecordEvent {
            time: self.start_time.elapsed().as_secs_f64(),
            kind,
            data,
        });
    }

    /// Record text written to the surface.
    pub fn record_output(&mut self, data: &str) {
        self.push(EventKind::Output, data.to_string());
    }

    /// Record text typed by the user.
    pub fn record_input(&mut self, data: &str) {
        self.push(EventKind::Input, data.to_string());
    }

    /// Record a geometry change.
    pub fn record_resize(&mut self, dimensions: Dimensions) {
        self.push(
            EventKind::Resize,
            format!("{}x{}", dimensions.cols, dimensions.rows),
        );
    }

    /// Recorded events.
    pub fn events(&self) -> &[RecordEvent] {
        &self.events
    }

    /// Get the number of recorded events.
    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    /// Geometry the recording started with.
    pub fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    /// Get the duration of the recording in seconds.
    pub fn duration(&self) -> f64 {
        self.events.last().map(|e| e.time).unwrap_or(0.0)
    }

    fn header(&self) -> AsciinemaHeader {
        AsciinemaHeader {
            env: self.env.clone(),
            ..AsciinemaHeader::new(self.dimensions, &self.started_at, self.title.clone())
        }
    }

    /// Write the recording in asciinema v2 format.
    pub fn save_to_writer<W: Write>(&self, writer: &mut W) -> Result<()> {
        serde_json::to_writer(&mut *writer, &self.header())?;
        writeln!(writer)?;

        for event in &self.events {
            writeln!(writer, "{}", event_line(event.time, event.kind, &event.data)?)?;
        }

        writer.flush()?;
        Ok(())
    }

    /// Save the recording to a file.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut file = File::create(path)?;
        self.save_to_writer(&mut file)
    }

    /// Render the recording as a string.
    pub fn to_cast_string(&self) -> Result<String> {
        let mut buffer = Vec::new();
        self.save_to_writer(&mut buffer)?;
        String::from_utf8(buffer).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e).into())
    }

    /// Load a recording from a file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        content.parse().map_err(Into::into)
    }
}

/// One `[time, code, data]` event line.
fn event_line(time: f64, kind: EventKind, data: &str) -> serde_json::Result<String> {
    serde_json::to_string(&(time, kind.code(), data))
}

/// Streams a live session to `<dir>/<name>_<YYYYmmdd-HHMMSS>.cast`.
///
/// Events are encoded on the caller and written by a dedicated thread, so
/// recording neither blocks the session loop on disk I/O nor keeps the
/// session in memory. Write errors stop the recording and are reported by
/// [`PendingCast::wait`].
#[derive(Debug)]
pub struct CastWriter {
    lines: mpsc::Sender<String>,
    writer: thread::JoinHandle<Result<()>>,
    path: PathBuf,
    start_time: Instant,
}

impl CastWriter {
    /// Start recording a terminal of the given size.
    ///
    /// The directory is created if missing. Characters of `name` that are
    /// not safe in a file name are replaced with `_`.
    pub fn spawn<P: AsRef<Path>>(dir: P, name: &str, dimensions: Dimensions) -> Result<Self> {
        let started_at = Utc::now();
        let dir = dir.as_ref().to_path_buf();
        let path = dir.join(transcript_file_name(
            name,
            &started_at.with_timezone(&Local),
        ));
        let header = serde_json::to_string(&AsciinemaHeader::new(
            dimensions,
            &started_at,
            Some(name.to_string()),
        ))?;

        let (lines, queued) = mpsc::channel::<String>();
        let file = path.clone();
        let writer = thread::Builder::new()
            .name("cast-writer".to_string())
            .spawn(move || -> Result<()> {
                std::fs::create_dir_all(&dir)?;
                let mut out = BufWriter::new(File::create(&file)?);
                writeln!(out, "{header}")?;
                for line in queued {
                    writeln!(out, "{line}")?;
                }
                out.flush()?;
                Ok(())
            })?;
        debug!("Recording to {}", path.display());

        Ok(Self {
            lines,
            writer,
            path,
            start_time: Instant::now(),
        })
    }

    /// File the transcript is written to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn push(&self, kind: EventKind, data: &str) {
        let time = self.start_time.elapsed().as_secs_f64();
        match event_line(time, kind, data) {
            // A closed channel means the writer already failed
            Ok(line) => {
                let _ = self.lines.send(line);
            }
            Err(e) => warn!("Dropping unencodable {} event: {}", kind.code(), e),
        }
    }

    /// Record text written to the surface.
    pub fn record_output(&self, data: &str) {
        self.push(EventKind::Output, data);
    }

    /// Record text typed by the user.
    pub fn record_input(&self, data: &str) {
        self.push(EventKind::Input, data);
    }

    /// Record a geometry change.
    pub fn record_resize(&self, dimensions: Dimensions) {
        self.push(
            EventKind::Resize,
            &format!("{}x{}", dimensions.cols, dimensions.rows),
        );
    }

    /// End the recording. The writer thread drains what is queued and
    /// closes the file in the background.
    pub fn finish(self) -> PendingCast {
        let Self {
            lines,
            writer,
            path,
            ..
        } = self;
        drop(lines);
        PendingCast { writer, path }
    }
}

/// A finished recording whose file may still be flushing.
#[derive(Debug)]
pub struct PendingCast {
    writer: thread::JoinHandle<Result<()>>,
    path: PathBuf,
}

impl PendingCast {
    /// File the transcript is written to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Block until the file is complete.
    pub fn wait(self) -> Result<PathBuf> {
        self.writer
            .join()
            .map_err(|_| Error::Io(io::Error::new(io::ErrorKind::Other, "cast writer panicked")))??;
        Ok(self.path)
    }
}

/// Transcript file name for a session name and start time.
pub fn transcript_file_name<Tz: chrono::TimeZone>(name: &str, started_at: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    let safe: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{}_{}.cast", safe, started_at.format("%Y%m%d-%H%M%S"))
}

impl FromStr for SessionRecorder {
    type Err = io::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let invalid = |e: serde_json::Error| io::Error::new(io::ErrorKind::InvalidData, e);
        let mut lines = content.lines();

        let header_line = lines
            .next()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "Empty recording file"))?;
        let header: AsciinemaHeader = serde_json::from_str(header_line).map_err(invalid)?;

        let mut events = Vec::new();
        for line in lines.filter(|l| !l.trim().is_empty()) {
            let (time, code, data): (f64, String, String) =
                serde_json::from_str(line).map_err(invalid)?;
            if let Some(kind) = EventKind::from_code(&code) {
                events.push(RecordEvent { time, kind, data });
            }
        }

        let started_at = header
            .timestamp
            .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0))
            .unwrap_or_else(Utc::now);

        Ok(Self {
            events,
            start_time: Instant::now(),
            started_at,
            dimensions: Dimensions::new(header.height, header.width),
            title: header.title,
            env: header.env,
        })
    }
}
