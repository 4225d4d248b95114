//! Configuration types for termbridge.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{CellSize, Dimensions, Error, Target};

/// Placeholder replaced by the session target in templates.
pub const TARGET_PLACEHOLDER: &str = "{target}";

/// Bridge configuration loaded from a YAML file.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct BridgeConfig {
    /// Session behaviour
    pub session: SessionSettings,
    /// Terminal surface settings
    pub terminal: TerminalSettings,
    /// Transcript recording
    pub recording: RecordingSettings,
    /// Log output
    pub logging: LoggingSettings,
}

impl BridgeConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> crate::Result<Self> {
        let config: BridgeConfig =
            serde_yaml::from_str(yaml).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> crate::Result<()> {
        if !self.session.endpoint_template.contains(TARGET_PLACEHOLDER) {
            return Err(Error::Config(format!(
                "session.endpoint_template must contain {TARGET_PLACEHOLDER}"
            )));
        }

        if self.terminal.default_rows == 0 || self.terminal.default_cols == 0 {
            return Err(Error::Config("terminal dimensions must be > 0".to_string()));
        }

        if self.terminal.cell_width == 0 || self.terminal.cell_height == 0 {
            return Err(Error::Config("terminal cell metrics must be > 0".to_string()));
        }

        if self.recording.enabled && self.recording.directory.as_os_str().is_empty() {
            return Err(Error::Config(
                "recording.directory is required when recording is enabled".to_string(),
            ));
        }

        Ok(())
    }
}

/// Session behaviour settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// WebSocket endpoint; `{target}` is replaced by the session target
    pub endpoint_template: String,
    /// Give up on a session stuck in Connecting after this many milliseconds
    /// (0 = wait forever)
    pub connect_timeout_ms: u64,
    /// Line written when the session starts connecting (`{target}` expanded)
    pub connecting_message: String,
    /// Line written once the transport is open
    pub connected_message: String,
    /// Advisory line written after connecting when no credentials are set
    pub credentials_warning: String,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            endpoint_template: "ws://127.0.0.1:8000/api/vms/{target}/ssh".to_string(),
            connect_timeout_ms: 0,
            connecting_message: "Connecting to {target}...".to_string(),
            connected_message: "Connected.".to_string(),
            credentials_warning:
                "Warning: no SSH credentials are configured for this host; the remote side may prompt for them."
                    .to_string(),
        }
    }
}

impl SessionSettings {
    /// Connect timeout, if one is configured.
    pub fn connect_timeout(&self) -> Option<Duration> {
        (self.connect_timeout_ms > 0).then(|| Duration::from_millis(self.connect_timeout_ms))
    }

    /// Connecting placeholder line for a target.
    pub fn connecting_line(&self, target: &Target) -> String {
        self.connecting_message
            .replace(TARGET_PLACEHOLDER, target.as_str())
    }
}

/// Terminal surface settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminalSettings {
    /// Rows used before the first fit
    pub default_rows: u16,
    /// Columns used before the first fit
    pub default_cols: u16,
    /// Width of one character cell in pixels
    pub cell_width: u32,
    /// Height of one character cell in pixels
    pub cell_height: u32,
    /// Lines kept after scrolling off the top
    pub scrollback_lines: usize,
    /// Most recent output bytes kept in memory as the session transcript
    pub transcript_limit: usize,
}

impl Default for TerminalSettings {
    fn default() -> Self {
        let cell = CellSize::default();
        Self {
            default_rows: 24,
            default_cols: 80,
            cell_width: cell.width,
            cell_height: cell.height,
            scrollback_lines: 1000,
            transcript_limit: 1024 * 1024,
        }
    }
}

impl TerminalSettings {
    /// Geometry used before the first fit.
    pub fn default_dimensions(&self) -> Dimensions {
        Dimensions::new(self.default_rows, self.default_cols)
    }

    /// Configured cell metrics.
    pub fn cell_size(&self) -> CellSize {
        CellSize::new(self.cell_width, self.cell_height)
    }
}

/// Transcript recording settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingSettings {
    /// Record every session as an asciinema transcript
    pub enabled: bool,
    /// Directory transcripts are written to
    pub directory: PathBuf,
}

impl Default for RecordingSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            directory: PathBuf::from("logs/terminal_sessions"),
        }
    }
}

/// Log output settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default filter directive (trace, debug, info, warn, error); RUST_LOG wins
    pub level: String,
    /// Include the module target in log lines
    pub with_target: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            with_target: true,
        }
    }
}
