//! Named keys and their terminal escape sequences.
//!
//! Hosts that render their own on-screen key bar (or automation that drives a
//! session) send keys by name: `"enter"`, `"pgup"`, `"ctrl+c"`. Names are
//! case-insensitive.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Keyboard key that can be sent as an input frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Key {
    /// Regular character
    Char(char),
    /// Up arrow
    Up,
    /// Down arrow
    Down,
    /// Left arrow
    Left,
    /// Right arrow
    Right,
    /// Home
    Home,
    /// End
    End,
    /// Page Up
    PageUp,
    /// Page Down
    PageDown,
    /// Enter/Return
    Enter,
    /// Tab
    Tab,
    /// Shift+Tab
    BackTab,
    /// Escape
    Escape,
    /// Backspace
    Backspace,
    /// Delete
    Delete,
    /// Space
    Space,
    /// Insert
    Insert,
    /// Function key F1-F12
    F(u8),
    /// Ctrl + letter
    Ctrl(char),
    /// Alt (meta) + character
    Alt(char),
}

impl Key {
    /// Parse a key name such as `"Enter"`, `"pgdn"`, `"F5"` or `"Ctrl+C"`.
    pub fn parse(name: &str) -> Result<Self> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidKey(name.to_string()));
        }
        let lower = trimmed.to_ascii_lowercase();

        if let Some(rest) = lower.strip_prefix("ctrl+") {
            return match single_char(rest) {
                Some(c) if c.is_ascii_alphabetic() => Ok(Key::Ctrl(c)),
                _ => Err(Error::InvalidKey(name.to_string())),
            };
        }
        if let Some(rest) = trimmed
            .strip_prefix("Alt+")
            .or_else(|| trimmed.strip_prefix("alt+"))
        {
            return single_char(rest)
                .map(Key::Alt)
                .ok_or_else(|| Error::InvalidKey(name.to_string()));
        }

        let key = match lower.as_str() {
            "enter" | "return" => Key::Enter,
            "tab" => Key::Tab,
            "shift+tab" | "backtab" => Key::BackTab,
            "space" => Key::Space,
            "backspace" => Key::Backspace,
            "delete" | "del" => Key::Delete,
            "esc" | "escape" => Key::Escape,
            "up" => Key::Up,
            "down" => Key::Down,
            "left" => Key::Left,
            "right" => Key::Right,
            "home" => Key::Home,
            "end" => Key::End,
            "pageup" | "pgup" => Key::PageUp,
            "pagedown" | "pgdn" => Key::PageDown,
            "insert" | "ins" => Key::Insert,
            other => {
                if let Some(n) = other
                    .strip_prefix('f')
                    .and_then(|n| n.parse::<u8>().ok())
                    .filter(|n| (1..=12).contains(n))
                {
                    Key::F(n)
                } else if let Some(c) = single_char(trimmed) {
                    Key::Char(c)
                } else {
                    return Err(Error::InvalidKey(name.to_string()));
                }
            }
        };
        Ok(key)
    }

    /// Text sent to the remote pseudo-terminal for this key.
    pub fn to_escape_sequence(&self) -> String {
        match self {
            Key::Char(c) => c.to_string(),
            Key::Enter => "\r".to_string(),
            Key::Tab => "\t".to_string(),
            Key::BackTab => "\x1b[Z".to_string(),
            Key::Space => " ".to_string(),
            Key::Backspace | Key::Delete => "\x7f".to_string(),
            Key::Escape => "\x1b".to_string(),
            Key::Up => "\x1b[A".to_string(),
            Key::Down => "\x1b[B".to_string(),
            Key::Right => "\x1b[C".to_string(),
            Key::Left => "\x1b[D".to_string(),
            Key::Home => "\x1bOH".to_string(),
            Key::End => "\x1bOF".to_string(),
            Key::PageUp => "\x1b[5~".to_string(),
            Key::PageDown => "\x1b[6~".to_string(),
            Key::Insert => "\x1b[2~".to_string(),
            Key::F(n) => function_key(*n).to_string(),
            Key::Ctrl(c) => {
                // Ctrl+A = 0x01 ... Ctrl+Z = 0x1A
                let code = c.to_ascii_uppercase() as u8 - b'@';
                char::from(code).to_string()
            }
            Key::Alt(c) => format!("\x1b{c}"),
        }
    }
}

fn single_char(s: &str) -> Option<char> {
    let mut chars = s.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Some(c),
        _ => None,
    }
}

fn function_key(n: u8) -> &'static str {
    match n {
        1 => "\x1bOP",
        2 => "\x1bOQ",
        3 => "\x1bOR",
        4 => "\x1bOS",
        5 => "\x1b[15~",
        6 => "\x1b[17~",
        7 => "\x1b[18~",
        8 => "\x1b[19~",
        9 => "\x1b[20~",
        10 => "\x1b[21~",
        11 => "\x1b[23~",
        _ => "\x1b[24~",
    }
}

impl std::str::FromStr for Key {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Key::parse(s)
    }
}

impl std::fmt::Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Key::Char(c) => write!(f, "{c}"),
            Key::Up => f.write_str("Up"),
            Key::Down => f.write_str("Down"),
            Key::Left => f.write_str("Left"),
            Key::Right => f.write_str("Right"),
            Key::Home => f.write_str("Home"),
            Key::End => f.write_str("End"),
            Key::PageUp => f.write_str("PageUp"),
            Key::PageDown => f.write_str("PageDown"),
            Key::Enter => f.write_str("Enter"),
            Key::Tab => f.write_str("Tab"),
            Key::BackTab => f.write_str("Shift+Tab"),
            Key::Escape => f.write_str("Escape"),
            Key::Backspace => f.write_str("Backspace"),
            Key::Delete => f.write_str("Delete"),
            Key::Space => f.write_str("Space"),
            Key::Insert => f.write_str("Insert"),
            Key::F(n) => write!(f, "F{n}"),
            Key::Ctrl(c) => write!(f, "Ctrl+{}", c.to_ascii_uppercase()),
            Key::Alt(c) => write!(f, "Alt+{c}"),
        }
    }
}
