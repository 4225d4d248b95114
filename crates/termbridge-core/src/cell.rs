//! Cell and color types for the rendered terminal grid.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Terminal color: default, the 16 ANSI colors, 256-color palette or RGB.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Color {
    /// Default terminal color
    #[default]
    Default,
    /// ANSI black
    Black,
    /// ANSI red
    Red,
    /// ANSI green
    Green,
    /// ANSI yellow
    Yellow,
    /// ANSI blue
    Blue,
    /// ANSI magenta
    Magenta,
    /// ANSI cyan
    Cyan,
    /// ANSI white
    White,
    /// Bright black (gray)
    BrightBlack,
    /// Bright red
    BrightRed,
    /// Bright green
    BrightGreen,
    /// Bright yellow
    BrightYellow,
    /// Bright blue
    BrightBlue,
    /// Bright magenta
    BrightMagenta,
    /// Bright cyan
    BrightCyan,
    /// Bright white
    BrightWhite,
    /// 256-color palette index
    Indexed(u8),
    /// 24-bit color
    Rgb {
        /// Red component
        r: u8,
        /// Green component
        g: u8,
        /// Blue component
        b: u8,
    },
}

impl Color {
    /// Map an ANSI palette offset (0-7) to a color, optionally bright.
    ///
    /// Offsets outside 0-7 fall back to [`Color::Default`].
    pub fn ansi(offset: u16, bright: bool) -> Self {
        const NORMAL: [Color; 8] = [
            Color::Black,
            Color::Red,
            Color::Green,
            Color::Yellow,
            Color::Blue,
            Color::Magenta,
            Color::Cyan,
            Color::White,
        ];
        const BRIGHT: [Color; 8] = [
            Color::BrightBlack,
            Color::BrightRed,
            Color::BrightGreen,
            Color::BrightYellow,
            Color::BrightBlue,
            Color::BrightMagenta,
            Color::BrightCyan,
            Color::BrightWhite,
        ];
        let table = if bright { &BRIGHT } else { &NORMAL };
        table.get(offset as usize).copied().unwrap_or_default()
    }
}

/// SGR text attributes of a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CellAttributes {
    /// Bold/bright text
    pub bold: bool,
    /// Dimmed text
    pub dim: bool,
    /// Italic text
    pub italic: bool,
    /// Underlined text
    pub underline: bool,
    /// Blinking text
    pub blink: bool,
    /// Reverse video
    pub reverse: bool,
    /// Hidden text
    pub hidden: bool,
    /// Strikethrough text
    pub strikethrough: bool,
}

impl CellAttributes {
    /// True when no attribute is set.
    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }
}

/// A single character cell.
#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    /// Displayed character (space when blank)
    pub character: char,
    /// Foreground color
    pub fg: Color,
    /// Background color
    pub bg: Color,
    /// Text attributes
    pub attrs: CellAttributes,
}

impl Default for Cell {
    fn default() -> Self {
        Self {
            character: ' ',
            fg: Color::Default,
            bg: Color::Default,
            attrs: CellAttributes::default(),
        }
    }
}

impl Cell {
    /// Cell holding `character` with default styling.
    pub fn new(character: char) -> Self {
        Self {
            character,
            ..Default::default()
        }
    }

    /// Blank cell painted with a background color, as produced by erase
    /// operations while a background color is active.
    pub fn blank(bg: Color) -> Self {
        Self {
            bg,
            ..Default::default()
        }
    }

    /// Blank cell with default styling.
    pub fn is_empty(&self) -> bool {
        self.character == ' ' && self.attrs.is_default() && self.bg == Color::Default
    }
}
