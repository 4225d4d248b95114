//! ANSI/VT escape sequence parser using the VTE crate.
//!
//! The VTE state machine lives as long as the [`Parser`], so an escape
//! sequence split across two [`Parser::process`] calls is reassembled
//! before it reaches the grid.

use vte::{Params, Perform};

use termbridge_core::{CellAttributes, Color};

use crate::grid::{CursorStyle, Grid};

/// ANSI parser wrapping a persistent VTE state machine.
pub struct Parser {
    machine: vte::Parser,
    screen: Screen,
}

impl std::fmt::Debug for Parser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Parser")
            .field("grid", &self.screen.grid)
            .field("bells", &self.screen.bells)
            .finish_non_exhaustive()
    }
}

/// The [`Perform`] side of the parser, applying actions to the grid.
#[derive(Debug)]
struct Screen {
    grid: Grid,
    bells: u64,
}

impl Parser {
    /// Create a new parser driving the given grid.
    pub fn new(grid: Grid) -> Self {
        Self {
            machine: vte::Parser::new(),
            screen: Screen { grid, bells: 0 },
        }
    }

    /// Get a reference to the grid.
    pub fn grid(&self) -> &Grid {
        &self.screen.grid
    }

    /// Get a mutable reference to the grid.
    pub fn grid_mut(&mut self) -> &mut Grid {
        &mut self.screen.grid
    }

    /// Consume the parser and return the grid.
    pub fn into_grid(self) -> Grid {
        self.screen.grid
    }

    /// Number of BEL characters received.
    pub fn bell_count(&self) -> u64 {
        self.screen.bells
    }

    /// Feed bytes through the VTE state machine.
    ///
    /// Returns the number of bytes consumed.
    pub fn process(&mut self, bytes: &[u8]) -> usize {
        for byte in bytes {
            self.machine.advance(&mut self.screen, *byte);
        }
        bytes.len()
    }
}

/// Parameter `idx`, with 0 or missing replaced by `default`.
fn param(params: &Params, idx: usize, default: u16) -> u16 {
    params
        .iter()
        .nth(idx)
        .and_then(|p| p.first().copied())
        .filter(|&v| v != 0)
        .unwrap_or(default)
}

/// Parameter `idx` taken literally (0 when missing).
fn raw_param(params: &Params, idx: usize) -> u16 {
    params
        .iter()
        .nth(idx)
        .and_then(|p| p.first().copied())
        .unwrap_or(0)
}

impl Screen {
    fn update_attrs(&mut self, f: impl FnOnce(&mut CellAttributes)) {
        let mut attrs = *self.grid.current_attrs();
        f(&mut attrs);
        self.grid.set_current_attrs(attrs);
    }

    /// Process SGR (Select Graphic Rendition) parameters.
    fn process_sgr(&mut self, params: &Params) {
        let mut iter = params.iter();

        while let Some(param) = iter.next() {
            let code = param.first().copied().unwrap_or(0);

            match code {
                0 => self.grid.reset_style(),
                1 => self.update_attrs(|a| a.bold = true),
                2 => self.update_attrs(|a| a.dim = true),
                3 => self.update_attrs(|a| a.italic = true),
                4 => self.update_attrs(|a| a.underline = true),
                5 => self.update_attrs(|a| a.blink = true),
                7 => self.update_attrs(|a| a.reverse = true),
                8 => self.update_attrs(|a| a.hidden = true),
                9 => self.update_attrs(|a| a.strikethrough = true),
                22 => self.update_attrs(|a| {
                    a.bold = false;
                    a.dim = false;
                }),
                23 => self.update_attrs(|a| a.italic = false),
                24 => self.update_attrs(|a| a.underline = false),
                25 => self.update_attrs(|a| a.blink = false),
                27 => self.update_attrs(|a| a.reverse = false),
                28 => self.update_attrs(|a| a.hidden = false),
                29 => self.update_attrs(|a| a.strikethrough = false),

                30..=37 => self.grid.set_current_fg(Color::ansi(code - 30, false)),
                39 => self.grid.set_current_fg(Color::Default),
                40..=47 => self.grid.set_current_bg(Color::ansi(code - 40, false)),
                49 => self.grid.set_current_bg(Color::Default),
                90..=97 => self.grid.set_current_fg(Color::ansi(code - 90, true)),
                100..=107 => self.grid.set_current_bg(Color::ansi(code - 100, true)),

                // Extended colors: 38;5;n / 38;2;r;g;b (and 48 for background)
                38 | 48 => {
                    let color = match iter.next().and_then(|p| p.first().copied()) {
                        Some(5) => iter
                            .next()
                            .and_then(|p| p.first().copied())
                            .map(|idx| Color::Indexed(idx as u8)),
                        Some(2) => match (iter.next(), iter.next(), iter.next()) {
                            (Some(r), Some(g), Some(b)) => Some(Color::Rgb {
                                r: r.first().copied().unwrap_or(0) as u8,
                                g: g.first().copied().unwrap_or(0) as u8,
                                b: b.first().copied().unwrap_or(0) as u8,
                            }),
                            _ => None,
                        },
                        _ => None,
                    };
                    if let Some(color) = color {
                        if code == 38 {
                            self.grid.set_current_fg(color);
                        } else {
                            self.grid.set_current_bg(color);
                        }
                    }
                }

                _ => {}
            }
        }
    }

    fn set_private_mode(&mut self, params: &Params, enabled: bool) {
        for p in params.iter() {
            match p.first().copied() {
                Some(25) => self.grid.cursor_mut().visible = enabled,
                // Alternate screen: no separate buffer, start from a clean screen
                Some(47) | Some(1047) | Some(1049) => {
                    self.grid.erase_in_display(2);
                    self.grid.move_cursor_to(0, 0);
                }
                _ => {}
            }
        }
    }
}

impl Perform for Screen {
    fn print(&mut self, c: char) {
        self.grid.put_char(c);
    }

    fn execute(&mut self, byte: u8) {
        match byte {
            0x07 => self.bells += 1,
            0x08 => self.grid.backspace(),
            0x09 => self.grid.tab(),
            0x0A..=0x0C => self.grid.line_feed(),
            0x0D => self.grid.carriage_return(),
            _ => {}
        }
    }

    fn osc_dispatch(&mut self, params: &[&[u8]], _bell_terminated: bool) {
        // OSC 0 / OSC 2: window title
        if let [kind, title, ..] = params {
            if *kind == b"0" || *kind == b"2" {
                self.grid.set_title(String::from_utf8_lossy(title));
            }
        }
    }

    fn csi_dispatch(&mut self, params: &Params, intermediates: &[u8], _ignore: bool, c: char) {
        let n = param(params, 0, 1);

        match (intermediates, c) {
            ([], 'A') => self.grid.move_cursor_by(-(n as i32), 0),
            ([], 'B') | ([], 'e') => self.grid.move_cursor_by(n as i32, 0),
            ([], 'C') | ([], 'a') => self.grid.move_cursor_by(0, n as i32),
            ([], 'D') => self.grid.move_cursor_by(0, -(n as i32)),
            ([], 'E') => {
                self.grid.move_cursor_by(n as i32, 0);
                self.grid.carriage_return();
            }
            ([], 'F') => {
                self.grid.move_cursor_by(-(n as i32), 0);
                self.grid.carriage_return();
            }
            ([], 'G') | ([], '`') => {
                let row = self.grid.cursor().position.row;
                self.grid.move_cursor_to(row, n - 1);
            }
            ([], 'd') => {
                let col = self.grid.cursor().position.col;
                self.grid.move_cursor_to(n - 1, col);
            }
            ([], 'H') | ([], 'f') => {
                let row = param(params, 0, 1) - 1;
                let col = param(params, 1, 1) - 1;
                self.grid.move_cursor_to(row, col);
            }
            ([], 'J') => self.grid.erase_in_display(raw_param(params, 0)),
            ([], 'K') => self.grid.erase_in_line(raw_param(params, 0)),
            ([], 'L') => self.grid.insert_lines(n),
            ([], 'M') => self.grid.delete_lines(n),
            ([], '@') => self.grid.insert_chars(n),
            ([], 'P') => self.grid.delete_chars(n),
            ([], 'X') => self.grid.erase_chars(n),
            ([], 'S') => self.grid.scroll_up(n),
            ([], 'T') => self.grid.scroll_down(n),
            ([], 'm') => self.process_sgr(params),
            ([], 'r') => {
                let rows = self.grid.dimensions().rows;
                let top = param(params, 0, 1) - 1;
                let bottom = param(params, 1, rows) - 1;
                self.grid.set_scroll_region(top, bottom);
            }
            ([], 's') => self.grid.save_cursor(),
            ([], 'u') => self.grid.restore_cursor(),
            ([b'?'], 'h') => self.set_private_mode(params, true),
            ([b'?'], 'l') => self.set_private_mode(params, false),
            ([b' '], 'q') => {
                self.grid.cursor_mut().style = CursorStyle::from_decscusr(raw_param(params, 0));
            }
            _ => {}
        }
    }

    fn esc_dispatch(&mut self, intermediates: &[u8], _ignore: bool, byte: u8) {
        if !intermediates.is_empty() {
            // Charset designation and friends
            return;
        }
        match byte {
            b'7' => self.grid.save_cursor(),
            b'8' => self.grid.restore_cursor(),
            b'D' => self.grid.line_feed(),
            b'E' => {
                self.grid.carriage_return();
                self.grid.line_feed();
            }
            b'M' => self.grid.reverse_index(),
            b'c' => self.grid.reset(),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use termbridge_core::{Dimensions, Position};

    fn parser(rows: u16, cols: u16) -> Parser {
        Parser::new(Grid::new(Dimensions::new(rows, cols)))
    }

    #[test]
    fn test_parser_process_basic() {
        let mut parser = parser(24, 80);
        let bytes = b"Hello, World!";
        assert_eq!(parser.process(bytes), bytes.len());
        assert_eq!(parser.grid().to_plain_text().lines().next(), Some("Hello, World!"));
        assert_eq!(parser.grid().cursor().position.col, 13);
    }

    #[test]
    fn test_parser_control_characters() {
        let mut parser = parser(24, 80);
        parser.process(b"ab\r\ncd\x08");
        assert_eq!(parser.grid().cursor().position, Position::new(1, 1));

        parser.process(b"\r\t");
        assert_eq!(parser.grid().cursor().position.col, 8);
    }

    #[test]
    fn test_parser_bell() {
        let mut parser = parser(2, 10);
        parser.process(b"\x07\x07");
        assert_eq!(parser.bell_count(), 2);
    }

    #[test]
    fn test_split_escape_sequence_is_reassembled() {
        let mut parser = parser(2, 10);
        parser.process(b"\x1b[3");
        parser.process(b"1mX");

        let cell = parser.grid().cell(0, 0).unwrap();
        assert_eq!(cell.character, 'X');
        assert_eq!(cell.fg, Color::Red);
        // No stray parameter bytes were printed
        assert_eq!(parser.grid().to_plain_text(), "X\n");
    }

    #[test]
    fn test_split_utf8_is_reassembled() {
        let mut parser = parser(1, 4);
        let bytes = "é".as_bytes();
        parser.process(&bytes[..1]);
        parser.process(&bytes[1..]);
        assert_eq!(parser.grid().cell(0, 0).unwrap().character, 'é');
    }

    #[test]
    fn test_parser_csi_cursor_movement() {
        let mut parser = parser(24, 80);
        parser.process(b"\x1b[11;21H");
        assert_eq!(parser.grid().cursor().position, Position::new(10, 20));

        parser.process(b"\x1b[5A");
        assert_eq!(parser.grid().cursor().position.row, 5);

        // Omitted parameter means 1
        parser.process(b"\x1b[A\x1b[C");
        assert_eq!(parser.grid().cursor().position, Position::new(4, 21));

        parser.process(b"\x1b[H");
        assert_eq!(parser.grid().cursor().position, Position::origin());

        parser.process(b"\x1b[7G\x1b[3d");
        assert_eq!(parser.grid().cursor().position, Position::new(2, 6));
    }

    #[test]
    fn test_parser_sgr_colors() {
        let mut parser = parser(1, 10);
        parser.process(b"\x1b[31;44mA\x1b[92mB\x1b[38;5;200mC\x1b[38;2;1;2;3mD\x1b[0mE");

        let row = parser.grid().row(0).unwrap();
        assert_eq!(row[0].fg, Color::Red);
        assert_eq!(row[0].bg, Color::Blue);
        assert_eq!(row[1].fg, Color::BrightGreen);
        assert_eq!(row[2].fg, Color::Indexed(200));
        assert_eq!(row[3].fg, Color::Rgb { r: 1, g: 2, b: 3 });
        assert_eq!(row[4].fg, Color::Default);
        assert_eq!(row[4].bg, Color::Default);
    }

    #[test]
    fn test_parser_sgr_attributes() {
        let mut parser = parser(1, 10);
        parser.process(b"\x1b[1;4mX\x1b[22mY");

        let row = parser.grid().row(0).unwrap();
        assert!(row[0].attrs.bold);
        assert!(row[0].attrs.underline);
        assert!(!row[1].attrs.bold);
        assert!(row[1].attrs.underline);
    }

    #[test]
    fn test_parser_erase_in_display() {
        let mut parser = parser(5, 10);
        parser.process(&[b'X'; 50]);
        parser.process(b"\x1b[3;6H\x1b[J");

        assert_eq!(parser.grid().cell(0, 0).unwrap().character, 'X');
        assert_eq!(parser.grid().cell(2, 4).unwrap().character, 'X');
        assert_eq!(parser.grid().cell(2, 5).unwrap().character, ' ');
        assert_eq!(parser.grid().cell(4, 9).unwrap().character, ' ');
    }

    #[test]
    fn test_parser_erase_in_line() {
        let mut parser = parser(5, 10);
        parser.process(b"XXXXXXXXXX\x1b[1;6H\x1b[K");

        assert_eq!(parser.grid().cell(0, 4).unwrap().character, 'X');
        assert_eq!(parser.grid().cell(0, 5).unwrap().character, ' ');
    }

    #[test]
    fn test_parser_scrolls_output() {
        let mut parser = parser(2, 10);
        parser.process(b"one\r\ntwo\r\nthree");
        assert_eq!(parser.grid().to_plain_text(), "two\nthree");
        assert_eq!(parser.grid().scrollback_text(), "one");
    }

    #[test]
    fn test_parser_osc_title() {
        let mut parser = parser(2, 10);
        parser.process(b"\x1b]0;user@vm-42: ~\x07");
        assert_eq!(parser.grid().title(), Some("user@vm-42: ~"));

        parser.process(b"\x1b]2;top\x1b\\");
        assert_eq!(parser.grid().title(), Some("top"));
    }

    #[test]
    fn test_parser_cursor_visibility_and_style() {
        let mut parser = parser(2, 10);
        parser.process(b"\x1b[?25l");
        assert!(!parser.grid().cursor_visible());
        parser.process(b"\x1b[?25h\x1b[5 q");
        assert!(parser.grid().cursor_visible());
        assert_eq!(parser.grid().cursor().style, CursorStyle::Bar);
    }

    #[test]
    fn test_parser_save_restore_esc() {
        let mut parser = parser(10, 10);
        parser.process(b"\x1b[4;4H\x1b7\x1b[1;1H\x1b8");
        assert_eq!(parser.grid().cursor().position, Position::new(3, 3));
    }

    #[test]
    fn test_parser_reverse_index_scrolls_down() {
        let mut parser = parser(3, 5);
        parser.process(b"a\r\nb\r\nc\x1b[H\x1bM");
        assert_eq!(parser.grid().to_plain_text(), "\na\nb");
    }

    #[test]
    fn test_parser_full_reset() {
        let mut parser = parser(2, 10);
        parser.process(b"\x1b[31mhello\x1bc");
        assert_eq!(parser.grid().to_plain_text(), "\n");
        assert_eq!(parser.grid().current_fg(), Color::Default);
    }
}
