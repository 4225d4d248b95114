//! Terminal grid state buffer, cursor tracking and scrollback.

use std::collections::VecDeque;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use termbridge_core::{Bounds, Cell, CellAttributes, Color, Dimensions, Position};

/// Lines kept in scrollback unless configured otherwise.
pub const DEFAULT_SCROLLBACK: usize = 1000;

const TAB_WIDTH: u16 = 8;

/// Cursor visual style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum CursorStyle {
    /// Block cursor (fills entire cell)
    Block,
    /// Underline cursor (bottom of cell)
    Underline,
    /// Bar cursor (vertical line at left)
    Bar,
}

impl CursorStyle {
    /// Style selected by a DECSCUSR parameter.
    pub fn from_decscusr(param: u16) -> Self {
        match param {
            3 | 4 => CursorStyle::Underline,
            5 | 6 => CursorStyle::Bar,
            _ => CursorStyle::Block,
        }
    }
}

/// Cursor state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor {
    /// Current position
    pub position: Position,
    /// Visibility
    pub visible: bool,
    /// Cursor style
    pub style: CursorStyle,
}

impl Default for Cursor {
    fn default() -> Self {
        Self {
            position: Position::origin(),
            visible: true,
            style: CursorStyle::Block,
        }
    }
}

impl Cursor {
    /// Create a new cursor at origin.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create cursor at specific position.
    pub fn at(position: Position) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }
}

/// Terminal grid state buffer.
///
/// Rows that scroll off the top of the screen move into a bounded
/// scrollback buffer, oldest first.
#[derive(Debug, Clone)]
pub struct Grid {
    /// Cell storage (row-major order)
    cells: Vec<Cell>,
    dimensions: Dimensions,
    cursor: Cursor,
    saved_cursor: Option<Cursor>,
    /// Scroll region (top, bottom), 0-indexed, inclusive
    scroll_region: Option<(u16, u16)>,
    current_attrs: CellAttributes,
    current_fg: Color,
    current_bg: Color,
    /// Set after printing into the last column; the next print wraps first
    pending_wrap: bool,
    scrollback: VecDeque<Vec<Cell>>,
    scrollback_limit: usize,
    title: Option<String>,
}

impl Grid {
    /// Create a new grid with the default scrollback size.
    pub fn new(dimensions: Dimensions) -> Self {
        Self::with_scrollback(dimensions, DEFAULT_SCROLLBACK)
    }

    /// Create a new grid keeping at most `scrollback_limit` scrolled-off lines.
    ///
    /// Zero-sized dimensions are widened to one cell.
    pub fn with_scrollback(dimensions: Dimensions, scrollback_limit: usize) -> Self {
        let dimensions = Dimensions::new(dimensions.rows.max(1), dimensions.cols.max(1));
        Self {
            cells: vec![Cell::default(); dimensions.cell_count()],
            dimensions,
            cursor: Cursor::default(),
            saved_cursor: None,
            scroll_region: None,
            current_attrs: CellAttributes::default(),
            current_fg: Color::Default,
            current_bg: Color::Default,
            pending_wrap: false,
            scrollback: VecDeque::new(),
            scrollback_limit,
            title: None,
        }
    }

    fn index(&self, row: u16, col: u16) -> usize {
        row as usize * self.dimensions.cols as usize + col as usize
    }

    /// Get cell at position. Returns None if out of bounds.
    pub fn cell(&self, row: u16, col: u16) -> Option<&Cell> {
        if row < self.dimensions.rows && col < self.dimensions.cols {
            self.cells.get(self.index(row, col))
        } else {
            None
        }
    }

    /// Get mutable cell at position. Returns None if out of bounds.
    pub fn cell_mut(&mut self, row: u16, col: u16) -> Option<&mut Cell> {
        if row < self.dimensions.rows && col < self.dimensions.cols {
            let idx = self.index(row, col);
            self.cells.get_mut(idx)
        } else {
            None
        }
    }

    /// Get entire row as a slice. Returns None if out of bounds.
    pub fn row(&self, row: u16) -> Option<&[Cell]> {
        if row < self.dimensions.rows {
            let start = self.index(row, 0);
            Some(&self.cells[start..start + self.dimensions.cols as usize])
        } else {
            None
        }
    }

    /// Extract text from a region, trimming trailing whitespace per line.
    pub fn extract_text(&self, bounds: &Bounds) -> String {
        let mut lines = Vec::with_capacity(bounds.height as usize);
        for row_idx in bounds.row..bounds.row.saturating_add(bounds.height) {
            let line: String = (bounds.col..bounds.col.saturating_add(bounds.width))
                .filter_map(|col_idx| self.cell(row_idx, col_idx))
                .map(|cell| cell.character)
                .collect();
            lines.push(line.trim_end().to_string());
        }
        lines.join("\n")
    }

    /// Visible screen as plain text.
    pub fn to_plain_text(&self) -> String {
        self.extract_text(&Bounds::full(self.dimensions))
    }

    /// Scrollback as plain text, oldest line first.
    pub fn scrollback_text(&self) -> String {
        self.scrollback
            .iter()
            .map(|line| {
                line.iter()
                    .map(|cell| cell.character)
                    .collect::<String>()
                    .trim_end()
                    .to_string()
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Number of lines currently held in scrollback.
    pub fn scrollback_len(&self) -> usize {
        self.scrollback.len()
    }

    /// Get cursor reference.
    pub fn cursor(&self) -> &Cursor {
        &self.cursor
    }

    /// Get mutable cursor reference.
    pub fn cursor_mut(&mut self) -> &mut Cursor {
        self.pending_wrap = false;
        &mut self.cursor
    }

    /// Get dimensions.
    pub fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    /// Check if cursor is visible.
    pub fn cursor_visible(&self) -> bool {
        self.cursor.visible
    }

    /// Window title set by the remote side (OSC 0/2).
    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    /// Set the window title.
    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = Some(title.into());
    }

    /// Get current cell attributes.
    pub fn current_attrs(&self) -> &CellAttributes {
        &self.current_attrs
    }

    /// Set current cell attributes.
    pub fn set_current_attrs(&mut self, attrs: CellAttributes) {
        self.current_attrs = attrs;
    }

    /// Get current foreground color.
    pub fn current_fg(&self) -> Color {
        self.current_fg
    }

    /// Set current foreground color.
    pub fn set_current_fg(&mut self, color: Color) {
        self.current_fg = color;
    }

    /// Get current background color.
    pub fn current_bg(&self) -> Color {
        self.current_bg
    }

    /// Set current background color.
    pub fn set_current_bg(&mut self, color: Color) {
        self.current_bg = color;
    }

    /// Reset colors and attributes to defaults (SGR 0).
    pub fn reset_style(&mut self) {
        self.current_attrs = CellAttributes::default();
        self.current_fg = Color::Default;
        self.current_bg = Color::Default;
    }

    /// Save current cursor state.
    pub fn save_cursor(&mut self) {
        self.saved_cursor = Some(self.cursor.clone());
    }

    /// Restore saved cursor state. Without a saved cursor, homes the cursor.
    pub fn restore_cursor(&mut self) {
        let restored = self.saved_cursor.clone().unwrap_or_default();
        self.cursor = restored;
        self.clamp_cursor();
        self.pending_wrap = false;
    }

    fn clamp_cursor(&mut self) {
        let pos = &mut self.cursor.position;
        pos.row = pos.row.min(self.dimensions.rows - 1);
        pos.col = pos.col.min(self.dimensions.cols - 1);
    }

    fn scroll_bounds(&self) -> (u16, u16) {
        self.scroll_region
            .unwrap_or((0, self.dimensions.rows - 1))
    }

    /// Set the scroll region (DECSTBM). Invalid regions are ignored.
    pub fn set_scroll_region(&mut self, top: u16, bottom: u16) {
        let last = self.dimensions.rows - 1;
        if top >= bottom || bottom > last {
            return;
        }
        self.scroll_region = if top == 0 && bottom == last {
            None
        } else {
            Some((top, bottom))
        };
        self.move_cursor_to(0, 0);
    }

    /// Print a character at the cursor, wrapping and scrolling as needed.
    pub fn put_char(&mut self, c: char) {
        if self.pending_wrap {
            self.pending_wrap = false;
            self.cursor.position.col = 0;
            self.line_feed();
        }

        let pos = self.cursor.position;
        let cell = Cell {
            character: c,
            fg: self.current_fg,
            bg: self.current_bg,
            attrs: self.current_attrs,
        };
        if let Some(slot) = self.cell_mut(pos.row, pos.col) {
            *slot = cell;
        }

        if pos.col + 1 >= self.dimensions.cols {
            self.pending_wrap = true;
        } else {
            self.cursor.position.col += 1;
        }
    }

    /// Move down one line, scrolling at the bottom of the scroll region.
    pub fn line_feed(&mut self) {
        self.pending_wrap = false;
        let (_, bottom) = self.scroll_bounds();
        let row = self.cursor.position.row;
        if row == bottom {
            self.scroll_up(1);
        } else if row + 1 < self.dimensions.rows {
            self.cursor.position.row += 1;
        }
    }

    /// Move up one line, scrolling down at the top of the scroll region.
    pub fn reverse_index(&mut self) {
        self.pending_wrap = false;
        let (top, _) = self.scroll_bounds();
        let row = self.cursor.position.row;
        if row == top {
            self.scroll_down(1);
        } else if row > 0 {
            self.cursor.position.row -= 1;
        }
    }

    /// Move to column 0.
    pub fn carriage_return(&mut self) {
        self.pending_wrap = false;
        self.cursor.position.col = 0;
    }

    /// Move one column left.
    pub fn backspace(&mut self) {
        self.pending_wrap = false;
        self.cursor.position.col = self.cursor.position.col.saturating_sub(1);
    }

    /// Advance to the next tab stop (every 8 columns).
    pub fn tab(&mut self) {
        self.pending_wrap = false;
        let next = (self.cursor.position.col / TAB_WIDTH + 1) * TAB_WIDTH;
        self.cursor.position.col = next.min(self.dimensions.cols - 1);
    }

    /// Move the cursor to an absolute position, clamped to the grid.
    pub fn move_cursor_to(&mut self, row: u16, col: u16) {
        self.pending_wrap = false;
        self.cursor.position = Position::new(row, col);
        self.clamp_cursor();
    }

    /// Move the cursor relative to its position, clamped to the grid.
    pub fn move_cursor_by(&mut self, rows: i32, cols: i32) {
        let pos = self.cursor.position;
        let row = (pos.row as i32 + rows).max(0);
        let col = (pos.col as i32 + cols).max(0);
        self.move_cursor_to(
            u16::try_from(row).unwrap_or(u16::MAX),
            u16::try_from(col).unwrap_or(u16::MAX),
        );
    }

    /// Scroll the scroll region up by `n` lines.
    ///
    /// Lines leaving the top of the screen go to scrollback.
    pub fn scroll_up(&mut self, n: u16) {
        let (top, bottom) = self.scroll_bounds();
        for _ in 0..n.min(bottom - top + 1) {
            self.shift_up(top, bottom, top == 0);
        }
    }

    /// Scroll the scroll region down by `n` lines.
    pub fn scroll_down(&mut self, n: u16) {
        let (top, bottom) = self.scroll_bounds();
        for _ in 0..n.min(bottom - top + 1) {
            self.shift_down(top, bottom);
        }
    }

    fn shift_up(&mut self, top: u16, bottom: u16, keep: bool) {
        let cols = self.dimensions.cols as usize;
        let start = self.index(top, 0);
        let end = self.index(bottom, 0) + cols;
        if keep {
            let line = self.cells[start..start + cols].to_vec();
            self.push_scrollback(line);
        }
        self.cells[start..end].rotate_left(cols);
        let blank = Cell::blank(self.current_bg);
        self.cells[end - cols..end].fill(blank);
    }

    fn shift_down(&mut self, top: u16, bottom: u16) {
        let cols = self.dimensions.cols as usize;
        let start = self.index(top, 0);
        let end = self.index(bottom, 0) + cols;
        self.cells[start..end].rotate_right(cols);
        let blank = Cell::blank(self.current_bg);
        self.cells[start..start + cols].fill(blank);
    }

    fn push_scrollback(&mut self, line: Vec<Cell>) {
        if self.scrollback_limit == 0 {
            return;
        }
        if self.scrollback.len() >= self.scrollback_limit {
            self.scrollback.pop_front();
        }
        self.scrollback.push_back(line);
    }

    /// Insert `n` blank lines at the cursor row (IL).
    pub fn insert_lines(&mut self, n: u16) {
        let (top, bottom) = self.scroll_bounds();
        let row = self.cursor.position.row;
        if row < top || row > bottom {
            return;
        }
        for _ in 0..n.min(bottom - row + 1) {
            self.shift_down(row, bottom);
        }
        self.carriage_return();
    }

    /// Delete `n` lines at the cursor row (DL).
    pub fn delete_lines(&mut self, n: u16) {
        let (top, bottom) = self.scroll_bounds();
        let row = self.cursor.position.row;
        if row < top || row > bottom {
            return;
        }
        for _ in 0..n.min(bottom - row + 1) {
            self.shift_up(row, bottom, false);
        }
        self.carriage_return();
    }

    fn row_tail_mut(&mut self) -> &mut [Cell] {
        let pos = self.cursor.position;
        let start = self.index(pos.row, pos.col);
        let end = self.index(pos.row, 0) + self.dimensions.cols as usize;
        &mut self.cells[start..end]
    }

    /// Insert `n` blank cells at the cursor, shifting the rest right (ICH).
    pub fn insert_chars(&mut self, n: u16) {
        let blank = Cell::blank(self.current_bg);
        let tail = self.row_tail_mut();
        let n = (n as usize).min(tail.len());
        tail.rotate_right(n);
        tail[..n].fill(blank);
    }

    /// Delete `n` cells at the cursor, shifting the rest left (DCH).
    pub fn delete_chars(&mut self, n: u16) {
        let blank = Cell::blank(self.current_bg);
        let tail = self.row_tail_mut();
        let n = (n as usize).min(tail.len());
        tail.rotate_left(n);
        let len = tail.len();
        tail[len - n..].fill(blank);
    }

    /// Blank `n` cells starting at the cursor (ECH).
    pub fn erase_chars(&mut self, n: u16) {
        let blank = Cell::blank(self.current_bg);
        let tail = self.row_tail_mut();
        let n = (n as usize).min(tail.len());
        tail[..n].fill(blank);
    }

    fn blank_cells(&mut self, from: usize, to: usize) {
        let blank = Cell::blank(self.current_bg);
        self.cells[from..to].fill(blank);
    }

    /// Erase in line (EL): 0 = to end, 1 = to start, 2 = whole line.
    pub fn erase_in_line(&mut self, mode: u16) {
        let pos = self.cursor.position;
        let row_start = self.index(pos.row, 0);
        let row_end = row_start + self.dimensions.cols as usize;
        let at = self.index(pos.row, pos.col);
        match mode {
            0 => self.blank_cells(at, row_end),
            1 => self.blank_cells(row_start, at + 1),
            2 => self.blank_cells(row_start, row_end),
            _ => {}
        }
    }

    /// Erase in display (ED): 0 = to end, 1 = to start, 2 = screen,
    /// 3 = screen and scrollback.
    pub fn erase_in_display(&mut self, mode: u16) {
        let at = self.index(self.cursor.position.row, self.cursor.position.col);
        let total = self.cells.len();
        match mode {
            0 => self.blank_cells(at, total),
            1 => self.blank_cells(0, at + 1),
            2 => self.blank_cells(0, total),
            3 => {
                self.blank_cells(0, total);
                self.scrollback.clear();
            }
            _ => {}
        }
    }

    /// Full reset (RIS). Scrollback is kept.
    pub fn reset(&mut self) {
        self.clear();
        self.reset_style();
        self.cursor = Cursor::default();
        self.saved_cursor = None;
        self.scroll_region = None;
        self.pending_wrap = false;
        self.title = None;
    }

    /// Resize grid, preserving content where possible.
    ///
    /// Content is anchored at the top-left corner. When shrinking would cut
    /// off the cursor row, the screen first scrolls up so the cursor line
    /// stays visible.
    pub fn resize(&mut self, new_dimensions: Dimensions) {
        let new_dimensions =
            Dimensions::new(new_dimensions.rows.max(1), new_dimensions.cols.max(1));
        if new_dimensions == self.dimensions {
            return;
        }

        self.scroll_region = None;
        let cursor_row = self.cursor.position.row;
        if cursor_row >= new_dimensions.rows {
            let overflow = cursor_row + 1 - new_dimensions.rows;
            self.scroll_up(overflow);
            self.cursor.position.row -= overflow;
        }

        let mut new_cells = vec![Cell::default(); new_dimensions.cell_count()];
        let copy_rows = self.dimensions.rows.min(new_dimensions.rows);
        let copy_cols = self.dimensions.cols.min(new_dimensions.cols);
        for row in 0..copy_rows {
            for col in 0..copy_cols {
                let old_idx = self.index(row, col);
                let new_idx = row as usize * new_dimensions.cols as usize + col as usize;
                new_cells[new_idx] = self.cells[old_idx].clone();
            }
        }

        self.cells = new_cells;
        self.dimensions = new_dimensions;
        self.pending_wrap = false;
        self.clamp_cursor();
    }

    /// Clear the entire grid.
    pub fn clear(&mut self) {
        self.cells.fill(Cell::default());
    }

    /// Clear a specific region.
    pub fn clear_region(&mut self, bounds: &Bounds) {
        for row in bounds.row..bounds.row.saturating_add(bounds.height) {
            for col in bounds.col..bounds.col.saturating_add(bounds.width) {
                if let Some(cell) = self.cell_mut(row, col) {
                    *cell = Cell::default();
                }
            }
        }
    }
}
