//! Geometry types: grid coordinates, terminal dimensions and pixel metrics.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Smallest column count a fitted terminal may shrink to.
pub const MIN_COLS: u16 = 2;

/// Smallest row count a fitted terminal may shrink to.
pub const MIN_ROWS: u16 = 1;

/// Position in the terminal grid (0-based row, column).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct Position {
    /// Row index
    pub row: u16,
    /// Column index
    pub col: u16,
}

impl Position {
    /// Create a new position.
    pub fn new(row: u16, col: u16) -> Self {
        Self { row, col }
    }

    /// The top-left cell.
    pub fn origin() -> Self {
        Self { row: 0, col: 0 }
    }
}

/// Terminal geometry in character cells.
///
/// This is the value synchronised with the remote pseudo-terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct Dimensions {
    /// Number of rows
    pub rows: u16,
    /// Number of columns
    pub cols: u16,
}

impl Dimensions {
    /// Create new dimensions.
    pub fn new(rows: u16, cols: u16) -> Self {
        Self { rows, cols }
    }

    /// Create dimensions, rejecting zero-sized geometry.
    pub fn checked(rows: u16, cols: u16) -> Result<Self> {
        if rows == 0 || cols == 0 {
            return Err(Error::InvalidDimensions { rows, cols });
        }
        Ok(Self { rows, cols })
    }

    /// Total number of cells.
    pub fn cell_count(&self) -> usize {
        self.rows as usize * self.cols as usize
    }

    /// Largest geometry whose cells fit inside `bounds`.
    ///
    /// Never returns less than [`MIN_ROWS`] x [`MIN_COLS`], so a collapsed
    /// container still yields a usable grid.
    pub fn fit(bounds: PixelSize, cell: CellSize) -> Self {
        let cols = bounds.width / cell.width.max(1);
        let rows = bounds.height / cell.height.max(1);
        Self {
            rows: clamp_cells(rows, MIN_ROWS),
            cols: clamp_cells(cols, MIN_COLS),
        }
    }
}

fn clamp_cells(value: u32, min: u16) -> u16 {
    u16::try_from(value).unwrap_or(u16::MAX).max(min)
}

impl Default for Dimensions {
    fn default() -> Self {
        Self::new(24, 80)
    }
}

impl std::fmt::Display for Dimensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.cols, self.rows)
    }
}

/// Rectangular region of the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct Bounds {
    /// Starting row
    pub row: u16,
    /// Starting column
    pub col: u16,
    /// Width in columns
    pub width: u16,
    /// Height in rows
    pub height: u16,
}

impl Bounds {
    /// Create new bounds.
    pub fn new(row: u16, col: u16, width: u16, height: u16) -> Self {
        Self {
            row,
            col,
            width,
            height,
        }
    }

    /// Bounds covering a whole grid of the given dimensions.
    pub fn full(dimensions: Dimensions) -> Self {
        Self::new(0, 0, dimensions.cols, dimensions.rows)
    }

    /// Check if a position is inside these bounds.
    pub fn contains(&self, pos: &Position) -> bool {
        pos.row >= self.row
            && pos.row < self.row + self.height
            && pos.col >= self.col
            && pos.col < self.col + self.width
    }
}

/// Size of a container in device pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct PixelSize {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl PixelSize {
    /// Create a new pixel size.
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Size of one rendered character cell in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct CellSize {
    /// Cell width in pixels
    pub width: u32,
    /// Cell height in pixels
    pub height: u32,
}

impl CellSize {
    /// Create a new cell size.
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl Default for CellSize {
    fn default() -> Self {
        // 14px monospace
        Self::new(9, 17)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dimensions_default() {
        let dims = Dimensions::default();
        assert_eq!(dims.rows, 24);
        assert_eq!(dims.cols, 80);
        assert_eq!(dims.to_string(), "80x24");
    }

    #[test]
    fn test_dimensions_checked() {
        assert!(Dimensions::checked(24, 80).is_ok());
        assert!(matches!(
            Dimensions::checked(0, 80),
            Err(Error::InvalidDimensions { rows: 0, cols: 80 })
        ));
    }

    #[test]
    fn test_fit_exact_and_partial_cells() {
        let cell = CellSize::new(10, 20);
        assert_eq!(
            Dimensions::fit(PixelSize::new(800, 480), cell),
            Dimensions::new(24, 80)
        );
        // Partial cells are dropped
        assert_eq!(
            Dimensions::fit(PixelSize::new(809, 499), cell),
            Dimensions::new(24, 80)
        );
    }

    #[test]
    fn test_fit_never_collapses() {
        let dims = Dimensions::fit(PixelSize::new(0, 0), CellSize::new(10, 20));
        assert_eq!(dims, Dimensions::new(MIN_ROWS, MIN_COLS));
    }

    #[test]
    fn test_fit_zero_cell_metrics() {
        let dims = Dimensions::fit(PixelSize::new(100, 50), CellSize::new(0, 0));
        assert_eq!(dims, Dimensions::new(50, 100));
    }

    #[test]
    fn test_bounds_contains() {
        let bounds = Bounds::new(5, 10, 20, 10);
        assert!(bounds.contains(&Position::new(5, 10)));
        assert!(bounds.contains(&Position::new(14, 29)));
        assert!(!bounds.contains(&Position::new(15, 10)));
        assert!(!bounds.contains(&Position::new(10, 30)));
    }

    #[test]
    fn test_bounds_full() {
        let bounds = Bounds::full(Dimensions::new(3, 7));
        assert_eq!(bounds, Bounds::new(0, 0, 7, 3));
    }
}
