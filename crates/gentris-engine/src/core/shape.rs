use rand::{Rng, distr::StandardUniform, prelude::Distribution};
use serde::{Deserialize, Serialize};

/// Orientation of a shape within its 4×4 bounding box.
///
/// [`Orientation::North`] is the spawn orientation; each step of
/// [`rotated_right`](Orientation::rotated_right) turns the shape 90° clockwise.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum Orientation {
    #[default]
    North = 0,
    East = 1,
    South = 2,
    West = 3,
}

impl Orientation {
    /// Number of orientation states (4).
    pub const LEN: usize = 4;

    #[must_use]
    pub const fn rotated_right(self) -> Self {
        match self {
            Orientation::North => Orientation::East,
            Orientation::East => Orientation::South,
            Orientation::South => Orientation::West,
            Orientation::West => Orientation::North,
        }
    }

    #[must_use]
    pub const fn rotated_left(self) -> Self {
        match self {
            Orientation::North => Orientation::West,
            Orientation::East => Orientation::North,
            Orientation::South => Orientation::East,
            Orientation::West => Orientation::South,
        }
    }

    const fn as_usize(self) -> usize {
        self as usize
    }
}

/// Enum representing the type of shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[repr(u8)]
pub enum ShapeKind {
    /// I-shape.
    I = 0,
    /// O-shape.
    O = 1,
    /// S-shape.
    S = 2,
    /// Z-shape.
    Z = 3,
    /// J-shape.
    J = 4,
    /// L-shape.
    L = 5,
    /// T-shape.
    T = 6,
}

impl Distribution<ShapeKind> for StandardUniform {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> ShapeKind {
        match rng.random_range(0..=6) {
            0 => ShapeKind::I,
            1 => ShapeKind::O,
            2 => ShapeKind::S,
            3 => ShapeKind::Z,
            4 => ShapeKind::J,
            5 => ShapeKind::L,
            _ => ShapeKind::T,
        }
    }
}

impl ShapeKind {
    /// Number of shape types (7).
    pub const LEN: usize = 7;

    /// Returns the single character representation of this shape kind.
    #[must_use]
    pub const fn as_char(self) -> char {
        match self {
            ShapeKind::I => 'I',
            ShapeKind::O => 'O',
            ShapeKind::S => 'S',
            ShapeKind::Z => 'Z',
            ShapeKind::J => 'J',
            ShapeKind::L => 'L',
            ShapeKind::T => 'T',
        }
    }

    /// Parses a shape kind from a single character.
    #[must_use]
    pub const fn from_char(c: char) -> Option<Self> {
        match c {
            'I' => Some(ShapeKind::I),
            'O' => Some(ShapeKind::O),
            'S' => Some(ShapeKind::S),
            'Z' => Some(ShapeKind::Z),
            'J' => Some(ShapeKind::J),
            'L' => Some(ShapeKind::L),
            'T' => Some(ShapeKind::T),
            _ => None,
        }
    }
}

/// A shape kind at a specific orientation.
///
/// Shapes are immutable; rotation operations return new `Shape` instances.
/// Cell lookups resolve against tables generated at compile time, so a shape
/// is just a pair of small enums.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct Shape {
    kind: ShapeKind,
    orientation: Orientation,
}

impl Shape {
    /// Creates a shape in its spawn orientation.
    #[must_use]
    pub const fn new(kind: ShapeKind) -> Self {
        Self {
            kind,
            orientation: Orientation::North,
        }
    }

    #[must_use]
    pub const fn with_orientation(kind: ShapeKind, orientation: Orientation) -> Self {
        Self { kind, orientation }
    }

    #[must_use]
    pub const fn kind(self) -> ShapeKind {
        self.kind
    }

    #[must_use]
    pub const fn orientation(self) -> Orientation {
        self.orientation
    }

    #[must_use]
    pub const fn rotated_right(self) -> Self {
        Self {
            kind: self.kind,
            orientation: self.orientation.rotated_right(),
        }
    }

    #[must_use]
    pub const fn rotated_left(self) -> Self {
        Self {
            kind: self.kind,
            orientation: self.orientation.rotated_left(),
        }
    }

    /// Returns the four occupied `(row, col)` offsets within the 4×4 bounding box.
    #[must_use]
    pub const fn cells(self) -> CellOffsets {
        SHAPE_CELLS[self.kind as usize][self.orientation.as_usize()]
    }

    /// Width of the occupied cells in columns.
    #[must_use]
    pub fn horizontal_span(self) -> usize {
        let (min, max) = self.column_bounds();
        max - min + 1
    }

    /// Number of empty bounding-box columns to the left of the occupied cells.
    ///
    /// Converts a target leftmost column into an anchor column:
    /// `anchor = target - left_empty_offset`.
    #[must_use]
    pub fn left_empty_offset(self) -> usize {
        self.column_bounds().0
    }

    fn column_bounds(self) -> (usize, usize) {
        let mut min = 3;
        let mut max = 0;
        for (_, col) in self.cells() {
            let col = usize::from(col);
            if col < min {
                min = col;
            }
            if col > max {
                max = col;
            }
        }
        (min, max)
    }
}

/// The four occupied `(row, col)` offsets of a shape within its bounding box.
pub type CellOffsets = [(u8, u8); 4];

/// Occupancy grid for a shape within its 4×4 bounding box.
type ShapeGrid = [[bool; 4]; 4];

/// Generates all 4 orientation states of a shape grid by rotating 90° clockwise.
///
/// # Arguments
///
/// * `size` - Effective size of the shape (3 for most shapes, 4 for I, 2 for O)
/// * `grid` - Initial shape grid at spawn orientation
const fn grid_rotations(size: usize, grid: ShapeGrid) -> [ShapeGrid; 4] {
    let mut rotates = [grid; 4];
    let mut i = 1;
    while i < 4 {
        let mut new_grid = [[false; 4]; 4];
        let mut row = 0;
        while row < size {
            let mut col = 0;
            while col < size {
                new_grid[row][col] = rotates[i - 1][size - 1 - col][row];
                col += 1;
            }
            row += 1;
        }
        rotates[i] = new_grid;
        i += 1;
    }
    rotates
}

/// Extracts the occupied offsets of a grid in row-major order.
#[expect(clippy::cast_possible_truncation)]
const fn grid_cells(grid: &ShapeGrid) -> CellOffsets {
    let mut cells = [(0, 0); 4];
    let mut n = 0;
    let mut row = 0;
    while row < 4 {
        let mut col = 0;
        while col < 4 {
            if grid[row][col] {
                cells[n] = (row as u8, col as u8);
                n += 1;
            }
            col += 1;
        }
        row += 1;
    }
    assert!(n == 4);
    cells
}

const fn shape_cells(size: usize, spawn: ShapeGrid) -> [CellOffsets; 4] {
    let grids = grid_rotations(size, spawn);
    [
        grid_cells(&grids[0]),
        grid_cells(&grids[1]),
        grid_cells(&grids[2]),
        grid_cells(&grids[3]),
    ]
}

const SHAPE_CELLS: [[CellOffsets; 4]; ShapeKind::LEN] = {
    const C: bool = true;
    const E: bool = false;
    const EEEE: [bool; 4] = [E; 4];
    [
        // I-shape
        shape_cells(4, [EEEE, [C, C, C, C], EEEE, EEEE]),
        // O-shape
        shape_cells(2, [[C, C, E, E], [C, C, E, E], EEEE, EEEE]),
        // S-shape
        shape_cells(3, [[E, C, C, E], [C, C, E, E], EEEE, EEEE]),
        // Z-shape
        shape_cells(3, [[C, C, E, E], [E, C, C, E], EEEE, EEEE]),
        // J-shape
        shape_cells(3, [[C, E, E, E], [C, C, C, E], EEEE, EEEE]),
        // L-shape
        shape_cells(3, [[E, E, C, E], [C, C, C, E], EEEE, EEEE]),
        // T-shape
        shape_cells(3, [[E, C, E, E], [C, C, C, E], EEEE, EEEE]),
    ]
};
