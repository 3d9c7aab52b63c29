use arrayvec::ArrayVec;

use crate::{BoardError, COLUMN_COUNT, PlacementConflict, ROW_COUNT};

use super::shape::{Shape, ShapeKind};

/// A single cell of the grid.
///
/// Falling and settled cells are distinguished so that collision checks and
/// rendering never have to compare colours or magic markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, derive_more::IsVariant)]
pub enum Cell {
    /// Empty cell.
    #[default]
    Empty,
    /// Cell of the live falling piece.
    Falling(ShapeKind),
    /// Cell of a piece that has merged into the stack.
    Settled(ShapeKind),
}

impl Cell {
    #[must_use]
    pub fn is_occupied(self) -> bool {
        !self.is_empty()
    }
}

/// The live falling piece: a shape plus the anchor of its bounding box.
///
/// The anchor is signed because a rotated shape may hang its empty bounding-box
/// columns past the wall while every occupied cell stays inside the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FallingPiece {
    shape: Shape,
    row: i16,
    col: i16,
}

impl FallingPiece {
    #[must_use]
    pub fn shape(self) -> Shape {
        self.shape
    }

    #[must_use]
    pub fn row(self) -> i16 {
        self.row
    }

    #[must_use]
    pub fn col(self) -> i16 {
        self.col
    }

    /// Returns the absolute `(row, col)` positions of the four occupied cells.
    pub fn cell_positions(self) -> impl Iterator<Item = (i16, i16)> {
        self.shape
            .cells()
            .into_iter()
            .map(move |(dr, dc)| (self.row + i16::from(dr), self.col + i16::from(dc)))
    }
}

/// Side of the grid a piece sticks out of after a rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutOfBounds {
    Top,
    Bottom,
    Left,
    Right,
}

/// The playing grid and the piece currently falling on it.
///
/// All movement operations keep the painted cells consistent with the tracked
/// anchor: the piece is erased, the anchor updated, and the piece repainted.
/// Operations that need an active piece return [`BoardError::NoActivePiece`]
/// when none is present.
#[derive(Debug, Clone)]
pub struct Board {
    cells: [[Cell; COLUMN_COUNT]; ROW_COUNT],
    piece: Option<FallingPiece>,
}

impl Default for Board {
    fn default() -> Self {
        Self::new()
    }
}

impl Board {
    #[must_use]
    pub fn new() -> Self {
        Self {
            cells: [[Cell::Empty; COLUMN_COUNT]; ROW_COUNT],
            piece: None,
        }
    }

    /// Builds a board from ASCII art where `#` is a settled cell and `.` is empty.
    ///
    /// Rows are bottom-aligned: art shorter than the grid describes the lowest
    /// rows and the rest stays empty. Intended for test fixtures.
    ///
    /// # Panics
    ///
    /// Panics if a line is not exactly [`COLUMN_COUNT`] characters wide, if
    /// there are more than [`ROW_COUNT`] lines, or on an unknown character.
    #[must_use]
    pub fn from_ascii(art: &str) -> Self {
        let lines: Vec<&str> = art.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
        assert!(lines.len() <= ROW_COUNT, "too many rows: {}", lines.len());
        let mut board = Self::new();
        let top = ROW_COUNT - lines.len();
        for (y, line) in lines.iter().enumerate() {
            assert_eq!(line.len(), COLUMN_COUNT, "bad row width: {line:?}");
            for (x, c) in line.chars().enumerate() {
                board.cells[top + y][x] = match c {
                    '#' => Cell::Settled(ShapeKind::I),
                    '.' => Cell::Empty,
                    _ => panic!("unknown board cell: {c:?}"),
                };
            }
        }
        board
    }

    /// Returns the cell at `(row, col)`.
    ///
    /// # Panics
    ///
    /// Panics if the position is outside the grid.
    #[must_use]
    pub fn cell(&self, row: usize, col: usize) -> Cell {
        self.cells[row][col]
    }

    /// Returns the full grid, rows top to bottom.
    #[must_use]
    pub fn rows(&self) -> &[[Cell; COLUMN_COUNT]; ROW_COUNT] {
        &self.cells
    }

    #[must_use]
    pub fn falling_piece(&self) -> Option<FallingPiece> {
        self.piece
    }

    /// Spawns a new falling piece at the top center of the grid.
    ///
    /// Any previous falling piece merges into the stack first. Fails when one
    /// of the spawn cells is already settled, which is the game-over signal.
    pub fn spawn(&mut self, shape: Shape) -> Result<(), PlacementConflict> {
        self.settle_active_piece();
        let piece = FallingPiece {
            shape,
            row: 0,
            col: (COLUMN_COUNT / 2 - 1) as i16,
        };
        if self.placement_blocked(piece) {
            return Err(PlacementConflict);
        }
        self.set_piece(piece);
        Ok(())
    }

    /// Moves the piece one row down. Returns `false` when it rests on support.
    pub fn move_down(&mut self) -> Result<bool, BoardError> {
        if self.is_colliding_bottom()? {
            return Ok(false);
        }
        let piece = self.require_piece()?;
        self.translate(piece, 1, 0);
        Ok(true)
    }

    /// Moves the piece one column left. Returns `false` when blocked.
    pub fn move_left(&mut self) -> Result<bool, BoardError> {
        let piece = self.require_piece()?;
        let blocked = piece
            .cell_positions()
            .any(|(row, col)| col == 0 || self.is_settled_at(row, col - 1));
        if blocked {
            return Ok(false);
        }
        self.translate(piece, 0, -1);
        Ok(true)
    }

    /// Moves the piece one column right. Returns `false` when blocked.
    pub fn move_right(&mut self) -> Result<bool, BoardError> {
        let piece = self.require_piece()?;
        let blocked = piece
            .cell_positions()
            .any(|(row, col)| col == COLUMN_COUNT as i16 - 1 || self.is_settled_at(row, col + 1));
        if blocked {
            return Ok(false);
        }
        self.translate(piece, 0, 1);
        Ok(true)
    }

    /// Drops the piece until it rests on support.
    ///
    /// Returns the number of rows descended. The piece is left resting, not
    /// merged; the next gravity tick locks it in.
    pub fn instant_drop(&mut self) -> Result<u32, BoardError> {
        let mut rows = 0;
        while self.move_down()? {
            rows += 1;
        }
        Ok(rows)
    }

    pub fn rotate_right(&mut self) -> Result<(), BoardError> {
        self.rotate(Shape::rotated_right)
    }

    pub fn rotate_left(&mut self) -> Result<(), BoardError> {
        self.rotate(Shape::rotated_left)
    }

    /// Rotates the piece, nudging it back inside the grid if the new
    /// orientation sticks out past a wall. If the corrected position overlaps
    /// the stack, the rotation is abandoned and the piece stays where it was.
    fn rotate(&mut self, apply: fn(Shape) -> Shape) -> Result<(), BoardError> {
        let piece = self.require_piece()?;
        let mut rotated = FallingPiece {
            shape: apply(piece.shape),
            ..piece
        };
        loop {
            match self.out_of_bounds_side(rotated) {
                Some(OutOfBounds::Top) => rotated.row += 1,
                Some(OutOfBounds::Bottom) => rotated.row -= 1,
                Some(OutOfBounds::Left) => rotated.col += 1,
                Some(OutOfBounds::Right) => rotated.col -= 1,
                None => break,
            }
        }
        self.paint(piece, Cell::Empty);
        if self.placement_blocked(rotated) {
            self.set_piece(piece);
        } else {
            self.set_piece(rotated);
        }
        Ok(())
    }

    /// Whether the piece rests on the floor or on a settled cell.
    pub fn is_colliding_bottom(&self) -> Result<bool, BoardError> {
        let piece = self.require_piece()?;
        Ok(piece
            .cell_positions()
            .any(|(row, col)| row >= ROW_COUNT as i16 - 1 || self.is_settled_at(row + 1, col)))
    }

    /// Returns the indices of fully occupied rows, top to bottom.
    #[must_use]
    pub fn completed_row_indices(&self) -> ArrayVec<usize, ROW_COUNT> {
        self.cells
            .iter()
            .enumerate()
            .filter(|(_, row)| row.iter().all(|c| c.is_occupied()))
            .map(|(y, _)| y)
            .collect()
    }

    /// Merges the falling piece into the stack, clears every completed row and
    /// shifts the rows above down. Returns the number of rows cleared.
    pub fn clear_completed_lines(&mut self) -> u32 {
        self.settle_active_piece();
        let mut count = 0;
        for y in (0..ROW_COUNT).rev() {
            if self.cells[y].iter().all(|c| c.is_occupied()) {
                count += 1;
                continue;
            }
            if count > 0 {
                self.cells[y + count] = self.cells[y];
            }
        }
        for row in &mut self.cells[..count] {
            *row = [Cell::Empty; COLUMN_COUNT];
        }
        count as u32
    }

    /// Clones the board with the falling piece replaced by `shape` anchored at
    /// `col`, dropped straight down and merged into the stack.
    ///
    /// Completed rows are left in place so the caller can still count them.
    /// Used by look-ahead planners to score a candidate placement.
    pub fn clone_with_piece_at(&self, shape: Shape, col: i16) -> Result<Self, BoardError> {
        let live = self.require_piece()?;
        let mut future = self.clone();
        future.paint(live, Cell::Empty);
        let piece = FallingPiece {
            shape,
            row: live.row,
            col,
        };
        if future.placement_blocked(piece) {
            return Err(PlacementConflict.into());
        }
        future.set_piece(piece);
        future.instant_drop()?;
        future.settle_active_piece();
        Ok(future)
    }

    fn require_piece(&self) -> Result<FallingPiece, BoardError> {
        self.piece.ok_or(BoardError::NoActivePiece)
    }

    fn settle_active_piece(&mut self) {
        if let Some(piece) = self.piece.take() {
            self.paint(piece, Cell::Settled(piece.shape().kind()));
        }
    }

    fn set_piece(&mut self, piece: FallingPiece) {
        self.piece = Some(piece);
        self.paint(piece, Cell::Falling(piece.shape().kind()));
    }

    fn translate(&mut self, piece: FallingPiece, d_row: i16, d_col: i16) {
        self.paint(piece, Cell::Empty);
        self.set_piece(FallingPiece {
            row: piece.row + d_row,
            col: piece.col + d_col,
            ..piece
        });
    }

    /// Paints the piece's cells, clamping positions to the grid edges so a
    /// transiently out-of-range cell can never index past the arrays.
    fn paint(&mut self, piece: FallingPiece, cell: Cell) {
        for (row, col) in piece.cell_positions() {
            let row = row.clamp(0, ROW_COUNT as i16 - 1) as usize;
            let col = col.clamp(0, COLUMN_COUNT as i16 - 1) as usize;
            self.cells[row][col] = cell;
        }
    }

    fn is_settled_at(&self, row: i16, col: i16) -> bool {
        if row < 0 || row >= ROW_COUNT as i16 || col < 0 || col >= COLUMN_COUNT as i16 {
            return false;
        }
        self.cells[row as usize][col as usize].is_settled()
    }

    /// Whether any cell of the piece is outside the grid or on a settled cell.
    fn placement_blocked(&self, piece: FallingPiece) -> bool {
        piece.cell_positions().any(|(row, col)| {
            row < 0
                || row >= ROW_COUNT as i16
                || col < 0
                || col >= COLUMN_COUNT as i16
                || self.cells[row as usize][col as usize].is_settled()
        })
    }

    fn out_of_bounds_side(&self, piece: FallingPiece) -> Option<OutOfBounds> {
        for (row, col) in piece.cell_positions() {
            if col < 0 {
                return Some(OutOfBounds::Left);
            }
            if col >= COLUMN_COUNT as i16 {
                return Some(OutOfBounds::Right);
            }
            if row < 0 {
                return Some(OutOfBounds::Top);
            }
            if row >= ROW_COUNT as i16 {
                return Some(OutOfBounds::Bottom);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn occupied_count(board: &Board) -> usize {
        board
            .rows()
            .iter()
            .flatten()
            .filter(|c| c.is_occupied())
            .count()
    }

    #[test]
    fn test_spawn_places_piece_at_top_center() {
        let mut board = Board::new();
        board.spawn(Shape::new(ShapeKind::T)).unwrap();
        let piece = board.falling_piece().unwrap();
        assert_eq!(piece.row(), 0);
        assert_eq!(piece.col(), 4);
        for (row, col) in piece.cell_positions() {
            assert_eq!(board.cell(row as usize, col as usize), Cell::Falling(ShapeKind::T));
        }
    }

    #[test]
    fn test_spawn_fails_on_settled_overlap() {
        let mut board = Board::from_ascii(
            "....##....
             ....##....
             ..........
             ..........
             ..........
             ..........
             ..........
             ..........
             ..........
             ..........
             ..........
             ..........
             ..........
             ..........
             ..........
             ..........
             ..........
             ..........
             ..........
             ..........",
        );
        assert!(board.spawn(Shape::new(ShapeKind::O)).is_err());
    }

    #[test]
    fn test_move_left_stops_at_wall() {
        let mut board = Board::new();
        board.spawn(Shape::new(ShapeKind::O)).unwrap();
        for _ in 0..COLUMN_COUNT {
            if !board.move_left().unwrap() {
                break;
            }
        }
        let leftmost = board
            .falling_piece()
            .unwrap()
            .cell_positions()
            .map(|(_, col)| col)
            .min()
            .unwrap();
        assert_eq!(leftmost, 0);
        assert!(!board.move_left().unwrap());
    }

    #[test]
    fn test_instant_drop_rests_on_floor() {
        let mut board = Board::new();
        board.spawn(Shape::new(ShapeKind::I)).unwrap();
        let rows = board.instant_drop().unwrap();
        assert_eq!(rows, (ROW_COUNT - 2) as u32);
        assert!(board.is_colliding_bottom().unwrap());
        let bottom = board
            .falling_piece()
            .unwrap()
            .cell_positions()
            .map(|(row, _)| row)
            .max()
            .unwrap();
        assert_eq!(bottom, ROW_COUNT as i16 - 1);
    }

    #[test]
    fn test_instant_drop_rests_on_stack() {
        let mut board = Board::from_ascii("##########");
        board.spawn(Shape::new(ShapeKind::I)).unwrap();
        board.instant_drop().unwrap();
        let bottom = board
            .falling_piece()
            .unwrap()
            .cell_positions()
            .map(|(row, _)| row)
            .max()
            .unwrap();
        assert_eq!(bottom, ROW_COUNT as i16 - 2);
    }

    #[test]
    fn test_rotation_near_wall_is_nudged_inside() {
        let mut board = Board::new();
        board.spawn(Shape::new(ShapeKind::I)).unwrap();
        board.rotate_right().unwrap();
        while board.move_left().unwrap() {}
        // Rotating back to horizontal would stick out past the left wall.
        board.rotate_right().unwrap();
        let piece = board.falling_piece().unwrap();
        assert_eq!(piece.shape().horizontal_span(), 4);
        for (row, col) in piece.cell_positions() {
            assert!((0..COLUMN_COUNT as i16).contains(&col));
            assert!((0..ROW_COUNT as i16).contains(&row));
        }
    }

    #[test]
    fn test_blocked_rotation_keeps_previous_orientation() {
        // Settled columns hem the vertical I in on both sides near the floor.
        let mut board = Board::from_ascii(
            "###....###
             ###....###
             ###....###
             ###....###
             ##########",
        );
        board.spawn(Shape::new(ShapeKind::I)).unwrap();
        board.rotate_right().unwrap();
        let orientation = board.falling_piece().unwrap().shape().orientation();
        board.instant_drop().unwrap();
        board.rotate_right().unwrap();
        let piece = board.falling_piece().unwrap();
        assert_eq!(piece.shape().orientation(), orientation);
        assert!(!board.is_settled_at(piece.row(), piece.col()));
    }

    #[test]
    fn test_clear_completed_lines_counts_and_compacts() {
        let mut board = Board::from_ascii(
            "#.........
             ##########
             #.#######.
             ##########",
        );
        let before = occupied_count(&board);
        let cleared = board.clear_completed_lines();
        assert_eq!(cleared, 2);
        assert_eq!(occupied_count(&board), before - 2 * COLUMN_COUNT);
        // Survivors shift to the bottom, order preserved.
        assert_eq!(board.cell(ROW_COUNT - 1, 0), Cell::Settled(ShapeKind::I));
        assert_eq!(board.cell(ROW_COUNT - 1, 9), Cell::Empty);
        assert_eq!(board.cell(ROW_COUNT - 2, 0), Cell::Settled(ShapeKind::I));
        assert_eq!(board.cell(ROW_COUNT - 2, 1), Cell::Empty);
    }

    #[test]
    fn test_clear_merges_falling_piece_first() {
        let mut board = Board::from_ascii("######.###");
        board.spawn(Shape::new(ShapeKind::I)).unwrap();
        board.rotate_right().unwrap();
        // Occupied column of a vertical I sits two cells right of the anchor.
        let col = board
            .falling_piece()
            .unwrap()
            .cell_positions()
            .map(|(_, col)| col)
            .next()
            .unwrap();
        assert_eq!(col, 6);
        board.instant_drop().unwrap();
        let cleared = board.clear_completed_lines();
        assert_eq!(cleared, 1);
        assert!(board.falling_piece().is_none());
        // Three cells of the I survive above the cleared row.
        assert_eq!(occupied_count(&board), 3);
    }

    #[test]
    fn test_clone_with_piece_at_projects_future_stack() {
        let mut board = Board::from_ascii("####.#####");
        board.spawn(Shape::new(ShapeKind::I)).unwrap();
        let vertical = board.falling_piece().unwrap().shape().rotated_right();
        // Anchor 2 puts the vertical I's occupied column at 4, the gap.
        let future = board.clone_with_piece_at(vertical, 2).unwrap();
        assert_eq!(future.completed_row_indices().len(), 1);
        assert!(future.falling_piece().is_none());
        // The source board is untouched.
        assert!(board.falling_piece().is_some());
        assert_eq!(board.completed_row_indices().len(), 0);
    }

    #[test]
    fn test_clone_with_piece_at_rejects_blocked_column() {
        let mut board = Board::from_ascii(
            "#.........
             #.........
             #.........
             #.........
             #.........
             #.........
             #.........
             #.........
             #.........
             #.........
             #.........
             #.........
             #.........
             #.........
             #.........
             #.........
             #.........
             #.........
             #.........
             #.........",
        );
        board.spawn(Shape::new(ShapeKind::I)).unwrap();
        let vertical = board.falling_piece().unwrap().shape().rotated_right();
        // Occupied column would land on the full column 0.
        assert!(board.clone_with_piece_at(vertical, -2).is_err());
    }

    #[test]
    fn test_operations_without_piece_fail() {
        let mut board = Board::new();
        assert!(matches!(board.move_down(), Err(BoardError::NoActivePiece)));
        assert!(matches!(board.rotate_right(), Err(BoardError::NoActivePiece)));
        assert!(matches!(
            board.is_colliding_bottom(),
            Err(BoardError::NoActivePiece)
        ));
    }
}
