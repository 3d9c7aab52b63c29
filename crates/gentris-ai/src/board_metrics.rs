//! Stack measurements used by heuristic evaluation.
//!
//! All metrics treat any occupied cell as part of the stack, so they are meant
//! for projected boards where the candidate piece has already merged.

use gentris_engine::{Board, COLUMN_COUNT, ROW_COUNT};

/// Height of each column: distance from its topmost occupied cell to the floor.
#[must_use]
pub fn column_heights(board: &Board) -> [usize; COLUMN_COUNT] {
    let mut heights = [0; COLUMN_COUNT];
    for (col, height) in heights.iter_mut().enumerate() {
        for row in 0..ROW_COUNT {
            if board.cell(row, col).is_occupied() {
                *height = ROW_COUNT - row;
                break;
            }
        }
    }
    heights
}

/// Number of empty cells with at least one occupied cell above them.
#[must_use]
pub fn hole_count(board: &Board) -> usize {
    let mut holes = 0;
    for col in 0..COLUMN_COUNT {
        let mut covered = false;
        for row in 0..ROW_COUNT {
            if board.cell(row, col).is_occupied() {
                covered = true;
            } else if covered {
                holes += 1;
            }
        }
    }
    holes
}

/// Sum of absolute height differences between adjacent columns.
#[must_use]
pub fn bumpiness(heights: &[usize; COLUMN_COUNT]) -> usize {
    heights.windows(2).map(|pair| pair[0].abs_diff(pair[1])).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_on_empty_board() {
        let board = Board::new();
        let heights = column_heights(&board);
        assert_eq!(heights, [0; COLUMN_COUNT]);
        assert_eq!(hole_count(&board), 0);
        assert_eq!(bumpiness(&heights), 0);
    }

    #[test]
    fn test_heights_track_topmost_cell() {
        let board = Board::from_ascii(
            "#.........
             #....#....
             ##...#...#",
        );
        let heights = column_heights(&board);
        assert_eq!(heights, [3, 1, 0, 0, 0, 2, 0, 0, 0, 1]);
    }

    #[test]
    fn test_holes_require_cover() {
        let board = Board::from_ascii(
            "#...#.....
             ....#.....
             #...#..#..
             .....#.#..",
        );
        // Column 0: two covered gaps. Column 4: one at the bottom. Columns 5
        // and 7 have nothing empty underneath their occupied cells.
        assert_eq!(hole_count(&board), 3);
    }

    #[test]
    fn test_bumpiness_sums_adjacent_differences() {
        let heights = [2, 0, 0, 0, 0, 0, 0, 0, 0, 4];
        assert_eq!(bumpiness(&heights), 10);
    }
}
