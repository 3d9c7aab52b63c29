pub use self::{core::*, engine::*};

pub mod core;
pub mod engine;

/// Number of rows in the playable grid.
pub const ROW_COUNT: usize = 20;
/// Number of columns in the playable grid.
pub const COLUMN_COUNT: usize = 10;

#[derive(Debug, derive_more::Display, derive_more::Error)]
#[display("piece placement overlaps a settled cell")]
pub struct PlacementConflict;

#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum BoardError {
    #[display("no falling piece is active on the board")]
    NoActivePiece,
    #[display("{_0}")]
    Placement(PlacementConflict),
}

impl From<PlacementConflict> for BoardError {
    fn from(err: PlacementConflict) -> Self {
        BoardError::Placement(err)
    }
}

#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum GameError {
    #[display("reset is only valid once the game has ended")]
    ResetWhileRunning,
}
