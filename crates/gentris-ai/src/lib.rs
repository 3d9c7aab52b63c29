pub use self::{agent::*, genetic::*, random::*};

pub mod agent;
pub mod board_metrics;
pub mod genetic;
pub mod random;
