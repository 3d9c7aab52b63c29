pub use self::{game::*, piece_generator::*};

pub(crate) mod game;
pub(crate) mod piece_generator;
