pub use self::{cancel::*, genetic_master::*, master::*, runner::*};

pub mod cancel;
pub mod genetic_master;
pub mod master;
pub mod runner;
