use std::{
    collections::VecDeque,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use gentris_engine::{Action, Game};
use serde::{Deserialize, Serialize};

/// Number of actions an agent decides per planning batch.
pub const ACTION_BATCH_CAPACITY: usize = 4;

/// Identity of an agent, unique across every population of a run.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    derive_more::Display,
    Deserialize,
    Serialize,
)]
pub struct AgentId(u64);

impl AgentId {
    #[must_use]
    pub fn value(self) -> u64 {
        self.0
    }
}

/// Hands out monotonically increasing [`AgentId`]s, starting at 1.
///
/// Clones share the same counter, so a generator can be handed to an evolution
/// loop without ever reissuing an id.
#[derive(Debug, Clone, Default)]
pub struct AgentIdGenerator {
    counter: Arc<AtomicU64>,
}

impl AgentIdGenerator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self) -> AgentId {
        AgentId(self.counter.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

/// A decision maker driving one game.
///
/// An agent is asked for exactly one action per scheduler iteration and may
/// buffer a planned batch internally between calls.
pub trait Agent: Send {
    fn id(&self) -> AgentId;

    fn name(&self) -> String;

    /// Returns the next action to apply to `game`.
    fn next_action(&mut self, game: &Game) -> Action;
}

/// Buffered batch of planned actions, refilled on demand.
#[derive(Debug, Default)]
pub struct ActionQueue {
    actions: VecDeque<Action>,
}

impl ActionQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pops the next buffered action, invoking `refill` first when the buffer
    /// is empty. `refill` receives the buffer and the batch capacity.
    pub fn next_or_refill(
        &mut self,
        refill: impl FnOnce(&mut VecDeque<Action>, usize),
    ) -> Action {
        if self.actions.is_empty() {
            refill(&mut self.actions, ACTION_BATCH_CAPACITY);
        }
        // A refill that produced nothing degrades to plain gravity.
        self.actions.pop_front().unwrap_or(Action::MoveDown)
    }
}
