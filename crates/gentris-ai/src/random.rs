use gentris_engine::{Action, Game};
use rand::{Rng, SeedableRng, seq::IndexedRandom};
use rand_pcg::Pcg32;

use crate::agent::{ActionQueue, Agent, AgentId};

/// Baseline agent that plays uniformly random actions.
///
/// Useful as a control when judging how much the heuristic agents actually
/// learn. Each agent owns a seeded generator so runs can be replayed.
#[derive(Debug)]
pub struct RandomAgent {
    id: AgentId,
    queue: ActionQueue,
    rng: Pcg32,
}

impl RandomAgent {
    #[must_use]
    pub fn new(id: AgentId) -> Self {
        Self::with_seed(id, rand::rng().random())
    }

    #[must_use]
    pub fn with_seed(id: AgentId, seed: u64) -> Self {
        Self {
            id,
            queue: ActionQueue::new(),
            rng: Pcg32::seed_from_u64(seed),
        }
    }
}

impl Agent for RandomAgent {
    fn id(&self) -> AgentId {
        self.id
    }

    fn name(&self) -> String {
        format!("random-{}", self.id)
    }

    fn next_action(&mut self, _game: &Game) -> Action {
        let Self { queue, rng, .. } = self;
        queue.next_or_refill(|buffer, capacity| {
            for _ in 0..capacity {
                if let Some(action) = Action::ALL.choose(rng) {
                    buffer.push_back(*action);
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use gentris_engine::PieceGenerator;

    use super::*;
    use crate::agent::AgentIdGenerator;

    #[test]
    fn test_same_seed_replays_same_actions() {
        let ids = AgentIdGenerator::new();
        let mut game = Game::with_pieces(0, PieceGenerator::fixed(gentris_engine::ShapeKind::T));
        game.start(Duration::ZERO);
        let mut a = RandomAgent::with_seed(ids.next_id(), 7);
        let mut b = RandomAgent::with_seed(ids.next_id(), 7);
        for _ in 0..32 {
            assert_eq!(a.next_action(&game), b.next_action(&game));
        }
    }
}
