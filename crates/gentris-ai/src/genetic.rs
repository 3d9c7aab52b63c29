use arrayvec::ArrayVec;
use gentris_engine::{Action, Board, COLUMN_COUNT, Game, Orientation};
use log::debug;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{
    agent::{ActionQueue, Agent, AgentId, AgentIdGenerator},
    board_metrics,
};

/// Range every gene is confined to.
const GENE_RANGE: std::ops::RangeInclusive<f64> = -1.0..=1.0;
/// Magnitude bound of a single mutation step.
const MUTATION_STEP: f64 = 0.5;

/// The genome of a heuristic agent: one weight per stack measurement.
///
/// Weights carry their own sign, so a gene that should penalize (say, holes)
/// simply evolves negative. Placements are scored as the plain weighted sum of
/// the four measurements and higher is better.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct HeuristicWeights {
    /// Weight of the summed column heights.
    pub height: f64,
    /// Weight of the covered-hole count.
    pub holes: f64,
    /// Weight of the adjacent-column height differences.
    pub bumpiness: f64,
    /// Weight of the rows a placement would complete.
    pub line_clear: f64,
}

impl HeuristicWeights {
    /// Draws a uniformly random genome.
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self::from_array([
            rng.random_range(GENE_RANGE),
            rng.random_range(GENE_RANGE),
            rng.random_range(GENE_RANGE),
            rng.random_range(GENE_RANGE),
        ])
    }

    /// Breeds a child genome by simple averaging.
    ///
    /// Each gene is the arithmetic mean of the parent genes; with probability
    /// `mutation_rate` it is then nudged by a uniform step and clamped back
    /// into range.
    pub fn crossover<R: Rng + ?Sized>(self, other: Self, mutation_rate: f64, rng: &mut R) -> Self {
        let a = self.to_array();
        let b = other.to_array();
        let mut child = [0.0; 4];
        for (gene, (x, y)) in child.iter_mut().zip(a.into_iter().zip(b)) {
            *gene = f64::midpoint(x, y);
            if rng.random_bool(mutation_rate) {
                *gene += rng.random_range(-MUTATION_STEP..=MUTATION_STEP);
            }
            *gene = gene.clamp(*GENE_RANGE.start(), *GENE_RANGE.end());
        }
        Self::from_array(child)
    }

    /// Scores a projected board; higher is better.
    #[expect(clippy::cast_precision_loss)]
    #[must_use]
    pub fn fitness(&self, board: &Board) -> f64 {
        let heights = board_metrics::column_heights(board);
        let total_height: usize = heights.iter().sum();
        let holes = board_metrics::hole_count(board);
        let bumpiness = board_metrics::bumpiness(&heights);
        let lines = board.completed_row_indices().len();
        self.height * total_height as f64
            + self.holes * holes as f64
            + self.bumpiness * bumpiness as f64
            + self.line_clear * lines as f64
    }

    fn to_array(self) -> [f64; 4] {
        [self.height, self.holes, self.bumpiness, self.line_clear]
    }

    fn from_array([height, holes, bumpiness, line_clear]: [f64; 4]) -> Self {
        Self {
            height,
            holes,
            bumpiness,
            line_clear,
        }
    }
}

/// Upper bound of a placement plan: three rotations, a wall-to-wall slide,
/// and the final drop.
const PLAN_CAPACITY: usize = 16;

/// Agent that plays the best placement under its evolved heuristic weights.
///
/// For every new piece it tries all four orientations across every column,
/// projects the resulting stack, and converts the winner into a short action
/// plan. Ties keep the first candidate found, so planning is deterministic.
#[derive(Debug)]
pub struct GeneticAgent {
    id: AgentId,
    queue: ActionQueue,
    weights: HeuristicWeights,
}

impl GeneticAgent {
    /// Creates an agent with a genome drawn from `rng`.
    pub fn new<R: Rng + ?Sized>(id: AgentId, rng: &mut R) -> Self {
        Self::with_weights(id, HeuristicWeights::random(rng))
    }

    #[must_use]
    pub fn with_weights(id: AgentId, weights: HeuristicWeights) -> Self {
        Self {
            id,
            queue: ActionQueue::new(),
            weights,
        }
    }

    #[must_use]
    pub fn weights(&self) -> HeuristicWeights {
        self.weights
    }

    /// Breeds a child agent under a fresh id.
    pub fn crossover<R: Rng + ?Sized>(
        &self,
        other: &GeneticAgent,
        mutation_rate: f64,
        rng: &mut R,
        ids: &AgentIdGenerator,
    ) -> GeneticAgent {
        let weights = self.weights.crossover(other.weights, mutation_rate, rng);
        GeneticAgent::with_weights(ids.next_id(), weights)
    }
}

impl Agent for GeneticAgent {
    fn id(&self) -> AgentId {
        self.id
    }

    fn name(&self) -> String {
        format!("genetic-{}", self.id)
    }

    fn next_action(&mut self, game: &Game) -> Action {
        let Self { queue, weights, .. } = self;
        queue.next_or_refill(|buffer, _| {
            for action in plan_placement(weights, game.board()) {
                buffer.push_back(action);
            }
        })
    }
}

/// Plans the action sequence steering the falling piece into the placement
/// with the highest fitness.
///
/// Candidates that cannot be projected (the target cells are already settled)
/// are skipped. With no falling piece, or no projectable candidate at all,
/// the plan is empty and the queue degrades to plain gravity.
fn plan_placement(weights: &HeuristicWeights, board: &Board) -> ArrayVec<Action, PLAN_CAPACITY> {
    let mut actions = ArrayVec::new();
    let Some(live) = board.falling_piece() else {
        return actions;
    };

    let mut shape = live.shape();
    let mut best: Option<(f64, usize, i16)> = None;
    for rotations in 0..Orientation::LEN {
        let span = shape.horizontal_span();
        let offset = shape.left_empty_offset() as i16;
        for slot in 0..=(COLUMN_COUNT - span) {
            let col = slot as i16 - offset;
            let Ok(future) = board.clone_with_piece_at(shape, col) else {
                continue;
            };
            let fitness = weights.fitness(&future);
            if best.is_none_or(|(top, _, _)| fitness > top) {
                best = Some((fitness, rotations, col));
            }
        }
        shape = shape.rotated_right();
    }
    let Some((best_fitness, best_rotations, best_col)) = best else {
        return actions;
    };

    debug!(
        "targeting column {best_col} after {best_rotations} rotations (fitness {best_fitness:.2})"
    );
    for _ in 0..best_rotations {
        actions.push(Action::RotateRight);
    }
    let step = if best_col < live.col() {
        Action::MoveLeft
    } else {
        Action::MoveRight
    };
    for _ in 0..live.col().abs_diff(best_col) {
        actions.push(step);
    }
    actions.push(Action::Drop);
    actions
}
