use std::{
    cmp::Ordering,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{self, AtomicBool},
    },
    time::Duration,
};

use gentris_ai::{Agent, AgentId, AgentIdGenerator, GeneticAgent, HeuristicWeights};
use gentris_engine::{Game, PieceGenerator};
use log::{info, warn};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;
use serde::Serialize;

use crate::master::{AgentsMaster, GamePairing, MasterConfig, MasterDirective, MasterError, SharedGame};

/// Rolling summary of the evolution run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GenerationProgress {
    /// Number of the generation currently playing, starting at 1.
    pub generation: u64,
    /// Highest score any generation winner has reached so far.
    pub best_score: Option<f64>,
    /// Agent that won the latest completed generation.
    pub leader: Option<AgentId>,
}

/// The current front-runner: its identity, genome, and score.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct BestCandidate {
    pub id: AgentId,
    pub weights: HeuristicWeights,
    pub score: f64,
}

/// Runs generations of [`GeneticAgent`]s until told to stop.
///
/// Each generation plays on an [`AgentsMaster`]; once every game has ended
/// the population is ranked by score, the bottom half is discarded, the
/// winner survives unchanged, and the vacated games are refilled with bred
/// children. The master then restarts itself for the next generation.
pub struct GeneticMaster {
    master: AgentsMaster<GeneticAgent>,
    ids: AgentIdGenerator,
    progress: Arc<Mutex<GenerationProgress>>,
    shutdown: Arc<AtomicBool>,
}

impl GeneticMaster {
    /// Creates a supervisor whose evolution draws come from `seed`.
    #[must_use]
    pub fn new(config: MasterConfig, seed: u64) -> Self {
        let mutation_rate = config.mutation_rate;
        let master = AgentsMaster::new(config);
        let ids = AgentIdGenerator::new();
        let progress = Arc::new(Mutex::new(GenerationProgress {
            generation: 1,
            best_score: None,
            leader: None,
        }));
        let shutdown = Arc::new(AtomicBool::new(false));

        let mut rng = Pcg32::seed_from_u64(seed);
        let handler_ids = ids.clone();
        let handler_progress = Arc::clone(&progress);
        let handler_shutdown = Arc::clone(&shutdown);
        master.set_all_over_handler(move |pairings| {
            if handler_shutdown.load(atomic::Ordering::Relaxed) {
                return MasterDirective::Idle;
            }
            evolve_population(
                pairings,
                &mut rng,
                mutation_rate,
                &handler_ids,
                &handler_progress,
            );
            MasterDirective::Restart
        });

        Self {
            master,
            ids,
            progress,
            shutdown,
        }
    }

    /// Fills the population with `game_count` randomly seeded agents, each on
    /// a game with its own piece sequence.
    pub fn populate<R: Rng + ?Sized>(
        &self,
        game_count: usize,
        rng: &mut R,
    ) -> Result<(), MasterError> {
        for index in 0..game_count {
            let game = Game::with_pieces(index, PieceGenerator::with_seed(rng.random()));
            let agent = GeneticAgent::new(self.ids.next_id(), rng);
            self.master.add_agent(game, agent)?;
        }
        Ok(())
    }

    /// Starts the first generation.
    pub fn start(&self) -> Result<(), MasterError> {
        self.shutdown.store(false, atomic::Ordering::Relaxed);
        self.master.start()
    }

    /// Stops evolving and halts the current generation.
    ///
    /// A generation that is just being evolved may still restart once; the
    /// shutdown flag stops the cycle at the next opportunity.
    pub fn stop(&self) -> Result<(), MasterError> {
        self.shutdown.store(true, atomic::Ordering::Relaxed);
        self.master.stop()
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.master.is_running()
    }

    #[must_use]
    pub fn progress(&self) -> GenerationProgress {
        *self
            .progress
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn games(&self) -> Vec<SharedGame> {
        self.master.games()
    }

    /// The highest-scoring pairing of the current population.
    #[must_use]
    pub fn best_candidate(&self) -> Option<BestCandidate> {
        self.master
            .population()
            .into_iter()
            .map(|pairing| {
                let score = lock(&pairing.game).score();
                let agent = lock(&pairing.agent);
                BestCandidate {
                    id: agent.id(),
                    weights: agent.weights(),
                    score,
                }
            })
            .max_by(|a, b| a.score.partial_cmp(&b.score).unwrap_or(Ordering::Equal))
    }

    pub fn wait_until_idle(&self, timeout: Duration) -> bool {
        self.master.wait_until_idle(timeout)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Breeds the next generation in place.
///
/// The ranking keeps the game objects in score order, so the winner's game
/// hosts the unchanged winner and every other game is recycled for a child
/// of two distinct retained parents (or the lone survivor bred with itself
/// in a degenerate one-survivor population).
fn evolve_population<R: Rng + ?Sized>(
    pairings: &mut Vec<GamePairing<GeneticAgent>>,
    rng: &mut R,
    mutation_rate: f64,
    ids: &AgentIdGenerator,
    progress: &Mutex<GenerationProgress>,
) {
    if pairings.is_empty() {
        return;
    }
    let mut ranked: Vec<(f64, GamePairing<GeneticAgent>)> = pairings
        .drain(..)
        .map(|pairing| {
            let score = lock(&pairing.game).score();
            (score, pairing)
        })
        .collect();
    ranked.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));

    let top_score = ranked[0].0;
    let leader = lock(&ranked[0].1.agent).id();
    {
        let mut progress = lock(progress);
        let completed = progress.generation;
        progress.generation += 1;
        progress.leader = Some(leader);
        if progress.best_score.is_none_or(|best| top_score > best) {
            progress.best_score = Some(top_score);
        }
        info!(
            "generation {completed} complete: leader {leader} scored {top_score:.0} \
             (best ever {:.0})",
            progress.best_score.unwrap_or(top_score),
        );
    }

    let keep = (ranked.len() / 2).max(1);
    let parents: Vec<Arc<Mutex<GeneticAgent>>> = ranked[..keep]
        .iter()
        .map(|(_, pairing)| Arc::clone(&pairing.agent))
        .collect();

    for (rank, (_, pairing)) in ranked.into_iter().enumerate() {
        let agent = if rank == 0 {
            // Elitism: the winner survives into the next generation as is.
            pairing.agent
        } else {
            let child = breed_child(&parents, mutation_rate, rng, ids);
            Arc::new(Mutex::new(child))
        };
        let label = lock(&agent).name();
        if let Err(err) = lock(&pairing.game).reset(label) {
            warn!("could not recycle game for the next generation: {err}");
        }
        pairings.push(GamePairing {
            game: pairing.game,
            agent,
        });
    }
}

fn breed_child<R: Rng + ?Sized>(
    parents: &[Arc<Mutex<GeneticAgent>>],
    mutation_rate: f64,
    rng: &mut R,
    ids: &AgentIdGenerator,
) -> GeneticAgent {
    use rand::seq::IndexedRandom;

    let mut picks = parents.choose_multiple(rng, 2);
    let Some(first) = picks.next() else {
        unreachable!("the retained half is never empty");
    };
    let second = picks.next().unwrap_or(first);
    if Arc::ptr_eq(first, second) {
        let parent = lock(first);
        parent.crossover(&parent, mutation_rate, rng, ids)
    } else {
        let a = lock(first);
        let b = lock(second);
        a.crossover(&b, mutation_rate, rng, ids)
    }
}
