use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    thread,
    time::Duration,
};

use gentris_ai::Agent;
use gentris_engine::{EndReason, Game};
use log::{debug, error, info, warn};

use crate::cancel::CancellationToken;

/// Timing and evolution knobs of a scheduler run.
#[derive(Debug, Clone)]
pub struct MasterConfig {
    /// Pause between scheduler iterations of one game.
    pub tick_interval: Duration,
    /// Deadline after which every still-running game is forced over.
    pub game_timeout: Duration,
    /// Breather between a finished generation and the restart.
    pub generation_pause: Duration,
    /// Probability that a bred gene receives a mutation step.
    pub mutation_rate: f64,
}

impl Default for MasterConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(10),
            game_timeout: Duration::from_secs(10),
            generation_pause: Duration::from_millis(500),
            mutation_rate: 0.1,
        }
    }
}

#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum MasterError {
    #[display("the master is already running")]
    AlreadyRunning,
    #[display("the master is not running")]
    NotRunning,
}

pub type SharedGame = Arc<Mutex<Game>>;

/// One game and the agent playing it.
#[derive(Debug)]
pub struct GamePairing<A> {
    pub game: SharedGame,
    pub agent: Arc<Mutex<A>>,
}

impl<A> Clone for GamePairing<A> {
    fn clone(&self) -> Self {
        Self {
            game: Arc::clone(&self.game),
            agent: Arc::clone(&self.agent),
        }
    }
}

/// What the all-games-over handler wants to happen next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MasterDirective {
    /// Stay stopped.
    Idle,
    /// Wait the generation pause, then start the (possibly rebuilt)
    /// population again.
    Restart,
}

type AllOverHandler<A> = Box<dyn FnMut(&mut Vec<GamePairing<A>>) -> MasterDirective + Send>;

struct MasterState<A> {
    pairings: Vec<GamePairing<A>>,
    running: bool,
    run_token: CancellationToken,
    worker_tokens: Vec<CancellationToken>,
    handler: Option<AllOverHandler<A>>,
}

struct MasterCore<A> {
    config: MasterConfig,
    state: Mutex<MasterState<A>>,
}

/// Concurrent scheduler running one worker thread per agent-driven game.
///
/// Workers advance their game in lockstep iterations: ask the agent for an
/// action, apply it, tick gravity, sleep. A watchdog forces every game over
/// at the configured timeout, and the first worker to observe that all games
/// have ended runs the all-over handler exactly once.
///
/// The population may only be modified between runs; both the handler and
/// [`add_agent`](AgentsMaster::add_agent) rely on that.
pub struct AgentsMaster<A> {
    core: Arc<MasterCore<A>>,
}

impl<A> Clone for AgentsMaster<A> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

impl<A: Agent + 'static> AgentsMaster<A> {
    #[must_use]
    pub fn new(config: MasterConfig) -> Self {
        Self {
            core: Arc::new(MasterCore {
                config,
                state: Mutex::new(MasterState {
                    pairings: Vec::new(),
                    running: false,
                    run_token: CancellationToken::cancelled(),
                    worker_tokens: Vec::new(),
                    handler: None,
                }),
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &MasterConfig {
        &self.core.config
    }

    /// Registers a game for `agent` to play. Fails while a run is active.
    pub fn add_agent(&self, game: Game, agent: A) -> Result<(), MasterError> {
        let mut state = self.core.lock_state();
        if state.running {
            return Err(MasterError::AlreadyRunning);
        }
        state.pairings.push(GamePairing {
            game: Arc::new(Mutex::new(game)),
            agent: Arc::new(Mutex::new(agent)),
        });
        Ok(())
    }

    /// Installs the handler invoked once per run when every game has ended,
    /// replacing any previous handler.
    pub fn set_all_over_handler(
        &self,
        handler: impl FnMut(&mut Vec<GamePairing<A>>) -> MasterDirective + Send + 'static,
    ) {
        self.core.lock_state().handler = Some(Box::new(handler));
    }

    /// Starts every registered game and its worker thread, plus the watchdog.
    pub fn start(&self) -> Result<(), MasterError> {
        MasterCore::start(&self.core)
    }

    /// Stops the current run without waiting for games to finish.
    ///
    /// Unfinished games are left as they are and the all-over handler does
    /// not fire.
    pub fn stop(&self) -> Result<(), MasterError> {
        let mut state = self.core.lock_state();
        if !state.running {
            return Err(MasterError::NotRunning);
        }
        info!("stopping all games");
        state.running = false;
        state.run_token.cancel();
        for token in state.worker_tokens.drain(..) {
            token.cancel();
        }
        Ok(())
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.core.lock_state().running
    }

    /// Snapshot of the current population.
    #[must_use]
    pub fn population(&self) -> Vec<GamePairing<A>> {
        self.core.lock_state().pairings.clone()
    }

    /// Handles on every registered game, for display and inspection.
    #[must_use]
    pub fn games(&self) -> Vec<SharedGame> {
        self.core
            .lock_state()
            .pairings
            .iter()
            .map(|pairing| Arc::clone(&pairing.game))
            .collect()
    }

    /// Blocks until the current run stops or `timeout` elapses.
    ///
    /// Returns `true` when the run has stopped. A master that was never
    /// started counts as stopped.
    pub fn wait_until_idle(&self, timeout: Duration) -> bool {
        let token = self.core.lock_state().run_token.clone();
        token.wait_timeout(timeout)
    }
}

impl<A: Agent + 'static> MasterCore<A> {
    fn lock_state(&self) -> MutexGuard<'_, MasterState<A>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn start(core: &Arc<Self>) -> Result<(), MasterError> {
        let mut state = core.lock_state();
        if state.running {
            return Err(MasterError::AlreadyRunning);
        }
        info!("starting {} games", state.pairings.len());
        state.running = true;
        state.run_token = CancellationToken::new();
        state.worker_tokens.clear();
        let pairings = state.pairings.clone();
        for pairing in pairings {
            {
                let mut game = lock(&pairing.game);
                if game.is_game_over() {
                    game.start(Duration::ZERO);
                }
            }
            let token = CancellationToken::new();
            state.worker_tokens.push(token.clone());
            let core = Arc::clone(core);
            thread::spawn(move || worker_loop(&core, &pairing, &token));
        }
        let watchdog_core = Arc::clone(core);
        let run_token = state.run_token.clone();
        thread::spawn(move || watchdog(&watchdog_core, &run_token));
        Ok(())
    }

    /// Checks whether every game has ended and, exactly once per run, stops
    /// the workers and fires the all-over handler.
    ///
    /// The handler runs outside the state lock so it may freely lock games
    /// and agents; its directive decides whether the master restarts.
    fn check_all_games_over(core: &Arc<Self>) -> bool {
        let handler = {
            let mut state = core.lock_state();
            let all_over = state
                .pairings
                .iter()
                .all(|pairing| lock(&pairing.game).is_game_over());
            if !all_over {
                return false;
            }
            if !state.running {
                return true;
            }
            info!("all games are over");
            state.running = false;
            state.run_token.cancel();
            for token in state.worker_tokens.drain(..) {
                token.cancel();
            }
            state.handler.take()
        };
        let Some(mut handler) = handler else {
            return true;
        };
        let mut pairings = std::mem::take(&mut core.lock_state().pairings);
        let directive = handler(&mut pairings);
        {
            let mut state = core.lock_state();
            // An add_agent call may have registered pairings while the
            // handler ran; keep them behind the handler's population.
            let added = std::mem::replace(&mut state.pairings, pairings);
            state.pairings.extend(added);
            state.handler = Some(handler);
        }
        if directive == MasterDirective::Restart {
            thread::sleep(core.config.generation_pause);
            if let Err(err) = Self::start(core) {
                warn!("restart after generation skipped: {err}");
            }
        }
        true
    }

    /// Ends every still-running game at the deadline.
    fn force_all_games_over(&self) {
        let pairings = self.lock_state().pairings.clone();
        for pairing in pairings {
            lock(&pairing.game).end_game(EndReason::ForcedByTimeout);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// What one scheduler iteration did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TurnOutcome {
    /// The worker token was cancelled; the game may already belong to the
    /// next run and must not be touched.
    Cancelled,
    /// The game has ended.
    Finished,
    /// An action was applied and gravity ticked.
    Played,
}

fn worker_loop<A: Agent + 'static>(
    core: &Arc<MasterCore<A>>,
    pairing: &GamePairing<A>,
    token: &CancellationToken,
) {
    loop {
        match run_turn(pairing, token) {
            TurnOutcome::Cancelled => break,
            TurnOutcome::Finished => {
                debug!("agent {} finished its game", lock(&pairing.agent).name());
                MasterCore::check_all_games_over(core);
                break;
            }
            TurnOutcome::Played => {}
        }
        if token.wait_timeout(core.config.tick_interval) {
            break;
        }
    }
}

/// One scheduler iteration: ask the agent, apply the action, tick gravity.
///
/// The token is re-checked under the game lock. Cancellation is flagged
/// before the all-over handler may recycle this game for a new run, so a
/// worker that raced the teardown never plays a turn on a board that is no
/// longer its own.
fn run_turn<A: Agent>(pairing: &GamePairing<A>, token: &CancellationToken) -> TurnOutcome {
    let mut game = lock(&pairing.game);
    if token.is_cancelled() {
        return TurnOutcome::Cancelled;
    }
    if game.is_game_over() {
        return TurnOutcome::Finished;
    }
    let action = lock(&pairing.agent).next_action(&game);
    let result = game.perform_action(action).and_then(|()| game.tick());
    if let Err(err) = result {
        error!(
            "agent {} failed its turn: {err}",
            lock(&pairing.agent).name()
        );
        game.end_game(EndReason::Error);
    }
    TurnOutcome::Played
}

fn watchdog<A: Agent + 'static>(core: &Arc<MasterCore<A>>, run_token: &CancellationToken) {
    if run_token.wait_timeout(core.config.game_timeout) {
        // The run ended on its own.
        return;
    }
    info!("game timeout reached; forcing remaining games over");
    core.force_all_games_over();
    MasterCore::check_all_games_over(core);
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use gentris_ai::{AgentIdGenerator, GeneticAgent, HeuristicWeights, RandomAgent};
    use gentris_engine::{PieceGenerator, PieceSeed, ShapeKind};

    use super::*;

    fn fast_config(game_timeout: Duration) -> MasterConfig {
        MasterConfig {
            tick_interval: Duration::ZERO,
            game_timeout,
            generation_pause: Duration::from_millis(1),
            mutation_rate: 0.1,
        }
    }

    /// Weights that pile pieces up as fast as possible, for quick games.
    fn greedy_tower_weights() -> HeuristicWeights {
        HeuristicWeights {
            height: 1.0,
            holes: 1.0,
            bumpiness: 1.0,
            line_clear: -1.0,
        }
    }

    #[test]
    fn test_add_agent_rejected_while_running() {
        let ids = AgentIdGenerator::new();
        // A slow tick keeps the game running while the test pokes the master.
        let master = AgentsMaster::new(MasterConfig {
            tick_interval: Duration::from_millis(10),
            ..fast_config(Duration::from_secs(60))
        });
        master
            .add_agent(Game::new(0), RandomAgent::with_seed(ids.next_id(), 1))
            .unwrap();
        master.start().unwrap();
        let result = master.add_agent(Game::new(1), RandomAgent::with_seed(ids.next_id(), 2));
        assert!(matches!(result, Err(MasterError::AlreadyRunning)));
        master.stop().unwrap();
    }

    #[test]
    fn test_turn_is_skipped_once_the_token_is_cancelled() {
        let ids = AgentIdGenerator::new();
        let mut game = Game::with_pieces(0, PieceGenerator::fixed(ShapeKind::O));
        game.start(Duration::ZERO);
        let pairing = GamePairing {
            game: Arc::new(Mutex::new(game)),
            agent: Arc::new(Mutex::new(RandomAgent::with_seed(ids.next_id(), 5))),
        };
        // A teardown can recycle this game for the next run while its worker
        // sleeps; the running look of the board must not tempt the stale
        // worker into playing one more turn.
        let cancelled = CancellationToken::cancelled();
        assert_eq!(run_turn(&pairing, &cancelled), TurnOutcome::Cancelled);
        {
            let game = lock(&pairing.game);
            assert_eq!(game.score(), 0.0);
            assert_eq!(game.board().falling_piece().unwrap().row(), 0);
        }
        let live = CancellationToken::new();
        assert_eq!(run_turn(&pairing, &live), TurnOutcome::Played);
    }

    #[test]
    fn test_agents_added_during_the_handler_are_kept() {
        let ids = AgentIdGenerator::new();
        let master = AgentsMaster::new(fast_config(Duration::from_millis(50)));
        master
            .add_agent(Game::new(0), RandomAgent::with_seed(ids.next_id(), 1))
            .unwrap();
        let registrar = master.clone();
        let late_id = ids.next_id();
        master.set_all_over_handler(move |_pairings| {
            // The run is already stopped here, so a late registration is
            // legal and must survive the handler.
            registrar
                .add_agent(Game::new(1), RandomAgent::with_seed(late_id, 2))
                .unwrap();
            MasterDirective::Idle
        });
        master.start().unwrap();
        assert!(master.wait_until_idle(Duration::from_secs(10)));
        let deadline = Instant::now() + Duration::from_secs(10);
        while master.population().len() < 2 {
            assert!(Instant::now() < deadline, "late registration was dropped");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_stop_without_start_fails() {
        let master: AgentsMaster<RandomAgent> = AgentsMaster::new(fast_config(Duration::from_secs(1)));
        assert!(matches!(master.stop(), Err(MasterError::NotRunning)));
    }

    #[test]
    fn test_timeout_forces_all_games_over() {
        let ids = AgentIdGenerator::new();
        let master = AgentsMaster::new(MasterConfig {
            tick_interval: Duration::from_millis(5),
            ..fast_config(Duration::from_millis(50))
        });
        for index in 0..3 {
            master
                .add_agent(
                    Game::new(index),
                    RandomAgent::with_seed(ids.next_id(), index as u64),
                )
                .unwrap();
        }
        master.start().unwrap();
        assert!(master.wait_until_idle(Duration::from_secs(10)));
        for game in master.games() {
            let game = lock(&game);
            assert!(game.is_game_over());
            assert_eq!(game.end_reason(), Some(EndReason::ForcedByTimeout));
        }
        assert!(!master.is_running());
    }

    /// Replays a worker's iteration loop on the current thread.
    fn replay_sequentially(seed: PieceSeed, weights: HeuristicWeights) -> f64 {
        let ids = AgentIdGenerator::new();
        let mut game = Game::with_pieces(0, PieceGenerator::with_seed(seed));
        game.start(Duration::ZERO);
        let mut agent = GeneticAgent::with_weights(ids.next_id(), weights);
        for _ in 0..1_000_000 {
            if game.is_game_over() {
                break;
            }
            let action = agent.next_action(&game);
            game.perform_action(action).unwrap();
            game.tick().unwrap();
        }
        assert!(game.is_game_over());
        game.score()
    }

    #[test]
    fn test_concurrent_run_matches_sequential_replay() {
        let ids = AgentIdGenerator::new();
        let weights = greedy_tower_weights();
        let seeds = [PieceSeed::from_u64(11), PieceSeed::from_u64(22)];
        let master = AgentsMaster::new(fast_config(Duration::from_secs(60)));
        for (index, seed) in seeds.iter().enumerate() {
            master
                .add_agent(
                    Game::with_pieces(index, PieceGenerator::with_seed(*seed)),
                    GeneticAgent::with_weights(ids.next_id(), weights),
                )
                .unwrap();
        }
        master.start().unwrap();
        assert!(master.wait_until_idle(Duration::from_secs(60)));
        let games = master.games();
        for (game, seed) in games.iter().zip(seeds) {
            let game = lock(game);
            assert_eq!(game.end_reason(), Some(EndReason::NormalEnd));
            let expected = replay_sequentially(seed, weights);
            assert!(
                (game.score() - expected).abs() < f64::EPSILON,
                "concurrent score {} differs from sequential score {expected}",
                game.score()
            );
        }
    }
}
