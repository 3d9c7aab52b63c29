use std::{fmt, time::Duration};

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::{
    BoardError, GameError,
    core::{Board, Shape, ShapeKind},
};

use super::PieceGenerator;

/// Points for clearing 1 to 4 rows at once, before the level multiplier.
const LINE_CLEAR_SCORES: [f64; 4] = [40.0, 100.0, 300.0, 1200.0];
/// Cleared rows needed to advance one level.
const LINES_PER_LEVEL: usize = 10;
/// Points per row descended through a player move or drop.
const SCORE_PER_ROW_DESCENDED: f64 = 1.0;
/// Gravity interval between automatic descents at level 0.
const FALL_INTERVAL: Duration = Duration::from_millis(1000);
/// How much the gravity interval shrinks per level.
const FALL_SPEEDUP_PER_LEVEL: Duration = Duration::from_millis(50);
/// Gravity never gets faster than this.
const MIN_FALL_INTERVAL: Duration = Duration::from_millis(100);

/// A player or agent input applied between gravity ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum Action {
    MoveDown,
    MoveLeft,
    MoveRight,
    RotateLeft,
    RotateRight,
    Drop,
}

impl Action {
    pub const ALL: [Action; 6] = [
        Action::MoveDown,
        Action::MoveLeft,
        Action::MoveRight,
        Action::RotateLeft,
        Action::RotateRight,
        Action::Drop,
    ];
}

/// Why a game ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::IsVariant, Deserialize, Serialize)]
pub enum EndReason {
    /// The stack reached the spawn area.
    NormalEnd,
    /// An operation failed and the game was abandoned.
    Error,
    /// An external supervisor ended the game at its deadline.
    ForcedByTimeout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::IsVariant)]
pub enum GamePhase {
    Idle,
    Running,
    Ended(EndReason),
}

type GameOverCallback = Box<dyn FnMut() + Send>;
type PieceSpawnedCallback = Box<dyn FnMut(ShapeKind) + Send>;
type ScoreChangedCallback = Box<dyn FnMut(usize, f64) + Send>;

#[derive(Default)]
struct GameCallbacks {
    game_over: Option<GameOverCallback>,
    piece_spawned: Option<PieceSpawnedCallback>,
    score_changed: Option<ScoreChangedCallback>,
}

impl fmt::Debug for GameCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GameCallbacks").finish_non_exhaustive()
    }
}

/// One falling-block game: the grid, the piece feed, scoring, and lifecycle.
///
/// A game is deliberately passive. It advances only through [`tick`](Game::tick)
/// and [`perform_action`](Game::perform_action), so a driver decides the pace:
/// a timer thread for interactive play, a tight loop for agent evaluation.
///
/// Each observer slot holds at most one subscriber; setting a new callback
/// replaces the previous one.
#[derive(Debug)]
pub struct Game {
    id: usize,
    label: String,
    board: Board,
    pieces: PieceGenerator,
    upcoming: Option<ShapeKind>,
    initial_delay: Duration,
    score: f64,
    level: usize,
    cleared_lines: usize,
    phase: GamePhase,
    callbacks: GameCallbacks,
}

impl Game {
    #[must_use]
    pub fn new(id: usize) -> Self {
        Self::with_pieces(id, PieceGenerator::new())
    }

    /// Creates a game fed by `pieces`, letting callers pin the piece sequence.
    #[must_use]
    pub fn with_pieces(id: usize, pieces: PieceGenerator) -> Self {
        Self {
            id,
            label: format!("game-{id}"),
            board: Board::new(),
            pieces,
            upcoming: None,
            initial_delay: Duration::ZERO,
            score: 0.0,
            level: 0,
            cleared_lines: 0,
            phase: GamePhase::Idle,
            callbacks: GameCallbacks::default(),
        }
    }

    #[must_use]
    pub fn id(&self) -> usize {
        self.id
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[must_use]
    pub fn board(&self) -> &Board {
        &self.board
    }

    #[must_use]
    pub fn score(&self) -> f64 {
        self.score
    }

    #[must_use]
    pub fn level(&self) -> usize {
        self.level
    }

    #[must_use]
    pub fn cleared_lines(&self) -> usize {
        self.cleared_lines
    }

    #[must_use]
    pub fn phase(&self) -> GamePhase {
        self.phase
    }

    #[must_use]
    pub fn end_reason(&self) -> Option<EndReason> {
        match self.phase {
            GamePhase::Ended(reason) => Some(reason),
            GamePhase::Idle | GamePhase::Running => None,
        }
    }

    /// Whether the game currently accepts no further play.
    #[must_use]
    pub fn is_game_over(&self) -> bool {
        !self.phase.is_running()
    }

    /// The kind shown in the preview slot, spawned on the next piece change.
    #[must_use]
    pub fn upcoming_kind(&self) -> Option<ShapeKind> {
        self.upcoming
    }

    /// Gravity delay a driver should wait before the first descent.
    #[must_use]
    pub fn initial_delay(&self) -> Duration {
        self.initial_delay
    }

    /// Gravity interval between descents at the current level.
    #[must_use]
    pub fn fall_interval(&self) -> Duration {
        let levels = u32::try_from(self.level).unwrap_or(u32::MAX);
        FALL_INTERVAL
            .saturating_sub(FALL_SPEEDUP_PER_LEVEL.saturating_mul(levels))
            .max(MIN_FALL_INTERVAL)
    }

    /// Starts (or restarts) play from an empty grid and spawns the first piece.
    pub fn start(&mut self, initial_delay: Duration) {
        info!("[{}] starting game", self.label);
        self.board = Board::new();
        self.upcoming = None;
        self.initial_delay = initial_delay;
        self.score = 0.0;
        self.level = 0;
        self.cleared_lines = 0;
        self.phase = GamePhase::Running;
        self.spawn_next_piece();
    }

    /// Returns the game to a fresh running state under a new label.
    ///
    /// Only valid once the game has ended; a supervisor must stop play before
    /// recycling the game for its next occupant.
    pub fn reset(&mut self, label: String) -> Result<(), GameError> {
        if self.phase.is_running() {
            return Err(GameError::ResetWhileRunning);
        }
        self.label = label;
        self.start(self.initial_delay);
        Ok(())
    }

    /// Advances gravity by one step.
    ///
    /// A resting piece is merged, completed rows are cleared and scored, and
    /// the next piece spawns; otherwise the piece descends one row. Does
    /// nothing unless the game is running.
    pub fn tick(&mut self) -> Result<(), BoardError> {
        if !self.phase.is_running() {
            return Ok(());
        }
        if self.board.is_colliding_bottom()? {
            let cleared = self.board.clear_completed_lines();
            if cleared > 0 {
                self.award_cleared_lines(cleared as usize);
            }
            self.spawn_next_piece();
        } else {
            self.board.move_down()?;
        }
        Ok(())
    }

    /// Applies one input to the falling piece.
    pub fn perform_action(&mut self, action: Action) -> Result<(), BoardError> {
        if !self.phase.is_running() {
            return Ok(());
        }
        debug!("[{}] performing action {action:?}", self.label);
        match action {
            Action::MoveDown => self.move_piece_down(),
            Action::MoveLeft => self.move_piece_left(),
            Action::MoveRight => self.move_piece_right(),
            Action::RotateLeft => self.rotate_piece_left(),
            Action::RotateRight => self.rotate_piece_right(),
            Action::Drop => self.instant_drop().map(|_| ()),
        }
    }

    /// Moves the piece down one row, scoring the descended row.
    pub fn move_piece_down(&mut self) -> Result<(), BoardError> {
        let moved = self.board.move_down()?;
        self.increase_score(if moved { SCORE_PER_ROW_DESCENDED } else { 0.0 });
        Ok(())
    }

    pub fn move_piece_left(&mut self) -> Result<(), BoardError> {
        self.board.move_left().map(|_| ())
    }

    pub fn move_piece_right(&mut self) -> Result<(), BoardError> {
        self.board.move_right().map(|_| ())
    }

    pub fn rotate_piece_left(&mut self) -> Result<(), BoardError> {
        self.board.rotate_left()
    }

    pub fn rotate_piece_right(&mut self) -> Result<(), BoardError> {
        self.board.rotate_right()
    }

    /// Drops the piece to its resting position, scoring every descended row.
    /// Returns the number of rows descended.
    pub fn instant_drop(&mut self) -> Result<u32, BoardError> {
        let rows = self.board.instant_drop()?;
        self.increase_score(f64::from(rows) * SCORE_PER_ROW_DESCENDED);
        Ok(rows)
    }

    /// Ends the game for `reason`. Idempotent: later calls with a different
    /// reason do not overwrite the first.
    pub fn end_game(&mut self, reason: EndReason) {
        if !self.phase.is_running() {
            return;
        }
        info!(
            "[{}] game over ({reason:?}): score {:.0}, level {}, {} lines",
            self.label, self.score, self.level, self.cleared_lines
        );
        self.phase = GamePhase::Ended(reason);
        if let Some(callback) = &mut self.callbacks.game_over {
            callback();
        }
    }

    /// Subscribes to the game-over event, replacing any previous subscriber.
    pub fn on_game_over(&mut self, callback: impl FnMut() + Send + 'static) {
        self.callbacks.game_over = Some(Box::new(callback));
    }

    /// Subscribes to piece spawns; the payload is the next preview kind.
    pub fn on_piece_spawned(&mut self, callback: impl FnMut(ShapeKind) + Send + 'static) {
        self.callbacks.piece_spawned = Some(Box::new(callback));
    }

    /// Subscribes to score changes; the payload is `(level, score)`.
    pub fn on_score_changed(&mut self, callback: impl FnMut(usize, f64) + Send + 'static) {
        self.callbacks.score_changed = Some(Box::new(callback));
    }

    fn spawn_next_piece(&mut self) {
        let kind = match self.upcoming.take() {
            Some(kind) => kind,
            None => self.pieces.next_kind(),
        };
        let preview = self.pieces.next_kind();
        self.upcoming = Some(preview);
        if self.board.spawn(Shape::new(kind)).is_err() {
            // The stack has reached the spawn area.
            self.end_game(EndReason::NormalEnd);
            return;
        }
        if let Some(callback) = &mut self.callbacks.piece_spawned {
            callback(preview);
        }
    }

    fn award_cleared_lines(&mut self, cleared: usize) {
        self.cleared_lines += cleared;
        self.level = self.cleared_lines / LINES_PER_LEVEL;
        let base = LINE_CLEAR_SCORES
            .get(cleared.saturating_sub(1))
            .copied()
            .unwrap_or(0.0);
        #[expect(clippy::cast_precision_loss)]
        self.increase_score(base * (self.level as f64 + 1.0));
    }

    fn increase_score(&mut self, delta: f64) {
        self.score += delta;
        if let Some(callback) = &mut self.callbacks.score_changed {
            callback(self.level, self.score);
        }
    }
}
