use std::thread;

use gentris_engine::EndReason;
use log::error;

use crate::{cancel::CancellationToken, master::SharedGame};

/// Gravity driver for a single game, for fronts where no agent plays.
///
/// Waits out the game's initial delay, then ticks it at its fall interval
/// until the game ends or the driver is stopped. Inputs can be applied from
/// any other thread through the shared game handle.
pub struct TickDriver {
    token: CancellationToken,
}

impl TickDriver {
    #[must_use]
    pub fn spawn(game: SharedGame) -> Self {
        let token = CancellationToken::new();
        let worker_token = token.clone();
        thread::spawn(move || drive(&game, &worker_token));
        Self { token }
    }

    /// Stops the driver; the game itself is left untouched.
    pub fn stop(&self) {
        self.token.cancel();
    }
}

impl Drop for TickDriver {
    fn drop(&mut self) {
        self.stop();
    }
}

fn drive(game: &SharedGame, token: &CancellationToken) {
    let initial_delay = lock(game).initial_delay();
    if token.wait_timeout(initial_delay) {
        return;
    }
    loop {
        let interval = {
            let mut game = lock(game);
            if game.is_game_over() {
                break;
            }
            if let Err(err) = game.tick() {
                error!("[{}] gravity tick failed: {err}", game.label());
                game.end_game(EndReason::Error);
                break;
            }
            game.fall_interval()
        };
        if token.wait_timeout(interval) {
            break;
        }
    }
}

fn lock(game: &SharedGame) -> std::sync::MutexGuard<'_, gentris_engine::Game> {
    game.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{Arc, Mutex},
        time::Duration,
    };

    use gentris_engine::{Game, PieceGenerator, ShapeKind};

    use super::*;

    #[test]
    fn test_stop_during_initial_delay_leaves_game_untouched() {
        let game = Arc::new(Mutex::new(Game::with_pieces(
            0,
            PieceGenerator::fixed(ShapeKind::O),
        )));
        lock(&game).start(Duration::from_secs(60));
        let driver = TickDriver::spawn(Arc::clone(&game));
        driver.stop();
        thread::sleep(Duration::from_millis(20));
        // No gravity has been applied yet.
        assert_eq!(lock(&game).board().falling_piece().unwrap().row(), 0);
        assert!(!lock(&game).is_game_over());
    }

    #[test]
    fn test_driver_exits_when_the_game_ends() {
        let game = Arc::new(Mutex::new(Game::with_pieces(
            0,
            PieceGenerator::fixed(ShapeKind::O),
        )));
        lock(&game).start(Duration::ZERO);
        lock(&game).end_game(gentris_engine::EndReason::ForcedByTimeout);
        let _driver = TickDriver::spawn(Arc::clone(&game));
        thread::sleep(Duration::from_millis(20));
        assert!(lock(&game).is_game_over());
    }
}
