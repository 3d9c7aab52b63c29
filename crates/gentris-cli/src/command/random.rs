use std::time::Duration;

use gentris_ai::{AgentIdGenerator, RandomAgent};
use gentris_engine::Game;
use gentris_master::{AgentsMaster, MasterConfig};

#[derive(Debug, Clone, clap::Args)]
pub(crate) struct RandomArg {
    /// Number of games to run concurrently
    #[arg(long, default_value_t = 4)]
    games: usize,
    /// Per-game deadline in seconds
    #[arg(long, default_value_t = 10)]
    timeout_secs: u64,
}

pub(crate) fn run(arg: &RandomArg) -> anyhow::Result<()> {
    let timeout = Duration::from_secs(arg.timeout_secs);
    let master = AgentsMaster::new(MasterConfig {
        game_timeout: timeout,
        ..MasterConfig::default()
    });
    let ids = AgentIdGenerator::new();
    for index in 0..arg.games {
        master.add_agent(Game::new(index), RandomAgent::new(ids.next_id()))?;
    }

    eprintln!("Running {} random games...", arg.games);
    master.start()?;
    master.wait_until_idle(timeout + Duration::from_secs(5));

    eprintln!("Results:");
    for game in master.games() {
        let game = game.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        eprintln!(
            "  {}: score {:.0}, level {}, {} lines ({:?})",
            game.label(),
            game.score(),
            game.level(),
            game.cleared_lines(),
            game.end_reason(),
        );
    }
    Ok(())
}
