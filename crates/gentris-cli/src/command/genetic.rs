use std::{thread, time::Duration};

use anyhow::Context as _;
use gentris_master::{GeneticMaster, MasterConfig};
use rand::{Rng as _, SeedableRng as _};
use rand_pcg::Pcg32;

#[derive(Debug, Clone, clap::Args)]
pub(crate) struct GeneticArg {
    /// Population size (games per generation)
    #[arg(long, default_value_t = 8)]
    games: usize,
    /// Number of generations to evolve
    #[arg(long, default_value_t = 10)]
    generations: u64,
    /// Per-game deadline in seconds
    #[arg(long, default_value_t = 10)]
    timeout_secs: u64,
    /// Probability of mutating each bred gene
    #[arg(long, default_value_t = 0.1)]
    mutation_rate: f64,
    /// Seed for the population and evolution draws; random when omitted
    #[arg(long)]
    seed: Option<u64>,
}

pub(crate) fn run(arg: &GeneticArg) -> anyhow::Result<()> {
    validate(arg)?;
    let seed = arg.seed.unwrap_or_else(|| rand::rng().random());
    eprintln!("Evolution seed: {seed}");

    let master = GeneticMaster::new(
        MasterConfig {
            game_timeout: Duration::from_secs(arg.timeout_secs),
            mutation_rate: arg.mutation_rate,
            ..MasterConfig::default()
        },
        seed,
    );
    let mut rng = Pcg32::seed_from_u64(seed);
    master.populate(arg.games, &mut rng)?;
    master.start()?;

    let mut reported = 0;
    loop {
        thread::sleep(Duration::from_millis(200));
        let progress = master.progress();
        if progress.generation > reported {
            reported = progress.generation;
            if let (Some(leader), Some(best)) = (progress.leader, progress.best_score) {
                eprintln!(
                    "Generation #{} playing (last leader {leader}, best score {best:.0})",
                    progress.generation,
                );
            } else {
                eprintln!("Generation #{} playing", progress.generation);
            }
        }
        if progress.generation > arg.generations {
            break;
        }
    }
    let _ = master.stop();

    let best = master.best_candidate().context("the population is empty")?;
    eprintln!("Evolution finished after {} generations.", arg.generations);
    println!("{}", serde_json::to_string_pretty(&best)?);
    Ok(())
}

fn validate(arg: &GeneticArg) -> anyhow::Result<()> {
    anyhow::ensure!(
        (0.0..=1.0).contains(&arg.mutation_rate),
        "--mutation-rate must be a probability in [0, 1], got {}",
        arg.mutation_rate
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arg_with_rate(mutation_rate: f64) -> GeneticArg {
        GeneticArg {
            games: 4,
            generations: 1,
            timeout_secs: 1,
            mutation_rate,
            seed: Some(1),
        }
    }

    #[test]
    fn test_mutation_rate_must_be_a_probability() {
        assert!(validate(&arg_with_rate(0.0)).is_ok());
        assert!(validate(&arg_with_rate(1.0)).is_ok());
        assert!(validate(&arg_with_rate(1.5)).is_err());
        assert!(validate(&arg_with_rate(-0.1)).is_err());
    }
}
