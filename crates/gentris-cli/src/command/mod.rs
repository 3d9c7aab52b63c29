use clap::{Parser, Subcommand};

mod genetic;
mod random;

#[derive(Debug, Clone, Parser)]
#[command(author, version, about, long_about = None)]
pub struct CommandArgs {
    /// What mode to run the program in
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Debug, Clone, Subcommand)]
enum Mode {
    /// Run a batch of games played by random agents
    Random(#[clap(flatten)] random::RandomArg),
    /// Evolve genetic agents over a number of generations
    Genetic(#[clap(flatten)] genetic::GeneticArg),
}

pub fn run() -> anyhow::Result<()> {
    let args = CommandArgs::parse();
    match args.mode {
        Mode::Random(arg) => random::run(&arg),
        Mode::Genetic(arg) => genetic::run(&arg),
    }
}
