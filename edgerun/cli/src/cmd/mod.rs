pub mod config;
pub mod generate;

use clap::Subcommand;

#[derive(Subcommand)]
pub enum Command {
    /// Run every prompt through a generation session and record outputs and timing.
    Generate(generate::GenerateArgs),

    /// Print the effective runner configuration as JSON.
    Config(config::ConfigArgs),
}

pub fn run(command: Command) -> anyhow::Result<()> {
    match command {
        Command::Generate(args) => generate::run(args),
        Command::Config(args) => config::run(args),
    }
}
