mod cmd;

use anyhow::Result;
use clap::Parser;

/// Edgerun: on-device LLM generation runner.
#[derive(Parser)]
#[command(name = "edgerun", version, about)]
struct Cli {
    #[command(subcommand)]
    command: cmd::Command,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    cmd::run(cli.command)
}
