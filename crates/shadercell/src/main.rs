mod cli;
mod run;

use anyhow::Result;
use cli::Command;

fn main() -> Result<()> {
    let cli = cli::parse();
    run::initialise_tracing();

    match cli.command {
        Some(Command::Snapshot(args)) => run::snapshot(cli.run, args),
        None => run::run(cli.run),
    }
}
