//! Command-line front end for the ATPG core.

mod cmd;

use clap::Parser;

fn main() {
    let cli = cmd::Cli::parse();

    match cli.command {
        cmd::Commands::Show(a) => a.run(),
        cmd::Commands::Atpg(a) => a.run(),
    }
}
