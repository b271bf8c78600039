use clap::Parser;
use depot::cli::{Cli, run};

fn main() -> std::process::ExitCode {
    run(Cli::parse())
}
