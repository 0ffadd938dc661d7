use clap::Parser;
use quantlab::cli::{run, Cli};

fn main() -> std::process::ExitCode {
    run(Cli::parse())
}
