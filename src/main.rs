//! sopflow CLI: validate and run tool-calling plans.

use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "sopflow",
    version,
    about = "Dependency-driven execution of tool-calling plans"
)]
struct Cli {
    /// Debug-level tracing on stderr (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: sopflow::cli::Commands,
}

fn main() {
    let cli = Cli::parse();
    sopflow::logging::init(cli.verbose);
    if let Err(e) = sopflow::cli::dispatch(cli.command) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
