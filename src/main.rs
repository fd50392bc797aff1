//! stacksynth CLI: declarative stacks compiled to deterministic plans.

use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "stacksynth",
    version,
    about = "Declarative infrastructure stacks compiled to deterministic, provider-agnostic plans"
)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: stacksynth::cli::Commands,
}

fn main() {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    if let Err(e) = stacksynth::cli::dispatch(cli.command) {
        eprintln!("error[{}]: {}", e.kind(), e);
        std::process::exit(1);
    }
}
