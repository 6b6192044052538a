//! Trazar CLI — resolution and planning for AI-driven provisioning.

use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "trazar",
    version,
    about = "Resolution engine for AI-generated infrastructure plans — recover, classify, resolve"
)]
struct Cli {
    #[command(subcommand)]
    command: trazar::cli::Commands,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_target(false)
        .init();

    let cli = Cli::parse();
    if let Err(e) = trazar::cli::dispatch(cli.command) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
