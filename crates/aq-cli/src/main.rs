use anyhow::Result;
use aq_cli::commands::{self, Command};
use aq_cli::session::{Session, StoreArgs};
use clap::{ArgAction, Parser};
use tracing_subscriber::EnvFilter;

/// Aqua revision chain tool.
#[derive(Parser, Debug)]
#[command(name = "aq", version)]
struct Cli {
    #[command(flatten)]
    store: StoreArgs,

    /// More log output (-v info, -vv debug); RUST_LOG takes precedence
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let mut session = Session::open(&cli.store)?;
    commands::run(cli.command, &mut session)
}
