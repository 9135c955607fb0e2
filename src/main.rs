use clap::Parser;
use rgsearch::cli::Cli;
use rgsearch::commands;
use rgsearch::config::Config;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Exit status used when the search was interrupted, as shells do for SIGINT.
const INTERRUPTED: i32 = 130;

fn init_tracing(verbose: bool) {
    let default = if verbose { "rgsearch=debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let Some(command) = cli.command else {
        Cli::parse_from(["rgsearch", "--help"]);
        return Ok(());
    };

    let config = Config::load()?;
    let summary = tokio::runtime::Runtime::new()?.block_on(commands::run(command, &config))?;

    if summary.cancelled {
        eprintln!("Interrupted after {} result(s)", summary.results);
        std::process::exit(INTERRUPTED);
    }
    if summary.results == 0 {
        eprintln!("No matches found");
    } else if summary.limit_hit {
        eprintln!("{} result(s), limit reached", summary.results);
    }

    Ok(())
}
