use std::io::{self, Write};

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use tally_cli::commands::{App, adjust, run, status, track};
use tally_cli::{Cli, Commands, Config};

/// Load config and open the record store.
fn open_app(cli: &Cli) -> Result<App> {
    let config = Config::load_from(cli.config.as_deref()).context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");
    App::open(config, cli.actor.clone())
}

async fn dispatch<W: Write>(cli: &Cli, command: &Commands, out: &mut W) -> Result<()> {
    let app = open_app(cli)?;
    match command {
        Commands::Start(user) => track::start(&app, user, out),
        Commands::Stop(user) => track::stop(&app, user, out),
        Commands::Pause(user) => track::pause(&app, user, out).await,
        Commands::Resume(user) => track::resume(&app, user, out).await,
        Commands::Cancel(user) => track::cancel(&app, user, out).await,
        Commands::Add(args) => adjust::add(&app, args, out).await,
        Commands::Subtract(args) => adjust::subtract(&app, args, out),
        Commands::Reset(user) => adjust::reset(&app, user, out),
        Commands::ResetAll => adjust::reset_all(&app, out),
        Commands::Clear { yes } => adjust::clear(&app, *yes, out),
        Commands::Show(user) => status::show(&app, user, out),
        Commands::Status { json } => status::list(&app, *json, out),
        Commands::Run => run::run(app).await,
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing with verbose flag support
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    // Use try_init to avoid panic if tracing is already initialized (e.g., in tests)
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    let Some(command) = &cli.command else {
        // No subcommand, show help
        use clap::CommandFactory;
        Cli::command().print_help()?;
        println!();
        return Ok(());
    };

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    let mut stdout = io::stdout().lock();
    runtime.block_on(dispatch(&cli, command, &mut stdout))
}
