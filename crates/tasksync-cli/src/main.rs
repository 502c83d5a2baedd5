mod cli;
mod config;
mod reminders;
mod session;
mod storage;
mod sync;
mod tasks;

use clap::Parser;
use color_eyre::Result;
use tasksync_core::{connectivity::ConnectivityProbe, storage::BlobStore};
use tasksync_remote::HttpProbe;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::{
    cli::{Command, ConfigCommand},
    session::Session,
};

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    init_tracing();

    let cli = cli::Cli::parse();
    let config = config::load()?;
    match cli.command {
        Command::Version => print_version(),
        Command::Health => run_health_check(&config).await?,
        Command::Config(ConfigCommand::Init) => init_config(&config)?,
        command => {
            let session = Session::open(&config, cli.offline).await?;
            run_store_command(command, session, &config).await?
        }
    }

    Ok(())
}

async fn run_store_command(command: Command, session: Session, config: &config::Config) -> Result<()> {
    let store = &session.store;
    match command {
        Command::List { refresh, pages } => tasks::list(store, refresh, pages).await,
        Command::Search { query } => tasks::search(store, &query).await,
        Command::Add(fields) => tasks::add(store, fields).await,
        Command::Edit { id, fields } => tasks::edit(store, id, fields).await,
        Command::Toggle { id } => tasks::toggle(store, id).await,
        Command::Delete { id } => tasks::delete(store, id).await,
        Command::Sync => sync::run(store).await,
        Command::Queue => {
            sync::print_queue(store);
            Ok(())
        }
        Command::Watch => sync::watch(session, config).await,
        Command::Version | Command::Health | Command::Config(_) => Ok(()),
    }
}

fn init_tracing() {
    // RUST_LOG wins. Logs go to stderr so command output stays pipeable.
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

fn print_version() {
    println!("tasksync {}", env!("CARGO_PKG_VERSION"));
}

/// Round-trips a probe blob through the configured store and pings the server.
async fn run_health_check(config: &config::Config) -> Result<()> {
    let store = storage::store_from_config(config)?;
    run_store_health(store.as_ref()).await?;
    println!("Storage: ok");

    let timeout = std::time::Duration::from_secs(config.server.timeout_secs.max(1));
    let probe = HttpProbe::new(&config.server.base_url, timeout)?;
    if probe.is_reachable().await {
        println!("Server: reachable ({})", config.server.base_url);
    } else {
        println!("Server: unreachable ({})", config.server.base_url);
    }
    Ok(())
}

async fn run_store_health(store: &dyn BlobStore) -> Result<()> {
    let probe_key = "health/probe";
    let payload = b"ok";
    store.put(probe_key, payload).await?;
    let round_trip = store.get(probe_key).await?;
    store.delete(probe_key).await?;

    if round_trip != payload {
        color_eyre::eyre::bail!("storage round-trip failed");
    }
    Ok(())
}

fn init_config(config: &config::Config) -> Result<()> {
    let path = config::write_default_if_missing(config)?;
    println!("Config initialized at {}", path.display());
    Ok(())
}
