//! courier - scheduled HTTP request dispatcher

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio::sync::watch;

use courier_core::app::{Admin, Config, Dispatcher, DispatcherBuilder, config};
use courier_core::domain::{RequestId, RequestSpec, parse_header_list, timestamp};
use courier_core::impls::{HttpExecutor, SqliteRequestStore};
use courier_core::ports::{SystemClock, UlidGenerator};

#[derive(Parser)]
#[command(name = "courier", version, about = "Dispatch scheduled HTTP requests")]
struct Cli {
    /// Table holding the scheduled requests (overrides TABLE_NAME)
    #[arg(long, global = true)]
    table: Option<String>,

    /// SQLite database path (overrides COURIER_DATABASE)
    #[arg(long, global = true)]
    database: Option<String>,

    /// Base URL for relative request URLs (overrides BASE_URL)
    #[arg(long, global = true)]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Dispatch every due request once, or repeatedly with --every
    Run {
        /// Seconds between passes; runs until Ctrl-C
        #[arg(long)]
        every: Option<u64>,
    },
    /// Schedule a new request
    Create {
        url: String,

        #[arg(long, default_value = "GET")]
        method: String,

        /// Explicit id (default: req-<ULID>)
        #[arg(long)]
        id: Option<String>,

        #[arg(long, default_value = "")]
        payload: String,

        /// `Key:Value`, repeatable or comma separated
        #[arg(long = "header")]
        headers: Vec<String>,

        /// Seconds until the request becomes due
        #[arg(long, default_value_t = 3600, conflicts_with = "at")]
        freeze_secs: u64,

        /// Absolute due time, YYYY-MM-DDTHH:MM:SSZ
        #[arg(long)]
        at: Option<String>,

        /// Keep the record and its result after success
        #[arg(long)]
        persistent: bool,
    },
    /// Show one request
    Get { id: String },
    /// List requests that are due now
    List,
    /// Set locking = true
    Lock { id: String },
    /// Set locking = false so the next pass picks the request up again
    Unlock { id: String },
}

fn setup_logging() {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn load_config(cli: &Cli) -> Result<Config> {
    let overrides = [
        (config::TABLE_NAME, cli.table.clone()),
        (config::DATABASE, cli.database.clone()),
        (config::BASE_URL, cli.base_url.clone()),
    ];
    let config = Config::from_lookup(|key| {
        overrides
            .iter()
            .find(|(name, _)| *name == key)
            .and_then(|(_, value)| value.clone())
            .or_else(|| std::env::var(key).ok())
    })
    .context("load configuration")?;
    Ok(config)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Flip the returned channel to `true` on Ctrl-C.
fn cancel_on_ctrl_c() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("interrupt received, cancelling");
                let _ = tx.send(true);
            }
            Err(err) => {
                tracing::warn!(error = %err, "cannot listen for Ctrl-C");
                // keep the sender alive so passes are never cancelled
                std::future::pending::<()>().await;
            }
        }
    });
    rx
}

async fn run_once(dispatcher: &Dispatcher, cancel: watch::Receiver<bool>) -> Result<()> {
    match dispatcher.run_now(cancel).await {
        Ok(summary) => print_json(&summary),
        Err(err) => {
            tracing::error!(error = %err, "dispatch pass failed");
            Err(err).context("dispatch pass failed")
        }
    }
}

async fn run_every(dispatcher: &Dispatcher, every: Duration, mut cancel: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = cancel.wait_for(|cancelled| *cancelled) => break,
        }
        if *cancel.borrow() {
            break;
        }
        match dispatcher.run_now(cancel.clone()).await {
            Ok(summary) => tracing::debug!(?summary, "pass ok"),
            // failed records stay locked; the next pass continues with the rest
            Err(err) => tracing::error!(error = %err, "dispatch pass failed"),
        }
    }
    tracing::info!("stopped");
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging();

    let config = load_config(&cli)?;
    let store = Arc::new(
        SqliteRequestStore::open(&config.database, &config.table_name)
            .with_context(|| format!("open database {}", config.database.display()))?,
    );
    let admin = Admin::new(
        store.clone(),
        Arc::new(SystemClock),
        Arc::new(UlidGenerator::new(SystemClock)),
    );

    match cli.command {
        Commands::Run { every } => {
            let executor = HttpExecutor::new(config.executor_config()).context("build http client")?;
            let dispatcher = DispatcherBuilder::new()
                .store(store)
                .executor(Arc::new(executor))
                .max_concurrency(config.max_concurrency)
                .build()?;
            let cancel = cancel_on_ctrl_c();
            match every {
                Some(secs) => {
                    anyhow::ensure!(secs > 0, "--every must be at least 1 second");
                    run_every(&dispatcher, Duration::from_secs(secs), cancel).await;
                }
                None => run_once(&dispatcher, cancel).await?,
            }
        }
        Commands::Create {
            url,
            method,
            id,
            payload,
            headers,
            freeze_secs,
            at,
            persistent,
        } => {
            let mut spec = RequestSpec::new(method, url)
                .with_payload(payload)
                .persistent(persistent)
                .after(Duration::from_secs(freeze_secs));
            for raw in &headers {
                spec = spec.with_headers(parse_header_list(raw)?);
            }
            if let Some(id) = id {
                spec = spec.with_id(id);
            }
            if let Some(at) = at {
                let at = timestamp::parse(&at).with_context(|| format!("parse --at {at:?}"))?;
                spec = spec.at(at);
            }
            print_json(&admin.create(spec).await?)?;
        }
        Commands::Get { id } => print_json(&admin.get(&RequestId::new(id)).await?)?,
        Commands::List => print_json(&admin.list_due().await?)?,
        Commands::Lock { id } => {
            admin.lock(&RequestId::new(id)).await?;
        }
        Commands::Unlock { id } => {
            admin.unlock(&RequestId::new(id)).await?;
        }
    }
    Ok(())
}
