mod cache;
mod config;
mod error;
mod http;
mod lifecycle;
mod net;
mod store;
mod sync;
mod worker;

use clap::Parser;
use color_eyre::eyre::Context;
use color_eyre::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use crate::net::HttpFetcher;
use crate::store::Store;
use crate::sync::DrainOutcome;
use crate::worker::Worker;

#[derive(Parser, Debug)]
#[command(name = "outbox")]
#[command(about = "Offline-first request cache and background sync engine")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/outbox/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Database path (default: $XDG_DATA_HOME/outbox/outbox.db)
  #[arg(long)]
  db: Option<PathBuf>,

  /// Queue a message for background delivery
  #[arg(short, long)]
  queue: Option<String>,

  /// Run a drain pass as if connectivity just returned
  #[arg(long)]
  drain: bool,
}

fn init_tracing() -> Result<tracing_appender::non_blocking::WorkerGuard> {
  let log_dir = dirs::state_dir()
    .or_else(dirs::data_dir)
    .unwrap_or_else(|| PathBuf::from("."))
    .join("outbox");
  std::fs::create_dir_all(&log_dir).wrap_err("failed to create log directory")?;

  let file = tracing_appender::rolling::never(log_dir, "outbox.log");
  let (writer, guard) = tracing_appender::non_blocking(file);

  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with_writer(writer)
    .with_ansi(false)
    .init();

  Ok(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;
  let args = Args::parse();
  let _log_guard = init_tracing()?;

  let config = config::Config::load(args.config.as_deref())?;

  let db_path = match args.db {
    Some(path) => path,
    None => Store::default_path()?,
  };
  let store = Arc::new(Store::open(&db_path)?);
  let fetcher = Arc::new(HttpFetcher::new()?);

  let (mut worker, mut notifications) = Worker::new(config, store, fetcher)?;
  worker
    .start()
    .await
    .wrap_err("worker install/activate failed (is the origin reachable?)")?;

  if let Some(text) = args.queue {
    let receipt = worker.queue().enqueue(&text).await?;
    if receipt.sync_registered {
      println!("queued message #{} for background sync", receipt.id);
    } else {
      println!(
        "queued message #{} (background sync unavailable, run with --drain)",
        receipt.id
      );
    }
  }

  if args.drain {
    match worker.on_connectivity().await? {
      DrainOutcome::Drained { delivered } => println!("drained: {delivered} delivered"),
      DrainOutcome::Deferred { delivered, remaining } => {
        println!("deferred: {delivered} delivered, {remaining} still queued")
      }
      DrainOutcome::BackedOff => println!("backing off, try again later"),
    }

    while let Ok(note) = notifications.try_recv() {
      println!("{}: {}", note.title, note.body);
    }
  }

  let pending = worker.queue().list_pending().await?;
  if pending.is_empty() {
    println!("sync queue is empty");
  } else {
    println!("{} message(s) pending:", pending.len());
    for item in pending {
      let queued_at = item
        .timestamp
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| "unknown".to_string());
      println!("  #{} {:?} (queued {queued_at})", item.id.unwrap_or(0), item.text);
    }
  }

  Ok(())
}
