mod cache;
mod config;
mod logging;
mod net;
mod worker;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::info;

use cache::{CacheStorage, ResponseSource, SqliteStorage};
use net::{HttpNetwork, Network, Request};
use worker::{ActivationReport, ClientMessage, EventLoop, EventOutcome, ServiceWorker, WorkerEvent};

#[derive(Parser, Debug)]
#[command(name = "quiz-sw")]
#[command(about = "Offline fetch interceptor for the Quran quiz web app")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/quiz-sw/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Worker version to run as, e.g. v28
  #[arg(long, global = true)]
  version_tag: Option<String>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Precache the static assets, then activate
  Install,
  /// Delete caches left by other versions and claim clients
  Activate,
  /// Route requests through the worker and print the responses
  Fetch {
    #[arg(required = true)]
    urls: Vec<String>,

    #[arg(short = 'X', long, default_value = "GET")]
    method: String,

    /// Print response bodies
    #[arg(long)]
    body: bool,
  },
  /// Post a client message such as SKIP_WAITING or GET_CACHE_INFO
  Message { message_type: String },
  /// List caches and how many entries each holds
  Caches {
    /// Also list every cached request
    #[arg(long)]
    entries: bool,
  },
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let mut config = config::Config::load(args.config.as_deref())?;
  if let Some(version) = args.version_tag {
    config.worker.version = version;
  }

  let _log_guard = logging::init(&config.log)?;

  let db_path = config.database_path()?;
  info!(path = %db_path.display(), "Opening cache storage");
  let storage = SqliteStorage::open(&db_path)?;
  let network = HttpNetwork::new()?;

  let worker = Arc::new(ServiceWorker::new(config.worker, storage, network));
  let events = EventLoop::spawn(Arc::clone(&worker));

  match args.command {
    Command::Install => match events.send(WorkerEvent::Install).await? {
      EventOutcome::Installed { report, activation } => {
        if report.degraded {
          println!("installed {} (degraded: static assets not cached)", report.cache_name);
        } else {
          println!("installed {} ({} assets)", report.cache_name, report.precached);
        }
        match activation {
          Some(activation) => print_activation(&activation),
          None => println!("waiting to activate"),
        }
      }
      other => return Err(eyre!("Unexpected outcome for install: {:?}", other)),
    },
    Command::Activate => match events.send(WorkerEvent::Activate).await? {
      EventOutcome::Activated(Some(activation)) => print_activation(&activation),
      EventOutcome::Activated(None) => return Err(eyre!("Activation failed, see log")),
      other => return Err(eyre!("Unexpected outcome for activate: {:?}", other)),
    },
    Command::Fetch { urls, method, body } => {
      let fetches: Vec<_> = urls
        .iter()
        .map(|url| events.send(WorkerEvent::Fetch(Request::new(&method, url.as_str()))))
        .collect();
      let outcomes = futures::future::join_all(fetches).await;

      for (url, outcome) in urls.iter().zip(outcomes) {
        match outcome? {
          EventOutcome::Response(served) => {
            println!(
              "{} {} -> {} {} [{}]",
              method.to_uppercase(),
              url,
              served.response.status,
              served.response.status_text,
              served.source
            );
            if let ResponseSource::Cache { cached_at, .. } = &served.source {
              println!("    cached at {}", cached_at.to_rfc3339());
            }
            if body {
              println!("{}", served.response.text());
            }
          }
          other => return Err(eyre!("Unexpected outcome for fetch: {:?}", other)),
        }
      }
    }
    Command::Message { message_type } => {
      let raw = serde_json::json!({ "type": message_type }).to_string();
      let message = ClientMessage::from_json(&raw)?;
      let (reply, port) = oneshot::channel();

      match events.send(WorkerEvent::Message { message, reply: Some(reply) }).await? {
        EventOutcome::Message { activation } => {
          if let Some(activation) = activation {
            print_activation(&activation);
          }
        }
        other => return Err(eyre!("Unexpected outcome for message: {:?}", other)),
      }

      // Only messages that answer keep the port open
      if let Ok(info) = port.await {
        println!("{}", serde_json::to_string_pretty(&info)?);
      }
    }
    Command::Caches { entries } => print_caches(&*worker, entries)?,
  }

  // Let background cache writes finish before exiting
  worker.settle().await;

  Ok(())
}

fn print_activation(report: &ActivationReport) {
  if report.deleted.is_empty() {
    println!("activated, no stale caches");
  } else {
    println!("activated, deleted: {}", report.deleted.join(", "));
  }
  println!("claimed {} client(s)", report.claimed);
}

fn print_caches<S: CacheStorage, N: Network>(
  worker: &ServiceWorker<S, N>,
  entries: bool,
) -> Result<()> {
  let whitelist = worker.config().whitelist();
  println!("worker {} state: {}", worker.config().version_tag(), worker.state());

  for name in worker.caches().keys()? {
    let cache = worker.caches().open(&name)?;
    let keys = cache.keys()?;
    let marker = if whitelist.contains(&name) { "*" } else { " " };
    println!("{} {} ({} entries)", marker, cache.name(), keys.len());

    if entries {
      for key in keys {
        println!("    {} {}", key.method, key.url);
      }
    }
  }

  if worker.clients().len() > 0 {
    println!("{} open client(s)", worker.clients().len());
  }

  Ok(())
}
