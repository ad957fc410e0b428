use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

use feedsync::feed::HttpFetcher;
use feedsync::storage::SqliteStore;
use feedsync::sync::{SyncCancel, SyncReport};
use feedsync::{Config, FeedService, ItemFilter, NewSource};

/// Get the config directory path (~/.config/feedsync/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("feedsync"))
}

/// Database path: `--database` wins, then the config file, then the default.
/// Relative paths resolve against the config directory.
fn resolve_db_path(config_dir: &Path, flag: Option<PathBuf>, config: &Config) -> PathBuf {
    let path = flag
        .or_else(|| config.database.clone())
        .unwrap_or_else(|| PathBuf::from("feedsync.db"));
    if path.is_absolute() || path.as_os_str() == ":memory:" {
        path
    } else {
        config_dir.join(path)
    }
}

#[derive(Parser, Debug)]
#[command(name = "feedsync", about = "Keep a deduplicated item store in sync with RSS/Atom feeds")]
struct Args {
    /// Config file (default: ~/.config/feedsync/config.toml)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// SQLite database file, overriding the config file
    #[arg(long, value_name = "FILE", global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List registered sources
    Sources,
    /// Register a new source (starts unsubscribed)
    Add {
        name: String,
        url: String,
        /// Dialect hint
        #[arg(long, default_value = "rss")]
        kind: String,
        /// Subscribe right away
        #[arg(long)]
        subscribe: bool,
    },
    /// Delete a source
    Remove {
        id: String,
        /// Also delete the source's items
        #[arg(long)]
        cascade: bool,
    },
    Subscribe {
        id: String,
    },
    Unsubscribe {
        id: String,
    },
    /// Run one sync cycle over subscribed sources, or only the given ids
    Sync {
        ids: Vec<String>,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// List stored items
    Items {
        #[arg(long)]
        source: Option<String>,
        /// Only items of subscribed sources
        #[arg(long)]
        subscribed: bool,
        #[arg(long)]
        json: bool,
    },
    /// Sync on a timer until interrupted
    Watch {
        /// Minutes between cycles, overriding `refresh_interval_minutes`
        #[arg(long, value_name = "MINUTES")]
        every: Option<u64>,
    },
}

/// Run one cycle with progress on stderr. Ctrl-C stops new fetches and waits
/// for the ones in flight. Returns the report and whether it was interrupted.
async fn run_cycle(service: &FeedService, ids: Option<&[String]>) -> Result<(SyncReport, bool)> {
    let cancel = SyncCancel::new();
    let (progress_tx, mut progress_rx) = mpsc::channel::<(usize, usize)>(32);

    let printer = tokio::spawn(async move {
        while let Some((done, total)) = progress_rx.recv().await {
            eprint!("\rSyncing {}/{}", done, total);
        }
        eprintln!();
    });

    // The cycle borrows the sender; it must be gone before the sender is
    // dropped so the printer sees the channel close.
    let (report, interrupted) = {
        let cycle = service.trigger_sync_with(ids, &cancel, Some(&progress_tx));
        tokio::pin!(cycle);

        tokio::select! {
            report = &mut cycle => (report, false),
            _ = tokio::signal::ctrl_c() => {
                eprintln!("\nInterrupted, waiting for in-flight fetches...");
                cancel.cancel();
                (cycle.await, true)
            }
        }
    };

    drop(progress_tx);
    if let Err(e) = printer.await {
        tracing::debug!(error = %e, "Progress printer task ended abnormally");
    }

    let report = report.context("Failed to read source registry")?;
    Ok((report, interrupted))
}

fn print_report(report: &SyncReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    if report.sources.is_empty() {
        println!("No subscribed sources.");
        return Ok(());
    }
    print!("{}", report);
    let (inserted, updated) = report.totals();
    println!(
        "{} new, {} updated, {} failed",
        inserted,
        updated,
        report.failed()
    );
    Ok(())
}

async fn watch(service: &FeedService, interval: Duration) -> Result<()> {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    println!("Syncing every {} minute(s). Ctrl-C to stop.", interval.as_secs() / 60);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => break,
        }

        let (report, interrupted) = run_cycle(service, None).await?;
        print_report(&report, false)?;
        if interrupted {
            break;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config_dir = get_config_dir()?;
    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir).context("Failed to create config directory")?;
    }

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| config_dir.join("config.toml"));
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    let db_path = resolve_db_path(&config_dir, args.database.clone(), &config);
    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;
    let store = SqliteStore::open(db_path_str)
        .await
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;

    let fetcher = HttpFetcher::new(&config).context("Failed to build HTTP client")?;
    let service = FeedService::new(Arc::new(store.clone()), Arc::new(fetcher), &config);

    let result = run(&service, &config, args.command).await;
    store.close().await;
    result
}

async fn run(service: &FeedService, config: &Config, command: Command) -> Result<()> {
    match command {
        Command::Sources => {
            let sources = service.list_sources().await?;
            if sources.is_empty() {
                println!("No sources. Add one with `feedsync add <name> <url>`.");
            }
            for source in sources {
                let mark = if source.is_subscribed { "*" } else { " " };
                println!("{} {}  {} [{}] {}", mark, source.id, source.name, source.kind, source.url);
            }
        }
        Command::Add {
            name,
            url,
            kind,
            subscribe,
        } => {
            let mut source = service
                .add_source(NewSource::new(name, url, kind))
                .await
                .context("Failed to add source")?;
            if subscribe {
                source = service.set_subscribed(&source.id, true).await?;
            }
            println!("Added {} ({})", source.name, source.id);
        }
        Command::Remove { id, cascade } => {
            if cascade {
                let removed = service.delete_source_cascade(&id).await?;
                println!("Removed {} and {} item(s)", id, removed);
            } else if service.delete_source(&id).await? {
                println!("Removed {}", id);
            } else {
                println!("No source with id {}", id);
            }
        }
        Command::Subscribe { id } => {
            let source = service.set_subscribed(&id, true).await?;
            println!("Subscribed to {}", source.name);
        }
        Command::Unsubscribe { id } => {
            let source = service.set_subscribed(&id, false).await?;
            println!("Unsubscribed from {}", source.name);
        }
        Command::Sync { ids, json } => {
            let selected = (!ids.is_empty()).then_some(ids.as_slice());
            let (report, _) = run_cycle(service, selected).await?;
            print_report(&report, json)?;
        }
        Command::Items {
            source,
            subscribed,
            json,
        } => {
            let filter = ItemFilter {
                source_id: source,
                subscribed_only: subscribed,
            };
            let items = service.list_items(&filter).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&items)?);
            } else {
                for item in items {
                    let date = if item.pub_date.is_empty() { "-" } else { item.pub_date.as_str() };
                    println!("{}  {}\n    {}", date, item.title, item.link);
                }
            }
        }
        Command::Watch { every } => {
            let interval = every
                .filter(|m| *m > 0)
                .map(|m| Duration::from_secs(m.saturating_mul(60)))
                .or_else(|| config.refresh_interval())
                .context("No interval: pass --every or set refresh_interval_minutes")?;
            watch(service, interval).await?;
        }
    }
    Ok(())
}
