use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use futures::stream::{self, StreamExt};
use serde_json::Value;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use threadlens::snapshot::{build_snapshot, ItemBody, ItemRole, PreviousView, Snapshot};
use threadlens::status_url::resolve_tweet_id;
use threadlens::store::normalize::{full_text, screen_name};
use threadlens::store::timeline::ingest_timeline;
use threadlens::{Config, TweetStore};

#[derive(Parser)]
#[command(name = "threadlens", version, about = "Inspect X/Twitter conversations from captured API responses")]
struct Cli {
    /// Config file to use instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build the conversation view for one tweet from captured responses
    Snapshot {
        /// Captured timeline or TweetDetail JSON; repeatable
        #[arg(long = "capture", required = true)]
        captures: Vec<PathBuf>,

        /// Tweet id or status URL
        target: String,

        /// Wrap width for tweet text
        #[arg(long, default_value_t = 80)]
        width: usize,
    },
    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Config => print!("{}", config.to_toml()?),
        Command::Snapshot {
            captures,
            target,
            width,
        } => {
            let Some(tweet_id) = resolve_tweet_id(&target) else {
                bail!("not a tweet id or status URL: {}", target);
            };
            let store = load_captures(&captures, &tweet_id).await?;
            store.resolve_tweet(&tweet_id);
            let snapshot = build_snapshot(&store, &tweet_id, PreviousView::default())
                .with_context(|| format!("tweet {} is not in the captured responses", tweet_id))?;
            print_snapshot(&snapshot, width);
        }
    }
    Ok(())
}

async fn load_captures(paths: &[PathBuf], tweet_id: &str) -> Result<TweetStore> {
    let contents: Vec<(PathBuf, std::io::Result<String>)> = stream::iter(paths.iter().cloned())
        .map(|path| async move {
            let content = tokio::fs::read_to_string(&path).await;
            (path, content)
        })
        .buffered(4)
        .collect()
        .await;

    let store = TweetStore::new();
    for (path, content) in contents {
        let content = content.with_context(|| format!("failed to read {}", path.display()))?;
        let response: Value = match serde_json::from_str(&content) {
            Ok(value) => value,
            Err(err) => {
                warn!("skipping {}: {}", path.display(), err);
                continue;
            }
        };
        let summary = ingest_timeline(&store, &response, Some(tweet_id));
        info!(
            "{}: {} tweets, {} tombstones",
            path.display(),
            summary.tweets,
            summary.tombstones
        );
    }
    Ok(store)
}

fn print_snapshot(snapshot: &Snapshot, width: usize) {
    println!(
        "{} ({} related, status {})",
        snapshot.tweet.id,
        snapshot.related.len(),
        snapshot.status.as_str()
    );
    println!();

    for item in &snapshot.timeline {
        let marker = match item.role {
            ItemRole::Ancestor => "^",
            ItemRole::Main => "*",
            ItemRole::Reply => ">",
        };
        let indent = if item.role == ItemRole::Reply && item.link_top {
            "  | "
        } else {
            "  "
        };
        let (header, text) = match &item.body {
            ItemBody::Tweet(record) => (
                format!(
                    "{} @{} [{}]",
                    marker,
                    screen_name(&record.result).unwrap_or_else(|| "unknown".to_string()),
                    record.id
                ),
                full_text(&record.result).unwrap_or_default().to_string(),
            ),
            ItemBody::Deleted(deleted) => (
                format!("{} [{}]", marker, deleted.tweet_id),
                "This post is unavailable.".to_string(),
            ),
        };
        println!("{}", header);
        let options = textwrap::Options::new(width.max(20))
            .initial_indent(indent)
            .subsequent_indent(indent);
        println!("{}", textwrap::fill(&text, options));
        if item.link_bottom {
            println!("  |");
        }
    }
}
