mod browser;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs::File;
use std::sync::{Arc, Mutex};
use tracing_subscriber::EnvFilter;

use postfeed::config::Config;
use postfeed::feed::FeedList;
use postfeed::fetcher::HttpSource;
use postfeed::models::Post;
use postfeed::session::FeedSession;

#[derive(Parser)]
#[command(name = "postfeed")]
#[command(about = "Paginated, searchable post feed for the terminal", long_about = None)]
struct Cli {
    /// Collection URL, overrides POSTFEED_URL
    #[arg(long, global = true)]
    url: Option<String>,
    /// Request timeout in seconds, overrides POSTFEED_TIMEOUT_SECS
    #[arg(long, global = true)]
    timeout: Option<u64>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    List {
        #[arg(short, long, default_value_t = 1)]
        pages: usize,
    },
    Search {
        query: String,
    },
    Browse {
        #[arg(long)]
        log_file: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::from_env()?.with_overrides(cli.url, cli.timeout);

    match cli.command {
        Commands::List { pages } => {
            init_logging(LogTarget::Stderr)?;
            let source = HttpSource::new(&config).context("Failed to create HTTP client")?;
            let mut feed = FeedList::new();
            feed.load_initial(&source).await;
            for _ in 1..pages {
                feed.load_more();
            }
            print_feed(&feed);
        }
        Commands::Search { query } => {
            init_logging(LogTarget::Stderr)?;
            let source = HttpSource::new(&config).context("Failed to create HTTP client")?;
            let mut feed = FeedList::new();
            feed.load_initial(&source).await;
            feed.set_query(query);
            if let Some(count) = feed.match_count() {
                println!("Found {} posts", count);
            }
            print_feed(&feed);
        }
        Commands::Browse { log_file } => {
            let target = match log_file {
                Some(path) => LogTarget::File(shellexpand::tilde(&path).to_string()),
                None => LogTarget::Discard,
            };
            init_logging(target)?;

            let source = HttpSource::new(&config).context("Failed to create HTTP client")?;
            let session = FeedSession::new(
                FeedList::new(),
                Arc::new(source),
                tokio::runtime::Handle::current(),
            );
            // The UI loop blocks on terminal events; keep the runtime free for fetches
            tokio::task::block_in_place(|| browser::run_browser(session))?;
        }
    }

    Ok(())
}

enum LogTarget {
    Stderr,
    File(String),
    // The browser owns the terminal, so without a file logs go nowhere
    Discard,
}

fn init_logging(target: LogTarget) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match target {
        LogTarget::Stderr => builder.with_writer(std::io::stderr).init(),
        LogTarget::File(path) => {
            let file = File::create(&path)
                .with_context(|| format!("Failed to create log file: {}", path))?;
            builder.with_ansi(false).with_writer(Mutex::new(file)).init();
        }
        LogTarget::Discard => builder.with_writer(std::io::sink).init(),
    }

    Ok(())
}

fn print_feed(feed: &FeedList) {
    if let Some(empty) = feed.empty_state() {
        println!("{}", empty.message());
        if let Some(err) = feed.last_error() {
            eprintln!("  ✗ {}", err);
        }
        return;
    }

    for post in feed.visible_items() {
        print_post(post);
    }

    if feed.has_more() {
        println!(
            "Showing {} of {} posts (page {})",
            feed.visible_len(),
            feed.all_items().len(),
            feed.page()
        );
    }
}

fn print_post(post: &Post) {
    println!("#{} {}", post.id, post.title);
    for line in textwrap::wrap(&post.body, 76) {
        println!("    {}", line);
    }
    println!("    User ID: {}  Post ID: {}", post.author_id, post.id);
    println!();
}
