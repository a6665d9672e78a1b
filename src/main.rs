//! Siteprobe command-line interface
//!
//! Crawls a site and writes the JSON report to stdout. Logs go to stderr
//! so the report stays machine-readable. A root-level failure exits with
//! status 1 after the (still well-formed) report has been written.

use std::io::Write;
use std::time::Duration;

use clap::{CommandFactory, Parser};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use siteprobe::config::{parse_duration, CrawlOptions};
use siteprobe::crawl_site;

/// Crawl a website and report broken links, assets, and SEO signals.
///
/// The root URL is canonicalized before crawling: a bare trailing slash is
/// stripped, so the report may show `https://example.com` for a configured
/// `https://example.com/`.
#[derive(Parser, Debug)]
#[command(name = "siteprobe")]
#[command(version)]
#[command(about = "Crawl a website and report broken links, assets, and SEO signals")]
struct Cli {
    /// Root URL to crawl (http or https)
    #[arg(value_name = "URL")]
    url: Option<String>,

    /// Maximum crawl depth; the root is depth 0
    #[arg(long, default_value_t = 1)]
    depth: usize,

    /// Retries after the first failed attempt
    #[arg(long, default_value_t = 0)]
    retries: u32,

    /// Minimum delay between requests (e.g. 500ms, 2s)
    #[arg(long, value_parser = parse_duration, default_value = "0s")]
    delay: Duration,

    /// Per-request timeout; 0 disables it
    #[arg(long, value_parser = parse_duration, default_value = "10s")]
    timeout: Duration,

    /// Requests per second; overrides --delay for rate limiting
    #[arg(long, default_value_t = 0.0)]
    rps: f64,

    /// User-Agent header sent with every request
    #[arg(long = "user-agent", default_value = "siteprobe/0.1")]
    user_agent: String,

    /// Number of concurrent page workers
    #[arg(long, default_value_t = 4)]
    workers: usize,

    /// Cap on concurrent HTTP fetches; 0 means one per worker
    #[arg(long = "max-concurrent-fetch", default_value_t = 0)]
    max_concurrent_fetch: usize,

    /// Pretty-print the JSON report with two-space indentation
    #[arg(long)]
    indent: bool,

    /// Increase logging verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    let Some(url) = cli.url.clone() else {
        Cli::command().print_help()?;
        println!();
        return Ok(());
    };

    let http_client = reqwest::Client::builder().build()?;

    let mut opts = CrawlOptions::new(url, http_client);
    opts.depth = cli.depth;
    opts.retries = cli.retries;
    opts.delay = cli.delay;
    opts.timeout = cli.timeout;
    opts.rps = cli.rps;
    opts.user_agent = cli.user_agent.clone();
    opts.workers = cli.workers;
    opts.max_concurrent_fetch = cli.max_concurrent_fetch;
    opts.indent_json = cli.indent;

    let cancel = CancellationToken::new();
    let canceller = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, stopping crawl");
            canceller.cancel();
        }
    });

    let mut outcome = crawl_site(&cancel, &opts).await;

    let data = outcome.report.render(opts.indent_json);
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(&data)?;
    stdout.flush()?;

    if let Some(error) = outcome.error {
        eprintln!("{error}");
        std::process::exit(1);
    }

    Ok(())
}

/// Routes tracing output to stderr with a verbosity-derived filter.
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("siteprobe=warn"),
            1 => EnvFilter::new("siteprobe=info"),
            _ => EnvFilter::new("siteprobe=debug"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
