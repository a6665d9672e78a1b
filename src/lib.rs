//! Siteprobe: a concurrent site crawler with a deterministic JSON report
//!
//! This crate crawls a website breadth-first from a root URL, staying within
//! the root's origin up to a configured depth. Along the way it probes
//! outbound links for reachability, fetches referenced assets, and extracts
//! basic SEO signals, then emits a single JSON report with a stable field
//! order and page ordering.

pub mod clock;
pub mod config;
pub mod crawler;
pub mod fetcher;
pub mod html;
pub mod limiter;
pub mod report;
pub mod url;

use thiserror::Error;

/// Main error type for a crawl invocation.
///
/// Only configuration problems and root-page failures surface as this error;
/// failures on nested pages, links, and assets are captured in the report.
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("url is required")]
    MissingUrl,

    #[error("invalid root url: {0}")]
    InvalidRootUrl(String),

    #[error(transparent)]
    Fetch(#[from] fetcher::FetchError),

    #[error("parse html: {0}")]
    ParseHtml(#[from] html::ParseHtmlError),

    #[error("operation canceled")]
    Canceled,
}

/// Result type alias for crawl operations.
pub type Result<T> = std::result::Result<T, CrawlError>;

// Re-export commonly used types
pub use clock::{Clock, SystemClock};
pub use config::CrawlOptions;
pub use crawler::{crawl_site, CrawlOutcome};
pub use report::{Asset, BrokenLink, Page, PageStatus, Report, Seo};
