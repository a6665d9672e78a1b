//! HTML parsing for the crawler
//!
//! Given a fetched page body, extracts the raw link hrefs, the SEO signals
//! (title, meta description, h1 presence), and asset references (images,
//! scripts, stylesheets). Hrefs are returned as written in the document;
//! resolution against the page URL happens in the crawl engine.

mod text;

use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use text::clean_human_text;

/// Error for an unparseable page body.
///
/// The HTML parser itself is error-tolerant, so the concrete failure mode
/// is a body that is not valid UTF-8 text.
#[derive(Debug, Error)]
pub enum ParseHtmlError {
    #[error("body is not valid utf-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),
}

/// SEO signals extracted from a page.
///
/// Missing elements yield `false` flags and empty strings; text fields are
/// entity-decoded and whitespace-collapsed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeoData {
    pub has_title: bool,
    pub title: String,
    pub has_description: bool,
    pub description: String,
    pub has_h1: bool,
}

/// Kind of asset a page references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Image,
    Script,
    Style,
}

/// An asset reference as written in the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetRef {
    pub url: String,
    pub kind: AssetKind,
}

/// Aggregated parse output for one page.
#[derive(Debug, Clone, Default)]
pub struct ParsedPage {
    pub links: Vec<String>,
    pub seo: SeoData,
    pub assets: Vec<AssetRef>,
}

/// Parses a page body and extracts links, SEO signals, and asset refs.
pub fn parse_page(body: &[u8]) -> Result<ParsedPage, ParseHtmlError> {
    let text = std::str::from_utf8(body)?;
    let document = Html::parse_document(text);

    Ok(ParsedPage {
        links: parse_links(&document),
        seo: parse_seo(&document),
        assets: parse_assets(&document),
    })
}

fn parse_links(document: &Html) -> Vec<String> {
    let mut links = Vec::new();

    if let Ok(selector) = Selector::parse("a[href]") {
        for element in document.select(&selector) {
            if let Some(href) = element.value().attr("href") {
                links.push(href.trim().to_string());
            }
        }
    }

    links
}

fn parse_seo(document: &Html) -> SeoData {
    let mut seo = SeoData::default();

    if let Ok(selector) = Selector::parse("title") {
        if let Some(title) = document.select(&selector).next() {
            seo.has_title = true;
            seo.title = clean_human_text(&title.text().collect::<String>());
        }
    }

    let (has_description, description) = find_meta_description(document);
    seo.has_description = has_description;
    seo.description = description;

    if let Ok(selector) = Selector::parse("h1") {
        seo.has_h1 = document.select(&selector).next().is_some();
    }

    seo
}

fn find_meta_description(document: &Html) -> (bool, String) {
    let Ok(selector) = Selector::parse("meta[name]") else {
        return (false, String::new());
    };

    for element in document.select(&selector) {
        let Some(name) = element.value().attr("name") else {
            continue;
        };

        if !name.trim().eq_ignore_ascii_case("description") {
            continue;
        }

        let content = element.value().attr("content").unwrap_or_default();

        return (true, clean_human_text(content));
    }

    (false, String::new())
}

fn parse_assets(document: &Html) -> Vec<AssetRef> {
    let mut assets = Vec::new();

    collect_assets(document, "img[src]", "src", AssetKind::Image, &mut assets);
    collect_assets(document, "script[src]", "src", AssetKind::Script, &mut assets);
    collect_stylesheets(document, &mut assets);

    assets
}

fn collect_assets(
    document: &Html,
    selector: &str,
    attr: &str,
    kind: AssetKind,
    out: &mut Vec<AssetRef>,
) {
    let Ok(selector) = Selector::parse(selector) else {
        return;
    };

    for element in document.select(&selector) {
        let Some(value) = element.value().attr(attr) else {
            continue;
        };

        let trimmed = value.trim();
        if trimmed.is_empty() {
            continue;
        }

        out.push(AssetRef {
            url: trimmed.to_string(),
            kind,
        });
    }
}

fn collect_stylesheets(document: &Html, out: &mut Vec<AssetRef>) {
    let Ok(selector) = Selector::parse("link[href]") else {
        return;
    };

    for element in document.select(&selector) {
        let Some(rel) = element.value().attr("rel") else {
            continue;
        };

        if !rel.to_lowercase().contains("stylesheet") {
            continue;
        }

        let Some(href) = element.value().attr("href") else {
            continue;
        };

        let trimmed = href.trim();
        if trimmed.is_empty() {
            continue;
        }

        out.push(AssetRef {
            url: trimmed.to_string(),
            kind: AssetKind::Style,
        });
    }
}
