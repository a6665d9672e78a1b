//! Report schema and JSON rendering
//!
//! The report is the crawler's only output. Struct field order below
//! defines the emitted JSON key order, so the declarations are contract,
//! not style. Error pages carry `null` for `broken_links` and `assets`;
//! ok pages carry arrays, possibly empty.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::html::AssetKind;

/// Root-level crawl report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub root_url: String,
    pub depth: usize,
    pub generated_at: String,
    pub pages: Vec<Page>,
}

/// Outcome of one crawled URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    pub url: String,
    pub depth: usize,
    pub http_status: u16,
    pub status: PageStatus,
    pub error: String,
    pub seo: Seo,
    pub broken_links: Option<Vec<BrokenLink>>,
    pub assets: Option<Vec<Asset>>,
    pub discovered_at: String,
}

/// Whether a page was fetched and parsed successfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageStatus {
    Ok,
    Error,
}

/// SEO signals for a page; missing elements yield false flags and empty
/// strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Seo {
    pub has_title: bool,
    pub title: String,
    pub has_description: bool,
    pub description: String,
    pub has_h1: bool,
}

/// A same-origin link whose final probe attempt failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokenLink {
    pub url: String,
    pub status_code: u16,
    pub error: String,
}

/// A fetched asset reference. Recorded even when the fetch failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub url: String,
    #[serde(rename = "type")]
    pub kind: AssetKind,
    pub status_code: u16,
    pub size_bytes: u64,
    pub error: String,
}

impl Report {
    /// Creates an empty report stamped with the invocation time.
    pub fn new(root_url: &str, depth: usize, generated_at: DateTime<Utc>) -> Self {
        Self {
            root_url: root_url.to_string(),
            depth,
            generated_at: format_timestamp(generated_at),
            pages: Vec::new(),
        }
    }

    /// Stably sorts pages by ascending depth, then ascending URL.
    pub fn sort_pages(&mut self) {
        self.pages
            .sort_by(|a, b| a.depth.cmp(&b.depth).then_with(|| a.url.cmp(&b.url)));
    }

    /// Sorts pages and serializes the report.
    ///
    /// `indent` switches between compact and two-space-indented output; the
    /// contents are identical either way. The result always ends with a
    /// single newline.
    pub fn render(&mut self, indent: bool) -> Vec<u8> {
        self.sort_pages();

        let serialized = if indent {
            serde_json::to_vec_pretty(self)
        } else {
            serde_json::to_vec(self)
        };

        let mut data =
            serialized.unwrap_or_else(|_| br#"{"error":"failed to render report"}"#.to_vec());

        if data.last() != Some(&b'\n') {
            data.push(b'\n');
        }

        data
    }
}

/// Formats a timestamp as RFC3339 with seconds precision in UTC.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixture_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 34, 56).unwrap()
    }

    fn ok_page(url: &str, depth: usize) -> Page {
        Page {
            url: url.to_string(),
            depth,
            http_status: 200,
            status: PageStatus::Ok,
            error: String::new(),
            seo: Seo::default(),
            broken_links: Some(Vec::new()),
            assets: Some(Vec::new()),
            discovered_at: format_timestamp(fixture_time()),
        }
    }

    #[test]
    fn test_timestamp_is_rfc3339_utc_with_z() {
        assert_eq!(format_timestamp(fixture_time()), "2024-06-01T12:34:56Z");
    }

    #[test]
    fn test_sort_pages_by_depth_then_url() {
        let mut report = Report::new("https://example.com", 1, fixture_time());
        report.pages = vec![
            ok_page("https://example.com/b", 1),
            ok_page("https://example.com", 0),
            ok_page("https://example.com/a", 1),
        ];

        report.sort_pages();

        let urls: Vec<&str> = report.pages.iter().map(|p| p.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://example.com",
                "https://example.com/a",
                "https://example.com/b",
            ]
        );
    }

    #[test]
    fn test_render_ends_with_single_newline() {
        let mut report = Report::new("https://example.com", 0, fixture_time());

        let compact = report.render(false);
        assert_eq!(compact.last(), Some(&b'\n'));
        assert_ne!(compact[compact.len() - 2], b'\n');
    }

    #[test]
    fn test_render_key_order() {
        let mut report = Report::new("https://example.com", 1, fixture_time());
        report.pages.push(ok_page("https://example.com", 0));

        let data = report.render(false);
        let text = String::from_utf8(data).unwrap();

        let report_keys = ["\"root_url\"", "\"depth\"", "\"generated_at\"", "\"pages\""];
        let mut cursor = 0;
        for key in report_keys {
            let at = text[cursor..].find(key).expect(key);
            cursor += at;
        }

        let page_keys = [
            "\"url\"",
            "\"http_status\"",
            "\"status\"",
            "\"error\"",
            "\"seo\"",
            "\"broken_links\"",
            "\"assets\"",
            "\"discovered_at\"",
        ];
        let mut cursor = text.find("\"pages\"").unwrap();
        for key in page_keys {
            let at = text[cursor..].find(key).expect(key);
            cursor += at;
        }
    }

    #[test]
    fn test_error_page_serializes_null_lists() {
        let mut report = Report::new("https://example.com", 0, fixture_time());
        report.pages.push(Page {
            url: "https://example.com".to_string(),
            depth: 0,
            http_status: 0,
            status: PageStatus::Error,
            error: "connection refused".to_string(),
            seo: Seo::default(),
            broken_links: None,
            assets: None,
            discovered_at: format_timestamp(fixture_time()),
        });

        let data = report.render(false);
        let text = String::from_utf8(data).unwrap();
        assert!(text.contains(r#""broken_links":null"#));
        assert!(text.contains(r#""assets":null"#));
        assert!(text.contains(r#""status":"error""#));
    }

    #[test]
    fn test_ok_page_serializes_empty_arrays_and_empty_error() {
        let mut report = Report::new("https://example.com", 0, fixture_time());
        report.pages.push(ok_page("https://example.com", 0));

        let data = report.render(false);
        let text = String::from_utf8(data).unwrap();
        assert!(text.contains(r#""broken_links":[]"#));
        assert!(text.contains(r#""assets":[]"#));
        assert!(text.contains(r#""error":"""#));
    }

    #[test]
    fn test_asset_type_serializes_lowercase() {
        let asset = Asset {
            url: "https://example.com/logo.png".to_string(),
            kind: AssetKind::Image,
            status_code: 200,
            size_bytes: 5,
            error: String::new(),
        };

        let text = serde_json::to_string(&asset).unwrap();
        assert!(text.contains(r#""type":"image""#));
    }

    #[test]
    fn test_indent_changes_formatting_not_content() {
        let mut report = Report::new("https://example.com", 1, fixture_time());
        report.pages.push(ok_page("https://example.com", 0));

        let compact = report.clone().render(false);
        let pretty = report.render(true);
        assert_ne!(compact, pretty);

        let a: serde_json::Value = serde_json::from_slice(&compact).unwrap();
        let b: serde_json::Value = serde_json::from_slice(&pretty).unwrap();
        assert_eq!(a, b);
    }
}
