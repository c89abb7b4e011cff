//! Ordered selector fallback chains.
//!
//! Tracklist pages ship at least three different DOM layouts depending
//! on age and A/B bucket, so no single selector is trustworthy. Each
//! field gets an ordered chain of selectors; the first one producing
//! usable text wins. Chains are data, not code — adding a layout means
//! adding a selector string, and every chain is testable against static
//! HTML fixtures.
//!
//! Both the static and headless backends funnel their raw HTML through
//! [`parse_tracklist_page`], which is what makes their output uniform.

use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};

use super::backend::{RawPage, RawRow};
use crate::model::normalize_whitespace;

/// Where a chain step reads its value from.
#[derive(Debug, Clone, Copy)]
pub enum Extract {
    Text,
    Attr(&'static str),
}

struct Step {
    selector: Selector,
    extract: Extract,
}

/// An ordered, first-success-wins selector chain for one field.
pub struct FieldChain {
    name: &'static str,
    steps: Vec<Step>,
}

impl FieldChain {
    /// Compile a chain. Invalid selector strings are programmer errors
    /// in a static table, so they are dropped with a warning rather
    /// than taking the whole scrape down.
    pub fn new(name: &'static str, specs: &[(&str, Extract)]) -> Self {
        let steps = specs
            .iter()
            .filter_map(|(css, extract)| match Selector::parse(css) {
                Ok(selector) => Some(Step {
                    selector,
                    extract: *extract,
                }),
                Err(e) => {
                    tracing::warn!("Invalid selector {:?} in chain {}: {:?}", css, name, e);
                    None
                }
            })
            .collect();
        Self { name, steps }
    }

    /// First usable value from the whole document.
    pub fn extract(&self, html: &Html) -> Option<String> {
        for step in &self.steps {
            if let Some(value) = html
                .select(&step.selector)
                .filter_map(|el| read_element(el, step.extract))
                .find(|v| usable(v))
            {
                return Some(value);
            }
        }
        tracing::debug!("No selector in chain {} matched", self.name);
        None
    }

    /// First usable value scoped to one element (a track row).
    pub fn extract_from(&self, element: ElementRef<'_>) -> Option<String> {
        for step in &self.steps {
            if let Some(value) = element
                .select(&step.selector)
                .filter_map(|el| read_element(el, step.extract))
                .find(|v| usable(v))
            {
                return Some(value);
            }
        }
        None
    }
}

fn read_element(element: ElementRef<'_>, extract: Extract) -> Option<String> {
    let raw = match extract {
        Extract::Text => element.text().collect::<String>(),
        Extract::Attr(attr) => element.value().attr(attr)?.to_string(),
    };
    Some(normalize_whitespace(&raw))
}

/// Usable text: non-empty after normalization and not a placeholder.
fn usable(value: &str) -> bool {
    !value.is_empty() && value != "-" && value != "?" && !value.eq_ignore_ascii_case("n/a")
}

// Page-level field chains.

static PAGE_TITLE: Lazy<FieldChain> = Lazy::new(|| {
    FieldChain::new(
        "page.title",
        &[
            ("#pageTitle", Extract::Text),
            ("h1.spotlight", Extract::Text),
            ("h1[itemprop=\"name\"]", Extract::Text),
            ("meta[property=\"og:title\"]", Extract::Attr("content")),
            ("h1", Extract::Text),
            ("title", Extract::Text),
        ],
    )
});

static PAGE_ARTIST: Lazy<FieldChain> = Lazy::new(|| {
    FieldChain::new(
        "page.artist",
        &[
            (".setArtist", Extract::Text),
            ("a[href*=\"/dj/\"]", Extract::Text),
            ("[itemprop=\"byArtist\"]", Extract::Text),
            ("meta[name=\"author\"]", Extract::Attr("content")),
        ],
    )
});

static PAGE_VENUE: Lazy<FieldChain> = Lazy::new(|| {
    FieldChain::new(
        "page.venue",
        &[
            (".setVenue", Extract::Text),
            ("a[href*=\"/venue/\"]", Extract::Text),
            ("[itemprop=\"location\"]", Extract::Text),
        ],
    )
});

static PAGE_DATE: Lazy<FieldChain> = Lazy::new(|| {
    FieldChain::new(
        "page.date",
        &[
            (".setDate", Extract::Text),
            ("time[datetime]", Extract::Attr("datetime")),
            ("[itemprop=\"datePublished\"]", Extract::Attr("content")),
            ("[itemprop=\"datePublished\"]", Extract::Text),
        ],
    )
});

static PAGE_IMAGE: Lazy<FieldChain> = Lazy::new(|| {
    FieldChain::new(
        "page.image",
        &[
            ("meta[property=\"og:image\"]", Extract::Attr("content")),
            ("img#coverImage", Extract::Attr("src")),
            (".setCover img", Extract::Attr("src")),
        ],
    )
});

// Row-level field chains.

static ROW_TITLE: Lazy<FieldChain> = Lazy::new(|| {
    FieldChain::new(
        "row.title",
        &[
            (".trackValue", Extract::Text),
            (".track-title", Extract::Text),
            ("[itemprop=\"name\"]", Extract::Text),
            ("span.trackFormat", Extract::Text),
            ("a", Extract::Text),
        ],
    )
});

static ROW_ARTIST: Lazy<FieldChain> = Lazy::new(|| {
    FieldChain::new(
        "row.artist",
        &[
            (".trackArtist", Extract::Text),
            (".track-artist", Extract::Text),
            ("[itemprop=\"byArtist\"]", Extract::Text),
        ],
    )
});

static ROW_TIME: Lazy<FieldChain> = Lazy::new(|| {
    FieldChain::new(
        "row.time",
        &[
            (".cueValue", Extract::Text),
            (".tracklist-time", Extract::Text),
            ("td.time", Extract::Text),
            ("span.time", Extract::Text),
        ],
    )
});

static ROW_LABEL: Lazy<FieldChain> = Lazy::new(|| {
    FieldChain::new(
        "row.label",
        &[
            (".trackLabel", Extract::Text),
            (".track-label", Extract::Text),
            ("[itemprop=\"recordLabel\"]", Extract::Text),
        ],
    )
});

/// Row container selectors, in priority order. The first one matching
/// at least one element wins for the whole page.
pub const ROW_SELECTORS: &[&str] = &[
    "div.tlpItem",
    "tr.tlpItem",
    "li.tracklist-item",
    "div[itemprop=\"track\"]",
    "table.tracklist tr",
    ".track-row",
    "li.track",
];

static ROW_LINKS: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a[href]").expect("static selector"));

/// Parse a tracklist page into the uniform intermediate record.
///
/// Never fails: a page with no recognizable rows yields an empty `rows`
/// vector and whatever page-level fields matched. The caller decides
/// whether that constitutes `ExtractionEmpty`.
pub fn parse_tracklist_page(html: &str) -> RawPage {
    let document = Html::parse_document(html);

    let rows = extract_rows(&document);

    RawPage {
        title: PAGE_TITLE.extract(&document),
        artist: PAGE_ARTIST.extract(&document),
        venue: PAGE_VENUE.extract(&document),
        date: PAGE_DATE.extract(&document),
        image: PAGE_IMAGE.extract(&document),
        rows,
    }
}

fn extract_rows(document: &Html) -> Vec<RawRow> {
    for css in ROW_SELECTORS {
        let Ok(selector) = Selector::parse(css) else {
            continue;
        };
        let rows: Vec<RawRow> = document
            .select(&selector)
            .filter_map(parse_row)
            .collect();
        if !rows.is_empty() {
            tracing::debug!("Row selector {:?} matched {} rows", css, rows.len());
            return rows;
        }
    }
    Vec::new()
}

fn parse_row(row: ElementRef<'_>) -> Option<RawRow> {
    let raw_title = ROW_TITLE.extract_from(row)?;
    let explicit_artist = ROW_ARTIST.extract_from(row);

    // Rows without a dedicated artist element usually carry a combined
    // "Artist - Title" string.
    let (artist, title) = match explicit_artist {
        Some(artist) => (Some(artist), raw_title),
        None => split_artist_title(&raw_title),
    };

    let links = row
        .select(&ROW_LINKS)
        .filter_map(|a| a.value().attr("href"))
        .filter(|href| href.starts_with("http://") || href.starts_with("https://"))
        .map(String::from)
        .collect();

    Some(RawRow {
        title,
        artist,
        remix: None,
        time: ROW_TIME.extract_from(row),
        label: ROW_LABEL.extract_from(row),
        links,
    })
}

/// Split a combined "Artist - Title" string on the first separator
/// dash. Strings without a separator are treated as title-only.
pub fn split_artist_title(combined: &str) -> (Option<String>, String) {
    for separator in [" - ", " – ", " — "] {
        if let Some((artist, title)) = combined.split_once(separator) {
            let artist = normalize_whitespace(artist);
            let title = normalize_whitespace(title);
            if !artist.is_empty() && !title.is_empty() {
                return (Some(artist), title);
            }
        }
    }
    (None, combined.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = r#"
        <html><head>
            <title>Fallback Title</title>
            <meta property="og:image" content="https://cdn.example.com/cover.jpg">
        </head><body>
            <h1 id="pageTitle">Opening Set @ Warehouse</h1>
            <span class="setArtist">DJ Example</span>
            <span class="setDate">2024-06-01</span>
            <div class="tlpItem">
                <span class="trackValue">deadmau5 - Strobe</span>
                <span class="cueValue">0:00</span>
                <span class="trackLabel">mau5trap</span>
                <a href="https://open.spotify.com/track/abc">spotify</a>
                <a href="/internal/page">internal</a>
            </div>
            <div class="tlpItem">
                <span class="trackArtist">Eric Prydz</span>
                <span class="trackValue">Opus</span>
            </div>
            <div class="tlpItem">
                <span class="trackValue">   </span>
            </div>
        </body></html>
    "#;

    #[test]
    fn test_parse_page_fields() {
        let page = parse_tracklist_page(FIXTURE);
        assert_eq!(page.title.as_deref(), Some("Opening Set @ Warehouse"));
        assert_eq!(page.artist.as_deref(), Some("DJ Example"));
        assert_eq!(page.date.as_deref(), Some("2024-06-01"));
        assert_eq!(
            page.image.as_deref(),
            Some("https://cdn.example.com/cover.jpg")
        );
    }

    #[test]
    fn test_parse_rows_with_combined_and_split_artist() {
        let page = parse_tracklist_page(FIXTURE);
        // The blank-title row is dropped at the extraction boundary.
        assert_eq!(page.rows.len(), 2);

        let first = &page.rows[0];
        assert_eq!(first.artist.as_deref(), Some("deadmau5"));
        assert_eq!(first.title, "Strobe");
        assert_eq!(first.time.as_deref(), Some("0:00"));
        assert_eq!(first.label.as_deref(), Some("mau5trap"));
        assert_eq!(first.links, vec!["https://open.spotify.com/track/abc"]);

        let second = &page.rows[1];
        assert_eq!(second.artist.as_deref(), Some("Eric Prydz"));
        assert_eq!(second.title, "Opus");
    }

    #[test]
    fn test_title_chain_falls_back() {
        let html = "<html><head><title>Only The Tab Title</title></head><body></body></html>";
        let page = parse_tracklist_page(html);
        assert_eq!(page.title.as_deref(), Some("Only The Tab Title"));
    }

    #[test]
    fn test_no_rows_yields_empty_not_error() {
        let page = parse_tracklist_page("<html><body><p>nothing here</p></body></html>");
        assert!(page.rows.is_empty());
    }

    #[test]
    fn test_split_artist_title() {
        assert_eq!(
            split_artist_title("deadmau5 - Strobe"),
            (Some("deadmau5".to_string()), "Strobe".to_string())
        );
        assert_eq!(
            split_artist_title("Strobe"),
            (None, "Strobe".to_string())
        );
        // En dash separator
        assert_eq!(
            split_artist_title("Eric Prydz – Opus"),
            (Some("Eric Prydz".to_string()), "Opus".to_string())
        );
    }

    #[test]
    fn test_placeholder_text_not_usable() {
        let html = r#"<div class="tlpItem"><span class="trackValue">-</span></div>"#;
        let page = parse_tracklist_page(html);
        assert!(page.rows.is_empty());
    }
}
