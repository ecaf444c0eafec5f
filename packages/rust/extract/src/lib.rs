//! Article extraction from rendered archive pages.
//!
//! A rendered page may hold several article containers. Each container that
//! has both a title node and a content region yields one [`ArticleRecord`];
//! the title is flattened to text, the content keeps its markup.

use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info, instrument};

use zimport_shared::{ArticleRecord, ExtractConfig, Result, RetrievedDocument, ZimportError};

/// Locates `(title, content)` pairs in rendered HTML using CSS selectors.
#[derive(Debug, Clone)]
pub struct ArticleExtractor {
    container: Selector,
    title: Selector,
    content: Selector,
}

impl ArticleExtractor {
    /// Compile the configured selectors. Invalid selectors are a config error.
    pub fn new(config: &ExtractConfig) -> Result<Self> {
        Ok(Self {
            container: parse_selector("container", &config.container)?,
            title: parse_selector("title", &config.title)?,
            content: parse_selector("content", &config.content)?,
        })
    }

    /// Extract every article from a retrieved page, in document order.
    ///
    /// Never fails: containers missing a title or content region are skipped,
    /// and a page with no containers yields an empty list.
    #[instrument(skip_all, fields(source = %document.source, bytes = document.markup.len()))]
    pub fn extract(&self, document: &RetrievedDocument) -> Vec<ArticleRecord> {
        let records = self.extract_markup(&document.markup);
        info!(articles = records.len(), "extraction complete");
        records
    }

    /// Extract articles from raw markup.
    pub fn extract_markup(&self, markup: &str) -> Vec<ArticleRecord> {
        let doc = Html::parse_document(markup);
        let mut records = Vec::new();

        for (index, container) in doc.select(&self.container).enumerate() {
            match self.extract_container(container) {
                Some(record) => {
                    debug!(index, title = %record.title, "article found");
                    records.push(record);
                }
                None => debug!(index, "container lacks title or content, skipping"),
            }
        }

        records
    }

    fn extract_container(&self, container: ElementRef<'_>) -> Option<ArticleRecord> {
        let title = container.select(&self.title).next()?;
        let content = container.select(&self.content).next()?;

        let title_text = title.text().collect::<String>();
        ArticleRecord::new(&title_text, &content.inner_html())
    }
}

impl Default for ArticleExtractor {
    fn default() -> Self {
        Self::new(&ExtractConfig::default()).expect("built-in selectors are valid")
    }
}

fn parse_selector(role: &str, selector: &str) -> Result<Selector> {
    Selector::parse(selector)
        .map_err(|e| ZimportError::config(format!("invalid {role} selector '{selector}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load_fixture(name: &str) -> String {
        let path = format!("../../../fixtures/html/{name}");
        std::fs::read_to_string(&path).unwrap_or_else(|_| panic!("missing fixture: {path}"))
    }

    fn document(markup: &str) -> RetrievedDocument {
        RetrievedDocument::new(markup.to_string(), "sample", "http://localhost:8080/sample", 200)
    }

    #[test]
    fn two_containers_yield_two_records_in_order() {
        let html = r#"<html><body>
            <div id="bodyContent"><h1>First <b>Title</b></h1><div id="content"><p>One</p></div></div>
            <div id="bodyContent"><h1>Second</h1><div id="content"><p>Two <em>x</em></p></div></div>
        </body></html>"#;

        let records = ArticleExtractor::default().extract(&document(html));

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].title, "First Title");
        assert_eq!(records[0].content, "<p>One</p>");
        assert_eq!(records[1].title, "Second");
        assert_eq!(records[1].content, "<p>Two <em>x</em></p>");
    }

    #[test]
    fn fixture_skips_incomplete_containers() {
        let records =
            ArticleExtractor::default().extract(&document(&load_fixture("kiwix-landing.html")));

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].title, "Intro");
        assert_eq!(records[0].content, "<p>Hello</p>");
        assert_eq!(records[1].title, "Alpha Centauri");
        assert!(records[1].content.starts_with("<p>A <a href=\"/sample/Star\">star</a>"));
        assert!(records[1].content.contains("&amp; more"));
        assert!(records[1].content.ends_with("</ul>"));
    }

    #[test]
    fn no_containers_yields_nothing() {
        let html = "<html><body><h1>Title</h1><div id=\"content\">text</div></body></html>";
        assert!(ArticleExtractor::default().extract(&document(html)).is_empty());
        assert!(ArticleExtractor::default().extract(&document("")).is_empty());
    }

    #[test]
    fn malformed_markup_does_not_fail() {
        let html = "<div id=\"bodyContent\"><h1>Broken<div id=\"content\"><p>unclosed";
        let records = ArticleExtractor::default().extract_markup(html);
        // Whatever the parser recovers, it must not panic and titles stay non-empty
        assert!(records.iter().all(|r| !r.title.is_empty()));
    }

    #[test]
    fn blank_title_skips_container() {
        let html = r#"<div id="bodyContent"><h1>   </h1><div id="content"><p>x</p></div></div>"#;
        assert!(ArticleExtractor::default().extract_markup(html).is_empty());
    }

    #[test]
    fn custom_selectors() {
        let config = ExtractConfig {
            container: "article".into(),
            title: "header h2".into(),
            content: "section.body".into(),
        };
        let extractor = ArticleExtractor::new(&config).unwrap();
        let html = r#"<article><header><h2>Custom</h2></header><section class="body"><p>Body</p></section></article>"#;

        let records = extractor.extract_markup(html);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].title, "Custom");
        assert_eq!(records[0].content, "<p>Body</p>");
    }

    #[test]
    fn invalid_selector_is_config_error() {
        let config = ExtractConfig {
            container: "div[".into(),
            ..ExtractConfig::default()
        };
        let err = ArticleExtractor::new(&config).unwrap_err();
        assert!(matches!(err, ZimportError::Config { .. }));
        assert!(err.to_string().contains("container"));
    }
}
