//! Offline conversion of a saved page into an export document.

use std::path::Path;
use std::time::Instant;

use tracing::{info, instrument, warn};

use zimport_export::ExportWriter;
use zimport_extract::ArticleExtractor;
use zimport_shared::{AppConfig, Result, RetrievedDocument, RunId, ZimportError};

use crate::pipeline::{DUMP_FILE_NAME, ExportOutcome, ExportStatus, ensure_output_dir};

/// Extract articles from a previously saved page (typically `articles.html`)
/// and write `mediawiki_dump.xml` into `output_dir`. No server is started.
#[instrument(skip_all, fields(html = %html_path.display(), out = %output_dir.display()))]
pub fn convert_html_file(
    html_path: &Path,
    output_dir: &Path,
    config: &AppConfig,
) -> Result<ExportOutcome> {
    let start = Instant::now();

    if html_path.as_os_str().is_empty() || !html_path.is_file() {
        return Err(ZimportError::missing_input(format!(
            "HTML file not found: {}",
            html_path.display()
        )));
    }

    let extractor = ArticleExtractor::new(&config.extract)?;
    let writer = ExportWriter::new(config.site.clone(), config.revision.clone());

    let markup = std::fs::read_to_string(html_path).map_err(|e| ZimportError::io(html_path, e))?;
    let source = html_path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let url = html_path.display().to_string();
    let document = RetrievedDocument::new(markup, source.as_str(), url, 200);

    let records = extractor.extract(&document);
    if records.is_empty() {
        warn!("no articles extracted");
    }

    ensure_output_dir(output_dir)?;
    let dump_path = output_dir.join(DUMP_FILE_NAME);
    writer.write(&records, &dump_path)?;

    let outcome = ExportOutcome {
        run_id: RunId::new(),
        source,
        output_dir: output_dir.to_path_buf(),
        html_path: html_path.to_path_buf(),
        dump_path,
        article_count: records.len(),
        status: ExportStatus::for_count(records.len()),
        content_hash: document.content_hash,
        elapsed_ms: start.elapsed().as_millis() as u64,
    };

    info!(articles = outcome.article_count, "conversion complete");
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::temp_dir;

    #[test]
    fn converts_saved_fixture() {
        let tmp = temp_dir("zimport-convert-test");
        let out = tmp.join("out");

        let outcome = convert_html_file(
            Path::new("../../../fixtures/html/kiwix-landing.html"),
            &out,
            &AppConfig::default(),
        )
        .unwrap();

        assert_eq!(outcome.article_count, 2);
        assert_eq!(outcome.status, ExportStatus::Complete);
        assert_eq!(outcome.source, "kiwix-landing");

        let dump = std::fs::read_to_string(out.join(DUMP_FILE_NAME)).unwrap();
        assert_eq!(dump.matches("<page>").count(), 2);
        assert!(dump.contains("<title>Intro</title>"));
        assert!(dump.contains("<title>Alpha Centauri</title>"));
        // Only the dump is written; the input stays where it was
        assert!(!out.join("articles.html").exists());

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn missing_html_file_is_missing_input() {
        let tmp = temp_dir("zimport-convert-test");
        let html = tmp.join("articles.html");
        let err = convert_html_file(&html, &tmp.join("out"), &AppConfig::default()).unwrap_err();
        assert!(matches!(err, ZimportError::MissingInput { .. }));
        assert!(!tmp.join("out").exists());

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn control_characters_in_saved_page_yield_well_formed_dump() {
        let tmp = temp_dir("zimport-convert-test");
        let html = tmp.join("articles.html");
        std::fs::write(
            &html,
            "<div id=\"bodyContent\"><h1>Bad\u{1}Title</h1>\
             <div id=\"content\"><p>x&#1;y\u{c}z</p></div></div>",
        )
        .unwrap();

        let outcome = convert_html_file(&html, &tmp, &AppConfig::default()).unwrap();
        assert_eq!(outcome.article_count, 1);

        let dump = std::fs::read_to_string(&outcome.dump_path).unwrap();
        assert!(dump.chars().all(zimport_export::is_xml_char));
        assert!(dump.contains("<title>Bad\u{FFFD}Title</title>"));

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn page_without_containers_converts_to_empty_dump() {
        let tmp = temp_dir("zimport-convert-test");
        let html = tmp.join("articles.html");
        std::fs::write(&html, "<html><body><p>nothing here</p></body></html>").unwrap();

        let outcome = convert_html_file(&html, &tmp, &AppConfig::default()).unwrap();
        assert_eq!(outcome.status, ExportStatus::Empty);
        let dump = std::fs::read_to_string(&outcome.dump_path).unwrap();
        assert!(dump.contains("<siteinfo>"));
        assert!(!dump.contains("<page>"));

        let _ = std::fs::remove_dir_all(&tmp);
    }
}
