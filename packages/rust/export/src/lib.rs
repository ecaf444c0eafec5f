//! MediaWiki XML export writer.
//!
//! Serializes extracted articles into an `export-0.10` document that
//! `importDump.php` (and other wiki import pipelines) accept. Element names,
//! attribute names and the namespace/schema URIs below are the compatibility
//! contract; indentation is cosmetic.

mod checksum;
mod document;

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use tracing::{info, instrument, warn};

use zimport_shared::{
    ArticleRecord, Result, RevisionConfig, SiteConfig, ZimportError, write_atomic,
};

pub use checksum::revision_sha1;
pub use document::{
    ExportDocument, MAIN_NAMESPACE, NAMESPACES, PageEntry, RevisionEntry, is_xml_char, xml_safe,
};

/// Default export namespace.
pub const EXPORT_NS: &str = "http://www.mediawiki.org/xml/export-0.10/";

/// `xsi:schemaLocation` value.
pub const SCHEMA_LOCATION: &str =
    "http://www.mediawiki.org/xml/export-0.10/ http://www.mediawiki.org/xml/export-0.10.xsd";

/// Export schema version.
pub const SCHEMA_VERSION: &str = "0.10";

const XSI_NS: &str = "http://www.w3.org/2001/XMLSchema-instance";

/// What a successful write produced.
#[derive(Debug, Clone)]
pub struct ExportSummary {
    /// Final path of the export document.
    pub path: PathBuf,
    /// Number of `<page>` entries written.
    pub page_count: usize,
    /// Size of the document in bytes.
    pub size_bytes: usize,
}

/// Writes [`ArticleRecord`]s as a MediaWiki export document.
#[derive(Debug, Clone, Default)]
pub struct ExportWriter {
    site: SiteConfig,
    revision: RevisionConfig,
}

impl ExportWriter {
    pub fn new(site: SiteConfig, revision: RevisionConfig) -> Self {
        Self { site, revision }
    }

    /// Serialize `records` to `destination`, timestamped now.
    ///
    /// The document is built in memory and written atomically: on failure no
    /// file appears at `destination`.
    #[instrument(skip_all, fields(path = %destination.display(), records = records.len()))]
    pub fn write(&self, records: &[ArticleRecord], destination: &Path) -> Result<ExportSummary> {
        if records.is_empty() {
            warn!("no articles to export, writing siteinfo only");
        }

        let xml = self.render(records, Utc::now())?;
        write_atomic(destination, &xml)?;

        info!(pages = records.len(), size = xml.len(), "export document written");

        Ok(ExportSummary {
            path: destination.to_path_buf(),
            page_count: records.len(),
            size_bytes: xml.len(),
        })
    }

    /// Render the export document for `records` with a fixed revision timestamp.
    pub fn render(
        &self,
        records: &[ArticleRecord],
        generated_at: DateTime<Utc>,
    ) -> Result<Vec<u8>> {
        let document =
            ExportDocument::from_records(records, &self.site, &self.revision, generated_at);
        serialize(&document)
    }
}

/// Serialize a document to indented UTF-8 XML.
pub fn serialize(document: &ExportDocument) -> Result<Vec<u8>> {
    let mut xml = XmlOut::new();

    xml.event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;
    xml.start(BytesStart::new("mediawiki").with_attributes([
        ("xmlns", EXPORT_NS),
        ("xmlns:xsi", XSI_NS),
        ("xsi:schemaLocation", SCHEMA_LOCATION),
        ("version", SCHEMA_VERSION),
        ("xml:lang", "en"),
    ]))?;

    write_siteinfo(&mut xml, &document.site)?;
    for page in &document.pages {
        write_page(&mut xml, page)?;
    }

    xml.end("mediawiki")?;
    Ok(xml.finish())
}

fn write_siteinfo(xml: &mut XmlOut, site: &SiteConfig) -> Result<()> {
    xml.start(BytesStart::new("siteinfo"))?;
    xml.text_element("sitename", &site.sitename)?;
    xml.text_element("dbname", &site.dbname)?;
    xml.text_element("base", &site.base)?;
    xml.text_element("generator", &site.generator)?;
    xml.text_element("case", &site.case)?;

    let case = xml_safe(&site.case);
    xml.start(BytesStart::new("namespaces"))?;
    for (key, name) in NAMESPACES {
        let key = key.to_string();
        let element = BytesStart::new("namespace")
            .with_attributes([("key", key.as_str()), ("case", case.as_ref())]);
        if name.is_empty() {
            xml.event(Event::Empty(element))?;
        } else {
            xml.start(element)?;
            xml.text(name)?;
            xml.end("namespace")?;
        }
    }
    xml.end("namespaces")?;

    xml.end("siteinfo")
}

fn write_page(xml: &mut XmlOut, page: &PageEntry) -> Result<()> {
    let rev = &page.revision;

    xml.start(BytesStart::new("page"))?;
    xml.text_element("title", &page.title)?;
    xml.text_element("ns", &page.namespace.to_string())?;
    xml.text_element("id", &page.id.to_string())?;

    xml.start(BytesStart::new("revision"))?;
    xml.text_element("id", &rev.id.to_string())?;
    xml.text_element("parentid", &rev.parent_id.to_string())?;
    xml.text_element("timestamp", &rev.timestamp)?;

    xml.start(BytesStart::new("contributor"))?;
    xml.text_element("username", &rev.contributor_name)?;
    xml.text_element("id", &rev.contributor_id.to_string())?;
    xml.end("contributor")?;

    xml.text_element("comment", &rev.comment)?;
    xml.text_element("model", &rev.model)?;
    xml.text_element("format", &rev.format)?;

    xml.start(BytesStart::new("text").with_attributes([("xml:space", "preserve")]))?;
    xml.text(&rev.text)?;
    xml.end("text")?;

    xml.text_element("sha1", &rev.sha1)?;
    xml.end("revision")?;

    xml.end("page")
}

/// Thin wrapper mapping quick-xml errors into [`ZimportError::Serialize`].
struct XmlOut {
    writer: Writer<Vec<u8>>,
}

impl XmlOut {
    fn new() -> Self {
        Self {
            writer: Writer::new_with_indent(Vec::new(), b'\t', 1),
        }
    }

    fn event(&mut self, event: Event<'_>) -> Result<()> {
        self.writer
            .write_event(event)
            .map_err(|e| ZimportError::Serialize(e.to_string()))
    }

    fn start(&mut self, element: BytesStart<'_>) -> Result<()> {
        self.event(Event::Start(element))
    }

    fn end(&mut self, name: &str) -> Result<()> {
        self.event(Event::End(BytesEnd::new(name)))
    }

    /// Escaped character data, written verbatim (no indentation inside).
    fn text(&mut self, text: &str) -> Result<()> {
        self.event(Event::Text(BytesText::new(&xml_safe(text))))
    }

    fn text_element(&mut self, name: &str, text: &str) -> Result<()> {
        self.start(BytesStart::new(name))?;
        self.text(text)?;
        self.end(name)
    }

    fn finish(self) -> Vec<u8> {
        self.writer.into_inner()
    }
}
