//! In-memory model of a MediaWiki export document.

use std::borrow::Cow;

use chrono::{DateTime, Utc};

use zimport_shared::{ArticleRecord, RevisionConfig, SiteConfig};

use crate::checksum::revision_sha1;

/// Namespaces declared in `<siteinfo>`: the minimal table an importer needs.
pub const NAMESPACES: [(i32, &str); 5] = [
    (-2, "Media"),
    (-1, "Special"),
    (0, ""),
    (1, "Talk"),
    (2, "User"),
];

/// Namespace every exported page lives in (main).
pub const MAIN_NAMESPACE: i32 = 0;

/// A complete export: site metadata plus one entry per page.
#[derive(Debug, Clone)]
pub struct ExportDocument {
    pub site: SiteConfig,
    pub pages: Vec<PageEntry>,
}

/// A `<page>` with its single revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageEntry {
    pub id: u64,
    pub title: String,
    pub namespace: i32,
    pub revision: RevisionEntry,
}

/// The only revision of a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevisionEntry {
    /// Same value as the owning page id.
    pub id: u64,
    pub parent_id: u64,
    /// `YYYY-MM-DDTHH:MM:SSZ`
    pub timestamp: String,
    pub contributor_name: String,
    pub contributor_id: u64,
    pub comment: String,
    pub model: String,
    pub format: String,
    pub text: String,
    /// Base-36 SHA-1 of `text`.
    pub sha1: String,
}

impl ExportDocument {
    /// Assign ids `1..=N` in record order and stamp every revision with `generated_at`.
    pub fn from_records(
        records: &[ArticleRecord],
        site: &SiteConfig,
        revision: &RevisionConfig,
        generated_at: DateTime<Utc>,
    ) -> Self {
        let timestamp = generated_at.format("%Y-%m-%dT%H:%M:%SZ").to_string();

        let pages = records
            .iter()
            .zip(1u64..)
            .map(|(record, id)| {
                let text = xml_safe(&record.content).into_owned();
                PageEntry {
                    id,
                    title: xml_safe(&record.title).into_owned(),
                    namespace: MAIN_NAMESPACE,
                    revision: RevisionEntry {
                        id,
                        parent_id: 0,
                        timestamp: timestamp.clone(),
                        contributor_name: revision.contributor_name.clone(),
                        contributor_id: revision.contributor_id,
                        comment: revision.comment.clone(),
                        model: revision.model.clone(),
                        format: revision.format.clone(),
                        sha1: revision_sha1(&text),
                        text,
                    },
                }
            })
            .collect();

        Self {
            site: site.clone(),
            pages,
        }
    }
}

/// Replace every character XML 1.0 cannot carry with U+FFFD.
///
/// Control characters survive HTML parsing but make the export ill-formed.
pub fn xml_safe(text: &str) -> Cow<'_, str> {
    if text.chars().all(is_xml_char) {
        Cow::Borrowed(text)
    } else {
        Cow::Owned(
            text.chars()
                .map(|c| if is_xml_char(c) { c } else { char::REPLACEMENT_CHARACTER })
                .collect(),
        )
    }
}

/// The XML 1.0 `Char` production.
pub fn is_xml_char(c: char) -> bool {
    matches!(
        c,
        '\t' | '\n' | '\r'
            | '\u{20}'..='\u{D7FF}'
            | '\u{E000}'..='\u{FFFD}'
            | '\u{10000}'..='\u{10FFFF}'
    )
}
