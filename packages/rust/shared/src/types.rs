//! Core domain types for an archive export run.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use url::Url;
use uuid::Uuid;

use crate::error::{Result, ZimportError};

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper identifying one pipeline run (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// ArchiveReference
// ---------------------------------------------------------------------------

/// A validated archive on disk plus the name the content server routes it under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveReference {
    path: PathBuf,
    name: String,
}

impl ArchiveReference {
    /// Validate `path` and derive the logical name from its file stem.
    ///
    /// Fails with [`ZimportError::MissingInput`] if the path is blank, does not
    /// exist, or is not a regular file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = path.as_ref();
        if raw.as_os_str().is_empty() || raw.to_string_lossy().trim().is_empty() {
            return Err(ZimportError::missing_input("no archive selected"));
        }

        if !raw.is_file() {
            return Err(ZimportError::missing_input(format!(
                "archive not found: {}",
                raw.display()
            )));
        }

        let path = std::fs::canonicalize(raw).map_err(|e| ZimportError::io(raw, e))?;
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                ZimportError::missing_input(format!(
                    "cannot derive archive name from {}",
                    path.display()
                ))
            })?;

        Ok(Self { path, name })
    }

    /// Absolute path to the archive file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Logical name: the root page path segment on the content server.
    pub fn name(&self) -> &str {
        &self.name
    }
}

// ---------------------------------------------------------------------------
// ServerHandle
// ---------------------------------------------------------------------------

/// Where a running content server can be reached, and what it serves.
#[derive(Debug, Clone)]
pub struct ServerHandle {
    /// OS process id of the server (absent when the server is not ours).
    pub pid: Option<u32>,
    /// Host to connect to.
    pub host: String,
    /// Port the server was bound to.
    pub port: u16,
    /// The archive the server was started with.
    pub archive: ArchiveReference,
}

impl ServerHandle {
    /// `http://<host>:<port>/`
    pub fn base_url(&self) -> Result<Url> {
        Url::parse(&format!("http://{}:{}/", self.host, self.port)).map_err(|e| {
            ZimportError::config(format!("invalid server address {}:{}: {e}", self.host, self.port))
        })
    }

    /// URL of a page, with `page_name` encoded as a single path segment.
    pub fn page_url(&self, page_name: &str) -> Result<Url> {
        let mut url = self.base_url()?;
        url.path_segments_mut()
            .map_err(|_| ZimportError::config("server URL cannot carry a path"))?
            .pop_if_empty()
            .push(page_name);
        Ok(url)
    }
}

// ---------------------------------------------------------------------------
// RetrievedDocument
// ---------------------------------------------------------------------------

/// Raw markup returned by the content server for one page.
#[derive(Debug, Clone)]
pub struct RetrievedDocument {
    /// Response body, verbatim.
    pub markup: String,
    /// Logical name of the archive the page came from.
    pub source: String,
    /// The URL that was requested.
    pub url: String,
    /// HTTP status code of the response.
    pub status_code: u16,
    /// SHA-256 hash of the markup (hex).
    pub content_hash: String,
}

impl RetrievedDocument {
    pub fn new(
        markup: String,
        source: impl Into<String>,
        url: impl Into<String>,
        status_code: u16,
    ) -> Self {
        let content_hash = {
            let mut hasher = Sha256::new();
            hasher.update(markup.as_bytes());
            format!("{:x}", hasher.finalize())
        };

        Self {
            markup,
            source: source.into(),
            url: url.into(),
            status_code,
            content_hash,
        }
    }
}

// ---------------------------------------------------------------------------
// ArticleRecord
// ---------------------------------------------------------------------------

/// One logical article pulled out of a rendered page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleRecord {
    /// Plain-text title, trimmed, never empty.
    pub title: String,
    /// Inner markup of the content region, trimmed, tags kept.
    pub content: String,
}

impl ArticleRecord {
    /// Build a record from raw title/content text. Returns `None` when the title is blank.
    pub fn new(title: &str, content: &str) -> Option<Self> {
        let title = title.trim();
        if title.is_empty() {
            return None;
        }
        Some(Self {
            title: title.to_string(),
            content: content.trim().to_string(),
        })
    }
}
