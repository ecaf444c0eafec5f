//! End-to-end `export` pipeline: archive → content server → fetch → extract → dump.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use zimport_export::ExportWriter;
use zimport_extract::ArticleExtractor;
use zimport_kiwix::{ContentFetcher, ServerSession};
use zimport_shared::{AppConfig, ArchiveReference, Result, RunId, ZimportError, write_atomic};

use crate::progress::ProgressReporter;
use crate::state::PipelineState;

/// Retrieved page markup, written verbatim.
pub const HTML_FILE_NAME: &str = "articles.html";

/// MediaWiki export document.
pub const DUMP_FILE_NAME: &str = "mediawiki_dump.xml";

/// Whether a successful run produced any pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportStatus {
    Complete,
    /// No article containers were found; the dump holds only `<siteinfo>`.
    Empty,
}

impl ExportStatus {
    pub(crate) fn for_count(articles: usize) -> Self {
        if articles == 0 { Self::Empty } else { Self::Complete }
    }
}

/// Summary of a successful run.
#[derive(Debug, Clone, Serialize)]
pub struct ExportOutcome {
    pub run_id: RunId,
    /// Logical name of the exported archive (or the converted file's stem).
    pub source: String,
    pub output_dir: PathBuf,
    pub html_path: PathBuf,
    pub dump_path: PathBuf,
    pub article_count: usize,
    pub status: ExportStatus,
    /// SHA-256 of the page markup the articles were extracted from.
    pub content_hash: String,
    pub elapsed_ms: u64,
}

impl ExportOutcome {
    pub fn elapsed(&self) -> Duration {
        Duration::from_millis(self.elapsed_ms)
    }
}

/// Runs exports one at a time with a fixed configuration.
#[derive(Debug)]
pub struct ExportPipeline {
    config: AppConfig,
    running: AtomicBool,
}

impl ExportPipeline {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            running: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Whether a run is currently in flight.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Run the pipeline on a detached task.
    pub fn spawn(
        self: Arc<Self>,
        archive_path: PathBuf,
        output_dir: PathBuf,
        progress: Arc<dyn ProgressReporter>,
    ) -> JoinHandle<Result<ExportOutcome>> {
        tokio::spawn(async move { self.run(&archive_path, &output_dir, progress.as_ref()).await })
    }

    /// Run the full export.
    ///
    /// 1. Validate the archive path
    /// 2. Start the content server and wait for it to answer
    /// 3. Fetch the archive's root page
    /// 4. Extract articles
    /// 5. Write `articles.html` and `mediawiki_dump.xml`
    ///
    /// The content server is stopped before this returns, whatever the outcome.
    /// A second call while a run is in flight fails with [`ZimportError::Busy`].
    #[instrument(skip_all, fields(archive = %archive_path.display(), out = %output_dir.display()))]
    pub async fn run(
        &self,
        archive_path: &Path,
        output_dir: &Path,
        progress: &dyn ProgressReporter,
    ) -> Result<ExportOutcome> {
        let _guard = RunGuard::acquire(&self.running)?;

        let start = Instant::now();
        let run_id = RunId::new();
        let mut tracker = StateTracker::new(progress);

        info!(%run_id, "starting export pipeline");

        let result = self
            .execute(&run_id, archive_path, output_dir, start, &mut tracker)
            .await;

        match &result {
            Ok(outcome) => {
                tracker.advance(PipelineState::Done);
                progress.done(outcome);
                info!(
                    %run_id,
                    articles = outcome.article_count,
                    status = ?outcome.status,
                    elapsed_ms = outcome.elapsed_ms,
                    "export pipeline complete"
                );
            }
            Err(e) => {
                tracker.advance(PipelineState::Failed(e.to_string()));
                error!(%run_id, kind = e.kind(), error = %e, "export pipeline failed");
            }
        }

        result
    }

    async fn execute(
        &self,
        run_id: &RunId,
        archive_path: &Path,
        output_dir: &Path,
        start: Instant,
        tracker: &mut StateTracker<'_>,
    ) -> Result<ExportOutcome> {
        let archive = ArchiveReference::from_path(archive_path)?;

        // Everything that can fail on config alone fails before launch
        let fetcher = ContentFetcher::new(&self.config.fetch)?;
        let extractor = ArticleExtractor::new(&self.config.extract)?;
        let writer = ExportWriter::new(self.config.site.clone(), self.config.revision.clone());

        tracker.advance(PipelineState::SessionStarting);
        let mut session = ServerSession::start(&archive, &self.config.server).await?;
        tracker.progress.session_started(session.handle());

        let stages = Stages {
            fetcher: &fetcher,
            extractor: &extractor,
            writer: &writer,
            archive: &archive,
            output_dir,
        };
        let result = stages.run(&mut session, &self.config, tracker).await;

        session.stop().await;

        let (article_count, content_hash) = result?;

        Ok(ExportOutcome {
            run_id: run_id.clone(),
            source: archive.name().to_string(),
            output_dir: output_dir.to_path_buf(),
            html_path: output_dir.join(HTML_FILE_NAME),
            dump_path: output_dir.join(DUMP_FILE_NAME),
            article_count,
            status: ExportStatus::for_count(article_count),
            content_hash,
            elapsed_ms: start.elapsed().as_millis() as u64,
        })
    }
}

// ---------------------------------------------------------------------------
// Stages run while the content server is up
// ---------------------------------------------------------------------------

struct Stages<'a> {
    fetcher: &'a ContentFetcher,
    extractor: &'a ArticleExtractor,
    writer: &'a ExportWriter,
    archive: &'a ArchiveReference,
    output_dir: &'a Path,
}

impl Stages<'_> {
    /// Returns the article count and the content hash of the fetched page.
    async fn run(
        &self,
        session: &mut ServerSession,
        config: &AppConfig,
        tracker: &mut StateTracker<'_>,
    ) -> Result<(usize, String)> {
        session.wait_until_ready(config.server.startup_timeout()).await?;
        tracker.advance(PipelineState::Ready);

        tracker.advance(PipelineState::Fetching);
        let document = self.fetcher.fetch(session.handle(), self.archive.name()).await?;
        // A page is only trusted if our own server was still the one serving it
        session.ensure_alive().await?;

        tracker.advance(PipelineState::Extracting);
        let records = self.extractor.extract(&document);
        if records.is_empty() {
            warn!(source = %document.source, "no articles extracted");
        }

        tracker.advance(PipelineState::Writing);
        ensure_output_dir(self.output_dir)?;
        write_atomic(&self.output_dir.join(HTML_FILE_NAME), document.markup.as_bytes())?;
        self.writer
            .write(&records, &self.output_dir.join(DUMP_FILE_NAME))?;

        Ok((records.len(), document.content_hash))
    }
}

/// Create the output directory (and parents) if it does not exist.
pub(crate) fn ensure_output_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir).map_err(|e| ZimportError::io(dir, e))
}

// ---------------------------------------------------------------------------
// Run guard and state tracking
// ---------------------------------------------------------------------------

/// Holds the pipeline's `running` flag for the duration of one run.
struct RunGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> RunGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| ZimportError::Busy)?;
        Ok(Self { flag })
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

struct StateTracker<'a> {
    current: PipelineState,
    progress: &'a dyn ProgressReporter,
}

impl<'a> StateTracker<'a> {
    fn new(progress: &'a dyn ProgressReporter) -> Self {
        Self {
            current: PipelineState::Idle,
            progress,
        }
    }

    fn advance(&mut self, next: PipelineState) {
        if !self.current.can_transition_to(&next) {
            warn!(from = ?self.current, to = ?next, "ignoring invalid state transition");
            return;
        }
        debug!(from = ?self.current, to = ?next, "state transition");
        self.progress.state(&next);
        self.current = next;
    }
}
