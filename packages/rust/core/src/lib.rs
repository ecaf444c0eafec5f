//! Pipeline orchestration for zimport.
//!
//! Ties the content server, page fetcher, article extractor and export
//! writer into one run: archive in, `articles.html` and
//! `mediawiki_dump.xml` out.

pub mod convert;
pub mod pipeline;
pub mod progress;
pub mod state;

pub use convert::convert_html_file;
pub use pipeline::{DUMP_FILE_NAME, ExportOutcome, ExportPipeline, ExportStatus, HTML_FILE_NAME};
pub use progress::{ProgressReporter, SilentProgress};
pub use state::PipelineState;
