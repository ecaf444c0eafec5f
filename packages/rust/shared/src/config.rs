//! Application configuration for zimport.
//!
//! User config lives at `~/.zimport/zimport.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ZimportError};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "zimport.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".zimport";

/// Directory (next to the executable) holding the bundled content server.
const SERVER_BIN_DIR: &str = "ExtBin";

/// File stem of the bundled content server.
const SERVER_BIN_NAME: &str = "kiwix-serve";

// ---------------------------------------------------------------------------
// Config structs (matching zimport.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Content server process settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Page retrieval settings.
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Article extraction selectors.
    #[serde(default)]
    pub extract: ExtractConfig,

    /// `<siteinfo>` block of the export document.
    #[serde(default)]
    pub site: SiteConfig,

    /// Fixed revision metadata written for every page.
    #[serde(default)]
    pub revision: RevisionConfig,
}

/// `[server]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Path to the `kiwix-serve` executable. Defaults to `<exe dir>/ExtBin/kiwix-serve`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binary: Option<PathBuf>,

    /// Host the fetcher and readiness probe connect to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port passed to the server as `--port=<port>`.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Upper bound on the readiness wait.
    #[serde(default = "default_startup_timeout_ms")]
    pub startup_timeout_ms: u64,

    /// Delay between readiness probes.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            binary: None,
            host: default_host(),
            port: default_port(),
            startup_timeout_ms: default_startup_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl ServerConfig {
    /// The configured binary, or the bundled default location.
    pub fn binary_path(&self) -> PathBuf {
        self.binary.clone().unwrap_or_else(default_server_binary)
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_millis(self.startup_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

fn default_host() -> String {
    "localhost".into()
}
fn default_port() -> u16 {
    8080
}
fn default_startup_timeout_ms() -> u64 {
    10_000
}
fn default_poll_interval_ms() -> u64 {
    100
}

/// `[fetch]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Per-request timeout.
    #[serde(default = "default_fetch_timeout_secs")]
    pub timeout_secs: u64,

    /// Extra attempts after a transport error or 5xx. Zero disables retries.
    #[serde(default)]
    pub max_retries: u32,

    /// Fixed delay between retry attempts.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_fetch_timeout_secs(),
            max_retries: 0,
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

fn default_fetch_timeout_secs() -> u64 {
    30
}
fn default_retry_backoff_ms() -> u64 {
    500
}

/// `[extract]` section: CSS selectors locating articles in rendered pages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractConfig {
    /// One match per logical article.
    #[serde(default = "default_container_selector")]
    pub container: String,

    /// Title node, searched inside the container.
    #[serde(default = "default_title_selector")]
    pub title: String,

    /// Primary content region, searched inside the container.
    #[serde(default = "default_content_selector")]
    pub content: String,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            container: default_container_selector(),
            title: default_title_selector(),
            content: default_content_selector(),
        }
    }
}

fn default_container_selector() -> String {
    "div#bodyContent".into()
}
fn default_title_selector() -> String {
    "h1".into()
}
fn default_content_selector() -> String {
    "div#content".into()
}

/// `[site]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteConfig {
    #[serde(default = "default_sitename")]
    pub sitename: String,
    #[serde(default = "default_dbname")]
    pub dbname: String,
    #[serde(default = "default_base")]
    pub base: String,
    #[serde(default = "default_generator")]
    pub generator: String,
    /// Title-casing policy, also applied to every namespace entry.
    #[serde(default = "default_case")]
    pub case: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            sitename: default_sitename(),
            dbname: default_dbname(),
            base: default_base(),
            generator: default_generator(),
            case: default_case(),
        }
    }
}

fn default_sitename() -> String {
    "My Wiki".into()
}
fn default_dbname() -> String {
    "my_wiki".into()
}
fn default_base() -> String {
    "http://mywiki.example/Main_Page".into()
}
fn default_generator() -> String {
    "MediaWiki 1.35.0".into()
}
fn default_case() -> String {
    "first-letter".into()
}

/// `[revision]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionConfig {
    #[serde(default = "default_contributor_name")]
    pub contributor_name: String,
    #[serde(default = "default_contributor_id")]
    pub contributor_id: u64,
    #[serde(default = "default_comment")]
    pub comment: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_format")]
    pub format: String,
}

impl Default for RevisionConfig {
    fn default() -> Self {
        Self {
            contributor_name: default_contributor_name(),
            contributor_id: default_contributor_id(),
            comment: default_comment(),
            model: default_model(),
            format: default_format(),
        }
    }
}

fn default_contributor_name() -> String {
    "Admin".into()
}
fn default_contributor_id() -> u64 {
    1
}
fn default_comment() -> String {
    "Initial import".into()
}
fn default_model() -> String {
    "wikitext".into()
}
fn default_format() -> String {
    "text/x-wiki".into()
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Location of the bundled content server: `<exe dir>/ExtBin/kiwix-serve[.exe]`.
///
/// Falls back to a path relative to the working directory when the executable
/// location cannot be determined.
pub fn default_server_binary() -> PathBuf {
    let base = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_default();
    base.join(SERVER_BIN_DIR)
        .join(format!("{SERVER_BIN_NAME}{}", std::env::consts::EXE_SUFFIX))
}

/// Get the path to the config directory (`~/.zimport/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| ZimportError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.zimport/zimport.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| ZimportError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| ZimportError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| ZimportError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let content = toml::to_string_pretty(&AppConfig::default())
        .map_err(|e| ZimportError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| ZimportError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
