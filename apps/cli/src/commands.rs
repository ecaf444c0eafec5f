//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::Result;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;
use zimport_core::{
    ExportOutcome, ExportPipeline, ExportStatus, PipelineState, ProgressReporter, convert_html_file,
};
use zimport_shared::{AppConfig, ServerHandle, init_config, load_config, load_config_from};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// zimport: turn an offline ZIM archive into a MediaWiki import dump.
#[derive(Parser)]
#[command(
    name = "zimport",
    version,
    about = "Export the articles of a ZIM archive as a MediaWiki XML dump.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file to use instead of ~/.zimport/zimport.toml.
    #[arg(long, global = true, env = "ZIMPORT_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Serve an archive, fetch its root page and write the export files.
    Export {
        /// Path to the .zim archive.
        archive: PathBuf,

        /// Output directory (created if absent).
        #[arg(short, long, default_value = ".")]
        out: PathBuf,

        /// Port for the content server (overrides config).
        #[arg(short, long)]
        port: Option<u16>,

        /// Path to the kiwix-serve executable (overrides config).
        #[arg(long)]
        server_bin: Option<PathBuf>,

        /// Print the run summary as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Convert a previously saved articles.html into a dump without a server.
    Convert {
        /// Saved page to convert.
        html: PathBuf,

        /// Output directory (created if absent).
        #[arg(short, long, default_value = ".")]
        out: PathBuf,

        /// Print the run summary as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "zimport=info",
        1 => "zimport=debug",
        _ => "zimport=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config;
    match cli.command {
        Command::Export {
            archive,
            out,
            port,
            server_bin,
            json,
        } => {
            let mut config = resolve_config(config_path.as_deref())?;
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(bin) = server_bin {
                config.server.binary = Some(bin);
            }
            cmd_export(config, archive, out, json).await
        }
        Command::Convert { html, out, json } => {
            let config = resolve_config(config_path.as_deref())?;
            cmd_convert(&config, &html, &out, json)
        }
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(config_path.as_deref()),
        },
    }
}

fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(p) => load_config_from(p)?,
        None => load_config()?,
    };
    Ok(config)
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_export(config: AppConfig, archive: PathBuf, out: PathBuf, json: bool) -> Result<()> {
    info!(
        archive = %archive.display(),
        out = %out.display(),
        port = config.server.port,
        "exporting archive"
    );

    let pipeline = Arc::new(ExportPipeline::new(config));
    let reporter = Arc::new(CliProgress::new(!json));

    let outcome = pipeline
        .spawn(archive, out, reporter.clone())
        .await?;
    reporter.clear();

    print_outcome(&outcome?, json)
}

fn cmd_convert(config: &AppConfig, html: &Path, out: &Path, json: bool) -> Result<()> {
    info!(html = %html.display(), out = %out.display(), "converting saved page");
    let outcome = convert_html_file(html, out, config)?;
    print_outcome(&outcome, json)
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(path: Option<&Path>) -> Result<()> {
    let config = resolve_config(path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

fn print_outcome(outcome: &ExportOutcome, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(outcome)?);
        return Ok(());
    }

    println!();
    match outcome.status {
        ExportStatus::Complete => println!("  Export complete!"),
        ExportStatus::Empty => println!("  Export complete, but no articles were found."),
    }
    println!("  Run:      {}", outcome.run_id);
    println!("  Source:   {}", outcome.source);
    println!("  Articles: {}", outcome.article_count);
    println!("  HTML:     {}", outcome.html_path.display());
    println!("  Dump:     {}", outcome.dump_path.display());
    println!("  Time:     {:.1}s", outcome.elapsed().as_secs_f64());
    println!();

    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new(visible: bool) -> Self {
        if !visible {
            return Self {
                spinner: ProgressBar::hidden(),
            };
        }

        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg} [{elapsed}]")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }

    fn clear(&self) {
        if !self.spinner.is_finished() {
            self.spinner.finish_and_clear();
        }
    }
}

impl ProgressReporter for CliProgress {
    fn state(&self, state: &PipelineState) {
        if state.is_terminal() {
            self.clear();
        } else {
            self.spinner.set_message(capitalize(&state.to_string()));
        }
    }

    fn session_started(&self, handle: &ServerHandle) {
        let pid = handle.pid.map(|p| p.to_string()).unwrap_or_else(|| "?".into());
        self.spinner.set_message(format!(
            "Waiting for content server (pid {pid}) on port {}",
            handle.port
        ));
    }

    fn done(&self, _outcome: &ExportOutcome) {
        self.clear();
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
