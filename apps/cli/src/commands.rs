//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Report, Result, WrapErr, eyre};
use grantscout_core::{
    Pipeline, PipelineDeps, ProgressReporter, RunSummary, SkippedItem, TokioClock,
};
use grantscout_inference::OpenRouterClient;
use grantscout_pages::HttpPageFetcher;
use grantscout_retrieval::{HttpFeedReader, Retriever, RetrieverSettings, build_providers};
use grantscout_shared::{
    AppConfig, GrantScoutError, PipelineConfig, ProjectBrief, init_config, load_config,
    resolve_credentials,
};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// GrantScout: find funding opportunities for a project.
#[derive(Parser)]
#[command(
    name = "grantscout",
    version,
    about = "Discover and enrich grant and funding opportunities for a project.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

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
    /// Discover, checkpoint, enrich, and write the final results.
    Full {
        #[command(flatten)]
        brief: BriefArgs,

        /// Checkpoint file (defaults to output.checkpoint_file).
        #[arg(long)]
        checkpoint: Option<PathBuf>,

        /// Final output file (defaults to output.final_file).
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Discover opportunities and write the checkpoint only.
    DiscoveryOnly {
        #[command(flatten)]
        brief: BriefArgs,

        /// Checkpoint file (defaults to output.checkpoint_file).
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Enrich a previously written checkpoint.
    EnrichOnly {
        /// Checkpoint JSON file to enrich.
        input: PathBuf,

        /// Final output file (defaults to output.final_file).
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Where the project brief comes from.
#[derive(Args, Debug)]
pub(crate) struct BriefArgs {
    /// Project brief file (JSON, or TOML by extension).
    #[arg(long, conflicts_with_all = ["title", "description", "keywords"])]
    pub project: Option<PathBuf>,

    /// Project title.
    #[arg(long, required_unless_present = "project")]
    pub title: Option<String>,

    /// Project description.
    #[arg(long, required_unless_present = "project")]
    pub description: Option<String>,

    /// Keyword (repeatable).
    #[arg(long = "keyword")]
    pub keywords: Vec<String>,
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

/// An input file named on the command line does not exist.
#[derive(Debug, thiserror::Error)]
#[error("input file not found: {}", .0.display())]
pub(crate) struct InputMissing(pub PathBuf);

/// Process exit code for a failed run.
///
/// `2` input file missing, `3` configuration error, `1` anything else.
pub(crate) fn exit_code(report: &Report) -> u8 {
    if report.downcast_ref::<InputMissing>().is_some() {
        return 2;
    }
    match report.downcast_ref::<GrantScoutError>() {
        Some(e) if e.is_config() => 3,
        _ => 1,
    }
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "grantscout=info",
        1 => "grantscout=debug",
        _ => "grantscout=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

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
    match cli.command {
        Command::Full {
            brief,
            checkpoint,
            out,
        } => cmd_full(&brief, checkpoint, out).await,
        Command::DiscoveryOnly { brief, out } => cmd_discovery_only(&brief, out).await,
        Command::EnrichOnly { input, out } => cmd_enrich_only(&input, out).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

async fn cmd_full(args: &BriefArgs, checkpoint: Option<PathBuf>, out: Option<PathBuf>) -> Result<()> {
    let brief = load_brief(args)?;
    let config = load_config()?;
    let checkpoint = checkpoint.unwrap_or_else(|| PathBuf::from(&config.output.checkpoint_file));
    let output = out.unwrap_or_else(|| PathBuf::from(&config.output.final_file));
    let pipeline = build_pipeline(&config)?;

    info!(title = %brief.title, checkpoint = %checkpoint.display(), output = %output.display(), "starting full run");

    let reporter = CliProgress::new();
    let summary = pipeline
        .run_full(&brief, &checkpoint, &output, &reporter)
        .await?;

    print_summary("Funding search complete!", &summary);
    Ok(())
}

async fn cmd_discovery_only(args: &BriefArgs, out: Option<PathBuf>) -> Result<()> {
    let brief = load_brief(args)?;
    let config = load_config()?;
    let checkpoint = out.unwrap_or_else(|| PathBuf::from(&config.output.checkpoint_file));
    let pipeline = build_pipeline(&config)?;

    info!(title = %brief.title, checkpoint = %checkpoint.display(), "starting discovery");

    let reporter = CliProgress::new();
    let summary = pipeline
        .run_discovery(&brief, &checkpoint, &reporter)
        .await?;

    print_summary("Discovery complete!", &summary);
    Ok(())
}

async fn cmd_enrich_only(input: &Path, out: Option<PathBuf>) -> Result<()> {
    if !input.exists() {
        return Err(InputMissing(input.to_path_buf()).into());
    }
    let config = load_config()?;
    let output = out.unwrap_or_else(|| PathBuf::from(&config.output.final_file));
    let pipeline = build_pipeline(&config)?;

    info!(input = %input.display(), output = %output.display(), "starting enrichment");

    let reporter = CliProgress::new();
    let summary = pipeline
        .run_enrich_only(input, &output, &reporter)
        .await?;

    print_summary("Enrichment complete!", &summary);
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

/// Resolve credentials and build every collaborator the pipeline needs.
fn build_pipeline(config: &AppConfig) -> Result<Pipeline> {
    let credentials = resolve_credentials(config)?;
    let pipeline_config = PipelineConfig::from(config);
    let fetch_timeout = Duration::from_secs(config.search.attempt_timeout_secs);

    let inference = OpenRouterClient::from_config(&config.llm, &credentials.llm_api_key)?;
    let providers = build_providers(&config.search, &credentials)?;
    let fallback_search = providers.first().cloned();
    let feeds = HttpFeedReader::new(fetch_timeout)?;
    let pages = HttpPageFetcher::new(fetch_timeout)?;

    info!(
        providers = providers.len(),
        feeds = pipeline_config.feed_urls.len(),
        "collaborators ready"
    );

    let retriever = Retriever::new(
        providers,
        Arc::new(feeds),
        RetrieverSettings::from(&pipeline_config),
    );

    Ok(Pipeline::new(
        pipeline_config,
        PipelineDeps {
            inference: Arc::new(inference),
            retriever,
            pages: Arc::new(pages),
            fallback_search,
            clock: Arc::new(TokioClock),
        },
    ))
}

/// Build the project brief from `--project` or from the inline flags.
fn load_brief(args: &BriefArgs) -> Result<ProjectBrief> {
    if let Some(path) = &args.project {
        return read_brief_file(path);
    }

    let (Some(title), Some(description)) = (&args.title, &args.description) else {
        return Err(eyre!("provide --project <file> or both --title and --description"));
    };
    Ok(ProjectBrief {
        title: title.clone(),
        description: description.clone(),
        keywords: args.keywords.clone(),
    })
}

fn read_brief_file(path: &Path) -> Result<ProjectBrief> {
    if !path.exists() {
        return Err(InputMissing(path.to_path_buf()).into());
    }
    let content = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("failed to read {}", path.display()))?;

    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let brief = if is_toml {
        toml::from_str(&content).wrap_err_with(|| format!("invalid project file {}", path.display()))?
    } else {
        serde_json::from_str(&content)
            .wrap_err_with(|| format!("invalid project file {}", path.display()))?
    };
    Ok(brief)
}

fn print_summary(banner: &str, summary: &RunSummary) {
    println!();
    println!("  {banner}");
    println!("  Queries:    {}", summary.queries);
    println!("  Candidates: {}", summary.candidates);
    println!("  Relevant:   {}", summary.relevant);
    println!("  Extracted:  {}", summary.extracted);
    println!("  Enriched:   {}", summary.enriched);
    if summary.skipped.is_empty() {
        println!("  Skipped:    0");
    } else {
        let reasons: Vec<String> = summary
            .skip_counts()
            .iter()
            .map(|(reason, n)| format!("{reason}={n}"))
            .collect();
        println!("  Skipped:    {} ({})", summary.skipped.len(), reasons.join(", "));
    }
    if let Some(path) = &summary.checkpoint_path {
        println!("  Checkpoint: {}", path.display());
    }
    if let Some(path) = &summary.output_path {
        println!("  Output:     {}", path.display());
    }
    println!("  Time:       {:.1}s", summary.elapsed.as_secs_f64());
    println!();
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
    phase: Mutex<String>,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(Duration::from_millis(80));
        Self {
            spinner,
            phase: Mutex::new(String::new()),
        }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        if let Ok(mut phase) = self.phase.lock() {
            *phase = name.to_string();
        }
        self.spinner.set_message(name.to_string());
    }

    fn item(&self, current: usize, total: usize, label: &str) {
        let phase = self.phase.lock().map(|p| p.clone()).unwrap_or_default();
        self.spinner
            .set_message(format!("{phase} {current}/{total}: {label}"));
    }

    fn item_skipped(&self, skip: &SkippedItem) {
        self.spinner.println(format!(
            "  skipped {} ({}): {}",
            skip.label, skip.reason, skip.detail
        ));
    }

    fn done(&self, _summary: &RunSummary) {
        self.spinner.finish_and_clear();
    }
}
