//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use newsletter_completion::{CompletionClient, OpenRouterClient};
use newsletter_core::{Pipeline, ProgressReporter, PromptSet, RunReport};
use newsletter_delivery::{Deliverer, DryRunDeliverer, SmtpDeliverer};
use newsletter_search::{SearchClient, TavilyClient};
use newsletter_shared::{
    AppConfig, PipelineConfig, RunState, init_config, load_config, load_config_from,
    validate_api_keys, validate_delivery,
};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Newsletter agent: research the week's AI news and mail out an issue.
#[derive(Parser)]
#[command(
    name = "newsletter",
    version,
    about = "Research, write, edit and send one AI newsletter issue.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file to use instead of ~/.newsletter/newsletter.toml.
    #[arg(long, global = true, env = "NEWSLETTER_CONFIG")]
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
    /// Produce one newsletter issue.
    Run(RunArgs),

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Flags for `newsletter run`; each overrides the matching `[pipeline]` key.
#[derive(Args, Debug, Default)]
pub(crate) struct RunArgs {
    /// Log the email instead of sending it.
    #[arg(long)]
    pub dry_run: bool,

    /// Query for the initial news search.
    #[arg(long)]
    pub seed_query: Option<String>,

    /// Maximum sections drafted at once.
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Stop drafting as soon as one section fails.
    #[arg(long)]
    pub fail_fast: bool,

    /// Also write the final newsletter HTML to this file.
    #[arg(short, long)]
    pub output: Option<PathBuf>,
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
        0 => "newsletter=info",
        1 => "newsletter=debug",
        _ => "newsletter=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt().with_env_filter(env_filter).with_target(false).init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };

    match cli.command {
        Command::Run(args) => cmd_run(&config, &args).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(&config).await,
        },
    }
}

/// Merge `run` flags over the `[pipeline]` section.
fn pipeline_config(config: &AppConfig, args: &RunArgs) -> PipelineConfig {
    let mut pipeline = PipelineConfig::from(config);
    if let Some(query) = &args.seed_query {
        pipeline.seed_query = query.clone();
    }
    if let Some(n) = args.concurrency {
        pipeline.max_concurrency = Some(n);
    }
    if args.fail_fast {
        pipeline.fail_fast = true;
    }
    pipeline
}

async fn cmd_run(config: &AppConfig, args: &RunArgs) -> Result<()> {
    validate_api_keys(config)?;
    if !args.dry_run {
        validate_delivery(config)?;
    }

    let search: Arc<dyn SearchClient> = Arc::new(TavilyClient::from_settings(&config.search)?);
    let completion = OpenRouterClient::from_settings(&config.completion)?;
    let model = completion.model().to_string();
    let completion: Arc<dyn CompletionClient> = Arc::new(completion);
    let deliverer: Arc<dyn Deliverer> = if args.dry_run {
        Arc::new(DryRunDeliverer::new())
    } else {
        Arc::new(SmtpDeliverer::from_settings(&config.delivery)?)
    };
    let prompts = PromptSet::load(config.prompts.dir.as_deref())?;

    let pipeline_config = pipeline_config(config, args);
    info!(
        seed_query = %pipeline_config.seed_query,
        %model,
        dry_run = args.dry_run,
        fail_fast = pipeline_config.fail_fast,
        "starting newsletter run"
    );

    let pipeline = Pipeline::new(search, completion, deliverer, prompts, pipeline_config);
    let reporter = CliProgress::new();

    // Dropping the run future on Ctrl-C aborts every in-flight drafting unit.
    let report = tokio::select! {
        result = pipeline.run_once(&reporter) => result?,
        _ = tokio::signal::ctrl_c() => {
            reporter.spinner.abandon_with_message("Cancelled");
            warn!("run cancelled by user");
            return Err(eyre!("newsletter run cancelled"));
        }
    };

    if let Some(path) = &args.output {
        std::fs::write(path, &report.newsletter.body)
            .wrap_err_with(|| format!("failed to write newsletter to {}", path.display()))?;
    }

    print_summary(&report, args);
    Ok(())
}

fn print_summary(report: &RunReport, args: &RunArgs) {
    println!();
    println!("  Newsletter complete!");
    println!("  Run:      {}", report.run_id);
    println!("  Title:    {}", report.newsletter.title);
    println!("  Sections: {}", report.plan.topics.len());
    for topic in &report.plan.topics {
        println!("            - {topic}");
    }
    if args.dry_run {
        println!("  Delivery: dry run (not sent)");
    }
    if let Some(path) = &args.output {
        println!("  Output:   {}", path.display());
    }
    println!("  Time:     {:.1}s", report.elapsed.as_secs_f64());
    println!();
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .map(|s| s.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]))
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn state(&self, state: &RunState) {
        match state {
            RunState::Idle => {}
            RunState::Searching => self.spinner.set_message("Searching for news"),
            RunState::Planning => self.spinner.set_message("Planning topics"),
            RunState::Drafting { topics } => {
                self.spinner.set_message(format!("Drafting [0/{topics}] sections"))
            }
            RunState::Editing => self.spinner.set_message("Editing newsletter"),
            RunState::Done => self.spinner.finish_and_clear(),
            RunState::Failed { stage, .. } => self
                .spinner
                .abandon_with_message(format!("Failed during {stage}")),
        }
    }

    fn section_drafted(&self, topic: &str, done: usize, total: usize) {
        self.spinner
            .set_message(format!("Drafting [{done}/{total}] {topic}"));
    }

    fn done(&self, _report: &RunReport) {
        self.spinner.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// Config commands
// ---------------------------------------------------------------------------

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(config: &AppConfig) -> Result<()> {
    let toml_str = toml::to_string_pretty(config)?;
    println!("{toml_str}");
    Ok(())
}
