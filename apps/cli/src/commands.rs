//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use pitchmatch_core::ingest::{self, IngestOptions};
use pitchmatch_core::interview::{self, StructuredInterview};
use pitchmatch_core::search::validate_product_name;
use pitchmatch_core::{ClientSearch, Gateways, ProgressReporter, Provisioner};
use pitchmatch_gateways::EmbeddingGateway as _;
use pitchmatch_shared::{
    AppConfig, ClientSearchRequest, EnrichedResult, SlideText, init_config, load_config,
    load_config_from,
};
use pitchmatch_transcript::{NormalizeOptions, RoleMarkers, normalize};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// pitchmatch: find people who have the problem your product solves.
#[derive(Parser)]
#[command(
    name = "pitchmatch",
    version,
    about = "Match a founder interview against collected problem posts and draft outreach messages.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file to use instead of ~/.pitchmatch/pitchmatch.toml.
    #[arg(long, global = true)]
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

/// Conversation inputs shared by `search` and `provision`.
#[derive(Args)]
pub(crate) struct ConversationArgs {
    /// Product name (also names the client collection when persisting).
    #[arg(short, long)]
    pub product: Option<String>,

    /// File holding the AI/Founder transcript.
    #[arg(short, long)]
    pub transcript: Option<PathBuf>,

    /// Short statement of the problem the product solves.
    #[arg(long)]
    pub problem_hint: Option<String>,

    /// Short statement of the product's solution.
    #[arg(long)]
    pub solution_hint: Option<String>,

    /// JSON file with slide pages: [{"pageNumber", "filename", "text"}, ...].
    #[arg(long)]
    pub slides: Option<PathBuf>,

    /// JSON request file in the HTTP request shape; replaces the flags above.
    #[arg(long, conflicts_with_all = ["product", "transcript", "problem_hint", "solution_hint", "slides"])]
    pub request: Option<PathBuf>,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Match a conversation against the problem collection.
    Search {
        #[command(flatten)]
        conversation: ConversationArgs,

        /// Number of matches to return (defaults to matching.result_limit).
        #[arg(short, long)]
        limit: Option<usize>,

        /// Also write the client facts to a collection named after the product.
        #[arg(long)]
        persist: bool,

        /// Treat the transcript as free-form speech and structure it first.
        #[arg(long)]
        structure: bool,

        /// Print results as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print the embedding of a text as JSON.
    Embed {
        /// Text to embed.
        text: String,
    },

    /// Load collected posts (JSON lines) into the problem collection.
    Ingest {
        /// Posts file, one JSON object per line.
        file: PathBuf,

        /// Drop and recreate the collection first.
        #[arg(long)]
        recreate: bool,

        /// Posts embedded per request.
        #[arg(long, default_value_t = ingest::DEFAULT_BATCH_SIZE)]
        batch_size: usize,
    },

    /// Write a conversation's facts to a collection named after the product.
    Provision {
        #[command(flatten)]
        conversation: ConversationArgs,
    },

    /// Turn a free-form voice transcript into problem, solution and dialogue.
    Structure {
        /// File holding the raw transcript.
        #[arg(short, long)]
        transcript: PathBuf,

        /// JSON file with slide pages used as supporting context.
        #[arg(long)]
        slides: Option<PathBuf>,
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
        0 => "pitchmatch=info",
        1 => "pitchmatch=debug",
        _ => "pitchmatch=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    // Logs go to stderr so JSON results on stdout stay pipeable.
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
        Command::Search {
            conversation,
            limit,
            persist,
            structure,
            json,
        } => {
            let config = config_at(config_path.as_deref())?;
            cmd_search(&config, conversation, limit, persist, structure, json).await
        }
        Command::Embed { text } => cmd_embed(&config_at(config_path.as_deref())?, &text).await,
        Command::Ingest {
            file,
            recreate,
            batch_size,
        } => cmd_ingest(&config_at(config_path.as_deref())?, &file, recreate, batch_size).await,
        Command::Provision { conversation } => {
            cmd_provision(&config_at(config_path.as_deref())?, conversation).await
        }
        Command::Structure { transcript, slides } => {
            cmd_structure(&config_at(config_path.as_deref())?, &transcript, slides.as_deref()).await
        }
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(config_path.as_deref()).await,
        },
    }
}

fn config_at(path: Option<&Path>) -> Result<AppConfig> {
    Ok(match path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    })
}

// ---------------------------------------------------------------------------
// Input helpers
// ---------------------------------------------------------------------------

fn read_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).wrap_err_with(|| format!("failed to read {}", path.display()))
}

fn read_slides(path: Option<&Path>) -> Result<Option<Vec<SlideText>>> {
    path.map(|p| {
        serde_json::from_str::<Vec<SlideText>>(&read_file(p)?)
            .wrap_err_with(|| format!("{} is not a slide page list", p.display()))
    })
    .transpose()
}

/// Build a request from flags or a request file.
fn build_request(args: ConversationArgs) -> Result<ClientSearchRequest> {
    if let Some(path) = &args.request {
        return serde_json::from_str(&read_file(path)?)
            .wrap_err_with(|| format!("{} is not a client search request", path.display()));
    }

    Ok(ClientSearchRequest {
        product_name: args.product.unwrap_or_default(),
        conversation_transcript: match &args.transcript {
            Some(path) => read_file(path)?,
            None => String::new(),
        },
        conversation_problem_hint: args.problem_hint,
        conversation_solution_hint: args.solution_hint,
        pdf_slides_text: read_slides(args.slides.as_deref())?,
    })
}

fn markers(config: &AppConfig) -> RoleMarkers {
    NormalizeOptions::from(&config.matching).markers
}

async fn structure_request(
    config: &AppConfig,
    request: ClientSearchRequest,
    progress: &CliProgress,
) -> Result<ClientSearchRequest> {
    progress.phase("Structuring interview");
    let generator = interview::structure_generator(config)?;
    info!(model = generator.chat_model(), "structuring interview");
    let slides = request.pdf_slides_text.clone().unwrap_or_default();
    let structured = interview::structure_interview(
        &generator,
        &request.conversation_transcript,
        &slides,
        &markers(config),
        config.matching.call_timeout(),
    )
    .await?;
    Ok(structured.into_request(request.product_name, request.pdf_slides_text))
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_search(
    config: &AppConfig,
    conversation: ConversationArgs,
    limit: Option<usize>,
    persist: bool,
    structure: bool,
    json: bool,
) -> Result<()> {
    let mut request = build_request(conversation)?;
    // Structuring calls the model, so reject a blank product name first.
    validate_product_name(&request.product_name)?;
    let gateways = Gateways::from_config(config)?;

    let mut service = ClientSearch::new(gateways, config);
    if persist {
        service = service.with_persist(true);
    }
    if let Some(limit) = limit {
        service = service.with_result_limit(limit);
    }

    info!(product = %request.product_name, structure, persist, "searching");
    let reporter = CliProgress::new();
    if structure {
        request = structure_request(config, request, &reporter).await?;
    }
    let results = service.search(&request, &reporter).await;
    reporter.finish();
    let results = results?;

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else {
        print_results(&results);
    }
    Ok(())
}

fn print_results(results: &[EnrichedResult]) {
    if results.is_empty() {
        println!("No matching problems found.");
        return;
    }
    println!();
    for (rank, result) in results.iter().enumerate() {
        let p = &result.problem;
        println!("  #{} [{:.3}] {}", rank + 1, p.similarity_score, p.title);
        println!("     r/{}  {}", p.subreddit, p.url);
        if let Some(summary) = &p.summary {
            println!("     Summary: {summary}");
        }
        match (&result.marketing, &result.error) {
            (Some(message), _) => println!("     Message: {message}"),
            (None, Some(error)) => println!("     (not enriched: {error})"),
            (None, None) => {}
        }
        println!();
    }
}

async fn cmd_embed(config: &AppConfig, text: &str) -> Result<()> {
    if text.trim().is_empty() {
        return Err(eyre!("nothing to embed"));
    }
    let gateways = Gateways::from_config(config)?;
    let embedding = gateways.embedder.embed(text).await?;
    println!("{}", serde_json::json!({ "embedding": embedding }));
    Ok(())
}

async fn cmd_ingest(config: &AppConfig, file: &Path, recreate: bool, batch_size: usize) -> Result<()> {
    let gateways = Gateways::from_config(config)?;
    let options = IngestOptions {
        recreate,
        batch_size,
        ..IngestOptions::from_config(config)
    };

    info!(file = %file.display(), collection = %options.collection, recreate, "ingesting posts");
    let reporter = CliProgress::new();
    let report = ingest::ingest_file(&gateways, file, &options, &reporter).await;
    reporter.finish();
    let report = report?;

    println!();
    println!("  Posts ingested into {}", options.collection);
    println!("  Read:         {}", report.read);
    println!("  Invalid:      {}", report.invalid);
    println!("  Filtered out: {}", report.filtered_out);
    println!("  Ingested:     {}", report.ingested);
    for (category, count) in &report.per_category {
        println!("    {category}: {count}");
    }
    println!("  Time:         {:.1}s", report.elapsed.as_secs_f64());
    println!();
    Ok(())
}

async fn cmd_provision(config: &AppConfig, conversation: ConversationArgs) -> Result<()> {
    let request = build_request(conversation)?;
    let facts = normalize(
        &request.conversation_transcript,
        request.conversation_problem_hint.as_deref(),
        request.conversation_solution_hint.as_deref(),
        request.pdf_slides_text.as_deref(),
        &NormalizeOptions::from(&config.matching),
    )?;

    let provisioner = Provisioner::new(Gateways::from_config(config)?, config);
    let report = provisioner
        .provision_client_collection(&request.product_name, &facts)
        .await?;

    println!(
        "Wrote {} fact(s) to collection {}",
        report.points, report.collection
    );
    Ok(())
}

async fn cmd_structure(config: &AppConfig, transcript: &Path, slides: Option<&Path>) -> Result<()> {
    let transcript = read_file(transcript)?;
    let slides = read_slides(slides)?.unwrap_or_default();
    let generator = interview::structure_generator(config)?;
    info!(model = generator.chat_model(), slides = slides.len(), "structuring interview");

    let structured: StructuredInterview = interview::structure_interview(
        &generator,
        &transcript,
        &slides,
        &markers(config),
        config.matching.call_timeout(),
    )
    .await?;
    println!("{}", serde_json::to_string_pretty(&structured)?);
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(path: Option<&Path>) -> Result<()> {
    let config = config_at(path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
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
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(Duration::from_millis(80));
        Self { spinner }
    }

    fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn candidate_enriched(&self, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Enriching matches [{current}/{total}]"));
    }

    fn batch_written(&self, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Embedding and writing posts [{current}/{total}]"));
    }

    fn done(&self, results: &[EnrichedResult]) {
        self.spinner
            .set_message(format!("Matched {} problem(s)", results.len()));
    }
}
