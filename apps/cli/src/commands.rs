//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use jbook_core::pipeline::{BATCH_STRUCTURED_EXTENSIONS, ProgressReporter};
use jbook_core::{
    BatchConfig, PipelineConfig, TagConfig, TaggingOptions, gather_files, load_definitions,
    resolve_llm_client, run_batch, run_pipeline, run_tagging,
};
use jbook_shared::{
    AppConfig, ProviderKind, config_file_path, init_config, load_config, load_env_file,
};
use jbook_storage::Storage;
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// jbook: J-Book budget fusion and relevance tagging.
#[derive(Parser)]
#[command(
    name = "jbook",
    version,
    about = "Fuse DoD J-Book budget tables with R-2 narratives and tag them for relevance.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Dotenv file to load (defaults to ./.env when present).
    #[arg(long, global = true, env = "JBOOK_ENV_FILE")]
    pub env_file: Option<PathBuf>,

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
    /// Fuse one J-Book PDF (and any extra tables) into an enriched CSV.
    Pipeline {
        /// J-Book PDF; optional when only Excel/XML inputs are given.
        #[arg(long)]
        pdf: Option<PathBuf>,

        /// Output CSV (defaults to <output_dir>/enriched.csv).
        #[arg(long)]
        out: Option<PathBuf>,

        /// Additional Excel/XML files to include.
        #[arg(long, num_args = 1..)]
        xlsx: Vec<PathBuf>,

        /// Directories scanned for .xlsx/.xlsm/.xml files.
        #[arg(long, num_args = 1..)]
        xlsx_dir: Vec<PathBuf>,

        /// Glob patterns for Excel/XML files (quote them).
        #[arg(long, num_args = 1..)]
        xlsx_glob: Vec<String>,

        /// Skip R-2 narrative extraction.
        #[arg(long)]
        skip_r2: bool,

        /// Fill missing narratives from the R-1D Description column.
        #[arg(long)]
        use_r1d_description: bool,
    },

    /// Fuse many Excel/XML files with narratives from many PDFs.
    Batch {
        /// Output CSV for the merged dataset.
        #[arg(long)]
        out: PathBuf,

        /// Directories containing .xlsx/.xlsm/.xml files.
        #[arg(long, num_args = 1..)]
        xlsx_dir: Vec<PathBuf>,

        /// Glob patterns for Excel/XML files.
        #[arg(long, num_args = 1..)]
        xlsx_glob: Vec<String>,

        /// Directories containing J-Book PDFs.
        #[arg(long, num_args = 1..)]
        pdf_dir: Vec<PathBuf>,

        /// Glob patterns for PDFs.
        #[arg(long, num_args = 1..)]
        pdf_glob: Vec<String>,

        /// Skip R-2 narrative extraction.
        #[arg(long)]
        skip_r2: bool,

        /// Fill missing narratives from the R-1D Description column.
        #[arg(long)]
        use_r1d_description: bool,
    },

    /// Attach relevance labels to an enriched CSV.
    Tag {
        /// Enriched CSV to tag.
        #[arg(long)]
        input: PathBuf,

        /// Tagged CSV to write.
        #[arg(long)]
        output: PathBuf,

        /// Technology keywords, e.g. C-UAS hypersonics (defaults from config).
        #[arg(long, num_args = 1..)]
        keywords: Vec<String>,

        /// JSON file of keyword definitions.
        #[arg(long)]
        definitions: Option<PathBuf>,

        /// Tagging provider: openai or rule-based.
        #[arg(long)]
        provider: Option<ProviderKind>,

        /// LLM model (defaults to llm.default_model).
        #[arg(long)]
        model: Option<String>,

        /// Parallel LLM requests.
        #[arg(long)]
        concurrency: Option<usize>,

        /// Bypass the tag cache.
        #[arg(long)]
        no_cache: bool,
    },

    /// List (or extract) files embedded in a J-Book PDF.
    Embeds {
        /// PDF to inspect.
        #[arg(long)]
        pdf: PathBuf,

        /// Write the embedded files into this directory.
        #[arg(long)]
        extract: Option<PathBuf>,
    },

    /// Tag cache management.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Tag cache subcommands.
#[derive(Subcommand)]
pub(crate) enum CacheAction {
    /// Show cached tag count and recent tagging runs.
    Stats {
        /// Number of runs to show.
        #[arg(long, default_value = "10")]
        limit: u32,
    },
    /// Remove cached tags.
    Clear {
        /// Only remove entries for this model.
        #[arg(long)]
        model: Option<String>,
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
        0 => "jbook=info",
        1 => "jbook=debug",
        _ => "jbook=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .with_target(false)
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
    load_env_file(cli.env_file.as_deref())?;

    match cli.command {
        Command::Pipeline {
            pdf,
            out,
            mut xlsx,
            xlsx_dir,
            xlsx_glob,
            skip_r2,
            use_r1d_description,
        } => {
            let config = load_config()?;
            xlsx.extend(gather_files(&xlsx_dir, &xlsx_glob, &BATCH_STRUCTURED_EXTENSIONS));
            let pipeline = PipelineConfig {
                pdf,
                out: out.unwrap_or_else(|| default_output(&config, "enriched.csv")),
                extra_inputs: xlsx,
                skip_r2,
                use_r1d_description,
            };
            cmd_pipeline(pipeline).await
        }
        Command::Batch {
            out,
            xlsx_dir,
            xlsx_glob,
            pdf_dir,
            pdf_glob,
            skip_r2,
            use_r1d_description,
        } => {
            let batch = BatchConfig {
                out,
                structured_dirs: xlsx_dir,
                structured_globs: xlsx_glob,
                pdf_dirs: pdf_dir,
                pdf_globs: pdf_glob,
                skip_r2,
                use_r1d_description,
            };
            cmd_batch(batch).await
        }
        Command::Tag {
            input,
            output,
            keywords,
            definitions,
            provider,
            model,
            concurrency,
            no_cache,
        } => {
            let args = TagArgs {
                input,
                output,
                keywords,
                definitions,
                provider,
                model,
                concurrency,
                no_cache,
            };
            cmd_tag(args).await
        }
        Command::Embeds { pdf, extract } => cmd_embeds(&pdf, extract.as_deref()),
        Command::Cache { action } => match action {
            CacheAction::Stats { limit } => cmd_cache_stats(limit).await,
            CacheAction::Clear { model } => cmd_cache_clear(model.as_deref()).await,
        },
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(),
        },
    }
}

fn default_output(config: &AppConfig, file_name: &str) -> PathBuf {
    PathBuf::from(&config.defaults.output_dir).join(file_name)
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_pipeline(config: PipelineConfig) -> Result<()> {
    info!(pdf = ?config.pdf, out = %config.out.display(), "running pipeline");

    let result = tokio::task::spawn_blocking(move || {
        let reporter = CliProgress::new();
        run_pipeline(&config, &reporter)
    })
    .await??;

    println!();
    println!("  Enriched dataset written!");
    println!("  Rows:        {}", result.records);
    println!("  Attachments: {}", result.attachments.len());
    println!(
        "  PEs:         {} ({} with R-2 narrative)",
        result.pe_count, result.pes_with_narrative
    );
    println!("  Path:        {}", result.out.display());
    println!("  Time:        {:.1}s", result.elapsed.as_secs_f64());
    println!();
    Ok(())
}

async fn cmd_batch(config: BatchConfig) -> Result<()> {
    info!(out = %config.out.display(), "running batch pipeline");

    let result = tokio::task::spawn_blocking(move || {
        let reporter = CliProgress::new();
        run_batch(&config, &reporter)
    })
    .await??;

    println!();
    println!("  Batch dataset written!");
    println!("  Inputs:   {} structured, {} PDFs", result.structured_files, result.pdf_files);
    println!("  Rows:     {}", result.records);
    println!(
        "  PEs:      {} resolved of {}",
        result.pes_resolved, result.pe_count
    );
    println!("  Path:     {}", result.out.display());
    println!("  Time:     {:.1}s", result.elapsed.as_secs_f64());
    println!();
    Ok(())
}

struct TagArgs {
    input: PathBuf,
    output: PathBuf,
    keywords: Vec<String>,
    definitions: Option<PathBuf>,
    provider: Option<ProviderKind>,
    model: Option<String>,
    concurrency: Option<usize>,
    no_cache: bool,
}

async fn cmd_tag(args: TagArgs) -> Result<()> {
    let config = load_config()?;

    let keywords = if args.keywords.is_empty() {
        config.tagging.keywords.clone()
    } else {
        args.keywords
    };
    if keywords.iter().all(|k| k.trim().is_empty()) {
        return Err(eyre!("no keywords given; pass --keywords or set tagging.keywords"));
    }
    let definitions = match &args.definitions {
        Some(path) => load_definitions(path)?,
        None => Default::default(),
    };
    let provider = args.provider.unwrap_or(config.llm.provider);
    let client = resolve_llm_client(&config, provider, args.model.as_deref()).map(Arc::new);
    let cache_path = if config.cache.enabled && !args.no_cache {
        Some(config.cache.resolved_path()?)
    } else {
        None
    };

    info!(
        input = %args.input.display(),
        %provider,
        llm = client.is_some(),
        keywords = keywords.len(),
        "tagging dataset"
    );

    let tag_config = TagConfig {
        input: args.input,
        output: args.output,
        options: TaggingOptions {
            keywords,
            definitions,
            concurrency: args.concurrency.unwrap_or(config.defaults.concurrency),
            max_corpus_chars: config.defaults.max_corpus_chars,
        },
        cache_path,
    };

    let reporter = CliProgress::new();
    let result = run_tagging(&tag_config, client, &reporter).await?;

    println!();
    println!("  Wrote tagged dataset to {}", result.output.display());
    println!("  Rows:       {}", result.stats.records);
    println!("  LLM calls:  {}", result.stats.llm_calls);
    println!("  Cache hits: {}", result.stats.cache_hits);
    println!("  Failures:   {}", result.stats.failures);
    println!("  Rule-based: {}", result.stats.rule_based);
    println!("  Time:       {:.1}s", result.elapsed.as_secs_f64());
    println!();
    Ok(())
}

fn cmd_embeds(pdf: &Path, extract: Option<&Path>) -> Result<()> {
    let files = jbook_narrative::list_embedded_files(pdf)?;
    if files.is_empty() {
        println!("No embedded files found.");
        return Ok(());
    }
    for file in &files {
        println!("{file}");
    }

    if let Some(dir) = extract {
        let written = jbook_narrative::extract_embedded_files(pdf, dir)?;
        println!();
        println!("  Extracted {} files to {}", written.len(), dir.display());
    }
    Ok(())
}

async fn cmd_cache_stats(limit: u32) -> Result<()> {
    let config = load_config()?;
    let path = config.cache.resolved_path()?;
    let storage = Storage::open_readonly(&path).await?;

    println!("  Cache:       {}", path.display());
    println!("  Schema:      v{}", storage.schema_version().await);
    println!("  Cached tags: {}", storage.cached_tag_count().await?);

    let runs = storage.list_tag_runs(limit).await?;
    if !runs.is_empty() {
        println!();
        for run in runs {
            let finished = run
                .finished_at
                .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_else(|| "unfinished".to_string());
            let stats = run.stats.map(|s| s.to_string()).unwrap_or_default();
            println!(
                "  {}  {}  {}  {finished}  {stats}",
                run.started_at.format("%Y-%m-%d %H:%M:%S"),
                run.model_id.as_deref().unwrap_or("rule-based"),
                run.input_path,
            );
        }
    }
    Ok(())
}

async fn cmd_cache_clear(model: Option<&str>) -> Result<()> {
    let config = load_config()?;
    let path = config.cache.resolved_path()?;
    let storage = Storage::open(&path).await?;
    let removed = storage.invalidate_tag_cache(model).await?;
    println!("Removed {removed} cached tags from {}", path.display());
    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("# {}", config_file_path()?.display());
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
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_prefix(name.to_string());
        self.spinner.set_message(String::new());
    }

    fn item(&self, current: usize, total: usize, detail: &str) {
        self.spinner
            .set_message(format!("[{current}/{total}] {detail}"));
    }

    fn done(&self, _summary: &str) {
        self.spinner.finish_and_clear();
    }
}
