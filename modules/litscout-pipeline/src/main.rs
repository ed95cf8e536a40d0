use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use litscout_common::config::PipelineConfig;
use litscout_common::types::{DateRange, PreprintPolicy, SourceId, Strategy};
use litscout_pipeline::expand::read_queries_file;
use litscout_pipeline::run::{run_curate, run_search};

#[derive(Parser)]
#[command(name = "litscout", about = "Literature retrieval and curation pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Full pipeline: retrieve, enrich, score, gate, download, report.
    Curate(CurateArgs),
    /// Retrieval and dedup only; writes one JSONL of candidates.
    Search(SearchArgs),
}

#[derive(Args)]
struct RetrievalArgs {
    /// Base queries; repeatable.
    #[arg(short, long)]
    query: Vec<String>,

    /// Newline-delimited queries file (# comments allowed).
    #[arg(long)]
    queries_file: Option<PathBuf>,

    /// Sources to search; defaults to the free no-key set.
    #[arg(long, value_delimiter = ',')]
    sources: Vec<SourceId>,

    /// Expansion strategy: recall, balance, or precision.
    #[arg(long, default_value = "recall")]
    strategy: Strategy,

    /// Earliest publication date (YYYY or YYYY-MM-DD).
    #[arg(long)]
    from: Option<String>,

    /// Latest publication date (YYYY or YYYY-MM-DD).
    #[arg(long)]
    to: Option<String>,

    /// Records requested per (source, query) job.
    #[arg(long, default_value_t = 30)]
    retmax: usize,

    /// Concurrent jobs for retrieval, backfill, and downloads.
    #[arg(long, default_value_t = 6)]
    max_workers: usize,

    /// Retries per transient request failure.
    #[arg(long, default_value_t = 2)]
    max_retries: usize,

    /// Per-job timeout in seconds.
    #[arg(long, default_value_t = 60)]
    timeout: u64,

    /// PMCID lookups allowed per run.
    #[arg(long, default_value_t = 300)]
    pmc_lookup_limit: usize,

    /// Unpaywall lookups allowed per run.
    #[arg(long, default_value_t = 400)]
    unpaywall_limit: usize,
}

#[derive(Args)]
struct CurateArgs {
    #[command(flatten)]
    retrieval: RetrievalArgs,

    /// Disable the credibility gate; every record passes core.
    #[arg(long)]
    no_quality_filter: bool,

    /// Minimum credibility score for the core tier.
    #[arg(long, default_value_t = 70)]
    core_threshold: i32,

    /// Minimum credibility score for the extended tier.
    #[arg(long, default_value_t = 50)]
    extended_threshold: i32,

    /// Citation-age window (years) for young-article compensation.
    #[arg(long, default_value_t = 5)]
    citation_age_window: i32,

    /// Disable young-article compensation.
    #[arg(long)]
    no_young_compensation: bool,

    /// Preprint routing: separate_sheet or allow_core.
    #[arg(long, default_value = "separate_sheet")]
    preprint_policy: PreprintPolicy,

    /// Also attempt paywalled direct URLs instead of open-access-only.
    #[arg(long)]
    no_oa_only: bool,

    /// Skip the download phase; manifest marks every record skipped.
    #[arg(long)]
    skip_download: bool,

    /// Root directory for run artifacts and shared stores.
    #[arg(long, default_value = "runs")]
    output_dir: PathBuf,
}

#[derive(Args)]
struct SearchArgs {
    #[command(flatten)]
    retrieval: RetrievalArgs,

    /// Output JSONL path.
    #[arg(long, default_value = "search_results.jsonl")]
    out: PathBuf,

    /// Optional JSON error log for failed jobs.
    #[arg(long)]
    error_log: Option<PathBuf>,
}

fn base_config(args: &RetrievalArgs) -> Result<PipelineConfig> {
    let mut queries = args.query.clone();
    if let Some(path) = &args.queries_file {
        queries.extend(read_queries_file(path)?);
    }
    if queries.is_empty() {
        bail!("no queries given; pass --query or --queries-file");
    }
    let mut config = PipelineConfig {
        queries,
        strategy: args.strategy,
        retmax: args.retmax,
        date_range: DateRange {
            from: args.from.clone(),
            to: args.to.clone(),
        },
        max_workers: args.max_workers,
        max_retries: args.max_retries,
        request_timeout_secs: args.timeout,
        pmc_lookup_limit: args.pmc_lookup_limit,
        unpaywall_limit: args.unpaywall_limit,
        ..PipelineConfig::default()
    };
    if !args.sources.is_empty() {
        config.sources = args.sources.clone();
    }
    config.load_credentials();
    Ok(config)
}

fn curate_config(args: &CurateArgs) -> Result<PipelineConfig> {
    let mut config = base_config(&args.retrieval)?;
    config.quality_filter = !args.no_quality_filter;
    config.core_threshold = args.core_threshold;
    config.extended_threshold = args.extended_threshold;
    config.young_article_window_years = args.citation_age_window;
    config.young_article_compensation = !args.no_young_compensation;
    config.preprint_policy = args.preprint_policy;
    config.oa_only = !args.no_oa_only;
    config.skip_download = args.skip_download;
    config.output_dir = args.output_dir.clone();
    Ok(config)
}

fn http_client(timeout_secs: u64) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .user_agent(concat!("litscout/", env!("CARGO_PKG_VERSION")))
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("litscout=info".parse()?))
        .init();

    let cli = Cli::parse();
    let summary = match cli.command {
        Command::Curate(args) => {
            let config = curate_config(&args)?;
            info!(
                queries = config.queries.len(),
                sources = config.sources.len(),
                strategy = config.strategy.as_str(),
                "Starting curation run"
            );
            let client = http_client(config.request_timeout_secs)?;
            run_curate(config, client).await?
        }
        Command::Search(args) => {
            let config = base_config(&args.retrieval)?;
            info!(
                queries = config.queries.len(),
                sources = config.sources.len(),
                "Starting search run"
            );
            let client = http_client(config.request_timeout_secs)?;
            run_search(config, client, &args.out, args.error_log.as_deref()).await?
        }
    };

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
