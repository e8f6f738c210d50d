//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use maqam_core::pipeline::{CurateRequest, CurateResult, ProgressReporter};
use maqam_core::{BatchOptions, DecisionBuilder, RecordFilter, RecordRepository, ReviewAction};
use maqam_shared::{
    AppConfig, Classification, MatchRecord, RecordId, ReviewStatus, SessionId, init_config,
    load_config, load_config_from, validate_api_key, watch_url,
};
use maqam_storage::Storage;
use maqam_youtube::YouTubeClient;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Maqam — pair cover videos with their originals.
#[derive(Parser)]
#[command(
    name = "maqam",
    version,
    about = "Match cover videos to their originals and curate a reviewed dataset.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file (defaults to ~/.maqam/maqam.toml).
    #[arg(long, global = true, env = "MAQAM_CONFIG")]
    pub config: Option<PathBuf>,

    /// Session database (overrides `defaults.database_path`).
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

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
    /// Fetch covers from a playlist, channel, or video and match each one.
    Match {
        /// Playlist, channel (/channel/UC…, /@handle), or video URL.
        url: String,

        /// Maximum searches in flight.
        #[arg(short, long)]
        concurrency: Option<usize>,

        /// Candidates requested per search.
        #[arg(short, long)]
        limit: Option<u32>,
    },

    /// Review match records of a session.
    Review {
        #[command(subcommand)]
        action: ReviewCommand,
    },

    /// Export INCLUDED records of a session as CSV.
    Export {
        /// Session id (defaults to the latest session).
        #[arg(short, long)]
        session: Option<String>,

        /// Output file (overrides `defaults.export_path`).
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// List stored sessions.
    Sessions,

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Review subcommands. Records are addressed by record id or cover video id.
#[derive(Subcommand)]
pub(crate) enum ReviewCommand {
    /// List records with their status and confidence.
    List {
        #[arg(short, long)]
        session: Option<String>,

        /// Only records flagged for priority review.
        #[arg(long)]
        flagged: bool,

        /// Only records with this status: pending, included, or excluded.
        #[arg(long)]
        status: Option<String>,

        /// Only Shorts or only full-length videos: short or full.
        #[arg(long)]
        classification: Option<String>,
    },
    /// Show one record with its score breakdown.
    Show {
        record: String,

        #[arg(short, long)]
        session: Option<String>,

        /// Print the record as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Accept a record, optionally with a manually chosen original.
    Include {
        record: String,

        /// Original as a video id or YouTube URL.
        #[arg(long)]
        original: Option<String>,

        #[arg(short, long)]
        session: Option<String>,
    },
    /// Reject a record from the dataset.
    Exclude {
        record: String,

        #[arg(short, long)]
        session: Option<String>,
    },
    /// Return a record to pending with its automatic decision.
    Reset {
        record: String,

        #[arg(short, long)]
        session: Option<String>,
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
        0 => "maqam=info",
        1 => "maqam=debug",
        _ => "maqam=trace",
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
    let ctx = Context {
        config_path: cli.config,
        db: cli.db,
    };

    match cli.command {
        Command::Match {
            url,
            concurrency,
            limit,
        } => cmd_match(&ctx, &url, concurrency, limit).await,
        Command::Review { action } => match action {
            ReviewCommand::List {
                session,
                flagged,
                status,
                classification,
            } => {
                let filter = RecordFilter {
                    flagged_only: flagged,
                    status: status.as_deref().map(parse_status).transpose()?,
                    classification: classification
                        .as_deref()
                        .map(parse_classification)
                        .transpose()?,
                };
                cmd_review_list(&ctx, session.as_deref(), &filter).await
            }
            ReviewCommand::Show {
                record,
                session,
                json,
            } => cmd_review_show(&ctx, &record, session.as_deref(), json).await,
            ReviewCommand::Include {
                record,
                original,
                session,
            } => {
                let action = match original {
                    Some(input) => ReviewAction::include_manual(&input)?,
                    None => ReviewAction::Include { original: None },
                };
                cmd_review_apply(&ctx, &record, session.as_deref(), action).await
            }
            ReviewCommand::Exclude { record, session } => {
                cmd_review_apply(&ctx, &record, session.as_deref(), ReviewAction::Exclude).await
            }
            ReviewCommand::Reset { record, session } => {
                cmd_review_apply(&ctx, &record, session.as_deref(), ReviewAction::Reset).await
            }
        },
        Command::Export { session, out } => cmd_export(&ctx, session.as_deref(), out).await,
        Command::Sessions => cmd_sessions(&ctx).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(&ctx).await,
        },
    }
}

/// Global flags shared by every command.
struct Context {
    config_path: Option<PathBuf>,
    db: Option<PathBuf>,
}

impl Context {
    fn config(&self) -> Result<AppConfig> {
        let config = match &self.config_path {
            Some(path) => load_config_from(path)?,
            None => load_config()?,
        };
        Ok(config)
    }

    fn database_path(&self, config: &AppConfig) -> PathBuf {
        self.db
            .clone()
            .unwrap_or_else(|| PathBuf::from(&config.defaults.database_path))
    }
}

// ---------------------------------------------------------------------------
// Match
// ---------------------------------------------------------------------------

async fn cmd_match(
    ctx: &Context,
    url: &str,
    concurrency: Option<usize>,
    limit: Option<u32>,
) -> Result<()> {
    // Fail on config and credentials before touching the network
    let config = ctx.config()?;
    let api_key = validate_api_key(&config)?;
    let builder = DecisionBuilder::new(&config)?;

    let mut options = BatchOptions::from_config(&config);
    if let Some(n) = concurrency {
        if n == 0 {
            return Err(eyre!("--concurrency must be at least 1"));
        }
        options.concurrency = n;
    }
    if let Some(n) = limit {
        if n == 0 {
            return Err(eyre!("--limit must be at least 1"));
        }
        options.search_limit = n;
    }

    let client = Arc::new(YouTubeClient::new(&config.youtube, api_key)?);
    let storage = Storage::open(&ctx.database_path(&config)).await?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling");
            on_interrupt.cancel();
        }
    });

    let request = CurateRequest {
        source_url: url.to_string(),
        options,
    };

    info!(
        url,
        concurrency = request.options.concurrency,
        limit = request.options.search_limit,
        "matching covers"
    );

    let reporter = CliProgress::new();
    let result = maqam_core::curate(
        &request,
        client.as_ref(),
        client.clone(),
        &builder,
        &storage,
        &reporter,
        &cancel,
    )
    .await;

    let result = match result {
        Ok(result) => result,
        Err(e) => {
            reporter.spinner.finish_and_clear();
            return Err(e.into());
        }
    };

    let stats = &result.stats;
    println!();
    println!("  Session matched!");
    println!("  Session:  {}", result.session_id);
    println!("  Covers:   {} ({} full, {} short)", stats.covers, stats.full, stats.shorts);
    println!("  Matched:  {}", stats.matched);
    println!("  Flagged:  {}", stats.flagged);
    if stats.retrieval_failures > 0 {
        println!("  Failed:   {}", stats.retrieval_failures);
    }
    if stats.skipped_queries > 0 {
        println!("  Skipped:  {}", stats.skipped_queries);
    }
    if stats.duplicate_covers > 0 {
        println!("  Repeats:  {} (dropped)", stats.duplicate_covers);
    }
    println!("  Time:     {:.1}s", stats.elapsed.as_secs_f64());
    println!();
    println!("  Next: maqam review list --session {}", result.session_id);
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
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn cover_matched(&self, title: &str, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Matching [{current}/{total}] {title}"));
    }

    fn done(&self, _result: &CurateResult) {
        self.spinner.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// Review
// ---------------------------------------------------------------------------

async fn cmd_review_list(
    ctx: &Context,
    session: Option<&str>,
    filter: &RecordFilter,
) -> Result<()> {
    let (storage, session_id) = open_session(ctx, session, true).await?;
    let repo = maqam_core::load_session(&storage, &session_id).await?;

    let counts = repo.counts();
    println!(
        "Session {session_id}: {} records ({} pending, {} included, {} excluded, {} flagged)",
        counts.total(),
        counts.pending,
        counts.included,
        counts.excluded,
        counts.needs_attention,
    );
    println!();

    for record in repo.filtered(filter) {
        let original = record
            .effective_candidate()
            .map(|c| c.title.as_str())
            .unwrap_or("—");
        println!(
            "{flag} {status:<8} {class:<5} {confidence:.3}  {video:<11}  {cover} → {original}",
            flag = if record.needs_attention { "!" } else { " " },
            status = record.review_status.as_str(),
            class = record.classification.as_str(),
            confidence = record.confidence,
            video = record.cover.id,
            cover = record.cover.title,
        );
    }

    Ok(())
}

async fn cmd_review_show(
    ctx: &Context,
    record: &str,
    session: Option<&str>,
    json: bool,
) -> Result<()> {
    let (storage, session_id) = open_session(ctx, session, true).await?;
    let repo = maqam_core::load_session(&storage, &session_id).await?;
    let record = find_record(&repo, record)?;

    if json {
        println!("{}", serde_json::to_string_pretty(record)?);
        return Ok(());
    }

    print_record(record);
    Ok(())
}

async fn cmd_review_apply(
    ctx: &Context,
    record: &str,
    session: Option<&str>,
    action: ReviewAction,
) -> Result<()> {
    let (storage, session_id) = open_session(ctx, session, false).await?;
    let mut repo = maqam_core::load_session(&storage, &session_id).await?;
    let id = find_record(&repo, record)?.id;

    let updated = maqam_core::review(&storage, &session_id, &mut repo, &id, &action).await?;

    println!(
        "{} → {} ({})",
        updated.cover.id, updated.review_status, updated.decision_source
    );
    if let Some(original) = updated.effective_candidate() {
        println!("  original: {}", watch_url(&original.id));
    }
    Ok(())
}

fn print_record(record: &MatchRecord) {
    println!("  Record:         {}", record.id);
    println!("  Cover:          {}", record.cover.title);
    println!("  URL:            {}", watch_url(&record.cover.id));
    println!(
        "  Duration:       {}s ({})",
        record.cover.duration_secs, record.classification
    );
    println!("  Query:          {}", record.normalized_query);
    println!("  Status:         {}", record.review_status);
    println!("  Source:         {}", record.decision_source);
    println!(
        "  Confidence:     {:.3}{}",
        record.confidence,
        if record.needs_attention {
            "  (needs attention)"
        } else {
            ""
        }
    );

    match &record.best_candidate {
        Some(best) => println!("  Best candidate: {} [{}]", best.title, watch_url(&best.id)),
        None => println!("  Best candidate: none"),
    }
    if let Some(manual) = &record.override_candidate {
        println!("  Override:       {}", watch_url(&manual.id));
    }

    let breakdown = &record.breakdown;
    if !breakdown.signals.is_empty() {
        println!();
        println!("  Signals ({} candidates considered):", breakdown.candidates_considered);
        for (name, signal) in &breakdown.signals {
            print!(
                "    {name:<13} raw {:.3} × {:.2} = {:+.3}",
                signal.raw, signal.weight, signal.weighted
            );
            match &signal.note {
                Some(note) => println!("  ({note})"),
                None => println!(),
            }
        }
    }
    for failure in &breakdown.failures {
        println!(
            "    failed #{} {}: {}",
            failure.rank, failure.candidate_id, failure.reason
        );
    }
    for note in &breakdown.notes {
        println!("  Note: {note}");
    }
}

fn parse_classification(input: &str) -> Result<Classification> {
    input
        .to_ascii_uppercase()
        .parse()
        .map_err(|_| eyre!("invalid classification '{input}': expected short or full"))
}

fn parse_status(input: &str) -> Result<ReviewStatus> {
    input
        .to_ascii_uppercase()
        .parse()
        .map_err(|_| eyre!("invalid status '{input}': expected pending, included, or excluded"))
}

/// Resolve a record by record id, falling back to cover video id.
fn find_record<'a>(repo: &'a RecordRepository, input: &str) -> Result<&'a MatchRecord> {
    if let Ok(id) = input.parse::<RecordId>() {
        if let Some(record) = repo.get(&id) {
            return Ok(record);
        }
    }
    repo.find_by_video(input)
        .ok_or_else(|| eyre!("no record '{input}' in this session"))
}

// ---------------------------------------------------------------------------
// Export and sessions
// ---------------------------------------------------------------------------

async fn cmd_export(ctx: &Context, session: Option<&str>, out: Option<PathBuf>) -> Result<()> {
    let config = ctx.config()?;
    let (storage, session_id) = open_session(ctx, session, true).await?;
    let repo = maqam_core::load_session(&storage, &session_id).await?;

    let path = out.unwrap_or_else(|| PathBuf::from(&config.defaults.export_path));
    info!(session = %session_id, path = %path.display(), "exporting dataset");

    let summary = maqam_export::export_csv(repo.iter(), &path)?;

    println!();
    println!("  Dataset exported!");
    println!("  Path:     {}", summary.path.display());
    println!("  Rows:     {}", summary.rows_written);
    println!("  Skipped:  {}", summary.records_skipped);
    println!("  SHA-256:  {}", summary.sha256);
    println!();

    Ok(())
}

async fn cmd_sessions(ctx: &Context) -> Result<()> {
    let config = ctx.config()?;
    let storage = Storage::open_readonly(&ctx.database_path(&config)).await?;
    let sessions = storage.list_sessions().await?;

    if sessions.is_empty() {
        println!("No sessions yet. Run `maqam match <url>` to create one.");
        return Ok(());
    }

    for session in sessions {
        println!(
            "{}  {}  {:>4} records  {}",
            session.id,
            session.updated_at.format("%Y-%m-%d %H:%M"),
            session.record_count,
            session.source_url
        );
    }
    Ok(())
}

/// Open storage and resolve the session to work on, defaulting to the latest.
async fn open_session(
    ctx: &Context,
    session: Option<&str>,
    readonly: bool,
) -> Result<(Storage, SessionId)> {
    let config = ctx.config()?;
    let path = ctx.database_path(&config);
    let storage = open_storage(&path, readonly).await?;

    let session_id = match session {
        Some(raw) => {
            let id: SessionId = raw
                .parse()
                .map_err(|_| eyre!("invalid session id '{raw}'"))?;
            if storage.get_session(&id).await?.is_none() {
                return Err(eyre!("no session '{raw}' in {}", path.display()));
            }
            id
        }
        None => {
            storage
                .latest_session()
                .await?
                .ok_or_else(|| {
                    eyre!(
                        "no sessions in {}; run `maqam match <url>` first",
                        path.display()
                    )
                })?
                .id
        }
    };

    Ok((storage, session_id))
}

async fn open_storage(path: &Path, readonly: bool) -> Result<Storage> {
    let storage = if readonly {
        Storage::open_readonly(path).await?
    } else {
        Storage::open(path).await?
    };
    Ok(storage)
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(ctx: &Context) -> Result<()> {
    let config = ctx.config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}
