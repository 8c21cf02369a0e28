//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use brandlens_core::corrections::{AuditRunner, ExportedAnswer, execute_audit, resolve_review_item};
use brandlens_core::feedback::{
    EntityFeedback, EntityFeedbackAction, FeedbackPayload, MappingFeedback, MappingFeedbackAction, apply_feedback,
};
use brandlens_core::{
    AnswerAnalysis, EngineContext, KnowledgeContext, ProgressReporter, RunScope, analyze_batch, consolidate_run,
};
use brandlens_shared::{
    AnswerRecord, AppConfig, DeclaredEntity, EntityType, database_path, init_config, load_config, load_config_from,
};
use brandlens_storage::{Storage, VerticalRecord};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Brandlens: find the brands and products model answers recommend.
#[derive(Parser)]
#[command(
    name = "brandlens",
    version,
    about = "Recognize brands and products in model answers and consolidate them per vertical.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Knowledge database (defaults to the configured path).
    #[arg(long, global = true, env = "BRANDLENS_DB")]
    pub db: Option<PathBuf>,

    /// Config file (defaults to ~/.brandlens/brandlens.toml).
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

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub(crate) enum EntityKind {
    Brand,
    Product,
}

impl From<EntityKind> for EntityType {
    fn from(kind: EntityKind) -> Self {
        match kind {
            EntityKind::Brand => EntityType::Brand,
            EntityKind::Product => EntityType::Product,
        }
    }
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Recognize brands and products in answers and print them as JSON.
    Extract {
        /// A `.jsonl` file of `{answer_id, text}` records, or a plain text answer.
        #[arg(short, long)]
        input: PathBuf,

        /// The brand the answers are about.
        #[arg(long)]
        brand: Option<String>,

        /// Alias of `--brand` (repeatable).
        #[arg(long)]
        alias: Vec<String>,

        /// Resolve against this vertical's stored knowledge.
        #[arg(long)]
        vertical: Option<String>,

        /// Ask the configured model for names as well.
        #[arg(long)]
        llm: bool,
    },

    /// Recognize answers and fold the results into a vertical's knowledge.
    Consolidate {
        #[arg(long)]
        vertical: String,

        /// Vertical description, used when the vertical is created.
        #[arg(long)]
        description: Option<String>,

        /// A `.jsonl` file of `{answer_id, text}` records.
        #[arg(short, long)]
        input: PathBuf,

        /// Declared brand, `NAME` or `NAME=alias1,alias2` (repeatable).
        #[arg(long = "user-brand")]
        user_brands: Vec<String>,

        #[arg(long)]
        llm: bool,
    },

    /// Audit an extraction export and apply confident corrections.
    Audit {
        #[arg(long)]
        vertical: String,

        /// JSON array of exported answers.
        #[arg(short, long)]
        input: PathBuf,

        /// Queue review items but write no feedback.
        #[arg(long)]
        dry_run: bool,
    },

    /// Inspect and resolve queued review items.
    Review {
        #[command(subcommand)]
        action: ReviewAction,
    },

    /// Product→brand mappings.
    Mapping {
        #[command(subcommand)]
        action: MappingAction,
    },

    /// Reject a name so it is never promoted again in a vertical.
    Reject {
        #[arg(long)]
        vertical: String,

        #[arg(long = "type", value_enum)]
        kind: EntityKind,

        #[arg(long)]
        name: String,

        #[arg(long)]
        reason: Option<String>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
pub(crate) enum ReviewAction {
    /// List the review items of an audit run.
    List {
        #[arg(long)]
        run: String,
    },
    /// Apply a pending item's feedback.
    Apply {
        #[arg(long)]
        run: String,
        #[arg(long)]
        item: String,
    },
    /// Mark a pending item ignored.
    Ignore {
        #[arg(long)]
        run: String,
        #[arg(long)]
        item: String,
    },
}

#[derive(Subcommand)]
pub(crate) enum MappingAction {
    /// Show every candidate brand for a product.
    Show {
        #[arg(long)]
        vertical: String,
        #[arg(long)]
        product: String,
    },
    /// Record a human decision on a product→brand mapping.
    Feedback {
        #[arg(long)]
        vertical: String,
        #[arg(long)]
        product: String,
        #[arg(long)]
        brand: String,
        /// Reject the mapping instead of accepting it.
        #[arg(long)]
        reject: bool,
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
        0 => "brandlens=info",
        1 => "brandlens=debug",
        _ => "brandlens=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    // Logs go to stderr; stdout carries JSON results.
    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).with_writer(std::io::stderr).init();
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
    let db = cli.db.as_deref();

    match cli.command {
        Command::Extract {
            input,
            brand,
            alias,
            vertical,
            llm,
        } => cmd_extract(&config, db, &input, brand, alias, vertical.as_deref(), llm).await,
        Command::Consolidate {
            vertical,
            description,
            input,
            user_brands,
            llm,
        } => cmd_consolidate(&config, db, &vertical, description.as_deref(), &input, &user_brands, llm).await,
        Command::Audit {
            vertical,
            input,
            dry_run,
        } => cmd_audit(&config, db, &vertical, &input, dry_run).await,
        Command::Review { action } => match action {
            ReviewAction::List { run } => cmd_review_list(&config, db, &run).await,
            ReviewAction::Apply { run, item } => cmd_review_resolve(&config, db, &run, &item, true).await,
            ReviewAction::Ignore { run, item } => cmd_review_resolve(&config, db, &run, &item, false).await,
        },
        Command::Mapping { action } => match action {
            MappingAction::Show { vertical, product } => cmd_mapping_show(&config, db, &vertical, &product).await,
            MappingAction::Feedback {
                vertical,
                product,
                brand,
                reject,
            } => cmd_mapping_feedback(&config, db, &vertical, &product, &brand, reject).await,
        },
        Command::Reject {
            vertical,
            kind,
            name,
            reason,
        } => cmd_reject(&config, db, &vertical, kind.into(), &name, reason.as_deref()).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(&config).await,
        },
    }
}

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// Read answers from a `.jsonl` file, or treat any other file as one answer.
fn read_answers(path: &Path) -> Result<Vec<AnswerRecord>> {
    let content = std::fs::read_to_string(path).wrap_err_with(|| format!("cannot read {}", path.display()))?;

    if path.extension().is_some_and(|ext| ext == "jsonl") {
        return content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(index, line)| {
                serde_json::from_str::<AnswerRecord>(line)
                    .wrap_err_with(|| format!("{}:{}: not an answer record", path.display(), index + 1))
            })
            .collect();
    }

    let answer_id = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_else(|| "answer".to_string());
    Ok(vec![AnswerRecord { answer_id, text: content }])
}

/// `NAME` or `NAME=alias1,alias2`.
fn parse_declared(arg: &str) -> Option<DeclaredEntity> {
    let (name, aliases) = match arg.split_once('=') {
        Some((name, aliases)) => (name, aliases),
        None => (arg, ""),
    };
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some(DeclaredEntity {
        name: name.to_string(),
        aliases: aliases
            .split(',')
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(str::to_string)
            .collect(),
    })
}

async fn open_storage(config: &AppConfig, db: Option<&Path>) -> Result<Storage> {
    let path = match db {
        Some(path) => path.to_path_buf(),
        None => database_path(config)?,
    };
    info!(path = %path.display(), "opening knowledge store");
    Ok(Storage::open_with(&path, &config.storage).await?)
}

async fn existing_vertical(storage: &Storage, name: &str) -> Result<VerticalRecord> {
    storage
        .find_vertical(name)
        .await?
        .ok_or_else(|| eyre!("unknown vertical '{name}'"))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// ---------------------------------------------------------------------------
// Recognition
// ---------------------------------------------------------------------------

async fn analyze_all(
    config: &AppConfig,
    answers: Vec<AnswerRecord>,
    engine: EngineContext,
    scope: RunScope,
    progress: &CliProgress,
) -> Vec<AnswerAnalysis> {
    progress.phase(&format!("Analyzing {} answers", answers.len()));
    let ids: Vec<String> = answers.iter().map(|a| a.answer_id.clone()).collect();
    let results = analyze_batch(Arc::new(engine), answers, Arc::new(scope), config.llm.concurrency).await;

    let mut analyses = Vec::with_capacity(results.len());
    for (id, result) in ids.iter().zip(results) {
        match result {
            Ok(analysis) => analyses.push(analysis),
            Err(e) => warn!(answer_id = %id, error = %e, "answer skipped"),
        }
    }
    analyses
}

fn engine_for(config: &AppConfig, llm: bool) -> Result<EngineContext> {
    let engine = EngineContext::new(config);
    if !llm {
        return Ok(engine);
    }
    let client = brandlens_llm::select_client(&config.llm, None, None)?;
    Ok(engine.with_llm(client))
}

async fn cmd_extract(
    config: &AppConfig,
    db: Option<&Path>,
    input: &Path,
    brand: Option<String>,
    aliases: Vec<String>,
    vertical: Option<&str>,
    llm: bool,
) -> Result<()> {
    let answers = read_answers(input)?;
    let mut engine = engine_for(config, llm)?;
    let mut scope = RunScope {
        seeds: brand.map(|name| DeclaredEntity { name, aliases }),
        ..RunScope::default()
    };

    if let Some(name) = vertical {
        let storage = open_storage(config, db).await?;
        let vertical = existing_vertical(&storage, name).await?;
        let knowledge = KnowledgeContext::load(&storage, &vertical.id, &config.consolidation).await?;
        engine = engine.with_knowledge(&knowledge);
        scope.prompt = knowledge.extraction_context(&vertical);
        scope.knowledge = knowledge;
    }

    let progress = CliProgress::new();
    let analyses = analyze_all(config, answers, engine, scope, &progress).await;
    progress.finish();
    print_json(&analyses)
}

async fn cmd_consolidate(
    config: &AppConfig,
    db: Option<&Path>,
    vertical: &str,
    description: Option<&str>,
    input: &Path,
    user_brands: &[String],
    llm: bool,
) -> Result<()> {
    let answers = read_answers(input)?;
    let user_brands: Vec<DeclaredEntity> = user_brands.iter().filter_map(|s| parse_declared(s)).collect();

    let storage = open_storage(config, db).await?;
    let vertical = storage.ensure_vertical(vertical, description).await?;
    let knowledge = KnowledgeContext::load(&storage, &vertical.id, &config.consolidation).await?;

    let engine = engine_for(config, llm)?.with_knowledge(&knowledge);
    let alias_table = engine.alias_table().clone();
    let scope = RunScope {
        seeds: user_brands.first().cloned(),
        prompt: knowledge.extraction_context(&vertical),
        knowledge,
    };

    info!(vertical = %vertical.name, answers = answers.len(), "consolidating run");
    let progress = CliProgress::new();
    let analyses = analyze_all(config, answers, engine, scope, &progress).await;

    progress.phase("Consolidating knowledge");
    let summary = consolidate_run(
        &storage,
        &vertical,
        &analyses,
        &user_brands,
        &alias_table,
        &config.consolidation,
    )
    .await?;
    progress.finish();
    print_json(&summary)
}

// ---------------------------------------------------------------------------
// Corrections
// ---------------------------------------------------------------------------

async fn cmd_audit(config: &AppConfig, db: Option<&Path>, vertical: &str, input: &Path, dry_run: bool) -> Result<()> {
    let content = std::fs::read_to_string(input).wrap_err_with(|| format!("cannot read {}", input.display()))?;
    let export: Vec<ExportedAnswer> =
        serde_json::from_str(&content).wrap_err_with(|| format!("{} is not an extraction export", input.display()))?;

    let client = brandlens_llm::select_client(&config.llm, None, None)?;
    let runner = AuditRunner::new(client, &config.corrections, config.llm.concurrency);

    let storage = open_storage(config, db).await?;
    let vertical = storage.ensure_vertical(vertical, None).await?;

    let progress = CliProgress::new();
    let execution = execute_audit(&storage, &vertical, &export, &runner, config, dry_run, &progress).await?;
    progress.finish();

    info!(
        run_id = %execution.audit_run_id,
        review_items = execution.review_items,
        tokens_in = execution.tokens_in,
        tokens_out = execution.tokens_out,
        "audit finished"
    );
    print_json(&execution.report)
}

async fn cmd_review_list(config: &AppConfig, db: Option<&Path>, run: &str) -> Result<()> {
    let storage = open_storage(config, db).await?;
    let items = storage.list_review_items(run, None).await?;
    print_json(&items)
}

async fn cmd_review_resolve(config: &AppConfig, db: Option<&Path>, run: &str, item_id: &str, apply: bool) -> Result<()> {
    let storage = open_storage(config, db).await?;
    let audit_run = storage
        .get_audit_run(run)
        .await?
        .ok_or_else(|| eyre!("unknown audit run '{run}'"))?;
    let item = storage
        .list_review_items(run, None)
        .await?
        .into_iter()
        .find(|item| item.id == item_id)
        .ok_or_else(|| eyre!("no review item '{item_id}' in run '{run}'"))?;

    let applied = resolve_review_item(&storage, &audit_run.vertical_id, &item, apply, config).await?;
    print_json(&applied)
}

// ---------------------------------------------------------------------------
// Knowledge edits
// ---------------------------------------------------------------------------

async fn cmd_mapping_show(config: &AppConfig, db: Option<&Path>, vertical: &str, product: &str) -> Result<()> {
    let storage = open_storage(config, db).await?;
    let vertical = existing_vertical(&storage, vertical).await?;
    let entity = storage
        .find_entity(&vertical.id, EntityType::Product, product)
        .await?
        .ok_or_else(|| eyre!("unknown product '{product}' in vertical '{}'", vertical.name))?;
    let mappings = storage.mappings_for_product(&entity.id).await?;

    print_json(&serde_json::json!({
        "product": entity.canonical_name,
        "mappings": mappings,
    }))
}

async fn cmd_mapping_feedback(
    config: &AppConfig,
    db: Option<&Path>,
    vertical: &str,
    product: &str,
    brand: &str,
    reject: bool,
) -> Result<()> {
    let storage = open_storage(config, db).await?;
    let vertical = storage.ensure_vertical(vertical, None).await?;
    let payload = FeedbackPayload {
        mapping_feedback: vec![MappingFeedback {
            action: if reject {
                MappingFeedbackAction::Reject
            } else {
                MappingFeedbackAction::Add
            },
            product_name: product.to_string(),
            brand_name: brand.to_string(),
            reason: String::new(),
        }],
        ..FeedbackPayload::default()
    };
    let applied = apply_feedback(&storage, &vertical.id, &payload, &config.consolidation.mapping).await?;
    print_json(&applied)
}

async fn cmd_reject(
    config: &AppConfig,
    db: Option<&Path>,
    vertical: &str,
    kind: EntityType,
    name: &str,
    reason: Option<&str>,
) -> Result<()> {
    let storage = open_storage(config, db).await?;
    let vertical = storage.ensure_vertical(vertical, None).await?;
    let feedback = EntityFeedback {
        action: EntityFeedbackAction::Reject,
        name: name.to_string(),
        wrong_name: None,
        reason: reason.unwrap_or_default().to_string(),
    };
    let payload = match kind {
        EntityType::Brand => FeedbackPayload {
            brand_feedback: vec![feedback],
            ..FeedbackPayload::default()
        },
        EntityType::Product => FeedbackPayload {
            product_feedback: vec![feedback],
            ..FeedbackPayload::default()
        },
    };
    apply_feedback(&storage, &vertical.id, &payload, &config.consolidation.mapping).await?;
    println!("Rejected {} '{name}' in {}", kind.as_str(), vertical.name);
    Ok(())
}

// ---------------------------------------------------------------------------
// Config
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
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
            spinner.set_style(style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]));
        }
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
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

    fn item_progress(&self, current: usize, total: usize, detail: &str) {
        self.spinner.set_message(format!("[{current}/{total}] {detail}"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declared_brands_parse_with_aliases() {
        let vw = parse_declared("VW=Volkswagen, 大众").unwrap();
        assert_eq!(vw.name, "VW");
        assert_eq!(vw.aliases, vec!["Volkswagen", "大众"]);

        let plain = parse_declared(" Toyota ").unwrap();
        assert!(plain.aliases.is_empty());
        assert!(parse_declared("=x").is_none());
    }

    #[test]
    fn jsonl_and_plain_text_inputs() {
        let dir = std::env::temp_dir().join(format!("brandlens_cli_{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();

        let jsonl = dir.join("answers.jsonl");
        std::fs::write(
            &jsonl,
            "{\"answer_id\": \"a1\", \"text\": \"推荐丰田\"}\n\n{\"answer_id\": \"a2\", \"text\": \"比亚迪\"}\n",
        )
        .unwrap();
        let answers = read_answers(&jsonl).unwrap();
        assert_eq!(answers.len(), 2);
        assert_eq!(answers[1].answer_id, "a2");

        let plain = dir.join("reply.txt");
        std::fs::write(&plain, "1. 丰田RAV4").unwrap();
        let answers = read_answers(&plain).unwrap();
        assert_eq!(answers[0].answer_id, "reply");
        assert_eq!(answers[0].text, "1. 丰田RAV4");
    }

    #[test]
    fn cli_parses_consolidate() {
        let cli = Cli::try_parse_from([
            "brandlens",
            "-vv",
            "consolidate",
            "--vertical",
            "SUV",
            "--input",
            "answers.jsonl",
            "--user-brand",
            "VW=Volkswagen",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.command, Command::Consolidate { ref user_brands, .. } if user_brands.len() == 1));
    }
}
