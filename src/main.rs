//! tokenflow command line
//!
//! Detects, ingests and persists design token files, migrates legacy project records and
//! compares the raw-tree sync path against the token model.
//!
//! ```bash
//! tokenflow detect tokens/colors.json
//! tokenflow ingest ./tokens --project web --save
//! tokenflow validate ./tokens --project web
//! tokenflow fetch --owner acme --repo design-tokens --path tokens --project web
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tokenflow_common::{SourceType, Token, TokenFile, TokenflowError};
use tokenflow_core::{
    resolve_aliases, ProcessOptions, ResolutionReport, TokenProcessor, TokenflowConfig,
};
use tokenflow_formats::FormatRegistry;
use tokenflow_remote::{is_token_document, GitHubConfig, GitHubFileSource, RemoteFileSource};
use tokenflow_storage::{ImportSummary, SqliteStore, StorageAdapter};
use tokenflow_validator::{
    CutoverPolicy, DualRunValidator, MemoryTarget, PipelineChoice, RawTreePipeline,
    TokenModelPipeline,
};
use tracing::info;
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

#[derive(Parser)]
#[command(name = "tokenflow")]
#[command(version)]
#[command(about = "Design token ingestion, storage migration and dual-run validation")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// SQLite store path (overrides TOKENFLOW_DB_PATH)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Print machine-readable JSON instead of a summary
    #[arg(long, global = true)]
    json: bool,

    /// Debug logging (RUST_LOG takes precedence)
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Score a document against every registered format
    Detect {
        file: PathBuf,
    },

    /// Process a token file or directory
    Ingest {
        /// File or directory of .json token documents
        input: PathBuf,

        #[arg(short, long)]
        project: String,

        /// Force a format instead of auto-detecting (w3c, style-dictionary)
        #[arg(long)]
        format: Option<String>,

        /// Put every token in this collection instead of inferring from paths
        #[arg(long)]
        collection: Option<String>,

        /// Persist the result to the project store
        #[arg(long)]
        save: bool,
    },

    /// Load a project's tokens, migrating a legacy record if needed
    Load {
        #[arg(short, long)]
        project: String,
    },

    /// List a project's migration backups
    Backups {
        #[arg(short, long)]
        project: String,
    },

    /// Copy a backup back over the live project record
    Restore {
        #[arg(short, long)]
        project: String,

        /// Backup timestamp (Unix milliseconds)
        #[arg(short, long)]
        timestamp: i64,
    },

    /// Delete all but the newest backups
    Prune {
        #[arg(short, long)]
        project: String,

        #[arg(short, long, default_value_t = 5)]
        keep: usize,
    },

    /// Run the raw-tree and token-model pipelines on the same input and compare them
    Validate {
        input: PathBuf,

        #[arg(short, long)]
        project: String,

        /// Opt into the token model when the discrepancy rate allows it
        #[arg(long)]
        use_new_model: bool,

        /// Discrepancy threshold (overrides TOKENFLOW_DISCREPANCY_THRESHOLD)
        #[arg(long)]
        threshold: Option<f64>,
    },

    /// Fetch token documents from a GitHub repository and process them
    Fetch {
        #[arg(long)]
        owner: String,

        #[arg(long)]
        repo: String,

        #[arg(long)]
        branch: Option<String>,

        /// Directory inside the repository
        #[arg(long, default_value = "")]
        path: String,

        #[arg(short, long)]
        project: String,

        #[arg(long)]
        save: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}: {:#}", "error".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = TokenflowConfig::from_env()?;
    if let Some(db) = cli.db {
        config.db_path = db;
    }
    let processor = Arc::new(TokenProcessor::with_defaults());

    match cli.command {
        Commands::Detect { file } => cmd_detect(&file, processor.registry(), cli.json),
        Commands::Ingest {
            input,
            project,
            format,
            collection,
            save,
        } => {
            let mut options = ProcessOptions::new(&project)
                .with_source(SourceType::Local, input.display().to_string());
            if let Some(format) = format {
                options = options.with_format(format);
            }
            if let Some(collection) = collection {
                options = options.with_collection(collection);
            }

            let files = collect_token_files(&input)?;
            let (tokens, report) = process(&processor, &files, &options)?;
            print_tokens(&tokens, Some(&report), cli.json)?;

            if save {
                storage(&config, processor.clone())?
                    .save(&project, &tokens)
                    .await
                    .map_err(user_facing)?;
                println!("{} saved {} tokens to project {}", "OK".green().bold(), tokens.len(), project);
            }
            Ok(())
        }
        Commands::Load { project } => {
            let tokens = storage(&config, processor)?
                .load(&project)
                .await
                .map_err(user_facing)?;
            print_tokens(&tokens, None, cli.json)
        }
        Commands::Backups { project } => {
            let backups = storage(&config, processor)?
                .list_backups(&project)
                .await
                .map_err(user_facing)?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&backups)?);
            } else if backups.is_empty() {
                println!("No backups for project {}", project);
            } else {
                for backup in &backups {
                    println!("  {} {}", backup.timestamp.to_string().cyan(), backup.key);
                }
            }
            Ok(())
        }
        Commands::Restore { project, timestamp } => {
            storage(&config, processor)?
                .restore_from_backup(&project, timestamp)
                .await
                .map_err(user_facing)?;
            println!("{} restored project {} from backup {}", "OK".green().bold(), project, timestamp);
            Ok(())
        }
        Commands::Prune { project, keep } => {
            let removed = storage(&config, processor)?
                .prune_backups(&project, keep)
                .await
                .map_err(user_facing)?;
            println!("{} removed {} backups", "OK".green().bold(), removed);
            Ok(())
        }
        Commands::Validate {
            input,
            project,
            use_new_model,
            threshold,
        } => {
            let mut policy = CutoverPolicy::from_config(&config);
            policy.use_new_model |= use_new_model;
            if let Some(threshold) = threshold {
                policy.threshold = threshold;
            }
            let files = collect_token_files(&input)?;
            cmd_validate(&files, &project, processor, policy, cli.json).await
        }
        Commands::Fetch {
            owner,
            repo,
            branch,
            path,
            project,
            save,
        } => {
            let github = GitHubConfig::new(owner, repo)
                .with_branch(branch)
                .with_path(path)
                .with_env_token();
            let files = fetch_remote(&github, &config).await?;

            let options = ProcessOptions::new(&project)
                .with_source(SourceType::Github, github.location())
                .with_branch(github.branch.clone());
            let (tokens, report) = process(&processor, &files, &options)?;
            print_tokens(&tokens, Some(&report), cli.json)?;

            if save {
                storage(&config, processor.clone())?
                    .save(&project, &tokens)
                    .await
                    .map_err(user_facing)?;
                println!("{} saved {} tokens to project {}", "OK".green().bold(), tokens.len(), project);
            }
            Ok(())
        }
    }
}

fn user_facing(error: TokenflowError) -> anyhow::Error {
    anyhow::anyhow!(error.user_message())
}

fn storage(config: &TokenflowConfig, processor: Arc<TokenProcessor>) -> Result<StorageAdapter> {
    let store = SqliteStore::open(&config.db_path)?;
    Ok(StorageAdapter::new(Arc::new(store), processor).with_source("tokenflow-cli"))
}

fn process(
    processor: &TokenProcessor,
    files: &[TokenFile],
    options: &ProcessOptions,
) -> Result<(Vec<Token>, ResolutionReport)> {
    let mut tokens = processor
        .process_multiple_files(files, options)
        .map_err(user_facing)?;
    let report = resolve_aliases(&mut tokens);
    Ok((tokens, report))
}

/// Token documents under `input`, in path order, named relative to it
fn collect_token_files(input: &Path) -> Result<Vec<TokenFile>> {
    if input.is_file() {
        let name = input
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        return Ok(vec![read_token_file(input, name)?]);
    }

    let mut paths: Vec<PathBuf> = WalkDir::new(input)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| {
            path.extension()
                .map_or(false, |ext| ext.eq_ignore_ascii_case("json"))
        })
        .collect();
    paths.sort();

    if paths.is_empty() {
        anyhow::bail!("No .json token files found under {}", input.display());
    }
    info!("Found {} token files under {}", paths.len(), input.display());

    paths
        .iter()
        .map(|path| {
            let relative = path
                .strip_prefix(input)
                .unwrap_or(path)
                .to_string_lossy()
                .replace('\\', "/");
            read_token_file(path, relative)
        })
        .collect()
}

/// Contents stay text so the processor can skip malformed files itself
fn read_token_file(path: &Path, name: String) -> Result<TokenFile> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(TokenFile::new(name, Value::String(text)))
}

fn cmd_detect(file: &Path, registry: &FormatRegistry, json: bool) -> Result<()> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let document: Value = serde_json::from_str(&text)
        .with_context(|| format!("{} is not valid JSON", file.display()))?;

    let scores = registry.scores(&document);
    let detected = registry.detect_format(&document);

    if json {
        let scores: serde_json::Map<String, Value> = scores
            .iter()
            .map(|(name, score)| (name.clone(), Value::from(*score)))
            .collect();
        let output = serde_json::json!({
            "scores": scores,
            "detected": detected.as_ref().map(|d| d.strategy.name()),
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    for (name, score) in &scores {
        println!("  {:<18} {:.2}", name, score);
    }
    match detected {
        Some(d) => println!(
            "{} {} ({:.0}% of leaves)",
            "Detected".green().bold(),
            d.strategy.name(),
            d.confidence * 100.0
        ),
        None => println!("{} no registered format matches", "Unknown".yellow().bold()),
    }
    Ok(())
}

fn print_tokens(tokens: &[Token], report: Option<&ResolutionReport>, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(tokens)?);
        return Ok(());
    }

    let summary = ImportSummary::from_tokens(tokens);
    println!(
        "{} {} tokens ({} aliases)",
        "Tokens".cyan().bold(),
        summary.total_tokens,
        summary.alias_count
    );
    for (collection, count) in &summary.collections {
        println!("  {:<16} {}", collection, count);
    }

    if let Some(report) = report {
        if !report.dangling.is_empty() {
            println!("{} {} aliases point at missing tokens", "Warning".yellow().bold(), report.dangling.len());
        }
        if !report.cycles.is_empty() {
            println!("{} {} aliases are part of a cycle", "Warning".yellow().bold(), report.cycles.len());
        }
    }
    Ok(())
}

async fn cmd_validate(
    files: &[TokenFile],
    project: &str,
    processor: Arc<TokenProcessor>,
    policy: CutoverPolicy,
    json: bool,
) -> Result<()> {
    let validator = DualRunValidator::new(
        Arc::new(RawTreePipeline::new()),
        Arc::new(TokenModelPipeline::new(processor, ProcessOptions::new(project))),
    )
    .with_policy(policy);

    let target = MemoryTarget::new();
    let outcome = validator
        .validate(files, &target)
        .await
        .map_err(user_facing)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }

    let report = &outcome.report;
    println!(
        "{} legacy {} records, candidate {} records",
        "Compared".cyan().bold(),
        report.legacy_count,
        report.candidate_count
    );
    println!("  only in legacy     {}", report.only_in_legacy.len());
    println!("  only in candidate  {}", report.only_in_candidate.len());
    println!("  value mismatches   {}", report.value_mismatches.len());
    println!("  type mismatches    {}", report.type_mismatches.len());
    for mismatch in report.type_mismatches.iter().take(10) {
        println!("    {} {} -> {}", mismatch.identity, mismatch.legacy.red(), mismatch.candidate.green());
    }

    let rate = format!("{:.2}%", outcome.discrepancy_rate * 100.0);
    if outcome.flagged {
        println!("{} discrepancy rate {} exceeds threshold", "Flagged".red().bold(), rate);
    } else {
        println!("{} discrepancy rate {}", "OK".green().bold(), rate);
    }
    match outcome.choice {
        PipelineChoice::New => println!("Using token-model output"),
        PipelineChoice::Legacy => println!("Keeping raw-tree output"),
    }
    Ok(())
}

async fn fetch_remote(github: &GitHubConfig, config: &TokenflowConfig) -> Result<Vec<TokenFile>> {
    let source = GitHubFileSource::new(config.batch.clone(), config.retry.clone())?;
    if !source.validate_config(github) {
        anyhow::bail!("Invalid GitHub configuration for {}", github.location());
    }

    let paths: Vec<String> = source
        .fetch_file_list(github)
        .await?
        .iter()
        .filter(|file| is_token_document(file))
        .map(|file| file.path.clone())
        .collect();
    if paths.is_empty() {
        anyhow::bail!("No .json files found in {}", github.location());
    }

    let files = source.fetch_multiple_files(github, &paths).await?;
    info!("Fetched {} files from {}", files.len(), github.location());
    Ok(files)
}
