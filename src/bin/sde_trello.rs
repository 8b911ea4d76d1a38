//! SDE-Trello Command Line Interface
//!
//! # Usage
//!
//! ```bash
//! # Walk, reconcile and print the cards that would be created
//! sde-trello plan --config inventory.yaml
//! sde-trello plan --config inventory.yaml --format json
//!
//! # Resolve board labels and templates, then post cards
//! TRELLO_API_KEY=... TRELLO_API_TOKEN=... sde-trello sync --config inventory.yaml
//! sde-trello sync --config inventory.yaml --dry-run
//! ```

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use sde_trello::board::TrelloClient;
use sde_trello::config::{AppConfig, Credentials};
use sde_trello::derive::{CardDeriver, CardIntent, LabelDefinitions};
use sde_trello::inventory::SnapshotInventory;
use sde_trello::pipeline::{Catalogs, Pipeline, RunReport};

#[derive(Parser)]
#[command(name = "sde-trello")]
#[command(version = "0.1.0")]
#[command(about = "Inventory spatial database tables and track them as Trello cards")]
#[command(long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Debug-level logging (RUST_LOG overrides)
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Json,
    Text,
}

#[derive(Subcommand)]
enum Commands {
    /// Build every card without contacting the board
    Plan {
        /// Run configuration (YAML or JSON)
        #[arg(short, long)]
        config: PathBuf,

        #[arg(long, short = 'o', default_value = "text", value_enum)]
        format: OutputFormat,
    },

    /// Resolve board labels and templates, then create cards
    Sync {
        /// Run configuration (YAML or JSON)
        #[arg(short, long)]
        config: PathBuf,

        /// Resolve against the board but post nothing
        #[arg(long)]
        dry_run: bool,
    },
}

// =============================================================================
// MAIN
// =============================================================================

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Plan { config, format } => cmd_plan(&config, format).await,
        Commands::Sync { config, dry_run } => cmd_sync(&config, dry_run).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}: {:#}", "error".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

// =============================================================================
// COMMAND IMPLEMENTATIONS
// =============================================================================

fn load_backend(config: &AppConfig) -> Result<SnapshotInventory> {
    let Some(path) = config.inventory_snapshot.as_ref() else {
        bail!("inventory_snapshot is not set in the configuration");
    };
    SnapshotInventory::load_from_file(path)
        .with_context(|| format!("Failed to load inventory snapshot {}", path.display()))
}

async fn cmd_plan(config_path: &Path, format: OutputFormat) -> Result<()> {
    let config = AppConfig::load_from_file(config_path)?;
    let backend = load_backend(&config)?;
    let catalogs = Catalogs::load(&config)?;

    let deriver = CardDeriver::new(
        LabelDefinitions::from_colors(&config.labels),
        &[],
        config.checklists.clone(),
    );
    let pipeline = Pipeline::new(&config, &backend, &backend, &backend, catalogs, deriver);
    let plan = pipeline.plan().await;

    match format {
        OutputFormat::Json => {
            let output = serde_json::json!({
                "report": plan.report,
                "cards": plan.intents,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Text => {
            print_intents(&plan.intents);
            print_report(&plan.report);
        }
    }
    Ok(())
}

async fn cmd_sync(config_path: &Path, dry_run: bool) -> Result<()> {
    let config = AppConfig::load_from_file(config_path)?;
    if config.board.board_id.is_empty() || config.board.list_id.is_empty() {
        bail!("board.board_id and board.list_id are required for sync");
    }

    let backend = load_backend(&config)?;
    let catalogs = Catalogs::load(&config)?;

    let client = TrelloClient::new(config.board.api_base.clone(), Credentials::from_env()?)?;
    let board_labels = client.fetch_labels(&config.board.board_id).await?;
    let templates = client
        .fetch_checklist_templates(&config.board.board_id)
        .await?;

    let labels = LabelDefinitions::from_board(&config.labels, &board_labels);
    if labels.len() < config.labels.len() {
        tracing::warn!(
            resolved = labels.len(),
            configured = config.labels.len(),
            "Some label colours have no matching board label"
        );
    }

    let deriver = CardDeriver::new(labels, &templates, config.checklists.clone());
    println!(
        "{} {} checklist template(s) on board",
        "→".cyan(),
        deriver.template_count()
    );

    let pipeline = Pipeline::new(&config, &backend, &backend, &backend, catalogs, deriver);

    let report = if dry_run {
        let plan = pipeline.plan().await;
        print_intents(&plan.intents);
        println!("{}", "Dry run: nothing posted".yellow());
        plan.report
    } else {
        pipeline.sync(&client).await
    };

    print_report(&report);
    if report.card_failures > 0 {
        bail!("{} card(s) failed to post", report.card_failures);
    }
    Ok(())
}

// =============================================================================
// OUTPUT
// =============================================================================

fn print_intents(intents: &[CardIntent]) {
    for intent in intents {
        let labels: Vec<&str> = intent.labels.iter().map(|slot| slot.as_str()).collect();
        println!(
            "{} {} [{}]",
            "•".blue(),
            intent.name.bold(),
            labels.join(", ")
        );
        for checklist in &intent.checklists {
            println!("    {} {}", "☐".dimmed(), checklist.name);
        }
    }
}

fn print_report(report: &RunReport) {
    println!();
    println!("{}", "Run summary".bold().underline());
    println!(
        "  connections:  {} walked, {} failed",
        report.connections_walked, report.connections_failed
    );
    println!(
        "  objects:      {} raw, {} malformed, {} unresolved",
        report.raw_paths, report.malformed, report.unresolved
    );
    println!(
        "  entities:     {} unique, {} filtered out, {} unreadable, {} unknown counts",
        report.unique_entities, report.filtered_out, report.unreadable, report.unknown_counts
    );
    println!("  cards:        {} planned", report.cards_planned);
    if report.cards_posted > 0 || report.card_failures > 0 {
        let failures = format!("{} failed", report.card_failures);
        println!(
            "  posted:       {} cards ({}), {} checklists ({} failed)",
            report.cards_posted.to_string().green(),
            if report.card_failures > 0 {
                failures.red()
            } else {
                failures.normal()
            },
            report.checklists_posted,
            report.checklist_failures
        );
    }
}
