mod script;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use slide_history::config::doc_id_for_path;
use slide_history::{
    Clock, HistoryConfig, HistoryManager, ManualClock, PersistenceLayer, Slide, SystemClock,
};

/// Replays slide-deck edit scripts through the undo/redo history engine.
#[derive(Parser, Debug)]
#[command(name = "slide-history", version, about)]
struct Cli {
    /// Config file (defaults to `slide-history.json` next to the executable).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replay a JSON edit script and print the resulting history.
    Replay {
        script: PathBuf,

        /// Deck id used as the persistence key (defaults to a hash of the script path).
        #[arg(long = "doc-id")]
        doc_id: Option<String>,

        /// Load existing history before replaying and flush it afterwards.
        #[arg(long)]
        persist: bool,
    },
    /// List decks with persisted history.
    List,
    /// Delete the persisted history of a deck.
    Forget { doc_id: String },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config_path = cli.config.unwrap_or_else(HistoryConfig::config_path);
    let config = HistoryConfig::load_or_create(&config_path);
    tracing::debug!("Using config {}", config_path.display());

    match cli.command {
        Command::Replay {
            script,
            doc_id,
            persist,
        } => replay(script, doc_id, persist, config),
        Command::List => {
            let pl = PersistenceLayer::open(&config.data_dir)?;
            let mut docs = pl.list_documents()?;
            docs.sort();
            for doc_id in docs {
                let count = pl.count_entries(&doc_id)?;
                println!("{doc_id}\t{count} entries");
            }
            Ok(())
        }
        Command::Forget { doc_id } => {
            let pl = PersistenceLayer::open(&config.data_dir)?;
            pl.delete_document(&doc_id)
                .with_context(|| format!("Failed to forget deck {doc_id}"))?;
            tracing::info!("Deleted history for {doc_id}");
            Ok(())
        }
    }
}

fn replay(
    script_path: PathBuf,
    doc_id: Option<String>,
    persist: bool,
    config: HistoryConfig,
) -> Result<()> {
    let script = script::load_script(&script_path)?;
    let doc_id = doc_id.unwrap_or_else(|| doc_id_for_path(&script_path));

    let persistence = if persist {
        Some(PersistenceLayer::open(&config.data_dir)?)
    } else {
        None
    };

    let clock = ManualClock::new(SystemClock.now_ms());
    let mut mgr: HistoryManager<Slide> =
        HistoryManager::load_or_new(doc_id, &script.initial_state, config, persistence)?
            .with_clock(Arc::new(clock.clone()));

    tracing::info!("Replaying {} steps on {}", script.steps.len(), mgr.doc_id());

    let outcomes = script::replay(&mut mgr, &clock, &script.steps);
    for (step, outcome) in script.steps.iter().zip(&outcomes) {
        println!("{:<40} {outcome}", script::step_label(step));
    }

    println!();
    println!("History ({} entries):", mgr.history_size());
    for (i, entry) in mgr.entries().iter().enumerate() {
        let marker = if mgr.current_index() == Some(i) { '*' } else { ' ' };
        println!(
            "{marker} [{i}] {} \"{}\"",
            entry.action.kind, entry.action.description
        );
    }

    mgr.flush()?;
    Ok(())
}
