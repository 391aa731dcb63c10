//! Termgraph CLI: branch administration and index queries over a SQLite store.
//!
//! Usage:
//!   termgraph branch <create|list|show> [--db path]
//!   termgraph ancestors MAIN 138875005 [--inferred]

use clap::{Parser, Subcommand};
use std::collections::BTreeSet;
use std::path::PathBuf;
use termgraph::{BranchPath, CommitOutcome, Config, ConceptId, HierarchyKind, TermEngine, Timepoint};
use tracing::Level;

#[derive(Parser)]
#[command(
    name = "termgraph",
    version,
    about = "Branch-aware terminology store with a semantic index"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Path to SQLite database file
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// Path to a YAML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage branches
    Branch {
        #[command(subcommand)]
        action: BranchAction,
    },
    /// Roll back the latest commit of a branch
    Rollback {
        path: String,
        /// Any timepoint within the commit's branch version
        timepoint: Timepoint,
    },
    /// Roll back a partial commit left by a crash and unlock the branch
    Recover { path: String },
    /// Recompute the semantic index of a branch
    Rebuild { path: String },
    /// Move a branch onto its parent's head
    Rebase { path: String },
    /// Copy a branch's content onto its parent
    Promote { path: String },
    /// Ancestors of a concept
    Ancestors {
        path: String,
        concept: String,
        /// Use the inferred hierarchy
        #[arg(long)]
        inferred: bool,
    },
    /// Descendants of a concept
    Descendants {
        path: String,
        concept: String,
        /// Use the inferred hierarchy
        #[arg(long)]
        inferred: bool,
    },
}

#[derive(Subcommand)]
enum BranchAction {
    /// Create a branch; its parent must exist
    Create { path: String },
    /// List all branches
    List,
    /// Show the current version of a branch
    Show { path: String },
}

/// Get the default database path (~/.local/share/termgraph/termgraph.db)
fn default_db_path() -> PathBuf {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_default().join(".local/share"));
    let termgraph_dir = data_dir.join("termgraph");
    std::fs::create_dir_all(&termgraph_dir).ok();
    termgraph_dir.join("termgraph.db")
}

fn open_engine(db: Option<PathBuf>, config: Option<PathBuf>) -> Result<TermEngine, String> {
    let config = match config {
        Some(path) => Config::load(&path).map_err(|e| format!("Failed to load config: {}", e))?,
        None => Config::default(),
    };
    let db_path = db.unwrap_or_else(default_db_path);
    TermEngine::open(config, &db_path).map_err(|e| format!("Failed to open database: {}", e))
}

fn parse_path(path: &str) -> Result<BranchPath, String> {
    BranchPath::new(path).map_err(|e| e.to_string())
}

fn hierarchy(inferred: bool) -> HierarchyKind {
    if inferred {
        HierarchyKind::Inferred
    } else {
        HierarchyKind::Stated
    }
}

fn print_ids(ids: &BTreeSet<ConceptId>) {
    for id in ids {
        println!("{}", id);
    }
}

fn print_outcome(action: &str, path: &BranchPath, outcome: &CommitOutcome) {
    if outcome.committed {
        println!("{} '{}' at {}", action, path, outcome.branch.head);
    } else {
        println!("Nothing to do for '{}'", path);
    }
    for (hierarchy, concepts) in &outcome.cycles {
        let ids: Vec<&str> = concepts.iter().map(ConceptId::as_str).collect();
        println!("Warning: {} cycle through {}", hierarchy, ids.join(", "));
    }
}

fn cmd_branch_list(engine: &TermEngine) -> Result<(), String> {
    let branches = engine.branches().list().map_err(|e| e.to_string())?;
    if branches.is_empty() {
        println!("No branches defined.");
        return Ok(());
    }
    println!("{:<40}  {:>15}  {:>15}  {:>6}", "PATH", "BASE", "HEAD", "LOCKED");
    println!("{}", "-".repeat(82));
    for branch in branches {
        println!(
            "{:<40}  {:>15}  {:>15}  {:>6}",
            branch.path,
            branch.base,
            branch.head,
            if branch.locked { "yes" } else { "" }
        );
    }
    Ok(())
}

fn cmd_branch_show(engine: &TermEngine, path: &BranchPath) -> Result<(), String> {
    let branch = engine.branches().find(path).map_err(|e| e.to_string())?;
    let json = serde_json::to_string_pretty(&branch).map_err(|e| e.to_string())?;
    println!("{}", json);
    Ok(())
}

fn run(cli: Cli) -> Result<(), String> {
    let engine = open_engine(cli.db, cli.config)?;
    let branches = engine.branches();

    match cli.command {
        Commands::Branch { action } => match action {
            BranchAction::Create { path } => {
                let path = parse_path(&path)?;
                let branch = branches.create(&path).map_err(|e| e.to_string())?;
                println!("Created branch '{}' (base {})", branch.path, branch.base);
                Ok(())
            }
            BranchAction::List => cmd_branch_list(&engine),
            BranchAction::Show { path } => cmd_branch_show(&engine, &parse_path(&path)?),
        },
        Commands::Rollback { path, timepoint } => {
            let path = parse_path(&path)?;
            let branch = branches
                .rollback_commit(&path, timepoint)
                .map_err(|e| e.to_string())?;
            println!("Rolled back '{}', head is now {}", path, branch.head);
            Ok(())
        }
        Commands::Recover { path } => {
            let path = parse_path(&path)?;
            let branch = branches
                .rollback_partial_commit(&path)
                .map_err(|e| e.to_string())?;
            println!("Recovered '{}', head is {}", path, branch.head);
            Ok(())
        }
        Commands::Rebuild { path } => {
            let path = parse_path(&path)?;
            let outcome = branches.rebuild(&path).map_err(|e| e.to_string())?;
            print_outcome("Rebuilt index of", &path, &outcome);
            Ok(())
        }
        Commands::Rebase { path } => {
            let path = parse_path(&path)?;
            let outcome = branches.rebase(&path).map_err(|e| e.to_string())?;
            print_outcome("Rebased", &path, &outcome);
            Ok(())
        }
        Commands::Promote { path } => {
            let path = parse_path(&path)?;
            let outcome = branches.promote(&path).map_err(|e| e.to_string())?;
            print_outcome("Promoted into parent of", &path, &outcome);
            Ok(())
        }
        Commands::Ancestors {
            path,
            concept,
            inferred,
        } => {
            let ids = engine
                .query()
                .find_ancestor_ids(&ConceptId::from(concept), &parse_path(&path)?, hierarchy(inferred))
                .map_err(|e| e.to_string())?;
            print_ids(&ids);
            Ok(())
        }
        Commands::Descendants {
            path,
            concept,
            inferred,
        } => {
            let ids = engine
                .query()
                .find_descendant_ids(&ConceptId::from(concept), &parse_path(&path)?, hierarchy(inferred))
                .map_err(|e| e.to_string())?;
            print_ids(&ids);
            Ok(())
        }
    }
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .init();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
