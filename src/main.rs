mod db;
mod error;
mod models;
mod review;
mod scheduler;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::io;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use db::Database;
use error::{AppError, Result};
use models::{Difficulty, JsonOutput};
use review::Strategy;

const DEFAULT_DB_NAME: &str = "drillbit.db";
const DB_ENV_VAR: &str = "DRILLBIT_DB";
const DEFAULT_LIST_LIMIT: usize = 50;
const DEFAULT_REVIEW_WINDOW: usize = 200;

#[derive(Parser)]
#[command(name = "drillbit")]
#[command(about = "Spaced-repetition review queue for practice problems")]
#[command(version)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Database file (overrides DRILLBIT_DB)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Enable debug logging on stderr
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize or upgrade the database
    Init,

    /// Add a problem
    Add {
        /// Problem text or title
        text: String,

        /// Difficulty: easy/medium/hard (anything else is stored as unknown)
        #[arg(long, short, default_value = "unknown")]
        difficulty: String,

        /// Link to the problem statement
        #[arg(long, short)]
        link: Option<String>,
    },

    /// List problems, newest first
    List {
        /// Maximum number of problems to show
        #[arg(long, default_value_t = DEFAULT_LIST_LIMIT)]
        limit: usize,
    },

    /// Show a problem and how overdue it is
    Show {
        /// Problem ID
        id: i64,
    },

    /// Delete a problem
    Delete {
        /// Problem ID
        id: i64,
    },

    /// Delete every problem
    Clear {
        /// Confirm deletion
        #[arg(long)]
        yes: bool,
    },

    /// Pick the next problem to review
    Next {
        /// Always pick the most overdue problem instead of sampling
        #[arg(long)]
        most_due: bool,

        /// Number of most overdue problems to sample from
        #[arg(long, short = 'k', default_value_t = scheduler::DEFAULT_TOP_K)]
        top_k: usize,

        /// Number of recent problems to consider
        #[arg(long, default_value_t = DEFAULT_REVIEW_WINDOW)]
        limit: usize,

        /// Seed for reproducible sampling
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Mark a problem as reviewed
    Review {
        /// Problem ID
        id: i64,
    },

    /// Show review statistics
    Stats,
}

fn get_db_path(explicit: Option<PathBuf>) -> PathBuf {
    if let Some(path) = explicit {
        return path;
    }

    if let Ok(path) = std::env::var(DB_ENV_VAR) {
        return PathBuf::from(path);
    }

    let config_dir = dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("drillbit");

    std::fs::create_dir_all(&config_dir).ok();
    config_dir.join(DEFAULT_DB_NAME)
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let json = cli.json;
    if let Err(e) = run(cli) {
        if json {
            if let Ok(out) = serde_json::to_string(&JsonOutput::<()>::err(e.to_string())) {
                println!("{}", out);
            }
        }
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let db_path = get_db_path(cli.db);
    let db = Database::open(&db_path)?;
    db.init()?;

    let now = Utc::now();

    match cli.command {
        Commands::Init => {
            if cli.json {
                println!("{}", serde_json::to_string(&JsonOutput::<()>::ok(()))?);
            } else {
                println!("Database initialized at: {}", db_path.display());
            }
        }

        Commands::Add {
            text,
            difficulty,
            link,
        } => {
            let difficulty = Difficulty::from_str(&difficulty);
            let id = db.add_problem(&text, difficulty, link.as_deref())?;

            if cli.json {
                println!(
                    "{}",
                    serde_json::to_string(&JsonOutput::ok(serde_json::json!({
                        "id": id,
                        "difficulty": difficulty
                    })))?
                );
            } else {
                println!("Added problem {} ({}).", id, difficulty.as_str());
            }
        }

        Commands::List { limit } => {
            let problems = db.list_problems(limit)?;
            if cli.json {
                println!("{}", serde_json::to_string(&JsonOutput::ok(&problems))?);
            } else if problems.is_empty() {
                println!("No problems yet. Add one with: drillbit add <text>");
            } else {
                println!(
                    "{:<5} {:<8} {:<7} {:<17} TEXT",
                    "ID", "LEVEL", "REVIEWS", "LAST REVIEWED"
                );
                println!("{}", "-".repeat(80));
                for p in problems {
                    println!(
                        "{:<5} {:<8} {:<7} {:<17} {}",
                        p.id,
                        p.difficulty.as_str(),
                        p.times_reviewed.max(0),
                        format_last_reviewed(p.last_reviewed),
                        truncate(&p.text, 40)
                    );
                }
            }
        }

        Commands::Show { id } => {
            let problem = db.get_problem(id)?.ok_or(AppError::NotFound(id))?;
            let score = scheduler::item_score(&problem, now);
            let interval = scheduler::interval_days(problem.times_reviewed);

            if cli.json {
                println!(
                    "{}",
                    serde_json::to_string(&JsonOutput::ok(serde_json::json!({
                        "problem": problem,
                        "due_score": score,
                        "interval_days": interval
                    })))?
                );
            } else {
                println!("#{} ({})", problem.id, problem.difficulty.as_str());
                println!("{}", problem.text);
                if let Some(link) = &problem.link {
                    println!("Link: {}", link);
                }
                println!("Added: {}", problem.created_at);
                println!();
                println!("Times reviewed: {}", problem.times_reviewed.max(0));
                println!("Last reviewed: {}", format_last_reviewed(problem.last_reviewed));
                println!("Interval: {} days", interval);
                println!(
                    "Due score: {:.2}{}",
                    score,
                    if score >= 1.0 { " (due)" } else { "" }
                );
            }
        }

        Commands::Delete { id } => {
            if !db.delete_problem(id)? {
                return Err(AppError::NotFound(id));
            }

            if cli.json {
                println!("{}", serde_json::to_string(&JsonOutput::<()>::ok(()))?);
            } else {
                println!("Problem {} deleted.", id);
            }
        }

        Commands::Clear { yes } => {
            if !yes {
                return Err(AppError::Usage(
                    "Refusing to delete every problem without --yes".to_string(),
                ));
            }
            let removed = db.delete_all_problems()?;

            if cli.json {
                println!(
                    "{}",
                    serde_json::to_string(&JsonOutput::ok(serde_json::json!({ "removed": removed })))?
                );
            } else {
                println!("Deleted {} problems.", removed);
            }
        }

        Commands::Next {
            most_due,
            top_k,
            limit,
            seed,
        } => {
            let strategy = if most_due {
                Strategy::MostDue
            } else {
                Strategy::Weighted { top_k }
            };
            let mut rng = match seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            };

            let next = review::next_item(&db, strategy, limit, now, &mut rng)?;

            if cli.json {
                println!("{}", serde_json::to_string(&JsonOutput::ok(&next))?);
            } else if let Some(next) = next {
                let p = &next.item;
                println!("=== Next Problem to Review ===");
                println!();
                println!("#{} ({})", p.id, p.difficulty.as_str());
                println!("{}", p.text);
                if let Some(link) = &p.link {
                    println!("Link: {}", link);
                }
                println!();
                println!(
                    "Reviews: {} | Last reviewed: {} | Due score: {:.2}",
                    p.times_reviewed.max(0),
                    format_last_reviewed(p.last_reviewed),
                    next.score
                );
                println!();
                println!("After reviewing, record it with:");
                println!("  drillbit review {}", p.id);
            } else {
                println!("No problems to review. Add some first!");
            }
        }

        Commands::Review { id } => {
            let state = review::complete_review(&db, id, now)?;

            if cli.json {
                println!("{}", serde_json::to_string(&JsonOutput::ok(&state))?);
            } else {
                println!("Marked problem {} reviewed.", id);
                println!(
                    "Times reviewed: {} (next interval: {} days)",
                    state.times_reviewed,
                    scheduler::interval_days(state.times_reviewed)
                );
            }
        }

        Commands::Stats => {
            let stats = db.get_stats(now)?;
            if cli.json {
                println!("{}", serde_json::to_string(&JsonOutput::ok(&stats))?);
            } else {
                println!("=== Review Statistics ===");
                println!("Total problems: {}", stats.total_problems);
                println!("Never reviewed: {}", stats.never_reviewed);
                println!("Due now: {}", stats.due_now);
                println!("Total reviews: {}", stats.total_reviews);
            }
        }
    }

    Ok(())
}

fn format_last_reviewed(last_reviewed: Option<DateTime<Utc>>) -> String {
    last_reviewed
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| String::from("never"))
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
