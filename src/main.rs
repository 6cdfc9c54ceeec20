mod board;
mod db;
mod fetch;
mod models;
mod period;
mod progress;
mod tui;

use anyhow::{Result, anyhow};
use clap::{Parser, Subcommand};
use db::Database;
use fetch::StatsClient;
use models::UserStats;

#[derive(Parser)]
#[command(name = "grind")]
#[command(about = "Friends leaderboard - track practice stats, period progress, and job applications")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database
    Init,

    /// Manage the roster
    User {
        #[command(subcommand)]
        command: UserCommands,
    },

    /// Manage the job application log
    Job {
        #[command(subcommand)]
        command: JobCommands,
    },

    /// Show a leaderboard
    Board {
        /// Which board: all, weekly, monthly, yearly, jobs
        #[arg(default_value = "all")]
        tab: String,

        /// Show the previous period instead of the live one
        #[arg(long)]
        prev: bool,
    },

    /// Browse the leaderboards interactively
    Browse,

    /// Repair denormalized data
    Cleanup {
        /// Recompute job counts from the job log
        #[arg(long)]
        counts: bool,

        /// Show what would change without changing it
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(Subcommand)]
enum UserCommands {
    /// Add a username to the roster (validated against the stats source)
    Add {
        username: String,

        /// Display name shown on the boards
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Remove a user and their job records
    Rm { username: String },

    /// List the roster
    List,

    /// Show one user and their job applications
    Show { username: String },

    /// Change a user's display name (omit NAME to clear it)
    Rename {
        username: String,
        name: Option<String>,
    },
}

#[derive(Subcommand)]
enum JobCommands {
    /// Log a job application for a user
    Add {
        username: String,
        title: String,
        company: String,

        /// Posting URL
        #[arg(short, long)]
        url: Option<String>,
    },

    /// List job applications
    List {
        /// Filter by username
        #[arg(short, long)]
        user: Option<String>,
    },

    /// Show job details
    Show { id: i64 },

    /// Advance a job one pipeline stage (wraps after offer)
    Advance { id: i64 },

    /// Delete a job record
    Rm { id: i64 },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let db = Database::open()?;

    match cli.command {
        Commands::Init => {
            db.init()?;
            println!("Database initialized at {}", db.path().display());
        }

        Commands::User { command } => {
            db.ensure_initialized()?;
            run_user_command(&db, command)?;
        }

        Commands::Job { command } => {
            db.ensure_initialized()?;
            run_job_command(&db, command)?;
        }

        Commands::Board { tab, prev } => {
            db.ensure_initialized()?;
            run_board(&db, &tab, prev)?;
        }

        Commands::Browse => {
            db.ensure_initialized()?;
            let client = StatsClient::from_env()?;
            tui::run_browse(&db, &client)?;
        }

        Commands::Cleanup { counts, dry_run } => {
            db.ensure_initialized()?;
            if !counts {
                println!("No cleanup operation specified. Use --counts");
            } else {
                let mismatches = db.reconcile_job_counts(dry_run)?;
                if mismatches.is_empty() {
                    println!("Job counts are consistent.");
                } else {
                    for (username, stored, actual) in &mismatches {
                        if dry_run {
                            println!("{}: {} recorded, {} actual (would fix)", username, stored, actual);
                        } else {
                            println!("{}: {} recorded, corrected to {}", username, stored, actual);
                        }
                    }
                }
            }
        }
    }

    Ok(())
}

fn run_user_command(db: &Database, command: UserCommands) -> Result<()> {
    match command {
        UserCommands::Add { username, name } => {
            let client = StatsClient::from_env()?;
            let stats = board::register_user(db, &client, &username, name.as_deref())?;
            println!(
                "Added '{}' ({} solved, {:.1} xp)",
                username, stats.total, stats.xp
            );
        }

        UserCommands::Rm { username } => {
            if db.remove_user(&username)? {
                println!("Removed '{}' from the roster.", username);
            } else {
                println!("'{}' is not on the roster.", username);
            }
        }

        UserCommands::List => {
            let users = db.list_users()?;
            if users.is_empty() {
                println!("Roster is empty.");
            } else {
                println!("{:<20} {:<20} {:>6} {:<20}", "USERNAME", "NAME", "JOBS", "ADDED");
                println!("{}", "-".repeat(68));
                for user in users {
                    println!(
                        "{:<20} {:<20} {:>6} {:<20}",
                        truncate(&user.username, 18),
                        truncate(user.name.as_deref().unwrap_or("-"), 18),
                        user.jobs_applied,
                        truncate(&user.created_at, 19)
                    );
                }
            }
        }

        UserCommands::Show { username } => match db.get_user(&username)? {
            Some(user) => {
                println!("{} ({})", user.display_name(), user.username);
                println!("Jobs applied: {}", user.jobs_applied);
                println!("Added: {}", user.created_at);
                let jobs = db.list_jobs(Some(&user.username))?;
                if !jobs.is_empty() {
                    println!("\nApplications ({}):", jobs.len());
                    for job in jobs {
                        println!(
                            "  #{} - {} at {} ({})",
                            job.id,
                            job.title,
                            job.company,
                            job.status.as_str()
                        );
                    }
                }
            }
            None => {
                println!("'{}' is not on the roster.", username);
            }
        },

        UserCommands::Rename { username, name } => {
            if db.rename_user(&username, name.as_deref())? {
                match name {
                    Some(name) => println!("'{}' now displays as '{}'.", username, name),
                    None => println!("Cleared display name for '{}'.", username),
                }
            } else {
                println!("'{}' is not on the roster.", username);
            }
        }
    }
    Ok(())
}

fn run_job_command(db: &Database, command: JobCommands) -> Result<()> {
    match command {
        JobCommands::Add {
            username,
            title,
            company,
            url,
        } => {
            // Reject bad input before touching the database.
            if title.trim().is_empty() {
                return Err(anyhow!("job title is required"));
            }
            if company.trim().is_empty() {
                return Err(anyhow!("company is required"));
            }
            let id = db.add_job(&username, title.trim(), company.trim(), url.as_deref())?;
            println!("Logged job #{} for '{}'.", id, username);
        }

        JobCommands::List { user } => {
            let jobs = db.list_jobs(user.as_deref())?;
            if jobs.is_empty() {
                println!("No job applications found.");
            } else {
                println!(
                    "{:<6} {:<12} {:<16} {:<25} {:<20}",
                    "ID", "STATUS", "USER", "TITLE", "COMPANY"
                );
                println!("{}", "-".repeat(81));
                for job in jobs {
                    println!(
                        "{:<6} {:<12} {:<16} {:<25} {:<20}",
                        job.id,
                        job.status.as_str(),
                        truncate(&job.username, 14),
                        truncate(&job.title, 23),
                        truncate(&job.company, 18)
                    );
                }
            }
        }

        JobCommands::Show { id } => match db.get_job(id)? {
            Some(job) => {
                println!("Job #{}", job.id);
                println!("User: {}", job.username);
                println!("Title: {}", job.title);
                println!("Company: {}", job.company);
                if let Some(url) = &job.url {
                    println!("URL: {}", url);
                }
                println!("Status: {}", job.status.as_str());
                println!("Created: {}", job.created_at);
            }
            None => {
                println!("Job #{} not found.", id);
            }
        },

        JobCommands::Advance { id } => match db.advance_job(id)? {
            Some(status) => println!("Job #{} is now '{}'.", id, status.as_str()),
            None => println!("Job #{} not found.", id),
        },

        JobCommands::Rm { id } => {
            if db.delete_job(id)? {
                println!("Deleted job #{}.", id);
            } else {
                println!("Job #{} not found.", id);
            }
        }
    }
    Ok(())
}

fn run_board(db: &Database, tab: &str, prev: bool) -> Result<()> {
    if prev {
        let granularity = period::Granularity::parse(tab)
            .ok_or_else(|| anyhow!("--prev works with weekly, monthly, or yearly"))?;
        match board::previous_board(db, granularity)? {
            board::PrevBoard::NoBaseline { period_key, .. } => {
                println!(
                    "No baseline captured yet for {} {} - nothing to reconstruct.",
                    granularity.as_str(),
                    period_key
                );
            }
            board::PrevBoard::Board { period_key, rows, .. } => {
                println!("Previous {} ({})", granularity.label(), period_key);
                print_stats_table(&rows);
            }
        }
        return Ok(());
    }

    let client = StatsClient::from_env()?;
    let data = board::refresh(db, &client)?;
    if data.all_time.is_empty() {
        println!("Roster is empty. Add someone with 'grind user add <username>'.");
        return Ok(());
    }

    match tab {
        "all" | "all-time" => {
            println!("All-time leaderboard");
            print_stats_table(&data.all_time);
        }
        "jobs" => {
            println!("Job applications leaderboard");
            print_stats_table(&data.jobs);
        }
        _ => {
            let granularity = period::Granularity::parse(tab).ok_or_else(|| {
                anyhow!("unknown board '{}' (all, weekly, monthly, yearly, jobs)", tab)
            })?;
            let period_board = data
                .periods
                .iter()
                .find(|p| p.granularity == granularity)
                .ok_or_else(|| anyhow!("missing {} board", granularity.as_str()))?;
            println!(
                "{} leaderboard ({}) - resets in {}",
                granularity.label(),
                period_board.period_key,
                period::format_remaining(period_board.remaining_ms)
            );
            if period_board.baseline_missing {
                println!("No baseline captured yet - progress shows zero until one is stored.");
            }
            print_stats_table(&period_board.rows);
        }
    }

    Ok(())
}

fn print_stats_table(rows: &[UserStats]) {
    println!(
        "{:<5} {:<20} {:>6} {:>6} {:>6} {:>7} {:>6} {:>9}",
        "RANK", "USER", "EASY", "MED", "HARD", "TOTAL", "JOBS", "XP"
    );
    println!("{}", "-".repeat(72));
    for (i, row) in rows.iter().enumerate() {
        match &row.error {
            Some(error) => {
                println!(
                    "{:<5} {:<20} error: {}",
                    i + 1,
                    truncate(row.display_name(), 18),
                    truncate(error, 42)
                );
            }
            None => {
                println!(
                    "{:<5} {:<20} {:>6} {:>6} {:>6} {:>7} {:>6} {:>9.1}",
                    i + 1,
                    truncate(row.display_name(), 18),
                    row.easy,
                    row.medium,
                    row.hard,
                    row.total,
                    row.jobs_applied,
                    row.xp
                );
            }
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        format!("{}...", &s[..max.saturating_sub(3)])
    }
}
