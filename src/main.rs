//! Sporacle bet list CLI
//!
//! Browse the odds program, build and save bet lists, and follow how they
//! resolved.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use colored::Colorize;
use rust_decimal::Decimal;
use sporacle::{
    Config, LocalStore, OddDetail, QueryLayer, ReferenceStore, Session, SnapshotFetcher, Source, Summary, ValidationWarning,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "sporacle")]
#[command(about = "Build and follow sports bet lists against the Sporacle odds database")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Download the latest reference odds database
    Fetch {
        /// Override the download URL
        #[arg(long)]
        url: Option<String>,
    },

    /// Create the local bet list database if it does not exist
    Init,

    /// Show upcoming matches with their odds
    Program {
        /// Maximum number of matches to show
        #[arg(short, long, default_value = "50")]
        limit: usize,
    },

    /// Show bet lists still waiting on a match
    Lists,

    /// Show one bet list with its odds and totals
    Show {
        name: String,

        /// Stake used for the potential payout
        #[arg(short, long)]
        amount: Option<Decimal>,
    },

    /// Show bet lists whose matches have all been played
    Resolved,

    /// Totals for a set of odds without saving anything
    Summary {
        /// Odd keys, one per match
        #[arg(long = "odd", required = true, num_args = 1..)]
        odds: Vec<String>,

        #[arg(short, long)]
        amount: Option<Decimal>,
    },

    /// Save a bet list
    Save {
        name: String,

        /// Odd keys, one per match
        #[arg(long = "odd", required = true, num_args = 1..)]
        odds: Vec<String>,

        /// Replace the odds of an existing list
        #[arg(long)]
        update: bool,
    },

    /// Delete a bet list
    Delete { name: String },

    /// Run a diagnostic SQL query
    Query {
        /// reference, local or combined (odds_db + local_db attached)
        #[arg(short, long, default_value = "combined")]
        source: Source,

        sql: String,
    },

    /// Copy the local database to a file
    Export { path: PathBuf },

    /// Replace the local database with a file
    Import { path: PathBuf },

    /// Replace the local database with an empty one
    Reset,

    /// Recompute cached match dates of every bet list
    RefreshDates,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .compact()
        .init();

    // Load configuration
    let config = Config::from_env()?;

    match cli.command {
        Commands::Fetch { url } => fetch(&config, url).await?,
        Commands::Init => init(&config).await?,
        Commands::Program { limit } => show_program(&config, limit).await?,
        Commands::Lists => show_lists(&config).await?,
        Commands::Show { name, amount } => show_bet_list(&config, &name, amount).await?,
        Commands::Resolved => show_resolved(&config).await?,
        Commands::Summary { odds, amount } => show_summary(&config, &odds, amount).await?,
        Commands::Save { name, odds, update } => save(&config, &name, &odds, update).await?,
        Commands::Delete { name } => delete(&config, &name).await?,
        Commands::Query { source, sql } => query(&config, source, &sql).await?,
        Commands::Export { path } => export(&config, &path).await?,
        Commands::Import { path } => import(&config, &path).await?,
        Commands::Reset => reset(&config).await?,
        Commands::RefreshDates => refresh_dates(&config).await?,
    }

    Ok(())
}

async fn open_layer(config: &Config) -> Result<QueryLayer> {
    let reference = ReferenceStore::open(&config.reference_db_path)
        .await
        .with_context(|| format!("Reference database {} unavailable, run `sporacle fetch`", config.reference_db_path))?;
    let local = LocalStore::open(&config.local_db_path)
        .await
        .with_context(|| format!("Failed to open local database {}", config.local_db_path))?;
    Ok(QueryLayer::open(Arc::new(reference), Arc::new(local)).await?)
}

fn header(title: &str) {
    println!("\n{}", "=".repeat(70));
    println!("  {}", title);
    println!("{}\n", "=".repeat(70));
}

async fn fetch(config: &Config, url: Option<String>) -> Result<()> {
    let url = url.unwrap_or_else(|| config.reference_db_url.clone());
    let fetcher = SnapshotFetcher::new()?;
    let bytes = fetcher.fetch(&url, &config.reference_db_path).await?;
    println!("Saved {} ({} KB)", config.reference_db_path, bytes / 1024);
    Ok(())
}

async fn init(config: &Config) -> Result<()> {
    let local = LocalStore::open(&config.local_db_path).await?;
    let count = local.bet_lists().await?.len();
    println!("Local database ready at {} ({} bet lists)", local.path().display(), count);
    Ok(())
}

async fn show_program(config: &Config, limit: usize) -> Result<()> {
    let layer = open_layer(config).await?;
    let program = layer.program(Utc::now()).await?;

    header(&format!("PROGRAM - {} upcoming matches", program.len()));

    for row in program.iter().take(limit) {
        println!(
            "[{}] {} | {} | {}",
            row.odd_match_code,
            row.match_date.format("%a %d/%m %H:%M"),
            row.competition_name.as_deref().unwrap_or("-"),
            row.description.bold()
        );
        let cells: Vec<String> = row
            .odds
            .populated()
            .map(|(label, value)| format!("{}: {:.2}", label, value))
            .collect();
        if cells.is_empty() {
            println!("    no odds published");
        } else {
            println!("    {}", cells.join("  "));
        }
    }

    if program.len() > limit {
        println!("\n... and {} more", program.len() - limit);
    }
    Ok(())
}

async fn show_lists(config: &Config) -> Result<()> {
    let layer = open_layer(config).await?;
    let lists = layer.on_going_bet_lists(Utc::now()).await?;

    header("ON-GOING BET LISTS");

    if lists.is_empty() {
        println!("No bet list waiting on a match.");
        return Ok(());
    }
    for list in &lists {
        println!(
            "  {:<30} {} odds | {} -> {}",
            list.bet_list_name,
            list.odds.len(),
            list.earliest_match_date.format("%d/%m %H:%M"),
            list.latest_match_date.format("%d/%m %H:%M")
        );
    }
    Ok(())
}

fn print_odds(odds: &[OddDetail]) {
    for odd in odds {
        let status = match odd.is_winning {
            Some(true) => "WON".green(),
            Some(false) => "LOST".red(),
            None => "-".normal(),
        };
        println!(
            "  {} | {:<35} {:<10} {:>6.2}  {}",
            odd.match_datetime.format("%d/%m %H:%M"),
            odd.match_description,
            odd.odd_name,
            odd.odd_value,
            status
        );
    }
}

fn print_summary(summary: &Summary) {
    println!("\n{}", "-".repeat(70));
    println!("  Matches:          {}", summary.match_count);
    println!("  Total price:      {:.2}", summary.total_price);
    println!("  Bet amount:       {}", summary.bet_amount);
    println!("  Potential payout: {}", summary.potential_payout);
}

async fn show_bet_list(config: &Config, name: &str, amount: Option<Decimal>) -> Result<()> {
    let amount = config.bet_amount(amount)?;
    let layer = open_layer(config).await?;
    let detail = layer.bet_list_detail(name).await?;

    header(&format!("BET LIST - {}", detail.bet_list.bet_list_name));
    println!(
        "  Created {} | Modified {}\n",
        detail.bet_list.creation_date.format("%Y-%m-%d %H:%M"),
        detail.bet_list.modification_date.format("%Y-%m-%d %H:%M")
    );

    print_odds(&detail.odds);
    print_summary(&Summary::from_odds(&detail.odds, amount)?);
    Ok(())
}

async fn show_resolved(config: &Config) -> Result<()> {
    let layer = open_layer(config).await?;
    let lists = layer.resolved_bet_lists(Utc::now()).await?;
    let counts = sporacle::WinLoseCount::from_lists(&lists);

    header(&format!(
        "RESOLVED BET LISTS - {} won / {} lost",
        counts.winning, counts.losing
    ));

    for list in &lists {
        let title = if list.is_winning() {
            format!("{} (WON)", list.bet_list_name).green().bold()
        } else {
            format!("{} ({} of {} odds lost)", list.bet_list_name, list.losing_count(), list.match_count())
                .red()
                .bold()
        };
        println!("{}  total {:.2}", title, list.total_price());
        print_odds(&list.odds);
        println!();
    }
    Ok(())
}

/// Put the given keys into the session, one odd per match
async fn fill_session(session: &mut Session, reference: &ReferenceStore, keys: &[String]) -> Result<()> {
    let now = Utc::now();
    for key in keys {
        let odd = reference.odd_detail(key).await?;
        let code = odd.odd_match_code;
        if odd.match_datetime <= now {
            return Err(ValidationWarning::MatchStarted(code).into());
        }
        session.selection.enter_match(code);
        if let Some(previous) = session.selection.choose_odd(code, odd)? {
            warn!("Odd {} replaces {} for match {}", key, previous.key, code);
        }
    }
    Ok(())
}

async fn show_summary(config: &Config, keys: &[String], amount: Option<Decimal>) -> Result<()> {
    let amount = config.bet_amount(amount)?;
    let layer = open_layer(config).await?;

    let mut session = Session::new();
    fill_session(&mut session, layer.reference(), keys).await?;

    header("SELECTION SUMMARY");
    let odds: Vec<OddDetail> = session.selection.chosen_odds().cloned().collect();
    print_odds(&odds);
    print_summary(&session.selection.checked_summary(amount)?);

    for warning in session.selection.warnings(config.min_odds_warning) {
        println!("  {}", warning.to_string().yellow());
    }
    Ok(())
}

async fn save(config: &Config, name: &str, keys: &[String], update: bool) -> Result<()> {
    let layer = open_layer(config).await?;
    let mut session = Session::new();

    if update {
        let detail = layer.bet_list_detail(name).await?;
        session.begin_update(detail);
        // The new keys replace the saved odds entirely
        session.selection = sporacle::Selection::new();
    }
    fill_session(&mut session, layer.reference(), keys).await?;

    for warning in session.selection.warnings(config.min_odds_warning) {
        println!("{}", warning.to_string().yellow());
    }

    let outcome = session.save(name, layer.local(), layer.reference()).await?;
    println!("Bet list '{}' {}", name.trim(), outcome);
    Ok(())
}

async fn delete(config: &Config, name: &str) -> Result<()> {
    let local = LocalStore::open(&config.local_db_path).await?;
    local.delete_bet_list(name).await?;
    println!("Bet list '{}' deleted", name);
    Ok(())
}

async fn query(config: &Config, source: Source, sql: &str) -> Result<()> {
    let layer = open_layer(config).await?;
    let table = layer.raw_query(source, sql).await?;

    if table.columns.is_empty() {
        println!("(no rows)");
        return Ok(());
    }
    println!("{}", table.columns.join(" | ").bold());
    for row in &table.rows {
        let cells: Vec<String> = row
            .iter()
            .map(|v| match v {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect();
        println!("{}", cells.join(" | "));
    }
    println!("\n{} rows", table.rows.len());
    Ok(())
}

async fn export(config: &Config, path: &PathBuf) -> Result<()> {
    let local = LocalStore::open(&config.local_db_path).await?;
    let bytes = local.export().await?;
    tokio::fs::write(path, &bytes)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("Exported {} bytes to {}", bytes.len(), path.display());
    Ok(())
}

async fn import(config: &Config, path: &PathBuf) -> Result<()> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let local = LocalStore::open(&config.local_db_path).await?;
    local.import(&bytes).await?;
    println!("Imported {} ({} bet lists)", path.display(), local.bet_lists().await?.len());
    Ok(())
}

async fn reset(config: &Config) -> Result<()> {
    let local = LocalStore::open(&config.local_db_path).await?;
    local.reset().await?;
    println!("Local database {} is now empty", local.path().display());
    Ok(())
}

async fn refresh_dates(config: &Config) -> Result<()> {
    // Stores opened directly: open_layer would already have refreshed them
    let reference = ReferenceStore::open(&config.reference_db_path).await?;
    let local = LocalStore::open(&config.local_db_path).await?;
    let changed = local.refresh_date_bounds(&reference).await?;
    println!("Updated match dates of {} bet lists", changed);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_save_accepts_several_odds() {
        let cli = Cli::try_parse_from(["sporacle", "save", "weekend", "--odd", "a", "b", "--update"]).unwrap();
        match cli.command {
            Commands::Save { name, odds, update } => {
                assert_eq!(name, "weekend");
                assert_eq!(odds, vec!["a", "b"]);
                assert!(update);
            }
            _ => panic!("expected save"),
        }
    }

    #[test]
    fn test_query_source_parses() {
        let cli = Cli::try_parse_from(["sporacle", "query", "-s", "local", "SELECT 1"]).unwrap();
        assert!(matches!(cli.command, Commands::Query { source: Source::Local, .. }));
        assert!(Cli::try_parse_from(["sporacle", "query", "-s", "mongo", "SELECT 1"]).is_err());
    }
}
