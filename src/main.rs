mod commands;

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use uuid::Uuid;

use cykel_forecast::config::CykelConfig;
use cykel_forecast::{Mood, Symptom};

#[derive(Debug, Parser)]
#[command(name = "cykel", version, about = "Private, on-device cycle tracking")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Vault passphrase
    #[arg(long, global = true, env = "CYKEL_PASSPHRASE", hide_env_values = true)]
    pub passphrase: Option<String>,

    /// Whose periods to operate on
    #[arg(long, global = true, default_value = "local")]
    pub user: String,

    /// Only log errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create an empty encrypted vault
    Init,
    /// Record a period
    Add {
        #[arg(long)]
        start: NaiveDate,
        #[arg(long)]
        end: NaiveDate,
        #[arg(long = "symptom", value_parser = commands::parse_tag::<Symptom>)]
        symptoms: Vec<Symptom>,
        #[arg(long, value_parser = commands::parse_tag::<Mood>)]
        mood: Option<Mood>,
        #[arg(long)]
        note: Option<String>,
    },
    /// Change fields of a recorded period
    Update {
        id: Uuid,
        #[arg(long)]
        start: Option<NaiveDate>,
        #[arg(long)]
        end: Option<NaiveDate>,
        #[arg(long = "symptom", value_parser = commands::parse_tag::<Symptom>)]
        symptoms: Option<Vec<Symptom>>,
        #[arg(long, value_parser = commands::parse_tag::<Mood>, conflicts_with = "clear_mood")]
        mood: Option<Mood>,
        /// Remove the recorded mood
        #[arg(long)]
        clear_mood: bool,
        #[arg(long, conflicts_with = "clear_note")]
        note: Option<String>,
        /// Remove the note
        #[arg(long)]
        clear_note: bool,
    },
    /// Remove a recorded period
    Delete { id: Uuid },
    /// List recorded periods by start date
    List,
    /// Forecast the next period and fertile window
    Predict,
    /// Cycle length and duration statistics
    Stats,
    /// Dashboard figures relative to today
    Summary,
    /// Day-by-day calendar for a month
    Month { year: i32, month: u32 },
    /// Print every stored period as JSON
    Export,
    /// Permanently delete the vault and local cache
    Wipe {
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("cykel error: {error:#}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = CykelConfig::load().context("failed to load configuration")?;
    init_tracing(&config, cli.quiet, cli.verbose)?;

    commands::dispatch(cli, &config).await?;
    Ok(())
}

fn init_tracing(config: &CykelConfig, quiet: bool, verbose: bool) -> anyhow::Result<()> {
    let level = if quiet {
        "error"
    } else if verbose {
        "debug"
    } else {
        config.log.level.as_str()
    };

    let filter = tracing_subscriber::EnvFilter::try_from_env("CYKEL_LOG_FILTER")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|error| anyhow::anyhow!("failed to initialize tracing subscriber: {error}"))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::{CommandFactory, Parser};

    use super::{Cli, Command};

    #[test]
    fn clap_command_tree_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn add_parses_dates_and_tags() {
        let cli = Cli::parse_from([
            "cykel",
            "add",
            "--start",
            "2024-01-01",
            "--end",
            "2024-01-05",
            "--symptom",
            "cramps",
            "--symptom",
            "back_pain",
            "--mood",
            "tired",
        ]);
        match cli.command {
            Command::Add { symptoms, mood, .. } => {
                assert_eq!(symptoms.len(), 2);
                assert_eq!(mood, Some(cykel_forecast::Mood::Tired));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn update_can_clear_mood_and_note() {
        let id = uuid::Uuid::new_v4().to_string();
        let cli = Cli::parse_from(["cykel", "update", id.as_str(), "--clear-mood", "--clear-note"]);
        match cli.command {
            Command::Update {
                mood,
                clear_mood,
                note,
                clear_note,
                ..
            } => {
                assert!(clear_mood && clear_note);
                assert_eq!(mood, None);
                assert_eq!(note, None);
            }
            other => panic!("unexpected command {other:?}"),
        }

        let conflicting = Cli::try_parse_from([
            "cykel",
            "update",
            id.as_str(),
            "--mood",
            "happy",
            "--clear-mood",
        ]);
        assert!(conflicting.is_err());
    }
}
