//! `pdi` -- inspect and maintain the PagerDuty incident log.
//!
//! Configuration comes from the environment (see `pdi_core::config`).

use clap::{Parser, Subcommand};

use pdi_core::config::Config;
use pdi_core::domain::IncidentSource;
use pdi_core::error::AppError;
use pdi_core::lifecycle::{self, OpenOutcome};
use pdi_core::pagerduty;
use pdi_core::row::parse_timestamp;
use pdi_core::schema::PAGERDUTY_INCIDENT;
use pdi_core::{db, repo, telemetry};

#[derive(Debug, Parser)]
#[command(name = "pdi", about = "PagerDuty incident log")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create or upgrade the database schema.
    Migrate,
    /// Print the table schema descriptor and its DDL.
    Schema,
    /// List incidents that have not ended yet, as JSON.
    OpenIncidents,
    /// Open an incident for a failing uptime or SSL check event.
    Open {
        #[arg(long, conflicts_with = "ssl_event", required_unless_present = "ssl_event")]
        uptime_event: Option<i32>,
        #[arg(long)]
        ssl_event: Option<i32>,
        /// RFC3339 start time.
        started_at: String,
    },
    /// Close the incident with the given deduplication key.
    Resolve {
        deduplication_key: String,
        /// RFC3339 end time.
        ended_at: String,
    },
}

fn parse_ts(field: &str, raw: &str) -> Result<time::OffsetDateTime, AppError> {
    parse_timestamp(raw).map_err(|e| {
        AppError::new("CLI_TS_PARSE_FAILED", format!("Failed to parse {field}"))
            .with_details(format!("value={raw}; err={e}"))
    })
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), AppError> {
    let out = serde_json::to_string_pretty(value).map_err(|e| {
        AppError::new("CLI_OUTPUT_FAILED", "Failed to serialize output").with_details(e.to_string())
    })?;
    println!("{out}");
    Ok(())
}

fn run(cli: Cli, config: &Config) -> Result<(), AppError> {
    if let Command::Schema = cli.command {
        print_json(&PAGERDUTY_INCIDENT)?;
        println!("{}", PAGERDUTY_INCIDENT.ddl());
        return Ok(());
    }

    let mut conn = db::open(&config.database_path)?;
    db::migrate(&mut conn)?;

    match cli.command {
        Command::Migrate | Command::Schema => Ok(()),
        Command::OpenIncidents => print_json(&repo::list_open_incidents(&conn)?),
        Command::Open {
            uptime_event,
            ssl_event,
            started_at,
        } => {
            let started_at = parse_ts("started_at", &started_at)?;
            let source = match (uptime_event, ssl_event) {
                (Some(id), _) => IncidentSource::Uptime(id),
                (None, Some(id)) => IncidentSource::Ssl(id),
                (None, None) => {
                    return Err(AppError::new(
                        "CLI_ARGS_INVALID",
                        "Either --uptime-event or --ssl-event is required",
                    ))
                }
            };
            let outcome = lifecycle::open_incident(&conn, &source.new_incident(started_at)?)?;
            if let (OpenOutcome::Opened(incident), Some(key)) =
                (&outcome, config.pagerduty_integration_key.as_deref())
            {
                let summary = format!("Incident {} opened", incident.deduplication_key());
                print_json(&pagerduty::trigger_request(
                    incident,
                    key,
                    summary,
                    "pdi",
                    pagerduty::Severity::Critical,
                ))?;
            }
            print_json(&outcome)
        }
        Command::Resolve {
            deduplication_key,
            ended_at,
        } => {
            let ended_at = parse_ts("ended_at", &ended_at)?;
            let outcome = lifecycle::resolve_incident(&conn, &deduplication_key, ended_at)?;
            if let (lifecycle::ResolveOutcome::Resolved(incident), Some(key)) =
                (&outcome, config.pagerduty_integration_key.as_deref())
            {
                print_json(&pagerduty::resolve_request(incident, key)?)?;
                if let Some(summary) = pagerduty::resolution_summary(incident) {
                    tracing::info!("{summary}");
                }
            }
            print_json(&outcome)
        }
    }
}

fn main() {
    let cli = Cli::parse();
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(2);
        }
    };
    telemetry::init(&config.log_filter);

    if let Err(e) = run(cli, &config) {
        tracing::error!(code = %e.code, details = ?e.details, "{}", e.message);
        eprintln!("{e}");
        std::process::exit(1);
    }
}
