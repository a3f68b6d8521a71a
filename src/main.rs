use std::path::PathBuf;

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use growth_analytics::config::{GrowthConfig, CONFIG_ENV};
use growth_analytics::db::{self, PgRecordStore};
use growth_analytics::report::{render_markdown, write_trajectory_csv};
use growth_analytics::{AccessScope, GrowthEngine};

#[derive(Parser)]
#[command(name = "growth-report")]
#[command(about = "Student growth analytics for the speech and debate program", long_about = None)]
struct Cli {
    /// Optional TOML file with thresholds and skill taxonomy
    #[arg(long, global = true, env = CONFIG_ENV)]
    config: Option<PathBuf>,

    #[arg(long, global = true, env = "GROWTH_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Markdown,
    Json,
    Csv,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load demo students, sessions and cohort snapshots
    Seed,
    /// Build a growth report for one student
    Growth {
        #[arg(long)]
        student: String,
        /// week, month, term or year
        #[arg(long, default_value = "month")]
        timeframe: String,
        /// Report date (YYYY-MM-DD); sessions on this day are excluded
        #[arg(long)]
        as_of: Option<NaiveDate>,
        #[arg(long, value_enum, default_value_t = OutputFormat::Markdown)]
        format: OutputFormat,
        /// Restrict feedback to these instructors
        #[arg(long = "instructor")]
        instructors: Vec<String>,
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

fn init_tracing(level: &str, json: bool) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level.to_owned().into());

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.log_json);

    let config = GrowthConfig::load(cli.config.as_deref()).context("failed to load config")?;
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a production Postgres instance")?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")?;

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Growth {
            student,
            timeframe,
            as_of,
            format,
            instructors,
            out,
        } => {
            let scope = if instructors.is_empty() {
                AccessScope::All
            } else {
                AccessScope::Instructors(instructors)
            };
            let engine = GrowthEngine::from_config(PgRecordStore::new(pool, scope), &config)
                .context("invalid growth configuration")?;

            let report = engine
                .calculate_student_growth(&student, &timeframe, as_of)
                .await
                .with_context(|| format!("failed to build growth report for {student}"))?;

            let rendered = match format {
                OutputFormat::Markdown => render_markdown(&report).into_bytes(),
                OutputFormat::Json => serde_json::to_vec_pretty(&report)?,
                OutputFormat::Csv => {
                    let mut buffer = Vec::new();
                    write_trajectory_csv(&report, &mut buffer)?;
                    buffer
                }
            };

            match out {
                Some(path) => {
                    std::fs::write(&path, rendered)?;
                    println!("Report written to {}.", path.display());
                }
                None => {
                    use std::io::Write;
                    std::io::stdout().write_all(&rendered)?;
                }
            }
        }
    }

    Ok(())
}
