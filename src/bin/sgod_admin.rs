//! SGOD reports administration CLI
//!
//! Seeds division data from YAML and operates the outbound email queue.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use sgod_reports::config::loader::DivisionSeed;
use sgod_reports::config::AppConfig;
use sgod_reports::database::Database;
use sgod_reports::notifications::{LogMailer, Mailer, NotificationService, RelayMailer};

#[derive(Parser)]
#[command(name = "sgod-admin")]
#[command(about = "Administer the SGOD reports database")]
struct Cli {
    /// Configuration file stem (defaults to sgod-reports)
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load districts, sections, schools, periods, templates and users
    Seed {
        /// Division YAML file
        #[arg(short, long)]
        file: PathBuf,

        /// Validate only, write nothing
        #[arg(long)]
        check: bool,
    },
    /// Outbound email queue
    Notifications {
        #[command(subcommand)]
        command: NotificationCommands,
    },
    /// Print the effective configuration as TOML
    ShowConfig,
}

#[derive(Subcommand)]
enum NotificationCommands {
    /// Deliver pending notifications
    Send {
        /// Maximum number of notifications to attempt
        #[arg(short, long)]
        limit: Option<i64>,

        /// Also retry failed notifications
        #[arg(long)]
        retry_failed: bool,

        /// Skip failed notifications with at least this many attempts
        #[arg(long)]
        max_retries: Option<i64>,
    },
    /// Show queue counts per status
    Status,
    /// Delete old sent notifications
    Purge {
        #[arg(long)]
        older_than_days: i64,

        /// Also delete failed notifications
        #[arg(long)]
        include_failed: bool,

        /// Report what would be deleted
        #[arg(long)]
        dry_run: bool,
    },
}

fn mailer_for(config: &AppConfig) -> anyhow::Result<Arc<dyn Mailer>> {
    let mailer: Arc<dyn Mailer> = match &config.notifications.relay_url {
        Some(url) => Arc::new(RelayMailer::new(
            url.clone(),
            Duration::from_secs(config.notifications.relay_timeout_secs),
        )?),
        None => Arc::new(LogMailer),
    };
    Ok(mailer)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "sgod_reports=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(stem) => AppConfig::load_from(stem),
        None => AppConfig::load(),
    }
    .context("loading configuration")?;

    match cli.command {
        Commands::ShowConfig => {
            println!("{}", config.to_toml()?);
        }
        Commands::Seed { file, check } => {
            let seed = DivisionSeed::load_from_file(&file)?;
            if check {
                seed.validate()?;
                println!("{} is valid", file.display());
                return Ok(());
            }
            let database = Database::new(&config.database_url).await?;
            database.run_migrations().await?;
            let report = seed
                .apply(database.pool())
                .await
                .with_context(|| format!("applying {}", file.display()))?;
            println!(
                "Seeded {} district(s), {} section(s), {} school(s) ({} profile(s)), {} period(s), {} template(s), {} user(s)",
                report.districts,
                report.sections,
                report.schools,
                report.profiles,
                report.periods,
                report.form_templates,
                report.users
            );
        }
        Commands::Notifications { command } => {
            let database = Database::new(&config.database_url).await?;
            database.run_migrations().await?;
            let service = NotificationService::new(database.pool().clone(), mailer_for(&config)?);
            match command {
                NotificationCommands::Send {
                    limit,
                    retry_failed,
                    max_retries,
                } => {
                    let sent = service.send_all_pending(limit, retry_failed, max_retries).await?;
                    println!("Sent {} notification(s)", sent);
                }
                NotificationCommands::Status => {
                    let summary = service.status_summary().await?;
                    println!("pending: {}", summary.pending);
                    println!("sent:    {}", summary.sent);
                    println!("failed:  {}", summary.failed);
                    if let Some(oldest) = summary.oldest_pending {
                        println!("oldest pending: {}", oldest.to_rfc3339());
                    }
                }
                NotificationCommands::Purge {
                    older_than_days,
                    include_failed,
                    dry_run,
                } => {
                    anyhow::ensure!(older_than_days >= 0, "--older-than-days must not be negative");
                    let count = service.purge(older_than_days, include_failed, dry_run).await?;
                    if dry_run {
                        println!("Would delete {} notification(s)", count);
                    } else {
                        println!("Deleted {} notification(s)", count);
                    }
                }
            }
        }
    }

    Ok(())
}
