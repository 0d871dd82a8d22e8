//! Confetti: birthday celebrations for Slack workspaces
//!
//! Main binary with subcommands:
//! - `daemon`: Socket Mode intake plus the daily scheduler
//! - `tick`: evaluate every birthday once
//! - `set-birthday` / `list-birthdays`: manage birthday records
//! - `collect` / `publish`: run a single stage by hand

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use miette::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use confetti_core::BirthDate;
use confetti_scheduler::{
    CelebrationPublisher, CollectionFanout, FanoutOutcome, OccasionScheduler, PublishOutcome,
};

mod commands;
mod daemon;
mod poet;
mod settings;

use settings::{EngineArgs, SlackArgs, StoreArgs};

#[derive(Parser)]
#[command(name = "confetti")]
#[command(about = "Birthday celebrations for Slack", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the daemon (Socket Mode intake and daily scheduler)
    Daemon {
        #[command(flatten)]
        engine: EngineArgs,

        /// App-level token (xapp-) for Socket Mode
        #[arg(long, env = "SLACK_APP_TOKEN", hide_env_values = true)]
        app_token: String,
    },

    /// Evaluate every birthday once and run the stages that are due
    Tick {
        #[command(flatten)]
        engine: EngineArgs,

        /// Evaluate as of this date (YYYY-MM-DD) instead of today
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Record or change someone's birthday
    SetBirthday {
        #[command(flatten)]
        store: StoreArgs,

        #[command(flatten)]
        slack: SlackArgs,

        /// Slack user id or <@mention>
        user: String,

        /// Birth date as DD-MM
        date: BirthDate,
    },

    /// List known birthdays grouped by month
    ListBirthdays {
        #[command(flatten)]
        store: StoreArgs,

        #[command(flatten)]
        slack: SlackArgs,
    },

    /// Send the collection request for someone now
    Collect {
        #[command(flatten)]
        engine: EngineArgs,

        /// Slack user id or <@mention> of the celebrant
        user: String,
    },

    /// Publish someone's celebration thread now
    Publish {
        #[command(flatten)]
        engine: EngineArgs,

        /// Slack user id or <@mention> of the celebrant
        user: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "confetti=info,confetti_scheduler=info".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Daemon { engine, app_token } => {
            let services = engine.services().await?;
            daemon::run(services, &app_token).await
        }

        Commands::Tick { engine, date } => {
            let services = engine.services().await?;
            let today = date.unwrap_or_else(|| services.clock.today());
            let report = OccasionScheduler::new(services).tick(today).await;

            println!(
                "{}: {} evaluated, {} without a date, {} stages fired, {} failed",
                today,
                report.evaluated,
                report.skipped_unknown,
                report.fired.len(),
                report.failures.len()
            );
            for fired in &report.fired {
                println!("  {} {} (celebrated {})", fired.stage, fired.person_id, fired.celebration);
            }
            for failure in &report.failures {
                println!("  FAILED {} {}: {}", failure.stage, failure.person_id, failure.error);
            }
            match report.error {
                Some(e) => Err(miette::miette!("tick failed: {}", e)),
                None => Ok(()),
            }
        }

        Commands::SetBirthday {
            store,
            slack,
            user,
            date,
        } => {
            let (account, record) =
                commands::set_birthday(&store.open()?, &slack.client(), &user, date).await?;
            println!(
                "Set birthday for {} ({}) to {}",
                account.display_name, record.person_id, record.birth_date
            );
            Ok(())
        }

        Commands::ListBirthdays { store, slack } => {
            let listing = commands::birthday_listing(&store.open()?, &slack.client()).await?;
            print!("{}", listing);
            Ok(())
        }

        Commands::Collect { engine, user } => {
            let services = engine.services().await?;
            let account = commands::resolve_user(services.directory.as_ref(), &user).await?;
            match CollectionFanout::new(services)
                .trigger_collection(&account.id)
                .await
            {
                FanoutOutcome::Delivered(report) => {
                    println!(
                        "Collection request sent to {} of {} colleagues",
                        report.delivered, report.targeted
                    );
                    Ok(())
                }
                FanoutOutcome::AlreadySent => {
                    println!("Collection requests were already sent today");
                    Ok(())
                }
                FanoutOutcome::Failed(e) => Err(miette::miette!("collection failed: {}", e)),
            }
        }

        Commands::Publish { engine, user } => {
            let services = engine.services().await?;
            let account = commands::resolve_user(services.directory.as_ref(), &user).await?;
            match CelebrationPublisher::new(services).publish(&account.id).await {
                PublishOutcome::Default(_) => {
                    println!("No messages collected, posted the default greeting");
                    Ok(())
                }
                PublishOutcome::Thread(report) => {
                    println!(
                        "Published {} messages and {} descriptions",
                        report.messages_posted, report.descriptions_posted
                    );
                    Ok(())
                }
                PublishOutcome::Failed(e) => Err(miette::miette!("publish failed: {}", e)),
            }
        }
    }
}
