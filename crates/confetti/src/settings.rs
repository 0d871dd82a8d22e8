//! Command-line configuration and collaborator wiring.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveTime;
use clap::Args;
use miette::Result;
use tracing::{info, warn};

use confetti_core::{
    ConfigError, EngineConfig, Messaging, OffsetMode, PoemGenerator, StageThresholds,
    SystemClock, Tz, parse_time_zone,
};
use confetti_scheduler::{Services, load_holidays};
use confetti_slack::{ChannelNotifier, SlackClient};
use confetti_store::SqliteStore;

use crate::poet::{AnthropicPoet, DEFAULT_MODEL, DisabledPoet};

fn parse_trigger_time(s: &str) -> Result<NaiveTime, ConfigError> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M").map_err(|_| ConfigError::Invalid {
        field: "trigger_time",
        reason: format!("'{}', expected HH:MM", s),
    })
}

/// Where the birthday database lives.
#[derive(Args, Debug, Clone)]
pub struct StoreArgs {
    /// SQLite database path (defaults to the user data directory)
    #[arg(long, env = "CONFETTI_DATABASE")]
    pub database: Option<PathBuf>,
}

impl StoreArgs {
    pub fn database_path(&self) -> PathBuf {
        self.database.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("confetti")
                .join("confetti.db")
        })
    }

    pub fn open(&self) -> Result<SqliteStore> {
        let path = self.database_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| miette::miette!("failed to create data directory: {}", e))?;
        }
        SqliteStore::open(&path).map_err(|e| miette::miette!("{}", e))
    }
}

/// Slack Web API credentials.
#[derive(Args, Debug, Clone)]
pub struct SlackArgs {
    /// Bot token (xoxb-)
    #[arg(long, env = "SLACK_BOT_TOKEN", hide_env_values = true)]
    pub bot_token: String,
}

impl SlackArgs {
    pub fn client(&self) -> SlackClient {
        SlackClient::new(&self.bot_token)
    }
}

/// Everything needed to run the engine against Slack.
#[derive(Args, Debug, Clone)]
pub struct EngineArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    #[command(flatten)]
    pub slack: SlackArgs,

    /// Channel where celebrations are posted
    #[arg(long, env = "CONFETTI_BIRTHDAY_CHANNEL")]
    pub birthday_channel: String,

    /// Channel for administrative notices
    #[arg(long, env = "CONFETTI_ADMIN_CHANNEL")]
    pub admin_channel: String,

    /// Management channel for the leadership reminder
    #[arg(long, env = "CONFETTI_MANAGEMENT_CHANNEL")]
    pub management_channel: String,

    /// HR channel for the leadership reminder
    #[arg(long, env = "CONFETTI_HR_CHANNEL")]
    pub hr_channel: String,

    /// Days before the celebration to request messages
    #[arg(long, env = "CONFETTI_COLLECTION_DAYS", default_value = "7")]
    pub collection_days: u32,

    /// Days before the celebration to remind management and HR
    #[arg(long, env = "CONFETTI_LEADERSHIP_DAYS", default_value = "5")]
    pub leadership_days: u32,

    /// Days before the celebration to report the message count
    #[arg(long, env = "CONFETTI_COUNT_DAYS", default_value = "1")]
    pub count_days: u32,

    /// Count offsets in calendar or working days
    #[arg(long, env = "CONFETTI_OFFSET_MODE", default_value = "calendar")]
    pub offset_mode: OffsetMode,

    /// Recipients contacted concurrently per fan-out batch
    #[arg(long, env = "CONFETTI_BATCH_SIZE", default_value = "10")]
    pub batch_size: usize,

    /// Pause between fan-out batches in milliseconds
    #[arg(long, env = "CONFETTI_BATCH_PAUSE_MS", default_value = "2500")]
    pub batch_pause_ms: u64,

    /// Time zone that defines "today" and the trigger time
    #[arg(long, env = "CONFETTI_TIME_ZONE", default_value = "Europe/London", value_parser = parse_time_zone)]
    pub time_zone: Tz,

    /// Local time of the daily tick (HH:MM)
    #[arg(long, env = "CONFETTI_TRIGGER_TIME", default_value = "09:00", value_parser = parse_trigger_time)]
    pub trigger_time: NaiveTime,

    /// JSON file listing holiday dates, re-read before every tick
    #[arg(long, env = "CONFETTI_HOLIDAYS")]
    pub holidays: Option<PathBuf>,

    /// Anthropic API key; without one the fixed poem is used
    #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true)]
    pub anthropic_api_key: Option<String>,

    /// Model used for birthday poems
    #[arg(long, env = "CONFETTI_POEM_MODEL", default_value = DEFAULT_MODEL)]
    pub poem_model: String,
}

impl EngineArgs {
    /// Build and validate the engine configuration.
    pub fn engine_config(&self) -> Result<EngineConfig, ConfigError> {
        let mut config = EngineConfig::new(
            &self.birthday_channel,
            &self.admin_channel,
            &self.management_channel,
            &self.hr_channel,
        );
        config.stages = StageThresholds {
            collection: self.collection_days,
            leadership_digest: self.leadership_days,
            count_digest: self.count_days,
            celebration: 0,
        };
        config.offset_mode = self.offset_mode;
        config.batch_size = self.batch_size;
        config.batch_pause = Duration::from_millis(self.batch_pause_ms);
        config.time_zone = self.time_zone;
        config.trigger_time = self.trigger_time;
        config.validate()?;
        Ok(config)
    }

    /// Wire the engine to SQLite, Slack and the poem generator.
    pub async fn services(&self) -> Result<Services> {
        let config = self
            .engine_config()
            .map_err(|e| miette::miette!("invalid configuration: {}", e))?;
        let store = Arc::new(self.store.open()?);
        let slack = Arc::new(self.slack.client());
        let messaging: Arc<dyn Messaging> = slack.clone();
        let notifier = Arc::new(ChannelNotifier::new(
            messaging.clone(),
            &config.admin_channel,
        ));
        let poet: Arc<dyn PoemGenerator> = match &self.anthropic_api_key {
            Some(key) if !key.trim().is_empty() => {
                Arc::new(AnthropicPoet::new(key.trim(), &self.poem_model))
            }
            _ => {
                warn!("ANTHROPIC_API_KEY not set, birthday poems will use the fallback");
                Arc::new(DisabledPoet)
            }
        };
        let clock = Arc::new(SystemClock::new(config.time_zone));

        let mut services = Services::new(
            Arc::new(config),
            store,
            slack,
            messaging,
            poet,
            notifier,
            clock,
        );

        if let Some(path) = &self.holidays {
            // Fail fast on a broken file at start-up; later reloads keep the
            // previous set instead.
            let holidays = load_holidays(path)
                .await
                .map_err(|e| miette::miette!("{}", e))?;
            info!(path = %path.display(), count = holidays.len(), "holidays loaded");
            services = services.with_holidays(holidays).with_holiday_file(path);
        }

        Ok(services)
    }
}
