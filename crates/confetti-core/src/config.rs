//! Engine configuration.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::NaiveTime;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Recipients per fan-out batch.
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Pause between fan-out batches.
pub const DEFAULT_BATCH_PAUSE: Duration = Duration::from_millis(2500);

/// Largest accepted stage threshold, in days.
const MAX_THRESHOLD_DAYS: u32 = 60;

/// A notification stage of an occasion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Fan out the collection request to colleagues.
    Collection,
    /// Remind management and HR of the celebration date.
    LeadershipDigest,
    /// Tell admins how many messages were collected.
    CountDigest,
    /// Publish the celebration thread.
    Celebration,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Collection => "collection",
            Self::LeadershipDigest => "leadership_digest",
            Self::CountDigest => "count_digest",
            Self::Celebration => "celebration",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Days before the celebration date at which each stage fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageThresholds {
    pub collection: u32,
    pub leadership_digest: u32,
    pub count_digest: u32,
    pub celebration: u32,
}

impl Default for StageThresholds {
    fn default() -> Self {
        Self {
            collection: 7,
            leadership_digest: 5,
            count_digest: 1,
            celebration: 0,
        }
    }
}

impl StageThresholds {
    /// Every stage with its threshold, in firing order.
    pub fn iter(&self) -> impl Iterator<Item = (Stage, u32)> {
        [
            (Stage::Collection, self.collection),
            (Stage::LeadershipDigest, self.leadership_digest),
            (Stage::CountDigest, self.count_digest),
            (Stage::Celebration, self.celebration),
        ]
        .into_iter()
    }

    /// The stages whose threshold equals `offset`.
    pub fn stages_at(&self, offset: i64) -> Vec<Stage> {
        self.iter()
            .filter(|(_, threshold)| i64::from(*threshold) == offset)
            .map(|(stage, _)| stage)
            .collect()
    }

    /// The largest threshold.
    pub fn max(&self) -> u32 {
        self.iter().map(|(_, t)| t).max().unwrap_or(0)
    }
}

/// How the distance between today and a celebration date is measured.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OffsetMode {
    /// Plain calendar days.
    #[default]
    CalendarDays,
    /// Working days only; a stage fires on the working day `n` working days
    /// before the celebration.
    WorkingDays,
}

impl FromStr for OffsetMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "calendar" | "calendar-days" | "calendar_days" => Ok(Self::CalendarDays),
            "working" | "working-days" | "working_days" => Ok(Self::WorkingDays),
            _ => Err(ConfigError::Invalid {
                field: "offset_mode",
                reason: format!("'{}', expected 'calendar' or 'working'", s),
            }),
        }
    }
}

/// Configuration threaded into every engine component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Where celebration threads are published.
    pub birthday_channel: String,
    /// Where administrative notices and digests go.
    pub admin_channel: String,
    /// Management channel for the leadership digest.
    pub management_channel: String,
    /// HR channel for the leadership digest.
    pub hr_channel: String,
    pub stages: StageThresholds,
    pub offset_mode: OffsetMode,
    pub batch_size: usize,
    pub batch_pause: Duration,
    /// Time zone in which "today" and the trigger time are evaluated.
    pub time_zone: Tz,
    /// Local time of the daily tick.
    pub trigger_time: NaiveTime,
}

impl EngineConfig {
    /// A configuration with default stages, batching and a 09:00 UTC tick.
    pub fn new(
        birthday_channel: impl Into<String>,
        admin_channel: impl Into<String>,
        management_channel: impl Into<String>,
        hr_channel: impl Into<String>,
    ) -> Self {
        Self {
            birthday_channel: birthday_channel.into(),
            admin_channel: admin_channel.into(),
            management_channel: management_channel.into(),
            hr_channel: hr_channel.into(),
            stages: StageThresholds::default(),
            offset_mode: OffsetMode::default(),
            batch_size: DEFAULT_BATCH_SIZE,
            batch_pause: DEFAULT_BATCH_PAUSE,
            time_zone: Tz::UTC,
            trigger_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap_or(NaiveTime::MIN),
        }
    }

    /// Check the configuration once at start-up.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("birthday_channel", &self.birthday_channel),
            ("admin_channel", &self.admin_channel),
            ("management_channel", &self.management_channel),
            ("hr_channel", &self.hr_channel),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::Missing(field));
            }
        }

        if self.batch_size == 0 {
            return Err(ConfigError::Invalid {
                field: "batch_size",
                reason: "must be at least 1".to_string(),
            });
        }

        if self.stages.collection <= self.stages.celebration {
            return Err(ConfigError::Invalid {
                field: "stages",
                reason: format!(
                    "collection ({}) must fire before celebration ({})",
                    self.stages.collection, self.stages.celebration
                ),
            });
        }

        if self.stages.max() > MAX_THRESHOLD_DAYS {
            return Err(ConfigError::Invalid {
                field: "stages",
                reason: format!("thresholds must be at most {} days", MAX_THRESHOLD_DAYS),
            });
        }

        Ok(())
    }
}

/// Parse an IANA time zone name such as `Europe/London`. `UTC` and `Z` are
/// accepted in any case.
pub fn parse_time_zone(s: &str) -> Result<Tz, ConfigError> {
    let token = s.trim();
    if token.eq_ignore_ascii_case("z") || token.eq_ignore_ascii_case("utc") {
        return Ok(Tz::UTC);
    }
    token.parse::<Tz>().map_err(|_| ConfigError::Invalid {
        field: "time_zone",
        reason: format!("'{}', expected a zone name such as Europe/London", s),
    })
}
