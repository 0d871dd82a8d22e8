//! Birthday records, contributions and the chat-facing value types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::BirthDateError;

/// Stored form of [`BirthDate::Unknown`].
pub const UNKNOWN_BIRTH_DATE: &str = "1900-01-01";

/// A year-less recurring birth date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum BirthDate {
    /// A real day and month.
    Known { day: u32, month: u32 },
    /// Placeholder for a celebrant registered before their date is known.
    Unknown,
}

impl BirthDate {
    /// Create a known birth date, validated against a leap year so that
    /// 29 February is accepted.
    pub fn new(day: u32, month: u32) -> Result<Self, BirthDateError> {
        if NaiveDate::from_ymd_opt(2000, month, day).is_none() {
            return Err(BirthDateError::OutOfRange { day, month });
        }
        Ok(Self::Known { day, month })
    }

    pub fn is_known(&self) -> bool {
        matches!(self, Self::Known { .. })
    }

    /// The calendar date this birthday falls on in `year`.
    ///
    /// A 29 February birthday falls on 1 March in non-leap years.
    pub fn occurrence_in(&self, year: i32) -> Option<NaiveDate> {
        match *self {
            Self::Known { day, month } => NaiveDate::from_ymd_opt(year, month, day)
                .or_else(|| NaiveDate::from_ymd_opt(year, 3, 1)),
            Self::Unknown => None,
        }
    }

    /// Month number (1-12), if known.
    pub fn month(&self) -> Option<u32> {
        match *self {
            Self::Known { month, .. } => Some(month),
            Self::Unknown => None,
        }
    }

    /// Day of month, if known.
    pub fn day(&self) -> Option<u32> {
        match *self {
            Self::Known { day, .. } => Some(day),
            Self::Unknown => None,
        }
    }
}

impl FromStr for BirthDate {
    type Err = BirthDateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s == UNKNOWN_BIRTH_DATE || s.eq_ignore_ascii_case("unknown") {
            return Ok(Self::Unknown);
        }

        let (day, month) = s
            .split_once('-')
            .ok_or_else(|| BirthDateError::Format(s.to_string()))?;
        let two_digits = |part: &str| part.len() == 2 && part.bytes().all(|b| b.is_ascii_digit());
        if !two_digits(day) || !two_digits(month) {
            return Err(BirthDateError::Format(s.to_string()));
        }

        let day = day
            .parse()
            .map_err(|_| BirthDateError::Format(s.to_string()))?;
        let month = month
            .parse()
            .map_err(|_| BirthDateError::Format(s.to_string()))?;
        Self::new(day, month)
    }
}

impl fmt::Display for BirthDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Known { day, month } => write!(f, "{:02}-{:02}", day, month),
            Self::Unknown => f.write_str(UNKNOWN_BIRTH_DATE),
        }
    }
}

impl TryFrom<String> for BirthDate {
    type Error = BirthDateError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<BirthDate> for String {
    fn from(value: BirthDate) -> Self {
        value.to_string()
    }
}

/// One tracked person.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BirthdayRecord {
    pub person_id: String,
    pub birth_date: BirthDate,
    /// Date of the most recent collection trigger.
    pub last_notification_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BirthdayRecord {
    /// A fresh record with no notification history.
    pub fn new(person_id: impl Into<String>, birth_date: BirthDate) -> Self {
        let now = Utc::now();
        Self {
            person_id: person_id.into(),
            birth_date,
            last_notification_date: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Kind of contributed content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContributionKind {
    /// A birthday message, posted as its own thread reply.
    Message,
    /// A short description of the celebrant, aggregated into one reply.
    Description,
}

impl ContributionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::Description => "description",
        }
    }
}

impl fmt::Display for ContributionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted contribution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contribution {
    /// Store-assigned id, increasing in creation order.
    pub id: i64,
    pub kind: ContributionKind,
    pub celebrant_id: String,
    pub sender_id: String,
    pub sender_display_name: String,
    pub body: String,
    /// Only ever set on messages.
    pub media_url: Option<String>,
    pub sent: bool,
    pub created_at: DateTime<Utc>,
}

/// A contribution about to be inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewContribution {
    pub kind: ContributionKind,
    pub celebrant_id: String,
    pub sender_id: String,
    pub sender_display_name: String,
    pub body: String,
    pub media_url: Option<String>,
}

impl NewContribution {
    /// A birthday message with optional media.
    pub fn message(
        celebrant_id: impl Into<String>,
        sender_id: impl Into<String>,
        sender_display_name: impl Into<String>,
        body: impl Into<String>,
        media_url: Option<String>,
    ) -> Self {
        Self {
            kind: ContributionKind::Message,
            celebrant_id: celebrant_id.into(),
            sender_id: sender_id.into(),
            sender_display_name: sender_display_name.into(),
            body: body.into(),
            media_url,
        }
    }

    /// A description of the celebrant.
    pub fn description(
        celebrant_id: impl Into<String>,
        sender_id: impl Into<String>,
        sender_display_name: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            kind: ContributionKind::Description,
            celebrant_id: celebrant_id.into(),
            sender_id: sender_id.into(),
            sender_display_name: sender_display_name.into(),
            body: body.into(),
            media_url: None,
        }
    }
}

/// Account flags reported by the directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountFlags {
    pub is_bot: bool,
    /// Deleted or deactivated.
    pub deleted: bool,
    /// Multi-channel guest.
    pub restricted: bool,
    /// Single-channel guest.
    pub ultra_restricted: bool,
    /// Platform-reserved system account.
    pub system: bool,
}

/// A directory entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub display_name: String,
    pub flags: AccountFlags,
}

impl Account {
    /// True for active, full members who are people.
    pub fn is_active_human(&self) -> bool {
        let f = &self.flags;
        !(f.is_bot || f.deleted || f.restricted || f.ultra_restricted || f.system)
    }
}

/// Handle to a posted message, usable as a thread root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageHandle {
    pub channel: String,
    /// Platform message id (a Slack `ts`).
    pub id: String,
}

/// An inline image attached to a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    pub url: String,
    pub alt_text: String,
}

/// The interactive collection request delivered during fan-out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionForm {
    pub celebrant_id: String,
    /// Placeholder question for the description field.
    pub description_prompt: String,
}

/// Platform-neutral message body. Adapters render it to their own format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageContent {
    /// Plain text, also used as the notification fallback.
    pub text: String,
    /// Emphasised heading rendered above `text`, if any.
    pub heading: Option<String>,
    pub image: Option<Image>,
    pub form: Option<CollectionForm>,
}

impl MessageContent {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            heading: None,
            image: None,
            form: None,
        }
    }

    pub fn with_heading(mut self, heading: impl Into<String>) -> Self {
        self.heading = Some(heading.into());
        self
    }

    pub fn with_image(mut self, url: impl Into<String>, alt_text: impl Into<String>) -> Self {
        self.image = Some(Image {
            url: url.into(),
            alt_text: alt_text.into(),
        });
        self
    }

    pub fn with_form(mut self, form: CollectionForm) -> Self {
        self.form = Some(form);
        self
    }
}

/// Severity of an administrative notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        })
    }
}

/// Slack-style mention markup for a user id.
pub fn mention(user_id: &str) -> String {
    format!("<@{}>", user_id)
}
