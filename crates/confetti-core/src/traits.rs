//! Collaborator seams used by the engine.
//!
//! Each trait is implemented by an adapter crate (`confetti-slack`,
//! `confetti-store`) or by in-memory fakes in tests.

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::{
    Account, BirthDate, BirthdayRecord, Contribution, ContributionKind, DeliveryError,
    GenerationError, MessageContent, MessageHandle, NewContribution, Severity, StoreError,
};

/// User directory of the chat platform.
#[async_trait]
pub trait Directory: Send + Sync {
    /// Every account in the workspace, with flags for filtering.
    async fn list_accounts(&self) -> Result<Vec<Account>, DeliveryError>;

    /// Look up a single account. `Ok(None)` when the id is unknown.
    async fn lookup_account(&self, id: &str) -> Result<Option<Account>, DeliveryError>;
}

/// Outbound messaging on the chat platform.
#[async_trait]
pub trait Messaging: Send + Sync {
    /// Post to a channel (or DM channel), optionally as a reply in `thread`.
    async fn post_message(
        &self,
        target: &str,
        content: &MessageContent,
        thread: Option<&MessageHandle>,
    ) -> Result<MessageHandle, DeliveryError>;

    /// Open (or reuse) the direct-message channel with a user.
    async fn open_direct_channel(&self, user_id: &str) -> Result<String, DeliveryError>;

    async fn delete_message(&self, channel: &str, message_id: &str) -> Result<(), DeliveryError>;
}

/// Outcome of an atomic same-day notification claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationClaim {
    /// The claim was taken; `previous` is the value it replaced.
    Acquired { previous: Option<NaiveDate> },
    /// A notification was already recorded for that date.
    AlreadyClaimed,
    /// No such birthday record.
    UnknownPerson,
}

/// Persistent record store.
#[async_trait]
pub trait BirthdayStore: Send + Sync {
    async fn get_birthday(&self, person_id: &str) -> Result<Option<BirthdayRecord>, StoreError>;

    /// Create or replace a person's birth date. Clears the notification date.
    async fn upsert_birthday(
        &self,
        person_id: &str,
        birth_date: BirthDate,
    ) -> Result<BirthdayRecord, StoreError>;

    /// Insert a placeholder with the sentinel date if the person is absent.
    /// Returns true when a record was created.
    async fn ensure_placeholder(&self, person_id: &str) -> Result<bool, StoreError>;

    async fn list_birthdays(&self) -> Result<Vec<BirthdayRecord>, StoreError>;

    /// Atomically set `last_notification_date = date` unless it already is.
    async fn claim_notification(
        &self,
        person_id: &str,
        date: NaiveDate,
    ) -> Result<NotificationClaim, StoreError>;

    /// Overwrite the notification date (used to record or release a claim).
    async fn set_last_notification(
        &self,
        person_id: &str,
        date: Option<NaiveDate>,
    ) -> Result<(), StoreError>;

    async fn insert_contribution(
        &self,
        contribution: NewContribution,
    ) -> Result<Contribution, StoreError>;

    /// Unsent contributions for a celebrant, oldest first.
    async fn unsent_contributions(
        &self,
        celebrant_id: &str,
        kind: ContributionKind,
    ) -> Result<Vec<Contribution>, StoreError>;

    async fn count_unsent(
        &self,
        celebrant_id: &str,
        kind: ContributionKind,
    ) -> Result<usize, StoreError>;

    /// Flip `sent` for exactly the given rows of this celebrant and kind.
    /// Returns the number of rows changed.
    async fn mark_sent(
        &self,
        celebrant_id: &str,
        kind: ContributionKind,
        ids: &[i64],
    ) -> Result<usize, StoreError>;
}

/// Text generation for the celebration poem.
#[async_trait]
pub trait PoemGenerator: Send + Sync {
    async fn generate_poem(&self, descriptions: &[String]) -> Result<String, GenerationError>;
}

/// Administrative notices. Implementations swallow their own failures.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, severity: Severity, text: &str);
}
