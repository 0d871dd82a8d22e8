//! In-memory collaborators for engine tests.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::time::Instant;

use confetti_core::{
    Account, AccountFlags, BirthDate, BirthdayRecord, BirthdayStore, Contribution,
    ContributionKind, DeliveryError, Directory, EngineConfig, FixedClock, GenerationError,
    HolidaySet, MessageContent, MessageHandle, Messaging, NewContribution, NotificationClaim,
    Notifier, PoemGenerator, Severity, StoreError,
};
use confetti_scheduler::Services;
use confetti_store::MemoryStore;

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn human(id: &str, name: &str) -> Account {
    Account {
        id: id.to_string(),
        display_name: name.to_string(),
        flags: AccountFlags::default(),
    }
}

pub fn bot(id: &str) -> Account {
    Account {
        id: id.to_string(),
        display_name: id.to_string(),
        flags: AccountFlags {
            is_bot: true,
            ..Default::default()
        },
    }
}

// === Directory ===

#[derive(Default)]
pub struct FakeDirectory {
    pub accounts: Mutex<Vec<Account>>,
    pub fail_listing: AtomicBool,
    pub list_calls: AtomicUsize,
}

impl FakeDirectory {
    pub fn with_accounts(accounts: Vec<Account>) -> Self {
        Self {
            accounts: Mutex::new(accounts),
            ..Default::default()
        }
    }
}

#[async_trait]
impl Directory for FakeDirectory {
    async fn list_accounts(&self) -> Result<Vec<Account>, DeliveryError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(DeliveryError::Http("directory unavailable".to_string()));
        }
        Ok(self.accounts.lock().unwrap().clone())
    }

    async fn lookup_account(&self, id: &str) -> Result<Option<Account>, DeliveryError> {
        Ok(self
            .accounts
            .lock()
            .unwrap()
            .iter()
            .find(|a| a.id == id)
            .cloned())
    }
}

// === Messaging ===

#[derive(Debug, Clone)]
pub struct Post {
    pub target: String,
    pub content: MessageContent,
    pub thread: Option<MessageHandle>,
    pub handle: MessageHandle,
}

#[derive(Default)]
pub struct RecordingMessenger {
    pub posts: Mutex<Vec<Post>>,
    pub deleted: Mutex<Vec<(String, String)>>,
    /// Direct channels opened, with the (virtual) time they were opened.
    pub opened: Mutex<Vec<(String, Instant)>>,
    /// Users whose direct messages are closed.
    pub closed: Mutex<HashSet<String>>,
    /// Reject every post carrying an image.
    pub reject_images: AtomicBool,
    /// Reject posts to these targets.
    pub failing_targets: Mutex<HashSet<String>>,
    counter: AtomicUsize,
}

impl RecordingMessenger {
    pub fn close_dms(&self, user: &str) {
        self.closed.lock().unwrap().insert(user.to_string());
    }

    pub fn fail_target(&self, target: &str) {
        self.failing_targets.lock().unwrap().insert(target.to_string());
    }

    pub fn posts(&self) -> Vec<Post> {
        self.posts.lock().unwrap().clone()
    }

    pub fn posts_to(&self, target: &str) -> Vec<Post> {
        self.posts()
            .into_iter()
            .filter(|p| p.target == target)
            .collect()
    }

    /// Posts carrying a collection form.
    pub fn forms(&self) -> Vec<Post> {
        self.posts()
            .into_iter()
            .filter(|p| p.content.form.is_some())
            .collect()
    }
}

#[async_trait]
impl Messaging for RecordingMessenger {
    async fn post_message(
        &self,
        target: &str,
        content: &MessageContent,
        thread: Option<&MessageHandle>,
    ) -> Result<MessageHandle, DeliveryError> {
        if self.failing_targets.lock().unwrap().contains(target) {
            return Err(DeliveryError::Api {
                method: "chat.postMessage".to_string(),
                error: "channel_not_found".to_string(),
            });
        }
        if content.image.is_some() && self.reject_images.load(Ordering::SeqCst) {
            return Err(DeliveryError::Api {
                method: "chat.postMessage".to_string(),
                error: "invalid_blocks".to_string(),
            });
        }

        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let handle = MessageHandle {
            channel: target.to_string(),
            id: format!("{}.000", n),
        };
        self.posts.lock().unwrap().push(Post {
            target: target.to_string(),
            content: content.clone(),
            thread: thread.cloned(),
            handle: handle.clone(),
        });
        Ok(handle)
    }

    async fn open_direct_channel(&self, user_id: &str) -> Result<String, DeliveryError> {
        self.opened
            .lock()
            .unwrap()
            .push((user_id.to_string(), Instant::now()));
        if self.closed.lock().unwrap().contains(user_id) {
            return Err(DeliveryError::DirectMessagesClosed {
                user: user_id.to_string(),
            });
        }
        Ok(format!("D-{}", user_id))
    }

    async fn delete_message(&self, channel: &str, message_id: &str) -> Result<(), DeliveryError> {
        self.deleted
            .lock()
            .unwrap()
            .push((channel.to_string(), message_id.to_string()));
        Ok(())
    }
}

// === Notifier ===

#[derive(Default)]
pub struct RecordingNotifier {
    pub notices: Mutex<Vec<(Severity, String)>>,
}

impl RecordingNotifier {
    pub fn notices(&self) -> Vec<(Severity, String)> {
        self.notices.lock().unwrap().clone()
    }

    pub fn with_severity(&self, severity: Severity) -> Vec<String> {
        self.notices()
            .into_iter()
            .filter(|(s, _)| *s == severity)
            .map(|(_, t)| t)
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, severity: Severity, text: &str) {
        self.notices
            .lock()
            .unwrap()
            .push((severity, text.to_string()));
    }
}

// === Poet ===

#[derive(Default)]
pub struct FakePoet {
    pub fail: AtomicBool,
    pub inputs: Mutex<Vec<Vec<String>>>,
}

#[async_trait]
impl PoemGenerator for FakePoet {
    async fn generate_poem(&self, descriptions: &[String]) -> Result<String, GenerationError> {
        self.inputs.lock().unwrap().push(descriptions.to_vec());
        if self.fail.load(Ordering::SeqCst) {
            return Err(GenerationError::Failed("service unavailable".to_string()));
        }
        Ok(format!("A poem about: {}", descriptions.join(", ")))
    }
}

// === Store ===

/// A [`MemoryStore`] that counts mark-as-sent writes and can fail listing.
#[derive(Default)]
pub struct CountingStore {
    pub inner: MemoryStore,
    pub mark_sent_calls: AtomicUsize,
    pub fail_listing: AtomicBool,
}

#[async_trait]
impl BirthdayStore for CountingStore {
    async fn get_birthday(&self, person_id: &str) -> Result<Option<BirthdayRecord>, StoreError> {
        self.inner.get_birthday(person_id).await
    }

    async fn upsert_birthday(
        &self,
        person_id: &str,
        birth_date: BirthDate,
    ) -> Result<BirthdayRecord, StoreError> {
        self.inner.upsert_birthday(person_id, birth_date).await
    }

    async fn ensure_placeholder(&self, person_id: &str) -> Result<bool, StoreError> {
        self.inner.ensure_placeholder(person_id).await
    }

    async fn list_birthdays(&self) -> Result<Vec<BirthdayRecord>, StoreError> {
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("disk on fire".to_string()));
        }
        self.inner.list_birthdays().await
    }

    async fn claim_notification(
        &self,
        person_id: &str,
        date: NaiveDate,
    ) -> Result<NotificationClaim, StoreError> {
        self.inner.claim_notification(person_id, date).await
    }

    async fn set_last_notification(
        &self,
        person_id: &str,
        date: Option<NaiveDate>,
    ) -> Result<(), StoreError> {
        self.inner.set_last_notification(person_id, date).await
    }

    async fn insert_contribution(
        &self,
        contribution: NewContribution,
    ) -> Result<Contribution, StoreError> {
        self.inner.insert_contribution(contribution).await
    }

    async fn unsent_contributions(
        &self,
        celebrant_id: &str,
        kind: ContributionKind,
    ) -> Result<Vec<Contribution>, StoreError> {
        self.inner.unsent_contributions(celebrant_id, kind).await
    }

    async fn count_unsent(
        &self,
        celebrant_id: &str,
        kind: ContributionKind,
    ) -> Result<usize, StoreError> {
        self.inner.count_unsent(celebrant_id, kind).await
    }

    async fn mark_sent(
        &self,
        celebrant_id: &str,
        kind: ContributionKind,
        ids: &[i64],
    ) -> Result<usize, StoreError> {
        self.mark_sent_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.mark_sent(celebrant_id, kind, ids).await
    }
}

// === Harness ===

pub const BIRTHDAY_CHANNEL: &str = "C_BDAY";
pub const ADMIN_CHANNEL: &str = "C_ADMIN";
pub const MANAGEMENT_CHANNEL: &str = "C_MGMT";
pub const HR_CHANNEL: &str = "C_HR";

pub struct Harness {
    pub store: Arc<CountingStore>,
    pub directory: Arc<FakeDirectory>,
    pub messenger: Arc<RecordingMessenger>,
    pub notifier: Arc<RecordingNotifier>,
    pub poet: Arc<FakePoet>,
    pub clock: Arc<FixedClock>,
    pub services: Services,
}

pub fn config() -> EngineConfig {
    EngineConfig::new(BIRTHDAY_CHANNEL, ADMIN_CHANNEL, MANAGEMENT_CHANNEL, HR_CHANNEL)
}

impl Harness {
    pub fn new(today: NaiveDate) -> Self {
        Self::with_config(today, config(), HolidaySet::new())
    }

    pub fn with_config(today: NaiveDate, config: EngineConfig, holidays: HolidaySet) -> Self {
        let store = Arc::new(CountingStore::default());
        let directory = Arc::new(FakeDirectory::default());
        let messenger = Arc::new(RecordingMessenger::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let poet = Arc::new(FakePoet::default());
        let clock = Arc::new(FixedClock::at_date(today, config.time_zone));

        let services = Services::new(
            Arc::new(config),
            store.clone(),
            directory.clone(),
            messenger.clone(),
            poet.clone(),
            notifier.clone(),
            clock.clone(),
        )
        .with_holidays(holidays);

        Self {
            store,
            directory,
            messenger,
            notifier,
            poet,
            clock,
            services,
        }
    }

    pub fn set_accounts(&self, accounts: Vec<Account>) {
        *self.directory.accounts.lock().unwrap() = accounts;
    }

    pub async fn add_birthday(&self, person_id: &str, day: u32, month: u32) {
        self.store
            .upsert_birthday(person_id, BirthDate::new(day, month).unwrap())
            .await
            .unwrap();
    }

    pub async fn add_message(&self, celebrant: &str, sender: &str, name: &str, body: &str) -> Contribution {
        self.store
            .insert_contribution(NewContribution::message(celebrant, sender, name, body, None))
            .await
            .unwrap()
    }

    /// Every stored contribution of `kind` for `celebrant`, sent or not.
    pub fn contributions(&self, celebrant: &str, kind: ContributionKind) -> Vec<Contribution> {
        self.store
            .inner
            .contributions_for(celebrant)
            .unwrap()
            .into_iter()
            .filter(|c| c.kind == kind)
            .collect()
    }

    pub fn mark_sent_calls(&self) -> usize {
        self.store.mark_sent_calls.load(Ordering::SeqCst)
    }
}
