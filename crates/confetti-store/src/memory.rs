//! In-memory record store.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};

use confetti_core::{
    BirthDate, BirthdayRecord, BirthdayStore, Contribution, ContributionKind, NewContribution,
    NotificationClaim, StoreError,
};

#[derive(Default)]
struct State {
    birthdays: BTreeMap<String, BirthdayRecord>,
    contributions: Vec<Contribution>,
    next_id: i64,
}

/// A store that keeps everything in process memory.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every contribution for a celebrant, sent or not, in creation order.
    pub fn contributions_for(&self, celebrant_id: &str) -> Result<Vec<Contribution>, StoreError> {
        Ok(self
            .state()?
            .contributions
            .iter()
            .filter(|c| c.celebrant_id == celebrant_id)
            .cloned()
            .collect())
    }

    fn state(&self) -> Result<MutexGuard<'_, State>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::Backend("memory store mutex poisoned".to_string()))
    }
}

#[async_trait]
impl BirthdayStore for MemoryStore {
    async fn get_birthday(&self, person_id: &str) -> Result<Option<BirthdayRecord>, StoreError> {
        Ok(self.state()?.birthdays.get(person_id).cloned())
    }

    async fn upsert_birthday(
        &self,
        person_id: &str,
        birth_date: BirthDate,
    ) -> Result<BirthdayRecord, StoreError> {
        let mut state = self.state()?;
        let record = state
            .birthdays
            .entry(person_id.to_string())
            .and_modify(|r| {
                r.birth_date = birth_date;
                r.last_notification_date = None;
                r.updated_at = Utc::now();
            })
            .or_insert_with(|| BirthdayRecord::new(person_id, birth_date));
        Ok(record.clone())
    }

    async fn ensure_placeholder(&self, person_id: &str) -> Result<bool, StoreError> {
        let mut state = self.state()?;
        if state.birthdays.contains_key(person_id) {
            return Ok(false);
        }
        state.birthdays.insert(
            person_id.to_string(),
            BirthdayRecord::new(person_id, BirthDate::Unknown),
        );
        Ok(true)
    }

    async fn list_birthdays(&self) -> Result<Vec<BirthdayRecord>, StoreError> {
        Ok(self.state()?.birthdays.values().cloned().collect())
    }

    async fn claim_notification(
        &self,
        person_id: &str,
        date: NaiveDate,
    ) -> Result<NotificationClaim, StoreError> {
        let mut state = self.state()?;
        let Some(record) = state.birthdays.get_mut(person_id) else {
            return Ok(NotificationClaim::UnknownPerson);
        };
        if record.last_notification_date == Some(date) {
            return Ok(NotificationClaim::AlreadyClaimed);
        }
        let previous = record.last_notification_date.replace(date);
        record.updated_at = Utc::now();
        Ok(NotificationClaim::Acquired { previous })
    }

    async fn set_last_notification(
        &self,
        person_id: &str,
        date: Option<NaiveDate>,
    ) -> Result<(), StoreError> {
        let mut state = self.state()?;
        if let Some(record) = state.birthdays.get_mut(person_id) {
            record.last_notification_date = date;
            record.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn insert_contribution(
        &self,
        contribution: NewContribution,
    ) -> Result<Contribution, StoreError> {
        let mut state = self.state()?;
        state.next_id += 1;
        let stored = Contribution {
            id: state.next_id,
            kind: contribution.kind,
            celebrant_id: contribution.celebrant_id,
            sender_id: contribution.sender_id,
            sender_display_name: contribution.sender_display_name,
            body: contribution.body,
            media_url: contribution.media_url,
            sent: false,
            created_at: Utc::now(),
        };
        state.contributions.push(stored.clone());
        Ok(stored)
    }

    async fn unsent_contributions(
        &self,
        celebrant_id: &str,
        kind: ContributionKind,
    ) -> Result<Vec<Contribution>, StoreError> {
        // Insertion order is creation order.
        Ok(self
            .state()?
            .contributions
            .iter()
            .filter(|c| c.celebrant_id == celebrant_id && c.kind == kind && !c.sent)
            .cloned()
            .collect())
    }

    async fn count_unsent(
        &self,
        celebrant_id: &str,
        kind: ContributionKind,
    ) -> Result<usize, StoreError> {
        Ok(self
            .state()?
            .contributions
            .iter()
            .filter(|c| c.celebrant_id == celebrant_id && c.kind == kind && !c.sent)
            .count())
    }

    async fn mark_sent(
        &self,
        celebrant_id: &str,
        kind: ContributionKind,
        ids: &[i64],
    ) -> Result<usize, StoreError> {
        let mut state = self.state()?;
        let mut changed = 0;
        for c in state.contributions.iter_mut() {
            if c.celebrant_id == celebrant_id && c.kind == kind && !c.sent && ids.contains(&c.id) {
                c.sent = true;
                changed += 1;
            }
        }
        Ok(changed)
    }
}
