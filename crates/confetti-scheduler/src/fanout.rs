//! Collection fan-out.
//!
//! Delivers the collection form to every eligible colleague of a celebrant.
//! Recipients are processed in fixed-size batches: members of a batch are
//! contacted concurrently, and a pause separates consecutive batches to stay
//! under the platform's rate limits. One recipient failing never affects
//! another.

use chrono::{Datelike, NaiveDate};
use futures_util::future::join_all;
use tracing::{debug, error, info, instrument, warn};

use confetti_core::{
    Account, CollectionForm, DeliveryError, MessageContent, NotificationClaim, OffsetMode,
    Severity, mention,
};

use crate::{EngineError, Services};

/// Placeholder questions for the description field.
pub const DESCRIPTION_PROMPTS: [&str; 6] = [
    "What makes them unique and essential?",
    "What's something you admire about them?",
    "What's their defining feature?",
    "What makes them amazing to work with?",
    "How would you describe them in one word?",
    "What's their superpower?",
];

/// Delivery statistics for one fan-out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanoutReport {
    /// Eligible recipients.
    pub targeted: usize,
    pub delivered: usize,
    pub failed: usize,
    pub batches: usize,
}

/// Result of [`CollectionFanout::trigger_collection`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FanoutOutcome {
    Delivered(FanoutReport),
    /// Already triggered for this celebrant today.
    AlreadySent,
    /// Reported administratively; carries the error text.
    Failed(String),
}

/// Active humans other than the celebrant.
pub fn eligible_recipients(accounts: Vec<Account>, celebrant_id: &str) -> Vec<Account> {
    accounts
        .into_iter()
        .filter(|a| a.is_active_human() && a.id != celebrant_id)
        .collect()
}

fn description_prompt(celebrant_id: &str, today: NaiveDate) -> &'static str {
    let seed = celebrant_id.bytes().map(u64::from).sum::<u64>() + u64::from(today.ordinal());
    DESCRIPTION_PROMPTS[(seed % DESCRIPTION_PROMPTS.len() as u64) as usize]
}

/// Sends collection requests.
#[derive(Clone)]
pub struct CollectionFanout {
    services: Services,
}

impl CollectionFanout {
    pub fn new(services: Services) -> Self {
        Self { services }
    }

    /// Fan out for `celebrant_id` as of the clock's today.
    pub async fn trigger_collection(&self, celebrant_id: &str) -> FanoutOutcome {
        let today = self.services.clock.today();
        self.trigger_collection_on(celebrant_id, today).await
    }

    /// Fan out for `celebrant_id`, recording `today` as the notification date.
    ///
    /// Never fails: errors are reported through the notifier and returned as
    /// [`FanoutOutcome::Failed`].
    #[instrument(skip(self), fields(celebrant = %celebrant_id))]
    pub async fn trigger_collection_on(&self, celebrant_id: &str, today: NaiveDate) -> FanoutOutcome {
        match self.run(celebrant_id, today).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(error = %e, "collection fan-out failed");
                self.services
                    .notifier
                    .notify(
                        Severity::Error,
                        &format!(
                            "Error triggering birthday collection for {}: {}",
                            mention(celebrant_id),
                            e
                        ),
                    )
                    .await;
                FanoutOutcome::Failed(e.to_string())
            }
        }
    }

    async fn run(&self, celebrant_id: &str, today: NaiveDate) -> Result<FanoutOutcome, EngineError> {
        let store = &self.services.store;

        let previous = match store.claim_notification(celebrant_id, today).await? {
            NotificationClaim::Acquired { previous } => previous,
            NotificationClaim::AlreadyClaimed => {
                info!("collection already sent today");
                self.services
                    .notifier
                    .notify(
                        Severity::Info,
                        &format!(
                            "Already sent birthday collection requests for {} today.",
                            mention(celebrant_id)
                        ),
                    )
                    .await;
                return Ok(FanoutOutcome::AlreadySent);
            }
            NotificationClaim::UnknownPerson => {
                return Err(EngineError::NotFound {
                    kind: "celebrant",
                    id: celebrant_id.to_string(),
                });
            }
        };

        let accounts = match self.services.directory.list_accounts().await {
            Ok(accounts) => accounts,
            Err(e) => {
                // Nothing was delivered, so let a rerun try again today.
                self.release_claim(celebrant_id, previous).await;
                return Err(e.into());
            }
        };

        let recipients = eligible_recipients(accounts, celebrant_id);
        let content = self.collection_request(celebrant_id, today);
        let report = self.deliver(&recipients, &content).await;

        info!(
            targeted = report.targeted,
            delivered = report.delivered,
            failed = report.failed,
            batches = report.batches,
            "collection fan-out complete"
        );
        self.services
            .notifier
            .notify(
                Severity::Info,
                &format!(
                    "Birthday message collection trigger sent to {} users for {}. {} delivered.",
                    report.targeted,
                    mention(celebrant_id),
                    report.delivered
                ),
            )
            .await;

        Ok(FanoutOutcome::Delivered(report))
    }

    async fn release_claim(&self, celebrant_id: &str, previous: Option<NaiveDate>) {
        if let Err(e) = self
            .services
            .store
            .set_last_notification(celebrant_id, previous)
            .await
        {
            warn!(error = %e, "failed to release notification claim");
        }
    }

    fn collection_request(&self, celebrant_id: &str, today: NaiveDate) -> MessageContent {
        let config = &self.services.config;
        let unit = match config.offset_mode {
            OffsetMode::CalendarDays => "days",
            OffsetMode::WorkingDays => "working days",
        };
        MessageContent::text(format!(
            "Birthday message collection for {}",
            mention(celebrant_id)
        ))
        .with_heading(format!(
            "Hey! :birthday: *{}* has a birthday coming up in {} {}!",
            mention(celebrant_id),
            config.stages.collection,
            unit
        ))
        .with_form(CollectionForm {
            celebrant_id: celebrant_id.to_string(),
            description_prompt: description_prompt(celebrant_id, today).to_string(),
        })
    }

    async fn deliver(&self, recipients: &[Account], content: &MessageContent) -> FanoutReport {
        let config = &self.services.config;
        let mut report = FanoutReport {
            targeted: recipients.len(),
            ..Default::default()
        };

        for (index, batch) in recipients.chunks(config.batch_size.max(1)).enumerate() {
            if index > 0 {
                tokio::time::sleep(config.batch_pause).await;
            }
            report.batches += 1;

            let results = join_all(batch.iter().map(|account| self.deliver_one(account, content))).await;
            for ok in results {
                if ok {
                    report.delivered += 1;
                } else {
                    report.failed += 1;
                }
            }
        }

        report
    }

    async fn deliver_one(&self, account: &Account, content: &MessageContent) -> bool {
        let messaging = &self.services.messaging;
        let result = async {
            let channel = messaging.open_direct_channel(&account.id).await?;
            messaging.post_message(&channel, content, None).await?;
            Ok::<(), DeliveryError>(())
        }
        .await;

        match result {
            Ok(()) => {
                debug!(recipient = %account.id, "collection request delivered");
                true
            }
            Err(DeliveryError::DirectMessagesClosed { .. }) => {
                info!(recipient = %account.id, "skipping recipient with closed direct messages");
                false
            }
            Err(e) => {
                warn!(recipient = %account.id, error = %e, "failed to deliver collection request");
                false
            }
        }
    }
}
