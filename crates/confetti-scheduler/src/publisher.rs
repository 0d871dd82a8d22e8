//! Celebration publisher.
//!
//! On the celebration date, posts a root message to the birthday channel and
//! threads the collected content beneath it: an optional poem and the
//! description digest, then each message as its own reply. Content is marked
//! sent by id once posted, so anything submitted mid-publish waits for the
//! next cycle. Posting is at-least-once; a failure part way leaves earlier
//! replies in place.

use tracing::{error, info, instrument, warn};

use confetti_core::{
    Contribution, ContributionKind, MessageContent, MessageHandle, Severity, mention,
};

use crate::{EngineError, Services};

/// Posted in place of a generated poem.
pub const FALLBACK_POEM: &str = "Another trip around the sun,\n\
    another year of work and fun.\n\
    Your colleagues all agree it's true:\n\
    the team is better thanks to you!";

const DESCRIPTIONS_HEADING: &str = "*Here's what your colleagues say about you:*";

/// What a threaded publish posted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReport {
    pub root: MessageHandle,
    pub messages_posted: usize,
    pub descriptions_posted: usize,
    /// False when the fallback poem was used or there were no descriptions.
    pub poem_generated: bool,
    /// Image replies that were re-sent as plain text.
    pub image_fallbacks: usize,
}

/// Result of [`CelebrationPublisher::publish`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    /// No messages were collected; a single greeting was posted.
    Default(MessageHandle),
    Thread(PublishReport),
    /// Reported administratively; carries the error text.
    Failed(String),
}

fn default_greeting(celebrant_id: &str) -> String {
    format!(
        ":birthday: *Happy Birthday {}!* :balloon:\n\nWishing you a fantastic day and a wonderful year ahead!",
        mention(celebrant_id)
    )
}

fn thread_greeting(celebrant_id: &str) -> String {
    format!(
        ":birthday: *Happy Birthday {}!* :balloon:\n\nYour colleagues have some special messages for you! Check out the thread below. :arrow_down:",
        mention(celebrant_id)
    )
}

/// The digest goes out as plain text, which allows far longer messages than
/// a Block Kit section.
fn description_digest(descriptions: &[Contribution]) -> String {
    let lines: Vec<String> = descriptions
        .iter()
        .map(|d| format!("• {} — {}", d.body, d.sender_display_name))
        .collect();
    format!("{}\n\n{}", DESCRIPTIONS_HEADING, lines.join("\n"))
}

fn message_reply(message: &Contribution) -> String {
    format!("*{} says:*\n{}", message.sender_display_name, message.body)
}

/// Publishes celebration threads.
#[derive(Clone)]
pub struct CelebrationPublisher {
    services: Services,
}

impl CelebrationPublisher {
    pub fn new(services: Services) -> Self {
        Self { services }
    }

    /// Publish the celebration for `celebrant_id`.
    ///
    /// Never fails: errors are reported through the notifier and returned as
    /// [`PublishOutcome::Failed`].
    #[instrument(skip(self), fields(celebrant = %celebrant_id))]
    pub async fn publish(&self, celebrant_id: &str) -> PublishOutcome {
        match self.run(celebrant_id).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(error = %e, "celebration publish failed");
                self.services
                    .notifier
                    .notify(
                        Severity::Error,
                        &format!(
                            "Error posting birthday thread for {}: {}",
                            mention(celebrant_id),
                            e
                        ),
                    )
                    .await;
                PublishOutcome::Failed(e.to_string())
            }
        }
    }

    async fn run(&self, celebrant_id: &str) -> Result<PublishOutcome, EngineError> {
        let store = &self.services.store;
        let messaging = &self.services.messaging;
        let channel = self.services.config.birthday_channel.as_str();

        let messages = store
            .unsent_contributions(celebrant_id, ContributionKind::Message)
            .await?;

        if messages.is_empty() {
            info!("no messages collected, posting default greeting");
            let handle = messaging
                .post_message(channel, &MessageContent::text(default_greeting(celebrant_id)), None)
                .await?;
            return Ok(PublishOutcome::Default(handle));
        }

        let root = messaging
            .post_message(channel, &MessageContent::text(thread_greeting(celebrant_id)), None)
            .await?;
        let mut report = PublishReport {
            root: root.clone(),
            messages_posted: 0,
            descriptions_posted: 0,
            poem_generated: false,
            image_fallbacks: 0,
        };

        let descriptions = store
            .unsent_contributions(celebrant_id, ContributionKind::Description)
            .await?;
        if !descriptions.is_empty() {
            let (poem, generated) = self.poem(&descriptions).await;
            report.poem_generated = generated;
            messaging
                .post_message(channel, &MessageContent::text(poem), Some(&root))
                .await?;

            let digest = MessageContent::text(description_digest(&descriptions));
            messaging.post_message(channel, &digest, Some(&root)).await?;

            let ids: Vec<i64> = descriptions.iter().map(|d| d.id).collect();
            report.descriptions_posted = store
                .mark_sent(celebrant_id, ContributionKind::Description, &ids)
                .await?;
        }

        for message in &messages {
            let text = message_reply(message);
            match &message.media_url {
                Some(url) => {
                    let content = MessageContent::text(&text).with_image(
                        url,
                        format!("Birthday media from {}", message.sender_display_name),
                    );
                    if let Err(e) = messaging.post_message(channel, &content, Some(&root)).await {
                        warn!(contribution = message.id, error = %e, "image reply rejected, sending as text");
                        let plain = MessageContent::text(format!("{}\n{}", text, url));
                        messaging.post_message(channel, &plain, Some(&root)).await?;
                        report.image_fallbacks += 1;
                    }
                }
                None => {
                    messaging
                        .post_message(channel, &MessageContent::text(text), Some(&root))
                        .await?;
                }
            }
            report.messages_posted += 1;
        }

        let ids: Vec<i64> = messages.iter().map(|m| m.id).collect();
        store
            .mark_sent(celebrant_id, ContributionKind::Message, &ids)
            .await?;

        info!(
            messages = report.messages_posted,
            descriptions = report.descriptions_posted,
            poem_generated = report.poem_generated,
            "celebration thread published"
        );
        Ok(PublishOutcome::Thread(report))
    }

    async fn poem(&self, descriptions: &[Contribution]) -> (String, bool) {
        let texts: Vec<String> = descriptions.iter().map(|d| d.body.clone()).collect();
        match self.services.poet.generate_poem(&texts).await {
            Ok(poem) if !poem.trim().is_empty() => (poem.trim().to_string(), true),
            Ok(_) => {
                warn!("poem generator returned nothing, using fallback");
                (FALLBACK_POEM.to_string(), false)
            }
            Err(e) => {
                warn!(error = %e, "poem generation failed, using fallback");
                (FALLBACK_POEM.to_string(), false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pretty_assertions::assert_eq;

    fn contribution(id: i64, body: &str, name: &str) -> Contribution {
        Contribution {
            id,
            kind: ContributionKind::Description,
            celebrant_id: "U1".to_string(),
            sender_id: format!("S{}", id),
            sender_display_name: name.to_string(),
            body: body.to_string(),
            media_url: None,
            sent: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_description_digest_lines() {
        let digest = description_digest(&[
            contribution(1, "Always kind", "Sam"),
            contribution(2, "Brilliant", "Kim"),
        ]);
        assert_eq!(
            digest,
            "*Here's what your colleagues say about you:*\n\n• Always kind — Sam\n• Brilliant — Kim"
        );
    }

    #[test]
    fn test_message_reply_format() {
        let mut message = contribution(1, "Happy birthday!", "Sam");
        message.kind = ContributionKind::Message;
        assert_eq!(message_reply(&message), "*Sam says:*\nHappy birthday!");
    }
}
