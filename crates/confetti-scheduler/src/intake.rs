//! Submission intake.

use tracing::{info, instrument, warn};

use confetti_core::{
    Contribution, MessageContent, MessageHandle, NewContribution, ValidationError, mention,
};

use crate::{EngineError, Services};

/// One contributor's answer to a collection form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Submission {
    pub celebrant_id: String,
    pub sender_id: String,
    pub sender_display_name: String,
    pub message: Option<String>,
    pub description: Option<String>,
    /// Attached to the message; ignored without one.
    pub media_url: Option<String>,
    /// The delivered form, removed once the submission is stored.
    pub form: Option<MessageHandle>,
}

/// What a successful submission stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionReceipt {
    pub message: Option<Contribution>,
    pub description: Option<Contribution>,
    /// A sentinel birthday record was created for an unknown celebrant.
    pub placeholder_created: bool,
    /// The acknowledgement sent to the contributor.
    pub confirmation: String,
}

fn present(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Acknowledgement wording for the parts of a submission that were stored.
pub fn confirmation_text(
    celebrant_id: &str,
    has_message: bool,
    has_media: bool,
    has_description: bool,
) -> String {
    let message = if has_media {
        "birthday message with media"
    } else {
        "birthday message"
    };
    let what = match (has_message, has_description) {
        (true, true) => format!("{} and description", message),
        (true, false) => message.to_string(),
        _ => "description".to_string(),
    };
    format!(
        "Thanks for submitting your {} for {}! 🎉",
        what,
        mention(celebrant_id)
    )
}

/// Stores contributions from delivered collection forms.
#[derive(Clone)]
pub struct SubmissionIntake {
    services: Services,
}

impl SubmissionIntake {
    pub fn new(services: Services) -> Self {
        Self { services }
    }

    /// Validate and persist a submission, then acknowledge the contributor.
    ///
    /// Each call writes new rows; resubmissions are not deduplicated.
    #[instrument(skip(self, submission), fields(celebrant = %submission.celebrant_id, sender = %submission.sender_id))]
    pub async fn submit(&self, submission: Submission) -> Result<SubmissionReceipt, EngineError> {
        let celebrant_id = submission.celebrant_id.trim();
        if celebrant_id.is_empty() {
            return Err(ValidationError::MissingCelebrant.into());
        }

        let message = present(submission.message);
        let description = present(submission.description);
        if message.is_none() && description.is_none() {
            return Err(ValidationError::EmptySubmission.into());
        }
        let media_url = message.as_ref().and(present(submission.media_url));

        let store = &self.services.store;
        let placeholder_created = store.ensure_placeholder(celebrant_id).await?;
        if placeholder_created {
            info!("registered placeholder for unknown celebrant");
        }

        let has_media = media_url.is_some();
        let message_row = match message {
            Some(body) => Some(
                store
                    .insert_contribution(NewContribution::message(
                        celebrant_id,
                        &submission.sender_id,
                        &submission.sender_display_name,
                        body,
                        media_url,
                    ))
                    .await?,
            ),
            None => None,
        };
        let description_row = match description {
            Some(body) => Some(
                store
                    .insert_contribution(NewContribution::description(
                        celebrant_id,
                        &submission.sender_id,
                        &submission.sender_display_name,
                        body,
                    ))
                    .await?,
            ),
            None => None,
        };

        info!(
            message = message_row.is_some(),
            description = description_row.is_some(),
            media = has_media,
            "submission stored"
        );

        let confirmation = confirmation_text(
            celebrant_id,
            message_row.is_some(),
            has_media,
            description_row.is_some(),
        );

        // The rows are stored; from here on failures are only logged.
        let messaging = &self.services.messaging;
        if let Some(form) = &submission.form {
            if let Err(e) = messaging.delete_message(&form.channel, &form.id).await {
                warn!(error = %e, "failed to delete collection form");
            }
        }
        match messaging.open_direct_channel(&submission.sender_id).await {
            Ok(channel) => {
                if let Err(e) = messaging
                    .post_message(&channel, &MessageContent::text(&confirmation), None)
                    .await
                {
                    warn!(error = %e, "failed to send submission confirmation");
                }
            }
            Err(e) => warn!(error = %e, "failed to open confirmation channel"),
        }

        Ok(SubmissionReceipt {
            message: message_row,
            description: description_row,
            placeholder_created,
            confirmation,
        })
    }
}
