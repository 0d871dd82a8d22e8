//! Administrative notices posted to a Slack channel.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info, warn};

use confetti_core::{MessageContent, Messaging, Notifier, Severity};

/// Posts notices to one channel. Delivery failures are logged, never returned.
pub struct ChannelNotifier {
    messaging: Arc<dyn Messaging>,
    channel: String,
}

impl ChannelNotifier {
    pub fn new(messaging: Arc<dyn Messaging>, channel: impl Into<String>) -> Self {
        Self {
            messaging,
            channel: channel.into(),
        }
    }
}

fn decorate(severity: Severity, text: &str) -> String {
    match severity {
        Severity::Info => text.to_string(),
        Severity::Warning => format!(":warning: {}", text),
        Severity::Error => format!(":rotating_light: {}", text),
    }
}

#[async_trait]
impl Notifier for ChannelNotifier {
    async fn notify(&self, severity: Severity, text: &str) {
        match severity {
            Severity::Info => info!(channel = %self.channel, "{}", text),
            Severity::Warning => warn!(channel = %self.channel, "{}", text),
            Severity::Error => error!(channel = %self.channel, "{}", text),
        }

        let content = MessageContent::text(decorate(severity, text));
        if let Err(e) = self.messaging.post_message(&self.channel, &content, None).await {
            warn!(channel = %self.channel, error = %e, "failed to post admin notice");
        }
    }
}
