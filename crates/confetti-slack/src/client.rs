//! Slack Web API client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, trace};

use confetti_core::{
    Account, AccountFlags, DeliveryError, Directory, MessageContent, MessageHandle, Messaging,
};

use crate::blocks::render_blocks;

/// Default Slack Web API base URL.
pub const DEFAULT_API_URL: &str = "https://slack.com/api";

/// The platform-reserved system account.
const SLACKBOT_ID: &str = "USLACKBOT";

/// Page size for `users.list`.
const USERS_PAGE_LIMIT: u32 = 200;

/// API error codes meaning the user cannot receive direct messages.
const DM_CLOSED_ERRORS: &[&str] = &[
    "cannot_dm_bot",
    "user_disabled",
    "messages_tab_disabled",
    "user_not_visible",
];

fn http_err(e: reqwest::Error) -> DeliveryError {
    DeliveryError::Http(e.to_string())
}

/// Client for the Slack Web API, authenticated with one token.
#[derive(Clone)]
pub struct SlackClient {
    http: Client,
    token: String,
    base_url: String,
}

impl SlackClient {
    /// Create a client for the public Slack API.
    pub fn new(token: impl Into<String>) -> Self {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()
            .expect("failed to build HTTP client");

        Self {
            http,
            token: token.into(),
            base_url: DEFAULT_API_URL.to_string(),
        }
    }

    /// Point the client at another API root (used by tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, method: &str) -> String {
        format!("{}/{}", self.base_url, method)
    }

    /// Send a request and unwrap Slack's `{ok, error}` envelope.
    async fn send(&self, method: &str, request: RequestBuilder) -> Result<Value, DeliveryError> {
        let response = request
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(http_err)?;

        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok());
            return Err(DeliveryError::RateLimited { retry_after_secs });
        }

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(DeliveryError::InvalidResponse(format!(
                "{} returned {}: {}",
                method, status, text
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| DeliveryError::InvalidResponse(format!("{}: {}", method, e)))?;

        if body.get("ok").and_then(Value::as_bool) != Some(true) {
            let error = body
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("unknown");
            return Err(DeliveryError::Api {
                method: method.to_string(),
                error: error.to_string(),
            });
        }

        trace!(method, "slack api call ok");
        Ok(body)
    }

    /// Call a write method with a JSON body.
    pub(crate) async fn api_post(&self, method: &str, body: &Value) -> Result<Value, DeliveryError> {
        let request = self.http.post(self.url(method)).json(body);
        self.send(method, request).await
    }

    /// Call a read method with query parameters.
    async fn api_get(&self, method: &str, query: &[(&str, &str)]) -> Result<Value, DeliveryError> {
        let request = self.http.get(self.url(method)).query(query);
        self.send(method, request).await
    }
}

fn dm_closed(err: DeliveryError, user: &str) -> DeliveryError {
    match err {
        DeliveryError::Api { ref error, .. } if DM_CLOSED_ERRORS.contains(&error.as_str()) => {
            DeliveryError::DirectMessagesClosed {
                user: user.to_string(),
            }
        }
        other => other,
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SlackProfile {
    real_name: String,
    display_name: String,
}

#[derive(Debug, Deserialize)]
struct SlackUser {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    real_name: Option<String>,
    #[serde(default)]
    profile: SlackProfile,
    #[serde(default)]
    is_bot: bool,
    #[serde(default)]
    deleted: bool,
    #[serde(default)]
    is_restricted: bool,
    #[serde(default)]
    is_ultra_restricted: bool,
}

impl SlackUser {
    fn into_account(self) -> Account {
        let display_name = [
            self.real_name.as_deref().unwrap_or_default(),
            self.profile.real_name.as_str(),
            self.profile.display_name.as_str(),
            self.name.as_str(),
        ]
        .into_iter()
        .find(|n| !n.trim().is_empty())
        .unwrap_or(self.id.as_str())
        .to_string();

        Account {
            flags: AccountFlags {
                is_bot: self.is_bot,
                deleted: self.deleted,
                restricted: self.is_restricted,
                ultra_restricted: self.is_ultra_restricted,
                system: self.id == SLACKBOT_ID,
            },
            display_name,
            id: self.id,
        }
    }
}

fn parse_user(value: &Value) -> Result<SlackUser, DeliveryError> {
    SlackUser::deserialize(value).map_err(|e| DeliveryError::InvalidResponse(e.to_string()))
}

#[async_trait]
impl Directory for SlackClient {
    async fn list_accounts(&self) -> Result<Vec<Account>, DeliveryError> {
        let limit = USERS_PAGE_LIMIT.to_string();
        let mut accounts = Vec::new();
        let mut cursor = String::new();

        loop {
            let mut query = vec![("limit", limit.as_str())];
            if !cursor.is_empty() {
                query.push(("cursor", cursor.as_str()));
            }
            let body = self.api_get("users.list", &query).await?;

            let members = body
                .get("members")
                .and_then(Value::as_array)
                .ok_or_else(|| DeliveryError::InvalidResponse("users.list: no members".into()))?;
            for member in members {
                accounts.push(parse_user(member)?.into_account());
            }

            let next = body
                .pointer("/response_metadata/next_cursor")
                .and_then(Value::as_str)
                .unwrap_or_default();
            if next.is_empty() {
                break;
            }
            cursor = next.to_string();
        }

        debug!(count = accounts.len(), "listed slack users");
        Ok(accounts)
    }

    async fn lookup_account(&self, id: &str) -> Result<Option<Account>, DeliveryError> {
        match self.api_get("users.info", &[("user", id)]).await {
            Ok(body) => {
                let user = body
                    .get("user")
                    .ok_or_else(|| DeliveryError::InvalidResponse("users.info: no user".into()))?;
                Ok(Some(parse_user(user)?.into_account()))
            }
            Err(DeliveryError::Api { error, .. }) if error == "user_not_found" => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl Messaging for SlackClient {
    async fn post_message(
        &self,
        target: &str,
        content: &MessageContent,
        thread: Option<&MessageHandle>,
    ) -> Result<MessageHandle, DeliveryError> {
        let mut body = json!({
            "channel": target,
            "text": content.text,
            "unfurl_links": false,
        });
        if let Some(blocks) = render_blocks(content) {
            body["blocks"] = Value::Array(blocks);
        }
        if let Some(thread) = thread {
            body["thread_ts"] = Value::String(thread.id.clone());
        }

        let response = self
            .api_post("chat.postMessage", &body)
            .await
            .map_err(|e| dm_closed(e, target))?;

        let ts = response
            .get("ts")
            .and_then(Value::as_str)
            .ok_or_else(|| DeliveryError::InvalidResponse("chat.postMessage: no ts".into()))?;
        let channel = response
            .get("channel")
            .and_then(Value::as_str)
            .unwrap_or(target);

        Ok(MessageHandle {
            channel: channel.to_string(),
            id: ts.to_string(),
        })
    }

    async fn open_direct_channel(&self, user_id: &str) -> Result<String, DeliveryError> {
        let response = self
            .api_post("conversations.open", &json!({ "users": user_id }))
            .await
            .map_err(|e| dm_closed(e, user_id))?;

        response
            .pointer("/channel/id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| DeliveryError::InvalidResponse("conversations.open: no channel".into()))
    }

    async fn delete_message(&self, channel: &str, message_id: &str) -> Result<(), DeliveryError> {
        self.api_post("chat.delete", &json!({ "channel": channel, "ts": message_id }))
            .await?;
        Ok(())
    }
}
