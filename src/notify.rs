// ABOUTME: Chat-webhook notifications for deployment progress.
// ABOUTME: Delivery is best effort; callers log and swallow failures.

use async_trait::async_trait;
use serde::Serialize;

use crate::deploy::{ContentId, DeployFailure};
use crate::types::DeploymentId;

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("notification request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("notification endpoint returned {0}")]
    Status(reqwest::StatusCode),
}

/// What happened to the deployment.
#[derive(Debug, Clone, Copy)]
pub enum Event<'a> {
    Started,
    Succeeded { content: &'a ContentId },
    Failed { failure: &'a DeployFailure },
}

/// One message about one deployment.
#[derive(Debug, Clone, Copy)]
pub struct Notice<'a> {
    pub project: &'a str,
    pub branch: &'a str,
    pub deployment: &'a DeploymentId,
    pub log_url: Option<&'a str>,
    pub event: Event<'a>,
}

impl Notice<'_> {
    /// Plain-text rendering of the message.
    pub fn text(&self) -> String {
        let subject = format!("{} ({})", self.project, self.branch);
        let mut text = match self.event {
            Event::Started => format!("Deploying {subject}, deployment {}", self.deployment),
            Event::Succeeded { content } => {
                format!("Deployed {subject}, deployment {} at {content}", self.deployment)
            }
            Event::Failed { failure } => format!(
                "Deployment {} of {subject} failed during {} phase: {}. Result: {}",
                self.deployment, failure.phase, failure.error, failure.disposition
            ),
        };
        if let Some(url) = self.log_url {
            text.push_str(&format!("\nLog: {url}"));
        }
        text
    }
}

/// Public link to a deployment log, given the configured base URL.
pub fn log_url(public_url: &str, log_name: &str) -> String {
    format!(
        "{}/stagecoach/deployment-logs/{}",
        public_url.trim_end_matches('/'),
        urlencoding::encode(log_name)
    )
}

/// Delivers messages to a chat endpoint.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, endpoint: &str, text: &str) -> Result<(), NotifyError>;
}

#[derive(Serialize)]
struct Payload<'a> {
    text: &'a str,
}

/// Posts `{"text": ...}` to a Slack-compatible incoming webhook.
#[derive(Debug, Clone, Default)]
pub struct WebhookNotifier {
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, endpoint: &str, text: &str) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(endpoint)
            .json(&Payload { text })
            .send()
            .await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(NotifyError::Status(response.status()))
        }
    }
}

/// Drops every message.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify(&self, _endpoint: &str, _text: &str) -> Result<(), NotifyError> {
        Ok(())
    }
}
