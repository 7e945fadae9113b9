use std::time::Duration;

use async_trait::async_trait;
use parley_config::PushConfig;
use reqwest::Client;
use serde_json::json;

use super::{PushPayload, PushSender};
use crate::error::PushError;

/// Firebase Cloud Messaging HTTP v1 client.
#[derive(Debug, Clone)]
pub struct FcmPushClient {
    client: Client,
    url: String,
    access_token: String,
}

impl FcmPushClient {
    pub fn new(
        endpoint: &str,
        project_id: &str,
        access_token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, PushError> {
        let client = Client::builder().timeout(timeout).build()?;
        let url = format!(
            "{}/v1/projects/{project_id}/messages:send",
            endpoint.trim_end_matches('/')
        );

        Ok(Self {
            client,
            url,
            access_token: access_token.into(),
        })
    }

    /// `None` unless both the project id and the access token are configured.
    pub fn from_config(config: &PushConfig) -> Result<Option<Self>, PushError> {
        let (Some(project_id), Some(access_token)) = (&config.project_id, &config.access_token)
        else {
            return Ok(None);
        };

        Self::new(
            &config.endpoint,
            project_id,
            access_token.clone(),
            Duration::from_secs(config.request_timeout_seconds),
        )
        .map(Some)
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl PushSender for FcmPushClient {
    async fn send(&self, token: &str, payload: &PushPayload) -> Result<(), PushError> {
        let body = json!({
            "message": {
                "token": token,
                "notification": {
                    "title": payload.title,
                    "body": payload.body,
                },
                "data": payload.data,
            }
        });

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(PushError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}
