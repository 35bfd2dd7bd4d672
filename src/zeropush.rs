use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::PushServiceError;
use crate::models::DeviceToken;

const MAX_ERROR_BODY_LEN: usize = 512;

/// Anything that can associate a device token with our push channel.
#[trait_variant::make(PushRegistrar: Send)]
pub trait LocalPushRegistrar {
    async fn submit_registration(&self, token: &DeviceToken) -> Result<(), PushServiceError>;
}

#[derive(Serialize)]
struct RegisterRequest<'a> {
    auth_token: &'a str,
    device_token: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    channel: Option<&'a str>,
}

#[derive(Deserialize)]
struct RegisterResponse {
    message: String,
}

#[derive(Clone)]
pub struct ZeroPushClient {
    http_client: HttpClient,
    register_url: String,
    auth_token: String,
    channel: Option<String>,
}

impl ZeroPushClient {
    pub fn new(
        api_url: &str,
        auth_token: String,
        channel: Option<String>,
        timeout: Duration,
    ) -> Result<Self, PushServiceError> {
        let http_client = HttpClient::builder().timeout(timeout).build()?;

        Ok(Self {
            http_client,
            register_url: format!("{}/register", api_url.trim_end_matches('/')),
            auth_token,
            channel,
        })
    }

    pub fn register_url(&self) -> &str {
        &self.register_url
    }
}

impl PushRegistrar for ZeroPushClient {
    async fn submit_registration(&self, token: &DeviceToken) -> Result<(), PushServiceError> {
        let request = RegisterRequest {
            auth_token: &self.auth_token,
            device_token: token.as_str(),
            channel: self.channel.as_deref(),
        };

        debug!(
            token = %token.fingerprint(),
            url = %self.register_url,
            "Submitting device registration"
        );

        let response = self
            .http_client
            .post(&self.register_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                warn!(token = %token.fingerprint(), error = %e, "Push service unreachable");
                PushServiceError::Transport(e)
            })?;

        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            if body.len() > MAX_ERROR_BODY_LEN {
                let mut end = MAX_ERROR_BODY_LEN;
                while !body.is_char_boundary(end) {
                    end -= 1;
                }
                body.truncate(end);
            }
            warn!(
                token = %token.fingerprint(),
                status = status.as_u16(),
                "Push service rejected registration"
            );
            return Err(PushServiceError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let body: RegisterResponse = response
            .json()
            .await
            .map_err(|e| PushServiceError::Malformed(e.to_string()))?;

        if body.message != "ok" {
            return Err(PushServiceError::Malformed(format!(
                "expected message 'ok', got '{}'",
                body.message
            )));
        }

        info!(token = %token.fingerprint(), "Device registered with push service");
        Ok(())
    }
}
