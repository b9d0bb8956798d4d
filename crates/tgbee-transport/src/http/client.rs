//! Bot API client over HTTPS.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, ClientBuilder};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, trace};

use tgbee_core::{Api, ApiError, ApiResult, GetUpdates, Update, UpdateFetcher};

/// The `{ok, result, description, error_code}` envelope every Bot API
/// response is wrapped in.
#[derive(Debug, Deserialize)]
struct Envelope {
    ok: bool,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    error_code: Option<i32>,
    #[serde(default)]
    parameters: Option<ResponseParameters>,
}

#[derive(Debug, Deserialize)]
struct ResponseParameters {
    #[serde(default)]
    retry_after: Option<u64>,
}

/// HTTP implementation of [`Api`] and [`UpdateFetcher`].
///
/// Requests go to `{api_url}/bot{token}/{method}` as JSON POSTs. The token is
/// never logged.
#[derive(Clone)]
pub struct BotApiClient {
    client: Client,
    base: String,
    request_timeout: Duration,
    poll_slack: Duration,
}

impl BotApiClient {
    pub const DEFAULT_API_URL: &'static str = "https://api.telegram.org";

    /// Creates a client for the public Bot API.
    pub fn new(token: impl AsRef<str>) -> ApiResult<Self> {
        Self::builder(token).build()
    }

    pub fn builder(token: impl AsRef<str>) -> BotApiClientBuilder {
        BotApiClientBuilder {
            token: token.as_ref().to_string(),
            api_url: Self::DEFAULT_API_URL.to_string(),
            request_timeout: Duration::from_secs(10),
            poll_slack: Duration::from_secs(5),
        }
    }

    fn url(&self, method: &str) -> String {
        format!("{}/{}", self.base, method)
    }

    async fn post(&self, method: &str, params: &Value, timeout: Duration) -> ApiResult<Value> {
        trace!(method, "api request");
        let response = self
            .client
            .post(self.url(method))
            .timeout(timeout)
            .json(params)
            .send()
            .await
            .map_err(map_reqwest)?;
        let status = response.status();
        let body = response.bytes().await.map_err(map_reqwest)?;

        let envelope: Envelope = match serde_json::from_slice(&body) {
            Ok(envelope) => envelope,
            Err(_) if !status.is_success() => {
                return Err(ApiError::Api {
                    code: i32::from(status.as_u16()),
                    description: String::from_utf8_lossy(&body).into_owned(),
                    retry_after: None,
                });
            }
            Err(err) => return Err(ApiError::decode(err)),
        };

        if envelope.ok {
            return Ok(envelope.result.unwrap_or(Value::Null));
        }
        let err = ApiError::Api {
            code: envelope
                .error_code
                .unwrap_or_else(|| i32::from(status.as_u16())),
            description: envelope.description.unwrap_or_default(),
            retry_after: envelope.parameters.and_then(|p| p.retry_after),
        };
        debug!(method, error = %err, "api call rejected");
        Err(err)
    }
}

impl fmt::Debug for BotApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BotApiClient")
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}

fn map_reqwest(err: reqwest::Error) -> ApiError {
    if err.is_timeout() {
        ApiError::Timeout
    } else {
        // Strip the URL, it contains the token.
        ApiError::transport(err.without_url())
    }
}

#[async_trait]
impl Api for BotApiClient {
    async fn call(&self, method: &str, params: Value) -> ApiResult<Value> {
        self.post(method, &params, self.request_timeout).await
    }
}

#[async_trait]
impl UpdateFetcher for BotApiClient {
    async fn get_updates(&self, request: &GetUpdates) -> ApiResult<Vec<Update>> {
        // The server holds the request for up to `timeout`; give it room.
        let timeout = request.timeout + self.poll_slack;
        let result = self
            .post("getUpdates", &request.to_params(), timeout)
            .await?;
        serde_json::from_value(result).map_err(ApiError::decode)
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Builder for [`BotApiClient`].
pub struct BotApiClientBuilder {
    token: String,
    api_url: String,
    request_timeout: Duration,
    poll_slack: Duration,
}

impl BotApiClientBuilder {
    /// Base URL of a self-hosted Bot API server.
    pub fn api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    /// Deadline of ordinary method calls.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Extra time granted to long polls beyond their server-side timeout.
    pub fn poll_slack(mut self, slack: Duration) -> Self {
        self.poll_slack = slack;
        self
    }

    pub fn build(self) -> ApiResult<BotApiClient> {
        let client = ClientBuilder::new()
            .connect_timeout(self.request_timeout)
            .build()
            .map_err(ApiError::transport)?;
        Ok(BotApiClient {
            client,
            base: format!("{}/bot{}", self.api_url.trim_end_matches('/'), self.token),
            request_timeout: self.request_timeout,
            poll_slack: self.poll_slack,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_layout_and_redacted_debug() {
        let client = BotApiClient::builder("123:abc")
            .api_url("http://localhost:8081/")
            .build()
            .unwrap();
        assert_eq!(client.url("getMe"), "http://localhost:8081/bot123:abc/getMe");
        assert!(!format!("{client:?}").contains("abc"));
    }

    #[test]
    fn test_envelope_decoding() {
        let env: Envelope = serde_json::from_str(
            r#"{"ok":false,"error_code":429,"description":"Too Many Requests","parameters":{"retry_after":7}}"#,
        )
        .unwrap();
        assert!(!env.ok);
        assert_eq!(env.error_code, Some(429));
        assert_eq!(env.parameters.and_then(|p| p.retry_after), Some(7));
    }
}
