//! HTTP Provider Client
//!
//! Implements ProviderClient over plain HTTPS GET requests with bounded
//! retries and exponential backoff.

use crate::domain::entities::{FieldMap, ProviderDescriptor, ResolutionResult};
use crate::domain::errors::ProviderError;
use crate::domain::ports::ProviderClient;
use crate::domain::value_objects::CountryCode;
use async_trait::async_trait;
use rand::Rng;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

/// Retry and deadline settings shared by all HTTP providers.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt (transient failures only)
    pub max_retries: u32,
    /// First backoff delay, doubled after every attempt
    pub backoff_base: Duration,
    /// Add up to 25% random delay on top of each backoff
    pub jitter: bool,
    /// Total time budget for one resolution, retries included
    pub deadline: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base: Duration::from_secs(1),
            jitter: true,
            deadline: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (0-based).
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let exp = self
            .backoff_base
            .saturating_mul(2u32.saturating_pow(attempt.min(16)));
        if !self.jitter {
            return exp;
        }
        let max_extra = (exp.as_millis() / 4) as u64;
        if max_extra == 0 {
            return exp;
        }
        let extra = rand::thread_rng().gen_range(0..=max_extra);
        exp + Duration::from_millis(extra)
    }
}

/// Build the shared reqwest client used by every provider.
pub fn build_http_client(policy: &RetryPolicy) -> Result<reqwest::Client, ProviderError> {
    reqwest::Client::builder()
        .timeout(policy.deadline)
        .user_agent(concat!("ip-widget/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| ProviderError::Transport(format!("client error: {}", e)))
}

/// Geolocation provider reached over HTTP.
pub struct HttpProviderClient {
    descriptor: ProviderDescriptor,
    client: reqwest::Client,
    policy: RetryPolicy,
}

impl HttpProviderClient {
    /// Create a client sharing an existing reqwest connection pool.
    pub fn new(descriptor: ProviderDescriptor, client: reqwest::Client, policy: RetryPolicy) -> Self {
        Self {
            descriptor,
            client,
            policy,
        }
    }

    /// Factory for `ProviderRegistry`, all providers share one pool.
    pub fn factory(
        client: reqwest::Client,
        policy: RetryPolicy,
    ) -> impl Fn(ProviderDescriptor) -> Arc<dyn ProviderClient> + Send + Sync + 'static {
        move |descriptor| {
            Arc::new(HttpProviderClient::new(descriptor, client.clone(), policy.clone()))
                as Arc<dyn ProviderClient>
        }
    }

    /// One GET against the endpoint.
    async fn fetch_once(&self) -> Result<(String, CountryCode), ProviderError> {
        let response = self
            .client
            .get(&self.descriptor.endpoint)
            .header("accept", "application/json")
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Status(status.as_u16()));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ProviderError::Response(format!("invalid JSON body: {}", e)))?;

        Self::parse_body(&body, &self.descriptor.field_map)
    }

    /// Attempts with backoff until success, a permanent error, or retries run out.
    async fn fetch_with_retry(&self) -> Result<(String, CountryCode), ProviderError> {
        let mut attempt = 0;
        loop {
            match self.fetch_once().await {
                Ok(found) => return Ok(found),
                Err(e) if e.is_transient() && attempt < self.policy.max_retries => {
                    let delay = self.policy.backoff_delay(attempt);
                    tracing::debug!(
                        provider = %self.descriptor.name,
                        attempt = attempt + 1,
                        ?delay,
                        "transient provider failure, retrying: {}",
                        e
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Pull the ip and country code out of a provider response.
    ///
    /// Both fields must be present, be strings and parse; anything else is
    /// a malformed response rather than a success with gaps.
    fn parse_body(
        body: &serde_json::Value,
        fields: &FieldMap,
    ) -> Result<(String, CountryCode), ProviderError> {
        let ip = body
            .get(&fields.ip)
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| ProviderError::Response(format!("missing field {:?}", fields.ip)))?;
        let ip = ip
            .trim()
            .parse::<IpAddr>()
            .map_err(|_| ProviderError::Response(format!("invalid ip {:?}", ip)))?;

        let country = body
            .get(&fields.country_code)
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| {
                ProviderError::Response(format!("missing field {:?}", fields.country_code))
            })?;
        let country = CountryCode::parse(country)
            .ok_or_else(|| ProviderError::Response(format!("invalid country code {:?}", country)))?;

        Ok((ip.to_string(), country))
    }
}

#[async_trait]
impl ProviderClient for HttpProviderClient {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    async fn resolve(&self) -> ResolutionResult {
        let outcome = tokio::time::timeout(self.policy.deadline, self.fetch_with_retry())
            .await
            .unwrap_or(Err(ProviderError::Deadline(self.policy.deadline)));

        match outcome {
            Ok((ip, country)) => {
                tracing::debug!(provider = %self.descriptor.name, %ip, %country, "resolved");
                ResolutionResult::success(ip, country)
            }
            Err(e) => {
                tracing::warn!(provider = %self.descriptor.name, "resolution failed: {}", e);
                ResolutionResult::failure()
            }
        }
    }
}
