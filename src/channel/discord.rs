use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::channel::MessageStore;
use crate::config::SweepConfig;
use crate::error::StoreError;
use crate::message::{Credential, RemoteMessage};
use crate::pacing::{Pacer, RetryState, ThreadPacer};

pub const DEFAULT_API_BASE: &str = "https://discord.com/api/v9";

/// Status line and body of one HTTP exchange.
struct Reply {
    status: u16,
    retry_after: Option<Duration>,
    body: String,
}

impl Reply {
    /// The failure a non-2xx status stands for.
    fn error(&self) -> Option<StoreError> {
        match self.status {
            200..=299 => None,
            429 => Some(StoreError::RateLimited {
                retry_after: self.retry_after.unwrap_or_default(),
            }),
            status => Some(api_error(status, &self.body)),
        }
    }
}

/// HTTP client for the Discord REST API (channel message endpoints only).
pub struct DiscordClient {
    api_base: String,
    agent: ureq::Agent,
    max_retries: u32,
    retry_floor: Duration,
    pacer: Arc<dyn Pacer>,
}

impl DiscordClient {
    pub fn new(api_base: &str, timeout: Duration, max_retries: u32) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build()
            .into();
        Self {
            api_base: api_base.trim_end_matches('/').to_string(),
            agent,
            max_retries,
            retry_floor: Duration::ZERO,
            pacer: Arc::new(ThreadPacer),
        }
    }

    /// Client for the configured service. Retries wait at least the
    /// configured pace, like consecutive deletes.
    pub fn from_config(config: &SweepConfig) -> Self {
        Self::new(
            &config.api_base,
            config.request_timeout(),
            config.max_retries,
        )
        .with_retry_floor(config.pace())
    }

    /// Shortest wait before any retry.
    pub fn with_retry_floor(mut self, floor: Duration) -> Self {
        self.retry_floor = floor;
        self
    }

    /// Replace the pacer used for retry waits.
    pub fn with_pacer(mut self, pacer: Arc<dyn Pacer>) -> Self {
        self.pacer = pacer;
        self
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    /// Build a full API URL.
    fn api_url(&self, endpoint: &str) -> String {
        format!("{}{}", self.api_base, endpoint)
    }

    /// Issue a request, retrying rate limits, 5xx answers and transport
    /// failures until the retry budget is spent. Calls stay sequential and
    /// no retry goes out sooner than `retry_floor` after the failed call.
    fn send<F>(&self, endpoint: &str, call: F) -> Result<Reply, StoreError>
    where
        F: Fn() -> Result<ureq::http::Response<ureq::Body>, ureq::Error>,
    {
        let mut retry = RetryState::new(self.max_retries);
        loop {
            let outcome = call()
                .map_err(|e| StoreError::Transport(e.to_string()))
                .and_then(read_reply);

            let reply_error = outcome.as_ref().ok().and_then(Reply::error);
            let failure = match &outcome {
                Ok(_) => reply_error.as_ref(),
                Err(e) => Some(e),
            };
            let hint = outcome.as_ref().ok().and_then(|reply| reply.retry_after);
            let wait = failure
                .filter(|e| e.is_retryable())
                .and_then(|e| match e {
                    StoreError::RateLimited { .. } => retry.rate_limit_wait(hint),
                    _ => retry.next_backoff(),
                });
            let failure = failure.map(|e| e.to_string());

            let (Some(delay), Some(error)) = (wait, failure) else {
                return outcome;
            };
            let delay = delay.max(self.retry_floor);
            warn!(
                endpoint,
                error = %error,
                attempt = retry.attempt + 1,
                delay_ms = delay.as_millis() as u64,
                "Request failed, waiting before retry"
            );
            self.pacer.pause(delay);
            retry.record_failure();
        }
    }
}

impl MessageStore for DiscordClient {
    fn list_messages(
        &self,
        credential: &Credential,
        channel_id: &str,
        before: Option<&str>,
        limit: u32,
    ) -> Result<Vec<RemoteMessage>, StoreError> {
        let endpoint = format!("/channels/{channel_id}/messages");
        let url = self.api_url(&endpoint);
        let limit = limit.to_string();
        debug!(channel_id, before, limit = %limit, "Listing messages");

        let reply = self.send(&endpoint, || {
            let mut req = self
                .agent
                .get(&url)
                .header("Authorization", credential.expose())
                .query("limit", &limit);
            if let Some(before) = before {
                req = req.query("before", before);
            }
            req.call()
        })?;
        parse_list_response(reply.status, &reply.body)
    }

    fn delete_message(
        &self,
        credential: &Credential,
        channel_id: &str,
        message_id: &str,
    ) -> Result<(), StoreError> {
        let endpoint = format!("/channels/{channel_id}/messages/{message_id}");
        let url = self.api_url(&endpoint);
        debug!(channel_id, message_id, "Deleting message");

        let reply = self.send(&endpoint, || {
            self.agent
                .delete(&url)
                .header("Authorization", credential.expose())
                .call()
        })?;
        parse_delete_response(reply.status, &reply.body)
    }
}

fn read_reply(mut resp: ureq::http::Response<ureq::Body>) -> Result<Reply, StoreError> {
    let status = resp.status().as_u16();
    let header_hint = resp
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body = resp
        .body_mut()
        .read_to_string()
        .map_err(|e| StoreError::Transport(format!("Failed to read response body: {e}")))?;
    let retry_after = if status == 429 {
        retry_after_hint(header_hint.as_deref(), &body)
    } else {
        None
    };
    Ok(Reply {
        status,
        retry_after,
        body,
    })
}

/// Rate-limit wait advertised by the server: `retry_after` in the JSON
/// body (seconds, may be fractional), else the `Retry-After` header.
pub fn retry_after_hint(header: Option<&str>, body: &str) -> Option<Duration> {
    let from_body = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|json| json["retry_after"].as_f64());
    let from_header = header.and_then(|h| h.trim().parse::<f64>().ok());
    from_body
        .or(from_header)
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
}

/// Interpret the answer of the list endpoint.
///
/// A 2xx JSON array is a page. A JSON object carrying `message` is an API
/// error regardless of status, which is how the service reports a bad
/// token or an unknown channel.
pub fn parse_list_response(status: u16, body: &str) -> Result<Vec<RemoteMessage>, StoreError> {
    if status == 429 {
        return Err(rate_limited(body));
    }
    let json: serde_json::Value = serde_json::from_str(body).map_err(|e| {
        if (200..300).contains(&status) {
            StoreError::Decode(format!("invalid JSON: {e}"))
        } else {
            api_error(status, body)
        }
    })?;

    if let Some(message) = json.get("message").and_then(|m| m.as_str()) {
        return Err(StoreError::Api {
            status,
            message: message.to_string(),
        });
    }
    if !(200..300).contains(&status) {
        return Err(api_error(status, body));
    }
    if !json.is_array() {
        return Err(StoreError::Decode(format!(
            "expected a message array, got {}",
            truncate(body, 120)
        )));
    }
    serde_json::from_value(json).map_err(|e| StoreError::Decode(format!("bad message: {e}")))
}

/// Interpret the answer of the delete endpoint. Only 2xx counts as deleted.
pub fn parse_delete_response(status: u16, body: &str) -> Result<(), StoreError> {
    match status {
        200..=299 => Ok(()),
        429 => Err(rate_limited(body)),
        _ => Err(api_error(status, body)),
    }
}

fn rate_limited(body: &str) -> StoreError {
    StoreError::RateLimited {
        retry_after: retry_after_hint(None, body).unwrap_or_default(),
    }
}

fn api_error(status: u16, body: &str) -> StoreError {
    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|json| json["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| {
            if body.trim().is_empty() {
                format!("HTTP {status}")
            } else {
                truncate(body, 120)
            }
        });
    StoreError::Api { status, message }
}

fn truncate(s: &str, max: usize) -> String {
    let mut end = s.len().min(max);
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}
