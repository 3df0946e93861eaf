//! Shared JSON downloader used by the SMHI integrations.
//!
//! One GET per call, no connection pooling beyond what reqwest keeps inside
//! a single client. Every request carries an explicit timeout so a stalled
//! upstream can never wedge a poll loop.

use std::time::Duration;

use serde_json::Value;

use crate::error::AdapterError;

/// Per-request timeout for all outbound API calls.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub struct Downloader {
    client: reqwest::Client,
}

impl Downloader {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("stuga/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self { client }
    }

    /// GET the given URL and parse the body as JSON (array or object).
    ///
    /// Transport failures (including non-2xx statuses) and malformed bodies
    /// are surfaced as errors; the caller decides whether "no data" is an
    /// acceptable degradation for its feed.
    pub async fn download_json(&self, url: &str) -> Result<Value, AdapterError> {
        let resp = self.client.get(url).send().await?.error_for_status()?;
        let body = resp.text().await?;
        parse_body(&body)
    }
}

impl Default for Downloader {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_body(body: &str) -> Result<Value, AdapterError> {
    Ok(serde_json::from_str(body)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_body_object_and_array() {
        assert!(parse_body(r#"{"a": 1}"#).unwrap().is_object());
        assert!(parse_body(r#"[1, 2, 3]"#).unwrap().is_array());
    }

    #[test]
    fn test_parse_body_garbage_is_parse_error() {
        let err = parse_body("<html>not json</html>").unwrap_err();
        assert!(matches!(err, AdapterError::Parse(_)));
    }
}
