//! Provider adapters and the helpers they share.

mod alphavantage;
mod finnhub;
mod polygon;

pub use alphavantage::AlphaVantageAdapter;
pub use finnhub::FinnhubAdapter;
pub use polygon::PolygonAdapter;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::{debug, warn};

use crate::data_source::{Endpoint, SourceError};
use crate::http_client::{HttpClient, HttpRequest, DEFAULT_TIMEOUT_MS};
use crate::{Bar, ProviderId, Symbol, UtcDateTime, ValidationError};

/// Connection settings for one provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    pub api_key: String,
    /// Overrides the provider's public base URL (used by tests and proxies).
    pub base_url: Option<String>,
    pub timeout_ms: u64,
}

impl ProviderConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: None,
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    fn resolve_base_url(&self, default: &str) -> String {
        self.base_url
            .as_deref()
            .unwrap_or(default)
            .trim_end_matches('/')
            .to_owned()
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self::new("")
    }
}

/// Executes `request` and decodes a successful JSON body.
///
/// Transport failures, timeouts, non-2xx statuses and undecodable bodies all
/// surface as upstream errors carrying the underlying cause.
pub(crate) async fn fetch_json<T>(
    client: &dyn HttpClient,
    provider: ProviderId,
    endpoint: Endpoint,
    request: HttpRequest,
) -> Result<T, SourceError>
where
    T: DeserializeOwned,
{
    debug!(provider = %provider, endpoint = %endpoint, "requesting upstream");

    let response = client.execute(request).await.map_err(|error| {
        SourceError::upstream(provider, format!("{provider} {endpoint} request failed"))
            .with_cause(error)
    })?;

    if !response.is_success() {
        return Err(SourceError::upstream(
            provider,
            format!(
                "{provider} {endpoint} returned status {}",
                response.status
            ),
        ));
    }

    serde_json::from_str(&response.body).map_err(|error| {
        SourceError::upstream(
            provider,
            format!("{provider} {endpoint} returned an unreadable payload"),
        )
        .with_cause(error)
    })
}

pub(crate) fn invalid_payload(
    provider: ProviderId,
    endpoint: Endpoint,
    error: ValidationError,
) -> SourceError {
    SourceError::upstream(
        provider,
        format!("{provider} {endpoint} payload failed validation"),
    )
    .with_cause(error)
}

pub(crate) fn missing_field(
    provider: ProviderId,
    endpoint: Endpoint,
    symbol: &Symbol,
    field: &str,
) -> SourceError {
    SourceError::upstream(
        provider,
        format!("{provider} {endpoint} payload for {symbol} is missing '{field}'"),
    )
}

/// Builds a bar, logging and discarding rows that fail validation.
pub(crate) fn build_bar(
    provider: ProviderId,
    timestamp: UtcDateTime,
    open: Option<f64>,
    high: Option<f64>,
    low: Option<f64>,
    close: Option<f64>,
    volume: Option<f64>,
) -> Option<Bar> {
    let (Some(open), Some(high), Some(low), Some(close)) = (open, high, low, close) else {
        warn!(provider = %provider, %timestamp, "skipping bar with missing prices");
        return None;
    };

    match Bar::new(timestamp, open, high, low, close, volume) {
        Ok(bar) => Some(bar),
        Err(error) => {
            warn!(provider = %provider, %timestamp, %error, "skipping malformed bar");
            None
        }
    }
}

/// Reads a number that upstreams may send as a JSON number or a string such as
/// `"189.25"`, `"0.53%"` or `"None"`. Non-finite values read as `None`.
pub(crate) fn number_from_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => parse_number(text),
        _ => None,
    }
    .filter(|value| value.is_finite())
}

pub(crate) fn parse_number(text: &str) -> Option<f64> {
    let trimmed = text.trim().trim_end_matches('%').trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
}

/// serde `deserialize_with` helper for [`number_from_value`].
pub(crate) fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(number_from_value))
}

/// serde `deserialize_with` helper for numeric arrays with null holes.
pub(crate) fn lenient_numbers<'de, D>(deserializer: D) -> Result<Vec<Option<f64>>, D::Error>
where
    D: Deserializer<'de>,
{
    let values = Option::<Vec<Value>>::deserialize(deserializer)?;
    Ok(values
        .unwrap_or_default()
        .iter()
        .map(number_from_value)
        .collect())
}

/// Treats blank strings as absent.
pub(crate) fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty() && value != "None")
}
