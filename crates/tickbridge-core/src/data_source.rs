//! Data source trait and request types.
//!
//! Every provider adapter implements [`DataSource`]. The router only ever talks
//! to adapters through this trait.
//!
//! | Endpoint | Request | Response |
//! |----------|---------|----------|
//! | Quote | [`QuoteRequest`] | [`Quote`] |
//! | Profile | [`ProfileRequest`] | [`CompanyProfile`] |
//! | Historical | [`HistoricalRequest`] | [`PriceSeries`] |
//! | Options chain | [`OptionsChainRequest`] | [`OptionsChain`] |

use std::error::Error as StdError;
use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{
    CompanyProfile, DateWindow, Interval, OptionsChain, PriceSeries, ProviderId, Quote, Symbol,
};

/// Data endpoint type used for routing and capability checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Endpoint {
    Quote,
    Profile,
    Historical,
    #[serde(rename = "options")]
    OptionsChain,
}

impl Endpoint {
    pub const ALL: [Self; 4] = [
        Self::Quote,
        Self::Profile,
        Self::Historical,
        Self::OptionsChain,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Quote => "quote",
            Self::Profile => "profile",
            Self::Historical => "historical",
            Self::OptionsChain => "options",
        }
    }
}

impl Display for Endpoint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Supported endpoint matrix for a data source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilitySet {
    pub quote: bool,
    pub profile: bool,
    pub historical: bool,
    pub options_chain: bool,
}

impl CapabilitySet {
    pub const fn new(quote: bool, profile: bool, historical: bool, options_chain: bool) -> Self {
        Self {
            quote,
            profile,
            historical,
            options_chain,
        }
    }

    pub const fn full() -> Self {
        Self::new(true, true, true, true)
    }

    pub const fn supports(self, endpoint: Endpoint) -> bool {
        match endpoint {
            Endpoint::Quote => self.quote,
            Endpoint::Profile => self.profile,
            Endpoint::Historical => self.historical,
            Endpoint::OptionsChain => self.options_chain,
        }
    }

    pub fn supported_endpoints(self) -> Vec<&'static str> {
        Endpoint::ALL
            .into_iter()
            .filter(|endpoint| self.supports(*endpoint))
            .map(Endpoint::as_str)
            .collect()
    }
}

/// Adapter-level error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceErrorKind {
    /// Network failure, timeout, non-success status or unusable payload.
    Upstream,
    /// The provider does not offer the requested endpoint.
    UnsupportedEndpoint,
}

/// Structured source error used by router fallback.
#[derive(Debug, Clone)]
pub struct SourceError {
    kind: SourceErrorKind,
    message: String,
    provider: Option<ProviderId>,
    cause: Option<Arc<dyn StdError + Send + Sync>>,
}

impl SourceError {
    pub fn upstream(provider: ProviderId, message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::Upstream,
            message: message.into(),
            provider: Some(provider),
            cause: None,
        }
    }

    pub fn unsupported_endpoint(provider: ProviderId, endpoint: Endpoint) -> Self {
        Self {
            kind: SourceErrorKind::UnsupportedEndpoint,
            message: format!(
                "provider '{provider}' does not support the '{endpoint}' endpoint"
            ),
            provider: Some(provider),
            cause: None,
        }
    }

    /// Attaches the underlying failure, reachable through [`StdError::source`].
    pub fn with_cause(mut self, cause: impl StdError + Send + Sync + 'static) -> Self {
        self.cause = Some(Arc::new(cause));
        self
    }

    pub const fn kind(&self) -> SourceErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn provider(&self) -> Option<ProviderId> {
        self.provider
    }

    pub const fn is_upstream(&self) -> bool {
        matches!(self.kind, SourceErrorKind::Upstream)
    }

    pub const fn code(&self) -> &'static str {
        match self.kind {
            SourceErrorKind::Upstream => "source.upstream",
            SourceErrorKind::UnsupportedEndpoint => "source.unsupported_endpoint",
        }
    }
}

impl Display for SourceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)?;
        if let Some(cause) = &self.cause {
            write!(f, ": {cause}")?;
        }
        Ok(())
    }
}

impl StdError for SourceError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.cause
            .as_deref()
            .map(|cause| cause as &(dyn StdError + 'static))
    }
}

/// Request payload for the quote endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteRequest {
    pub symbol: Symbol,
}

impl QuoteRequest {
    pub fn new(symbol: Symbol) -> Self {
        Self { symbol }
    }
}

/// Request payload for the company profile endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileRequest {
    pub symbol: Symbol,
}

impl ProfileRequest {
    pub fn new(symbol: Symbol) -> Self {
        Self { symbol }
    }
}

/// Request payload for historical bars over an inclusive date window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoricalRequest {
    pub symbol: Symbol,
    pub interval: Interval,
    pub window: DateWindow,
}

impl HistoricalRequest {
    pub fn new(symbol: Symbol, interval: Interval, window: DateWindow) -> Self {
        Self {
            symbol,
            interval,
            window,
        }
    }
}

/// Request payload for the options chain endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionsChainRequest {
    pub symbol: Symbol,
}

impl OptionsChainRequest {
    pub fn new(symbol: Symbol) -> Self {
        Self { symbol }
    }
}

/// Source adapter contract.
///
/// Adapters translate one upstream schema into canonical entities. They never
/// retry; fallback is the router's job. Missing optional fields become `None`,
/// while a missing required field is a [`SourceErrorKind::Upstream`] error.
///
/// Implementations must be `Send + Sync` because one router is shared across
/// every in-flight request.
pub trait DataSource: Send + Sync {
    /// Returns the unique provider identifier.
    fn id(&self) -> ProviderId;

    /// Returns the set of supported endpoints.
    fn capabilities(&self) -> CapabilitySet;

    fn quote<'a>(
        &'a self,
        req: QuoteRequest,
    ) -> Pin<Box<dyn Future<Output = Result<Quote, SourceError>> + Send + 'a>>;

    fn profile<'a>(
        &'a self,
        req: ProfileRequest,
    ) -> Pin<Box<dyn Future<Output = Result<CompanyProfile, SourceError>> + Send + 'a>>;

    /// Fetches bars inside `req.window`, sorted ascending with unique timestamps.
    fn historical<'a>(
        &'a self,
        req: HistoricalRequest,
    ) -> Pin<Box<dyn Future<Output = Result<PriceSeries, SourceError>> + Send + 'a>>;

    /// Fetches the options chain. Adapters without the capability keep the
    /// default body, which reports the endpoint as unsupported.
    fn options_chain<'a>(
        &'a self,
        req: OptionsChainRequest,
    ) -> Pin<Box<dyn Future<Output = Result<OptionsChain, SourceError>> + Send + 'a>> {
        let _ = req;
        let provider = self.id();
        Box::pin(async move {
            Err(SourceError::unsupported_endpoint(
                provider,
                Endpoint::OptionsChain,
            ))
        })
    }
}
