use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, warn};

use crate::adapters::{AlphaVantageAdapter, FinnhubAdapter, PolygonAdapter, ProviderConfig};
use crate::data_source::{
    CapabilitySet, DataSource, Endpoint, HistoricalRequest, OptionsChainRequest, ProfileRequest,
    QuoteRequest, SourceError,
};
use crate::http_client::{HttpClient, ReqwestHttpClient};
use crate::{CompanyProfile, OptionsChain, PriceSeries, ProviderId, Quote};

/// Source selection strategy for routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceStrategy {
    /// Use the router's default provider, with one fallback on upstream failure.
    #[default]
    Default,
    /// Use exactly this provider. Never falls back.
    Strict(ProviderId),
}

impl SourceStrategy {
    /// Any provider named by the caller pins the route, even the default one.
    pub fn from_requested(provider: Option<ProviderId>) -> Self {
        provider.map_or(Self::Default, Self::Strict)
    }

    const fn is_strict(self) -> bool {
        matches!(self, Self::Strict(_))
    }
}

/// Deterministic single-alternate table keyed by endpoint.
#[derive(Debug, Clone, Copy, Default)]
pub struct FallbackPolicy;

impl FallbackPolicy {
    /// Returns the one provider to try after `primary` fails on `endpoint`.
    pub const fn alternate(endpoint: Endpoint, primary: ProviderId) -> Option<ProviderId> {
        match endpoint {
            Endpoint::Quote | Endpoint::Profile | Endpoint::Historical => match primary {
                ProviderId::Finnhub => Some(ProviderId::Alphavantage),
                ProviderId::Alphavantage | ProviderId::Polygon => Some(ProviderId::Finnhub),
            },
            // Only Polygon is a reliable options source besides Finnhub.
            Endpoint::OptionsChain => match primary {
                ProviderId::Polygon => None,
                ProviderId::Finnhub | ProviderId::Alphavantage => Some(ProviderId::Polygon),
            },
        }
    }
}

/// Successful routed call.
#[derive(Debug, Clone)]
pub struct RouteSuccess<T> {
    pub data: T,
    pub selected_source: ProviderId,
    pub source_chain: Vec<ProviderId>,
    pub warnings: Vec<String>,
    /// Errors from attempts that preceded the successful one.
    pub errors: Vec<SourceError>,
    pub latency_ms: u64,
}

/// Failed routed call.
#[derive(Debug, Clone)]
pub struct RouteFailure {
    /// Terminal error: the last attempt's error, or the capability error when
    /// nothing was attempted.
    pub error: SourceError,
    pub source_chain: Vec<ProviderId>,
    /// Every attempt's error in call order.
    pub errors: Vec<SourceError>,
    pub warnings: Vec<String>,
    pub latency_ms: u64,
}

pub type RouteResult<T> = Result<RouteSuccess<T>, RouteFailure>;

/// Catalog entry served by the providers listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderDescriptor {
    pub id: ProviderId,
    pub name: &'static str,
    pub capabilities: Vec<&'static str>,
}

/// One adapter per provider id.
#[derive(Clone)]
pub struct ProviderSet {
    pub finnhub: Arc<dyn DataSource>,
    pub alphavantage: Arc<dyn DataSource>,
    pub polygon: Arc<dyn DataSource>,
}

impl ProviderSet {
    pub fn get(&self, provider: ProviderId) -> &dyn DataSource {
        match provider {
            ProviderId::Finnhub => self.finnhub.as_ref(),
            ProviderId::Alphavantage => self.alphavantage.as_ref(),
            ProviderId::Polygon => self.polygon.as_ref(),
        }
    }
}

type InvokeFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, SourceError>> + Send + 'a>>;

/// Adapter registry and fallback engine.
///
/// Immutable after construction; share it behind an `Arc`.
#[derive(Clone)]
pub struct SourceRouter {
    providers: ProviderSet,
    default_provider: ProviderId,
}

impl SourceRouter {
    pub fn new(providers: ProviderSet, default_provider: ProviderId) -> Self {
        Self {
            providers,
            default_provider,
        }
    }

    pub const fn default_provider(&self) -> ProviderId {
        self.default_provider
    }

    pub fn capabilities(&self, provider: ProviderId) -> CapabilitySet {
        self.providers.get(provider).capabilities()
    }

    /// Static capability listing of every provider, in id order.
    pub fn catalog(&self) -> Vec<ProviderDescriptor> {
        ProviderId::ALL
            .into_iter()
            .map(|id| ProviderDescriptor {
                id,
                name: id.display_name(),
                capabilities: self.capabilities(id).supported_endpoints(),
            })
            .collect()
    }

    pub async fn route_quote(
        &self,
        req: &QuoteRequest,
        strategy: SourceStrategy,
    ) -> RouteResult<Quote> {
        let req = req.clone();
        self.route_endpoint(Endpoint::Quote, strategy, move |source| {
            source.quote(req.clone())
        })
        .await
    }

    pub async fn route_profile(
        &self,
        req: &ProfileRequest,
        strategy: SourceStrategy,
    ) -> RouteResult<CompanyProfile> {
        let req = req.clone();
        self.route_endpoint(Endpoint::Profile, strategy, move |source| {
            source.profile(req.clone())
        })
        .await
    }

    pub async fn route_historical(
        &self,
        req: &HistoricalRequest,
        strategy: SourceStrategy,
    ) -> RouteResult<PriceSeries> {
        let req = req.clone();
        self.route_endpoint(Endpoint::Historical, strategy, move |source| {
            source.historical(req.clone())
        })
        .await
    }

    pub async fn route_options_chain(
        &self,
        req: &OptionsChainRequest,
        strategy: SourceStrategy,
    ) -> RouteResult<OptionsChain> {
        let req = req.clone();
        self.route_endpoint(Endpoint::OptionsChain, strategy, move |source| {
            source.options_chain(req.clone())
        })
        .await
    }

    async fn route_endpoint<T, F>(
        &self,
        endpoint: Endpoint,
        strategy: SourceStrategy,
        mut invoke: F,
    ) -> RouteResult<T>
    where
        F: for<'a> FnMut(&'a dyn DataSource) -> InvokeFuture<'a, T>,
    {
        let started = Instant::now();
        let primary = match strategy {
            SourceStrategy::Strict(provider) => provider,
            SourceStrategy::Default => self.default_provider,
        };

        let adapter = self.providers.get(primary);
        let mut source_chain = Vec::new();
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        // An incapable default is skipped, not called; a pinned one is terminal.
        let primary_error = if adapter.capabilities().supports(endpoint) {
            debug!(endpoint = %endpoint, provider = %primary, "routing request");
            source_chain.push(primary);
            match invoke(adapter).await {
                Ok(data) => {
                    return Ok(RouteSuccess {
                        data,
                        selected_source: primary,
                        source_chain,
                        warnings,
                        errors,
                        latency_ms: elapsed_ms(started),
                    })
                }
                Err(error) => {
                    errors.push(error.clone());
                    error
                }
            }
        } else {
            SourceError::unsupported_endpoint(primary, endpoint)
        };

        let may_fall_back =
            !strategy.is_strict() && (source_chain.is_empty() || primary_error.is_upstream());
        let alternate = FallbackPolicy::alternate(endpoint, primary)
            .filter(|alternate| may_fall_back && self.capabilities(*alternate).supports(endpoint));

        let Some(alternate) = alternate else {
            return Err(RouteFailure {
                error: primary_error,
                source_chain,
                errors,
                warnings,
                latency_ms: elapsed_ms(started),
            });
        };

        if source_chain.is_empty() {
            debug!(
                endpoint = %endpoint,
                from = %primary,
                to = %alternate,
                "default provider lacks endpoint, routing to alternate"
            );
            warnings.push(format!(
                "'{primary}' does not support '{endpoint}', routed to '{alternate}'"
            ));
        } else {
            warn!(
                endpoint = %endpoint,
                from = %primary,
                to = %alternate,
                error = %primary_error,
                "default provider failed, falling back"
            );
        }
        source_chain.push(alternate);

        match invoke(self.providers.get(alternate)).await {
            Ok(data) => {
                if !errors.is_empty() {
                    warnings.push(format!(
                        "fallback to '{alternate}' succeeded after '{primary}' failed"
                    ));
                }
                Ok(RouteSuccess {
                    data,
                    selected_source: alternate,
                    source_chain,
                    warnings,
                    errors,
                    latency_ms: elapsed_ms(started),
                })
            }
            Err(error) => {
                warn!(
                    endpoint = %endpoint,
                    provider = %alternate,
                    error = %error,
                    "fallback provider failed"
                );
                errors.push(error.clone());
                warnings.push(format!("fallback to '{alternate}' failed"));
                Err(RouteFailure {
                    error,
                    source_chain,
                    errors,
                    warnings,
                    latency_ms: elapsed_ms(started),
                })
            }
        }
    }
}

/// Builder wiring the three HTTP adapters onto one shared transport.
///
/// ```rust,ignore
/// use tickbridge_core::{ProviderId, SourceRouterBuilder};
///
/// let router = SourceRouterBuilder::new()
///     .with_api_key(ProviderId::Finnhub, "fh-token")
///     .with_default_provider(ProviderId::Polygon)
///     .with_timeout_ms(5_000)
///     .build();
/// ```
#[derive(Clone, Default)]
pub struct SourceRouterBuilder {
    default_provider: ProviderId,
    finnhub: ProviderConfig,
    alphavantage: ProviderConfig,
    polygon: ProviderConfig,
    http_client: Option<Arc<dyn HttpClient>>,
}

impl SourceRouterBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default_provider(mut self, provider: ProviderId) -> Self {
        self.default_provider = provider;
        self
    }

    pub fn with_api_key(mut self, provider: ProviderId, api_key: impl Into<String>) -> Self {
        self.config_mut(provider).api_key = api_key.into();
        self
    }

    pub fn with_base_url(mut self, provider: ProviderId, base_url: impl Into<String>) -> Self {
        self.config_mut(provider).base_url = Some(base_url.into());
        self
    }

    /// Sets the per-call upstream timeout for every provider.
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        for provider in ProviderId::ALL {
            self.config_mut(provider).timeout_ms = timeout_ms;
        }
        self
    }

    /// Replaces the reqwest transport, e.g. with a [`crate::StubHttpClient`].
    pub fn with_http_client(mut self, http_client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(http_client);
        self
    }

    pub fn build(self) -> SourceRouter {
        let http_client = self
            .http_client
            .unwrap_or_else(|| Arc::new(ReqwestHttpClient::new()));

        let providers = ProviderSet {
            finnhub: Arc::new(FinnhubAdapter::new(http_client.clone(), self.finnhub)),
            alphavantage: Arc::new(AlphaVantageAdapter::new(
                http_client.clone(),
                self.alphavantage,
            )),
            polygon: Arc::new(PolygonAdapter::new(http_client, self.polygon)),
        };

        SourceRouter::new(providers, self.default_provider)
    }

    fn config_mut(&mut self, provider: ProviderId) -> &mut ProviderConfig {
        match provider {
            ProviderId::Finnhub => &mut self.finnhub,
            ProviderId::Alphavantage => &mut self.alphavantage,
            ProviderId::Polygon => &mut self.polygon,
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis().min(u128::from(u64::MAX)) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_source::SourceErrorKind;
    use crate::Symbol;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Adapter double whose quote either succeeds or fails, counting calls.
    struct ScriptedSource {
        id: ProviderId,
        capabilities: CapabilitySet,
        fail: bool,
        calls: AtomicUsize,
    }

    impl ScriptedSource {
        fn new(id: ProviderId, fail: bool) -> Arc<Self> {
            let capabilities = if id == ProviderId::Alphavantage {
                CapabilitySet::new(true, true, true, false)
            } else {
                CapabilitySet::full()
            };
            Arc::new(Self {
                id,
                capabilities,
                fail,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn outcome<T>(&self, ok: impl FnOnce() -> T) -> Result<T, SourceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(SourceError::upstream(self.id, format!("{} is down", self.id)))
            } else {
                Ok(ok())
            }
        }
    }

    impl DataSource for ScriptedSource {
        fn id(&self) -> ProviderId {
            self.id
        }

        fn capabilities(&self) -> CapabilitySet {
            self.capabilities
        }

        fn quote<'a>(&'a self, req: QuoteRequest) -> InvokeFuture<'a, Quote> {
            let result = self.outcome(|| {
                Quote::new(req.symbol, 10.0, None, None, None, None, None, None, self.id)
                    .expect("valid quote")
            });
            Box::pin(async move { result })
        }

        fn profile<'a>(&'a self, req: ProfileRequest) -> InvokeFuture<'a, CompanyProfile> {
            let result = self.outcome(|| {
                CompanyProfile::new(req.symbol, "Acme", None, None, None, None, None, self.id)
                    .expect("valid profile")
            });
            Box::pin(async move { result })
        }

        fn historical<'a>(&'a self, req: HistoricalRequest) -> InvokeFuture<'a, PriceSeries> {
            let result = self.outcome(|| {
                PriceSeries::from_unordered(
                    req.symbol,
                    req.interval,
                    Vec::new(),
                    &req.window,
                    self.id,
                )
            });
            Box::pin(async move { result })
        }

        fn options_chain<'a>(
            &'a self,
            req: OptionsChainRequest,
        ) -> InvokeFuture<'a, OptionsChain> {
            if !self.capabilities.options_chain {
                self.calls.fetch_add(1, Ordering::SeqCst);
                let error = SourceError::unsupported_endpoint(self.id, Endpoint::OptionsChain);
                return Box::pin(async move { Err(error) });
            }
            let result =
                self.outcome(|| OptionsChain::new(req.symbol, Vec::new(), Vec::new(), self.id));
            Box::pin(async move { result })
        }
    }

    struct Fixture {
        router: SourceRouter,
        finnhub: Arc<ScriptedSource>,
        alphavantage: Arc<ScriptedSource>,
        polygon: Arc<ScriptedSource>,
    }

    fn fixture(default: ProviderId, failing: &[ProviderId]) -> Fixture {
        let finnhub =
            ScriptedSource::new(ProviderId::Finnhub, failing.contains(&ProviderId::Finnhub));
        let alphavantage = ScriptedSource::new(
            ProviderId::Alphavantage,
            failing.contains(&ProviderId::Alphavantage),
        );
        let polygon =
            ScriptedSource::new(ProviderId::Polygon, failing.contains(&ProviderId::Polygon));
        let router = SourceRouter::new(
            ProviderSet {
                finnhub: finnhub.clone(),
                alphavantage: alphavantage.clone(),
                polygon: polygon.clone(),
            },
            default,
        );
        Fixture {
            router,
            finnhub,
            alphavantage,
            polygon,
        }
    }

    fn quote_request() -> QuoteRequest {
        QuoteRequest::new(Symbol::parse("AAPL").expect("valid symbol"))
    }

    fn options_request() -> OptionsChainRequest {
        OptionsChainRequest::new(Symbol::parse("AAPL").expect("valid symbol"))
    }

    #[test]
    fn fallback_table_is_asymmetric_for_options() {
        let alternate = FallbackPolicy::alternate;

        assert_eq!(
            alternate(Endpoint::Quote, ProviderId::Finnhub),
            Some(ProviderId::Alphavantage)
        );
        assert_eq!(
            alternate(Endpoint::Profile, ProviderId::Alphavantage),
            Some(ProviderId::Finnhub)
        );
        assert_eq!(
            alternate(Endpoint::Historical, ProviderId::Polygon),
            Some(ProviderId::Finnhub)
        );
        assert_eq!(
            alternate(Endpoint::OptionsChain, ProviderId::Finnhub),
            Some(ProviderId::Polygon)
        );
        assert_eq!(
            alternate(Endpoint::OptionsChain, ProviderId::Alphavantage),
            Some(ProviderId::Polygon)
        );
        assert_eq!(alternate(Endpoint::OptionsChain, ProviderId::Polygon), None);
    }

    #[tokio::test]
    async fn healthy_default_is_the_only_call() {
        let fx = fixture(ProviderId::Finnhub, &[]);

        let result = fx
            .router
            .route_quote(&quote_request(), SourceStrategy::Default)
            .await
            .expect("route should succeed");

        assert_eq!(result.selected_source, ProviderId::Finnhub);
        assert_eq!(result.source_chain, vec![ProviderId::Finnhub]);
        assert!(result.warnings.is_empty());
        assert_eq!(fx.finnhub.calls(), 1);
        assert_eq!(fx.alphavantage.calls() + fx.polygon.calls(), 0);
    }

    #[tokio::test]
    async fn failing_default_falls_back_exactly_once() {
        let fx = fixture(ProviderId::Finnhub, &[ProviderId::Finnhub]);

        let result = fx
            .router
            .route_quote(&quote_request(), SourceStrategy::Default)
            .await
            .expect("fallback should succeed");

        assert_eq!(result.selected_source, ProviderId::Alphavantage);
        assert_eq!(result.data.source, ProviderId::Alphavantage);
        assert_eq!(
            result.source_chain,
            vec![ProviderId::Finnhub, ProviderId::Alphavantage]
        );
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].provider(), Some(ProviderId::Finnhub));
        assert_eq!(fx.polygon.calls(), 0);
    }

    #[tokio::test]
    async fn alternate_failure_returns_its_error_without_retrying() {
        let fx = fixture(
            ProviderId::Polygon,
            &[ProviderId::Polygon, ProviderId::Finnhub],
        );

        let failure = fx
            .router
            .route_profile(
                &ProfileRequest::new(Symbol::parse("MSFT").expect("valid symbol")),
                SourceStrategy::Default,
            )
            .await
            .expect_err("both fail");

        assert_eq!(failure.error.provider(), Some(ProviderId::Finnhub));
        assert_eq!(
            failure.source_chain,
            vec![ProviderId::Polygon, ProviderId::Finnhub]
        );
        assert_eq!(failure.errors.len(), 2);
        assert_eq!(fx.polygon.calls(), 1);
        assert_eq!(fx.finnhub.calls(), 1);
        assert_eq!(fx.alphavantage.calls(), 0);
    }

    #[tokio::test]
    async fn pinned_provider_never_falls_back_even_when_it_is_the_default() {
        let fx = fixture(ProviderId::Finnhub, &[ProviderId::Finnhub]);

        let failure = fx
            .router
            .route_quote(&quote_request(), SourceStrategy::Strict(ProviderId::Finnhub))
            .await
            .expect_err("pinned failure");

        assert_eq!(failure.source_chain, vec![ProviderId::Finnhub]);
        assert_eq!(failure.error.kind(), SourceErrorKind::Upstream);
        assert_eq!(fx.alphavantage.calls(), 0);
    }

    #[tokio::test]
    async fn options_fall_back_to_polygon() {
        let fx = fixture(ProviderId::Finnhub, &[ProviderId::Finnhub]);

        let result = fx
            .router
            .route_options_chain(&options_request(), SourceStrategy::Default)
            .await
            .expect("polygon answers");

        assert_eq!(result.selected_source, ProviderId::Polygon);
        assert_eq!(fx.alphavantage.calls(), 0);
    }

    #[tokio::test]
    async fn options_on_polygon_default_has_no_alternate() {
        let fx = fixture(ProviderId::Polygon, &[ProviderId::Polygon]);

        let failure = fx
            .router
            .route_options_chain(&options_request(), SourceStrategy::Default)
            .await
            .expect_err("no alternate");

        assert_eq!(failure.source_chain, vec![ProviderId::Polygon]);
        assert_eq!(fx.finnhub.calls(), 0);
    }

    #[tokio::test]
    async fn incapable_default_routes_options_straight_to_polygon() {
        let fx = fixture(ProviderId::Alphavantage, &[]);

        let result = fx
            .router
            .route_options_chain(&options_request(), SourceStrategy::Default)
            .await
            .expect("polygon answers");

        assert_eq!(result.selected_source, ProviderId::Polygon);
        assert_eq!(result.source_chain, vec![ProviderId::Polygon]);
        assert!(result.errors.is_empty());
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(fx.alphavantage.calls(), 0);
        assert_eq!(fx.polygon.calls(), 1);
        assert_eq!(fx.finnhub.calls(), 0);
    }

    #[tokio::test]
    async fn incapable_default_with_failing_alternate_is_terminal() {
        let fx = fixture(ProviderId::Alphavantage, &[ProviderId::Polygon]);

        let failure = fx
            .router
            .route_options_chain(&options_request(), SourceStrategy::Default)
            .await
            .expect_err("polygon down");

        assert_eq!(failure.error.kind(), SourceErrorKind::Upstream);
        assert_eq!(failure.error.provider(), Some(ProviderId::Polygon));
        assert_eq!(failure.source_chain, vec![ProviderId::Polygon]);
        assert_eq!(failure.errors.len(), 1);
        assert_eq!(fx.polygon.calls(), 1);
        assert_eq!(fx.finnhub.calls() + fx.alphavantage.calls(), 0);
    }

    #[tokio::test]
    async fn incapable_provider_is_rejected_without_any_call() {
        let fx = fixture(ProviderId::Finnhub, &[]);

        let failure = fx
            .router
            .route_options_chain(
                &options_request(),
                SourceStrategy::Strict(ProviderId::Alphavantage),
            )
            .await
            .expect_err("capability error");

        assert_eq!(failure.error.kind(), SourceErrorKind::UnsupportedEndpoint);
        assert!(failure.source_chain.is_empty());
        assert_eq!(
            fx.finnhub.calls() + fx.alphavantage.calls() + fx.polygon.calls(),
            0
        );
    }

    #[test]
    fn catalog_lists_every_provider_with_capabilities() {
        let fx = fixture(ProviderId::Finnhub, &[]);
        let catalog = fx.router.catalog();

        assert_eq!(catalog.len(), 3);
        assert_eq!(catalog[1].id, ProviderId::Alphavantage);
        assert_eq!(catalog[1].name, "Alpha Vantage");
        assert_eq!(catalog[1].capabilities, vec!["quote", "profile", "historical"]);
        assert_eq!(catalog[2].capabilities.len(), 4);
    }

    #[test]
    fn requested_provider_maps_to_strict_strategy() {
        assert_eq!(SourceStrategy::from_requested(None), SourceStrategy::Default);
        assert_eq!(
            SourceStrategy::from_requested(Some(ProviderId::Finnhub)),
            SourceStrategy::Strict(ProviderId::Finnhub)
        );
    }
}
