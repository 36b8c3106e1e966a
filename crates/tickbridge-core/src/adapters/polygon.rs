use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::warn;

use super::{
    build_bar, fetch_json, invalid_payload, lenient_number, missing_field, non_blank,
    ProviderConfig,
};
use crate::data_source::{
    CapabilitySet, DataSource, Endpoint, HistoricalRequest, OptionsChainRequest, ProfileRequest,
    QuoteRequest, SourceError,
};
use crate::http_client::{HttpAuth, HttpClient, HttpRequest};
use crate::{
    CompanyProfile, Interval, OptionContract, OptionType, OptionsChain, PriceSeries, ProviderId,
    Quote, Symbol, UtcDateTime,
};

const DEFAULT_BASE_URL: &str = "https://api.polygon.io";
const PROVIDER: ProviderId = ProviderId::Polygon;
const AGGREGATE_LIMIT: &str = "50000";
const OPTIONS_PAGE_LIMIT: &str = "250";

/// Polygon.io adapter. Supports every endpoint.
#[derive(Clone)]
pub struct PolygonAdapter {
    http_client: Arc<dyn HttpClient>,
    auth: HttpAuth,
    base_url: String,
    timeout_ms: u64,
}

impl PolygonAdapter {
    pub fn new(http_client: Arc<dyn HttpClient>, config: ProviderConfig) -> Self {
        Self {
            http_client,
            base_url: config.resolve_base_url(DEFAULT_BASE_URL),
            auth: HttpAuth::query_param("apiKey", config.api_key),
            timeout_ms: config.timeout_ms,
        }
    }

    fn request(&self, path: &str) -> HttpRequest {
        HttpRequest::get(format!("{}{path}", self.base_url)).with_timeout_ms(self.timeout_ms)
    }

    async fn fetch<T>(&self, endpoint: Endpoint, request: HttpRequest) -> Result<T, SourceError>
    where
        T: DeserializeOwned + PolygonStatus,
    {
        let request = request.with_auth(&self.auth);
        let payload: T =
            fetch_json(self.http_client.as_ref(), PROVIDER, endpoint, request).await?;

        match payload.status() {
            None | Some("OK") | Some("DELAYED") => Ok(payload),
            Some(other) => Err(SourceError::upstream(
                PROVIDER,
                format!("polygon {endpoint} returned status '{other}'"),
            )),
        }
    }

    async fn fetch_quote(&self, req: &QuoteRequest) -> Result<Quote, SourceError> {
        let request = self.request(&format!(
            "/v2/snapshot/locale/us/markets/stocks/tickers/{}",
            req.symbol.encoded()
        ));
        let payload: PolygonSnapshotResponse = self.fetch(Endpoint::Quote, request).await?;

        let Some(ticker) = payload.ticker else {
            return Err(missing_field(PROVIDER, Endpoint::Quote, &req.symbol, "ticker"));
        };

        let day = ticker.day.unwrap_or_default();
        let minute = ticker.min.unwrap_or_default();
        let previous = ticker.prev_day.unwrap_or_default();

        // Before the open the day aggregate is all zeros; fall back to the last
        // trade, then the latest minute bar.
        let price = ticker
            .last_trade
            .and_then(|trade| trade.p)
            .or(positive(day.c))
            .or(positive(minute.c));
        let Some(price) = price else {
            return Err(missing_field(
                PROVIDER,
                Endpoint::Quote,
                &req.symbol,
                "lastTrade.p",
            ));
        };

        Quote::new(
            req.symbol.clone(),
            price,
            ticker.todays_change,
            ticker.todays_change_perc,
            positive(day.h),
            positive(day.l),
            positive(day.o),
            positive(previous.c),
            PROVIDER,
        )
        .map_err(|error| invalid_payload(PROVIDER, Endpoint::Quote, error))
    }

    async fn fetch_profile(&self, req: &ProfileRequest) -> Result<CompanyProfile, SourceError> {
        let request = self.request(&format!("/v3/reference/tickers/{}", req.symbol.encoded()));
        let payload: PolygonTickerDetailsResponse =
            self.fetch(Endpoint::Profile, request).await?;

        let details = payload.results.unwrap_or_default();
        let Some(name) = non_blank(details.name) else {
            return Err(missing_field(
                PROVIDER,
                Endpoint::Profile,
                &req.symbol,
                "results.name",
            ));
        };

        CompanyProfile::new(
            req.symbol.clone(),
            name,
            details.primary_exchange,
            details.sic_description,
            details.market_cap,
            details.branding.and_then(|branding| branding.logo_url),
            details.homepage_url,
            PROVIDER,
        )
        .map_err(|error| invalid_payload(PROVIDER, Endpoint::Profile, error))
    }

    async fn fetch_historical(&self, req: &HistoricalRequest) -> Result<PriceSeries, SourceError> {
        let (multiplier, timespan) = aggregate_range(req.interval);
        let request = self
            .request(&format!(
                "/v2/aggs/ticker/{}/range/{multiplier}/{timespan}/{}/{}",
                req.symbol.encoded(),
                req.window.start_date_string(),
                req.window.end_date_string()
            ))
            .with_query("adjusted", "true")
            .with_query("sort", "asc")
            .with_query("limit", AGGREGATE_LIMIT);
        let payload: PolygonAggregatesResponse =
            self.fetch(Endpoint::Historical, request).await?;

        // `results` is omitted entirely when the window holds no bars.
        let bars = payload
            .results
            .unwrap_or_default()
            .into_iter()
            .filter_map(|row| {
                let Some(timestamp) = row.t.and_then(UtcDateTime::from_unix_millis) else {
                    warn!(provider = %PROVIDER, "skipping aggregate without a timestamp");
                    return None;
                };
                build_bar(PROVIDER, timestamp, row.o, row.h, row.l, row.c, row.v)
            })
            .collect();

        Ok(PriceSeries::from_unordered(
            req.symbol.clone(),
            req.interval,
            bars,
            &req.window,
            PROVIDER,
        ))
    }

    async fn fetch_options_chain(
        &self,
        req: &OptionsChainRequest,
    ) -> Result<OptionsChain, SourceError> {
        let request = self
            .request(&format!("/v3/snapshot/options/{}", req.symbol.encoded()))
            .with_query("limit", OPTIONS_PAGE_LIMIT);
        let payload: PolygonOptionsResponse = self.fetch(Endpoint::OptionsChain, request).await?;

        let Some(results) = payload.results else {
            return Err(missing_field(
                PROVIDER,
                Endpoint::OptionsChain,
                &req.symbol,
                "results",
            ));
        };

        let options = results
            .into_iter()
            .filter_map(|snapshot| snapshot.normalize(&req.symbol))
            .collect::<Vec<_>>();

        Ok(OptionsChain::new(
            req.symbol.clone(),
            Vec::new(),
            options,
            PROVIDER,
        ))
    }
}

impl DataSource for PolygonAdapter {
    fn id(&self) -> ProviderId {
        PROVIDER
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::full()
    }

    fn quote<'a>(
        &'a self,
        req: QuoteRequest,
    ) -> Pin<Box<dyn Future<Output = Result<Quote, SourceError>> + Send + 'a>> {
        Box::pin(async move { self.fetch_quote(&req).await })
    }

    fn profile<'a>(
        &'a self,
        req: ProfileRequest,
    ) -> Pin<Box<dyn Future<Output = Result<CompanyProfile, SourceError>> + Send + 'a>> {
        Box::pin(async move { self.fetch_profile(&req).await })
    }

    fn historical<'a>(
        &'a self,
        req: HistoricalRequest,
    ) -> Pin<Box<dyn Future<Output = Result<PriceSeries, SourceError>> + Send + 'a>> {
        Box::pin(async move { self.fetch_historical(&req).await })
    }

    fn options_chain<'a>(
        &'a self,
        req: OptionsChainRequest,
    ) -> Pin<Box<dyn Future<Output = Result<OptionsChain, SourceError>> + Send + 'a>> {
        Box::pin(async move { self.fetch_options_chain(&req).await })
    }
}

fn aggregate_range(interval: Interval) -> (u8, &'static str) {
    match interval {
        Interval::OneMinute => (1, "minute"),
        Interval::FiveMinutes => (5, "minute"),
        Interval::FifteenMinutes => (15, "minute"),
        Interval::ThirtyMinutes => (30, "minute"),
        Interval::OneHour => (1, "hour"),
        Interval::OneDay => (1, "day"),
        Interval::OneWeek => (1, "week"),
        Interval::OneMonth => (1, "month"),
    }
}

fn positive(value: Option<f64>) -> Option<f64> {
    value.filter(|value| *value > 0.0)
}

trait PolygonStatus {
    fn status(&self) -> Option<&str>;
}

macro_rules! impl_polygon_status {
    ($($ty:ty),+) => {
        $(impl PolygonStatus for $ty {
            fn status(&self) -> Option<&str> {
                self.status.as_deref()
            }
        })+
    };
}

impl_polygon_status!(
    PolygonSnapshotResponse,
    PolygonTickerDetailsResponse,
    PolygonAggregatesResponse,
    PolygonOptionsResponse
);

#[derive(Debug, Deserialize)]
struct PolygonSnapshotResponse {
    status: Option<String>,
    ticker: Option<PolygonTickerSnapshot>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PolygonTickerSnapshot {
    #[serde(default, deserialize_with = "lenient_number")]
    todays_change: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    todays_change_perc: Option<f64>,
    day: Option<PolygonOhlc>,
    min: Option<PolygonOhlc>,
    prev_day: Option<PolygonOhlc>,
    last_trade: Option<PolygonTrade>,
}

#[derive(Debug, Default, Deserialize)]
struct PolygonOhlc {
    #[serde(default, deserialize_with = "lenient_number")]
    o: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    h: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    l: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    c: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct PolygonTrade {
    #[serde(default, deserialize_with = "lenient_number")]
    p: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct PolygonTickerDetailsResponse {
    status: Option<String>,
    results: Option<PolygonTickerDetails>,
}

#[derive(Debug, Default, Deserialize)]
struct PolygonTickerDetails {
    name: Option<String>,
    primary_exchange: Option<String>,
    sic_description: Option<String>,
    #[serde(default, deserialize_with = "lenient_number")]
    market_cap: Option<f64>,
    homepage_url: Option<String>,
    branding: Option<PolygonBranding>,
}

#[derive(Debug, Deserialize)]
struct PolygonBranding {
    logo_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PolygonAggregatesResponse {
    status: Option<String>,
    results: Option<Vec<PolygonAggregate>>,
}

#[derive(Debug, Deserialize)]
struct PolygonAggregate {
    t: Option<i64>,
    #[serde(default, deserialize_with = "lenient_number")]
    o: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    h: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    l: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    c: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    v: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct PolygonOptionsResponse {
    status: Option<String>,
    results: Option<Vec<PolygonOptionSnapshot>>,
}

#[derive(Debug, Deserialize)]
struct PolygonOptionSnapshot {
    details: Option<PolygonOptionDetails>,
    day: Option<PolygonOptionDay>,
    last_trade: Option<PolygonOptionTrade>,
    #[serde(default, deserialize_with = "lenient_number")]
    open_interest: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    implied_volatility: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct PolygonOptionDetails {
    contract_type: Option<String>,
    expiration_date: Option<String>,
    #[serde(default, deserialize_with = "lenient_number")]
    strike_price: Option<f64>,
    ticker: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct PolygonOptionDay {
    #[serde(default, deserialize_with = "lenient_number")]
    change: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    close: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    volume: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct PolygonOptionTrade {
    #[serde(default, deserialize_with = "lenient_number")]
    price: Option<f64>,
}

impl PolygonOptionSnapshot {
    fn normalize(self, symbol: &Symbol) -> Option<OptionContract> {
        let Some(details) = self.details else {
            warn!(provider = %PROVIDER, %symbol, "skipping option snapshot without details");
            return None;
        };
        let Some(side) = details.contract_type.as_deref().and_then(OptionType::parse) else {
            warn!(provider = %PROVIDER, %symbol, "skipping option with unknown contract type");
            return None;
        };
        let day = self.day.unwrap_or_default();

        let result = OptionContract::new(
            side,
            details.ticker.unwrap_or_default(),
            details.strike_price,
            details.expiration_date.unwrap_or_default(),
            self.last_trade.and_then(|trade| trade.price).or(day.close),
            day.change,
            day.volume,
            self.open_interest,
            self.implied_volatility,
        );

        match result {
            Ok(contract) => Some(contract),
            Err(error) => {
                warn!(provider = %PROVIDER, %symbol, %error, "skipping malformed option contract");
                None
            }
        }
    }
}
