use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use super::{
    build_bar, fetch_json, invalid_payload, lenient_number, missing_field, non_blank,
    ProviderConfig,
};
use crate::data_source::{
    CapabilitySet, DataSource, Endpoint, HistoricalRequest, ProfileRequest, QuoteRequest,
    SourceError,
};
use crate::http_client::{HttpAuth, HttpClient, HttpRequest};
use crate::{CompanyProfile, Interval, PriceSeries, ProviderId, Quote, Symbol, UtcDateTime};

const DEFAULT_BASE_URL: &str = "https://www.alphavantage.co";
const PROVIDER: ProviderId = ProviderId::Alphavantage;

/// Keys Alpha Vantage uses to report throttling or bad requests with a 200 status.
const NOTICE_KEYS: [&str; 3] = ["Error Message", "Note", "Information"];

/// Alpha Vantage adapter. No options chain.
#[derive(Clone)]
pub struct AlphaVantageAdapter {
    http_client: Arc<dyn HttpClient>,
    auth: HttpAuth,
    base_url: String,
    timeout_ms: u64,
}

impl AlphaVantageAdapter {
    pub fn new(http_client: Arc<dyn HttpClient>, config: ProviderConfig) -> Self {
        Self {
            http_client,
            base_url: config.resolve_base_url(DEFAULT_BASE_URL),
            auth: HttpAuth::query_param("apikey", config.api_key),
            timeout_ms: config.timeout_ms,
        }
    }

    fn query(&self, function: &str, symbol: &Symbol) -> HttpRequest {
        HttpRequest::get(format!("{}/query", self.base_url))
            .with_query("function", function)
            .with_query("symbol", symbol.as_str())
            .with_timeout_ms(self.timeout_ms)
    }

    async fn fetch<T>(&self, endpoint: Endpoint, request: HttpRequest) -> Result<T, SourceError>
    where
        T: DeserializeOwned,
    {
        let request = request.with_auth(&self.auth);
        let payload: Value =
            fetch_json(self.http_client.as_ref(), PROVIDER, endpoint, request).await?;

        if let Some(notice) = NOTICE_KEYS
            .iter()
            .find_map(|key| payload.get(*key).and_then(Value::as_str))
        {
            return Err(SourceError::upstream(
                PROVIDER,
                format!("alphavantage {endpoint} rejected the request: {notice}"),
            ));
        }

        serde_json::from_value(payload).map_err(|error| {
            SourceError::upstream(
                PROVIDER,
                format!("alphavantage {endpoint} returned an unreadable payload"),
            )
            .with_cause(error)
        })
    }

    async fn fetch_quote(&self, req: &QuoteRequest) -> Result<Quote, SourceError> {
        let request = self.query("GLOBAL_QUOTE", &req.symbol);
        let payload: AlphaVantageQuoteResponse = self.fetch(Endpoint::Quote, request).await?;

        // Unknown symbols return an empty "Global Quote" object.
        let Some(price) = payload.quote.as_ref().and_then(|quote| quote.price) else {
            return Err(missing_field(
                PROVIDER,
                Endpoint::Quote,
                &req.symbol,
                "Global Quote.05. price",
            ));
        };
        let quote = payload.quote.unwrap_or_default();

        Quote::new(
            req.symbol.clone(),
            price,
            quote.change,
            quote.change_percent,
            quote.high,
            quote.low,
            quote.open,
            quote.previous_close,
            PROVIDER,
        )
        .map_err(|error| invalid_payload(PROVIDER, Endpoint::Quote, error))
    }

    async fn fetch_profile(&self, req: &ProfileRequest) -> Result<CompanyProfile, SourceError> {
        let request = self.query("OVERVIEW", &req.symbol);
        let payload: AlphaVantageOverview = self.fetch(Endpoint::Profile, request).await?;

        let Some(name) = non_blank(payload.name) else {
            return Err(missing_field(PROVIDER, Endpoint::Profile, &req.symbol, "Name"));
        };

        CompanyProfile::new(
            req.symbol.clone(),
            name,
            non_blank(payload.exchange),
            non_blank(payload.industry),
            payload.market_capitalization,
            None,
            non_blank(payload.official_site),
            PROVIDER,
        )
        .map_err(|error| invalid_payload(PROVIDER, Endpoint::Profile, error))
    }

    async fn fetch_historical(&self, req: &HistoricalRequest) -> Result<PriceSeries, SourceError> {
        let (function, intraday) = series_function(req.interval);
        let mut request = self
            .query(function, &req.symbol)
            .with_query("outputsize", "full");
        if let Some(interval) = intraday {
            request = request.with_query("interval", interval);
        }

        let payload: BTreeMap<String, Value> = self.fetch(Endpoint::Historical, request).await?;

        // The series key varies: "Time Series (5min)", "Weekly Time Series", ...
        let Some(series) = payload
            .into_iter()
            .find_map(|(key, value)| key.contains("Time Series").then_some(value))
        else {
            return Err(missing_field(
                PROVIDER,
                Endpoint::Historical,
                &req.symbol,
                "Time Series",
            ));
        };

        let rows: BTreeMap<String, AlphaVantageBar> =
            serde_json::from_value(series).map_err(|error| {
                SourceError::upstream(
                    PROVIDER,
                    format!("alphavantage time series for {} is malformed", req.symbol),
                )
                .with_cause(error)
            })?;

        let bars = rows
            .into_iter()
            .filter_map(|(key, row)| {
                let Some(timestamp) = UtcDateTime::parse_date_key(&key) else {
                    warn!(
                        provider = %PROVIDER,
                        key = %key,
                        "skipping bar with unreadable date key"
                    );
                    return None;
                };
                build_bar(
                    PROVIDER, timestamp, row.open, row.high, row.low, row.close, row.volume,
                )
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
}

impl DataSource for AlphaVantageAdapter {
    fn id(&self) -> ProviderId {
        PROVIDER
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::new(true, true, true, false)
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
}

/// Maps an interval onto the time-series function and optional intraday step.
fn series_function(interval: Interval) -> (&'static str, Option<&'static str>) {
    match interval {
        Interval::OneMinute => ("TIME_SERIES_INTRADAY", Some("1min")),
        Interval::FiveMinutes => ("TIME_SERIES_INTRADAY", Some("5min")),
        Interval::FifteenMinutes => ("TIME_SERIES_INTRADAY", Some("15min")),
        Interval::ThirtyMinutes => ("TIME_SERIES_INTRADAY", Some("30min")),
        Interval::OneHour => ("TIME_SERIES_INTRADAY", Some("60min")),
        Interval::OneDay => ("TIME_SERIES_DAILY", None),
        Interval::OneWeek => ("TIME_SERIES_WEEKLY", None),
        Interval::OneMonth => ("TIME_SERIES_MONTHLY", None),
    }
}

#[derive(Debug, Deserialize)]
struct AlphaVantageQuoteResponse {
    #[serde(rename = "Global Quote", default)]
    quote: Option<AlphaVantageQuote>,
}

#[derive(Debug, Default, Deserialize)]
struct AlphaVantageQuote {
    #[serde(rename = "02. open", default, deserialize_with = "lenient_number")]
    open: Option<f64>,
    #[serde(rename = "03. high", default, deserialize_with = "lenient_number")]
    high: Option<f64>,
    #[serde(rename = "04. low", default, deserialize_with = "lenient_number")]
    low: Option<f64>,
    #[serde(rename = "05. price", default, deserialize_with = "lenient_number")]
    price: Option<f64>,
    #[serde(rename = "08. previous close", default, deserialize_with = "lenient_number")]
    previous_close: Option<f64>,
    #[serde(rename = "09. change", default, deserialize_with = "lenient_number")]
    change: Option<f64>,
    #[serde(rename = "10. change percent", default, deserialize_with = "lenient_number")]
    change_percent: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AlphaVantageOverview {
    name: Option<String>,
    exchange: Option<String>,
    industry: Option<String>,
    #[serde(default, deserialize_with = "lenient_number")]
    market_capitalization: Option<f64>,
    official_site: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AlphaVantageBar {
    #[serde(rename = "1. open", default, deserialize_with = "lenient_number")]
    open: Option<f64>,
    #[serde(rename = "2. high", default, deserialize_with = "lenient_number")]
    high: Option<f64>,
    #[serde(rename = "3. low", default, deserialize_with = "lenient_number")]
    low: Option<f64>,
    #[serde(rename = "4. close", default, deserialize_with = "lenient_number")]
    close: Option<f64>,
    #[serde(rename = "5. volume", default, deserialize_with = "lenient_number")]
    volume: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_source::{OptionsChainRequest, SourceErrorKind};
    use crate::http_client::StubHttpClient;
    use crate::DateWindow;

    fn adapter(stub: StubHttpClient) -> (AlphaVantageAdapter, Arc<StubHttpClient>) {
        let stub = Arc::new(stub);
        let adapter = AlphaVantageAdapter::new(
            stub.clone(),
            ProviderConfig::new("av-key").with_base_url("https://av.test"),
        );
        (adapter, stub)
    }

    fn symbol(value: &str) -> Symbol {
        Symbol::parse(value).expect("valid symbol")
    }

    #[tokio::test]
    async fn global_quote_parses_string_numbers_and_percent() {
        let (adapter, stub) = adapter(StubHttpClient::new().with_json(
            "function=GLOBAL_QUOTE",
            r#"{"Global Quote":{"01. symbol":"IBM","02. open":"167.0000","03. high":"168.5000","04. low":"166.2500","05. price":"168.1100","06. volume":"3204112","07. latest trading day":"2024-01-05","08. previous close":"166.9900","09. change":"1.1200","10. change percent":"0.6707%"}}"#,
        ));

        let quote = adapter
            .quote(QuoteRequest::new(symbol("IBM")))
            .await
            .expect("quote");

        assert_eq!(quote.price, 168.11);
        assert_eq!(quote.percent_change, Some(0.6707));
        assert_eq!(quote.previous_close, Some(166.99));
        assert_eq!(quote.source, ProviderId::Alphavantage);

        let url = &stub.requests()[0].url;
        assert_eq!(
            url,
            "https://av.test/query?function=GLOBAL_QUOTE&symbol=IBM&apikey=av-key"
        );
    }

    #[tokio::test]
    async fn empty_global_quote_is_an_upstream_error() {
        let (adapter, _) = adapter(
            StubHttpClient::new().with_json("function=GLOBAL_QUOTE", r#"{"Global Quote":{}}"#),
        );
        let error = adapter
            .quote(QuoteRequest::new(symbol("NOPE")))
            .await
            .expect_err("missing price");
        assert_eq!(error.kind(), SourceErrorKind::Upstream);
        assert!(error.message().contains("05. price"));
    }

    #[tokio::test]
    async fn rate_limit_note_is_an_upstream_error() {
        let (adapter, _) = adapter(StubHttpClient::new().with_json(
            "function=GLOBAL_QUOTE",
            r#"{"Note":"Thank you for using Alpha Vantage! Our standard API call frequency is 5 calls per minute."}"#,
        ));
        let error = adapter
            .quote(QuoteRequest::new(symbol("IBM")))
            .await
            .expect_err("throttled");
        assert!(error.message().contains("call frequency"));
    }

    #[tokio::test]
    async fn overview_maps_profile_and_converts_market_cap() {
        let (adapter, _) = adapter(StubHttpClient::new().with_json(
            "function=OVERVIEW",
            r#"{"Symbol":"IBM","Name":"International Business Machines","Exchange":"NYSE","Industry":"COMPUTER & OFFICE EQUIPMENT","MarketCapitalization":"153846174000","OfficialSite":"https://www.ibm.com"}"#,
        ));

        let profile = adapter
            .profile(ProfileRequest::new(symbol("IBM")))
            .await
            .expect("profile");
        assert_eq!(profile.name, "International Business Machines");
        assert_eq!(profile.exchange.as_deref(), Some("NYSE"));
        assert_eq!(profile.market_cap, Some(153_846_174_000.0));
        assert_eq!(profile.logo, None);
        assert_eq!(profile.weburl.as_deref(), Some("https://www.ibm.com"));
    }

    #[tokio::test]
    async fn daily_series_is_filtered_and_reversed_into_ascending_order() {
        let (adapter, stub) = adapter(StubHttpClient::new().with_json(
            "function=TIME_SERIES_DAILY",
            r#"{"Meta Data":{"2. Symbol":"IBM"},"Time Series (Daily)":{
                "2024-01-05":{"1. open":"160","2. high":"161","3. low":"159","4. close":"160.5","5. volume":"1000"},
                "2024-01-04":{"1. open":"158","2. high":"160","3. low":"157","4. close":"159.5","5. volume":"900"},
                "2024-01-03":{"1. open":"157","2. high":"158","3. low":"156","4. close":"157.5","5. volume":"800"},
                "2024-01-02":{"1. open":"156","2. high":"157","3. low":"155","4. close":"156.5","5. volume":"700"}
            }}"#,
        ));
        let window = DateWindow::parse("2024-01-03", "2024-01-04").expect("window");

        let series = adapter
            .historical(HistoricalRequest::new(symbol("IBM"), Interval::OneDay, window))
            .await
            .expect("series");

        assert_eq!(series.closes(), vec![157.5, 159.5]);
        assert!(!stub.requests()[0].url.contains("interval="));
    }

    #[tokio::test]
    async fn intraday_requests_carry_interval_and_read_keys_as_utc() {
        let (adapter, stub) = adapter(StubHttpClient::new().with_json(
            "function=TIME_SERIES_INTRADAY",
            r#"{"Time Series (60min)":{
                "2024-01-02 15:00:00":{"1. open":"10","2. high":"11","3. low":"9","4. close":"10.5","5. volume":"10"},
                "2024-01-02 14:00:00":{"1. open":"9","2. high":"10","3. low":"8","4. close":"9.5","5. volume":"10"}
            }}"#,
        ));
        let window = DateWindow::parse("2024-01-02", "2024-01-02").expect("window");

        let series = adapter
            .historical(HistoricalRequest::new(symbol("IBM"), Interval::OneHour, window))
            .await
            .expect("series");

        assert_eq!(series.data.len(), 2);
        assert_eq!(
            series.data[0].timestamp.format_rfc3339(),
            "2024-01-02T14:00:00Z"
        );
        assert!(stub.requests()[0].url.contains("interval=60min"));
    }

    #[tokio::test]
    async fn missing_time_series_is_an_upstream_error() {
        let (adapter, _) = adapter(
            StubHttpClient::new().with_json("function=TIME_SERIES_WEEKLY", r#"{"Meta Data":{}}"#),
        );
        let window = DateWindow::parse("2024-01-02", "2024-02-02").expect("window");
        let error = adapter
            .historical(HistoricalRequest::new(symbol("IBM"), Interval::OneWeek, window))
            .await
            .expect_err("no series");
        assert_eq!(error.kind(), SourceErrorKind::Upstream);
    }

    #[tokio::test]
    async fn options_chain_is_not_supported() {
        let (adapter, stub) = adapter(StubHttpClient::new());
        assert!(!adapter.capabilities().options_chain);

        let error = adapter
            .options_chain(OptionsChainRequest::new(symbol("IBM")))
            .await
            .expect_err("unsupported");
        assert_eq!(error.kind(), SourceErrorKind::UnsupportedEndpoint);
        assert_eq!(stub.request_count(), 0);
    }
}
