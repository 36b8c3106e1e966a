use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::Deserialize;
use tracing::warn;

use super::{
    build_bar, fetch_json, invalid_payload, lenient_number, lenient_numbers, missing_field,
    non_blank, ProviderConfig,
};
use crate::data_source::{
    CapabilitySet, DataSource, Endpoint, HistoricalRequest, OptionsChainRequest, ProfileRequest,
    QuoteRequest, SourceError,
};
use crate::http_client::{HttpAuth, HttpClient, HttpRequest};
use crate::{
    CompanyProfile, Interval, OptionContract, OptionType, OptionsChain, PriceSeries, ProviderId,
    Quote, UtcDateTime,
};

const DEFAULT_BASE_URL: &str = "https://finnhub.io/api/v1";
const PROVIDER: ProviderId = ProviderId::Finnhub;

/// Finnhub adapter. Supports every endpoint.
///
/// The token travels in the `X-Finnhub-Token` header so it never appears in
/// request URLs.
#[derive(Clone)]
pub struct FinnhubAdapter {
    http_client: Arc<dyn HttpClient>,
    auth: HttpAuth,
    base_url: String,
    timeout_ms: u64,
}

impl FinnhubAdapter {
    pub fn new(http_client: Arc<dyn HttpClient>, config: ProviderConfig) -> Self {
        Self {
            http_client,
            base_url: config.resolve_base_url(DEFAULT_BASE_URL),
            auth: HttpAuth::header("X-Finnhub-Token", config.api_key),
            timeout_ms: config.timeout_ms,
        }
    }

    fn request(&self, path: &str) -> HttpRequest {
        HttpRequest::get(format!("{}{path}", self.base_url))
            .with_auth(&self.auth)
            .with_timeout_ms(self.timeout_ms)
    }

    async fn fetch_quote(&self, req: &QuoteRequest) -> Result<Quote, SourceError> {
        let request = self
            .request("/quote")
            .with_query("symbol", req.symbol.as_str());
        let payload: FinnhubQuote =
            fetch_json(self.http_client.as_ref(), PROVIDER, Endpoint::Quote, request).await?;

        // Unknown tickers come back as an all-zero quote rather than an error.
        let Some(price) = payload.c.filter(|_| !payload.is_empty()) else {
            return Err(missing_field(PROVIDER, Endpoint::Quote, &req.symbol, "c"));
        };

        Quote::new(
            req.symbol.clone(),
            price,
            payload.d,
            payload.dp,
            payload.h,
            payload.l,
            payload.o,
            payload.pc,
            PROVIDER,
        )
        .map_err(|error| invalid_payload(PROVIDER, Endpoint::Quote, error))
    }

    async fn fetch_profile(&self, req: &ProfileRequest) -> Result<CompanyProfile, SourceError> {
        let request = self
            .request("/stock/profile2")
            .with_query("symbol", req.symbol.as_str());
        let payload: FinnhubProfile =
            fetch_json(self.http_client.as_ref(), PROVIDER, Endpoint::Profile, request).await?;

        let Some(name) = non_blank(payload.name) else {
            return Err(missing_field(PROVIDER, Endpoint::Profile, &req.symbol, "name"));
        };

        CompanyProfile::new(
            req.symbol.clone(),
            name,
            payload.exchange,
            payload.finnhub_industry,
            // Reported in millions.
            payload.market_capitalization.map(|millions| millions * 1_000_000.0),
            payload.logo,
            payload.weburl,
            PROVIDER,
        )
        .map_err(|error| invalid_payload(PROVIDER, Endpoint::Profile, error))
    }

    async fn fetch_historical(&self, req: &HistoricalRequest) -> Result<PriceSeries, SourceError> {
        let request = self
            .request("/stock/candle")
            .with_query("symbol", req.symbol.as_str())
            .with_query("resolution", resolution(req.interval))
            .with_query("from", &req.window.start_unix_seconds().to_string())
            .with_query("to", &req.window.end_unix_seconds().to_string());
        let payload: FinnhubCandles =
            fetch_json(self.http_client.as_ref(), PROVIDER, Endpoint::Historical, request).await?;

        match payload.s.as_deref() {
            Some("ok") => {}
            Some("no_data") => {
                return Ok(PriceSeries::from_unordered(
                    req.symbol.clone(),
                    req.interval,
                    Vec::new(),
                    &req.window,
                    PROVIDER,
                ))
            }
            other => {
                return Err(SourceError::upstream(
                    PROVIDER,
                    format!(
                        "finnhub candles for {} returned status '{}'",
                        req.symbol,
                        other.unwrap_or("<missing>")
                    ),
                ))
            }
        }

        let at = |values: &[Option<f64>], index: usize| values.get(index).copied().flatten();
        let bars = payload
            .t
            .iter()
            .enumerate()
            .filter_map(|(index, seconds)| {
                let Some(timestamp) = UtcDateTime::from_unix_seconds(*seconds) else {
                    warn!(
                        provider = %PROVIDER,
                        seconds = *seconds,
                        "skipping bar with invalid timestamp"
                    );
                    return None;
                };
                build_bar(
                    PROVIDER,
                    timestamp,
                    at(&payload.o, index),
                    at(&payload.h, index),
                    at(&payload.l, index),
                    at(&payload.c, index),
                    at(&payload.v, index),
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

    async fn fetch_options_chain(
        &self,
        req: &OptionsChainRequest,
    ) -> Result<OptionsChain, SourceError> {
        let request = self
            .request("/stock/option-chain")
            .with_query("symbol", req.symbol.as_str());
        let payload: FinnhubOptionChain =
            fetch_json(self.http_client.as_ref(), PROVIDER, Endpoint::OptionsChain, request)
                .await?;

        let Some(groups) = payload.data else {
            return Err(missing_field(
                PROVIDER,
                Endpoint::OptionsChain,
                &req.symbol,
                "data",
            ));
        };

        let mut expirations = Vec::with_capacity(groups.len());
        let mut options = Vec::new();
        for group in groups {
            expirations.push(group.expiration_date.clone());
            for (side, contracts) in group.options {
                let Some(side) = OptionType::parse(&side) else {
                    continue;
                };
                options.extend(
                    contracts
                        .into_iter()
                        .filter_map(|contract| contract.normalize(side, &group.expiration_date)),
                );
            }
        }

        Ok(OptionsChain::new(
            req.symbol.clone(),
            expirations,
            options,
            PROVIDER,
        ))
    }
}

impl DataSource for FinnhubAdapter {
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

fn resolution(interval: Interval) -> &'static str {
    match interval {
        Interval::OneMinute => "1",
        Interval::FiveMinutes => "5",
        Interval::FifteenMinutes => "15",
        Interval::ThirtyMinutes => "30",
        Interval::OneHour => "60",
        Interval::OneDay => "D",
        Interval::OneWeek => "W",
        Interval::OneMonth => "M",
    }
}

#[derive(Debug, Deserialize)]
struct FinnhubQuote {
    #[serde(default, deserialize_with = "lenient_number")]
    c: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    d: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    dp: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    h: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    l: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    o: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pc: Option<f64>,
}

impl FinnhubQuote {
    fn is_empty(&self) -> bool {
        [self.c, self.h, self.l, self.o, self.pc]
            .into_iter()
            .all(|value| value.unwrap_or(0.0) == 0.0)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FinnhubProfile {
    name: Option<String>,
    exchange: Option<String>,
    finnhub_industry: Option<String>,
    #[serde(default, deserialize_with = "lenient_number")]
    market_capitalization: Option<f64>,
    logo: Option<String>,
    weburl: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FinnhubCandles {
    s: Option<String>,
    #[serde(default, deserialize_with = "lenient_numbers")]
    o: Vec<Option<f64>>,
    #[serde(default, deserialize_with = "lenient_numbers")]
    h: Vec<Option<f64>>,
    #[serde(default, deserialize_with = "lenient_numbers")]
    l: Vec<Option<f64>>,
    #[serde(default, deserialize_with = "lenient_numbers")]
    c: Vec<Option<f64>>,
    #[serde(default, deserialize_with = "lenient_numbers")]
    v: Vec<Option<f64>>,
    #[serde(default)]
    t: Vec<i64>,
}

#[derive(Debug, Deserialize)]
struct FinnhubOptionChain {
    data: Option<Vec<FinnhubExpirationGroup>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FinnhubExpirationGroup {
    expiration_date: String,
    #[serde(default)]
    options: BTreeMap<String, Vec<FinnhubContract>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FinnhubContract {
    contract_name: Option<String>,
    expiration_date: Option<String>,
    #[serde(default, deserialize_with = "lenient_number")]
    strike: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    last_price: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    change: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    volume: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    open_interest: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    implied_volatility: Option<f64>,
}

impl FinnhubContract {
    fn normalize(self, side: OptionType, group_expiration: &str) -> Option<OptionContract> {
        let expiration = non_blank(self.expiration_date)
            .unwrap_or_else(|| group_expiration.to_owned());
        let result = OptionContract::new(
            side,
            self.contract_name.unwrap_or_default(),
            self.strike,
            expiration,
            self.last_price,
            self.change,
            self.volume,
            self.open_interest,
            self.implied_volatility,
        );

        match result {
            Ok(contract) => Some(contract),
            Err(error) => {
                warn!(provider = %PROVIDER, %error, "skipping malformed option contract");
                None
            }
        }
    }
}
