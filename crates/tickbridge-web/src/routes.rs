//! HTTP handlers.
//!
//! Query parameters are optional at the extractor level so that a missing
//! value surfaces as a 400 body with a message, not as an axum rejection.

use std::str::FromStr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Query, State},
    http::Request,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tickbridge_core::{
    calculate_indicators, CompanyProfile, DateWindow, Endpoint, HistoricalRequest, IndicatorSet,
    Interval, OptionsChain, OptionsChainRequest, PriceSeries, ProfileRequest, ProviderDescriptor,
    ProviderId, Quote, QuoteRequest, SourceRouter, SourceStrategy, Symbol,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};

#[derive(Clone)]
pub struct AppState {
    pub router: Arc<SourceRouter>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SymbolQuery {
    symbol: Option<String>,
    provider: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SeriesQuery {
    symbol: Option<String>,
    from: Option<String>,
    to: Option<String>,
    interval: Option<String>,
    provider: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProvidersResponse {
    providers: Vec<ProviderDescriptor>,
    default_provider: ProviderId,
}

#[derive(Debug, Serialize)]
struct IndicatorsResponse {
    symbol: Symbol,
    indicators: IndicatorPayload,
    source: ProviderId,
}

/// Serializes as `{}` when there were no bars to compute from.
#[derive(Debug, Serialize)]
#[serde(untagged)]
enum IndicatorPayload {
    Computed(IndicatorSet),
    Empty {},
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let trace = TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
        tracing::info_span!(
            "request",
            id = %Uuid::new_v4(),
            method = %request.method(),
            path = %request.uri().path(),
        )
    });

    Router::new()
        .route("/quote", get(quote))
        .route("/profile", get(profile))
        .route("/historical", get(historical))
        .route("/options", get(options))
        .route("/indicators", get(indicators))
        .route("/providers", get(providers))
        .route("/health", get(health))
        .layer(trace)
        .layer(cors)
        .with_state(state)
}

async fn quote(
    State(state): State<AppState>,
    Query(query): Query<SymbolQuery>,
) -> ApiResult<Json<Quote>> {
    let (symbol, strategy) = symbol_and_strategy(&query)?;
    state
        .router
        .route_quote(&QuoteRequest::new(symbol), strategy)
        .await
        .map(|routed| Json(routed.data))
        .map_err(|failure| ApiError::route(Endpoint::Quote, failure))
}

async fn profile(
    State(state): State<AppState>,
    Query(query): Query<SymbolQuery>,
) -> ApiResult<Json<CompanyProfile>> {
    let (symbol, strategy) = symbol_and_strategy(&query)?;
    state
        .router
        .route_profile(&ProfileRequest::new(symbol), strategy)
        .await
        .map(|routed| Json(routed.data))
        .map_err(|failure| ApiError::route(Endpoint::Profile, failure))
}

async fn historical(
    State(state): State<AppState>,
    Query(query): Query<SeriesQuery>,
) -> ApiResult<Json<PriceSeries>> {
    let series = fetch_series(&state, &query).await?;
    Ok(Json(series))
}

async fn options(
    State(state): State<AppState>,
    Query(query): Query<SymbolQuery>,
) -> ApiResult<Json<OptionsChain>> {
    let (symbol, strategy) = symbol_and_strategy(&query)?;
    state
        .router
        .route_options_chain(&OptionsChainRequest::new(symbol), strategy)
        .await
        .map(|routed| Json(routed.data))
        .map_err(|failure| ApiError::route(Endpoint::OptionsChain, failure))
}

async fn indicators(
    State(state): State<AppState>,
    Query(query): Query<SeriesQuery>,
) -> ApiResult<Json<IndicatorsResponse>> {
    let series = fetch_series(&state, &query).await?;
    let indicators = match calculate_indicators(&series) {
        Some(set) => IndicatorPayload::Computed(set),
        None => IndicatorPayload::Empty {},
    };

    Ok(Json(IndicatorsResponse {
        symbol: series.symbol,
        indicators,
        source: series.source,
    }))
}

async fn providers(State(state): State<AppState>) -> Json<ProvidersResponse> {
    Json(ProvidersResponse {
        providers: state.router.catalog(),
        default_provider: state.router.default_provider(),
    })
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn fetch_series(state: &AppState, query: &SeriesQuery) -> ApiResult<PriceSeries> {
    let symbol = Symbol::parse(required(&query.symbol, "symbol")?)?;
    let from = required(&query.from, "from")?;
    let to = required(&query.to, "to")?;
    let window = DateWindow::parse(from, to)?;
    let interval = query
        .interval
        .as_deref()
        .map(Interval::parse_lenient)
        .unwrap_or_default();
    let strategy = strategy(query.provider.as_deref())?;

    state
        .router
        .route_historical(&HistoricalRequest::new(symbol, interval, window), strategy)
        .await
        .map(|routed| routed.data)
        .map_err(|failure| ApiError::route(Endpoint::Historical, failure))
}

fn symbol_and_strategy(query: &SymbolQuery) -> ApiResult<(Symbol, SourceStrategy)> {
    let symbol = Symbol::parse(required(&query.symbol, "symbol")?)?;
    Ok((symbol, strategy(query.provider.as_deref())?))
}

fn required<'a>(value: &'a Option<String>, name: &'static str) -> ApiResult<&'a str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or(ApiError::MissingParameter(name))
}

/// A blank `provider` is treated as absent.
fn strategy(provider: Option<&str>) -> ApiResult<SourceStrategy> {
    let requested = provider
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ProviderId::from_str)
        .transpose()?;
    Ok(SourceStrategy::from_requested(requested))
}
