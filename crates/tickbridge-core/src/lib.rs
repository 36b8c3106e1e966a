//! # tickbridge core
//!
//! Provider adapters, single-step fallback routing and the indicator engine
//! behind the tickbridge market data gateway.
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`adapters`] | Finnhub, Alpha Vantage and Polygon adapters |
//! | [`data_source`] | Adapter trait, endpoints, request types and [`SourceError`] |
//! | [`domain`] | Canonical entities and validated value types |
//! | [`error`] | Input validation errors |
//! | [`http_client`] | Transport abstraction, reqwest client and offline stub |
//! | [`indicators`] | RSI, EMA and MACD over closing prices |
//! | [`routing`] | Fallback router and its builder |
//! | [`source`] | Provider identifiers |
//!
//! ## Architecture
//!
//! ```text
//! handler ──▶ SourceRouter ──▶ DataSource (per provider) ──▶ HttpClient
//!                 │                      │
//!                 │ one fallback max     ▼
//!                 │               canonical entity
//!                 ▼
//!           indicators (pure)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use tickbridge_core::{QuoteRequest, SourceRouterBuilder, SourceStrategy, Symbol};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let router = SourceRouterBuilder::new()
//!         .with_api_key(tickbridge_core::ProviderId::Finnhub, "token")
//!         .build();
//!
//!     let request = QuoteRequest::new(Symbol::parse("AAPL")?);
//!     match router.route_quote(&request, SourceStrategy::Default).await {
//!         Ok(routed) => println!("{} via {}", routed.data.price, routed.selected_source),
//!         Err(failure) => eprintln!("{}", failure.error),
//!     }
//!     Ok(())
//! }
//! ```

pub mod adapters;
pub mod data_source;
pub mod domain;
pub mod error;
pub mod http_client;
pub mod indicators;
pub mod routing;
pub mod source;

pub use adapters::{AlphaVantageAdapter, FinnhubAdapter, PolygonAdapter, ProviderConfig};

pub use data_source::{
    CapabilitySet, DataSource, Endpoint, HistoricalRequest, OptionsChainRequest, ProfileRequest,
    QuoteRequest, SourceError, SourceErrorKind,
};

pub use domain::{
    Bar, CompanyProfile, DateWindow, IndicatorSet, Interval, Macd, OptionContract, OptionType,
    OptionsChain, PriceSeries, Quote, Symbol, UtcDateTime,
};

pub use error::ValidationError;

pub use http_client::{
    HttpAuth, HttpClient, HttpError, HttpRequest, HttpResponse, ReqwestHttpClient,
    StubHttpClient, DEFAULT_TIMEOUT_MS,
};

pub use indicators::{calculate_indicators, ema, macd, rsi};

pub use routing::{
    FallbackPolicy, ProviderDescriptor, ProviderSet, RouteFailure, RouteResult, RouteSuccess,
    SourceRouter, SourceRouterBuilder, SourceStrategy,
};

pub use source::ProviderId;
