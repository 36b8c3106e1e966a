//! Process configuration for the tickbridge gateway.
//!
//! Every flag can also be supplied through the environment. `.env` files are
//! loaded before parsing, so the usual precedence is flag, then process
//! environment, then `.env`.
//!
//! | Option | Env | Default |
//! |--------|-----|---------|
//! | `--bind` | `TICKBRIDGE_BIND` | `0.0.0.0:3000` |
//! | `--default-provider` | `TICKBRIDGE_DEFAULT_PROVIDER` | `finnhub` |
//! | `--upstream-timeout-ms` | `TICKBRIDGE_UPSTREAM_TIMEOUT_MS` | `10000` |
//! | `--<provider>-api-key` | `TICKBRIDGE_<PROVIDER>_API_KEY`, then `<PROVIDER>_API_KEY` | empty |
//! | `--<provider>-base-url` | `TICKBRIDGE_<PROVIDER>_BASE_URL` | public endpoint |
//! | `--log-json` | `TICKBRIDGE_LOG_JSON` | `false` |

use std::net::SocketAddr;

use clap::Parser;
use tickbridge_core::{ProviderId, SourceRouter, SourceRouterBuilder, DEFAULT_TIMEOUT_MS};

/// Normalized market data gateway over Finnhub, Alpha Vantage and Polygon.
#[derive(Debug, Clone, Parser)]
#[command(name = "tickbridge", author, version, about)]
pub struct Config {
    /// Socket address the HTTP server listens on.
    #[arg(long, env = "TICKBRIDGE_BIND", default_value = "0.0.0.0:3000")]
    pub bind: SocketAddr,

    /// Provider used when a request does not name one.
    #[arg(long, env = "TICKBRIDGE_DEFAULT_PROVIDER", default_value = "finnhub")]
    pub default_provider: ProviderId,

    /// Per-call upstream timeout in milliseconds.
    #[arg(long, env = "TICKBRIDGE_UPSTREAM_TIMEOUT_MS", default_value_t = DEFAULT_TIMEOUT_MS)]
    pub upstream_timeout_ms: u64,

    #[arg(long, env = "TICKBRIDGE_FINNHUB_API_KEY", hide_env_values = true)]
    pub finnhub_api_key: Option<String>,

    #[arg(long, env = "TICKBRIDGE_ALPHAVANTAGE_API_KEY", hide_env_values = true)]
    pub alphavantage_api_key: Option<String>,

    #[arg(long, env = "TICKBRIDGE_POLYGON_API_KEY", hide_env_values = true)]
    pub polygon_api_key: Option<String>,

    #[arg(long, env = "TICKBRIDGE_FINNHUB_BASE_URL")]
    pub finnhub_base_url: Option<String>,

    #[arg(long, env = "TICKBRIDGE_ALPHAVANTAGE_BASE_URL")]
    pub alphavantage_base_url: Option<String>,

    #[arg(long, env = "TICKBRIDGE_POLYGON_BASE_URL")]
    pub polygon_base_url: Option<String>,

    /// Emit logs as JSON lines instead of human-readable text.
    #[arg(long, env = "TICKBRIDGE_LOG_JSON")]
    pub log_json: bool,
}

impl Config {
    /// API key for `provider`. Falls back to the provider's conventional
    /// variable (e.g. `FINNHUB_API_KEY`); a missing key is only reported by
    /// the upstream on first use.
    pub fn api_key(&self, provider: ProviderId) -> String {
        let explicit = match provider {
            ProviderId::Finnhub => self.finnhub_api_key.as_deref(),
            ProviderId::Alphavantage => self.alphavantage_api_key.as_deref(),
            ProviderId::Polygon => self.polygon_api_key.as_deref(),
        };
        resolve_api_key(explicit, std::env::var(legacy_key_var(provider)).ok())
    }

    pub fn base_url(&self, provider: ProviderId) -> Option<&str> {
        match provider {
            ProviderId::Finnhub => self.finnhub_base_url.as_deref(),
            ProviderId::Alphavantage => self.alphavantage_base_url.as_deref(),
            ProviderId::Polygon => self.polygon_base_url.as_deref(),
        }
    }

    pub fn source_router(&self) -> SourceRouter {
        let mut builder = SourceRouterBuilder::new()
            .with_default_provider(self.default_provider)
            .with_timeout_ms(self.upstream_timeout_ms);

        for provider in ProviderId::ALL {
            builder = builder.with_api_key(provider, self.api_key(provider));
            if let Some(base_url) = self.base_url(provider) {
                builder = builder.with_base_url(provider, base_url);
            }
        }

        builder.build()
    }
}

const fn legacy_key_var(provider: ProviderId) -> &'static str {
    match provider {
        ProviderId::Finnhub => "FINNHUB_API_KEY",
        ProviderId::Alphavantage => "ALPHAVANTAGE_API_KEY",
        ProviderId::Polygon => "POLYGON_API_KEY",
    }
}

fn resolve_api_key(explicit: Option<&str>, fallback: Option<String>) -> String {
    explicit
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .map(str::to_owned)
        .or_else(|| fallback.map(|key| key.trim().to_owned()))
        .unwrap_or_default()
}
