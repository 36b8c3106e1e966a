use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::{DateWindow, Interval, ProviderId, Symbol, UtcDateTime, ValidationError};

/// Canonical latest-price snapshot.
///
/// `timestamp` is the capture time of the request, not the market time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub symbol: Symbol,
    pub price: f64,
    pub change: Option<f64>,
    pub percent_change: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub open: Option<f64>,
    pub previous_close: Option<f64>,
    pub timestamp: UtcDateTime,
    pub source: ProviderId,
}

impl Quote {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        symbol: Symbol,
        price: f64,
        change: Option<f64>,
        percent_change: Option<f64>,
        high: Option<f64>,
        low: Option<f64>,
        open: Option<f64>,
        previous_close: Option<f64>,
        source: ProviderId,
    ) -> Result<Self, ValidationError> {
        validate_non_negative("price", price)?;

        Ok(Self {
            symbol,
            price,
            change: finite(change),
            percent_change: finite(percent_change),
            high: finite(high),
            low: finite(low),
            open: finite(open),
            previous_close: finite(previous_close),
            timestamp: UtcDateTime::now(),
            source,
        })
    }
}

/// Canonical company profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyProfile {
    pub symbol: Symbol,
    pub name: String,
    pub exchange: Option<String>,
    pub industry: Option<String>,
    pub market_cap: Option<f64>,
    pub logo: Option<String>,
    pub weburl: Option<String>,
    pub source: ProviderId,
}

impl CompanyProfile {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        symbol: Symbol,
        name: impl Into<String>,
        exchange: Option<String>,
        industry: Option<String>,
        market_cap: Option<f64>,
        logo: Option<String>,
        weburl: Option<String>,
        source: ProviderId,
    ) -> Result<Self, ValidationError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ValidationError::EmptyField { field: "name" });
        }

        Ok(Self {
            symbol,
            name,
            exchange: non_blank(exchange),
            industry: non_blank(industry),
            market_cap: finite(market_cap),
            logo: non_blank(logo),
            weburl: non_blank(weburl),
            source,
        })
    }
}

/// OHLCV bar for a given interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: UtcDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: Option<u64>,
}

impl Bar {
    pub fn new(
        timestamp: UtcDateTime,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: Option<f64>,
    ) -> Result<Self, ValidationError> {
        validate_non_negative("open", open)?;
        validate_non_negative("high", high)?;
        validate_non_negative("low", low)?;
        validate_non_negative("close", close)?;

        if high < low {
            return Err(ValidationError::InvertedBarRange {
                high: high.to_string(),
                low: low.to_string(),
            });
        }

        Ok(Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume: finite(volume)
                .filter(|value| *value >= 0.0)
                .map(|value| value.round() as u64),
        })
    }
}

/// Ascending, timestamp-unique bar series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSeries {
    pub symbol: Symbol,
    pub interval: Interval,
    pub data: Vec<Bar>,
    pub source: ProviderId,
}

impl PriceSeries {
    /// Builds a series from bars in any upstream order.
    ///
    /// Bars outside `window` are dropped, the rest are sorted ascending and
    /// duplicate timestamps keep their first occurrence.
    pub fn from_unordered(
        symbol: Symbol,
        interval: Interval,
        bars: Vec<Bar>,
        window: &DateWindow,
        source: ProviderId,
    ) -> Self {
        let mut data = bars
            .into_iter()
            .filter(|bar| window.contains(bar.timestamp))
            .collect::<Vec<_>>();
        data.sort_by_key(|bar| bar.timestamp);
        data.dedup_by_key(|bar| bar.timestamp);

        Self {
            symbol,
            interval,
            data,
            source,
        }
    }

    pub fn closes(&self) -> Vec<f64> {
        self.data.iter().map(|bar| bar.close).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Option contract side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionType {
    Call,
    Put,
}

impl OptionType {
    /// Maps provider spellings (`CALL`, `call`, `Put`) onto a side.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "call" | "c" => Some(Self::Call),
            "put" | "p" => Some(Self::Put),
            _ => None,
        }
    }
}

/// Canonical option contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionContract {
    #[serde(rename = "type")]
    pub contract_type: OptionType,
    pub contract_symbol: String,
    pub strike: Option<f64>,
    pub expiration: String,
    pub last_price: Option<f64>,
    pub change: Option<f64>,
    pub volume: Option<f64>,
    pub open_interest: Option<f64>,
    pub implied_volatility: Option<f64>,
}

impl OptionContract {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        contract_type: OptionType,
        contract_symbol: impl Into<String>,
        strike: Option<f64>,
        expiration: impl Into<String>,
        last_price: Option<f64>,
        change: Option<f64>,
        volume: Option<f64>,
        open_interest: Option<f64>,
        implied_volatility: Option<f64>,
    ) -> Result<Self, ValidationError> {
        let contract_symbol = contract_symbol.into();
        if contract_symbol.trim().is_empty() {
            return Err(ValidationError::EmptyField {
                field: "contract_symbol",
            });
        }

        Ok(Self {
            contract_type,
            contract_symbol,
            strike: finite(strike),
            expiration: expiration.into(),
            last_price: finite(last_price),
            change: finite(change),
            volume: finite(volume),
            open_interest: finite(open_interest),
            implied_volatility: finite(implied_volatility),
        })
    }
}

/// Canonical options chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionsChain {
    pub symbol: Symbol,
    pub expiration_dates: Vec<String>,
    pub options: Vec<OptionContract>,
    pub source: ProviderId,
}

impl OptionsChain {
    /// Builds a chain whose expiration list is the sorted, deduplicated union of
    /// `expirations` and every contract's expiration.
    pub fn new(
        symbol: Symbol,
        expirations: impl IntoIterator<Item = String>,
        options: Vec<OptionContract>,
        source: ProviderId,
    ) -> Self {
        let expiration_dates = expirations
            .into_iter()
            .chain(options.iter().map(|contract| contract.expiration.clone()))
            .filter(|date| !date.trim().is_empty())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        Self {
            symbol,
            expiration_dates,
            options,
            source,
        }
    }
}

/// MACD triple. `signal_line` and `histogram` are always null.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Macd {
    pub macd_line: Option<f64>,
    pub signal_line: Option<f64>,
    pub histogram: Option<f64>,
}

/// Indicator values computed from the closes of a price series.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndicatorSet {
    pub rsi: Option<f64>,
    pub ema_short: Option<f64>,
    pub ema_long: Option<f64>,
    pub macd: Macd,
}

fn validate_non_negative(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError::NonFiniteValue { field });
    }
    if value < 0.0 {
        return Err(ValidationError::NegativeValue { field });
    }
    Ok(())
}

fn finite(value: Option<f64>) -> Option<f64> {
    value.filter(|value| value.is_finite())
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}
