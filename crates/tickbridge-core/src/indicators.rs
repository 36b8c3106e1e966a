//! Technical indicators over closing prices.
//!
//! Every function returns only the final value of its series. Insufficient
//! input yields `None`; nothing here panics or returns an error.

use crate::{IndicatorSet, Macd, PriceSeries};

pub const RSI_PERIOD: usize = 14;
pub const EMA_SHORT_PERIOD: usize = 12;
pub const EMA_LONG_PERIOD: usize = 26;

/// Average loss used when a window has no losses at all.
const MIN_AVERAGE_LOSS: f64 = 0.001;

/// Relative strength index with Wilder smoothing.
///
/// The first `period` changes seed the average gain and loss as simple means;
/// each later change updates them with `avg = (avg * (period - 1) + x) / period`.
/// Needs at least `period + 1` closes.
pub fn rsi(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() < period + 1 {
        return None;
    }

    let changes = closes
        .windows(2)
        .map(|pair| pair[1] - pair[0])
        .collect::<Vec<_>>();
    let (seed, rest) = changes.split_at(period);
    let period_f = period as f64;

    let mut avg_gain = seed.iter().map(|change| change.max(0.0)).sum::<f64>() / period_f;
    let mut avg_loss = seed.iter().map(|change| (-change).max(0.0)).sum::<f64>() / period_f;

    for change in rest {
        avg_gain = (avg_gain * (period_f - 1.0) + change.max(0.0)) / period_f;
        avg_loss = (avg_loss * (period_f - 1.0) + (-change).max(0.0)) / period_f;
    }

    if avg_loss == 0.0 {
        avg_loss = MIN_AVERAGE_LOSS;
    }

    let rs = avg_gain / avg_loss;
    Some(100.0 - 100.0 / (1.0 + rs))
}

/// Exponential moving average seeded with the simple mean of the first
/// `period` values. Needs at least `period` values.
pub fn ema(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period {
        return None;
    }

    let (seed, rest) = values.split_at(period);
    let multiplier = 2.0 / (period as f64 + 1.0);
    let initial = seed.iter().sum::<f64>() / period as f64;

    Some(
        rest.iter()
            .fold(initial, |ema, value| (value - ema) * multiplier + ema),
    )
}

/// MACD line from the 12 and 26 period EMAs.
///
/// Only the final MACD value is known, so the signal line and histogram are
/// always `None`.
pub fn macd(closes: &[f64]) -> Macd {
    let macd_line = ema(closes, EMA_SHORT_PERIOD)
        .zip(ema(closes, EMA_LONG_PERIOD))
        .map(|(short, long)| short - long);

    Macd {
        macd_line,
        signal_line: None,
        histogram: None,
    }
}

/// Computes the standard indicator set, or `None` for an empty series.
pub fn calculate_indicators(series: &PriceSeries) -> Option<IndicatorSet> {
    if series.is_empty() {
        return None;
    }

    let closes = series.closes();
    Some(IndicatorSet {
        rsi: rsi(&closes, RSI_PERIOD),
        ema_short: ema(&closes, EMA_SHORT_PERIOD),
        ema_long: ema(&closes, EMA_LONG_PERIOD),
        macd: macd(&closes),
    })
}
