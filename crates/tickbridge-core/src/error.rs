use thiserror::Error;

/// Validation errors raised while parsing caller input into domain types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("symbol cannot be empty")]
    EmptySymbol,
    #[error("symbol length {len} exceeds max {max}")]
    SymbolTooLong { len: usize, max: usize },
    #[error("symbol must start with an ASCII letter or '^': '{ch}'")]
    SymbolInvalidStart { ch: char },
    #[error("symbol contains invalid character '{ch}' at index {index}")]
    SymbolInvalidChar { ch: char, index: usize },

    #[error("invalid interval '{value}', expected one of 1m, 5m, 15m, 30m, 1h, 1d, 1w, 1M")]
    InvalidInterval { value: String },
    #[error("invalid provider '{value}', expected one of finnhub, alphavantage, polygon")]
    InvalidProvider { value: String },

    #[error("timestamp must be RFC3339: '{value}'")]
    InvalidTimestamp { value: String },
    #[error("date must be formatted as YYYY-MM-DD: '{value}'")]
    InvalidDate { value: String },
    #[error("date window start {from} is after end {to}")]
    InvertedDateWindow { from: String, to: String },

    #[error("field '{field}' must be finite")]
    NonFiniteValue { field: &'static str },
    #[error("field '{field}' must be non-negative")]
    NegativeValue { field: &'static str },
    #[error("bar high {high} is below low {low}")]
    InvertedBarRange { high: String, low: String },
    #[error("field '{field}' cannot be empty")]
    EmptyField { field: &'static str },
}
