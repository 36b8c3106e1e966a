//! Canonical domain types.
//!
//! Every provider adapter normalizes its payloads into these shapes, so HTTP
//! consumers see one vocabulary regardless of which upstream answered.
//! Constructors validate their invariants and return [`crate::ValidationError`].

mod interval;
mod models;
mod symbol;
mod timestamp;
mod window;

pub use interval::Interval;
pub use models::{
    Bar, CompanyProfile, IndicatorSet, Macd, OptionContract, OptionType, OptionsChain,
    PriceSeries, Quote,
};
pub use symbol::Symbol;
pub use timestamp::UtcDateTime;
pub use window::DateWindow;
