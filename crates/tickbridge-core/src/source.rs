use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Canonical provider identifiers carried in every canonical entity.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    #[default]
    Finnhub,
    Alphavantage,
    Polygon,
}

impl ProviderId {
    pub const ALL: [Self; 3] = [Self::Finnhub, Self::Alphavantage, Self::Polygon];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Finnhub => "finnhub",
            Self::Alphavantage => "alphavantage",
            Self::Polygon => "polygon",
        }
    }

    /// Human-readable provider name for catalog output.
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::Finnhub => "Finnhub",
            Self::Alphavantage => "Alpha Vantage",
            Self::Polygon => "Polygon.io",
        }
    }
}

impl Display for ProviderId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "finnhub" => Ok(Self::Finnhub),
            "alphavantage" => Ok(Self::Alphavantage),
            "polygon" => Ok(Self::Polygon),
            other => Err(ValidationError::InvalidProvider {
                value: other.to_owned(),
            }),
        }
    }
}
