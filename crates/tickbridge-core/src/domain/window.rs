use std::fmt::{Display, Formatter};

use time::macros::format_description;
use time::Date;

use crate::{UtcDateTime, ValidationError};

/// Inclusive `[from, to]` calendar-date window used by historical requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    from: Date,
    to: Date,
}

impl DateWindow {
    pub fn new(from: Date, to: Date) -> Result<Self, ValidationError> {
        if from > to {
            return Err(ValidationError::InvertedDateWindow {
                from: format_date(from),
                to: format_date(to),
            });
        }
        Ok(Self { from, to })
    }

    /// Parses two `YYYY-MM-DD` strings into a window.
    pub fn parse(from: &str, to: &str) -> Result<Self, ValidationError> {
        Self::new(parse_date(from)?, parse_date(to)?)
    }

    pub fn contains(&self, ts: UtcDateTime) -> bool {
        let date = ts.date();
        date >= self.from && date <= self.to
    }

    /// First instant of the window, as epoch seconds.
    pub fn start_unix_seconds(&self) -> i64 {
        self.from.midnight().assume_utc().unix_timestamp()
    }

    /// Last second of the window, as epoch seconds.
    pub fn end_unix_seconds(&self) -> i64 {
        self.to.midnight().assume_utc().unix_timestamp() + 86_399
    }

    pub fn start_date_string(&self) -> String {
        format_date(self.from)
    }

    pub fn end_date_string(&self) -> String {
        format_date(self.to)
    }
}

impl Display for DateWindow {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..={}", self.start_date_string(), self.end_date_string())
    }
}

fn parse_date(input: &str) -> Result<Date, ValidationError> {
    Date::parse(input.trim(), format_description!("[year]-[month]-[day]")).map_err(|_| {
        ValidationError::InvalidDate {
            value: input.to_owned(),
        }
    })
}

fn format_date(date: Date) -> String {
    format!(
        "{:04}-{:02}-{:02}",
        date.year(),
        u8::from(date.month()),
        date.day()
    )
}
