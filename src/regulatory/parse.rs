//! Parsers for the scalar value formats used by the regulatory source.

use std::fmt;

use winnow::ascii::digit1;
use winnow::combinator::{opt, preceded};
use winnow::prelude::*;
use winnow::token::{one_of, take_while};

// Manually define PResult for resilience against winnow version changes
type PResult<T> = Result<T, winnow::error::ErrMode<winnow::error::ContextError>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TimeOfDay {
    pub hours: u8,
    pub minutes: u8,
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hours, self.minutes)
    }
}

fn two_digit(input: &mut &str) -> PResult<u8> {
    take_while(1..=2, |c: char| c.is_ascii_digit())
        .try_map(|s: &str| s.parse::<u8>())
        .parse_next(input)
}

fn time_of_day(input: &mut &str) -> PResult<TimeOfDay> {
    let hours = two_digit.parse_next(input)?;
    ':'.parse_next(input)?;
    let minutes = take_while(2, |c: char| c.is_ascii_digit())
        .try_map(|s: &str| s.parse::<u8>())
        .parse_next(input)?;
    Ok(TimeOfDay { hours, minutes })
}

/// Parse `HH:MM` (24:00 allowed as end of day).
pub fn parse_time_of_day(raw: &str) -> Option<TimeOfDay> {
    let time = time_of_day.parse(raw.trim()).ok()?;
    let valid = time.minutes < 60 && (time.hours < 24 || (time.hours == 24 && time.minutes == 0));
    valid.then_some(time)
}

fn decimal<'i>(input: &mut &'i str) -> PResult<(&'i str, Option<&'i str>)> {
    (digit1, opt(preceded(one_of([',', '.']), digit1))).parse_next(input)
}

/// Parse a decimal with either separator and render it with a period.
pub fn normalize_decimal(raw: &str) -> Option<String> {
    let (whole, fraction) = decimal.parse(raw.trim()).ok()?;
    Some(match fraction {
        Some(fraction) => format!("{whole}.{fraction}"),
        None => whole.to_string(),
    })
}
