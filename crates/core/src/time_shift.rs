use chrono::{DateTime, FixedOffset, TimeDelta};
use std::fmt;
use thiserror::Error;

const NANOS_PER_SECOND: u128 = 1_000_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sign {
    Plus,
    Minus,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TimeShiftError {
    #[error("unknown time shift command '{0}', only '+' or '-' allowed")]
    InvalidTimeShiftFormat(String),
    #[error("invalid duration '{0}'")]
    InvalidDuration(String),
    #[error("duration out of range: {0}")]
    Overflow(String),
}

/// Signed offset applied to every creation timestamp.
///
/// The sign is stored apart from the magnitude because the command line
/// encodes it as its own leading character (`+1h`, `-30m`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeShift {
    sign: Sign,
    magnitude: TimeDelta,
}

impl Default for TimeShift {
    fn default() -> Self {
        Self {
            sign: Sign::Plus,
            magnitude: TimeDelta::zero(),
        }
    }
}

impl TimeShift {
    pub fn new(sign: Sign, magnitude: TimeDelta) -> Self {
        Self {
            sign,
            magnitude: magnitude.abs(),
        }
    }

    pub fn sign(&self) -> Sign {
        self.sign
    }

    pub fn magnitude(&self) -> TimeDelta {
        self.magnitude
    }

    pub fn is_zero(&self) -> bool {
        self.magnitude.is_zero()
    }

    pub fn inverse(&self) -> Self {
        let sign = match self.sign {
            Sign::Plus => Sign::Minus,
            Sign::Minus => Sign::Plus,
        };
        Self {
            sign,
            magnitude: self.magnitude,
        }
    }

    /// Returns `None` when the result leaves chrono's representable range.
    pub fn apply(&self, time: DateTime<FixedOffset>) -> Option<DateTime<FixedOffset>> {
        if self.is_zero() {
            return Some(time);
        }
        match self.sign {
            Sign::Plus => time.checked_add_signed(self.magnitude),
            Sign::Minus => time.checked_sub_signed(self.magnitude),
        }
    }
}

impl fmt::Display for TimeShift {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = match self.sign {
            Sign::Plus => '+',
            Sign::Minus => '-',
        };
        let seconds = self.magnitude.num_seconds();
        let nanos = self.magnitude.subsec_nanos();
        if nanos == 0 {
            write!(f, "{sign}{seconds}s")
        } else {
            let fraction = format!("{nanos:09}");
            write!(f, "{sign}{seconds}.{}s", fraction.trim_end_matches('0'))
        }
    }
}

pub fn parse_time_shift(input: &str) -> Result<TimeShift, TimeShiftError> {
    let input = input.trim();
    let mut chars = input.chars();
    let sign = match chars.next() {
        Some('+') => Sign::Plus,
        Some('-') => Sign::Minus,
        Some(other) => return Err(TimeShiftError::InvalidTimeShiftFormat(other.to_string())),
        None => return Err(TimeShiftError::InvalidTimeShiftFormat(String::new())),
    };
    let magnitude = parse_duration(chars.as_str())?;
    Ok(TimeShift { sign, magnitude })
}

/// Parses an unsigned duration made of `<number>[.<fraction>]<unit>` groups,
/// e.g. `1h30m`, `0h1m2s`, `1.5h`, `250ms`. A bare `0` is accepted.
///
/// Fractions are resolved in integer nanoseconds so the result is exact.
pub fn parse_duration(input: &str) -> Result<TimeDelta, TimeShiftError> {
    if input == "0" {
        return Ok(TimeDelta::zero());
    }
    if input.is_empty() {
        return Err(TimeShiftError::InvalidDuration(input.to_string()));
    }

    let invalid = || TimeShiftError::InvalidDuration(input.to_string());
    let overflow = || TimeShiftError::Overflow(input.to_string());

    let mut rest = input;
    let mut total: u128 = 0;
    while !rest.is_empty() {
        let int_len = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
        let int_digits = &rest[..int_len];
        rest = &rest[int_len..];

        let mut frac_digits = "";
        if let Some(after_dot) = rest.strip_prefix('.') {
            let frac_len = after_dot
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(after_dot.len());
            frac_digits = &after_dot[..frac_len];
            rest = &after_dot[frac_len..];
        }
        if int_digits.is_empty() && frac_digits.is_empty() {
            return Err(invalid());
        }

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let unit = unit_nanos(&rest[..unit_len]).ok_or_else(invalid)?;
        rest = &rest[unit_len..];

        let whole = if int_digits.is_empty() {
            0
        } else {
            int_digits.parse::<u128>().map_err(|_| overflow())?
        };
        let mut value = whole.checked_mul(unit).ok_or_else(overflow)?;

        if !frac_digits.is_empty() {
            // Digits past nanosecond precision cannot contribute.
            let kept = &frac_digits[..frac_digits.len().min(18)];
            let numerator = kept.parse::<u128>().map_err(|_| overflow())?;
            let scale = 10u128.pow(kept.len() as u32);
            value = value
                .checked_add(numerator * unit / scale)
                .ok_or_else(overflow)?;
        }

        total = total.checked_add(value).ok_or_else(overflow)?;
    }

    let nanos = i64::try_from(total).map_err(|_| overflow())?;
    Ok(TimeDelta::nanoseconds(nanos))
}

fn unit_nanos(unit: &str) -> Option<u128> {
    match unit {
        "ns" => Some(1),
        "us" | "µs" | "μs" => Some(1_000),
        "ms" => Some(1_000_000),
        "s" => Some(NANOS_PER_SECOND),
        "m" => Some(60 * NANOS_PER_SECOND),
        "h" => Some(3_600 * NANOS_PER_SECOND),
        _ => None,
    }
}
