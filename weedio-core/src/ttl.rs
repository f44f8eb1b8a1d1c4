//! Coarse expiry horizons attached to stored objects.
//!
//! A TTL is written as `<count><unit>` where the unit is one of
//! `m h d w M y`. A bare number means minutes.

use crate::{Result, WeedError};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtlUnit {
    Minute,
    Hour,
    Day,
    Week,
    Month,
    Year,
}

impl TtlUnit {
    fn from_char(c: char) -> Option<Self> {
        match c {
            'm' => Some(Self::Minute),
            'h' => Some(Self::Hour),
            'd' => Some(Self::Day),
            'w' => Some(Self::Week),
            'M' => Some(Self::Month),
            'y' => Some(Self::Year),
            _ => None,
        }
    }

    fn as_char(self) -> char {
        match self {
            Self::Minute => 'm',
            Self::Hour => 'h',
            Self::Day => 'd',
            Self::Week => 'w',
            Self::Month => 'M',
            Self::Year => 'y',
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ttl {
    pub count: u32,
    pub unit: TtlUnit,
}

impl Ttl {
    /// One unit longer than `self`.
    ///
    /// Chunks are stored with the adjusted TTL of their parent object so a
    /// chunk never expires before the manifest that references it.
    pub fn adjusted(&self) -> Ttl {
        Ttl {
            count: self.count.saturating_add(1),
            unit: self.unit,
        }
    }
}

impl FromStr for Ttl {
    type Err = WeedError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let last = s
            .chars()
            .last()
            .ok_or_else(|| WeedError::InvalidTtl("empty ttl".to_string()))?;

        let (digits, unit) = if last.is_ascii_digit() {
            (s, TtlUnit::Minute)
        } else {
            let unit = TtlUnit::from_char(last)
                .ok_or_else(|| WeedError::InvalidTtl(format!("unknown unit in '{}'", s)))?;
            (&s[..s.len() - last.len_utf8()], unit)
        };

        let count = digits
            .parse::<u32>()
            .map_err(|_| WeedError::InvalidTtl(format!("bad count in '{}'", s)))?;

        Ok(Ttl { count, unit })
    }
}

impl fmt::Display for Ttl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.count, self.unit.as_char())
    }
}

/// Parse an optional TTL string where an empty value means "no TTL".
pub fn parse_optional_ttl(value: &str) -> Result<Option<Ttl>> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }
    value.parse().map(Some)
}

/// Append `ttl=` to `url` unless it already carries one.
pub fn sanitize_ttl(url: &str, ttl: Option<&Ttl>) -> String {
    let Some(ttl) = ttl else {
        return url.to_string();
    };

    let query = url.split_once('?').map(|(_, query)| query);
    let has_ttl = query.is_some_and(|query| {
        query
            .split('&')
            .any(|pair| pair.split_once('=').map_or(pair, |(key, _)| key) == "ttl")
    });
    if has_ttl {
        return url.to_string();
    }

    if query.is_some() {
        format!("{}&ttl={}", url, ttl)
    } else {
        format!("{}?ttl={}", url, ttl)
    }
}
