//! Duration and byte-size literals used in policy conditions and action
//! parameters (`"30d"`, `"1h"`, `"50gb"`).

use crate::error::{IsmError, Result};
use chrono::Duration;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// TimeValue
// ---------------------------------------------------------------------------

static TIME_RE: OnceLock<Regex> = OnceLock::new();

fn time_re() -> &'static Regex {
    TIME_RE.get_or_init(|| Regex::new(r"^(\d+)(d|h|m|s)$").unwrap())
}

/// A duration literal: a non-negative integer followed by one of `d`, `h`,
/// `m`, `s`. Parsed once, at policy validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeValue {
    raw: String,
    duration: Duration,
}

impl TimeValue {
    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn from_secs(secs: i64) -> Self {
        Self {
            raw: format!("{secs}s"),
            duration: Duration::seconds(secs),
        }
    }
}

impl FromStr for TimeValue {
    type Err = IsmError;

    fn from_str(s: &str) -> Result<Self> {
        let caps = time_re().captures(s.trim()).ok_or_else(|| {
            IsmError::validation(format!(
                "invalid time value '{s}': expected <number><d|h|m|s>"
            ))
        })?;
        let amount: i64 = caps[1]
            .parse()
            .map_err(|_| IsmError::validation(format!("time value '{s}' is out of range")))?;
        let unit_secs: i64 = match &caps[2] {
            "d" => 86_400,
            "h" => 3_600,
            "m" => 60,
            _ => 1,
        };
        let duration = amount
            .checked_mul(unit_secs)
            .and_then(Duration::try_seconds)
            .ok_or_else(|| IsmError::validation(format!("time value '{s}' is out of range")))?;
        Ok(Self {
            raw: s.trim().to_string(),
            duration,
        })
    }
}

impl TryFrom<String> for TimeValue {
    type Error = IsmError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<TimeValue> for String {
    fn from(value: TimeValue) -> Self {
        value.raw
    }
}

impl fmt::Display for TimeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

// ---------------------------------------------------------------------------
// ByteSize
// ---------------------------------------------------------------------------

static SIZE_RE: OnceLock<Regex> = OnceLock::new();

fn size_re() -> &'static Regex {
    SIZE_RE.get_or_init(|| Regex::new(r"^(?i)(\d+)(b|kb|mb|gb|tb|pb)$").unwrap())
}

/// A byte-size literal such as `"50gb"` or `"512mb"` (binary multiples).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ByteSize {
    raw: String,
    bytes: u64,
}

impl ByteSize {
    pub fn bytes(&self) -> u64 {
        self.bytes
    }
}

impl FromStr for ByteSize {
    type Err = IsmError;

    fn from_str(s: &str) -> Result<Self> {
        let caps = size_re().captures(s.trim()).ok_or_else(|| {
            IsmError::validation(format!(
                "invalid byte size '{s}': expected <number><b|kb|mb|gb|tb|pb>"
            ))
        })?;
        let amount: u64 = caps[1]
            .parse()
            .map_err(|_| IsmError::validation(format!("byte size '{s}' is out of range")))?;
        let shift = match caps[2].to_ascii_lowercase().as_str() {
            "b" => 0,
            "kb" => 10,
            "mb" => 20,
            "gb" => 30,
            "tb" => 40,
            _ => 50,
        };
        let bytes = amount
            .checked_mul(1u64 << shift)
            .ok_or_else(|| IsmError::validation(format!("byte size '{s}' is out of range")))?;
        Ok(Self {
            raw: s.trim().to_string(),
            bytes,
        })
    }
}

impl TryFrom<String> for ByteSize {
    type Error = IsmError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<ByteSize> for String {
    fn from(value: ByteSize) -> Self {
        value.raw
    }
}

impl fmt::Display for ByteSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
