//! Configuration types for exstream combinators
//!
//! All configs load from serde formats. Durations are written as whole
//! milliseconds.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{StreamError, StreamResult};

/// Configuration for resolving streams of deferred values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolveConfig {
    /// Deferred values kept in flight at once
    pub concurrency: usize,
    /// End the stream after the first rejection
    pub stop_on_error: bool,
}

impl Default for ResolveConfig {
    fn default() -> Self {
        Self {
            concurrency: 1,
            stop_on_error: true,
        }
    }
}

impl ResolveConfig {
    pub fn validate(&self) -> StreamResult<()> {
        if self.concurrency == 0 {
            return Err(StreamError::invalid("resolve", "concurrency must be greater than zero"));
        }
        Ok(())
    }
}

/// Configuration for `ratelimit`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Values allowed per window
    pub count: usize,
    /// Window length, serialized in whole milliseconds
    #[serde(with = "duration_ms")]
    pub per: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            count: 1,
            per: Duration::from_millis(1000),
        }
    }
}

impl RateLimitConfig {
    pub fn validate(&self) -> StreamResult<()> {
        if self.count == 0 {
            return Err(StreamError::invalid("ratelimit", "count must be greater than zero"));
        }
        if self.per.is_zero() {
            return Err(StreamError::invalid("ratelimit", "window must be greater than zero"));
        }
        Ok(())
    }
}

/// CSV dialect used by the codec stages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CsvConfig {
    pub delimiter: u8,
    pub quote: u8,
    /// The first record names the columns
    pub has_headers: bool,
    /// Appended to every rendered row
    pub line_terminator: String,
}

impl Default for CsvConfig {
    fn default() -> Self {
        Self {
            delimiter: b',',
            quote: b'"',
            has_headers: true,
            line_terminator: "\n".to_string(),
        }
    }
}

impl CsvConfig {
    pub fn validate(&self) -> StreamResult<()> {
        if self.delimiter == self.quote {
            return Err(StreamError::invalid("csv", "delimiter and quote must differ"));
        }
        if matches!(self.delimiter, b'\n' | b'\r') || matches!(self.quote, b'\n' | b'\r') {
            return Err(StreamError::invalid("csv", "delimiter and quote cannot be line breaks"));
        }
        if self.line_terminator != "\r\n" && self.line_terminator.len() != 1 {
            return Err(StreamError::invalid(
                "csv",
                "line terminator must be a single byte or \"\\r\\n\"",
            ));
        }
        Ok(())
    }
}

/// Durations as whole milliseconds.
///
/// Serializing a duration with a sub-millisecond part, or one too long for a
/// `u64` of milliseconds, is an error rather than a silent truncation.
mod duration_ms {
    use std::time::Duration;

    use serde::{ser, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        if duration.subsec_nanos() % 1_000_000 != 0 {
            return Err(ser::Error::custom(format!(
                "{:?} is not a whole number of milliseconds",
                duration
            )));
        }
        let millis = u64::try_from(duration.as_millis())
            .map_err(|_| ser::Error::custom(format!("{:?} does not fit in u64 milliseconds", duration)))?;
        serializer.serialize_u64(millis)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
