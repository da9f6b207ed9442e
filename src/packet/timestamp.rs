//! Capture timestamps.

use core::fmt;
use serde::Serialize;
use std::sync::OnceLock;
use time::macros::format_description;
use time::{OffsetDateTime, UtcOffset};

static LOCAL_OFFSET: OnceLock<UtcOffset> = OnceLock::new();

/// Record the local UTC offset used by [`Timestamp::clock`].
///
/// The offset can only be read reliably while the process has a single
/// thread, so call this at startup. Until it runs, or when the offset cannot
/// be determined, clock times are shown in UTC.
#[must_use]
pub fn init_local_offset() -> UtcOffset {
    *LOCAL_OFFSET.get_or_init(|| UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC))
}

/// Seconds and microseconds since the Unix epoch, as reported by the capture source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Timestamp {
    pub secs: i64,
    pub micros: u32,
}

impl Timestamp {
    #[must_use]
    pub fn new(secs: i64, micros: u32) -> Self {
        Self { secs, micros }
    }

    /// Local time of day, `hh:mm:ss.mmm`.
    #[must_use]
    pub fn clock(&self) -> String {
        self.clock_at(LOCAL_OFFSET.get().copied().unwrap_or(UtcOffset::UTC))
    }

    /// Time of day at `offset`, `hh:mm:ss.mmm`.
    #[must_use]
    pub fn clock_at(&self, offset: UtcOffset) -> String {
        let format = format_description!("[hour]:[minute]:[second].[subsecond digits:3]");
        OffsetDateTime::from_unix_timestamp(self.secs)
            .ok()
            .map(|t| t + time::Duration::microseconds(i64::from(self.micros)))
            .map(|t| t.to_offset(offset))
            .and_then(|t| t.format(&format).ok())
            .unwrap_or_else(|| format!("{}.{:06}", self.secs, self.micros))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:06}", self.secs, self.micros)
    }
}
