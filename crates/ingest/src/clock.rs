use std::fmt;

use time::{macros::offset, Date, Duration, Month, OffsetDateTime, Time, UtcOffset};

/// Civil offset used by every KMA timestamp (KST).
pub const KST: UtcOffset = offset!(+9);

/// A `[start, end)` fetch window in the upstream `YYYYMMDDHHmm` wire format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: String,
    pub end: String,
}

impl TimeWindow {
    pub fn new(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
        }
    }

    /// The part of this window after `covered_through`, or `None` when nothing is left.
    ///
    /// Stamps share one fixed-width digit format, so byte order is time order.
    pub fn remainder_after(&self, covered_through: &str) -> Option<TimeWindow> {
        if self.end.as_str() <= covered_through {
            None
        } else if self.start.as_str() < covered_through {
            Some(TimeWindow::new(covered_through, self.end.clone()))
        } else {
            Some(self.clone())
        }
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ~ {}", self.start, self.end)
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum StampError {
    #[error("expected 12 digits (YYYYMMDDHHmm), got {0:?}")]
    Shape(String),
    #[error("timestamp {stamp:?} is not a valid calendar time: {reason}")]
    Range { stamp: String, reason: String },
}

/// Format an instant as `YYYYMMDDHHmm` in its own offset.
pub fn format_stamp(at: OffsetDateTime) -> String {
    format!(
        "{:04}{:02}{:02}{:02}{:02}",
        at.year(),
        u8::from(at.month()),
        at.day(),
        at.hour(),
        at.minute()
    )
}

/// Parse a `YYYYMMDDHHmm` stamp as a civil time at `offset`.
pub fn parse_stamp(stamp: &str, offset: UtcOffset) -> Result<OffsetDateTime, StampError> {
    if stamp.len() != 12 || !stamp.bytes().all(|b| b.is_ascii_digit()) {
        return Err(StampError::Shape(stamp.to_string()));
    }
    // all twelve bytes are ASCII digits, so every slice below parses
    let field = |range: std::ops::Range<usize>| stamp[range].parse::<u16>().unwrap_or_default();
    let range_err = |e: time::error::ComponentRange| StampError::Range {
        stamp: stamp.to_string(),
        reason: e.to_string(),
    };

    let month = Month::try_from(field(4..6) as u8).map_err(range_err)?;
    let date = Date::from_calendar_date(i32::from(field(0..4)), month, field(6..8) as u8)
        .map_err(range_err)?;
    let time = Time::from_hms(field(8..10) as u8, field(10..12) as u8, 0).map_err(range_err)?;

    Ok(date.with_time(time).assume_offset(offset))
}

/// Computes fetch windows in a fixed civil offset.
#[derive(Debug, Clone, Copy)]
pub struct WindowClock {
    offset: UtcOffset,
}

impl Default for WindowClock {
    fn default() -> Self {
        Self::new(KST)
    }
}

impl WindowClock {
    pub fn new(offset: UtcOffset) -> Self {
        Self { offset }
    }

    pub fn offset(&self) -> UtcOffset {
        self.offset
    }

    pub fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc().to_offset(self.offset)
    }

    /// One hour ago until now.
    pub fn observation_window(&self) -> TimeWindow {
        self.observation_window_at(self.now())
    }

    pub fn observation_window_at(&self, now: OffsetDateTime) -> TimeWindow {
        self.trailing_window_at(now, Duration::HOUR)
    }

    /// `span` before now until now.
    pub fn trailing_window(&self, span: Duration) -> TimeWindow {
        self.trailing_window_at(self.now(), span)
    }

    pub fn trailing_window_at(&self, now: OffsetDateTime, span: Duration) -> TimeWindow {
        let now = now.to_offset(self.offset);
        TimeWindow::new(format_stamp(now - span), format_stamp(now))
    }

    /// Local midnight `days` days ago until the start of the current hour.
    pub fn backfill_window(&self, days: u32) -> TimeWindow {
        self.backfill_window_at(self.now(), days)
    }

    pub fn backfill_window_at(&self, now: OffsetDateTime, days: u32) -> TimeWindow {
        let now = now.to_offset(self.offset);
        let first_day = now.date().saturating_sub(Duration::days(i64::from(days)));
        let start = first_day.midnight().assume_offset(self.offset);
        let end = now.replace_time(Time::MIDNIGHT) + Duration::hours(i64::from(now.hour()));
        TimeWindow::new(format_stamp(start), format_stamp(end))
    }
}
