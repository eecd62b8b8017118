use std::convert::TryFrom;
use std::fmt::{Display, Formatter};
use std::ops::{Add, Sub};
use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::{Clock, Result};

/// Naive date-time layouts, interpreted as UTC. `%.f` also matches a missing fraction.
const NAIVE_DATE_TIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S%.f",
    "%Y/%m/%d %H:%M",
    "%m/%d/%Y %H:%M:%S%.f",
    "%m/%d/%Y %H:%M",
    "%d %b %Y %H:%M:%S%.f",
    "%b %d, %Y %H:%M:%S%.f",
    "%b %d %Y %H:%M:%S%.f",
    "%d %B %Y %H:%M:%S%.f",
    "%B %d, %Y %H:%M:%S%.f",
    "%B %d %Y %H:%M:%S%.f",
];

const OFFSET_DATE_TIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f %z",
];

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%d %b %Y",
    "%b %d, %Y",
    "%b %d %Y",
    "%d %B %Y",
    "%B %d, %Y",
    "%B %d %Y",
];

/// Wall-clock instant with microsecond resolution, kept as a number of microseconds since the
/// Unix epoch (UTC). Every constructed value lies within the calendar range supported by
/// `chrono`, so it can always be turned back into a `DateTime<Utc>`.
///
/// Serialized as an integer, which is also the score used by persistent tables.
#[derive(Debug, Copy, Clone, PartialOrd, PartialEq, Ord, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Timestamp(i64);

impl Timestamp {
    /// Current wall-clock time.
    pub fn now() -> Self {
        Timestamp(Utc::now().timestamp_micros())
    }

    pub fn from_micros(micros: i64) -> Result<Self> {
        match DateTime::<Utc>::from_timestamp_micros(micros) {
            Some(_) => Ok(Timestamp(micros)),
            None => Err(Error::invalid_timestamp(&micros.to_string(), "out of calendar range")),
        }
    }

    pub fn as_micros(&self) -> i64 { self.0 }

    pub fn to_datetime(&self) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp_micros(self.0).unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Returns `None` if the result falls outside of the calendar range.
    pub fn checked_add(&self, duration: Duration) -> Option<Self> {
        self.to_datetime().checked_add_signed(duration).map(Timestamp::from)
    }

    /// Returns `None` if the result falls outside of the calendar range.
    pub fn checked_sub(&self, duration: Duration) -> Option<Self> {
        self.to_datetime().checked_sub_signed(duration).map(Timestamp::from)
    }

    fn saturated(low: bool) -> Self {
        if low {
            Timestamp::from(DateTime::<Utc>::MIN_UTC)
        } else {
            Timestamp::from(DateTime::<Utc>::MAX_UTC)
        }
    }

    /// Parses a date-time written in one of the commonly used layouts: RFC 3339, RFC 2822,
    /// ISO-8601 with `T` or space separator (optional fraction and offset), minute precision,
    /// and plain dates. Values without an offset are taken as UTC.
    pub fn parse(input: &str) -> Result<Self> {
        let s = input.trim();
        if s.is_empty() {
            return Err(Error::invalid_timestamp(input, "empty input"));
        }

        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Ok(dt.into());
        }
        if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
            return Ok(dt.into());
        }
        for fmt in OFFSET_DATE_TIME_FORMATS {
            if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
                return Ok(dt.into());
            }
        }
        for fmt in NAIVE_DATE_TIME_FORMATS {
            if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
                return Ok(Utc.from_utc_datetime(&naive).into());
            }
        }
        for fmt in DATE_FORMATS {
            if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
                if let Some(naive) = date.and_hms_opt(0, 0, 0) {
                    return Ok(Utc.from_utc_datetime(&naive).into());
                }
            }
        }

        Err(Error::invalid_timestamp(input, "unrecognized date/time format"))
    }
}

impl<Tz: TimeZone> From<DateTime<Tz>> for Timestamp {
    fn from(dt: DateTime<Tz>) -> Self {
        Timestamp(dt.with_timezone(&Utc).timestamp_micros())
    }
}

impl TryFrom<i64> for Timestamp {
    type Error = Error;

    fn try_from(micros: i64) -> Result<Self> {
        Timestamp::from_micros(micros)
    }
}

impl From<Timestamp> for i64 {
    fn from(ts: Timestamp) -> Self { ts.0 }
}

impl FromStr for Timestamp {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Timestamp::parse(s)
    }
}

impl Display for Timestamp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_datetime().to_rfc3339_opts(SecondsFormat::Micros, true))
    }
}

/// Saturates at the edges of the calendar range instead of overflowing.
impl Add<Duration> for Timestamp {
    type Output = Timestamp;

    fn add(self, rhs: Duration) -> Self::Output {
        self.checked_add(rhs).unwrap_or_else(|| Timestamp::saturated(rhs < Duration::zero()))
    }
}

/// Saturates at the edges of the calendar range instead of overflowing.
impl Sub<Duration> for Timestamp {
    type Output = Timestamp;

    fn sub(self, rhs: Duration) -> Self::Output {
        self.checked_sub(rhs).unwrap_or_else(|| Timestamp::saturated(rhs > Duration::zero()))
    }
}

impl Clock for Timestamp {
    #[inline]
    fn now() -> Self {
        Timestamp::now()
    }
}

#[cfg(test)]
mod test {
    use crate::error::Error;
    use crate::time::Timestamp;
    use chrono::{Duration, TimeZone, Utc};

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> Timestamp {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap().into()
    }

    #[test]
    fn timestamp_parse_layouts() {
        let expected = utc(2026, 10, 16, 12, 30, 0);
        let cases = vec![
            "2026-10-16T12:30:00Z",
            "2026-10-16T14:30:00+02:00",
            "Fri, 16 Oct 2026 12:30:00 +0000",
            "2026-10-16T12:30:00",
            "2026-10-16 12:30:00",
            "2026-10-16T12:30",
            "2026-10-16 12:30",
            "2026/10/16 12:30:00",
            "10/16/2026 12:30:00",
            "16 Oct 2026 12:30:00",
            "October 16, 2026 12:30:00",
            "  2026-10-16 12:30:00  ",
        ];

        for input in cases {
            assert_eq!(Timestamp::parse(input).unwrap(), expected, "input: {}", input);
        }
    }

    #[test]
    fn timestamp_parse_dates() {
        let expected = utc(2026, 10, 16, 0, 0, 0);
        for input in vec!["2026-10-16", "2026/10/16", "10/16/2026", "16 October 2026", "Oct 16, 2026"] {
            assert_eq!(Timestamp::parse(input).unwrap(), expected, "input: {}", input);
        }
    }

    #[test]
    fn timestamp_parse_fraction() {
        let ts = Timestamp::parse("2026-10-16T12:30:00.123456").unwrap();
        assert_eq!(ts, utc(2026, 10, 16, 12, 30, 0) + Duration::microseconds(123_456));
    }

    #[test]
    fn timestamp_parse_rejects_garbage() {
        for input in vec!["", "   ", "TEMP", "not-a-date", "2026-13-45", "12:30"] {
            match input.parse::<Timestamp>() {
                Err(Error::InvalidTimestamp { input: reported, .. }) => assert_eq!(reported, input),
                other => panic!("expected invalid timestamp for '{}', got {:?}", input, other),
            }
        }
    }

    #[test]
    fn timestamp_display_parses_back() {
        let ts = Timestamp::now();
        assert_eq!(ts.to_string().parse::<Timestamp>().unwrap(), ts);
    }

    #[test]
    fn timestamp_micros_range() {
        assert!(Timestamp::from_micros(0).is_ok());
        assert!(Timestamp::from_micros(i64::MAX).is_err());

        let bytes = serde_cbor::to_vec(&i64::MIN).unwrap();
        assert!(serde_cbor::from_slice::<Timestamp>(&bytes).is_err());
    }

    #[test]
    fn timestamp_parse_full_month_names() {
        let cases = vec![
            ("16 October 2026", utc(2026, 10, 16, 0, 0, 0)),
            ("October 16, 2026", utc(2026, 10, 16, 0, 0, 0)),
            ("October 16 2026", utc(2026, 10, 16, 0, 0, 0)),
            ("16 October 2026 12:30:00", utc(2026, 10, 16, 12, 30, 0)),
            ("October 16, 2026 12:30:00", utc(2026, 10, 16, 12, 30, 0)),
            ("May 1 2026 08:00:00.5", utc(2026, 5, 1, 8, 0, 0) + Duration::milliseconds(500)),
            ("1 Sep 2026", utc(2026, 9, 1, 0, 0, 0)),
        ];

        for (input, expected) in cases {
            assert_eq!(Timestamp::parse(input).unwrap(), expected, "input: {}", input);
        }
    }

    #[test]
    fn timestamp_arithmetic_saturates_at_calendar_edges() {
        let max = Timestamp::from(chrono::DateTime::<Utc>::MAX_UTC);
        let near_max = Timestamp::from_micros(8_210_266_876_799_999_999).unwrap();
        assert_eq!(near_max + Duration::days(365_000), max);
        assert_eq!(max + Duration::days(365_000), max);
        assert_eq!(max - Duration::days(-365_000), max);
        assert!(max.checked_add(Duration::days(365_000)).is_none());

        let min = Timestamp::from(chrono::DateTime::<Utc>::MIN_UTC);
        assert_eq!(min - Duration::days(365_000), min);
        assert_eq!(min + Duration::days(-365_000), min);
        assert!(min.checked_sub(Duration::days(365_000)).is_none());

        let ts = utc(2026, 10, 16, 12, 30, 0);
        assert_eq!(ts + Duration::hours(1), utc(2026, 10, 16, 13, 30, 0));
        assert_eq!(ts.checked_sub(Duration::days(1)), Some(utc(2026, 10, 15, 12, 30, 0)));
    }

    #[test]
    fn timestamp_now_is_sampled_per_call() {
        let a = Timestamp::now();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = Timestamp::now();
        assert!(a < b);
    }
}
