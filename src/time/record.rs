use std::fmt;

use chrono::{Datelike, Timelike};

/// Bytes in a time reply
pub const TIME_RECORD_LEN: usize = 6;

/// Broken-down local time as sent to the host
///
/// Each field is one byte taken straight from the calendar computation, with
/// the month made 1-based and the year counted from 2000. Values that do not
/// fit a byte are truncated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRecord {
    pub day: u8,
    pub month: u8,
    pub year: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl TimeRecord {
    #[cfg(unix)]
    pub(crate) fn from_tm(tm: &libc::tm) -> Self {
        TimeRecord {
            day: tm.tm_mday as u8,
            month: (tm.tm_mon + 1) as u8,
            year: (tm.tm_year - 100) as u8,
            hour: tm.tm_hour as u8,
            minute: tm.tm_min as u8,
            second: tm.tm_sec as u8,
        }
    }

    pub fn from_datetime<T: Datelike + Timelike>(dt: &T) -> Self {
        TimeRecord {
            day: dt.day() as u8,
            month: dt.month() as u8,
            year: (dt.year() - 2000) as u8,
            hour: dt.hour() as u8,
            minute: dt.minute() as u8,
            second: dt.second() as u8,
        }
    }

    /// Wire order: day, month, year, hour, minute, second
    pub fn to_bytes(&self) -> [u8; TIME_RECORD_LEN] {
        [self.day, self.month, self.year, self.hour, self.minute, self.second]
    }
}

impl fmt::Display for TimeRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}/{:02}/{:02} {:02}:{:02}:{:02}",
            self.year, self.month, self.day, self.hour, self.minute, self.second
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_from_datetime() {
        let dt = Utc.with_ymd_and_hms(2024, 3, 15, 12, 34, 56).unwrap();
        let record = TimeRecord::from_datetime(&dt);
        assert_eq!(record.to_bytes(), [15, 3, 24, 12, 34, 56]);
        assert_eq!(record.to_string(), "24/03/15 12:34:56");
    }

    #[test]
    fn test_january_is_month_one() {
        let dt = Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(TimeRecord::from_datetime(&dt).to_bytes(), [1, 1, 0, 0, 0, 0]);
    }
}
