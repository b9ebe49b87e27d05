//! Time service payload

use chrono::{Datelike, NaiveDateTime, Timelike};

/// Packs a local date/time into the 6 bytes the watch expects:
/// years since 1900, month, day, hour, minute, second.
///
/// Each field is truncated to a byte, so years past 2155 wrap.
pub fn encode_time(time: &NaiveDateTime) -> [u8; 6] {
    [
        (time.year() - 1900) as u8,
        time.month() as u8,
        time.day() as u8,
        time.hour() as u8,
        time.minute() as u8,
        time.second() as u8,
    ]
}
