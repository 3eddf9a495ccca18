// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Date and time packed into the 4 words of a time sync block.
//!
//! | Word | Content                      |
//! |------|------------------------------|
//! | 0    | year - 2000                  |
//! | 1    | `(month << 8) \| day`        |
//! | 2    | `(hour << 8) \| minute`      |
//! | 3    | `second * 1000 + millisecond` |

use std::fmt;

use chrono::{Datelike as _, NaiveDate, NaiveDateTime, Timelike as _};

use crate::frame::Word;

/// Number of words occupied by a packed timestamp.
pub const TIME_SYNC_WORDS: usize = 4;

const BASE_YEAR: i32 = 2000;

const DISPLAY_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// A decoded time sync value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeSync {
    Valid(NaiveDateTime),
    /// The words do not form a calendar date and time.
    Invalid,
}

impl TimeSync {
    /// Decode packed words. Out of range values yield [`TimeSync::Invalid`].
    #[must_use]
    pub fn decode(words: [Word; TIME_SYNC_WORDS]) -> Self {
        let [year, month_day, hour_minute, millis] = words;
        let date = NaiveDate::from_ymd_opt(
            BASE_YEAR + i32::from(year),
            u32::from(month_day >> 8),
            u32::from(month_day & 0xFF),
        );
        date.and_then(|date| {
            date.and_hms_milli_opt(
                u32::from(hour_minute >> 8),
                u32::from(hour_minute & 0xFF),
                u32::from(millis / 1000),
                u32::from(millis % 1000),
            )
        })
        .map_or(Self::Invalid, Self::Valid)
    }

    #[must_use]
    pub const fn is_valid(&self) -> bool {
        matches!(self, Self::Valid(_))
    }
}

impl fmt::Display for TimeSync {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Valid(value) => write!(f, "{}", value.format(DISPLAY_FORMAT)),
            Self::Invalid => f.write_str("invalid"),
        }
    }
}

/// Pack `value` into time sync words.
///
/// Returns `None` for years before 2000 or beyond the 16 bit offset.
/// Leap seconds are truncated to `59.999`.
#[must_use]
pub fn encode(value: &NaiveDateTime) -> Option<[Word; TIME_SYNC_WORDS]> {
    let year = Word::try_from(value.year() - BASE_YEAR).ok()?;
    let millis = (value.nanosecond() / 1_000_000).min(999);
    // All calendar fields are known to fit.
    #[allow(clippy::cast_possible_truncation)]
    let word = |high: u32, low: u32| ((high << 8) | low) as Word;
    #[allow(clippy::cast_possible_truncation)]
    let millis = (value.second() * 1000 + millis) as Word;
    Some([
        year,
        word(value.month(), value.day()),
        word(value.hour(), value.minute()),
        millis,
    ])
}
