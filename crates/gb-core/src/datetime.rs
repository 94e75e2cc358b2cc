//! Legacy DAT timestamps.
//!
//! Dates are written in Japan Standard Time as
//! `YYYY/MM/DD(曜) HH:MM:SS.mmm`. Reading accepts the same shape with the
//! fractional group optional.

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, TimeZone, Timelike};

const JST_OFFSET_SECS: i32 = 9 * 60 * 60;

/// Short Japanese weekday names, Sunday first.
const WEEKDAYS_JA: [&str; 7] = ["日", "月", "火", "水", "木", "金", "土"];

/// The fixed `+09:00` zone every legacy timestamp is written in.
pub fn jst() -> FixedOffset {
    FixedOffset::east_opt(JST_OFFSET_SECS).expect("+09:00 is within the valid offset range")
}

/// Formats an instant the way it appears in the third DAT field.
pub fn format_dat_date<Tz: TimeZone>(at: &DateTime<Tz>) -> String {
    let local = at.with_timezone(&jst());
    let weekday = WEEKDAYS_JA[local.weekday().num_days_from_sunday() as usize];
    format!(
        "{:04}/{:02}/{:02}({}) {:02}:{:02}:{:02}.{:03}",
        local.year(),
        local.month(),
        local.day(),
        weekday,
        local.hour(),
        local.minute(),
        local.second(),
        // leap seconds report >= 1000
        local.timestamp_subsec_millis().min(999),
    )
}

/// `YYYYMMDD` of the JST calendar day containing `at`.
pub fn jst_day_stamp<Tz: TimeZone>(at: &DateTime<Tz>) -> String {
    at.with_timezone(&jst()).format("%Y%m%d").to_string()
}

/// Parses a legacy display date.
///
/// Grammar, anchored at the start after leading whitespace:
///
/// ```text
/// date    = 4DIGIT "/" 2DIGIT "/" 2DIGIT "(" weekday ")" *WSP time
/// weekday = 1*(any char except ")")
/// time    = 2DIGIT ":" 2DIGIT ":" 2DIGIT [ "." ] *3DIGIT
/// ```
///
/// Anything after the time is ignored. Returns `None` if the text does not
/// match or names an impossible calendar date.
pub fn parse_dat_date(raw: &str) -> Option<DateTime<FixedOffset>> {
    let mut s = Scanner::new(raw.trim_start());

    let year = s.digits(4)?;
    s.byte(b'/')?;
    let month = s.digits(2)?;
    s.byte(b'/')?;
    let day = s.digits(2)?;

    s.byte(b'(')?;
    // Multi-byte UTF-8 sequences never contain 0x29, so a byte scan is safe.
    if s.skip_until(b')') == 0 {
        return None;
    }
    s.byte(b')')?;
    s.skip_whitespace();

    let hour = s.digits(2)?;
    s.byte(b':')?;
    let minute = s.digits(2)?;
    s.byte(b':')?;
    let second = s.digits(2)?;

    let _ = s.byte(b'.');
    let millis = s.fraction_millis();

    NaiveDate::from_ymd_opt(year as i32, month, day)?
        .and_hms_milli_opt(hour, minute, second, millis)?
        .and_local_timezone(jst())
        .single()
}

struct Scanner<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Scanner<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            bytes: input.as_bytes(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn byte(&mut self, expected: u8) -> Option<()> {
        if self.peek()? == expected {
            self.pos += 1;
            Some(())
        } else {
            None
        }
    }

    /// Exactly `count` ASCII digits.
    fn digits(&mut self, count: usize) -> Option<u32> {
        let mut value = 0u32;
        for _ in 0..count {
            let b = self.peek().filter(u8::is_ascii_digit)?;
            value = value * 10 + u32::from(b - b'0');
            self.pos += 1;
        }
        Some(value)
    }

    /// Up to three digits read as a decimal fraction of a second.
    fn fraction_millis(&mut self) -> u32 {
        let mut millis = 0u32;
        let mut read = 0;
        while read < 3 {
            match self.peek().filter(u8::is_ascii_digit) {
                Some(b) => {
                    millis = millis * 10 + u32::from(b - b'0');
                    self.pos += 1;
                    read += 1;
                }
                None => break,
            }
        }
        // ".5" is 500ms, not 5ms
        millis * 10u32.pow(3 - read)
    }

    fn skip_until(&mut self, stop: u8) -> usize {
        let start = self.pos;
        while self.peek().is_some_and(|b| b != stop) {
            self.pos += 1;
        }
        self.pos - start
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(|b| b.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }
}
