//! goblin-board/crates/gb-core/src/lib.rs
//!
//! The central domain logic and interface definitions for Goblin-Board:
//! the DAT codec, range queries, the Shift-JIS bridge and the thread
//! lifecycle on top of the persistence port.

pub mod board;
pub mod dat;
pub mod datetime;
pub mod encoding;
pub mod error;
pub mod form;
pub mod lifecycle;
pub mod models;
pub mod range;
pub mod traits;
pub mod validation;

// Re-exporting for easier access in other crates
pub use error::*;
pub use models::*;
pub use traits::*;

pub use board::{BoardConfig, BoardLimits, BoardRegistry};
pub use lifecycle::ThreadLifecycle;
pub use range::RangeQuery;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn op_line_round_trip_through_shift_jis() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let fields = PostFields {
            name: "名無し".to_string(),
            mail: String::new(),
            date: datetime::format_dat_date(&at),
            uid: "abcd1234".to_string(),
            be: None,
            body: "hello\nworld".to_string(),
        };
        let line = dat::encode(&fields, Some("test"));

        let wire = encoding::encode_outbound(&line);
        let parsed = dat::decode(&encoding::decode_shift_jis(&wire));

        assert_eq!(parsed.subject, "test");
        assert_eq!(parsed.records[0].body_text(), "hello\nworld");
        assert_eq!(parsed.records[0].date, Some(at.with_timezone(&datetime::jst())));
    }
}
