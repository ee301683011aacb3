//! Chat clock stamps.
//!
//! Chat timestamps keep the site's legacy `Mon-DD HH:MMAM/PM` shape
//! (e.g. `Jan-05 02:30PM`) on the wire and in the `chats.time` column.
//! The format carries no year or timezone, so it is only ever *compared*,
//! never used for history ordering (rowids order history). `last_modified`
//! stamps use a full sortable shape instead.

use time::{Duration, OffsetDateTime, macros::format_description};

/// Site-local wall clock (UTC+7, where the site owner lives).
fn site_now() -> OffsetDateTime {
    OffsetDateTime::now_utc() + Duration::hours(7)
}

/// Legacy chat stamp, e.g. `Jan-05 02:30PM`.
pub fn chat_stamp() -> String {
    let fmt = format_description!("[month repr:short]-[day] [hour repr:12]:[minute][period]");
    site_now().format(&fmt).unwrap_or_default()
}

/// Sortable stamp for `last_modified` columns; lexicographic order is
/// chronological order.
pub fn modified_stamp() -> String {
    let fmt =
        format_description!("[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:6]");
    site_now().format(&fmt).unwrap_or_default()
}

/// A parsed chat stamp. Year-less, minute granularity; ordering is
/// (month, day, minute-of-day), which is all the legacy format can offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Stamp {
    month: u8,
    day: u8,
    minute: u16,
}

const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

impl Stamp {
    /// Deterministic parse of `Mon-DD HH:MMAM/PM`. Anything malformed is
    /// `None`; callers treat unparsable stamps as "nothing to count".
    pub fn parse(s: &str) -> Option<Stamp> {
        let s = s.trim();
        if s.len() != 14 || !s.is_ascii() {
            return None;
        }
        let month = MONTHS.iter().position(|m| *m == &s[0..3])? as u8 + 1;
        if &s[3..4] != "-" || &s[6..7] != " " || &s[9..10] != ":" {
            return None;
        }
        let day: u8 = s[4..6].parse().ok()?;
        let hour: u16 = s[7..9].parse().ok()?;
        let min: u16 = s[10..12].parse().ok()?;
        if !(1..=31).contains(&day) || !(1..=12).contains(&hour) || min > 59 {
            return None;
        }
        let hour24 = match (&s[12..14], hour) {
            ("AM", 12) => 0,
            ("AM", h) => h,
            ("PM", 12) => 12,
            ("PM", h) => h + 12,
            _ => return None,
        };
        Some(Stamp { month, day, minute: hour24 * 60 + min })
    }
}

/// Strips the Unicode combining-diacritics block (U+0300..=U+0370), so
/// pasted zalgo text can't wreck the chat view. Pure, idempotent.
pub fn sanitize(msg: &str) -> String {
    msg.chars()
        .filter(|c| !('\u{300}'..='\u{370}').contains(c))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_the_legacy_shape() {
        let s = Stamp::parse("Jan-05 02:30PM").unwrap();
        assert_eq!(s, Stamp { month: 1, day: 5, minute: 14 * 60 + 30 });
        assert_eq!(Stamp::parse("Dec-31 12:00AM").unwrap().minute, 0);
        assert_eq!(Stamp::parse("Dec-31 12:00PM").unwrap().minute, 12 * 60);
    }

    #[test]
    fn rejects_garbage_deterministically() {
        for bad in ["", "Jan-05", "Foo-05 02:30PM", "Jan-05 02:30XM", "Jan-32 02:30PM", "Jan-05 13:30PM"] {
            assert_eq!(Stamp::parse(bad), None, "{bad:?}");
        }
    }

    #[test]
    fn stamps_order_chronologically() {
        let a = Stamp::parse("Jan-05 02:30PM").unwrap();
        let b = Stamp::parse("Jan-05 02:31PM").unwrap();
        let c = Stamp::parse("Feb-01 01:00AM").unwrap();
        assert!(a < b && b < c);
    }

    #[test]
    fn chat_stamp_round_trips() {
        assert!(Stamp::parse(&chat_stamp()).is_some());
    }

    #[test]
    fn sanitize_is_idempotent() {
        let zalgo = "h\u{0301}e\u{0352}llo\u{0365}";
        let once = sanitize(zalgo);
        assert_eq!(once, "hello");
        assert_eq!(sanitize(&once), once);
        assert_eq!(sanitize("plain ascii"), "plain ascii");
    }
}
