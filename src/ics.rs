//! iCalendar (RFC 5545) export of payout events.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use std::fs;
use std::path::Path;

use crate::market_calendar::MarketCalendar;
use crate::models::{format_money, PayoutEvent};

const ICS_TIMESTAMP: &str = "%Y%m%dT%H%M%SZ";
const CRLF: &str = "\r\n";
/// Content lines longer than this many octets are folded
const MAX_LINE_OCTETS: usize = 75;

/// Render events as a VCALENDAR document stamped with the current time
pub fn generate_ics(events: &[PayoutEvent], calendar: &MarketCalendar) -> String {
    generate_ics_at(events, calendar, Utc::now())
}

/// Render events as a VCALENDAR document with a fixed DTSTAMP
pub fn generate_ics_at(
    events: &[PayoutEvent],
    calendar: &MarketCalendar,
    stamp: DateTime<Utc>,
) -> String {
    let stamp_text = stamp.format(ICS_TIMESTAMP).to_string();
    let mut lines: Vec<String> = vec![
        "BEGIN:VCALENDAR".to_string(),
        "VERSION:2.0".to_string(),
        format!("PRODID:-//Divly//Dividend Calendar {}//EN", env!("CARGO_PKG_VERSION")),
        "CALSCALE:GREGORIAN".to_string(),
        "METHOD:PUBLISH".to_string(),
    ];

    for (index, event) in events.iter().enumerate() {
        let start = calendar.exchange_start_of_day(event.date);
        let end = start + Duration::hours(1);
        let start_text = start.format(ICS_TIMESTAMP).to_string();

        let mut description = format!("Amount: {}", format_money(event.amount));
        if let Some(source) = event.source {
            description.push_str(&format!("\nSource: {}", source.name()));
        }
        if let Some(growth) = event.growth {
            description.push_str(&format!("\nGrowth: {}%", growth));
        }

        lines.push("BEGIN:VEVENT".to_string());
        // Must not depend on the export time
        lines.push(format!(
            "UID:divly-{}-{}-{}@divly",
            event.symbol, start_text, index
        ));
        lines.push(format!("DTSTAMP:{}", stamp_text));
        lines.push(format!("DTSTART:{}", start_text));
        lines.push(format!("DTEND:{}", end.format(ICS_TIMESTAMP)));
        lines.push(format!(
            "SUMMARY:{}",
            escape_text(&format!("{} {}", event.symbol, event.event_type.label()))
        ));
        lines.push(format!("DESCRIPTION:{}", escape_text(&description)));
        lines.push("END:VEVENT".to_string());
    }

    lines.push("END:VCALENDAR".to_string());

    let mut out = String::new();
    for line in &lines {
        out.push_str(&fold_line(line));
        out.push_str(CRLF);
    }
    out
}

/// Write an `.ics` file for the events
pub fn export_ics(events: &[PayoutEvent], calendar: &MarketCalendar, path: &Path) -> Result<()> {
    fs::write(path, generate_ics(events, calendar))
        .with_context(|| format!("Failed to write calendar file: {:?}", path))
}

/// Escape a TEXT value
fn escape_text(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            ';' => escaped.push_str("\\;"),
            ',' => escaped.push_str("\\,"),
            '\n' => escaped.push_str("\\n"),
            '\r' => {}
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Fold a content line at 75 octets without splitting UTF-8 characters
fn fold_line(line: &str) -> String {
    if line.len() <= MAX_LINE_OCTETS {
        return line.to_string();
    }

    let mut folded = String::with_capacity(line.len() + line.len() / MAX_LINE_OCTETS * 3);
    let mut current = 0usize;
    // Continuation lines start with a space, which counts toward the limit
    let mut limit = MAX_LINE_OCTETS;
    for c in line.chars() {
        if current + c.len_utf8() > limit {
            folded.push_str(CRLF);
            folded.push(' ');
            current = 0;
            limit = MAX_LINE_OCTETS - 1;
        }
        folded.push(c);
        current += c.len_utf8();
    }
    folded
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PayoutSource, PayoutType};
    use chrono::{NaiveDate, TimeZone};
    use rust_decimal_macros::dec;

    fn stamp() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap()
    }

    fn event() -> PayoutEvent {
        PayoutEvent::generated(
            "AAPL",
            dec!(0.24),
            NaiveDate::from_ymd_opt(2024, 3, 15).unwrap(),
            PayoutType::PaymentDate,
            PayoutSource::Projected,
        )
    }

    #[test]
    fn test_single_event_shape() {
        let ics = generate_ics_at(&[event()], &MarketCalendar::nyse(), stamp());

        assert!(ics.starts_with("BEGIN:VCALENDAR\r\n"));
        assert!(ics.ends_with("END:VCALENDAR\r\n"));
        assert_eq!(ics.matches("BEGIN:VEVENT").count(), 1);
        // 2024-03-15 is after the DST switch: EDT, UTC-4
        assert!(ics.contains("DTSTART:20240315T040000Z\r\n"));
        assert!(ics.contains("DTEND:20240315T050000Z\r\n"));
        assert!(ics.contains("DTSTAMP:20240301T123000Z\r\n"));
        assert!(ics.contains("UID:divly-AAPL-20240315T040000Z-0@divly\r\n"));
        assert!(ics.contains("SUMMARY:AAPL Payment\r\n"));
        assert!(ics.contains("DESCRIPTION:Amount: $0.24\\nSource: projected\r\n"));
        assert!(!ics.replace("\r\n", "").contains('\n'));
    }

    #[test]
    fn test_winter_start_is_five_hours_behind() {
        let mut winter = event();
        winter.date = NaiveDate::from_ymd_opt(2024, 1, 16).unwrap();
        winter.event_type = PayoutType::ExDate;

        let ics = generate_ics_at(&[winter], &MarketCalendar::nyse(), stamp());
        assert!(ics.contains("DTSTART:20240116T050000Z"));
        assert!(ics.contains("SUMMARY:AAPL Ex-Date"));
    }

    #[test]
    fn test_uid_is_stable_across_exports() {
        let calendar = MarketCalendar::nyse();
        let uids = |ics: &str| -> Vec<String> {
            ics.split("\r\n")
                .filter(|line| line.starts_with("UID:"))
                .map(str::to_string)
                .collect()
        };

        let first = generate_ics_at(&[event()], &calendar, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        let second = generate_ics_at(&[event()], &calendar, Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap());

        assert_ne!(first, second);
        assert_eq!(uids(&first), uids(&second));
        assert_eq!(uids(&first), vec!["UID:divly-AAPL-20240315T040000Z-0@divly"]);
    }

    #[test]
    fn test_description_amount_is_rounded() {
        let mut monthly = event();
        monthly.amount = dec!(0.2565);

        let ics = generate_ics_at(&[monthly], &MarketCalendar::nyse(), stamp());
        assert!(ics.contains("DESCRIPTION:Amount: $0.26\\nSource: projected\r\n"));
    }

    #[test]
    fn test_empty_calendar() {
        let ics = generate_ics_at(&[], &MarketCalendar::nyse(), stamp());
        assert!(!ics.contains("VEVENT"));
        assert!(ics.contains("VERSION:2.0"));
    }

    #[test]
    fn test_escape_text() {
        assert_eq!(escape_text("a,b;c\\d\ne"), "a\\,b\\;c\\\\d\\ne");
    }

    #[test]
    fn test_fold_long_lines() {
        let line = format!("DESCRIPTION:{}", "x".repeat(200));
        let folded = fold_line(&line);
        for part in folded.split("\r\n") {
            assert!(part.len() <= MAX_LINE_OCTETS);
        }
        assert_eq!(folded.replace("\r\n ", ""), line);
    }
}
