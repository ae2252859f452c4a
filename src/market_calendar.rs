//! US exchange trading calendar.
//!
//! Dates are exchange-local (`America/New_York`). Weekends are Saturday and
//! Sunday; holidays follow the NYSE observance rules and are computed per
//! year, so no year silently falls back to "no holidays".
//!
//! Observance:
//! - A fixed-date holiday on Saturday is observed the Friday before, on
//!   Sunday the Monday after.
//! - New Year's Day on a Saturday is not observed at all (the exchange stays
//!   open on December 31).

use anyhow::{bail, Result};
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use chrono_tz::Tz;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::{Mutex, OnceLock};

/// Timezone the exchange calendar is evaluated in.
pub const EXCHANGE_TZ: Tz = chrono_tz::America::New_York;

/// Years for which the observance rules have been checked against
/// published exchange calendars.
pub const FIRST_SUPPORTED_YEAR: i32 = 1990;
pub const LAST_SUPPORTED_YEAR: i32 = 2200;

/// Unscheduled full-day closures that no rule can derive.
const SPECIAL_CLOSURES: &[(i32, u32, u32, &str)] = &[
    (1994, 4, 27, "National Day of Mourning (Nixon)"),
    (2001, 9, 11, "September 11 attacks"),
    (2001, 9, 12, "September 11 attacks"),
    (2001, 9, 13, "September 11 attacks"),
    (2001, 9, 14, "September 11 attacks"),
    (2004, 6, 11, "National Day of Mourning (Reagan)"),
    (2007, 1, 2, "National Day of Mourning (Ford)"),
    (2012, 10, 29, "Hurricane Sandy"),
    (2012, 10, 30, "Hurricane Sandy"),
    (2018, 12, 5, "National Day of Mourning (G. H. W. Bush)"),
    (2025, 1, 9, "National Day of Mourning (Carter)"),
];

/// A non-trading day with its name
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Holiday {
    pub date: NaiveDate,
    pub name: &'static str,
}

/// Whether holiday results for a year can be relied on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HolidayCoverage {
    Covered,
    Unsupported,
}

/// Business-day resolver for a single exchange.
#[derive(Debug, Clone, Copy)]
pub struct MarketCalendar {
    tz: Tz,
}

impl Default for MarketCalendar {
    fn default() -> Self {
        Self::nyse()
    }
}

impl MarketCalendar {
    /// NYSE / NASDAQ calendar in US Eastern time
    pub fn nyse() -> Self {
        MarketCalendar { tz: EXCHANGE_TZ }
    }

    /// Exchange-local calendar date of a UTC instant
    pub fn exchange_date(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.tz).date_naive()
    }

    /// Today's date on the exchange
    pub fn today(&self) -> NaiveDate {
        self.exchange_date(Utc::now())
    }

    /// UTC instant of exchange-local midnight starting `date`
    pub fn exchange_start_of_day(&self, date: NaiveDate) -> DateTime<Utc> {
        let local = date.and_time(NaiveTime::MIN);
        self.tz
            .from_local_datetime(&local)
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
            // Midnight is never inside a US DST gap
            .unwrap_or_else(|| Utc.from_utc_datetime(&local))
    }

    pub fn is_weekend(&self, date: NaiveDate) -> bool {
        matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
    }

    pub fn is_market_holiday(&self, date: NaiveDate) -> bool {
        // Observed holidays and closures are always weekdays
        if self.is_weekend(date) {
            return false;
        }
        let year = date.year();
        if self.holiday_coverage(year) == HolidayCoverage::Unsupported && first_warning_for(year) {
            log::warn!(
                "Holiday rules are not verified for {}; dates in that year may be misclassified",
                year
            );
        }
        self.holidays_in_year(year)
            .iter()
            .any(|holiday| holiday.date == date)
    }

    pub fn is_business_day(&self, date: NaiveDate) -> bool {
        !self.is_weekend(date) && !self.is_market_holiday(date)
    }

    /// First business day strictly after `date`
    pub fn next_business_day(&self, date: NaiveDate) -> NaiveDate {
        let mut next = date + Duration::days(1);
        while !self.is_business_day(next) {
            next = next + Duration::days(1);
        }
        next
    }

    /// Last business day strictly before `date`
    pub fn previous_business_day(&self, date: NaiveDate) -> NaiveDate {
        let mut previous = date - Duration::days(1);
        while !self.is_business_day(previous) {
            previous = previous - Duration::days(1);
        }
        previous
    }

    /// `date` itself when it is a business day, otherwise the next one
    pub fn adjust_to_business_day(&self, date: NaiveDate) -> NaiveDate {
        if self.is_business_day(date) {
            date
        } else {
            self.next_business_day(date)
        }
    }

    pub fn holiday_coverage(&self, year: i32) -> HolidayCoverage {
        if (FIRST_SUPPORTED_YEAR..=LAST_SUPPORTED_YEAR).contains(&year) {
            HolidayCoverage::Covered
        } else {
            HolidayCoverage::Unsupported
        }
    }

    /// Fail when business-day results for `year` cannot be guaranteed
    pub fn check_year(&self, year: i32) -> Result<()> {
        if self.holiday_coverage(year) == HolidayCoverage::Unsupported {
            bail!(
                "Market holidays are only known for {}-{}, got {}",
                FIRST_SUPPORTED_YEAR,
                LAST_SUPPORTED_YEAR,
                year
            );
        }
        Ok(())
    }

    /// Observed holidays and special closures in `year`, in date order
    pub fn holidays_in_year(&self, year: i32) -> Vec<Holiday> {
        let mut holidays = Vec::with_capacity(12);
        let mut push = |date: Option<NaiveDate>, name: &'static str| {
            if let Some(date) = date {
                holidays.push(Holiday { date, name });
            }
        };

        push(new_years_day(year), "New Year's Day");
        if year >= 1998 {
            push(
                NaiveDate::from_weekday_of_month_opt(year, 1, Weekday::Mon, 3),
                "Martin Luther King Jr. Day",
            );
        }
        push(
            NaiveDate::from_weekday_of_month_opt(year, 2, Weekday::Mon, 3),
            "Washington's Birthday",
        );
        push(
            easter_sunday(year).map(|easter| easter - Duration::days(2)),
            "Good Friday",
        );
        push(last_weekday_of_month(year, 5, Weekday::Mon), "Memorial Day");
        if year >= 2022 {
            push(observed(year, 6, 19), "Juneteenth");
        }
        push(observed(year, 7, 4), "Independence Day");
        push(
            NaiveDate::from_weekday_of_month_opt(year, 9, Weekday::Mon, 1),
            "Labor Day",
        );
        push(
            NaiveDate::from_weekday_of_month_opt(year, 11, Weekday::Thu, 4),
            "Thanksgiving Day",
        );
        push(observed(year, 12, 25), "Christmas Day");

        for &(y, m, d, name) in SPECIAL_CLOSURES.iter().filter(|c| c.0 == year) {
            push(NaiveDate::from_ymd_opt(y, m, d), name);
        }

        holidays.sort_by_key(|h| h.date);
        holidays
    }
}

/// True the first time an unsupported `year` is reported in this process
fn first_warning_for(year: i32) -> bool {
    static WARNED: OnceLock<Mutex<BTreeSet<i32>>> = OnceLock::new();
    match WARNED.get_or_init(|| Mutex::new(BTreeSet::new())).lock() {
        Ok(mut warned) => warned.insert(year),
        Err(_) => false,
    }
}

/// New Year's Day: Sunday moves to Monday, Saturday is not observed.
fn new_years_day(year: i32) -> Option<NaiveDate> {
    let date = NaiveDate::from_ymd_opt(year, 1, 1)?;
    match date.weekday() {
        Weekday::Sat => None,
        Weekday::Sun => Some(date + Duration::days(1)),
        _ => Some(date),
    }
}

/// Fixed-date holiday shifted off the weekend
fn observed(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    Some(match date.weekday() {
        Weekday::Sat => date - Duration::days(1),
        Weekday::Sun => date + Duration::days(1),
        _ => date,
    })
}

fn last_weekday_of_month(year: i32, month: u32, weekday: Weekday) -> Option<NaiveDate> {
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    let mut date = NaiveDate::from_ymd_opt(next_year, next_month, 1)?.pred_opt()?;
    while date.weekday() != weekday {
        date = date.pred_opt()?;
    }
    Some(date)
}

/// Gregorian Easter Sunday (anonymous Gregorian algorithm)
fn easter_sunday(year: i32) -> Option<NaiveDate> {
    let a = year % 19;
    let b = year / 100;
    let c = year % 100;
    let d = b / 4;
    let e = b % 4;
    let f = (b + 8) / 25;
    let g = (b - f + 1) / 3;
    let h = (19 * a + b - d - g + 15) % 30;
    let i = c / 4;
    let k = c % 4;
    let l = (32 + 2 * e + 2 * i - h - k) % 7;
    let m = (a + 11 * h + 22 * l) / 451;
    let month = (h + l - 7 * m + 114) / 31;
    let day = (h + l - 7 * m + 114) % 31 + 1;
    NaiveDate::from_ymd_opt(year, month as u32, day as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn holiday_dates(year: i32) -> Vec<NaiveDate> {
        MarketCalendar::nyse()
            .holidays_in_year(year)
            .into_iter()
            .map(|h| h.date)
            .collect()
    }

    #[test]
    fn test_published_2024_holidays() {
        assert_eq!(
            holiday_dates(2024),
            vec![
                date(2024, 1, 1),
                date(2024, 1, 15),
                date(2024, 2, 19),
                date(2024, 3, 29),
                date(2024, 5, 27),
                date(2024, 6, 19),
                date(2024, 7, 4),
                date(2024, 9, 2),
                date(2024, 11, 28),
                date(2024, 12, 25),
            ]
        );
    }

    #[test]
    fn test_published_2023_holidays() {
        assert_eq!(
            holiday_dates(2023),
            vec![
                date(2023, 1, 2),
                date(2023, 1, 16),
                date(2023, 2, 20),
                date(2023, 4, 7),
                date(2023, 5, 29),
                date(2023, 6, 19),
                date(2023, 7, 4),
                date(2023, 9, 4),
                date(2023, 11, 23),
                date(2023, 12, 25),
            ]
        );
    }

    #[test]
    fn test_published_2025_holidays() {
        assert_eq!(
            holiday_dates(2025),
            vec![
                date(2025, 1, 1),
                date(2025, 1, 9),
                date(2025, 1, 20),
                date(2025, 2, 17),
                date(2025, 4, 18),
                date(2025, 5, 26),
                date(2025, 6, 19),
                date(2025, 7, 4),
                date(2025, 9, 1),
                date(2025, 11, 27),
                date(2025, 12, 25),
            ]
        );
    }

    #[test]
    fn test_published_2026_holidays() {
        assert_eq!(
            holiday_dates(2026),
            vec![
                date(2026, 1, 1),
                date(2026, 1, 19),
                date(2026, 2, 16),
                date(2026, 4, 3),
                date(2026, 5, 25),
                date(2026, 6, 19),
                date(2026, 7, 3),
                date(2026, 9, 7),
                date(2026, 11, 26),
                date(2026, 12, 25),
            ]
        );
    }

    #[test]
    fn test_saturday_independence_day_observed_friday() {
        let calendar = MarketCalendar::nyse();
        assert!(calendar.is_market_holiday(date(2026, 7, 3)));
        assert!(!calendar.is_market_holiday(date(2026, 7, 6)));
    }

    #[test]
    fn test_saturday_juneteenth_observed_friday() {
        let calendar = MarketCalendar::nyse();
        // 2027-06-19 is a Saturday
        assert!(calendar.is_market_holiday(date(2027, 6, 18)));
        assert!(holiday_dates(2027).contains(&date(2027, 6, 18)));
        assert!(!holiday_dates(2027).contains(&date(2027, 6, 21)));
    }

    #[test]
    fn test_saturday_new_year_not_observed() {
        let calendar = MarketCalendar::nyse();
        // 2022-01-01 was a Saturday; the exchange traded on 2021-12-31
        assert!(calendar.is_business_day(date(2021, 12, 31)));
        assert!(!holiday_dates(2022).contains(&date(2021, 12, 31)));
        // Christmas 2021 fell on Saturday and was observed Friday
        assert!(calendar.is_market_holiday(date(2021, 12, 24)));
    }

    #[test]
    fn test_juneteenth_only_from_2022() {
        let calendar = MarketCalendar::nyse();
        assert!(!calendar.is_market_holiday(date(2021, 6, 18)));
        assert!(calendar.is_market_holiday(date(2022, 6, 20)));
    }

    #[test]
    fn test_easter() {
        assert_eq!(easter_sunday(2024), Some(date(2024, 3, 31)));
        assert_eq!(easter_sunday(2025), Some(date(2025, 4, 20)));
        assert_eq!(easter_sunday(2038), Some(date(2038, 4, 25)));
    }

    #[test]
    fn test_next_and_previous_business_day() {
        let calendar = MarketCalendar::nyse();
        // Wednesday before Independence Day
        assert_eq!(calendar.next_business_day(date(2024, 7, 3)), date(2024, 7, 5));
        // Friday before a weekend
        assert_eq!(calendar.next_business_day(date(2024, 3, 8)), date(2024, 3, 11));
        // Across New Year's Day and the weekend
        assert_eq!(
            calendar.previous_business_day(date(2024, 1, 2)),
            date(2023, 12, 29)
        );
    }

    #[test]
    fn test_adjust_to_business_day() {
        let calendar = MarketCalendar::nyse();
        assert_eq!(calendar.adjust_to_business_day(date(2024, 3, 15)), date(2024, 3, 15));
        assert_eq!(calendar.adjust_to_business_day(date(2024, 6, 1)), date(2024, 6, 3));
        // Good Friday then the weekend
        assert_eq!(calendar.adjust_to_business_day(date(2024, 3, 29)), date(2024, 4, 1));
    }

    #[test]
    fn test_adjust_is_closed_and_idempotent() {
        let calendar = MarketCalendar::nyse();
        let mut day = date(2020, 1, 1);
        while day <= date(2030, 12, 31) {
            let adjusted = calendar.adjust_to_business_day(day);
            assert!(!calendar.is_weekend(adjusted), "{} -> {}", day, adjusted);
            assert!(!calendar.is_market_holiday(adjusted), "{} -> {}", day, adjusted);
            assert_eq!(calendar.adjust_to_business_day(adjusted), adjusted);
            assert!(adjusted >= day);
            day = day + Duration::days(1);
        }
    }

    #[test]
    fn test_exchange_date_uses_eastern_time() {
        let calendar = MarketCalendar::nyse();
        // 03:30 UTC is still the previous evening in New York
        let instant = Utc.with_ymd_and_hms(2024, 3, 9, 3, 30, 0).unwrap();
        assert_eq!(calendar.exchange_date(instant), date(2024, 3, 8));
        // Saturday evening in New York is already Sunday in UTC
        let instant = Utc.with_ymd_and_hms(2024, 3, 10, 2, 0, 0).unwrap();
        assert_eq!(calendar.exchange_date(instant), date(2024, 3, 9));
        assert!(calendar.is_weekend(calendar.exchange_date(instant)));
    }

    #[test]
    fn test_exchange_start_of_day_follows_dst() {
        let calendar = MarketCalendar::nyse();
        assert_eq!(
            calendar.exchange_start_of_day(date(2024, 1, 15)),
            Utc.with_ymd_and_hms(2024, 1, 15, 5, 0, 0).unwrap()
        );
        assert_eq!(
            calendar.exchange_start_of_day(date(2024, 3, 15)),
            Utc.with_ymd_and_hms(2024, 3, 15, 4, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_coverage() {
        let calendar = MarketCalendar::nyse();
        assert_eq!(calendar.holiday_coverage(2024), HolidayCoverage::Covered);
        assert_eq!(calendar.holiday_coverage(1850), HolidayCoverage::Unsupported);
        assert!(calendar.check_year(2300).is_err());
        assert!(calendar.check_year(2030).is_ok());
    }

    #[test]
    fn test_unsupported_year_reported_once() {
        assert!(first_warning_for(1801));
        assert!(!first_warning_for(1801));
        assert!(!first_warning_for(1801));
        assert!(first_warning_for(1802));
    }

    #[test]
    fn test_weekend_is_never_a_holiday() {
        let calendar = MarketCalendar::nyse();
        // Independence Day 2026 itself falls on the Saturday
        assert!(!calendar.is_market_holiday(date(2026, 7, 4)));
        assert!(!calendar.is_business_day(date(2026, 7, 4)));
    }
}
