//! Date-indexed view over merged payout events.
//!
//! [`CalendarIndex`] is rebuilt from scratch for every event list. All range
//! queries, including month aggregation, are inclusive on both ends: an event
//! dated on the first or last day of a month counts toward that month.

use chrono::{Datelike, Duration, NaiveDate};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::models::{normalize_symbol, PayoutEvent, PayoutType};

/// Everything happening on one calendar day
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DaySummary {
    pub date: NaiveDate,
    pub events: Vec<PayoutEvent>,
    pub total_amount: Decimal,
    pub has_ex_date: bool,
    pub has_payment: bool,
}

/// Totals for one calendar month
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthSummary {
    pub year: i32,
    /// 0-indexed month (0 = January)
    pub month0: u32,
    pub total_amount: Decimal,
    pub event_count: usize,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CalendarIndex {
    days: BTreeMap<NaiveDate, DaySummary>,
    months: BTreeMap<(i32, u32), MonthSummary>,
}

impl CalendarIndex {
    /// Group events by day and month
    pub fn build(events: &[PayoutEvent]) -> Self {
        let mut days: BTreeMap<NaiveDate, DaySummary> = BTreeMap::new();
        let mut months: BTreeMap<(i32, u32), MonthSummary> = BTreeMap::new();

        for event in events {
            let day = days.entry(event.date).or_insert_with(|| DaySummary {
                date: event.date,
                events: Vec::new(),
                total_amount: Decimal::ZERO,
                has_ex_date: false,
                has_payment: false,
            });
            day.total_amount += event.amount;
            match event.event_type {
                PayoutType::ExDate => day.has_ex_date = true,
                PayoutType::PaymentDate => day.has_payment = true,
            }
            day.events.push(event.clone());

            let key = (event.date.year(), event.date.month0());
            let month = months.entry(key).or_insert_with(|| MonthSummary {
                year: key.0,
                month0: key.1,
                total_amount: Decimal::ZERO,
                event_count: 0,
            });
            month.total_amount += event.amount;
            month.event_count += 1;
        }

        CalendarIndex { days, months }
    }

    /// Summary of a single day
    pub fn day(&self, date: NaiveDate) -> Option<&DaySummary> {
        self.days.get(&date)
    }

    /// Summary of a day given as `YYYY-MM-DD`
    pub fn day_by_iso(&self, iso_day: &str) -> Option<&DaySummary> {
        let date = NaiveDate::parse_from_str(iso_day, "%Y-%m-%d").ok()?;
        self.day(date)
    }

    /// Days that have at least one event, in date order
    pub fn days(&self) -> impl Iterator<Item = &DaySummary> {
        self.days.values()
    }

    /// Months that have at least one event, in date order
    pub fn months(&self) -> impl Iterator<Item = &MonthSummary> {
        self.months.values()
    }

    /// Events dated within `start..=end`, ascending by date
    pub fn events_in_range(&self, start: NaiveDate, end: NaiveDate) -> Vec<&PayoutEvent> {
        if start > end {
            return Vec::new();
        }
        self.days
            .range(start..=end)
            .flat_map(|(_, day)| day.events.iter())
            .collect()
    }

    /// Events in the next `days` days, today included
    pub fn upcoming(&self, today: NaiveDate, days: i64) -> Vec<&PayoutEvent> {
        let end = Duration::try_days(days.max(0))
            .and_then(|span| today.checked_add_signed(span))
            .unwrap_or(NaiveDate::MAX);
        self.events_in_range(today, end)
    }

    pub fn month(&self, year: i32, month0: u32) -> Option<&MonthSummary> {
        self.months.get(&(year, month0))
    }

    /// Sum of event amounts in a month (`month0` is 0-indexed)
    pub fn month_total(&self, year: i32, month0: u32) -> Decimal {
        self.month(year, month0)
            .map(|m| m.total_amount)
            .unwrap_or(Decimal::ZERO)
    }

    /// Number of events in a month (`month0` is 0-indexed)
    pub fn month_count(&self, year: i32, month0: u32) -> usize {
        self.month(year, month0).map_or(0, |m| m.event_count)
    }

    pub fn year_total(&self, year: i32) -> Decimal {
        self.months
            .range((year, 0)..=(year, 11))
            .map(|(_, m)| m.total_amount)
            .sum()
    }

    pub fn total_amount(&self) -> Decimal {
        self.months.values().map(|m| m.total_amount).sum()
    }

    /// Total number of indexed events
    pub fn len(&self) -> usize {
        self.days.values().map(|d| d.events.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }
}

/// Presentation-side filter over a merged event list
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub symbol: Option<String>,
    pub min_amount: Option<Decimal>,
    pub max_amount: Option<Decimal>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub event_type: Option<PayoutType>,
}

impl EventFilter {
    /// Whether an event passes every set criterion (bounds inclusive)
    pub fn matches(&self, event: &PayoutEvent) -> bool {
        if let Some(ref symbol) = self.symbol {
            if event.symbol != normalize_symbol(symbol) {
                return false;
            }
        }
        if self.min_amount.map_or(false, |min| event.amount < min) {
            return false;
        }
        if self.max_amount.map_or(false, |max| event.amount > max) {
            return false;
        }
        if self.from.map_or(false, |from| event.date < from) {
            return false;
        }
        if self.to.map_or(false, |to| event.date > to) {
            return false;
        }
        if self.event_type.map_or(false, |kind| event.event_type != kind) {
            return false;
        }
        true
    }

    pub fn apply(&self, events: &[PayoutEvent]) -> Vec<PayoutEvent> {
        events.iter().filter(|e| self.matches(e)).cloned().collect()
    }
}
