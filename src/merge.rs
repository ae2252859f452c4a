use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::HashSet;

use crate::models::{
    DividendRecord, ExternalDividendRecord, PayoutEvent, PayoutSource, PayoutType,
};

/// Combine the three payout sources into one collection.
///
/// Result order: auto events (exact duplicates collapsed, and any whose
/// `(symbol, day)` has a manual entry removed), then manual events, then
/// external events. External events are appended as-is; they are never
/// de-duplicated against the other two sources.
pub fn merge(
    auto_events: &[PayoutEvent],
    api_events: &[PayoutEvent],
    manual_events: &[PayoutEvent],
) -> Vec<PayoutEvent> {
    let manual_keys: HashSet<(&str, NaiveDate)> =
        manual_events.iter().map(PayoutEvent::merge_key).collect();

    let mut seen: HashSet<(&str, NaiveDate, PayoutType, Decimal)> = HashSet::new();
    let mut suppressed = 0usize;
    let mut merged = Vec::with_capacity(auto_events.len() + manual_events.len() + api_events.len());

    for event in auto_events {
        let exact = (
            event.symbol.as_str(),
            event.date,
            event.event_type,
            event.amount.normalize(),
        );
        if !seen.insert(exact) {
            continue;
        }
        if manual_keys.contains(&event.merge_key()) {
            suppressed += 1;
            continue;
        }
        merged.push(event.clone());
    }

    if suppressed > 0 {
        log::debug!("{} auto events replaced by manual entries", suppressed);
    }

    merged.extend(manual_events.iter().cloned());
    merged.extend(api_events.iter().cloned());
    merged
}

/// Received dividends become payment-date auto events
pub fn records_to_events(records: &[DividendRecord]) -> Vec<PayoutEvent> {
    records
        .iter()
        .map(|record| {
            PayoutEvent::generated(
                &record.symbol,
                record.amount,
                record.date,
                PayoutType::PaymentDate,
                PayoutSource::History,
            )
        })
        .collect()
}

/// External announcements become an ex-date event plus, when known, a
/// payment-date event
pub fn external_to_events(records: &[ExternalDividendRecord]) -> Vec<PayoutEvent> {
    let mut events = Vec::with_capacity(records.len() * 2);
    for record in records {
        events.push(PayoutEvent::generated(
            &record.symbol,
            record.amount,
            record.ex_date,
            PayoutType::ExDate,
            PayoutSource::Api,
        ));
        if let Some(payment_date) = record.payment_date {
            events.push(PayoutEvent::generated(
                &record.symbol,
                record.amount,
                payment_date,
                PayoutType::PaymentDate,
                PayoutSource::Api,
            ));
        }
    }
    events
}
