//! User-entered payout events.
//!
//! Manual events live in a [`PayoutStore`] and always override auto events at
//! the same `(symbol, day)` key when the calendar is merged.

use anyhow::Result;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::market_calendar::MarketCalendar;
use crate::models::{normalize_symbol, PayoutEvent, PayoutSource, PayoutType, Priority};

#[derive(Debug, Error)]
pub enum PayoutError {
    #[error("No manual payout at index {index} (have {len})")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("Deletion of manual payout {0} was not confirmed")]
    NotConfirmed(usize),
    #[error("Invalid payout: {0}")]
    Invalid(String),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Repository for manual payout events
pub trait PayoutStore {
    fn list(&self) -> Result<Vec<PayoutEvent>>;
    fn create(&mut self, event: PayoutEvent) -> Result<()>;
    /// Replace the event at `index`; callers check bounds first
    fn update(&mut self, index: usize, event: PayoutEvent) -> Result<()>;
    /// Remove and return the event at `index`; callers check bounds first
    fn delete(&mut self, index: usize) -> Result<PayoutEvent>;
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryPayoutStore {
    events: Vec<PayoutEvent>,
}

impl InMemoryPayoutStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PayoutStore for InMemoryPayoutStore {
    fn list(&self) -> Result<Vec<PayoutEvent>> {
        Ok(self.events.clone())
    }

    fn create(&mut self, event: PayoutEvent) -> Result<()> {
        self.events.push(event);
        Ok(())
    }

    fn update(&mut self, index: usize, event: PayoutEvent) -> Result<()> {
        match self.events.get_mut(index) {
            Some(slot) => {
                *slot = event;
                Ok(())
            }
            None => anyhow::bail!("index {} out of range", index),
        }
    }

    fn delete(&mut self, index: usize) -> Result<PayoutEvent> {
        if index >= self.events.len() {
            anyhow::bail!("index {} out of range", index);
        }
        Ok(self.events.remove(index))
    }
}

/// Fields the user supplies for a manual payout
#[derive(Debug, Clone)]
pub struct ManualPayoutDraft {
    pub symbol: String,
    pub amount: Decimal,
    pub date: NaiveDate,
    pub event_type: PayoutType,
    pub priority: Option<Priority>,
    pub notification_timing: Option<u32>,
}

impl ManualPayoutDraft {
    pub fn new(symbol: &str, amount: Decimal, date: NaiveDate, event_type: PayoutType) -> Self {
        ManualPayoutDraft {
            symbol: symbol.to_string(),
            amount,
            date,
            event_type,
            priority: None,
            notification_timing: None,
        }
    }
}

/// Create, edit and delete manual payouts over a store
pub struct ManualPayoutBook<S: PayoutStore> {
    store: S,
    calendar: MarketCalendar,
}

impl<S: PayoutStore> ManualPayoutBook<S> {
    pub fn new(store: S, calendar: MarketCalendar) -> Self {
        ManualPayoutBook { store, calendar }
    }

    pub fn list(&self) -> Result<Vec<PayoutEvent>, PayoutError> {
        Ok(self.store.list()?)
    }

    /// Append a manual payout, moving its date onto a trading day
    pub fn create(&mut self, draft: ManualPayoutDraft) -> Result<PayoutEvent, PayoutError> {
        let event = self.to_event(draft)?;
        self.store.create(event.clone())?;
        log::debug!("Created manual payout {} {}", event.symbol, event.iso_day());
        Ok(event)
    }

    /// Replace the payout at `index`
    pub fn edit(&mut self, index: usize, draft: ManualPayoutDraft) -> Result<PayoutEvent, PayoutError> {
        self.check_index(index)?;
        let event = self.to_event(draft)?;
        self.store.update(index, event.clone())?;
        Ok(event)
    }

    /// Remove the payout at `index` if `confirm` approves it.
    ///
    /// There is no undo; a refused confirmation leaves the store untouched.
    pub fn delete<F>(&mut self, index: usize, confirm: F) -> Result<PayoutEvent, PayoutError>
    where
        F: FnOnce(&PayoutEvent) -> bool,
    {
        let events = self.store.list()?;
        let target = events.get(index).ok_or(PayoutError::IndexOutOfRange {
            index,
            len: events.len(),
        })?;

        if !confirm(target) {
            return Err(PayoutError::NotConfirmed(index));
        }

        Ok(self.store.delete(index)?)
    }

    pub fn into_store(self) -> S {
        self.store
    }

    fn check_index(&self, index: usize) -> Result<(), PayoutError> {
        let len = self.store.list()?.len();
        if index >= len {
            return Err(PayoutError::IndexOutOfRange { index, len });
        }
        Ok(())
    }

    fn to_event(&self, draft: ManualPayoutDraft) -> Result<PayoutEvent, PayoutError> {
        let symbol = normalize_symbol(&draft.symbol);
        if symbol.is_empty() {
            return Err(PayoutError::Invalid("symbol cannot be empty".to_string()));
        }
        if draft.amount < Decimal::ZERO {
            return Err(PayoutError::Invalid("amount cannot be negative".to_string()));
        }

        Ok(PayoutEvent {
            symbol,
            amount: draft.amount,
            date: self.calendar.adjust_to_business_day(draft.date),
            event_type: draft.event_type,
            auto: false,
            growth: None,
            source: Some(PayoutSource::Manual),
            priority: draft.priority,
            notification_timing: draft.notification_timing,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn book() -> ManualPayoutBook<InMemoryPayoutStore> {
        ManualPayoutBook::new(InMemoryPayoutStore::new(), MarketCalendar::nyse())
    }

    #[test]
    fn test_create_adjusts_to_business_day() {
        let mut book = book();
        // Saturday before Independence Day 2020 (observed Friday the 3rd)
        let event = book
            .create(ManualPayoutDraft::new("aapl", dec!(0.25), date(2020, 7, 4), PayoutType::PaymentDate))
            .unwrap();

        assert_eq!(event.symbol, "AAPL");
        assert_eq!(event.date, date(2020, 7, 6));
        assert!(!event.auto);
        assert_eq!(event.source, Some(PayoutSource::Manual));
        assert_eq!(book.list().unwrap().len(), 1);
    }

    #[test]
    fn test_edit_replaces_in_place() {
        let mut book = book();
        book.create(ManualPayoutDraft::new("KO", dec!(0.46), date(2024, 4, 1), PayoutType::PaymentDate))
            .unwrap();
        book.create(ManualPayoutDraft::new("PEP", dec!(1.27), date(2024, 3, 29), PayoutType::PaymentDate))
            .unwrap();

        let mut draft = ManualPayoutDraft::new("KO", dec!(0.485), date(2024, 7, 1), PayoutType::PaymentDate);
        draft.priority = Some(Priority::High);
        book.edit(0, draft).unwrap();

        let events = book.list().unwrap();
        assert_eq!(events[0].amount, dec!(0.485));
        assert_eq!(events[0].priority, Some(Priority::High));
        assert_eq!(events[1].symbol, "PEP");

        let err = book
            .edit(5, ManualPayoutDraft::new("KO", dec!(1), date(2024, 7, 1), PayoutType::ExDate))
            .unwrap_err();
        assert!(matches!(err, PayoutError::IndexOutOfRange { index: 5, len: 2 }));
    }

    #[test]
    fn test_delete_requires_confirmation() {
        let mut book = book();
        book.create(ManualPayoutDraft::new("KO", dec!(0.46), date(2024, 4, 1), PayoutType::PaymentDate))
            .unwrap();

        let err = book.delete(0, |_| false).unwrap_err();
        assert!(matches!(err, PayoutError::NotConfirmed(0)));
        assert_eq!(book.list().unwrap().len(), 1);

        let removed = book.delete(0, |event| event.symbol == "KO").unwrap();
        assert_eq!(removed.amount, dec!(0.46));
        assert!(book.list().unwrap().is_empty());

        assert!(matches!(
            book.delete(0, |_| true),
            Err(PayoutError::IndexOutOfRange { index: 0, len: 0 })
        ));
    }

    #[test]
    fn test_invalid_drafts_rejected() {
        let mut book = book();
        let err = book
            .create(ManualPayoutDraft::new("  ", dec!(1), date(2024, 4, 1), PayoutType::ExDate))
            .unwrap_err();
        assert!(matches!(err, PayoutError::Invalid(_)));

        let err = book
            .create(ManualPayoutDraft::new("KO", dec!(-1), date(2024, 4, 1), PayoutType::ExDate))
            .unwrap_err();
        assert!(err.to_string().contains("amount cannot be negative"));
    }
}
