//! Dividend payout projection and calendar engine.
//!
//! Holdings are projected forward onto NYSE trading days ([`projections`]),
//! merged with received dividends, external announcements and user-entered
//! payouts ([`merge`], [`payouts`]) and indexed by day and month
//! ([`calendar`]). [`engine::PayoutEngine`] runs the whole pipeline.

pub mod api;
pub mod calendar;
pub mod config;
pub mod engine;
pub mod holdings;
pub mod ics;
pub mod market_calendar;
pub mod merge;
pub mod models;
pub mod payouts;
pub mod persistence;
pub mod projections;

pub use calendar::{CalendarIndex, DaySummary, EventFilter, MonthSummary};
pub use engine::{CalendarView, PayoutEngine};
pub use market_calendar::MarketCalendar;
pub use models::{
    DividendHistoryEntry, DividendRecord, ExternalDividendRecord, Holding, PayoutEvent,
    PayoutFrequency, PayoutSource, PayoutType, Portfolio, Priority,
};
pub use projections::{PayoutProjector, ProjectionSettings};
