//! One-call pipeline: project, merge and index a portfolio.

use chrono::NaiveDate;

use crate::calendar::CalendarIndex;
use crate::market_calendar::MarketCalendar;
use crate::merge::{merge, records_to_events};
use crate::models::{PayoutEvent, Portfolio};
use crate::projections::{PayoutProjector, ProjectionSettings};

/// Merged events plus their day/month index
#[derive(Debug, Clone, PartialEq)]
pub struct CalendarView {
    pub events: Vec<PayoutEvent>,
    pub index: CalendarIndex,
}

pub struct PayoutEngine {
    calendar: MarketCalendar,
    settings: ProjectionSettings,
}

impl PayoutEngine {
    pub fn new(calendar: MarketCalendar, settings: ProjectionSettings) -> Self {
        PayoutEngine { calendar, settings }
    }

    pub fn calendar(&self) -> &MarketCalendar {
        &self.calendar
    }

    /// Auto events of a portfolio: projections plus received dividends
    pub fn auto_events(&self, portfolio: &Portfolio, today: NaiveDate) -> Vec<PayoutEvent> {
        let projector = PayoutProjector::new(self.calendar, self.settings, today);
        let mut events = projector.project_portfolio(portfolio.sorted_holdings());
        events.extend(records_to_events(&portfolio.records));
        events
    }

    /// Run the whole pipeline. The result is rebuilt from scratch on every call.
    pub fn build(
        &self,
        portfolio: &Portfolio,
        api_events: &[PayoutEvent],
        manual_events: &[PayoutEvent],
        today: NaiveDate,
    ) -> CalendarView {
        let auto_events = self.auto_events(portfolio, today);
        let events = merge(&auto_events, api_events, manual_events);
        let index = CalendarIndex::build(&events);

        log::debug!(
            "Calendar built: {} auto, {} api, {} manual -> {} events",
            auto_events.len(),
            api_events.len(),
            manual_events.len(),
            events.len()
        );

        CalendarView { events, index }
    }
}

impl Default for PayoutEngine {
    fn default() -> Self {
        PayoutEngine::new(MarketCalendar::nyse(), ProjectionSettings::default())
    }
}
