use anyhow::{bail, Result};
use chrono::{Datelike, Duration, Months, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::market_calendar::MarketCalendar;
use crate::models::{Holding, PayoutEvent, PayoutFrequency, PayoutSource, PayoutType};

/// Day of month used when a holding only publishes its payment months
const SCHEDULED_MONTH_PAYMENT_DAY: u32 = 15;

/// Largest accepted gap between ex-date and payment date
pub const MAX_EX_DATE_OFFSET_DAYS: i64 = 31;
/// Largest accepted horizon, fifty years of monthly payments
pub const MAX_HORIZON_CYCLES: u32 = 600;

/// Tuning knobs for forward projection
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectionSettings {
    /// Number of future payment cycles to project per holding
    pub horizon_cycles: u32,
    /// Calendar days between the ex-date and the payment date
    pub ex_date_offset_days: i64,
}

impl Default for ProjectionSettings {
    fn default() -> Self {
        ProjectionSettings {
            horizon_cycles: 12,
            ex_date_offset_days: 2,
        }
    }
}

impl ProjectionSettings {
    /// Reject settings the projector cannot honour
    pub fn validate(&self) -> Result<()> {
        if !(0..=MAX_EX_DATE_OFFSET_DAYS).contains(&self.ex_date_offset_days) {
            bail!(
                "projection.ex_date_offset_days must be between 0 and {}, got {}",
                MAX_EX_DATE_OFFSET_DAYS,
                self.ex_date_offset_days
            );
        }
        if self.horizon_cycles > MAX_HORIZON_CYCLES {
            bail!(
                "projection.horizon_cycles must be at most {}, got {}",
                MAX_HORIZON_CYCLES,
                self.horizon_cycles
            );
        }
        Ok(())
    }
}

/// Projects future ex-date/payment-date events for holdings
pub struct PayoutProjector {
    calendar: MarketCalendar,
    settings: ProjectionSettings,
    /// Projection start when a holding has no announced payment date
    today: NaiveDate,
}

impl PayoutProjector {
    pub fn new(calendar: MarketCalendar, settings: ProjectionSettings, today: NaiveDate) -> Self {
        PayoutProjector {
            calendar,
            settings,
            today,
        }
    }

    /// Project every holding of a portfolio
    pub fn project_portfolio<'a, I>(&self, holdings: I) -> Vec<PayoutEvent>
    where
        I: IntoIterator<Item = &'a Holding>,
    {
        holdings
            .into_iter()
            .flat_map(|holding| self.project(holding))
            .collect()
    }

    /// Generate the auto events for one holding.
    ///
    /// Replays dividend history and the announced next dividend, then walks
    /// `horizon_cycles` payment dates forward. Holdings without a dividend
    /// yield produce nothing.
    pub fn project(&self, holding: &Holding) -> Vec<PayoutEvent> {
        let dividend_yield = match holding.dividend_yield {
            Some(y) if y > Decimal::ZERO => y,
            _ => {
                log::debug!("{}: no dividend yield, skipping projection", holding.symbol);
                return Vec::new();
            }
        };

        let horizon = self.settings.horizon_cycles.min(MAX_HORIZON_CYCLES);
        let mut events =
            Vec::with_capacity(2 * (holding.dividend_history.len() + 1 + horizon as usize));

        for entry in &holding.dividend_history {
            push_pair(
                &mut events,
                holding,
                entry.ex_date,
                entry.payment_date,
                entry.amount,
                entry.growth,
                PayoutSource::History,
            );
        }

        let cycle_amount = holding
            .latest_dividend_amount()
            .unwrap_or_else(|| yield_cycle_amount(holding, dividend_yield));

        if let (Some(ex_date), Some(payment_date)) = (holding.next_ex_date, holding.next_payment_date)
        {
            push_pair(
                &mut events,
                holding,
                ex_date,
                payment_date,
                cycle_amount,
                holding.five_year_growth_rate,
                PayoutSource::Projected,
            );
        }

        let mut current = holding.next_payment_date.unwrap_or(self.today);
        for cycle in 0..horizon {
            let Some(candidate) = next_payment_candidate(holding, current) else {
                log::warn!(
                    "{}: projection stopped after {} cycles, date out of range",
                    holding.symbol,
                    cycle
                );
                break;
            };
            let payment_date = self.calendar.adjust_to_business_day(candidate);
            let Some(ex_candidate) = Duration::try_days(self.settings.ex_date_offset_days)
                .and_then(|offset| payment_date.checked_sub_signed(offset))
            else {
                log::warn!(
                    "{}: ex-date offset of {} days is out of range, projection stopped",
                    holding.symbol,
                    self.settings.ex_date_offset_days
                );
                break;
            };
            let ex_date = self.calendar.adjust_to_business_day(ex_candidate);

            push_pair(
                &mut events,
                holding,
                ex_date,
                payment_date,
                cycle_amount,
                holding.five_year_growth_rate,
                PayoutSource::Projected,
            );
            current = payment_date;
        }

        log::debug!(
            "{}: projected {} events ({} from history)",
            holding.symbol,
            events.len(),
            2 * holding.dividend_history.len()
        );
        events
    }
}

fn push_pair(
    events: &mut Vec<PayoutEvent>,
    holding: &Holding,
    ex_date: NaiveDate,
    payment_date: NaiveDate,
    amount: Decimal,
    growth: Option<Decimal>,
    source: PayoutSource,
) {
    events.push(
        PayoutEvent::generated(&holding.symbol, amount, ex_date, PayoutType::ExDate, source)
            .with_growth(growth),
    );
    events.push(
        PayoutEvent::generated(
            &holding.symbol,
            amount,
            payment_date,
            PayoutType::PaymentDate,
            source,
        )
        .with_growth(growth),
    );
}

/// Yield-implied income of one payment cycle, rounded to 4 places
fn yield_cycle_amount(holding: &Holding, dividend_yield: Decimal) -> Decimal {
    let annual = holding.current_price * holding.shares * dividend_yield / Decimal::ONE_HUNDRED;
    (annual / Decimal::from(holding.frequency.payments_per_year())).round_dp(4)
}

/// Unadjusted payment date following `current`.
///
/// Monthly payers with a known payment day keep that day; holdings with
/// known payment months pay on the 15th of the next listed month; everything
/// else steps by the frequency.
fn next_payment_candidate(holding: &Holding, current: NaiveDate) -> Option<NaiveDate> {
    if let (PayoutFrequency::Monthly, Some(day)) = (holding.frequency, holding.typical_payment_day)
    {
        let next_month = first_of_month(current)?.checked_add_months(Months::new(1))?;
        let day = day.min(days_in_month(next_month)?);
        return next_month.with_day(day);
    }

    if !holding.typical_payment_months.is_empty() {
        let current_month = current.month0();
        let (year, month0) = match holding
            .typical_payment_months
            .iter()
            .copied()
            .filter(|m| *m > current_month)
            .min()
        {
            Some(month0) => (current.year(), month0),
            None => {
                let first = holding.typical_payment_months.iter().copied().min()?;
                (current.year() + 1, first)
            }
        };
        return NaiveDate::from_ymd_opt(year, month0 + 1, SCHEDULED_MONTH_PAYMENT_DAY);
    }

    current.checked_add_months(Months::new(holding.frequency.months()))
}

fn first_of_month(date: NaiveDate) -> Option<NaiveDate> {
    date.with_day(1)
}

fn days_in_month(first: NaiveDate) -> Option<u32> {
    let next = first.checked_add_months(Months::new(1))?;
    Some(next.pred_opt()?.day())
}
