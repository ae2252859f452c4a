use anyhow::{bail, Result};
use chrono::NaiveDate;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

// Core data structures shared by the projector, merger and calendar index

/// Dividend payout cadence of a holding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PayoutFrequency {
    Monthly,
    Quarterly,
    SemiAnnual,
    Annual,
}

impl PayoutFrequency {
    /// Get expected number of payments per year
    pub fn payments_per_year(&self) -> u32 {
        match self {
            PayoutFrequency::Monthly => 12,
            PayoutFrequency::Quarterly => 4,
            PayoutFrequency::SemiAnnual => 2,
            PayoutFrequency::Annual => 1,
        }
    }

    /// Number of calendar months between two payments
    pub fn months(&self) -> u32 {
        12 / self.payments_per_year()
    }

    /// Get display name
    pub fn name(&self) -> &str {
        match self {
            PayoutFrequency::Monthly => "Monthly",
            PayoutFrequency::Quarterly => "Quarterly",
            PayoutFrequency::SemiAnnual => "Semi-Annual",
            PayoutFrequency::Annual => "Annual",
        }
    }
}

impl FromStr for PayoutFrequency {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "monthly" | "m" => Ok(PayoutFrequency::Monthly),
            "quarterly" | "q" => Ok(PayoutFrequency::Quarterly),
            "semi-annual" | "semiannual" | "semi_annual" | "s" => Ok(PayoutFrequency::SemiAnnual),
            "annual" | "yearly" | "a" => Ok(PayoutFrequency::Annual),
            other => bail!(
                "Invalid payout frequency: {}. Use monthly, quarterly, semi-annual or annual",
                other
            ),
        }
    }
}

impl fmt::Display for PayoutFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One past dividend of a holding, as reported by the portfolio provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DividendHistoryEntry {
    /// Ex-dividend date
    pub ex_date: NaiveDate,
    /// Payment date
    pub payment_date: NaiveDate,
    /// Dividend amount
    pub amount: Decimal,
    /// Growth versus the previous payment, in percent
    pub growth: Option<Decimal>,
}

/// Represents a dividend-paying position in the portfolio
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    /// Stock symbol (e.g., AAPL, MSFT)
    pub symbol: String,
    /// Number of shares currently owned
    pub shares: Decimal,
    /// Last known price per share
    pub current_price: Decimal,
    /// Current dividend yield percentage
    pub dividend_yield: Option<Decimal>,
    /// How often the holding pays
    pub frequency: PayoutFrequency,
    /// Usual day of month for monthly payers
    #[serde(default)]
    pub typical_payment_day: Option<u32>,
    /// Usual payment months, 0-indexed (0 = January)
    #[serde(default)]
    pub typical_payment_months: Vec<u32>,
    /// Announced next ex-dividend date
    #[serde(default)]
    pub next_ex_date: Option<NaiveDate>,
    /// Announced next payment date
    #[serde(default)]
    pub next_payment_date: Option<NaiveDate>,
    /// Past dividends, most recent first
    #[serde(default)]
    pub dividend_history: Vec<DividendHistoryEntry>,
    /// Five year average dividend growth rate, in percent
    #[serde(default)]
    pub five_year_growth_rate: Option<Decimal>,
}

impl Holding {
    /// Create a new holding record with validation
    pub fn new(
        symbol: String,
        shares: Decimal,
        current_price: Decimal,
        dividend_yield: Option<Decimal>,
        frequency: PayoutFrequency,
    ) -> Result<Self> {
        if symbol.trim().is_empty() {
            bail!("Symbol cannot be empty");
        }

        if shares < Decimal::ZERO {
            bail!("Shares cannot be negative");
        }

        if current_price < Decimal::ZERO {
            bail!("Price cannot be negative");
        }

        if let Some(yield_pct) = dividend_yield {
            if yield_pct < Decimal::ZERO {
                bail!("Dividend yield cannot be negative");
            }
        }

        Ok(Holding {
            symbol: normalize_symbol(&symbol),
            shares,
            current_price,
            dividend_yield,
            frequency,
            typical_payment_day: None,
            typical_payment_months: Vec::new(),
            next_ex_date: None,
            next_payment_date: None,
            dividend_history: Vec::new(),
            five_year_growth_rate: None,
        })
    }

    /// Set the usual day of month a monthly payer distributes on.
    ///
    /// Days past the 28th are kept but get clamped to the month length when
    /// projecting, so February payments land on the last day of the month.
    pub fn with_payment_day(mut self, day: u32) -> Result<Self> {
        if !(1..=31).contains(&day) {
            bail!("Payment day must be between 1 and 31");
        }
        if day > 28 {
            log::warn!(
                "{}: payment day {} is clamped to the month length in short months",
                self.symbol,
                day
            );
        }
        self.typical_payment_day = Some(day);
        Ok(self)
    }

    /// Set the usual payment months (0-indexed)
    pub fn with_payment_months(mut self, months: Vec<u32>) -> Result<Self> {
        if let Some(bad) = months.iter().find(|m| **m > 11) {
            bail!("Payment month {} is out of range (expected 0-11)", bad);
        }
        let mut months = months;
        months.sort_unstable();
        months.dedup();
        self.typical_payment_months = months;
        Ok(self)
    }

    /// Set the announced next ex-dividend and payment dates
    pub fn with_next_dates(mut self, ex_date: NaiveDate, payment_date: NaiveDate) -> Result<Self> {
        if payment_date < ex_date {
            bail!("Pay date cannot be before ex-dividend date");
        }
        self.next_ex_date = Some(ex_date);
        self.next_payment_date = Some(payment_date);
        Ok(self)
    }

    /// Attach dividend history; entries are stored most recent first
    pub fn with_history(mut self, mut history: Vec<DividendHistoryEntry>) -> Self {
        history.sort_by(|a, b| b.payment_date.cmp(&a.payment_date));
        self.dividend_history = history;
        self
    }

    pub fn with_growth_rate(mut self, growth: Decimal) -> Self {
        self.five_year_growth_rate = Some(growth);
        self
    }

    /// Re-check the constructor and builder rules, for holdings read from disk
    pub fn validate(&self) -> Result<()> {
        if self.symbol.trim().is_empty() {
            bail!("Symbol cannot be empty");
        }
        if self.shares < Decimal::ZERO || self.current_price < Decimal::ZERO {
            bail!("{}: shares and price cannot be negative", self.symbol);
        }
        if self.dividend_yield.is_some_and(|y| y < Decimal::ZERO) {
            bail!("{}: dividend yield cannot be negative", self.symbol);
        }
        if let Some(day) = self.typical_payment_day {
            if !(1..=31).contains(&day) {
                bail!("{}: payment day {} is not between 1 and 31", self.symbol, day);
            }
        }
        if let Some(bad) = self.typical_payment_months.iter().find(|m| **m > 11) {
            bail!("{}: payment month {} is out of range (expected 0-11)", self.symbol, bad);
        }
        if let (Some(ex_date), Some(payment_date)) = (self.next_ex_date, self.next_payment_date) {
            if payment_date < ex_date {
                bail!("{}: pay date cannot be before ex-dividend date", self.symbol);
            }
        }
        Ok(())
    }

    /// Amount of the most recent historical dividend, if any
    pub fn latest_dividend_amount(&self) -> Option<Decimal> {
        self.dividend_history.first().map(|entry| entry.amount)
    }

    /// Market value of the position
    pub fn market_value(&self) -> Decimal {
        self.current_price * self.shares
    }

    /// Yield-implied yearly dividend income of the position
    pub fn annual_income(&self) -> Decimal {
        self.dividend_yield
            .map(|y| self.market_value() * y / Decimal::ONE_HUNDRED)
            .unwrap_or(Decimal::ZERO)
    }
}

/// A dividend actually received, as recorded by the portfolio provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DividendRecord {
    pub symbol: String,
    pub amount: Decimal,
    pub date: NaiveDate,
}

impl DividendRecord {
    /// Create a new dividend record with validation
    pub fn new(symbol: String, amount: Decimal, date: NaiveDate) -> Result<Self> {
        if symbol.trim().is_empty() {
            bail!("Symbol cannot be empty");
        }

        if amount <= Decimal::ZERO {
            bail!("Amount must be positive");
        }

        Ok(DividendRecord {
            symbol: normalize_symbol(&symbol),
            amount,
            date,
        })
    }
}

/// A dividend announcement returned by an external stock-data source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalDividendRecord {
    pub symbol: String,
    pub amount: Decimal,
    pub ex_date: NaiveDate,
    /// Some feeds publish the ex-date before the payment date is known
    pub payment_date: Option<NaiveDate>,
}

/// Which side of a dividend an event marks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PayoutType {
    #[serde(rename = "ex-date")]
    ExDate,
    #[serde(rename = "payment-date")]
    PaymentDate,
}

impl PayoutType {
    /// Short label used in calendar summaries
    pub fn label(&self) -> &str {
        match self {
            PayoutType::ExDate => "Ex-Date",
            PayoutType::PaymentDate => "Payment",
        }
    }
}

impl FromStr for PayoutType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "ex" | "ex-date" | "exdate" | "ex_date" => Ok(PayoutType::ExDate),
            "pay" | "payment" | "payment-date" | "pay-date" | "pay_date" => {
                Ok(PayoutType::PaymentDate)
            }
            other => bail!("Invalid event type: {}. Use 'ex' or 'payment'", other),
        }
    }
}

/// Where a payout event came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayoutSource {
    /// Forward projection from frequency and yield
    Projected,
    /// Replayed dividend history or received dividend records
    History,
    /// External stock-data lookup
    Api,
    /// Entered or edited by the user
    Manual,
}

impl PayoutSource {
    pub fn name(&self) -> &str {
        match self {
            PayoutSource::Projected => "projected",
            PayoutSource::History => "history",
            PayoutSource::Api => "api",
            PayoutSource::Manual => "manual",
        }
    }
}

/// User-assigned importance of a manual payout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Normal,
    High,
}

impl FromStr for Priority {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "normal" => Ok(Priority::Normal),
            "high" => Ok(Priority::High),
            other => bail!("Invalid priority: {}. Use low, normal or high", other),
        }
    }
}

/// A single dated dividend event shown on the calendar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayoutEvent {
    pub symbol: String,
    pub amount: Decimal,
    pub date: NaiveDate,
    #[serde(rename = "type")]
    pub event_type: PayoutType,
    /// System generated (true) or user entered (false)
    pub auto: bool,
    #[serde(default)]
    pub growth: Option<Decimal>,
    #[serde(default)]
    pub source: Option<PayoutSource>,
    #[serde(default)]
    pub priority: Option<Priority>,
    /// Days before the event a reminder is wanted
    #[serde(default)]
    pub notification_timing: Option<u32>,
}

impl PayoutEvent {
    /// Create a system-generated event
    pub fn generated(
        symbol: &str,
        amount: Decimal,
        date: NaiveDate,
        event_type: PayoutType,
        source: PayoutSource,
    ) -> Self {
        PayoutEvent {
            symbol: normalize_symbol(symbol),
            amount,
            date,
            event_type,
            auto: true,
            growth: None,
            source: Some(source),
            priority: None,
            notification_timing: None,
        }
    }

    pub fn with_growth(mut self, growth: Option<Decimal>) -> Self {
        self.growth = growth;
        self
    }

    /// The (symbol, day) key manual events are matched on
    pub fn merge_key(&self) -> (&str, NaiveDate) {
        (&self.symbol, self.date)
    }

    /// Date formatted as YYYY-MM-DD
    pub fn iso_day(&self) -> String {
        self.date.format("%Y-%m-%d").to_string()
    }

    pub fn is_manual(&self) -> bool {
        !self.auto
    }
}

/// Portfolio data supplied to the engine: holdings plus received dividends
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Portfolio {
    /// Map of stock symbols to current holdings
    pub holdings: HashMap<String, Holding>,
    /// Dividends already received
    #[serde(default)]
    pub records: Vec<DividendRecord>,
}

impl Portfolio {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or update a holding
    pub fn add_holding(&mut self, holding: Holding) {
        self.holdings.insert(holding.symbol.clone(), holding);
    }

    pub fn remove_holding(&mut self, symbol: &str) -> Option<Holding> {
        self.holdings.remove(&normalize_symbol(symbol))
    }

    pub fn holding_mut(&mut self, symbol: &str) -> Option<&mut Holding> {
        self.holdings.get_mut(&normalize_symbol(symbol))
    }

    /// Add a received dividend record
    pub fn add_record(&mut self, record: DividendRecord) {
        self.records.push(record);
    }

    /// Get records for a specific symbol
    pub fn records_for_symbol(&self, symbol: &str) -> Vec<&DividendRecord> {
        let symbol = normalize_symbol(symbol);
        self.records.iter().filter(|r| r.symbol == symbol).collect()
    }

    /// Check whether a record for the same symbol and date already exists
    pub fn has_duplicate_record(&self, symbol: &str, date: NaiveDate) -> bool {
        let symbol = normalize_symbol(symbol);
        self.records
            .iter()
            .any(|r| r.symbol == symbol && r.date == date)
    }

    /// Holdings ordered by symbol
    pub fn sorted_holdings(&self) -> Vec<&Holding> {
        let mut holdings: Vec<&Holding> = self.holdings.values().collect();
        holdings.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        holdings
    }

    /// Symbols of all holdings, ordered
    pub fn symbols(&self) -> Vec<String> {
        self.sorted_holdings()
            .into_iter()
            .map(|h| h.symbol.clone())
            .collect()
    }
}

pub fn normalize_symbol(symbol: &str) -> String {
    symbol.trim().to_uppercase()
}

/// Round to two places, half away from zero
pub fn round_for_display(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Money as `$x.xx`
pub fn format_money(amount: Decimal) -> String {
    format!("${:.2}", round_for_display(amount))
}
