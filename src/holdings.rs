use anyhow::{anyhow, bail, Context, Result};
use colored::*;
use csv::{Reader, Writer};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use tabled::{Table, Tabled};

use crate::models::{
    format_money, normalize_symbol, round_for_display, DividendHistoryEntry, Holding,
    PayoutFrequency,
};
use crate::persistence::PersistenceManager;

/// CSV record for holdings import/export
#[derive(Debug, Serialize, Deserialize)]
struct HoldingRecord {
    symbol: String,
    shares: String,
    price: String,
    dividend_yield: Option<String>,
    frequency: String,
    payment_day: Option<String>,
    /// Calendar months 1-12 separated by `;`
    payment_months: Option<String>,
}

/// Parse user-facing payment months ("3,6,9,12" or "3;6;9;12") into 0-indexed months
pub fn parse_payment_months(text: &str) -> Result<Vec<u32>> {
    text.split(|c: char| c == ',' || c == ';')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            let month: u32 = part
                .parse()
                .map_err(|_| anyhow!("Invalid payment month: {}", part))?;
            if !(1..=12).contains(&month) {
                bail!("Payment month {} is out of range (expected 1-12)", month);
            }
            Ok(month - 1)
        })
        .collect()
}

fn format_payment_months(months: &[u32]) -> String {
    months
        .iter()
        .map(|m| (m + 1).to_string())
        .collect::<Vec<_>>()
        .join(";")
}

fn optional_decimal(value: Option<String>, what: &str, symbol: &str) -> Result<Option<Decimal>> {
    match value {
        Some(v) if !v.trim().is_empty() => Decimal::from_str(v.trim())
            .map(Some)
            .map_err(|_| anyhow!("Invalid {} for {}: {}", what, symbol, v)),
        _ => Ok(None),
    }
}

impl HoldingRecord {
    fn into_holding(self) -> Result<Holding> {
        let shares = Decimal::from_str(self.shares.trim())
            .map_err(|_| anyhow!("Invalid shares value for {}: {}", self.symbol, self.shares))?;
        let price = Decimal::from_str(self.price.trim())
            .map_err(|_| anyhow!("Invalid price for {}: {}", self.symbol, self.price))?;
        let dividend_yield = optional_decimal(self.dividend_yield, "yield", &self.symbol)?;
        let frequency = PayoutFrequency::from_str(&self.frequency)?;

        let mut holding = Holding::new(self.symbol.clone(), shares, price, dividend_yield, frequency)?;

        if let Some(day) = self.payment_day.filter(|d| !d.trim().is_empty()) {
            let day: u32 = day
                .trim()
                .parse()
                .map_err(|_| anyhow!("Invalid payment day for {}: {}", self.symbol, day))?;
            holding = holding.with_payment_day(day)?;
        }

        if let Some(months) = self.payment_months.filter(|m| !m.trim().is_empty()) {
            holding = holding.with_payment_months(parse_payment_months(&months)?)?;
        }

        Ok(holding)
    }

    fn from_holding(holding: &Holding) -> Self {
        HoldingRecord {
            symbol: holding.symbol.clone(),
            shares: holding.shares.to_string(),
            price: holding.current_price.to_string(),
            dividend_yield: holding.dividend_yield.map(|y| y.to_string()),
            frequency: holding.frequency.name().to_lowercase(),
            payment_day: holding.typical_payment_day.map(|d| d.to_string()),
            payment_months: Some(format_payment_months(&holding.typical_payment_months))
                .filter(|m| !m.is_empty()),
        }
    }
}

/// Import holdings from a CSV file, keeping existing schedule data for updated symbols
pub fn import_holdings(manager: &PersistenceManager, file_path: &Path) -> Result<()> {
    println!("{}", "Importing holdings from CSV...".green().bold());

    if !file_path.exists() {
        bail!("File not found: {}", file_path.display());
    }

    let mut portfolio = manager.load()?;
    let mut reader = Reader::from_path(file_path)
        .with_context(|| format!("Failed to open CSV file: {:?}", file_path))?;
    let mut imported_count = 0;
    let mut updated_count = 0;

    for result in reader.deserialize() {
        let record: HoldingRecord = result?;
        let mut holding = record.into_holding()?;

        match portfolio.holdings.get(&holding.symbol) {
            Some(existing) => {
                holding.next_ex_date = existing.next_ex_date;
                holding.next_payment_date = existing.next_payment_date;
                holding.dividend_history = existing.dividend_history.clone();
                holding.five_year_growth_rate = existing.five_year_growth_rate;
                updated_count += 1;
                println!("  {} {}", "Updated".yellow(), holding.symbol.cyan());
            }
            None => {
                imported_count += 1;
                println!("  {} {}", "Imported".green(), holding.symbol.cyan());
            }
        }

        portfolio.add_holding(holding);
    }

    manager.save(&portfolio)?;

    println!();
    println!("{}", "Import completed successfully!".green().bold());
    println!(
        "  {} new holdings imported",
        imported_count.to_string().green()
    );
    println!(
        "  {} existing holdings updated",
        updated_count.to_string().yellow()
    );

    Ok(())
}

/// Add or replace a holding
pub fn add_holding(manager: &PersistenceManager, holding: Holding) -> Result<()> {
    let mut portfolio = manager.load()?;
    let is_update = portfolio.holdings.contains_key(&holding.symbol);

    let symbol = holding.symbol.clone();
    let shares = holding.shares;
    let frequency = holding.frequency;
    let dividend_yield = holding.dividend_yield;

    portfolio.add_holding(holding);
    manager.save(&portfolio)?;

    if is_update {
        println!("{} Updated holding for {}", "✓".green(), symbol.cyan());
    } else {
        println!("{} Added holding for {}", "✓".green(), symbol.cyan());
    }

    println!("  Shares: {}", shares.to_string().yellow());
    println!("  Frequency: {}", frequency.to_string().yellow());
    if let Some(y) = dividend_yield {
        println!("  Dividend Yield: {}%", y.to_string().yellow());
    }

    Ok(())
}

/// Remove a holding
pub fn remove_holding(manager: &PersistenceManager, symbol: &str) -> Result<()> {
    let mut portfolio = manager.load()?;
    let symbol_upper = normalize_symbol(symbol);

    if portfolio.remove_holding(&symbol_upper).is_some() {
        manager.save(&portfolio)?;
        println!(
            "{} Removed holding for {}",
            "✓".green(),
            symbol_upper.cyan()
        );
    } else {
        println!(
            "{} No holding found for {}",
            "⚠".yellow(),
            symbol_upper.cyan()
        );
    }

    Ok(())
}

/// Record a past dividend in a holding's history
pub fn add_history_entry(
    manager: &PersistenceManager,
    symbol: &str,
    entry: DividendHistoryEntry,
) -> Result<()> {
    if entry.payment_date < entry.ex_date {
        bail!("Pay date cannot be before ex-dividend date");
    }

    let mut portfolio = manager.load()?;
    let holding = portfolio
        .holding_mut(symbol)
        .ok_or_else(|| anyhow!("No holding found for {}. Add it with 'holdings add'", normalize_symbol(symbol)))?;

    let mut history = std::mem::take(&mut holding.dividend_history);
    history.push(entry.clone());
    *holding = holding.clone().with_history(history);
    let symbol_upper = holding.symbol.clone();

    manager.save(&portfolio)?;

    println!(
        "{} Recorded {} dividend of ${} paid {}",
        "✓".green(),
        symbol_upper.cyan(),
        entry.amount.to_string().yellow(),
        entry.payment_date
    );

    Ok(())
}

/// Table display structure for holdings
#[derive(Tabled)]
struct HoldingDisplay {
    #[tabled(rename = "Symbol")]
    symbol: String,
    #[tabled(rename = "Shares")]
    shares: String,
    #[tabled(rename = "Price")]
    price: String,
    #[tabled(rename = "Yield")]
    dividend_yield: String,
    #[tabled(rename = "Frequency")]
    frequency: String,
    #[tabled(rename = "Schedule")]
    schedule: String,
    #[tabled(rename = "Annual Income")]
    annual_income: String,
}

fn schedule_label(holding: &Holding) -> String {
    if let Some(day) = holding.typical_payment_day {
        return format!("day {}", day);
    }
    if !holding.typical_payment_months.is_empty() {
        return format!("months {}", format_payment_months(&holding.typical_payment_months));
    }
    "-".to_string()
}

/// List all holdings
pub fn list_holdings(manager: &PersistenceManager, sort_by: Option<&str>, desc: bool) -> Result<()> {
    let portfolio = manager.load()?;

    if portfolio.holdings.is_empty() {
        println!(
            "{}",
            "No holdings found. Use 'holdings add' to add some!".yellow()
        );
        return Ok(());
    }

    println!("{}", "Portfolio Holdings".green().bold());
    println!();

    let mut holdings = portfolio.sorted_holdings();

    match sort_by {
        Some("shares") => holdings.sort_by(|a, b| a.shares.cmp(&b.shares)),
        Some("yield") => holdings.sort_by(|a, b| a.dividend_yield.cmp(&b.dividend_yield)),
        Some("value") => holdings.sort_by(|a, b| a.market_value().cmp(&b.market_value())),
        Some("income") => holdings.sort_by(|a, b| a.annual_income().cmp(&b.annual_income())),
        _ => {} // already by symbol
    }

    if desc {
        holdings.reverse();
    }

    let display_holdings: Vec<HoldingDisplay> = holdings
        .iter()
        .map(|h| HoldingDisplay {
            symbol: h.symbol.clone(),
            shares: h.shares.to_string(),
            price: format_money(h.current_price),
            dividend_yield: h
                .dividend_yield
                .map(|y| format!("{:.2}%", round_for_display(y)))
                .unwrap_or_else(|| "N/A".to_string()),
            frequency: h.frequency.to_string(),
            schedule: schedule_label(h),
            annual_income: format_money(h.annual_income()),
        })
        .collect();

    let table = Table::new(display_holdings);
    println!("{}", table);

    Ok(())
}

/// Export holdings to CSV
pub fn export_holdings(manager: &PersistenceManager, output_path: &Path) -> Result<()> {
    let portfolio = manager.load()?;

    if portfolio.holdings.is_empty() {
        println!("{}", "No holdings to export.".yellow());
        return Ok(());
    }

    let mut writer = Writer::from_path(output_path)
        .with_context(|| format!("Failed to create CSV file: {:?}", output_path))?;

    for holding in portfolio.sorted_holdings() {
        writer.serialize(HoldingRecord::from_holding(holding))?;
    }

    writer.flush()?;

    println!(
        "{} Holdings exported to {}",
        "✓".green(),
        output_path.display().to_string().cyan()
    );
    println!(
        "  Exported {} holdings",
        portfolio.holdings.len().to_string().yellow()
    );

    Ok(())
}
