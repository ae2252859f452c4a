use anyhow::{anyhow, bail, Result};
use chrono::{Datelike, Duration, Months, NaiveDate, Weekday};
use clap::{Parser, Subcommand};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use rust_decimal::Decimal;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::str::FromStr;
use tabled::{Table, Tabled};

use divly::api::{AlphaVantageClient, FetchCoordinator, FetchOutcome};
use divly::calendar::{CalendarIndex, EventFilter};
use divly::config::{self, Config};
use divly::engine::PayoutEngine;
use divly::holdings;
use divly::ics;
use divly::market_calendar::{HolidayCoverage, MarketCalendar};
use divly::models::{
    format_money, normalize_symbol, DividendHistoryEntry, DividendRecord, Holding, PayoutEvent,
    PayoutFrequency, PayoutType, Priority,
};
use divly::payouts::{ManualPayoutBook, ManualPayoutDraft, PayoutError};
use divly::persistence::PersistenceManager;

/// Global CLI configuration passed to all command handlers
#[derive(Clone)]
pub struct CliConfig {
    pub data_dir: Option<String>,
    pub quiet: bool,
}

impl CliConfig {
    /// Create a PersistenceManager with the configured data directory
    pub fn create_persistence_manager(&self) -> Result<PersistenceManager> {
        if let Some(ref data_dir) = self.data_dir {
            Ok(PersistenceManager::with_custom_path(data_dir))
        } else {
            PersistenceManager::new()
        }
    }

    /// Print message respecting the quiet flag
    pub fn print(&self, message: &str) {
        if !self.quiet {
            println!("{}", message);
        }
    }

    /// Print success message (always shown unless quiet)
    pub fn print_success(&self, message: &str) {
        if !self.quiet {
            println!("{} {}", "✓".green(), message);
        }
    }

    /// Print a warning to stderr (always shown unless quiet)
    pub fn print_warning(&self, message: &str) {
        if !self.quiet {
            eprintln!("{} {}", "⚠".yellow(), message);
        }
    }
}

#[derive(Parser)]
#[command(name = "divly")]
#[command(about = "Project dividend payouts onto a trading-day calendar for your portfolio")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(long_about = "
divly projects upcoming ex-dividend and payment dates for your holdings,
moves them onto NYSE trading days, merges them with dividends you received
and payouts you entered by hand, and shows the result as a calendar.

Data is stored in JSON format with automatic backups.

EXAMPLES:
    # Add a quarterly payer that pays in March, June, September and December
    divly holdings add MSFT --shares 50 --price 420 --yield-pct 0.72 --frequency quarterly --payment-months 3,6,9,12

    # Show the next 60 days
    divly calendar --days 60

    # Show one month and export it to your calendar app
    divly calendar --month 2024-06 --export-ics june.ics

    # Override a projected payment with the announced one
    divly payouts add MSFT --amount 0.83 --date 2024-06-13 --type payment
")]
struct Cli {
    /// Custom data directory path (default: $DIVLY_DATA_DIR or ~/.divly)
    #[arg(long, global = true, help = "Specify custom data directory")]
    data_dir: Option<String>,

    /// Enable verbose output
    #[arg(short = 'v', long, global = true, help = "Show debug logging")]
    verbose: bool,

    /// Enable quiet mode (minimal output)
    #[arg(short = 'q', long, global = true, help = "Show minimal output")]
    quiet: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Record a dividend you received
    Add {
        /// Stock symbol (e.g., AAPL, MSFT)
        symbol: String,
        /// Total amount received
        #[arg(short, long)]
        amount: String,
        /// Payment date (YYYY-MM-DD, 'today', 'next friday', etc.)
        #[arg(short, long)]
        date: String,
        /// Force adding even if a record for the same symbol and date exists
        #[arg(long)]
        force: bool,
    },
    /// Manage stock holdings in your portfolio
    Holdings {
        #[command(subcommand)]
        command: HoldingsCommands,
    },
    /// Manage a holding's dividend history
    History {
        #[command(subcommand)]
        command: HistoryCommands,
    },
    /// Display the dividend calendar
    Calendar {
        /// Number of days to show from today (default from config)
        #[arg(long, short = 'd')]
        days: Option<i64>,
        /// Show a whole month instead (YYYY-MM)
        #[arg(long, conflicts_with = "days")]
        month: Option<String>,
        /// Only show this symbol
        #[arg(long, short = 's')]
        symbol: Option<String>,
        /// Minimum event amount
        #[arg(long)]
        min_amount: Option<String>,
        /// Maximum event amount
        #[arg(long)]
        max_amount: Option<String>,
        /// Only show one event type (ex, payment)
        #[arg(long = "type")]
        event_type: Option<String>,
        /// Fetch declared dividends from Alpha Vantage first
        #[arg(long)]
        fetch: bool,
        /// Export the shown events to an ICS file
        #[arg(long)]
        export_ics: Option<PathBuf>,
        /// Export the shown events to a CSV file
        #[arg(long)]
        export_csv: Option<PathBuf>,
        /// Pretend today is this date (YYYY-MM-DD)
        #[arg(long)]
        today: Option<String>,
    },
    /// Manage payouts entered by hand
    Payouts {
        #[command(subcommand)]
        command: PayoutCommands,
    },
    /// List NYSE market holidays
    Holidays {
        /// Year to list (defaults to the current year)
        #[arg(long, short = 'y')]
        year: Option<i32>,
    },
    /// Configure API settings
    Configure {
        /// Set Alpha Vantage API key
        #[arg(long)]
        api_key: Option<String>,
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Data management commands
    Data {
        #[command(subcommand)]
        command: DataCommands,
    },
}

#[derive(Subcommand)]
enum HoldingsCommands {
    /// Import holdings from CSV file
    Import {
        /// Path to CSV file with holdings data
        file: PathBuf,
    },
    /// Add or update a holding in your portfolio
    Add {
        /// Stock symbol (e.g., AAPL, MSFT)
        symbol: String,
        /// Number of shares owned
        #[arg(short, long)]
        shares: String,
        /// Current price per share
        #[arg(short, long)]
        price: String,
        /// Current dividend yield percentage
        #[arg(short = 'y', long)]
        yield_pct: Option<String>,
        /// Payout frequency (monthly, quarterly, semi-annual, annual)
        #[arg(short, long, default_value = "quarterly")]
        frequency: String,
        /// Usual payment day of month (monthly payers)
        #[arg(long)]
        payment_day: Option<u32>,
        /// Usual payment months, e.g. 3,6,9,12
        #[arg(long)]
        payment_months: Option<String>,
        /// Announced next ex-dividend date (YYYY-MM-DD)
        #[arg(long, requires = "next_pay_date")]
        next_ex_date: Option<String>,
        /// Announced next payment date (YYYY-MM-DD)
        #[arg(long, requires = "next_ex_date")]
        next_pay_date: Option<String>,
        /// Five year average dividend growth rate percentage
        #[arg(long)]
        growth: Option<String>,
    },
    /// Remove a holding from your portfolio
    Remove {
        /// Stock symbol to remove
        symbol: String,
    },
    /// List all holdings
    List {
        /// Sort holdings by field (symbol, shares, yield, value, income)
        #[arg(long)]
        sort_by: Option<String>,
        /// Show holdings in descending order
        #[arg(long)]
        desc: bool,
    },
    /// Export holdings to CSV file
    Export {
        /// Output file path
        #[arg(short, long, default_value = "holdings.csv")]
        output: PathBuf,
    },
}

#[derive(Subcommand)]
enum HistoryCommands {
    /// Add a past dividend to a holding's history
    Add {
        /// Stock symbol
        symbol: String,
        /// Ex-dividend date (YYYY-MM-DD)
        #[arg(long)]
        ex_date: String,
        /// Payment date (YYYY-MM-DD)
        #[arg(long)]
        pay_date: String,
        /// Dividend amount
        #[arg(short, long)]
        amount: String,
        /// Growth versus the previous payment, in percent
        #[arg(long)]
        growth: Option<String>,
    },
}

#[derive(Subcommand)]
enum PayoutCommands {
    /// List manual payouts
    List,
    /// Add a manual payout
    Add {
        #[command(flatten)]
        payout: PayoutArgs,
    },
    /// Replace the manual payout with the given number
    Edit {
        /// Payout number as shown by 'payouts list'
        number: usize,
        #[command(flatten)]
        payout: PayoutArgs,
    },
    /// Delete the manual payout with the given number
    Delete {
        /// Payout number as shown by 'payouts list'
        number: usize,
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
}

#[derive(clap::Args)]
struct PayoutArgs {
    /// Stock symbol
    symbol: String,
    /// Payout amount
    #[arg(short, long)]
    amount: String,
    /// Event date (YYYY-MM-DD, 'tomorrow', 'next friday', etc.)
    #[arg(short, long)]
    date: String,
    /// Event type (ex, payment)
    #[arg(short = 't', long = "type", default_value = "payment")]
    event_type: String,
    /// Priority (low, normal, high)
    #[arg(long)]
    priority: Option<String>,
    /// Days before the event to be reminded
    #[arg(long)]
    notify_days: Option<u32>,
}

#[derive(Subcommand)]
enum DataCommands {
    /// Show data statistics and backup information
    Stats,
    /// Backup current data
    Backup,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp(None)
        .init();

    let config = CliConfig {
        data_dir: cli.data_dir.clone(),
        quiet: cli.quiet,
    };

    log::debug!(
        "Data directory: {}",
        config.data_dir.as_deref().unwrap_or("$DIVLY_DATA_DIR or ~/.divly (default)")
    );

    match cli.command {
        Some(Commands::Add {
            symbol,
            amount,
            date,
            force,
        }) => {
            handle_add_command(&config, symbol, amount, date, force)?;
        }
        Some(Commands::Holdings { command }) => {
            handle_holdings_command(&config, command)?;
        }
        Some(Commands::History { command }) => {
            handle_history_command(&config, command)?;
        }
        Some(Commands::Calendar {
            days,
            month,
            symbol,
            min_amount,
            max_amount,
            event_type,
            fetch,
            export_ics,
            export_csv,
            today,
        }) => {
            let options = CalendarOptions {
                days,
                month,
                symbol,
                min_amount,
                max_amount,
                event_type,
                fetch,
                export_ics,
                export_csv,
                today,
            };
            handle_calendar_command(&config, options)?;
        }
        Some(Commands::Payouts { command }) => {
            handle_payouts_command(&config, command)?;
        }
        Some(Commands::Holidays { year }) => {
            handle_holidays_command(year)?;
        }
        Some(Commands::Configure { api_key, show }) => {
            handle_configure_command(api_key, show)?;
        }
        Some(Commands::Data { command }) => {
            handle_data_command(&config, command)?;
        }
        None => {
            println!("{}", "divly - dividend calendar".green().bold());
            println!("Use --help to see available commands");
        }
    }

    Ok(())
}

fn parse_decimal(value: &str, what: &str) -> Result<Decimal> {
    Decimal::from_str(value.trim())
        .map_err(|_| anyhow!("Invalid {}: {}. Use decimal format like 0.94", what, value))
}

fn parse_optional_decimal(value: Option<String>, what: &str) -> Result<Option<Decimal>> {
    value.map(|v| parse_decimal(&v, what)).transpose()
}

fn parse_iso_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| anyhow!("Invalid date: {}. Use YYYY-MM-DD", value))
}

/// Handle recording a received dividend
fn handle_add_command(
    config: &CliConfig,
    symbol: String,
    amount: String,
    date: String,
    force: bool,
) -> Result<()> {
    let calendar = MarketCalendar::nyse();
    let date = parse_dividend_date(&date, calendar.today())?;
    let amount = parse_decimal(&amount, "amount")?;

    let persistence = config.create_persistence_manager()?;
    let mut portfolio = persistence.load()?;

    if !force && portfolio.has_duplicate_record(&symbol, date) {
        config.print_warning(&format!(
            "A dividend for {} on {} is already recorded. Use {} to add it anyway.",
            normalize_symbol(&symbol).cyan(),
            date.format("%Y-%m-%d").to_string().blue(),
            "--force".yellow()
        ));
        bail!(
            "Duplicate dividend exists for {} on {}",
            normalize_symbol(&symbol),
            date
        );
    }

    if !portfolio.holdings.contains_key(&normalize_symbol(&symbol)) {
        config.print(&format!(
            "{} No holding found for {}. Consider adding it with 'holdings add'",
            "ℹ".blue(),
            normalize_symbol(&symbol).cyan()
        ));
    }

    let record = DividendRecord::new(symbol, amount, date)?;
    config.print_success(&format!(
        "Recorded {} from {} on {}",
        format_money(record.amount),
        record.symbol.cyan(),
        record.date.format("%Y-%m-%d").to_string().blue()
    ));

    portfolio.add_record(record);
    persistence.save(&portfolio)?;

    Ok(())
}

/// Handle holdings-related commands
fn handle_holdings_command(config: &CliConfig, command: HoldingsCommands) -> Result<()> {
    let persistence = config.create_persistence_manager()?;

    match command {
        HoldingsCommands::Import { file } => {
            holdings::import_holdings(&persistence, &file)?;
        }
        HoldingsCommands::Add {
            symbol,
            shares,
            price,
            yield_pct,
            frequency,
            payment_day,
            payment_months,
            next_ex_date,
            next_pay_date,
            growth,
        } => {
            let mut holding = Holding::new(
                symbol,
                parse_decimal(&shares, "shares amount")?,
                parse_decimal(&price, "price")?,
                parse_optional_decimal(yield_pct, "yield percentage")?,
                PayoutFrequency::from_str(&frequency)?,
            )?;

            if let Some(day) = payment_day {
                if holding.frequency != PayoutFrequency::Monthly {
                    config.print_warning("--payment-day only affects monthly payers");
                }
                holding = holding.with_payment_day(day)?;
            }
            if let Some(months) = payment_months {
                holding = holding.with_payment_months(holdings::parse_payment_months(&months)?)?;
            }
            if let (Some(ex), Some(pay)) = (next_ex_date, next_pay_date) {
                holding = holding.with_next_dates(parse_iso_date(&ex)?, parse_iso_date(&pay)?)?;
            }
            if let Some(growth) = parse_optional_decimal(growth, "growth rate")? {
                holding = holding.with_growth_rate(growth);
            }

            // Keep recorded history when updating an existing holding
            if let Some(existing) = persistence.load()?.holdings.get(&holding.symbol) {
                holding = holding.with_history(existing.dividend_history.clone());
            }

            holdings::add_holding(&persistence, holding)?;
        }
        HoldingsCommands::Remove { symbol } => {
            holdings::remove_holding(&persistence, &symbol)?;
        }
        HoldingsCommands::List { sort_by, desc } => {
            holdings::list_holdings(&persistence, sort_by.as_deref(), desc)?;
        }
        HoldingsCommands::Export { output } => {
            holdings::export_holdings(&persistence, &output)?;
        }
    }
    Ok(())
}

fn handle_history_command(config: &CliConfig, command: HistoryCommands) -> Result<()> {
    let persistence = config.create_persistence_manager()?;

    match command {
        HistoryCommands::Add {
            symbol,
            ex_date,
            pay_date,
            amount,
            growth,
        } => {
            let entry = DividendHistoryEntry {
                ex_date: parse_iso_date(&ex_date)?,
                payment_date: parse_iso_date(&pay_date)?,
                amount: parse_decimal(&amount, "amount")?,
                growth: parse_optional_decimal(growth, "growth")?,
            };
            holdings::add_history_entry(&persistence, &symbol, entry)?;
        }
    }
    Ok(())
}

struct CalendarOptions {
    days: Option<i64>,
    month: Option<String>,
    symbol: Option<String>,
    min_amount: Option<String>,
    max_amount: Option<String>,
    event_type: Option<String>,
    fetch: bool,
    export_ics: Option<PathBuf>,
    export_csv: Option<PathBuf>,
    today: Option<String>,
}

/// First and last day of a `YYYY-MM` month
fn parse_month(text: &str) -> Result<(NaiveDate, NaiveDate)> {
    let first = NaiveDate::parse_from_str(&format!("{}-01", text.trim()), "%Y-%m-%d")
        .map_err(|_| anyhow!("Invalid month: {}. Use YYYY-MM", text))?;
    let last = first
        .checked_add_months(Months::new(1))
        .and_then(|d| d.pred_opt())
        .ok_or_else(|| anyhow!("Month out of range: {}", text))?;
    Ok((first, last))
}

/// Handle the calendar command
fn handle_calendar_command(config: &CliConfig, options: CalendarOptions) -> Result<()> {
    let settings = Config::load()?;
    let calendar = MarketCalendar::nyse();
    let today = match options.today {
        Some(ref text) => parse_iso_date(text)?,
        None => calendar.today(),
    };

    let (from, to) = match options.month {
        Some(ref month) => parse_month(month)?,
        None => {
            let days = options.days.unwrap_or(settings.calendar.default_days);
            if days < 0 {
                bail!("--days cannot be negative");
            }
            let end = Duration::try_days(days)
                .and_then(|span| today.checked_add_signed(span))
                .ok_or_else(|| anyhow!("--days {} is out of range", days))?;
            (today, end)
        }
    };
    if calendar.check_year(to.year()).is_err() {
        config.print_warning(&format!(
            "Market holidays are not tracked for {}; dates may land on closures",
            to.year()
        ));
    }

    let persistence = config.create_persistence_manager()?;
    let portfolio = persistence.load()?;
    let manual_events = persistence.load_payouts()?;

    let api_events = if options.fetch {
        fetch_api_events(config, &settings, &portfolio.symbols())?
    } else {
        Vec::new()
    };

    let engine = PayoutEngine::new(calendar, settings.projection);
    let view = engine.build(&portfolio, &api_events, &manual_events, today);

    let filter = EventFilter {
        symbol: options.symbol,
        min_amount: parse_optional_decimal(options.min_amount, "minimum amount")?,
        max_amount: parse_optional_decimal(options.max_amount, "maximum amount")?,
        from: Some(from),
        to: Some(to),
        event_type: options
            .event_type
            .as_deref()
            .map(PayoutType::from_str)
            .transpose()?,
    };
    let events = filter.apply(&view.events);
    let shown = CalendarIndex::build(&events);

    if let Some(ref path) = options.export_ics {
        ics::export_ics(&events, &calendar, path)?;
        config.print_success(&format!(
            "Exported {} events to {}",
            events.len(),
            path.display().to_string().cyan()
        ));
    }
    if let Some(ref path) = options.export_csv {
        persistence.export_events_to_csv(&events, path)?;
        config.print_success(&format!(
            "Exported {} events to {}",
            events.len(),
            path.display().to_string().cyan()
        ));
    }

    if config.quiet || options.export_ics.is_some() || options.export_csv.is_some() {
        return Ok(());
    }

    show_calendar(&shown, from, to, today);
    Ok(())
}

/// Fetch declared dividends for every holding on a tokio runtime
fn fetch_api_events(config: &CliConfig, settings: &Config, symbols: &[String]) -> Result<Vec<PayoutEvent>> {
    if symbols.is_empty() {
        return Ok(Vec::new());
    }

    let client = AlphaVantageClient::from_config(settings)?;
    let coordinator = FetchCoordinator::new();
    let runtime = tokio::runtime::Runtime::new()?;

    let pb = ProgressBar::new(symbols.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("#>-"),
    );
    if config.quiet {
        pb.set_draw_target(indicatif::ProgressDrawTarget::hidden());
    }

    let token = coordinator.begin_batch();
    let outcome = runtime.block_on(coordinator.fetch_all(
        token,
        &client,
        symbols,
        None,
        None,
        |symbol| {
            pb.inc(1);
            pb.set_message(format!("Fetched {}", symbol));
        },
    ));
    pb.finish_and_clear();

    match outcome {
        FetchOutcome::Completed(report) => {
            if let Some(notice) = report.notice() {
                config.print_warning(&notice);
            }
            Ok(report.events())
        }
        FetchOutcome::Stale { generation } => {
            log::warn!("Fetch batch {} was superseded", generation);
            Ok(Vec::new())
        }
    }
}

#[derive(Tabled)]
struct MonthDisplay {
    #[tabled(rename = "Month")]
    month: String,
    #[tabled(rename = "Events")]
    events: usize,
    #[tabled(rename = "Total")]
    total: String,
}

fn show_calendar(index: &CalendarIndex, from: NaiveDate, to: NaiveDate, today: NaiveDate) {
    println!(
        "{} {} to {}",
        "📅 Dividend Calendar".green().bold(),
        from.format("%Y-%m-%d").to_string().blue(),
        to.format("%Y-%m-%d").to_string().blue()
    );
    println!();

    if index.is_empty() {
        println!("{}", "No dividend events in this period.".yellow());
        return;
    }

    for day in index.days() {
        let days_until = (day.date - today).num_days();
        let when = match days_until {
            0 => "TODAY".red().bold().to_string(),
            1 => "Tomorrow".yellow().to_string(),
            d if d > 1 => format!("In {} days", d).cyan().to_string(),
            _ => String::new(),
        };
        println!(
            "{} {} {} {}",
            day.date.format("%Y-%m-%d").to_string().blue(),
            day.date.format("%a"),
            format_money(day.total_amount),
            when
        );

        for event in &day.events {
            let origin = if event.is_manual() {
                "manual".magenta().to_string()
            } else {
                event
                    .source
                    .map(|s| s.name().to_string())
                    .unwrap_or_default()
                    .dimmed()
                    .to_string()
            };
            println!(
                "  {} {:<8} {} {}",
                event.symbol.green().bold(),
                event.event_type.label(),
                format_money(event.amount),
                origin
            );
        }
    }

    println!();
    let months: Vec<MonthDisplay> = index
        .months()
        .map(|m| MonthDisplay {
            month: format!("{}-{:02}", m.year, m.month0 + 1),
            events: m.event_count,
            total: format_money(m.total_amount),
        })
        .collect();
    println!("{}", Table::new(months));
    println!(
        "Showing {} event{} totalling {}",
        index.len().to_string().cyan(),
        if index.len() == 1 { "" } else { "s" },
        format_money(index.total_amount())
    );
}

#[derive(Tabled)]
struct PayoutDisplay {
    #[tabled(rename = "#")]
    number: usize,
    #[tabled(rename = "Date")]
    date: String,
    #[tabled(rename = "Symbol")]
    symbol: String,
    #[tabled(rename = "Type")]
    event_type: String,
    #[tabled(rename = "Amount")]
    amount: String,
    #[tabled(rename = "Priority")]
    priority: String,
}

fn payout_draft(args: PayoutArgs, today: NaiveDate) -> Result<ManualPayoutDraft> {
    let mut draft = ManualPayoutDraft::new(
        &args.symbol,
        parse_decimal(&args.amount, "amount")?,
        parse_dividend_date(&args.date, today)?,
        PayoutType::from_str(&args.event_type)?,
    );
    draft.priority = args.priority.as_deref().map(Priority::from_str).transpose()?;
    draft.notification_timing = args.notify_days;
    Ok(draft)
}

/// Payout numbers shown to users start at 1
fn payout_index(number: usize) -> Result<usize> {
    number
        .checked_sub(1)
        .ok_or_else(|| anyhow!("Payout numbers start at 1"))
}

/// Report a missing payout by the number the user typed
fn numbered_error(number: usize, error: PayoutError) -> anyhow::Error {
    match error {
        PayoutError::IndexOutOfRange { len, .. } => {
            anyhow!("No manual payout numbered {} (have {})", number, len)
        }
        other => other.into(),
    }
}

/// Ask on stdin; anything but y/yes (including end of input) declines
fn confirm_on_stdin(prompt: &str) -> bool {
    print!("{} [y/N] ", prompt);
    if io::stdout().flush().is_err() {
        return false;
    }
    let mut answer = String::new();
    match io::stdin().lock().read_line(&mut answer) {
        Ok(0) | Err(_) => false,
        Ok(_) => matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"),
    }
}

fn handle_payouts_command(config: &CliConfig, command: PayoutCommands) -> Result<()> {
    let calendar = MarketCalendar::nyse();
    let persistence = config.create_persistence_manager()?;
    let mut book = ManualPayoutBook::new(persistence, calendar);

    match command {
        PayoutCommands::List => {
            let payouts = book.list()?;
            if payouts.is_empty() {
                config.print(&format!(
                    "{}",
                    "No manual payouts. Use 'payouts add' to add one.".yellow()
                ));
                return Ok(());
            }
            let rows: Vec<PayoutDisplay> = payouts
                .iter()
                .enumerate()
                .map(|(i, p)| PayoutDisplay {
                    number: i + 1,
                    date: p.iso_day(),
                    symbol: p.symbol.clone(),
                    event_type: p.event_type.label().to_string(),
                    amount: format_money(p.amount),
                    priority: p
                        .priority
                        .map(|p| format!("{:?}", p).to_lowercase())
                        .unwrap_or_else(|| "-".to_string()),
                })
                .collect();
            println!("{}", Table::new(rows));
        }
        PayoutCommands::Add { payout } => {
            let requested = payout.date.clone();
            let event = book.create(payout_draft(payout, calendar.today())?)?;
            report_saved(config, "Added", &event, &requested);
        }
        PayoutCommands::Edit { number, payout } => {
            let requested = payout.date.clone();
            let event = book
                .edit(payout_index(number)?, payout_draft(payout, calendar.today())?)
                .map_err(|e| numbered_error(number, e))?;
            report_saved(config, "Updated", &event, &requested);
        }
        PayoutCommands::Delete { number, yes } => {
            let result = book.delete(payout_index(number)?, |event| {
                yes || confirm_on_stdin(&format!(
                    "Delete {} {} of {} on {}? This cannot be undone.",
                    event.symbol,
                    event.event_type.label(),
                    format_money(event.amount),
                    event.iso_day()
                ))
            });
            match result {
                Ok(event) => config.print_success(&format!(
                    "Deleted {} {} on {}",
                    event.symbol.cyan(),
                    event.event_type.label(),
                    event.iso_day()
                )),
                Err(PayoutError::NotConfirmed(_)) => {
                    config.print("Deletion cancelled.");
                }
                Err(e) => return Err(numbered_error(number, e)),
            }
        }
    }
    Ok(())
}

fn report_saved(config: &CliConfig, verb: &str, event: &PayoutEvent, requested: &str) {
    config.print_success(&format!(
        "{} {} {} of {} on {}",
        verb,
        event.symbol.cyan(),
        event.event_type.label(),
        format_money(event.amount),
        event.iso_day().blue()
    ));
    if NaiveDate::parse_from_str(requested.trim(), "%Y-%m-%d").map_or(false, |d| d != event.date) {
        config.print(&format!(
            "  {} {} is not a trading day, moved to {}",
            "ℹ".blue(),
            requested.trim(),
            event.iso_day()
        ));
    }
}

fn handle_holidays_command(year: Option<i32>) -> Result<()> {
    let calendar = MarketCalendar::nyse();
    let year = year.unwrap_or_else(|| calendar.today().year());

    if let HolidayCoverage::Unsupported = calendar.holiday_coverage(year) {
        calendar.check_year(year)?;
    }

    println!("{}", format!("NYSE holidays {}", year).green().bold());
    for holiday in calendar.holidays_in_year(year) {
        println!(
            "  {} {}  {}",
            holiday.date.format("%Y-%m-%d").to_string().blue(),
            holiday.date.format("%a"),
            holiday.name
        );
    }
    Ok(())
}

/// Handle the configure command
fn handle_configure_command(api_key: Option<String>, show: bool) -> Result<()> {
    let config = Config::load()?;

    if show {
        println!("{}", "Current Configuration:".green().bold());
        println!(
            "API Key: {}",
            if config.get_api_key().is_ok() {
                "******* (configured)".green()
            } else {
                "Not configured".yellow()
            }
        );
        println!("Request Timeout: {}s", config.api.timeout_seconds);
        println!("Cache Enabled: {}", config.cache.enabled);
        println!("Cache TTL: {} hours", config.cache.ttl_hours);
        println!("Projection Horizon: {} cycles", config.projection.horizon_cycles);
        println!("Ex-Date Offset: {} days", config.projection.ex_date_offset_days);
        println!("Default Calendar Window: {} days", config.calendar.default_days);
        return Ok(());
    }

    if api_key.is_some() {
        let path = config::init_config(api_key)?;
        println!("{}", "API key saved successfully!".green());
        println!("Configuration file: {:?}", path);
    } else {
        println!("{}", "Configuration Options:".green().bold());
        println!("Use --api-key to set your Alpha Vantage API key");
        println!("Use --show to display current configuration");
        println!();
        println!("To get a free API key, visit: https://www.alphavantage.co/support/#api-key");
    }

    Ok(())
}

/// Handle data management commands
fn handle_data_command(config: &CliConfig, command: DataCommands) -> Result<()> {
    let persistence = config.create_persistence_manager()?;

    match command {
        DataCommands::Stats => {
            let stats = persistence.get_stats()?;

            config.print(&format!("{}", "Data Statistics".green().bold()));
            if !config.quiet {
                println!();
                println!(
                    "📂 {} {}",
                    "Data Directory:".bright_blue(),
                    stats.data_directory.display().to_string().cyan()
                );
                println!(
                    "📊 {} {}",
                    "Holdings:".bright_blue(),
                    stats.holding_count.to_string().cyan()
                );
                println!(
                    "💰 {} {}",
                    "Dividend Records:".bright_blue(),
                    stats.record_count.to_string().cyan()
                );
                println!(
                    "✏️  {} {}",
                    "Manual Payouts:".bright_blue(),
                    stats.manual_payout_count.to_string().cyan()
                );
                println!(
                    "💾 {} {} bytes",
                    "Total Data Size:".bright_blue(),
                    stats.total_size_bytes.to_string().cyan()
                );
                println!(
                    "🔄 {} {}",
                    "Backup Files:".bright_blue(),
                    stats.backup_count.to_string().cyan()
                );
            }
        }
        DataCommands::Backup => {
            config.print("Creating manual backup...");
            // Saving backs up the previous file
            let portfolio = persistence.load()?;
            persistence.save(&portfolio)?;
            let payouts = persistence.load_payouts()?;
            persistence.save_payouts(&payouts)?;

            config.print_success("Manual backup created successfully!");
        }
    }

    Ok(())
}

/// Parse natural language date strings like "tomorrow", "next friday", or standard YYYY-MM-DD format
fn parse_dividend_date(date_str: &str, today: NaiveDate) -> Result<NaiveDate> {
    let date_str = date_str.trim().to_lowercase();

    match date_str.as_str() {
        "today" => Ok(today),
        "tomorrow" => Ok(today + Duration::days(1)),
        "yesterday" => Ok(today - Duration::days(1)),
        "next monday" => Ok(next_weekday(today, Weekday::Mon)),
        "next tuesday" => Ok(next_weekday(today, Weekday::Tue)),
        "next wednesday" => Ok(next_weekday(today, Weekday::Wed)),
        "next thursday" => Ok(next_weekday(today, Weekday::Thu)),
        "next friday" => Ok(next_weekday(today, Weekday::Fri)),
        _ => NaiveDate::parse_from_str(&date_str, "%Y-%m-%d").map_err(|_| {
            anyhow!("Invalid date format. Use YYYY-MM-DD or natural language like 'tomorrow', 'next friday'")
        }),
    }
}

/// Get the next occurrence of a specific weekday
fn next_weekday(from_date: NaiveDate, target_weekday: Weekday) -> NaiveDate {
    let current_weekday = from_date.weekday();
    let days_until_target = (target_weekday.num_days_from_monday() as i64 + 7
        - current_weekday.num_days_from_monday() as i64)
        % 7;
    let days_to_add = if days_until_target == 0 {
        7
    } else {
        days_until_target
    };
    from_date + Duration::days(days_to_add)
}
