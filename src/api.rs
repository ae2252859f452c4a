use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use futures::future::join_all;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::config::Config;
use crate::merge::external_to_events;
use crate::models::{normalize_symbol, ExternalDividendRecord, PayoutEvent};

const ALPHA_VANTAGE_URL: &str = "https://www.alphavantage.co/query";

/// Anything that can look up declared dividends for a symbol
#[allow(async_fn_in_trait)]
pub trait DividendSource {
    async fn fetch_dividends(
        &self,
        symbol: &str,
        from_date: Option<NaiveDate>,
        to_date: Option<NaiveDate>,
    ) -> Result<Vec<ExternalDividendRecord>>;
}

/// Response of the Alpha Vantage `DIVIDENDS` function
#[derive(Debug, Deserialize)]
struct DividendsResponse {
    symbol: Option<String>,
    #[serde(default)]
    data: Vec<DividendEntry>,
    #[serde(rename = "Error Message")]
    error_message: Option<String>,
    #[serde(rename = "Note")]
    note: Option<String>, // Rate limit message
    #[serde(rename = "Information")]
    information: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DividendEntry {
    ex_dividend_date: String,
    payment_date: Option<String>,
    amount: String,
}

/// Alpha Vantage API client for fetching declared dividends
pub struct AlphaVantageClient {
    client: Client,
    api_key: String,
    /// `None` disables the on-disk cache
    cache_dir: Option<PathBuf>,
    cache_ttl: Duration,
}

impl AlphaVantageClient {
    /// Create a client with the cache in the user cache directory
    pub fn new(api_key: String) -> Result<Self> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow!("Could not determine cache directory"))?
            .join("divly")
            .join("api_cache");

        Ok(Self {
            client: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .context("Failed to build HTTP client")?,
            api_key,
            cache_dir: Some(cache_dir),
            cache_ttl: Duration::from_secs(24 * 3600),
        })
    }

    /// Create a client using the configured key, timeout and cache settings
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut client = Self::new(config.get_api_key()?)?;
        client.client = Client::builder()
            .timeout(Duration::from_secs(config.api.timeout_seconds))
            .build()
            .context("Failed to build HTTP client")?;
        client.cache_ttl = Duration::from_secs(u64::from(config.cache.ttl_hours) * 3600);
        if !config.cache.enabled {
            client.cache_dir = None;
        }
        Ok(client)
    }

    /// Fetch data from Alpha Vantage API
    async fn fetch_from_api(&self, symbol: &str) -> Result<DividendsResponse> {
        let response = self
            .client
            .get(ALPHA_VANTAGE_URL)
            .query(&[
                ("function", "DIVIDENDS"),
                ("symbol", symbol),
                ("apikey", self.api_key.as_str()),
            ])
            .send()
            .await
            .context("Failed to send API request")?
            .error_for_status()
            .context("API request failed")?
            .json::<DividendsResponse>()
            .await
            .context("Failed to parse API response")?;

        if let Some(ref error) = response.error_message {
            return Err(anyhow!("API error: {}", error));
        }

        // Rate limiting is reported in a 200 response
        if let Some(note) = response.note.as_ref().or(response.information.as_ref()) {
            return Err(anyhow!("Rate limit exceeded: {}", note));
        }

        Ok(response)
    }

    fn cache_file(&self, symbol: &str) -> Option<PathBuf> {
        self.cache_dir
            .as_ref()
            .map(|dir| dir.join(format!("{}.json", normalize_symbol(symbol))))
    }

    /// Get cached dividend data for a symbol if it is still fresh
    async fn get_cached_dividends(&self, symbol: &str) -> Option<Vec<ExternalDividendRecord>> {
        let cache_file = self.cache_file(symbol)?;
        let metadata = tokio::fs::metadata(&cache_file).await.ok()?;
        let age = metadata
            .modified()
            .ok()?
            .elapsed()
            .unwrap_or(Duration::MAX);

        if age > self.cache_ttl {
            log::debug!("Cache for {} is stale", symbol);
            return None;
        }

        let contents = tokio::fs::read_to_string(&cache_file).await.ok()?;
        serde_json::from_str(&contents).ok()
    }

    async fn cache_dividends(&self, symbol: &str, dividends: &[ExternalDividendRecord]) -> Result<()> {
        let Some(cache_file) = self.cache_file(symbol) else {
            return Ok(());
        };
        if let Some(dir) = cache_file.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        let json = serde_json::to_string_pretty(dividends)?;
        tokio::fs::write(cache_file, json).await?;
        Ok(())
    }
}

impl DividendSource for AlphaVantageClient {
    async fn fetch_dividends(
        &self,
        symbol: &str,
        from_date: Option<NaiveDate>,
        to_date: Option<NaiveDate>,
    ) -> Result<Vec<ExternalDividendRecord>> {
        if let Some(cached) = self.get_cached_dividends(symbol).await {
            log::debug!("Using cached dividends for {}", symbol);
            return Ok(filter_by_date_range(cached, from_date, to_date));
        }

        let response = self.fetch_from_api(symbol).await?;
        let dividends = parse_dividend_response(symbol, response)?;

        if let Err(e) = self.cache_dividends(symbol, &dividends).await {
            log::warn!("Failed to cache dividends for {}: {}", symbol, e);
        }

        Ok(filter_by_date_range(dividends, from_date, to_date))
    }
}

/// Turn the raw response into records, newest first
fn parse_dividend_response(
    symbol: &str,
    response: DividendsResponse,
) -> Result<Vec<ExternalDividendRecord>> {
    let symbol = normalize_symbol(response.symbol.as_deref().unwrap_or(symbol));
    let mut dividends = Vec::with_capacity(response.data.len());

    for entry in response.data {
        let amount = Decimal::from_str(entry.amount.trim())
            .with_context(|| format!("Failed to parse dividend amount: {}", entry.amount))?;
        if amount <= Decimal::ZERO {
            continue;
        }

        let ex_date = NaiveDate::parse_from_str(&entry.ex_dividend_date, "%Y-%m-%d")
            .with_context(|| format!("Failed to parse ex-dividend date: {}", entry.ex_dividend_date))?;

        // "None" until the payment date is declared
        let payment_date = entry
            .payment_date
            .as_deref()
            .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok());

        dividends.push(ExternalDividendRecord {
            symbol: symbol.clone(),
            amount,
            ex_date,
            payment_date,
        });
    }

    dividends.sort_by(|a, b| b.ex_date.cmp(&a.ex_date));
    Ok(dividends)
}

/// Keep records whose ex-date is within the inclusive range
fn filter_by_date_range(
    dividends: Vec<ExternalDividendRecord>,
    from_date: Option<NaiveDate>,
    to_date: Option<NaiveDate>,
) -> Vec<ExternalDividendRecord> {
    dividends
        .into_iter()
        .filter(|d| from_date.map_or(true, |from| d.ex_date >= from))
        .filter(|d| to_date.map_or(true, |to| d.ex_date <= to))
        .collect()
}

/// Identifies one fetch batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchToken {
    generation: u64,
}

impl FetchToken {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Merged result of one batch
#[derive(Debug, Default)]
pub struct FetchReport {
    pub records: Vec<ExternalDividendRecord>,
    /// `(symbol, error message)` for every symbol that failed
    pub failures: Vec<(String, String)>,
}

impl FetchReport {
    /// One user-facing notice summarising all failures, if any
    pub fn notice(&self) -> Option<String> {
        if self.failures.is_empty() {
            return None;
        }
        let symbols: Vec<&str> = self.failures.iter().map(|(s, _)| s.as_str()).collect();
        Some(format!(
            "Could not fetch dividend data for {}; showing projected dates only for those holdings",
            symbols.join(", ")
        ))
    }

    pub fn events(&self) -> Vec<PayoutEvent> {
        external_to_events(&self.records)
    }
}

#[derive(Debug)]
pub enum FetchOutcome {
    Completed(FetchReport),
    /// A newer batch started while this one was in flight
    Stale { generation: u64 },
}

/// Runs concurrent fetch batches and discards those superseded mid-flight
#[derive(Debug, Default)]
pub struct FetchCoordinator {
    generation: AtomicU64,
}

impl FetchCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new batch, invalidating every earlier token
    pub fn begin_batch(&self) -> FetchToken {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        FetchToken { generation }
    }

    /// Invalidate outstanding batches without starting a new one
    pub fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    pub fn is_current(&self, token: FetchToken) -> bool {
        self.generation.load(Ordering::SeqCst) == token.generation
    }

    /// Fetch every symbol concurrently.
    ///
    /// `on_progress` is called with each symbol as its request finishes.
    /// Individual failures are collected into the report; the batch only
    /// fails as a whole by going stale.
    pub async fn fetch_all<S, F>(
        &self,
        token: FetchToken,
        source: &S,
        symbols: &[String],
        from_date: Option<NaiveDate>,
        to_date: Option<NaiveDate>,
        on_progress: F,
    ) -> FetchOutcome
    where
        S: DividendSource,
        F: Fn(&str),
    {
        let on_progress = &on_progress;
        let requests = symbols.iter().map(|symbol| async move {
            let result = source.fetch_dividends(symbol, from_date, to_date).await;
            on_progress(symbol.as_str());
            (symbol.clone(), result)
        });
        let results = join_all(requests).await;

        if !self.is_current(token) {
            log::warn!(
                "Discarding stale dividend fetch batch {} ({} symbols)",
                token.generation,
                symbols.len()
            );
            return FetchOutcome::Stale {
                generation: token.generation,
            };
        }

        let mut report = FetchReport::default();
        for (symbol, result) in results {
            match result {
                Ok(records) => report.records.extend(records),
                Err(e) => {
                    log::warn!("Dividend fetch failed for {}: {:#}", symbol, e);
                    report.failures.push((symbol, e.to_string()));
                }
            }
        }

        log::info!(
            "Fetched {} dividend records for {} symbols ({} failed)",
            report.records.len(),
            symbols.len(),
            report.failures.len()
        );
        FetchOutcome::Completed(report)
    }
}
