use anyhow::{Context, Result};
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use crate::models::{PayoutEvent, Portfolio};
use crate::payouts::PayoutStore;

/// Schema version for data migration
const SCHEMA_VERSION: u32 = 1;

/// Keep this many backups per data file
const MAX_BACKUPS: usize = 10;

/// Environment variable overriding the data directory
pub const DATA_DIR_ENV: &str = "DIVLY_DATA_DIR";

/// Versioned portfolio file layout
#[derive(Debug, Serialize, Deserialize)]
struct PersistedPortfolio {
    schema_version: u32,
    #[serde(flatten)]
    data: Portfolio,
    metadata: DataMetadata,
}

/// Versioned manual payouts file layout
#[derive(Debug, Serialize, Deserialize)]
struct PersistedPayouts {
    schema_version: u32,
    payouts: Vec<PayoutEvent>,
    metadata: DataMetadata,
}

/// Metadata about persisted data
#[derive(Debug, Serialize, Deserialize)]
struct DataMetadata {
    /// Last save timestamp
    last_saved: String,
    /// Number of saves
    save_count: u32,
    /// Application version that saved the data
    app_version: String,
}

impl DataMetadata {
    fn next(save_count: u32) -> Self {
        DataMetadata {
            last_saved: Local::now().to_rfc3339(),
            save_count: save_count + 1,
            app_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Manages the portfolio and manual payout files in the data directory
#[derive(Debug, Clone)]
pub struct PersistenceManager {
    /// Base directory for all data files
    data_dir: PathBuf,
    /// Directory for backup files
    backup_dir: PathBuf,
}

impl PersistenceManager {
    /// Create a persistence manager rooted at `$DIVLY_DATA_DIR` or `~/.divly`
    pub fn new() -> Result<Self> {
        if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
            if !dir.trim().is_empty() {
                return Ok(Self::with_custom_path(dir));
            }
        }

        let home_dir = dirs::home_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine home directory"))?;

        Ok(Self::with_custom_path(home_dir.join(".divly")))
    }

    /// Create a persistence manager with a custom data directory
    pub fn with_custom_path<P: AsRef<Path>>(path: P) -> Self {
        let data_dir = path.as_ref().to_path_buf();
        let backup_dir = data_dir.join("backups");

        PersistenceManager {
            data_dir,
            backup_dir,
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Ensure all required directories exist
    pub fn ensure_directories(&self) -> Result<()> {
        fs::create_dir_all(&self.data_dir)
            .with_context(|| format!("Failed to create data directory: {:?}", self.data_dir))?;

        fs::create_dir_all(&self.backup_dir)
            .with_context(|| format!("Failed to create backup directory: {:?}", self.backup_dir))?;

        Ok(())
    }

    fn portfolio_file(&self) -> PathBuf {
        self.data_dir.join("portfolio.json")
    }

    fn payouts_file(&self) -> PathBuf {
        self.data_dir.join("manual_payouts.json")
    }

    /// Copy a file into the backup directory before it is overwritten
    fn backup_file(&self, file_path: &Path) -> Result<()> {
        if !file_path.exists() {
            return Ok(());
        }
        fs::create_dir_all(&self.backup_dir)
            .with_context(|| format!("Failed to create backup directory: {:?}", self.backup_dir))?;

        let file_name = file_path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| anyhow::anyhow!("Invalid file name"))?;

        let timestamp = Local::now().format("%Y-%m-%d_%H-%M-%S%.3f");
        let backup_name = format!("{}_{}.bak", file_name.trim_end_matches(".json"), timestamp);
        let backup_path = self.backup_dir.join(backup_name);

        fs::copy(file_path, &backup_path)
            .with_context(|| format!("Failed to backup file: {:?}", file_path))?;
        log::debug!("Backed up {:?} to {:?}", file_path, backup_path);

        self.cleanup_old_backups(file_name)
    }

    /// Delete all but the newest backups of one data file
    fn cleanup_old_backups(&self, base_filename: &str) -> Result<()> {
        let prefix = format!("{}_", base_filename.trim_end_matches(".json"));
        let mut backups: Vec<PathBuf> = Vec::new();

        for entry in fs::read_dir(&self.backup_dir)? {
            let path = entry?.path();
            if let Some(filename) = path.file_name().and_then(|n| n.to_str()) {
                if filename.starts_with(&prefix) && filename.ends_with(".bak") {
                    backups.push(path);
                }
            }
        }

        // Timestamped names sort chronologically; newest first
        backups.sort();
        backups.reverse();

        for backup in backups.iter().skip(MAX_BACKUPS) {
            fs::remove_file(backup)
                .with_context(|| format!("Failed to remove old backup: {:?}", backup))?;
        }

        Ok(())
    }

    /// Write through a temp file in the same directory, then rename over the target
    fn atomic_write(&self, path: &Path, content: &[u8]) -> Result<()> {
        let parent = path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("File has no parent directory"))?;

        let mut temp_file =
            NamedTempFile::new_in(parent).with_context(|| "Failed to create temporary file")?;

        temp_file
            .write_all(content)
            .with_context(|| "Failed to write to temporary file")?;

        temp_file
            .flush()
            .with_context(|| "Failed to flush temporary file")?;

        temp_file
            .persist(path)
            .with_context(|| format!("Failed to persist file to: {:?}", path))?;

        Ok(())
    }

    /// Read a data file, or `None` when it is missing or corrupted.
    ///
    /// A corrupted file is backed up before the caller starts fresh.
    fn read_versioned<T: for<'de> Deserialize<'de>>(&self, file_path: &Path) -> Result<Option<T>> {
        if !file_path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(file_path)
            .with_context(|| format!("Failed to read file: {:?}", file_path))?;

        match serde_json::from_str(&content) {
            Ok(data) => Ok(Some(data)),
            Err(e) => {
                log::warn!("Failed to parse {:?}: {}", file_path, e);
                log::warn!("Backing up the corrupted file and starting fresh");
                self.backup_file(file_path)?;
                Ok(None)
            }
        }
    }

    /// Save the portfolio (holdings plus received dividends)
    pub fn save(&self, portfolio: &Portfolio) -> Result<()> {
        self.ensure_directories()?;

        let file_path = self.portfolio_file();
        let save_count = self.portfolio_save_count();
        self.backup_file(&file_path)?;

        let persisted = PersistedPortfolio {
            schema_version: SCHEMA_VERSION,
            data: portfolio.clone(),
            metadata: DataMetadata::next(save_count),
        };

        let json = serde_json::to_string_pretty(&persisted)
            .with_context(|| "Failed to serialize portfolio data")?;

        self.atomic_write(&file_path, json.as_bytes())
    }

    /// Load the portfolio; a missing or corrupted file yields an empty one,
    /// a holding with an invalid payment schedule is an error
    pub fn load(&self) -> Result<Portfolio> {
        let persisted: Option<PersistedPortfolio> = self.read_versioned(&self.portfolio_file())?;

        Ok(match persisted {
            Some(persisted) => {
                check_schema(persisted.schema_version, "portfolio");
                for holding in persisted.data.holdings.values() {
                    holding.validate().with_context(|| {
                        format!("Invalid holding in {:?}", self.portfolio_file())
                    })?;
                }
                persisted.data
            }
            None => Portfolio::new(),
        })
    }

    /// Save the full list of manual payouts
    pub fn save_payouts(&self, payouts: &[PayoutEvent]) -> Result<()> {
        self.ensure_directories()?;

        let file_path = self.payouts_file();
        let save_count = self.payouts_save_count();
        self.backup_file(&file_path)?;

        let persisted = PersistedPayouts {
            schema_version: SCHEMA_VERSION,
            payouts: payouts.to_vec(),
            metadata: DataMetadata::next(save_count),
        };

        let json = serde_json::to_string_pretty(&persisted)
            .with_context(|| "Failed to serialize manual payouts")?;

        self.atomic_write(&file_path, json.as_bytes())
    }

    /// Load manual payouts; a missing or corrupted file yields none
    pub fn load_payouts(&self) -> Result<Vec<PayoutEvent>> {
        let persisted: Option<PersistedPayouts> = self.read_versioned(&self.payouts_file())?;

        Ok(match persisted {
            Some(persisted) => {
                check_schema(persisted.schema_version, "manual payouts");
                persisted.payouts
            }
            None => Vec::new(),
        })
    }

    /// Write calendar events to CSV, one row per event
    pub fn export_events_to_csv(&self, events: &[PayoutEvent], output_path: &Path) -> Result<()> {
        let mut wtr = csv::Writer::from_path(output_path)
            .with_context(|| format!("Failed to create CSV file: {:?}", output_path))?;

        wtr.write_record(["Date", "Symbol", "Type", "Amount", "Source", "Auto", "Growth %"])?;

        for event in events {
            wtr.write_record([
                event.iso_day(),
                event.symbol.clone(),
                event.event_type.label().to_string(),
                event.amount.to_string(),
                event.source.map(|s| s.name().to_string()).unwrap_or_default(),
                event.auto.to_string(),
                event.growth.map(|g| g.to_string()).unwrap_or_default(),
            ])?;
        }

        wtr.flush()?;
        Ok(())
    }

    fn portfolio_save_count(&self) -> u32 {
        let file_path = self.portfolio_file();
        fs::read_to_string(file_path)
            .ok()
            .and_then(|content| serde_json::from_str::<PersistedPortfolio>(&content).ok())
            .map_or(0, |p| p.metadata.save_count)
    }

    fn payouts_save_count(&self) -> u32 {
        let file_path = self.payouts_file();
        fs::read_to_string(file_path)
            .ok()
            .and_then(|content| serde_json::from_str::<PersistedPayouts>(&content).ok())
            .map_or(0, |p| p.metadata.save_count)
    }

    /// Get statistics about the persisted data
    pub fn get_stats(&self) -> Result<DataStats> {
        self.ensure_directories()?;

        let portfolio = self.load()?;
        let payouts = self.load_payouts()?;

        let total_size_bytes = [self.portfolio_file(), self.payouts_file()]
            .iter()
            .filter_map(|path| fs::metadata(path).ok())
            .map(|m| m.len())
            .sum();

        let backup_count = fs::read_dir(&self.backup_dir)?
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.path()
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| ext == "bak")
                    .unwrap_or(false)
            })
            .count();

        Ok(DataStats {
            holding_count: portfolio.holdings.len(),
            record_count: portfolio.records.len(),
            manual_payout_count: payouts.len(),
            total_size_bytes,
            backup_count,
            data_directory: self.data_dir.clone(),
        })
    }
}

fn check_schema(found: u32, what: &str) {
    if found != SCHEMA_VERSION {
        log::warn!(
            "{} file has schema version {} (expected {}); it will be rewritten on next save",
            what,
            found,
            SCHEMA_VERSION
        );
    }
}

/// Statistics about persisted data
#[derive(Debug)]
pub struct DataStats {
    pub holding_count: usize,
    pub record_count: usize,
    pub manual_payout_count: usize,
    pub total_size_bytes: u64,
    pub backup_count: usize,
    pub data_directory: PathBuf,
}

/// Manual payouts stored in `manual_payouts.json`; every change is saved immediately
impl PayoutStore for PersistenceManager {
    fn list(&self) -> Result<Vec<PayoutEvent>> {
        self.load_payouts()
    }

    fn create(&mut self, event: PayoutEvent) -> Result<()> {
        let mut payouts = self.load_payouts()?;
        payouts.push(event);
        self.save_payouts(&payouts)
    }

    fn update(&mut self, index: usize, event: PayoutEvent) -> Result<()> {
        let mut payouts = self.load_payouts()?;
        let slot = payouts
            .get_mut(index)
            .ok_or_else(|| anyhow::anyhow!("No manual payout at index {}", index))?;
        *slot = event;
        self.save_payouts(&payouts)
    }

    fn delete(&mut self, index: usize) -> Result<PayoutEvent> {
        let mut payouts = self.load_payouts()?;
        if index >= payouts.len() {
            anyhow::bail!("No manual payout at index {}", index);
        }
        let removed = payouts.remove(index);
        self.save_payouts(&payouts)?;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DividendRecord, Holding, PayoutFrequency, PayoutSource, PayoutType};
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;
    use tempfile::TempDir;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn backups_in(dir: &Path) -> usize {
        fs::read_dir(dir.join("backups"))
            .map(|entries| entries.filter_map(|e| e.ok()).count())
            .unwrap_or(0)
    }

    #[test]
    fn test_persistence_manager_creation() {
        let temp_dir = TempDir::new().unwrap();
        let manager = PersistenceManager::with_custom_path(temp_dir.path());

        assert!(manager.ensure_directories().is_ok());
        assert!(temp_dir.path().join("backups").exists());
    }

    #[test]
    fn test_load_missing_files_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let manager = PersistenceManager::with_custom_path(temp_dir.path());

        assert!(manager.load().unwrap().holdings.is_empty());
        assert!(manager.load_payouts().unwrap().is_empty());
    }

    #[test]
    fn test_save_and_load_portfolio() {
        let temp_dir = TempDir::new().unwrap();
        let manager = PersistenceManager::with_custom_path(temp_dir.path());

        let mut portfolio = Portfolio::new();
        let holding = Holding::new(
            "KO".to_string(),
            dec!(100),
            dec!(60),
            Some(dec!(3.1)),
            PayoutFrequency::Quarterly,
        )
        .unwrap()
        .with_payment_months(vec![3, 6, 9, 11])
        .unwrap();
        portfolio.add_holding(holding.clone());
        portfolio.add_record(DividendRecord::new("KO".to_string(), dec!(46), date(2024, 4, 1)).unwrap());

        manager.save(&portfolio).unwrap();
        let loaded = manager.load().unwrap();

        assert_eq!(loaded, portfolio);
        assert_eq!(loaded.holdings["KO"], holding);
    }

    #[test]
    fn test_load_rejects_invalid_payment_day() {
        let temp_dir = TempDir::new().unwrap();
        let manager = PersistenceManager::with_custom_path(temp_dir.path());

        let mut portfolio = Portfolio::new();
        portfolio.add_holding(
            Holding::new(
                "O".to_string(),
                dec!(100),
                dec!(50),
                Some(dec!(6)),
                PayoutFrequency::Monthly,
            )
            .unwrap()
            .with_payment_day(15)
            .unwrap(),
        );
        manager.save(&portfolio).unwrap();

        let mut raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(manager.portfolio_file()).unwrap()).unwrap();
        raw["holdings"]["O"]["typical_payment_day"] = serde_json::json!(0);
        fs::write(manager.portfolio_file(), raw.to_string()).unwrap();

        let err = manager.load().unwrap_err();
        let message = format!("{:#}", err);
        assert!(message.contains("Invalid holding"));
        assert!(message.contains("payment day 0 is not between 1 and 31"));
        // The file is left alone for the user to fix
        assert!(fs::read_to_string(manager.portfolio_file())
            .unwrap()
            .contains("\"typical_payment_day\":0"));
    }

    #[test]
    fn test_backup_creation() {
        let temp_dir = TempDir::new().unwrap();
        let manager = PersistenceManager::with_custom_path(temp_dir.path());

        let portfolio = Portfolio::new();
        manager.save(&portfolio).unwrap();
        assert_eq!(backups_in(temp_dir.path()), 0);

        // Second save backs up the first
        manager.save(&portfolio).unwrap();
        assert_eq!(backups_in(temp_dir.path()), 1);
    }

    #[test]
    fn test_corrupted_json_handling() {
        let temp_dir = TempDir::new().unwrap();
        let manager = PersistenceManager::with_custom_path(temp_dir.path());
        manager.ensure_directories().unwrap();

        fs::write(manager.portfolio_file(), "{ this is not valid json }").unwrap();
        fs::write(manager.payouts_file(), "[1, 2").unwrap();

        assert!(manager.load().unwrap().holdings.is_empty());
        assert!(manager.load_payouts().unwrap().is_empty());
        assert_eq!(backups_in(temp_dir.path()), 2);
    }

    #[test]
    fn test_payout_store_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let mut manager = PersistenceManager::with_custom_path(temp_dir.path());

        let mut event = PayoutEvent::generated(
            "PEP",
            dec!(1.355),
            date(2024, 6, 28),
            PayoutType::PaymentDate,
            PayoutSource::Manual,
        );
        event.auto = false;

        manager.create(event.clone()).unwrap();
        manager.create(event.clone()).unwrap();
        assert_eq!(manager.list().unwrap().len(), 2);

        let mut edited = event.clone();
        edited.amount = dec!(1.40);
        manager.update(1, edited.clone()).unwrap();

        let reopened = PersistenceManager::with_custom_path(temp_dir.path());
        let stored = reopened.list().unwrap();
        assert_eq!(stored, vec![event.clone(), edited]);

        assert_eq!(manager.delete(0).unwrap(), event);
        assert!(manager.delete(5).is_err());
        assert_eq!(manager.list().unwrap().len(), 1);
    }

    #[test]
    fn test_export_events_to_csv() {
        let temp_dir = TempDir::new().unwrap();
        let manager = PersistenceManager::with_custom_path(temp_dir.path());
        let output = temp_dir.path().join("calendar.csv");

        let events = vec![PayoutEvent::generated(
            "MSFT",
            dec!(0.75),
            date(2024, 6, 13),
            PayoutType::PaymentDate,
            PayoutSource::Projected,
        )];
        manager.export_events_to_csv(&events, &output).unwrap();

        let content = fs::read_to_string(&output).unwrap();
        let mut lines = content.lines();
        assert_eq!(lines.next(), Some("Date,Symbol,Type,Amount,Source,Auto,Growth %"));
        assert_eq!(lines.next(), Some("2024-06-13,MSFT,Payment,0.75,projected,true,"));
    }

    #[test]
    fn test_stats() {
        let temp_dir = TempDir::new().unwrap();
        let manager = PersistenceManager::with_custom_path(temp_dir.path());

        let mut portfolio = Portfolio::new();
        portfolio.add_record(DividendRecord::new("T".to_string(), dec!(27.75), date(2024, 2, 1)).unwrap());
        manager.save(&portfolio).unwrap();

        let stats = manager.get_stats().unwrap();
        assert_eq!(stats.record_count, 1);
        assert_eq!(stats.manual_payout_count, 0);
        assert!(stats.total_size_bytes > 0);
        assert_eq!(stats.data_directory, temp_dir.path());
    }
}
