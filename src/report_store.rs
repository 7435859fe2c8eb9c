use crate::errors::{AppError, ResultExt};
use crate::models::{CompanyReport, StoredReport, UsageRecord, NOT_PUBLICLY_AVAILABLE};
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Flat CSV store holding one row per company.
///
/// Rows are keyed by company name, compared case-insensitively. All writes in
/// this process go through one lock; the file is not safe for several writer
/// processes.
#[derive(Clone)]
pub struct ReportStore {
    path: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl ReportStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Update the company's row if present, else append one.
    ///
    /// Reports without a company name have no row key and are rejected.
    pub async fn upsert(&self, report: &CompanyReport) -> Result<StoredReport, AppError> {
        if report.company_name.trim().is_empty() {
            return Err(AppError::BadRequest(
                "Reports without a company name are not stored".to_string(),
            ));
        }
        let row = flatten_report(report, &Utc::now().format(TIMESTAMP_FORMAT).to_string());
        let _guard = self.lock.lock().await;

        let path = self.path.clone();
        let stored = row.clone();
        let updated = tokio::task::spawn_blocking(move || -> Result<bool, AppError> {
            let mut rows = read_rows(&path)?;
            let key = company_key(&stored.company_name);
            let updated = match rows.iter_mut().find(|r| company_key(&r.company_name) == key) {
                Some(existing) => {
                    *existing = stored;
                    true
                }
                None => {
                    rows.push(stored);
                    false
                }
            };
            write_rows(&path, &rows)?;
            Ok(updated)
        })
        .await
        .map_err(|e| AppError::InternalError(format!("Store task failed: {}", e)))?
        .with_context(|| format!("Saving '{}' to {}", report.company_name, self.path.display()))?;

        tracing::info!(
            "{} report store row for '{}'",
            if updated { "Updated" } else { "Appended" },
            row.company_name
        );
        Ok(row)
    }

    pub async fn list(&self) -> Result<Vec<StoredReport>, AppError> {
        let _guard = self.lock.lock().await;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || read_rows(&path))
            .await
            .map_err(|e| AppError::InternalError(format!("Store task failed: {}", e)))?
    }

    pub async fn find(&self, company_name: &str) -> Result<Option<StoredReport>, AppError> {
        let key = company_key(company_name);
        Ok(self
            .list()
            .await?
            .into_iter()
            .find(|row| company_key(&row.company_name) == key))
    }
}

/// Renders the canonical record as scalar strings for the flat store.
pub fn flatten_report(report: &CompanyReport, last_updated: &str) -> StoredReport {
    let owners: Vec<String> = report
        .beneficial_owners
        .iter()
        .map(|owner| owner.flatten())
        .collect();
    let financials: Vec<String> = report
        .financial_summary
        .iter()
        .map(|(key, value)| format!("{}: {}", key, value))
        .collect();

    StoredReport {
        company_name: report.company_name.clone(),
        registration_number: report.registration_number.clone(),
        incorporation_date: report.incorporation_date.clone(),
        beneficial_owners: join_or_sentinel(&owners),
        financial_summary: join_or_sentinel(&financials),
        risk_indicators: join_or_sentinel(&report.risk_indicators),
        last_updated: last_updated.to_string(),
    }
}

fn join_or_sentinel(items: &[String]) -> String {
    if items.is_empty() {
        NOT_PUBLICLY_AVAILABLE.to_string()
    } else {
        items.join(", ")
    }
}

fn company_key(name: &str) -> String {
    name.trim().to_lowercase()
}

fn read_rows(path: &Path) -> Result<Vec<StoredReport>, AppError> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let mut reader = csv::Reader::from_path(path)?;
    let mut rows = Vec::new();
    for row in reader.deserialize() {
        rows.push(row?);
    }
    Ok(rows)
}

fn write_rows(path: &Path, rows: &[StoredReport]) -> Result<(), AppError> {
    ensure_parent_dir(path)?;

    // Write to a sibling file and rename so readers never see a half-written store.
    let tmp_path = path.with_extension("csv.tmp");
    {
        let mut writer = csv::Writer::from_path(&tmp_path)?;
        for row in rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
    }
    fs::rename(&tmp_path, path)?;
    Ok(())
}

fn ensure_parent_dir(path: &Path) -> Result<(), AppError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// Append-only CSV log of report requests.
#[derive(Clone)]
pub struct UsageLog {
    path: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl UsageLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub async fn record(
        &self,
        api_key: &str,
        input_type: &str,
        input_text: &str,
    ) -> Result<UsageRecord, AppError> {
        let record = UsageRecord {
            api_key_fingerprint: fingerprint_api_key(api_key),
            input_type: input_type.to_string(),
            input_text: input_text.to_string(),
            timestamp: Utc::now().format(TIMESTAMP_FORMAT).to_string(),
        };

        let _guard = self.lock.lock().await;
        let path = self.path.clone();
        let row = record.clone();
        tokio::task::spawn_blocking(move || append_row(&path, &row))
            .await
            .map_err(|e| AppError::InternalError(format!("Usage log task failed: {}", e)))?
            .context("Updating usage log")?;

        Ok(record)
    }

    pub async fn entries(&self) -> Result<Vec<UsageRecord>, AppError> {
        let _guard = self.lock.lock().await;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || -> Result<Vec<UsageRecord>, AppError> {
            if !path.exists() {
                return Ok(Vec::new());
            }
            let mut reader = csv::Reader::from_path(&path)?;
            let mut entries = Vec::new();
            for entry in reader.deserialize() {
                entries.push(entry?);
            }
            Ok(entries)
        })
        .await
        .map_err(|e| AppError::InternalError(format!("Usage log task failed: {}", e)))?
    }
}

fn append_row(path: &Path, record: &UsageRecord) -> Result<(), AppError> {
    ensure_parent_dir(path)?;
    let needs_header = fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true);

    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut writer = csv::WriterBuilder::new()
        .has_headers(needs_header)
        .from_writer(file);
    writer.serialize(record)?;
    writer.flush()?;
    Ok(())
}

/// Short SHA-256 fingerprint so usage can be attributed without storing the key.
pub fn fingerprint_api_key(api_key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(api_key.as_bytes());
    let digest = hex::encode(hasher.finalize());
    digest[..12].to_string()
}
