use crate::errors::{AppError, ResultExt};
use crate::models::{KybProfile, ReportFileInfo};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

const MAX_NAME_ATTEMPTS: u32 = 1_000;

/// Writes each profile as an indented JSON file and serves them back by name.
#[derive(Debug, Clone)]
pub struct ReportExporter {
    dir: PathBuf,
}

impl ReportExporter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Save `profile` and return the file name it was written under.
    pub async fn save(&self, profile: &KybProfile) -> Result<String, AppError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Creating {}", self.dir.display()))?;

        let base = report_file_name(&profile.report.company_name, profile.generated_at);
        let body = serde_json::to_string_pretty(profile)?;

        // Never replace an earlier export; same-second reports get a numeric suffix.
        for attempt in 1..=MAX_NAME_ATTEMPTS {
            let file_name = with_suffix(&base, attempt);
            let path = self.dir.join(&file_name);
            let mut file = match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => file,
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => {
                    return Err(e).with_context(|| format!("Creating report {}", file_name))
                }
            };

            file.write_all(body.as_bytes())
                .await
                .with_context(|| format!("Writing report {}", file_name))?;
            file.flush().await?;

            tracing::info!("Exported report to {}", path.display());
            return Ok(file_name);
        }

        Err(AppError::StorageError(format!(
            "No free file name for {} after {} attempts",
            base, MAX_NAME_ATTEMPTS
        )))
    }

    /// Exported reports, newest first.
    pub async fn list(&self) -> Result<Vec<ReportFileInfo>, AppError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name().to_string_lossy().into_owned();
            if !file_name.ends_with(".json") {
                continue;
            }
            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }
            let modified = metadata
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now());
            files.push(ReportFileInfo {
                file_name,
                size_bytes: metadata.len(),
                modified,
            });
        }

        // Names embed the timestamp, so they break ties between equal mtimes.
        files.sort_by(|a, b| {
            b.modified
                .cmp(&a.modified)
                .then_with(|| b.file_name.cmp(&a.file_name))
        });
        Ok(files)
    }

    /// Read one exported report by bare file name.
    pub async fn load(&self, file_name: &str) -> Result<KybProfile, AppError> {
        validate_file_name(file_name)?;

        let path = self.dir.join(file_name);
        let body = match tokio::fs::read_to_string(&path).await {
            Ok(body) => body,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(AppError::NotFound(format!("Report {} not found", file_name)))
            }
            Err(e) => return Err(e.into()),
        };

        Ok(serde_json::from_str(&body)?)
    }
}

/// `<Company_Name>_<YYYYmmdd_HHMMSS>.json`
pub fn report_file_name(company_name: &str, generated_at: DateTime<Utc>) -> String {
    format!(
        "{}_{}.json",
        sanitize_company_name(company_name),
        generated_at.format("%Y%m%d_%H%M%S")
    )
}

/// `Acme_Corp_20240305_140709.json` on the first attempt, then `..._2.json`, `..._3.json`.
fn with_suffix(base: &str, attempt: u32) -> String {
    if attempt == 1 {
        return base.to_string();
    }
    let stem = base.strip_suffix(".json").unwrap_or(base);
    format!("{}_{}.json", stem, attempt)
}

/// Spaces become `_`; anything outside `[A-Za-z0-9_-]` is dropped.
pub fn sanitize_company_name(company_name: &str) -> String {
    let sanitized: String = company_name
        .trim()
        .chars()
        .filter_map(|c| match c {
            ' ' => Some('_'),
            c if c.is_ascii_alphanumeric() || c == '_' || c == '-' => Some(c),
            _ => None,
        })
        .collect();

    if sanitized.is_empty() {
        "report".to_string()
    } else {
        sanitized
    }
}

fn validate_file_name(file_name: &str) -> Result<(), AppError> {
    if file_name.is_empty()
        || file_name.contains("..")
        || file_name.contains('/')
        || file_name.contains('\\')
    {
        return Err(AppError::BadRequest(format!(
            "Invalid report file name '{}'",
            file_name
        )));
    }
    Ok(())
}
