use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Marks a requested data point for which no information exists.
pub const NOT_PUBLICLY_AVAILABLE: &str = "Not publicly available";
/// Ownership share recorded when the source gives none.
pub const UNKNOWN_OWNERSHIP: &str = "Unknown";
/// Scraper sentinel for leadership, contact and social data.
pub const NOT_FOUND_ON_WEBSITE: &str = "Not found on website";
/// Scraper sentinel for keyword risk hits.
pub const NONE_DETECTED_ON_WEBSITE: &str = "None detected on website";
/// `about_info` of the degraded record returned when the website fetch fails.
pub const WEBSITE_FETCH_FAILED: &str = "Failed to retrieve website data";
/// `about_info` when no website was supplied.
pub const NO_WEBSITE: &str = "N/A";

/// Model identifiers accepted by the report endpoints, as (label, id).
pub const SUPPORTED_MODELS: &[(&str, &str)] = &[
    ("LLaMA 3 70B", "llama3-70b-8192"),
    ("LLaMA 3 8B", "llama3-8b-8192"),
    ("LLaMA 3.3 70B Versatile", "llama-3.3-70b-versatile"),
    ("Mistral Saba 24B", "mistral-saba-24b"),
];

pub fn is_supported_model(model: &str) -> bool {
    SUPPORTED_MODELS.iter().any(|(_, id)| *id == model)
}

// ============ Canonical Report ============

/// A named owner with an ownership share.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Owner {
    pub name: String,
    #[serde(default = "unknown_ownership")]
    pub ownership_percentage: String,
    /// Role on the company website; only set for owners derived from leadership data
    /// or when the model supplies one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

fn unknown_ownership() -> String {
    UNKNOWN_OWNERSHIP.to_string()
}

impl Owner {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ownership_percentage: unknown_ownership(),
            title: None,
        }
    }
}

/// One entry of `beneficial_owners`.
///
/// Models return either `{name, ownership_percentage}` objects or bare names,
/// and both shapes are kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BeneficialOwner {
    Detailed(Owner),
    Named(String),
}

impl BeneficialOwner {
    pub fn name(&self) -> &str {
        match self {
            BeneficialOwner::Detailed(owner) => &owner.name,
            BeneficialOwner::Named(name) => name,
        }
    }

    /// Single-cell rendering used by the flat report store.
    pub fn flatten(&self) -> String {
        match self {
            BeneficialOwner::Detailed(owner) => {
                format!("{} ({})", owner.name, owner.ownership_percentage)
            }
            BeneficialOwner::Named(name) => name.clone(),
        }
    }
}

/// The schema-conformant KYB record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyReport {
    pub company_name: String,
    pub registration_number: String,
    pub incorporation_date: String,
    pub beneficial_owners: Vec<BeneficialOwner>,
    pub financial_summary: BTreeMap<String, String>,
    pub risk_indicators: Vec<String>,
}

impl CompanyReport {
    /// Record with every data point set to the sentinel.
    pub fn unavailable(company_name: impl Into<String>) -> Self {
        let mut financial_summary = BTreeMap::new();
        financial_summary.insert("details".to_string(), NOT_PUBLICLY_AVAILABLE.to_string());

        Self {
            company_name: company_name.into(),
            registration_number: NOT_PUBLICLY_AVAILABLE.to_string(),
            incorporation_date: NOT_PUBLICLY_AVAILABLE.to_string(),
            beneficial_owners: Vec::new(),
            financial_summary,
            risk_indicators: Vec::new(),
        }
    }
}

// ============ Website Enrichment ============

/// A person listed in a team or leadership section of the company website.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Leader {
    pub name: String,
    #[serde(default)]
    pub title: String,
}

/// A scraped value, or the sentinel text the scraper returns when nothing was found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scraped<T> {
    Found(T),
    Missing(String),
}

impl<T> Scraped<T> {
    pub fn found(&self) -> Option<&T> {
        match self {
            Scraped::Found(value) => Some(value),
            Scraped::Missing(_) => None,
        }
    }
}

/// Best-effort data pulled from the company's own website.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichmentData {
    pub about_info: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leadership_info: Option<Scraped<Vec<Leader>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_info: Option<Scraped<BTreeMap<String, String>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub social_media: Option<Scraped<BTreeMap<String, String>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub potential_risks: Option<Scraped<Vec<String>>>,
}

impl EnrichmentData {
    /// Record carrying only an `about_info` message, used when scraping could not run.
    pub fn degraded(about_info: impl Into<String>) -> Self {
        Self {
            about_info: about_info.into(),
            leadership_info: None,
            contact_info: None,
            social_media: None,
            potential_risks: None,
        }
    }
}

/// Placeholder for news-based risk screening.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewsData {
    pub news_search_performed: bool,
    pub note: String,
}

impl NewsData {
    pub fn placeholder() -> Self {
        Self {
            news_search_performed: true,
            note: "This is a placeholder for news risk analysis. In production, connect to a news API."
                .to_string(),
        }
    }
}

/// The full exported profile: canonical record plus supporting data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KybProfile {
    #[serde(flatten)]
    pub report: CompanyReport,
    /// Unparsable model output, kept for operator inspection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web_data: Option<EnrichmentData>,
    pub news_data: NewsData,
    pub model: String,
    pub generated_at: DateTime<Utc>,
}

// ============ API Models ============

/// Request body for a single report.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportRequest {
    #[serde(default)]
    pub company_name: String,
    #[serde(default)]
    pub company_website: Option<String>,
    #[serde(default)]
    pub custom_instructions: Option<String>,
    /// Overrides the configured default model.
    #[serde(default)]
    pub model: Option<String>,
    /// Save to the report store and export directory (default true).
    #[serde(default = "default_persist")]
    pub persist: bool,
}

fn default_persist() -> bool {
    true
}

impl ReportRequest {
    pub fn for_company(company_name: impl Into<String>, company_website: Option<String>) -> Self {
        Self {
            company_name: company_name.into(),
            company_website,
            persist: true,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchReportRequest {
    pub companies: Vec<ReportRequest>,
    /// Applied to every company that does not name its own model.
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReportResponse {
    pub reports: Vec<KybProfile>,
    /// Entries whose store row or export could not be written; their reports are still returned.
    pub persistence_errors: Vec<PersistenceFailure>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PersistenceFailure {
    /// Position of the entry in the request's `companies`.
    pub index: usize,
    pub company_name: String,
    pub error: String,
}

/// A row of the flat report store; every field is a flattened string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredReport {
    pub company_name: String,
    pub registration_number: String,
    pub incorporation_date: String,
    pub beneficial_owners: String,
    pub financial_summary: String,
    pub risk_indicators: String,
    pub last_updated: String,
}

/// A row of the usage log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub api_key_fingerprint: String,
    pub input_type: String,
    pub input_text: String,
    pub timestamp: String,
}

/// An exported report file, as listed in the history view.
#[derive(Debug, Clone, Serialize)]
pub struct ReportFileInfo {
    pub file_name: String,
    pub size_bytes: u64,
    pub modified: DateTime<Utc>,
}
