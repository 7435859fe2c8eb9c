use crate::enrichment::merge_enrichment;
use crate::errors::AppError;
use crate::llm_client::{complete_or_empty, CompletionRequest, CompletionService};
use crate::models::{is_supported_model, KybProfile, NewsData, ReportRequest, SUPPORTED_MODELS};
use crate::normalizer::normalize_report;
use crate::prompt::{build_prompts, PromptRequest};
use crate::website_scraper::WebsiteScraper;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Runs the report pipeline: prompt, completion, normalization, scrape, merge.
///
/// Holds no per-run state, so one instance serves every request.
#[derive(Clone)]
pub struct ReportService {
    llm: Arc<dyn CompletionService>,
    scraper: Arc<dyn WebsiteScraper>,
    default_model: String,
    batch_concurrency: usize,
}

impl ReportService {
    pub fn new(
        llm: Arc<dyn CompletionService>,
        scraper: Arc<dyn WebsiteScraper>,
        default_model: impl Into<String>,
    ) -> Self {
        Self {
            llm,
            scraper,
            default_model: default_model.into(),
            batch_concurrency: 4,
        }
    }

    /// Caps how many companies of a batch run at once (minimum 1).
    pub fn with_batch_concurrency(mut self, limit: usize) -> Self {
        self.batch_concurrency = limit.max(1);
        self
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    /// Generate one profile.
    ///
    /// Only invalid input fails; provider and website failures degrade into
    /// sentinel values inside the profile.
    pub async fn generate_report(&self, request: &ReportRequest) -> Result<KybProfile, AppError> {
        let model = self.resolve_model(request.model.as_deref())?;
        let inputs = prompt_request(request);
        let prompts = build_prompts(&inputs)?;
        let company_name = inputs.company_name;
        let website = inputs.company_website.as_deref();

        tracing::info!("Generating KYB report for '{}' with {}", company_name, model);

        let completion = complete_or_empty(
            self.llm.as_ref(),
            &CompletionRequest::new(model.clone(), prompts),
        )
        .await;

        let mut normalized = normalize_report(&completion, &company_name);
        if let Some(err) = &normalized.error {
            tracing::warn!("Report for '{}' fell back to sentinels: {}", company_name, err);
        }

        let web_data = match website {
            Some(site) => {
                let data = self.scraper.scrape(site).await;
                merge_enrichment(&mut normalized.report, &data);
                Some(data)
            }
            None => None,
        };

        tracing::info!(
            "Report for '{}' ready: {} owner(s), {} risk indicator(s)",
            normalized.report.company_name,
            normalized.report.beneficial_owners.len(),
            normalized.report.risk_indicators.len()
        );

        Ok(KybProfile {
            report: normalized.report,
            raw_data: normalized.raw_data,
            web_data,
            news_data: NewsData::placeholder(),
            model,
            generated_at: Utc::now(),
        })
    }

    /// Generate profiles for several companies, returned in input order.
    ///
    /// Fails on the first invalid request before any completion is made.
    pub async fn generate_batch(
        &self,
        requests: Vec<ReportRequest>,
    ) -> Result<Vec<KybProfile>, AppError> {
        for (index, request) in requests.iter().enumerate() {
            self.resolve_model(request.model.as_deref())
                .and_then(|_| build_prompts(&prompt_request(request)))
                .map_err(|e| AppError::BadRequest(format!("Batch entry {}: {}", index, e)))?;
        }

        tracing::info!(
            "Starting batch of {} report(s), concurrency {}",
            requests.len(),
            self.batch_concurrency
        );

        let semaphore = Arc::new(Semaphore::new(self.batch_concurrency));
        let mut handles = Vec::with_capacity(requests.len());
        for request in requests {
            let service = self.clone();
            let semaphore = Arc::clone(&semaphore);
            handles.push(tokio::spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| AppError::InternalError(format!("Batch limiter closed: {}", e)))?;
                service.generate_report(&request).await
            }));
        }

        let mut profiles = Vec::with_capacity(handles.len());
        for handle in handles {
            let profile = handle
                .await
                .map_err(|e| AppError::InternalError(format!("Batch task failed: {}", e)))??;
            profiles.push(profile);
        }

        Ok(profiles)
    }

    fn resolve_model(&self, requested: Option<&str>) -> Result<String, AppError> {
        let model = requested
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(&self.default_model);

        if is_supported_model(model) {
            return Ok(model.to_string());
        }

        let known: Vec<&str> = SUPPORTED_MODELS.iter().map(|(_, id)| *id).collect();
        Err(AppError::BadRequest(format!(
            "Unsupported model '{}'. Choose one of: {}",
            model,
            known.join(", ")
        )))
    }
}

fn prompt_request(request: &ReportRequest) -> PromptRequest {
    PromptRequest {
        company_name: request.company_name.trim().to_string(),
        company_website: request
            .company_website
            .as_deref()
            .map(str::trim)
            .filter(|w| !w.is_empty())
            .map(str::to_string),
        custom_instructions: request.custom_instructions.clone(),
    }
}
