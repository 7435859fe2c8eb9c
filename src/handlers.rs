use crate::config::Config;
use crate::errors::AppError;
use crate::export::ReportExporter;
use crate::models::*;
use crate::report_store::{ReportStore, UsageLog};
use crate::services::ReportService;
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde_json::json;
use std::sync::Arc;

/// Shared application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Config,
    /// Report pipeline (LLM client plus cached website scraper).
    pub service: ReportService,
    /// Flat per-company store shown in the admin view.
    pub store: ReportStore,
    /// Request log keyed by API key fingerprint.
    pub usage_log: UsageLog,
    /// JSON report files for history and download.
    pub exporter: ReportExporter,
}

/// Health check endpoint.
///
/// Returns the service status and version.
pub async fn health() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "rust-kyb-api",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}

/// POST /api/v1/reports
///
/// Generates one KYB profile. With `persist` (the default) the report is also
/// upserted into the store, exported as JSON and recorded in the usage log.
pub async fn create_report(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ReportRequest>,
) -> Result<Json<KybProfile>, AppError> {
    let profile = state.service.generate_report(&request).await?;

    if request.persist {
        persist_profile(&state, &request, &profile).await?;
    }

    Ok(Json(profile))
}

/// POST /api/v1/reports/batch
///
/// Generates profiles for every listed company, at most `max_batch_size`. A
/// top-level `model` applies to entries that do not name their own. Entries
/// that fail to persist are listed in `persistence_errors`; every report is
/// returned either way.
pub async fn create_batch(
    State(state): State<Arc<AppState>>,
    Json(batch): Json<BatchReportRequest>,
) -> Result<Json<BatchReportResponse>, AppError> {
    if batch.companies.is_empty() {
        return Err(AppError::BadRequest(
            "Batch must list at least one company".to_string(),
        ));
    }
    if batch.companies.len() > state.config.max_batch_size {
        return Err(AppError::BadRequest(format!(
            "Batch lists {} companies; the limit is {}",
            batch.companies.len(),
            state.config.max_batch_size
        )));
    }

    let requests: Vec<ReportRequest> = batch
        .companies
        .into_iter()
        .map(|mut request| {
            if request.model.is_none() {
                request.model = batch.model.clone();
            }
            request
        })
        .collect();

    let reports = state.service.generate_batch(requests.clone()).await?;

    let mut persistence_errors = Vec::new();
    for (index, (request, profile)) in requests.iter().zip(&reports).enumerate() {
        if !request.persist {
            continue;
        }
        if let Err(e) = persist_profile(&state, request, profile).await {
            tracing::warn!("Batch entry {} was not fully persisted: {}", index, e);
            persistence_errors.push(PersistenceFailure {
                index,
                company_name: profile.report.company_name.clone(),
                error: e.to_string(),
            });
        }
    }

    Ok(Json(BatchReportResponse {
        reports,
        persistence_errors,
    }))
}

/// GET /api/v1/reports
///
/// Lists exported report files, newest first.
pub async fn list_reports(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ReportFileInfo>>, AppError> {
    Ok(Json(state.exporter.list().await?))
}

/// GET /api/v1/reports/:file_name
pub async fn get_report(
    State(state): State<Arc<AppState>>,
    Path(file_name): Path<String>,
) -> Result<Json<KybProfile>, AppError> {
    Ok(Json(state.exporter.load(&file_name).await?))
}

/// GET /api/v1/admin/reports
///
/// Returns every store row and the usage log. Requires the `X-Admin-User` and
/// `X-Admin-Password` headers to match the configured credentials.
pub async fn admin_reports(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, AppError> {
    authorize_admin(&state.config, &headers)?;

    let reports = state.store.list().await?;
    let usage = state.usage_log.entries().await?;

    Ok(Json(json!({
        "total": reports.len(),
        "reports": reports,
        "usage": usage,
    })))
}

/// GET /api/v1/models
pub async fn list_models(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let models: Vec<serde_json::Value> = SUPPORTED_MODELS
        .iter()
        .map(|(label, id)| json!({ "id": id, "label": label }))
        .collect();

    Json(json!({
        "default": state.service.default_model(),
        "models": models,
    }))
}

/// Writes the store row, the export and the usage entry.
///
/// Every step is attempted; the first store or export failure is returned
/// after the rest have run. Reports without a company name get no store row.
async fn persist_profile(
    state: &AppState,
    request: &ReportRequest,
    profile: &KybProfile,
) -> Result<(), AppError> {
    let mut first_error = None;

    if profile.report.company_name.trim().is_empty() {
        tracing::debug!("Skipping report store row for a report without a company name");
    } else if let Err(e) = state.store.upsert(&profile.report).await {
        tracing::error!("Failed to update report store: {}", e);
        first_error.get_or_insert(e);
    }

    if let Err(e) = state.exporter.save(profile).await {
        tracing::error!("Failed to export report: {}", e);
        first_error.get_or_insert(e);
    }

    let (input_type, input_text) = if request.company_name.trim().is_empty() {
        (
            "custom_prompt",
            request.custom_instructions.as_deref().unwrap_or_default(),
        )
    } else {
        ("company_name", request.company_name.trim())
    };

    // Usage logging never fails the request.
    if let Err(e) = state
        .usage_log
        .record(&state.config.groq_api_key, input_type, input_text)
        .await
    {
        tracing::error!("Failed to update usage log: {}", e);
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn authorize_admin(config: &Config, headers: &HeaderMap) -> Result<(), AppError> {
    let (Some(user), Some(password)) = (&config.admin_user, &config.admin_password) else {
        return Err(AppError::NotFound("Admin view is not enabled".to_string()));
    };

    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

    if header("x-admin-user") == Some(user.as_str())
        && header("x-admin-password") == Some(password.as_str())
    {
        Ok(())
    } else {
        tracing::warn!("Rejected admin request with invalid credentials");
        Err(AppError::Unauthorized("Invalid admin credentials".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm_client::{CompletionRequest, CompletionService};
    use crate::website_scraper::WebsiteScraper;
    use async_trait::async_trait;
    use axum::http::HeaderValue;
    use std::path::{Path as FsPath, PathBuf};
    use tempfile::TempDir;

    const ACME_COMPLETION: &str = r#"{"company_name": "Acme Corp", "registration_number": "12345"}"#;

    struct FixedCompletion(String);

    #[async_trait]
    impl CompletionService for FixedCompletion {
        async fn complete(&self, _request: &CompletionRequest) -> Result<String, AppError> {
            Ok(self.0.clone())
        }
    }

    struct OfflineScraper;

    #[async_trait]
    impl WebsiteScraper for OfflineScraper {
        async fn scrape(&self, _website: &str) -> EnrichmentData {
            EnrichmentData::degraded("About")
        }
    }

    fn config(admin: bool) -> Config {
        Config {
            port: 3000,
            groq_api_key: "gsk_test".into(),
            groq_base_url: "http://localhost".into(),
            default_model: "llama-3.3-70b-versatile".into(),
            llm_timeout_secs: 5,
            reports_dir: PathBuf::from("reports"),
            store_path: PathBuf::from("store.csv"),
            usage_log_path: PathBuf::from("usage.csv"),
            admin_user: admin.then(|| "admin".to_string()),
            admin_password: admin.then(|| "secret".to_string()),
            batch_concurrency: 2,
            max_batch_size: 3,
        }
    }

    fn state_in(dir: &FsPath, completion: &str) -> Arc<AppState> {
        let mut config = config(false);
        config.reports_dir = dir.join("generated_reports");
        config.store_path = dir.join("company_details.csv");
        config.usage_log_path = dir.join("logs").join("user_output.csv");
        state_with(config, completion)
    }

    fn state_with(config: Config, completion: &str) -> Arc<AppState> {
        let service = ReportService::new(
            Arc::new(FixedCompletion(completion.to_string())),
            Arc::new(OfflineScraper),
            config.default_model.clone(),
        )
        .with_batch_concurrency(config.batch_concurrency);

        Arc::new(AppState {
            store: ReportStore::new(&config.store_path),
            usage_log: UsageLog::new(&config.usage_log_path),
            exporter: ReportExporter::new(&config.reports_dir),
            service,
            config,
        })
    }

    fn batch(names: &[&str]) -> BatchReportRequest {
        BatchReportRequest {
            companies: names
                .iter()
                .map(|n| ReportRequest::for_company(*n, None))
                .collect(),
            model: None,
        }
    }

    fn headers(user: &str, password: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("x-admin-user", HeaderValue::from_str(user).unwrap());
        headers.insert("x-admin-password", HeaderValue::from_str(password).unwrap());
        headers
    }

    #[tokio::test]
    async fn persisted_report_writes_store_export_and_usage() {
        let dir = TempDir::new().unwrap();
        let state = state_in(dir.path(), ACME_COMPLETION);

        let Json(profile) = create_report(
            State(state.clone()),
            Json(ReportRequest::for_company("Acme Corp", None)),
        )
        .await
        .unwrap();
        assert_eq!(profile.report.registration_number, "12345");

        let row = state.store.find("acme corp").await.unwrap().unwrap();
        assert_eq!(row.registration_number, "12345");

        let files = state.exporter.list().await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(state.exporter.load(&files[0].file_name).await.unwrap(), profile);

        let usage = state.usage_log.entries().await.unwrap();
        assert_eq!(usage.len(), 1);
        assert_eq!(usage[0].input_type, "company_name");
        assert_eq!(usage[0].input_text, "Acme Corp");
    }

    #[tokio::test]
    async fn unpersisted_report_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let state = state_in(dir.path(), ACME_COMPLETION);
        let mut request = ReportRequest::for_company("Acme Corp", None);
        request.persist = false;

        create_report(State(state.clone()), Json(request)).await.unwrap();

        assert!(!state.config.store_path.exists());
        assert!(!state.config.reports_dir.exists());
        assert!(!state.config.usage_log_path.exists());
    }

    #[tokio::test]
    async fn custom_prompt_report_logs_instructions_without_store_row() {
        let dir = TempDir::new().unwrap();
        let state = state_in(dir.path(), r#"{"registration_number": "N/A"}"#);
        let request = ReportRequest {
            custom_instructions: Some("List EU fintechs".into()),
            persist: true,
            ..Default::default()
        };

        create_report(State(state.clone()), Json(request)).await.unwrap();

        let usage = state.usage_log.entries().await.unwrap();
        assert_eq!(usage.len(), 1);
        assert_eq!(usage[0].input_type, "custom_prompt");
        assert_eq!(usage[0].input_text, "List EU fintechs");

        assert!(state.store.list().await.unwrap().is_empty());
        assert_eq!(state.exporter.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn batch_returns_reports_when_store_is_unwritable() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("not_a_dir");
        std::fs::write(&blocker, "file").unwrap();

        let mut config = config(false);
        config.reports_dir = dir.path().join("generated_reports");
        config.store_path = blocker.join("company_details.csv");
        config.usage_log_path = dir.path().join("user_output.csv");
        let state = state_with(config, "{}");

        let Json(response) = create_batch(State(state.clone()), Json(batch(&["Alpha", "Beta"])))
            .await
            .unwrap();

        let names: Vec<&str> = response
            .reports
            .iter()
            .map(|p| p.report.company_name.as_str())
            .collect();
        assert_eq!(names, ["Alpha", "Beta"]);

        let failed: Vec<(usize, &str)> = response
            .persistence_errors
            .iter()
            .map(|f| (f.index, f.company_name.as_str()))
            .collect();
        assert_eq!(failed, [(0, "Alpha"), (1, "Beta")]);

        // Exports and usage entries still land for every entry.
        assert_eq!(state.exporter.list().await.unwrap().len(), 2);
        assert_eq!(state.usage_log.entries().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn batch_persists_every_entry() {
        let dir = TempDir::new().unwrap();
        let state = state_in(dir.path(), "{}");

        let Json(response) = create_batch(State(state.clone()), Json(batch(&["Alpha", "Beta"])))
            .await
            .unwrap();

        assert!(response.persistence_errors.is_empty());
        assert_eq!(state.store.list().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn oversized_batch_is_rejected() {
        let dir = TempDir::new().unwrap();
        let state = state_in(dir.path(), "{}");

        let err = create_batch(
            State(state.clone()),
            Json(batch(&["Alpha", "Beta", "Gamma", "Delta"])),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, AppError::BadRequest(_)));
        assert!(!state.config.reports_dir.exists());
    }

    #[tokio::test]
    async fn batch_at_the_limit_is_accepted() {
        let dir = TempDir::new().unwrap();
        let state = state_in(dir.path(), "{}");

        let Json(response) = create_batch(State(state), Json(batch(&["Alpha", "Beta", "Gamma"])))
            .await
            .unwrap();
        assert_eq!(response.reports.len(), 3);
    }

    #[test]
    fn admin_accepts_matching_credentials() {
        assert!(authorize_admin(&config(true), &headers("admin", "secret")).is_ok());
    }

    #[test]
    fn admin_rejects_wrong_password() {
        let err = authorize_admin(&config(true), &headers("admin", "nope")).unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[test]
    fn admin_rejects_missing_headers() {
        let err = authorize_admin(&config(true), &HeaderMap::new()).unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[test]
    fn admin_is_hidden_when_unconfigured() {
        let err = authorize_admin(&config(false), &headers("admin", "secret")).unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
