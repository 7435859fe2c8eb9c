use std::path::PathBuf;

pub const DEFAULT_GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const DEFAULT_MODEL: &str = "llama-3.3-70b-versatile";

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub groq_api_key: String,
    pub groq_base_url: String,
    pub default_model: String,
    pub llm_timeout_secs: u64,
    pub reports_dir: PathBuf,
    pub store_path: PathBuf,
    pub usage_log_path: PathBuf,
    pub admin_user: Option<String>,
    pub admin_password: Option<String>,
    pub batch_concurrency: usize,
    pub max_batch_size: usize,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?,
            groq_api_key: std::env::var("GROQ_API_KEY")
                .map_err(|_| anyhow::anyhow!("GROQ_API_KEY environment variable required"))
                .and_then(|key| {
                    if key.trim().is_empty() {
                        anyhow::bail!("GROQ_API_KEY cannot be empty");
                    }
                    Ok(key)
                })?,
            groq_base_url: {
                let url = std::env::var("GROQ_BASE_URL")
                    .ok()
                    .filter(|s| !s.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_GROQ_BASE_URL.to_string());
                if !url.starts_with("http://") && !url.starts_with("https://") {
                    anyhow::bail!("GROQ_BASE_URL must start with http:// or https://");
                }
                url.trim_end_matches('/').to_string()
            },
            default_model: std::env::var("KYB_MODEL")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            llm_timeout_secs: std::env::var("KYB_LLM_TIMEOUT_SECS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("KYB_LLM_TIMEOUT_SECS must be a number of seconds"))?,
            reports_dir: std::env::var("KYB_REPORTS_DIR")
                .unwrap_or_else(|_| "generated_reports".to_string())
                .into(),
            store_path: std::env::var("KYB_STORE_PATH")
                .unwrap_or_else(|_| "company_details.csv".to_string())
                .into(),
            usage_log_path: std::env::var("KYB_USAGE_LOG_PATH")
                .unwrap_or_else(|_| "user_output.csv".to_string())
                .into(),
            admin_user: std::env::var("KYB_ADMIN_USER")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            admin_password: std::env::var("KYB_ADMIN_PASSWORD")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            batch_concurrency: std::env::var("KYB_BATCH_CONCURRENCY")
                .unwrap_or_else(|_| "4".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("KYB_BATCH_CONCURRENCY must be a positive number"))
                .and_then(|n: usize| {
                    if n == 0 {
                        anyhow::bail!("KYB_BATCH_CONCURRENCY must be at least 1");
                    }
                    Ok(n)
                })?,
            max_batch_size: std::env::var("KYB_MAX_BATCH_SIZE")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("KYB_MAX_BATCH_SIZE must be a positive number"))
                .and_then(|n: usize| {
                    if n == 0 {
                        anyhow::bail!("KYB_MAX_BATCH_SIZE must be at least 1");
                    }
                    Ok(n)
                })?,
        };

        if !crate::models::is_supported_model(&config.default_model) {
            tracing::warn!(
                "KYB_MODEL '{}' is not in the supported model list",
                config.default_model
            );
        }

        // Log successful configuration load (without sensitive values)
        tracing::info!("Configuration loaded successfully");
        tracing::debug!("Groq Base URL: {}", config.groq_base_url);
        tracing::debug!("Default model: {}", config.default_model);
        tracing::debug!("Reports directory: {}", config.reports_dir.display());
        tracing::debug!("Report store: {}", config.store_path.display());
        if config.admin_user.is_none() || config.admin_password.is_none() {
            tracing::info!("Admin credentials not configured; admin view disabled");
        }
        tracing::debug!("Server Port: {}", config.port);

        Ok(config)
    }
}
