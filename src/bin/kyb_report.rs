//! Generates one KYB report from the command line.
//!
//! Usage: `kyb_report <company name> [website]`
//!
//! Reads the same environment as the server, prints the profile as JSON and
//! saves it to the report directory and the CSV store.

use rust_kyb_api::config::Config;
use rust_kyb_api::export::ReportExporter;
use rust_kyb_api::llm_client::GroqClient;
use rust_kyb_api::models::ReportRequest;
use rust_kyb_api::report_store::ReportStore;
use rust_kyb_api::services::ReportService;
use rust_kyb_api::website_scraper::HtmlScraper;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so stdout stays valid JSON
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rust_kyb_api=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut args = std::env::args().skip(1);
    let Some(company_name) = args.next().filter(|name| !name.trim().is_empty()) else {
        anyhow::bail!("Usage: kyb_report <company name> [website]");
    };
    let website = args.next();

    let config = Config::from_env()?;
    let service = ReportService::new(
        Arc::new(GroqClient::from_config(&config)?),
        Arc::new(HtmlScraper::new()?),
        config.default_model.clone(),
    );

    let profile = service
        .generate_report(&ReportRequest::for_company(company_name, website))
        .await?;

    println!("{}", serde_json::to_string_pretty(&profile)?);

    let exporter = ReportExporter::new(&config.reports_dir);
    let store = ReportStore::new(&config.store_path);

    let file_name = exporter.save(&profile).await?;
    store.upsert(&profile.report).await?;
    eprintln!(
        "Saved {} and updated {}",
        exporter.dir().join(&file_name).display(),
        store.path().display()
    );

    Ok(())
}
