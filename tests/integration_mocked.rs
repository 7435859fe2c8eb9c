/// Integration tests with mocked external APIs
/// Tests the complete report workflow without hitting the LLM provider or real websites
use rust_kyb_api::errors::AppError;
use rust_kyb_api::llm_client::{
    complete_or_empty, CompletionRequest, CompletionService, GroqClient,
};
use rust_kyb_api::models::{ReportRequest, Scraped, WEBSITE_FETCH_FAILED};
use rust_kyb_api::prompt::PromptPair;
use rust_kyb_api::services::ReportService;
use rust_kyb_api::website_scraper::{CachedScraper, HtmlScraper, WebsiteScraper};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const COMPANY_PAGE: &str = r#"<html>
<head><meta name="description" content="Floor care robots."></head>
<body>
  <div class="about-section"><p>Acme builds floor care robots.</p></div>
  <div class="management">
    <h3>Wile Coyote</h3><p>Chief Executive Officer</p>
  </div>
  <p>Reach us at hello@acme.test. The company recently settled an investigation into pricing.</p>
  <a href="https://www.linkedin.com/company/acme">LinkedIn</a>
</body>
</html>"#;

/// Helper function to create a client pointed at the mock server
fn groq_client(server: &MockServer) -> GroqClient {
    GroqClient::new(server.uri(), "test_key".to_string(), Duration::from_secs(5)).unwrap()
}

fn completion_request() -> CompletionRequest {
    CompletionRequest::new(
        "llama-3.3-70b-versatile",
        PromptPair {
            system: "system".to_string(),
            user: "Company Name: Acme Corp".to_string(),
        },
    )
}

fn chat_response(content: &str) -> serde_json::Value {
    serde_json::json!({
        "id": "chatcmpl-test",
        "object": "chat.completion",
        "choices": [
            {"index": 0, "message": {"role": "assistant", "content": content}, "finish_reason": "stop"}
        ]
    })
}

#[tokio::test]
async fn test_groq_successful_completion() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer test_key"))
        .and(body_partial_json(serde_json::json!({
            "model": "llama-3.3-70b-versatile",
            "temperature": 0.1,
            "max_tokens": 1024
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_response("{\"a\": 1}")))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = groq_client(&mock_server);
    let text = client.complete(&completion_request()).await.unwrap();

    assert_eq!(text, "{\"a\": 1}");
}

#[tokio::test]
async fn test_groq_error_status_is_external_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
        .mount(&mock_server)
        .await;

    let client = groq_client(&mock_server);
    let err = client.complete(&completion_request()).await.unwrap_err();

    match err {
        AppError::ExternalApiError(msg) => assert!(msg.contains("429")),
        other => panic!("unexpected error: {}", other),
    }
}

#[tokio::test]
async fn test_groq_empty_choices_degrade_to_empty_text() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"choices": []})))
        .mount(&mock_server)
        .await;

    let client = groq_client(&mock_server);
    assert!(client.complete(&completion_request()).await.is_err());
    assert_eq!(complete_or_empty(&client, &completion_request()).await, "");
}

#[tokio::test]
async fn test_scraper_extracts_company_page() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(COMPANY_PAGE))
        .mount(&mock_server)
        .await;

    let scraper = HtmlScraper::new().unwrap();
    let data = scraper.scrape(&mock_server.uri()).await;

    assert_eq!(data.about_info, "Acme builds floor care robots.");

    let leaders = data.leadership_info.unwrap();
    let leaders = leaders.found().unwrap();
    assert_eq!(leaders[0].name, "Wile Coyote");
    assert_eq!(leaders[0].title, "Chief Executive Officer");

    let contact = data.contact_info.unwrap();
    assert_eq!(contact.found().unwrap()["email"], "hello@acme.test");

    let social = data.social_media.unwrap();
    assert_eq!(
        social.found().unwrap()["linkedin"],
        "https://www.linkedin.com/company/acme"
    );

    let risks = data.potential_risks.unwrap();
    let risks = risks.found().unwrap();
    assert!(risks.iter().any(|r| r.starts_with("Potential investigation mention:")));
}

#[tokio::test]
async fn test_scraper_failure_returns_degraded_record() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let scraper = HtmlScraper::new().unwrap();
    let data = scraper.scrape(&mock_server.uri()).await;

    assert_eq!(data.about_info, WEBSITE_FETCH_FAILED);
    assert!(data.leadership_info.is_none());
    assert!(data.potential_risks.is_none());
}

#[tokio::test]
async fn test_scraper_ignores_text_past_page_cap() {
    let mock_server = MockServer::start().await;

    let padding = "x".repeat(4096);
    let page = format!(
        "<html><body><p>Acme builds floor care robots.</p><p>{}</p>\
         <p>Acme is under investigation.</p></body></html>",
        padding
    );
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(page))
        .mount(&mock_server)
        .await;

    let capped = HtmlScraper::new().unwrap().with_max_page_bytes(1024);
    let data = capped.scrape(&mock_server.uri()).await;
    assert!(data.potential_risks.unwrap().found().is_none());

    let uncapped = HtmlScraper::new().unwrap();
    let data = uncapped.scrape(&mock_server.uri()).await;
    assert!(data.potential_risks.unwrap().found().is_some());
}

#[tokio::test]
async fn test_cached_scraper_fetches_once() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(COMPANY_PAGE))
        .expect(1)
        .mount(&mock_server)
        .await;

    let scraper = CachedScraper::new(HtmlScraper::new().unwrap(), Duration::from_secs(60), 10);
    let first = scraper.scrape(&mock_server.uri()).await;
    let second = scraper.scrape(&mock_server.uri()).await;

    assert_eq!(first, second);
}

#[tokio::test]
async fn test_full_pipeline_with_mocked_services() {
    let llm_server = MockServer::start().await;
    let site_server = MockServer::start().await;

    let completion = "Here is the report:\n```json\n{\"registration_number\": \"12345\", \
                      \"beneficial_owners\": \"Not publicly available\", \
                      \"risk_indicators\": \"Lawsuit 2022\"}\n```";
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_response(completion)))
        .mount(&llm_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(COMPANY_PAGE))
        .mount(&site_server)
        .await;

    let service = ReportService::new(
        Arc::new(groq_client(&llm_server)),
        Arc::new(HtmlScraper::new().unwrap()),
        "llama-3.3-70b-versatile",
    );
    let profile = service
        .generate_report(&ReportRequest::for_company("Acme Corp", Some(site_server.uri())))
        .await
        .unwrap();

    assert_eq!(profile.report.company_name, "Acme Corp");
    assert_eq!(profile.report.registration_number, "12345");
    // Owners came from the scraped management section
    assert_eq!(profile.report.beneficial_owners.len(), 1);
    assert_eq!(profile.report.beneficial_owners[0].name(), "Wile Coyote");
    // Model risks first, scraped risks after
    assert_eq!(profile.report.risk_indicators[0], "Lawsuit 2022");
    assert!(profile.report.risk_indicators.len() > 1);
    assert!(matches!(
        profile.web_data.and_then(|d| d.leadership_info),
        Some(Scraped::Found(_))
    ));
    assert_eq!(profile.model, "llama-3.3-70b-versatile");
}

#[tokio::test]
async fn test_provider_outage_still_yields_report() {
    let llm_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&llm_server)
        .await;

    let service = ReportService::new(
        Arc::new(groq_client(&llm_server)),
        Arc::new(HtmlScraper::new().unwrap()),
        "llama-3.3-70b-versatile",
    );
    let profile = service
        .generate_report(&ReportRequest::for_company("Acme Corp", None))
        .await
        .unwrap();

    assert_eq!(profile.report.company_name, "Acme Corp");
    assert_eq!(profile.raw_data.as_deref(), Some(""));
    assert!(profile.report.beneficial_owners.is_empty());
}
