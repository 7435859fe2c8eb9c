//! KYB Report API Library
//!
//! This library turns a company name (and optionally its website) into a
//! schema-conformant Know Your Business profile: an LLM drafts the report, the
//! normalizer coerces whatever comes back into the canonical record, and
//! data scraped from the company website fills the gaps.
//!
//! # Modules
//!
//! - `api`: API definitions.
//! - `core`: Core business logic.
//! - `integrations`: External service integrations.
//! - `config`: Configuration management.
//! - `enrichment`: Merging website data into a report.
//! - `errors`: Error handling types.
//! - `export`: JSON report files.
//! - `handlers`: HTTP request handlers.
//! - `llm_client`: Groq chat completions client.
//! - `models`: Core data models.
//! - `normalizer`: Coercion of model output into the canonical record.
//! - `prompt`: Instruction text for the completion call.
//! - `report_store`: CSV report store and usage log.
//! - `services`: The report pipeline.
//! - `website_scraper`: Company website heuristics.

pub mod api;
pub mod core;
pub mod integrations;

// Re-export primary modules for shared use in tests and other binaries
pub mod config;
pub mod enrichment;
pub mod errors;
pub mod export;
pub mod handlers;
pub mod llm_client;
pub mod models;
pub mod normalizer;
pub mod prompt;
pub mod report_store;
pub mod services;
pub mod website_scraper;
