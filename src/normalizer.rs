//! Turns raw model output into a schema-conformant [`CompanyReport`].
//!
//! Model text is untrusted: it may wrap the JSON in prose or markdown fences,
//! use single quotes, leave trailing commas, or return a string where a list
//! is expected. Extraction and repair recover the JSON object; one coercion
//! function per field then maps whatever shape arrived onto the canonical type.
//! Nothing in this module fails hard: unparsable output yields the all-sentinel
//! record together with a [`NormalizationError`].

use crate::errors::NormalizationError;
use crate::models::{
    BeneficialOwner, CompanyReport, Owner, NOT_PUBLICLY_AVAILABLE, UNKNOWN_OWNERSHIP,
};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

static JSON_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```json\s*(.*?)\s*```").expect("fence pattern is valid"));

static TRAILING_COMMA: Lazy<Regex> =
    Lazy::new(|| Regex::new(r",\s*([}\]])").expect("trailing comma pattern is valid"));

/// Result of normalizing one completion.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub report: CompanyReport,
    /// Original text, set only when it could not be parsed.
    pub raw_data: Option<String>,
    pub error: Option<NormalizationError>,
}

/// Picks the text most likely to hold the JSON object:
/// a ```` ```json ```` fenced block, else the first `{` through the last `}`,
/// else the whole input.
pub fn extract_json_candidate(raw: &str) -> &str {
    if let Some(inner) = JSON_FENCE.captures(raw).and_then(|c| c.get(1)) {
        return inner.as_str();
    }

    match (raw.find('{'), raw.rfind('}')) {
        (Some(start), Some(end)) if end > start => &raw[start..=end],
        _ => raw,
    }
}

/// Fixes the syntax slips models commonly make: leftover fence markers,
/// single-quoted strings and trailing commas before `}` or `]`.
pub fn repair_json(candidate: &str) -> String {
    let mut text = candidate.trim();
    if let Some(rest) = text.strip_prefix("```json") {
        text = rest;
    } else if let Some(rest) = text.strip_prefix("```") {
        text = rest;
    }
    if let Some(rest) = text.strip_suffix("```") {
        text = rest;
    }

    let quoted = text.trim().replace('\'', "\"");
    TRAILING_COMMA.replace_all(&quoted, "$1").into_owned()
}

/// Parses the candidate as a JSON object.
///
/// The verbatim text is tried before the repaired text, so well-formed JSON
/// containing apostrophes survives intact.
pub fn parse_candidate(candidate: &str) -> Result<Map<String, Value>, NormalizationError> {
    let attempts = [candidate.trim().to_string(), repair_json(candidate)];
    let mut last_error = String::from("empty response");

    for attempt in attempts.iter() {
        if attempt.is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(attempt) {
            Ok(Value::Object(map)) => return Ok(map),
            Ok(other) => {
                last_error = format!("expected a JSON object, found {}", value_kind(&other));
            }
            Err(e) => last_error = e.to_string(),
        }
    }

    Err(NormalizationError {
        message: last_error,
        raw_len: candidate.len(),
    })
}

/// Normalizes raw completion text for the company the caller asked about.
pub fn normalize_report(raw: &str, company_name: &str) -> Normalized {
    let candidate = extract_json_candidate(raw);

    match parse_candidate(candidate) {
        Ok(map) => Normalized {
            report: normalize_object(&map, company_name),
            raw_data: None,
            error: None,
        },
        Err(mut error) => {
            error.raw_len = raw.len();
            tracing::warn!("Falling back to sentinel report for '{}': {}", company_name, error);
            Normalized {
                report: CompanyReport::unavailable(company_name),
                raw_data: Some(raw.to_string()),
                error: Some(error),
            }
        }
    }
}

/// Applies the field coercions to an already parsed value.
pub fn normalize_value(value: &Value, company_name: &str) -> CompanyReport {
    match value {
        Value::Object(map) => normalize_object(map, company_name),
        _ => CompanyReport::unavailable(company_name),
    }
}

fn normalize_object(map: &Map<String, Value>, company_name: &str) -> CompanyReport {
    CompanyReport {
        company_name: company_name.to_string(),
        registration_number: coerce_text_field(map.get("registration_number")),
        incorporation_date: coerce_text_field(map.get("incorporation_date")),
        beneficial_owners: coerce_beneficial_owners(map.get("beneficial_owners")),
        financial_summary: coerce_financial_summary(map.get("financial_summary")),
        risk_indicators: coerce_risk_indicators(map.get("risk_indicators")),
    }
}

impl CompanyReport {
    /// Re-applies every coercion; a no-op for records produced by this module.
    pub fn renormalized(&self) -> CompanyReport {
        match serde_json::to_value(self) {
            Ok(value) => normalize_value(&value, &self.company_name),
            Err(_) => self.clone(),
        }
    }
}

// ============ Field coercions ============

/// Registration number, incorporation date and other free-text scalars.
/// Blank, null and sentinel values such as `"N/A"` become [`NOT_PUBLICLY_AVAILABLE`].
pub fn coerce_text_field(value: Option<&Value>) -> String {
    value
        .map(text_or_sentinel)
        .unwrap_or_else(|| NOT_PUBLICLY_AVAILABLE.to_string())
}

pub fn coerce_beneficial_owners(value: Option<&Value>) -> Vec<BeneficialOwner> {
    match value {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::String(s)) => {
            let name = s.trim();
            if name.is_empty() || is_sentinel(name) {
                Vec::new()
            } else {
                vec![BeneficialOwner::Detailed(Owner::named(name))]
            }
        }
        Some(Value::Array(items)) => items.iter().filter_map(coerce_owner_entry).collect(),
        Some(object @ Value::Object(_)) => coerce_owner_entry(object).into_iter().collect(),
        Some(other) => value_to_text(other)
            .map(|name| vec![BeneficialOwner::Detailed(Owner::named(name))])
            .unwrap_or_default(),
    }
}

fn coerce_owner_entry(value: &Value) -> Option<BeneficialOwner> {
    match value {
        Value::Null => None,
        Value::Object(map) => {
            let name = map.get("name").and_then(value_to_text);
            let percentage = map.get("ownership_percentage").and_then(value_to_text);
            if name.is_none() && percentage.is_none() {
                return None;
            }
            Some(BeneficialOwner::Detailed(Owner {
                name: name.unwrap_or_else(|| NOT_PUBLICLY_AVAILABLE.to_string()),
                ownership_percentage: percentage.unwrap_or_else(|| UNKNOWN_OWNERSHIP.to_string()),
                title: map.get("title").and_then(value_to_text),
            }))
        }
        other => value_to_text(other)
            .filter(|name| !is_sentinel(name))
            .map(BeneficialOwner::Named),
    }
}

pub fn coerce_risk_indicators(value: Option<&Value>) -> Vec<String> {
    match value {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::String(s)) => {
            if is_sentinel(s.trim()) {
                return Vec::new();
            }
            s.split(',')
                .map(str::trim)
                .filter(|segment| !segment.is_empty() && !is_sentinel(segment))
                .map(String::from)
                .collect()
        }
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(value_to_text)
            .filter(|risk| !is_sentinel(risk))
            .collect(),
        Some(Value::Object(map)) => map
            .iter()
            .filter_map(|(key, v)| value_to_text(v).map(|text| format!("{}: {}", key, text)))
            .collect(),
        Some(other) => value_to_text(other).into_iter().collect(),
    }
}

pub fn coerce_financial_summary(value: Option<&Value>) -> BTreeMap<String, String> {
    let mut summary = BTreeMap::new();

    match value {
        Some(Value::Object(map)) if !map.is_empty() => {
            for (key, v) in map {
                summary.insert(key.clone(), text_or_sentinel(v));
            }
        }
        Some(other) => {
            summary.insert("details".to_string(), text_or_sentinel(other));
        }
        None => {
            summary.insert("details".to_string(), NOT_PUBLICLY_AVAILABLE.to_string());
        }
    }

    summary
}

// ============ Helpers ============

/// Text of a scalar, or compact JSON of a container. `None` for null and blank strings.
fn value_to_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(items) if items.is_empty() => None,
        Value::Object(map) if map.is_empty() => None,
        container => serde_json::to_string(container).ok(),
    }
}

fn text_or_sentinel(value: &Value) -> String {
    value_to_text(value)
        .filter(|text| !is_sentinel(text))
        .unwrap_or_else(|| NOT_PUBLICLY_AVAILABLE.to_string())
}

fn is_sentinel(text: &str) -> bool {
    text.eq_ignore_ascii_case(NOT_PUBLICLY_AVAILABLE) || text.eq_ignore_ascii_case("N/A")
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
