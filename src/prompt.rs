//! Instruction text for the KYB completion call.

use crate::errors::AppError;
use crate::models::NOT_PUBLICLY_AVAILABLE;

/// Inputs that shape the user instruction.
#[derive(Debug, Clone, Default)]
pub struct PromptRequest {
    pub company_name: String,
    pub company_website: Option<String>,
    pub custom_instructions: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptPair {
    pub system: String,
    pub user: String,
}

/// Fixes the six-field output schema and forbids prose around the JSON.
pub fn build_system_prompt() -> String {
    format!(
        "You are a seasoned business analyst with expertise in KYB due diligence. \
         When given a company name and website, gather and summarize the following details: \
         registration number, incorporation date, beneficial owners, key financial metrics, \
         and any public risk indicators. Output ONLY a valid JSON object with keys: \
         company_name, registration_number, incorporation_date, beneficial_owners, \
         financial_summary, risk_indicators. \
         For beneficial_owners, provide an array of objects with name and ownership_percentage \
         when available. \
         For risk_indicators, provide an array of specific risk factors identified. \
         For financial_summary, provide an object of available metrics like revenue, funding \
         or valuation. \
         If any data is missing, use '{sentinel}' as the value. \
         DO NOT include any explanatory text outside the JSON object. \
         Ensure the JSON is properly formatted with correct commas and double quotes.",
        sentinel = NOT_PUBLICLY_AVAILABLE
    )
}

/// Builds the user instruction.
///
/// Falls back to instructions-only mode when neither a name nor a website is given.
/// Fails when there is nothing to ask about at all.
pub fn build_user_prompt(request: &PromptRequest) -> Result<String, AppError> {
    let name = request.company_name.trim();
    let website = non_blank(request.company_website.as_deref());
    let instructions = non_blank(request.custom_instructions.as_deref());

    if name.is_empty() && website.is_none() {
        return match instructions {
            Some(instructions) => Ok(instructions.to_string()),
            None => Err(AppError::BadRequest(
                "A company name or custom instructions are required".to_string(),
            )),
        };
    }

    let subject = if name.is_empty() {
        "the company"
    } else {
        name
    };

    let mut prompt = format!(
        "Company Name: {}\nWebsite: {}\n\n\
         Please research {} and provide all available information in JSON format. \
         Pay special attention to beneficial owners (with their ownership percentages if available) \
         and any risk indicators such as regulatory issues, legal disputes, negative news, \
         or financial concerns. If specific data points are not publicly available, \
         use '{}' as the value, but try to find as much information \
         as possible from public sources.",
        if name.is_empty() { "N/A" } else { name },
        website.unwrap_or("N/A"),
        subject,
        NOT_PUBLICLY_AVAILABLE
    );

    if let Some(instructions) = instructions {
        prompt.push_str("\n\nADDITIONAL REQUIREMENTS:\n");
        prompt.push_str(instructions);
    }

    Ok(prompt)
}

pub fn build_prompts(request: &PromptRequest) -> Result<PromptPair, AppError> {
    Ok(PromptPair {
        system: build_system_prompt(),
        user: build_user_prompt(request)?,
    })
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
