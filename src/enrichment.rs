//! Folds scraped website data into a normalized report.
//!
//! Scraped data only fills gaps:
//! 1. Leadership names become owners when the model named none
//! 2. Keyword risk hits are appended to the model's risk list
//!
//! Sentinel or missing enrichment fields are skipped.

use crate::models::{BeneficialOwner, CompanyReport, EnrichmentData, Owner, UNKNOWN_OWNERSHIP};

/// What a merge changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeSummary {
    pub owners_from_leadership: usize,
    pub risks_appended: usize,
}

impl MergeSummary {
    pub fn changed(&self) -> bool {
        self.owners_from_leadership > 0 || self.risks_appended > 0
    }
}

/// Merge `enrichment` into `report`. Call once per report, right after normalization.
pub fn merge_enrichment(report: &mut CompanyReport, enrichment: &EnrichmentData) -> MergeSummary {
    let mut summary = MergeSummary::default();

    if report.beneficial_owners.is_empty() {
        if let Some(leaders) = enrichment
            .leadership_info
            .as_ref()
            .and_then(|info| info.found())
            .filter(|leaders| !leaders.is_empty())
        {
            report.beneficial_owners = leaders
                .iter()
                .map(|leader| {
                    BeneficialOwner::Detailed(Owner {
                        name: leader.name.clone(),
                        ownership_percentage: UNKNOWN_OWNERSHIP.to_string(),
                        title: Some(leader.title.trim().to_string())
                            .filter(|title| !title.is_empty()),
                    })
                })
                .collect();
            summary.owners_from_leadership = report.beneficial_owners.len();
        }
    }

    if let Some(risks) = enrichment
        .potential_risks
        .as_ref()
        .and_then(|risks| risks.found())
    {
        // Appending to an empty list is the same as replacing it.
        report.risk_indicators.extend(risks.iter().cloned());
        summary.risks_appended = risks.len();
    }

    if summary.changed() {
        tracing::debug!(
            "Enriched '{}': {} owner(s) from leadership, {} risk mention(s) appended",
            report.company_name,
            summary.owners_from_leadership,
            summary.risks_appended
        );
    }

    summary
}
