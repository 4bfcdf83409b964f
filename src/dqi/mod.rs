//! Data Quality Index engine.
//!
//! Everything in this module is a pure function of its inputs: blocker facts and an
//! immutable weight set go in, clean-status and score records come out. Persistence and
//! ordering of the passes live in `commands::recompute`.

use serde::{Deserialize, Serialize};

use crate::model::Severity;

mod facts;
mod gate;
mod rollup;
mod scorer;
mod weights;
#[cfg(test)]
mod tests;

pub use facts::{FactValue, FactsPolicy, FactsSource, RawBlockerFacts, resolve_facts};
pub use gate::evaluate_clean_status;
pub use rollup::{SubjectOutcome, aggregate_site, aggregate_study};
pub use scorer::score_subject;
pub use weights::{WeightEntry, WeightSet};

#[cfg(test)]
pub use facts::FactShapeError;
#[cfg(test)]
pub use scorer::sub_scores;
#[cfg(test)]
pub use weights::{WeightSource, active_weights};

/// The nine operational blocker categories tracked per subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum BlockerCategory {
    #[serde(rename = "sae_discrepancies")]
    SaeDiscrepancies,
    #[serde(rename = "missing_visits")]
    MissingVisits,
    #[serde(rename = "open_queries")]
    OpenQueries,
    #[serde(rename = "missing_pages")]
    MissingPages,
    #[serde(rename = "non_conformant")]
    NonConformant,
    #[serde(rename = "sdv_incomplete")]
    SdvIncomplete,
    #[serde(rename = "pi_signature_incomplete")]
    PiSignatureIncomplete,
    #[serde(rename = "coding_backlog")]
    CodingBacklog,
    #[serde(rename = "edrr_issues")]
    EdrrIssues,
}

impl BlockerCategory {
    pub const ALL: [Self; 9] = [
        Self::SaeDiscrepancies,
        Self::MissingVisits,
        Self::OpenQueries,
        Self::MissingPages,
        Self::NonConformant,
        Self::SdvIncomplete,
        Self::PiSignatureIncomplete,
        Self::CodingBacklog,
        Self::EdrrIssues,
    ];

    /// Registry key used in the weight table.
    pub fn metric_name(self) -> &'static str {
        match self {
            Self::SaeDiscrepancies => "sae_unresolved_count",
            Self::MissingVisits => "missing_visits_days_overdue",
            Self::OpenQueries => "open_queries_count",
            Self::MissingPages => "missing_pages_count",
            Self::NonConformant => "non_conformant_count",
            Self::SdvIncomplete => "sdv_incomplete_pct",
            Self::PiSignatureIncomplete => "pi_signature_incomplete_pct",
            Self::CodingBacklog => "coding_uncoded_count",
            Self::EdrrIssues => "edrr_open_issue_count",
        }
    }

    pub fn from_metric_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|category| category.metric_name() == name)
    }

    pub fn default_weight(self) -> f64 {
        match self {
            Self::SaeDiscrepancies => 0.25,
            Self::MissingVisits | Self::OpenQueries => 0.15,
            Self::MissingPages | Self::NonConformant | Self::SdvIncomplete => 0.10,
            Self::PiSignatureIncomplete | Self::CodingBacklog | Self::EdrrIssues => 0.05,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::SaeDiscrepancies => "Unresolved SAE discrepancies (highest severity blocker)",
            Self::MissingVisits => "Overdue projected visits (operational urgency)",
            Self::OpenQueries => "Open unresolved queries (data cleaning workload)",
            Self::MissingPages => "Missing CRF pages (completeness risk)",
            Self::NonConformant => "Non-conformant data items (compliance risk)",
            Self::SdvIncomplete => "SDV/verification incomplete (monitoring readiness)",
            Self::PiSignatureIncomplete => "PI signatures pending (inspection readiness)",
            Self::CodingBacklog => "Uncoded medical terms (analysis readiness)",
            Self::EdrrIssues => "3rd-party reconciliation open issues",
        }
    }

    pub fn severity(self) -> Severity {
        match self {
            Self::SaeDiscrepancies => Severity::Critical,
            Self::MissingVisits | Self::SdvIncomplete | Self::PiSignatureIncomplete => {
                Severity::High
            }
            _ => Severity::Medium,
        }
    }

    /// Coding backlog and third-party reconciliation are advisory only.
    pub fn is_gating(self) -> bool {
        !matches!(self, Self::CodingBacklog | Self::EdrrIssues)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::SaeDiscrepancies => "sae_discrepancies",
            Self::MissingVisits => "missing_visits",
            Self::OpenQueries => "open_queries",
            Self::MissingPages => "missing_pages",
            Self::NonConformant => "non_conformant",
            Self::SdvIncomplete => "sdv_incomplete",
            Self::PiSignatureIncomplete => "pi_signature_incomplete",
            Self::CodingBacklog => "coding_backlog",
            Self::EdrrIssues => "edrr_issues",
        }
    }
}

/// Stored scores keep two decimals.
pub fn round_to_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
