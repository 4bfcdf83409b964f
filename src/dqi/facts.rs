use std::fmt;

use crate::model::BlockerFacts;

/// One stored column value. The store does not enforce column types, so every shape
/// a row can hold is representable here and checked by `resolve_facts`.
#[derive(Debug, Clone, PartialEq)]
pub enum FactValue {
    Null,
    Integer(i64),
    Real(f64),
    Text,
    Blob,
}

impl FactValue {
    fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Integer(_) => "integer",
            Self::Real(_) => "real",
            Self::Text => "text",
            Self::Blob => "blob",
        }
    }
}

/// A facts row exactly as stored, before shape validation.
#[derive(Debug, Clone, PartialEq)]
pub struct RawBlockerFacts {
    pub missing_visits: FactValue,
    pub missing_pages: FactValue,
    pub open_queries: FactValue,
    pub non_conformant_events: FactValue,
    pub sae_discrepancies: FactValue,
    pub coding_uncoded: FactValue,
    pub edrr_open_issues: FactValue,
    pub sdv_completion_pct: FactValue,
    pub pi_signature_completion_pct: FactValue,
}

impl From<&BlockerFacts> for RawBlockerFacts {
    fn from(facts: &BlockerFacts) -> Self {
        let count = |value: u32| FactValue::Integer(i64::from(value));
        Self {
            missing_visits: count(facts.missing_visits),
            missing_pages: count(facts.missing_pages),
            open_queries: count(facts.open_queries),
            non_conformant_events: count(facts.non_conformant_events),
            sae_discrepancies: count(facts.sae_discrepancies),
            coding_uncoded: count(facts.coding_uncoded),
            edrr_open_issues: count(facts.edrr_open_issues),
            sdv_completion_pct: FactValue::Real(facts.sdv_completion_pct),
            pi_signature_completion_pct: FactValue::Real(facts.pi_signature_completion_pct),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FactShapeError {
    CountOutOfRange { field: &'static str, value: i64 },
    PercentageOutOfRange { field: &'static str, value: f64 },
    UnexpectedType { field: &'static str, found: &'static str },
}

impl fmt::Display for FactShapeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FactShapeError::CountOutOfRange { field, value } => {
                write!(f, "count {field}={value} is outside 0..={}", u32::MAX)
            }
            FactShapeError::PercentageOutOfRange { field, value } => {
                write!(f, "percentage {field}={value} is outside 0..=100")
            }
            FactShapeError::UnexpectedType { field, found } => {
                write!(f, "{field} holds a {found} value")
            }
        }
    }
}

impl std::error::Error for FactShapeError {}

/// How a subject with no facts row is treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FactsPolicy {
    /// Zero counts and 100% completion: a perfectly clean subject.
    #[default]
    AssumeClean,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FactsSource {
    Recorded,
    Defaulted,
}

pub fn resolve_facts(
    raw: Option<&RawBlockerFacts>,
    policy: FactsPolicy,
) -> Result<(BlockerFacts, FactsSource), FactShapeError> {
    let Some(raw) = raw else {
        return match policy {
            FactsPolicy::AssumeClean => Ok((BlockerFacts::default(), FactsSource::Defaulted)),
        };
    };

    let facts = BlockerFacts {
        missing_visits: count("missing_visits", &raw.missing_visits)?,
        missing_pages: count("missing_pages", &raw.missing_pages)?,
        open_queries: count("open_queries", &raw.open_queries)?,
        non_conformant_events: count("non_conformant_events", &raw.non_conformant_events)?,
        sae_discrepancies: count("sae_discrepancies", &raw.sae_discrepancies)?,
        coding_uncoded: count("coding_uncoded", &raw.coding_uncoded)?,
        edrr_open_issues: count("edrr_open_issues", &raw.edrr_open_issues)?,
        sdv_completion_pct: percentage("sdv_completion_pct", &raw.sdv_completion_pct)?,
        pi_signature_completion_pct: percentage(
            "pi_signature_completion_pct",
            &raw.pi_signature_completion_pct,
        )?,
    };

    Ok((facts, FactsSource::Recorded))
}

/// Counts must be stored as integers; a real such as 2.5 is not rounded.
fn count(field: &'static str, value: &FactValue) -> Result<u32, FactShapeError> {
    match value {
        FactValue::Integer(value) => u32::try_from(*value)
            .map_err(|_| FactShapeError::CountOutOfRange { field, value: *value }),
        other => Err(FactShapeError::UnexpectedType {
            field,
            found: other.kind(),
        }),
    }
}

/// NULL means complete.
fn percentage(field: &'static str, value: &FactValue) -> Result<f64, FactShapeError> {
    let value = match value {
        FactValue::Null => 100.0,
        FactValue::Integer(value) => *value as f64,
        FactValue::Real(value) => *value,
        other => {
            return Err(FactShapeError::UnexpectedType {
                field,
                found: other.kind(),
            });
        }
    };
    if value.is_finite() && (0.0..=100.0).contains(&value) {
        Ok(value)
    } else {
        Err(FactShapeError::PercentageOutOfRange { field, value })
    }
}
