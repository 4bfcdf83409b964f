use serde::{Deserialize, Serialize};

use crate::dqi::BlockerCategory;

/// Per-subject operational blocker counts as supplied by the fact store.
///
/// Counts are non-negative; percentages are in `[0, 100]`. Fields missing from an
/// imported record default to the ideal value (0 for counts, 100 for percentages).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockerFacts {
    pub missing_visits: u32,
    pub missing_pages: u32,
    pub open_queries: u32,
    pub non_conformant_events: u32,
    pub sae_discrepancies: u32,
    pub coding_uncoded: u32,
    pub edrr_open_issues: u32,
    pub sdv_completion_pct: f64,
    pub pi_signature_completion_pct: f64,
}

impl Default for BlockerFacts {
    fn default() -> Self {
        Self {
            missing_visits: 0,
            missing_pages: 0,
            open_queries: 0,
            non_conformant_events: 0,
            sae_discrepancies: 0,
            coding_uncoded: 0,
            edrr_open_issues: 0,
            sdv_completion_pct: 100.0,
            pi_signature_completion_pct: 100.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Medium => "medium",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Blocker {
    #[serde(rename = "type")]
    pub kind: BlockerCategory,
    pub count: f64,
    pub severity: Severity,
}

/// Output of the clean gate for one subject. Overwritten on every pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanStatus {
    pub is_clean: bool,
    pub has_missing_visits: bool,
    pub missing_visits_count: u32,
    pub has_missing_pages: bool,
    pub missing_pages_count: u32,
    pub has_open_queries: bool,
    pub open_queries_count: u32,
    pub has_non_conformant: bool,
    pub non_conformant_count: u32,
    pub has_sae_discrepancies: bool,
    pub sae_discrepancy_count: u32,
    pub sdv_incomplete: bool,
    pub sdv_completion_pct: f64,
    pub pi_signature_incomplete: bool,
    pub pi_signature_completion_pct: f64,
    pub has_coding_backlog: bool,
    pub coding_uncoded_count: u32,
    pub has_edrr_issues: bool,
    pub edrr_open_issue_count: u32,
    pub blockers: Vec<Blocker>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RiskBand {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskBand {
    pub const MEDIUM_FLOOR: f64 = 25.0;
    pub const HIGH_FLOOR: f64 = 50.0;
    pub const CRITICAL_FLOOR: f64 = 75.0;

    /// Half-open bands: `[0,25)` Low, `[25,50)` Medium, `[50,75)` High, `[75,∞)` Critical.
    pub fn from_score(score: f64) -> Self {
        if score < Self::MEDIUM_FLOOR {
            Self::Low
        } else if score < Self::HIGH_FLOOR {
            Self::Medium
        } else if score < Self::CRITICAL_FLOOR {
            Self::High
        } else {
            Self::Critical
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
            Self::Critical => "Critical",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Low" => Some(Self::Low),
            "Medium" => Some(Self::Medium),
            "High" => Some(Self::High),
            "Critical" => Some(Self::Critical),
            _ => None,
        }
    }

    pub fn is_at_risk(self) -> bool {
        matches!(self, Self::High | Self::Critical)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReadinessStatus {
    #[serde(rename = "Ready for Database Lock")]
    ReadyForLock,
    #[serde(rename = "Ready for Interim Analysis")]
    ReadyForInterim,
    #[serde(rename = "In Progress")]
    InProgress,
    #[serde(rename = "Not Ready")]
    NotReady,
}

impl ReadinessStatus {
    pub fn from_clean_percentage(clean_percentage: f64) -> Self {
        if clean_percentage >= 95.0 {
            Self::ReadyForLock
        } else if clean_percentage >= 80.0 {
            Self::ReadyForInterim
        } else if clean_percentage >= 50.0 {
            Self::InProgress
        } else {
            Self::NotReady
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ReadyForLock => "Ready for Database Lock",
            Self::ReadyForInterim => "Ready for Interim Analysis",
            Self::InProgress => "In Progress",
            Self::NotReady => "Not Ready",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Ready for Database Lock" => Some(Self::ReadyForLock),
            "Ready for Interim Analysis" => Some(Self::ReadyForInterim),
            "In Progress" => Some(Self::InProgress),
            "Not Ready" => Some(Self::NotReady),
            _ => None,
        }
    }
}

/// Normalized sub-scores (0-100, lower is better) and the weighted composite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectScore {
    pub sae_score: f64,
    pub missing_visits_score: f64,
    pub missing_pages_score: f64,
    pub open_queries_score: f64,
    pub non_conformant_score: f64,
    pub sdv_score: f64,
    pub pi_signature_score: f64,
    pub coding_score: f64,
    pub edrr_score: f64,
    pub composite_score: f64,
    /// Classified from the two-decimal `composite_score`, so a raw 24.996 stored as
    /// 25.00 is Medium.
    pub risk_band: RiskBand,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteScore {
    pub total_subjects: u32,
    pub clean_subjects: u32,
    pub clean_percentage: f64,
    pub composite_score: f64,
    pub risk_band: RiskBand,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyScore {
    pub total_sites: u32,
    pub total_subjects: u32,
    pub clean_subjects: u32,
    pub clean_percentage: f64,
    pub composite_score: f64,
    pub readiness_status: ReadinessStatus,
}

/// JSON extract accepted by the `load` command.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrialExtract {
    #[serde(default)]
    pub studies: Vec<ExtractStudy>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractStudy {
    pub study_id: String,
    #[serde(default)]
    pub study_name: Option<String>,
    #[serde(default)]
    pub sites: Vec<ExtractSite>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractSite {
    pub site_id: String,
    #[serde(default)]
    pub site_number: Option<String>,
    #[serde(default)]
    pub site_name: Option<String>,
    #[serde(default)]
    pub subjects: Vec<ExtractSubject>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractSubject {
    pub subject_id: String,
    #[serde(default)]
    pub external_id: Option<String>,
    #[serde(default)]
    pub facts: Option<BlockerFacts>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoadRunManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub generated_at: String,
    pub source_path: String,
    pub source_sha256: String,
    pub db_path: String,
    pub studies_upserted: usize,
    pub sites_upserted: usize,
    pub subjects_upserted: usize,
    pub fact_rows_written: usize,
    pub fact_rows_cleared: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct WeightManifestEntry {
    pub metric_name: String,
    pub weight: f64,
    pub source: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StudyRunSummary {
    pub study_id: String,
    pub subjects_total: usize,
    pub subjects_processed: usize,
    pub subjects_defaulted: usize,
    pub subjects_skipped: Vec<SkippedSubject>,
    pub sites_written: usize,
    pub sites_skipped_empty: usize,
    pub study_score: StudyScore,
}

#[derive(Debug, Clone, Serialize)]
pub struct SkippedSubject {
    pub subject_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StudyFailure {
    pub study_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecomputeRunManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub status: String,
    pub started_at: String,
    pub completed_at: String,
    pub requested_study_id: Option<String>,
    pub db_path: String,
    pub weight_sum: f64,
    pub weights: Vec<WeightManifestEntry>,
    pub studies: Vec<StudyRunSummary>,
    pub failures: Vec<StudyFailure>,
    pub audit_blocks_recorded: usize,
    pub warnings: Vec<String>,
}
