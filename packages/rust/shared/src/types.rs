//! Core domain types for J-Book budget datasets.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::JbookError;

/// Column order of the enriched CSV produced by the fusion pipelines.
pub const ENRICHED_COLUMNS: [&str; 13] = [
    "SourceFile",
    "PENumber",
    "PEName",
    "ProjectNumber",
    "ProjectName",
    "CostCategory",
    "FY2023_Cost",
    "FY2024_Cost",
    "FY2025_Base_Cost",
    "AccomplishmentsText",
    "AcquisitionStrategyText",
    "IsNewStart",
    "MissionDescriptionText",
];

/// Column order of the tagged CSV (enriched columns + relevance).
pub const TAGGED_COLUMNS: [&str; 15] = [
    "SourceFile",
    "PENumber",
    "PEName",
    "ProjectNumber",
    "ProjectName",
    "CostCategory",
    "FY2023_Cost",
    "FY2024_Cost",
    "FY2025_Base_Cost",
    "AccomplishmentsText",
    "AcquisitionStrategyText",
    "IsNewStart",
    "MissionDescriptionText",
    "Relevance",
    "Rationale",
];

// ---------------------------------------------------------------------------
// CostRow
// ---------------------------------------------------------------------------

/// A single cost line parsed from an R-1D sheet, a generic budget sheet,
/// or an XML export.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CostRow {
    /// Program Element number (e.g. `0603305A`).
    pub pe_number: String,
    /// Program Element title.
    pub pe_name: String,
    /// Project number within the PE.
    pub project_number: String,
    /// Project title.
    pub project_name: String,
    /// Cost category / line title (`Project Totals` for project rows).
    pub cost_category: String,
    pub fy2023_cost: Option<f64>,
    pub fy2024_cost: Option<f64>,
    pub fy2025_base_cost: Option<f64>,
    /// Free-text Description column, only present on R-1D rows.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r1d_description: Option<String>,
}

// ---------------------------------------------------------------------------
// R2Sections
// ---------------------------------------------------------------------------

/// Narrative sections sliced out of a PE's Exhibit R-2 pages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct R2Sections {
    /// A. Mission Description and Budget Item Justification.
    pub mission: Option<String>,
    /// C. Accomplishments/Planned Programs.
    pub accomplishments: Option<String>,
    /// D. Acquisition Strategy.
    pub acquisition: Option<String>,
    /// "New Start: Yes/No" header flag.
    pub is_new_start: Option<bool>,
}

impl R2Sections {
    /// Whether none of the narrative sections were found.
    pub fn is_empty(&self) -> bool {
        self.mission.is_none()
            && self.accomplishments.is_none()
            && self.acquisition.is_none()
            && self.is_new_start.is_none()
    }
}

// ---------------------------------------------------------------------------
// EnrichedRecord
// ---------------------------------------------------------------------------

/// One fused row: structured cost data joined with its R-2 narrative.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnrichedRecord {
    pub source_file: String,
    pub pe_number: String,
    pub pe_name: String,
    pub project_number: String,
    pub project_name: String,
    pub cost_category: String,
    pub fy2023_cost: Option<f64>,
    pub fy2024_cost: Option<f64>,
    pub fy2025_base_cost: Option<f64>,
    pub accomplishments_text: Option<String>,
    pub acquisition_strategy_text: Option<String>,
    pub is_new_start: Option<bool>,
    pub mission_description_text: Option<String>,
}

impl EnrichedRecord {
    /// Sum of the three fiscal-year amounts, treating missing values as zero.
    pub fn total_cost(&self) -> f64 {
        [self.fy2023_cost, self.fy2024_cost, self.fy2025_base_cost]
            .iter()
            .map(|v| v.unwrap_or(0.0))
            .sum()
    }
}

// ---------------------------------------------------------------------------
// Relevance
// ---------------------------------------------------------------------------

/// Relevance of a program to the user's technology keywords.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Relevance {
    High,
    Medium,
    #[default]
    Low,
}

impl Relevance {
    /// All labels, highest first.
    pub const ALL: [Relevance; 3] = [Self::High, Self::Medium, Self::Low];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "High",
            Self::Medium => "Medium",
            Self::Low => "Low",
        }
    }

    /// Next label in High → Medium → Low → High order.
    pub fn next(self) -> Self {
        match self {
            Self::High => Self::Medium,
            Self::Medium => Self::Low,
            Self::Low => Self::High,
        }
    }

    /// Previous label in High → Medium → Low → High order.
    pub fn prev(self) -> Self {
        match self {
            Self::High => Self::Low,
            Self::Medium => Self::High,
            Self::Low => Self::Medium,
        }
    }
}

impl fmt::Display for Relevance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Relevance {
    type Err = JbookError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" => Ok(Self::High),
            "medium" => Ok(Self::Medium),
            "low" => Ok(Self::Low),
            other => Err(JbookError::parse(format!(
                "unknown relevance label '{other}': expected High, Medium, or Low"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// TaggedRecord
// ---------------------------------------------------------------------------

/// An enriched record with its relevance label and rationale.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaggedRecord {
    pub record: EnrichedRecord,
    pub relevance: Relevance,
    pub rationale: String,
}

impl From<EnrichedRecord> for TaggedRecord {
    fn from(record: EnrichedRecord) -> Self {
        Self {
            record,
            relevance: Relevance::Low,
            rationale: String::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// EmbeddedFile
// ---------------------------------------------------------------------------

/// Metadata for a file attached inside a J-Book PDF.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddedFile {
    /// Position in the document's embedded-file name tree.
    pub index: usize,
    /// Name-tree key or `/F` entry.
    pub filename: Option<String>,
    /// `/UF` entry (unicode filename), when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unicode_filename: Option<String>,
    /// `/Desc` entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Uncompressed size from `/Params /Size`, when recorded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

impl fmt::Display for EmbeddedFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self
            .unicode_filename
            .as_deref()
            .or(self.filename.as_deref())
            .unwrap_or("<unnamed>");
        write!(f, "[{}] {name}", self.index)?;
        if let Some(size) = self.size {
            write!(f, " ({size} bytes)")?;
        }
        if let Some(desc) = &self.description {
            write!(f, " - {desc}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relevance_parses_case_insensitively() {
        assert_eq!("high".parse::<Relevance>().unwrap(), Relevance::High);
        assert_eq!(" Medium ".parse::<Relevance>().unwrap(), Relevance::Medium);
        assert_eq!("LOW".parse::<Relevance>().unwrap(), Relevance::Low);
        assert!("critical".parse::<Relevance>().is_err());
    }

    #[test]
    fn relevance_cycles() {
        assert_eq!(Relevance::High.next(), Relevance::Medium);
        assert_eq!(Relevance::Low.next(), Relevance::High);
        assert_eq!(Relevance::High.prev(), Relevance::Low);
        assert_eq!(Relevance::Medium.prev(), Relevance::High);
    }

    #[test]
    fn total_cost_ignores_missing_years() {
        let record = EnrichedRecord {
            fy2023_cost: Some(10.0),
            fy2024_cost: None,
            fy2025_base_cost: Some(2.5),
            ..Default::default()
        };
        assert!((record.total_cost() - 12.5).abs() < f64::EPSILON);
    }

    #[test]
    fn tagged_columns_extend_enriched_columns() {
        assert_eq!(&TAGGED_COLUMNS[..ENRICHED_COLUMNS.len()], &ENRICHED_COLUMNS[..]);
        assert_eq!(TAGGED_COLUMNS[13], "Relevance");
        assert_eq!(TAGGED_COLUMNS[14], "Rationale");
    }

    #[test]
    fn embedded_file_display_prefers_unicode_name() {
        let file = EmbeddedFile {
            index: 2,
            filename: Some("r1d.xml".into()),
            unicode_filename: Some("R-1D Army.xml".into()),
            description: Some("R-1D export".into()),
            size: Some(2048),
        };
        assert_eq!(file.to_string(), "[2] R-1D Army.xml (2048 bytes) - R-1D export");
    }

    #[test]
    fn r2_sections_empty() {
        assert!(R2Sections::default().is_empty());
        let sections = R2Sections {
            is_new_start: Some(false),
            ..Default::default()
        };
        assert!(!sections.is_empty());
    }
}
