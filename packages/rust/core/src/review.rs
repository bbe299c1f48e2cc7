//! In-memory review model behind the dashboard: filtering, weighted
//! totals, manual overrides and export.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use jbook_shared::{
    EnrichedRecord, JbookError, Relevance, RelevanceWeights, Result, TaggedRecord,
};
use tracing::{debug, info};

use crate::dataset::{read_records, write_tagged};

/// Parse `"High=1.0,Medium=0.5,Low=0.0"` over the default weights.
///
/// Labels are case-insensitive. Pairs that do not parse are ignored.
pub fn parse_weights(spec: &str) -> RelevanceWeights {
    let mut weights = RelevanceWeights::default();
    for pair in spec.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let Some((label, value)) = pair.split_once('=') else {
            debug!(pair, "ignoring weight without '='");
            continue;
        };
        match (label.parse::<Relevance>(), value.trim().parse::<f64>()) {
            (Ok(relevance), Ok(value)) => *weights.get_mut(relevance) = value,
            _ => debug!(pair, "ignoring malformed weight"),
        }
    }
    weights
}

/// `$1,234.50`-style formatting for weighted totals.
pub fn format_currency(amount: f64) -> String {
    let fixed = format!("{:.2}", amount.abs());
    let (whole, cents) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, digit) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    let sign = if amount < 0.0 && fixed != "0.00" { "-" } else { "" };
    format!("{sign}${grouped}.{cents}")
}

// ---------------------------------------------------------------------------
// Filter
// ---------------------------------------------------------------------------

/// Row filter: free text over identifying columns plus allowed labels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewFilter {
    /// Case-insensitive substring of PENumber, PEName, ProjectName or
    /// CostCategory. Empty matches everything.
    pub text: String,
    pub relevance: BTreeSet<Relevance>,
}

impl Default for ReviewFilter {
    fn default() -> Self {
        Self {
            text: String::new(),
            relevance: Relevance::ALL.into_iter().collect(),
        }
    }
}

impl ReviewFilter {
    pub fn matches_text(&self, record: &EnrichedRecord) -> bool {
        let needle = self.text.trim().to_lowercase();
        if needle.is_empty() {
            return true;
        }
        [
            &record.pe_number,
            &record.pe_name,
            &record.project_name,
            &record.cost_category,
        ]
        .iter()
        .any(|field| field.to_lowercase().contains(&needle))
    }

    pub fn allows(&self, relevance: Relevance) -> bool {
        self.relevance.contains(&relevance)
    }

    pub fn matches(&self, tagged: &TaggedRecord) -> bool {
        self.allows(tagged.relevance) && self.matches_text(&tagged.record)
    }

    /// Add or remove a label from the allowed set.
    pub fn toggle(&mut self, relevance: Relevance) {
        if !self.relevance.remove(&relevance) {
            self.relevance.insert(relevance);
        }
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// A tagged dataset under review.
#[derive(Debug, Clone, Default)]
pub struct ReviewSession {
    records: Vec<TaggedRecord>,
    source: Option<PathBuf>,
    pub filter: ReviewFilter,
    pub weights: RelevanceWeights,
}

impl ReviewSession {
    pub fn new(records: Vec<TaggedRecord>, weights: RelevanceWeights) -> Self {
        Self {
            records,
            source: None,
            filter: ReviewFilter::default(),
            weights,
        }
    }

    /// Load an enriched or tagged CSV.
    pub fn load(path: &Path, weights: RelevanceWeights) -> Result<Self> {
        let records = read_records(path)?;
        info!(path = %path.display(), rows = records.len(), "loaded dataset for review");
        Ok(Self {
            source: Some(path.to_path_buf()),
            ..Self::new(records, weights)
        })
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn records(&self) -> &[TaggedRecord] {
        &self.records
    }

    pub fn record(&self, index: usize) -> Option<&TaggedRecord> {
        self.records.get(index)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Indices of records passing both filters, in dataset order.
    pub fn visible(&self) -> Vec<usize> {
        self.records
            .iter()
            .enumerate()
            .filter(|(_, r)| self.filter.matches(r))
            .map(|(i, _)| i)
            .collect()
    }

    /// Weighted sum of FY costs over records whose label passes the
    /// relevance filter. The text filter does not narrow the total.
    pub fn weighted_total(&self) -> f64 {
        self.records
            .iter()
            .filter(|r| self.filter.allows(r.relevance))
            .map(|r| self.weights.get(r.relevance) * r.record.total_cost())
            .sum()
    }

    /// Copies of the records at `indices`, for re-tagging.
    pub fn enriched(&self, indices: &[usize]) -> Vec<EnrichedRecord> {
        indices
            .iter()
            .filter_map(|&i| self.records.get(i))
            .map(|t| t.record.clone())
            .collect()
    }

    /// Replace one record's label and rationale.
    pub fn apply_override(
        &mut self,
        index: usize,
        relevance: Relevance,
        rationale: impl Into<String>,
    ) -> Result<()> {
        let len = self.records.len();
        let record = self.records.get_mut(index).ok_or_else(|| {
            JbookError::validation(format!("row {index} out of range (dataset has {len} rows)"))
        })?;
        record.relevance = relevance;
        record.rationale = rationale.into();
        debug!(index, %relevance, "applied override");
        Ok(())
    }

    /// Write tagging results back to the rows they were computed for.
    ///
    /// Nothing is applied unless every index is in range and the lengths
    /// agree.
    pub fn apply_tags(&mut self, indices: &[usize], tags: Vec<(Relevance, String)>) -> Result<()> {
        if indices.len() != tags.len() {
            return Err(JbookError::validation(format!(
                "{} tags for {} rows",
                tags.len(),
                indices.len()
            )));
        }
        if let Some(bad) = indices.iter().find(|&&i| i >= self.records.len()) {
            return Err(JbookError::validation(format!("row {bad} out of range")));
        }
        for (&index, (relevance, rationale)) in indices.iter().zip(tags) {
            let record = &mut self.records[index];
            record.relevance = relevance;
            record.rationale = rationale;
        }
        info!(rows = indices.len(), "applied tagging results");
        Ok(())
    }

    /// Write the full dataset (not just visible rows) as a tagged CSV.
    pub fn export(&self, path: &Path) -> Result<()> {
        write_tagged(path, &self.records)
    }
}
