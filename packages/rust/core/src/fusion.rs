//! Join structured cost rows with per-PE R-2 narratives.

use std::collections::HashMap;

use jbook_shared::{CostRow, EnrichedRecord, R2Sections};

/// Build one enriched record per cost row, in input order.
///
/// Rows are matched to `lookup` by trimmed PE number. With
/// `use_r1d_description`, a row's R-1D Description fills in missing
/// accomplishments and mission text (never acquisition strategy).
pub fn fuse(
    source_file: &str,
    rows: &[CostRow],
    lookup: &HashMap<String, R2Sections>,
    use_r1d_description: bool,
) -> Vec<EnrichedRecord> {
    let empty = R2Sections::default();

    rows.iter()
        .map(|row| {
            let sections = lookup.get(row.pe_number.trim()).unwrap_or(&empty);
            let mut accomplishments = sections.accomplishments.clone();
            let mut mission = sections.mission.clone();

            if use_r1d_description {
                let desc = row
                    .r1d_description
                    .as_deref()
                    .map(str::trim)
                    .filter(|d| !d.is_empty());
                if let Some(desc) = desc {
                    fill_if_blank(&mut accomplishments, desc);
                    fill_if_blank(&mut mission, desc);
                }
            }

            EnrichedRecord {
                source_file: source_file.to_string(),
                pe_number: row.pe_number.clone(),
                pe_name: row.pe_name.clone(),
                project_number: row.project_number.clone(),
                project_name: row.project_name.clone(),
                cost_category: row.cost_category.clone(),
                fy2023_cost: row.fy2023_cost,
                fy2024_cost: row.fy2024_cost,
                fy2025_base_cost: row.fy2025_base_cost,
                accomplishments_text: accomplishments,
                acquisition_strategy_text: sections.acquisition.clone(),
                is_new_start: sections.is_new_start,
                mission_description_text: mission,
            }
        })
        .collect()
}

fn fill_if_blank(slot: &mut Option<String>, fallback: &str) {
    if slot.as_deref().is_none_or(str::is_empty) {
        *slot = Some(fallback.to_string());
    }
}
