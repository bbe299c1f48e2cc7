//! Row-level parsing of a single worksheet.
//!
//! Sheets are handed over as a grid of [`Cell`]s. R-1D sheets are walked
//! with a small state machine that tracks the current PE and project;
//! generic budget sheets map each row directly.

use jbook_shared::CostRow;
use tracing::debug;

use crate::cell::{Cell, row_is_blank};
use crate::header::{Column, HeaderMap, find_header_row};

/// Consecutive blank rows that end an R-1D sheet.
pub const R1D_BLANK_STREAK_LIMIT: usize = 10;

/// Consecutive blank rows that end a generic sheet.
pub const GENERIC_BLANK_STREAK_LIMIT: usize = 5;

/// Cost category emitted for R-1D project rows.
pub const PROJECT_TOTALS: &str = "Project Totals";

/// Parse every cost row out of one worksheet.
///
/// Returns an empty vector when the sheet has no recognisable header.
pub fn parse_sheet(name: &str, rows: &[Vec<Cell>]) -> Vec<CostRow> {
    let Some(header_idx) = find_header_row(rows) else {
        debug!(sheet = name, "no header row found, skipping sheet");
        return Vec::new();
    };

    let map = HeaderMap::from_row(&rows[header_idx]);
    if map.is_empty() {
        debug!(sheet = name, "header row maps no known columns, skipping sheet");
        return Vec::new();
    }

    let data = &rows[header_idx + 1..];
    let out = if map.is_r1d() {
        parse_r1d_rows(&map, data)
    } else {
        parse_generic_rows(&map, data)
    };

    debug!(
        sheet = name,
        header_row = header_idx,
        r1d = map.is_r1d(),
        rows = out.len(),
        "parsed sheet"
    );
    out
}

// ---------------------------------------------------------------------------
// R-1D
// ---------------------------------------------------------------------------

/// Kind of an R-1D row, from its Type column.
#[derive(Debug, Clone, PartialEq, Eq)]
enum RowKind {
    Pe,
    Project,
    /// Any other type (`A/PP`, `CA`, ...), uppercased.
    Line(String),
    Untyped,
}

impl RowKind {
    fn classify(typ: Option<String>) -> Self {
        let typ = typ.unwrap_or_default().to_uppercase();
        match typ.as_str() {
            "" => Self::Untyped,
            "PE" => Self::Pe,
            "PROJECT" | "PROJECTS" | "PRJ" => Self::Project,
            _ => Self::Line(typ),
        }
    }
}

/// PE and project context carried from row to row.
#[derive(Debug, Default)]
struct R1dContext {
    pe_number: Option<String>,
    pe_name: Option<String>,
    project_number: Option<String>,
    project_name: Option<String>,
}

impl R1dContext {
    fn row(&self, map: &HeaderMap, cells: &[Cell], cost_category: String) -> CostRow {
        CostRow {
            pe_number: self.pe_number.clone().unwrap_or_default(),
            pe_name: self.pe_name.clone().unwrap_or_default(),
            project_number: self.project_number.clone().unwrap_or_default(),
            project_name: self.project_name.clone().unwrap_or_default(),
            cost_category,
            fy2023_cost: map.number(cells, Column::Fy2023),
            fy2024_cost: map.number(cells, Column::Fy2024),
            fy2025_base_cost: map.number(cells, Column::Fy2025Base),
            r1d_description: Some(map.text(cells, Column::Description).unwrap_or_default()),
        }
    }
}

fn parse_r1d_rows(map: &HeaderMap, rows: &[Vec<Cell>]) -> Vec<CostRow> {
    let mut out = Vec::new();
    let mut ctx = R1dContext::default();
    let mut blank_streak = 0;

    for cells in rows {
        if row_is_blank(cells) {
            blank_streak += 1;
            if blank_streak >= R1D_BLANK_STREAK_LIMIT {
                break;
            }
            continue;
        }
        blank_streak = 0;

        let title = map.text(cells, Column::Title);
        match RowKind::classify(map.text(cells, Column::Type)) {
            RowKind::Pe => {
                if let Some(pe) = map.text(cells, Column::PeNumber) {
                    ctx.pe_number = Some(pe);
                }
                if title.is_some() {
                    ctx.pe_name = title;
                }
                ctx.project_number = None;
                ctx.project_name = None;
            }
            RowKind::Project => {
                if let Some(project) = map.text(cells, Column::ProjectNumber) {
                    ctx.project_number = Some(project);
                }
                if title.is_some() {
                    ctx.project_name = title;
                }
                out.push(ctx.row(map, cells, PROJECT_TOTALS.to_string()));
            }
            RowKind::Line(typ) => {
                let category = title
                    .or_else(|| map.text(cells, Column::Description))
                    .unwrap_or(typ);
                if is_totals_summary(&category) {
                    continue;
                }
                let row = ctx.row(map, cells, category);
                if row.pe_number.is_empty()
                    && row.project_number.is_empty()
                    && row.cost_category.is_empty()
                {
                    continue;
                }
                out.push(row);
            }
            RowKind::Untyped => {}
        }
    }

    out
}

/// Summary lines that would double-count project totals.
fn is_totals_summary(category: &str) -> bool {
    let lower = category.to_lowercase();
    (lower.contains("totals") && lower.contains("sum of")) || lower == "project totals"
}

// ---------------------------------------------------------------------------
// Generic sheets
// ---------------------------------------------------------------------------

fn parse_generic_rows(map: &HeaderMap, rows: &[Vec<Cell>]) -> Vec<CostRow> {
    let mut out = Vec::new();
    let mut blank_streak = 0;

    for cells in rows {
        if row_is_blank(cells) {
            blank_streak += 1;
            if blank_streak >= GENERIC_BLANK_STREAK_LIMIT {
                break;
            }
            continue;
        }
        blank_streak = 0;

        let text = |column| map.text(cells, column).unwrap_or_default();
        let row = CostRow {
            pe_number: text(Column::PeNumber),
            pe_name: text(Column::PeName),
            project_number: text(Column::ProjectNumber),
            project_name: text(Column::ProjectName),
            cost_category: text(Column::CostCategory),
            fy2023_cost: map.number(cells, Column::Fy2023),
            fy2024_cost: map.number(cells, Column::Fy2024),
            fy2025_base_cost: map.number(cells, Column::Fy2025Base),
            r1d_description: None,
        };
        if row.pe_number.is_empty() && row.project_number.is_empty() {
            continue;
        }
        out.push(row);
    }

    out
}
