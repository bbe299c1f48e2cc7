//! Header-row detection and column mapping for budget sheets.

use std::collections::HashMap;

use crate::cell::Cell;

/// How many leading rows are searched for a header row.
pub const MAX_HEADER_SEARCH_ROWS: usize = 50;

/// Logical columns recognised in J-Book budget sheets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    PeNumber,
    PeName,
    ProjectNumber,
    ProjectName,
    CostCategory,
    /// R-1D row type (`PE`, `Project`, `A/PP`, `CA`, ...).
    Type,
    /// R-1D "PE/Project/Accomplishments/Planned Programs Title".
    Title,
    Description,
    Fy2023,
    Fy2024,
    Fy2025Base,
}

/// Mapping from logical column to zero-based cell index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderMap {
    columns: HashMap<Column, usize>,
}

impl HeaderMap {
    /// Build a mapping from a header row. The first matching cell wins.
    pub fn from_row(cells: &[Cell]) -> Self {
        let mut map = Self::default();
        for (idx, cell) in cells.iter().enumerate() {
            let v = cell.header_text();
            if v.is_empty() {
                continue;
            }
            for column in classify_header(&v) {
                map.columns.entry(column).or_insert(idx);
            }
        }
        map
    }

    pub fn get(&self, column: Column) -> Option<usize> {
        self.columns.get(&column).copied()
    }

    pub fn contains(&self, column: Column) -> bool {
        self.columns.contains_key(&column)
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// R-1D sheets carry a Type column next to PE# and Project#.
    pub fn is_r1d(&self) -> bool {
        self.contains(Column::Type)
            && self.contains(Column::PeNumber)
            && self.contains(Column::ProjectNumber)
    }

    /// Cell text for `column` in `row`, if mapped and non-blank.
    pub fn text(&self, row: &[Cell], column: Column) -> Option<String> {
        self.get(column).and_then(|i| row.get(i)).and_then(Cell::text)
    }

    /// Numeric value for `column` in `row`.
    pub fn number(&self, row: &[Cell], column: Column) -> Option<f64> {
        self.get(column).and_then(|i| row.get(i)).and_then(Cell::number)
    }
}

/// All logical columns a lowercase header label maps to.
fn classify_header(v: &str) -> Vec<Column> {
    let mut out = Vec::new();

    if v.contains("program element") && (v.contains("number") || v.ends_with("program element")) {
        out.push(Column::PeNumber);
    }
    if v.contains("program element name")
        || v.contains("pe name")
        || (v.ends_with("title") && v.contains("program element"))
    {
        out.push(Column::PeName);
    }
    if v.contains("project number") || v == "project" || v == "project#" {
        out.push(Column::ProjectNumber);
    }
    if v.contains("project name") || v.contains("project title") {
        out.push(Column::ProjectName);
    }
    if v.contains("cost category") || v.contains("cost element") || v.contains("line item") {
        out.push(Column::CostCategory);
    }
    if v == "pe#" {
        out.push(Column::PeNumber);
    }
    if v == "type" {
        out.push(Column::Type);
    }
    if v.contains("accomplishments/planned programs title") || v.starts_with("pe/project/") {
        out.push(Column::Title);
    }
    if v == "description" {
        out.push(Column::Description);
    }
    if v.contains("fy2023") || v == "fy 2023" || v == "fy23" {
        out.push(Column::Fy2023);
    }
    if v.contains("fy2024") || v == "fy 2024" || v == "fy24" {
        out.push(Column::Fy2024);
    }
    if v.contains("fy 2025 base") || v == "fy25 base" || (v.contains("fy2025") && v.contains("base"))
    {
        out.push(Column::Fy2025Base);
    }

    out
}

/// Find the zero-based index of the header row within the first
/// [`MAX_HEADER_SEARCH_ROWS`] rows.
pub fn find_header_row(rows: &[Vec<Cell>]) -> Option<usize> {
    rows.iter()
        .take(MAX_HEADER_SEARCH_ROWS)
        .position(|row| looks_like_header(row))
}

fn looks_like_header(row: &[Cell]) -> bool {
    let values: Vec<String> = row.iter().map(Cell::header_text).collect();
    let joined = values.join(" ");

    if ["project", "program", "element"].iter().all(|k| joined.contains(k)) {
        return true;
    }

    if values.iter().any(|v| v.contains("program element"))
        && values.iter().any(|v| v.contains("project"))
    {
        return true;
    }

    // R-1D style: Type, PE#, Project#, Title, Description, FY columns
    values.iter().any(|v| v == "type")
        && values.iter().any(|v| v.contains("pe#"))
        && values.iter().any(|v| v.contains("project#"))
}
