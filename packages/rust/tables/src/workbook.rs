//! Spreadsheet reader built on `calamine`.

use std::path::Path;

use calamine::{Data, Range, Reader, open_workbook_auto};
use jbook_shared::{CostRow, JbookError, Result};
use tracing::{debug, instrument};

use crate::cell::Cell;
use crate::sheet::parse_sheet;

/// Parse every worksheet of an `.xlsx`/`.xlsm`/`.xlsb`/`.xls`/`.ods` file.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn parse_workbook(path: &Path) -> Result<Vec<CostRow>> {
    let mut workbook = open_workbook_auto(path)
        .map_err(|e| JbookError::Spreadsheet(format!("{}: {e}", path.display())))?;

    let mut rows = Vec::new();
    for (name, range) in workbook.worksheets() {
        let grid = sheet_grid(&range);
        debug!(sheet = %name, rows = grid.len(), "read worksheet");
        rows.extend(parse_sheet(&name, &grid));
    }
    Ok(rows)
}

/// Cell grid anchored at A1.
///
/// calamine ranges start at the first used cell; blank leading rows and
/// columns are restored so header search windows count from sheet row 1.
fn sheet_grid(range: &Range<Data>) -> Vec<Vec<Cell>> {
    let Some((first_row, first_col)) = range.start() else {
        return Vec::new();
    };
    let blank_rows = (0..first_row).map(|_| Vec::new());
    let rows = range.rows().map(|row| {
        std::iter::repeat_n(Cell::Empty, first_col as usize)
            .chain(row.iter().map(to_cell))
            .collect()
    });
    blank_rows.chain(rows).collect()
}

fn to_cell(data: &Data) -> Cell {
    match data {
        Data::Empty | Data::Error(_) => Cell::Empty,
        Data::String(s) => Cell::Text(s.clone()),
        Data::Float(f) => Cell::Number(*f),
        Data::Int(i) => Cell::Number(*i as f64),
        Data::Bool(b) => Cell::Bool(*b),
        other => Cell::Text(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_calamine_values() {
        assert_eq!(to_cell(&Data::Empty), Cell::Empty);
        assert_eq!(to_cell(&Data::Int(7)), Cell::Number(7.0));
        assert_eq!(to_cell(&Data::Float(1.5)), Cell::Number(1.5));
        assert_eq!(to_cell(&Data::String("PE".into())), Cell::Text("PE".into()));
        assert_eq!(to_cell(&Data::Bool(true)), Cell::Bool(true));
    }

    #[test]
    fn grid_keeps_blank_leading_rows_and_columns() {
        let mut range = Range::new((2, 1), (3, 2));
        range.set_value((2, 1), Data::String("PE".into()));
        range.set_value((3, 2), Data::Float(4.5));

        let grid = sheet_grid(&range);
        assert_eq!(grid.len(), 4);
        assert!(grid[0].is_empty() && grid[1].is_empty());
        assert_eq!(grid[2], vec![Cell::Empty, Cell::Text("PE".into()), Cell::Empty]);
        assert_eq!(grid[3][2], Cell::Number(4.5));
    }

    #[test]
    fn empty_sheet_has_no_rows() {
        assert!(sheet_grid(&Range::<Data>::empty()).is_empty());
    }

    #[test]
    fn unreadable_workbook_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.xlsx");
        std::fs::write(&path, b"not a zip archive").unwrap();
        let err = parse_workbook(&path).unwrap_err();
        assert!(matches!(err, JbookError::Spreadsheet(_)));
    }
}
