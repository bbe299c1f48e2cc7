//! Structured cost-table parsing for J-Book exhibits.
//!
//! Reads R-1D workbooks, generic budget sheets, and R-3 style XML exports
//! into flat [`CostRow`]s. Unreadable files are logged and skipped.

pub mod cell;
pub mod header;
pub mod sheet;
pub mod workbook;
pub mod xml;

use std::path::{Path, PathBuf};

use jbook_shared::{CostRow, Result};
use tracing::{info, warn};

pub use cell::Cell;
pub use header::{Column, HeaderMap, find_header_row};
pub use sheet::parse_sheet;
pub use workbook::parse_workbook;
pub use xml::{parse_xml_file, parse_xml_str};

/// File extensions handled by the workbook reader.
pub const WORKBOOK_EXTENSIONS: &[&str] = &["xlsx", "xlsm", "xlsb", "xls", "ods"];

/// File extensions handled by the XML reader.
pub const XML_EXTENSIONS: &[&str] = &["xml", "mxl"];

/// Which reader a path is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Xml,
    Workbook,
    /// Unknown extension: try XML, then the workbook reader.
    Unknown,
}

impl SourceKind {
    pub fn for_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        if XML_EXTENSIONS.contains(&ext.as_str()) {
            Self::Xml
        } else if WORKBOOK_EXTENSIONS.contains(&ext.as_str()) {
            Self::Workbook
        } else {
            Self::Unknown
        }
    }
}

/// Parse every structured file into cost rows, in input order.
///
/// Missing files and files that fail to parse contribute no rows.
pub fn parse_structured_files(paths: &[PathBuf]) -> Vec<CostRow> {
    let mut rows = Vec::new();
    for path in paths {
        if !path.is_file() {
            warn!(path = %path.display(), "structured file not found, skipping");
            continue;
        }
        match parse_structured_file(path) {
            Ok(parsed) => {
                info!(path = %path.display(), rows = parsed.len(), "parsed structured file");
                rows.extend(parsed);
            }
            Err(e) => warn!(path = %path.display(), error = %e, "failed to parse structured file"),
        }
    }
    rows
}

/// Parse a single structured file, routing by extension.
pub fn parse_structured_file(path: &Path) -> Result<Vec<CostRow>> {
    match SourceKind::for_path(path) {
        SourceKind::Xml => parse_xml_file(path),
        SourceKind::Workbook => parse_workbook(path),
        SourceKind::Unknown => match parse_xml_file(path) {
            Ok(rows) if !rows.is_empty() => Ok(rows),
            _ => parse_workbook(path),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/../../../fixtures/xml/r3_sample.xml"
    );

    #[test]
    fn routes_by_extension() {
        assert_eq!(SourceKind::for_path(Path::new("a.XML")), SourceKind::Xml);
        assert_eq!(SourceKind::for_path(Path::new("a.mxl")), SourceKind::Xml);
        assert_eq!(SourceKind::for_path(Path::new("a.xlsx")), SourceKind::Workbook);
        assert_eq!(SourceKind::for_path(Path::new("a.ods")), SourceKind::Workbook);
        assert_eq!(SourceKind::for_path(Path::new("a.dat")), SourceKind::Unknown);
        assert_eq!(SourceKind::for_path(Path::new("noext")), SourceKind::Unknown);
    }

    #[test]
    fn skips_missing_and_broken_files() {
        let dir = tempfile::tempdir().unwrap();
        let broken = dir.path().join("broken.xlsx");
        std::fs::write(&broken, b"garbage").unwrap();

        let paths = vec![
            dir.path().join("missing.xml"),
            broken,
            PathBuf::from(FIXTURE),
        ];
        let rows = parse_structured_files(&paths);
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0].pe_number, "0603305A");
    }

    #[test]
    fn unknown_extension_tries_xml_first() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("export.dat");
        std::fs::copy(FIXTURE, &path).unwrap();
        let rows = parse_structured_file(&path).unwrap();
        assert_eq!(rows.len(), 4);
    }
}
