//! Format-independent cell values.
//!
//! Workbook readers convert their native cell types into [`Cell`] so the
//! header detection and row-state logic never depend on a specific reader.

/// A single spreadsheet cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
}

impl Cell {
    /// Whether the cell is empty or whitespace-only text.
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Trimmed display text, or `None` for blank cells.
    ///
    /// Whole numbers render without a fractional part so numeric project
    /// numbers read as `"123"` rather than `"123.0"`.
    pub fn text(&self) -> Option<String> {
        let s = match self {
            Self::Empty => return None,
            Self::Text(s) => s.trim().to_string(),
            Self::Number(n) => format_number(*n),
            Self::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
        };
        if s.is_empty() { None } else { Some(s) }
    }

    /// Numeric value: numbers as-is, text parsed leniently.
    pub fn number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(s) => parse_amount(s),
            _ => None,
        }
    }

    /// Lowercased trimmed text used for header matching.
    pub(crate) fn header_text(&self) -> String {
        self.text().map(|s| s.to_lowercase()).unwrap_or_default()
    }
}

/// Whether every cell in the row is blank.
pub fn row_is_blank(row: &[Cell]) -> bool {
    row.iter().all(Cell::is_blank)
}

/// Parse a budget amount, stripping thousands separators.
///
/// Returns `None` for blanks and anything that is not a number.
pub fn parse_amount(s: &str) -> Option<f64> {
    let cleaned: String = s.chars().filter(|c| *c != ',').collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whole_numbers_render_as_integers() {
        assert_eq!(Cell::Number(123.0).text().as_deref(), Some("123"));
        assert_eq!(Cell::Number(12.5).text().as_deref(), Some("12.5"));
    }

    #[test]
    fn blank_detection() {
        assert!(Cell::Empty.is_blank());
        assert!(Cell::Text("   ".into()).is_blank());
        assert!(!Cell::Number(0.0).is_blank());
        assert!(row_is_blank(&[Cell::Empty, Cell::Text(" ".into())]));
        assert!(!row_is_blank(&[Cell::Empty, Cell::Text("PE".into())]));
    }

    #[test]
    fn amounts_parse_leniently() {
        assert_eq!(parse_amount("1,234.5"), Some(1234.5));
        assert_eq!(parse_amount("  42 "), Some(42.0));
        assert_eq!(parse_amount(""), None);
        assert_eq!(parse_amount("n/a"), None);
        assert_eq!(Cell::Text("2,000".into()).number(), Some(2000.0));
        assert_eq!(Cell::Bool(true).number(), None);
    }
}
