//! Exhibit R-2 page matching and section slicing over extracted text.

use std::sync::LazyLock;

use jbook_shared::{JbookError, R2Sections, Result};
use regex::Regex;

/// Substrings that mark a page as an R-2 / R-2A exhibit.
pub const R2_TITLE_MARKERS: &[&str] = &[
    "Exhibit R-2",
    "Exhibit R-2A",
    "R-2 Budget Item Justification",
    "R-2A",
];

static MISSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)A\.\s*Mission Description and Budget Item Justification\b")
        .expect("valid regex")
});

static ACCOMPLISHMENTS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)C\.\s*Accomplishments/Planned Programs\b").expect("valid regex")
});

static ACQUISITION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)D\.\s*Acquisition Strategy\b").expect("valid regex")
});

// Any lettered header line: "B. Program Change Summary", "E. Performance Metrics", ...
static LETTERED_HEADER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]*[A-Z]\.\s").expect("valid regex"));

static NEW_START_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)New\s*Start\s*[:\-]?\s*(Yes|No)\b").expect("valid regex")
});

/// Regex matching a PE number, optionally prefixed by `PE`.
pub fn pe_pattern(pe_number: &str) -> Result<Regex> {
    let pattern = format!(r"\b(?:PE\s*)?{}\b", regex::escape(pe_number.trim()));
    Regex::new(&pattern).map_err(|e| JbookError::parse(format!("invalid PE pattern: {e}")))
}

/// Whether a page's text is an R-2 exhibit page for the PE matched by `pe`.
pub fn is_r2_page_for(text: &str, pe: &Regex) -> bool {
    R2_TITLE_MARKERS.iter().any(|m| text.contains(m)) && pe.is_match(text)
}

/// Slice the narrative sections out of a PE's joined R-2 text.
pub fn extract_sections_from_text(text: &str) -> R2Sections {
    R2Sections {
        mission: slice_section(
            text,
            &MISSION_RE,
            &[&ACCOMPLISHMENTS_RE, &ACQUISITION_RE, &LETTERED_HEADER_RE],
        ),
        accomplishments: slice_section(
            text,
            &ACCOMPLISHMENTS_RE,
            &[&ACQUISITION_RE, &LETTERED_HEADER_RE],
        ),
        acquisition: slice_section(text, &ACQUISITION_RE, &[&LETTERED_HEADER_RE]),
        is_new_start: detect_new_start(text),
    }
}

/// Text between the end of `start` and the nearest match of any `ends`.
fn slice_section(text: &str, start: &Regex, ends: &[&Regex]) -> Option<String> {
    let begin = start.find(text)?.end();
    let end = ends
        .iter()
        .filter_map(|re| re.find_at(text, begin))
        .map(|m| m.start())
        .min()
        .unwrap_or(text.len());
    Some(normalize_whitespace(&text[begin..end]))
}

/// "New Start: Yes/No" flag, if stated.
pub fn detect_new_start(text: &str) -> Option<bool> {
    NEW_START_RE
        .captures(text)
        .map(|c| c[1].eq_ignore_ascii_case("yes"))
}

fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const MISSION_PAGE: &str = include_str!("../../../../fixtures/text/r2_page_mission.txt");
    const ACQUISITION_PAGE: &str =
        include_str!("../../../../fixtures/text/r2_page_acquisition.txt");

    #[test]
    fn pe_pattern_respects_word_boundaries() {
        let re = pe_pattern("0603305A").unwrap();
        assert!(re.is_match("PE 0603305A / Army"));
        assert!(re.is_match("R-1 line 0603305A"));
        assert!(!re.is_match("PE 0603305AB"));
        assert!(!re.is_match("X0603305A"));
    }

    #[test]
    fn r2_page_needs_marker_and_pe() {
        let re = pe_pattern("0603305A").unwrap();
        assert!(is_r2_page_for(MISSION_PAGE, &re));
        assert!(!is_r2_page_for("PE 0603305A without an exhibit title", &re));
        assert!(!is_r2_page_for("Exhibit R-2 for PE 0604115N", &re));
    }

    #[test]
    fn slices_sections_across_pages() {
        let text = format!("{MISSION_PAGE}\n{ACQUISITION_PAGE}");
        let sections = extract_sections_from_text(&text);

        assert_eq!(
            sections.mission.as_deref(),
            Some(
                "This program element develops counter-UAS capabilities and integrates hypersonic defense sensors."
            )
        );

        let acc = sections.accomplishments.unwrap();
        assert!(acc.starts_with("($ in Millions) Title: Counter-UAS Development"));
        assert!(acc.ends_with("Transition directed energy prototypes."));

        assert_eq!(
            sections.acquisition.as_deref(),
            Some("Competitive prototyping followed by production award.")
        );
        assert_eq!(sections.is_new_start, Some(false));
    }

    #[test]
    fn lettered_line_mid_text_ends_section() {
        let text = "A. Mission Description and Budget Item Justification\n\
                    Funds radar work. See para. 3 for details.\n\
                    B. Program Change Summary\n\
                    Previous President's Budget 12.000";
        let sections = extract_sections_from_text(text);
        assert_eq!(
            sections.mission.as_deref(),
            Some("Funds radar work. See para. 3 for details.")
        );
    }

    #[test]
    fn missing_start_header_gives_none() {
        let sections = extract_sections_from_text("Exhibit R-2\nNothing useful here");
        assert!(sections.is_empty());
    }

    #[test]
    fn section_without_end_runs_to_end_of_text() {
        let sections = extract_sections_from_text("d. acquisition strategy\n  sole source   award ");
        assert_eq!(sections.acquisition.as_deref(), Some("sole source award"));
    }

    #[test]
    fn new_start_variants() {
        assert_eq!(detect_new_start("New Start: Yes"), Some(true));
        assert_eq!(detect_new_start("NEW START - no"), Some(false));
        assert_eq!(detect_new_start("NewStart Yes"), Some(true));
        assert_eq!(detect_new_start("New Start: Maybe"), None);
    }
}
