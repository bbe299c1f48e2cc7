//! Heuristic reader for R-3 style XML exports.
//!
//! Element names vary by service and volume, so each level accepts a set
//! of aliases and reads values from either an attribute or a direct child.

use std::path::Path;

use jbook_shared::{CostRow, JbookError, Result};
use roxmltree::{Document, Node, ParsingOptions};
use tracing::{debug, instrument};

use crate::cell::parse_amount;

const PE_TAGS: &[&str] = &["ProgramElement", "PROGRAM_ELEMENT", "Pe", "PE"];
const PROJECT_TAGS: &[&str] = &["Project", "PROJECT", "Proj"];
const LINE_TAGS: &[&str] = &["CostCategory", "COST_CATEGORY", "Line", "COST_LINE", "CostItem"];

/// Parse an XML file from disk.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn parse_xml_file(path: &Path) -> Result<Vec<CostRow>> {
    let text = std::fs::read_to_string(path).map_err(|e| JbookError::io(path, e))?;
    parse_xml_str(&text)
}

/// Parse XML text into cost rows.
pub fn parse_xml_str(text: &str) -> Result<Vec<CostRow>> {
    let opts = ParsingOptions {
        allow_dtd: true,
        ..ParsingOptions::default()
    };
    let doc = Document::parse_with_options(text, opts)
        .map_err(|e| JbookError::parse(format!("invalid XML: {e}")))?;

    let mut rows = Vec::new();
    for pe in doc.descendants().filter(|n| has_any_tag(n, PE_TAGS)) {
        let Some(pe_number) = value(&pe, "number", &["Number", "PROGRAM_ELEMENT_NUMBER", "PeNumber"])
        else {
            continue;
        };
        let pe_name = value(&pe, "name", &["Name", "PROGRAM_ELEMENT_TITLE", "PeName"]);

        for project in strict_descendants(pe, PROJECT_TAGS) {
            let project_number = value(&project, "number", &["Number", "PROJECT_NUMBER"]);
            let project_name = value(&project, "name", &["Name", "PROJECT_TITLE"]);

            for line in strict_descendants(project, LINE_TAGS) {
                rows.push(CostRow {
                    pe_number: pe_number.clone(),
                    pe_name: pe_name.clone().unwrap_or_default(),
                    project_number: project_number.clone().unwrap_or_default(),
                    project_name: project_name.clone().unwrap_or_default(),
                    cost_category: value(&line, "name", &["Name", "COST_CATEGORY", "LINE_NAME"])
                        .unwrap_or_default(),
                    fy2023_cost: amount(&line, "FY2023", &["FY2023"]),
                    fy2024_cost: amount(&line, "FY2024", &["FY2024"]),
                    fy2025_base_cost: amount(
                        &line,
                        "FY2025Base",
                        &["FY2025Base", "FY2025_Base", "FY2025"],
                    ),
                    r1d_description: None,
                });
            }
        }
    }

    debug!(rows = rows.len(), "parsed XML document");
    Ok(rows)
}

fn has_any_tag(node: &Node<'_, '_>, tags: &[&str]) -> bool {
    node.is_element() && tags.contains(&node.tag_name().name())
}

/// Descendants of `node` (excluding itself) whose tag is in `tags`.
fn strict_descendants<'a, 'input>(
    node: Node<'a, 'input>,
    tags: &'static [&'static str],
) -> impl Iterator<Item = Node<'a, 'input>> {
    node.descendants()
        .skip(1)
        .filter(move |n| has_any_tag(n, tags))
}

/// Attribute `attr`, else the text of the first direct child named in
/// `children`. Empty strings count as missing.
fn value(node: &Node<'_, '_>, attr: &str, children: &[&str]) -> Option<String> {
    non_empty(node.attribute(attr)).or_else(|| {
        children.iter().find_map(|tag| {
            let child = node
                .children()
                .find(|c| c.is_element() && c.tag_name().name() == *tag)?;
            non_empty(child.text())
        })
    })
}

fn amount(node: &Node<'_, '_>, attr: &str, children: &[&str]) -> Option<f64> {
    value(node, attr, children).and_then(|s| parse_amount(&s))
}

fn non_empty(s: Option<&str>) -> Option<String> {
    s.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/../../../fixtures/xml/r3_sample.xml"
    );

    #[test]
    fn parses_fixture() {
        let rows = parse_xml_file(Path::new(FIXTURE)).unwrap();
        assert_eq!(rows.len(), 4);

        let first = &rows[0];
        assert_eq!(first.pe_number, "0603305A");
        assert_eq!(first.pe_name, "Army Missile Defense Systems Integration");
        assert_eq!(first.project_number, "A12");
        assert_eq!(first.project_name, "Counter-UAS Development");
        assert_eq!(first.cost_category, "Product Development");
        assert_eq!(first.fy2023_cost, Some(1250.5));
        assert_eq!(first.fy2024_cost, Some(1400.0));
        assert_eq!(first.fy2025_base_cost, Some(1530.25));

        // child elements and the FY2025_Base alias
        let second = &rows[1];
        assert_eq!(second.cost_category, "Test and Evaluation");
        assert_eq!(second.fy2023_cost, None);
        assert_eq!(second.fy2025_base_cost, Some(88.0));

        let upper = &rows[3];
        assert_eq!(upper.pe_number, "0604115N");
        assert_eq!(upper.project_name, "Hypersonic Glide Body");
        assert_eq!(upper.fy2025_base_cost, Some(42.0));
    }

    #[test]
    fn pe_without_number_is_skipped() {
        let xml = r#"<Root>
            <ProgramElement name="No number">
              <Project number="P1"><Line name="L" FY2023="1"/></Project>
            </ProgramElement>
        </Root>"#;
        assert!(parse_xml_str(xml).unwrap().is_empty());
    }

    #[test]
    fn empty_attribute_falls_back_to_child() {
        let xml = r#"<Root>
            <PE number=""><Number>0601</Number>
              <Proj><Number>P7</Number><CostItem><Name>Labor</Name><FY2024> 3,000 </FY2024></CostItem></Proj>
            </PE>
        </Root>"#;
        let rows = parse_xml_str(xml).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].pe_number, "0601");
        assert_eq!(rows[0].project_number, "P7");
        assert_eq!(rows[0].cost_category, "Labor");
        assert_eq!(rows[0].fy2024_cost, Some(3000.0));
        assert_eq!(rows[0].pe_name, "");
    }

    #[test]
    fn malformed_xml_is_a_parse_error() {
        let err = parse_xml_str("<Root><PE>").unwrap_err();
        assert!(matches!(err, JbookError::Parse { .. }));
    }
}
