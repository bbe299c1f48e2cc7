//! CSV reading and writing for enriched and tagged datasets.

use std::collections::HashMap;
use std::io::Write;
use std::path::Path;

use jbook_shared::{
    ENRICHED_COLUMNS, EnrichedRecord, JbookError, Relevance, Result, TAGGED_COLUMNS, TaggedRecord,
};
use tracing::{debug, info, instrument, warn};

/// Write the enriched CSV, creating parent directories.
#[instrument(skip_all, fields(path = %path.display(), rows = records.len()))]
pub fn write_enriched(path: &Path, records: &[EnrichedRecord]) -> Result<()> {
    let mut writer = csv::Writer::from_writer(create_file(path)?);
    writer.write_record(ENRICHED_COLUMNS).map_err(csv_err)?;
    for record in records {
        writer.write_record(enriched_fields(record)).map_err(csv_err)?;
    }
    writer.flush().map_err(|e| JbookError::io(path, e))?;
    info!(rows = records.len(), "wrote enriched CSV");
    Ok(())
}

/// Write the tagged CSV (enriched columns plus Relevance and Rationale).
#[instrument(skip_all, fields(path = %path.display(), rows = records.len()))]
pub fn write_tagged(path: &Path, records: &[TaggedRecord]) -> Result<()> {
    write_tagged_to(create_file(path)?, records)?;
    info!(rows = records.len(), "wrote tagged CSV");
    Ok(())
}

/// The tagged CSV as bytes, for exports that do not go straight to disk.
pub fn to_csv_bytes(records: &[TaggedRecord]) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    write_tagged_to(&mut buf, records)?;
    Ok(buf)
}

fn write_tagged_to<W: Write>(out: W, records: &[TaggedRecord]) -> Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(TAGGED_COLUMNS).map_err(csv_err)?;
    for tagged in records {
        let mut fields = enriched_fields(&tagged.record).to_vec();
        fields.push(tagged.relevance.to_string());
        fields.push(tagged.rationale.clone());
        writer.write_record(&fields).map_err(csv_err)?;
    }
    writer
        .flush()
        .map_err(|e| JbookError::Csv(format!("flush failed: {e}")))
}

fn create_file(path: &Path) -> Result<std::fs::File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| JbookError::io(parent, e))?;
    }
    std::fs::File::create(path).map_err(|e| JbookError::io(path, e))
}

fn enriched_fields(r: &EnrichedRecord) -> [String; 13] {
    [
        r.source_file.clone(),
        r.pe_number.clone(),
        r.pe_name.clone(),
        r.project_number.clone(),
        r.project_name.clone(),
        r.cost_category.clone(),
        fmt_amount(r.fy2023_cost),
        fmt_amount(r.fy2024_cost),
        fmt_amount(r.fy2025_base_cost),
        r.accomplishments_text.clone().unwrap_or_default(),
        r.acquisition_strategy_text.clone().unwrap_or_default(),
        r.is_new_start.map(fmt_bool).unwrap_or_default(),
        r.mission_description_text.clone().unwrap_or_default(),
    ]
}

fn fmt_amount(v: Option<f64>) -> String {
    v.map(|v| v.to_string()).unwrap_or_default()
}

fn fmt_bool(b: bool) -> String {
    if b { "True" } else { "False" }.to_string()
}

// ---------------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------------

/// Read an enriched or tagged CSV.
///
/// Columns are located by header name, so extra or reordered columns are
/// fine. A missing `Relevance` column defaults every row to Low.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn read_records(path: &Path) -> Result<Vec<TaggedRecord>> {
    let file = std::fs::File::open(path).map_err(|e| JbookError::io(path, e))?;
    let records = read_records_from(file)?;
    debug!(rows = records.len(), "read dataset");
    Ok(records)
}

pub(crate) fn read_records_from<R: std::io::Read>(input: R) -> Result<Vec<TaggedRecord>> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(input);
    let headers: HashMap<String, usize> = reader
        .headers()
        .map_err(csv_err)?
        .iter()
        .enumerate()
        .map(|(i, h)| (h.trim().trim_start_matches('\u{feff}').to_string(), i))
        .collect();

    let mut out = Vec::new();
    for (line, row) in reader.records().enumerate() {
        let row = row.map_err(csv_err)?;
        let raw = |name: &str| headers.get(name).and_then(|&i| row.get(i)).unwrap_or("");
        // Identifier and amount columns are trimmed; free text is kept verbatim.
        let field = |name: &str| raw(name).trim();
        let text = |name: &str| field(name).to_string();
        let opt_text = |name: &str| Some(raw(name)).filter(|s| !s.is_empty()).map(str::to_string);

        let relevance = match field("Relevance") {
            "" => Relevance::Low,
            label => label.parse().unwrap_or_else(|_| {
                warn!(line = line + 2, label, "unknown relevance label, using Low");
                Relevance::Low
            }),
        };

        out.push(TaggedRecord {
            record: EnrichedRecord {
                source_file: text("SourceFile"),
                pe_number: text("PENumber"),
                pe_name: text("PEName"),
                project_number: text("ProjectNumber"),
                project_name: text("ProjectName"),
                cost_category: text("CostCategory"),
                fy2023_cost: parse_number(field("FY2023_Cost")),
                fy2024_cost: parse_number(field("FY2024_Cost")),
                fy2025_base_cost: parse_number(field("FY2025_Base_Cost")),
                accomplishments_text: opt_text("AccomplishmentsText"),
                acquisition_strategy_text: opt_text("AcquisitionStrategyText"),
                is_new_start: parse_bool(field("IsNewStart")),
                mission_description_text: opt_text("MissionDescriptionText"),
            },
            relevance,
            rationale: raw("Rationale").to_string(),
        });
    }
    Ok(out)
}

/// Lenient number parsing: commas stripped, blanks and junk are `None`.
pub fn parse_number(s: &str) -> Option<f64> {
    jbook_tables::cell::parse_amount(s)
}

/// `true/false/yes/no/1/0` in any case.
pub fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" => Some(true),
        "false" | "no" | "0" => Some(false),
        _ => None,
    }
}

fn csv_err(e: csv::Error) -> JbookError {
    JbookError::Csv(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> EnrichedRecord {
        EnrichedRecord {
            source_file: "book.pdf".into(),
            pe_number: "0603305A".into(),
            pe_name: "Army, Missile Defense".into(),
            project_number: "A12".into(),
            project_name: "Counter-UAS".into(),
            cost_category: "Project Totals".into(),
            fy2023_cost: Some(1250.5),
            fy2024_cost: None,
            fy2025_base_cost: Some(10.0),
            accomplishments_text: Some("Line one\nline \"two\"".into()),
            acquisition_strategy_text: None,
            is_new_start: Some(false),
            mission_description_text: Some("Mission".into()),
        }
    }

    #[test]
    fn enriched_csv_has_header_and_python_style_bools() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/out/enriched.csv");
        write_enriched(&path, &[record()]).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let header = text.lines().next().unwrap();
        assert_eq!(header, ENRICHED_COLUMNS.join(","));
        assert!(text.contains(",False,"));
        assert!(text.contains("\"Army, Missile Defense\""));

        let back = read_records(&path).unwrap();
        assert_eq!(back.len(), 1);
        assert_eq!(back[0].record, record());
        assert_eq!(back[0].relevance, Relevance::Low);
        assert_eq!(back[0].rationale, "");
    }

    #[test]
    fn tagged_bytes_include_relevance_columns() {
        let tagged = TaggedRecord {
            record: record(),
            relevance: Relevance::High,
            rationale: "Primary focus phrases matched".into(),
        };
        let bytes = to_csv_bytes(&[tagged.clone()]).unwrap();
        let text = String::from_utf8(bytes.clone()).unwrap();
        assert!(text.starts_with(&TAGGED_COLUMNS.join(",")));

        let back = read_records_from(bytes.as_slice()).unwrap();
        assert_eq!(back, vec![tagged]);
    }

    #[test]
    fn reads_by_header_name_leniently() {
        let csv = "\u{feff}PENumber,FY2023_Cost,Relevance,IsNewStart,Extra\n\
                   0601,\"1,500\",medium,yes,x\n\
                   0602,,bogus,0,y\n\
                   0603,n/a,,,\n";
        let rows = read_records_from(csv.as_bytes()).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].record.pe_number, "0601");
        assert_eq!(rows[0].record.fy2023_cost, Some(1500.0));
        assert_eq!(rows[0].relevance, Relevance::Medium);
        assert_eq!(rows[0].record.is_new_start, Some(true));
        assert_eq!(rows[0].record.project_name, "");
        assert_eq!(rows[1].relevance, Relevance::Low);
        assert_eq!(rows[1].record.is_new_start, Some(false));
        assert_eq!(rows[2].record.fy2023_cost, None);
        assert_eq!(rows[2].record.is_new_start, None);
    }

    #[test]
    fn free_text_survives_a_round_trip_verbatim() {
        let tagged = TaggedRecord {
            record: EnrichedRecord {
                pe_number: "0603305A".into(),
                mission_description_text: Some("  indented\nparagraph  ".into()),
                accomplishments_text: Some(" ".into()),
                ..record()
            },
            relevance: Relevance::Medium,
            rationale: " keyword in context ".into(),
        };
        let first = to_csv_bytes(&[tagged.clone()]).unwrap();
        let back = read_records_from(first.as_slice()).unwrap();
        assert_eq!(back, vec![tagged]);
        assert_eq!(to_csv_bytes(&back).unwrap(), first);

        let padded = "PENumber,FY2024_Cost,Rationale\n  0601  , 12.5 , why \n";
        let rows = read_records_from(padded.as_bytes()).unwrap();
        assert_eq!(rows[0].record.pe_number, "0601");
        assert_eq!(rows[0].record.fy2024_cost, Some(12.5));
        assert_eq!(rows[0].rationale, " why ");
    }

    #[test]
    fn bool_parsing() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool("No"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = read_records(Path::new("/nonexistent/enriched.csv")).unwrap_err();
        assert!(matches!(err, JbookError::Io { .. }));
    }
}
