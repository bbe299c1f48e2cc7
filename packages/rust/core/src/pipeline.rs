//! Fusion pipelines: one J-Book PDF (plus extra tables), or a batch of
//! structured files resolved against many PDFs.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use jbook_narrative::{R2Document, extract_embedded_files};
use jbook_shared::{CostRow, JbookError, R2Sections, Result};
use jbook_tables::parse_structured_files;
use tracing::{debug, info, instrument, warn};

use crate::dataset::write_enriched;
use crate::fusion::fuse;

/// Source name used when no PDF is given.
pub const NO_PDF_SOURCE: &str = "excel_only";

/// Source name of batch fusion output.
pub const BATCH_SOURCE: &str = "batch";

/// Structured inputs picked up from batch directories.
pub const BATCH_STRUCTURED_EXTENSIONS: [&str; 3] = ["xlsx", "xlsm", "xml"];

pub const PDF_EXTENSIONS: [&str; 1] = ["pdf"];

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called after each unit of work within a phase.
    fn item(&self, current: usize, total: usize, detail: &str);
    /// Called once with a one-line summary.
    fn done(&self, summary: &str);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn item(&self, _current: usize, _total: usize, _detail: &str) {}
    fn done(&self, _summary: &str) {}
}

// ---------------------------------------------------------------------------
// Single-document pipeline
// ---------------------------------------------------------------------------

/// Configuration for [`run_pipeline`].
#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    /// J-Book PDF; when absent only the extra inputs are fused.
    pub pdf: Option<PathBuf>,
    /// Enriched CSV to write.
    pub out: PathBuf,
    /// Structured files parsed alongside the PDF attachments.
    pub extra_inputs: Vec<PathBuf>,
    pub skip_r2: bool,
    pub use_r1d_description: bool,
}

/// Result of [`run_pipeline`].
#[derive(Debug)]
pub struct PipelineResult {
    pub out: PathBuf,
    /// Directory the PDF attachments were extracted into.
    pub work_dir: PathBuf,
    pub attachments: Vec<PathBuf>,
    pub structured_rows: usize,
    /// Unique PE numbers among the structured rows.
    pub pe_count: usize,
    /// PEs for which at least one narrative section was found.
    pub pes_with_narrative: usize,
    pub records: usize,
    pub elapsed: Duration,
}

/// Extract, parse, fuse and write one J-Book.
///
/// 1. Extract the PDF's embedded files into `<out dir>/<pdf stem>/attachments`
/// 2. Parse the attachments and extra inputs
/// 3. Slice R-2 narratives for every PE found
/// 4. Fuse and write the enriched CSV
#[instrument(skip_all, fields(pdf = ?config.pdf, out = %config.out.display()))]
pub fn run_pipeline(
    config: &PipelineConfig,
    progress: &dyn ProgressReporter,
) -> Result<PipelineResult> {
    let start = Instant::now();
    let pdf = config.pdf.as_deref();

    let base = pdf
        .and_then(Path::file_stem)
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| NO_PDF_SOURCE.to_string());
    let work_dir = config
        .out
        .parent()
        .unwrap_or_else(|| Path::new(""))
        .join(base)
        .join("attachments");
    std::fs::create_dir_all(&work_dir).map_err(|e| JbookError::io(&work_dir, e))?;

    // --- Phase 1: embedded files ---
    let attachments = match pdf {
        Some(pdf) => {
            progress.phase("Extracting embedded files");
            extract_embedded_files(pdf, &work_dir).unwrap_or_else(|e| {
                warn!(error = %e, "embedded file extraction failed");
                Vec::new()
            })
        }
        None => Vec::new(),
    };

    // --- Phase 2: structured tables ---
    progress.phase("Parsing structured tables");
    let inputs: Vec<PathBuf> = attachments
        .iter()
        .chain(&config.extra_inputs)
        .cloned()
        .collect();
    let rows = parse_structured_files(&inputs);
    let pes = unique_pes(&rows);
    info!(inputs = inputs.len(), rows = rows.len(), pes = pes.len(), "parsed structured inputs");

    // --- Phase 3: R-2 narratives ---
    let mut lookup = HashMap::new();
    if let (Some(pdf), false) = (pdf, config.skip_r2) {
        if !pes.is_empty() {
            progress.phase("Extracting R-2 narratives");
            lookup = match R2Document::open(pdf) {
                Ok(doc) => sections_for_all(&doc, &pes, progress),
                Err(e) => {
                    warn!(error = %e, "cannot read PDF text, narratives left empty");
                    pes.iter()
                        .map(|pe| (pe.clone(), R2Sections::default()))
                        .collect()
                }
            };
        }
    }
    let pes_with_narrative = lookup.values().filter(|s| !s.is_empty()).count();

    // --- Phase 4: fuse and write ---
    progress.phase("Writing enriched CSV");
    let source = pdf
        .and_then(Path::file_name)
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| NO_PDF_SOURCE.to_string());
    let records = fuse(&source, &rows, &lookup, config.use_r1d_description);
    write_enriched(&config.out, &records)?;

    let result = PipelineResult {
        out: config.out.clone(),
        work_dir,
        attachments,
        structured_rows: rows.len(),
        pe_count: pes.len(),
        pes_with_narrative,
        records: records.len(),
        elapsed: start.elapsed(),
    };
    progress.done(&format!(
        "Wrote {} rows to {}",
        result.records,
        result.out.display()
    ));
    info!(records = result.records, elapsed_ms = result.elapsed.as_millis() as u64, "pipeline complete");
    Ok(result)
}

/// Sections for every PE from one document; a failing PE gets empty sections.
fn sections_for_all(
    doc: &R2Document,
    pes: &[String],
    progress: &dyn ProgressReporter,
) -> HashMap<String, R2Sections> {
    pes.iter()
        .enumerate()
        .map(|(i, pe)| {
            progress.item(i + 1, pes.len(), pe);
            let sections = doc.extract_sections(pe).unwrap_or_else(|e| {
                warn!(pe = %pe, error = %e, "R-2 extraction failed");
                R2Sections::default()
            });
            (pe.clone(), sections)
        })
        .collect()
}

/// Sorted unique non-empty PE numbers.
pub fn unique_pes(rows: &[CostRow]) -> Vec<String> {
    rows.iter()
        .map(|r| r.pe_number.trim())
        .filter(|pe| !pe.is_empty())
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

// ---------------------------------------------------------------------------
// Batch pipeline
// ---------------------------------------------------------------------------

/// Configuration for [`run_batch`].
#[derive(Debug, Clone, Default)]
pub struct BatchConfig {
    pub out: PathBuf,
    pub structured_dirs: Vec<PathBuf>,
    pub structured_globs: Vec<String>,
    pub pdf_dirs: Vec<PathBuf>,
    pub pdf_globs: Vec<String>,
    pub skip_r2: bool,
    pub use_r1d_description: bool,
}

/// Result of [`run_batch`].
#[derive(Debug)]
pub struct BatchResult {
    pub out: PathBuf,
    pub structured_files: usize,
    pub pdf_files: usize,
    pub structured_rows: usize,
    pub pe_count: usize,
    pub pes_resolved: usize,
    pub records: usize,
    pub elapsed: Duration,
}

/// Fuse every structured file found with narratives from every PDF found.
#[instrument(skip_all, fields(out = %config.out.display()))]
pub fn run_batch(config: &BatchConfig, progress: &dyn ProgressReporter) -> Result<BatchResult> {
    let start = Instant::now();

    let structured = gather_files(
        &config.structured_dirs,
        &config.structured_globs,
        &BATCH_STRUCTURED_EXTENSIONS,
    );
    if structured.is_empty() {
        return Err(JbookError::validation(
            "no Excel/XML files found; provide --xlsx-dir or --xlsx-glob inputs",
        ));
    }

    progress.phase("Parsing structured tables");
    let rows = parse_structured_files(&structured);
    let pes = unique_pes(&rows);
    info!(files = structured.len(), rows = rows.len(), pes = pes.len(), "parsed structured inputs");

    let mut pdf_count = 0;
    let mut lookup = HashMap::new();
    if !config.skip_r2 {
        let pdfs = gather_files(&config.pdf_dirs, &config.pdf_globs, &PDF_EXTENSIONS);
        pdf_count = pdfs.len();
        if pdfs.is_empty() {
            info!("no PDFs provided, proceeding without R-2 extraction");
        } else {
            progress.phase("Scanning PDFs for R-2 narratives");
            let total = pdfs.len();
            let docs = pdfs.iter().enumerate().filter_map(|(i, path)| {
                progress.item(i + 1, total, &path.display().to_string());
                R2Document::open(path)
                    .inspect_err(|e| warn!(pdf = %path.display(), error = %e, "skipping unreadable PDF"))
                    .ok()
            });
            lookup = resolve_narratives(&pes, docs);
            info!(
                resolved = lookup.len(),
                unresolved = pes.len() - lookup.len(),
                "R-2 narrative scan complete"
            );
        }
    }

    progress.phase("Writing enriched CSV");
    let records = fuse(BATCH_SOURCE, &rows, &lookup, config.use_r1d_description);
    write_enriched(&config.out, &records)?;

    let result = BatchResult {
        out: config.out.clone(),
        structured_files: structured.len(),
        pdf_files: pdf_count,
        structured_rows: rows.len(),
        pe_count: pes.len(),
        pes_resolved: lookup.len(),
        records: records.len(),
        elapsed: start.elapsed(),
    };
    progress.done(&format!(
        "Wrote {} rows to {}",
        result.records,
        result.out.display()
    ));
    Ok(result)
}

/// Match PEs against documents in order.
///
/// A PE resolves on the first document with R-2 pages for it and is not
/// searched again. Documents are pulled lazily and the scan stops once
/// every PE is resolved.
pub fn resolve_narratives(
    pes: &[String],
    docs: impl IntoIterator<Item = R2Document>,
) -> HashMap<String, R2Sections> {
    let mut unresolved: Vec<&String> = pes.iter().collect();
    let mut lookup = HashMap::new();

    for doc in docs {
        if unresolved.is_empty() {
            break;
        }
        unresolved.retain(|pe| {
            let found = doc
                .find_r2_pages(pe)
                .map(|pages| !pages.is_empty())
                .unwrap_or(false);
            if !found {
                return true;
            }
            match doc.extract_sections(pe) {
                Ok(sections) => {
                    debug!(pe = %pe, pdf = ?doc.path(), "resolved R-2 narrative");
                    lookup.insert((*pe).clone(), sections);
                    false
                }
                Err(e) => {
                    warn!(pe = %pe, error = %e, "R-2 extraction failed");
                    true
                }
            }
        });
    }
    lookup
}

/// Collect files from directories (non-recursive, filtered by extension,
/// sorted per directory) and glob patterns, deduplicated in first-seen order.
///
/// Missing directories and bad patterns are skipped with a warning.
pub fn gather_files(dirs: &[PathBuf], globs: &[String], extensions: &[&str]) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for dir in dirs {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "skipping directory");
                continue;
            }
        };
        let mut found: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && has_extension(p, extensions))
            .collect();
        found.sort();
        files.extend(found);
    }

    for pattern in globs {
        match glob::glob(pattern) {
            Ok(paths) => files.extend(paths.filter_map(|p| p.ok()).filter(|p| p.is_file())),
            Err(e) => warn!(pattern = %pattern, error = %e, "invalid glob pattern"),
        }
    }

    let mut seen = HashSet::new();
    files.retain(|p| seen.insert(p.clone()));
    files
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| extensions.iter().any(|x| x.eq_ignore_ascii_case(ext)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use jbook_shared::EnrichedRecord;
    use lopdf::{Document, Object, Stream, dictionary};

    use crate::dataset::read_records;

    fn fixtures() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("../../../fixtures")
    }

    fn text_fixture(name: &str) -> String {
        std::fs::read_to_string(fixtures().join("text").join(name)).unwrap()
    }

    /// A one-page PDF with `files` attached.
    fn pdf_with_attachments(path: &Path, files: &[(&str, &[u8])]) {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            }),
        );
        let mut names = Vec::new();
        for (name, data) in files {
            let stream_id = doc.add_object(Stream::new(
                dictionary! { "Type" => "EmbeddedFile" },
                data.to_vec(),
            ));
            let spec_id = doc.add_object(dictionary! {
                "Type" => "Filespec",
                "F" => Object::string_literal(*name),
                "EF" => dictionary! { "F" => stream_id },
            });
            names.push(Object::string_literal(*name));
            names.push(spec_id.into());
        }
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
            "Names" => dictionary! {
                "EmbeddedFiles" => dictionary! { "Names" => names },
            },
        });
        doc.trailer.set("Root", catalog_id);
        doc.save(path).unwrap();
    }

    #[test]
    fn excel_only_pipeline_writes_enriched_csv() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out/enriched.csv");
        let config = PipelineConfig {
            out: out.clone(),
            extra_inputs: vec![fixtures().join("xml/r3_sample.xml")],
            ..Default::default()
        };

        let result = run_pipeline(&config, &SilentProgress).unwrap();
        assert_eq!(result.records, 4);
        assert_eq!(result.pe_count, 2);
        assert_eq!(result.pes_with_narrative, 0);
        assert_eq!(result.work_dir, dir.path().join("out/excel_only/attachments"));
        assert!(result.work_dir.is_dir());

        let records = read_records(&out).unwrap();
        assert_eq!(records.len(), 4);
        assert!(records.iter().all(|r| r.record.source_file == NO_PDF_SOURCE));
    }

    #[test]
    fn pdf_attachments_feed_the_parser() {
        let dir = tempfile::tempdir().unwrap();
        let xml = std::fs::read(fixtures().join("xml/r3_sample.xml")).unwrap();
        let pdf = dir.path().join("FY2025_Army.pdf");
        pdf_with_attachments(&pdf, &[("r3.xml", &xml)]);

        let out = dir.path().join("enriched.csv");
        let config = PipelineConfig {
            pdf: Some(pdf),
            out: out.clone(),
            ..Default::default()
        };
        let result = run_pipeline(&config, &SilentProgress).unwrap();

        assert_eq!(
            result.attachments,
            vec![dir.path().join("FY2025_Army/attachments/r3.xml")]
        );
        assert_eq!(result.records, 4);
        // The page carries no R-2 exhibit, so every PE is looked up but empty.
        assert_eq!(result.pes_with_narrative, 0);

        let records = read_records(&out).unwrap();
        assert_eq!(records[0].record.source_file, "FY2025_Army.pdf");
    }

    #[test]
    fn unreadable_pdf_still_fuses_extra_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = dir.path().join("broken.pdf");
        std::fs::write(&pdf, b"not a pdf").unwrap();

        let config = PipelineConfig {
            pdf: Some(pdf),
            out: dir.path().join("enriched.csv"),
            extra_inputs: vec![fixtures().join("xml/r3_sample.xml")],
            ..Default::default()
        };
        let result = run_pipeline(&config, &SilentProgress).unwrap();
        assert!(result.attachments.is_empty());
        assert_eq!(result.records, 4);
    }

    #[test]
    fn batch_requires_structured_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let config = BatchConfig {
            out: dir.path().join("batch.csv"),
            structured_dirs: vec![dir.path().to_path_buf()],
            ..Default::default()
        };
        let err = run_batch(&config, &SilentProgress).unwrap_err();
        assert!(matches!(err, JbookError::Validation { .. }));
    }

    #[test]
    fn batch_without_pdfs_fuses_structured_rows() {
        let dir = tempfile::tempdir().unwrap();
        let config = BatchConfig {
            out: dir.path().join("batch.csv"),
            structured_dirs: vec![fixtures().join("xml")],
            ..Default::default()
        };
        let result = run_batch(&config, &SilentProgress).unwrap();
        assert_eq!(result.structured_files, 1);
        assert_eq!(result.pdf_files, 0);
        assert_eq!(result.records, 4);

        let records = read_records(&config.out).unwrap();
        assert!(records.iter().all(|r| r.record.source_file == BATCH_SOURCE));
    }

    #[test]
    fn narratives_resolve_on_first_matching_document() {
        let first = R2Document::from_pages(vec![
            text_fixture("r1_summary_page.txt"),
            text_fixture("r2_page_other_pe.txt"),
        ]);
        let second = R2Document::from_pages(vec![
            text_fixture("r2_page_mission.txt"),
            text_fixture("r2_page_acquisition.txt"),
        ]);
        let pes = vec!["0603305A".to_string(), "0604115N".to_string(), "0000000X".to_string()];

        let lookup = resolve_narratives(&pes, vec![first, second]);
        assert_eq!(lookup.len(), 2);
        assert_eq!(lookup["0604115N"].is_new_start, Some(true));
        assert!(lookup["0603305A"].mission.is_some());
        assert!(!lookup.contains_key("0000000X"));

        let records: Vec<EnrichedRecord> = fuse(
            BATCH_SOURCE,
            &[CostRow {
                pe_number: "0604115N".into(),
                ..Default::default()
            }],
            &lookup,
            false,
        );
        assert_eq!(
            records[0].mission_description_text.as_deref(),
            Some("Develops hypersonic glide body technology.")
        );
    }

    #[test]
    fn resolution_stops_pulling_documents_once_done() {
        let pes = vec!["0604115N".to_string()];
        let mut pulled = 0;
        let docs = (0..3).map(|_| {
            pulled += 1;
            R2Document::from_pages(vec![text_fixture("r2_page_other_pe.txt")])
        });
        let lookup = resolve_narratives(&pes, docs);
        assert_eq!(lookup.len(), 1);
        assert_eq!(pulled, 2);
    }

    #[test]
    fn gather_files_filters_sorts_and_dedups() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.xlsx", "a.XML", "notes.txt", "c.xlsm"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        std::fs::create_dir(dir.path().join("nested.xlsx")).unwrap();

        let pattern = format!("{}/*.xlsx", dir.path().display());
        let files = gather_files(
            &[dir.path().to_path_buf(), dir.path().join("missing")],
            &[pattern, "[".to_string()],
            &BATCH_STRUCTURED_EXTENSIONS,
        );
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.XML", "b.xlsx", "c.xlsm"]);
    }

    #[test]
    fn unique_pes_are_sorted_and_trimmed() {
        let rows = vec![
            CostRow { pe_number: " 0604115N".into(), ..Default::default() },
            CostRow { pe_number: "0603305A".into(), ..Default::default() },
            CostRow { pe_number: "".into(), ..Default::default() },
            CostRow { pe_number: "0604115N".into(), ..Default::default() },
        ];
        assert_eq!(unique_pes(&rows), vec!["0603305A", "0604115N"]);
    }
}
