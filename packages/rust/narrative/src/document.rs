//! A J-Book PDF with its page text extracted once.

use std::path::{Path, PathBuf};

use jbook_shared::{JbookError, R2Sections, Result};
use lopdf::Document;
use tracing::{debug, instrument, warn};

use crate::sections::{extract_sections_from_text, is_r2_page_for, pe_pattern};

/// Page text of a narrative PDF, indexed by zero-based page number.
#[derive(Debug, Clone, Default)]
pub struct R2Document {
    path: Option<PathBuf>,
    pages: Vec<String>,
}

impl R2Document {
    /// Load a PDF and extract the text of every page.
    ///
    /// Pages whose text cannot be extracted are kept as empty strings so
    /// page indices stay aligned with the PDF.
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn open(path: &Path) -> Result<Self> {
        let doc = load_pdf(path)?;
        let page_numbers: Vec<u32> = doc.get_pages().keys().copied().collect();

        let mut pages = Vec::with_capacity(page_numbers.len());
        for number in page_numbers {
            match doc.extract_text(&[number]) {
                Ok(text) => pages.push(text),
                Err(e) => {
                    warn!(page = number, error = %e, "text extraction failed");
                    pages.push(String::new());
                }
            }
        }

        debug!(pages = pages.len(), "extracted PDF text");
        Ok(Self {
            path: Some(path.to_path_buf()),
            pages,
        })
    }

    /// Build a document from already-extracted page text.
    pub fn from_pages(pages: Vec<String>) -> Self {
        Self { path: None, pages }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn page_text(&self, index: usize) -> Option<&str> {
        self.pages.get(index).map(String::as_str)
    }

    /// Zero-based indices of the R-2 pages for `pe_number`.
    pub fn find_r2_pages(&self, pe_number: &str) -> Result<Vec<usize>> {
        let pe = pe_pattern(pe_number)?;
        Ok(self
            .pages
            .iter()
            .enumerate()
            .filter(|(_, text)| is_r2_page_for(text, &pe))
            .map(|(i, _)| i)
            .collect())
    }

    /// Narrative sections for `pe_number`, sliced from its R-2 pages.
    ///
    /// All sections are `None` when no page matches.
    pub fn extract_sections(&self, pe_number: &str) -> Result<R2Sections> {
        let page_ids = self.find_r2_pages(pe_number)?;
        if page_ids.is_empty() {
            debug!(pe = pe_number, "no R-2 pages found");
            return Ok(R2Sections::default());
        }

        let text = page_ids
            .iter()
            .map(|&i| self.pages[i].as_str())
            .collect::<Vec<_>>()
            .join("\n");
        debug!(pe = pe_number, pages = ?page_ids, "slicing R-2 sections");
        Ok(extract_sections_from_text(&text))
    }
}

pub(crate) fn load_pdf(path: &Path) -> Result<Document> {
    if !path.is_file() {
        return Err(JbookError::io(
            path,
            std::io::Error::new(std::io::ErrorKind::NotFound, "PDF not found"),
        ));
    }
    Document::load(path).map_err(|e| JbookError::Pdf(format!("{}: {e}", path.display())))
}
