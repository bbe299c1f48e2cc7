//! Narrative extraction from J-Book PDFs.
//!
//! [`R2Document`] holds the extracted page text of a PDF and slices the
//! Exhibit R-2 sections (mission, accomplishments, acquisition strategy,
//! new-start flag) for a Program Element. [`list_embedded_files`] and
//! [`extract_embedded_files`] read the R-1D/R-3 attachments that J-Books
//! carry alongside the narrative.

pub mod document;
pub mod embedded;
pub mod sections;

pub use document::R2Document;
pub use embedded::{extract_embedded_files, list_embedded_files, safe_file_name};
pub use sections::{R2_TITLE_MARKERS, detect_new_start, extract_sections_from_text, pe_pattern};
