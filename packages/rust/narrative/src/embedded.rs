//! Files attached to a PDF through the `/EmbeddedFiles` name tree.

use std::path::{Path, PathBuf};

use jbook_shared::{EmbeddedFile, JbookError, Result};
use lopdf::{Dictionary, Document, Object};
use tracing::{debug, info, instrument, warn};

use crate::document::load_pdf;

/// An attachment found in the name tree, with its file specification.
struct Attachment<'a> {
    key: Option<String>,
    spec: &'a Dictionary,
}

/// List the embedded files of a PDF.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn list_embedded_files(path: &Path) -> Result<Vec<EmbeddedFile>> {
    let doc = load_pdf(path)?;
    let files: Vec<EmbeddedFile> = attachments(&doc)?
        .iter()
        .enumerate()
        .map(|(index, a)| describe(&doc, index, a))
        .collect();
    debug!(count = files.len(), "listed embedded files");
    Ok(files)
}

/// Write every embedded file into `out_dir`, returning the written paths.
///
/// Path separators in attachment names are replaced with `_`, and unnamed
/// attachments are written as `attachment_<index>`.
#[instrument(skip_all, fields(path = %path.display(), out_dir = %out_dir.display()))]
pub fn extract_embedded_files(path: &Path, out_dir: &Path) -> Result<Vec<PathBuf>> {
    let doc = load_pdf(path)?;
    std::fs::create_dir_all(out_dir).map_err(|e| JbookError::io(out_dir, e))?;

    let mut written = Vec::new();
    for (index, attachment) in attachments(&doc)?.iter().enumerate() {
        let Some(data) = attachment_bytes(&doc, attachment.spec)? else {
            warn!(index, "embedded file has no stream, skipping");
            continue;
        };
        let name = describe(&doc, index, attachment)
            .filename
            .unwrap_or_else(|| format!("attachment_{index}"));
        let target = out_dir.join(safe_file_name(&name));
        std::fs::write(&target, &data).map_err(|e| JbookError::io(&target, e))?;
        info!(file = %target.display(), bytes = data.len(), "extracted embedded file");
        written.push(target);
    }
    Ok(written)
}

/// Replace path separators so an attachment name stays inside `out_dir`.
pub fn safe_file_name(name: &str) -> String {
    let cleaned = name.replace(['/', '\\'], "_");
    match cleaned.as_str() {
        "" | "." | ".." => format!("_{cleaned}"),
        _ => cleaned,
    }
}

// ---------------------------------------------------------------------------
// Name tree walking
// ---------------------------------------------------------------------------

fn attachments(doc: &Document) -> Result<Vec<Attachment<'_>>> {
    let root = resolve(doc, doc.trailer.get(b"Root").map_err(pdf_err)?)?;
    let catalog = root.as_dict().map_err(pdf_err)?;

    let Some(names) = catalog.get(b"Names").ok() else {
        return Ok(Vec::new());
    };
    let names = resolve(doc, names)?.as_dict().map_err(pdf_err)?;
    let Some(tree) = names.get(b"EmbeddedFiles").ok() else {
        return Ok(Vec::new());
    };

    let mut out = Vec::new();
    walk_name_tree(doc, resolve(doc, tree)?, &mut out, 0)?;
    Ok(out)
}

const MAX_TREE_DEPTH: usize = 32;

fn walk_name_tree<'a>(
    doc: &'a Document,
    node: &'a Object,
    out: &mut Vec<Attachment<'a>>,
    depth: usize,
) -> Result<()> {
    if depth > MAX_TREE_DEPTH {
        return Err(JbookError::Pdf("embedded file name tree is too deep".into()));
    }
    let node = node.as_dict().map_err(pdf_err)?;

    if let Ok(pairs) = node.get(b"Names").and_then(Object::as_array) {
        for pair in pairs.chunks(2) {
            let [key, value] = pair else { continue };
            let key = resolve(doc, key)?.as_str().ok().map(decode_text_string);
            match resolve(doc, value)?.as_dict() {
                Ok(spec) => out.push(Attachment { key, spec }),
                Err(_) => warn!(?key, "embedded file entry is not a file specification"),
            }
        }
    }

    if let Ok(kids) = node.get(b"Kids").and_then(Object::as_array) {
        for kid in kids {
            walk_name_tree(doc, resolve(doc, kid)?, out, depth + 1)?;
        }
    }
    Ok(())
}

fn describe(doc: &Document, index: usize, attachment: &Attachment<'_>) -> EmbeddedFile {
    let text = |key: &[u8]| {
        attachment
            .spec
            .get(key)
            .ok()
            .and_then(|o| resolve(doc, o).ok())
            .and_then(|o| o.as_str().ok())
            .map(decode_text_string)
            .filter(|s| !s.is_empty())
    };

    EmbeddedFile {
        index,
        filename: text(b"F").or_else(|| attachment.key.clone()),
        unicode_filename: text(b"UF"),
        description: text(b"Desc"),
        size: embedded_stream(doc, attachment.spec).and_then(|stream| {
            let params = resolve(doc, stream.dict.get(b"Params").ok()?).ok()?;
            let size = params.as_dict().ok()?.get(b"Size").ok()?;
            u64::try_from(resolve(doc, size).ok()?.as_i64().ok()?).ok()
        }),
    }
}

fn embedded_stream<'a>(doc: &'a Document, spec: &'a Dictionary) -> Option<&'a lopdf::Stream> {
    let ef = resolve(doc, spec.get(b"EF").ok()?).ok()?.as_dict().ok()?;
    let file = ef.get(b"F").or_else(|_| ef.get(b"UF")).ok()?;
    resolve(doc, file).ok()?.as_stream().ok()
}

fn attachment_bytes(doc: &Document, spec: &Dictionary) -> Result<Option<Vec<u8>>> {
    let Some(stream) = embedded_stream(doc, spec) else {
        return Ok(None);
    };
    if stream.dict.has(b"Filter") {
        stream.decompressed_content().map(Some).map_err(pdf_err)
    } else {
        Ok(Some(stream.content.clone()))
    }
}

fn resolve<'a>(doc: &'a Document, object: &'a Object) -> Result<&'a Object> {
    doc.dereference(object)
        .map(|(_, obj)| obj)
        .map_err(pdf_err)
}

/// Decode a PDF text string: UTF-16BE with a byte-order mark, else Latin-1.
fn decode_text_string(bytes: &[u8]) -> String {
    match bytes {
        [0xFE, 0xFF, rest @ ..] => {
            let units: Vec<u16> = rest
                .chunks_exact(2)
                .map(|c| u16::from_be_bytes([c[0], c[1]]))
                .collect();
            String::from_utf16_lossy(&units)
        }
        _ => bytes.iter().map(|&b| b as char).collect(),
    }
}

fn pdf_err(e: lopdf::Error) -> JbookError {
    JbookError::Pdf(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::content::{Content, Operation};
    use lopdf::{Stream, dictionary};

    /// Build a one-page PDF carrying the given attachments.
    fn build_pdf(path: &Path, files: &[(&str, Option<&str>, &[u8])]) {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![72.into(), 720.into()]),
                Operation::new("Tj", vec![Object::string_literal("Mission Description")]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            }),
        );

        let mut names = Vec::new();
        for (name, desc, data) in files {
            let stream_id = doc.add_object(Stream::new(
                dictionary! {
                    "Type" => "EmbeddedFile",
                    "Params" => dictionary! { "Size" => data.len() as i64 },
                },
                data.to_vec(),
            ));
            let mut spec = dictionary! {
                "Type" => "Filespec",
                "F" => Object::string_literal(*name),
                "EF" => dictionary! { "F" => stream_id },
            };
            if let Some(desc) = desc {
                spec.set("Desc", Object::string_literal(*desc));
            }
            let spec_id = doc.add_object(spec);
            names.push(Object::string_literal(*name));
            names.push(spec_id.into());
        }
        let tree_id = doc.add_object(dictionary! { "Names" => names });
        let kids_id = doc.add_object(dictionary! { "Kids" => vec![tree_id.into()] });

        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
            "Names" => dictionary! { "EmbeddedFiles" => kids_id },
        });
        doc.trailer.set("Root", catalog_id);
        doc.save(path).unwrap();
    }

    #[test]
    fn lists_attachments_through_kids() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = dir.path().join("book.pdf");
        build_pdf(
            &pdf,
            &[
                ("r1d.xlsx", Some("R-1D export"), b"PK fake"),
                ("r3.xml", None, b"<Root/>"),
            ],
        );

        let files = list_embedded_files(&pdf).unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].index, 0);
        assert_eq!(files[0].filename.as_deref(), Some("r1d.xlsx"));
        assert_eq!(files[0].description.as_deref(), Some("R-1D export"));
        assert_eq!(files[0].size, Some(7));
        assert_eq!(files[1].filename.as_deref(), Some("r3.xml"));
        assert_eq!(files[1].description, None);
    }

    #[test]
    fn extracts_attachments_with_safe_names() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = dir.path().join("book.pdf");
        build_pdf(&pdf, &[("exports/r3.xml", None, b"<Root/>")]);

        let out = dir.path().join("embeds");
        let written = extract_embedded_files(&pdf, &out).unwrap();
        assert_eq!(written, vec![out.join("exports_r3.xml")]);
        assert_eq!(std::fs::read(&written[0]).unwrap(), b"<Root/>");
    }

    #[test]
    fn pdf_without_attachments_lists_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = dir.path().join("plain.pdf");
        build_pdf(&pdf, &[]);
        assert!(list_embedded_files(&pdf).unwrap().is_empty());
    }

    #[test]
    fn text_strings_decode_utf16_and_latin1() {
        assert_eq!(decode_text_string(&[0xFE, 0xFF, 0x00, 0x41, 0x00, 0xE9]), "Aé");
        assert_eq!(decode_text_string(b"plain"), "plain");
        assert_eq!(decode_text_string(&[0xE9]), "é");
    }

    #[test]
    fn safe_names_strip_separators() {
        assert_eq!(safe_file_name("a/b\\c.xml"), "a_b_c.xml");
        assert_eq!(safe_file_name(".."), "_..");
    }
}
