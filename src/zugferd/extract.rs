use lopdf::{Dictionary, Document, Object};

use super::FACTURX_FILENAME;
use crate::core::RechnungError;

/// Read the embedded Factur-X/ZUGFeRD XML back out of PDF bytes.
///
/// Looks in the `EmbeddedFiles` name tree first, then in the catalog's
/// `/AF` array. Older ZUGFeRD file names (`zugferd-invoice.xml`) are accepted.
pub fn extract_from_pdf(pdf_bytes: &[u8]) -> Result<String, RechnungError> {
    let doc = Document::load_mem(pdf_bytes)
        .map_err(|e| RechnungError::Packaging(format!("failed to load PDF: {e}")))?;
    embedded_xml(&doc)
}

/// Same as [`extract_from_pdf`] for an already parsed document.
pub fn embedded_xml(doc: &Document) -> Result<String, RechnungError> {
    via_name_tree(doc)
        .or_else(|first| via_associated_files(doc).map_err(|second| format!("{first}; {second}")))
        .map_err(|e| RechnungError::Packaging(format!("no {FACTURX_FILENAME} in PDF: {e}")))
}

type Lookup<T> = Result<T, String>;

fn via_name_tree(doc: &Document) -> Lookup<String> {
    let catalog = doc.catalog().map_err(|e| e.to_string())?;
    let names = resolve_dict(doc, catalog.get(b"Names").map_err(|e| e.to_string())?)?;
    let tree = resolve_dict(doc, names.get(b"EmbeddedFiles").map_err(|e| e.to_string())?)?;
    let entries = tree
        .get(b"Names")
        .and_then(Object::as_array)
        .map_err(|e| e.to_string())?;

    // [name1, filespec1, name2, filespec2, ...]
    entries
        .chunks_exact(2)
        .find(|pair| as_text(&pair[0]).is_some_and(|n| is_invoice_filename(&n)))
        .ok_or_else(|| "name tree has no invoice entry".to_string())
        .and_then(|pair| read_filespec(doc, resolve_dict(doc, &pair[1])?))
}

fn via_associated_files(doc: &Document) -> Lookup<String> {
    let catalog = doc.catalog().map_err(|e| e.to_string())?;
    let af = catalog
        .get(b"AF")
        .and_then(Object::as_array)
        .map_err(|e| e.to_string())?;

    for entry in af {
        let filespec = resolve_dict(doc, entry)?;
        let name = filespec
            .get(b"UF")
            .or_else(|_| filespec.get(b"F"))
            .ok()
            .and_then(as_text);
        if name.is_some_and(|n| is_invoice_filename(&n)) {
            return read_filespec(doc, filespec);
        }
    }
    Err("AF array has no invoice entry".to_string())
}

fn read_filespec(doc: &Document, filespec: &Dictionary) -> Lookup<String> {
    let ef = resolve_dict(doc, filespec.get(b"EF").map_err(|e| e.to_string())?)?;
    let stream_obj = match ef.get(b"F").map_err(|e| e.to_string())? {
        Object::Reference(id) => doc.get_object(*id).map_err(|e| e.to_string())?,
        other => other,
    };
    let stream = stream_obj.as_stream().map_err(|e| e.to_string())?;

    // Unfiltered streams make decompressed_content() fail; use the raw bytes then
    let content = stream
        .decompressed_content()
        .unwrap_or_else(|_| stream.content.clone());
    String::from_utf8(content).map_err(|e| e.to_string())
}

fn resolve_dict<'a>(doc: &'a Document, obj: &'a Object) -> Lookup<&'a Dictionary> {
    match obj {
        Object::Reference(id) => doc.get_dictionary(*id).map_err(|e| e.to_string()),
        Object::Dictionary(d) => Ok(d),
        _ => Err("expected dictionary or reference".to_string()),
    }
}

fn as_text(obj: &Object) -> Option<String> {
    match obj {
        Object::String(bytes, _) => String::from_utf8(bytes.clone()).ok(),
        _ => None,
    }
}

fn is_invoice_filename(name: &str) -> bool {
    let lower = name.to_lowercase();
    lower == FACTURX_FILENAME || lower.contains("zugferd") || lower.contains("factur-x")
}
