use crate::core::RechnungError;

/// Document formats the extractor accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Pdf,
    Png,
    Jpeg,
    Tiff,
    Text,
    Csv,
    Docx,
    Xlsx,
}

impl MediaKind {
    pub fn mime(&self) -> &'static str {
        match self {
            Self::Pdf => "application/pdf",
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Tiff => "image/tiff",
            Self::Text => "text/plain",
            Self::Csv => "text/csv",
            Self::Docx => DOCX_MIME,
            Self::Xlsx => XLSX_MIME,
        }
    }

    pub fn is_image(&self) -> bool {
        matches!(self, Self::Png | Self::Jpeg | Self::Tiff)
    }

    fn from_mime(mime: &str) -> Option<Self> {
        let essence = mime.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
        match essence.as_str() {
            "application/pdf" | "application/x-pdf" => Some(Self::Pdf),
            "image/png" => Some(Self::Png),
            "image/jpeg" | "image/jpg" | "image/pjpeg" => Some(Self::Jpeg),
            "image/tiff" | "image/tif" => Some(Self::Tiff),
            "text/plain" => Some(Self::Text),
            "text/csv" | "application/csv" => Some(Self::Csv),
            DOCX_MIME => Some(Self::Docx),
            XLSX_MIME => Some(Self::Xlsx),
            _ => None,
        }
    }

    fn from_extension(file_name: &str) -> Option<Self> {
        let (_, ext) = file_name.rsplit_once('.')?;
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "png" => Some(Self::Png),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "tif" | "tiff" => Some(Self::Tiff),
            "txt" | "text" => Some(Self::Text),
            "csv" => Some(Self::Csv),
            "docx" => Some(Self::Docx),
            "xlsx" => Some(Self::Xlsx),
            _ => None,
        }
    }

    fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(b"%PDF-") {
            Some(Self::Pdf)
        } else if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
            Some(Self::Png)
        } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Some(Self::Jpeg)
        } else if bytes.starts_with(b"II*\0") || bytes.starts_with(b"MM\0*") {
            Some(Self::Tiff)
        } else if bytes.starts_with(ZIP_MAGIC) {
            // entry names are stored uncompressed in the local headers
            if contains(bytes, b"word/document.xml") {
                Some(Self::Docx)
            } else if contains(bytes, b"xl/workbook.xml") {
                Some(Self::Xlsx)
            } else {
                None
            }
        } else {
            None
        }
    }
}

const DOCX_MIME: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
const XLSX_MIME: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const OLE_MAGIC: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

/// Formats recognized well enough to be named in the error message.
fn known_unsupported(file_name: Option<&str>, bytes: &[u8]) -> Option<&'static str> {
    let ext = file_name
        .and_then(|n| n.rsplit_once('.'))
        .map(|(_, e)| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("doc") => Some("legacy Word (.doc)"),
        Some("xls") => Some("legacy Excel (.xls)"),
        _ if bytes.starts_with(OLE_MAGIC) => Some("legacy Office"),
        _ if bytes.starts_with(ZIP_MAGIC) => Some("zip container"),
        _ => None,
    }
}

/// Resolve the document format: declared content type, then file
/// extension, then magic bytes.
///
/// Generic content types (`application/octet-stream`) count as undeclared.
/// Text is only accepted by declaration or extension, never sniffed.
pub fn detect_media_kind(
    declared: Option<&str>,
    file_name: Option<&str>,
    bytes: &[u8],
) -> Result<MediaKind, RechnungError> {
    if let Some(kind) = declared.and_then(MediaKind::from_mime) {
        return Ok(kind);
    }
    if let Some(kind) = file_name.and_then(MediaKind::from_extension) {
        return Ok(kind);
    }
    if let Some(kind) = MediaKind::sniff(bytes) {
        return Ok(kind);
    }
    if let Some(format) = known_unsupported(file_name, bytes) {
        return Err(RechnungError::UnsupportedDocument(format!(
            "{format} documents are not supported"
        )));
    }
    Err(RechnungError::UnsupportedDocument(format!(
        "unrecognized document format (content type {}, file name {})",
        declared.unwrap_or("none"),
        file_name.unwrap_or("none"),
    )))
}
