#![no_main]

use libfuzzer_sys::fuzz_target;
use rechnungswerk::extract::{MediaKind, decode_document, detect_media_kind};

fuzz_target!(|data: &[u8]| {
    // Sniffed format first, then every decoder on the same bytes.
    if let Ok(kind) = detect_media_kind(None, None, data) {
        let _ = decode_document(kind, data);
    }
    for kind in [MediaKind::Pdf, MediaKind::Tiff, MediaKind::Text, MediaKind::Docx, MediaKind::Xlsx] {
        let _ = decode_document(kind, data);
    }
});
