use std::io::Cursor;

use image::{DynamicImage, GrayImage, ImageFormat, RgbImage};
use lopdf::{Document, Object, Stream};
use tracing::{debug, warn};

use super::media::MediaKind;
use super::model::PageImage;
use super::office;
use crate::core::RechnungError;

/// Below this many alphanumeric characters a PDF is treated as a scan.
pub const MIN_TEXT_LAYER_ALNUM: usize = 50;

/// Page images handed to the model at most.
const MAX_PAGE_IMAGES: usize = 8;

/// Images smaller than this on both edges are logos or decoration.
const MIN_PAGE_IMAGE_EDGE: i64 = 300;

/// What the document itself yields before any model runs.
#[derive(Debug, Default)]
pub struct DecodedDocument {
    /// Sanitized text layer; `None` for scans and images.
    pub text: Option<String>,
    pub images: Vec<PageImage>,
}

/// Decode raw bytes of a known format.
pub fn decode_document(kind: MediaKind, bytes: &[u8]) -> Result<DecodedDocument, RechnungError> {
    match kind {
        MediaKind::Pdf => decode_pdf(bytes),
        MediaKind::Png | MediaKind::Jpeg => Ok(DecodedDocument {
            text: None,
            images: vec![PageImage::new(kind.mime(), bytes.to_vec())],
        }),
        MediaKind::Tiff => Ok(DecodedDocument {
            text: None,
            images: vec![tiff_to_png(bytes)?],
        }),
        MediaKind::Text | MediaKind::Csv => {
            let text = String::from_utf8_lossy(bytes);
            text_document(text.trim_start_matches('\u{feff}'), "text")
        }
        MediaKind::Docx => text_document(&office::docx_text(bytes)?, "DOCX"),
        MediaKind::Xlsx => text_document(&office::xlsx_text(bytes)?, "XLSX"),
    }
}

fn text_document(text: &str, what: &str) -> Result<DecodedDocument, RechnungError> {
    let text = sanitize_text(text);
    if text.is_empty() {
        return Err(RechnungError::UnsupportedDocument(format!(
            "{what} document is empty"
        )));
    }
    Ok(DecodedDocument {
        text: Some(text),
        images: Vec::new(),
    })
}

/// Trim every line and drop leading and trailing blank lines.
pub fn sanitize_text(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

fn decode_pdf(bytes: &[u8]) -> Result<DecodedDocument, RechnungError> {
    let doc = Document::load_mem(bytes)
        .map_err(|e| RechnungError::UnsupportedDocument(format!("unreadable PDF: {e}")))?;

    // pdf-extract panics on some malformed font programs
    let text = match std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem(bytes)) {
        Ok(Ok(text)) => sanitize_text(&text),
        Ok(Err(e)) => {
            warn!(error = %e, "PDF text layer could not be read");
            String::new()
        }
        Err(_) => {
            warn!("PDF text extraction aborted");
            String::new()
        }
    };

    let alnum = text.chars().filter(|c| c.is_alphanumeric()).count();
    if alnum >= MIN_TEXT_LAYER_ALNUM {
        debug!(chars = text.len(), "using PDF text layer");
        return Ok(DecodedDocument {
            text: Some(text),
            images: Vec::new(),
        });
    }

    let images = page_images(&doc);
    debug!(alnum, images = images.len(), "PDF treated as scan");
    if images.is_empty() {
        return Err(RechnungError::UnsupportedDocument(
            "PDF has neither a text layer nor page images".into(),
        ));
    }
    Ok(DecodedDocument {
        text: None,
        images,
    })
}

/// Collect page-sized raster images in object order.
fn page_images(doc: &Document) -> Vec<PageImage> {
    doc.objects
        .values()
        .filter_map(|obj| obj.as_stream().ok())
        .filter(|stream| is_page_image(stream))
        .filter_map(|stream| match image_from_stream(stream) {
            Ok(image) => image,
            Err(e) => {
                warn!(error = %e, "skipping undecodable PDF image");
                None
            }
        })
        .take(MAX_PAGE_IMAGES)
        .collect()
}

fn is_page_image(stream: &Stream) -> bool {
    let dict = &stream.dict;
    let is_image = dict
        .get(b"Subtype")
        .and_then(Object::as_name)
        .is_ok_and(|name| name == b"Image");
    let edge = |key: &[u8]| dict.get(key).and_then(Object::as_i64).unwrap_or(0);
    is_image && (edge(b"Width") >= MIN_PAGE_IMAGE_EDGE || edge(b"Height") >= MIN_PAGE_IMAGE_EDGE)
}

fn filters(stream: &Stream) -> Vec<Vec<u8>> {
    match stream.dict.get(b"Filter") {
        Ok(Object::Name(name)) => vec![name.clone()],
        Ok(Object::Array(items)) => items
            .iter()
            .filter_map(|o| o.as_name().ok().map(<[u8]>::to_vec))
            .collect(),
        _ => Vec::new(),
    }
}

fn image_from_stream(stream: &Stream) -> Result<Option<PageImage>, String> {
    let filters = filters(stream);
    match filters.iter().map(Vec::as_slice).collect::<Vec<_>>().as_slice() {
        [b"DCTDecode"] => Ok(Some(PageImage::new("image/jpeg", stream.content.clone()))),
        [b"FlateDecode"] => flate_image(stream).map(Some),
        _ => Ok(None),
    }
}

fn flate_image(stream: &Stream) -> Result<PageImage, String> {
    let dict = &stream.dict;
    let int = |key: &[u8]| {
        dict.get(key)
            .and_then(Object::as_i64)
            .map_err(|e| format!("{}: {e}", String::from_utf8_lossy(key)))
    };
    let width = u32::try_from(int(b"Width")?).map_err(|e| e.to_string())?;
    let height = u32::try_from(int(b"Height")?).map_err(|e| e.to_string())?;
    if int(b"BitsPerComponent")? != 8 {
        return Err("only 8-bit images are decoded".into());
    }
    let color_space = dict
        .get(b"ColorSpace")
        .and_then(Object::as_name)
        .map_err(|e| format!("ColorSpace: {e}"))?;
    let raw = stream.decompressed_content().map_err(|e| e.to_string())?;

    let image = match color_space {
        b"DeviceRGB" => RgbImage::from_raw(width, height, raw).map(DynamicImage::ImageRgb8),
        b"DeviceGray" => GrayImage::from_raw(width, height, raw).map(DynamicImage::ImageLuma8),
        other => {
            return Err(format!(
                "unsupported colour space {}",
                String::from_utf8_lossy(other)
            ));
        }
    }
    .ok_or("image data shorter than its dimensions")?;
    encode_png(&image).map_err(|e| e.to_string())
}

fn tiff_to_png(bytes: &[u8]) -> Result<PageImage, RechnungError> {
    let image = image::load_from_memory_with_format(bytes, ImageFormat::Tiff)
        .map_err(|e| RechnungError::UnsupportedDocument(format!("unreadable TIFF: {e}")))?;
    encode_png(&image)
        .map_err(|e| RechnungError::UnsupportedDocument(format!("cannot re-encode TIFF: {e}")))
}

fn encode_png(image: &DynamicImage) -> Result<PageImage, image::ImageError> {
    let mut png = Vec::new();
    image.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;
    Ok(PageImage::new("image/png", png))
}
