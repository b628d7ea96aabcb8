use std::path::{Path, PathBuf};

use lopdf::{Dictionary, Document, Object, ObjectId, Stream, dictionary};
use ttf_parser::{Face, Permissions, name_id};

use crate::core::RechnungError;

/// TrueType fonts tried when no font path is configured.
const SYSTEM_FONT_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu-sans-fonts/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/liberation-sans/LiberationSans-Regular.ttf",
    "/Library/Fonts/Arial.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

/// CP1252 code points 0x80..=0x9F; `None` marks undefined slots.
const WIN_ANSI_HIGH: [Option<char>; 32] = [
    Some('€'), None, Some('‚'), Some('ƒ'), Some('„'), Some('…'), Some('†'), Some('‡'),
    Some('ˆ'), Some('‰'), Some('Š'), Some('‹'), Some('Œ'), None, Some('Ž'), None,
    None, Some('‘'), Some('’'), Some('“'), Some('”'), Some('•'), Some('–'), Some('—'),
    Some('˜'), Some('™'), Some('š'), Some('›'), Some('œ'), None, Some('ž'), Some('Ÿ'),
];

const FIRST_CHAR: u8 = 32;
const LAST_CHAR: u8 = 255;

/// Locate the font: the configured path, or the first system candidate that exists.
pub fn resolve_font_path(configured: Option<&Path>) -> Result<PathBuf, RechnungError> {
    if let Some(path) = configured {
        return Ok(path.to_path_buf());
    }
    SYSTEM_FONT_CANDIDATES
        .iter()
        .map(PathBuf::from)
        .find(|p| p.is_file())
        .ok_or_else(|| {
            RechnungError::Packaging(
                "no embeddable TrueType font found; configure a font path".into(),
            )
        })
}

/// An embeddable TrueType font with WinAnsi metrics.
#[derive(Debug, Clone)]
pub struct PdfFont {
    data: Vec<u8>,
    base_name: String,
    /// Advance widths in 1/1000 em for codes `FIRST_CHAR..=LAST_CHAR`.
    widths: Vec<i64>,
    ascent: i64,
    descent: i64,
    cap_height: i64,
    bbox: [i64; 4],
    italic_angle: f32,
}

impl PdfFont {
    pub fn load(path: &Path) -> Result<Self, RechnungError> {
        let data = std::fs::read(path).map_err(|e| {
            RechnungError::Packaging(format!("cannot read font {}: {e}", path.display()))
        })?;
        Self::from_bytes(data)
    }

    pub fn from_bytes(data: Vec<u8>) -> Result<Self, RechnungError> {
        let face = Face::parse(&data, 0)
            .map_err(|e| RechnungError::Packaging(format!("invalid TrueType font: {e}")))?;

        if face.tables().glyf.is_none() {
            return Err(RechnungError::Packaging(
                "font has no TrueType outlines (CFF fonts cannot be embedded as FontFile2)".into(),
            ));
        }
        if matches!(face.permissions(), Some(Permissions::Restricted)) {
            return Err(RechnungError::Packaging(
                "font license restricts embedding".into(),
            ));
        }

        let scale = 1000.0 / f32::from(face.units_per_em());
        let to_pdf = |v: f32| (v * scale).round() as i64;

        let missing_width = face
            .glyph_index(' ')
            .and_then(|g| face.glyph_hor_advance(g))
            .map_or(500, |w| to_pdf(f32::from(w)));
        let widths = (FIRST_CHAR..=LAST_CHAR)
            .map(|code| {
                decode_win_ansi(code)
                    .and_then(|c| face.glyph_index(c))
                    .and_then(|g| face.glyph_hor_advance(g))
                    .map_or(missing_width, |w| to_pdf(f32::from(w)))
            })
            .collect();

        let bbox = face.global_bounding_box();
        let base_name = face
            .names()
            .into_iter()
            .filter(|n| n.name_id == name_id::POST_SCRIPT_NAME)
            .find_map(|n| n.to_string())
            .map(|n| n.chars().filter(|c| c.is_ascii_alphanumeric() || *c == '-').collect())
            .filter(|n: &String| !n.is_empty())
            .unwrap_or_else(|| "EmbeddedSans".to_string());

        Ok(Self {
            ascent: to_pdf(f32::from(face.ascender())),
            descent: to_pdf(f32::from(face.descender())),
            cap_height: to_pdf(f32::from(face.capital_height().unwrap_or(face.ascender()))),
            bbox: [
                to_pdf(f32::from(bbox.x_min)),
                to_pdf(f32::from(bbox.y_min)),
                to_pdf(f32::from(bbox.x_max)),
                to_pdf(f32::from(bbox.y_max)),
            ],
            italic_angle: face.italic_angle(),
            widths,
            base_name,
            data,
        })
    }

    pub fn base_name(&self) -> &str {
        &self.base_name
    }

    /// Width of `text` in points at `size`, measured after WinAnsi encoding.
    pub fn text_width(&self, text: &str, size: f32) -> f32 {
        let units: i64 = encode_win_ansi(text)
            .into_iter()
            .map(|b| self.width_of(b))
            .sum();
        units as f32 * size / 1000.0
    }

    fn width_of(&self, code: u8) -> i64 {
        code.checked_sub(FIRST_CHAR)
            .and_then(|i| self.widths.get(usize::from(i)))
            .copied()
            .unwrap_or(0)
    }

    /// Add the font program, descriptor and simple-font dictionary to `doc`.
    pub fn embed(&self, doc: &mut Document) -> ObjectId {
        let file_id = doc.add_object(
            Stream::new(
                dictionary! { "Length1" => self.data.len() as i64 },
                self.data.clone(),
            )
            .with_compression(true),
        );

        let descriptor_id = doc.add_object(dictionary! {
            "Type" => "FontDescriptor",
            "FontName" => Object::Name(self.base_name.as_bytes().to_vec()),
            // Nonsymbolic
            "Flags" => 32,
            "FontBBox" => self.bbox.iter().map(|v| Object::Integer(*v)).collect::<Vec<_>>(),
            "ItalicAngle" => Object::Real(self.italic_angle),
            "Ascent" => self.ascent,
            "Descent" => self.descent,
            "CapHeight" => self.cap_height,
            "StemV" => 80,
            "MissingWidth" => self.width_of(b' '),
            "FontFile2" => file_id,
        });

        let mut font = Dictionary::new();
        font.set("Type", "Font");
        font.set("Subtype", "TrueType");
        font.set("BaseFont", Object::Name(self.base_name.as_bytes().to_vec()));
        font.set("FirstChar", i64::from(FIRST_CHAR));
        font.set("LastChar", i64::from(LAST_CHAR));
        font.set(
            "Widths",
            self.widths.iter().map(|w| Object::Integer(*w)).collect::<Vec<_>>(),
        );
        font.set("Encoding", "WinAnsiEncoding");
        font.set("FontDescriptor", descriptor_id);
        doc.add_object(font)
    }
}

/// Encode text as CP1252 bytes; characters outside the code page become `?`.
pub fn encode_win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| {
            let cp = u32::from(c);
            match cp {
                0x20..=0x7E | 0xA0..=0xFF => cp as u8,
                _ => WIN_ANSI_HIGH
                    .iter()
                    .position(|h| *h == Some(c))
                    .map_or(b'?', |i| 0x80 + i as u8),
            }
        })
        .collect()
}

fn decode_win_ansi(code: u8) -> Option<char> {
    match code {
        0x20..=0x7E | 0xA0..=0xFF => Some(char::from(code)),
        0x80..=0x9F => WIN_ANSI_HIGH[usize::from(code - 0x80)],
        _ => None,
    }
}
