use std::path::{Path, PathBuf};

use lopdf::{Document, Object, ObjectId, Stream, StringFormat, dictionary};
use sha2::{Digest, Sha256};
use tracing::{debug, error};

use super::embed::attach_factur_x;
use super::extract::extract_from_pdf;
use super::font::{PdfFont, resolve_font_path};
use super::profile::ZugferdProfile;
use super::render::{self, FONT_RESOURCE, LOGO_RESOURCE, LogoSize, PAGE_HEIGHT, PAGE_WIDTH};
use super::xmp::{XmpInfo, build_xmp};
use crate::core::*;

/// Longest logo edge in pixels kept in the PDF.
const LOGO_MAX_PIXELS: u32 = 800;

/// Packager settings.
#[derive(Debug, Clone, Default)]
pub struct PackagerConfig {
    /// TrueType font to embed; common system locations are searched when unset.
    pub font_path: Option<PathBuf>,
    /// Profile of the embedded CII XML.
    pub profile: ZugferdProfile,
}

/// Renders the human-readable invoice and embeds the CII XML as PDF/A-3b.
#[derive(Debug, Clone)]
pub struct ZugferdPdfPackager {
    font: PdfFont,
    profile: ZugferdProfile,
}

/// RGB logo flattened onto white.
struct LogoImage {
    width: u32,
    height: u32,
    rgb: Vec<u8>,
}

impl ZugferdPdfPackager {
    /// Load the embeddable font; fails with [`RechnungError::Packaging`] when none is usable.
    pub fn new(config: &PackagerConfig) -> Result<Self, RechnungError> {
        let path = resolve_font_path(config.font_path.as_deref())?;
        let font = PdfFont::load(&path)?;
        debug!(font = %path.display(), name = font.base_name(), "loaded PDF font");
        Ok(Self::with_font(font, config.profile))
    }

    pub fn with_font(font: PdfFont, profile: ZugferdProfile) -> Self {
        Self { font, profile }
    }

    pub fn profile(&self) -> ZugferdProfile {
        self.profile
    }

    /// Produce the PDF/A-3 bytes for `canonical` with `cii_xml` embedded.
    ///
    /// `logo` is optional; an unreadable logo fails the packaging. The
    /// embedded XML is read back from the finished bytes and must match.
    pub fn package(
        &self,
        canonical: &CanonicalInvoice,
        cii_xml: &str,
        logo: Option<&Path>,
    ) -> Result<Vec<u8>, RechnungError> {
        let invoice = canonical.invoice();
        let logo = logo
            .filter(|p| !p.as_os_str().is_empty())
            .map(load_logo)
            .transpose()?;

        let pages = render::render_pages(
            invoice,
            &self.font,
            logo.as_ref().map(|l| LogoSize {
                width: l.width,
                height: l.height,
            }),
        )?;

        let mut doc = Document::with_version("1.7");
        let pages_id = doc.new_object_id();
        let resources_id = self.resources(&mut doc, logo.as_ref());

        let mut kids = Vec::with_capacity(pages.len());
        for content in pages {
            let content_id = doc.add_object(Stream::new(dictionary! {}, content));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![
                    Object::Integer(0),
                    Object::Integer(0),
                    real(PAGE_WIDTH),
                    real(PAGE_HEIGHT),
                ],
                "Resources" => resources_id,
                "Contents" => content_id,
            });
            kids.push(Object::Reference(page_id));
        }
        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );

        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
            "Lang" => Object::string_literal("de-DE"),
        });
        doc.trailer.set("Root", catalog_id);

        let title = format!("{} {}", invoice.type_code.title(), invoice.number);
        let create_date = invoice.issue_date.format("%Y-%m-%d").to_string();
        let xmp = build_xmp(&XmpInfo {
            title: &title,
            author: &canonical.issuer().name,
            create_date: &create_date,
            profile: self.profile,
        });
        let mod_date = invoice.issue_date.format("D:%Y%m%d000000+00'00'").to_string();
        attach_factur_x(&mut doc, cii_xml, self.profile, xmp, &mod_date)?;

        let mut hasher = Sha256::new();
        hasher.update(invoice.number.as_bytes());
        hasher.update(cii_xml.as_bytes());
        let id = hasher.finalize()[..16].to_vec();
        doc.trailer.set(
            "ID",
            vec![
                Object::String(id.clone(), StringFormat::Hexadecimal),
                Object::String(id, StringFormat::Hexadecimal),
            ],
        );

        doc.compress();
        let mut bytes = Vec::new();
        doc.save_to(&mut bytes)
            .map_err(|e| RechnungError::Packaging(format!("failed to write PDF: {e}")))?;

        let embedded = extract_from_pdf(&bytes)?;
        if embedded != cii_xml {
            error!(invoice = %invoice.number, "embedded XML differs from generated XML");
            return Err(RechnungError::Packaging(
                "embedded XML does not match the generated XML".into(),
            ));
        }
        Ok(bytes)
    }

    /// Shared page resources: the font, device-independent default colour
    /// spaces, and the logo XObject.
    fn resources(&self, doc: &mut Document, logo: Option<&LogoImage>) -> ObjectId {
        let font_id = self.font.embed(doc);
        let cal_rgb_id = doc.add_object(vec![
            Object::Name(b"CalRGB".to_vec()),
            Object::Dictionary(dictionary! {
                "WhitePoint" => vec![real(0.9505), real(1.0), real(1.089)],
                "Gamma" => vec![real(2.2), real(2.2), real(2.2)],
                "Matrix" => vec![
                    real(0.4124), real(0.2126), real(0.0193),
                    real(0.3576), real(0.7152), real(0.1192),
                    real(0.1805), real(0.0722), real(0.9505),
                ],
            }),
        ]);
        let cal_gray_id = doc.add_object(vec![
            Object::Name(b"CalGray".to_vec()),
            Object::Dictionary(dictionary! {
                "WhitePoint" => vec![real(0.9505), real(1.0), real(1.089)],
                "Gamma" => real(2.2),
            }),
        ]);

        let mut resources = dictionary! {
            "Font" => dictionary! { FONT_RESOURCE => font_id },
            "ColorSpace" => dictionary! {
                "DefaultRGB" => cal_rgb_id,
                "DefaultGray" => cal_gray_id,
            },
        };
        if let Some(logo) = logo {
            let image_id = doc.add_object(Stream::new(
                dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Image",
                    "Width" => i64::from(logo.width),
                    "Height" => i64::from(logo.height),
                    "ColorSpace" => cal_rgb_id,
                    "BitsPerComponent" => 8,
                },
                logo.rgb.clone(),
            ));
            resources.set("XObject", dictionary! { LOGO_RESOURCE => image_id });
        }
        doc.add_object(resources)
    }
}

fn load_logo(path: &Path) -> Result<LogoImage, RechnungError> {
    let image = image::open(path).map_err(|e| {
        RechnungError::Packaging(format!("cannot load logo {}: {e}", path.display()))
    })?;
    let image = if image.width().max(image.height()) > LOGO_MAX_PIXELS {
        image.thumbnail(LOGO_MAX_PIXELS, LOGO_MAX_PIXELS)
    } else {
        image
    };

    let rgba = image.to_rgba8();
    let (width, height) = rgba.dimensions();
    let mut rgb = Vec::with_capacity(width as usize * height as usize * 3);
    for pixel in rgba.pixels() {
        let [r, g, b, a] = pixel.0;
        let alpha = u32::from(a);
        for channel in [r, g, b] {
            let blended = (u32::from(channel) * alpha + 255 * (255 - alpha)) / 255;
            rgb.push(blended as u8);
        }
    }
    Ok(LogoImage { width, height, rgb })
}

fn real(v: f32) -> Object {
    Object::Real(v.into())
}
