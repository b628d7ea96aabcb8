//! ZUGFeRD / Factur-X: CII generation and PDF/A-3 packaging.
//!
//! [`to_cii_xml`] maps the canonical invoice to UN/CEFACT CII D16B for a
//! chosen profile. [`ZugferdPdfPackager`] renders the human-readable invoice
//! and embeds that XML as `factur-x.xml` in a PDF/A-3b file.
//!
//! # Profiles
//!
//! | Profile | Use case |
//! |---------|----------|
//! | Minimum | Minimal machine-readable data |
//! | BasicWl | Basic without line items |
//! | Basic | Line items without full EN 16931 |
//! | EN16931 | Full European norm (default) |
//! | Extended | Beyond EN 16931 |
//! | XRechnung | German public sector |

mod cii;
mod embed;
mod extract;
mod font;
mod package;
mod profile;
mod render;
mod xmp;

pub use cii::to_cii_xml;
pub use extract::{embedded_xml, extract_from_pdf};
pub use font::{PdfFont, encode_win_ansi, resolve_font_path};
pub use package::{PackagerConfig, ZugferdPdfPackager};
pub use profile::ZugferdProfile;

/// The embedded XML filename per Factur-X 1.0+ specification.
pub const FACTURX_FILENAME: &str = "factur-x.xml";
