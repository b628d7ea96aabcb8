//! # rechnungswerk
//!
//! Turns invoice documents (PDF, scans, plain text) into German e-invoices:
//! an XRechnung UBL file and a ZUGFeRD PDF/A-3 with embedded CII XML.
//!
//! A job runs extraction with a local model, validates and normalizes the
//! draft against the issuer's firm data into a [`CanonicalInvoice`], then
//! generates both XML formats from that single model and packages the PDF.
//!
//! All monetary values use [`rust_decimal::Decimal`], never floating point.
//! The core types follow the EN 16931 semantic model.
//!
//! ## Building a canonical invoice by hand
//!
//! ```rust
//! use chrono::NaiveDate;
//! use rechnungswerk::core::*;
//! use rust_decimal_macros::dec;
//!
//! let invoice = InvoiceBuilder::new("RE-2024-001", NaiveDate::from_ymd_opt(2024, 6, 15).unwrap())
//!     .tax_point_date(NaiveDate::from_ymd_opt(2024, 6, 15).unwrap())
//!     .seller(PartyBuilder::new("ACME GmbH", AddressBuilder::new("Berlin", "10115", "DE").build())
//!         .vat_id("DE123456789").build())
//!     .buyer(PartyBuilder::new("Kunde AG", AddressBuilder::new("München", "80331", "DE").build()).build())
//!     .add_line(LineItemBuilder::new("1", "Beratung", dec!(10), "HUR", dec!(150))
//!         .tax(TaxCategory::StandardRate, dec!(19)).build())
//!     .build_unchecked()
//!     .unwrap();
//!
//! let canonical = CanonicalInvoice::try_from_invoice(invoice).unwrap();
//! assert_eq!(canonical.totals().unwrap().gross_total, dec!(1785.00));
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `core` | Invoice types, totals, §14 UStG / EN 16931 rules, canonical model |
//! | `xrechnung` | XRechnung UBL 2.1 generation and advisories |
//! | `zugferd` | ZUGFeRD CII generation and PDF/A-3 packaging |
//! | `extract` | Document decoding and model-based extraction |
//! | `pipeline` | Normalizer, config store, job orchestration |
//! | `server` (default) | axum HTTP API and the `rechnungswerk` binary |

#[cfg(feature = "core")]
pub mod core;

#[cfg(feature = "xrechnung")]
pub mod xrechnung;

#[cfg(feature = "zugferd")]
pub mod zugferd;

#[cfg(feature = "extract")]
pub mod extract;

#[cfg(feature = "pipeline")]
pub mod config;

#[cfg(feature = "pipeline")]
pub mod normalize;

#[cfg(feature = "pipeline")]
pub mod pipeline;

#[cfg(feature = "server")]
pub mod server;

#[cfg(feature = "core")]
pub use crate::core::*;
