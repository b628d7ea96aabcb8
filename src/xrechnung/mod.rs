//! XRechnung XML generation (UBL 2.1).
//!
//! Implements the German XRechnung standard (v3.0) based on EN 16931.
//! The generator is a pure function of the [`CanonicalInvoice`](crate::core::CanonicalInvoice);
//! BR-DE rules that the pipeline cannot always satisfy from extracted
//! documents are reported by [`validate_xrechnung`] instead of failing.
//!
//! # Example
//!
//! ```no_run
//! use rechnungswerk::core::*;
//! use rechnungswerk::xrechnung;
//!
//! let canonical: CanonicalInvoice = todo!(); // validated via the normalizer
//! let ubl_xml = xrechnung::to_ubl_xml(&canonical).unwrap();
//! ```

mod ubl;
mod validate;
pub(crate) mod xml_utils;

pub(crate) use validate::check_generation_preconditions;
pub use ubl::to_ubl_xml;
pub use validate::validate_xrechnung;

/// XRechnung 3.0 specification identifier (BT-24).
pub const XRECHNUNG_CUSTOMIZATION_ID: &str =
    "urn:cen.eu:en16931:2017#compliant#urn:xeinkauf.de:kosit:xrechnung_3.0";

/// Peppol BIS Billing 3.0 profile identifier (BT-23).
pub const PEPPOL_PROFILE_ID: &str = "urn:fdc:peppol.eu:2017:poacc:billing:01:1.0";

/// UBL 2.1 namespace URIs.
pub mod ubl_ns {
    pub const INVOICE: &str = "urn:oasis:names:specification:ubl:schema:xsd:Invoice-2";
    pub const CREDIT_NOTE: &str = "urn:oasis:names:specification:ubl:schema:xsd:CreditNote-2";
    pub const CAC: &str =
        "urn:oasis:names:specification:ubl:schema:xsd:CommonAggregateComponents-2";
    pub const CBC: &str = "urn:oasis:names:specification:ubl:schema:xsd:CommonBasicComponents-2";
}

/// CII namespace URIs.
pub mod cii_ns {
    pub const RSM: &str = "urn:un:unece:uncefact:data:standard:CrossIndustryInvoice:100";
    pub const RAM: &str =
        "urn:un:unece:uncefact:data:standard:ReusableAggregateBusinessInformationEntity:100";
    pub const QDT: &str = "urn:un:unece:uncefact:data:standard:QualifiedDataType:100";
    pub const UDT: &str = "urn:un:unece:uncefact:data:standard:UnqualifiedDataType:100";
}
