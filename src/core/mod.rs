//! Core invoice types, validation, and the canonical invoice model.
//!
//! This module provides the foundational types for German invoicing
//! based on the EN 16931 semantic model, with §14 UStG validation and
//! currency-aware arithmetic.

mod builder;
mod canonical;
pub mod countries;
pub mod currencies;
mod error;
pub mod iban;
mod types;
pub mod units;
mod validation;

pub use builder::*;
pub use canonical::{CanonicalInvoice, IssuerRole};
pub use error::*;
pub use types::*;
pub use units::{is_known_unit_code, unit_code_for_label};
pub use validation::*;
