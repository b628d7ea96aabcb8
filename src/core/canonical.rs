use serde::Serialize;

use super::error::RechnungError;
use super::types::*;
use super::validation;

/// Which party of the invoice the configured firm data describes.
///
/// The pipeline only issues invoices on its own behalf, so the firm data
/// always fills the seller (BG-4) and the payee account (BG-17).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssuerRole {
    Seller,
}

/// A validated invoice that all generators consume.
///
/// Constructed only through [`CanonicalInvoice::try_from_invoice`], which
/// re-runs the §14 UStG, EN 16931 and arithmetic checks; there is no way
/// to mutate it afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanonicalInvoice {
    issuer_role: IssuerRole,
    #[serde(flatten)]
    invoice: Invoice,
}

impl CanonicalInvoice {
    pub fn try_from_invoice(invoice: Invoice) -> Result<Self, RechnungError> {
        let mut errors = validation::validate_14_ustg(&invoice);
        errors.extend(validation::validate_en16931(&invoice));
        RechnungError::check(errors)?;
        Ok(Self {
            issuer_role: IssuerRole::Seller,
            invoice,
        })
    }

    pub fn invoice(&self) -> &Invoice {
        &self.invoice
    }

    pub fn issuer_role(&self) -> IssuerRole {
        self.issuer_role
    }

    /// The party the firm data populated.
    pub fn issuer(&self) -> &Party {
        match self.issuer_role {
            IssuerRole::Seller => &self.invoice.seller,
        }
    }

    /// The extracted other party.
    pub fn counterparty(&self) -> &Party {
        match self.issuer_role {
            IssuerRole::Seller => &self.invoice.buyer,
        }
    }

    /// Document totals; construction guarantees their presence, so a
    /// missing value surfaces as a generation defect.
    pub fn totals(&self) -> Result<&Totals, RechnungError> {
        self.invoice
            .totals
            .as_ref()
            .ok_or_else(|| RechnungError::Generation("canonical invoice without totals".into()))
    }

    /// Pretty JSON rendering written as `canonical.json`.
    pub fn to_json(&self) -> Result<String, RechnungError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| RechnungError::Generation(format!("canonical JSON: {e}")))
    }
}
