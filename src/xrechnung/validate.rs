use tracing::error;

use crate::core::*;

/// Mandatory values every generator relies on.
///
/// A canonical invoice always satisfies these; a failure here is a defect
/// upstream and is reported as [`RechnungError::Generation`].
pub(crate) fn check_generation_preconditions(
    canonical: &CanonicalInvoice,
    syntax: &str,
) -> Result<(), RechnungError> {
    let invoice = canonical.invoice();
    let mut missing = Vec::new();

    if invoice.number.trim().is_empty() {
        missing.push("BT-1 invoice number");
    }
    if invoice.currency_code.trim().is_empty() {
        missing.push("BT-5 currency code");
    }
    if invoice.seller.name.trim().is_empty() {
        missing.push("BT-27 seller name");
    }
    if invoice.buyer.name.trim().is_empty() {
        missing.push("BT-44 buyer name");
    }
    if invoice.lines.is_empty() {
        missing.push("BG-25 invoice line");
    }
    if invoice.totals.is_none() {
        missing.push("BG-22 document totals");
    }
    if invoice.lines.iter().any(|l| l.line_amount.is_none()) {
        missing.push("BT-131 line net amount");
    }

    if missing.is_empty() {
        return Ok(());
    }
    let message = format!("{syntax}: missing mandatory {}", missing.join(", "));
    error!(invoice = %invoice.number, "{message}");
    Err(RechnungError::Generation(message))
}

/// XRechnung-specific rules (BR-DE-*) checked against the canonical invoice.
///
/// These do not block output; the pipeline reports them as advisories.
pub fn validate_xrechnung(invoice: &Invoice) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    // BR-DE-1: Payment instructions (BG-16) must be provided
    if invoice.payment.is_none() {
        errors.push(ValidationError::with_rule(
            "payment",
            "XRechnung requires payment instructions (BG-16)",
            "BR-DE-1",
        ));
    }

    // BR-DE-2: Seller contact (BG-6) must be present
    match &invoice.seller.contact {
        None => errors.push(ValidationError::with_rule(
            "seller.contact",
            "XRechnung requires seller contact information (BG-6)",
            "BR-DE-2",
        )),
        Some(contact) => {
            let checks = [
                (&contact.name, "name", "BT-41", "BR-DE-5"),
                (&contact.phone, "phone", "BT-42", "BR-DE-6"),
                (&contact.email, "email", "BT-43", "BR-DE-7"),
            ];
            for (value, field, bt, rule) in checks {
                if value.as_deref().is_none_or(|v| v.trim().is_empty()) {
                    errors.push(ValidationError::with_rule(
                        format!("seller.contact.{field}"),
                        format!("XRechnung requires seller contact {field} ({bt})"),
                        rule,
                    ));
                }
            }
        }
    }

    // BR-DE-3: Seller street line
    if invoice.seller.address.street.as_deref().is_none_or(|s| s.trim().is_empty()) {
        errors.push(ValidationError::with_rule(
            "seller.address.street",
            "XRechnung recommends the seller street (BT-35)",
            "BR-DE-3",
        ));
    }

    // BR-DE-15: Buyer reference (BT-10 / Leitweg-ID) must be provided
    if invoice
        .buyer_reference
        .as_ref()
        .is_none_or(|r| r.trim().is_empty())
    {
        errors.push(ValidationError::with_rule(
            "buyer_reference",
            "XRechnung requires buyer reference / Leitweg-ID (BT-10)",
            "BR-DE-15",
        ));
    }

    // BR-DE-23: Payment means code restricted set
    if let Some(payment) = &invoice.payment {
        let allowed_means = [10, 30, 48, 54, 55, 58, 59];
        let code = payment.means_code.code();
        if !allowed_means.contains(&code) {
            errors.push(ValidationError::with_rule(
                "payment.means_code",
                format!(
                    "XRechnung payment means code {} is not in the allowed set {:?}",
                    code, allowed_means
                ),
                "BR-DE-23",
            ));
        }

        // BR-DE-24: credit transfer requires IBAN
        if matches!(
            payment.means_code,
            PaymentMeansCode::CreditTransfer | PaymentMeansCode::SepaCreditTransfer
        ) && payment
            .credit_transfer
            .as_ref()
            .is_none_or(|ct| ct.iban.trim().is_empty())
        {
            errors.push(ValidationError::with_rule(
                "payment.credit_transfer.iban",
                format!("credit transfer ({code}) requires IBAN (BT-84)"),
                "BR-DE-24",
            ));
        }
    }

    // BR-DE-26 / PEPPOL-EN16931-R010/R020: electronic addresses
    if invoice.seller.electronic_address.is_none() {
        errors.push(ValidationError::with_rule(
            "seller.electronic_address",
            "XRechnung requires seller electronic address (BT-34)",
            "BR-DE-26",
        ));
    }
    if invoice.buyer.electronic_address.is_none() {
        errors.push(ValidationError::with_rule(
            "buyer.electronic_address",
            "XRechnung requires buyer electronic address (BT-49)",
            "BR-DE-28",
        ));
    }

    errors
}
