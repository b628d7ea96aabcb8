use super::validate::check_generation_preconditions;
use super::xml_utils::{XmlResult, XmlWriter, format_decimal};
use super::{PEPPOL_PROFILE_ID, XRECHNUNG_CUSTOMIZATION_ID, ubl_ns};
use crate::core::*;

/// Element names that differ between the UBL Invoice and CreditNote schemas.
struct UblDocument {
    root: &'static str,
    namespace: &'static str,
    type_code: &'static str,
    line: &'static str,
    quantity: &'static str,
}

const INVOICE_DOC: UblDocument = UblDocument {
    root: "ubl:Invoice",
    namespace: ubl_ns::INVOICE,
    type_code: "cbc:InvoiceTypeCode",
    line: "cac:InvoiceLine",
    quantity: "cbc:InvoicedQuantity",
};

const CREDIT_NOTE_DOC: UblDocument = UblDocument {
    root: "ubl:CreditNote",
    namespace: ubl_ns::CREDIT_NOTE,
    type_code: "cbc:CreditNoteTypeCode",
    line: "cac:CreditNoteLine",
    quantity: "cbc:CreditedQuantity",
};

/// Generate XRechnung 3.0 UBL 2.1 XML from a canonical invoice.
///
/// Pure and deterministic: the same invoice always yields the same bytes.
pub fn to_ubl_xml(canonical: &CanonicalInvoice) -> XmlResult {
    check_generation_preconditions(canonical, "UBL")?;
    let invoice = canonical.invoice();
    let totals = canonical.totals()?;
    let currency = invoice.currency_code.as_str();

    let doc = match invoice.type_code {
        InvoiceTypeCode::Invoice => &INVOICE_DOC,
        InvoiceTypeCode::CreditNote => &CREDIT_NOTE_DOC,
    };

    let mut w = XmlWriter::new()?;
    w.start_element_with_attrs(
        doc.root,
        &[
            ("xmlns:ubl", doc.namespace),
            ("xmlns:cac", ubl_ns::CAC),
            ("xmlns:cbc", ubl_ns::CBC),
        ],
    )?;

    // BT-24: CustomizationID
    w.text_element("cbc:CustomizationID", XRECHNUNG_CUSTOMIZATION_ID)?;
    // BT-23: ProfileID
    w.text_element("cbc:ProfileID", PEPPOL_PROFILE_ID)?;
    // BT-1: Invoice number
    w.text_element("cbc:ID", &invoice.number)?;
    // BT-2: Issue date
    w.date_element("cbc:IssueDate", invoice.issue_date)?;
    // BT-9: Due date (CreditNote carries it in PaymentMeans instead)
    if invoice.type_code == InvoiceTypeCode::Invoice {
        if let Some(due) = invoice.due_date {
            w.date_element("cbc:DueDate", due)?;
        }
    }
    // BT-3: Document type code
    w.text_element(doc.type_code, &invoice.type_code.code().to_string())?;
    // BT-22: Notes
    for note in &invoice.notes {
        w.text_element("cbc:Note", note)?;
    }
    // BT-5: Currency code
    w.text_element("cbc:DocumentCurrencyCode", currency)?;
    // BT-10: Buyer reference (Leitweg-ID)
    w.opt_text_element("cbc:BuyerReference", invoice.buyer_reference.as_deref())?;

    // BG-4: Seller
    write_ubl_party(&mut w, &invoice.seller, "cac:AccountingSupplierParty")?;
    // BG-7: Buyer
    write_ubl_party(&mut w, &invoice.buyer, "cac:AccountingCustomerParty")?;

    // BG-13: Delivery information (BT-72 actual delivery date)
    if let Some(date) = invoice.tax_point_date {
        w.start_element("cac:Delivery")?;
        w.date_element("cbc:ActualDeliveryDate", date)?;
        w.end_element("cac:Delivery")?;
    }

    // BG-16: Payment means
    if let Some(payment) = &invoice.payment {
        w.start_element("cac:PaymentMeans")?;
        // BT-81: Payment means code, BT-82: Payment means text
        let code = payment.means_code.code().to_string();
        match &payment.means_text {
            Some(text) => w.text_element_with_attrs(
                "cbc:PaymentMeansCode",
                &code,
                &[("name", text.as_str())],
            )?,
            None => w.text_element("cbc:PaymentMeansCode", &code)?,
        };
        if invoice.type_code == InvoiceTypeCode::CreditNote {
            if let Some(due) = invoice.due_date {
                w.date_element("cbc:PaymentDueDate", due)?;
            }
        }
        // BT-83: Remittance information
        w.opt_text_element("cbc:PaymentID", payment.remittance_info.as_deref())?;
        // BG-17: Credit transfer
        if let Some(ct) = &payment.credit_transfer {
            w.start_element("cac:PayeeFinancialAccount")?;
            w.text_element("cbc:ID", &ct.iban)?;
            w.opt_text_element("cbc:Name", ct.account_name.as_deref())?;
            if let Some(bic) = ct.bic.as_deref().filter(|b| !b.trim().is_empty()) {
                w.start_element("cac:FinancialInstitutionBranch")?;
                w.text_element("cbc:ID", bic)?;
                w.end_element("cac:FinancialInstitutionBranch")?;
            }
            w.end_element("cac:PayeeFinancialAccount")?;
        }
        w.end_element("cac:PaymentMeans")?;
    }

    // BT-20: Payment terms
    if let Some(terms) = invoice.payment_terms.as_deref().filter(|t| !t.trim().is_empty()) {
        w.start_element("cac:PaymentTerms")?;
        w.text_element("cbc:Note", terms)?;
        w.end_element("cac:PaymentTerms")?;
    }

    // BG-23: Tax total
    w.start_element("cac:TaxTotal")?;
    w.amount_element("cbc:TaxAmount", totals.vat_total, currency)?;
    for breakdown in &totals.vat_breakdown {
        w.start_element("cac:TaxSubtotal")?;
        w.amount_element("cbc:TaxableAmount", breakdown.taxable_amount, currency)?;
        w.amount_element("cbc:TaxAmount", breakdown.tax_amount, currency)?;
        w.start_element("cac:TaxCategory")?;
        w.text_element("cbc:ID", breakdown.category.code())?;
        w.text_element("cbc:Percent", &format_decimal(breakdown.rate))?;
        w.opt_text_element(
            "cbc:TaxExemptionReasonCode",
            breakdown.exemption_reason_code.as_deref(),
        )?;
        w.opt_text_element("cbc:TaxExemptionReason", breakdown.exemption_reason.as_deref())?;
        write_vat_scheme(&mut w)?;
        w.end_element("cac:TaxCategory")?;
        w.end_element("cac:TaxSubtotal")?;
    }
    w.end_element("cac:TaxTotal")?;

    // BG-22: Legal monetary total
    w.start_element("cac:LegalMonetaryTotal")?;
    w.amount_element("cbc:LineExtensionAmount", totals.line_net_total, currency)?;
    w.amount_element("cbc:TaxExclusiveAmount", totals.net_total, currency)?;
    w.amount_element("cbc:TaxInclusiveAmount", totals.gross_total, currency)?;
    w.amount_element("cbc:PayableAmount", totals.amount_due, currency)?;
    w.end_element("cac:LegalMonetaryTotal")?;

    // BG-25: Invoice lines
    for line in &invoice.lines {
        write_ubl_line(&mut w, line, currency, doc)?;
    }

    w.end_element(doc.root)?;
    w.into_string()
}

fn write_vat_scheme(w: &mut XmlWriter) -> Result<(), RechnungError> {
    w.start_element("cac:TaxScheme")?;
    w.text_element("cbc:ID", "VAT")?;
    w.end_element("cac:TaxScheme")?;
    Ok(())
}

fn write_ubl_party(w: &mut XmlWriter, party: &Party, wrapper: &str) -> Result<(), RechnungError> {
    w.start_element(wrapper)?;
    w.start_element("cac:Party")?;

    // BT-34/49: Electronic address
    if let Some(ea) = &party.electronic_address {
        w.text_element_with_attrs(
            "cbc:EndpointID",
            &ea.value,
            &[("schemeID", ea.scheme.as_str())],
        )?;
    }

    // BG-5/8: Postal address
    w.start_element("cac:PostalAddress")?;
    w.opt_text_element("cbc:StreetName", party.address.street.as_deref())?;
    w.text_element("cbc:CityName", &party.address.city)?;
    w.text_element("cbc:PostalZone", &party.address.postal_code)?;
    w.start_element("cac:Country")?;
    w.text_element("cbc:IdentificationCode", &party.address.country_code)?;
    w.end_element("cac:Country")?;
    w.end_element("cac:PostalAddress")?;

    // BT-31/48: VAT identifier
    if let Some(vat_id) = party.vat_id.as_deref().filter(|v| !v.trim().is_empty()) {
        w.start_element("cac:PartyTaxScheme")?;
        w.text_element("cbc:CompanyID", vat_id)?;
        write_vat_scheme(w)?;
        w.end_element("cac:PartyTaxScheme")?;
    }

    // BT-32: Tax number (Steuernummer), FC scheme
    if let Some(tax_num) = party.tax_number.as_deref().filter(|v| !v.trim().is_empty()) {
        w.start_element("cac:PartyTaxScheme")?;
        w.text_element("cbc:CompanyID", tax_num)?;
        w.start_element("cac:TaxScheme")?;
        w.text_element("cbc:ID", "FC")?;
        w.end_element("cac:TaxScheme")?;
        w.end_element("cac:PartyTaxScheme")?;
    }

    // BT-27/44: Legal entity
    w.start_element("cac:PartyLegalEntity")?;
    w.text_element("cbc:RegistrationName", &party.name)?;
    w.end_element("cac:PartyLegalEntity")?;

    // BG-6/9: Contact
    if let Some(contact) = &party.contact {
        w.start_element("cac:Contact")?;
        w.opt_text_element("cbc:Name", contact.name.as_deref())?;
        w.opt_text_element("cbc:Telephone", contact.phone.as_deref())?;
        w.opt_text_element("cbc:ElectronicMail", contact.email.as_deref())?;
        w.end_element("cac:Contact")?;
    }

    w.end_element("cac:Party")?;
    w.end_element(wrapper)?;
    Ok(())
}

fn write_ubl_line(
    w: &mut XmlWriter,
    line: &LineItem,
    currency: &str,
    doc: &UblDocument,
) -> Result<(), RechnungError> {
    let amount = line.line_amount.ok_or_else(|| {
        RechnungError::Generation(format!("line {} has no net amount", line.id))
    })?;

    w.start_element(doc.line)?;
    // BT-126: Line ID
    w.text_element("cbc:ID", &line.id)?;
    // BT-129/130: Quantity with unit
    w.quantity_element(doc.quantity, line.quantity, &line.unit)?;
    // BT-131: Line extension amount
    w.amount_element("cbc:LineExtensionAmount", amount, currency)?;

    // BG-31: Item
    w.start_element("cac:Item")?;
    w.opt_text_element("cbc:Description", line.description.as_deref())?;
    w.text_element("cbc:Name", &line.item_name)?;
    w.start_element("cac:ClassifiedTaxCategory")?;
    w.text_element("cbc:ID", line.tax_category.code())?;
    w.text_element("cbc:Percent", &format_decimal(line.tax_rate))?;
    write_vat_scheme(w)?;
    w.end_element("cac:ClassifiedTaxCategory")?;
    w.end_element("cac:Item")?;

    // BG-29: Price details
    w.start_element("cac:Price")?;
    w.amount_element("cbc:PriceAmount", line.unit_price, currency)?;
    w.end_element("cac:Price")?;

    w.end_element(doc.line)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn canonical(type_code: InvoiceTypeCode) -> CanonicalInvoice {
        let date = NaiveDate::from_ymd_opt(2024, 6, 15).unwrap();
        let invoice = InvoiceBuilder::new("RE-2024-042", date)
            .type_code(type_code)
            .tax_point_date(date)
            .due_date(NaiveDate::from_ymd_opt(2024, 7, 15).unwrap())
            .buyer_reference("04011000-12345-67")
            .seller(
                PartyBuilder::new(
                    "Muster & Co GmbH",
                    AddressBuilder::new("Berlin", "10115", "DE")
                        .street("Hauptstr. 1")
                        .build(),
                )
                .vat_id("DE123456789")
                .tax_number("30/123/45678")
                .build(),
            )
            .buyer(
                PartyBuilder::new("Kunde AG", AddressBuilder::new("München", "80331", "DE").build())
                    .build(),
            )
            .add_line(LineItemBuilder::new("1", "Beratung", dec!(8), "HUR", dec!(120)).build())
            .build()
            .unwrap();
        CanonicalInvoice::try_from_invoice(invoice).unwrap()
    }

    #[test]
    fn invoice_root_and_totals() {
        let xml = to_ubl_xml(&canonical(InvoiceTypeCode::Invoice)).unwrap();
        assert!(xml.contains("<ubl:Invoice xmlns:ubl=\"urn:oasis:names:specification:ubl:schema:xsd:Invoice-2\""));
        assert!(xml.contains("<cbc:InvoiceTypeCode>380</cbc:InvoiceTypeCode>"));
        assert!(xml.contains("<cbc:DueDate>2024-07-15</cbc:DueDate>"));
        assert!(xml.contains("<cbc:RegistrationName>Muster &amp; Co GmbH</cbc:RegistrationName>"));
        assert!(xml.contains("<cbc:InvoicedQuantity unitCode=\"HUR\">8.00</cbc:InvoicedQuantity>"));
        assert!(xml.contains("<cbc:PayableAmount currencyID=\"EUR\">1142.40</cbc:PayableAmount>"));
        assert!(xml.contains("<cbc:ID>FC</cbc:ID>"));
    }

    #[test]
    fn credit_note_uses_credit_note_elements() {
        let xml = to_ubl_xml(&canonical(InvoiceTypeCode::CreditNote)).unwrap();
        assert!(xml.contains("<ubl:CreditNote"));
        assert!(xml.contains("<cbc:CreditNoteTypeCode>381</cbc:CreditNoteTypeCode>"));
        assert!(xml.contains("<cac:CreditNoteLine>"));
        assert!(xml.contains("<cbc:CreditedQuantity unitCode=\"HUR\">"));
        assert!(!xml.contains("<cbc:DueDate>"));
    }

    #[test]
    fn deterministic_output() {
        let c = canonical(InvoiceTypeCode::Invoice);
        assert_eq!(to_ubl_xml(&c).unwrap(), to_ubl_xml(&c).unwrap());
    }
}
