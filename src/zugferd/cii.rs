use chrono::NaiveDate;

use super::profile::ZugferdProfile;
use crate::core::*;
use crate::xrechnung::xml_utils::{XmlResult, XmlWriter, format_decimal};
use crate::xrechnung::{PEPPOL_PROFILE_ID, check_generation_preconditions, cii_ns};

/// Generate ZUGFeRD 2.x / Factur-X CII (D16B) XML for the given profile.
///
/// For **Minimum** and **BasicWL** the invoice lines are omitted, and
/// Minimum reduces the parties to their names, as the Factur-X profiles
/// require. Pure and deterministic.
pub fn to_cii_xml(canonical: &CanonicalInvoice, profile: ZugferdProfile) -> XmlResult {
    check_generation_preconditions(canonical, "CII")?;
    let invoice = canonical.invoice();
    let totals = canonical.totals()?;
    let currency = invoice.currency_code.as_str();
    let minimum = profile == ZugferdProfile::Minimum;

    let mut w = XmlWriter::new()?;
    w.start_element_with_attrs(
        "rsm:CrossIndustryInvoice",
        &[
            ("xmlns:rsm", cii_ns::RSM),
            ("xmlns:ram", cii_ns::RAM),
            ("xmlns:qdt", cii_ns::QDT),
            ("xmlns:udt", cii_ns::UDT),
        ],
    )?;

    // --- ExchangedDocumentContext ---
    w.start_element("rsm:ExchangedDocumentContext")?;
    if profile == ZugferdProfile::XRechnung {
        w.start_element("ram:BusinessProcessSpecifiedDocumentContextParameter")?;
        w.text_element("ram:ID", PEPPOL_PROFILE_ID)?;
        w.end_element("ram:BusinessProcessSpecifiedDocumentContextParameter")?;
    }
    w.start_element("ram:GuidelineSpecifiedDocumentContextParameter")?;
    w.text_element("ram:ID", profile.urn())?;
    w.end_element("ram:GuidelineSpecifiedDocumentContextParameter")?;
    w.end_element("rsm:ExchangedDocumentContext")?;

    // --- ExchangedDocument ---
    w.start_element("rsm:ExchangedDocument")?;
    w.text_element("ram:ID", &invoice.number)?;
    w.text_element("ram:TypeCode", &invoice.type_code.code().to_string())?;
    write_cii_date(&mut w, "ram:IssueDateTime", invoice.issue_date)?;
    if !minimum {
        for note in &invoice.notes {
            w.start_element("ram:IncludedNote")?;
            w.text_element("ram:Content", note)?;
            w.end_element("ram:IncludedNote")?;
        }
    }
    w.end_element("rsm:ExchangedDocument")?;

    // --- SupplyChainTradeTransaction ---
    w.start_element("rsm:SupplyChainTradeTransaction")?;

    if profile.has_lines() {
        for line in &invoice.lines {
            write_cii_line(&mut w, line)?;
        }
    }

    // --- ApplicableHeaderTradeAgreement ---
    w.start_element("ram:ApplicableHeaderTradeAgreement")?;
    w.opt_text_element("ram:BuyerReference", invoice.buyer_reference.as_deref())?;
    if minimum {
        write_cii_party_name(&mut w, &invoice.seller, "ram:SellerTradeParty")?;
        write_cii_party_name(&mut w, &invoice.buyer, "ram:BuyerTradeParty")?;
    } else {
        write_cii_party(&mut w, &invoice.seller, "ram:SellerTradeParty")?;
        write_cii_party(&mut w, &invoice.buyer, "ram:BuyerTradeParty")?;
    }
    w.end_element("ram:ApplicableHeaderTradeAgreement")?;

    // --- ApplicableHeaderTradeDelivery ---
    w.start_element("ram:ApplicableHeaderTradeDelivery")?;
    if let Some(date) = invoice.tax_point_date.filter(|_| !minimum) {
        // BT-72: Actual delivery date
        w.start_element("ram:ActualDeliverySupplyChainEvent")?;
        write_cii_date(&mut w, "ram:OccurrenceDateTime", date)?;
        w.end_element("ram:ActualDeliverySupplyChainEvent")?;
    }
    w.end_element("ram:ApplicableHeaderTradeDelivery")?;

    // --- ApplicableHeaderTradeSettlement ---
    w.start_element("ram:ApplicableHeaderTradeSettlement")?;
    if !minimum {
        // BT-83: Payment reference (Verwendungszweck)
        if let Some(payment) = &invoice.payment {
            w.opt_text_element("ram:PaymentReference", payment.remittance_info.as_deref())?;
        }
    }
    w.text_element("ram:InvoiceCurrencyCode", currency)?;

    if !minimum {
        if let Some(payment) = &invoice.payment {
            write_cii_payment_means(&mut w, payment)?;
        }

        // BG-23: VAT breakdown
        for bd in &totals.vat_breakdown {
            w.start_element("ram:ApplicableTradeTax")?;
            w.text_element("ram:CalculatedAmount", &format_decimal(bd.tax_amount))?;
            w.text_element("ram:TypeCode", "VAT")?;
            w.opt_text_element("ram:ExemptionReason", bd.exemption_reason.as_deref())?;
            w.text_element("ram:BasisAmount", &format_decimal(bd.taxable_amount))?;
            w.text_element("ram:CategoryCode", bd.category.code())?;
            w.opt_text_element("ram:ExemptionReasonCode", bd.exemption_reason_code.as_deref())?;
            w.text_element("ram:RateApplicablePercent", &format_decimal(bd.rate))?;
            w.end_element("ram:ApplicableTradeTax")?;
        }

        // BT-20 / BT-9: Payment terms and due date
        let terms = invoice.payment_terms.as_deref().filter(|t| !t.trim().is_empty());
        if terms.is_some() || invoice.due_date.is_some() {
            w.start_element("ram:SpecifiedTradePaymentTerms")?;
            w.opt_text_element("ram:Description", terms)?;
            if let Some(due) = invoice.due_date {
                write_cii_date(&mut w, "ram:DueDateDateTime", due)?;
            }
            w.end_element("ram:SpecifiedTradePaymentTerms")?;
        }
    }

    // BG-22: Monetary summation
    w.start_element("ram:SpecifiedTradeSettlementHeaderMonetarySummation")?;
    if !minimum {
        w.text_element("ram:LineTotalAmount", &format_decimal(totals.line_net_total))?;
    }
    w.text_element("ram:TaxBasisTotalAmount", &format_decimal(totals.net_total))?;
    w.text_element_with_attrs(
        "ram:TaxTotalAmount",
        &format_decimal(totals.vat_total),
        &[("currencyID", currency)],
    )?;
    w.text_element("ram:GrandTotalAmount", &format_decimal(totals.gross_total))?;
    w.text_element("ram:DuePayableAmount", &format_decimal(totals.amount_due))?;
    w.end_element("ram:SpecifiedTradeSettlementHeaderMonetarySummation")?;

    w.end_element("ram:ApplicableHeaderTradeSettlement")?;
    w.end_element("rsm:SupplyChainTradeTransaction")?;
    w.end_element("rsm:CrossIndustryInvoice")?;

    w.into_string()
}

fn write_cii_date(w: &mut XmlWriter, element: &str, date: NaiveDate) -> Result<(), RechnungError> {
    w.start_element(element)?;
    w.text_element_with_attrs(
        "udt:DateTimeString",
        &date.format("%Y%m%d").to_string(),
        &[("format", "102")],
    )?;
    w.end_element(element)?;
    Ok(())
}

fn write_cii_party_name(
    w: &mut XmlWriter,
    party: &Party,
    element: &str,
) -> Result<(), RechnungError> {
    w.start_element(element)?;
    w.text_element("ram:Name", &party.name)?;
    w.end_element(element)?;
    Ok(())
}

fn write_cii_party(w: &mut XmlWriter, party: &Party, element: &str) -> Result<(), RechnungError> {
    // TradeParty order: Name, DefinedTradeContact, PostalTradeAddress,
    // URIUniversalCommunication, SpecifiedTaxRegistration
    w.start_element(element)?;
    w.text_element("ram:Name", &party.name)?;

    if let Some(contact) = &party.contact {
        w.start_element("ram:DefinedTradeContact")?;
        w.opt_text_element("ram:PersonName", contact.name.as_deref())?;
        if let Some(phone) = contact.phone.as_deref().filter(|p| !p.trim().is_empty()) {
            w.start_element("ram:TelephoneUniversalCommunication")?;
            w.text_element("ram:CompleteNumber", phone)?;
            w.end_element("ram:TelephoneUniversalCommunication")?;
        }
        if let Some(email) = contact.email.as_deref().filter(|e| !e.trim().is_empty()) {
            w.start_element("ram:EmailURIUniversalCommunication")?;
            w.text_element("ram:URIID", email)?;
            w.end_element("ram:EmailURIUniversalCommunication")?;
        }
        w.end_element("ram:DefinedTradeContact")?;
    }

    w.start_element("ram:PostalTradeAddress")?;
    w.text_element("ram:PostcodeCode", &party.address.postal_code)?;
    w.opt_text_element("ram:LineOne", party.address.street.as_deref())?;
    w.text_element("ram:CityName", &party.address.city)?;
    w.text_element("ram:CountryID", &party.address.country_code)?;
    w.end_element("ram:PostalTradeAddress")?;

    if let Some(ea) = &party.electronic_address {
        w.start_element("ram:URIUniversalCommunication")?;
        w.text_element_with_attrs("ram:URIID", &ea.value, &[("schemeID", ea.scheme.as_str())])?;
        w.end_element("ram:URIUniversalCommunication")?;
    }

    // Tax registrations must come last
    if let Some(vat_id) = party.vat_id.as_deref().filter(|v| !v.trim().is_empty()) {
        w.start_element("ram:SpecifiedTaxRegistration")?;
        w.text_element_with_attrs("ram:ID", vat_id, &[("schemeID", "VA")])?;
        w.end_element("ram:SpecifiedTaxRegistration")?;
    }
    if let Some(tax_num) = party.tax_number.as_deref().filter(|v| !v.trim().is_empty()) {
        w.start_element("ram:SpecifiedTaxRegistration")?;
        w.text_element_with_attrs("ram:ID", tax_num, &[("schemeID", "FC")])?;
        w.end_element("ram:SpecifiedTaxRegistration")?;
    }

    w.end_element(element)?;
    Ok(())
}

fn write_cii_payment_means(
    w: &mut XmlWriter,
    payment: &PaymentInstructions,
) -> Result<(), RechnungError> {
    w.start_element("ram:SpecifiedTradeSettlementPaymentMeans")?;
    w.text_element("ram:TypeCode", &payment.means_code.code().to_string())?;
    // BT-82: Payment means text
    w.opt_text_element("ram:Information", payment.means_text.as_deref())?;
    // BG-17: Credit transfer
    if let Some(ct) = &payment.credit_transfer {
        w.start_element("ram:PayeePartyCreditorFinancialAccount")?;
        w.text_element("ram:IBANID", &ct.iban)?;
        w.opt_text_element("ram:AccountName", ct.account_name.as_deref())?;
        w.end_element("ram:PayeePartyCreditorFinancialAccount")?;
        if let Some(bic) = ct.bic.as_deref().filter(|b| !b.trim().is_empty()) {
            w.start_element("ram:PayeeSpecifiedCreditorFinancialInstitution")?;
            w.text_element("ram:BICID", bic)?;
            w.end_element("ram:PayeeSpecifiedCreditorFinancialInstitution")?;
        }
    }
    w.end_element("ram:SpecifiedTradeSettlementPaymentMeans")?;
    Ok(())
}

fn write_cii_line(w: &mut XmlWriter, line: &LineItem) -> Result<(), RechnungError> {
    let amount = line.line_amount.ok_or_else(|| {
        RechnungError::Generation(format!("line {} has no net amount", line.id))
    })?;

    w.start_element("ram:IncludedSupplyChainTradeLineItem")?;

    w.start_element("ram:AssociatedDocumentLineDocument")?;
    w.text_element("ram:LineID", &line.id)?;
    w.end_element("ram:AssociatedDocumentLineDocument")?;

    // BG-31: Item
    w.start_element("ram:SpecifiedTradeProduct")?;
    w.text_element("ram:Name", &line.item_name)?;
    w.opt_text_element("ram:Description", line.description.as_deref())?;
    w.end_element("ram:SpecifiedTradeProduct")?;

    // BG-29: Price details
    w.start_element("ram:SpecifiedLineTradeAgreement")?;
    w.start_element("ram:NetPriceProductTradePrice")?;
    w.text_element("ram:ChargeAmount", &format_decimal(line.unit_price))?;
    w.end_element("ram:NetPriceProductTradePrice")?;
    w.end_element("ram:SpecifiedLineTradeAgreement")?;

    w.start_element("ram:SpecifiedLineTradeDelivery")?;
    w.text_element_with_attrs(
        "ram:BilledQuantity",
        &format_decimal(line.quantity),
        &[("unitCode", line.unit.as_str())],
    )?;
    w.end_element("ram:SpecifiedLineTradeDelivery")?;

    w.start_element("ram:SpecifiedLineTradeSettlement")?;
    w.start_element("ram:ApplicableTradeTax")?;
    w.text_element("ram:TypeCode", "VAT")?;
    w.text_element("ram:CategoryCode", line.tax_category.code())?;
    w.text_element("ram:RateApplicablePercent", &format_decimal(line.tax_rate))?;
    w.end_element("ram:ApplicableTradeTax")?;
    w.start_element("ram:SpecifiedTradeSettlementLineMonetarySummation")?;
    w.text_element("ram:LineTotalAmount", &format_decimal(amount))?;
    w.end_element("ram:SpecifiedTradeSettlementLineMonetarySummation")?;
    w.end_element("ram:SpecifiedLineTradeSettlement")?;

    w.end_element("ram:IncludedSupplyChainTradeLineItem")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn canonical() -> CanonicalInvoice {
        let date = NaiveDate::from_ymd_opt(2024, 6, 15).unwrap();
        let invoice = InvoiceBuilder::new("RE-2024-042", date)
            .tax_point_date(date)
            .due_date(NaiveDate::from_ymd_opt(2024, 7, 15).unwrap())
            .payment_terms("Zahlbar innerhalb von 30 Tagen")
            .seller(
                PartyBuilder::new(
                    "ACME GmbH",
                    AddressBuilder::new("Berlin", "10115", "DE").street("Hauptstr. 1").build(),
                )
                .vat_id("DE123456789")
                .build(),
            )
            .buyer(
                PartyBuilder::new("Kunde AG", AddressBuilder::new("München", "80331", "DE").build())
                    .build(),
            )
            .add_line(LineItemBuilder::new("1", "Beratung", dec!(10), "HUR", dec!(150)).build())
            .add_line(
                LineItemBuilder::new("2", "Fachbuch", dec!(2), "H87", dec!(24.95))
                    .tax(TaxCategory::StandardRate, dec!(7))
                    .build(),
            )
            .payment(PaymentInstructions {
                means_code: PaymentMeansCode::SepaCreditTransfer,
                means_text: None,
                remittance_info: Some("RE-2024-042".into()),
                credit_transfer: Some(CreditTransfer {
                    iban: "DE89370400440532013000".into(),
                    bic: Some("COBADEFFXXX".into()),
                    account_name: None,
                }),
            })
            .build()
            .unwrap();
        CanonicalInvoice::try_from_invoice(invoice).unwrap()
    }

    #[test]
    fn en16931_document() {
        let xml = to_cii_xml(&canonical(), ZugferdProfile::EN16931).unwrap();
        assert!(xml.contains("<ram:ID>urn:cen.eu:en16931:2017</ram:ID>"));
        assert!(xml.contains("<ram:TypeCode>380</ram:TypeCode>"));
        assert!(xml.contains("<udt:DateTimeString format=\"102\">20240615</udt:DateTimeString>"));
        assert_eq!(xml.matches("<ram:IncludedSupplyChainTradeLineItem>").count(), 2);
        assert!(xml.contains("<ram:LineTotalAmount>1549.90</ram:LineTotalAmount>"));
        assert!(xml.contains("<ram:TaxTotalAmount currencyID=\"EUR\">288.49</ram:TaxTotalAmount>"));
        assert!(xml.contains("<ram:GrandTotalAmount>1838.39</ram:GrandTotalAmount>"));
        assert!(xml.contains("<ram:IBANID>DE89370400440532013000</ram:IBANID>"));
        assert!(xml.contains("<ram:ID schemeID=\"VA\">DE123456789</ram:ID>"));
        assert!(!xml.contains("BusinessProcessSpecifiedDocumentContextParameter"));
    }

    #[test]
    fn minimum_profile_has_no_lines_or_addresses() {
        let xml = to_cii_xml(&canonical(), ZugferdProfile::Minimum).unwrap();
        assert!(xml.contains("urn:factur-x.eu:1p0:minimum"));
        assert!(!xml.contains("IncludedSupplyChainTradeLineItem"));
        assert!(!xml.contains("PostalTradeAddress"));
        assert!(xml.contains("<ram:DuePayableAmount>1838.39</ram:DuePayableAmount>"));
    }

    #[test]
    fn basic_wl_keeps_parties_without_lines() {
        let xml = to_cii_xml(&canonical(), ZugferdProfile::BasicWl).unwrap();
        assert!(!xml.contains("IncludedSupplyChainTradeLineItem"));
        assert!(xml.contains("<ram:CityName>Berlin</ram:CityName>"));
        assert!(xml.contains("<ram:CategoryCode>S</ram:CategoryCode>"));
    }

    #[test]
    fn deterministic_output() {
        let c = canonical();
        let a = to_cii_xml(&c, ZugferdProfile::Extended).unwrap();
        let b = to_cii_xml(&c, ZugferdProfile::Extended).unwrap();
        assert_eq!(a, b);
    }
}
