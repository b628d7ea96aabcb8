#![cfg(feature = "xrechnung")]

use chrono::NaiveDate;
use rechnungswerk::core::*;
use rechnungswerk::xrechnung;
use rust_decimal_macros::dec;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn seller() -> Party {
    PartyBuilder::new(
        "ACME GmbH",
        AddressBuilder::new("Berlin", "10115", "DE")
            .street("Hauptstraße 1")
            .build(),
    )
    .vat_id("DE123456789")
    .build()
}

fn public_buyer() -> Party {
    PartyBuilder::new(
        "Stadt Musterhausen",
        AddressBuilder::new("Musterhausen", "12345", "DE").build(),
    )
    .build()
}

fn minimal_invoice() -> CanonicalInvoice {
    let invoice = InvoiceBuilder::new("RE-2024-100", date(2024, 6, 15))
        .due_date(date(2024, 7, 15))
        .buyer_reference("04011000-12345-03")
        .seller(seller())
        .buyer(public_buyer())
        .add_line(LineItemBuilder::new("1", "Beratung", dec!(10), "HUR", dec!(150)).build())
        .payment(PaymentInstructions {
            means_code: PaymentMeansCode::SepaCreditTransfer,
            means_text: None,
            remittance_info: Some("RE-2024-100".into()),
            credit_transfer: Some(CreditTransfer {
                iban: "DE89370400440532013000".into(),
                bic: None,
                account_name: None,
            }),
        })
        .tax_point_date(date(2024, 6, 10))
        .build_unchecked()
        .unwrap();
    CanonicalInvoice::try_from_invoice(invoice).unwrap()
}

fn full_invoice() -> CanonicalInvoice {
    let invoice = InvoiceBuilder::new("RE-2024-200", date(2024, 6, 15))
        .due_date(date(2024, 7, 15))
        .buyer_reference("04011000-12345-03")
        .note("Vielen Dank für Ihren Auftrag.")
        .seller(
            PartyBuilder::new(
                "ACME GmbH",
                AddressBuilder::new("Berlin", "10115", "DE")
                    .street("Hauptstraße 1")
                    .build(),
            )
            .vat_id("DE123456789")
            .tax_number("30/123/45678")
            .contact(
                Some("Erika Muster".into()),
                Some("+49 30 123456".into()),
                Some("rechnung@acme.example".into()),
            )
            .electronic_address("EM", "rechnung@acme.example")
            .build(),
        )
        .buyer(
            PartyBuilder::new(
                "Müller & Söhne OHG",
                AddressBuilder::new("München", "80331", "DE")
                    .street("Marienplatz 1")
                    .build(),
            )
            .electronic_address("EM", "einkauf@mueller.example")
            .build(),
        )
        .add_line(
            LineItemBuilder::new("1", "Beratung", dec!(10), "HUR", dec!(150))
                .description("Konzeption <Phase 1>")
                .build(),
        )
        .add_line(
            LineItemBuilder::new("2", "Fachbuch", dec!(2), "H87", dec!(24.95))
                .tax(TaxCategory::StandardRate, dec!(7))
                .build(),
        )
        .payment(PaymentInstructions {
            means_code: PaymentMeansCode::SepaCreditTransfer,
            means_text: Some("SEPA-Überweisung".into()),
            remittance_info: Some("RE-2024-200".into()),
            credit_transfer: Some(CreditTransfer {
                iban: "DE89370400440532013000".into(),
                bic: Some("COBADEFFXXX".into()),
                account_name: Some("ACME GmbH".into()),
            }),
        })
        .payment_terms("Zahlbar innerhalb von 30 Tagen ohne Abzug")
        .tax_point_date(date(2024, 6, 10))
        .build_unchecked()
        .unwrap();
    CanonicalInvoice::try_from_invoice(invoice).unwrap()
}

#[test]
fn minimal_invoice_snapshot() {
    let xml = xrechnung::to_ubl_xml(&minimal_invoice()).unwrap();
    insta::assert_snapshot!(xml, @r#"
<?xml version="1.0" encoding="UTF-8"?>
<ubl:Invoice xmlns:ubl="urn:oasis:names:specification:ubl:schema:xsd:Invoice-2" xmlns:cac="urn:oasis:names:specification:ubl:schema:xsd:CommonAggregateComponents-2" xmlns:cbc="urn:oasis:names:specification:ubl:schema:xsd:CommonBasicComponents-2">
  <cbc:CustomizationID>urn:cen.eu:en16931:2017#compliant#urn:xeinkauf.de:kosit:xrechnung_3.0</cbc:CustomizationID>
  <cbc:ProfileID>urn:fdc:peppol.eu:2017:poacc:billing:01:1.0</cbc:ProfileID>
  <cbc:ID>RE-2024-100</cbc:ID>
  <cbc:IssueDate>2024-06-15</cbc:IssueDate>
  <cbc:DueDate>2024-07-15</cbc:DueDate>
  <cbc:InvoiceTypeCode>380</cbc:InvoiceTypeCode>
  <cbc:DocumentCurrencyCode>EUR</cbc:DocumentCurrencyCode>
  <cbc:BuyerReference>04011000-12345-03</cbc:BuyerReference>
  <cac:AccountingSupplierParty>
    <cac:Party>
      <cac:PostalAddress>
        <cbc:StreetName>Hauptstraße 1</cbc:StreetName>
        <cbc:CityName>Berlin</cbc:CityName>
        <cbc:PostalZone>10115</cbc:PostalZone>
        <cac:Country>
          <cbc:IdentificationCode>DE</cbc:IdentificationCode>
        </cac:Country>
      </cac:PostalAddress>
      <cac:PartyTaxScheme>
        <cbc:CompanyID>DE123456789</cbc:CompanyID>
        <cac:TaxScheme>
          <cbc:ID>VAT</cbc:ID>
        </cac:TaxScheme>
      </cac:PartyTaxScheme>
      <cac:PartyLegalEntity>
        <cbc:RegistrationName>ACME GmbH</cbc:RegistrationName>
      </cac:PartyLegalEntity>
    </cac:Party>
  </cac:AccountingSupplierParty>
  <cac:AccountingCustomerParty>
    <cac:Party>
      <cac:PostalAddress>
        <cbc:CityName>Musterhausen</cbc:CityName>
        <cbc:PostalZone>12345</cbc:PostalZone>
        <cac:Country>
          <cbc:IdentificationCode>DE</cbc:IdentificationCode>
        </cac:Country>
      </cac:PostalAddress>
      <cac:PartyLegalEntity>
        <cbc:RegistrationName>Stadt Musterhausen</cbc:RegistrationName>
      </cac:PartyLegalEntity>
    </cac:Party>
  </cac:AccountingCustomerParty>
  <cac:Delivery>
    <cbc:ActualDeliveryDate>2024-06-10</cbc:ActualDeliveryDate>
  </cac:Delivery>
  <cac:PaymentMeans>
    <cbc:PaymentMeansCode>58</cbc:PaymentMeansCode>
    <cbc:PaymentID>RE-2024-100</cbc:PaymentID>
    <cac:PayeeFinancialAccount>
      <cbc:ID>DE89370400440532013000</cbc:ID>
    </cac:PayeeFinancialAccount>
  </cac:PaymentMeans>
  <cac:TaxTotal>
    <cbc:TaxAmount currencyID="EUR">285.00</cbc:TaxAmount>
    <cac:TaxSubtotal>
      <cbc:TaxableAmount currencyID="EUR">1500.00</cbc:TaxableAmount>
      <cbc:TaxAmount currencyID="EUR">285.00</cbc:TaxAmount>
      <cac:TaxCategory>
        <cbc:ID>S</cbc:ID>
        <cbc:Percent>19.00</cbc:Percent>
        <cac:TaxScheme>
          <cbc:ID>VAT</cbc:ID>
        </cac:TaxScheme>
      </cac:TaxCategory>
    </cac:TaxSubtotal>
  </cac:TaxTotal>
  <cac:LegalMonetaryTotal>
    <cbc:LineExtensionAmount currencyID="EUR">1500.00</cbc:LineExtensionAmount>
    <cbc:TaxExclusiveAmount currencyID="EUR">1500.00</cbc:TaxExclusiveAmount>
    <cbc:TaxInclusiveAmount currencyID="EUR">1785.00</cbc:TaxInclusiveAmount>
    <cbc:PayableAmount currencyID="EUR">1785.00</cbc:PayableAmount>
  </cac:LegalMonetaryTotal>
  <cac:InvoiceLine>
    <cbc:ID>1</cbc:ID>
    <cbc:InvoicedQuantity unitCode="HUR">10.00</cbc:InvoicedQuantity>
    <cbc:LineExtensionAmount currencyID="EUR">1500.00</cbc:LineExtensionAmount>
    <cac:Item>
      <cbc:Name>Beratung</cbc:Name>
      <cac:ClassifiedTaxCategory>
        <cbc:ID>S</cbc:ID>
        <cbc:Percent>19.00</cbc:Percent>
        <cac:TaxScheme>
          <cbc:ID>VAT</cbc:ID>
        </cac:TaxScheme>
      </cac:ClassifiedTaxCategory>
    </cac:Item>
    <cac:Price>
      <cbc:PriceAmount currencyID="EUR">150.00</cbc:PriceAmount>
    </cac:Price>
  </cac:InvoiceLine>
</ubl:Invoice>
"#);
}

#[test]
fn full_invoice_carries_parties_payment_and_lines() {
    let xml = xrechnung::to_ubl_xml(&full_invoice()).unwrap();

    assert!(xml.contains(r#"<cbc:EndpointID schemeID="EM">rechnung@acme.example</cbc:EndpointID>"#));
    assert!(xml.contains("<cbc:ElectronicMail>rechnung@acme.example</cbc:ElectronicMail>"));
    assert!(xml.contains("<cbc:CompanyID>30/123/45678</cbc:CompanyID>"));
    assert!(xml.contains("<cbc:ID>FC</cbc:ID>"));
    assert!(xml.contains("<cbc:Note>Vielen Dank für Ihren Auftrag.</cbc:Note>"));
    assert!(xml.contains(r#"<cbc:PaymentMeansCode name="SEPA-Überweisung">58</cbc:PaymentMeansCode>"#));
    assert!(xml.contains("<cbc:ID>COBADEFFXXX</cbc:ID>"));
    assert!(xml.contains("<cbc:Note>Zahlbar innerhalb von 30 Tagen ohne Abzug</cbc:Note>"));

    // Escaping of markup characters in text content.
    assert!(xml.contains("<cbc:RegistrationName>Müller &amp; Söhne OHG</cbc:RegistrationName>"));
    assert!(xml.contains("<cbc:Description>Konzeption &lt;Phase 1&gt;</cbc:Description>"));

    // 1500 × 19 % = 285.00, 49.90 × 7 % = 3.493 → 3.49
    assert!(xml.contains(r#"<cbc:TaxAmount currencyID="EUR">288.49</cbc:TaxAmount>"#));
    assert!(xml.contains(r#"<cbc:TaxableAmount currencyID="EUR">49.90</cbc:TaxableAmount>"#));
    assert!(xml.contains(r#"<cbc:TaxInclusiveAmount currencyID="EUR">1838.39</cbc:TaxInclusiveAmount>"#));
    assert!(xml.contains(r#"<cbc:InvoicedQuantity unitCode="H87">2.00</cbc:InvoicedQuantity>"#));
    assert!(xml.contains(r#"<cbc:PriceAmount currencyID="EUR">24.95</cbc:PriceAmount>"#));
    assert_eq!(xml.matches("<cac:InvoiceLine>").count(), 2);
    assert_eq!(xml.matches("<cac:TaxSubtotal>").count(), 2);
}

#[test]
fn full_invoice_has_no_advisories() {
    let canonical = full_invoice();
    assert_eq!(xrechnung::validate_xrechnung(canonical.invoice()), vec![]);
}

#[test]
fn minimal_invoice_reports_advisories() {
    let canonical = minimal_invoice();
    let rules: Vec<_> = xrechnung::validate_xrechnung(canonical.invoice())
        .into_iter()
        .filter_map(|e| e.rule)
        .collect();
    assert_eq!(rules, ["BR-DE-2", "BR-DE-26", "BR-DE-28"]);
}

#[test]
fn generation_is_deterministic() {
    let first = xrechnung::to_ubl_xml(&full_invoice()).unwrap();
    let second = xrechnung::to_ubl_xml(&full_invoice()).unwrap();
    assert_eq!(first, second);
}

#[test]
fn credit_note_uses_credit_note_schema() {
    let invoice = InvoiceBuilder::new("GS-2024-001", date(2024, 6, 20))
        .type_code(InvoiceTypeCode::CreditNote)
        .due_date(date(2024, 7, 20))
        .seller(seller())
        .buyer(public_buyer())
        .add_line(LineItemBuilder::new("1", "Gutschrift", dec!(1), "C62", dec!(100)).build())
        .payment(PaymentInstructions {
            means_code: PaymentMeansCode::SepaCreditTransfer,
            means_text: None,
            remittance_info: None,
            credit_transfer: Some(CreditTransfer {
                iban: "DE89370400440532013000".into(),
                bic: None,
                account_name: None,
            }),
        })
        .tax_point_date(date(2024, 6, 15))
        .build_unchecked()
        .unwrap();
    let xml = xrechnung::to_ubl_xml(&CanonicalInvoice::try_from_invoice(invoice).unwrap()).unwrap();

    assert!(xml.contains("<ubl:CreditNote "));
    assert!(xml.contains("urn:oasis:names:specification:ubl:schema:xsd:CreditNote-2"));
    assert!(xml.contains("<cbc:CreditNoteTypeCode>381</cbc:CreditNoteTypeCode>"));
    assert!(xml.contains(r#"<cbc:CreditedQuantity unitCode="C62">1.00</cbc:CreditedQuantity>"#));
    assert!(xml.contains("<cbc:PaymentDueDate>2024-07-20</cbc:PaymentDueDate>"));
    assert!(!xml.contains("<cbc:DueDate>"));
    assert!(!xml.contains("InvoiceLine"));
}

#[test]
fn reverse_charge_carries_exemption_reason() {
    let invoice = InvoiceBuilder::new("RE-2024-300", date(2024, 6, 15))
        .seller(seller())
        .buyer(
            PartyBuilder::new("Bau GmbH", AddressBuilder::new("Hamburg", "20095", "DE").build())
                .vat_id("DE987654321")
                .build(),
        )
        .note(scenario_note(VatScenario::ReverseCharge).unwrap())
        .add_line(
            LineItemBuilder::new("1", "Bauleistung", dec!(1), "C62", dec!(10000))
                .tax(TaxCategory::ReverseCharge, dec!(0))
                .build(),
        )
        .tax_point_date(date(2024, 6, 15))
        .build_unchecked()
        .unwrap();
    let xml = xrechnung::to_ubl_xml(&CanonicalInvoice::try_from_invoice(invoice).unwrap()).unwrap();

    assert!(xml.contains("<cbc:ID>AE</cbc:ID>"));
    assert!(xml.contains("<cbc:Percent>0.00</cbc:Percent>"));
    assert!(xml.contains("<cbc:TaxExemptionReasonCode>vatex-eu-ae</cbc:TaxExemptionReasonCode>"));
    assert!(xml.contains("§13b UStG"));
    assert!(xml.contains(r#"<cbc:TaxAmount currencyID="EUR">0.00</cbc:TaxAmount>"#));
}
