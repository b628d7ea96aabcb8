use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// BG-0: Invoice — the top-level document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    /// BT-1: Invoice number.
    pub number: String,
    /// BT-2: Invoice issue date.
    pub issue_date: NaiveDate,
    /// BT-9: Payment due date.
    pub due_date: Option<NaiveDate>,
    /// BT-3: Invoice type code (UNTDID 1001).
    pub type_code: InvoiceTypeCode,
    /// BT-5: Invoice currency code (ISO 4217, e.g. "EUR").
    pub currency_code: String,
    /// BT-22: Note / free text.
    pub notes: Vec<String>,
    /// BT-10: Buyer reference (Leitweg-ID for XRechnung).
    pub buyer_reference: Option<String>,
    /// BG-4: Seller.
    pub seller: Party,
    /// BG-7: Buyer.
    pub buyer: Party,
    /// BG-25: Invoice lines.
    pub lines: Vec<LineItem>,
    /// German VAT scenario determining validation rules.
    pub vat_scenario: VatScenario,
    /// BG-22: Calculated totals (set by `calculate_totals()`).
    pub totals: Option<Totals>,
    /// BT-20: Payment terms free text.
    pub payment_terms: Option<String>,
    /// BG-16: Payment instructions.
    pub payment: Option<PaymentInstructions>,
    /// BT-72: Actual delivery date (Leistungsdatum).
    pub tax_point_date: Option<NaiveDate>,
}

/// BG-4 / BG-7: Party (seller or buyer).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Party {
    /// BT-27 / BT-44: Name.
    pub name: String,
    /// BT-31 / BT-48: VAT identifier (e.g. "DE123456789").
    pub vat_id: Option<String>,
    /// BT-32: Tax registration number (Steuernummer).
    pub tax_number: Option<String>,
    /// BG-5 / BG-8: Postal address.
    pub address: Address,
    /// BG-6 / BG-9: Contact information.
    pub contact: Option<Contact>,
    /// BT-34 / BT-49: Electronic address.
    pub electronic_address: Option<ElectronicAddress>,
}

/// BG-5 / BG-8: Postal address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Address {
    /// BT-35 / BT-50: Street + house number.
    pub street: Option<String>,
    /// BT-37 / BT-52: City.
    pub city: String,
    /// BT-38 / BT-53: Postal code.
    pub postal_code: String,
    /// BT-40 / BT-55: Country code (ISO 3166-1 alpha-2).
    pub country_code: String,
}

/// BG-6 / BG-9: Contact information.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    /// BT-41 / BT-56: Contact point name.
    pub name: Option<String>,
    /// BT-42 / BT-57: Telephone.
    pub phone: Option<String>,
    /// BT-43 / BT-58: Email.
    pub email: Option<String>,
}

/// Electronic address with scheme identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElectronicAddress {
    /// Scheme identifier (e.g. "EM" for email, "0204" for Leitweg-ID).
    pub scheme: String,
    /// Address value.
    pub value: String,
}

/// BG-25: Invoice line item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    /// BT-126: Line identifier.
    pub id: String,
    /// BT-129: Invoiced quantity.
    pub quantity: Decimal,
    /// BT-130: Unit of measure (UNECE Rec 20, e.g. "C62" for piece, "HUR" for hour).
    pub unit: String,
    /// BT-146: Item net price (per unit).
    pub unit_price: Decimal,
    /// BT-151: Tax category for this line.
    pub tax_category: TaxCategory,
    /// BT-152: Tax rate percentage for this line.
    pub tax_rate: Decimal,
    /// BT-153: Item name.
    pub item_name: String,
    /// BT-154: Item description.
    pub description: Option<String>,
    /// BT-131: Line net amount, quantity × price rounded to the currency's
    /// minor unit. Set by `calculate_totals()`.
    pub line_amount: Option<Decimal>,
}

/// UNTDID 5305 — Tax category codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaxCategory {
    /// S — Standard rate (7% or 19% in Germany).
    StandardRate,
    /// Z — Zero rated.
    ZeroRated,
    /// E — Exempt from tax.
    Exempt,
    /// AE — Reverse charge.
    ReverseCharge,
    /// K — Intra-community supply (innergemeinschaftliche Lieferung).
    IntraCommunitySupply,
    /// G — Export (outside EU).
    Export,
    /// O — Not subject to VAT.
    NotSubjectToVat,
}

impl TaxCategory {
    /// UNTDID 5305 code letter.
    pub fn code(&self) -> &'static str {
        match self {
            Self::StandardRate => "S",
            Self::ZeroRated => "Z",
            Self::Exempt => "E",
            Self::ReverseCharge => "AE",
            Self::IntraCommunitySupply => "K",
            Self::Export => "G",
            Self::NotSubjectToVat => "O",
        }
    }

    /// Parse from UNTDID 5305 code string.
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "S" => Some(Self::StandardRate),
            "Z" => Some(Self::ZeroRated),
            "E" => Some(Self::Exempt),
            "AE" => Some(Self::ReverseCharge),
            "K" => Some(Self::IntraCommunitySupply),
            "G" => Some(Self::Export),
            "O" => Some(Self::NotSubjectToVat),
            _ => None,
        }
    }

    /// Whether the category always carries a 0 % rate.
    pub fn is_zero_rate(&self) -> bool {
        !matches!(self, Self::StandardRate)
    }
}

/// German VAT scenario, derived from the line categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VatScenario {
    /// Standard domestic invoice with German VAT.
    Domestic,
    /// §19 UStG Kleinunternehmerregelung — no VAT charged.
    Kleinunternehmer,
    /// §13b UStG — reverse charge, buyer pays VAT.
    ReverseCharge,
    /// §4 Nr. 1b UStG — intra-community supply, 0% VAT.
    IntraCommunitySupply,
    /// §4 Nr. 1a UStG — export to non-EU, 0% VAT.
    Export,
    /// Multiple tax categories on one invoice.
    Mixed,
}

impl VatScenario {
    /// Scenario implied by the set of tax categories on an invoice.
    pub fn from_categories(categories: impl IntoIterator<Item = TaxCategory>) -> Self {
        let mut seen: Vec<TaxCategory> = Vec::new();
        for c in categories {
            if !seen.contains(&c) {
                seen.push(c);
            }
        }
        match seen.as_slice() {
            [TaxCategory::ReverseCharge] => Self::ReverseCharge,
            [TaxCategory::IntraCommunitySupply] => Self::IntraCommunitySupply,
            [TaxCategory::Export] => Self::Export,
            [TaxCategory::NotSubjectToVat] => Self::Kleinunternehmer,
            [] | [TaxCategory::StandardRate] => Self::Domestic,
            _ => Self::Mixed,
        }
    }
}

/// UNTDID 1001 — Invoice type codes produced by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvoiceTypeCode {
    /// 380 — Commercial invoice.
    Invoice,
    /// 381 — Credit note.
    CreditNote,
}

impl InvoiceTypeCode {
    /// UNTDID 1001 numeric code.
    pub fn code(&self) -> u16 {
        match self {
            Self::Invoice => 380,
            Self::CreditNote => 381,
        }
    }

    /// Parse from UNTDID 1001 numeric code.
    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            380 => Some(Self::Invoice),
            381 => Some(Self::CreditNote),
            _ => None,
        }
    }

    /// Parse the German document kind ("RECHNUNG" / "GUTSCHRIFT").
    pub fn from_document_kind(kind: &str) -> Option<Self> {
        match kind.trim().to_uppercase().as_str() {
            "RECHNUNG" | "INVOICE" => Some(Self::Invoice),
            "GUTSCHRIFT" | "CREDIT NOTE" | "CREDITNOTE" => Some(Self::CreditNote),
            _ => None,
        }
    }

    /// German document title printed on the PDF.
    pub fn title(&self) -> &'static str {
        match self {
            Self::Invoice => "Rechnung",
            Self::CreditNote => "Gutschrift",
        }
    }
}

/// BG-22: Document totals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Totals {
    /// BT-106: Sum of all line net amounts.
    pub line_net_total: Decimal,
    /// BT-109: Invoice total without VAT.
    pub net_total: Decimal,
    /// BT-110: Total VAT amount.
    pub vat_total: Decimal,
    /// BT-112: Invoice total with VAT = net_total + vat_total.
    pub gross_total: Decimal,
    /// BT-115: Amount due for payment.
    pub amount_due: Decimal,
    /// BG-23: VAT breakdown by category.
    pub vat_breakdown: Vec<VatBreakdown>,
}

/// BG-23: VAT breakdown per category/rate combination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VatBreakdown {
    /// BT-118: Tax category.
    pub category: TaxCategory,
    /// BT-119: Tax rate percentage.
    pub rate: Decimal,
    /// BT-116: Taxable amount (category base).
    pub taxable_amount: Decimal,
    /// BT-117: Tax amount.
    pub tax_amount: Decimal,
    /// BT-120: Exemption reason text.
    pub exemption_reason: Option<String>,
    /// BT-121: Exemption reason code (VATEX).
    pub exemption_reason_code: Option<String>,
}

/// BG-16: Payment instructions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentInstructions {
    /// BT-81: Payment means type code (UNTDID 4461).
    pub means_code: PaymentMeansCode,
    /// BT-82: Payment means text.
    pub means_text: Option<String>,
    /// BT-83: Remittance information (Verwendungszweck).
    pub remittance_info: Option<String>,
    /// BG-17: Credit transfer (bank account).
    pub credit_transfer: Option<CreditTransfer>,
}

/// BG-17: Credit transfer / bank account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditTransfer {
    /// BT-84: IBAN.
    pub iban: String,
    /// BT-86: BIC.
    pub bic: Option<String>,
    /// BT-85: Account name.
    pub account_name: Option<String>,
}

/// Payment means codes (UNTDID 4461) the firm data can select.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentMeansCode {
    /// 1 — Instrument not defined.
    NotDefined,
    /// 10 — Cash.
    Cash,
    /// 30 — Credit transfer.
    CreditTransfer,
    /// 58 — SEPA credit transfer.
    SepaCreditTransfer,
    /// 59 — SEPA direct debit.
    SepaDirectDebit,
}

impl PaymentMeansCode {
    pub fn code(&self) -> u16 {
        match self {
            Self::NotDefined => 1,
            Self::Cash => 10,
            Self::CreditTransfer => 30,
            Self::SepaCreditTransfer => 58,
            Self::SepaDirectDebit => 59,
        }
    }

    /// Map the firm data's payment method label (`zahlungsart`).
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_uppercase().as_str() {
            "SEPA" | "SEPA-ÜBERWEISUNG" | "SEPA-UEBERWEISUNG" => Self::SepaCreditTransfer,
            "ÜBERWEISUNG" | "UEBERWEISUNG" | "CREDIT TRANSFER" => Self::CreditTransfer,
            "LASTSCHRIFT" | "SEPA-LASTSCHRIFT" => Self::SepaDirectDebit,
            "BAR" | "BARZAHLUNG" | "CASH" => Self::Cash,
            _ => Self::NotDefined,
        }
    }

    /// Whether the means moves money into the seller's bank account.
    pub fn uses_account(&self) -> bool {
        matches!(
            self,
            Self::CreditTransfer | Self::SepaCreditTransfer | Self::SepaDirectDebit
        )
    }

    /// German label printed on the PDF.
    pub fn label(&self) -> &'static str {
        match self {
            Self::NotDefined => "Nicht angegeben",
            Self::Cash => "Barzahlung",
            Self::CreditTransfer => "Überweisung",
            Self::SepaCreditTransfer => "SEPA-Überweisung",
            Self::SepaDirectDebit => "SEPA-Lastschrift",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_from_categories() {
        use TaxCategory::*;
        assert_eq!(VatScenario::from_categories([]), VatScenario::Domestic);
        assert_eq!(
            VatScenario::from_categories([StandardRate, StandardRate]),
            VatScenario::Domestic
        );
        assert_eq!(
            VatScenario::from_categories([ReverseCharge]),
            VatScenario::ReverseCharge
        );
        assert_eq!(
            VatScenario::from_categories([NotSubjectToVat]),
            VatScenario::Kleinunternehmer
        );
        assert_eq!(
            VatScenario::from_categories([StandardRate, Exempt]),
            VatScenario::Mixed
        );
    }

    #[test]
    fn document_kind_mapping() {
        assert_eq!(
            InvoiceTypeCode::from_document_kind("RECHNUNG"),
            Some(InvoiceTypeCode::Invoice)
        );
        assert_eq!(
            InvoiceTypeCode::from_document_kind(" gutschrift "),
            Some(InvoiceTypeCode::CreditNote)
        );
        assert_eq!(InvoiceTypeCode::from_document_kind("ANGEBOT"), None);
        assert_eq!(InvoiceTypeCode::CreditNote.code(), 381);
    }

    #[test]
    fn payment_label_mapping() {
        assert_eq!(PaymentMeansCode::from_label("SEPA").code(), 58);
        assert_eq!(PaymentMeansCode::from_label("Überweisung").code(), 30);
        assert_eq!(PaymentMeansCode::from_label("lastschrift").code(), 59);
        assert_eq!(PaymentMeansCode::from_label("bar").code(), 10);
        assert_eq!(PaymentMeansCode::from_label("Scheck").code(), 1);
    }
}
