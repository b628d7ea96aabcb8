//! The partially-filled invoice produced by extraction.
//!
//! Every field records where its value came from. Values that are present
//! in the model answer but cannot be read (a date like "Mitte Mai", an
//! amount like "zehn Euro") are kept as [`Provenance::Invalid`] with the raw
//! text so the validator can name them.

use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;

/// Origin of a draft value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// Read from the document.
    Extracted,
    /// Present in the document but unreadable.
    Invalid,
    /// Not present.
    Missing,
}

/// A draft value with its provenance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DraftField<T> {
    pub value: Option<T>,
    pub provenance: Provenance,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
}

impl<T> Default for DraftField<T> {
    fn default() -> Self {
        Self::missing()
    }
}

impl<T> DraftField<T> {
    pub fn extracted(value: T) -> Self {
        Self {
            value: Some(value),
            provenance: Provenance::Extracted,
            raw: None,
        }
    }

    pub fn invalid(raw: impl Into<String>) -> Self {
        Self {
            value: None,
            provenance: Provenance::Invalid,
            raw: Some(raw.into()),
        }
    }

    pub fn missing() -> Self {
        Self {
            value: None,
            provenance: Provenance::Missing,
            raw: None,
        }
    }

    pub fn get(&self) -> Option<&T> {
        self.value.as_ref()
    }

    pub fn is_extracted(&self) -> bool {
        self.provenance == Provenance::Extracted
    }

    pub fn is_invalid(&self) -> bool {
        self.provenance == Provenance::Invalid
    }
}

/// A party as printed on the document.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DraftParty {
    pub name: DraftField<String>,
    pub vat_id: DraftField<String>,
    pub tax_number: DraftField<String>,
    pub street: DraftField<String>,
    pub postal_code: DraftField<String>,
    pub city: DraftField<String>,
    pub country: DraftField<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DraftLine {
    pub id: DraftField<String>,
    pub description: DraftField<String>,
    pub quantity: DraftField<Decimal>,
    pub unit: DraftField<String>,
    pub unit_price: DraftField<Decimal>,
    pub net_amount: DraftField<Decimal>,
    pub tax_category: DraftField<String>,
    pub tax_rate: DraftField<Decimal>,
}

/// Aggregates as stated on the document.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DraftTotals {
    pub net: DraftField<Decimal>,
    pub tax: DraftField<Decimal>,
    pub gross: DraftField<Decimal>,
    pub amount_due: DraftField<Decimal>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DraftInvoice {
    pub number: DraftField<String>,
    pub document_kind: DraftField<String>,
    pub issue_date: DraftField<NaiveDate>,
    pub delivery_date: DraftField<NaiveDate>,
    pub due_date: DraftField<NaiveDate>,
    pub currency: DraftField<String>,
    pub leitweg_id: DraftField<String>,
    /// Seller as printed; informational only, the firm data is authoritative.
    pub seller: DraftParty,
    pub buyer: DraftParty,
    pub lines: Vec<DraftLine>,
    pub totals: DraftTotals,
    pub payment_terms: DraftField<String>,
    pub notes: Vec<String>,
}

/// Extraction result handed to the validator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractionDraft {
    pub raw_text: String,
    pub invoice: DraftInvoice,
    /// Overall confidence in `[0, 1]`.
    pub confidence: f32,
}

/// What the model answer contained after JSON recovery.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelAnswer {
    pub transcription: Option<String>,
    pub invoice: DraftInvoice,
    pub reported_confidence: Option<f32>,
    /// Whether a JSON object could be recovered at all.
    pub parsed: bool,
}

impl ModelAnswer {
    /// Reported confidence when usable, otherwise the share of key fields
    /// that were extracted. Unparseable answers have confidence 0.
    pub fn confidence(&self) -> f32 {
        if !self.parsed {
            return 0.0;
        }
        self.reported_confidence
            .unwrap_or_else(|| key_field_coverage(&self.invoice))
    }
}

/// Fraction of number, issue date, buyer name, lines, net and gross total
/// that were extracted.
pub fn key_field_coverage(invoice: &DraftInvoice) -> f32 {
    let present = [
        invoice.number.is_extracted(),
        invoice.issue_date.is_extracted(),
        invoice.buyer.name.is_extracted(),
        !invoice.lines.is_empty(),
        invoice.totals.net.is_extracted(),
        invoice.totals.gross.is_extracted(),
    ];
    present.iter().filter(|p| **p).count() as f32 / present.len() as f32
}

/// Recover the JSON object between the first `{` and the last `}`.
pub fn recover_json(output: &str) -> Option<Value> {
    let start = output.find('{')?;
    let end = output.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str::<Value>(&output[start..=end])
        .ok()
        .filter(Value::is_object)
}

/// Parse free-form model output into a draft.
pub fn parse_model_output(output: &str) -> ModelAnswer {
    let Some(root) = recover_json(output) else {
        return ModelAnswer::default();
    };

    // Some models answer with the invoice object itself
    let null = Value::Null;
    let invoice_value = match root.get("rechnung") {
        Some(v) if v.is_object() => v,
        _ if root.get("dokument").is_some() => &root,
        _ => &null,
    };

    ModelAnswer {
        transcription: root
            .get("rohtext")
            .and_then(Value::as_str)
            .map(str::to_string)
            .filter(|t| !t.trim().is_empty()),
        invoice: parse_invoice(invoice_value),
        reported_confidence: root
            .get("konfidenz")
            .and_then(|v| number(Some(v)).value)
            .and_then(|d| d.to_string().parse::<f32>().ok())
            .filter(|c| (0.0..=1.0).contains(c)),
        parsed: true,
    }
}

fn parse_invoice(v: &Value) -> DraftInvoice {
    let doc = v.get("dokument");
    let field = |key: &str| doc.and_then(|d| d.get(key));
    DraftInvoice {
        number: text(field("rechnungsnummer")),
        document_kind: text(field("rechnungsart")),
        issue_date: date(field("rechnungsdatum")),
        delivery_date: date(field("leistungsdatum")),
        due_date: date(field("faelligkeitsdatum")),
        currency: text(field("waehrung")),
        leitweg_id: text(field("leitweg_id").or_else(|| v.get("leitweg_id"))),
        seller: parse_party(v.get("verkaeufer")),
        buyer: parse_party(v.get("kaeufer")),
        lines: v
            .get("positionen")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter(|i| i.is_object()).map(parse_line).collect())
            .unwrap_or_default(),
        totals: parse_totals(v.get("summen")),
        payment_terms: text(
            v.get("zahlungsbedingungen")
                .or_else(|| v.get("zahlung").and_then(|z| z.get("zahlungsbedingungen"))),
        ),
        notes: v
            .get("bemerkungen")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|n| n.get("text").and_then(Value::as_str).or(n.as_str()))
                    .map(str::trim)
                    .filter(|n| !n.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default(),
    }
}

fn parse_party(v: Option<&Value>) -> DraftParty {
    let get = |key: &str| v.and_then(|p| p.get(key));
    let address = |key: &str| get("anschrift").and_then(|a| a.get(key));
    DraftParty {
        name: text(get("name")),
        vat_id: text(get("umsatzsteuer_id")),
        tax_number: text(get("steuernummer")),
        street: text(address("strasse")),
        postal_code: text(address("plz")),
        city: text(address("ort")),
        country: text(address("land")),
    }
}

fn parse_line(v: &Value) -> DraftLine {
    let tax = v.get("umsatzsteuer");
    DraftLine {
        id: text(v.get("positionsnummer")),
        description: text(v.get("beschreibung")),
        quantity: number(v.get("menge")),
        unit: text(v.get("einheit")),
        unit_price: number(v.get("einzelpreis_netto")),
        net_amount: number(v.get("positionsbetrag_netto")),
        tax_category: text(tax.and_then(|t| t.get("kategorie"))),
        tax_rate: number(tax.and_then(|t| t.get("satz"))),
    }
}

fn parse_totals(v: Option<&Value>) -> DraftTotals {
    let get = |key: &str| v.and_then(|t| t.get(key));
    DraftTotals {
        net: number(get("gesamt_netto")),
        tax: number(get("gesamt_umsatzsteuer")),
        gross: number(get("gesamt_brutto")),
        amount_due: number(get("zahlbetrag")),
    }
}

fn text(v: Option<&Value>) -> DraftField<String> {
    match v {
        None | Some(Value::Null) => DraftField::missing(),
        Some(Value::String(s)) if s.trim().is_empty() => DraftField::missing(),
        Some(Value::String(s)) => DraftField::extracted(s.trim().to_string()),
        Some(Value::Number(n)) => DraftField::extracted(n.to_string()),
        Some(other) => DraftField::invalid(other.to_string()),
    }
}

fn number(v: Option<&Value>) -> DraftField<Decimal> {
    match v {
        None | Some(Value::Null) => DraftField::missing(),
        Some(Value::String(s)) if s.trim().is_empty() => DraftField::missing(),
        Some(Value::Number(n)) => {
            let raw = n.to_string();
            Decimal::from_str(&raw)
                .or_else(|_| Decimal::from_scientific(&raw))
                .map(DraftField::extracted)
                .unwrap_or_else(|_| DraftField::invalid(raw))
        }
        Some(Value::String(s)) => parse_amount(s)
            .map(DraftField::extracted)
            .unwrap_or_else(|| DraftField::invalid(s.as_str())),
        Some(other) => DraftField::invalid(other.to_string()),
    }
}

fn date(v: Option<&Value>) -> DraftField<NaiveDate> {
    match v {
        None | Some(Value::Null) => DraftField::missing(),
        Some(Value::String(s)) if s.trim().is_empty() => DraftField::missing(),
        Some(Value::String(s)) => parse_date(s)
            .map(DraftField::extracted)
            .unwrap_or_else(|| DraftField::invalid(s.as_str())),
        Some(other) => DraftField::invalid(other.to_string()),
    }
}

/// Read an amount written the German or the English way.
///
/// `1.234,56`, `1234,56`, `1,234.56` and `1234.56` all yield 1234.56;
/// currency symbols, `EUR` and `%` are ignored. A lone dot followed by
/// exactly three digits groups thousands (`1.000` is 1000), except after a
/// leading zero (`0.500`).
pub fn parse_amount(s: &str) -> Option<Decimal> {
    let cleaned: String = s
        .replace("EUR", "")
        .chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '€' | '%' | '\''))
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    let normalized = match (cleaned.rfind(','), cleaned.rfind('.')) {
        (Some(comma), Some(dot)) if comma > dot => cleaned.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => cleaned.replace(',', ""),
        (Some(_), None) if cleaned.matches(',').count() == 1 => cleaned.replace(',', "."),
        (Some(_), None) => cleaned.replace(',', ""),
        (None, Some(_)) if cleaned.matches('.').count() > 1 => cleaned.replace('.', ""),
        (None, Some(dot)) if groups_thousands(&cleaned, dot) => cleaned.replace('.', ""),
        _ => cleaned,
    };
    Decimal::from_str(&normalized).ok()
}

fn groups_thousands(s: &str, dot: usize) -> bool {
    let int = s[..dot].trim_start_matches(['-', '+']);
    let frac = &s[dot + 1..];
    frac.len() == 3
        && frac.bytes().all(|b| b.is_ascii_digit())
        && (1..=3).contains(&int.len())
        && int.bytes().all(|b| b.is_ascii_digit())
        && !int.starts_with('0')
}

/// ISO dates and the usual German spellings.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    ["%Y-%m-%d", "%d.%m.%y", "%d.%m.%Y", "%d/%m/%Y"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
}
