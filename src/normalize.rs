//! Validator/Normalizer: extraction draft plus firm data to canonical invoice.
//!
//! Issuer fields always come from the [`IssuerProfile`]; the draft only
//! supplies the counterparty and the transaction. Totals are recomputed
//! from the line items and compared with what the document states; see
//! [`reconcile_totals`] for the single repair that is allowed.

use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::config::IssuerProfile;
use crate::core::currencies::{is_known_currency_code, round_to_minor_unit, within_tolerance};
use crate::core::iban::normalize_iban;
use crate::core::*;
use crate::extract::{DraftField, DraftLine, DraftTotals, ExtractionDraft};

/// Validator output.
#[derive(Debug, Clone)]
pub struct Normalized {
    pub canonical: CanonicalInvoice,
    pub warnings: Vec<JobWarning>,
}

/// Turn a draft into a canonical invoice on behalf of `issuer`.
///
/// Fails with [`RechnungError::Validation`] listing every violated
/// invariant found.
pub fn normalize(
    draft: &ExtractionDraft,
    issuer: &IssuerProfile,
) -> Result<Normalized, RechnungError> {
    let d = &draft.invoice;
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let number = required(&d.number, "number", "invoice number", Some("BR-02"), &mut errors);
    let issue_date = required(&d.issue_date, "issue_date", "issue date", Some("BR-03"), &mut errors);
    let delivery_date = optional(&d.delivery_date, "delivery_date", "delivery date", &mut errors);
    let due_date = optional(&d.due_date, "due_date", "due date", &mut errors);

    let currency = match d.currency.get() {
        Some(code) => code.trim().to_uppercase(),
        None => "EUR".to_string(),
    };
    if !is_known_currency_code(&currency) {
        errors.push(ValidationError::with_rule(
            "currency_code",
            format!("'{currency}' is not a known ISO 4217 currency code"),
            "BR-05",
        ));
    }

    let type_code = match d.document_kind.get() {
        None => InvoiceTypeCode::Invoice,
        Some(kind) => InvoiceTypeCode::from_document_kind(kind).unwrap_or_else(|| {
            errors.push(ValidationError::new(
                "document_kind",
                format!("document kind '{kind}' is neither RECHNUNG nor GUTSCHRIFT"),
            ));
            InvoiceTypeCode::Invoice
        }),
    };

    if d.lines.is_empty() {
        errors.push(ValidationError::with_rule(
            "lines",
            "invoice must have at least one line item",
            "BR-16",
        ));
    }
    let lines: Vec<LineItem> = d
        .lines
        .iter()
        .enumerate()
        .filter_map(|(i, line)| normalize_line(line, i, &currency, &mut errors))
        .collect();

    let buyer = counterparty(draft);

    if !errors.is_empty() {
        return Err(RechnungError::Validation(errors));
    }
    let (Some(number), Some(issue_date)) = (number, issue_date) else {
        return Err(RechnungError::Validation(errors));
    };

    if let Some(printed) = d.seller.name.get() {
        if printed != &issuer.name {
            debug!(printed = %printed, issuer = %issuer.name, "printed seller differs from firm data");
        }
    }

    let scenario = VatScenario::from_categories(lines.iter().map(|l| l.tax_category));
    let mut builder = InvoiceBuilder::new(number.clone(), issue_date)
        .type_code(type_code)
        .currency(currency.clone())
        .seller(issuer_party(issuer))
        .buyer(buyer)
        .tax_point_date(delivery_date.unwrap_or(issue_date))
        .buyer_reference(d.leitweg_id.get().cloned().unwrap_or_else(|| number.clone()))
        .payment(payment_instructions(issuer, &number));
    if let Some(due) = due_date {
        builder = builder.due_date(due);
    }
    if let Some(terms) = d.payment_terms.get() {
        builder = builder.payment_terms(terms.clone());
    }
    for note in &d.notes {
        builder = builder.note(note.clone());
    }
    if let Some(note) = scenario_note(scenario) {
        if !d.notes.iter().any(|n| n == note) {
            builder = builder.note(note);
        }
    }
    for line in lines {
        builder = builder.add_line(line);
    }

    let invoice = builder.build_unchecked()?;
    let totals = invoice
        .totals
        .as_ref()
        .ok_or_else(|| RechnungError::Generation("builder produced no totals".into()))?;
    warnings.extend(reconcile_totals(&d.totals, totals, &currency)?);

    let canonical = CanonicalInvoice::try_from_invoice(invoice)?;
    Ok(Normalized {
        canonical,
        warnings,
    })
}

/// Compare stated aggregates with the ones computed from the lines.
///
/// A mismatch is attributed to the aggregates alone, and repaired by
/// keeping the computed values, when at least one other stated aggregate
/// matches the line items and either
///
/// - exactly one aggregate mismatches, or
/// - one aggregate mismatches and every stated aggregate derived from it
///   (net and tax feed gross, gross feeds the amount due) is off by the
///   same amount, as when the tax line was missed.
///
/// Any other mismatch pattern is a totals mismatch. Unreadable stated
/// values are ignored with an advisory.
pub fn reconcile_totals(
    stated: &DraftTotals,
    computed: &Totals,
    currency: &str,
) -> Result<Vec<JobWarning>, RechnungError> {
    let pairs = [
        ("totals.net_total", &stated.net, computed.net_total, "BR-CO-13"),
        ("totals.vat_total", &stated.tax, computed.vat_total, "BR-CO-14"),
        ("totals.gross_total", &stated.gross, computed.gross_total, "BR-CO-15"),
        ("totals.amount_due", &stated.amount_due, computed.amount_due, "BR-CO-16"),
    ];

    let mut warnings = Vec::new();
    let mut checks = Vec::new();
    for (index, (field, stated, computed, rule)) in pairs.into_iter().enumerate() {
        if stated.is_invalid() {
            warnings.push(JobWarning::Advisory(ValidationError::new(
                field,
                format!(
                    "stated value '{}' is unreadable and was ignored",
                    stated.raw.as_deref().unwrap_or_default()
                ),
            )));
            continue;
        }
        let Some(value) = stated.get() else {
            continue;
        };
        checks.push(TotalCheck {
            index,
            field,
            rule,
            stated: *value,
            computed,
            matches: within_tolerance(*value, computed, currency),
        });
    }

    let mismatched: Vec<&TotalCheck> = checks.iter().filter(|c| !c.matches).collect();
    if mismatched.is_empty() {
        return Ok(warnings);
    }
    if attributable_to_aggregates(&checks, &mismatched, currency) {
        for check in mismatched {
            warn!(field = %check.field, stated = %check.stated, computed = %check.computed, "repairing stated total");
            warnings.push(JobWarning::TotalsRepaired {
                field: check.field.to_string(),
                stated: check.stated,
                computed: check.computed,
            });
        }
        return Ok(warnings);
    }
    Err(RechnungError::Validation(
        mismatched
            .into_iter()
            .map(|c| {
                ValidationError::with_rule(
                    c.field,
                    format!(
                        "totals mismatch: stated {}, computed from line items {}",
                        c.stated, c.computed
                    ),
                    c.rule,
                )
            })
            .collect(),
    ))
}

/// Aggregates computed from each of net, tax, gross and amount due.
const DERIVED_TOTALS: [&[usize]; 4] = [&[2, 3], &[2, 3], &[3], &[]];

struct TotalCheck {
    index: usize,
    field: &'static str,
    rule: &'static str,
    stated: Decimal,
    computed: Decimal,
    matches: bool,
}

impl TotalCheck {
    fn delta(&self) -> Option<Decimal> {
        self.stated.checked_sub(self.computed)
    }
}

fn attributable_to_aggregates(
    checks: &[TotalCheck],
    mismatched: &[&TotalCheck],
    currency: &str,
) -> bool {
    if !checks.iter().any(|c| c.matches) {
        return false;
    }
    let [root, ..] = mismatched else {
        return false;
    };
    if mismatched.len() == 1 {
        return true;
    }
    let Some(delta) = root.delta() else {
        return false;
    };
    let derived = DERIVED_TOTALS[root.index];
    checks.iter().filter(|c| c.index != root.index).all(|c| {
        if derived.contains(&c.index) {
            !c.matches && c.delta().is_some_and(|d| within_tolerance(d, delta, currency))
        } else {
            c.matches
        }
    })
}

fn normalize_line(
    line: &DraftLine,
    index: usize,
    currency: &str,
    errors: &mut Vec<ValidationError>,
) -> Option<LineItem> {
    let prefix = format!("lines[{index}]");
    let before = errors.len();

    let name = required(
        &line.description,
        &format!("{prefix}.item_name"),
        "description",
        Some("BR-25"),
        errors,
    );
    let quantity = required(&line.quantity, &format!("{prefix}.quantity"), "quantity", None, errors);
    let unit_price = required(
        &line.unit_price,
        &format!("{prefix}.unit_price"),
        "unit price",
        None,
        errors,
    );
    if quantity.is_some_and(|q| q.is_sign_negative()) {
        errors.push(ValidationError::new(
            format!("{prefix}.quantity"),
            "quantity must not be negative",
        ));
    }
    if unit_price.is_some_and(|p| p.is_sign_negative()) {
        errors.push(ValidationError::with_rule(
            format!("{prefix}.unit_price"),
            "unit price must not be negative",
            "BR-27",
        ));
    }

    let unit = match line.unit.get() {
        None => Some("C62"),
        Some(label) => unit_code_for_label(label).or_else(|| {
            errors.push(ValidationError::with_rule(
                format!("{prefix}.unit"),
                format!("unit '{label}' is not a known UN/ECE Rec 20 unit"),
                "BR-26",
            ));
            None
        }),
    };

    let category = match line.tax_category.get() {
        None => Some(TaxCategory::StandardRate),
        Some(code) => TaxCategory::from_code(&code.trim().to_uppercase()).or_else(|| {
            errors.push(ValidationError::new(
                format!("{prefix}.tax_category"),
                format!("'{code}' is not a UNTDID 5305 tax category"),
            ));
            None
        }),
    };

    let rate = match (line.tax_rate.get(), category) {
        (Some(rate), _) if rate.is_sign_negative() => {
            errors.push(ValidationError::new(
                format!("{prefix}.tax_rate"),
                "tax rate must not be negative",
            ));
            None
        }
        (Some(rate), _) => Some(*rate),
        (None, Some(cat)) if cat.is_zero_rate() && !line.tax_rate.is_invalid() => Some(Decimal::ZERO),
        (None, _) => {
            errors.push(invalid_or_missing(
                &line.tax_rate,
                &format!("{prefix}.tax_rate"),
                "tax rate",
                None,
            ));
            None
        }
    };

    if line.net_amount.is_invalid() {
        errors.push(invalid_or_missing(
            &line.net_amount,
            &format!("{prefix}.line_amount"),
            "line net amount",
            None,
        ));
    }
    if let (Some(q), Some(p)) = (quantity, unit_price) {
        match (q.checked_mul(p), line.net_amount.get()) {
            (None, _) => errors.push(ValidationError::with_rule(
                format!("{prefix}.line_amount"),
                format!("{q} × {p} exceeds the supported numeric range"),
                "BR-LIN-04",
            )),
            (Some(product), Some(stated)) => {
                let expected = round_to_minor_unit(product, currency);
                if !within_tolerance(*stated, expected, currency) {
                    errors.push(ValidationError::with_rule(
                        format!("{prefix}.line_amount"),
                        format!("stated line net {stated} does not match {q} × {p} = {expected}"),
                        "BR-LIN-04",
                    ));
                }
            }
            (Some(_), None) => {}
        }
    }

    if errors.len() > before {
        return None;
    }
    let (name, quantity, unit_price, unit, category, rate) =
        (name?, quantity?, unit_price?, unit?, category?, rate?);
    let id = line
        .id
        .get()
        .cloned()
        .unwrap_or_else(|| (index + 1).to_string());
    Some(
        LineItemBuilder::new(id, name, quantity, unit, unit_price)
            .tax(category, rate)
            .build(),
    )
}

/// The counterparty as extracted; missing country defaults to DE.
fn counterparty(draft: &ExtractionDraft) -> Party {
    let b = &draft.invoice.buyer;
    let text = |f: &DraftField<String>| f.get().cloned().unwrap_or_default();
    let country = b
        .country
        .get()
        .map(|c| c.trim().to_uppercase())
        .unwrap_or_else(|| "DE".to_string());

    let mut address = AddressBuilder::new(text(&b.city), text(&b.postal_code), country);
    if let Some(street) = b.street.get() {
        address = address.street(street.clone());
    }
    let mut party = PartyBuilder::new(text(&b.name), address.build());
    if let Some(vat_id) = b.vat_id.get() {
        party = party.vat_id(vat_id.replace(' ', ""));
    }
    if let Some(tax_number) = b.tax_number.get() {
        party = party.tax_number(tax_number.clone());
    }
    party.build()
}

/// Seller party populated from the firm data only.
pub fn issuer_party(issuer: &IssuerProfile) -> Party {
    let a = &issuer.anschrift;
    let mut address = AddressBuilder::new(a.ort.clone(), a.plz.clone(), a.land.clone());
    if !a.strasse.is_empty() {
        address = address.street(a.strasse.clone());
    }
    let mut party = PartyBuilder::new(issuer.name.clone(), address.build());
    if !issuer.umsatzsteuer_id.is_empty() {
        party = party.vat_id(issuer.umsatzsteuer_id.clone());
    }
    if !issuer.steuernummer.is_empty() {
        party = party.tax_number(issuer.steuernummer.clone());
    }
    if let Some(k) = &issuer.kontakt {
        let some = |s: &String| (!s.is_empty()).then(|| s.clone());
        if [&k.name, &k.telefon, &k.email].iter().any(|s| !s.is_empty()) {
            party = party.contact(some(&k.name), some(&k.telefon), some(&k.email));
        }
        if !k.email.is_empty() {
            party = party.electronic_address("EM", k.email.clone());
        }
    }
    party.build()
}

fn payment_instructions(issuer: &IssuerProfile, number: &str) -> PaymentInstructions {
    let means_code = PaymentMeansCode::from_label(&issuer.zahlung.zahlungsart);
    let iban = normalize_iban(&issuer.zahlung.iban);
    let credit_transfer = (means_code.uses_account() && !iban.is_empty()).then(|| CreditTransfer {
        iban,
        bic: (!issuer.zahlung.bic.is_empty()).then(|| issuer.zahlung.bic.clone()),
        account_name: (!issuer.name.is_empty()).then(|| issuer.name.clone()),
    });
    PaymentInstructions {
        means_code,
        means_text: None,
        remittance_info: Some(number.to_string()),
        credit_transfer,
    }
}

fn required<T: Clone>(
    field: &DraftField<T>,
    path: &str,
    what: &str,
    rule: Option<&str>,
    errors: &mut Vec<ValidationError>,
) -> Option<T> {
    match field.get() {
        Some(value) => Some(value.clone()),
        None => {
            errors.push(invalid_or_missing(field, path, what, rule));
            None
        }
    }
}

/// A missing optional value is fine; an unreadable one is not.
fn optional<T: Clone>(
    field: &DraftField<T>,
    path: &str,
    what: &str,
    errors: &mut Vec<ValidationError>,
) -> Option<T> {
    if field.is_invalid() {
        errors.push(invalid_or_missing(field, path, what, None));
    }
    field.get().cloned()
}

fn invalid_or_missing<T>(
    field: &DraftField<T>,
    path: &str,
    what: &str,
    rule: Option<&str>,
) -> ValidationError {
    let message = match &field.raw {
        Some(raw) if field.is_invalid() => format!("{what} '{raw}' is not readable"),
        _ => format!("{what} is missing"),
    };
    match rule {
        Some(rule) => ValidationError::with_rule(path, message, rule),
        None => ValidationError::new(path, message),
    }
}
