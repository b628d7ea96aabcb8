use std::collections::{BTreeMap, HashSet};

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use super::currencies::{self, round_to_minor_unit, within_tolerance};
use super::error::{RechnungError, ValidationError};
use super::types::*;

/// Validate an invoice against §14 UStG requirements.
/// Returns all validation errors found (not just the first).
pub fn validate_14_ustg(invoice: &Invoice) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    // BR-02: An Invoice shall have an Invoice number
    if invoice.number.trim().is_empty() {
        errors.push(ValidationError::with_rule(
            "number",
            "invoice number must not be empty",
            "BR-02",
        ));
    }

    // BR-05: An Invoice shall have an Invoice currency code
    if invoice.currency_code.trim().is_empty() {
        errors.push(ValidationError::with_rule(
            "currency_code",
            "currency code must not be empty",
            "BR-05",
        ));
    } else if !currencies::is_known_currency_code(&invoice.currency_code) {
        errors.push(ValidationError::with_rule(
            "currency_code",
            format!(
                "currency code '{}' is not a known ISO 4217 code",
                invoice.currency_code
            ),
            "BR-05",
        ));
    }

    // §14 Abs. 4 Nr. 1 — name and address of both parties
    validate_party(&invoice.seller, "seller", "BR-06", &mut errors);
    validate_party(&invoice.buyer, "buyer", "BR-07", &mut errors);

    // §14 Abs. 4 Nr. 2 — Tax number or VAT ID of seller
    if blank(&invoice.seller.vat_id) && blank(&invoice.seller.tax_number) {
        errors.push(ValidationError::with_rule(
            "seller",
            "seller must have either a VAT ID (USt-IdNr.) or tax number (Steuernummer)",
            "BR-CO-09",
        ));
    }
    if let Some(vat_id) = invoice.seller.vat_id.as_deref().filter(|v| !v.trim().is_empty()) {
        validate_vat_id_format(vat_id, "seller.vat_id", &mut errors);
    }
    if let Some(vat_id) = invoice.buyer.vat_id.as_deref().filter(|v| !v.trim().is_empty()) {
        validate_vat_id_format(vat_id, "buyer.vat_id", &mut errors);
    }

    // §14 Abs. 4 Nr. 6 UStG — Delivery date
    if invoice.tax_point_date.is_none() {
        errors.push(ValidationError::with_rule(
            "tax_point_date",
            "invoice must have a delivery date (Leistungsdatum, §14 Abs. 4 Nr. 6 UStG)",
            "BR-CO-03",
        ));
    }

    if let Some(due) = invoice.due_date {
        if due < invoice.issue_date {
            errors.push(ValidationError::new(
                "due_date",
                format!(
                    "due date {due} lies before the issue date {}",
                    invoice.issue_date
                ),
            ));
        }
    }

    // BR-16: An Invoice shall have at least one Invoice line
    if invoice.lines.is_empty() {
        errors.push(ValidationError::with_rule(
            "lines",
            "invoice must have at least one line item",
            "BR-16",
        ));
    }

    for (i, line) in invoice.lines.iter().enumerate() {
        validate_line(line, i, &mut errors);
    }

    validate_scenario(invoice, &mut errors);

    errors.extend(validate_arithmetic(invoice));

    errors
}

/// Validate invoice arithmetic within one minor unit of the invoice currency.
pub fn validate_arithmetic(invoice: &Invoice) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let currency = invoice.currency_code.as_str();

    let Some(totals) = &invoice.totals else {
        errors.push(ValidationError::with_rule(
            "totals",
            "totals must be calculated before validation (call calculate_totals first)",
            "BR-CO-10",
        ));
        return errors;
    };

    // BR-LIN-04: line net = quantity × price
    for (i, line) in invoice.lines.iter().enumerate() {
        let Some(product) = line.quantity.checked_mul(line.unit_price) else {
            errors.push(out_of_range(format!("lines[{i}].line_amount"), "BR-LIN-04"));
            continue;
        };
        let expected = round_to_minor_unit(product, currency);
        match line.line_amount {
            Some(amount) if within_tolerance(amount, expected, currency) => {}
            Some(amount) => errors.push(ValidationError::with_rule(
                format!("lines[{i}].line_amount"),
                format!(
                    "line net amount {amount} does not match {} × {} = {expected}",
                    line.quantity, line.unit_price
                ),
                "BR-LIN-04",
            )),
            None => errors.push(ValidationError::with_rule(
                format!("lines[{i}].line_amount"),
                "line net amount is missing",
                "BR-LIN-04",
            )),
        }
    }

    // BR-CO-10: Sum of line net amounts
    let expected_line_total = checked_sum(invoice.lines.iter().filter_map(|l| l.line_amount));
    let Some(expected_line_total) = expected_line_total else {
        errors.push(out_of_range("totals.line_net_total", "BR-CO-10"));
        return errors;
    };
    if !within_tolerance(totals.line_net_total, expected_line_total, currency) {
        errors.push(ValidationError::with_rule(
            "totals.line_net_total",
            format!(
                "line net total {} does not match sum of line amounts {}",
                totals.line_net_total, expected_line_total
            ),
            "BR-CO-10",
        ));
    }

    // BR-CO-13: no document-level allowances or charges, so net = line total
    if !within_tolerance(totals.net_total, totals.line_net_total, currency) {
        errors.push(ValidationError::with_rule(
            "totals.net_total",
            format!(
                "net total {} does not match line net total {}",
                totals.net_total, totals.line_net_total
            ),
            "BR-CO-13",
        ));
    }

    // BR-CO-15: gross_total = net_total + vat_total
    let expected_gross = totals.net_total.checked_add(totals.vat_total);
    if !expected_gross.is_some_and(|g| within_tolerance(totals.gross_total, g, currency)) {
        errors.push(ValidationError::with_rule(
            "totals.gross_total",
            format!(
                "gross total {} does not match net {} + vat {}",
                totals.gross_total, totals.net_total, totals.vat_total
            ),
            "BR-CO-15",
        ));
    }

    // BR-CO-16: amount_due = gross_total (no prepayment)
    if !within_tolerance(totals.amount_due, totals.gross_total, currency) {
        errors.push(ValidationError::with_rule(
            "totals.amount_due",
            format!(
                "amount due {} does not match gross total {}",
                totals.amount_due, totals.gross_total
            ),
            "BR-CO-16",
        ));
    }

    // BR-CO-14: VAT total = sum of breakdown amounts
    match checked_sum(totals.vat_breakdown.iter().map(|b| b.tax_amount)) {
        Some(sum) if within_tolerance(totals.vat_total, sum, currency) => {}
        Some(sum) => errors.push(ValidationError::with_rule(
            "totals.vat_total",
            format!(
                "VAT total {} does not match sum of breakdown amounts {sum}",
                totals.vat_total
            ),
            "BR-CO-14",
        )),
        None => errors.push(out_of_range("totals.vat_total", "BR-CO-14")),
    }

    // BR-CO-17: per group tax = round(base × rate)
    for (i, vb) in totals.vat_breakdown.iter().enumerate() {
        let Some(expected) = group_tax(vb.taxable_amount, vb.rate, currency) else {
            errors.push(out_of_range(format!("totals.vat_breakdown[{i}].tax_amount"), "BR-CO-17"));
            continue;
        };
        if !within_tolerance(vb.tax_amount, expected, currency) {
            errors.push(ValidationError::with_rule(
                format!("totals.vat_breakdown[{i}].tax_amount"),
                format!(
                    "VAT amount {} does not match taxable {} × rate {}% = {}",
                    vb.tax_amount, vb.taxable_amount, vb.rate, expected
                ),
                "BR-CO-17",
            ));
        }
    }

    errors
}

/// Calculate line amounts, VAT breakdown and totals (mutates in place).
///
/// Line amounts and group tax amounts are rounded commercially to the
/// minor unit of the invoice currency. Amounts outside the `Decimal` range
/// fail with a validation error on the field that overflowed.
pub fn calculate_totals(invoice: &mut Invoice) -> Result<(), RechnungError> {
    let currency = invoice.currency_code.clone();

    let mut overflowed = Vec::new();
    for (i, line) in invoice.lines.iter_mut().enumerate() {
        line.line_amount = line
            .quantity
            .checked_mul(line.unit_price)
            .map(|amount| round_to_minor_unit(amount, &currency));
        if line.line_amount.is_none() {
            overflowed.push(out_of_range(format!("lines[{i}].line_amount"), "BR-LIN-04"));
        }
    }
    RechnungError::check(overflowed)?;

    let line_net_total = checked_sum(invoice.lines.iter().filter_map(|l| l.line_amount))
        .ok_or_else(|| out_of_range_error("totals.line_net_total", "BR-CO-10"))?;

    // Group by (category code, rate); BTreeMap keeps the breakdown ordered.
    let mut vat_groups: BTreeMap<(&'static str, Decimal), (TaxCategory, Decimal)> =
        BTreeMap::new();
    for line in &invoice.lines {
        let entry = vat_groups
            .entry((line.tax_category.code(), line.tax_rate.normalize()))
            .or_insert((line.tax_category, Decimal::ZERO));
        entry.1 = entry
            .1
            .checked_add(line.line_amount.unwrap_or(Decimal::ZERO))
            .ok_or_else(|| out_of_range_error("totals.vat_breakdown", "BR-CO-18"))?;
    }

    let mut vat_breakdown = Vec::with_capacity(vat_groups.len());
    let mut vat_total = Decimal::ZERO;

    for (i, ((_, rate), (category, taxable_amount))) in vat_groups.into_iter().enumerate() {
        let field = format!("totals.vat_breakdown[{i}].tax_amount");
        let tax_amount = group_tax(taxable_amount, rate, &currency)
            .ok_or_else(|| out_of_range_error(field.clone(), "BR-CO-17"))?;
        vat_total = vat_total
            .checked_add(tax_amount)
            .ok_or_else(|| out_of_range_error("totals.vat_total", "BR-CO-14"))?;

        vat_breakdown.push(VatBreakdown {
            category,
            rate,
            taxable_amount,
            tax_amount,
            exemption_reason: exemption_reason_for(category, invoice.vat_scenario)
                .map(String::from),
            exemption_reason_code: exemption_reason_code_for(category).map(String::from),
        });
    }

    let gross_total = line_net_total
        .checked_add(vat_total)
        .ok_or_else(|| out_of_range_error("totals.gross_total", "BR-CO-15"))?;

    invoice.totals = Some(Totals {
        line_net_total,
        net_total: line_net_total,
        vat_total,
        gross_total,
        amount_due: gross_total,
        vat_breakdown,
    });
    Ok(())
}

/// Tax of one (category, rate) group, rounded once.
fn group_tax(taxable_amount: Decimal, rate: Decimal, currency: &str) -> Option<Decimal> {
    taxable_amount
        .checked_mul(rate)
        .and_then(|v| v.checked_div(dec!(100)))
        .map(|v| round_to_minor_unit(v, currency))
}

fn checked_sum(values: impl IntoIterator<Item = Decimal>) -> Option<Decimal> {
    values
        .into_iter()
        .try_fold(Decimal::ZERO, |acc, v| acc.checked_add(v))
}

fn out_of_range(field: impl Into<String>, rule: &str) -> ValidationError {
    ValidationError::with_rule(field, "amount exceeds the supported numeric range", rule)
}

fn out_of_range_error(field: impl Into<String>, rule: &str) -> RechnungError {
    RechnungError::Validation(vec![out_of_range(field, rule)])
}

fn blank(value: &Option<String>) -> bool {
    value.as_deref().is_none_or(|v| v.trim().is_empty())
}

fn validate_party(
    party: &Party,
    prefix: &str,
    name_rule: &str,
    errors: &mut Vec<ValidationError>,
) {
    if party.name.trim().is_empty() {
        errors.push(ValidationError::with_rule(
            format!("{prefix}.name"),
            "name must not be empty",
            name_rule,
        ));
    }

    validate_address(&party.address, &format!("{prefix}.address"), errors);
}

fn validate_address(address: &Address, prefix: &str, errors: &mut Vec<ValidationError>) {
    if address.city.trim().is_empty() {
        errors.push(ValidationError::with_rule(
            format!("{prefix}.city"),
            "city must not be empty",
            "BR-09",
        ));
    }

    if address.postal_code.trim().is_empty() {
        errors.push(ValidationError::with_rule(
            format!("{prefix}.postal_code"),
            "postal code (BT-38/BT-53) must not be empty",
            "BR-09",
        ));
    }

    if address.country_code.trim().is_empty() {
        errors.push(ValidationError::with_rule(
            format!("{prefix}.country_code"),
            "country code must not be empty",
            "BR-09",
        ));
    } else if !super::countries::is_known_country_code(&address.country_code) {
        errors.push(ValidationError::with_rule(
            format!("{prefix}.country_code"),
            format!(
                "country code '{}' is not a known ISO 3166-1 alpha-2 code",
                address.country_code
            ),
            "BR-09",
        ));
    }
}

fn validate_line(line: &LineItem, index: usize, errors: &mut Vec<ValidationError>) {
    let prefix = format!("lines[{index}]");

    if line.id.trim().is_empty() {
        errors.push(ValidationError::with_rule(
            format!("{prefix}.id"),
            "line identifier must not be empty",
            "BR-21",
        ));
    }

    if line.quantity.is_zero() {
        errors.push(ValidationError::with_rule(
            format!("{prefix}.quantity"),
            "invoiced quantity (BT-129) must not be zero",
            "BR-22",
        ));
    }

    if line.unit_price.is_sign_negative() {
        errors.push(ValidationError::with_rule(
            format!("{prefix}.unit_price"),
            "item net price (BT-146) must not be negative",
            "BR-27",
        ));
    }

    if line.item_name.trim().is_empty() {
        errors.push(ValidationError::with_rule(
            format!("{prefix}.item_name"),
            "item name must not be empty",
            "BR-25",
        ));
    }

    if line.tax_rate.is_sign_negative() {
        errors.push(ValidationError::with_rule(
            format!("{prefix}.tax_rate"),
            "line VAT rate (BT-152) must not be negative",
            "BR-27",
        ));
    }

    if line.tax_category.is_zero_rate() && !line.tax_rate.is_zero() {
        errors.push(ValidationError::with_rule(
            format!("{prefix}.tax_rate"),
            format!(
                "tax rate must be 0 for category {} ({})",
                line.tax_category.code(),
                category_name(line.tax_category)
            ),
            format!("BR-{}-05", rule_group(line.tax_category)),
        ));
    } else if !line.tax_category.is_zero_rate() && line.tax_rate.is_zero() {
        errors.push(ValidationError::with_rule(
            format!("{prefix}.tax_rate"),
            "standard rate (S) category (BT-151) must have a non-zero VAT rate (BT-152)",
            "BR-S-05",
        ));
    }
}

fn validate_scenario(invoice: &Invoice, errors: &mut Vec<ValidationError>) {
    match invoice.vat_scenario {
        VatScenario::Kleinunternehmer => {
            if !has_note(invoice, "19") {
                errors.push(ValidationError::with_rule(
                    "notes",
                    "Kleinunternehmer invoice must contain a note (BT-22) referencing §19 UStG",
                    "BR-O-10",
                ));
            }
            require_category(invoice, TaxCategory::NotSubjectToVat, "BR-O-01", errors);
        }

        VatScenario::ReverseCharge => {
            if blank(&invoice.buyer.vat_id) {
                errors.push(ValidationError::with_rule(
                    "buyer.vat_id",
                    "reverse charge: buyer must have a VAT ID (BT-48)",
                    "BR-AE-02",
                ));
            }
            if !has_note(invoice, "13b") {
                errors.push(ValidationError::with_rule(
                    "notes",
                    "reverse charge invoice must contain a note (BT-22) referencing §13b UStG",
                    "BR-AE-10",
                ));
            }
            require_category(invoice, TaxCategory::ReverseCharge, "BR-AE-01", errors);
        }

        VatScenario::IntraCommunitySupply => {
            if blank(&invoice.seller.vat_id) {
                errors.push(ValidationError::with_rule(
                    "seller.vat_id",
                    "intra-community supply: seller must have a VAT ID (BT-31)",
                    "BR-IC-02",
                ));
            }
            if blank(&invoice.buyer.vat_id) {
                errors.push(ValidationError::with_rule(
                    "buyer.vat_id",
                    "intra-community supply: buyer must have a VAT ID (BT-48)",
                    "BR-IC-03",
                ));
            }
            if invoice.seller.address.country_code == invoice.buyer.address.country_code {
                errors.push(ValidationError::with_rule(
                    "buyer.address.country_code",
                    "intra-community supply: buyer country (BT-55) must differ from seller country (BT-40)",
                    "BR-IC-04",
                ));
            }
            require_category(invoice, TaxCategory::IntraCommunitySupply, "BR-IC-01", errors);
        }

        VatScenario::Export => {
            require_category(invoice, TaxCategory::Export, "BR-G-01", errors);
        }

        VatScenario::Domestic | VatScenario::Mixed => {}
    }
}

fn has_note(invoice: &Invoice, paragraph: &str) -> bool {
    invoice
        .notes
        .iter()
        .any(|n| n.contains(paragraph) && n.contains("UStG"))
}

fn require_category(
    invoice: &Invoice,
    category: TaxCategory,
    rule: &str,
    errors: &mut Vec<ValidationError>,
) {
    for (i, line) in invoice.lines.iter().enumerate() {
        if line.tax_category != category {
            errors.push(ValidationError::with_rule(
                format!("lines[{i}].tax_category"),
                format!(
                    "lines must use category {} ({}), got {}",
                    category.code(),
                    category_name(category),
                    line.tax_category.code()
                ),
                rule,
            ));
        }
    }
}

/// Validate basic VAT ID format (2 letter country code + identifier).
fn validate_vat_id_format(vat_id: &str, field: &str, errors: &mut Vec<ValidationError>) {
    let compact: String = vat_id.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.len() < 4 || !compact.is_ascii() {
        errors.push(ValidationError::with_rule(
            field,
            format!("VAT ID '{vat_id}' must be a 2-letter country code followed by an identifier"),
            "BR-CO-09",
        ));
        return;
    }

    let (country, number) = compact.split_at(2);
    if !country.chars().all(|c| c.is_ascii_uppercase()) {
        errors.push(ValidationError::with_rule(
            field,
            format!("VAT ID must start with a 2-letter country code (e.g. DE, AT, FR), got: '{country}'"),
            "BR-CO-09",
        ));
    }

    if country == "DE" && (number.len() != 9 || !number.chars().all(|c| c.is_ascii_digit())) {
        errors.push(ValidationError::with_rule(
            field,
            format!("German VAT ID must be DE followed by exactly 9 digits, got: '{vat_id}'"),
            "BR-CO-09",
        ));
    }
}

/// Validate an invoice against EN 16931 business rules not covered by
/// [`validate_14_ustg`]: line identifiers, unit codes, exemption reasons
/// and decimal precision.
pub fn validate_en16931(invoice: &Invoice) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    // BR-CO-04: Each invoice line identifier (BT-126) must be unique
    let mut seen = HashSet::new();
    for (i, line) in invoice.lines.iter().enumerate() {
        if !seen.insert(line.id.as_str()) {
            errors.push(ValidationError::with_rule(
                format!("lines[{i}].id"),
                format!("duplicate line identifier '{}'", line.id),
                "BR-CO-04",
            ));
        }
    }

    // BR-26: Each line shall have a quantity unit of measure
    for (i, line) in invoice.lines.iter().enumerate() {
        if line.unit.trim().is_empty() {
            errors.push(ValidationError::with_rule(
                format!("lines[{i}].unit"),
                "line quantity unit of measure must not be empty",
                "BR-26",
            ));
        } else if !super::units::is_known_unit_code(&line.unit) {
            errors.push(ValidationError::with_rule(
                format!("lines[{i}].unit"),
                format!(
                    "unit code '{}' is not a known UN/CEFACT Rec 20 code (BT-130)",
                    line.unit
                ),
                "BR-26",
            ));
        }
    }

    if let Some(totals) = &invoice.totals {
        // BR-E-10, BR-AE-10, BR-IC-10, BR-G-10, BR-O-10: exemption reason
        for (i, vb) in totals.vat_breakdown.iter().enumerate() {
            let needs_reason = !matches!(
                vb.category,
                TaxCategory::StandardRate | TaxCategory::ZeroRated
            );
            if needs_reason && vb.exemption_reason.is_none() && vb.exemption_reason_code.is_none()
            {
                errors.push(ValidationError::with_rule(
                    format!("totals.vat_breakdown[{i}]"),
                    format!(
                        "{} category requires an exemption reason or reason code",
                        category_name(vb.category)
                    ),
                    format!("BR-{}-10", rule_group(vb.category)),
                ));
            }
        }

        // BR-DEC-*: amounts carry at most the currency's minor unit precision
        let dp = currencies::minor_unit_exponent(&invoice.currency_code);
        let amounts = [
            ("totals.net_total", totals.net_total),
            ("totals.vat_total", totals.vat_total),
            ("totals.gross_total", totals.gross_total),
            ("totals.amount_due", totals.amount_due),
        ];
        for (field, value) in amounts {
            if value != value.round_dp(dp) {
                errors.push(ValidationError::with_rule(
                    field,
                    format!("amount {value} has more than {dp} decimal places"),
                    "BR-DEC-01",
                ));
            }
        }
    }

    errors
}

/// Rule-set prefix of a category in EN 16931 (BR-IC-* for code K).
fn rule_group(cat: TaxCategory) -> &'static str {
    match cat {
        TaxCategory::IntraCommunitySupply => "IC",
        other => other.code(),
    }
}

pub(crate) fn category_name(cat: TaxCategory) -> &'static str {
    match cat {
        TaxCategory::StandardRate => "Standard Rate",
        TaxCategory::ZeroRated => "Zero Rated",
        TaxCategory::Exempt => "Exempt",
        TaxCategory::ReverseCharge => "Reverse Charge",
        TaxCategory::IntraCommunitySupply => "Intra-Community Supply",
        TaxCategory::Export => "Export",
        TaxCategory::NotSubjectToVat => "Not Subject to VAT",
    }
}

/// Legally required invoice note for a scenario, if any.
pub fn scenario_note(scenario: VatScenario) -> Option<&'static str> {
    match scenario {
        VatScenario::Kleinunternehmer => {
            Some("Kein Ausweis von Umsatzsteuer, da Kleinunternehmer gemäß §19 UStG")
        }
        VatScenario::ReverseCharge => {
            Some("Steuerschuldnerschaft des Leistungsempfängers gemäß §13b UStG")
        }
        VatScenario::IntraCommunitySupply => {
            Some("Steuerfreie innergemeinschaftliche Lieferung gemäß §4 Nr. 1b UStG")
        }
        VatScenario::Export => Some("Steuerfreie Ausfuhrlieferung gemäß §4 Nr. 1a UStG"),
        VatScenario::Domestic | VatScenario::Mixed => None,
    }
}

fn exemption_reason_for(category: TaxCategory, scenario: VatScenario) -> Option<&'static str> {
    match (category, scenario) {
        (TaxCategory::NotSubjectToVat, VatScenario::Kleinunternehmer) => {
            scenario_note(VatScenario::Kleinunternehmer)
        }
        (TaxCategory::NotSubjectToVat, _) => Some("Nicht steuerbar"),
        (TaxCategory::ReverseCharge, _) => scenario_note(VatScenario::ReverseCharge),
        (TaxCategory::IntraCommunitySupply, _) => {
            scenario_note(VatScenario::IntraCommunitySupply)
        }
        (TaxCategory::Export, _) => scenario_note(VatScenario::Export),
        (TaxCategory::Exempt, _) => Some("Umsatzsteuerbefreit"),
        _ => None,
    }
}

fn exemption_reason_code_for(category: TaxCategory) -> Option<&'static str> {
    match category {
        TaxCategory::NotSubjectToVat => Some("vatex-eu-o"),
        TaxCategory::ReverseCharge => Some("vatex-eu-ae"),
        TaxCategory::IntraCommunitySupply => Some("vatex-eu-ic"),
        TaxCategory::Export => Some("vatex-eu-g"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::builder::*;
    use crate::core::error::RechnungError;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn test_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 15).unwrap()
    }

    fn test_address(country: &str) -> Address {
        AddressBuilder::new("Berlin", "10115", country).build()
    }

    fn test_seller() -> Party {
        PartyBuilder::new("Test GmbH", test_address("DE"))
            .vat_id("DE123456789")
            .build()
    }

    fn test_buyer() -> Party {
        PartyBuilder::new("Kunde AG", test_address("DE")).build()
    }

    fn test_line() -> LineItem {
        LineItemBuilder::new("1", "Beratung", dec!(10), "HUR", dec!(150))
            .tax(TaxCategory::StandardRate, dec!(19))
            .build()
    }

    fn violations(result: Result<Invoice, RechnungError>) -> Vec<ValidationError> {
        match result {
            Err(RechnungError::Validation(v)) => v,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn valid_domestic_invoice() {
        let inv = InvoiceBuilder::new("RE-001", test_date())
            .seller(test_seller())
            .buyer(test_buyer())
            .add_line(test_line())
            .tax_point_date(test_date())
            .build()
            .unwrap();

        let totals = inv.totals.unwrap();
        assert_eq!(totals.line_net_total, dec!(1500));
        assert_eq!(totals.vat_total, dec!(285));
        assert_eq!(totals.gross_total, dec!(1785));
        assert_eq!(inv.vat_scenario, VatScenario::Domestic);
    }

    #[test]
    fn line_amounts_round_to_minor_unit() {
        let line = LineItemBuilder::new("1", "Schrauben", dec!(3), "H87", dec!(0.335)).build();
        let inv = InvoiceBuilder::new("RE-002", test_date())
            .seller(test_seller())
            .buyer(test_buyer())
            .add_line(line)
            .tax_point_date(test_date())
            .build()
            .unwrap();

        assert_eq!(inv.lines[0].line_amount, Some(dec!(1.01)));
        let totals = inv.totals.unwrap();
        assert_eq!(totals.vat_total, dec!(0.19));
        assert_eq!(totals.gross_total, dec!(1.20));
    }

    #[test]
    fn zero_decimal_currency() {
        let line = LineItemBuilder::new("1", "Service", dec!(1), "C62", dec!(999.5)).build();
        let inv = InvoiceBuilder::new("JP-1", test_date())
            .currency("JPY")
            .seller(test_seller())
            .buyer(test_buyer())
            .add_line(line)
            .tax_point_date(test_date())
            .build()
            .unwrap();
        let totals = inv.totals.as_ref().unwrap();
        assert_eq!(totals.line_net_total, dec!(1000));
        assert_eq!(totals.vat_total, dec!(190));
        assert!(validate_en16931(&inv).is_empty());
    }

    #[test]
    fn breakdown_groups_by_category_and_rate() {
        let inv = InvoiceBuilder::new("RE-003", test_date())
            .seller(test_seller())
            .buyer(test_buyer())
            .add_line(test_line())
            .add_line(
                LineItemBuilder::new("2", "Buch", dec!(2), "H87", dec!(20))
                    .tax(TaxCategory::StandardRate, dec!(7))
                    .build(),
            )
            .add_line(
                LineItemBuilder::new("3", "Mehr Beratung", dec!(1), "HUR", dec!(100))
                    .tax(TaxCategory::StandardRate, dec!(19.00))
                    .build(),
            )
            .tax_point_date(test_date())
            .build()
            .unwrap();

        let breakdown = &inv.totals.as_ref().unwrap().vat_breakdown;
        assert_eq!(breakdown.len(), 2);
        assert_eq!(breakdown[0].rate, dec!(7));
        assert_eq!(breakdown[0].tax_amount, dec!(2.80));
        assert_eq!(breakdown[1].taxable_amount, dec!(1600));
        assert_eq!(breakdown[1].tax_amount, dec!(304));
    }

    #[test]
    fn missing_seller_vat_id_and_tax_number() {
        let seller = PartyBuilder::new("Test GmbH", test_address("DE")).build();

        let errors = violations(
            InvoiceBuilder::new("RE-001", test_date())
                .seller(seller)
                .buyer(test_buyer())
                .add_line(test_line())
                .tax_point_date(test_date())
                .build(),
        );
        assert!(errors.iter().any(|e| e.rule.as_deref() == Some("BR-CO-09")));
    }

    #[test]
    fn missing_delivery_date() {
        let errors = violations(
            InvoiceBuilder::new("RE-001", test_date())
                .seller(test_seller())
                .buyer(test_buyer())
                .add_line(test_line())
                .build(),
        );
        assert!(errors.iter().any(|e| e.field == "tax_point_date"));
    }

    #[test]
    fn missing_parties_are_itemized() {
        let errors = violations(InvoiceBuilder::new("RE-001", test_date()).build());
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, ["seller", "buyer"]);
    }

    #[test]
    fn reverse_charge_requires_buyer_vat_id() {
        let line = LineItemBuilder::new("1", "Service", dec!(1), "C62", dec!(1000))
            .tax(TaxCategory::ReverseCharge, dec!(0))
            .build();

        let errors = violations(
            InvoiceBuilder::new("RE-001", test_date())
                .note(scenario_note(VatScenario::ReverseCharge).unwrap())
                .seller(test_seller())
                .buyer(test_buyer())
                .add_line(line)
                .tax_point_date(test_date())
                .build(),
        );
        assert!(errors.iter().any(|e| e.rule.as_deref() == Some("BR-AE-02")));
    }

    #[test]
    fn kleinunternehmer_requires_note() {
        let line = LineItemBuilder::new("1", "Design", dec!(1), "C62", dec!(500))
            .tax(TaxCategory::NotSubjectToVat, dec!(0))
            .build();

        let errors = violations(
            InvoiceBuilder::new("RE-001", test_date())
                .seller(test_seller())
                .buyer(test_buyer())
                .add_line(line.clone())
                .tax_point_date(test_date())
                .build(),
        );
        assert!(errors.iter().any(|e| e.message.contains("§19")));

        let inv = InvoiceBuilder::new("RE-001", test_date())
            .note(scenario_note(VatScenario::Kleinunternehmer).unwrap())
            .seller(test_seller())
            .buyer(test_buyer())
            .add_line(line)
            .tax_point_date(test_date())
            .build()
            .unwrap();
        assert_eq!(inv.totals.unwrap().vat_total, dec!(0));
    }

    #[test]
    fn tampered_totals_fail_arithmetic() {
        let mut inv = InvoiceBuilder::new("RE-001", test_date())
            .seller(test_seller())
            .buyer(test_buyer())
            .add_line(test_line())
            .tax_point_date(test_date())
            .build()
            .unwrap();
        if let Some(totals) = inv.totals.as_mut() {
            totals.net_total += dec!(0.01);
        }
        assert!(validate_arithmetic(&inv).is_empty(), "one minor unit is tolerated");

        if let Some(totals) = inv.totals.as_mut() {
            totals.net_total += dec!(0.05);
        }
        let errors = validate_arithmetic(&inv);
        assert!(errors.iter().any(|e| e.rule.as_deref() == Some("BR-CO-13")));
    }

    #[test]
    fn line_product_out_of_range_is_rejected() {
        let huge = Decimal::MAX;
        let line = LineItemBuilder::new("1", "Beratung", dec!(2), "HUR", huge)
            .tax(TaxCategory::StandardRate, dec!(19))
            .build();
        let v = violations(
            InvoiceBuilder::new("RE-001", test_date())
                .seller(test_seller())
                .buyer(test_buyer())
                .add_line(line)
                .tax_point_date(test_date())
                .build(),
        );
        assert_eq!(v.len(), 1);
        assert_eq!(v[0].field, "lines[0].line_amount");
        assert_eq!(v[0].rule.as_deref(), Some("BR-LIN-04"));
    }

    #[test]
    fn group_tax_out_of_range_is_rejected() {
        let big = Decimal::from_i128_with_scale(70_000_000_000_000_000_000_000_000, 0);
        let line = LineItemBuilder::new("1", "Beratung", dec!(1), "HUR", big)
            .tax(TaxCategory::StandardRate, dec!(19))
            .build();
        let v = violations(
            InvoiceBuilder::new("RE-001", test_date())
                .seller(test_seller())
                .buyer(test_buyer())
                .add_line(line)
                .tax_point_date(test_date())
                .build_unchecked(),
        );
        assert_eq!(v[0].field, "totals.vat_breakdown[0].tax_amount");
    }

    #[test]
    fn tampered_totals_near_range_limit_do_not_panic() {
        let mut inv = InvoiceBuilder::new("RE-001", test_date())
            .seller(test_seller())
            .buyer(test_buyer())
            .add_line(test_line())
            .tax_point_date(test_date())
            .build()
            .unwrap();
        if let Some(totals) = inv.totals.as_mut() {
            totals.net_total = Decimal::MAX;
            totals.vat_total = Decimal::MAX;
            totals.vat_breakdown[0].taxable_amount = Decimal::MAX;
        }
        let rules: Vec<_> = validate_arithmetic(&inv)
            .into_iter()
            .filter_map(|e| e.rule)
            .collect();
        assert!(rules.contains(&"BR-CO-15".to_string()));
        assert!(rules.contains(&"BR-CO-17".to_string()));
    }

    #[test]
    fn duplicate_line_ids_detected() {
        let inv = InvoiceBuilder::new("DUP-001", test_date())
            .seller(test_seller())
            .buyer(test_buyer())
            .add_line(test_line())
            .add_line(test_line())
            .tax_point_date(test_date())
            .build()
            .unwrap();

        let errors = validate_en16931(&inv);
        assert!(errors.iter().any(|e| e.rule.as_deref() == Some("BR-CO-04")));
    }

    #[test]
    fn unknown_unit_code() {
        let line = LineItemBuilder::new("1", "Fass Bier", dec!(1), "FASS", dec!(80)).build();
        let inv = InvoiceBuilder::new("RE-004", test_date())
            .seller(test_seller())
            .buyer(test_buyer())
            .add_line(line)
            .tax_point_date(test_date())
            .build()
            .unwrap();
        let errors = validate_en16931(&inv);
        assert!(errors.iter().any(|e| e.rule.as_deref() == Some("BR-26")));
    }

    #[test]
    fn exempt_needs_reason() {
        let line = LineItemBuilder::new("1", "Tax-free", dec!(1), "C62", dec!(100))
            .tax(TaxCategory::Exempt, dec!(0))
            .build();

        let mut inv = InvoiceBuilder::new("EN-002", test_date())
            .seller(test_seller())
            .buyer(test_buyer())
            .add_line(line)
            .tax_point_date(test_date())
            .build()
            .unwrap();
        assert!(validate_en16931(&inv).is_empty());

        if let Some(totals) = inv.totals.as_mut() {
            for vb in &mut totals.vat_breakdown {
                vb.exemption_reason = None;
                vb.exemption_reason_code = None;
            }
        }
        let errors = validate_en16931(&inv);
        assert!(errors.iter().any(|e| e.rule.as_deref() == Some("BR-E-10")));
    }
}
