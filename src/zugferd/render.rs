use chrono::NaiveDate;
use lopdf::content::{Content, Operation};
use lopdf::{Object, StringFormat};
use rust_decimal::Decimal;

use super::font::{PdfFont, encode_win_ansi};
use crate::core::*;

pub const PAGE_WIDTH: f32 = 595.28;
pub const PAGE_HEIGHT: f32 = 841.89;
const MARGIN_LEFT: f32 = 56.7;
const MARGIN_RIGHT: f32 = 56.7;
const MARGIN_TOP: f32 = 56.7;
const CONTENT_BOTTOM: f32 = 90.0;
const CONTENT_WIDTH: f32 = PAGE_WIDTH - MARGIN_LEFT - MARGIN_RIGHT;
const RIGHT_EDGE: f32 = PAGE_WIDTH - MARGIN_RIGHT;

pub const FONT_RESOURCE: &str = "F1";
pub const LOGO_RESOURCE: &str = "Im1";

/// Logo placement box in points.
const LOGO_MAX_WIDTH: f32 = 150.0;
const LOGO_MAX_HEIGHT: f32 = 60.0;

/// Line table column layout (x offsets relative to the left margin).
struct Columns;

impl Columns {
    const POS: f32 = 0.0;
    const DESCRIPTION: f32 = 28.0;
    const DESCRIPTION_WIDTH: f32 = 196.0;
    const QUANTITY_RIGHT: f32 = 268.0;
    const UNIT: f32 = 276.0;
    const PRICE_RIGHT: f32 = 378.0;
    const VAT_RIGHT: f32 = 418.0;
    const AMOUNT_RIGHT: f32 = CONTENT_WIDTH;
}

/// Pixel size of the logo image, used to place it on the first page.
#[derive(Debug, Clone, Copy)]
pub struct LogoSize {
    pub width: u32,
    pub height: u32,
}

/// Lay out the invoice and return one content stream per page.
pub fn render_pages(
    invoice: &Invoice,
    font: &PdfFont,
    logo: Option<LogoSize>,
) -> Result<Vec<Vec<u8>>, RechnungError> {
    let mut layout = Layout::new(font);
    let totals = invoice.totals.as_ref().ok_or_else(|| {
        RechnungError::Packaging(format!("invoice {} has no totals", invoice.number))
    })?;

    if let Some(size) = logo {
        layout.logo(size);
    }
    layout.header(invoice);
    layout.notes(&invoice.notes);
    layout.line_table(invoice);
    layout.totals(totals, &invoice.currency_code);
    layout.payment(invoice);

    layout.finish(&invoice.seller)
}

struct Layout<'a> {
    font: &'a PdfFont,
    pages: Vec<Vec<Operation>>,
    y: f32,
}

impl<'a> Layout<'a> {
    fn new(font: &'a PdfFont) -> Self {
        Self {
            font,
            pages: vec![Vec::new()],
            y: PAGE_HEIGHT - MARGIN_TOP,
        }
    }

    fn ops(&mut self) -> &mut Vec<Operation> {
        if self.pages.is_empty() {
            self.pages.push(Vec::new());
        }
        let last = self.pages.len() - 1;
        &mut self.pages[last]
    }

    fn new_page(&mut self) {
        self.pages.push(Vec::new());
        self.y = PAGE_HEIGHT - MARGIN_TOP;
    }

    /// Start a new page unless `height` still fits above the footer.
    fn ensure(&mut self, height: f32) -> bool {
        if self.y - height < CONTENT_BOTTOM {
            self.new_page();
            true
        } else {
            false
        }
    }

    fn text(&mut self, x: f32, y: f32, size: f32, text: &str) {
        if text.is_empty() {
            return;
        }
        let encoded = encode_win_ansi(text);
        let ops = self.ops();
        ops.push(Operation::new("BT", vec![]));
        ops.push(Operation::new(
            "Tf",
            vec![Object::Name(FONT_RESOURCE.as_bytes().to_vec()), real(size)],
        ));
        ops.push(Operation::new("Td", vec![real(x), real(y)]));
        ops.push(Operation::new(
            "Tj",
            vec![Object::String(encoded, StringFormat::Literal)],
        ));
        ops.push(Operation::new("ET", vec![]));
    }

    fn text_right(&mut self, right: f32, y: f32, size: f32, text: &str) {
        let width = self.font.text_width(text, size);
        self.text(right - width, y, size, text);
    }

    fn rule(&mut self, x1: f32, x2: f32, y: f32, width: f32) {
        let ops = self.ops();
        ops.push(Operation::new("w", vec![real(width)]));
        ops.push(Operation::new("m", vec![real(x1), real(y)]));
        ops.push(Operation::new("l", vec![real(x2), real(y)]));
        ops.push(Operation::new("S", vec![]));
    }

    fn gray(&mut self, level: f32) {
        let ops = self.ops();
        ops.push(Operation::new("g", vec![real(level)]));
        ops.push(Operation::new("G", vec![real(level)]));
    }

    fn logo(&mut self, size: LogoSize) {
        if size.width == 0 || size.height == 0 {
            return;
        }
        let (w, h) = (size.width as f32, size.height as f32);
        let scale = (LOGO_MAX_WIDTH / w).min(LOGO_MAX_HEIGHT / h);
        let (w, h) = (w * scale, h * scale);
        let x = RIGHT_EDGE - w;
        let y = PAGE_HEIGHT - MARGIN_TOP - h + 14.0;
        let ops = self.ops();
        ops.push(Operation::new("q", vec![]));
        ops.push(Operation::new(
            "cm",
            vec![real(w), real(0.0), real(0.0), real(h), real(x), real(y)],
        ));
        ops.push(Operation::new(
            "Do",
            vec![Object::Name(LOGO_RESOURCE.as_bytes().to_vec())],
        ));
        ops.push(Operation::new("Q", vec![]));
    }

    fn header(&mut self, invoice: &Invoice) {
        let seller = &invoice.seller;
        let buyer = &invoice.buyer;
        let left = MARGIN_LEFT;

        // Issuer block
        self.text(left, self.y, 14.0, &seller.name);
        self.y -= 14.0;
        for line in address_lines(&seller.address) {
            self.text(left, self.y, 9.0, &line);
            self.y -= 11.0;
        }
        if let Some(contact) = &seller.contact {
            for value in [&contact.phone, &contact.email].into_iter().flatten() {
                self.text(left, self.y, 9.0, value);
                self.y -= 11.0;
            }
        }

        // Recipient window
        self.y = self.y.min(PAGE_HEIGHT - 150.0);
        let sender = format!(
            "{} · {}",
            seller.name,
            address_lines(&seller.address).join(" · ")
        );
        self.gray(0.35);
        self.text(left, self.y, 7.0, &sender);
        self.gray(0.0);
        let recipient_top = self.y - 16.0;
        let mut y = recipient_top;
        self.text(left, y, 10.0, &buyer.name);
        y -= 13.0;
        for line in address_lines(&buyer.address) {
            self.text(left, y, 10.0, &line);
            y -= 13.0;
        }

        // Document data
        let label_x = MARGIN_LEFT + 300.0;
        let mut rows: Vec<(&str, String)> = vec![
            ("Rechnungsnummer", invoice.number.clone()),
            ("Rechnungsdatum", german_date(invoice.issue_date)),
        ];
        if let Some(date) = invoice.tax_point_date {
            rows.push(("Leistungsdatum", german_date(date)));
        }
        if let Some(date) = invoice.due_date {
            rows.push(("Fällig am", german_date(date)));
        }
        if let Some(reference) = invoice
            .buyer_reference
            .as_deref()
            .filter(|r| *r != invoice.number)
        {
            rows.push(("Ihre Referenz", reference.to_string()));
        }
        if let Some(vat_id) = buyer.vat_id.as_deref() {
            rows.push(("Ihre USt-IdNr.", vat_id.to_string()));
        }
        let mut dy = recipient_top;
        for (label, value) in rows {
            self.text(label_x, dy, 9.0, label);
            self.text_right(RIGHT_EDGE, dy, 9.0, &value);
            dy -= 12.0;
        }

        self.y = y.min(dy) - 30.0;
        let title = format!("{} {}", invoice.type_code.title(), invoice.number);
        self.text(left, self.y, 16.0, &title);
        self.y -= 24.0;
    }

    fn notes(&mut self, notes: &[String]) {
        for note in notes {
            for line in wrap(self.font, note, 9.0, CONTENT_WIDTH) {
                self.ensure(12.0);
                self.text(MARGIN_LEFT, self.y, 9.0, &line);
                self.y -= 12.0;
            }
        }
        if !notes.is_empty() {
            self.y -= 8.0;
        }
    }

    fn table_header(&mut self) {
        let left = MARGIN_LEFT;
        let size = 8.5;
        self.text(left + Columns::POS, self.y, size, "Pos.");
        self.text(left + Columns::DESCRIPTION, self.y, size, "Beschreibung");
        self.text_right(left + Columns::QUANTITY_RIGHT, self.y, size, "Menge");
        self.text(left + Columns::UNIT, self.y, size, "Einheit");
        self.text_right(left + Columns::PRICE_RIGHT, self.y, size, "Einzelpreis");
        self.text_right(left + Columns::VAT_RIGHT, self.y, size, "USt.");
        self.text_right(left + Columns::AMOUNT_RIGHT, self.y, size, "Betrag");
        self.y -= 5.0;
        self.rule(left, RIGHT_EDGE, self.y, 0.6);
        self.y -= 13.0;
    }

    fn line_table(&mut self, invoice: &Invoice) {
        let left = MARGIN_LEFT;
        let currency = invoice.currency_code.as_str();
        self.ensure(60.0);
        self.table_header();

        for line in &invoice.lines {
            let mut description = wrap(self.font, &line.item_name, 9.0, Columns::DESCRIPTION_WIDTH);
            let details = line
                .description
                .as_deref()
                .map(|d| wrap(self.font, d, 7.5, Columns::DESCRIPTION_WIDTH))
                .unwrap_or_default();
            if description.is_empty() {
                description.push(String::new());
            }
            let height = description.len() as f32 * 11.0 + details.len() as f32 * 9.0 + 4.0;
            if self.ensure(height) {
                self.table_header();
            }

            let y = self.y;
            self.text(left + Columns::POS, y, 9.0, &line.id);
            self.text_right(
                left + Columns::QUANTITY_RIGHT,
                y,
                9.0,
                &german_number(line.quantity, 0),
            );
            self.text(left + Columns::UNIT, y, 9.0, unit_label(&line.unit));
            self.text_right(
                left + Columns::PRICE_RIGHT,
                y,
                9.0,
                &german_money(line.unit_price, currency),
            );
            self.text_right(
                left + Columns::VAT_RIGHT,
                y,
                9.0,
                &format!("{} %", german_number(line.tax_rate, 0)),
            );
            if let Some(amount) = line.line_amount {
                self.text_right(
                    left + Columns::AMOUNT_RIGHT,
                    y,
                    9.0,
                    &german_money(amount, currency),
                );
            }

            for text in &description {
                self.text(left + Columns::DESCRIPTION, self.y, 9.0, text);
                self.y -= 11.0;
            }
            self.gray(0.35);
            for text in &details {
                self.text(left + Columns::DESCRIPTION, self.y, 7.5, text);
                self.y -= 9.0;
            }
            self.gray(0.0);
            self.y -= 4.0;
        }

        self.rule(left, RIGHT_EDGE, self.y + 8.0, 0.6);
        self.y -= 6.0;
    }

    fn totals(&mut self, totals: &Totals, currency: &str) {
        let label_x = MARGIN_LEFT + 250.0;
        let rows = 3 + totals.vat_breakdown.len();
        self.ensure(rows as f32 * 13.0 + 20.0);

        self.text(label_x, self.y, 9.5, "Summe netto");
        self.text_right(RIGHT_EDGE, self.y, 9.5, &german_money(totals.net_total, currency));
        self.y -= 13.0;

        for group in &totals.vat_breakdown {
            let label = if group.category.is_zero_rate() {
                format!(
                    "USt. 0 % ({}) auf {}",
                    group.category.code(),
                    german_money(group.taxable_amount, currency)
                )
            } else {
                format!(
                    "USt. {} % auf {}",
                    german_number(group.rate, 0),
                    german_money(group.taxable_amount, currency)
                )
            };
            self.text(label_x, self.y, 9.5, &label);
            self.text_right(RIGHT_EDGE, self.y, 9.5, &german_money(group.tax_amount, currency));
            self.y -= 13.0;
        }

        self.rule(label_x, RIGHT_EDGE, self.y + 9.0, 0.4);
        self.y -= 4.0;
        self.text(label_x, self.y, 11.0, "Gesamtbetrag");
        self.text_right(RIGHT_EDGE, self.y, 11.0, &german_money(totals.gross_total, currency));
        self.y -= 14.0;
        if totals.amount_due != totals.gross_total {
            self.text(label_x, self.y, 9.5, "Zahlbetrag");
            self.text_right(RIGHT_EDGE, self.y, 9.5, &german_money(totals.amount_due, currency));
            self.y -= 13.0;
        }

        let reasons: Vec<&str> = totals
            .vat_breakdown
            .iter()
            .filter_map(|g| g.exemption_reason.as_deref())
            .collect();
        if !reasons.is_empty() {
            self.y -= 6.0;
            for reason in reasons {
                for line in wrap(self.font, reason, 8.0, CONTENT_WIDTH) {
                    self.ensure(10.0);
                    self.text(MARGIN_LEFT, self.y, 8.0, &line);
                    self.y -= 10.0;
                }
            }
        }
        self.y -= 14.0;
    }

    fn payment(&mut self, invoice: &Invoice) {
        let mut rows: Vec<(&str, String)> = Vec::new();
        if let Some(payment) = &invoice.payment {
            rows.push(("Zahlungsart", payment.means_code.label().to_string()));
            if let Some(ct) = &payment.credit_transfer {
                if let Some(name) = ct.account_name.as_deref() {
                    rows.push(("Kontoinhaber", name.to_string()));
                }
                rows.push(("IBAN", iban::format_iban(&ct.iban)));
                if let Some(bic) = ct.bic.as_deref().filter(|b| !b.trim().is_empty()) {
                    rows.push(("BIC", bic.to_string()));
                }
            }
            if let Some(reference) = payment.remittance_info.as_deref() {
                rows.push(("Verwendungszweck", reference.to_string()));
            }
        }
        if let Some(due) = invoice.due_date {
            rows.push(("Zahlbar bis", german_date(due)));
        }
        if rows.is_empty() && invoice.payment_terms.is_none() {
            return;
        }

        self.ensure(rows.len() as f32 * 12.0 + 40.0);
        self.text(MARGIN_LEFT, self.y, 10.0, "Zahlungsinformationen");
        self.y -= 14.0;
        for (label, value) in rows {
            self.text(MARGIN_LEFT, self.y, 9.0, label);
            self.text(MARGIN_LEFT + 100.0, self.y, 9.0, &value);
            self.y -= 12.0;
        }
        if let Some(terms) = invoice.payment_terms.as_deref() {
            self.y -= 4.0;
            for line in wrap(self.font, terms, 9.0, CONTENT_WIDTH) {
                self.ensure(12.0);
                self.text(MARGIN_LEFT, self.y, 9.0, &line);
                self.y -= 12.0;
            }
        }
    }

    /// Add the footer to every page and encode the content streams.
    fn finish(mut self, seller: &Party) -> Result<Vec<Vec<u8>>, RechnungError> {
        let mut legal = Vec::new();
        if let Some(vat_id) = seller.vat_id.as_deref().filter(|v| !v.is_empty()) {
            legal.push(format!("USt-IdNr.: {vat_id}"));
        }
        if let Some(tax) = seller.tax_number.as_deref().filter(|v| !v.is_empty()) {
            legal.push(format!("Steuernummer: {tax}"));
        }
        let company = format!(
            "{} · {}",
            seller.name,
            address_lines(&seller.address).join(" · ")
        );
        let legal = legal.join(" · ");

        let count = self.pages.len();
        let pages = std::mem::take(&mut self.pages);
        let mut encoded = Vec::with_capacity(count);
        for (index, ops) in pages.into_iter().enumerate() {
            self.pages = vec![ops];
            self.gray(0.35);
            self.rule(MARGIN_LEFT, RIGHT_EDGE, 62.0, 0.4);
            self.text(MARGIN_LEFT, 50.0, 7.0, &company);
            self.text(MARGIN_LEFT, 41.0, 7.0, &legal);
            self.text_right(
                RIGHT_EDGE,
                50.0,
                7.0,
                &format!("Seite {} von {}", index + 1, count),
            );
            self.gray(0.0);

            let operations = std::mem::take(self.ops());
            let bytes = Content { operations }
                .encode()
                .map_err(|e| RechnungError::Packaging(format!("content stream: {e}")))?;
            encoded.push(bytes);
        }
        Ok(encoded)
    }
}

fn real(v: f32) -> Object {
    Object::Real(v.into())
}

fn address_lines(address: &Address) -> Vec<String> {
    let mut lines = Vec::new();
    if let Some(street) = address.street.as_deref().filter(|s| !s.trim().is_empty()) {
        lines.push(street.to_string());
    }
    lines.push(format!("{} {}", address.postal_code, address.city).trim().to_string());
    if address.country_code != "DE" {
        lines.push(address.country_code.clone());
    }
    lines
}

/// Greedy word wrap using the font's advance widths.
pub fn wrap(font: &PdfFont, text: &str, size: f32, max_width: f32) -> Vec<String> {
    let mut lines = Vec::new();
    for paragraph in text.lines() {
        let mut current = String::new();
        for word in paragraph.split_whitespace() {
            let candidate = if current.is_empty() {
                word.to_string()
            } else {
                format!("{current} {word}")
            };
            if font.text_width(&candidate, size) <= max_width {
                current = candidate;
                continue;
            }
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            // Break words wider than the column
            for c in word.chars() {
                current.push(c);
                if font.text_width(&current, size) > max_width && current.chars().count() > 1 {
                    current.pop();
                    lines.push(std::mem::take(&mut current));
                    current.push(c);
                }
            }
        }
        if !current.is_empty() {
            lines.push(current);
        }
    }
    lines
}

pub fn german_date(date: NaiveDate) -> String {
    date.format("%d.%m.%Y").to_string()
}

/// German number format with `.` thousands and `,` decimals, at least `min_dp` decimals.
pub fn german_number(value: Decimal, min_dp: u32) -> String {
    let normalized = value.normalize();
    let dp = normalized.scale().max(min_dp);
    let rendered = format!("{:.*}", dp as usize, normalized);
    let (sign, digits) = match rendered.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", rendered.as_str()),
    };
    let (int_part, frac_part) = match digits.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (digits, None),
    };

    let mut grouped = String::new();
    for (i, c) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(c);
    }
    match frac_part {
        Some(f) => format!("{sign}{grouped},{f}"),
        None => format!("{sign}{grouped}"),
    }
}

fn german_money(value: Decimal, currency: &str) -> String {
    let dp = currencies::minor_unit_exponent(currency);
    let symbol = if currency == "EUR" { "€" } else { currency };
    format!("{} {symbol}", german_number(value, dp))
}

fn unit_label(code: &str) -> &str {
    match code {
        "H87" | "C62" | "XPP" => "Stk.",
        "HUR" => "Std.",
        "DAY" => "Tag",
        "MON" => "Monat",
        "LS" => "pauschal",
        "KGM" => "kg",
        "LTR" => "l",
        "MTR" => "m",
        "MTK" => "m²",
        "KMT" => "km",
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn german_number_formatting() {
        assert_eq!(german_number(dec!(1234.5), 2), "1.234,50");
        assert_eq!(german_number(dec!(1234567.891), 2), "1.234.567,891");
        assert_eq!(german_number(dec!(10.000), 0), "10");
        assert_eq!(german_number(dec!(-0.5), 2), "-0,50");
        assert_eq!(german_number(dec!(999), 2), "999,00");
    }

    #[test]
    fn money_uses_currency_exponent() {
        assert_eq!(german_money(dec!(1785), "EUR"), "1.785,00 €");
        assert_eq!(german_money(dec!(1500), "JPY"), "1.500 JPY");
    }

    #[test]
    fn dates_are_german() {
        let d = NaiveDate::from_ymd_opt(2024, 6, 5).unwrap();
        assert_eq!(german_date(d), "05.06.2024");
    }

    #[test]
    fn foreign_addresses_show_country() {
        let address = AddressBuilder::new("Wien", "1010", "AT").street("Ring 1").build();
        let lines = address_lines(&address);
        assert_eq!(lines[0], "Ring 1");
        assert_eq!(lines[1], "1010 Wien");
        assert_eq!(lines.len(), 3);
    }
}
