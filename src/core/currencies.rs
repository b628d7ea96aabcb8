//! ISO 4217 currency codes and minor units.
//!
//! Amounts are rounded commercially (half away from zero) to the minor unit
//! of the invoice currency; one minor unit is also the tolerance used when
//! comparing stated against computed amounts.

use rust_decimal::{Decimal, RoundingStrategy};

/// Check whether `code` is a known ISO 4217 currency code.
pub fn is_known_currency_code(code: &str) -> bool {
    CURRENCY_CODES.binary_search(&code).is_ok()
}

/// Number of decimal places of the currency's minor unit (2 unless listed).
pub fn minor_unit_exponent(code: &str) -> u32 {
    if ZERO_DECIMAL_CURRENCIES.binary_search(&code).is_ok() {
        0
    } else {
        2
    }
}

/// One minor unit of `code` (0.01 for EUR, 1 for JPY).
pub fn minor_unit(code: &str) -> Decimal {
    Decimal::new(1, minor_unit_exponent(code))
}

/// Commercial rounding to the minor unit of `code`, with the scale fixed
/// to that minor unit (`200` becomes `200.00` for EUR).
pub fn round_to_minor_unit(value: Decimal, code: &str) -> Decimal {
    let dp = minor_unit_exponent(code);
    let mut rounded = value.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(dp);
    rounded
}

/// Whether two amounts agree within one minor unit of `code`.
pub fn within_tolerance(a: Decimal, b: Decimal, code: &str) -> bool {
    a.checked_sub(b)
        .is_some_and(|diff| diff.abs() <= minor_unit(code))
}

/// Sorted list of common ISO 4217 currency codes.
static CURRENCY_CODES: &[&str] = &[
    "AED", "AMD", "AUD", "BGN", "BRL", "CAD", "CHF", "CLP", "CNY", "CZK", "DKK", "EGP", "EUR",
    "GBP", "GEL", "HKD", "HUF", "IDR", "ILS", "INR", "ISK", "JPY", "KES", "KRW", "KZT", "MXN",
    "MYR", "NGN", "NOK", "NZD", "PHP", "PLN", "RON", "RSD", "SAR", "SEK", "SGD", "THB", "TRY",
    "TWD", "UAH", "UGX", "USD", "VND", "XAF", "XOF", "ZAR",
];

/// Currencies in [`CURRENCY_CODES`] whose minor unit exponent is 0.
static ZERO_DECIMAL_CURRENCIES: &[&str] =
    &["CLP", "ISK", "JPY", "KRW", "UGX", "VND", "XAF", "XOF"];
