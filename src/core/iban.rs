//! IBAN checksum validation (ISO 13616, mod-97).

use std::fmt;

/// Error returned when an IBAN fails structural or checksum validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IbanError {
    /// The invalid input value.
    pub value: String,
    /// Why the value failed validation.
    pub reason: &'static str,
}

impl fmt::Display for IbanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid IBAN '{}': {}", self.value, self.reason)
    }
}

impl std::error::Error for IbanError {}

/// Strip whitespace and uppercase an IBAN as printed on invoices.
pub fn normalize_iban(iban: &str) -> String {
    iban.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_uppercase)
        .collect()
}

/// Validate an IBAN and return its normalized (electronic) form.
pub fn validate_iban(iban: &str) -> Result<String, IbanError> {
    let normalized = normalize_iban(iban);
    let fail = |reason| IbanError {
        value: iban.trim().to_string(),
        reason,
    };

    if !(15..=34).contains(&normalized.len()) {
        return Err(fail("length must be between 15 and 34 characters"));
    }
    let bytes = normalized.as_bytes();
    if !bytes[..2].iter().all(u8::is_ascii_uppercase) {
        return Err(fail("must start with a 2-letter country code"));
    }
    if !bytes[2..4].iter().all(u8::is_ascii_digit) {
        return Err(fail("check digits must be numeric"));
    }
    if !bytes.iter().all(u8::is_ascii_alphanumeric) {
        return Err(fail("must contain only letters and digits"));
    }
    if normalized.starts_with("DE") && normalized.len() != 22 {
        return Err(fail("German IBANs have 22 characters"));
    }

    // Move the first four characters to the end, map letters to 10..35,
    // and reduce mod 97 digit by digit.
    let rearranged = bytes[4..].iter().chain(&bytes[..4]);
    let mut remainder: u32 = 0;
    for &b in rearranged {
        let value = if b.is_ascii_digit() {
            u32::from(b - b'0')
        } else {
            u32::from(b - b'A') + 10
        };
        remainder = if value >= 10 {
            (remainder * 100 + value) % 97
        } else {
            (remainder * 10 + value) % 97
        };
    }

    if remainder == 1 {
        Ok(normalized)
    } else {
        Err(fail("checksum mismatch"))
    }
}

/// Group an IBAN in blocks of four for display.
pub fn format_iban(iban: &str) -> String {
    normalize_iban(iban)
        .as_bytes()
        .chunks(4)
        .map(|c| String::from_utf8_lossy(c).into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}
