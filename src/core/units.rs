//! UN/CEFACT Recommendation 20 unit codes.
//!
//! Extracted documents name units the way people write them ("Stk.",
//! "Std", "pauschal"); [`unit_code_for_label`] maps those onto Rec 20.

/// Check whether `code` is a known UN/CEFACT Rec 20 unit code.
pub fn is_known_unit_code(code: &str) -> bool {
    COMMON_UNIT_CODES.binary_search(&code).is_ok()
}

/// Resolve a free-text unit label to a Rec 20 code.
///
/// Known codes pass through unchanged; common German and English
/// abbreviations are mapped; anything else yields `None`.
pub fn unit_code_for_label(label: &str) -> Option<&'static str> {
    let trimmed = label.trim().trim_end_matches('.');
    let upper = trimmed.to_uppercase();
    if let Ok(i) = COMMON_UNIT_CODES.binary_search(&upper.as_str()) {
        return Some(COMMON_UNIT_CODES[i]);
    }
    let code = match trimmed.to_lowercase().as_str() {
        "stk" | "stck" | "stück" | "st" | "pcs" | "pc" | "piece" | "x" => "H87",
        "einheit" | "einh" | "e" | "unit" => "C62",
        "std" | "stunde" | "stunden" | "h" | "hour" | "hours" => "HUR",
        "min" | "minute" | "minuten" => "MIN",
        "tag" | "tage" | "d" | "day" | "days" => "DAY",
        "woche" | "wochen" => "WEE",
        "monat" | "monate" | "mon" | "month" => "MON",
        "jahr" | "jahre" | "year" => "ANN",
        "kg" | "kilogramm" => "KGM",
        "g" | "gramm" => "GRM",
        "t" | "tonne" | "tonnen" => "TNE",
        "m" | "meter" | "lfm" => "MTR",
        "km" | "kilometer" => "KMT",
        "m2" | "m²" | "qm" => "MTK",
        "m3" | "m³" | "cbm" => "MTQ",
        "l" | "liter" | "ltr" => "LTR",
        "kwh" => "KWH",
        "pauschal" | "pausch" | "psch" | "pauschale" | "lump sum" => "LS",
        "paar" | "pair" => "PR",
        "satz" | "set" => "SET",
        "paket" | "pack" | "packung" => "PK",
        "karton" => "CT",
        "rolle" => "RO",
        "palette" => "XPX",
        _ => return None,
    };
    Some(code)
}

/// Sorted list of common UN/CEFACT Rec 20 unit codes used in EN 16931 invoicing.
static COMMON_UNIT_CODES: &[&str] = &[
    "ANN", // Year
    "C62", // One
    "CMT", // Centimetre
    "CT",  // Carton
    "DAY", // Day
    "DZN", // Dozen
    "GRM", // Gram
    "H87", // Piece
    "HUR", // Hour
    "KGM", // Kilogram
    "KMT", // Kilometre
    "KWH", // Kilowatt-hour
    "LS",  // Lump sum
    "LTR", // Litre
    "MIN", // Minute
    "MLT", // Millilitre
    "MMT", // Millimetre
    "MON", // Month
    "MTK", // Square metre
    "MTQ", // Cubic metre
    "MTR", // Metre
    "P1",  // Percent
    "PK",  // Pack
    "PR",  // Pair
    "RO",  // Roll
    "SEC", // Second
    "SET", // Set
    "TNE", // Tonne
    "WEE", // Week
    "XPX", // Pallet
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_codes() {
        assert!(is_known_unit_code("C62"));
        assert!(is_known_unit_code("H87"));
        assert!(is_known_unit_code("HUR"));
        assert!(is_known_unit_code("LS"));
        assert!(!is_known_unit_code("PIECE"));
        assert!(!is_known_unit_code(""));
    }

    #[test]
    fn german_labels() {
        assert_eq!(unit_code_for_label("Stk."), Some("H87"));
        assert_eq!(unit_code_for_label("Std"), Some("HUR"));
        assert_eq!(unit_code_for_label("pauschal"), Some("LS"));
        assert_eq!(unit_code_for_label("m²"), Some("MTK"));
        assert_eq!(unit_code_for_label("hur"), Some("HUR"));
        assert_eq!(unit_code_for_label("Fass"), None);
    }

    #[test]
    fn list_is_sorted() {
        for window in COMMON_UNIT_CODES.windows(2) {
            assert!(
                window[0] < window[1],
                "unit codes not sorted: {} >= {}",
                window[0],
                window[1]
            );
        }
    }
}
