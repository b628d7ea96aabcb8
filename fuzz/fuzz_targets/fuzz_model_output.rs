#![no_main]

use libfuzzer_sys::fuzz_target;
use rechnungswerk::extract::{parse_amount, parse_date, parse_model_output};

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        let answer = parse_model_output(s);
        let _ = answer.confidence();
        let _ = parse_amount(s);
        let _ = parse_date(s);
    }
});
