//! Phone identity normalization
//!
//! Customer identity is keyed on phone numbers that arrive in whatever shape
//! a human or an exported CRM produced. Everything here is pure string work;
//! the matcher and the event linker both build on these functions.

use serde::{Deserialize, Serialize};

/// Canonical phone identity used as the sole match key across input formats.
///
/// Invariant: `e164.is_some()` implies `last10.is_some()`, and `last10` is
/// the final 10 digits of the e164 digit string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalIdentity {
    pub e164: Option<String>,
    pub last10: Option<String>,
}

impl CanonicalIdentity {
    pub fn none() -> Self {
        Self { e164: None, last10: None }
    }

    /// A record or row with no `last10` can never be matched.
    pub fn is_matchable(&self) -> bool {
        self.last10.is_some()
    }
}

/// Dialing rules for one country. `national_len` is inclusive.
#[derive(Debug)]
pub struct Country {
    pub alpha2: &'static str,
    pub calling_code: &'static str,
    pub national_len: (usize, usize),
    /// National format carries a leading trunk `0` that E.164 drops.
    pub trunk_zero: bool,
}

/// Countries the normalizer can produce E.164 numbers for. Numbers from
/// anywhere else still get a `last10` fallback key.
pub const COUNTRIES: &[Country] = &[
    Country { alpha2: "US", calling_code: "1", national_len: (10, 10), trunk_zero: false },
    Country { alpha2: "CA", calling_code: "1", national_len: (10, 10), trunk_zero: false },
    Country { alpha2: "GB", calling_code: "44", national_len: (10, 10), trunk_zero: true },
    Country { alpha2: "AU", calling_code: "61", national_len: (9, 9), trunk_zero: true },
    Country { alpha2: "NZ", calling_code: "64", national_len: (8, 10), trunk_zero: true },
    Country { alpha2: "DE", calling_code: "49", national_len: (7, 11), trunk_zero: true },
    Country { alpha2: "FR", calling_code: "33", national_len: (9, 9), trunk_zero: true },
    Country { alpha2: "ES", calling_code: "34", national_len: (9, 9), trunk_zero: false },
    Country { alpha2: "CZ", calling_code: "420", national_len: (9, 9), trunk_zero: false },
    Country { alpha2: "MX", calling_code: "52", national_len: (10, 10), trunk_zero: false },
];

pub fn country_by_alpha2(alpha2: &str) -> Option<&'static Country> {
    COUNTRIES.iter().find(|c| c.alpha2.eq_ignore_ascii_case(alpha2))
}

/// Normalize a raw phone string into its canonical identity.
///
/// `last10` is the final 10 digits of the digit-only form when at least 10
/// digits are present. `e164` is derived when the digits form a valid
/// national number for `home` or carry a recognizable international prefix;
/// otherwise it stays `None` and matching falls back to `last10`.
pub fn normalize_phone(raw: &str, home: &Country) -> CanonicalIdentity {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return CanonicalIdentity::none();
    }

    let e164 = if raw.trim_start().starts_with('+') {
        match_international(&digits)
    } else if let Some(rest) = digits.strip_prefix("00").filter(|r| !r.is_empty()) {
        match_international(rest)
    } else {
        match_national(&digits, home)
    };
    // An e164 identity must always carry a last10 key, so a derived number
    // whose full digit form is shorter than 10 digits is not usable as one.
    let e164 = e164.filter(|e| e.len() > 10);

    // Recompute last10 from the E.164 digits when one was derived, so the
    // invariant holds even for short national numbers that only reach 10
    // digits once the calling code is attached.
    let last10 = match &e164 {
        Some(e164) => last_10_digits(&e164[1..]),
        None => last_10_digits(&digits),
    };

    CanonicalIdentity { e164, last10 }
}

fn last_10_digits(digits: &str) -> Option<String> {
    if digits.len() >= 10 {
        Some(digits[digits.len() - 10..].to_string())
    } else {
        None
    }
}

/// Interpret `digits` as calling-code + national number. Longest known
/// calling code wins; unknown country codes yield `None` rather than an
/// unvalidated guess.
fn match_international(digits: &str) -> Option<String> {
    let country = COUNTRIES
        .iter()
        .filter(|c| digits.starts_with(c.calling_code))
        .max_by_key(|c| c.calling_code.len())?;
    let national = &digits[country.calling_code.len()..];
    if valid_national(national, country) {
        Some(format!("+{}", digits))
    } else {
        None
    }
}

/// Interpret `digits` as a number dialed domestically in `home`.
fn match_national(digits: &str, home: &Country) -> Option<String> {
    // Calling code typed without the `+` (e.g. "11234567890" in the US).
    if let Some(national) = digits.strip_prefix(home.calling_code) {
        if valid_national(national, home) {
            return Some(format!("+{}", digits));
        }
    }
    // Trunk-prefixed national format ("0602 ..." in most of Europe).
    if home.trunk_zero {
        if let Some(national) = digits.strip_prefix('0') {
            if valid_national(national, home) {
                return Some(format!("+{}{}", home.calling_code, national));
            }
        }
    }
    // Trunk-zero countries never have a significant number starting with 0;
    // that form was already handled (or rejected) above.
    if !(home.trunk_zero && digits.starts_with('0')) && valid_national(digits, home) {
        return Some(format!("+{}{}", home.calling_code, digits));
    }
    None
}

fn valid_national(national: &str, country: &Country) -> bool {
    let (min, max) = country.national_len;
    if national.len() < min || national.len() > max {
        return false;
    }
    if country.calling_code == "1" {
        return valid_nanp(national);
    }
    true
}

/// NANP numbers: area code and exchange code both start with 2-9.
fn valid_nanp(national: &str) -> bool {
    let bytes = national.as_bytes();
    bytes.len() == 10 && (b'2'..=b'9').contains(&bytes[0]) && (b'2'..=b'9').contains(&bytes[3])
}

/// Split a delimiter-joined multi-value cell into trimmed, de-duplicated
/// parts. Order is preserved; duplicates are exact (case-sensitive) matches.
pub fn canonicalize_multi_value(raw: &str, delimiter: char) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for part in raw.split(delimiter) {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        if !out.iter().any(|existing| existing == part) {
            out.push(part.to_string());
        }
    }
    out
}

/// Pull a phone value out of a free-text blob with a `Phone:` labeled line.
/// Calendar events from external booking sources embed the phone this way.
/// Returns an empty string when no labeled line exists.
pub fn extract_embedded_phone(text: &str) -> String {
    const LABEL: &[u8] = b"phone:";
    for raw_line in text.lines() {
        let line = raw_line.trim();
        if line.len() >= LABEL.len() && line.as_bytes()[..LABEL.len()].eq_ignore_ascii_case(LABEL) {
            return line[LABEL.len()..].trim().to_string();
        }
    }
    String::new()
}
