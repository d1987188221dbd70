// ABOUTME: Phone number normalization and country derivation for the SMS subsystem
// ABOUTME: Validates E.164 shape and maps dial codes to candidate ISO country codes
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.

//! E.164 phone handling
//!
//! The SMS subsystem only ever sees phones in normalized E.164 form. A dial
//! code can cover several countries (the NANP `+1` spans the US and Canada),
//! so country derivation returns the candidate set and allow-list checks
//! pass when any candidate is allowed.

/// Dial-code table, longest-prefix matched. Candidates share the dial code.
const DIAL_CODES: &[(&str, &[&str])] = &[
    ("1", &["US", "CA"]),
    ("7", &["RU", "KZ"]),
    ("20", &["EG"]),
    ("27", &["ZA"]),
    ("30", &["GR"]),
    ("31", &["NL"]),
    ("32", &["BE"]),
    ("33", &["FR"]),
    ("34", &["ES"]),
    ("36", &["HU"]),
    ("39", &["IT"]),
    ("40", &["RO"]),
    ("41", &["CH"]),
    ("43", &["AT"]),
    ("44", &["GB"]),
    ("45", &["DK"]),
    ("46", &["SE"]),
    ("47", &["NO"]),
    ("48", &["PL"]),
    ("49", &["DE"]),
    ("52", &["MX"]),
    ("55", &["BR"]),
    ("61", &["AU"]),
    ("62", &["ID"]),
    ("63", &["PH"]),
    ("64", &["NZ"]),
    ("65", &["SG"]),
    ("66", &["TH"]),
    ("81", &["JP"]),
    ("82", &["KR"]),
    ("84", &["VN"]),
    ("86", &["CN"]),
    ("90", &["TR"]),
    ("91", &["IN"]),
    ("351", &["PT"]),
    ("353", &["IE"]),
    ("358", &["FI"]),
    ("380", &["UA"]),
    ("420", &["CZ"]),
    ("966", &["SA"]),
    ("971", &["AE"]),
    ("972", &["IL"]),
];

/// Normalize a phone number to E.164.
///
/// Strips spaces, dashes, dots, and parentheses; requires a leading `+`
/// followed by 8 to 15 digits with no leading zero (ITU-T E.164).
/// Returns `None` for anything else.
#[must_use]
pub fn normalize_e164(input: &str) -> Option<String> {
    let cleaned: String = input
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '.' | '(' | ')'))
        .collect();

    let digits = cleaned.strip_prefix('+')?;
    if digits.len() < 8 || digits.len() > 15 {
        return None;
    }
    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    if digits.starts_with('0') {
        return None;
    }

    Some(format!("+{digits}"))
}

/// Derive the candidate ISO 3166-1 alpha-2 countries for a normalized E.164
/// phone. Longest dial-code prefix wins. Unknown dial codes return an empty
/// slice.
#[must_use]
pub fn country_candidates(e164: &str) -> &'static [&'static str] {
    let digits = e164.strip_prefix('+').unwrap_or(e164);

    let mut best: &'static [&'static str] = &[];
    let mut best_len = 0;
    for (code, countries) in DIAL_CODES {
        if code.len() > best_len && digits.starts_with(code) {
            best = countries;
            best_len = code.len();
        }
    }
    best
}

/// Check a normalized phone against a country allow-list. An empty allow-list
/// permits every country; otherwise any candidate country must be allowed.
#[must_use]
pub fn country_allowed(e164: &str, allowed: &[String]) -> bool {
    if allowed.is_empty() {
        return true;
    }
    country_candidates(e164)
        .iter()
        .any(|candidate| allowed.iter().any(|a| a.eq_ignore_ascii_case(candidate)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_formatting_noise() {
        assert_eq!(
            normalize_e164("+1 (415) 555-2671").as_deref(),
            Some("+14155552671")
        );
        assert_eq!(
            normalize_e164("+44 20 7946 0958").as_deref(),
            Some("+442079460958")
        );
    }

    #[test]
    fn rejects_invalid_shapes() {
        assert_eq!(normalize_e164("14155552671"), None); // missing +
        assert_eq!(normalize_e164("+0123456789"), None); // leading zero
        assert_eq!(normalize_e164("+1234"), None); // too short
        assert_eq!(normalize_e164("+1234567890123456"), None); // too long
        assert_eq!(normalize_e164("+1415555abcd"), None);
    }

    #[test]
    fn nanp_spans_us_and_canada() {
        assert_eq!(country_candidates("+14155552671"), &["US", "CA"]);
        assert_eq!(country_candidates("+442079460958"), &["GB"]);
    }

    #[test]
    fn longest_prefix_wins() {
        // +35 alone is nothing; +351 is Portugal, +353 Ireland
        assert_eq!(country_candidates("+351912345678"), &["PT"]);
        assert_eq!(country_candidates("+353851234567"), &["IE"]);
    }

    #[test]
    fn allow_list_checks_candidates() {
        let allowed = vec!["US".to_owned(), "CA".to_owned()];
        assert!(country_allowed("+14155552671", &allowed));
        assert!(!country_allowed("+442079460958", &allowed));
        assert!(country_allowed("+442079460958", &[]));
    }
}
