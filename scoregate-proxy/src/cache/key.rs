//! Normalized cache keys built from query parameters.

use std::collections::HashMap;

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

/// Characters left alone by HTML form encoding, besides ASCII alphanumerics
const FORM: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'.')
    .remove(b'-')
    .remove(b'*')
    .remove(b'_');

/// Form-encode one name or value: spaces become `+`, other reserved bytes `%XX`
fn form_encode(input: &str) -> String {
    input
        .split(' ')
        .map(|part| utf8_percent_encode(part, FORM).to_string())
        .collect::<Vec<_>>()
        .join("+")
}

/// Build the order-independent cache key for a set of query parameters.
///
/// Pairs are sorted by name, encoded as `name=value` and joined with `&`.
/// No parameters yields the empty string.
pub fn cache_key(params: &HashMap<String, String>) -> String {
    let mut pairs: Vec<(&String, &String)> = params.iter().collect();
    pairs.sort_by(|a, b| a.0.cmp(b.0));

    pairs
        .into_iter()
        .map(|(name, value)| format!("{}={}", form_encode(name), form_encode(value)))
        .collect::<Vec<_>>()
        .join("&")
}
