//! Credential redaction for diagnostic output.
//!
//! Outbound request parameters are logged at debug level; anything that
//! looks like a credential must pass through here first.

/// Parameter-name markers that flag a value as sensitive.
const SENSITIVE_MARKERS: &[&str] = &[
    "api_key",
    "api_secret",
    "passphrase",
    "signature",
    "key",
    "secret",
];

/// Returns true if a parameter name looks like it carries a credential.
///
/// Matching is case-insensitive and by substring, so `apiKey`,
/// `X-MBX-APIKEY` and `secret_token` all match.
#[must_use]
pub fn is_sensitive_param(name: &str) -> bool {
    let name = name.to_lowercase();
    SENSITIVE_MARKERS.iter().any(|marker| name.contains(marker))
}

/// Masks a credential value, preserving only its first and last three
/// characters, or `***` entirely for values shorter than 7 characters.
#[must_use]
pub fn redact_value(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() < 7 {
        return "***".to_string();
    }
    let head: String = chars[..3].iter().collect();
    let tail: String = chars[chars.len() - 3..].iter().collect();
    format!("{head}***{tail}")
}

/// Returns a copy of the parameter list with every sensitive value masked.
#[must_use]
pub fn redact_params(params: &[(String, String)]) -> Vec<(String, String)> {
    params
        .iter()
        .map(|(name, value)| {
            let value = if is_sensitive_param(name) {
                redact_value(value)
            } else {
                value.clone()
            };
            (name.clone(), value)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(name: &str, value: &str) -> (String, String) {
        (name.to_string(), value.to_string())
    }

    #[test]
    fn test_sensitive_names_match_by_substring() {
        assert!(is_sensitive_param("api_key"));
        assert!(is_sensitive_param("X-MBX-APIKEY"));
        assert!(is_sensitive_param("apiSecret"));
        assert!(is_sensitive_param("OK-ACCESS-PASSPHRASE"));
        assert!(is_sensitive_param("signature"));
        assert!(!is_sensitive_param("symbol"));
        assert!(!is_sensitive_param("startTime"));
    }

    #[test]
    fn test_redact_value_keeps_edges() {
        assert_eq!(redact_value("abcdefgh"), "abc***fgh");
        assert_eq!(redact_value("abcdefg"), "abc***efg");
    }

    #[test]
    fn test_short_values_fully_masked() {
        assert_eq!(redact_value("abcdef"), "***");
        assert_eq!(redact_value(""), "***");
    }

    #[test]
    fn test_redact_params_leaves_plain_values() {
        let params = vec![pair("api_key", "abcdefgh"), pair("other", "value")];
        let redacted = redact_params(&params);
        assert_eq!(redacted[0], pair("api_key", "abc***fgh"));
        assert_eq!(redacted[1], pair("other", "value"));
    }
}
