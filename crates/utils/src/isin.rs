use regex::Regex;
use std::sync::OnceLock;

// 2 country letters + 9 alphanumerics + 1 check digit, in parentheses.
fn embedded_isin_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\(([A-Z]{2}[A-Z0-9]{9}[0-9])\)").expect("valid ISIN regex"))
}

/// Extract an ISIN token embedded in parentheses, e.g.
/// "APPLE INC (US0378331005)" -> "US0378331005".
pub fn extract_isin(text: &str) -> Option<String> {
    embedded_isin_re()
        .captures(text)
        .map(|c| c[1].to_string())
}

/// Remove the parenthesized ISIN token (and surrounding whitespace) from a
/// product display name.
pub fn strip_isin(text: &str) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"\s*\([A-Z]{2}[A-Z0-9]{9}[0-9]\)").expect("valid ISIN strip regex")
    });
    re.replace_all(text, "").trim().to_string()
}

pub fn looks_like_isin(s: &str) -> bool {
    let s = s.trim();
    s.len() == 12
        && s.chars().take(2).all(|c| c.is_ascii_uppercase())
        && s.chars().skip(2).take(9).all(|c| c.is_ascii_alphanumeric())
        && s.chars().nth(11).map(|c| c.is_ascii_digit()).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_isin() {
        assert_eq!(
            extract_isin("APPLE INC (US0378331005)"),
            Some("US0378331005".to_string())
        );
        assert_eq!(extract_isin("APPLE INC"), None);
        assert_eq!(extract_isin("CASH FUND (NOT AN ISIN)"), None);
    }

    #[test]
    fn test_strip_isin() {
        assert_eq!(strip_isin("APPLE INC (US0378331005)"), "APPLE INC");
        assert_eq!(strip_isin("APPLE INC"), "APPLE INC");
    }

    #[test]
    fn test_looks_like_isin() {
        assert!(looks_like_isin("US0378331005"));
        assert!(looks_like_isin("ES0105066007"));
        assert!(!looks_like_isin("US037833100"));
        assert!(!looks_like_isin("us0378331005"));
        assert!(!looks_like_isin("US037833100X"));
    }
}
