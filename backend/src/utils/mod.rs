//! # Utilities Module
//!
//! This module contains helper functions and utilities used
//! across the backend service.

/// Truncate a string to a maximum length, keeping both ends.
///
/// ## Examples
///
/// ```rust
/// assert_eq!(truncate_string("abcdefghijklmnop", 10), "abc...nop");
/// ```
pub fn truncate_string(s: &str, max_len: usize) -> String {
    let chars: Vec<char> = s.chars().collect();
    if chars.len() <= max_len {
        s.to_string()
    } else {
        let half = max_len.saturating_sub(3) / 2;
        let head: String = chars[..half].iter().collect();
        let tail: String = chars[chars.len() - half..].iter().collect();
        format!("{}...{}", head, tail)
    }
}

/// Mask a bearer token for logging.
///
/// Only the last four characters survive: `••••9f2c`.
pub fn mask_token(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() <= 8 {
        return "••••".to_string();
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("••••{}", tail)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_string() {
        assert_eq!(truncate_string("abcdefghij", 10), "abcdefghij");
        assert_eq!(truncate_string("abcdefghijklmnop", 10), "abc...nop");
    }

    #[test]
    fn test_mask_token() {
        assert_eq!(mask_token("eyJhbGciOiJIUzI1NiJ9.payload.sig9f2c"), "••••9f2c");
        assert_eq!(mask_token("short"), "••••");
        assert!(!mask_token("vendor-token-secret").contains("secret"));
    }
}
