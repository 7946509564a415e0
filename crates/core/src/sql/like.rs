//! LIKE pattern compilation.
//!
//! Only `%` is a wildcard (zero or more characters). Everything else,
//! including regex metacharacters, matches literally, and the pattern is
//! anchored at both ends.

use crate::error::DBError;
use regex::Regex;

pub(crate) fn compile_like(pattern: &str) -> Result<Regex, DBError> {
    let mut rx = String::with_capacity(pattern.len() + 8);
    rx.push_str("(?s)^");
    for (i, part) in pattern.split('%').enumerate() {
        if i > 0 {
            rx.push_str(".*");
        }
        rx.push_str(&regex::escape(part));
    }
    rx.push('$');
    Regex::new(&rx).map_err(|e| DBError::Internal(e.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matches(pattern: &str, value: &str) -> bool {
        compile_like(pattern).unwrap().is_match(value)
    }

    #[test]
    fn percent_is_the_only_wildcard() {
        assert!(matches("A%", "Alice"));
        assert!(matches("%ce", "Alice"));
        assert!(matches("%li%", "Alice"));
        assert!(matches("%", ""));
        assert!(!matches("A%", "Bob"));
    }

    #[test]
    fn pattern_is_anchored_at_both_ends() {
        assert!(!matches("li", "Alice"));
        assert!(matches("Alice", "Alice"));
        assert!(!matches("Alice", "Alice in Wonderland"));
    }

    #[test]
    fn metacharacters_match_literally() {
        assert!(matches("a.c", "a.c"));
        assert!(!matches("a.c", "abc"));
        assert!(matches("50(+)%", "50(+) off"));
        assert!(matches("[x]%", "[x] done"));
        assert!(!matches("[x]", "x"));
    }
}
