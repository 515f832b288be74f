//! Quote escaping for string-built SQL.
//!
//! Every user-supplied string that reaches a SQL statement passes through
//! [`escape_single_quotes`] before being wrapped in single quotes.

/// Doubles embedded single quotes so the result is safe inside a
/// single-quoted SQL literal on both supported dialects.
pub fn escape_single_quotes(input: &str) -> String {
    input.replace('\'', "''")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passes_plain_text_through() {
        assert_eq!(escape_single_quotes("Billy Bob"), "Billy Bob");
        assert_eq!(escape_single_quotes(""), "");
    }

    #[test]
    fn doubles_a_single_quote() {
        assert_eq!(escape_single_quotes("O'Riley"), "O''Riley");
    }

    #[test]
    fn doubles_every_quote_independently() {
        assert_eq!(escape_single_quotes("''"), "''''");
        assert_eq!(escape_single_quotes("a'b'c"), "a''b''c");
    }

    #[test]
    fn leaves_other_metacharacters_alone() {
        assert_eq!(escape_single_quotes("50% \"done\"; --x"), "50% \"done\"; --x");
        assert_eq!(escape_single_quotes("back\\slash"), "back\\slash");
    }
}
