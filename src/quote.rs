//! Identifier quoting (spec §4.C).

/// Quotes `name` as a DuckDB identifier: wraps it in double quotes with any
/// internal double quote doubled. Always quotes (quoting a non-reserved,
/// non-clashing identifier is harmless and keeps the generated SQL uniform,
/// so there is no separate reserved-word table to maintain).
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotes_double_internal_quotes() {
        assert_eq!(quote_ident(r#"we"ird"#), "\"we\"\"ird\"");
    }

    #[test]
    fn plain_identifier_round_trips() {
        assert_eq!(quote_ident("user"), "\"user\"");
    }

    #[test]
    fn reserved_word_identifier_is_quoted() {
        assert_eq!(quote_ident("select"), "\"select\"");
        assert_eq!(quote_ident("desc"), "\"desc\"");
    }
}
