//! SQL fragments specific to SQL Server that hosts splice into generated SQL.

/// Expression returning the current date and time.
pub const DATE_FUNCTION: &str = "getdate()";

/// Column type used for text columns.
pub const TEXT_TYPE: &str = "varchar(8000)";

#[must_use]
pub fn date_function() -> &'static str {
    DATE_FUNCTION
}

#[must_use]
pub fn text_type() -> &'static str {
    TEXT_TYPE
}

/// Quote an identifier with square brackets, doubling any `]` inside it.
#[must_use]
pub fn quote_identifier(identifier: &str) -> String {
    format!("[{}]", identifier.replace(']', "]]"))
}

/// Quote a `schema.relation` pair.
#[must_use]
pub fn quote_relation(schema: &str, relation: &str) -> String {
    format!("{}.{}", quote_identifier(schema), quote_identifier(relation))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fragments() {
        assert_eq!(date_function(), "getdate()");
        assert_eq!(text_type(), "varchar(8000)");
    }

    #[test]
    fn quoting_escapes_closing_bracket() {
        assert_eq!(quote_identifier("orders"), "[orders]");
        assert_eq!(quote_identifier("odd]name"), "[odd]]name]");
        assert_eq!(quote_relation("dbo", "order lines"), "[dbo].[order lines]");
    }
}
