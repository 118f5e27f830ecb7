//! SQL identifier quoting utilities
//!
//! Provides safe quoting for SQL identifiers and qualified names to prevent
//! SQL injection when constructing dynamic SQL statements.

/// Quote a SQL identifier to prevent injection.
///
/// Wraps the identifier in double quotes and escapes any embedded double quotes
/// by doubling them, following the SQL standard.
///
/// # Examples
/// ```
/// use tm_core::sql::quote_ident;
/// assert_eq!(quote_ident("reviews"), r#""reviews""#);
/// assert_eq!(quote_ident(r#"my"table"#), r#""my""table""#);
/// ```
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Quote a potentially schema-qualified name (e.g. `schema.table`).
///
/// Splits on `.` and individually quotes each component.
///
/// # Examples
/// ```
/// use tm_core::sql::quote_qualified;
/// assert_eq!(quote_qualified("reviews"), r#""reviews""#);
/// assert_eq!(quote_qualified("marts.reviews"), r#""marts"."reviews""#);
/// ```
pub fn quote_qualified(name: &str) -> String {
    name.split('.')
        .map(quote_ident)
        .collect::<Vec<_>>()
        .join(".")
}

/// Split a potentially schema-qualified relation name into (schema, relation).
///
/// Uses the last `.` as the separator. If no `.` is present, returns
/// `("main", name)` as the default schema.
///
/// # Examples
/// ```
/// use tm_core::sql::split_qualified_name;
/// assert_eq!(split_qualified_name("reviews"), ("main", "reviews"));
/// assert_eq!(split_qualified_name("marts.reviews"), ("marts", "reviews"));
/// ```
pub fn split_qualified_name(name: &str) -> (&str, &str) {
    if let Some(pos) = name.rfind('.') {
        (&name[..pos], &name[pos + 1..])
    } else {
        ("main", name)
    }
}

/// Escape a SQL string literal value by doubling single quotes.
///
/// This is for use inside single-quoted SQL string literals, not identifiers.
pub fn escape_sql_string(value: &str) -> String {
    value.replace('\'', "''")
}
