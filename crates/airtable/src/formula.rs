//! Builders for Airtable `filterByFormula` expressions.

/// Quote `value` as a formula string literal.
pub fn quote(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('\'', "\\'");
    format!("'{escaped}'")
}

/// `{field} = 'value'`
pub fn field_equals(field: &str, value: &str) -> String {
    format!("{{{field}}} = {}", quote(value))
}

/// Conjunction of `parts`; `None` when there is nothing to filter on.
pub fn and(parts: &[String]) -> Option<String> {
    if parts.is_empty() {
        None
    } else {
        Some(format!("AND({})", parts.join(", ")))
    }
}
