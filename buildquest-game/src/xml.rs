//! Attribute-based XML fragments used for display and audit output.

/// Escape a value for use inside a double-quoted attribute.
pub(crate) fn escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

/// Render ` name="value"` pairs in the given order.
pub(crate) fn attributes(pairs: &[(&str, String)]) -> String {
    pairs
        .iter()
        .map(|(name, value)| format!(" {name}=\"{}\"", escape(value)))
        .collect()
}

pub(crate) fn reason_attribute(reason: Option<&str>) -> String {
    reason
        .filter(|reason| !reason.is_empty())
        .map(|reason| format!(" reason=\"{}\"", escape(reason)))
        .unwrap_or_default()
}

pub(crate) fn pad(indentation: usize) -> String {
    " ".repeat(indentation)
}
