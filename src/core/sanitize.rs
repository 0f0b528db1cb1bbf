// src/core/sanitize.rs

/// Decode the handful of entities the source pages actually use.
pub fn normalize_entities(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&#160;", " ")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&rsquo;", "’")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

pub fn normalize_ws(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_space = false;
    for ch in s.chars() {
        if ch.is_whitespace() {
            if !prev_space { out.push(' '); prev_space = true; }
        } else { out.push(ch); prev_space = false; }
    }
    out.trim().to_string()
}

/// Remove footnote markers like `[1]` or `[a]`.
/// Greedy within each bracket pair, no nesting.
pub fn strip_brackets(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_bracket = false;
    for ch in s.chars() {
        match ch {
            '[' => in_bracket = true,
            ']' => in_bracket = false,
            _ if !in_bracket => out.push(ch),
            _ => {}
        }
    }
    normalize_ws(&out)
}

/// Split a leading three-letter currency code off an amount cell:
/// `"USD 1,200.5"` → `(Some("USD"), "1,200.5")`.
pub fn split_currency(s: &str) -> (Option<&str>, &str) {
    let t = s.trim();
    if let Some((head, rest)) = t.split_once(char::is_whitespace) {
        if head.len() == 3 && head.chars().all(|c| c.is_ascii_uppercase()) {
            return (Some(head), rest.trim());
        }
    }
    (None, t)
}

/// Parse `1,234.5` / `1 234.5` / `1234` into a number. Empty → None.
pub fn parse_amount(s: &str) -> Option<f64> {
    let digits: String = s
        .chars()
        .filter(|c| !matches!(c, ',' | ' ' | '\u{a0}' | '\u{202f}'))
        .collect();
    if digits.is_empty() { return None; }
    digits.parse::<f64>().ok().filter(|v| v.is_finite())
}
