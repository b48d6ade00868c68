//! Pure string helpers shared by the embed and transcript layers.

/// Replaces every `{placeholder}` occurrence with its value.
///
/// Templates are operator-controlled config strings, so plain literal
/// replacement is enough here.
pub fn fill(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (key, value) in values {
        out = out.replace(&format!("{{{key}}}"), value);
    }
    out
}

/// Escapes Discord markdown formatting characters in user-supplied text.
pub fn sanitize_input(input: &str) -> String {
    const FORMATTING: [char; 6] = ['_', '*', '`', '~', '|', '-'];
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        if FORMATTING.contains(&ch) {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// Renders a second count as a compact human duration, e.g. `1d 2h 5m 30s`.
pub fn format_time(seconds: u64) -> String {
    let d = seconds / 86_400;
    let h = (seconds % 86_400) / 3_600;
    let m = (seconds % 3_600) / 60;
    let s = seconds % 60;

    let mut result = String::new();
    if d > 0 {
        result.push_str(&format!("{d}d "));
    }
    if h > 0 {
        result.push_str(&format!("{h}h "));
    }
    if m > 0 {
        result.push_str(&format!("{m}m "));
    }
    if s > 0 || result.is_empty() {
        result.push_str(&format!("{s}s"));
    }
    result.trim_end().to_string()
}
