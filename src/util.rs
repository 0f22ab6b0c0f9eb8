/// Canonicalize a tag identifier into the table's key scheme: separators
/// stripped, hex uppercased, "x" marker prefixed. Already-normalized keys
/// pass through unchanged, so the function is idempotent. Non-hex input is
/// not rejected here; lookup simply fails downstream.
pub fn normalize_tag(tag: &str) -> String {
    let stripped: String = tag
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect();
    let body = stripped
        .strip_prefix('x')
        .or_else(|| stripped.strip_prefix('X'))
        .unwrap_or(&stripped);
    format!("x{}", body.to_ascii_uppercase())
}

pub fn strip_key_marker(key: &str) -> &str {
    key.strip_prefix('x')
        .or_else(|| key.strip_prefix('X'))
        .unwrap_or(key)
}

/// "00100020" -> "(0010, 0020)" for display.
pub fn format_tag(tag: &str) -> String {
    match (tag.get(..4), tag.get(4..)) {
        (Some(group), Some(element)) if tag.len() >= 8 => format!("({}, {})", group, element),
        _ => format!("({})", tag),
    }
}

pub fn format_file_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0 Bytes".to_string();
    }
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];
    let exponent = ((bytes as f64).ln() / 1024f64.ln()).floor() as usize;
    let exponent = exponent.min(UNITS.len() - 1);
    let scaled = bytes as f64 / 1024f64.powi(exponent as i32);
    format!("{} {}", (scaled * 100.0).round() / 100.0, UNITS[exponent])
}
