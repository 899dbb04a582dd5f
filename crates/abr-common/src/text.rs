//! Text cleaning for registry name fields

/// Search-normalize a name: lowercase, collapse internal whitespace, trim
///
/// Applied to organization and alternate names before they are stored, so
/// the full-text mirrors and exact lookups agree on one canonical form.
///
/// ```
/// assert_eq!(abr_common::normalize_name("  ACME   Pty  Ltd "), "acme pty ltd");
/// ```
pub fn normalize_name(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for word in raw.split_whitespace() {
        if !out.is_empty() {
            out.push(' ');
        }
        out.extend(word.chars().flat_map(char::to_lowercase));
    }
    out
}

/// Trim a structured field without changing its case or inner spacing
pub fn clean_field(raw: &str) -> String {
    raw.trim().to_string()
}
