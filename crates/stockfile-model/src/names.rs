use unicode_normalization::UnicodeNormalization as _;

/// Normalize a sheet or column name for alias comparison.
///
/// Workbooks exported by different tools disagree on casing, padding and
/// compatibility characters (fullwidth letters, non-breaking spaces), so both
/// sides of a comparison go through the same folding:
/// - Unicode NFKC normalization
/// - Unicode uppercasing
/// - leading/trailing whitespace removed, inner whitespace runs collapsed to one space
pub fn normalize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_space = false;
    for ch in name.nfkc().flat_map(|c| c.to_uppercase()) {
        if ch.is_whitespace() {
            pending_space = !out.is_empty();
            continue;
        }
        if pending_space {
            out.push(' ');
            pending_space = false;
        }
        out.push(ch);
    }
    out
}

/// Returns true when `a` and `b` name the same sheet/column after normalization.
pub fn names_match(a: &str, b: &str) -> bool {
    normalize_name(a) == normalize_name(b)
}

/// Returns true when `candidate` matches any of `aliases`.
pub fn matches_any<'a>(candidate: &str, aliases: impl IntoIterator<Item = &'a String>) -> bool {
    let candidate = normalize_name(candidate);
    aliases
        .into_iter()
        .any(|alias| normalize_name(alias) == candidate)
}
