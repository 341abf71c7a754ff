//! Field normalization applied to each catalog entry before it becomes a
//! [`ContentRecord`](super::ContentRecord).
//!
//! Every function here is total: malformed input yields `None` or the
//! input unchanged, never an error. Only [`rights_holder`] returning `None`
//! causes the caller to drop an entry.

/// Separator between the copyright notice and the holder in `dcterms:rights`,
/// e.g. `"© 2020, Example Org"`.
const RIGHTS_SEPARATOR: &str = ", ";

/// Extracts the rights holder from a raw rights string.
///
/// Returns the second `", "`-separated segment. Further segments are
/// discarded (`"© 2020, A, B"` yields `"A"`).
///
/// Returns `None` when the rights string is absent, has no separator, or
/// the second segment is empty. Callers treat `None` as "skip this entry".
pub fn rights_holder(raw: Option<&str>) -> Option<String> {
    let holder = raw?.split(RIGHTS_SEPARATOR).nth(1)?;
    if holder.is_empty() {
        return None;
    }
    Some(holder.to_string())
}

/// Reformats a license code such as `cc-by-sa` into `CC BY-SA`.
///
/// The code is uppercased, then the character at index 2 (the separator
/// after the two-letter family) is replaced by a single space. Codes shorter
/// than three characters are returned exactly as extracted.
pub fn license_code(raw: Option<String>) -> Option<String> {
    let raw = raw?;
    if raw.chars().count() < 3 {
        return Some(raw);
    }

    let upper = raw.to_uppercase();
    let family: String = upper.chars().take(2).collect();
    let rest: String = upper.chars().skip(3).collect();
    Some(format!("{family} {rest}"))
}

/// Strips any query string from a thumbnail URL.
pub fn thumbnail(raw: Option<String>) -> Option<String> {
    raw.map(|url| match url.split_once('?') {
        Some((base, _)) => base.to_string(),
        None => url,
    })
}
