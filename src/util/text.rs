use std::borrow::Cow;

/// Ellipsis marker appended to truncated titles
const ELLIPSIS: &str = "...";

/// Truncate a string to at most `max_chars` characters, appending an
/// ellipsis when anything was cut.
///
/// Counts characters rather than bytes so multi-byte titles cannot be
/// sliced mid-codepoint. Returns `Cow::Borrowed` (no allocation) when the
/// string already fits.
pub fn truncate_chars(s: &str, max_chars: usize) -> Cow<'_, str> {
    let mut char_indices = s.char_indices();
    match char_indices.nth(max_chars) {
        None => Cow::Borrowed(s),
        Some((cut, _)) => {
            let mut truncated = s[..cut].to_owned();
            truncated.push_str(ELLIPSIS);
            Cow::Owned(truncated)
        }
    }
}

/// Whole-word containment check.
///
/// True when `term` occurs in `haystack` with no alphanumeric character
/// immediately before or after the occurrence, so "died" matches in
/// "he died today" and "died." but not inside "studied". Both arguments
/// are expected to be case-folded already; folding is the caller's job
/// because it is locale-sensitive.
pub fn contains_word(haystack: &str, term: &str) -> bool {
    if term.is_empty() {
        return false;
    }

    let mut start = 0;
    while let Some(pos) = haystack[start..].find(term) {
        let abs = start + pos;
        let end = abs + term.len();

        let boundary_before = haystack[..abs]
            .chars()
            .next_back()
            .map_or(true, |c| !c.is_alphanumeric());
        let boundary_after = haystack[end..]
            .chars()
            .next()
            .map_or(true, |c| !c.is_alphanumeric());

        if boundary_before && boundary_after {
            return true;
        }

        // Step past the first char of this occurrence and keep scanning
        start = abs
            + haystack[abs..]
                .chars()
                .next()
                .map_or(1, |c| c.len_utf8());
    }

    false
}
