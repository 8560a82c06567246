use std::borrow::Cow;

/// Truncates a string to at most `max_chars` Unicode scalar values.
///
/// Counts `char`s, not bytes or display columns: a 255-character cap keeps
/// 255 code points whatever their encoded width, and never splits a UTF-8
/// sequence. No ellipsis is appended; stored titles are compared for
/// equality after truncation, so the result must be a pure prefix.
///
/// Returns `Cow::Borrowed` when the string already fits.
///
/// # Examples
///
/// ```
/// use suprss::util::truncate_chars;
///
/// assert_eq!(truncate_chars("Short", 10), "Short");
/// assert_eq!(truncate_chars("Hello, world", 5), "Hello");
/// assert_eq!(truncate_chars("héllo", 2), "hé");
/// ```
pub fn truncate_chars(s: &str, max_chars: usize) -> Cow<'_, str> {
    match s.char_indices().nth(max_chars) {
        Some((cut, _)) => Cow::Owned(s[..cut].to_owned()),
        None => Cow::Borrowed(s),
    }
}

/// Strip control characters from feed-supplied text before printing it.
///
/// Feed titles and links are remote input; an embedded ESC or other C0/C1
/// control could rewrite the operator's terminal. Tab and newline are kept.
pub fn strip_control_chars(s: &str) -> Cow<'_, str> {
    let is_unsafe = |c: char| c.is_control() && c != '\t' && c != '\n';
    if !s.chars().any(is_unsafe) {
        return Cow::Borrowed(s);
    }
    Cow::Owned(s.chars().filter(|&c| !is_unsafe(c)).collect())
}
