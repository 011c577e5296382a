/// Replaces the characters that would split a segment into another path
/// component or truncate it. Everything else is kept as given.
pub fn sanitize_segment(value: &str) -> String {
    value
        .chars()
        .map(|ch| if is_disallowed_char(ch) { '_' } else { ch })
        .collect()
}

fn is_disallowed_char(ch: char) -> bool {
    matches!(ch, '\\' | '/' | '\0')
}
