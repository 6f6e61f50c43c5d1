/// Returns the longest prefix of `text` that ends with a newline.
///
/// Text without any newline is returned unchanged.
pub fn trim_to_last_newline(text: &str) -> &str {
    match text.rfind('\n') {
        Some(idx) => &text[..=idx],
        None => text,
    }
}

/// Largest char boundary of `text` that is `<= index`.
pub fn floor_char_boundary(text: &str, index: usize) -> usize {
    if index >= text.len() {
        return text.len();
    }
    let mut idx = index;
    while !text.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}
