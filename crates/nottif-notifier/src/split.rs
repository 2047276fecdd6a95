//! Splitting long messages into webhook-sized parts.

/// Split `text` into consecutive parts of at most `max_chars` characters.
///
/// Lengths are counted in `char`s, never bytes, so multi-byte text is never
/// cut inside a code point. An empty message is a single empty part.
pub fn split_message(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    if text.is_empty() {
        return vec![String::new()];
    }

    let mut parts = Vec::new();
    let mut start = 0;
    let mut count = 0;

    for (offset, _) in text.char_indices() {
        if count == max_chars {
            parts.push(text[start..offset].to_string());
            start = offset;
            count = 0;
        }
        count += 1;
    }
    parts.push(text[start..].to_string());
    parts
}

/// Number of parts [`split_message`] would produce, without allocating them.
pub fn part_count(text: &str, max_chars: usize) -> usize {
    let chars = text.chars().count();
    chars.div_ceil(max_chars.max(1)).max(1)
}
