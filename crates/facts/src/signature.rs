//! Cheap structural reads of signature text.

/// Body of a signature with any `forall ... .` prefix and constraint context removed.
pub fn strip_context(signature: &str) -> &str {
    let mut body = signature.trim();
    if let Some(rest) = body.strip_prefix("forall ") {
        if let Some((_, after)) = rest.split_once('.') {
            body = after.trim();
        }
    }
    match top_level_positions(body, "=>").last() {
        Some(&pos) => body[pos + 2..].trim(),
        None => body,
    }
}

/// Number of top-level `->` arrows, i.e. the arity of a curried signature.
pub fn arity(signature: &str) -> u32 {
    top_level_positions(strip_context(signature), "->").len() as u32
}

fn top_level_positions(text: &str, token: &str) -> Vec<usize> {
    let bytes = text.as_bytes();
    let needle = token.as_bytes();
    let mut depth = 0i32;
    let mut positions = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => depth -= 1,
            _ => {
                if depth == 0 && bytes[i..].starts_with(needle) {
                    positions.push(i);
                    i += needle.len();
                    continue;
                }
            }
        }
        i += 1;
    }
    positions
}
