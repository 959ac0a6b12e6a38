/// Normalize text for embedding: lower-case, strip punctuation, collapse
/// whitespace runs to a single space, and trim. Applied to message content at
/// ingestion time so stored vectors share one representation.
#[inline]
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;

    for ch in text.chars() {
        if ch.is_whitespace() {
            pending_space = !out.is_empty();
            continue;
        }
        if !ch.is_alphanumeric() && ch != '_' {
            continue;
        }
        if pending_space {
            out.push(' ');
            pending_space = false;
        }
        for lower in ch.to_lowercase() {
            out.push(lower);
        }
    }

    out
}

/// The canonical text a message is embedded over.
#[inline]
pub fn embedding_text(subject: &str, body: &str) -> String {
    format!("Subject: {} Body: {}", normalize(subject), normalize(body))
}
