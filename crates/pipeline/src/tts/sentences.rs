//! Sentence segmentation for incremental synthesis

/// Fragments at or below this many characters are dropped
const MIN_SENTENCE_CHARS: usize = 2;

/// Split text after `.`, `!` or `?` when followed by whitespace.
///
/// Pieces are trimmed; trivial fragments (a stray "a." or "?") are dropped.
pub fn split_into_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        current.push(c);
        if matches!(c, '.' | '!' | '?') && chars.peek().map_or(false, |n| n.is_whitespace()) {
            push_sentence(&mut sentences, &current);
            current.clear();
        }
    }
    push_sentence(&mut sentences, &current);

    sentences
}

fn push_sentence(sentences: &mut Vec<String>, raw: &str) {
    let trimmed = raw.trim();
    if trimmed.chars().count() > MIN_SENTENCE_CHARS {
        sentences.push(trimmed.to_string());
    }
}
