//! Sentence and clause splitting.
//!
//! The segmenter cuts streamed text at sentence boundaries; the synthesis
//! worker then breaks long sentences at clause marks so no single engine call
//! gets a wall of text.

/// Terminal punctuation that ends a sentence.
pub const SENTENCE_MARKS: [char; 3] = ['.', '!', '?'];

/// Marks a long sentence may be broken at.
pub const CLAUSE_MARKS: [char; 3] = [':', ';', ','];

/// Sentences longer than this many words get split at clause marks.
pub const LONG_SENTENCE_WORDS: usize = 20;

/// A clause piece must hold more than this many words before it is cut.
pub const MIN_CLAUSE_WORDS: usize = 5;

/// End offsets (exclusive) of every sentence boundary in `text`.
///
/// Terminal punctuation only counts when followed by whitespace or the end of
/// the text, so "3.14" or "e.g" mid-token do not cut. A newline always cuts.
pub fn sentence_boundaries(text: &str) -> Vec<usize> {
    let mut ends = Vec::new();
    let mut chars = text.char_indices().peekable();
    while let Some((idx, c)) = chars.next() {
        let end = idx + c.len_utf8();
        if c == '\n' {
            ends.push(end);
            continue;
        }
        if SENTENCE_MARKS.contains(&c) {
            match chars.peek() {
                None => ends.push(end),
                Some((_, next)) if next.is_whitespace() => ends.push(end),
                // Runs like "?!" or "..." end at the last mark
                Some(_) => {}
            }
        }
    }
    ends
}

/// Splits `text` into trimmed sentences. Text after the last boundary is
/// returned as a final piece.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut start = 0;
    for end in sentence_boundaries(text) {
        push_trimmed(&mut pieces, &text[start..end]);
        start = end;
    }
    push_trimmed(&mut pieces, &text[start..]);
    pieces
}

/// Breaks a sentence of more than [`LONG_SENTENCE_WORDS`] words at clause
/// marks, once the running piece holds more than [`MIN_CLAUSE_WORDS`] words.
/// Shorter sentences come back whole.
pub fn split_clauses(sentence: &str) -> Vec<String> {
    let sentence = sentence.trim();
    if sentence.split_whitespace().count() <= LONG_SENTENCE_WORDS {
        return if sentence.is_empty() {
            Vec::new()
        } else {
            vec![sentence.to_string()]
        };
    }

    let mut pieces = Vec::new();
    let mut start = 0;
    for (idx, c) in sentence.char_indices() {
        if !CLAUSE_MARKS.contains(&c) {
            continue;
        }
        let end = idx + c.len_utf8();
        if sentence[start..end].split_whitespace().count() > MIN_CLAUSE_WORDS {
            push_trimmed(&mut pieces, &sentence[start..end]);
            start = end;
        }
    }
    push_trimmed(&mut pieces, &sentence[start..]);
    pieces
}

/// Pieces handed to the voice engine one call at a time: sentences, with the
/// long ones broken at clause marks.
pub fn synthesis_pieces(text: &str) -> Vec<String> {
    split_sentences(text)
        .iter()
        .flat_map(|sentence| split_clauses(sentence))
        .collect()
}

fn push_trimmed(pieces: &mut Vec<String>, piece: &str) {
    let piece = piece.trim();
    if !piece.is_empty() {
        pieces.push(piece.to_string());
    }
}
