//! Narration text helpers: cleanup before synthesis and sentence chunking.

use once_cell::sync::Lazy;
use regex::Regex;

/// Sentence boundary: a run of terminal punctuation followed by whitespace.
static RE_SENTENCE_END: Lazy<Regex> = Lazy::new(|| Regex::new(r"[.!?]+\s+").unwrap());

fn ends_with_terminal(text: &str) -> bool {
    text.ends_with(['.', '!', '?'])
}

/// Append a full stop when `text` does not already end a sentence.
pub fn ensure_terminal(text: &str) -> String {
    let text = text.trim();
    if text.is_empty() || ends_with_terminal(text) {
        text.to_string()
    } else {
        format!("{text}.")
    }
}

/// Normalise a segment before it is spoken: trim, collapse doubled
/// punctuation and make sure it ends like a sentence.
///
/// Returns an empty string for blank input so callers can reject it.
pub fn clean_for_speech(text: &str) -> String {
    let cleaned = text
        .trim()
        .replace("...", ".")
        .replace("!!", "!")
        .replace("??", "?");
    ensure_terminal(&cleaned)
}

/// Split `text` into pieces of at most `max_chars` bytes where possible.
///
/// Sentences are packed greedily; a piece that still exceeds
/// `1.5 × max_chars` (one enormous sentence) is re-split on word boundaries.
pub fn split_into_phases(text: &str, max_chars: usize) -> Vec<String> {
    let mut phases: Vec<String> = Vec::new();
    let mut current = String::new();

    for sentence in sentences(text) {
        let sentence = ensure_terminal(sentence);
        if !current.is_empty() && current.len() + sentence.len() > max_chars {
            phases.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(&sentence);
    }
    if !current.is_empty() {
        phases.push(current);
    }

    let limit = max_chars + max_chars / 2;
    phases
        .into_iter()
        .flat_map(|phase| {
            if phase.len() > limit {
                split_on_words(&phase, max_chars)
            } else {
                vec![phase]
            }
        })
        .collect()
}

/// Sentences of `text`, trimmed, each keeping its own punctuation.
fn sentences(text: &str) -> impl Iterator<Item = &str> {
    let mut start = 0;
    RE_SENTENCE_END
        .find_iter(text)
        .map(|m| m.end())
        .chain(std::iter::once(text.len()))
        .map(move |end| {
            let piece = &text[start..end];
            start = end;
            piece.trim()
        })
        .filter(|s| !s.is_empty())
}

fn split_on_words(text: &str, max_chars: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        if !current.is_empty() && current.len() + 1 + word.len() > max_chars {
            out.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_for_speech() {
        assert_eq!(clean_for_speech("  Wait... what  "), "Wait. what.");
        assert_eq!(clean_for_speech("Really!!"), "Really!");
        assert_eq!(clean_for_speech("Is it??"), "Is it?");
        assert_eq!(clean_for_speech("Done."), "Done.");
        assert_eq!(clean_for_speech("   "), "");
    }

    #[test]
    fn test_short_text_is_one_phase() {
        let p = split_into_phases("Hello there. How are you?", 800);
        assert_eq!(p, vec!["Hello there. How are you?"]);
    }

    #[test]
    fn test_sentences_packed_under_limit() {
        let text = "One two three. Four five six. Seven eight nine.";
        let p = split_into_phases(text, 20);
        assert_eq!(p, vec!["One two three.", "Four five six.", "Seven eight nine."]);
    }

    #[test]
    fn test_long_sentence_split_on_words() {
        let long = "word ".repeat(400);
        let p = split_into_phases(long.trim(), 100);
        assert!(p.len() > 1);
        for phase in &p {
            assert!(phase.len() <= 101, "phase too long: {}", phase.len());
        }
        let rejoined: usize = p.iter().map(|s| word_count(s)).sum();
        assert_eq!(rejoined, 400);
    }

    #[test]
    fn test_punctuation_survives_splitting() {
        let p = split_into_phases("Welcome! Ready?  Let's go", 10);
        assert_eq!(p, vec!["Welcome!", "Ready?", "Let's go."]);
        assert_eq!(split_into_phases("Welcome! Today we talk.", 800), vec!["Welcome! Today we talk."]);
    }

    #[test]
    fn test_empty_text_has_no_phases() {
        assert!(split_into_phases("  ", 800).is_empty());
    }
}
