//! Phoneme string to KittenTTS token ids.
//!
//! The vocabulary is positional: pad, punctuation, ASCII letters, then IPA
//! symbols.  Its order is baked into the model weights.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

const PAD: char = '$';
const PUNCTUATION: &str = ";:,.!?¡¿—…\u{201C}«»\u{201D}\" ";
const LETTERS: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";
const IPA_LETTERS: &str =
    "ɑɐɒæɓʙβɔɕçɗɖðʤəɘɚɛɜɝɞɟʄɡɠɢʛɦɧħɥʜɨɪʝɭɬɫɮʟɱɯɰŋɳɲɴøɵɸθœɶʘɹɺɾɻʀʁɽʂʃʈʧʉʊʋⱱʌɣɤʍχʎʏʑʐʒʔʡʕʢǀǁǂǃˈˌːˑʼʴʰʱʲʷˠˤ˞↓↑→↗↘\u{2019}\u{0329}\u{2018}ᵻ";

static VOCAB: Lazy<HashMap<char, i64>> = Lazy::new(|| {
    std::iter::once(PAD)
        .chain(PUNCTUATION.chars())
        .chain(LETTERS.chars())
        .chain(IPA_LETTERS.chars())
        .enumerate()
        .map(|(i, c)| (c, i as i64))
        .collect()
});

// Words and single punctuation marks.
static RE_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\w+|[^\w\s]").unwrap());

/// Token id of `c`, if the model knows it.
pub fn char_id(c: char) -> Option<i64> {
    VOCAB.get(&c).copied()
}

/// Space-separate words and punctuation of an IPA string, then map every
/// character to its id.  Unknown characters are dropped; the result is
/// wrapped in pad tokens.
pub fn ipa_to_ids(ipa: &str) -> Vec<i64> {
    let spaced = RE_TOKEN.find_iter(ipa).map(|m| m.as_str()).collect::<Vec<_>>().join(" ");

    let mut ids = Vec::with_capacity(spaced.chars().count() + 2);
    ids.push(0);
    ids.extend(spaced.chars().filter_map(char_id));
    ids.push(0);
    ids
}
