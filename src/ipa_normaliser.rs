//! The IPA normaliser is the first stage of the synthesis pipeline. External
//! phonemizers are messy: depending on the backend and its configuration we
//! may receive true IPA, Kirshenbaum-flavoured ASCII mnemonics (`rI2z'o@rs`),
//! or a mix of both sprinkled with dictionary utility markers. This module
//! canonicalises all of that into the one alphabet the phoneme table speaks,
//! so the tokeniser downstream only ever deals with known symbols plus the
//! stress, length and tie diacritics.
//!
//! Normalisation is purely substitutional and never fails. A symbol we can't
//! map survives untouched and the tokeniser will skip it; that degrades one
//! phoneme instead of dropping an utterance.
//!
//! Several substitutions are conditional on either the language (rhotic
//! English accents keep their r-coloured vowels, everything else decomposes
//! them) or on what the loaded phoneme table actually defines (no point
//! emitting `ᵻ` for a table that never heard of it).
use crate::phonemes::PhonemeTable;
use once_cell::sync::OnceCell;
use regex::Regex;

/// A normalised language tag (`en-US` -> `en-us`), with the two
/// classifications the substitution tables care about.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LanguageTag {
    tag: String,
}

impl LanguageTag {
    /// Language packs use lowercase hyphen-separated tags; hosts sometimes
    /// hand us underscores and uppercase region parts.
    pub fn new(raw: &str) -> Self {
        LanguageTag {
            tag: raw.trim().replace('_', "-").to_lowercase(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.tag
    }

    pub fn is_english(&self) -> bool {
        self.tag.starts_with("en")
    }

    /// Accents where r-coloured vowels (`ɚ`, `ɝ`) and vowel+`ɹ` sequences
    /// are the right rendering of `3`, `A@` and friends.
    pub fn is_rhotic_english(&self) -> bool {
        matches!(self.tag.as_str(), "en-us" | "en-ca" | "en-us-nyc")
    }
}

impl Default for LanguageTag {
    fn default() -> Self {
        LanguageTag::new("")
    }
}

/// Canonicalises phonemizer output into the table's IPA alphabet.
///
/// The result contains only symbols that may exist in `table`, plus the
/// stress markers `ˈ` `ˌ`, the length mark `ː`, the tie bar `͡` and single
/// ASCII spaces between words.
pub fn normalise(text: &str, language: Option<&str>, table: &PhonemeTable) -> String {
    let lang = LanguageTag::new(language.unwrap_or(""));
    let is_english = lang.is_english();
    let is_rhotic = lang.is_rhotic_english();

    let mut text = text.to_string();

    // Tie bar variants first so multi-cell lookups see one canonical joiner.
    text = text.replace('\u{035c}', "\u{0361}");

    // Wrapper punctuation from phonemizer output modes.
    text.retain(|c| !matches!(c, '[' | ']' | '(' | ')' | '{' | '}' | '/' | '\\'));

    // Dictionary utility codes: `||` word boundary, `|` separator, `%`
    // unstressed marker, `=`; `_:` and `_` are pause markers.
    text = text.replace("||", " ");
    text = text.replace('|', "");
    text = text.replace('%', "");
    text = text.replace('=', "");
    text = text.replace("_:", " ");
    text = text.replace('_', " ");

    // ASCII stress/length to IPA.
    text = text.replace('\'', "ˈ");
    text = text.replace(',', "ˌ");
    text = text.replace(':', "ː");

    // Multi-character mnemonics, longest first so `I2#` wins over `I2`.
    let mut multi: Vec<(&str, &str)> = vec![
        ("tS", "t͡ʃ"),
        ("t͡S", "t͡ʃ"),
        ("dZ", "d͡ʒ"),
        ("d͡Z", "d͡ʒ"),
        ("ts", "t͡s"),
        ("dz", "d͡z"),
        ("I2", "ɪ"),
        ("I#", if is_english && is_rhotic { "ᵻ" } else { "ɪ" }),
        ("I2#", if is_english && is_rhotic { "ᵻ" } else { "ɪ" }),
        ("e#", "ɛ"),
        ("@L", "əl"),
        ("i@3", if is_english && is_rhotic { "ɪɹ" } else { "ɪə" }),
        ("i@", if is_english && is_rhotic { "ɪɹ" } else { "ɪə" }),
        ("e@", "eə"),
        ("U@", "ʊə"),
    ];
    if is_english {
        if is_rhotic {
            multi.extend([
                ("3ː", "ɝ"),
                ("3", "ɚ"),
                ("A@", "ɑɹ"),
                ("O@", "ɔɹ"),
                ("o@", "oɹ"),
            ]);
        } else {
            multi.extend([
                ("3ː", "ɜ"),
                ("3", "ə"),
                ("A@", "ɑː"),
                ("O@", "ɔː"),
                ("o@", "ɔː"),
            ]);
        }
        // English diphthongs arrive untied; join them so the tokeniser can
        // attribute the glide across the pair. PRICE/MOUTH start from ɑ,
        // which also keeps them clear of the later TRAP a -> æ rewrite.
        multi.extend([
            ("oʊ", "o͡ʊ"),
            ("eɪ", "e͡ɪ"),
            ("aɪ", "ɑ͡ɪ"),
            ("aʊ", "ɑ͡ʊ"),
            ("ɔɪ", "ɔ͡ɪ"),
        ]);
    }
    multi.sort_by(|a, b| b.0.chars().count().cmp(&a.0.chars().count()));
    for (from, to) in multi {
        text = text.replace(from, to);
    }

    // Single-character ASCII mnemonics.
    let singles = [
        ("@", "ə"),
        ("E", "ɛ"),
        ("O", "ɔ"),
        ("V", "ʌ"),
        ("U", "ʊ"),
        ("I", "ɪ"),
        ("A", "ɑ"),
        ("N", "ŋ"),
        ("S", "ʃ"),
        ("Z", "ʒ"),
        ("T", "θ"),
        ("D", "ð"),
        // The English LOT vowel differs across accents.
        ("0", if is_english && is_rhotic { "ɑ" } else { "ɒ" }),
    ];
    for (from, to) in singles {
        text = text.replace(from, to);
    }

    // Dark-L and syllabic-L variants.
    if !table.contains("ɫ") {
        text = text.replace('ɫ', "l");
    }
    text = text.replace("l̩", "əl");
    text = text.replace("ɫ̩", "əl");
    text = text.replace("ə͡l", "əl");
    text = text.replace("ʊ͡l", "əl");

    if !table.contains("ᵻ") {
        text = text.replace('ᵻ', "ɪ");
    }

    // Rhotic hook and syllabic-r.
    text = text.replace('˞', "ɹ");
    let syllabic_r = if table.contains("ɚ") { "ɚ" } else { "əɹ" };
    text = text.replace("ɹ̩", syllabic_r);
    text = text.replace("r̩", syllabic_r);

    // Decompose r-coloured vowels when the table doesn't define them.
    if !table.contains("ɚ") {
        text = text.replace('ɚ', "əɹ");
    }
    if !table.contains("ɝ") {
        text = text.replace('ɝ', "ɜɹ");
    }

    if is_english {
        text = text.replace('r', "ɹ");
    }

    // Cross-language approximations for symbols the table may not carry.
    let leniencies = [
        ("ɕ", "ʃ"),
        ("ʑ", "ʒ"),
        ("ʂ", "ʃ"),
        ("ʐ", "ʒ"),
        ("t͡ɕ", "t͡ʃ"),
        ("d͡ʑ", "d͡ʒ"),
        ("β", "b"),
        ("ɣ", "g"),
        ("x", "h"),
        ("ʝ", "j"),
        ("ʎ", "l"),
        ("c", "k"),
        ("ɟ", "g"),
        ("ɲ", if table.contains("ɲ") { "ɲ" } else { "n" }),
        ("ɘ", if table.contains("ɘ") { "ɘ" } else { "ə" }),
        (
            "ɵ",
            if table.contains("ɵ") {
                "ɵ"
            } else if table.contains("ø") {
                "ø"
            } else {
                "o"
            },
        ),
        ("ɤ", if table.contains("ɤ") { "ɤ" } else { "ʌ" }),
    ];
    for (from, to) in leniencies {
        text = text.replace(from, to);
    }

    // Precomposed nasal vowels seen in some pipelines.
    for (from, to) in [("ã", "a"), ("ẽ", "e"), ("ĩ", "i"), ("õ", "o"), ("ũ", "u")] {
        text = text.replace(from, to);
    }

    // The English TRAP vowel: /æ/ for rhotic accents, /a/ elsewhere.
    if is_english && is_rhotic {
        text = text.replace('a', "æ");
    }

    // Leftover hash markers.
    text = text.replace('#', "");

    static WHITESPACE: OnceCell<Regex> = OnceCell::new();
    let whitespace = WHITESPACE.get_or_init(|| Regex::new(r"\s+").unwrap());
    whitespace.replace_all(&text, " ").trim().to_string()
}
