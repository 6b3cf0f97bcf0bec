use std::collections::HashMap;
use std::io::Write;
use std::process::{Command, Stdio};

use lazy_static::lazy_static;
use regex::{Captures, Regex};

use super::EngineError;

/// Language tags accepted by the Kokoro phonemizer, passed straight to espeak-ng.
pub const SUPPORTED_LANGUAGES: &[&str] = &[
    "cmn", "en-gb", "en-us", "es", "fr-fr", "hi", "it", "ja", "pt-br",
];

/// Longest phoneme sequence the model accepts in one inference.
pub const MAX_PHONEME_LENGTH: usize = 510;

lazy_static! {
    /// Kokoro's phoneme vocabulary. Characters outside it are dropped.
    static ref VOCAB: HashMap<char, i64> = {
        let entries: &[(char, i64)] = &[
            (';', 1), (':', 2), (',', 3), ('.', 4), ('!', 5), ('?', 6),
            ('—', 9), ('…', 10), ('"', 11), ('(', 12), (')', 13),
            ('“', 14), ('”', 15), (' ', 16), ('\u{0303}', 17),
            ('ʣ', 18), ('ʥ', 19), ('ʦ', 20), ('ʨ', 21), ('ᵝ', 22), ('\u{AB67}', 23),
            ('A', 24), ('I', 31), ('O', 39), ('Q', 40), ('S', 42), ('T', 43),
            ('W', 46), ('Y', 48), ('ᵊ', 49),
            ('a', 50), ('b', 51), ('c', 52), ('d', 53), ('e', 54), ('f', 55),
            ('h', 57), ('i', 58), ('j', 59), ('k', 60), ('l', 61), ('m', 62),
            ('n', 63), ('o', 64), ('p', 65), ('q', 66), ('r', 67), ('s', 68),
            ('t', 69), ('u', 70), ('v', 71), ('w', 72), ('x', 73), ('y', 74),
            ('z', 75),
            ('ɑ', 76), ('ɐ', 77), ('ɒ', 78), ('æ', 79), ('β', 82), ('ɔ', 83),
            ('ɕ', 84), ('ç', 85), ('ɖ', 87), ('ð', 88), ('ʤ', 89), ('ə', 90),
            ('ɚ', 92), ('ɛ', 93), ('ɜ', 94), ('ɟ', 97), ('ɡ', 99), ('ɥ', 100),
            ('ɨ', 101), ('ɪ', 102), ('ʝ', 103), ('ɯ', 104), ('ɰ', 105), ('ŋ', 106),
            ('ɳ', 107), ('ɲ', 108), ('ɴ', 109), ('ø', 110), ('ɸ', 112), ('θ', 113),
            ('œ', 114), ('ɹ', 123), ('ɾ', 125), ('ɻ', 126), ('ʁ', 128), ('ɽ', 129),
            ('ʂ', 130), ('ʃ', 131), ('ʈ', 132), ('ʧ', 133), ('ʊ', 135), ('ʋ', 136),
            ('ʌ', 138), ('ɣ', 139), ('ɤ', 140), ('χ', 142), ('ʎ', 143), ('ʒ', 147),
            ('ʔ', 148), ('ˈ', 156), ('ˌ', 157), ('ː', 158), ('ʰ', 162), ('ʲ', 164),
            ('↓', 169), ('→', 171), ('↗', 172), ('↘', 173), ('ᵻ', 177),
        ];
        entries.iter().copied().collect()
    };

    static ref PUNCTUATION: Regex = Regex::new(r#"[;:,.!?¡¿—…"«»“”()]+"#).unwrap();

    /// espeak-ng language switch markers such as `(en)` or `(fr-fr)`
    static ref LANG_FLAG: Regex = Regex::new(r"\([a-z]{2,3}(?:-[a-z]+)?\)").unwrap();

    static ref DETACHED_Z: Regex = Regex::new(r#" z([;:,.!?¡¿—…"«»“” ]|$)"#).unwrap();

    static ref HUNDRED: Regex = Regex::new(r"([a-zɹː])(hˈʌndɹɪd)").unwrap();

    static ref NINETY: Regex = Regex::new(r"nˈaɪnti(ː)?").unwrap();

    static ref BATCH_BREAK: Regex = Regex::new(r"[.,!?;]").unwrap();
}

pub fn is_supported_language(lang: &str) -> bool {
    SUPPORTED_LANGUAGES.contains(&lang)
}

/// Convert text to Kokoro phonemes using espeak-ng, keeping punctuation.
pub fn phonemize(text: &str, lang: &str) -> Result<String, EngineError> {
    if !is_supported_language(lang) {
        return Err(EngineError::UnsupportedLanguage(lang.to_string()));
    }

    let mut raw = String::new();
    let mut last_end = 0;

    for m in PUNCTUATION.find_iter(text) {
        push_words(&mut raw, &text[last_end..m.start()], lang)?;
        let trimmed = raw.trim_end().len();
        raw.truncate(trimmed);
        raw.push_str(m.as_str());
        raw.push(' ');
        last_end = m.end();
    }
    push_words(&mut raw, &text[last_end..], lang)?;

    Ok(postprocess(raw.trim(), lang))
}

fn push_words(out: &mut String, words: &str, lang: &str) -> Result<(), EngineError> {
    let words = words.trim();
    if words.is_empty() {
        return Ok(());
    }
    out.push_str(&espeak_ipa(words, lang)?);
    out.push(' ');
    Ok(())
}

/// Run espeak-ng once over a punctuation-free run of words.
fn espeak_ipa(text: &str, voice: &str) -> Result<String, EngineError> {
    let mut child = Command::new("espeak-ng")
        .args(["--ipa", "-q", "-v", voice, "--stdin"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| {
            EngineError::Phonemize(format!("Failed to run espeak-ng (is it installed?): {}", e))
        })?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(text.as_bytes())?;
    }

    let output = child.wait_with_output()?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(EngineError::Phonemize(format!("espeak-ng failed: {}", stderr)));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let ipa = LANG_FLAG.replace_all(&stdout, "");
    Ok(ipa.split_whitespace().collect::<Vec<_>>().join(" "))
}

/// Normalize espeak-ng IPA into the symbols Kokoro was trained on.
pub fn postprocess(ipa: &str, lang: &str) -> String {
    let mut ps = ipa
        .replace('ʲ', "j")
        .replace('r', "ɹ")
        .replace('x', "k")
        .replace('ɬ', "l");
    ps = replace_until_stable(&HUNDRED, ps, "$1 $2");
    ps = replace_until_stable(&DETACHED_Z, ps, "z$1");
    if lang == "en-us" {
        // American "ninety" is flapped: nˈaɪnti -> nˈaɪndi, unless long ː follows
        ps = NINETY
            .replace_all(&ps, |caps: &Captures| match caps.get(1) {
                Some(_) => caps[0].to_string(),
                None => "nˈaɪndi".to_string(),
            })
            .into_owned();
    }
    ps.chars()
        .filter(|c| VOCAB.contains_key(c))
        .collect::<String>()
        .trim()
        .to_string()
}

/// The rules consume the neighbour they look at, so adjacent matches need
/// another pass.
fn replace_until_stable(re: &Regex, mut text: String, rep: &str) -> String {
    loop {
        let next = re.replace_all(&text, rep).into_owned();
        if next == text {
            return text;
        }
        text = next;
    }
}

/// Map phonemes to vocabulary ids, skipping unknown symbols.
pub fn tokenize(phonemes: &str) -> Vec<i64> {
    phonemes.chars().filter_map(|c| VOCAB.get(&c).copied()).collect()
}

/// Split a phoneme string at sentence punctuation into batches shorter than
/// `MAX_PHONEME_LENGTH` characters.
pub fn split_phonemes(phonemes: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut last_end = 0;
    for m in BATCH_BREAK.find_iter(phonemes) {
        parts.push(&phonemes[last_end..m.start()]);
        parts.push(m.as_str());
        last_end = m.end();
    }
    parts.push(&phonemes[last_end..]);

    let mut batches = Vec::new();
    let mut current = String::new();

    for part in parts.into_iter().flat_map(split_long_part) {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }

        if current.chars().count() + part.chars().count() + 1 >= MAX_PHONEME_LENGTH {
            let done = current.trim().to_string();
            if !done.is_empty() {
                batches.push(done);
            }
            current = part.to_string();
        } else if BATCH_BREAK.is_match(part) && part.chars().count() == 1 {
            current.push_str(part);
        } else {
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(part);
        }
    }

    let done = current.trim();
    if !done.is_empty() {
        batches.push(done.to_string());
    }

    batches
}

/// Break a punctuation-free run that alone would overflow a batch at word
/// boundaries, falling back to a hard character split.
fn split_long_part(part: &str) -> Vec<String> {
    let limit = MAX_PHONEME_LENGTH - 2;
    if part.chars().count() <= limit {
        return vec![part.to_string()];
    }

    let mut pieces = Vec::new();
    let mut current = String::new();
    for word in part.split_whitespace() {
        let chars: Vec<char> = word.chars().collect();
        for chunk in chars.chunks(limit) {
            let chunk: String = chunk.iter().collect();
            if !current.is_empty() && current.chars().count() + chunk.chars().count() + 1 > limit {
                pieces.push(std::mem::take(&mut current));
            }
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(&chunk);
        }
    }
    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}
