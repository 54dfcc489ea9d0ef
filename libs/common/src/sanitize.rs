//! Text sanitization utilities

use regex::Regex;
use std::sync::OnceLock;

/// Strip control characters and HTML-special characters
///
/// Removes U+0000-U+001F, U+007F-U+009F and `< > " ' \`.
pub fn sanitize_text(text: &str) -> String {
    static UNSAFE_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = UNSAFE_REGEX.get_or_init(|| {
        Regex::new(r#"[\x{0000}-\x{001F}\x{007F}-\x{009F}<>"'\\]"#)
            .expect("Failed to compile unsafe character regex")
    });

    regex.replace_all(text, "").into_owned()
}

/// Keep only characters that are safe in a file name (`[A-Za-z0-9_-]`)
pub fn sanitize_key(key: &str) -> String {
    static KEY_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = KEY_REGEX
        .get_or_init(|| Regex::new(r"[^A-Za-z0-9_-]").expect("Failed to compile key regex"));

    regex.replace_all(key, "").into_owned()
}

/// Reduce a phrase to lowercase ASCII letters for fixed-text comparison
///
/// Case, accents, spaces and punctuation are ignored.
pub fn normalize_phrase(phrase: &str) -> String {
    phrase
        .chars()
        .flat_map(char::to_lowercase)
        .map(fold_accent)
        .filter(char::is_ascii_lowercase)
        .collect()
}

fn fold_accent(c: char) -> char {
    match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' => 'a',
        'ç' => 'c',
        'è' | 'é' | 'ê' | 'ë' => 'e',
        'ì' | 'í' | 'î' | 'ï' => 'i',
        'ñ' => 'n',
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' => 'o',
        'ù' | 'ú' | 'û' | 'ü' => 'u',
        'ý' | 'ÿ' => 'y',
        other => other,
    }
}
