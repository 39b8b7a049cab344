//! Text normalization shared by the phrase rule tables.
//!
//! Questions arrive in English and Spanish, with or without accents, so every
//! rule is matched against a folded form: lower-case, accents stripped,
//! punctuation collapsed into single spaces.

/// Lower-cases, strips Spanish accents and collapses punctuation/whitespace.
pub fn normalize(input: &str) -> String {
    let mut output = String::with_capacity(input.len());
    let mut pending_space = false;

    for ch in input.chars().flat_map(char::to_lowercase) {
        let folded = fold_accent(ch);
        if folded.is_alphanumeric() || folded == '\'' || folded == '_' {
            if pending_space && !output.is_empty() {
                output.push(' ');
            }
            pending_space = false;
            output.push(folded);
        } else {
            pending_space = true;
        }
    }

    output
}

pub fn tokens(normalized: &str) -> Vec<&str> {
    normalized.split(' ').filter(|token| !token.is_empty()).collect()
}

/// Whole-word phrase match. Both sides are normalized first, so `"Más detalles!"`
/// matches the phrase `"mas detalles"` but `"generally"` does not match `"general"`.
pub fn contains_phrase(text: &str, phrase: &str) -> bool {
    let haystack = normalize(text);
    let needle = normalize(phrase);
    contains_normalized_phrase(&haystack, &needle)
}

pub fn contains_normalized_phrase(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }
    let padded_haystack = format!(" {haystack} ");
    let padded_needle = format!(" {needle} ");
    padded_haystack.contains(&padded_needle)
}

/// Truncates on a char boundary and appends `...` when content was cut.
pub fn truncate_chars(input: &str, max_chars: usize) -> String {
    let mut chars = input.chars();
    let head: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

fn fold_accent(ch: char) -> char {
    match ch {
        'á' | 'à' | 'â' | 'ä' | 'ã' => 'a',
        'é' | 'è' | 'ê' | 'ë' => 'e',
        'í' | 'ì' | 'î' | 'ï' => 'i',
        'ó' | 'ò' | 'ô' | 'ö' | 'õ' => 'o',
        'ú' | 'ù' | 'û' | 'ü' => 'u',
        'ñ' => 'n',
        'ç' => 'c',
        '\u{2018}' | '\u{2019}' => '\'',
        other => other,
    }
}
