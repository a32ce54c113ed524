//! Lexical tokenization for the `search_text` column and keyword scoring.
//!
//! Alphabetic and numeric runs become lowercase word tokens. CJK runs have no
//! word boundaries, so they are indexed as overlapping character bigrams
//! ("料金は" → "料金", "金は"); a lone CJK character is kept as-is. Fullwidth
//! ASCII is folded first so "５０００" and "5000" index the same way.

use std::collections::BTreeSet;

/// Split text into normalized lexical tokens, in order, duplicates kept.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut word = String::new();
    let mut cjk_run: Vec<char> = Vec::new();

    for raw in text.chars() {
        let c = fold_width(raw);
        if is_cjk(c) {
            flush_word(&mut word, &mut tokens);
            cjk_run.push(c);
        } else if c.is_alphanumeric() {
            flush_cjk(&mut cjk_run, &mut tokens);
            word.extend(c.to_lowercase());
        } else {
            flush_word(&mut word, &mut tokens);
            flush_cjk(&mut cjk_run, &mut tokens);
        }
    }
    flush_word(&mut word, &mut tokens);
    flush_cjk(&mut cjk_run, &mut tokens);
    tokens
}

/// Build the stored `search_text` for a record from its canonical content.
pub fn build_search_text(content: &str) -> String {
    tokenize(content).join(" ")
}

/// FTS5 MATCH expression: each distinct token quoted, OR-joined.
/// Returns `None` when the query has no indexable tokens.
pub fn fts_match_query(tokens: &[String]) -> Option<String> {
    let distinct: BTreeSet<&str> = tokens.iter().map(|t| t.as_str()).collect();
    if distinct.is_empty() {
        return None;
    }
    let quoted: Vec<String> = distinct
        .into_iter()
        .map(|t| format!("\"{}\"", t.replace('"', "")))
        .collect();
    Some(quoted.join(" OR "))
}

/// Fraction of distinct query tokens present in a record's `search_text`, in `[0, 1]`.
pub fn token_coverage(query_tokens: &[String], search_text: &str) -> f64 {
    let query: BTreeSet<&str> = query_tokens.iter().map(|t| t.as_str()).collect();
    if query.is_empty() {
        return 0.0;
    }
    let doc: BTreeSet<&str> = search_text.split_whitespace().collect();
    let hits = query.iter().filter(|t| doc.contains(*t)).count();
    hits as f64 / query.len() as f64
}

fn flush_word(word: &mut String, tokens: &mut Vec<String>) {
    if !word.is_empty() {
        tokens.push(std::mem::take(word));
    }
}

fn flush_cjk(run: &mut Vec<char>, tokens: &mut Vec<String>) {
    match run.len() {
        0 => {}
        1 => tokens.push(run[0].to_string()),
        _ => tokens.extend(run.windows(2).map(|w| w.iter().collect::<String>())),
    }
    run.clear();
}

fn fold_width(c: char) -> char {
    match c as u32 {
        0xFF01..=0xFF5E => char::from_u32(c as u32 - 0xFEE0).unwrap_or(c),
        0x3000 => ' ',
        _ => c,
    }
}

fn is_cjk(c: char) -> bool {
    matches!(c as u32,
        0x3040..=0x309F     // hiragana
        | 0x30A0..=0x30FF   // katakana
        | 0x3400..=0x4DBF   // CJK ext A
        | 0x4E00..=0x9FFF   // CJK unified
        | 0xAC00..=0xD7AF   // hangul syllables
        | 0xF900..=0xFAFF   // CJK compatibility
        | 0xFF66..=0xFF9F   // halfwidth katakana
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latin_words_lowercased() {
        assert_eq!(tokenize("Free Trial, 2 hours!"), vec!["free", "trial", "2", "hours"]);
    }

    #[test]
    fn test_cjk_bigrams_and_numbers() {
        assert_eq!(
            tokenize("料金は5000円です"),
            vec!["料金", "金は", "5000", "円で", "です"]
        );
        assert_eq!(tokenize("円"), vec!["円"]);
    }

    #[test]
    fn test_fullwidth_folding() {
        assert_eq!(tokenize("¥５０００"), vec!["5000"]);
        assert_eq!(tokenize("ＡＢＣ"), vec!["abc"]);
    }

    #[test]
    fn test_fts_query_dedups_and_quotes() {
        let tokens = tokenize("yoga yoga class");
        assert_eq!(fts_match_query(&tokens).unwrap(), "\"class\" OR \"yoga\"");
        assert!(fts_match_query(&tokenize("?!")).is_none());
    }

    #[test]
    fn test_token_coverage() {
        let q = tokenize("料金はいくらですか");
        let text = build_search_text("料金は5000円です");
        let cov = token_coverage(&q, &text);
        // 料金, 金は, です out of 8 distinct bigrams
        assert!((cov - 3.0 / 8.0).abs() < 1e-9);
        assert_eq!(token_coverage(&q, &build_search_text("無料体験あります")), 0.0);
        assert_eq!(token_coverage(&[], "anything"), 0.0);
    }
}
