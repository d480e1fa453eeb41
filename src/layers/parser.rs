use std::sync::LazyLock;

use regex::Regex;

// Scanned filenames usually look like "<series> <number> (<year>) (<scan notes>)".
// The issue number is the last whitespace-preceded numeric token that sits
// directly before a parenthesized group; everything from that token onward is
// scanner noise, not title.
static ISSUE_IN_TITLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?P<head>.*\s)(?P<number>\d+(?:\.\d+)?)\s*\(").unwrap());

/// Split a raw title into an extracted issue number and tokenized title.
///
/// The tokenizer is supplied by the caller; this function only decides which
/// part of the string it gets to see.
pub fn normalize<T>(
    raw_title: Option<&str>,
    tokenizer: impl FnOnce(&str) -> T,
) -> (Option<String>, T) {
    let title = raw_title.unwrap_or("");
    if title.is_empty() {
        return (None, tokenizer(""));
    }

    if let Some(caps) = ISSUE_IN_TITLE.captures(title) {
        let number = strip_leading_zeros(&caps["number"]);
        tracing::debug!("extracted issue number {} from '{}'", number, title);
        return (Some(number), tokenizer(&caps["head"]));
    }

    (None, tokenizer(title))
}

fn strip_leading_zeros(number: &str) -> String {
    let stripped = number.trim_start_matches('0');
    if stripped.is_empty() {
        "0".to_string()
    } else if stripped.starts_with('.') {
        format!("0{stripped}")
    } else {
        stripped.to_string()
    }
}

/// Default tokenizer: lowercased alphanumeric words, leading articles dropped.
pub fn title_tokens(title: &str) -> Vec<String> {
    title
        .split_whitespace()
        .map(|word| {
            word.trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase()
        })
        .filter(|word| !word.is_empty())
        .filter(|word| !matches!(word.as_str(), "the" | "a" | "an"))
        .collect()
}
