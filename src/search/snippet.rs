//! Word-aligned excerpts around the first matched term.

use crate::models::SearchResult;

const ELLIPSIS: char = '…';

/// An excerpt and the search terms it contains
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snippet {
    /// At most `max_chars` characters of source text, plus ellipsis markers
    pub text: String,
    pub highlights: Vec<String>,
}

/// Cut an excerpt of at most `max_chars` characters from `text`, centered
/// near the first occurrence of any term. Never splits a word unless a
/// single word is longer than `max_chars`.
pub fn make_snippet(text: &str, terms: &[String], max_chars: usize) -> Option<Snippet> {
    let chars: Vec<char> = text.chars().collect();
    if chars.iter().all(|c| c.is_whitespace()) || max_chars == 0 {
        return None;
    }
    let lower: Vec<char> = chars
        .iter()
        .map(|c| c.to_lowercase().next().unwrap_or(*c))
        .collect();

    let hit = terms
        .iter()
        .filter_map(|term| find(&lower, term).map(|pos| (pos, term.chars().count())))
        .min_by_key(|(pos, _)| *pos);

    let (mut start, mut end) = match hit {
        _ if chars.len() <= max_chars => (0, chars.len()),
        Some((pos, len)) => {
            let lead = max_chars.saturating_sub(len) / 3;
            let start = pos.saturating_sub(lead);
            let start = start.min(chars.len().saturating_sub(max_chars));
            (start, (start + max_chars).min(chars.len()))
        }
        None => (0, max_chars.min(chars.len())),
    };

    // Word alignment
    if start > 0 && !chars[start - 1].is_whitespace() {
        if let Some(offset) = chars[start..end].iter().position(|c| c.is_whitespace()) {
            start += offset;
        }
    }
    if end < chars.len() && !chars[end].is_whitespace() {
        if let Some(offset) = chars[start..end].iter().rposition(|c| c.is_whitespace()) {
            if offset > 0 {
                end = start + offset;
            }
        }
    }

    let body: String = chars[start..end].iter().collect::<String>().trim().to_string();
    if body.is_empty() {
        return None;
    }

    let body_lower = body.to_lowercase();
    let highlights = terms
        .iter()
        .filter(|t| !t.is_empty() && body_lower.contains(t.as_str()))
        .cloned()
        .collect();

    let mut out = String::with_capacity(body.len() + 8);
    if start > 0 {
        out.push(ELLIPSIS);
    }
    out.push_str(&body);
    if end < chars.len() {
        out.push(ELLIPSIS);
    }

    Some(Snippet {
        text: out,
        highlights,
    })
}

fn find(haystack: &[char], needle: &str) -> Option<usize> {
    let needle: Vec<char> = needle.chars().collect();
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle.as_slice())
}

/// Character count of the excerpt without ellipsis markers
pub fn plain_len(snippet: &str) -> usize {
    snippet.chars().filter(|c| *c != ELLIPSIS).count()
}

/// Fill in `snippet` and `highlights` from each record's descriptive text
pub fn attach_snippets(results: Vec<SearchResult>, terms: &[String], max_chars: usize) -> Vec<SearchResult> {
    results
        .into_iter()
        .map(|result| {
            let snippet = result
                .record
                .descriptive_text()
                .and_then(|text| make_snippet(text, terms, max_chars));
            match snippet {
                Some(Snippet { text, highlights }) => result.with_snippet(Some(text), highlights),
                None => result,
            }
        })
        .collect()
}
