//! FTS5 match-expression builder.
//!
//! User input is tokenized into bare words, quoted phrases and the boolean
//! operators `AND`, `OR`, `NOT` (upper case, or `&&` / `||`). Everything the
//! FTS5 grammar could choke on is removed: operands are re-emitted in lower
//! case with only alphanumeric characters, so keywords such as `NEAR` and
//! column filters (`title:`) can never leak through.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use strum::{AsRefStr, Display};

/// Query builder limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Cost above which `optimize` truncates the expression
    pub max_cost: f64,

    /// OR branches kept by `optimize`
    pub max_or_terms: usize,

    /// Raw queries longer than this (in characters) are rejected by
    /// `validate` and truncated by `build`
    pub max_query_length: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            max_cost: 100.0,
            max_or_terms: 8,
            max_query_length: 256,
        }
    }
}

/// Expansion switches for [`QueryBuilder::build`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildOptions {
    /// `word` becomes `word*`
    pub prefix_expansion: bool,

    /// `a b` becomes `"a b" OR "a" OR "b"` instead of an implicit AND
    pub or_expansion: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            prefix_expansion: true,
            or_expansion: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
pub enum BoolOp {
    #[strum(serialize = "AND")]
    And,
    #[strum(serialize = "OR")]
    Or,
    #[strum(serialize = "NOT")]
    Not,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Word { text: String, prefix: bool },
    Phrase(String),
    Op(BoolOp),
    Open,
    Close,
}

impl Token {
    fn render(&self) -> Option<String> {
        match self {
            Token::Word { text, prefix: true } => Some(format!("{}*", text)),
            Token::Word { text, prefix: false } => Some(text.clone()),
            Token::Phrase(text) => Some(format!("\"{}\"", text)),
            Token::Op(op) => Some(op.to_string()),
            Token::Open | Token::Close => None,
        }
    }

    fn term(&self) -> Option<&str> {
        match self {
            Token::Word { text, .. } | Token::Phrase(text) => Some(text),
            _ => None,
        }
    }
}

/// A sanitized engine expression and the terms it searches for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuiltQuery {
    /// FTS5 MATCH expression
    pub expression: String,

    /// Lower-cased search terms (words and phrases), in input order.
    /// Operands of NOT are not included.
    pub terms: Vec<String>,

    /// Operands of NOT; matching records must be left out
    #[serde(default)]
    pub excluded: Vec<String>,

    /// The input used explicit boolean operators
    pub explicit: bool,
}

/// Outcome of [`QueryBuilder::validate`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryValidation {
    pub is_valid: bool,
    pub reason: Option<String>,
}

impl QueryValidation {
    fn ok() -> Self {
        Self {
            is_valid: true,
            reason: None,
        }
    }

    fn reject(reason: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            reason: Some(reason.into()),
        }
    }
}

/// Cost breakdown of an engine expression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryCost {
    pub length: usize,
    pub operators: usize,
    pub wildcards: usize,
    pub phrases: usize,
    pub score: f64,
}

/// Builds, validates and bounds FTS5 match expressions
#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    config: QueryConfig,
}

impl QueryBuilder {
    pub fn new(config: QueryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &QueryConfig {
        &self.config
    }

    /// Turn raw user input into an engine expression.
    ///
    /// Returns `None` when nothing searchable is left after sanitizing.
    pub fn build(&self, raw: &str, options: BuildOptions) -> Option<BuiltQuery> {
        let raw: String = raw.trim().chars().take(self.config.max_query_length).collect();
        if raw.is_empty() {
            return None;
        }

        let tokens = tokenize(&raw);
        let explicit = tokens.iter().any(|t| matches!(t, Token::Op(_)));
        let built = if explicit {
            build_explicit(&tokens)
        } else {
            build_implicit(&tokens, options)
        }?;

        Some(BuiltQuery {
            expression: self.optimize(&built.expression),
            ..built
        })
    }

    /// Engine expression for the first search term only, used to retry
    /// queries that timed out
    pub fn build_reduced(&self, raw: &str) -> Option<BuiltQuery> {
        let full = self.build(raw, BuildOptions::default())?;
        let first = full.terms.first()?.clone();
        let expression = if first.contains(' ') {
            format!("\"{}\"", first)
        } else {
            format!("{}*", first)
        };

        Some(BuiltQuery {
            expression,
            terms: vec![first],
            excluded: full.excluded,
            explicit: false,
        })
    }

    /// Check user input without building it. Never fails; problems are
    /// reported through `is_valid` and `reason`.
    pub fn validate(&self, raw: &str) -> QueryValidation {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return QueryValidation::ok();
        }

        if trimmed.chars().count() > self.config.max_query_length {
            return QueryValidation::reject(format!(
                "query is longer than {} characters",
                self.config.max_query_length
            ));
        }

        if trimmed
            .chars()
            .any(|c| c.is_control() || matches!(c, ';' | '\\' | '{' | '}' | '`'))
            || trimmed.contains("--")
            || trimmed.contains("/*")
        {
            return QueryValidation::reject("query contains disallowed characters");
        }

        if trimmed.chars().filter(|c| *c == '"').count() % 2 != 0 {
            return QueryValidation::reject("unmatched quote");
        }

        let mut depth: i32 = 0;
        for c in trimmed.chars() {
            match c {
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth < 0 {
                        return QueryValidation::reject("unbalanced parentheses");
                    }
                }
                _ => {}
            }
        }
        if depth != 0 {
            return QueryValidation::reject("unbalanced parentheses");
        }

        let tokens = tokenize(trimmed);
        let mut expect_operand = true;
        for token in &tokens {
            match token {
                Token::Op(op) if expect_operand => {
                    return QueryValidation::reject(format!("{} is missing a left operand", op));
                }
                Token::Op(_) => expect_operand = true,
                Token::Close if expect_operand => {
                    return QueryValidation::reject("incomplete boolean expression");
                }
                Token::Open => {}
                Token::Close => {}
                Token::Word { .. } | Token::Phrase(_) => expect_operand = false,
            }
        }
        if let Some(Token::Op(op)) = tokens.last() {
            return QueryValidation::reject(format!("{} is missing a right operand", op));
        }

        if !tokens.iter().any(|t| t.term().is_some()) {
            return QueryValidation::reject("query has no searchable terms");
        }

        QueryValidation::ok()
    }

    /// Score an engine expression by length, operators, wildcards and phrases
    pub fn estimate_cost(&self, expression: &str) -> QueryCost {
        let mut operators = 0;
        let mut in_phrase = false;
        let mut phrases = 0;
        for c in expression.chars() {
            if c == '"' {
                in_phrase = !in_phrase;
                if in_phrase {
                    phrases += 1;
                }
            }
        }
        for word in expression.split_whitespace() {
            if matches!(word, "AND" | "OR" | "NOT") {
                operators += 1;
            }
        }
        let wildcards = expression.matches('*').count();
        let length = expression.chars().count();

        QueryCost {
            length,
            operators,
            wildcards,
            phrases,
            score: length as f64 / 10.0
                + operators as f64 * 5.0
                + wildcards as f64 * 10.0
                + phrases as f64 * 2.0,
        }
    }

    /// Collapse repeated wildcards and, when the cost is over the ceiling,
    /// keep only the first `max_or_terms` top-level OR branches.
    /// Deterministic.
    pub fn optimize(&self, expression: &str) -> String {
        let mut optimized = expression.to_string();
        while optimized.contains("**") {
            optimized = optimized.replace("**", "*");
        }

        if self.estimate_cost(&optimized).score <= self.config.max_cost {
            return optimized;
        }

        let branches = top_level_or_branches(&optimized);
        if branches.len() > self.config.max_or_terms {
            let kept = branches[..self.config.max_or_terms.max(1)].join(" OR ");
            tracing::debug!(
                from = branches.len(),
                to = self.config.max_or_terms,
                "Truncated OR chain"
            );
            optimized = kept;
        }
        optimized
    }
}

fn tokenize(input: &str) -> Vec<Token> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        match c {
            '"' => {
                match chars[i + 1..].iter().position(|&c| c == '"') {
                    Some(len) => {
                        let text: String = chars[i + 1..i + 1 + len].iter().collect();
                        if let Some(phrase) = normalize_phrase(&text) {
                            tokens.push(Token::Phrase(phrase));
                        }
                        i += len + 2;
                    }
                    // Unmatched quote: ignore it and keep reading words
                    None => i += 1,
                }
            }
            '(' => {
                tokens.push(Token::Open);
                i += 1;
            }
            ')' => {
                tokens.push(Token::Close);
                i += 1;
            }
            _ => {
                let start = i;
                while i < chars.len()
                    && !chars[i].is_whitespace()
                    && !matches!(chars[i], '"' | '(' | ')')
                {
                    i += 1;
                }
                let raw: String = chars[start..i].iter().collect();
                if let Some(token) = word_token(&raw) {
                    tokens.push(token);
                }
            }
        }
    }
    tokens
}

fn word_token(raw: &str) -> Option<Token> {
    match raw {
        "AND" | "&&" => return Some(Token::Op(BoolOp::And)),
        "OR" | "||" => return Some(Token::Op(BoolOp::Or)),
        "NOT" => return Some(Token::Op(BoolOp::Not)),
        _ => {}
    }

    let prefix = raw.ends_with('*');
    let cleaned = raw.trim_matches(|c: char| !c.is_alphanumeric());
    if cleaned.is_empty() {
        return None;
    }
    if cleaned.chars().all(char::is_alphanumeric) {
        Some(Token::Word {
            text: cleaned.to_lowercase(),
            prefix,
        })
    } else {
        // Internal punctuation (O'Brien, class-of-94) becomes a phrase
        normalize_phrase(cleaned).map(Token::Phrase)
    }
}

/// Lower-case alphanumeric words joined by single spaces
fn normalize_phrase(text: &str) -> Option<String> {
    let words: Vec<String> = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect();
    (!words.is_empty()).then(|| words.join(" "))
}

fn collect_terms(tokens: &[Token]) -> Vec<String> {
    let mut seen = HashSet::new();
    tokens
        .iter()
        .filter_map(Token::term)
        .filter(|t| seen.insert(t.to_string()))
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
    Operand(Token),
    Op(BoolOp),
    Open,
    Close,
}

fn ends_operand(parts: &[Part]) -> bool {
    matches!(parts.last(), Some(Part::Operand(_) | Part::Close))
}

/// Operators are kept only between operands, groups stay balanced and
/// adjacent operands are joined with an explicit AND
fn build_explicit(tokens: &[Token]) -> Option<BuiltQuery> {
    let mut parts: Vec<Part> = Vec::new();
    let mut depth = 0usize;

    for token in tokens {
        match token {
            Token::Word { .. } | Token::Phrase(_) => {
                if ends_operand(&parts) {
                    parts.push(Part::Op(BoolOp::And));
                }
                parts.push(Part::Operand(token.clone()));
            }
            Token::Op(op) if ends_operand(&parts) => parts.push(Part::Op(*op)),
            Token::Op(BoolOp::Not) if parts.last() == Some(&Part::Op(BoolOp::And)) => {
                // FTS5 NOT is binary: `a AND NOT b` is `a NOT b`
                parts.pop();
                parts.push(Part::Op(BoolOp::Not));
            }
            Token::Op(_) => {}
            Token::Open => {
                if ends_operand(&parts) {
                    parts.push(Part::Op(BoolOp::And));
                }
                parts.push(Part::Open);
                depth += 1;
            }
            Token::Close if depth == 0 => {}
            Token::Close => {
                depth -= 1;
                while matches!(parts.last(), Some(Part::Op(_))) {
                    parts.pop();
                }
                if parts.last() == Some(&Part::Open) {
                    parts.pop();
                } else {
                    parts.push(Part::Close);
                }
            }
        }
    }

    loop {
        match parts.last() {
            Some(Part::Op(_)) => {
                parts.pop();
            }
            Some(Part::Open) => {
                parts.pop();
                depth -= 1;
            }
            _ => break,
        }
    }
    parts.extend(std::iter::repeat(Part::Close).take(depth));
    if !parts.iter().any(|p| matches!(p, Part::Operand(_))) {
        return None;
    }

    let (terms, excluded) = split_excluded(&parts);
    Some(BuiltQuery {
        expression: render_parts(&parts),
        terms,
        excluded,
        explicit: true,
    })
}

/// Terms under a NOT (a single operand or a whole group) versus the rest
fn split_excluded(parts: &[Part]) -> (Vec<String>, Vec<String>) {
    let mut terms = Vec::new();
    let mut excluded = Vec::new();
    let mut negated_depth: Option<usize> = None;
    let mut after_not = false;
    let mut depth = 0usize;

    for part in parts {
        match part {
            Part::Op(op) => after_not = *op == BoolOp::Not,
            Part::Open => {
                depth += 1;
                if after_not && negated_depth.is_none() {
                    negated_depth = Some(depth);
                }
                after_not = false;
            }
            Part::Close => {
                if negated_depth == Some(depth) {
                    negated_depth = None;
                }
                depth = depth.saturating_sub(1);
            }
            Part::Operand(token) => {
                if let Some(term) = token.term() {
                    let target = if after_not || negated_depth.is_some() {
                        &mut excluded
                    } else {
                        &mut terms
                    };
                    if !target.iter().any(|t| t == term) {
                        target.push(term.to_string());
                    }
                }
                after_not = false;
            }
        }
    }
    (terms, excluded)
}

fn render_parts(parts: &[Part]) -> String {
    let mut out = String::new();
    for part in parts {
        let piece = match part {
            Part::Operand(token) => token.render().unwrap_or_default(),
            Part::Op(op) => op.to_string(),
            Part::Open => "(".to_string(),
            Part::Close => ")".to_string(),
        };
        if !out.is_empty() && !out.ends_with('(') && *part != Part::Close {
            out.push(' ');
        }
        out.push_str(&piece);
    }
    out
}

/// OR branches outside parentheses and phrases
fn top_level_or_branches(expression: &str) -> Vec<&str> {
    let bytes = expression.as_bytes();
    let mut branches = Vec::new();
    let mut depth = 0i32;
    let mut quoted = false;
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'"' => quoted = !quoted,
            b'(' if !quoted => depth += 1,
            b')' if !quoted => depth -= 1,
            b' ' if !quoted && depth == 0 && expression[i..].starts_with(" OR ") => {
                branches.push(&expression[start..i]);
                i += 4;
                start = i;
                continue;
            }
            _ => {}
        }
        i += 1;
    }
    branches.push(&expression[start..]);
    branches
}

fn build_implicit(tokens: &[Token], options: BuildOptions) -> Option<BuiltQuery> {
    let mut seen = HashSet::new();
    let operands: Vec<&Token> = tokens
        .iter()
        .filter(|t| t.term().is_some())
        .filter(|t| seen.insert(t.term().map(str::to_string)))
        .collect();

    let expression = match operands.as_slice() {
        [] => return None,
        [Token::Word { text, .. }] if options.prefix_expansion => format!("{}*", text),
        [single] => single.render()?,
        many if options.or_expansion => {
            let mut branches = Vec::with_capacity(many.len() + 1);
            if many.iter().all(|t| matches!(t, Token::Word { .. })) {
                let combined = many
                    .iter()
                    .filter_map(|t| t.term())
                    .collect::<Vec<_>>()
                    .join(" ");
                branches.push(format!("\"{}\"", combined));
            }
            for token in many {
                if let Some(term) = token.term() {
                    branches.push(format!("\"{}\"", term));
                }
            }
            branches.join(" OR ")
        }
        many => many
            .iter()
            .filter_map(|t| t.render())
            .collect::<Vec<_>>()
            .join(" "),
    };

    Some(BuiltQuery {
        expression,
        terms: collect_terms(tokens),
        excluded: Vec::new(),
        explicit: false,
    })
}
