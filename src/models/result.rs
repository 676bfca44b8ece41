use crate::models::{Record, RecordKind, SortDirection, SortField};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use strum::Display;

/// A single ranked hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Stable identifier, e.g. `photo:17`
    pub id: String,

    pub kind: RecordKind,

    pub title: String,

    pub subtitle: Option<String>,

    pub thumbnail: Option<String>,

    /// Non-negative relevance; higher ranks higher
    pub relevance: f64,

    /// Word-aligned excerpt around the first matched term
    pub snippet: Option<String>,

    /// Query terms found in the snippet
    #[serde(default)]
    pub highlights: Vec<String>,

    pub metadata: BTreeMap<String, Value>,

    pub record: Record,
}

impl SearchResult {
    /// Build a result from a typed record. Negative or NaN scores become 0.
    pub fn from_record(record: Record, relevance: f64) -> Self {
        let relevance = if relevance.is_finite() {
            relevance.max(0.0)
        } else {
            0.0
        };

        Self {
            id: record.stable_id(),
            kind: record.kind(),
            title: record.title(),
            subtitle: record.subtitle(),
            thumbnail: record.thumbnail(),
            relevance,
            snippet: None,
            highlights: Vec::new(),
            metadata: record.metadata(),
            record,
        }
    }

    pub fn with_snippet(mut self, snippet: Option<String>, highlights: Vec<String>) -> Self {
        self.snippet = snippet;
        self.highlights = highlights;
        self
    }
}

/// Which path produced a response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ResultSource {
    /// Ranked FTS5 query
    Ranked,
    /// Filter-only scan of base tables
    Browse,
    /// Substring fallback search
    Fallback,
    /// Served from the result cache
    Cached,
    /// Served without touching the engine while the circuit breaker is open
    ShortCircuit,
}

/// Search response with results and metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    /// Page of results after sorting, offset and limit
    pub results: Vec<SearchResult>,

    /// Number of merged hits before pagination
    pub total_hits: usize,

    /// Query that was executed
    pub query: String,

    pub source: ResultSource,

    /// True when the response came out of a cache
    pub cache_hit: bool,

    /// Kinds that were answered by the substring scan instead of the index
    #[serde(default)]
    pub degraded_kinds: Vec<RecordKind>,

    /// Search execution time in milliseconds
    pub search_time_ms: u64,

    pub offset: usize,

    pub limit: usize,
}

impl SearchResponse {
    pub fn empty(query: impl Into<String>, source: ResultSource, offset: usize, limit: usize) -> Self {
        Self {
            results: Vec::new(),
            total_hits: 0,
            query: query.into(),
            source,
            cache_hit: false,
            degraded_kinds: Vec::new(),
            search_time_ms: 0,
            offset,
            limit,
        }
    }

    pub fn is_degraded(&self) -> bool {
        !self.degraded_kinds.is_empty()
            || matches!(self.source, ResultSource::Fallback | ResultSource::ShortCircuit)
    }
}

/// Sort in place by `field`/`direction`.
///
/// Ties fall back to relevance descending, then title ascending, then id, so
/// that identical inputs always produce identical orderings. Results missing
/// the sort field go last regardless of direction.
pub fn sort_results(results: &mut [SearchResult], field: SortField, direction: SortDirection) {
    results.sort_by(|a, b| {
        let primary = match field {
            SortField::Relevance => directed(cmp_f64(a.relevance, b.relevance), direction),
            SortField::Name => directed(cmp_title(a, b), direction),
            SortField::Date => cmp_optional(a.record.date(), b.record.date(), direction),
            SortField::Year => cmp_optional(a.record.year(), b.record.year(), direction),
        };

        primary
            .then_with(|| cmp_f64(b.relevance, a.relevance))
            .then_with(|| cmp_title(a, b))
            .then_with(|| a.id.cmp(&b.id))
    });
}

/// Apply offset and limit to an already sorted list
pub fn paginate(results: Vec<SearchResult>, offset: usize, limit: usize) -> Vec<SearchResult> {
    results.into_iter().skip(offset).take(limit).collect()
}

fn directed(ordering: Ordering, direction: SortDirection) -> Ordering {
    match direction {
        SortDirection::Ascending => ordering,
        SortDirection::Descending => ordering.reverse(),
    }
}

fn cmp_f64(a: f64, b: f64) -> Ordering {
    a.partial_cmp(&b).unwrap_or(Ordering::Equal)
}

fn cmp_title(a: &SearchResult, b: &SearchResult) -> Ordering {
    a.title.to_lowercase().cmp(&b.title.to_lowercase())
}

fn cmp_optional<T: Ord>(a: Option<T>, b: Option<T>, direction: SortDirection) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => directed(a.cmp(&b), direction),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
