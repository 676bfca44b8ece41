//! Degraded-mode search over base tables.
//!
//! Nothing here touches the FTS5 tables: rows are found with `LIKE` over the
//! same columns the index covers and scored in Rust. This keeps search
//! working while an index is missing, corrupt or being rebuilt.
//!
//! # Relevance
//!
//! For every query term and every searchable field of a record:
//!
//! | match                          | base |
//! |--------------------------------|------|
//! | whole field equals the term    | 100  |
//! | field starts with the term     | 80   |
//! | term starts a later word       | 70   |
//! | term appears anywhere          | 60   |
//!
//! A field bonus is added (+10 name/title, +5 tags and the kind-specific
//! secondary field, +0 free text), long fields are penalized (-10 above 200
//! characters, -20 above 1000) and the result is clamped to `[0, 100]`. A term
//! scores the best of its fields; a record scores the mean over all terms,
//! so records matching more terms rank higher. Each tag is matched as its
//! own field.

use crate::db::ConnectionPool;
use crate::error::Result;
use crate::metrics::record_search;
use crate::models::{
    paginate, sort_results, Record, RecordKind, ResultSource, SearchFilters, SearchOptions,
    SearchResponse, SearchResult,
};
use crate::query::{BuildOptions, QueryBuilder};
use crate::search::kinds::{self, FilterClause};
use crate::search::snippet::attach_snippets;
use rusqlite::Connection;
use std::time::Instant;
use tracing::{debug, info};

const EXACT: f64 = 100.0;
const PREFIX: f64 = 80.0;
const WORD_BOUNDARY: f64 = 70.0;
const SUBSTRING: f64 = 60.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldRole {
    Identity,
    Descriptive,
    Tag,
    Secondary,
}

impl FieldRole {
    fn bonus(self) -> f64 {
        match self {
            FieldRole::Identity => 10.0,
            FieldRole::Tag | FieldRole::Secondary => 5.0,
            FieldRole::Descriptive => 0.0,
        }
    }
}

/// Searchable fields of a record, mirroring the indexed columns
fn fields(record: &Record) -> Vec<(FieldRole, String)> {
    let mut out = Vec::with_capacity(4 + record.tags().len());
    let mut push = |role: FieldRole, value: Option<&str>| {
        if let Some(value) = value.filter(|v| !v.trim().is_empty()) {
            out.push((role, value.to_lowercase()));
        }
    };

    match record {
        Record::Profile(p) => {
            push(FieldRole::Identity, Some(p.full_name().as_str()));
            push(FieldRole::Descriptive, p.bio.as_deref());
            push(FieldRole::Secondary, p.class_role.as_deref());
        }
        Record::Publication(p) => {
            push(FieldRole::Identity, Some(p.title.as_str()));
            push(FieldRole::Descriptive, p.description.as_deref());
            push(FieldRole::Secondary, Some(p.publication_type.as_str()));
        }
        Record::Photo(p) => {
            push(FieldRole::Identity, Some(p.title.as_str()));
            push(FieldRole::Descriptive, p.caption.as_deref());
            push(FieldRole::Secondary, p.collection.as_deref());
        }
        Record::Staff(s) => {
            push(FieldRole::Identity, Some(s.full_name.as_str()));
            push(FieldRole::Descriptive, s.bio.as_deref());
            push(FieldRole::Secondary, s.department.as_deref());
        }
    }
    for tag in record.tags() {
        push(FieldRole::Tag, Some(tag.as_str()));
    }
    out
}

/// Base score of `term` against an already lower-cased field
fn match_score(field: &str, term: &str) -> Option<f64> {
    if term.is_empty() {
        return None;
    }
    if field == term {
        return Some(EXACT);
    }
    if field.starts_with(term) {
        return Some(PREFIX);
    }

    let mut best = None;
    for (pos, _) in field.match_indices(term) {
        let at_boundary = field[..pos]
            .chars()
            .next_back()
            .map_or(true, |c| !c.is_alphanumeric());
        if at_boundary {
            return Some(WORD_BOUNDARY);
        }
        best = Some(SUBSTRING);
    }
    best
}

fn length_penalty(field: &str) -> f64 {
    match field.chars().count() {
        n if n > 1000 => 20.0,
        n if n > 200 => 10.0,
        _ => 0.0,
    }
}

/// Heuristic relevance in `[0, 100]`, or `None` when no term matches
pub fn score_record(record: &Record, terms: &[String]) -> Option<f64> {
    if terms.is_empty() {
        return None;
    }
    let fields = fields(record);

    let mut matched = false;
    let total: f64 = terms
        .iter()
        .map(|term| {
            let best = fields
                .iter()
                .filter_map(|(role, value)| {
                    match_score(value, term)
                        .map(|base| (base + role.bonus() - length_penalty(value)).clamp(0.0, 100.0))
                })
                .fold(None, |acc: Option<f64>, s| Some(acc.map_or(s, |a| a.max(s))));
            if best.is_some() {
                matched = true;
            }
            best.unwrap_or(0.0)
        })
        .sum();

    matched.then(|| (total / terms.len() as f64).clamp(0.0, 100.0))
}

/// Any searchable field of `record` contains one of `excluded`
pub fn is_excluded(record: &Record, excluded: &[String]) -> bool {
    if excluded.is_empty() {
        return false;
    }
    fields(record)
        .iter()
        .any(|(_, value)| excluded.iter().any(|term| value.contains(term.as_str())))
}

/// Substring scan of one kind, scored. Records containing an `excluded`
/// term are dropped. Blocking; runs on a connection the caller already
/// holds.
pub fn scan_kind(
    conn: &Connection,
    kind: RecordKind,
    terms: &[String],
    excluded: &[String],
    filters: &SearchFilters,
) -> rusqlite::Result<Vec<SearchResult>> {
    let Some(filter) = FilterClause::for_kind(kind, filters) else {
        return Ok(Vec::new());
    };

    let records = kinds::substring_scan(conn, kind, terms, &filter)?;
    Ok(records
        .into_iter()
        .filter(|record| !is_excluded(record, excluded))
        .filter_map(|record| {
            score_record(&record, terms).map(|score| SearchResult::from_record(record, score))
        })
        .collect())
}

/// Filter-only listing of one kind with relevance 0
pub fn browse_kind(
    conn: &Connection,
    kind: RecordKind,
    filters: &SearchFilters,
    fetch: usize,
) -> rusqlite::Result<Vec<SearchResult>> {
    let Some(filter) = FilterClause::for_kind(kind, filters) else {
        return Ok(Vec::new());
    };
    Ok(kinds::browse(conn, kind, &filter, fetch)?
        .into_iter()
        .map(|record| SearchResult::from_record(record, 0.0))
        .collect())
}

/// Search that only needs readable base tables
#[derive(Clone)]
pub struct FallbackSearchManager {
    pool: ConnectionPool,
    builder: QueryBuilder,
    snippet_max_chars: usize,
}

impl FallbackSearchManager {
    pub fn new(pool: ConnectionPool, builder: QueryBuilder, snippet_max_chars: usize) -> Self {
        Self {
            pool,
            builder,
            snippet_max_chars,
        }
    }

    /// Lower-cased search terms of a raw query; no wildcard or OR expansion.
    /// Operands of NOT are left out.
    pub fn terms(&self, query: &str) -> Vec<String> {
        self.parse(query).0
    }

    /// Search terms and NOT operands
    fn parse(&self, query: &str) -> (Vec<String>, Vec<String>) {
        let options = BuildOptions {
            prefix_expansion: false,
            or_expansion: false,
        };
        self.builder
            .build(query, options)
            .map(|built| (built.terms, built.excluded))
            .unwrap_or_default()
    }

    /// Substring search across all kinds
    pub async fn search_all(
        &self,
        query: &str,
        filters: &SearchFilters,
        options: &SearchOptions,
    ) -> Result<SearchResponse> {
        let started = Instant::now();
        let (terms, excluded) = self.parse(query);

        if terms.is_empty() && filters.is_empty() {
            return Ok(SearchResponse::empty(
                query,
                ResultSource::Fallback,
                options.offset,
                options.limit,
            ));
        }

        let mut conn = self.pool.acquire().await?;
        let scan_terms = terms.clone();
        let scan_filters = filters.clone();
        let fetch = options.offset + options.limit;
        let outcome = conn
            .interact(move |conn| -> rusqlite::Result<Vec<SearchResult>> {
                let mut merged = Vec::new();
                for kind in RecordKind::all() {
                    let hits = if scan_terms.is_empty() {
                        browse_kind(conn, kind, &scan_filters, fetch)?
                    } else {
                        scan_kind(conn, kind, &scan_terms, &excluded, &scan_filters)?
                    };
                    merged.extend(hits);
                }
                Ok(merged)
            })
            .await;
        drop(conn);

        let mut merged = match outcome {
            Ok(merged) => merged,
            Err(e) => {
                record_search("fallback", "error", started.elapsed());
                return Err(e);
            }
        };

        sort_results(&mut merged, options.sort, options.direction);
        let total_hits = merged.len();
        let page = paginate(merged, options.offset, options.limit);
        let results = attach_snippets(page, &terms, self.snippet_max_chars);

        let elapsed = started.elapsed();
        record_search("fallback", "success", elapsed);
        debug!(query = %query, total_hits, "Fallback search completed");
        if total_hits == 0 {
            info!(query = %query, "Fallback search found nothing");
        }

        Ok(SearchResponse {
            results,
            total_hits,
            query: query.to_string(),
            source: ResultSource::Fallback,
            cache_hit: false,
            degraded_kinds: Vec::new(),
            search_time_ms: elapsed.as_millis() as u64,
            offset: options.offset,
            limit: options.limit,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Photo, Profile, Publication};

    fn terms(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn photo(title: &str, caption: &str) -> Record {
        Record::Photo(Photo {
            title: title.into(),
            caption: Some(caption.into()),
            ..Default::default()
        })
    }

    #[test]
    fn test_match_score_tiers() {
        assert_eq!(match_score("graduation", "graduation"), Some(EXACT));
        assert_eq!(match_score("graduation day", "graduation"), Some(PREFIX));
        assert_eq!(match_score("spring graduation", "graduation"), Some(WORD_BOUNDARY));
        assert_eq!(match_score("postgraduation", "graduation"), Some(SUBSTRING));
        assert_eq!(match_score("reunion", "graduation"), None);
    }

    #[test]
    fn test_identity_beats_description() {
        let title_hit = photo("Graduation", "Families on the lawn");
        let caption_hit = photo("Lawn", "After graduation the families gathered");

        let a = score_record(&title_hit, &terms(&["graduation"])).unwrap();
        let b = score_record(&caption_hit, &terms(&["graduation"])).unwrap();
        assert!(a > b);
        assert_eq!(a, 100.0);
    }

    #[test]
    fn test_long_fields_penalized() {
        let short = photo("Lawn", "graduation lawn");
        let long = photo("Lawn", &("graduation ".to_string() + &"x ".repeat(150)));
        let a = score_record(&short, &terms(&["lawn"])).unwrap();
        let b = score_record(&long, &terms(&["graduation"])).unwrap();
        assert!(a > b);
    }

    #[test]
    fn test_more_matched_terms_rank_higher() {
        let both = Record::Profile(Profile {
            first_name: "John".into(),
            last_name: "Smith".into(),
            ..Default::default()
        });
        let one = Record::Profile(Profile {
            first_name: "John".into(),
            last_name: "Doe".into(),
            ..Default::default()
        });
        let q = terms(&["john", "smith"]);
        assert!(score_record(&both, &q).unwrap() > score_record(&one, &q).unwrap());
    }

    #[test]
    fn test_scores_stay_in_range() {
        let record = Record::Publication(Publication {
            title: "Yearbook".into(),
            publication_type: "yearbook".into(),
            tags: vec!["yearbook".into()],
            ..Default::default()
        });
        let score = score_record(&record, &terms(&["yearbook"])).unwrap();
        assert!((0.0..=100.0).contains(&score));
    }

    #[test]
    fn test_excluded_terms_match_any_field() {
        let parade = photo("Homecoming Parade", "Band on Main Street");
        assert!(is_excluded(&parade, &terms(&["parade"])));
        assert!(!is_excluded(&parade, &terms(&["choir"])));
        assert!(!is_excluded(&parade, &[]));
    }

    #[test]
    fn test_no_match_is_none() {
        assert!(score_record(&photo("Lawn", "grass"), &terms(&["choir"])).is_none());
        assert!(score_record(&photo("Lawn", "grass"), &[]).is_none());
    }
}
