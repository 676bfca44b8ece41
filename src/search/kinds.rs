//! Per-kind SQL: filter predicates, ranked FTS5 queries, browse scans and
//! substring scans.

use crate::db::rows::read_record;
use crate::db::schema::KindSchema;
use crate::models::{Record, RecordKind, SearchFilters};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};

/// A WHERE fragment over alias `b` and its positional parameters
#[derive(Debug, Clone, Default)]
pub struct FilterClause {
    conditions: Vec<String>,
    params: Vec<Value>,
}

impl FilterClause {
    /// Predicates of `filters` that apply to `kind`.
    ///
    /// Returns `None` when a present filter has no column on `kind`, in which
    /// case the kind yields no rows.
    pub fn for_kind(kind: RecordKind, filters: &SearchFilters) -> Option<Self> {
        if !filters.applies_to(kind) {
            return None;
        }

        let mut clause = FilterClause::default();

        if let Some(range) = filters.year_range {
            clause.push(
                "b.grad_year BETWEEN ? AND ?",
                [Value::from(range.start as i64), Value::from(range.end as i64)],
            );
        }
        if let Some(value) = &filters.publication_type {
            clause.push("lower(b.publication_type) = lower(?)", [Value::from(value.clone())]);
        }
        if let Some(value) = &filters.department {
            clause.push("lower(b.department) = lower(?)", [Value::from(value.clone())]);
        }
        if let Some(value) = &filters.collection {
            clause.push("lower(b.collection) = lower(?)", [Value::from(value.clone())]);
        }
        if let Some(value) = &filters.role {
            let column = match kind {
                RecordKind::Profile => "b.class_role",
                _ => "b.role",
            };
            clause.push(
                format!("lower({}) = lower(?)", column),
                [Value::from(value.clone())],
            );
        }
        if let Some(value) = &filters.decade {
            let stem = decade_stem(value);
            match kind {
                RecordKind::Profile => clause.push(
                    "CAST(b.grad_year AS TEXT) LIKE ? ESCAPE '\\'",
                    [Value::from(format!("{}%", escape_like(&stem)))],
                ),
                RecordKind::Publication => clause.push(
                    "b.pub_date LIKE ? ESCAPE '\\'",
                    [Value::from(format!("%{}%", escape_like(&stem)))],
                ),
                _ => clause.push(
                    "b.decade LIKE ? ESCAPE '\\'",
                    [Value::from(format!("%{}%", escape_like(value.trim())))],
                ),
            }
        }
        if let Some(tags) = filters.tags.as_ref().filter(|t| !t.is_empty()) {
            let any = tags
                .iter()
                .map(|_| {
                    "(',' || lower(replace(coalesce(b.tags, ''), ', ', ',')) || ',') LIKE ? ESCAPE '\\'"
                })
                .collect::<Vec<_>>()
                .join(" OR ");
            clause.push(
                format!("({})", any),
                tags.iter()
                    .map(|t| Value::from(format!("%,{},%", escape_like(&t.trim().to_lowercase())))),
            );
        }

        Some(clause)
    }

    fn push(&mut self, condition: impl Into<String>, params: impl IntoIterator<Item = Value>) {
        self.conditions.push(condition.into());
        self.params.extend(params);
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// `cond AND cond ...`, or `1` when unconstrained
    pub fn sql(&self) -> String {
        if self.conditions.is_empty() {
            "1".to_string()
        } else {
            self.conditions.join(" AND ")
        }
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }
}

/// "1990s" and "1990" both become "199"; anything else is used as-is
fn decade_stem(decade: &str) -> String {
    let digits: String = decade.trim().chars().take_while(char::is_ascii_digit).collect();
    if digits.len() == 4 {
        digits[..3].to_string()
    } else {
        decade.trim().to_string()
    }
}

/// Escape `%`, `_` and `\` for a LIKE pattern using `ESCAPE '\'`
pub fn escape_like(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Ranked FTS5 lookup for one kind. Returns records with `-bm25` scores,
/// best first.
pub fn ranked(
    conn: &Connection,
    kind: RecordKind,
    expression: &str,
    filter: &FilterClause,
    fetch: usize,
) -> rusqlite::Result<Vec<(Record, f64)>> {
    let schema = KindSchema::of(kind);
    let fts = schema.fts_table();
    let sql = format!(
        "SELECT -{rank} AS score, {cols}
         FROM {fts} JOIN {table} b ON b.id = {fts}.rowid
         WHERE {fts} MATCH ? AND {filter}
         ORDER BY {rank}, b.id
         LIMIT {fetch}",
        rank = schema.rank_expr(),
        cols = schema.select_list("b"),
        fts = fts,
        table = schema.table(),
        filter = filter.sql(),
        fetch = fetch,
    );

    let params = std::iter::once(Value::from(expression.to_string())).chain(filter.params().iter().cloned());
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(params), |row| {
        let score: f64 = row.get(0)?;
        Ok((read_record(kind, row, 1)?, score))
    })?;
    rows.collect()
}

/// Filter-only scan of the base table, ordered by title
pub fn browse(
    conn: &Connection,
    kind: RecordKind,
    filter: &FilterClause,
    fetch: usize,
) -> rusqlite::Result<Vec<Record>> {
    let schema = KindSchema::of(kind);
    let sql = format!(
        "SELECT {cols} FROM {table} b WHERE {filter} ORDER BY lower(b.{title}), b.id LIMIT {fetch}",
        cols = schema.select_list("b"),
        table = schema.table(),
        filter = filter.sql(),
        title = schema.title_column(),
        fetch = fetch,
    );

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(filter.params().iter()), |row| {
        read_record(kind, row, 0)
    })?;
    rows.collect()
}

/// Base-table rows where any searchable column contains any of `terms`.
/// Does not touch the FTS index. Every matching row is returned; ranking
/// and truncation happen after scoring.
pub fn substring_scan(
    conn: &Connection,
    kind: RecordKind,
    terms: &[String],
    filter: &FilterClause,
) -> rusqlite::Result<Vec<Record>> {
    if terms.is_empty() {
        return Ok(Vec::new());
    }

    let schema = KindSchema::of(kind);
    let per_term = schema
        .fts_columns
        .iter()
        .map(|col| format!("b.{} LIKE ? ESCAPE '\\'", col))
        .collect::<Vec<_>>()
        .join(" OR ");
    let any_term = terms
        .iter()
        .map(|_| format!("({})", per_term))
        .collect::<Vec<_>>()
        .join(" OR ");

    let sql = format!(
        "SELECT {cols} FROM {table} b WHERE ({any_term}) AND {filter}",
        cols = schema.select_list("b"),
        table = schema.table(),
        any_term = any_term,
        filter = filter.sql(),
    );

    let mut params: Vec<Value> = Vec::new();
    for term in terms {
        let pattern = format!("%{}%", escape_like(term));
        params.extend(schema.fts_columns.iter().map(|_| Value::from(pattern.clone())));
    }
    params.extend(filter.params().iter().cloned());

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(params), |row| read_record(kind, row, 0))?;
    rows.collect()
}

/// Title/name values matching a prefix expression on the title column,
/// best match first, deduplicated case-insensitively
pub fn title_suggestions(
    conn: &Connection,
    kind: RecordKind,
    words: &[String],
    limit: usize,
) -> rusqlite::Result<Vec<String>> {
    let Some((last, rest)) = words.split_last() else {
        return Ok(Vec::new());
    };

    let schema = KindSchema::of(kind);
    let mut expr: Vec<String> = rest.iter().map(|w| quote_term(w)).collect();
    expr.push(format!("{}*", quote_term(last)));
    let expression = format!("{} : ({})", schema.title_column(), expr.join(" "));

    let sql = format!(
        "SELECT b.{title} FROM {fts} JOIN {table} b ON b.id = {fts}.rowid
         WHERE {fts} MATCH ?1 ORDER BY {rank} LIMIT ?2",
        title = schema.title_column(),
        fts = schema.fts_table(),
        table = schema.table(),
        rank = schema.rank_expr(),
    );

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        rusqlite::params![expression, (limit.saturating_mul(4)) as i64],
        |row| row.get::<_, String>(0),
    )?;

    let mut seen = std::collections::HashSet::new();
    let mut titles = Vec::new();
    for title in rows {
        let title = title?;
        if seen.insert(title.to_lowercase()) {
            titles.push(title);
        }
        if titles.len() >= limit {
            break;
        }
    }
    Ok(titles)
}

/// FTS5 string literal
fn quote_term(word: &str) -> String {
    format!("\"{}\"", word.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::rows::write_record;
    use crate::db::schema::ensure_schema;
    use crate::models::{Photo, Profile};

    fn seeded() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        ensure_schema(&conn).unwrap();
        for (first, year, tags) in [
            ("Ada", 1992, vec!["debate"]),
            ("Ben", 1995, vec!["football", "band"]),
            ("Cleo", 2004, vec!["band"]),
        ] {
            write_record(
                &conn,
                &Record::Profile(Profile {
                    first_name: first.into(),
                    last_name: "Graduate".into(),
                    grad_year: Some(year),
                    tags: tags.into_iter().map(String::from).collect(),
                    ..Default::default()
                }),
            )
            .unwrap();
        }
        write_record(
            &conn,
            &Record::Photo(Photo {
                title: "Graduation 1995".into(),
                decade: Some("1990s".into()),
                ..Default::default()
            }),
        )
        .unwrap();
        conn
    }

    #[test]
    fn test_filter_not_applicable_yields_none() {
        let filters = SearchFilters::new().with_department("Science");
        assert!(FilterClause::for_kind(RecordKind::Profile, &filters).is_none());
        assert!(FilterClause::for_kind(RecordKind::Staff, &filters).is_some());
    }

    #[test]
    fn test_browse_year_range() {
        let conn = seeded();
        let filters = SearchFilters::new().with_year_range(1990, 1999);
        let clause = FilterClause::for_kind(RecordKind::Profile, &filters).unwrap();
        let rows = browse(&conn, RecordKind::Profile, &clause, 50).unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_tags_are_or_matched() {
        let conn = seeded();
        let filters = SearchFilters::new().with_tags(["debate", "football"]);
        let clause = FilterClause::for_kind(RecordKind::Profile, &filters).unwrap();
        let rows = browse(&conn, RecordKind::Profile, &clause, 50).unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_decade_filter() {
        let conn = seeded();
        let filters = SearchFilters::new().with_decade("1990s");
        let profiles = browse(
            &conn,
            RecordKind::Profile,
            &FilterClause::for_kind(RecordKind::Profile, &filters).unwrap(),
            50,
        )
        .unwrap();
        assert_eq!(profiles.len(), 2);

        let photos = browse(
            &conn,
            RecordKind::Photo,
            &FilterClause::for_kind(RecordKind::Photo, &filters).unwrap(),
            50,
        )
        .unwrap();
        assert_eq!(photos.len(), 1);
    }

    #[test]
    fn test_ranked_scores_are_non_negative() {
        let conn = seeded();
        let rows = ranked(
            &conn,
            RecordKind::Profile,
            "graduate*",
            &FilterClause::default(),
            10,
        )
        .unwrap();
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|(_, score)| *score >= 0.0));
    }

    #[test]
    fn test_substring_scan_ignores_index() {
        let conn = seeded();
        crate::db::schema::drop_index(&conn, RecordKind::Photo).unwrap();
        let rows = substring_scan(
            &conn,
            RecordKind::Photo,
            &["graduation".to_string()],
            &FilterClause::default(),
        )
        .unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn test_title_suggestions() {
        let conn = seeded();
        let words = vec!["gradu".to_string()];
        let titles = title_suggestions(&conn, RecordKind::Photo, &words, 5).unwrap();
        assert_eq!(titles, vec!["Graduation 1995"]);
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("100%_a\\b"), "100\\%\\_a\\\\b");
    }
}
