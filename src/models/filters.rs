use crate::models::RecordKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use strum::{Display, EnumString};

/// Inclusive year range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct YearRange {
    pub start: i32,
    pub end: i32,
}

impl YearRange {
    pub fn new(start: i32, end: i32) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, year: i32) -> bool {
        year >= self.start && year <= self.end
    }
}

/// Optional hard predicates applied after the index lookup.
///
/// An absent field imposes no constraint. A present field that a kind has no
/// column for removes that kind from the result set entirely.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SearchFilters {
    /// Graduation year range (profiles)
    #[serde(default)]
    pub year_range: Option<YearRange>,

    /// Publication type equality (publications)
    #[serde(default)]
    pub publication_type: Option<String>,

    /// Department equality (staff)
    #[serde(default)]
    pub department: Option<String>,

    /// Decade substring, e.g. "1990" or "1990s"
    #[serde(default)]
    pub decade: Option<String>,

    /// Collection equality (photos)
    #[serde(default)]
    pub collection: Option<String>,

    /// Role equality (profile class role, staff role)
    #[serde(default)]
    pub role: Option<String>,

    /// Tags, OR-matched
    #[serde(default)]
    pub tags: Option<BTreeSet<String>>,
}

impl SearchFilters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_year_range(mut self, start: i32, end: i32) -> Self {
        self.year_range = Some(YearRange::new(start, end));
        self
    }

    pub fn with_publication_type(mut self, value: impl Into<String>) -> Self {
        self.publication_type = Some(value.into());
        self
    }

    pub fn with_department(mut self, value: impl Into<String>) -> Self {
        self.department = Some(value.into());
        self
    }

    pub fn with_decade(mut self, value: impl Into<String>) -> Self {
        self.decade = Some(value.into());
        self
    }

    pub fn with_collection(mut self, value: impl Into<String>) -> Self {
        self.collection = Some(value.into());
        self
    }

    pub fn with_role(mut self, value: impl Into<String>) -> Self {
        self.role = Some(value.into());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = Some(tags.into_iter().map(Into::into).collect());
        self
    }

    /// True when no field is set
    pub fn is_empty(&self) -> bool {
        self.year_range.is_none()
            && self.publication_type.is_none()
            && self.department.is_none()
            && self.decade.is_none()
            && self.collection.is_none()
            && self.role.is_none()
            && self.tags.as_ref().map_or(true, BTreeSet::is_empty)
    }

    /// Whether every present field has a column on `kind`
    pub fn applies_to(&self, kind: RecordKind) -> bool {
        let supported = |present: bool, kinds: &[RecordKind]| !present || kinds.contains(&kind);

        supported(self.year_range.is_some(), &[RecordKind::Profile])
            && supported(self.publication_type.is_some(), &[RecordKind::Publication])
            && supported(self.department.is_some(), &[RecordKind::Staff])
            && supported(
                self.decade.is_some(),
                &[RecordKind::Profile, RecordKind::Publication, RecordKind::Photo],
            )
            && supported(self.collection.is_some(), &[RecordKind::Photo])
            && supported(self.role.is_some(), &[RecordKind::Profile, RecordKind::Staff])
    }
}

/// Field to sort results by
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SortField {
    #[default]
    Relevance,
    Name,
    Date,
    Year,
}

/// Sort direction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SortDirection {
    Ascending,
    #[default]
    Descending,
}

/// Default number of results
pub const DEFAULT_LIMIT: usize = 50;

/// Hard ceiling on the number of results, whatever the caller asks for
pub const MAX_LIMIT: usize = 1000;

/// Pagination, sorting and degradation options
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SearchOptions {
    #[serde(default = "default_limit")]
    pub limit: usize,

    #[serde(default)]
    pub offset: usize,

    #[serde(default)]
    pub sort: SortField,

    #[serde(default)]
    pub direction: SortDirection,

    /// Allow substring fallback when the ranked path fails
    #[serde(default = "default_allow_fallback")]
    pub allow_fallback: bool,
}

fn default_limit() -> usize {
    DEFAULT_LIMIT
}

fn default_allow_fallback() -> bool {
    true
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            offset: 0,
            sort: SortField::Relevance,
            direction: SortDirection::Descending,
            allow_fallback: true,
        }
    }
}

impl SearchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_sort(mut self, sort: SortField, direction: SortDirection) -> Self {
        self.sort = sort;
        self.direction = direction;
        self
    }

    pub fn without_fallback(mut self) -> Self {
        self.allow_fallback = false;
        self
    }

    /// Copy with the limit clamped to `ceiling`
    pub fn clamped(&self, ceiling: usize) -> Self {
        Self {
            limit: self.limit.min(ceiling),
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_filters() {
        assert!(SearchFilters::new().is_empty());
        assert!(SearchFilters::new().with_tags(Vec::<String>::new()).is_empty());
        assert!(!SearchFilters::new().with_decade("1990").is_empty());
    }

    #[test]
    fn test_year_range_only_applies_to_profiles() {
        let filters = SearchFilters::new().with_year_range(1990, 1999);
        assert!(filters.applies_to(RecordKind::Profile));
        assert!(!filters.applies_to(RecordKind::Publication));
        assert!(!filters.applies_to(RecordKind::Photo));
        assert!(!filters.applies_to(RecordKind::Staff));
    }

    #[test]
    fn test_tags_apply_everywhere() {
        let filters = SearchFilters::new().with_tags(["reunion"]);
        for kind in RecordKind::all() {
            assert!(filters.applies_to(kind));
        }
    }

    #[test]
    fn test_limit_clamped() {
        let options = SearchOptions::new().with_limit(5_000);
        assert_eq!(options.clamped(MAX_LIMIT).limit, MAX_LIMIT);
        assert_eq!(SearchOptions::new().clamped(MAX_LIMIT).limit, DEFAULT_LIMIT);
    }

    #[test]
    fn test_year_range_inclusive() {
        let range = YearRange::new(1990, 1999);
        assert!(range.contains(1990));
        assert!(range.contains(1999));
        assert!(!range.contains(2000));
    }
}
