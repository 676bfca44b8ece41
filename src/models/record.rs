use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoEnumIterator};

/// The four record categories held by the archive
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RecordKind {
    Profile,
    Publication,
    Photo,
    Staff,
}

impl RecordKind {
    /// All kinds in their canonical order
    pub fn all() -> Vec<RecordKind> {
        RecordKind::iter().collect()
    }

    /// Base table holding the records of this kind
    pub fn table(&self) -> &'static str {
        match self {
            RecordKind::Profile => "profiles",
            RecordKind::Publication => "publications",
            RecordKind::Photo => "photos",
            RecordKind::Staff => "staff",
        }
    }

    /// FTS5 table indexing the records of this kind
    pub fn fts_table(&self) -> &'static str {
        match self {
            RecordKind::Profile => "profiles_fts",
            RecordKind::Publication => "publications_fts",
            RecordKind::Photo => "photos_fts",
            RecordKind::Staff => "staff_fts",
        }
    }
}

/// An alumni profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Profile {
    /// Row identifier; 0 asks the store to assign one
    #[serde(default)]
    pub id: i64,
    pub first_name: String,
    #[serde(default)]
    pub middle_name: Option<String>,
    pub last_name: String,
    #[serde(default)]
    pub class_role: Option<String>,
    #[serde(default)]
    pub grad_year: Option<i32>,
    #[serde(default)]
    pub grad_date: Option<String>,
    #[serde(default)]
    pub photo_file: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Profile {
    /// First, middle and last name joined with single spaces
    pub fn full_name(&self) -> String {
        [
            Some(self.first_name.as_str()),
            self.middle_name.as_deref(),
            Some(self.last_name.as_str()),
        ]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
    }
}

/// A yearbook, newspaper, magazine or similar publication
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Publication {
    #[serde(default)]
    pub id: i64,
    pub title: String,
    pub publication_type: String,
    #[serde(default)]
    pub pub_date: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// An archived photograph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Photo {
    #[serde(default)]
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub collection: Option<String>,
    /// Free-form decade label such as "1990s"
    #[serde(default)]
    pub decade: Option<String>,
    #[serde(default)]
    pub date_taken: Option<String>,
    #[serde(default)]
    pub image_path: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// A staff directory entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Staff {
    #[serde(default)]
    pub id: i64,
    pub full_name: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub photo_file: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// A typed record of any kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Record {
    Profile(Profile),
    Publication(Publication),
    Photo(Photo),
    Staff(Staff),
}

impl Record {
    pub fn kind(&self) -> RecordKind {
        match self {
            Record::Profile(_) => RecordKind::Profile,
            Record::Publication(_) => RecordKind::Publication,
            Record::Photo(_) => RecordKind::Photo,
            Record::Staff(_) => RecordKind::Staff,
        }
    }

    pub fn row_id(&self) -> i64 {
        match self {
            Record::Profile(p) => p.id,
            Record::Publication(p) => p.id,
            Record::Photo(p) => p.id,
            Record::Staff(s) => s.id,
        }
    }

    /// Stable identifier across kinds, e.g. `profile:42`
    pub fn stable_id(&self) -> String {
        format!("{}:{}", self.kind(), self.row_id())
    }

    /// Display title: person name or publication/photo title
    pub fn title(&self) -> String {
        match self {
            Record::Profile(p) => p.full_name(),
            Record::Publication(p) => p.title.clone(),
            Record::Photo(p) => p.title.clone(),
            Record::Staff(s) => s.full_name.clone(),
        }
    }

    pub fn subtitle(&self) -> Option<String> {
        match self {
            Record::Profile(p) => match (&p.class_role, p.grad_year) {
                (Some(role), Some(year)) => Some(format!("{} · Class of {}", role, year)),
                (None, Some(year)) => Some(format!("Class of {}", year)),
                (Some(role), None) => Some(role.clone()),
                (None, None) => None,
            },
            Record::Publication(p) => Some(match &p.pub_date {
                Some(date) => format!("{} · {}", p.publication_type, date),
                None => p.publication_type.clone(),
            }),
            Record::Photo(p) => p.collection.clone().or_else(|| p.decade.clone()),
            Record::Staff(s) => match (&s.role, &s.department) {
                (Some(role), Some(dept)) => Some(format!("{}, {}", role, dept)),
                (role, dept) => role.clone().or_else(|| dept.clone()),
            },
        }
    }

    pub fn thumbnail(&self) -> Option<String> {
        match self {
            Record::Profile(p) => p.photo_file.clone(),
            Record::Publication(p) => p.thumbnail.clone(),
            Record::Photo(p) => p.image_path.clone(),
            Record::Staff(s) => s.photo_file.clone(),
        }
    }

    pub fn tags(&self) -> &[String] {
        match self {
            Record::Profile(p) => &p.tags,
            Record::Publication(p) => &p.tags,
            Record::Photo(p) => &p.tags,
            Record::Staff(s) => &s.tags,
        }
    }

    /// Year used for year sorting. Publications and photos derive it from their dates.
    pub fn year(&self) -> Option<i32> {
        match self {
            Record::Profile(p) => p.grad_year,
            Record::Publication(p) => p.pub_date.as_deref().and_then(leading_year),
            Record::Photo(p) => p
                .date_taken
                .as_deref()
                .and_then(leading_year)
                .or_else(|| p.decade.as_deref().and_then(leading_year)),
            Record::Staff(_) => None,
        }
    }

    /// Date string used for date sorting
    pub fn date(&self) -> Option<&str> {
        match self {
            Record::Profile(p) => p.grad_date.as_deref(),
            Record::Publication(p) => p.pub_date.as_deref(),
            Record::Photo(p) => p.date_taken.as_deref(),
            Record::Staff(_) => None,
        }
    }

    /// Longest free-text field, used as the snippet source
    pub fn descriptive_text(&self) -> Option<&str> {
        match self {
            Record::Profile(p) => p.bio.as_deref(),
            Record::Publication(p) => p.description.as_deref(),
            Record::Photo(p) => p.caption.as_deref(),
            Record::Staff(s) => s.bio.as_deref(),
        }
    }

    /// Kind-specific metadata exposed to the kiosk shell
    pub fn metadata(&self) -> BTreeMap<String, Value> {
        let mut meta = BTreeMap::new();
        let mut put = |key: &str, value: Option<Value>| {
            if let Some(value) = value {
                meta.insert(key.to_string(), value);
            }
        };

        match self {
            Record::Profile(p) => {
                put("year", p.grad_year.map(Value::from));
                put("grad_date", p.grad_date.clone().map(Value::from));
                put("role", p.class_role.clone().map(Value::from));
                put("decade", p.grad_year.map(|y| Value::from(format!("{}s", y - y % 10))));
            }
            Record::Publication(p) => {
                put("publication_type", Some(Value::from(p.publication_type.clone())));
                put("date", p.pub_date.clone().map(Value::from));
                put("year", self.year().map(Value::from));
            }
            Record::Photo(p) => {
                put("collection", p.collection.clone().map(Value::from));
                put("decade", p.decade.clone().map(Value::from));
                put("date", p.date_taken.clone().map(Value::from));
            }
            Record::Staff(s) => {
                put("department", s.department.clone().map(Value::from));
                put("role", s.role.clone().map(Value::from));
                put("email", s.email.clone().map(Value::from));
            }
        }

        let tags = self.tags();
        if !tags.is_empty() {
            meta.insert(
                "tags".to_string(),
                Value::from(tags.iter().cloned().collect::<Vec<_>>()),
            );
        }
        meta
    }
}

/// First four-digit run in a date-ish string ("Spring 1994", "1994-05-01", "1990s")
fn leading_year(text: &str) -> Option<i32> {
    let bytes = text.as_bytes();
    let mut i = 0;
    while i + 4 <= bytes.len() {
        if bytes[i..i + 4].iter().all(u8::is_ascii_digit)
            && (i + 4 == bytes.len() || !bytes[i + 4].is_ascii_digit())
            && (i == 0 || !bytes[i - 1].is_ascii_digit())
        {
            return text[i..i + 4].parse().ok();
        }
        i += 1;
    }
    None
}

/// Join tags for storage in a single TEXT column
pub(crate) fn join_tags(tags: &[String]) -> String {
    tags.iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Split a stored tag column back into tags
pub(crate) fn split_tags(raw: Option<String>) -> Vec<String> {
    raw.map(|raw| {
        raw.split(',')
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect()
    })
    .unwrap_or_default()
}
