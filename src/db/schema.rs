//! Table layout for the four record kinds and their FTS5 indexes.
//!
//! Every kind has a base table and an external-content FTS5 table
//! (`content=<base>`, `content_rowid=id`) kept in sync by three triggers.
//! Index lifecycle operations (drop, recreate, rebuild) live here so that the
//! index manager and the schema bootstrap share one definition.

use crate::models::RecordKind;
use rusqlite::Connection;

/// Column layout of one record kind
#[derive(Debug, Clone, Copy)]
pub struct KindSchema {
    pub kind: RecordKind,

    /// Base table columns in the order `read_record` expects them
    pub columns: &'static [&'static str],

    /// Indexed columns; the first one is the title/name column
    pub fts_columns: &'static [&'static str],

    /// bm25 weights, one per indexed column
    pub weights: &'static [f64],

    /// CREATE TABLE body (without the table name)
    table_body: &'static str,
}

const PROFILE: KindSchema = KindSchema {
    kind: RecordKind::Profile,
    columns: &[
        "id",
        "first_name",
        "middle_name",
        "last_name",
        "class_role",
        "grad_year",
        "grad_date",
        "photo_file",
        "bio",
        "tags",
    ],
    fts_columns: &["full_name", "bio", "tags", "class_role"],
    weights: &[10.0, 1.0, 5.0, 3.0],
    table_body: "(
        id INTEGER PRIMARY KEY,
        first_name TEXT NOT NULL,
        middle_name TEXT,
        last_name TEXT NOT NULL,
        full_name TEXT NOT NULL,
        class_role TEXT,
        grad_year INTEGER,
        grad_date TEXT,
        photo_file TEXT,
        bio TEXT,
        tags TEXT
    )",
};

const PUBLICATION: KindSchema = KindSchema {
    kind: RecordKind::Publication,
    columns: &[
        "id",
        "title",
        "publication_type",
        "pub_date",
        "description",
        "thumbnail",
        "tags",
    ],
    fts_columns: &["title", "description", "tags", "publication_type"],
    weights: &[10.0, 1.0, 5.0, 3.0],
    table_body: "(
        id INTEGER PRIMARY KEY,
        title TEXT NOT NULL,
        publication_type TEXT NOT NULL,
        pub_date TEXT,
        description TEXT,
        thumbnail TEXT,
        tags TEXT
    )",
};

const PHOTO: KindSchema = KindSchema {
    kind: RecordKind::Photo,
    columns: &[
        "id",
        "title",
        "caption",
        "collection",
        "decade",
        "date_taken",
        "image_path",
        "tags",
    ],
    fts_columns: &["title", "caption", "tags", "collection"],
    weights: &[10.0, 1.0, 5.0, 3.0],
    table_body: "(
        id INTEGER PRIMARY KEY,
        title TEXT NOT NULL,
        caption TEXT,
        collection TEXT,
        decade TEXT,
        date_taken TEXT,
        image_path TEXT,
        tags TEXT
    )",
};

const STAFF: KindSchema = KindSchema {
    kind: RecordKind::Staff,
    columns: &[
        "id",
        "full_name",
        "role",
        "department",
        "bio",
        "email",
        "photo_file",
        "tags",
    ],
    fts_columns: &["full_name", "bio", "tags", "department"],
    weights: &[10.0, 1.0, 5.0, 3.0],
    table_body: "(
        id INTEGER PRIMARY KEY,
        full_name TEXT NOT NULL,
        role TEXT,
        department TEXT,
        bio TEXT,
        email TEXT,
        photo_file TEXT,
        tags TEXT
    )",
};

impl KindSchema {
    pub fn of(kind: RecordKind) -> &'static KindSchema {
        match kind {
            RecordKind::Profile => &PROFILE,
            RecordKind::Publication => &PUBLICATION,
            RecordKind::Photo => &PHOTO,
            RecordKind::Staff => &STAFF,
        }
    }

    pub fn table(&self) -> &'static str {
        self.kind.table()
    }

    pub fn fts_table(&self) -> &'static str {
        self.kind.fts_table()
    }

    /// Title/name column, used for suggestions
    pub fn title_column(&self) -> &'static str {
        self.fts_columns[0]
    }

    /// `alias.col, alias.col, ...` for SELECT lists
    pub fn select_list(&self, alias: &str) -> String {
        self.columns
            .iter()
            .map(|c| format!("{}.{}", alias, c))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// `bm25(<fts>, w1, w2, ...)`
    pub fn rank_expr(&self) -> String {
        let weights = self
            .weights
            .iter()
            .map(|w| format!("{:.1}", w))
            .collect::<Vec<_>>()
            .join(", ");
        format!("bm25({}, {})", self.fts_table(), weights)
    }

    fn trigger_names(&self) -> [String; 3] {
        let table = self.table();
        [
            format!("{}_ai", table),
            format!("{}_ad", table),
            format!("{}_au", table),
        ]
    }

    fn create_table_sql(&self) -> String {
        format!("CREATE TABLE IF NOT EXISTS {} {};", self.table(), self.table_body)
    }

    fn create_fts_sql(&self) -> String {
        format!(
            "CREATE VIRTUAL TABLE IF NOT EXISTS {fts} USING fts5({cols}, content='{table}', content_rowid='id', tokenize='unicode61 remove_diacritics 2');",
            fts = self.fts_table(),
            cols = self.fts_columns.join(", "),
            table = self.table(),
        )
    }

    fn create_triggers_sql(&self) -> String {
        let fts = self.fts_table();
        let cols = self.fts_columns.join(", ");
        let new_vals = prefixed(self.fts_columns, "new");
        let old_vals = prefixed(self.fts_columns, "old");
        let [ai, ad, au] = self.trigger_names();

        format!(
            "CREATE TRIGGER IF NOT EXISTS {ai} AFTER INSERT ON {table} BEGIN
                INSERT INTO {fts}(rowid, {cols}) VALUES (new.id, {new_vals});
             END;
             CREATE TRIGGER IF NOT EXISTS {ad} AFTER DELETE ON {table} BEGIN
                INSERT INTO {fts}({fts}, rowid, {cols}) VALUES ('delete', old.id, {old_vals});
             END;
             CREATE TRIGGER IF NOT EXISTS {au} AFTER UPDATE ON {table} BEGIN
                INSERT INTO {fts}({fts}, rowid, {cols}) VALUES ('delete', old.id, {old_vals});
                INSERT INTO {fts}(rowid, {cols}) VALUES (new.id, {new_vals});
             END;",
            table = self.table(),
        )
    }
}

fn prefixed(columns: &[&str], prefix: &str) -> String {
    columns
        .iter()
        .map(|c| format!("{}.{}", prefix, c))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Create base tables, FTS tables, triggers and the index metadata table if missing.
pub fn ensure_schema(conn: &Connection) -> rusqlite::Result<()> {
    let mut batch = String::from(
        "CREATE TABLE IF NOT EXISTS index_meta (
            kind TEXT PRIMARY KEY,
            last_rebuild TEXT NOT NULL
        );",
    );
    for kind in RecordKind::all() {
        let schema = KindSchema::of(kind);
        batch.push_str(&schema.create_table_sql());
        batch.push_str(&schema.create_fts_sql());
        batch.push_str(&schema.create_triggers_sql());
    }
    conn.execute_batch(&batch)
}

/// Drop the FTS table and its sync triggers for `kind`
pub fn drop_index(conn: &Connection, kind: RecordKind) -> rusqlite::Result<()> {
    let schema = KindSchema::of(kind);
    let mut batch = String::new();
    for trigger in schema.trigger_names() {
        batch.push_str(&format!("DROP TRIGGER IF EXISTS {};", trigger));
    }
    batch.push_str(&format!("DROP TABLE IF EXISTS {};", schema.fts_table()));
    conn.execute_batch(&batch)
}

/// Drop only the sync triggers, leaving the index in place
pub fn drop_triggers(conn: &Connection, kind: RecordKind) -> rusqlite::Result<()> {
    let schema = KindSchema::of(kind);
    let batch: String = schema
        .trigger_names()
        .iter()
        .map(|t| format!("DROP TRIGGER IF EXISTS {};", t))
        .collect();
    conn.execute_batch(&batch)
}

/// Create the FTS table and triggers for `kind`, then repopulate it from the base table
pub fn create_index(conn: &Connection, kind: RecordKind) -> rusqlite::Result<()> {
    let schema = KindSchema::of(kind);
    conn.execute_batch(&schema.create_fts_sql())?;
    conn.execute_batch(&schema.create_triggers_sql())?;
    rebuild_index(conn, kind)
}

/// Re-read every base row into the FTS index
pub fn rebuild_index(conn: &Connection, kind: RecordKind) -> rusqlite::Result<()> {
    let fts = kind.fts_table();
    conn.execute(
        &format!("INSERT INTO {fts}({fts}) VALUES ('rebuild')", fts = fts),
        [],
    )?;
    Ok(())
}

/// Merge index b-trees into one
pub fn optimize_index(conn: &Connection, kind: RecordKind) -> rusqlite::Result<()> {
    let fts = kind.fts_table();
    conn.execute(
        &format!("INSERT INTO {fts}({fts}) VALUES ('optimize')", fts = fts),
        [],
    )?;
    Ok(())
}

/// FTS5 `integrity-check` of the index structure; errors when the index is
/// corrupt
pub fn check_index(conn: &Connection, kind: RecordKind) -> rusqlite::Result<()> {
    let fts = kind.fts_table();
    conn.execute(
        &format!(
            "INSERT INTO {fts}({fts}, rank) VALUES ('integrity-check', 0)",
            fts = fts
        ),
        [],
    )?;
    Ok(())
}

/// Whether a table or virtual table named `name` exists
pub fn table_exists(conn: &Connection, name: &str) -> rusqlite::Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT count(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [name],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}
