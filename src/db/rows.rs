//! Mapping between SQLite rows and typed records.
//!
//! Rows are read positionally in the order of [`KindSchema::columns`], starting
//! at `offset` so that queries can put computed columns (rank) in front.

use crate::db::schema::KindSchema;
use crate::models::record::{join_tags, split_tags};
use crate::models::{Photo, Profile, Publication, Record, RecordKind, Staff};
use rusqlite::{params, Connection, Row};

/// Read a typed record of `kind` from `row`
pub fn read_record(kind: RecordKind, row: &Row<'_>, offset: usize) -> rusqlite::Result<Record> {
    let col = |i: usize| offset + i;

    Ok(match kind {
        RecordKind::Profile => Record::Profile(Profile {
            id: row.get(col(0))?,
            first_name: row.get(col(1))?,
            middle_name: row.get(col(2))?,
            last_name: row.get(col(3))?,
            class_role: row.get(col(4))?,
            grad_year: row.get(col(5))?,
            grad_date: row.get(col(6))?,
            photo_file: row.get(col(7))?,
            bio: row.get(col(8))?,
            tags: split_tags(row.get(col(9))?),
        }),
        RecordKind::Publication => Record::Publication(Publication {
            id: row.get(col(0))?,
            title: row.get(col(1))?,
            publication_type: row.get(col(2))?,
            pub_date: row.get(col(3))?,
            description: row.get(col(4))?,
            thumbnail: row.get(col(5))?,
            tags: split_tags(row.get(col(6))?),
        }),
        RecordKind::Photo => Record::Photo(Photo {
            id: row.get(col(0))?,
            title: row.get(col(1))?,
            caption: row.get(col(2))?,
            collection: row.get(col(3))?,
            decade: row.get(col(4))?,
            date_taken: row.get(col(5))?,
            image_path: row.get(col(6))?,
            tags: split_tags(row.get(col(7))?),
        }),
        RecordKind::Staff => Record::Staff(Staff {
            id: row.get(col(0))?,
            full_name: row.get(col(1))?,
            role: row.get(col(2))?,
            department: row.get(col(3))?,
            bio: row.get(col(4))?,
            email: row.get(col(5))?,
            photo_file: row.get(col(6))?,
            tags: split_tags(row.get(col(7))?),
        }),
    })
}

/// Insert or update a record; returns its row id.
///
/// Records with `id <= 0` are inserted with a fresh id.
pub fn write_record(conn: &Connection, record: &Record) -> rusqlite::Result<i64> {
    let id = (record.row_id() > 0).then_some(record.row_id());

    match record {
        Record::Profile(p) => conn.execute(
            "INSERT INTO profiles (id, first_name, middle_name, last_name, full_name, class_role, grad_year, grad_date, photo_file, bio, tags)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT(id) DO UPDATE SET
                first_name = excluded.first_name,
                middle_name = excluded.middle_name,
                last_name = excluded.last_name,
                full_name = excluded.full_name,
                class_role = excluded.class_role,
                grad_year = excluded.grad_year,
                grad_date = excluded.grad_date,
                photo_file = excluded.photo_file,
                bio = excluded.bio,
                tags = excluded.tags",
            params![
                id,
                p.first_name,
                p.middle_name,
                p.last_name,
                p.full_name(),
                p.class_role,
                p.grad_year,
                p.grad_date,
                p.photo_file,
                p.bio,
                join_tags(&p.tags),
            ],
        )?,
        Record::Publication(p) => conn.execute(
            "INSERT INTO publications (id, title, publication_type, pub_date, description, thumbnail, tags)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                publication_type = excluded.publication_type,
                pub_date = excluded.pub_date,
                description = excluded.description,
                thumbnail = excluded.thumbnail,
                tags = excluded.tags",
            params![
                id,
                p.title,
                p.publication_type,
                p.pub_date,
                p.description,
                p.thumbnail,
                join_tags(&p.tags),
            ],
        )?,
        Record::Photo(p) => conn.execute(
            "INSERT INTO photos (id, title, caption, collection, decade, date_taken, image_path, tags)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                caption = excluded.caption,
                collection = excluded.collection,
                decade = excluded.decade,
                date_taken = excluded.date_taken,
                image_path = excluded.image_path,
                tags = excluded.tags",
            params![
                id,
                p.title,
                p.caption,
                p.collection,
                p.decade,
                p.date_taken,
                p.image_path,
                join_tags(&p.tags),
            ],
        )?,
        Record::Staff(s) => conn.execute(
            "INSERT INTO staff (id, full_name, role, department, bio, email, photo_file, tags)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(id) DO UPDATE SET
                full_name = excluded.full_name,
                role = excluded.role,
                department = excluded.department,
                bio = excluded.bio,
                email = excluded.email,
                photo_file = excluded.photo_file,
                tags = excluded.tags",
            params![
                id,
                s.full_name,
                s.role,
                s.department,
                s.bio,
                s.email,
                s.photo_file,
                join_tags(&s.tags),
            ],
        )?,
    };

    Ok(id.unwrap_or_else(|| conn.last_insert_rowid()))
}

/// Load one record by row id
pub fn load_record(conn: &Connection, kind: RecordKind, id: i64) -> rusqlite::Result<Option<Record>> {
    let schema = KindSchema::of(kind);
    let sql = format!(
        "SELECT {} FROM {} b WHERE b.id = ?1",
        schema.select_list("b"),
        schema.table()
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([id])?;
    match rows.next()? {
        Some(row) => Ok(Some(read_record(kind, row, 0)?)),
        None => Ok(None),
    }
}
