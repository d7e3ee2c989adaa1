use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::data_types::{CommentRecord, LikeOutcome, LikeTarget, MealRecord, ReviewRecord};
use crate::errors::DbError;

fn open_db(db: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db)?;
    // concurrent writers queue on the write lock instead of erroring
    conn.busy_timeout(Duration::from_secs(5))?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    Ok(conn)
}

fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn check_or_create_db_tables(db: &str) -> rusqlite::Result<()> {
    let conn = open_db(db)?;

    conn.prepare(
        "create table if not exists meals (
            meal_id text not null unique primary key,
            fields_json text not null,
            image_url text not null,
            created_by text not null,
            like_count integer not null default 0,
            archived integer not null default 0,
            created_at text not null
        )",
    )?
    .execute([])?;

    conn.prepare(
        "create table if not exists comments (
            comment_id text not null unique primary key,
            meal_id text not null,
            user_id text not null,
            text text not null,
            like_count integer not null default 0,
            created_at text not null,
            foreign key (meal_id) references meals(meal_id)
        )",
    )?
    .execute([])?;

    conn.prepare(
        "create table if not exists reviews (
            review_id text not null unique primary key,
            user_id text not null,
            comment text not null,
            like_count integer not null default 0,
            created_at text not null
        )",
    )?
    .execute([])?;

    conn.prepare(
        "create table if not exists evaluations (
            evaluation_id text not null unique primary key,
            user_id text not null,
            meal_id text not null,
            food_amounts_json text not null,
            created_at text not null
        )",
    )?
    .execute([])?;

    // liker sets for all collections
    conn.prepare(
        "create table if not exists likes (
            collection text not null,
            record_id text not null,
            user_id text not null,
            primary key (collection, record_id, user_id)
        )",
    )?
    .execute([])?;

    Ok(())
}

fn liked_by(conn: &Connection, collection: &str, record_id: &str) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare_cached(
        "SELECT user_id FROM likes WHERE collection = ?1 AND record_id = ?2 ORDER BY user_id",
    )?;
    let rows = stmt.query_map(params![collection, record_id], |row| row.get(0))?;
    rows.collect()
}

//// meals

pub fn insert_meal(
    db: &str,
    fields: &Map<String, Value>,
    image_url: &str,
    created_by: &str,
) -> Result<String, DbError> {
    let conn = open_db(db)?;
    let meal_id = Uuid::new_v4().to_string();

    let mut stmt = conn.prepare_cached(
        "INSERT INTO meals (meal_id, fields_json, image_url, created_by, like_count, archived, created_at)
            VALUES (?1, ?2, ?3, ?4, 0, 0, ?5)",
    )?;
    stmt.execute(params![
        meal_id,
        serde_json::to_string(fields)?,
        image_url,
        created_by,
        now_timestamp()
    ])?;

    Ok(meal_id)
}

struct MealRow {
    meal_id: String,
    fields_json: String,
    image_url: String,
    created_by: String,
    like_count: i64,
    archived: bool,
    created_at: String,
}

fn meal_from_row(conn: &Connection, row: MealRow) -> Result<MealRecord, DbError> {
    let fields: Map<String, Value> = serde_json::from_str(&row.fields_json)?;
    let liked_by = liked_by(conn, "meals", &row.meal_id)?;

    Ok(MealRecord {
        id: row.meal_id,
        fields,
        image_url: row.image_url,
        created_by: row.created_by,
        like_count: row.like_count,
        liked_by,
        is_archived: row.archived,
        created_at: row.created_at,
    })
}

pub fn get_meals(db: &str) -> Result<Vec<MealRecord>, DbError> {
    let conn = open_db(db)?;
    let mut stmt = conn.prepare_cached(
        "SELECT meal_id, fields_json, image_url, created_by, like_count, archived, created_at
            FROM meals ORDER BY created_at DESC, rowid DESC",
    )?;

    let rows: Vec<MealRow> = stmt
        .query_map([], |row| {
            Ok(MealRow {
                meal_id: row.get(0)?,
                fields_json: row.get(1)?,
                image_url: row.get(2)?,
                created_by: row.get(3)?,
                like_count: row.get(4)?,
                archived: row.get(5)?,
                created_at: row.get(6)?,
            })
        })?
        .collect::<rusqlite::Result<_>>()?;

    let mut meals = Vec::with_capacity(rows.len());
    for row in rows {
        meals.push(meal_from_row(&conn, row)?);
    }

    Ok(meals)
}

pub fn get_meal(db: &str, meal_id: &str) -> Result<MealRecord, DbError> {
    let conn = open_db(db)?;
    let mut stmt = conn.prepare_cached(
        "SELECT meal_id, fields_json, image_url, created_by, like_count, archived, created_at
            FROM meals WHERE meal_id = ?1",
    )?;

    let row = stmt
        .query_row(params![meal_id], |row| {
            Ok(MealRow {
                meal_id: row.get(0)?,
                fields_json: row.get(1)?,
                image_url: row.get(2)?,
                created_by: row.get(3)?,
                like_count: row.get(4)?,
                archived: row.get(5)?,
                created_at: row.get(6)?,
            })
        })
        .optional()?
        .ok_or(DbError::NotFound)?;

    meal_from_row(&conn, row)
}

fn meal_exists(conn: &Connection, meal_id: &str) -> rusqlite::Result<bool> {
    let mut stmt = conn.prepare_cached("SELECT EXISTS(SELECT 1 FROM meals WHERE meal_id = ?1)")?;
    stmt.query_row(params![meal_id], |row| row.get(0))
}

//// comments

pub fn insert_comment(
    db: &str,
    meal_id: &str,
    user_id: &str,
    text: &str,
) -> Result<String, DbError> {
    let mut conn = open_db(db)?;
    let tx = conn.transaction()?;

    if !meal_exists(&tx, meal_id)? {
        return Err(DbError::NotFound);
    }

    let comment_id = Uuid::new_v4().to_string();
    tx.execute(
        "INSERT INTO comments (comment_id, meal_id, user_id, text, like_count, created_at)
            VALUES (?1, ?2, ?3, ?4, 0, ?5)",
        params![comment_id, meal_id, user_id, text, now_timestamp()],
    )?;
    tx.commit()?;

    Ok(comment_id)
}

pub fn get_comments(db: &str, meal_id: &str) -> Result<Vec<CommentRecord>, DbError> {
    let conn = open_db(db)?;

    if !meal_exists(&conn, meal_id)? {
        return Err(DbError::NotFound);
    }

    let mut stmt = conn.prepare_cached(
        "SELECT comment_id, user_id, text, like_count, created_at
            FROM comments WHERE meal_id = ?1 ORDER BY created_at DESC, rowid DESC",
    )?;

    let rows: Vec<(String, String, String, i64, String)> = stmt
        .query_map(params![meal_id], |row| {
            Ok((
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
            ))
        })?
        .collect::<rusqlite::Result<_>>()?;

    let collection = format!("meals/{meal_id}/comments");
    let mut comments = Vec::with_capacity(rows.len());
    for (comment_id, user_id, text, like_count, created_at) in rows {
        let liked_by = liked_by(&conn, &collection, &comment_id)?;
        comments.push(CommentRecord {
            id: comment_id,
            user_id,
            text,
            like_count,
            liked_by,
            created_at,
        });
    }

    Ok(comments)
}

//// reviews

pub fn insert_review(db: &str, user_id: &str, comment: &str) -> Result<String, DbError> {
    let conn = open_db(db)?;
    let review_id = Uuid::new_v4().to_string();

    let mut stmt = conn.prepare_cached(
        "INSERT INTO reviews (review_id, user_id, comment, like_count, created_at)
            VALUES (?1, ?2, ?3, 0, ?4)",
    )?;
    stmt.execute(params![review_id, user_id, comment, now_timestamp()])?;

    Ok(review_id)
}

pub fn get_reviews(db: &str) -> Result<Vec<ReviewRecord>, DbError> {
    let conn = open_db(db)?;
    let mut stmt = conn.prepare_cached(
        "SELECT review_id, user_id, comment, like_count, created_at
            FROM reviews ORDER BY created_at DESC, rowid DESC",
    )?;

    let rows: Vec<(String, String, String, i64, String)> = stmt
        .query_map([], |row| {
            Ok((
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
            ))
        })?
        .collect::<rusqlite::Result<_>>()?;

    let mut reviews = Vec::with_capacity(rows.len());
    for (review_id, user_id, comment, like_count, created_at) in rows {
        let liked_by = liked_by(&conn, "reviews", &review_id)?;
        reviews.push(ReviewRecord {
            id: review_id,
            user_id,
            comment,
            like_count,
            liked_by,
            created_at,
        });
    }

    Ok(reviews)
}

pub fn delete_review(db: &str, review_id: &str) -> Result<(), DbError> {
    let mut conn = open_db(db)?;
    let tx = conn.transaction()?;

    let deleted = tx.execute("DELETE FROM reviews WHERE review_id = ?1", params![review_id])?;
    if deleted == 0 {
        return Err(DbError::NotFound);
    }
    tx.execute(
        "DELETE FROM likes WHERE collection = 'reviews' AND record_id = ?1",
        params![review_id],
    )?;
    tx.commit()?;

    Ok(())
}

//// evaluations

pub fn insert_evaluation(
    db: &str,
    user_id: &str,
    meal_id: &str,
    food_amounts: &BTreeMap<String, i64>,
) -> Result<String, DbError> {
    let conn = open_db(db)?;
    let evaluation_id = Uuid::new_v4().to_string();

    let mut stmt = conn.prepare_cached(
        "INSERT INTO evaluations (evaluation_id, user_id, meal_id, food_amounts_json, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;
    stmt.execute(params![
        evaluation_id,
        user_id,
        meal_id,
        serde_json::to_string(food_amounts)?,
        now_timestamp()
    ])?;

    Ok(evaluation_id)
}

//// like toggle

fn read_like_count(tx: &Transaction, target: &LikeTarget) -> rusqlite::Result<Option<i64>> {
    match target {
        LikeTarget::Meal(meal_id) => tx
            .query_row(
                "SELECT like_count FROM meals WHERE meal_id = ?1",
                params![meal_id],
                |row| row.get(0),
            )
            .optional(),
        LikeTarget::Review(review_id) => tx
            .query_row(
                "SELECT like_count FROM reviews WHERE review_id = ?1",
                params![review_id],
                |row| row.get(0),
            )
            .optional(),
        LikeTarget::Comment {
            meal_id,
            comment_id,
        } => tx
            .query_row(
                "SELECT like_count FROM comments WHERE comment_id = ?1 AND meal_id = ?2",
                params![comment_id, meal_id],
                |row| row.get(0),
            )
            .optional(),
    }
}

fn bump_like_count(tx: &Transaction, target: &LikeTarget, delta: i64) -> rusqlite::Result<()> {
    match target {
        LikeTarget::Meal(meal_id) => tx.execute(
            "UPDATE meals SET like_count = like_count + ?2 WHERE meal_id = ?1",
            params![meal_id, delta],
        )?,
        LikeTarget::Review(review_id) => tx.execute(
            "UPDATE reviews SET like_count = like_count + ?2 WHERE review_id = ?1",
            params![review_id, delta],
        )?,
        LikeTarget::Comment { comment_id, .. } => tx.execute(
            "UPDATE comments SET like_count = like_count + ?2 WHERE comment_id = ?1",
            params![comment_id, delta],
        )?,
    };
    Ok(())
}

/// Invert the caller's membership in the target's liker set and adjust the
/// like count to match, all inside one IMMEDIATE transaction. The count is
/// read and written under the same write lock, so interleaved toggles cannot
/// lose updates and `like_count` always equals the liker-set size.
pub fn toggle_like(db: &str, target: &LikeTarget, user_id: &str) -> Result<LikeOutcome, DbError> {
    let mut conn = open_db(db)?;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let Some(like_count) = read_like_count(&tx, target)? else {
        return Err(DbError::NotFound);
    };

    let collection = target.collection();
    let already_liked: bool = tx.query_row(
        "SELECT EXISTS(SELECT 1 FROM likes WHERE collection = ?1 AND record_id = ?2 AND user_id = ?3)",
        params![collection, target.record_id(), user_id],
        |row| row.get(0),
    )?;

    let (liked, delta) = if already_liked {
        tx.execute(
            "DELETE FROM likes WHERE collection = ?1 AND record_id = ?2 AND user_id = ?3",
            params![collection, target.record_id(), user_id],
        )?;
        (false, -1)
    } else {
        tx.execute(
            "INSERT INTO likes (collection, record_id, user_id) VALUES (?1, ?2, ?3)",
            params![collection, target.record_id(), user_id],
        )?;
        (true, 1)
    };

    bump_like_count(&tx, target, delta)?;
    tx.commit()?;

    Ok(LikeOutcome {
        liked,
        like_count: like_count + delta,
    })
}

//// archival

/// Batch-archive every unarchived meal created at or before `cutoff`.
/// Returns the number of meals archived. Re-running is a no-op because the
/// filter excludes already-archived rows.
pub fn archive_old_meals(db: &str, cutoff: DateTime<Utc>) -> Result<usize, DbError> {
    let conn = open_db(db)?;
    let mut stmt = conn.prepare_cached(
        "UPDATE meals SET archived = 1 WHERE archived = 0 AND created_at <= ?1",
    )?;
    let archived = stmt.execute(params![cutoff.to_rfc3339_opts(SecondsFormat::Micros, true)])?;

    Ok(archived)
}
