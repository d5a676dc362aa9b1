//! Integration tests for schema-driven queries against SQLite.
//!
//! Covers the full user lifecycle: insert, filter, LIKE, update of the
//! primary key, lookups by key, ordering, and datetime round-trips.

use chrono::{Duration as ChronoDuration, Local, NaiveDateTime};
use minorm::config::PoolConfig;
use minorm::db::ConnectionPool;
use minorm::error::DbError;
use minorm::models::{Record, Value, truncate_to_seconds};
use minorm::schema::{EntitySchema, FieldDescriptor};
use tempfile::NamedTempFile;

fn user_schema() -> EntitySchema {
    EntitySchema::builder("user")
        .field(
            "id_",
            FieldDescriptor::int("id").primary_key().doc("user id"),
        )
        .field("name", FieldDescriptor::string("name"))
        .field("create_time", FieldDescriptor::datetime("create_time"))
        .build()
        .unwrap()
}

/// Create a SQLite database holding an empty `user` table.
async fn setup_db() -> ConnectionPool {
    let temp_file = NamedTempFile::new().unwrap();
    let db_path = temp_file
        .into_temp_path()
        .keep()
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    let pool = ConnectionPool::new(PoolConfig::sqlite(db_path));

    let mut conn = pool.acquire().await.unwrap();
    conn.execute(
        "CREATE TABLE user (id INTEGER PRIMARY KEY, name VARCHAR(50), create_time DATETIME)",
    )
    .await
    .unwrap();
    conn.release().await.unwrap();
    pool
}

fn now() -> NaiveDateTime {
    Local::now().naive_local()
}

async fn insert_user(pool: &ConnectionPool, schema: &EntitySchema, id: i64, name: &str) -> Record {
    let record = Record::new()
        .with("id_", id)
        .with("name", name)
        .with("create_time", now());
    let mut conn = pool.acquire().await.unwrap();
    assert_eq!(conn.insert(schema, &record).await.unwrap(), 1);
    conn.release().await.unwrap();
    record
}

#[tokio::test]
async fn test_user_lifecycle() {
    let pool = setup_db().await;
    let user = user_schema();
    let id = user.field("id_").unwrap();
    let name = user.field("name").unwrap();

    let mut record = insert_user(&pool, &user, 1, "alice").await;

    let found = user.query(&pool).filter([id.eq(1)]).first().await.unwrap();
    assert_eq!(found.get("name"), Some(&Value::from("alice")));

    let liked = user
        .query(&pool)
        .filter([name.like("al%").unwrap()])
        .all()
        .await
        .unwrap();
    assert_eq!(liked.len(), 1);

    let mut conn = pool.acquire().await.unwrap();
    let changes = Record::new().with("id_", 2);
    let affected = conn
        .update_by_primary_key(&user, &mut record, &changes)
        .await
        .unwrap();
    conn.release().await.unwrap();
    assert_eq!(affected, Some(1));
    assert_eq!(record.get("id_"), Some(&Value::Int(2)));

    let moved = user.get(&pool, 2).await.unwrap();
    assert_eq!(moved.get("name"), Some(&Value::from("alice")));

    let err = user.get(&pool, 1).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_first_on_missing_row_is_not_found() {
    let pool = setup_db().await;
    let user = user_schema();
    let id = user.field("id_").unwrap();

    match user.query(&pool).filter([id.eq(42)]).first().await {
        Err(DbError::NotFound { table }) => assert_eq!(table, "user"),
        other => panic!("expected NotFound, got {:?}", other),
    }
}

#[tokio::test]
async fn test_datetime_round_trip_at_second_precision() {
    let pool = setup_db().await;
    let user = user_schema();
    let id = user.field("id_").unwrap();

    let record = insert_user(&pool, &user, 7, "dt").await;
    let Some(Value::DateTime(written)) = record.get("create_time").cloned() else {
        panic!("record should hold a datetime");
    };

    let fetched = user.get(&pool, 7).await.unwrap();
    assert_eq!(
        fetched.get("create_time"),
        Some(&Value::DateTime(truncate_to_seconds(written)))
    );

    let later = user
        .query(&pool)
        .filter([user
            .field("create_time")
            .unwrap()
            .ge(written - ChronoDuration::seconds(1))])
        .filter([id.eq(7)])
        .all()
        .await
        .unwrap();
    assert_eq!(later.len(), 1);
}

#[tokio::test]
async fn test_order_desc_limit_returns_max() {
    let pool = setup_db().await;
    let user = user_schema();
    let id = user.field("id_").unwrap();

    for (n, name) in [(1, "a"), (3, "c"), (2, "b")] {
        insert_user(&pool, &user, n, name).await;
    }

    let top = user
        .query(&pool)
        .order_by([id.desc()])
        .limit(1)
        .all()
        .await
        .unwrap();
    assert_eq!(top.len(), 1);
    assert_eq!(top[0].get("id_"), Some(&Value::Int(3)));

    let page = user
        .query(&pool)
        .order_by([id.asc()])
        .offset(1)
        .all()
        .await
        .unwrap();
    let ids: Vec<_> = page.iter().filter_map(|r| r.get("id_").cloned()).collect();
    assert_eq!(ids, vec![Value::Int(2), Value::Int(3)]);

    let count = user.query(&pool).filter([id.gt(1)]).count().await.unwrap();
    assert_eq!(count, 2);
}

#[tokio::test]
async fn test_empty_update_is_noop() {
    let pool = setup_db().await;
    let user = user_schema();

    let mut record = insert_user(&pool, &user, 1, "alice").await;
    let before = record.clone();

    let mut conn = pool.acquire().await.unwrap();
    let result = conn
        .update_by_primary_key(&user, &mut record, &Record::new())
        .await
        .unwrap();
    conn.release().await.unwrap();

    assert_eq!(result, None);
    assert_eq!(record, before);
    let stored = user.get(&pool, 1).await.unwrap();
    assert_eq!(stored.get("name"), Some(&Value::from("alice")));
}

#[tokio::test]
async fn test_update_of_missing_row_leaves_record_untouched() {
    let pool = setup_db().await;
    let user = user_schema();

    let mut record = Record::new().with("id_", 42).with("name", "ghost");
    let before = record.clone();

    let mut conn = pool.acquire().await.unwrap();
    let result = conn
        .update_by_primary_key(&user, &mut record, &Record::new().with("name", "renamed"))
        .await
        .unwrap();
    conn.release().await.unwrap();

    assert_eq!(result, Some(0));
    assert_eq!(record, before);
}

#[tokio::test]
async fn test_quotes_are_bound_not_spliced() {
    let pool = setup_db().await;
    let user = user_schema();
    let name = user.field("name").unwrap();

    insert_user(&pool, &user, 1, "o'brien").await;
    insert_user(&pool, &user, 2, "plain").await;

    let rows = user
        .query(&pool)
        .filter([name.eq("o'brien")])
        .all()
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);

    let none = user
        .query(&pool)
        .filter([name.eq("x' OR '1'='1")])
        .all()
        .await
        .unwrap();
    assert!(none.is_empty());
}

#[tokio::test]
async fn test_duplicate_insert_fails_inside_scope() {
    let pool = setup_db().await;
    let user = user_schema();
    insert_user(&pool, &user, 1, "alice").await;

    let record = Record::new().with("id_", 1).with("name", "again");
    let schema = user.clone();
    let conn = pool.acquire().await.unwrap();
    let result = conn
        .scoped(move |c| Box::pin(async move { c.insert(&schema, &record).await }))
        .await;
    assert!(matches!(result, Err(DbError::Database { .. })));
    assert_eq!(pool.idle_count(), 1);

    let count = user.query(&pool).count().await.unwrap();
    assert_eq!(count, 1);
}
