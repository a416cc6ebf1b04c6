//! Database initialization on first run and on reopen

use greenova_common::db::{init_database, SCHEMA_VERSION};

#[tokio::test]
async fn test_database_creation_when_missing() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("nested").join("greenova.db");
    assert!(!db_path.exists());

    let pool = init_database(&db_path).await;
    assert!(pool.is_ok(), "Database initialization failed: {:?}", pool.err());
    assert!(db_path.exists(), "Database file was not created");
}

#[tokio::test]
async fn test_database_opens_existing_and_keeps_data() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("greenova.db");

    let pool = init_database(&db_path).await.unwrap();
    sqlx::query("INSERT INTO projects (name) VALUES ('Portside')")
        .execute(&pool)
        .await
        .unwrap();
    pool.close().await;

    let pool = init_database(&db_path).await.unwrap();
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM projects")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 1);

    let versions: Vec<i64> = sqlx::query_scalar("SELECT version FROM schema_version")
        .fetch_all(&pool)
        .await
        .unwrap();
    assert_eq!(versions, vec![SCHEMA_VERSION]);
}

#[tokio::test]
async fn test_foreign_keys_enforced() {
    let dir = tempfile::tempdir().unwrap();
    let pool = init_database(&dir.path().join("greenova.db")).await.unwrap();

    let result = sqlx::query("INSERT INTO mechanisms (project_id, name) VALUES (999, 'Orphan')")
        .execute(&pool)
        .await;
    assert!(result.is_err(), "mechanism without project should be rejected");
}

#[tokio::test]
async fn test_mechanism_names_unique_per_project() {
    let dir = tempfile::tempdir().unwrap();
    let pool = init_database(&dir.path().join("greenova.db")).await.unwrap();

    sqlx::query("INSERT INTO projects (id, name) VALUES (1, 'A'), (2, 'B')")
        .execute(&pool)
        .await
        .unwrap();
    sqlx::query("INSERT INTO mechanisms (project_id, name) VALUES (1, 'CEMP'), (2, 'CEMP')")
        .execute(&pool)
        .await
        .unwrap();

    let duplicate = sqlx::query("INSERT INTO mechanisms (project_id, name) VALUES (1, 'CEMP')")
        .execute(&pool)
        .await;
    assert!(duplicate.is_err());
}
