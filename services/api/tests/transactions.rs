//! services/api/tests/transactions.rs
//!
//! Transaction CRUD over a real in-memory SQLite database.

use api_lib::adapters::db::DbAdapter;
use chrono::NaiveDate;
use finance_tracker_core::domain::NewTransaction;
use finance_tracker_core::ports::{DatabaseService, PortError};
use sqlx::sqlite::SqlitePoolOptions;
use std::sync::Arc;

async fn setup() -> (Arc<DbAdapter>, i64) {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    let db = Arc::new(DbAdapter::new(pool));
    db.run_migrations().await.unwrap();
    let user = db.create_user("alice", "not-a-real-hash").await.unwrap();
    (db, user.id)
}

fn groceries(amount: f64) -> NewTransaction {
    NewTransaction {
        date: NaiveDate::from_ymd_opt(2024, 9, 17).unwrap(),
        kind: "expense".to_string(),
        person: "Alice".to_string(),
        category: "Groceries".to_string(),
        description: "weekly shop".to_string(),
        amount,
    }
}

#[tokio::test]
async fn update_replaces_every_mutable_field() {
    let (db, user_id) = setup().await;
    let created = db.create_transaction(user_id, groceries(42.0)).await.unwrap();

    let mut changed = groceries(55.5);
    changed.category = "Household".to_string();
    changed.description = "cleaning supplies".to_string();
    let updated = db
        .update_transaction(user_id, created.id, changed)
        .await
        .unwrap();

    assert_eq!(updated.id, created.id);
    assert_eq!(updated.amount, 55.5);
    assert_eq!(updated.category, "Household");

    let listed = db.list_transactions(user_id).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].description, "cleaning supplies");
}

#[tokio::test]
async fn update_is_scoped_to_the_owning_user() {
    let (db, user_id) = setup().await;
    let other = db.create_user("bob", "not-a-real-hash").await.unwrap();
    let created = db.create_transaction(user_id, groceries(42.0)).await.unwrap();

    let err = db
        .update_transaction(other.id, created.id, groceries(1.0))
        .await
        .unwrap_err();
    assert!(matches!(err, PortError::NotFound(_)));

    // The owner's row is untouched.
    let listed = db.list_transactions(user_id).await.unwrap();
    assert_eq!(listed[0].amount, 42.0);
}

#[tokio::test]
async fn delete_removes_only_the_named_transaction() {
    let (db, user_id) = setup().await;
    let first = db.create_transaction(user_id, groceries(10.0)).await.unwrap();
    db.create_transaction(user_id, groceries(20.0)).await.unwrap();

    db.delete_transaction(user_id, first.id).await.unwrap();

    let listed = db.list_transactions(user_id).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].amount, 20.0);

    let err = db.delete_transaction(user_id, first.id).await.unwrap_err();
    assert!(matches!(err, PortError::NotFound(_)));
}
