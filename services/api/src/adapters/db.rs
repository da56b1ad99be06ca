//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `DatabaseService` port from the `core` crate. It handles all interactions
//! with the SQLite database using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use finance_tracker_core::domain::{
    NewReceipt, NewReceiptProduct, NewTransaction, OutlookConnection, Receipt, ReceiptProduct,
    Transaction, User, UserCredentials,
};
use finance_tracker_core::ports::{CategoryTotal, DatabaseService, PortError, PortResult};
use sqlx::{FromRow, SqlitePool};
use std::collections::HashSet;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `DatabaseService` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: SqlitePool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct UserRecord {
    id: i64,
    username: String,
}
impl UserRecord {
    fn to_domain(self) -> User {
        User {
            id: self.id,
            username: self.username,
        }
    }
}

#[derive(FromRow)]
struct UserCredentialsRecord {
    id: i64,
    username: String,
    hashed_password: String,
}
impl UserCredentialsRecord {
    fn to_domain(self) -> UserCredentials {
        UserCredentials {
            id: self.id,
            username: self.username,
            hashed_password: self.hashed_password,
        }
    }
}

#[derive(FromRow)]
struct ReceiptRecord {
    id: i64,
    user_id: i64,
    market: String,
    branch: String,
    invoice: Option<String>,
    date: NaiveDate,
    total: f64,
    total_discount: f64,
    total_paid: f64,
    filename: Option<String>,
}
impl ReceiptRecord {
    fn to_domain(self) -> Receipt {
        Receipt {
            id: self.id,
            user_id: self.user_id,
            market: self.market,
            branch: self.branch,
            invoice: self.invoice,
            date: self.date,
            total: self.total,
            total_discount: self.total_discount,
            total_paid: self.total_paid,
            filename: self.filename,
        }
    }
}

#[derive(FromRow)]
struct ReceiptProductRecord {
    id: i64,
    receipt_id: i64,
    product_type: String,
    product: String,
    quantity: f64,
    price: f64,
    discount: f64,
    discount2: f64,
}
impl ReceiptProductRecord {
    fn to_domain(self) -> ReceiptProduct {
        ReceiptProduct {
            id: self.id,
            receipt_id: self.receipt_id,
            product_type: self.product_type,
            product: self.product,
            quantity: self.quantity,
            price: self.price,
            discount: self.discount,
            discount2: self.discount2,
        }
    }
}

#[derive(FromRow)]
struct TransactionRecord {
    id: i64,
    user_id: i64,
    date: NaiveDate,
    kind: String,
    person: String,
    category: String,
    description: String,
    amount: f64,
}
impl TransactionRecord {
    fn to_domain(self) -> Transaction {
        Transaction {
            id: self.id,
            user_id: self.user_id,
            date: self.date,
            kind: self.kind,
            person: self.person,
            category: self.category,
            description: self.description,
            amount: self.amount,
        }
    }
}

#[derive(FromRow)]
struct OutlookConnectionRecord {
    outlook_access_token: Option<String>,
    outlook_refresh_token: Option<String>,
    outlook_token_expires: Option<DateTime<Utc>>,
    outlook_state: Option<String>,
    outlook_last_sync: Option<DateTime<Utc>>,
}
impl OutlookConnectionRecord {
    fn to_domain(self) -> OutlookConnection {
        OutlookConnection {
            access_token: self.outlook_access_token,
            refresh_token: self.outlook_refresh_token,
            token_expires: self.outlook_token_expires,
            oauth_state: self.outlook_state,
            last_sync: self.outlook_last_sync,
        }
    }
}

#[derive(FromRow)]
struct CategoryTotalRecord {
    category: String,
    amount: f64,
}

//=========================================================================================
// `DatabaseService` Trait Implementation
//=========================================================================================

#[async_trait]
impl DatabaseService for DbAdapter {
    async fn create_user(&self, username: &str, hashed_password: &str) -> PortResult<User> {
        let result = sqlx::query("INSERT INTO users (username, hashed_password) VALUES (?1, ?2)")
            .bind(username)
            .bind(hashed_password)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;

        Ok(User {
            id: result.last_insert_rowid(),
            username: username.to_string(),
        })
    }

    async fn get_user_by_username(&self, username: &str) -> PortResult<UserCredentials> {
        let record = sqlx::query_as::<_, UserCredentialsRecord>(
            "SELECT id, username, hashed_password FROM users WHERE username = ?1",
        )
        .bind(username)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => PortError::NotFound(format!("User {username} not found")),
            _ => unexpected(e),
        })?;
        Ok(record.to_domain())
    }

    async fn get_user(&self, user_id: i64) -> PortResult<User> {
        let record =
            sqlx::query_as::<_, UserRecord>("SELECT id, username FROM users WHERE id = ?1")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| match e {
                    sqlx::Error::RowNotFound => {
                        PortError::NotFound(format!("User {user_id} not found"))
                    }
                    _ => unexpected(e),
                })?;
        Ok(record.to_domain())
    }

    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: i64,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()> {
        sqlx::query("INSERT INTO auth_sessions (id, user_id, expires_at) VALUES (?1, ?2, ?3)")
            .bind(session_id)
            .bind(user_id)
            .bind(expires_at)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<i64> {
        let row = sqlx::query_as::<_, (i64, DateTime<Utc>)>(
            "SELECT user_id, expires_at FROM auth_sessions WHERE id = ?1",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;

        match row {
            Some((user_id, expires_at)) if expires_at > Utc::now() => Ok(user_id),
            _ => Err(PortError::Unauthorized),
        }
    }

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()> {
        sqlx::query("DELETE FROM auth_sessions WHERE id = ?1")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn create_receipt_with_products(
        &self,
        receipt: NewReceipt,
        products: Vec<NewReceiptProduct>,
    ) -> PortResult<i64> {
        // One unit of work per receipt: a failure here rolls back this
        // receipt and its products only.
        let mut tx = self.pool.begin().await.map_err(unexpected)?;

        let result = sqlx::query(
            "INSERT INTO receipts \
             (user_id, market, branch, invoice, date, total, total_discount, total_paid, filename) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )
        .bind(receipt.user_id)
        .bind(&receipt.market)
        .bind(&receipt.branch)
        .bind(&receipt.invoice)
        .bind(receipt.date)
        .bind(receipt.total)
        .bind(receipt.total_discount)
        .bind(receipt.total_paid)
        .bind(&receipt.filename)
        .execute(&mut *tx)
        .await
        .map_err(unexpected)?;

        let receipt_id = result.last_insert_rowid();

        for product in &products {
            sqlx::query(
                "INSERT INTO receipt_products \
                 (receipt_id, product_type, product, quantity, price, discount, discount2) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )
            .bind(receipt_id)
            .bind(&product.product_type)
            .bind(&product.product)
            .bind(product.quantity)
            .bind(product.price)
            .bind(product.discount)
            .bind(product.discount2)
            .execute(&mut *tx)
            .await
            .map_err(unexpected)?;
        }

        tx.commit().await.map_err(unexpected)?;
        Ok(receipt_id)
    }

    async fn list_receipts(
        &self,
        user_id: i64,
        offset: i64,
        limit: i64,
    ) -> PortResult<Vec<Receipt>> {
        let records = sqlx::query_as::<_, ReceiptRecord>(
            "SELECT id, user_id, market, branch, invoice, date, total, total_discount, \
             total_paid, filename \
             FROM receipts WHERE user_id = ?1 ORDER BY date DESC, id DESC LIMIT ?2 OFFSET ?3",
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn get_receipt(&self, user_id: i64, receipt_id: i64) -> PortResult<Receipt> {
        let record = sqlx::query_as::<_, ReceiptRecord>(
            "SELECT id, user_id, market, branch, invoice, date, total, total_discount, \
             total_paid, filename \
             FROM receipts WHERE id = ?1 AND user_id = ?2",
        )
        .bind(receipt_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => {
                PortError::NotFound(format!("Receipt {receipt_id} not found"))
            }
            _ => unexpected(e),
        })?;
        Ok(record.to_domain())
    }

    async fn get_receipt_products(&self, receipt_id: i64) -> PortResult<Vec<ReceiptProduct>> {
        let records = sqlx::query_as::<_, ReceiptProductRecord>(
            "SELECT id, receipt_id, product_type, product, quantity, price, discount, discount2 \
             FROM receipt_products WHERE receipt_id = ?1 ORDER BY id ASC",
        )
        .bind(receipt_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn delete_receipt(&self, user_id: i64, receipt_id: i64) -> PortResult<()> {
        // Products deleted explicitly so the cascade does not depend on the
        // connection's foreign_keys pragma.
        let mut tx = self.pool.begin().await.map_err(unexpected)?;

        let owned = sqlx::query_as::<_, (i64,)>(
            "SELECT id FROM receipts WHERE id = ?1 AND user_id = ?2",
        )
        .bind(receipt_id)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(unexpected)?;
        if owned.is_none() {
            return Err(PortError::NotFound(format!(
                "Receipt {receipt_id} not found"
            )));
        }

        sqlx::query("DELETE FROM receipt_products WHERE receipt_id = ?1")
            .bind(receipt_id)
            .execute(&mut *tx)
            .await
            .map_err(unexpected)?;
        sqlx::query("DELETE FROM receipts WHERE id = ?1")
            .bind(receipt_id)
            .execute(&mut *tx)
            .await
            .map_err(unexpected)?;

        tx.commit().await.map_err(unexpected)?;
        Ok(())
    }

    async fn processed_filenames(&self, user_id: i64) -> PortResult<HashSet<String>> {
        let names = sqlx::query_scalar::<_, String>(
            "SELECT filename FROM receipts WHERE user_id = ?1 AND filename IS NOT NULL",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(names.into_iter().collect())
    }

    async fn create_transaction(
        &self,
        user_id: i64,
        transaction: NewTransaction,
    ) -> PortResult<Transaction> {
        let result = sqlx::query(
            "INSERT INTO transactions (user_id, date, kind, person, category, description, amount) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(user_id)
        .bind(transaction.date)
        .bind(&transaction.kind)
        .bind(&transaction.person)
        .bind(&transaction.category)
        .bind(&transaction.description)
        .bind(transaction.amount)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;

        Ok(Transaction {
            id: result.last_insert_rowid(),
            user_id,
            date: transaction.date,
            kind: transaction.kind,
            person: transaction.person,
            category: transaction.category,
            description: transaction.description,
            amount: transaction.amount,
        })
    }

    async fn list_transactions(&self, user_id: i64) -> PortResult<Vec<Transaction>> {
        let records = sqlx::query_as::<_, TransactionRecord>(
            "SELECT id, user_id, date, kind, person, category, description, amount \
             FROM transactions WHERE user_id = ?1 ORDER BY date DESC, id DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn update_transaction(
        &self,
        user_id: i64,
        transaction_id: i64,
        transaction: NewTransaction,
    ) -> PortResult<Transaction> {
        let result = sqlx::query(
            "UPDATE transactions SET date = ?1, kind = ?2, person = ?3, category = ?4, \
             description = ?5, amount = ?6 WHERE id = ?7 AND user_id = ?8",
        )
        .bind(transaction.date)
        .bind(&transaction.kind)
        .bind(&transaction.person)
        .bind(&transaction.category)
        .bind(&transaction.description)
        .bind(transaction.amount)
        .bind(transaction_id)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!(
                "Transaction {transaction_id} not found"
            )));
        }

        Ok(Transaction {
            id: transaction_id,
            user_id,
            date: transaction.date,
            kind: transaction.kind,
            person: transaction.person,
            category: transaction.category,
            description: transaction.description,
            amount: transaction.amount,
        })
    }

    async fn delete_transaction(&self, user_id: i64, transaction_id: i64) -> PortResult<()> {
        let result = sqlx::query("DELETE FROM transactions WHERE id = ?1 AND user_id = ?2")
            .bind(transaction_id)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!(
                "Transaction {transaction_id} not found"
            )));
        }
        Ok(())
    }

    async fn receipts_between(
        &self,
        user_id: i64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> PortResult<Vec<Receipt>> {
        let records = sqlx::query_as::<_, ReceiptRecord>(
            "SELECT id, user_id, market, branch, invoice, date, total, total_discount, \
             total_paid, filename \
             FROM receipts WHERE user_id = ?1 AND date >= ?2 AND date <= ?3 ORDER BY date ASC",
        )
        .bind(user_id)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn category_totals_between(
        &self,
        user_id: i64,
        start: NaiveDate,
        end: NaiveDate,
        limit: i64,
    ) -> PortResult<Vec<CategoryTotal>> {
        let records = sqlx::query_as::<_, CategoryTotalRecord>(
            "SELECT rp.product_type AS category, SUM(rp.price * rp.quantity) AS amount \
             FROM receipt_products rp \
             JOIN receipts r ON r.id = rp.receipt_id \
             WHERE r.user_id = ?1 AND r.date >= ?2 AND r.date <= ?3 \
             GROUP BY rp.product_type ORDER BY amount DESC LIMIT ?4",
        )
        .bind(user_id)
        .bind(start)
        .bind(end)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records
            .into_iter()
            .map(|r| CategoryTotal {
                category: r.category,
                amount: r.amount,
            })
            .collect())
    }

    async fn get_outlook_connection(&self, user_id: i64) -> PortResult<OutlookConnection> {
        let record = sqlx::query_as::<_, OutlookConnectionRecord>(
            "SELECT outlook_access_token, outlook_refresh_token, outlook_token_expires, \
             outlook_state, outlook_last_sync \
             FROM users WHERE id = ?1",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => PortError::NotFound(format!("User {user_id} not found")),
            _ => unexpected(e),
        })?;
        Ok(record.to_domain())
    }

    async fn store_outlook_state(&self, user_id: i64, state: &str) -> PortResult<()> {
        // A fresh authorization attempt also clears any stale tokens.
        sqlx::query(
            "UPDATE users SET outlook_state = ?1, outlook_access_token = NULL, \
             outlook_refresh_token = NULL, outlook_token_expires = NULL WHERE id = ?2",
        )
        .bind(state)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(())
    }

    async fn store_outlook_tokens(
        &self,
        user_id: i64,
        access_token: &str,
        refresh_token: Option<&str>,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()> {
        sqlx::query(
            "UPDATE users SET outlook_access_token = ?1, outlook_refresh_token = ?2, \
             outlook_token_expires = ?3, outlook_state = NULL WHERE id = ?4",
        )
        .bind(access_token)
        .bind(refresh_token)
        .bind(expires_at)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(())
    }

    async fn clear_outlook_connection(&self, user_id: i64) -> PortResult<()> {
        sqlx::query(
            "UPDATE users SET outlook_access_token = NULL, outlook_refresh_token = NULL, \
             outlook_token_expires = NULL, outlook_state = NULL WHERE id = ?1",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(())
    }

    async fn touch_outlook_last_sync(&self, user_id: i64, when: DateTime<Utc>) -> PortResult<()> {
        sqlx::query("UPDATE users SET outlook_last_sync = ?1 WHERE id = ?2")
            .bind(when)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }
}
