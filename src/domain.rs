use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;

#[derive(sqlx::FromRow, Clone)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub password_hash: String,
}

#[derive(sqlx::FromRow, Serialize, Clone)]
pub struct LinkedAccount {
    pub id: i64,
    pub user_id: i64,
    pub item_id: String,
    // The provider credential must never leave the process in a response
    // body.
    #[serde(skip_serializing)]
    pub access_token: String,
    pub institution_id: String,
    pub account_name: String,
    pub first_transaction_date: Option<NaiveDate>,
    pub last_transaction_date: Option<NaiveDate>,
}

impl LinkedAccount {
    /// Inclusive date range for which this account's transactions are fully
    /// synchronised locally. `None` until the first successful sync.
    pub fn cached_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        match (self.first_transaction_date, self.last_transaction_date) {
            (Some(start), Some(end)) => Some((start, end)),
            _ => None,
        }
    }
}

#[derive(sqlx::FromRow, Serialize, Debug)]
pub struct Transaction {
    pub transaction_id: String,
    pub account_id: i64,
    pub amount: Decimal,
    pub date: NaiveDate,
    pub name: String,
    pub merchant_name: Option<String>,
    pub pending: bool,
    pub categories: Vec<String>,
    pub is_processed: bool,
    pub batch_id: Option<i64>,
}

#[derive(sqlx::FromRow, Debug)]
pub struct ProcessingBatch {
    pub id: i64,
    pub prompt: String,
    pub response: String,
    pub status: String,
}
