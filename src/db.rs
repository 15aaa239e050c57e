use chrono::NaiveDate;
use sqlx::{PgPool, postgres::PgQueryResult};

use crate::domain::{LinkedAccount, ProcessingBatch, Transaction, User};

pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    let pool = PgPool::connect(database_url).await?;
    sqlx::migrate!().run(&pool).await?;
    Ok(pool)
}

pub async fn insert_user(
    pool: &PgPool,
    email: &str,
    password_hash: &str,
) -> Result<User, sqlx::Error> {
    sqlx::query_as::<_, User>(
        "
            INSERT INTO users (
                email,
                password_hash
            ) VALUES ($1, $2)
            RETURNING *
        ",
    )
    .bind(email)
    .bind(password_hash)
    .fetch_one(pool)
    .await
}

pub async fn query_user_by_email(pool: &PgPool, email: &str) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>(
        "
            SELECT * FROM users
                WHERE email = $1
        ",
    )
    .bind(email)
    .fetch_optional(pool)
    .await
}

pub async fn upsert_linked_account(
    pool: &PgPool,
    user_id: i64,
    item_id: &str,
    access_token: &str,
    institution_id: &str,
    account_name: &str,
) -> Result<LinkedAccount, sqlx::Error> {
    sqlx::query_as::<_, LinkedAccount>(
        "
            INSERT INTO linked_accounts (
                user_id,
                item_id,
                access_token,
                institution_id,
                account_name
            ) VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (item_id)
            DO UPDATE SET
                access_token = EXCLUDED.access_token,
                institution_id = EXCLUDED.institution_id,
                account_name = EXCLUDED.account_name
            RETURNING *
        ",
    )
    .bind(user_id)
    .bind(item_id)
    .bind(access_token)
    .bind(institution_id)
    .bind(account_name)
    .fetch_one(pool)
    .await
    .inspect_err(|err| {
        tracing::error!(
            "Failed to upsert linked account item_id={} user_id={}: {}",
            item_id,
            user_id,
            err
        );
    })
}

pub async fn query_linked_accounts(
    pool: &PgPool,
    user_id: i64,
) -> Result<Vec<LinkedAccount>, sqlx::Error> {
    sqlx::query_as::<_, LinkedAccount>(
        "
            SELECT * FROM linked_accounts
                WHERE user_id = $1
                ORDER BY id
        ",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
}

/// Widens an account's cached date range to at least cover the given bounds.
/// LEAST/GREATEST ignore NULLs, so a never-synchronised account takes the new
/// bounds directly, and concurrent widenings can never shrink the range.
pub async fn widen_cached_range(
    pool: &PgPool,
    account_id: i64,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<PgQueryResult, sqlx::Error> {
    sqlx::query(
        "
            UPDATE linked_accounts
            SET first_transaction_date = LEAST(first_transaction_date, $2),
                last_transaction_date = GREATEST(last_transaction_date, $3)
            WHERE id = $1
        ",
    )
    .bind(account_id)
    .bind(start)
    .bind(end)
    .execute(pool)
    .await
}

pub async fn upsert_transaction(
    pool: &PgPool,
    transaction: &Transaction,
) -> Result<PgQueryResult, sqlx::Error> {
    sqlx::query(
        "
            INSERT INTO transactions (
                transaction_id,
                account_id,
                amount,
                date,
                name,
                merchant_name,
                pending,
                categories,
                is_processed,
                batch_id
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (transaction_id)
            DO UPDATE SET
                account_id = EXCLUDED.account_id,
                amount = EXCLUDED.amount,
                date = EXCLUDED.date,
                name = EXCLUDED.name,
                merchant_name = EXCLUDED.merchant_name,
                pending = EXCLUDED.pending,
                categories = EXCLUDED.categories
        ",
    )
    .bind(&transaction.transaction_id)
    .bind(&transaction.account_id)
    .bind(&transaction.amount)
    .bind(&transaction.date)
    .bind(&transaction.name)
    .bind(&transaction.merchant_name)
    .bind(&transaction.pending)
    .bind(&transaction.categories)
    .bind(&transaction.is_processed)
    .bind(&transaction.batch_id)
    .execute(pool)
    .await
    .inspect_err(|err| {
        tracing::error!(
            "Failed to upsert transaction transaction_id={} account_id={}: {}",
            &transaction.transaction_id,
            &transaction.account_id,
            err
        );
    })
}

pub async fn query_transactions_in_range(
    pool: &PgPool,
    account_id: i64,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Vec<Transaction>, sqlx::Error> {
    sqlx::query_as::<_, Transaction>(
        "
            SELECT * FROM transactions
            WHERE account_id = $1
                AND date >= $2
                AND date <= $3
            ORDER BY date DESC
        ",
    )
    .bind(account_id)
    .bind(start)
    .bind(end)
    .fetch_all(pool)
    .await
}

pub async fn query_unbatched_transactions(
    pool: &PgPool,
    limit: i64,
) -> Result<Vec<Transaction>, sqlx::Error> {
    sqlx::query_as::<_, Transaction>(
        "
            SELECT * FROM transactions
            WHERE is_processed = FALSE
                AND batch_id IS NULL
            LIMIT $1
        ",
    )
    .bind(limit)
    .fetch_all(pool)
    .await
}

pub async fn create_processing_batch(
    pool: &PgPool,
    prompt: &str,
) -> Result<ProcessingBatch, sqlx::Error> {
    sqlx::query_as::<_, ProcessingBatch>(
        "
            INSERT INTO processing_batches (
                prompt
            ) VALUES ($1)
            RETURNING *
        ",
    )
    .bind(prompt)
    .fetch_one(pool)
    .await
}

pub async fn assign_transactions_to_batch(
    pool: &PgPool,
    batch_id: i64,
    transaction_ids: &Vec<String>,
) -> Result<PgQueryResult, sqlx::Error> {
    sqlx::query(
        "
            UPDATE transactions
            SET batch_id = $1
            WHERE transaction_id = ANY($2)
        ",
    )
    .bind(batch_id)
    .bind(transaction_ids)
    .execute(pool)
    .await
}
