use chrono::{DateTime, Duration, NaiveDate};
use futures::stream::{self, StreamExt};
use sqlx::PgPool;

use crate::{
    db::{
        query_linked_accounts, query_transactions_in_range, upsert_linked_account,
        upsert_transaction, widen_cached_range,
    },
    domain::{LinkedAccount, Transaction},
    handlers::AppError,
    plaid::{self, PlaidConfig},
};

/// Parses a date at day granularity. Accepts a plain `YYYY-MM-DD` date or an
/// RFC 3339 timestamp whose time-of-day component is discarded.
pub fn parse_day(input: &str) -> Option<NaiveDate> {
    if let Ok(date) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
        return Some(date);
    }

    DateTime::parse_from_rfc3339(input)
        .ok()
        .map(|datetime| datetime.date_naive())
}

pub fn default_range(today: NaiveDate) -> (NaiveDate, NaiveDate) {
    (today - Duration::days(30), today)
}

/// Decides whether the provider must be queried for a requested range.
/// Returns the window to fetch, or `None` when the cached range already
/// covers the request. On any partial miss the whole requested window is
/// refetched rather than only the uncovered delta.
pub fn plan_fetch(
    cached: Option<(NaiveDate, NaiveDate)>,
    requested: (NaiveDate, NaiveDate),
) -> Option<(NaiveDate, NaiveDate)> {
    match cached {
        Some((cached_start, cached_end))
            if cached_start <= requested.0 && requested.1 <= cached_end =>
        {
            None
        }
        _ => Some(requested),
    }
}

/// Union of the cached range and a fetched window. The start never increases
/// and the end never decreases.
pub fn widen_range(
    cached: Option<(NaiveDate, NaiveDate)>,
    fetched: (NaiveDate, NaiveDate),
) -> (NaiveDate, NaiveDate) {
    match cached {
        Some((start, end)) => (start.min(fetched.0), end.max(fetched.1)),
        None => fetched,
    }
}

/// Exchanges a short-lived public token for a long-lived access token,
/// resolves the institution behind it and saves the linked account. Linking
/// the same item again refreshes its credential instead of duplicating the
/// row.
pub async fn link_account(
    pool: &PgPool,
    config: &PlaidConfig,
    user_id: i64,
    public_token: &str,
) -> Result<LinkedAccount, AppError> {
    let exchange = plaid::exchange_public_token(config, public_token).await?;
    let item = plaid::get_item(config, &exchange.access_token).await?;

    let (institution_id, account_name) = match item.institution_id {
        Some(institution_id) => {
            let institution = plaid::get_institution_by_id(config, &institution_id).await?;
            (institution_id, institution.name)
        }
        None => (String::new(), String::from("Linked account")),
    };

    tracing::info!(
        "Linking item_id={} ({}) for user_id={}",
        &exchange.item_id,
        &account_name,
        user_id
    );

    let account = upsert_linked_account(
        pool,
        user_id,
        &exchange.item_id,
        &exchange.access_token,
        &institution_id,
        &account_name,
    )
    .await?;

    Ok(account)
}

/// Returns all transactions for the user's linked accounts within the
/// requested range, fetching from the provider first for every account whose
/// cached range does not cover it. A provider failure for one account is
/// logged and that account falls back to whatever is already cached.
pub async fn fetch_transactions_for_user(
    pool: &PgPool,
    config: &PlaidConfig,
    user_id: i64,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Vec<Transaction>, AppError> {
    let accounts = query_linked_accounts(pool, user_id).await?;

    if accounts.is_empty() {
        return Err(AppError::NotFound(String::from(
            "No account with userId found",
        )));
    }

    let mut transactions = Vec::new();

    for account in accounts.iter() {
        if let Err(err) = sync_account(pool, config, account, start, end).await {
            tracing::error!(
                "Sync failed for account id={}, serving cached data: {:#?}",
                account.id,
                err
            );
        }

        let mut cached = query_transactions_in_range(pool, account.id, start, end).await?;
        transactions.append(&mut cached);
    }

    Ok(transactions)
}

async fn sync_account(
    pool: &PgPool,
    config: &PlaidConfig,
    account: &LinkedAccount,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<(), AppError> {
    let Some((fetch_start, fetch_end)) = plan_fetch(account.cached_range(), (start, end)) else {
        tracing::info!(
            "Cached range covers {} to {} for account id={}, skipping provider fetch",
            start,
            end,
            account.id
        );
        return Ok(());
    };

    tracing::info!(
        "Fetching from provider for account id={}, date range: {} to {}",
        account.id,
        fetch_start,
        fetch_end
    );

    let responses =
        plaid::get_transactions(config, &account.access_token, fetch_start, fetch_end).await?;

    tracing::info!(
        "Retrieved {} transactions for account id={}",
        responses.len(),
        account.id
    );

    let transactions: Vec<_> = responses
        .into_iter()
        .map(|response| Transaction {
            transaction_id: response.transaction_id,
            account_id: account.id,
            amount: response.amount,
            date: response.date,
            name: response.name,
            merchant_name: response.merchant_name,
            pending: response.pending,
            categories: response.category.unwrap_or_default(),
            is_processed: false,
            batch_id: None,
        })
        .collect();

    tracing::info!("Upserting {} transactions...", transactions.len());

    stream::iter(transactions)
        .map(async |transaction| upsert_transaction(pool, &transaction).await)
        .buffered(1)
        .collect::<Vec<_>>()
        .await;

    widen_cached_range(pool, account.id, fetch_start, fetch_end).await?;

    let (new_start, new_end) = widen_range(account.cached_range(), (fetch_start, fetch_end));
    tracing::info!(
        "Cached range for account id={} is now {} to {}",
        account.id,
        new_start,
        new_end
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn plan_fetch_fetches_everything_without_cached_range() {
        let requested = (day("2024-01-10"), day("2024-01-20"));

        assert_eq!(plan_fetch(None, requested), Some(requested));
    }

    #[test]
    fn plan_fetch_skips_provider_when_cache_covers_request() {
        let cached = Some((day("2024-01-01"), day("2024-01-31")));

        assert_eq!(
            plan_fetch(cached, (day("2024-01-10"), day("2024-01-20"))),
            None
        );
        // Covering the request exactly also counts.
        assert_eq!(
            plan_fetch(cached, (day("2024-01-01"), day("2024-01-31"))),
            None
        );
    }

    #[test]
    fn plan_fetch_refetches_whole_window_on_partial_miss() {
        let cached = Some((day("2024-01-01"), day("2024-01-31")));

        let later = (day("2024-02-01"), day("2024-02-10"));
        assert_eq!(plan_fetch(cached, later), Some(later));

        let earlier = (day("2023-12-01"), day("2024-01-15"));
        assert_eq!(plan_fetch(cached, earlier), Some(earlier));

        let wider = (day("2023-12-01"), day("2024-02-10"));
        assert_eq!(plan_fetch(cached, wider), Some(wider));
    }

    #[test]
    fn widen_range_only_grows() {
        let initial = widen_range(None, (day("2024-01-01"), day("2024-01-31")));
        assert_eq!(initial, (day("2024-01-01"), day("2024-01-31")));

        let widened = widen_range(Some(initial), (day("2024-02-01"), day("2024-02-10")));
        assert_eq!(widened, (day("2024-01-01"), day("2024-02-10")));

        // A fetch inside the cached range never shrinks it.
        let unchanged = widen_range(Some(widened), (day("2024-01-10"), day("2024-01-20")));
        assert_eq!(unchanged, widened);
    }

    #[test]
    fn parse_day_accepts_dates_and_timestamps() {
        assert_eq!(parse_day("2024-03-05"), Some(day("2024-03-05")));
        assert_eq!(parse_day("2024-03-05T13:45:00Z"), Some(day("2024-03-05")));
        assert_eq!(
            parse_day("2024-03-05T23:59:59+02:00"),
            Some(day("2024-03-05"))
        );
        assert_eq!(parse_day("yesterday"), None);
        assert_eq!(parse_day(""), None);
    }

    #[test]
    fn default_range_looks_back_thirty_days() {
        let today = day("2024-06-30");

        assert_eq!(default_range(today), (day("2024-05-31"), today));
    }
}
