use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;

pub struct PlaidConfig {
    pub client_id: String,
    pub secret: String,
    pub base_url: String,
}

impl PlaidConfig {
    pub fn new(client_id: &str, secret: &str, environment: &str) -> Self {
        let base_url = match environment {
            "production" => "https://production.plaid.com",
            "development" => "https://development.plaid.com",
            _ => "https://sandbox.plaid.com",
        };

        PlaidConfig {
            client_id: client_id.to_string(),
            secret: secret.to_string(),
            base_url: base_url.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct LinkTokenCreateResponse {
    link_token: String,
}

#[derive(Debug, Deserialize)]
pub struct ExchangeTokenResponse {
    pub access_token: String,
    pub item_id: String,
}

#[derive(Debug, Deserialize)]
pub struct Item {
    pub institution_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ItemGetResponse {
    item: Item,
}

#[derive(Debug, Deserialize)]
pub struct Institution {
    pub institution_id: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct InstitutionGetResponse {
    institution: Institution,
}

#[derive(Debug, Deserialize)]
pub struct TransactionResponse {
    pub transaction_id: String,
    pub amount: Decimal,
    pub date: NaiveDate,
    pub name: String,
    pub merchant_name: Option<String>,
    pub pending: bool,
    pub category: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct TransactionsGetResponse {
    transactions: Vec<TransactionResponse>,
    total_transactions: i64,
}

pub async fn create_link_token(
    config: &PlaidConfig,
    user_id: i64,
) -> Result<String, reqwest::Error> {
    let client = reqwest::Client::new();

    tracing::info!("Creating link token for user_id={}", user_id);

    let res = client
        .post(format!("{}/link/token/create", &config.base_url))
        .json(&json!({
            "client_id": &config.client_id,
            "secret": &config.secret,
            "client_name": "finboard",
            "user": { "client_user_id": user_id.to_string() },
            "products": ["transactions"],
            "country_codes": ["US"],
            "language": "en",
        }))
        .send()
        .await
        .and_then(|res| res.error_for_status())
        .inspect_err(|err| {
            tracing::error!(
                "Error occurred in request to Plaid link token API: {:#?}",
                err
            )
        })?;

    res.json::<LinkTokenCreateResponse>()
        .await
        .inspect_err(|err| {
            tracing::error!(
                "Error occurred while deserialising link token response: {:#?}",
                err
            )
        })
        .map(|res| res.link_token)
}

pub async fn exchange_public_token(
    config: &PlaidConfig,
    public_token: &str,
) -> Result<ExchangeTokenResponse, reqwest::Error> {
    let client = reqwest::Client::new();

    tracing::info!("Exchanging public token for an access token...");

    let res = client
        .post(format!("{}/item/public_token/exchange", &config.base_url))
        .json(&json!({
            "client_id": &config.client_id,
            "secret": &config.secret,
            "public_token": public_token,
        }))
        .send()
        .await
        .and_then(|res| res.error_for_status())
        .inspect_err(|err| {
            tracing::error!(
                "Error occurred in request to Plaid token exchange API: {:#?}",
                err
            )
        })?;

    res.json::<ExchangeTokenResponse>().await.inspect_err(|err| {
        tracing::error!(
            "Error occurred while deserialising token exchange response: {:#?}",
            err
        )
    })
}

pub async fn get_item(config: &PlaidConfig, access_token: &str) -> Result<Item, reqwest::Error> {
    let client = reqwest::Client::new();

    let res = client
        .post(format!("{}/item/get", &config.base_url))
        .json(&json!({
            "client_id": &config.client_id,
            "secret": &config.secret,
            "access_token": access_token,
        }))
        .send()
        .await
        .and_then(|res| res.error_for_status())
        .inspect_err(|err| {
            tracing::error!("Error occurred in request to Plaid item API: {:#?}", err)
        })?;

    res.json::<ItemGetResponse>()
        .await
        .inspect_err(|err| {
            tracing::error!(
                "Error occurred while deserialising item response: {:#?}",
                err
            )
        })
        .map(|res| res.item)
}

pub async fn get_institution_by_id(
    config: &PlaidConfig,
    institution_id: &str,
) -> Result<Institution, reqwest::Error> {
    let client = reqwest::Client::new();

    tracing::info!("Resolving institution_id={}", institution_id);

    let res = client
        .post(format!("{}/institutions/get_by_id", &config.base_url))
        .json(&json!({
            "client_id": &config.client_id,
            "secret": &config.secret,
            "institution_id": institution_id,
            "country_codes": ["US"],
        }))
        .send()
        .await
        .and_then(|res| res.error_for_status())
        .inspect_err(|err| {
            tracing::error!(
                "Error occurred in request to Plaid institutions API: {:#?}",
                err
            )
        })?;

    res.json::<InstitutionGetResponse>()
        .await
        .inspect_err(|err| {
            tracing::error!(
                "Error occurred while deserialising institution response: {:#?}",
                err
            )
        })
        .map(|res| res.institution)
}

pub async fn get_transactions(
    config: &PlaidConfig,
    access_token: &str,
    start_date: NaiveDate,
    end_date: NaiveDate,
) -> Result<Vec<TransactionResponse>, reqwest::Error> {
    let client = reqwest::Client::new();
    let mut transactions = Vec::new();

    tracing::info!(
        "Listing transactions from {} to {}...",
        start_date,
        end_date
    );

    loop {
        let res = client
            .post(format!("{}/transactions/get", &config.base_url))
            .json(&json!({
                "client_id": &config.client_id,
                "secret": &config.secret,
                "access_token": access_token,
                "start_date": start_date.to_string(),
                "end_date": end_date.to_string(),
                "options": { "count": 100, "offset": transactions.len() },
            }))
            .send()
            .await
            .and_then(|res| res.error_for_status())
            .inspect_err(|err| {
                tracing::error!(
                    "Error occurred in request to Plaid transactions API: {:#?}",
                    err
                )
            })?;

        let page = res.json::<TransactionsGetResponse>().await.inspect_err(|err| {
            tracing::error!(
                "Error occurred while deserialising transactions response: {:#?}",
                err
            )
        })?;

        if page.transactions.is_empty() {
            break;
        }

        let total = page.total_transactions;
        transactions.extend(page.transactions.into_iter());

        if transactions.len() as i64 >= total {
            break;
        }
    }

    Ok(transactions)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_selects_base_url_from_environment() {
        assert_eq!(
            PlaidConfig::new("id", "secret", "sandbox").base_url,
            "https://sandbox.plaid.com"
        );
        assert_eq!(
            PlaidConfig::new("id", "secret", "production").base_url,
            "https://production.plaid.com"
        );
        // Anything unrecognised falls back to the sandbox.
        assert_eq!(
            PlaidConfig::new("id", "secret", "staging").base_url,
            "https://sandbox.plaid.com"
        );
    }

    #[test]
    fn deserialises_transactions_page() {
        let body = r#"{
            "transactions": [
                {
                    "transaction_id": "tx-1",
                    "account_id": "ext-acc-1",
                    "amount": 12.34,
                    "date": "2024-01-15",
                    "name": "Coffee Shop",
                    "merchant_name": "Blue Bottle",
                    "pending": false,
                    "category": ["Food and Drink", "Coffee"]
                },
                {
                    "transaction_id": "tx-2",
                    "account_id": "ext-acc-1",
                    "amount": -250.0,
                    "date": "2024-01-16",
                    "name": "Payroll",
                    "merchant_name": null,
                    "pending": true,
                    "category": null
                }
            ],
            "total_transactions": 2
        }"#;

        let page: TransactionsGetResponse = serde_json::from_str(body).unwrap();
        assert_eq!(page.total_transactions, 2);
        assert_eq!(page.transactions.len(), 2);

        let first = &page.transactions[0];
        assert_eq!(first.transaction_id, "tx-1");
        assert_eq!(first.amount, "12.34".parse::<Decimal>().unwrap());
        assert_eq!(first.date, NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
        assert_eq!(first.category.as_deref(), Some(&["Food and Drink".to_string(), "Coffee".to_string()][..]));

        let second = &page.transactions[1];
        assert_eq!(second.amount, "-250".parse::<Decimal>().unwrap());
        assert_eq!(second.merchant_name, None);
        assert!(second.pending);
        assert_eq!(second.category, None);
    }

    #[test]
    fn deserialises_exchange_and_institution_responses() {
        let exchange: ExchangeTokenResponse = serde_json::from_str(
            r#"{"access_token": "access-sandbox-1", "item_id": "item-1", "request_id": "req-1"}"#,
        )
        .unwrap();
        assert_eq!(exchange.access_token, "access-sandbox-1");
        assert_eq!(exchange.item_id, "item-1");

        let institution: InstitutionGetResponse = serde_json::from_str(
            r#"{"institution": {"institution_id": "ins_109508", "name": "First Platypus Bank"}}"#,
        )
        .unwrap();
        assert_eq!(institution.institution.name, "First Platypus Bank");

        let item: ItemGetResponse =
            serde_json::from_str(r#"{"item": {"institution_id": null}}"#).unwrap();
        assert_eq!(item.item.institution_id, None);
    }
}
