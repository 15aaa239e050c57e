use std::sync::Arc;

use crate::{
    AppState,
    auth::{AuthUser, hash_password, issue_token, verify_password},
    db::{insert_user, query_linked_accounts, query_user_by_email},
    domain::{LinkedAccount, Transaction},
    model::{default_range, fetch_transactions_for_user, link_account, parse_day},
    plaid,
};
use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    Conflict(String),
    Upstream(reqwest::Error),
    Database(sqlx::Error),
    Internal,
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Database(err)
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::Upstream(err)
    }
}

impl From<argon2::password_hash::Error> for AppError {
    fn from(err: argon2::password_hash::Error) -> Self {
        tracing::error!("Password hashing failed: {:#?}", err);
        AppError::Internal
    }
}

impl From<jsonwebtoken::errors::Error> for AppError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        tracing::error!("Token signing failed: {:#?}", err);
        AppError::Internal
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::BadRequest(msg) => {
                tracing::info!("Bad request: {}", &msg);
                (StatusCode::BAD_REQUEST, msg)
            }
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::Upstream(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!(
                    "Provider request failed with status_code={}",
                    err.status().unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
                ),
            ),
            AppError::Database(err) => {
                tracing::error!("Database error: {:#?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    String::from("Database error"),
                )
            }
            AppError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                String::from("Internal server error"),
            ),
        };

        (
            status,
            Json(serde_json::json!({ "message": error_message })),
        )
            .into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct CredentialsRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: i64,
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub message: String,
    pub user: UserResponse,
    pub token: String,
}

fn validate_credentials(payload: CredentialsRequest) -> Result<(String, String), AppError> {
    let email = payload.email.unwrap_or_default();
    let password = payload.password.unwrap_or_default();

    if email.is_empty() || password.is_empty() {
        return Err(AppError::BadRequest(String::from(
            "email and password are required",
        )));
    }

    Ok((email, password))
}

pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CredentialsRequest>,
) -> Result<(StatusCode, Json<SessionResponse>), AppError> {
    let (email, password) = validate_credentials(payload)?;

    if query_user_by_email(&state.pool, &email).await?.is_some() {
        return Err(AppError::Conflict(String::from("Email already registered")));
    }

    let password_hash = hash_password(&password)?;
    let user = insert_user(&state.pool, &email, &password_hash).await?;
    let token = issue_token(&state.jwt_secret, user.id, &user.email)?;

    tracing::info!("Registered user id={} email={}", user.id, &user.email);

    Ok((
        StatusCode::CREATED,
        Json(SessionResponse {
            message: String::from("User registered successfully"),
            user: UserResponse {
                id: user.id,
                email: user.email,
            },
            token,
        }),
    ))
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CredentialsRequest>,
) -> Result<Json<SessionResponse>, AppError> {
    let (email, password) = validate_credentials(payload)?;

    let user = query_user_by_email(&state.pool, &email)
        .await?
        .ok_or(AppError::Unauthorized(String::from("Invalid credentials")))?;

    if !verify_password(&password, &user.password_hash)? {
        return Err(AppError::Unauthorized(String::from("Invalid credentials")));
    }

    let token = issue_token(&state.jwt_secret, user.id, &user.email)?;

    tracing::info!("Logged in user id={}", user.id);

    Ok(Json(SessionResponse {
        message: String::from("Login successful"),
        user: UserResponse {
            id: user.id,
            email: user.email,
        },
        token,
    }))
}

#[derive(Debug, Serialize)]
pub struct LinkTokenResponse {
    pub link_token: String,
}

pub async fn create_link_token(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<LinkTokenResponse>, AppError> {
    let link_token = plaid::create_link_token(&state.plaid, auth.user_id).await?;

    Ok(Json(LinkTokenResponse { link_token }))
}

#[derive(Debug, Deserialize)]
pub struct ExchangeSaveTokenRequest {
    pub public_token: Option<String>,
    #[serde(rename = "userId")]
    pub user_id: Option<i64>,
}

#[axum::debug_handler]
pub async fn exchange_save_token(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(payload): Json<ExchangeSaveTokenRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let public_token = payload
        .public_token
        .filter(|token| !token.is_empty())
        .ok_or(AppError::BadRequest(String::from(
            "public_token is required",
        )))?;
    let user_id = payload.user_id.unwrap_or(auth.user_id);

    let account = link_account(&state.pool, &state.plaid, user_id, &public_token).await?;

    tracing::info!(
        "Saved access token for item_id={} user_id={}",
        &account.item_id,
        user_id
    );

    Ok(Json(serde_json::json!({
        "message": "Access token saved successfully"
    })))
}

#[derive(Debug, Deserialize)]
pub struct FetchTransactionsParams {
    #[serde(rename = "userId")]
    pub user_id: Option<i64>,
    #[serde(rename = "startDate")]
    pub start_date: Option<String>,
    #[serde(rename = "endDate")]
    pub end_date: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

#[derive(Debug, Serialize)]
pub struct TransactionsResponse {
    pub message: String,
    pub count: usize,
    pub transactions: Vec<Transaction>,
    #[serde(rename = "dateRange")]
    pub date_range: DateRange,
}

#[axum::debug_handler]
pub async fn fetch_transactions(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Query(params): Query<FetchTransactionsParams>,
) -> Result<Json<TransactionsResponse>, AppError> {
    let user_id = params
        .user_id
        .ok_or(AppError::NotFound(String::from("No userId provided")))?;

    let (default_start, default_end) = default_range(Utc::now().date_naive());

    let start = match params.start_date {
        Some(raw) => parse_day(&raw)
            .ok_or_else(|| AppError::BadRequest(format!("Invalid startDate: {}", raw)))?,
        None => default_start,
    };
    let end = match params.end_date {
        Some(raw) => parse_day(&raw)
            .ok_or_else(|| AppError::BadRequest(format!("Invalid endDate: {}", raw)))?,
        None => default_end,
    };

    if start > end {
        return Err(AppError::BadRequest(String::from(
            "startDate must not be after endDate",
        )));
    }

    tracing::info!(
        "Fetching transactions for user_id={} from {} to {} (requested by {})",
        user_id,
        start,
        end,
        &auth.email
    );

    let transactions =
        fetch_transactions_for_user(&state.pool, &state.plaid, user_id, start, end).await?;

    Ok(Json(TransactionsResponse {
        message: String::from("Transactions fetched successfully"),
        count: transactions.len(),
        transactions,
        date_range: DateRange { start, end },
    }))
}

#[derive(Debug, Deserialize)]
pub struct RetrieveAccountsParams {
    #[serde(rename = "userId")]
    pub user_id: Option<i64>,
}

pub async fn retrieve_linked_accounts(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Query(params): Query<RetrieveAccountsParams>,
) -> Result<Json<Vec<LinkedAccount>>, AppError> {
    let user_id = params.user_id.unwrap_or(auth.user_id);

    let accounts = query_linked_accounts(&state.pool, user_id).await?;

    Ok(Json(accounts))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_errors_map_to_expected_status_codes() {
        let cases = [
            (
                AppError::BadRequest(String::from("bad")),
                StatusCode::BAD_REQUEST,
            ),
            (
                AppError::Unauthorized(String::from("no token")),
                StatusCode::UNAUTHORIZED,
            ),
            (
                AppError::Forbidden(String::from("expired")),
                StatusCode::FORBIDDEN,
            ),
            (
                AppError::NotFound(String::from("missing")),
                StatusCode::NOT_FOUND,
            ),
            (
                AppError::Conflict(String::from("duplicate")),
                StatusCode::CONFLICT,
            ),
            (
                AppError::Database(sqlx::Error::RowNotFound),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (AppError::Internal, StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (error, expected) in cases {
            assert_eq!(error.into_response().status(), expected);
        }
    }

    #[test]
    fn validate_credentials_requires_both_fields() {
        assert!(
            validate_credentials(CredentialsRequest {
                email: None,
                password: Some(String::from("hunter2")),
            })
            .is_err()
        );
        assert!(
            validate_credentials(CredentialsRequest {
                email: Some(String::from("user@example.com")),
                password: Some(String::from("")),
            })
            .is_err()
        );

        let (email, password) = validate_credentials(CredentialsRequest {
            email: Some(String::from("user@example.com")),
            password: Some(String::from("hunter2")),
        })
        .unwrap();
        assert_eq!(email, "user@example.com");
        assert_eq!(password, "hunter2");
    }

    #[test]
    fn linked_account_response_omits_access_token() {
        let account = LinkedAccount {
            id: 1,
            user_id: 7,
            item_id: String::from("item-1"),
            access_token: String::from("access-sandbox-1"),
            institution_id: String::from("ins_109508"),
            account_name: String::from("First Platypus Bank"),
            first_transaction_date: None,
            last_transaction_date: None,
        };

        let body = serde_json::to_value(&account).unwrap();

        assert!(body.get("access_token").is_none());
        assert_eq!(body["item_id"], "item-1");
        assert_eq!(body["account_name"], "First Platypus Bank");
    }
}
