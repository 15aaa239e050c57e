mod args;
mod auth;
mod db;
mod domain;
mod handlers;
mod jobs;
mod logging;
mod model;
mod plaid;

use std::sync::Arc;

use args::parse_args;
use axum::{
    Router,
    routing::{get, post},
};
use db::create_pool;
use handlers::{
    create_link_token, exchange_save_token, fetch_transactions, login, register,
    retrieve_linked_accounts,
};
use jobs::classification_batch_task;
use logging::setup_logging;
use plaid::PlaidConfig;
use sqlx::PgPool;

pub struct AppState {
    pool: PgPool,
    plaid: PlaidConfig,
    jwt_secret: String,
}

#[tokio::main]
async fn main() {
    let args = parse_args();

    setup_logging(&args.base_log_dir);

    let pool = create_pool(&args.database_url)
        .await
        .expect("Failed to create PostgreSQL pool");

    let app_state = Arc::new(AppState {
        pool,
        plaid: PlaidConfig::new(&args.plaid_client_id, &args.plaid_secret, &args.plaid_env),
        jwt_secret: args.jwt_secret,
    });

    if let Some(interval) = args.batch_poll_interval {
        tracing::info!("Spawning classification batch task...");
        tokio::spawn(classification_batch_task(app_state.clone(), interval));
    }

    let app = Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/create-link-token", get(create_link_token))
        .route("/exchange-save-token", post(exchange_save_token))
        .route("/fetch-transactions", get(fetch_transactions))
        .route("/retrieve-plaid-user", get(retrieve_linked_accounts))
        .route("/", get(|| async { "finboard is running" }))
        .with_state(app_state);

    let bind_address = format! {"0.0.0.0:{}", args.port};
    tracing::info!("Server listening on {}...", bind_address);

    let listener = tokio::net::TcpListener::bind(bind_address).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
