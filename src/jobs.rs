use std::sync::Arc;

use crate::{
    AppState,
    db::{assign_transactions_to_batch, create_processing_batch, query_unbatched_transactions},
};

pub const BATCH_SIZE: i64 = 50;
pub const BATCH_PROMPT: &str = "Classify these transactions";

/// Groups unprocessed transactions into pending classification batches for a
/// future external classifier. Only spawned when a poll interval is
/// configured; no consumer reads the batches yet.
pub async fn classification_batch_task(state: Arc<AppState>, interval_seconds: u64) {
    // Create a Tokio interval. The first tick fires immediately.
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(interval_seconds));

    loop {
        // Wait for the next interval tick
        interval.tick().await;
        tracing::info!("Running classification_batch_task...");

        if let Err(err) = run_batch_pass(&state).await {
            tracing::error!(
                "An error occurred while grouping a classification batch: {:#?}",
                err
            );
        }

        tracing::info!("Finished running classification_batch_task...");
    }
}

async fn run_batch_pass(state: &AppState) -> Result<(), sqlx::Error> {
    let unprocessed = query_unbatched_transactions(&state.pool, BATCH_SIZE).await?;

    if unprocessed.is_empty() {
        return Ok(());
    }

    let batch = create_processing_batch(&state.pool, BATCH_PROMPT).await?;

    let transaction_ids: Vec<String> = unprocessed
        .into_iter()
        .map(|transaction| transaction.transaction_id)
        .collect();

    assign_transactions_to_batch(&state.pool, batch.id, &transaction_ids).await?;

    tracing::info!(
        "Created batch {:?} with {} transactions",
        batch,
        transaction_ids.len()
    );

    Ok(())
}
