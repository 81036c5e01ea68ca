//! Batch verification.
//!
//! Fans one verification task out per document, bounded by a semaphore, and
//! assembles the outcomes by input index. A failing document only affects
//! its own [`BatchItem`].

use crate::{
    error::AppError,
    models::cfdi::{BatchItem, CfdiRequest},
    services::verifier::DocumentVerifier,
};
use serde_json::json;
use std::sync::Arc;
use tokio::{sync::Semaphore, task::JoinSet};

/// Runs many verifications with a fixed fan-out limit.
#[derive(Clone)]
pub struct BatchVerifier {
    verifier: Arc<dyn DocumentVerifier>,
    concurrency: usize,
}

impl std::fmt::Debug for BatchVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchVerifier")
            .field("concurrency", &self.concurrency)
            .finish_non_exhaustive()
    }
}

impl BatchVerifier {
    /// `concurrency` below 1 is treated as 1.
    pub fn new(verifier: Arc<dyn DocumentVerifier>, concurrency: usize) -> Self {
        Self {
            verifier,
            concurrency: concurrency.max(1),
        }
    }

    /// Verify every document and return one item per input, in input order.
    ///
    /// Per-document failures are captured in the item's `error`. The only
    /// error this returns is for an empty input, which is rejected before
    /// any upstream call.
    ///
    /// Dropping the returned future aborts all pending verifications.
    pub async fn verify_batch(&self, cfdis: Vec<CfdiRequest>) -> Result<Vec<BatchItem>, AppError> {
        if cfdis.is_empty() {
            return Err(AppError::validation(
                vec![json!("body"), json!("cfdis")],
                "List should have at least 1 item after validation, not 0",
                "too_short",
            ));
        }

        tracing::info!(count = cfdis.len(), concurrency = self.concurrency, "Starting batch verification");

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();

        for (index, cfdi) in cfdis.iter().cloned().enumerate() {
            let verifier = Arc::clone(&self.verifier);
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                // The semaphore is never closed, so acquiring cannot fail.
                let _permit = semaphore.acquire_owned().await.ok();
                (index, verifier.verify(&cfdi).await)
            });
        }

        let mut slots: Vec<Option<BatchItem>> = vec![None; cfdis.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, Ok(response))) => {
                    slots[index] = Some(BatchItem::verified(cfdis[index].clone(), response));
                }
                Ok((index, Err(err))) => {
                    tracing::warn!(uuid = %cfdis[index].uuid, error = %err, "Batch item failed");
                    slots[index] = Some(BatchItem::failed(cfdis[index].clone(), err.to_string()));
                }
                Err(err) => {
                    // Index is lost with a panicked task; its slot stays empty.
                    tracing::error!(error = %err, "Batch verification task failed");
                }
            }
        }

        let items: Vec<BatchItem> = cfdis
            .into_iter()
            .zip(slots)
            .map(|(cfdi, slot)| {
                slot.unwrap_or_else(|| BatchItem::failed(cfdi, "Internal error during verification"))
            })
            .collect();

        let failed = items.iter().filter(|item| item.error.is_some()).count();
        tracing::info!(count = items.len(), failed, "Batch verification finished");

        Ok(items)
    }
}
