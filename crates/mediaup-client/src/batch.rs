//! Batch orchestration
//!
//! Transfers run in sequential waves of at most `concurrency` items; each wave is awaited
//! before the next starts. Pausing the batch pauses the running wave and stops further
//! waves. Cancelled transfers count as failed in the batch totals.

use futures::future::join_all;
use mediaup_core::models::FinalizedFile;
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::TransferError;
use crate::transfer::{Payload, TransferConfig, TransferController, TransferStatus};
use crate::transport::UploadTransport;

/// Default number of transfers in flight at once
pub const DEFAULT_BATCH_CONCURRENCY: usize = 3;

/// Aggregate counts over a batch; `completed + failed + uploading + pending == total`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchProgress {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub uploading: usize,
    pub pending: usize,
    /// Completed share of the batch, rounded, 0-100
    pub percentage: u8,
}

impl BatchProgress {
    pub fn from_statuses(statuses: impl IntoIterator<Item = TransferStatus>) -> Self {
        let mut progress = BatchProgress::default();
        for status in statuses {
            progress.total += 1;
            match status {
                TransferStatus::Completed => progress.completed += 1,
                TransferStatus::Failed | TransferStatus::Cancelled => progress.failed += 1,
                s if s.is_active() => progress.uploading += 1,
                _ => {}
            }
        }
        progress.pending =
            progress.total - progress.completed - progress.failed - progress.uploading;
        progress.percentage = if progress.total == 0 {
            0
        } else {
            ((progress.completed * 100 + progress.total / 2) / progress.total) as u8
        };
        progress
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchFailure {
    /// Position of the transfer in the batch
    pub index: usize,
    pub file_name: String,
    pub error: String,
}

/// Outcome of one pass over the batch. Paused transfers appear in neither list.
#[derive(Debug, Clone, Default)]
pub struct BatchResult {
    pub successful: Vec<FinalizedFile>,
    pub failed: Vec<BatchFailure>,
    pub progress: BatchProgress,
}

pub struct BatchOrchestrator {
    items: Vec<Arc<TransferController>>,
    concurrency: usize,
    paused: AtomicBool,
}

impl BatchOrchestrator {
    pub fn new(items: Vec<TransferController>) -> Self {
        Self {
            items: items.into_iter().map(Arc::new).collect(),
            concurrency: DEFAULT_BATCH_CONCURRENCY,
            paused: AtomicBool::new(false),
        }
    }

    /// One controller per payload, all sharing `transport` and `config`
    pub fn from_payloads(
        transport: Arc<dyn UploadTransport>,
        payloads: Vec<Payload>,
        config: TransferConfig,
    ) -> Self {
        Self::new(
            payloads
                .into_iter()
                .map(|payload| TransferController::new(transport.clone(), payload, config.clone()))
                .collect(),
        )
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn items(&self) -> &[Arc<TransferController>] {
        &self.items
    }

    pub fn progress(&self) -> BatchProgress {
        BatchProgress::from_statuses(self.items.iter().map(|item| item.status()))
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Start every pending transfer, wave by wave
    pub async fn run(&self) -> BatchResult {
        self.paused.store(false, Ordering::SeqCst);
        tracing::info!(
            total = self.items.len(),
            concurrency = self.concurrency,
            "Batch upload started"
        );
        self.run_waves(
            |status| status == TransferStatus::Pending,
            |item| async move { item.start().await },
        )
        .await
    }

    /// Pause running transfers and stop launching new waves
    pub fn pause_all(&self) {
        self.paused.store(true, Ordering::SeqCst);
        let paused = self.items.iter().filter(|item| item.pause()).count();
        tracing::info!(paused = paused, "Batch paused");
    }

    /// Resume paused transfers and start the ones never launched, wave by wave
    pub async fn resume_all(&self) -> BatchResult {
        self.paused.store(false, Ordering::SeqCst);
        self.run_waves(
            |status| matches!(status, TransferStatus::Paused | TransferStatus::Pending),
            |item| async move {
                match item.status() {
                    TransferStatus::Paused => item.resume().await,
                    _ => item.start().await,
                }
            },
        )
        .await
    }

    /// Retry every failed transfer, wave by wave
    pub async fn retry_failed(&self) -> BatchResult {
        self.paused.store(false, Ordering::SeqCst);
        self.run_waves(
            |status| status == TransferStatus::Failed,
            |item| async move { item.retry().await },
        )
        .await
    }

    pub async fn cancel_all(&self) {
        self.paused.store(true, Ordering::SeqCst);
        let cancelled = join_all(self.items.iter().map(|item| item.cancel()))
            .await
            .into_iter()
            .filter(|cancelled| *cancelled)
            .count();
        tracing::info!(cancelled = cancelled, "Batch cancelled");
    }

    async fn run_waves<S, F, Fut>(&self, select: S, action: F) -> BatchResult
    where
        S: Fn(TransferStatus) -> bool,
        F: Fn(Arc<TransferController>) -> Fut,
        Fut: Future<Output = Result<FinalizedFile, TransferError>>,
    {
        let selected: Vec<(usize, Arc<TransferController>)> = self
            .items
            .iter()
            .enumerate()
            .filter(|(_, item)| select(item.status()))
            .map(|(index, item)| (index, Arc::clone(item)))
            .collect();

        let mut result = BatchResult::default();

        for wave in selected.chunks(self.concurrency) {
            if self.is_paused() {
                tracing::debug!("Batch paused, not starting next wave");
                break;
            }

            let outcomes = join_all(wave.iter().map(|(index, item)| {
                let index = *index;
                let file_name = item.file_name().to_string();
                let running = action(Arc::clone(item));
                async move { (index, file_name, running.await) }
            }))
            .await;

            for (index, file_name, outcome) in outcomes {
                match outcome {
                    Ok(file) => result.successful.push(file),
                    Err(TransferError::Paused) => {}
                    Err(err) => result.failed.push(BatchFailure {
                        index,
                        file_name,
                        error: err.to_string(),
                    }),
                }
            }
        }

        result.progress = self.progress();
        tracing::info!(
            successful = result.successful.len(),
            failed = result.failed.len(),
            "Batch pass finished"
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeTransport;
    use bytes::Bytes;
    use mediaup_core::models::LogicalFileType;
    use mediaup_core::RetryPolicy;
    use std::time::Duration;

    fn config() -> TransferConfig {
        TransferConfig::new(LogicalFileType::Image)
            .with_chunk_size(5)
            .with_retry(
                RetryPolicy::fast()
                    .with_base_delay(Duration::from_millis(1))
                    .with_jitter(false),
            )
    }

    fn payloads(names: &[&str], data: &'static [u8]) -> Vec<Payload> {
        names
            .iter()
            .map(|name| Payload::new(*name, "image/png", Bytes::from_static(data)))
            .collect()
    }

    #[test]
    fn counts_always_sum_to_total() {
        use TransferStatus::*;
        let progress = BatchProgress::from_statuses([
            Pending, Preparing, Uploading, Paused, Processing, Completed, Failed, Cancelled,
        ]);
        assert_eq!(progress.total, 8);
        assert_eq!(progress.completed, 1);
        assert_eq!(progress.failed, 2);
        assert_eq!(progress.uploading, 3);
        assert_eq!(progress.pending, 2);
        assert_eq!(
            progress.completed + progress.failed + progress.uploading + progress.pending,
            progress.total
        );
        assert_eq!(progress.percentage, 13);

        assert_eq!(BatchProgress::from_statuses([]), BatchProgress::default());
    }

    #[tokio::test]
    async fn waves_cap_transfers_in_flight() {
        let fake = Arc::new(FakeTransport::new(5).with_delay(Duration::from_millis(20)));
        let batch = BatchOrchestrator::from_payloads(
            fake.clone(),
            payloads(&["a.png", "b.png", "c.png", "d.png", "e.png"], b"abcd"),
            config(),
        )
        .with_concurrency(2);

        let result = batch.run().await;
        assert_eq!(result.successful.len(), 5);
        assert!(result.failed.is_empty());
        assert!(fake.max_active() <= 2);
        assert_eq!(fake.max_active(), 2);

        assert_eq!(result.progress.completed, 5);
        assert_eq!(result.progress.pending, 0);
        assert_eq!(result.progress.percentage, 100);
    }

    #[tokio::test]
    async fn failures_are_collected_and_counted() {
        let fake = Arc::new(FakeTransport::new(5));
        let batch = BatchOrchestrator::from_payloads(
            fake.clone(),
            payloads(&["a.png", "bad.png", "c.png"], b"abcd"),
            config(),
        );

        let result = batch.run().await;
        assert_eq!(result.successful.len(), 2);
        assert_eq!(result.failed.len(), 1);
        assert_eq!(result.failed[0].index, 1);
        assert_eq!(result.failed[0].file_name, "bad.png");
        assert!(result.failed[0].error.contains("400"));

        let progress = batch.progress();
        assert_eq!(progress.completed, 2);
        assert_eq!(progress.failed, 1);
        assert_eq!(progress.percentage, 67);

        // Validation failures stay failed on retry
        let retried = batch.retry_failed().await;
        assert_eq!(retried.failed.len(), 1);
        assert!(retried.successful.is_empty());
    }

    #[tokio::test]
    async fn pause_all_stops_waves_and_resume_all_finishes() {
        let fake = Arc::new(FakeTransport::new(5));
        fake.hang_part(1);
        let batch = Arc::new(
            BatchOrchestrator::from_payloads(
                fake.clone(),
                payloads(&["a.png", "b.png", "c.png"], b"abcdefgh"),
                config(),
            )
            .with_concurrency(1),
        );

        let running = tokio::spawn({
            let batch = Arc::clone(&batch);
            async move { batch.run().await }
        });
        fake.wait_for_hang().await;

        batch.pause_all();
        let result = running.await.unwrap();
        assert!(result.successful.is_empty());
        assert!(result.failed.is_empty());

        let statuses: Vec<_> = batch.items().iter().map(|item| item.status()).collect();
        assert_eq!(
            statuses,
            vec![
                TransferStatus::Paused,
                TransferStatus::Pending,
                TransferStatus::Pending
            ]
        );
        assert_eq!(batch.progress().pending, 3);

        let resumed = batch.resume_all().await;
        assert_eq!(resumed.successful.len(), 3);
        assert_eq!(resumed.progress.completed, 3);
        assert_eq!(fake.count("initiate"), 3);
    }

    #[tokio::test]
    async fn cancel_all_is_terminal() {
        let fake = Arc::new(FakeTransport::new(5));
        let batch = BatchOrchestrator::from_payloads(
            fake.clone(),
            payloads(&["a.png", "b.png", "c.png"], b"abcd"),
            config(),
        );

        batch.cancel_all().await;
        let progress = batch.progress();
        assert_eq!(progress.failed, 3);
        assert_eq!(progress.pending, 0);

        let result = batch.run().await;
        assert!(result.successful.is_empty());
        assert_eq!(fake.count("initiate"), 0);
    }
}
