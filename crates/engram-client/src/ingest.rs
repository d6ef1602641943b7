//! Bounded-concurrency bulk ingestion.
//!
//! The engine partitions a document list into contiguous chunks and drives
//! them through a fixed pool of workers pulling from one shared queue; each
//! worker calls the client's `batch_insert` per chunk. Aggregation is purely
//! additive, so chunk completion order has no bearing on correctness; only
//! the dequeue and the counter increments need exclusivity. A failed batch is
//! counted and its error captured (up to a cap); no document is dropped
//! silently and no other chunk is affected.

use crate::client::EngramClient;
use engram_types::{Document, EngramError, EngramResult, UserId};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Cap on captured per-batch error messages.
const MAX_CAPTURED_ERRORS: usize = 10;

/// Tuning knobs for one ingestion run.
#[derive(Debug, Clone, Copy)]
pub struct IngestOptions {
    /// Documents per batch-insert call.
    pub batch_size: usize,
    /// Simultaneous workers.
    pub concurrency: usize,
    /// Owner of the ingested documents.
    pub user_id: UserId,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            batch_size: 100,
            concurrency: 4,
            user_id: UserId::DEFAULT,
        }
    }
}

/// Outcome of one ingestion run.
#[derive(Debug, Clone)]
pub struct IngestReport {
    /// Documents inserted across all successful batches.
    pub total_inserted: u64,
    /// Number of batches that failed.
    pub failed_batches: u64,
    /// Captured error messages, capped at [`MAX_CAPTURED_ERRORS`].
    pub errors: Vec<String>,
    /// Wall-clock duration of the run.
    pub elapsed: Duration,
    /// Inserted documents per second; 0 when elapsed time is 0.
    pub throughput: f64,
}

/// Ingest `documents` through the client's batch operation.
pub async fn ingest_documents(
    client: Arc<EngramClient>,
    documents: Vec<Document>,
    opts: IngestOptions,
) -> EngramResult<IngestReport> {
    if opts.batch_size == 0 {
        return Err(EngramError::Validation(
            "ingest batch_size must be at least 1".to_string(),
        ));
    }
    if opts.concurrency == 0 {
        return Err(EngramError::Validation(
            "ingest concurrency must be at least 1".to_string(),
        ));
    }

    let start = Instant::now();
    let total_docs = documents.len();
    let queue: VecDeque<Vec<Document>> = documents
        .chunks(opts.batch_size)
        .map(|chunk| chunk.to_vec())
        .collect();
    info!(
        documents = total_docs,
        batches = queue.len(),
        concurrency = opts.concurrency,
        "bulk ingestion started"
    );

    let queue = Arc::new(Mutex::new(queue));
    let inserted = Arc::new(AtomicU64::new(0));
    let failed = Arc::new(AtomicU64::new(0));
    let errors = Arc::new(Mutex::new(Vec::new()));

    let mut workers = Vec::with_capacity(opts.concurrency);
    for worker in 0..opts.concurrency {
        let client = Arc::clone(&client);
        let queue = Arc::clone(&queue);
        let inserted = Arc::clone(&inserted);
        let failed = Arc::clone(&failed);
        let errors = Arc::clone(&errors);
        let user_id = opts.user_id;
        workers.push(tokio::spawn(async move {
            loop {
                // Exclusive dequeue: no two workers claim the same chunk and
                // no chunk is skipped.
                let chunk = queue
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .pop_front();
                let Some(chunk) = chunk else { break };
                match client.batch_insert(&chunk, user_id).await {
                    Ok(result) => {
                        inserted.fetch_add(result.count, Ordering::Relaxed);
                    }
                    Err(e) => {
                        failed.fetch_add(1, Ordering::Relaxed);
                        warn!(worker, error = %e, "batch insert failed");
                        let mut errs = errors.lock().unwrap_or_else(|p| p.into_inner());
                        if errs.len() < MAX_CAPTURED_ERRORS {
                            errs.push(e.to_string());
                        }
                    }
                }
            }
        }));
    }

    for worker in workers {
        if let Err(e) = worker.await {
            warn!(error = %e, "ingestion worker aborted");
        }
    }

    let elapsed = start.elapsed();
    let total_inserted = inserted.load(Ordering::Relaxed);
    let secs = elapsed.as_secs_f64();
    let report = IngestReport {
        total_inserted,
        failed_batches: failed.load(Ordering::Relaxed),
        errors: errors.lock().unwrap_or_else(|p| p.into_inner()).clone(),
        elapsed,
        throughput: if secs > 0.0 {
            total_inserted as f64 / secs
        } else {
            0.0
        },
    };
    info!(
        inserted = report.total_inserted,
        failed = report.failed_batches,
        elapsed_ms = elapsed.as_millis() as u64,
        "bulk ingestion finished"
    );
    Ok(report)
}
