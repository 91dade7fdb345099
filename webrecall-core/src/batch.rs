//! Concurrent batch/recrawl driver.
//!
//! Runs the ingestion pipeline over a list of URLs with a semaphore bound,
//! a per-URL deadline, and optional inter-dispatch delay for rate shaping.
//! Per-URL failures are aggregated; the driver itself only fails on setup
//! errors such as an unreadable URL file.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::time::{sleep, timeout, Instant};
use tracing::{info, warn};

use crate::constants::{BATCH_MAX_CONCURRENT, BATCH_PROGRESS_EVERY, BATCH_URL_TIMEOUT_SECS};
use crate::error::{Error, Result};
use crate::ingest::{IngestOptions, IngestionPipeline};
use crate::types::RetentionPolicy;

/// Batch run policy.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub max_concurrent: usize,
    pub url_timeout: Duration,
    /// Delay inserted before each dispatch, e.g. 600 ms for 100/min shaping.
    pub dispatch_delay: Option<Duration>,
    pub retention: RetentionPolicy,
    pub tags: Vec<String>,
    pub session_id: Option<String>,
}

impl Default for BatchOptions {
    fn default() -> Self {
        BatchOptions {
            max_concurrent: BATCH_MAX_CONCURRENT,
            url_timeout: Duration::from_secs(BATCH_URL_TIMEOUT_SECS),
            dispatch_delay: None,
            retention: RetentionPolicy::Permanent,
            tags: Vec::new(),
            session_id: None,
        }
    }
}

/// Per-URL outcome.
#[derive(Debug, Clone, Serialize)]
pub struct BatchItem {
    pub url: String,
    pub success: bool,
    pub duration_s: f64,
    pub chunks_stored: usize,
    pub error: Option<String>,
}

/// Aggregate batch report.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub duration_s: f64,
    pub urls_per_second: f64,
    pub items: Vec<BatchItem>,
    pub failed_urls: Vec<String>,
}

/// Semaphore-bounded concurrent recrawl driver.
pub struct BatchDriver {
    pipeline: Arc<IngestionPipeline>,
}

impl BatchDriver {
    pub fn new(pipeline: Arc<IngestionPipeline>) -> Self {
        BatchDriver { pipeline }
    }

    /// Read a URL list from a file (one per line, `#` comments and blank
    /// lines skipped), run it, and write failures to a `.failed` sidecar.
    pub async fn run_file(&self, path: &Path, options: BatchOptions) -> Result<BatchReport> {
        let raw = tokio::fs::read_to_string(path).await?;
        let urls: Vec<String> = raw
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(str::to_string)
            .collect();
        if urls.is_empty() {
            return Err(Error::validation("urls", "file contains no URLs"));
        }

        let report = self.run(urls, options).await;

        if !report.failed_urls.is_empty() {
            let sidecar = sidecar_path(path);
            let body = report.failed_urls.join("\n") + "\n";
            if let Err(err) = tokio::fs::write(&sidecar, body).await {
                warn!(path = %sidecar.display(), error = %err, "could not write failed-URL sidecar");
            } else {
                info!(path = %sidecar.display(), count = report.failed_urls.len(), "wrote failed URLs for retry");
            }
        }
        Ok(report)
    }

    /// Run ingestion over an explicit URL list.
    pub async fn run(&self, urls: Vec<String>, options: BatchOptions) -> BatchReport {
        let total = urls.len();
        let started = Instant::now();
        let semaphore = Arc::new(Semaphore::new(options.max_concurrent.max(1)));
        let completed = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let succeeded_so_far = Arc::new(std::sync::atomic::AtomicUsize::new(0));

        let mut tasks = Vec::with_capacity(total);
        for (position, url) in urls.into_iter().enumerate() {
            let semaphore = Arc::clone(&semaphore);
            let pipeline = Arc::clone(&self.pipeline);
            let completed = Arc::clone(&completed);
            let succeeded_so_far = Arc::clone(&succeeded_so_far);
            let ingest_opts = IngestOptions {
                retention: options.retention.clone(),
                tags: options.tags.clone(),
                session_id: options.session_id.clone(),
                batch_deadline: true,
            };
            let url_timeout = options.url_timeout;
            let dispatch_delay = options.dispatch_delay;

            tasks.push(tokio::spawn(async move {
                if let Some(delay) = dispatch_delay {
                    sleep(delay.saturating_mul(position as u32)).await;
                }
                #[allow(clippy::expect_used)]
                let _permit = semaphore.acquire().await.expect("semaphore never closes");

                let url_started = Instant::now();
                let outcome = timeout(url_timeout, pipeline.ingest_report(&url, ingest_opts)).await;
                let duration_s = url_started.elapsed().as_secs_f64();

                let item = match outcome {
                    Ok(report) => BatchItem {
                        url: url.clone(),
                        success: report.success,
                        duration_s,
                        chunks_stored: report.chunks_stored,
                        error: report.error,
                    },
                    Err(_) => BatchItem {
                        url: url.clone(),
                        success: false,
                        duration_s,
                        chunks_stored: 0,
                        error: Some(format!(
                            "timed out after {:.0}s",
                            url_timeout.as_secs_f64()
                        )),
                    },
                };

                if item.success {
                    succeeded_so_far.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                }
                let done = completed.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
                if done % BATCH_PROGRESS_EVERY == 0 {
                    let elapsed = started.elapsed().as_secs_f64();
                    let ok = succeeded_so_far.load(std::sync::atomic::Ordering::SeqCst);
                    info!(
                        completed = done,
                        total,
                        rate_per_s = format!("{:.2}", done as f64 / elapsed.max(0.001)),
                        success_ratio = format!("{:.2}", ok as f64 / done as f64),
                        elapsed_s = format!("{elapsed:.1}"),
                        "batch progress"
                    );
                }
                item
            }));
        }

        let mut items: Vec<BatchItem> = join_all(tasks)
            .await
            .into_iter()
            .filter_map(|joined| joined.ok())
            .collect();
        items.sort_by(|a, b| a.url.cmp(&b.url));

        let succeeded = items.iter().filter(|i| i.success).count();
        let failed_urls: Vec<String> = items
            .iter()
            .filter(|i| !i.success)
            .map(|i| i.url.clone())
            .collect();
        let duration_s = started.elapsed().as_secs_f64();

        let report = BatchReport {
            total,
            succeeded,
            failed: total - succeeded,
            duration_s,
            urls_per_second: total as f64 / duration_s.max(0.001),
            items,
            failed_urls,
        };
        info!(
            total = report.total,
            succeeded = report.succeeded,
            failed = report.failed,
            duration_s = format!("{:.1}", report.duration_s),
            "batch run finished"
        );
        report
    }
}

fn sidecar_path(input: &Path) -> PathBuf {
    let mut name = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "batch".to_string());
    name.push_str(".failed");
    input.with_file_name(name)
}
