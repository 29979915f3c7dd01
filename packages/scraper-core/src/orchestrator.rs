use anyhow::{Context, Result};
use futures::stream::{self, StreamExt};
use serde_json::Value;

use crate::checkpoint::CheckpointStore;
use crate::extract::{self, ProductExtractor};
use crate::fetch::{PageFetcher, ProductClient};
use crate::output::OutputWriter;
use crate::proxy::{self, ProxyEndpoint};
use crate::types::{self, CheckpointStatus, FetchOutcome, ProductTask};

/// Aggregate result of one scraping run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct ScrapeReport {
    pub completed: u64,
    pub failed: u64,
}

impl ScrapeReport {
    pub fn total(&self) -> u64 {
        self.completed + self.failed
    }
}

/// Emit an aggregate progress line every this many resolved tasks.
const PROGRESS_INTERVAL: u64 = 100;

/// Drives the domain × product cross-product through a bounded worker pool,
/// consulting the checkpoint ledger before dispatch and recording outcomes
/// after.
pub struct Orchestrator<S: CheckpointStore, F: PageFetcher> {
    checkpoints: S,
    client: ProductClient<F>,
    extractor: ProductExtractor,
    writer: OutputWriter,
    proxies: Vec<ProxyEndpoint>,
    max_workers: usize,
}

impl<S: CheckpointStore, F: PageFetcher> Orchestrator<S, F> {
    pub fn new(
        checkpoints: S,
        client: ProductClient<F>,
        writer: OutputWriter,
        proxies: Vec<ProxyEndpoint>,
        max_workers: usize,
    ) -> Self {
        Self {
            checkpoints,
            client,
            extractor: ProductExtractor::new(),
            writer,
            proxies,
            max_workers: max_workers.max(1),
        }
    }

    /// Expand the full cross-product of (domain, product_id) pairs, in input
    /// order. Duplicate inputs simply yield duplicate tasks; reprocessing is
    /// idempotent.
    pub fn expand_tasks(domains: &[String], product_ids: &[String]) -> Vec<ProductTask> {
        let mut tasks = Vec::with_capacity(domains.len() * product_ids.len());
        for domain in domains {
            for product_id in product_ids {
                tasks.push(ProductTask::new(domain.clone(), product_id.clone()));
            }
        }
        tasks
    }

    /// Run every task to completion once (subject to ledger-based skipping)
    /// and return completed/failed counts. After a run that recorded any
    /// ledger rows at all, the ledger is cleared — resumption only protects
    /// an *interrupted* run.
    pub async fn run(&self, domains: &[String], product_ids: &[String]) -> Result<ScrapeReport> {
        let tasks = Self::expand_tasks(domains, product_ids);
        let total = tasks.len() as u64;
        tracing::info!(
            workers = self.max_workers,
            tasks = total,
            proxies = self.proxies.len(),
            "starting scrape"
        );

        // Worker slot ids cycle over submitted tasks, not physical threads;
        // the slot determines which proxy (if any) a task routes through.
        let mut outcomes = stream::iter(tasks.into_iter().enumerate().map(|(index, task)| {
            let worker = index % self.max_workers + 1;
            self.process(task, worker)
        }))
        .buffer_unordered(self.max_workers);

        let mut report = ScrapeReport::default();
        while let Some(succeeded) = outcomes.next().await {
            if succeeded {
                report.completed += 1;
            } else {
                report.failed += 1;
            }
            let resolved = report.total();
            if resolved % PROGRESS_INTERVAL == 0 {
                tracing::info!(
                    completed = report.completed,
                    failed = report.failed,
                    remaining = total - resolved,
                    "progress"
                );
            }
        }

        tracing::info!(
            completed = report.completed,
            failed = report.failed,
            "scrape finished"
        );

        let stats = self.checkpoints.statistics().await?;
        tracing::info!(total = stats.total, by_status = ?stats.by_status, "final checkpoint stats");
        if stats.total > 0 {
            self.checkpoints
                .clear()
                .await
                .context("Failed to clear checkpoint ledger")?;
            tracing::info!("checkpoint ledger cleared, ready for the next run");
        }

        Ok(report)
    }

    /// Drive one task to a recorded outcome. Task-level errors never escape:
    /// they become an `error` checkpoint and count the task as failed, so a
    /// single bad task cannot halt the batch.
    async fn process(&self, task: ProductTask, worker: usize) -> bool {
        match self.try_process(&task, worker).await {
            Ok(succeeded) => succeeded,
            Err(error) => {
                tracing::error!(task = %task, %error, "task failed unexpectedly");
                if let Err(error) = self
                    .checkpoints
                    .record_outcome(&task.domain, &task.product_id, CheckpointStatus::Error)
                    .await
                {
                    tracing::error!(task = %task, %error, "failed to record error checkpoint");
                }
                false
            }
        }
    }

    async fn try_process(&self, task: &ProductTask, worker: usize) -> Result<bool> {
        if self
            .checkpoints
            .is_successfully_processed(&task.domain, &task.product_id)
            .await?
        {
            tracing::debug!(task = %task, "skipping, already processed");
            return Ok(true);
        }

        let proxy = proxy::for_worker(&self.proxies, worker);

        match self.client.fetch(task, proxy).await {
            FetchOutcome::Page { body } => {
                let record = match self.extractor.extract(&body) {
                    Some(fields) => Value::Object(fields),
                    None => {
                        tracing::warn!(task = %task, "no product data found in page");
                        types::no_data_record(task, &extract::page_title(&body), body.len())
                    }
                };
                self.writer.write(task, &record).await?;
                self.checkpoints
                    .record_outcome(&task.domain, &task.product_id, CheckpointStatus::Success)
                    .await?;
                tracing::info!(task = %task, worker, "processed");
                Ok(true)
            }
            FetchOutcome::NotFound => {
                self.writer.write(task, &types::not_found_record(task)).await?;
                self.checkpoints
                    .record_outcome(&task.domain, &task.product_id, CheckpointStatus::Success)
                    .await?;
                Ok(true)
            }
            FetchOutcome::FailedAllAttempts => {
                // The diagnostic still lands on disk so failed pairs can be
                // inspected after the run.
                self.writer.write(task, &types::failed_record(task)).await?;
                self.checkpoints
                    .record_outcome(&task.domain, &task.product_id, CheckpointStatus::Failed)
                    .await?;
                Ok(false)
            }
        }
    }
}
