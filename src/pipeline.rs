use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, error, info, warn};

use crate::clean::clean_record;
use crate::clean::gazetteer::Gazetteer;
use crate::config::CrawlConfig;
use crate::crawl::{AbortReason, CrawlScheduler, ListingTarget, PageState};
use crate::dedup::{DedupStats, Deduplicator};
use crate::extract::ExtractionEngine;
use crate::fetch::{fetch_with_retry, Fetcher, RetryPolicy};
use crate::model::CleanedRecord;

/// How one (region, category) run ended and what it produced.
#[derive(Debug, Clone)]
pub struct TargetReport {
    pub region: String,
    pub category: String,
    pub state: PageState,
    pub pages: u32,
    pub urls: usize,
    pub records: usize,
    /// Profiles dropped for lacking a name.
    pub skipped: usize,
    pub profile_failures: usize,
}

impl TargetReport {
    pub fn is_partial(&self) -> bool {
        matches!(self.state, PageState::Aborted(_))
    }

    fn log(&self) {
        match &self.state {
            PageState::Aborted(AbortReason::FirstPageFailed(e)) => error!(
                "{} / {}: first listing page unreachable: {}",
                self.region, self.category, e
            ),
            PageState::Aborted(AbortReason::RetriesExhausted { page, .. }) => warn!(
                "{} / {}: stopped at page {} after retries, keeping {} partial records",
                self.region, self.category, page, self.records
            ),
            state => info!(
                "{} / {}: {:?} after {} pages, {} urls, {} records ({} skipped, {} failed)",
                self.region,
                self.category,
                state,
                self.pages,
                self.urls,
                self.records,
                self.skipped,
                self.profile_failures
            ),
        }
    }
}

pub struct CrawlSummary {
    pub records: Vec<CleanedRecord>,
    pub reports: Vec<TargetReport>,
    pub dedup: DedupStats,
}

enum Message {
    Record(CleanedRecord),
    Done(TargetReport),
}

/// Crawl every configured target with at most `concurrency` targets in
/// flight. Workers stream cleaned records back; this task is the only writer
/// of the deduplicator.
pub async fn run(
    config: &CrawlConfig,
    fetcher: Arc<dyn Fetcher>,
    gazetteer: Arc<Gazetteer>,
) -> Result<CrawlSummary> {
    let schedulers = config
        .targets()
        .into_iter()
        .map(|(region, category)| {
            CrawlScheduler::new(config, fetcher.clone(), ListingTarget::new(region, category))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let total = schedulers.len();
    let engine = Arc::new(ExtractionEngine::default());
    let semaphore = Arc::new(Semaphore::new(config.concurrency));
    let retry = config.retry_policy();

    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} targets ({msg})")?
            .progress_chars("=> "),
    );

    let (tx, mut rx) = mpsc::channel::<Message>(config.concurrency * 16);
    let t0 = Instant::now();
    info!("Crawling {} targets with concurrency {}", total, config.concurrency);

    let mut handles = Vec::with_capacity(total);
    for scheduler in schedulers {
        let worker = Worker {
            fetcher: fetcher.clone(),
            engine: engine.clone(),
            gazetteer: gazetteer.clone(),
            retry,
            tx: tx.clone(),
        };
        let sem = semaphore.clone();

        handles.push(tokio::spawn(async move {
            let Ok(_permit) = sem.acquire().await else {
                return;
            };
            let report = worker.crawl(scheduler).await;
            let _ = worker.tx.send(Message::Done(report)).await;
        }));
    }

    // rx closes once every worker has dropped its sender.
    drop(tx);

    let mut dedup: Deduplicator = Deduplicator::new();
    let mut reports = Vec::with_capacity(total);
    while let Some(message) = rx.recv().await {
        match message {
            Message::Record(record) => {
                dedup.insert(record);
                pb.set_message(format!("{} unique", dedup.len()));
            }
            Message::Done(report) => {
                report.log();
                reports.push(report);
                pb.inc(1);
            }
        }
    }
    pb.finish_and_clear();

    for handle in handles {
        if let Err(e) = handle.await {
            error!("Target worker panicked: {}", e);
        }
    }

    let stats = dedup.stats();
    let partial = reports.iter().filter(|r| r.is_partial()).count();
    info!(
        "Crawl finished in {:.1}s: {} unique records ({} superseded, {} duplicates rejected), {} of {} targets partial",
        t0.elapsed().as_secs_f64(),
        dedup.len(),
        stats.superseded,
        stats.rejected,
        partial,
        total
    );

    Ok(CrawlSummary {
        records: dedup.into_records(),
        reports,
        dedup: stats,
    })
}

struct Worker {
    fetcher: Arc<dyn Fetcher>,
    engine: Arc<ExtractionEngine>,
    gazetteer: Arc<Gazetteer>,
    retry: RetryPolicy,
    tx: mpsc::Sender<Message>,
}

impl Worker {
    /// Drain one scheduler. Profile failures and nameless profiles are counted
    /// and skipped; nothing here can fail the run.
    async fn crawl(&self, mut scheduler: CrawlScheduler) -> TargetReport {
        let region = scheduler.target().region.clone();
        let category = scheduler.target().category.clone();
        info!("Starting {} / {}", region, category);

        let mut urls = 0;
        let mut records = 0;
        let mut skipped = 0;
        let mut profile_failures = 0;

        'pages: while let Some(batch) = scheduler.next_links().await {
            urls += batch.len();
            for url in batch {
                let html = match fetch_with_retry(self.fetcher.as_ref(), &url, &self.retry).await {
                    Ok(html) => html,
                    Err(e) => {
                        warn!("Skipping profile: {}", e);
                        profile_failures += 1;
                        continue;
                    }
                };

                let raw = self.engine.extract(&url, &html, &category);
                if raw.name.is_none() {
                    debug!("No name on {}, dropping", url);
                    skipped += 1;
                    continue;
                }

                let record = clean_record(raw, &region, &self.gazetteer);
                if self.tx.send(Message::Record(record)).await.is_err() {
                    break 'pages;
                }
                records += 1;
            }
        }

        TargetReport {
            region,
            category,
            state: scheduler.state().clone(),
            pages: scheduler.pages_fetched(),
            urls,
            records,
            skipped,
            profile_failures,
        }
    }
}
