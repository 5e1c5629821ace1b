use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Error;
use crossbeam_channel::{select, Receiver};
use sift_frontier::{is_fetchable, FrontierError, FrontierStats, FrontierStore, UrlRecord};
use sift_score::ScoringPipeline;
use tokio::time::{sleep, timeout};

use crate::collab::{Fetcher, LinkExtractor, PageMeta, PageOutcome, PageSink, RenderFetcher, TextExtractor};
use crate::config::CrawlerConfig;
use crate::pool::{DriverPool, PoolError};

const STORE_BACKOFF_CAP: Duration = Duration::from_secs(30);
const STATS_LOG_INTERVAL: Duration = Duration::from_secs(30);

/// The external collaborators a crawl runs against. Rendering is
/// optional; without a pool every page goes through the static path.
#[derive(Clone)]
pub struct Collaborators {
    pub fetcher: Arc<dyn Fetcher>,
    pub links: Arc<dyn LinkExtractor>,
    pub text: Arc<dyn TextExtractor>,
    pub sink: Arc<dyn PageSink>,
    pub renderers: Option<Arc<DriverPool<Box<dyn RenderFetcher>>>>,
}

#[derive(Debug, Default)]
pub struct CrawlReport {
    pub fetched: usize,
    pub kept: usize,
    pub failed: usize,
    pub deferred: usize,
    pub discovered: usize,
    pub stats: FrontierStats,
}

#[derive(Clone)]
struct WorkerCtx {
    store: Arc<FrontierStore>,
    collab: Collaborators,
    scoring: ScoringPipeline,
    config: CrawlerConfig,
    owner: String,
    counters: Arc<Counters>,
}

#[derive(Default)]
struct Counters {
    fetched: AtomicUsize,
    kept: AtomicUsize,
    failed: AtomicUsize,
    deferred: AtomicUsize,
    discovered: AtomicUsize,
    in_flight: AtomicUsize,
}

/// Drives a crawl to completion: reclaim expired leases, claim batches,
/// dispatch to the worker pool, repeat until the frontier holds neither
/// pending nor leased rows.
///
/// Per-record errors never escape their worker; only store failures
/// reach this loop, where they pause claiming with exponential backoff.
pub async fn run_crawl(
    config: &CrawlerConfig,
    store: Arc<FrontierStore>,
    collab: Collaborators,
    scoring: ScoringPipeline,
) -> anyhow::Result<CrawlReport> {
    let owner = format!("sift-{}", std::process::id());
    let counters = Arc::new(Counters::default());
    let stop = Arc::new(AtomicBool::new(false));

    let (tx_job, rx_job) = crossbeam_channel::bounded::<UrlRecord>(config.batch_size);
    let (tx_stop, rx_stop) = crossbeam_channel::unbounded::<()>();

    // Workers

    let mut workers = vec![];
    for id in 0..config.num_workers {
        let rx_job = rx_job.clone();
        let rx_stop = rx_stop.clone();
        let ctx = WorkerCtx {
            store: store.clone(),
            collab: collab.clone(),
            scoring: scoring.clone(),
            config: config.clone(),
            owner: owner.clone(),
            counters: counters.clone(),
        };
        let worker = thread::Builder::new()
            .name(format!("sift-worker-{id}"))
            .spawn(move || worker_loop(ctx, rx_job, rx_stop))?;
        workers.push(worker);
    }

    // Interrupt watcher

    if config.handle_sigint {
        let stop = stop.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                log::info!("interrupted, finishing in-flight work");
                stop.store(true, Ordering::SeqCst);
            }
        });
    }

    // Dispatch loop

    let mut backoff = config.store_backoff();
    let mut last_reclaim = tokio::time::Instant::now();
    let mut last_stats = tokio::time::Instant::now();
    let mut interrupted = false;

    loop {
        if stop.load(Ordering::SeqCst) {
            interrupted = true;
            break;
        }

        if last_reclaim.elapsed() >= config.reclaim_interval() {
            match store.reclaim_expired_leases() {
                Ok(0) => (),
                Ok(n) => log::info!("reclaimed {n} expired leases"),
                Err(e) => log::error!("lease reclaim failed: {e}"),
            }
            last_reclaim = tokio::time::Instant::now();
        }
        if last_stats.elapsed() >= STATS_LOG_INTERVAL {
            if let Ok(stats) = store.stats() {
                log::info!(
                    "frontier: {} pending, {} leased, {} success, {} failed",
                    stats.pending,
                    stats.leased,
                    stats.success,
                    stats.failed,
                );
            }
            last_stats = tokio::time::Instant::now();
        }

        let batch = match store.claim_batch(
            &owner,
            config.batch_size,
            config.lease_duration(),
            config.selection,
        ) {
            Ok(batch) => {
                backoff = config.store_backoff();
                batch
            }
            Err(e) => {
                // Leases stay leased; they are reclaimed after expiry
                // once the store recovers.
                log::error!("claim failed, backing off {backoff:?}: {e}");
                sleep(backoff).await;
                backoff = (backoff * 2).min(STORE_BACKOFF_CAP);
                continue;
            }
        };

        if batch.is_empty() {
            if counters.in_flight.load(Ordering::SeqCst) == 0 && frontier_drained(store.stats()) {
                break;
            }
            sleep(config.idle_poll()).await;
            continue;
        }

        for record in batch {
            counters.in_flight.fetch_add(1, Ordering::SeqCst);
            if tx_job.send(record).is_err() {
                counters.in_flight.fetch_sub(1, Ordering::SeqCst);
                break;
            }
        }
    }

    // Shutdown

    drop(tx_job);
    for _ in 0..config.num_workers {
        tx_stop.send(()).ok();
    }
    let join = tokio::task::spawn_blocking(move || {
        for worker in workers {
            match worker.join() {
                Ok(res) => res?,
                Err(_) => anyhow::bail!("worker panicked"),
            }
        }
        Ok::<(), Error>(())
    });
    timeout(Duration::from_secs(60), join).await???;

    if interrupted {
        anyhow::bail!("interrupted");
    }

    let report = CrawlReport {
        fetched: counters.fetched.load(Ordering::SeqCst),
        kept: counters.kept.load(Ordering::SeqCst),
        failed: counters.failed.load(Ordering::SeqCst),
        deferred: counters.deferred.load(Ordering::SeqCst),
        discovered: counters.discovered.load(Ordering::SeqCst),
        stats: store.stats()?,
    };
    log::info!(
        "crawl done: {} fetched, {} kept, {} failed, {} discovered",
        report.fetched,
        report.kept,
        report.failed,
        report.discovered,
    );
    Ok(report)
}

fn worker_loop(ctx: WorkerCtx, rx_job: Receiver<UrlRecord>, rx_stop: Receiver<()>) -> anyhow::Result<()> {
    loop {
        select! {
            recv(rx_job) -> record => {
                if let Ok(record) = record {
                    process_record(&ctx, record);
                    ctx.counters.in_flight.fetch_sub(1, Ordering::SeqCst);
                } else {
                    break;
                }
            },
            recv(rx_stop) -> _ => break,
        }
    }
    Ok(())
}

/// One URL, end to end. Every error is translated into a frontier
/// transition here; nothing propagates to the dispatch loop.
fn process_record(ctx: &WorkerCtx, record: UrlRecord) {
    let key = record.normalized_url.clone();
    match handle_page(ctx, &record) {
        Ok(Verdict::Done(outcome)) => {
            ctx.counters.fetched.fetch_add(1, Ordering::SeqCst);
            if outcome.kept {
                ctx.counters.kept.fetch_add(1, Ordering::SeqCst);
            }
            finish(ctx, &key, |s| s.mark_success(&key, &ctx.owner));
        }
        Ok(Verdict::Deferred) => {
            ctx.counters.deferred.fetch_add(1, Ordering::SeqCst);
            finish(ctx, &key, |s| s.release(&key, &ctx.owner));
        }
        Err(e) => {
            log::warn!("{}: {e:#}", record.url);
            ctx.counters.failed.fetch_add(1, Ordering::SeqCst);
            finish(ctx, &key, |s| s.mark_failure(&key, &ctx.owner));
        }
    }
}

fn finish<F>(ctx: &WorkerCtx, key: &str, transition: F)
where
    F: FnOnce(&FrontierStore) -> Result<(), FrontierError>,
{
    match transition(&ctx.store) {
        Ok(()) => (),
        // Anomaly, not fatal: the lease may have expired and been
        // handed elsewhere while we worked.
        Err(e @ (FrontierError::NotLeased(_) | FrontierError::UnknownUrl(_))) => {
            log::warn!("{key}: {e}");
        }
        Err(e) => log::error!("{key}: recording outcome failed: {e}"),
    }
}

enum Verdict {
    Done(PageOutcome),
    Deferred,
}

fn handle_page(ctx: &WorkerCtx, record: &UrlRecord) -> anyhow::Result<Verdict> {
    let url = &record.url;

    let page = ctx.collab.fetcher.fetch(url)?;
    if page.status >= 400 {
        anyhow::bail!("HTTP {}", page.status);
    }
    if !page.is_html(url) {
        anyhow::bail!(
            "not an HTML page (content type {})",
            page.content_type.as_deref().unwrap_or("unknown")
        );
    }

    let mut body = page.body;
    let mut rendered = false;
    if let Some(pool) = &ctx.collab.renderers {
        if ctx.scoring.detector.needs_rendering(&body) {
            match render_page(ctx, pool, url) {
                Ok(Some(rendered_body)) => {
                    body = rendered_body;
                    rendered = true;
                }
                // Render failed but the static body is usable.
                Ok(None) => (),
                Err(PoolError::Exhausted(t)) => {
                    log::info!("{url}: render pool exhausted after {t:?}, deferring");
                    return Ok(Verdict::Deferred);
                }
                Err(e) => log::warn!("{url}: {e}"),
            }
        }
    }

    let fields = ctx.collab.text.extract_text(&body);
    let relevance = ctx.scoring.relevance.evaluate(&fields);
    let relevant = ctx.scoring.relevance.decide(&relevance);

    let mut kept = false;
    let mut quality_total = 0.0;
    if relevant {
        let quality = ctx.scoring.quality.assess(&fields.body);
        quality_total = quality.total;
        if ctx.scoring.quality.should_retain(&fields.body, &quality) {
            let meta = PageMeta {
                url: url.clone(),
                title: fields.title.clone(),
                depth: record.depth,
                relevance_score: relevance.weighted_score,
                quality_score: quality.total,
                rendered,
            };
            ctx.collab
                .sink
                .store(&record.normalized_url, &fields.body, &meta)?;
            kept = true;
        } else {
            log::debug!("{url}: below quality gate ({:.1})", quality.total);
        }
    } else {
        log::debug!("{url}: not relevant");
    }

    if record.depth < ctx.config.max_depth {
        discover_links(ctx, record, &body);
    }

    Ok(Verdict::Done(PageOutcome {
        normalized_url: record.normalized_url.clone(),
        relevance_score: relevance.weighted_score,
        quality_score: quality_total,
        needed_rendering: rendered,
        kept,
    }))
}

fn render_page(
    ctx: &WorkerCtx,
    pool: &DriverPool<Box<dyn RenderFetcher>>,
    url: &str,
) -> Result<Option<String>, PoolError> {
    let mut driver = pool.checkout(ctx.config.driver_checkout_timeout())?;
    match driver.fetch_rendered(url) {
        Ok(page) => {
            pool.give_back(driver, true);
            Ok(Some(page.body))
        }
        Err(e) => {
            // The handle may be wedged; recycle it.
            pool.give_back(driver, false);
            log::warn!("{url}: rendered fetch failed: {e:#}");
            Ok(None)
        }
    }
}

/// An empty batch ends the crawl only once nothing is pending or
/// leased. A store error here is as transient as one on the claim path:
/// it keeps the loop alive rather than aborting the crawl.
fn frontier_drained(stats: Result<FrontierStats, FrontierError>) -> bool {
    match stats {
        Ok(stats) => stats.pending == 0 && stats.leased == 0,
        Err(e) => {
            log::error!("completion check failed: {e}");
            false
        }
    }
}

fn discover_links(ctx: &WorkerCtx, record: &UrlRecord, body: &str) {
    let next_depth = record.depth + 1;
    for link in ctx.collab.links.extract_links(body, &record.url) {
        if !is_fetchable(&link) {
            continue;
        }
        match ctx.store.insert(&link, Some(&record.url), next_depth) {
            Ok(true) => {
                ctx.counters.discovered.fetch_add(1, Ordering::SeqCst);
            }
            Ok(false) => (),
            // A link that won't parse is a discarded candidate, nothing
            // more.
            Err(FrontierError::InvalidUrl(_)) => (),
            Err(e) => log::error!("queueing {link} failed: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(pending: u64, leased: u64) -> FrontierStats {
        FrontierStats {
            pending,
            leased,
            ..Default::default()
        }
    }

    #[test]
    fn crawl_ends_only_when_nothing_is_pending_or_leased() {
        assert!(frontier_drained(Ok(stats(0, 0))));
        assert!(!frontier_drained(Ok(stats(3, 0))));
        assert!(!frontier_drained(Ok(stats(0, 1))));
    }

    #[test]
    fn store_errors_during_the_completion_check_keep_the_crawl_alive() {
        let err = FrontierError::from(rusqlite::Error::InvalidQuery);
        assert!(!frontier_drained(Err(err)));
    }
}
