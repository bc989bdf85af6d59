//! # Warming Module
//!
//! Background prefetch of region-scoped content.
//!
//! A pass walks every configured region: the root operations (charts, home,
//! moods) are fetched through the [`ReadThroughCache`], their documents are
//! handed to the [`DependencyWalker`], and the referenced entities are
//! fetched in turn down to `max_depth`. Keys that already hold a live entry
//! are not refetched, but their cached documents are still walked so that
//! shorter-lived entities below them get refreshed. A pass over a warm cache
//! makes no upstream calls.
//!
//! Passes run once per `interval`, on demand through
//! [`WarmingScheduler::trigger`], and once at start-up when the cache
//! survives restarts. Only one pass runs at a time.

pub mod walker;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::cache::{CacheKey, ReadThroughCache};
use crate::operation::Operation;
use crate::region::{Region, RegionSpec};
use crate::sources::Params;

pub use walker::{DependencyWalker, WarmingTarget};

/// Warming schedule and scope.
#[derive(Debug, Clone)]
pub struct WarmingConfig {
    /// Time between passes.
    pub interval: Duration,
    /// Regions warmed in parallel.
    pub concurrency: usize,
    pub regions: Vec<Region>,
    /// Deepest level fetched; roots are depth 0.
    pub max_depth: u8,
}

impl Default for WarmingConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(24 * 3600),
            concurrency: 1,
            regions: Region::defaults(),
            max_depth: 2,
        }
    }
}

/// Outcome of one root operation in a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RootStatus {
    Fetched,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct RootReport {
    pub operation: Operation,
    pub status: RootStatus,
}

/// What a pass did in one region.
#[derive(Debug, Clone, Serialize)]
pub struct RegionReport {
    pub region: RegionSpec,
    pub roots: Vec<RootReport>,
    pub fetched: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl RegionReport {
    fn new(region: RegionSpec) -> Self {
        Self {
            region,
            roots: Vec::new(),
            fetched: 0,
            skipped: 0,
            failed: 0,
        }
    }

    pub fn root_status(&self, operation: Operation) -> Option<RootStatus> {
        self.roots
            .iter()
            .find(|r| r.operation == operation)
            .map(|r| r.status)
    }
}

/// Summary of a full pass over every configured region.
#[derive(Debug, Clone, Serialize)]
pub struct PassReport {
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
    pub regions: Vec<RegionReport>,
}

impl PassReport {
    pub fn fetched(&self) -> usize {
        self.regions.iter().map(|r| r.fetched).sum()
    }

    pub fn skipped(&self) -> usize {
        self.regions.iter().map(|r| r.skipped).sum()
    }

    pub fn failed(&self) -> usize {
        self.regions.iter().map(|r| r.failed).sum()
    }
}

/// Keys consumed so far in a pass, shared by every region.
type SeenKeys = Arc<Mutex<HashSet<CacheKey>>>;

/// Clears the running flag when a pass ends, however it ends.
struct PassGuard<'a>(&'a AtomicBool);

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Periodically refreshes the cache for every configured region.
pub struct WarmingScheduler {
    cache: Arc<ReadThroughCache>,
    walker: DependencyWalker,
    config: WarmingConfig,
    running: AtomicBool,
    last_report: Mutex<Option<PassReport>>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl WarmingScheduler {
    pub fn new(cache: Arc<ReadThroughCache>, config: WarmingConfig) -> Self {
        Self {
            cache,
            walker: DependencyWalker::default(),
            config,
            running: AtomicBool::new(false),
            last_report: Mutex::new(None),
            cancel: CancellationToken::new(),
            task: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &WarmingConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn last_report(&self) -> Option<PassReport> {
        self.last_report.lock().clone()
    }

    /// Starts the periodic task. A pass runs immediately when the cache
    /// backend is persistent, then once per interval.
    pub fn spawn(self: &Arc<Self>) {
        let mut slot = self.task.lock();
        if slot.is_some() {
            warn!("⚠️ El calentamiento ya estaba iniciado");
            return;
        }

        let scheduler = Arc::clone(self);
        let warm_on_start = self.cache.store().is_persistent();
        let period = self.config.interval;

        info!(
            "🔥 Calentamiento programado cada {} para {} regiones",
            humantime::format_duration(period),
            self.config.regions.len()
        );

        *slot = Some(tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            if !warm_on_start {
                // First tick completes immediately.
                ticker.tick().await;
            }

            loop {
                tokio::select! {
                    _ = scheduler.cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        tokio::select! {
                            _ = scheduler.cancel.cancelled() => {
                                info!("🛑 Pase de calentamiento interrumpido");
                                break;
                            }
                            _ = scheduler.run_pass() => {}
                        }
                    }
                }
            }
            debug!("Tarea de calentamiento finalizada");
        }));
    }

    /// Starts a pass in the background without waiting for it.
    ///
    /// Returns `false` when a pass is already running.
    pub fn trigger(self: &Arc<Self>) -> bool {
        if !self.begin() {
            info!("⏳ Ya hay un pase de calentamiento en curso");
            return false;
        }

        let scheduler = Arc::clone(self);
        tokio::spawn(async move {
            let guard = PassGuard(&scheduler.running);
            tokio::select! {
                _ = scheduler.cancel.cancelled() => {}
                _ = scheduler.execute_pass() => {}
            }
            drop(guard);
        });
        true
    }

    /// Runs one pass to completion, or returns `None` if one is in progress.
    pub async fn run_pass(&self) -> Option<PassReport> {
        let Some(_guard) = self.try_begin() else {
            info!("⏳ Ya hay un pase de calentamiento en curso");
            return None;
        };
        Some(self.execute_pass().await)
    }

    /// Warms a single region outside the schedule.
    pub async fn warm_region(&self, region: &Region) -> RegionReport {
        self.warmer().warm(region.clone(), SeenKeys::default()).await
    }

    /// Cancels the periodic task and waits for it to stop.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let handle = self.task.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!("❌ La tarea de calentamiento terminó con error: {}", e);
            }
        }
        info!("👋 Calentamiento detenido");
    }

    fn begin(&self) -> bool {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn try_begin(&self) -> Option<PassGuard<'_>> {
        self.begin().then(|| PassGuard(&self.running))
    }

    fn warmer(&self) -> RegionWarmer {
        RegionWarmer {
            cache: Arc::clone(&self.cache),
            walker: self.walker.clone(),
            max_depth: self.config.max_depth,
        }
    }

    async fn execute_pass(&self) -> PassReport {
        let started_at = Utc::now();
        let start = Instant::now();
        let warmer = self.warmer();
        let seen = SeenKeys::default();

        info!("🔥 Iniciando pase de calentamiento ({} regiones)", self.config.regions.len());

        let regions: Vec<RegionReport> = stream::iter(self.config.regions.clone())
            .map(move |region| warmer.clone().warm(region, Arc::clone(&seen)))
            .buffered(self.config.concurrency.max(1))
            .collect()
            .await;

        let report = PassReport {
            started_at,
            elapsed: start.elapsed(),
            regions,
        };

        info!(
            "✅ Pase de calentamiento completado en {:?}: {} obtenidos, {} omitidos, {} fallidos",
            report.elapsed,
            report.fetched(),
            report.skipped(),
            report.failed()
        );
        let stats = self.cache.store().stats().await;
        debug!("📊 Caché tras el pase: {} entradas, hit rate {:.2}", stats.entries, stats.hit_rate());

        *self.last_report.lock() = Some(report.clone());
        report
    }
}

/// Walks one region. Owns everything it touches so region walks can run
/// side by side inside a spawned pass.
#[derive(Clone)]
struct RegionWarmer {
    cache: Arc<ReadThroughCache>,
    walker: DependencyWalker,
    max_depth: u8,
}

impl RegionWarmer {
    /// Breadth-first walk from the roots of one region. Each key in `seen` is
    /// consumed at most once.
    async fn warm(self, region: Region, seen: SeenKeys) -> RegionReport {
        let spec = self.cache.resolver().resolve_region(&region);
        let mut report = RegionReport::new(spec.clone());
        let mut queue: VecDeque<WarmingTarget> = Operation::WARMING_ROOTS
            .iter()
            .map(|&operation| WarmingTarget {
                operation,
                region: spec.clone(),
                params: Params::new(),
                depth: 0,
            })
            .collect();

        while let Some(target) = queue.pop_front() {
            let key = self.cache.key_for(target.operation, &target.region, &target.params);
            if !seen.lock().insert(key.clone()) {
                continue;
            }

            let walkable = target.depth < self.max_depth;
            let status = if walkable {
                match self.cache.store().get(key.as_str()).await {
                    Some(document) => {
                        report.skipped += 1;
                        queue.extend(self.walker.extract_references(
                            &document,
                            target.operation,
                            &target.region,
                            target.depth,
                        ));
                        RootStatus::Skipped
                    }
                    None => self.fetch(&target, &mut report, &mut queue).await,
                }
            } else if self
                .cache
                .is_cached(target.operation, &target.region, &target.params)
                .await
            {
                report.skipped += 1;
                RootStatus::Skipped
            } else {
                self.fetch(&target, &mut report, &mut queue).await
            };

            if target.depth == 0 {
                report.roots.push(RootReport {
                    operation: target.operation,
                    status,
                });
            }
        }

        info!(
            "🌍 Región {} calentada: {} obtenidos, {} omitidos, {} fallidos",
            spec, report.fetched, report.skipped, report.failed
        );
        report
    }

    async fn fetch(
        &self,
        target: &WarmingTarget,
        report: &mut RegionReport,
        queue: &mut VecDeque<WarmingTarget>,
    ) -> RootStatus {
        match self
            .cache
            .refresh(target.operation, &target.region, &target.params)
            .await
        {
            Ok(document) => {
                report.fetched += 1;
                if target.depth < self.max_depth {
                    queue.extend(self.walker.extract_references(
                        &document,
                        target.operation,
                        &target.region,
                        target.depth,
                    ));
                }
                RootStatus::Fetched
            }
            Err(e) => {
                report.failed += 1;
                warn!(
                    "⚠️ Calentamiento de {} {} falló: {}",
                    target.operation, target.region, e
                );
                RootStatus::Failed
            }
        }
    }
}
