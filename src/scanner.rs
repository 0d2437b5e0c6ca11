use crate::collector::ResultCollector;
use crate::config::{ContentMatch, ScanConfig};
use crate::error::Result;
use crate::filter::FilterPipeline;
use crate::probe::{HttpProber, ProbeTarget, Prober};
use crate::progress::LiveState;
use crate::types::{ProbeOutcome, ScanMeta, ScanReport};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use ::time::{format_description::well_known, OffsetDateTime};

/// Supervisor tick while waiting on workers.
pub const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Drives every target port through its scheme x path matrix.
///
/// - One task per port; a `Semaphore` sized to `concurrency` caps how many are probing.
/// - Combinations inside a port run sequentially under that port's permit, so open
///   sockets never exceed `concurrency`.
/// - A `CancellationToken` is checked before each port, combination and attempt.
pub struct Scanner<P = HttpProber> {
    config: Arc<ScanConfig>,
    prober: Arc<P>,
    ports: Arc<Vec<u16>>,
}

impl Scanner<HttpProber> {
    pub fn new(config: ScanConfig) -> Result<Self> {
        Ok(Self::with_prober(config, HttpProber::new()?))
    }
}

impl<P: Prober + 'static> Scanner<P> {
    pub fn with_prober(config: ScanConfig, prober: P) -> Self {
        let ports = config.target_ports();
        Self {
            config: Arc::new(config),
            prober: Arc::new(prober),
            ports: Arc::new(ports),
        }
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    pub fn ports(&self) -> &[u16] {
        &self.ports
    }

    /// Fresh progress counters sized to this scan.
    pub fn live_state(&self) -> Arc<LiveState> {
        Arc::new(LiveState::new(self.ports.len()))
    }

    /// Run to completion or cancellation. Cancellation returns the hits gathered so far.
    pub async fn run(&self, live: Arc<LiveState>, cancel: CancellationToken) -> ScanReport {
        let started = Instant::now();
        let sem = Arc::new(Semaphore::new(self.config.concurrency()));
        let collector = Arc::new(ResultCollector::new());
        let filter = Arc::new(FilterPipeline::from_config(&self.config));
        let mut set = JoinSet::new();

        log::info!(
            "scanning {} ports on {} (concurrency {}, timeout {:?})",
            self.ports.len(),
            self.config.host(),
            self.config.concurrency(),
            self.config.timeout()
        );

        for &port in self.ports.iter() {
            if cancel.is_cancelled() {
                break;
            }
            let worker = Worker {
                config: self.config.clone(),
                prober: self.prober.clone(),
                filter: filter.clone(),
                collector: collector.clone(),
                live: live.clone(),
                cancel: cancel.clone(),
            };
            let sem = sem.clone();
            set.spawn(async move {
                let permit = tokio::select! {
                    biased;
                    _ = worker.cancel.cancelled() => return,
                    permit = sem.acquire_owned() => permit,
                };
                let Ok(_permit) = permit else { return };
                if worker.cancel.is_cancelled() {
                    return;
                }
                worker.scan_port(port).await;
            });
        }

        let mut ticker = time::interval(POLL_INTERVAL);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
        let cancelled = loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break true,
                joined = set.join_next() => match joined {
                    None => break false,
                    Some(Err(e)) if e.is_panic() => log::error!("scan worker panicked: {e}"),
                    Some(_) => {}
                },
                _ = ticker.tick() => {
                    log::trace!("{} workers outstanding", set.len());
                }
            }
        };

        if cancelled {
            self.drain(&mut set).await;
        }

        let hits = collector.finalize().await;
        live.finish();
        live.set_current(if cancelled { "cancelled" } else { "done" });
        log::info!(
            "scan {} after {:.2}s: {} hits, {} ports scanned",
            if cancelled { "cancelled" } else { "finished" },
            started.elapsed().as_secs_f64(),
            hits.len(),
            live.scanned()
        );

        ScanReport {
            meta: self.meta(started.elapsed(), hits.len(), cancelled),
            hits,
        }
    }

    /// Let in-flight attempts finish, then abort whatever is still running.
    async fn drain(&self, set: &mut JoinSet<()>) {
        let grace = self.config.timeout() * 4 + POLL_INTERVAL * 2;
        let drained = time::timeout(grace, async {
            while set.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            log::warn!("aborting {} workers still running after {grace:?}", set.len());
            set.abort_all();
            while set.join_next().await.is_some() {}
        }
    }

    fn meta(&self, duration: Duration, hits: usize, cancelled: bool) -> ScanMeta {
        let cfg = &self.config;
        let (match_substring, match_regex) = match cfg.content_match() {
            ContentMatch::Any => (None, None),
            ContentMatch::Substring(s) => (Some(s.clone()), None),
            ContentMatch::Pattern(re) => (None, Some(re.as_str().to_string())),
        };
        let now = OffsetDateTime::now_utc();
        ScanMeta {
            host: cfg.host().to_string(),
            schemes: cfg.schemes().to_vec(),
            paths: cfg.paths().to_vec(),
            ports_total: self.ports.len() as u64,
            timeout_seconds: cfg.timeout().as_secs_f64(),
            concurrency: cfg.concurrency(),
            max_bytes: cfg.max_bytes(),
            retries: cfg.retries(),
            ignore_status_classes: cfg.ignore_status_classes().iter().copied().collect(),
            ignore_status_codes: cfg.ignore_status_codes().iter().copied().collect(),
            match_substring,
            match_regex,
            match_in_headers: cfg.match_in_headers(),
            duration_seconds: duration.as_secs_f64(),
            hits,
            cancelled,
            timestamp: now
                .format(&well_known::Rfc3339)
                .unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z")),
            timestamp_unix: now.unix_timestamp(),
        }
    }
}

struct Worker<P> {
    config: Arc<ScanConfig>,
    prober: Arc<P>,
    filter: Arc<FilterPipeline>,
    collector: Arc<ResultCollector>,
    live: Arc<LiveState>,
    cancel: CancellationToken,
}

impl<P: Prober> Worker<P> {
    async fn scan_port(&self, port: u16) {
        self.live.set_current(format!("probing :{port}"));
        let (outcomes, complete) = self.probe_matrix(port).await;
        // A port interrupted by cancellation keeps its hits but is not counted as scanned.
        if complete {
            self.live.bump_scanned();
        } else {
            log::debug!("port {port} interrupted by cancellation");
        }
        if outcomes.is_empty() {
            return;
        }
        self.live.bump_http();

        for outcome in &outcomes {
            if let Some(hit) = self.filter.evaluate(port, outcome) {
                log::info!(
                    "+ hit {} {} {} {} {} | {}",
                    hit.port,
                    hit.scheme.as_str().to_uppercase(),
                    hit.path,
                    outcome.status,
                    hit.reason,
                    hit.sample
                );
                self.collector.push(hit).await;
                self.live.bump_kept();
            }
        }
    }

    /// Visit every scheme x path combination in order, retrying "no response".
    ///
    /// The flag is false when cancellation cut the matrix short.
    async fn probe_matrix(&self, port: u16) -> (Vec<ProbeOutcome>, bool) {
        let cfg = &self.config;
        let mut outcomes = Vec::new();
        for &scheme in cfg.schemes() {
            for path in cfg.paths() {
                let target = ProbeTarget {
                    host: cfg.host(),
                    port,
                    scheme,
                    path: path.as_str(),
                    timeout: cfg.timeout(),
                    max_bytes: cfg.max_bytes(),
                };
                for attempt in 0..=cfg.retries() {
                    if self.cancel.is_cancelled() {
                        return (outcomes, false);
                    }
                    if let Some(outcome) = self.prober.probe(&target).await {
                        log::debug!("{scheme}://{}:{port}{path} -> {}", cfg.host(), outcome.status);
                        outcomes.push(outcome);
                        break;
                    }
                    if attempt < cfg.retries() {
                        log::trace!("retrying {scheme}://{}:{port}{path}", cfg.host());
                    }
                }
            }
        }
        (outcomes, true)
    }
}
