use std::fmt;
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

pub const DEFAULT_RENDER_EVERY: Duration = Duration::from_millis(150);

/// Counters shared between scan workers and the progress renderer.
#[derive(Debug)]
pub struct LiveState {
    total: u64,
    scanned: AtomicU64,
    http: AtomicU64,
    kept: AtomicU64,
    current: Mutex<String>,
    started: Instant,
    finished: OnceLock<Duration>,
}

impl LiveState {
    pub fn new(total: usize) -> Self {
        Self {
            total: total as u64,
            scanned: AtomicU64::new(0),
            http: AtomicU64::new(0),
            kept: AtomicU64::new(0),
            current: Mutex::new("initializing".to_string()),
            started: Instant::now(),
            finished: OnceLock::new(),
        }
    }

    pub fn set_current(&self, activity: impl Into<String>) {
        let mut guard = self.current.lock().unwrap_or_else(|e| e.into_inner());
        *guard = activity.into();
    }

    pub fn bump_scanned(&self) {
        self.scanned.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bump_http(&self) {
        self.http.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bump_kept(&self) {
        self.kept.fetch_add(1, Ordering::Relaxed);
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn scanned(&self) -> u64 {
        self.scanned.load(Ordering::Relaxed)
    }

    pub fn http(&self) -> u64 {
        self.http.load(Ordering::Relaxed)
    }

    pub fn kept(&self) -> u64 {
        self.kept.load(Ordering::Relaxed)
    }

    /// Time since the counters were created, frozen once [`finish`](Self::finish) is called.
    pub fn elapsed(&self) -> Duration {
        self.finished
            .get()
            .copied()
            .unwrap_or_else(|| self.started.elapsed())
    }

    /// Stop the clock. Later calls keep the first value.
    pub fn finish(&self) {
        let _ = self.finished.set(self.started.elapsed());
    }

    pub fn snapshot(&self) -> Snapshot {
        let current = self
            .current
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        Snapshot {
            elapsed: self.elapsed(),
            total: self.total,
            scanned: self.scanned(),
            http: self.http(),
            kept: self.kept(),
            current,
        }
    }
}

/// Point-in-time copy of the live counters.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub elapsed: Duration,
    pub total: u64,
    pub scanned: u64,
    pub http: u64,
    pub kept: u64,
    pub current: String,
}

impl Snapshot {
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.scanned as f64 / self.total as f64 * 100.0
        }
    }

    /// Ports scanned per second.
    pub fn rate(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.scanned as f64 / secs
        } else {
            0.0
        }
    }
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:6.2}%] {:>6.1}s scanned {}/{} ({:.0}/s) | http:{} kept:{} | now: {}",
            self.percent(),
            self.elapsed.as_secs_f64(),
            self.scanned,
            self.total,
            self.rate(),
            self.http,
            self.kept,
            self.current
        )
    }
}

/// Redraw the progress line on stderr every `every` until `stop` fires.
///
/// Runs on its own task and only reads the counters.
pub fn spawn_renderer(
    live: Arc<LiveState>,
    every: Duration,
    stop: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(every.max(Duration::from_millis(10)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = stop.cancelled() => break,
                _ = ticker.tick() => draw(&live.snapshot(), false),
            }
        }
        draw(&live.snapshot(), true);
    })
}

fn draw(snapshot: &Snapshot, last: bool) {
    let mut err = std::io::stderr().lock();
    // Trailing spaces wipe leftovers from a longer previous line.
    let _ = write!(err, "\r{snapshot}    ");
    if last {
        let _ = writeln!(err);
    }
    let _ = err.flush();
}
