use async_trait::async_trait;
use http_sweep::ports::PortSource;
use http_sweep::probe::{ProbeTarget, Prober};
use http_sweep::types::{ProbeOutcome, Scheme};
use http_sweep::{ScanConfig, ScanOptions, Scanner};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

/// Loopback responder that reads the request head and answers with `response`.
async fn spawn_responder(response: &'static [u8]) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        loop {
            let Ok((mut sock, _)) = listener.accept().await else { break };
            tokio::spawn(async move {
                let mut buf = [0u8; 1024];
                let _ = sock.read(&mut buf).await;
                let _ = sock.write_all(response).await;
                let _ = sock.shutdown().await;
                // Wait for the client to hang up.
                let _ = sock.read(&mut buf).await;
            });
        }
    });
    port
}

fn options_for(port: u16) -> ScanOptions {
    ScanOptions {
        ports: PortSource::List(vec![port]),
        timeout_ms: 1000,
        ..Default::default()
    }
}

#[tokio::test]
async fn mock_responder_yields_single_hit() {
    let port = spawn_responder(b"HTTP/1.1 200 OK\r\n\r\n{\"status\":\"ok\"}").await;
    let config = ScanConfig::new(ScanOptions {
        match_regex: Some(r#""status":"ok""#.into()),
        ..options_for(port)
    })
    .unwrap();

    let scanner = Scanner::new(config).unwrap();
    let live = scanner.live_state();
    let report = scanner.run(live.clone(), CancellationToken::new()).await;

    assert_eq!(report.hits.len(), 1, "hits: {:?}", report.hits);
    let hit = &report.hits[0];
    assert_eq!(hit.port, port);
    assert_eq!(hit.scheme, Scheme::Http);
    assert_eq!(hit.path, "/");
    assert_eq!(hit.status, Some(200));
    assert!(hit.matched);
    assert_eq!(hit.sample, r#"{"status":"ok"}"#);

    assert_eq!((live.scanned(), live.http(), live.kept()), (1, 1, 1));
    assert_eq!(report.meta.hits, 1);
    assert!(!report.meta.cancelled);
    assert_eq!(report.meta.match_regex.as_deref(), Some(r#""status":"ok""#));
}

#[tokio::test]
async fn unmatched_content_is_dropped_but_counted() {
    let port = spawn_responder(b"HTTP/1.1 200 OK\r\n\r\nnothing here").await;
    let config = ScanConfig::new(ScanOptions {
        schemes: vec![Scheme::Http],
        match_substring: Some("status".into()),
        ..options_for(port)
    })
    .unwrap();

    let scanner = Scanner::new(config).unwrap();
    let live = scanner.live_state();
    let report = scanner.run(live.clone(), CancellationToken::new()).await;
    assert!(report.hits.is_empty());
    assert_eq!((live.scanned(), live.http(), live.kept()), (1, 1, 0));
}

#[tokio::test]
async fn ignored_status_and_non_http_responders() {
    let not_found = spawn_responder(b"HTTP/1.1 404 Not Found\r\n\r\n").await;
    let ssh = spawn_responder(b"SSH-2.0-OpenSSH_9.6\r\n").await;
    let ok = spawn_responder(b"HTTP/1.0 200 OK\r\nServer: dev\r\n\r\n<h1>hi</h1>").await;
    let config = ScanConfig::new(ScanOptions {
        ports: PortSource::List(vec![not_found, ssh, ok]),
        schemes: vec![Scheme::Http],
        paths: vec!["/".into(), "/healthz".into()],
        ignore_status_classes: vec![4],
        timeout_ms: 1000,
        ..Default::default()
    })
    .unwrap();

    let scanner = Scanner::new(config).unwrap();
    let report = scanner.run(scanner.live_state(), CancellationToken::new()).await;
    let got: Vec<(u16, String)> = report.hits.iter().map(|h| (h.port, h.path.clone())).collect();
    assert_eq!(got, vec![(ok, "/".to_string()), (ok, "/healthz".to_string())]);
}

#[tokio::test]
async fn closed_port_is_no_response() {
    // Bind then drop to get a port that is very likely closed.
    let port = {
        let l = TcpListener::bind("127.0.0.1:0").await.unwrap();
        l.local_addr().unwrap().port()
    };
    let config = ScanConfig::new(ScanOptions {
        retries: 2,
        ..options_for(port)
    })
    .unwrap();
    let scanner = Scanner::new(config).unwrap();
    let live = scanner.live_state();
    let report = scanner.run(live.clone(), CancellationToken::new()).await;
    assert!(report.hits.is_empty());
    assert_eq!((live.scanned(), live.http()), (1, 0));
}

/// Loopback TLS responder with a self-signed certificate.
async fn spawn_tls_responder(response: &'static [u8]) -> u16 {
    let identity = native_tls::Identity::from_pkcs8(
        include_bytes!("fixtures/loopback.crt"),
        include_bytes!("fixtures/loopback.key"),
    )
    .unwrap();
    let acceptor = tokio_native_tls::TlsAcceptor::from(native_tls::TlsAcceptor::new(identity).unwrap());
    let acceptor = Arc::new(acceptor);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        loop {
            let Ok((sock, _)) = listener.accept().await else { break };
            let acceptor = acceptor.clone();
            tokio::spawn(async move {
                let Ok(mut tls) = acceptor.accept(sock).await else { return };
                let mut buf = [0u8; 1024];
                let _ = tls.read(&mut buf).await;
                let _ = tls.write_all(response).await;
                let _ = tls.shutdown().await;
            });
        }
    });
    port
}

#[tokio::test]
async fn self_signed_https_responder_is_a_hit() {
    let port = spawn_tls_responder(b"HTTP/1.1 200 OK\r\nServer: dev\r\n\r\nsecure ok").await;
    let config = ScanConfig::new(ScanOptions {
        schemes: vec![Scheme::Https],
        ..options_for(port)
    })
    .unwrap();

    let scanner = Scanner::new(config).unwrap();
    let live = scanner.live_state();
    let report = scanner.run(live.clone(), CancellationToken::new()).await;

    assert_eq!(report.hits.len(), 1, "hits: {:?}", report.hits);
    let hit = &report.hits[0];
    assert_eq!((hit.port, hit.scheme), (port, Scheme::Https));
    assert_eq!(hit.status, Some(200));
    assert_eq!(hit.sample, "secure ok");
    assert_eq!((live.scanned(), live.http(), live.kept()), (1, 1, 1));
}

#[tokio::test]
async fn response_is_cut_at_max_bytes() {
    // 19-byte head followed by a body far larger than the cap.
    let mut response = b"HTTP/1.1 200 OK\r\n\r\n".to_vec();
    response.extend(std::iter::repeat(b'a').take(4000));
    let port = spawn_responder(Box::leak(response.into_boxed_slice())).await;
    let config = ScanConfig::new(ScanOptions {
        schemes: vec![Scheme::Http],
        max_bytes: 64,
        ..options_for(port)
    })
    .unwrap();

    let scanner = Scanner::new(config).unwrap();
    let report = scanner.run(scanner.live_state(), CancellationToken::new()).await;
    assert_eq!(report.hits.len(), 1);
    assert_eq!(report.hits[0].sample, "a".repeat(64 - 19));
    assert_eq!(report.meta.max_bytes, 64);
}

/// Tracks how many probes are in flight at once.
struct GaugeProber {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    calls: AtomicUsize,
    delay: Duration,
}

impl GaugeProber {
    fn new(delay: Duration) -> Self {
        Self {
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
            delay,
        }
    }
}

#[async_trait]
impl Prober for GaugeProber {
    async fn probe(&self, target: &ProbeTarget<'_>) -> Option<ProbeOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        // Even ports answer.
        (target.port % 2 == 0).then(|| ProbeOutcome {
            scheme: target.scheme,
            path: target.path.to_string(),
            status: 200,
            reason: "OK".into(),
            headers: String::new(),
            sample: String::new(),
        })
    }
}

fn gauge_config(concurrency: usize) -> ScanConfig {
    ScanConfig::new(ScanOptions {
        ports: PortSource::Range { start: 1000, end: 1199 },
        paths: vec!["/".into(), "/api".into()],
        concurrency,
        ..Default::default()
    })
    .unwrap()
}

#[tokio::test]
async fn concurrency_limit_is_never_exceeded() {
    let prober = Arc::new(GaugeProber::new(Duration::from_millis(2)));
    let scanner = Scanner::with_prober(gauge_config(5), SharedGauge(prober.clone()));
    let report = scanner.run(scanner.live_state(), CancellationToken::new()).await;
    // 100 even ports x 2 schemes x 2 paths
    assert_eq!(report.hits.len(), 400);
    let peak = prober.peak.load(Ordering::SeqCst);
    assert!(peak <= 5, "peak {peak} exceeded limit");
    assert!(peak >= 1);
    // Every port runs its full scheme x path matrix.
    assert_eq!(prober.calls.load(Ordering::SeqCst), 200 * 4);
}

/// Shares one gauge between the scanner and the test body.
struct SharedGauge(Arc<GaugeProber>);

#[async_trait]
impl Prober for SharedGauge {
    async fn probe(&self, target: &ProbeTarget<'_>) -> Option<ProbeOutcome> {
        self.0.probe(target).await
    }
}

#[tokio::test]
async fn cancellation_returns_partial_subset_promptly() {
    let full = Scanner::with_prober(gauge_config(10), GaugeProber::new(Duration::from_millis(1)));
    let full_report = full.run(full.live_state(), CancellationToken::new()).await;
    let all: HashSet<(u16, Scheme, String)> = full_report
        .hits
        .iter()
        .map(|h| (h.port, h.scheme, h.path.clone()))
        .collect();

    let slow = Scanner::with_prober(gauge_config(4), GaugeProber::new(Duration::from_millis(25)));
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        time::sleep(Duration::from_millis(150)).await;
        trigger.cancel();
    });

    let live = slow.live_state();
    let started = Instant::now();
    let partial = slow.run(live.clone(), cancel).await;
    let elapsed = started.elapsed();

    assert!(partial.meta.cancelled);
    assert!(partial.hits.len() < full_report.hits.len());
    assert!(partial
        .hits
        .iter()
        .all(|h| all.contains(&(h.port, h.scheme, h.path.clone()))));
    assert!(live.scanned() < live.total());
    // Signal at 150ms; one in-flight attempt (25ms) plus supervisor slack.
    assert!(elapsed < Duration::from_secs(2), "took {elapsed:?}");

    let mut sorted = partial.hits.clone();
    sorted.sort_by(|a, b| (a.port, a.scheme, &a.path).cmp(&(b.port, b.scheme, &b.path)));
    assert_eq!(sorted, partial.hits);
}
