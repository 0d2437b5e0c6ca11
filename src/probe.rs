//! Single HTTP/HTTPS probe attempts and the raw response parser.

use crate::error::Result;
use crate::types::{ProbeOutcome, Scheme};
use async_trait::async_trait;
use regex::Regex;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time;

pub const USER_AGENT: &str = concat!("http-sweep/", env!("CARGO_PKG_VERSION"));

/// Maximum number of characters kept in a body sample.
pub const SAMPLE_CHARS: usize = 160;

const READ_CHUNK: usize = 2048;

/// Everything needed for one network round trip.
#[derive(Debug, Clone, Copy)]
pub struct ProbeTarget<'a> {
    pub host: &'a str,
    pub port: u16,
    pub scheme: Scheme,
    pub path: &'a str,
    pub timeout: Duration,
    pub max_bytes: usize,
}

/// One probe attempt. `None` means "no response": refused, timed out, TLS
/// failure, or bytes that do not start with an HTTP status line.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, target: &ProbeTarget<'_>) -> Option<ProbeOutcome>;
}

/// Prober that speaks HTTP/1.1 over TCP, optionally wrapped in TLS.
///
/// Certificate chains and hostnames are not verified: local services commonly
/// run with self-signed certificates.
pub struct HttpProber {
    tls: tokio_native_tls::TlsConnector,
}

impl HttpProber {
    pub fn new() -> Result<Self> {
        let connector = native_tls::TlsConnector::builder()
            .danger_accept_invalid_certs(true)
            .danger_accept_invalid_hostnames(true)
            .build()?;
        Ok(Self {
            tls: tokio_native_tls::TlsConnector::from(connector),
        })
    }

    async fn round_trip(&self, target: &ProbeTarget<'_>) -> std::io::Result<Vec<u8>> {
        let request = build_request(target.host, target.port, target.path);
        let stream = time::timeout(
            target.timeout,
            TcpStream::connect((target.host, target.port)),
        )
        .await??;

        match target.scheme {
            Scheme::Http => exchange(stream, &request, target.timeout, target.max_bytes).await,
            Scheme::Https => {
                let tls = time::timeout(target.timeout, self.tls.connect(target.host, stream))
                    .await?
                    .map_err(std::io::Error::other)?;
                exchange(tls, &request, target.timeout, target.max_bytes).await
            }
        }
    }
}

#[async_trait]
impl Prober for HttpProber {
    async fn probe(&self, target: &ProbeTarget<'_>) -> Option<ProbeOutcome> {
        let raw = match self.round_trip(target).await {
            Ok(raw) if !raw.is_empty() => raw,
            Ok(_) => return None,
            Err(e) => {
                log::trace!(
                    "{}://{}:{}{} failed: {e}",
                    target.scheme,
                    target.host,
                    target.port,
                    target.path
                );
                return None;
            }
        };

        let parsed = parse_http_response(&raw)?;
        Some(ProbeOutcome {
            scheme: target.scheme,
            path: target.path.to_string(),
            status: parsed.status,
            reason: parsed.reason,
            headers: parsed.head,
            sample: body_sample(parsed.body),
        })
    }
}

/// Request text sent on every probe. Header order and spelling are fixed.
pub fn build_request(host: &str, port: u16, path: &str) -> Vec<u8> {
    format!(
        "GET {path} HTTP/1.1\r\n\
         Host: {host}:{port}\r\n\
         User-Agent: {USER_AGENT}\r\n\
         Accept: */*\r\n\
         Connection: close\r\n\
         \r\n"
    )
    .into_bytes()
}

/// Write the request, then read until `max_bytes` or EOF. Every I/O step is
/// bounded by `timeout`.
async fn exchange<S>(
    mut stream: S,
    request: &[u8],
    timeout: Duration,
    max_bytes: usize,
) -> std::io::Result<Vec<u8>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    time::timeout(timeout, stream.write_all(request)).await??;
    time::timeout(timeout, stream.flush()).await??;

    let mut raw = Vec::with_capacity(max_bytes.min(READ_CHUNK * 4));
    let mut buf = [0u8; READ_CHUNK];
    while raw.len() < max_bytes {
        let want = READ_CHUNK.min(max_bytes - raw.len());
        let n = match time::timeout(timeout, stream.read(&mut buf[..want])).await? {
            Ok(n) => n,
            // TLS peers often close without close_notify.
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof && !raw.is_empty() => 0,
            Err(e) => return Err(e),
        };
        if n == 0 {
            break;
        }
        raw.extend_from_slice(&buf[..n]);
    }

    // Close errors are irrelevant once the response is in hand.
    let _ = time::timeout(timeout, stream.shutdown()).await;
    Ok(raw)
}

/// Status line and segments of a response that looked like HTTP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedResponse<'a> {
    pub status: u16,
    pub reason: String,
    pub head: String,
    pub body: &'a [u8],
}

fn status_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^HTTP/\d(?:\.\d)?\s+(\d{3})(?:\s+(.*))?$").expect("static regex")
    })
}

/// Split raw bytes into head and body and parse the status line.
///
/// Returns `None` when the first line is not `HTTP/<version> <code> [reason]`.
pub fn parse_http_response(raw: &[u8]) -> Option<ParsedResponse<'_>> {
    let (head, body) = match find_subslice(raw, b"\r\n\r\n") {
        Some(idx) => (&raw[..idx], &raw[idx + 4..]),
        None => (raw, &raw[raw.len()..]),
    };

    // Only CRLF ends the status line; bare LF stays inside it and fails the match.
    let first = match find_subslice(head, b"\r\n") {
        Some(idx) => &head[..idx],
        None => head,
    };
    let first = latin1(first);
    let caps = status_line_re().captures(first.trim())?;
    let status: u16 = caps.get(1)?.as_str().parse().ok()?;
    let reason = caps
        .get(2)
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default();

    Some(ParsedResponse {
        status,
        reason,
        head: latin1(head),
        body,
    })
}

/// Decode the body permissively, collapse whitespace runs and truncate.
pub fn body_sample(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.chars().take(SAMPLE_CHARS).collect()
}

fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}
