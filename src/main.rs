use std::path::PathBuf;
use std::time::Duration;

use http_sweep::config::{millis_ceil, ScanConfig, ScanOptions, DEFAULT_HOST};
use http_sweep::ports::{self, PortSource, Preset};
use http_sweep::progress::{self, DEFAULT_RENDER_EVERY};
use http_sweep::types::Scheme;
use http_sweep::{output, server, Scanner};

use anyhow::{Context, Result};
use clap::{ArgGroup, Parser};
use tokio_util::sync::CancellationToken;

/// http-sweep — scan local ports for HTTP/HTTPS responders.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "http-sweep",
    version,
    about = "Scan local ports for HTTP/HTTPS responders, with status and content filters.",
    long_about = None
)]
#[command(group(ArgGroup::new("port_source").args(["preset", "range", "ports", "ports_file"])))]
#[command(group(ArgGroup::new("content_match").args(["match_substring", "match_regex"])))]
struct Cli {
    /// Host to scan.
    #[arg(long, default_value = DEFAULT_HOST)]
    host: String,

    /// Preset port ranges: dev, common or full (default: dev).
    #[arg(long)]
    preset: Option<String>,

    /// Custom range "start-end", e.g. 3000-3999.
    #[arg(long)]
    range: Option<String>,

    /// Explicit ports, e.g. "80,443,8000-8010".
    #[arg(long)]
    ports: Option<String>,

    /// File with one port or range per line.
    #[arg(long = "ports-file")]
    ports_file: Option<PathBuf>,

    /// Comma-separated ports to skip, e.g. 22,25,3306.
    #[arg(long, value_delimiter = ',')]
    exclude: Vec<u16>,

    /// Schemes to try, in order.
    #[arg(long, value_delimiter = ',', default_value = "http,https")]
    schemes: Vec<Scheme>,

    /// Comma-separated request paths, e.g. "/,/api/health,/healthz".
    #[arg(long, value_delimiter = ',', default_value = "/")]
    paths: Vec<String>,

    /// Per-operation timeout in seconds (connect, write, each read).
    #[arg(long, default_value_t = 0.35)]
    timeout: f64,

    /// Ports probed at once.
    #[arg(long, default_value_t = 600)]
    concurrency: usize,

    /// Max bytes to read per response.
    #[arg(long = "max-bytes", default_value_t = 8192)]
    max_bytes: usize,

    /// Extra attempts per scheme/path after no response.
    #[arg(long, default_value_t = 0)]
    retries: u32,

    /// Status classes to ignore, e.g. 3,4.
    #[arg(long = "ignore-status-classes", value_delimiter = ',')]
    ignore_status_classes: Vec<u16>,

    /// Status codes to ignore, e.g. 401,404.
    #[arg(long = "ignore-status-codes", value_delimiter = ',')]
    ignore_status_codes: Vec<u16>,

    /// Require this substring in the response (case-sensitive).
    #[arg(long = "match-substring")]
    match_substring: Option<String>,

    /// Require a regex match in the response.
    #[arg(long = "match-regex")]
    match_regex: Option<String>,

    /// Include response headers in the match search.
    #[arg(long = "match-in-headers", default_value_t = false)]
    match_in_headers: bool,

    /// Log each kept hit as it is found.
    #[arg(long, short, default_value_t = false)]
    verbose: bool,

    /// Progress refresh interval in seconds.
    #[arg(long = "log-every", default_value_t = DEFAULT_RENDER_EVERY.as_secs_f64())]
    log_every: f64,

    /// Disable the live progress line.
    #[arg(long = "no-progress", default_value_t = false)]
    no_progress: bool,

    /// Show only the first N hits (0 = all).
    #[arg(long, default_value_t = 0)]
    show: usize,

    /// Write hits and metadata as JSON to this path.
    #[arg(long = "json-out")]
    json_out: Option<PathBuf>,

    /// Write hits as CSV to this path.
    #[arg(long = "csv-out")]
    csv_out: Option<PathBuf>,

    /// Serve the scan API on this address instead of running one scan, e.g. 127.0.0.1:8080.
    #[arg(long)]
    serve: Option<String>,
}

impl Cli {
    fn port_source(&self) -> Result<PortSource> {
        if let Some(name) = &self.preset {
            return Ok(PortSource::Preset(Preset::from_name(name)));
        }
        if let Some(range) = &self.range {
            let (start, end) = ports::parse_range(range)?;
            return Ok(PortSource::Range { start, end });
        }
        if let Some(list) = &self.ports {
            return Ok(PortSource::List(ports::parse_ports_str(list)?));
        }
        if let Some(path) = &self.ports_file {
            return Ok(PortSource::List(ports::load_ports_from_path(path)?));
        }
        Ok(PortSource::default())
    }

    fn scan_options(&self) -> Result<ScanOptions> {
        let timeout = Duration::try_from_secs_f64(self.timeout)
            .with_context(|| format!("invalid timeout: {}", self.timeout))?;
        Ok(ScanOptions {
            host: self.host.clone(),
            ports: self.port_source()?,
            exclude: self.exclude.clone(),
            schemes: self.schemes.clone(),
            paths: self.paths.clone(),
            timeout_ms: millis_ceil(timeout),
            concurrency: self.concurrency,
            max_bytes: self.max_bytes,
            retries: self.retries,
            ignore_status_classes: self.ignore_status_classes.clone(),
            ignore_status_codes: self.ignore_status_codes.clone(),
            match_substring: self.match_substring.clone(),
            match_regex: self.match_regex.clone(),
            match_in_headers: self.match_in_headers,
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "info" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    if let Some(bind) = cli.serve.as_deref() {
        return server::spawn_server(bind).await;
    }

    // Invalid options fail here, before any socket is opened.
    let config = ScanConfig::new(cli.scan_options()?)?;
    let scanner = Scanner::new(config)?;
    let live = scanner.live_state();

    println!("http-sweep configuration:");
    println!("  host         : {}", scanner.config().host());
    println!("  ports        : {}", scanner.ports().len());
    println!(
        "  schemes      : {}",
        scanner
            .config()
            .schemes()
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(",")
    );
    println!("  paths        : {}", scanner.config().paths().join(","));
    println!("  concurrency  : {}", scanner.config().concurrency());
    println!("  timeout      : {:?}", scanner.config().timeout());

    // Ctrl-C cancels the scan; partial results are still reported.
    let cancel = CancellationToken::new();
    let cancel_ctrlc = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel_ctrlc.cancel();
        }
    });

    let render_stop = CancellationToken::new();
    let renderer = (!cli.no_progress).then(|| {
        let every = Duration::try_from_secs_f64(cli.log_every).unwrap_or(DEFAULT_RENDER_EVERY);
        progress::spawn_renderer(live.clone(), every, render_stop.clone())
    });

    let report = scanner.run(live, cancel).await;

    render_stop.cancel();
    if let Some(handle) = renderer {
        let _ = handle.await;
    }

    println!();
    output::print_summary(&report, cli.show);

    if let Some(path) = cli.json_out.as_deref() {
        output::write_json(path, &report)
            .with_context(|| format!("failed to write JSON to {}", path.display()))?;
        println!("\nWrote JSON: {}", path.display());
    }
    if let Some(path) = cli.csv_out.as_deref() {
        output::write_csv(path, &report.hits)
            .with_context(|| format!("failed to write CSV to {}", path.display()))?;
        println!("Wrote CSV: {}", path.display());
    }

    Ok(())
}
