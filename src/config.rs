use crate::error::ConfigError;
use crate::ports::{self, PortSource};
use crate::types::Scheme;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::time::Duration;
use tokio::sync::Semaphore;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_TIMEOUT_MS: u64 = 350;
pub const DEFAULT_CONCURRENCY: usize = 600;
pub const DEFAULT_MAX_BYTES: usize = 8192;

/// Whole milliseconds for `d`, rounded up so a positive duration never becomes 0.
pub fn millis_ceil(d: Duration) -> u64 {
    u64::try_from(d.as_nanos().div_ceil(1_000_000)).unwrap_or(u64::MAX)
}

/// Caller-supplied scan options, before validation.
///
/// Every field has a default so partial JSON bodies and CLI input map onto it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ScanOptions {
    pub host: String,
    pub ports: PortSource,
    pub exclude: Vec<u16>,
    pub schemes: Vec<Scheme>,
    pub paths: Vec<String>,
    pub timeout_ms: u64,
    pub concurrency: usize,
    pub max_bytes: usize,
    pub retries: u32,
    pub ignore_status_classes: Vec<u16>,
    pub ignore_status_codes: Vec<u16>,
    pub match_substring: Option<String>,
    pub match_regex: Option<String>,
    pub match_in_headers: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            ports: PortSource::default(),
            exclude: Vec::new(),
            schemes: vec![Scheme::Http, Scheme::Https],
            paths: vec!["/".to_string()],
            timeout_ms: DEFAULT_TIMEOUT_MS,
            concurrency: DEFAULT_CONCURRENCY,
            max_bytes: DEFAULT_MAX_BYTES,
            retries: 0,
            ignore_status_classes: Vec::new(),
            ignore_status_codes: Vec::new(),
            match_substring: None,
            match_regex: None,
            match_in_headers: false,
        }
    }
}

/// Required response content.
#[derive(Debug, Clone)]
pub enum ContentMatch {
    Any,
    Substring(String),
    Pattern(Regex),
}

/// Validated, immutable scan configuration.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    host: String,
    ports: PortSource,
    exclude: HashSet<u16>,
    schemes: Vec<Scheme>,
    paths: Vec<String>,
    timeout: Duration,
    concurrency: usize,
    max_bytes: usize,
    retries: u32,
    ignore_status_classes: BTreeSet<u16>,
    ignore_status_codes: BTreeSet<u16>,
    content_match: ContentMatch,
    match_in_headers: bool,
}

impl ScanConfig {
    pub fn new(opts: ScanOptions) -> Result<Self, ConfigError> {
        let host = opts.host.trim().to_string();
        if host.is_empty() {
            return Err(ConfigError::EmptyHost);
        }

        let mut schemes: Vec<Scheme> = Vec::with_capacity(2);
        for s in opts.schemes {
            if !schemes.contains(&s) {
                schemes.push(s);
            }
        }
        if schemes.is_empty() {
            return Err(ConfigError::NoSchemes);
        }

        let mut paths = Vec::with_capacity(opts.paths.len());
        for p in opts.paths {
            let p = p.trim();
            if p.is_empty() {
                continue;
            }
            if p.chars().any(|c| c.is_whitespace() || c.is_control()) {
                return Err(ConfigError::InvalidPath(p.to_string()));
            }
            paths.push(p.to_string());
        }
        if paths.is_empty() {
            return Err(ConfigError::NoPaths);
        }

        if opts.timeout_ms == 0 {
            return Err(ConfigError::InvalidTimeout);
        }
        if opts.concurrency == 0 || opts.concurrency > Semaphore::MAX_PERMITS {
            return Err(ConfigError::InvalidConcurrency);
        }
        if opts.max_bytes == 0 {
            return Err(ConfigError::InvalidMaxBytes);
        }

        if let Some(&bad) = opts
            .ignore_status_classes
            .iter()
            .find(|c| !(2..=5).contains(*c))
        {
            return Err(ConfigError::InvalidStatusClass(bad));
        }
        if let Some(&bad) = opts
            .ignore_status_codes
            .iter()
            .find(|c| !(100..=999).contains(*c))
        {
            return Err(ConfigError::InvalidStatusCode(bad));
        }

        let content_match = match (opts.match_substring, opts.match_regex) {
            (Some(_), Some(_)) => return Err(ConfigError::ConflictingMatch),
            (Some(sub), None) => ContentMatch::Substring(sub),
            (None, Some(pattern)) => match Regex::new(&pattern) {
                Ok(re) => ContentMatch::Pattern(re),
                Err(source) => return Err(ConfigError::InvalidPattern { pattern, source }),
            },
            (None, None) => ContentMatch::Any,
        };

        Ok(Self {
            host,
            ports: opts.ports,
            exclude: opts.exclude.into_iter().collect(),
            schemes,
            paths,
            timeout: Duration::from_millis(opts.timeout_ms),
            concurrency: opts.concurrency,
            max_bytes: opts.max_bytes,
            retries: opts.retries,
            ignore_status_classes: opts.ignore_status_classes.into_iter().collect(),
            ignore_status_codes: opts.ignore_status_codes.into_iter().collect(),
            content_match,
            match_in_headers: opts.match_in_headers,
        })
    }

    /// Ports to probe, in enumeration order.
    pub fn target_ports(&self) -> Vec<u16> {
        ports::enumerate(&self.ports.ranges(), &self.exclude)
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn schemes(&self) -> &[Scheme] {
        &self.schemes
    }

    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn ignore_status_classes(&self) -> &BTreeSet<u16> {
        &self.ignore_status_classes
    }

    pub fn ignore_status_codes(&self) -> &BTreeSet<u16> {
        &self.ignore_status_codes
    }

    pub fn content_match(&self) -> &ContentMatch {
        &self.content_match
    }

    pub fn match_in_headers(&self) -> bool {
        self.match_in_headers
    }
}
