use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Protocol variant attempted against a port.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn as_str(self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scheme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "http" => Ok(Scheme::Http),
            "https" => Ok(Scheme::Https),
            other => Err(format!("unknown scheme: {other}")),
        }
    }
}

/// A response that parsed as HTTP for one (scheme, path) attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub scheme: Scheme,
    pub path: String,
    pub status: u16,
    pub reason: String,
    /// Raw head (status line + headers), decoded byte-for-byte.
    pub headers: String,
    /// Whitespace-collapsed, truncated body snippet.
    pub sample: String,
}

/// One retained probe outcome that passed the status and content filters.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Hit {
    pub port: u16,
    pub scheme: Scheme,
    pub path: String,
    pub status: Option<u16>,
    pub reason: String,
    pub matched: bool,
    pub sample: String,
}

/// Scan metadata for the presentation and export layers.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ScanMeta {
    pub host: String,
    pub schemes: Vec<Scheme>,
    pub paths: Vec<String>,
    pub ports_total: u64,
    pub timeout_seconds: f64,
    pub concurrency: usize,
    pub max_bytes: usize,
    pub retries: u32,
    pub ignore_status_classes: Vec<u16>,
    pub ignore_status_codes: Vec<u16>,
    pub match_substring: Option<String>,
    pub match_regex: Option<String>,
    pub match_in_headers: bool,
    pub duration_seconds: f64,
    pub hits: usize,
    pub cancelled: bool,
    pub timestamp: String,
    pub timestamp_unix: i64,
}

/// Final result of a scan: metadata plus hits sorted by (port, scheme, path).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ScanReport {
    pub meta: ScanMeta,
    pub hits: Vec<Hit>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheme_order_follows_names() {
        assert!(Scheme::Http < Scheme::Https);
        assert!(Scheme::Http.as_str() < Scheme::Https.as_str());
    }

    #[test]
    fn scheme_parses_case_insensitively() {
        assert_eq!(" HTTPS ".parse::<Scheme>().unwrap(), Scheme::Https);
        assert!("ftp".parse::<Scheme>().is_err());
    }

    #[test]
    fn hit_serializes_scheme_lowercase() {
        let hit = Hit {
            port: 8080,
            scheme: Scheme::Http,
            path: "/".into(),
            status: Some(200),
            reason: "OK".into(),
            matched: true,
            sample: String::new(),
        };
        let json = serde_json::to_string(&hit).unwrap();
        assert!(json.contains(r#""scheme":"http""#));
        assert!(json.contains(r#""status":200"#));
    }
}
