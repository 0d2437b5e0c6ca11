use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::Path;

pub const MIN_PORT: u32 = 1;
pub const MAX_PORT: u32 = 65535;

const DEV_RANGES: &[(u32, u32)] = &[
    (3000, 3999),
    (4200, 4299),
    (5000, 5999),
    (8000, 8999),
    (9000, 9999),
    (10000, 10100),
];

const COMMON_PORTS: &[u16] = &[
    80, 443, 3000, 3001, 3002, 3003, 4000, 4200, 5000, 5173, 7000, 7070, 8000, 8080, 8081, 8088,
    8443, 8888, 9000, 9090, 10000,
];

/// Named set of port ranges.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(from = "String", into = "String")]
pub enum Preset {
    Dev,
    Common,
    Full,
}

impl Preset {
    /// Resolve a preset by name. Unknown names fall back to the full range.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "dev" => Preset::Dev,
            "common" => Preset::Common,
            "full" => Preset::Full,
            other => {
                log::warn!("unknown preset {other:?}, scanning the full port range");
                Preset::Full
            }
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Preset::Dev => "dev",
            Preset::Common => "common",
            Preset::Full => "full",
        }
    }

    /// Inclusive ranges covered by this preset, in ascending order.
    pub fn ranges(self) -> Vec<(u32, u32)> {
        match self {
            Preset::Dev => DEV_RANGES.to_vec(),
            Preset::Common => COMMON_PORTS
                .iter()
                .map(|&p| (u32::from(p), u32::from(p)))
                .collect(),
            Preset::Full => vec![(MIN_PORT, MAX_PORT)],
        }
    }
}

impl From<String> for Preset {
    fn from(s: String) -> Self {
        Preset::from_name(&s)
    }
}

impl From<Preset> for String {
    fn from(p: Preset) -> Self {
        p.as_str().to_string()
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the candidate ports come from.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PortSource {
    Preset(Preset),
    /// Inclusive range; bounds may arrive reversed or out of range.
    Range { start: u32, end: u32 },
    List(Vec<u16>),
}

impl Default for PortSource {
    fn default() -> Self {
        PortSource::Preset(Preset::Dev)
    }
}

impl PortSource {
    pub fn ranges(&self) -> Vec<(u32, u32)> {
        match self {
            PortSource::Preset(p) => p.ranges(),
            PortSource::Range { start, end } => vec![(*start, *end)],
            PortSource::List(ports) => ports
                .iter()
                .map(|&p| (u32::from(p), u32::from(p)))
                .collect(),
        }
    }
}

/// Normalize one inclusive range: swap reversed bounds, then clamp into 1..=65535.
pub fn normalize_range(start: u32, end: u32) -> (u16, u16) {
    let (lo, hi) = if start > end { (end, start) } else { (start, end) };
    let lo = lo.clamp(MIN_PORT, MAX_PORT) as u16;
    let hi = hi.clamp(MIN_PORT, MAX_PORT) as u16;
    (lo, hi)
}

/// Enumerate every range in order, dropping excluded ports.
///
/// Ranges are concatenated as given; overlapping ranges yield repeated ports.
pub fn enumerate(ranges: &[(u32, u32)], exclude: &HashSet<u16>) -> Vec<u16> {
    let mut out = Vec::new();
    for &(start, end) in ranges {
        let (lo, hi) = normalize_range(start, end);
        out.extend((lo..=hi).filter(|p| !exclude.contains(p)));
    }
    out
}

/// Parse a `start-end` range as typed on the command line.
pub fn parse_range(s: &str) -> Result<(u32, u32)> {
    let (a, b) = s
        .split_once('-')
        .with_context(|| format!("range must look like start-end, got {s:?}"))?;
    let start: u32 = a
        .trim()
        .parse()
        .with_context(|| format!("invalid range start: {a}"))?;
    let end: u32 = b
        .trim()
        .parse()
        .with_context(|| format!("invalid range end: {b}"))?;
    Ok((start, end))
}

/// Parse a port list into a deduplicated list of TCP ports (1..=65535).
///
/// Entries are separated by commas or newlines:
/// - single port number: `80`
/// - inclusive range: `8000-8010`
/// - comments: everything after `#` on a line is ignored
pub fn parse_ports_str(s: &str) -> Result<Vec<u16>> {
    let mut out: Vec<u16> = Vec::new();
    let mut seen = HashSet::new();

    for (idx, raw_line) in s.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw_line.split('#').next().unwrap_or("");
        for item in line.split(',').map(str::trim).filter(|i| !i.is_empty()) {
            if let Some((a, b)) = item.split_once('-') {
                let start = parse_port_str(a.trim())
                    .with_context(|| format!("line {line_no}: invalid start in range: {a}"))?;
                let end = parse_port_str(b.trim())
                    .with_context(|| format!("line {line_no}: invalid end in range: {b}"))?;
                if start > end {
                    bail!("line {line_no}: invalid range {start}-{end} (start > end)");
                }
                for p in start..=end {
                    if seen.insert(p) {
                        out.push(p);
                    }
                }
                continue;
            }

            let p = parse_port_str(item)
                .with_context(|| format!("line {line_no}: invalid port value: {item}"))?;
            if seen.insert(p) {
                out.push(p);
            }
        }
    }

    Ok(out)
}

/// Load a port list from a file. Errors if the file cannot be read or parsed.
pub fn load_ports_from_path(path: impl AsRef<Path>) -> Result<Vec<u16>> {
    let content = fs::read_to_string(path.as_ref())
        .with_context(|| format!("failed to read ports file: {}", path.as_ref().display()))?;
    parse_ports_str(&content)
}

fn parse_port_str(s: &str) -> Result<u16> {
    let val: u32 = s.parse::<u32>().map_err(|e| anyhow::anyhow!(e))?;
    if val == 0 || val > MAX_PORT {
        bail!("port out of range: {val}");
    }
    Ok(val as u16)
}
