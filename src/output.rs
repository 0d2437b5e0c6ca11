//! Export and console rendering of finished scans.

use crate::error::Result;
use crate::types::{Hit, ScanReport};
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Write `{ "meta": ..., "hits": [...] }` as pretty JSON.
pub fn write_json(path: &Path, report: &ScanReport) -> Result<()> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(&file, report)?;
    (&file).flush()?;
    Ok(())
}

/// Write one CSV row per hit with a `port,scheme,path,status,reason,matched,sample` header.
pub fn write_csv(path: &Path, hits: &[Hit]) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;
    if hits.is_empty() {
        wtr.write_record(["port", "scheme", "path", "status", "reason", "matched", "sample"])?;
    }
    for hit in hits {
        wtr.serialize(hit)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Console lines for a result list. `show == 0` prints everything.
pub fn render_table(hits: &[Hit], show: usize) -> Vec<String> {
    let shown = if show == 0 { hits.len() } else { show.min(hits.len()) };
    let path_w = hits[..shown]
        .iter()
        .map(|h| h.path.len())
        .max()
        .unwrap_or(0)
        .max(18);

    let mut lines: Vec<String> = hits[..shown]
        .iter()
        .map(|h| {
            let code = h
                .status
                .map(|s| s.to_string())
                .unwrap_or_else(|| "?".to_string());
            let snippet = if h.sample.is_empty() {
                String::new()
            } else {
                format!(" | {}", h.sample)
            };
            format!(
                "{:>5}  {:<5}  {:<path_w$}  {:>3}  {}{}",
                h.port,
                h.scheme.as_str().to_uppercase(),
                h.path,
                code,
                h.reason,
                snippet,
                path_w = path_w
            )
        })
        .collect();

    if shown < hits.len() {
        lines.push(String::new());
        lines.push(format!("...and {} more", hits.len() - shown));
    }
    lines
}

/// Summary block printed after a scan.
pub fn print_summary(report: &ScanReport, show: usize) {
    let meta = &report.meta;
    if meta.cancelled {
        println!("Scan cancelled after {:.2}s (partial results)", meta.duration_seconds);
    } else {
        println!("Scan finished in {:.2}s", meta.duration_seconds);
    }
    println!("HTTP/HTTPS ports that passed filters: {}\n", meta.hits);
    for line in render_table(&report.hits, show) {
        println!("{line}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Scheme;

    fn hit(port: u16, sample: &str) -> Hit {
        Hit {
            port,
            scheme: Scheme::Https,
            path: "/".into(),
            status: Some(200),
            reason: "OK".into(),
            matched: true,
            sample: sample.into(),
        }
    }

    #[test]
    fn table_row_layout() {
        let lines = render_table(&[hit(8443, "hi")], 0);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with(" 8443  HTTPS  /"));
        assert!(lines[0].ends_with("200  OK | hi"));
    }

    #[test]
    fn table_truncates_with_tail() {
        let hits: Vec<Hit> = (1..=5).map(|p| hit(p, "")).collect();
        let lines = render_table(&hits, 2);
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[3], "...and 3 more");
        assert!(!lines[0].contains('|'));
    }

    #[test]
    fn unknown_status_renders_question_mark() {
        let mut h = hit(80, "");
        h.status = None;
        assert!(render_table(&[h], 0)[0].contains("  ?  "));
    }
}
