use crate::config::{ContentMatch, ScanConfig};
use crate::types::{Hit, ProbeOutcome};
use std::borrow::Cow;
use std::collections::BTreeSet;

/// Drops responses by exact status code or by status class (leading digit).
#[derive(Debug, Clone, Default)]
pub struct StatusFilter {
    classes: BTreeSet<u16>,
    codes: BTreeSet<u16>,
}

impl StatusFilter {
    pub fn new(classes: BTreeSet<u16>, codes: BTreeSet<u16>) -> Self {
        Self { classes, codes }
    }

    pub fn is_ignored(&self, status: Option<u16>) -> bool {
        match status {
            None => false,
            Some(code) => self.codes.contains(&code) || self.classes.contains(&(code / 100)),
        }
    }
}

/// Text searched by the content filter.
pub fn haystack<'a>(outcome: &'a ProbeOutcome, include_headers: bool) -> Cow<'a, str> {
    if include_headers {
        Cow::Owned(format!("{}\n\n{}", outcome.headers, outcome.sample))
    } else {
        Cow::Borrowed(&outcome.sample)
    }
}

/// Substring is a case-sensitive containment check; a pattern is a search,
/// not a full match.
pub fn content_matches(haystack: &str, requirement: &ContentMatch) -> bool {
    match requirement {
        ContentMatch::Any => true,
        ContentMatch::Substring(needle) => haystack.contains(needle.as_str()),
        ContentMatch::Pattern(re) => re.is_match(haystack),
    }
}

/// Status and content filters combined; turns outcomes into hits.
#[derive(Debug, Clone)]
pub struct FilterPipeline {
    status: StatusFilter,
    content: ContentMatch,
    include_headers: bool,
}

impl FilterPipeline {
    pub fn new(status: StatusFilter, content: ContentMatch, include_headers: bool) -> Self {
        Self {
            status,
            content,
            include_headers,
        }
    }

    pub fn from_config(config: &ScanConfig) -> Self {
        Self::new(
            StatusFilter::new(
                config.ignore_status_classes().clone(),
                config.ignore_status_codes().clone(),
            ),
            config.content_match().clone(),
            config.match_in_headers(),
        )
    }

    /// `Some(hit)` only when the outcome passes both filters.
    pub fn evaluate(&self, port: u16, outcome: &ProbeOutcome) -> Option<Hit> {
        if self.status.is_ignored(Some(outcome.status)) {
            return None;
        }
        let hay = haystack(outcome, self.include_headers);
        if !content_matches(&hay, &self.content) {
            return None;
        }
        Some(Hit {
            port,
            scheme: outcome.scheme,
            path: outcome.path.clone(),
            status: Some(outcome.status),
            reason: outcome.reason.clone(),
            matched: true,
            sample: outcome.sample.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Scheme;
    use regex::Regex;

    fn outcome(status: u16, headers: &str, sample: &str) -> ProbeOutcome {
        ProbeOutcome {
            scheme: Scheme::Http,
            path: "/".into(),
            status,
            reason: "OK".into(),
            headers: headers.into(),
            sample: sample.into(),
        }
    }

    #[test]
    fn class_filter_drops_whole_class() {
        let f = StatusFilter::new([4].into_iter().collect(), BTreeSet::new());
        assert!(f.is_ignored(Some(404)));
        assert!(f.is_ignored(Some(403)));
        assert!(!f.is_ignored(Some(200)));
        assert!(!f.is_ignored(None));
    }

    #[test]
    fn code_filter_drops_exact_code() {
        let f = StatusFilter::new(BTreeSet::new(), [404].into_iter().collect());
        assert!(f.is_ignored(Some(404)));
        assert!(!f.is_ignored(Some(403)));
    }

    #[test]
    fn content_requirements() {
        let hay = "hello world";
        assert!(content_matches(hay, &ContentMatch::Substring("world".into())));
        assert!(!content_matches(hay, &ContentMatch::Substring("missing".into())));
        assert!(!content_matches(hay, &ContentMatch::Substring("World".into())));
        assert!(content_matches(hay, &ContentMatch::Pattern(Regex::new("^hello").unwrap())));
        assert!(content_matches(hay, &ContentMatch::Pattern(Regex::new("wor").unwrap())));
        assert!(content_matches(hay, &ContentMatch::Any));
    }

    #[test]
    fn headers_join_haystack_only_when_enabled() {
        let o = outcome(200, "HTTP/1.1 200 OK\r\nServer: vite", "<html>");
        assert_eq!(haystack(&o, false), "<html>");
        assert_eq!(haystack(&o, true), "HTTP/1.1 200 OK\r\nServer: vite\n\n<html>");

        let need_server = ContentMatch::Substring("vite".into());
        let without = FilterPipeline::new(StatusFilter::default(), need_server.clone(), false);
        let with = FilterPipeline::new(StatusFilter::default(), need_server, true);
        assert!(without.evaluate(5173, &o).is_none());
        let hit = with.evaluate(5173, &o).unwrap();
        assert_eq!(hit.port, 5173);
        assert_eq!(hit.status, Some(200));
        assert!(hit.matched);
    }

    #[test]
    fn status_filter_runs_before_content() {
        let pipeline = FilterPipeline::new(
            StatusFilter::new([5].into_iter().collect(), BTreeSet::new()),
            ContentMatch::Any,
            false,
        );
        assert!(pipeline.evaluate(80, &outcome(503, "", "down")).is_none());
        assert!(pipeline.evaluate(80, &outcome(301, "", "")).is_some());
    }
}
