use crate::types::Hit;
use tokio::sync::Mutex;

/// Append-only hit accumulator shared by scan workers.
#[derive(Debug, Default)]
pub struct ResultCollector {
    hits: Mutex<Vec<Hit>>,
}

impl ResultCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push(&self, hit: Hit) {
        self.hits.lock().await.push(hit);
    }

    /// Take every hit, sorted by (port, scheme, path). Call once, after workers stop.
    pub async fn finalize(&self) -> Vec<Hit> {
        let mut hits = std::mem::take(&mut *self.hits.lock().await);
        hits.sort_by(|a, b| {
            a.port
                .cmp(&b.port)
                .then_with(|| a.scheme.as_str().cmp(b.scheme.as_str()))
                .then_with(|| a.path.cmp(&b.path))
        });
        hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Scheme;
    use std::sync::Arc;

    fn hit(port: u16, scheme: Scheme, path: &str) -> Hit {
        Hit {
            port,
            scheme,
            path: path.into(),
            status: Some(200),
            reason: "OK".into(),
            matched: true,
            sample: String::new(),
        }
    }

    #[tokio::test]
    async fn finalize_sorts_by_port_scheme_path() {
        let c = ResultCollector::new();
        c.push(hit(8080, Scheme::Https, "/")).await;
        c.push(hit(3000, Scheme::Http, "/z")).await;
        c.push(hit(8080, Scheme::Http, "/b")).await;
        c.push(hit(8080, Scheme::Http, "/a")).await;
        let out: Vec<_> = c
            .finalize()
            .await
            .into_iter()
            .map(|h| (h.port, h.scheme, h.path))
            .collect();
        assert_eq!(
            out,
            vec![
                (3000, Scheme::Http, "/z".to_string()),
                (8080, Scheme::Http, "/a".to_string()),
                (8080, Scheme::Http, "/b".to_string()),
                (8080, Scheme::Https, "/".to_string()),
            ]
        );
        assert!(c.finalize().await.is_empty());
    }

    #[tokio::test]
    async fn concurrent_pushes_are_all_kept() {
        let c = Arc::new(ResultCollector::new());
        let mut handles = Vec::new();
        for port in 1..=50u16 {
            let c = c.clone();
            handles.push(tokio::spawn(async move {
                c.push(hit(port, Scheme::Http, "/")).await;
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        let ports: Vec<u16> = c.finalize().await.iter().map(|h| h.port).collect();
        assert_eq!(ports, (1..=50).collect::<Vec<_>>());
    }
}
