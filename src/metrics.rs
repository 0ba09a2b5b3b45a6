use prometheus::{Encoder, IntCounter, Opts, Registry, TextEncoder};
use std::sync::Arc;

#[derive(Clone)]
pub struct Metrics {
    pub nodes_scanned: IntCounter,
    pub matches_found: IntCounter,
    pub batches_run: IntCounter,
    pub scans_completed: IntCounter,
    pub scans_cancelled: IntCounter,
    registry: Arc<Registry>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

fn counter(name: &str, help: &str) -> IntCounter {
    IntCounter::with_opts(Opts::new(name, help)).expect("counter options are static and valid")
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();
        let nodes_scanned = counter("nodes_scanned", "Number of trace rows tested against a query");
        let matches_found = counter("matches_found", "Number of matching trace rows");
        let batches_run = counter("batches_run", "Number of time-sliced search batches");
        let scans_completed = counter("scans_completed", "Number of searches that ran to completion");
        let scans_cancelled = counter("scans_cancelled", "Number of searches cancelled mid-scan");

        registry.register(Box::new(nodes_scanned.clone())).ok();
        registry.register(Box::new(matches_found.clone())).ok();
        registry.register(Box::new(batches_run.clone())).ok();
        registry.register(Box::new(scans_completed.clone())).ok();
        registry.register(Box::new(scans_cancelled.clone())).ok();

        Metrics {
            nodes_scanned,
            matches_found,
            batches_run,
            scans_completed,
            scans_cancelled,
            registry: Arc::new(registry),
        }
    }

    pub fn gather(&self) -> String {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        if encoder.encode(&metric_families, &mut buffer).is_err() {
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gather_lists_counters() {
        let metrics = Metrics::new();
        metrics.batches_run.inc_by(3);

        let text = metrics.gather();
        assert!(text.contains("batches_run 3"));
        assert!(text.contains("scans_cancelled 0"));
    }
}
