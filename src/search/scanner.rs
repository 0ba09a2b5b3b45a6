//! Incremental search over the flattened trace list
//!
//! The scan runs in batches on the host scheduler. Each batch tests rows
//! until the time budget is spent, then requests another frame, so a large
//! trace never blocks the loop for longer than one budget.
use super::matcher::QueryMatcher;
use super::scheduler::{Clock, FrameId, Scheduler};
use super::state::{ResultsLookup, SearchAction, SearchResult};
use crate::metrics::Metrics;
use crate::tree::{NodeId, NodeRef};
use log::{debug, info};
use std::cell::Cell;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

pub const DEFAULT_BATCH_BUDGET: Duration = Duration::from_millis(12);

#[derive(Clone)]
pub struct ScanOptions {
    pub batch_budget: Duration,
    pub metrics: Option<Metrics>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            batch_budget: DEFAULT_BATCH_BUDGET,
            metrics: None,
        }
    }
}

impl fmt::Debug for ScanOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanOptions")
            .field("batch_budget", &self.batch_budget)
            .field("metrics", &self.metrics.is_some())
            .finish()
    }
}

/// Final result of a completed scan
#[derive(Debug, Clone, PartialEq)]
pub struct ScanOutcome {
    pub results: Vec<SearchResult>,
    pub results_lookup: ResultsLookup,
    /// `(result_index, result_iterator_index)` of the previously selected
    /// node, if it is still among the matches
    pub previous_node_position: Option<(usize, usize)>,
}

impl ScanOutcome {
    /// The `SetResults` action that publishes this outcome, keeping the
    /// previous selection when it still matches
    pub fn into_action(self) -> SearchAction {
        let (result_index, result_iterator_index) = match self.previous_node_position {
            Some((index, rank)) => (Some(index), Some(rank)),
            None => (None, None),
        };

        SearchAction::SetResults {
            results: self.results,
            results_lookup: self.results_lookup,
            result_index,
            result_iterator_index,
        }
    }
}

/// Handle to an in-flight scan
///
/// The token holds the id of the next pending batch. It is cleared when the
/// scan completes or is cancelled.
pub struct SearchHandle {
    token: Rc<Cell<Option<FrameId>>>,
    scheduler: Rc<dyn Scheduler>,
    metrics: Option<Metrics>,
}

impl SearchHandle {
    pub fn is_active(&self) -> bool {
        self.token.get().is_some()
    }

    /// Stop the scan. The completion callback will not be invoked.
    pub fn cancel(&self) {
        if let Some(id) = self.token.take() {
            self.scheduler.cancel_frame(id);
            if let Some(metrics) = &self.metrics {
                metrics.scans_cancelled.inc();
            }
            debug!("Cancelled trace search (pending frame {id:?})");
        }
    }
}

impl fmt::Debug for SearchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SearchHandle")
            .field("token", &self.token.get())
            .finish()
    }
}

struct ScanTask {
    nodes: Rc<[NodeRef]>,
    matcher: QueryMatcher,
    previous: Option<NodeId>,
    results: Vec<SearchResult>,
    results_lookup: ResultsLookup,
    cursor: usize,
    batches: usize,
    options: ScanOptions,
    scheduler: Rc<dyn Scheduler>,
    clock: Rc<dyn Clock>,
    token: Rc<Cell<Option<FrameId>>>,
    on_complete: Box<dyn FnOnce(ScanOutcome)>,
}

impl ScanTask {
    fn schedule(self) {
        let token = Rc::clone(&self.token);
        let scheduler = Rc::clone(&self.scheduler);
        let resume_token = Rc::clone(&self.token);

        let id = scheduler.request_frame(Box::new(move || {
            if resume_token.get().is_none() {
                return;
            }
            self.run_batch();
        }));
        token.set(Some(id));
    }

    fn run_batch(mut self) {
        let batch_start = self.clock.now();
        let first = self.cursor;

        // The first row of a batch is always tested so the scan makes progress
        while self.cursor < self.nodes.len()
            && (self.cursor == first
                || self.clock.now().saturating_sub(batch_start) < self.options.batch_budget)
        {
            let node = &self.nodes[self.cursor];
            if self.matcher.matches(&node.value) {
                self.results_lookup.insert(node.id, self.results.len());
                self.results.push(SearchResult {
                    index: self.cursor,
                    node: Rc::clone(node),
                });
            }
            self.cursor += 1;
        }

        self.batches += 1;
        if let Some(metrics) = &self.options.metrics {
            metrics.batches_run.inc();
            metrics.nodes_scanned.inc_by((self.cursor - first) as u64);
        }

        if self.cursor < self.nodes.len() {
            debug!(
                "Search batch {} scanned {}..{} of {} rows, yielding",
                self.batches,
                first,
                self.cursor,
                self.nodes.len()
            );
            self.schedule();
        } else {
            self.finish();
        }
    }

    fn finish(self) {
        self.token.set(None);

        let previous_node_position = self.previous.and_then(|id| {
            self.results_lookup
                .get(&id)
                .map(|&rank| (self.results[rank].index, rank))
        });

        if let Some(metrics) = &self.options.metrics {
            metrics.matches_found.inc_by(self.results.len() as u64);
            metrics.scans_completed.inc();
        }
        info!(
            "Search for {:?} found {} matches in {} rows ({} batches)",
            self.matcher.query(),
            self.results.len(),
            self.nodes.len(),
            self.batches
        );

        (self.on_complete)(ScanOutcome {
            results: self.results,
            results_lookup: self.results_lookup,
            previous_node_position,
        });
    }
}

/// Start a time-sliced search of `nodes` for `query`.
///
/// No work happens before the scheduler runs its next frame. `on_complete`
/// is called exactly once when every row has been tested, unless the
/// returned handle is cancelled first. Starting a scan does not cancel
/// earlier ones; callers keep a single handle and cancel it before
/// searching again. `nodes` must not change while the scan runs.
pub fn search_in_trace_tree<F>(
    nodes: Rc<[NodeRef]>,
    query: &str,
    previous_node: Option<&NodeRef>,
    options: ScanOptions,
    scheduler: Rc<dyn Scheduler>,
    clock: Rc<dyn Clock>,
    on_complete: F,
) -> SearchHandle
where
    F: FnOnce(ScanOutcome) + 'static,
{
    let token = Rc::new(Cell::new(None));
    let metrics = options.metrics.clone();

    debug!(
        "Starting trace search for {:?} over {} rows (budget {:?})",
        query,
        nodes.len(),
        options.batch_budget
    );

    let task = ScanTask {
        nodes,
        matcher: QueryMatcher::new(query),
        previous: previous_node.map(|node| node.id),
        results: Vec::new(),
        results_lookup: ResultsLookup::new(),
        cursor: 0,
        batches: 0,
        options,
        scheduler: Rc::clone(&scheduler),
        clock,
        token: Rc::clone(&token),
        on_complete: Box::new(on_complete),
    };
    task.schedule();

    SearchHandle {
        token,
        scheduler,
        metrics,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::scheduler::{FrameLoop, ManualClock};
    use crate::tree::{ErrorValue, NodeValue, SpanValue, TraceNodeInput, TraceTree};
    use std::cell::RefCell;

    fn span(op: &str, description: &str) -> TraceNodeInput {
        TraceNodeInput::new(NodeValue::Span(SpanValue {
            span_id: format!("{op}-{description}"),
            op: Some(op.to_string()),
            description: Some(description.to_string()),
        }))
    }

    fn wide_tree(size: usize) -> TraceTree {
        let nodes = (0..size)
            .map(|i| {
                let op = if i % 3 == 0 { "db" } else { "http" };
                span(op, &format!("row {i}"))
            })
            .collect();
        TraceTree::from_nodes(nodes)
    }

    type Captured = Rc<RefCell<Vec<ScanOutcome>>>;

    fn run(
        tree: &TraceTree,
        query: &str,
        previous: Option<&NodeRef>,
        clock: Rc<ManualClock>,
    ) -> (Rc<FrameLoop>, SearchHandle, Captured) {
        let frames = Rc::new(FrameLoop::new());
        let captured: Captured = Rc::new(RefCell::new(Vec::new()));
        let sink = captured.clone();

        let handle = search_in_trace_tree(
            tree.list(),
            query,
            previous,
            ScanOptions::default(),
            frames.clone(),
            clock,
            move |outcome| sink.borrow_mut().push(outcome),
        );
        (frames, handle, captured)
    }

    #[test]
    fn test_empty_tree() {
        let tree = TraceTree::from_nodes(Vec::new());
        let (frames, handle, captured) = run(&tree, "db", None, Rc::new(ManualClock::new()));

        assert!(handle.is_active());
        assert!(captured.borrow().is_empty());

        frames.run_until_idle();

        let captured = captured.borrow();
        assert_eq!(captured.len(), 1);
        assert!(captured[0].results.is_empty());
        assert!(captured[0].results_lookup.is_empty());
        assert_eq!(captured[0].previous_node_position, None);
        assert!(!handle.is_active());
    }

    #[test]
    fn test_matches_in_traversal_order() {
        let tree = TraceTree::from_nodes(vec![span("http", "GET /").with_children(vec![
            span("db", "SELECT"),
            TraceNodeInput::new(NodeValue::Error(ErrorValue {
                event_id: "e1".to_string(),
                level: Some("error".to_string()),
                title: Some("db timeout".to_string()),
            })),
        ])]);
        let (frames, _handle, captured) = run(&tree, "db", None, Rc::new(ManualClock::new()));

        frames.run_until_idle();

        let outcome = &captured.borrow()[0];
        let indices: Vec<_> = outcome.results.iter().map(|r| r.index).collect();
        assert_eq!(indices, vec![1, 2]);
        assert_eq!(outcome.results_lookup[&tree.get(2).unwrap().id], 1);
    }

    #[test]
    fn test_scan_yields_between_batches() {
        let tree = wide_tree(30);
        // every clock reading advances 1ms: 12 rows fit in a 12ms batch
        let clock = Rc::new(ManualClock::with_step(Duration::from_millis(1)));
        let (frames, _handle, captured) = run(&tree, "db", None, clock);

        assert_eq!(frames.run_frame(), 1);
        assert!(captured.borrow().is_empty());
        assert_eq!(frames.pending(), 1);

        assert_eq!(frames.run_until_idle(), 2);
        assert_eq!(frames.frames_run(), 3);

        let captured = captured.borrow();
        assert_eq!(captured.len(), 1);
        assert_eq!(captured[0].results.len(), 10);
    }

    #[test]
    fn test_cancel_mid_scan() {
        let tree = wide_tree(30);
        let clock = Rc::new(ManualClock::with_step(Duration::from_millis(1)));
        let (frames, handle, captured) = run(&tree, "db", None, clock);

        frames.run_frame();
        handle.cancel();

        assert!(!handle.is_active());
        assert!(frames.is_idle());
        frames.run_until_idle();
        assert!(captured.borrow().is_empty());
    }

    #[test]
    fn test_cancel_before_first_batch() {
        let tree = wide_tree(5);
        let (frames, handle, captured) = run(&tree, "db", None, Rc::new(ManualClock::new()));

        handle.cancel();
        assert_eq!(frames.run_until_idle(), 0);
        assert!(captured.borrow().is_empty());
    }

    #[test]
    fn test_previous_node_position() {
        let tree = wide_tree(10);
        let list = tree.list();
        let previous = list[6].clone();

        let (frames, _handle, captured) =
            run(&tree, "db", Some(&previous), Rc::new(ManualClock::new()));
        frames.run_until_idle();

        // db rows sit at 0, 3, 6, 9
        assert_eq!(captured.borrow()[0].previous_node_position, Some((6, 2)));

        let missing = list[1].clone();
        let (frames, _handle, captured) =
            run(&tree, "db", Some(&missing), Rc::new(ManualClock::new()));
        frames.run_until_idle();
        assert_eq!(captured.borrow()[0].previous_node_position, None);
    }

    #[test]
    fn test_outcome_into_action_keeps_selection() {
        let tree = wide_tree(4);
        let previous = tree.list()[3].clone();
        let (frames, _handle, captured) =
            run(&tree, "db", Some(&previous), Rc::new(ManualClock::new()));
        frames.run_until_idle();

        let outcome = captured.borrow_mut().remove(0);
        match outcome.into_action() {
            SearchAction::SetResults {
                result_index,
                result_iterator_index,
                results,
                ..
            } => {
                assert_eq!(results.len(), 2);
                assert_eq!(result_index, Some(3));
                assert_eq!(result_iterator_index, Some(1));
            }
            other => panic!("Expected SetResults, got {:?}", other),
        }
    }

    #[test]
    fn test_metrics_are_recorded() {
        let tree = wide_tree(9);
        let frames = Rc::new(FrameLoop::new());
        let metrics = Metrics::new();
        let options = ScanOptions {
            metrics: Some(metrics.clone()),
            ..ScanOptions::default()
        };

        let _handle = search_in_trace_tree(
            tree.list(),
            "http",
            None,
            options,
            frames.clone(),
            Rc::new(ManualClock::new()),
            |_| {},
        );
        frames.run_until_idle();

        assert_eq!(metrics.nodes_scanned.get(), 9);
        assert_eq!(metrics.matches_found.get(), 6);
        assert_eq!(metrics.scans_completed.get(), 1);
    }
}
