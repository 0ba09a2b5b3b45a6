//! Search session bound to one loaded trace
//!
//! The session owns the `SearchState`, starts a scan whenever the query
//! changes and cancels the previous one first, and keeps the selected row
//! selected across query edits when it still matches.
use super::scanner::{search_in_trace_tree, ScanOptions, SearchHandle};
use super::scheduler::{Clock, Scheduler};
use super::state::{reduce, SearchAction, SearchResult, SearchState};
use crate::tree::{NodeRef, TraceTree};
use log::debug;
use std::cell::{Ref, RefCell};
use std::rc::Rc;

fn dispatch_to(state: &RefCell<SearchState>, action: SearchAction) {
    let current = state.take();
    *state.borrow_mut() = reduce(current, action);
}

pub struct TraceSearchSession {
    tree: TraceTree,
    state: Rc<RefCell<SearchState>>,
    scheduler: Rc<dyn Scheduler>,
    clock: Rc<dyn Clock>,
    options: ScanOptions,
    handle: Option<SearchHandle>,
}

impl TraceSearchSession {
    pub fn new(
        tree: TraceTree,
        scheduler: Rc<dyn Scheduler>,
        clock: Rc<dyn Clock>,
        options: ScanOptions,
    ) -> Self {
        Self {
            tree,
            state: Rc::new(RefCell::new(SearchState::default())),
            scheduler,
            clock,
            options,
            handle: None,
        }
    }

    pub fn tree(&self) -> &TraceTree {
        &self.tree
    }

    /// Borrow the current state. Drop the guard before dispatching again.
    pub fn state(&self) -> Ref<'_, SearchState> {
        self.state.borrow()
    }

    pub fn dispatch(&self, action: SearchAction) {
        dispatch_to(&self.state, action);
    }

    pub fn current(&self) -> Option<SearchResult> {
        self.state.borrow().current().cloned()
    }

    pub fn is_searching(&self) -> bool {
        self.handle.as_ref().is_some_and(SearchHandle::is_active)
    }

    /// Set a new query and start scanning for it. An empty query clears the search.
    pub fn search(&mut self, query: &str) {
        let previous = self.selected_node();
        self.start_scan(query, previous);
    }

    fn start_scan(&mut self, query: &str, previous: Option<NodeRef>) {
        self.cancel();

        if query.is_empty() {
            self.dispatch(SearchAction::ClearQuery);
            return;
        }

        self.dispatch(SearchAction::SetQuery(query.to_string()));

        let state = Rc::clone(&self.state);
        let handle = search_in_trace_tree(
            self.tree.list(),
            query,
            previous.as_ref(),
            self.options.clone(),
            Rc::clone(&self.scheduler),
            Rc::clone(&self.clock),
            move |outcome| dispatch_to(&state, outcome.into_action()),
        );
        self.handle = Some(handle);
    }

    /// Cancel the in-flight scan, if any
    pub fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.is_active() {
                debug!("Cancelling previous trace search");
            }
            handle.cancel();
        }
    }

    pub fn clear_query(&mut self) {
        self.cancel();
        self.dispatch(SearchAction::ClearQuery);
    }

    pub fn next_match(&self) {
        self.dispatch(SearchAction::GoToNextMatch);
    }

    pub fn previous_match(&self) {
        self.dispatch(SearchAction::GoToPreviousMatch);
    }

    pub fn first_match(&self) {
        self.dispatch(SearchAction::GoToFirstMatch);
    }

    pub fn last_match(&self) {
        self.dispatch(SearchAction::GoToLastMatch);
    }

    pub fn clear_selection(&self) {
        self.dispatch(SearchAction::Clear);
    }

    /// Select the match with the given rank. Returns false when there is no
    /// such match or a scan is still running.
    pub fn go_to_rank(&self, rank: usize) -> bool {
        if self.is_searching() {
            return false;
        }

        let index = {
            let state = self.state.borrow();
            match state.results.as_ref().and_then(|results| results.get(rank)) {
                Some(result) => result.index,
                None => return false,
            }
        };

        self.dispatch(SearchAction::SetSearchIteratorIndex {
            result_index: index,
            result_iterator_index: rank,
        });
        true
    }

    /// Select a row of the flattened list, as a click on the row would.
    ///
    /// Moves the cursor onto the row when it is a match, otherwise clears the
    /// cursor. Does nothing while a scan is running, since the published
    /// results may describe an older list.
    pub fn select_row(&self, index: usize) -> bool {
        if self.is_searching() {
            return false;
        }

        let rank = self.tree.get(index).and_then(|node| {
            self.state
                .borrow()
                .results_lookup
                .get(&node.id)
                .copied()
        });

        match rank {
            Some(rank) => {
                self.dispatch(SearchAction::SetSearchIteratorIndex {
                    result_index: index,
                    result_iterator_index: rank,
                });
                true
            }
            None => {
                self.dispatch(SearchAction::ClearSearchIteratorIndex);
                false
            }
        }
    }

    /// Expand or collapse the row at `index`.
    ///
    /// Row positions shift when the list changes, so the cursor is dropped
    /// and an active query is searched again over the new list. The selected
    /// node is reselected when the new scan still finds it.
    pub fn set_expanded(&mut self, index: usize, expanded: bool) -> bool {
        let Some(id) = self.tree.get(index).map(|node| node.id) else {
            return false;
        };

        if !self.tree.set_expanded(id, expanded) {
            return false;
        }

        let previous = self.selected_node();
        self.dispatch(SearchAction::ClearSearchIteratorIndex);

        let query = self.state.borrow().query.clone();
        if let Some(query) = query {
            self.start_scan(&query, previous);
        }
        true
    }

    pub fn selected_node(&self) -> Option<NodeRef> {
        self.current().map(|result| result.node)
    }
}
