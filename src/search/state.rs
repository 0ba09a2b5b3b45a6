//! Search state and its transition function
use crate::tree::{NodeId, NodeRef};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::rc::Rc;

/// A matching row: its position in the flattened list and the row itself
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub index: usize,
    pub node: NodeRef,
}

impl PartialEq for SearchResult {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && Rc::ptr_eq(&self.node, &other.node)
    }
}

/// Rank of every matching node, keyed by node identity
pub type ResultsLookup = HashMap<NodeId, usize>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchPhase {
    Loading,
    Success,
    /// Reserved for hosts that report their own failures. The scanner never
    /// fails, so nothing in this crate produces it.
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchStatus {
    pub timestamp: DateTime<Utc>,
    pub phase: SearchPhase,
}

impl SearchStatus {
    fn now(phase: SearchPhase) -> Self {
        Self {
            timestamp: Utc::now(),
            phase,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchState {
    pub query: Option<String>,
    pub results: Option<Vec<SearchResult>>,
    pub results_lookup: ResultsLookup,
    /// Position of the selected match in the flattened list
    pub result_index: Option<usize>,
    /// Rank of the selected match within `results`
    pub result_iterator_index: Option<usize>,
    pub status: Option<SearchStatus>,
}

impl SearchState {
    pub fn current(&self) -> Option<&SearchResult> {
        let rank = self.result_iterator_index?;
        self.results.as_ref()?.get(rank)
    }

    pub fn result_count(&self) -> usize {
        self.results.as_ref().map_or(0, Vec::len)
    }

    pub fn is_loading(&self) -> bool {
        matches!(
            self.status,
            Some(SearchStatus {
                phase: SearchPhase::Loading,
                ..
            })
        )
    }

    fn non_empty_results(&self) -> Option<&[SearchResult]> {
        self.results.as_deref().filter(|results| !results.is_empty())
    }

    fn position_at(self, rank: usize) -> Self {
        let result_index = self.results.as_ref().map(|results| results[rank].index);
        Self {
            result_iterator_index: Some(rank),
            result_index,
            ..self
        }
    }

    fn clear_cursor(self) -> Self {
        Self {
            result_index: None,
            result_iterator_index: None,
            ..self
        }
    }
}

#[derive(Debug, Clone)]
pub enum SearchAction {
    SetQuery(String),
    SetResults {
        results: Vec<SearchResult>,
        results_lookup: ResultsLookup,
        result_index: Option<usize>,
        result_iterator_index: Option<usize>,
    },
    GoToFirstMatch,
    GoToLastMatch,
    GoToNextMatch,
    GoToPreviousMatch,
    SetSearchIteratorIndex {
        result_index: usize,
        result_iterator_index: usize,
    },
    ClearSearchIteratorIndex,
    ClearQuery,
    Clear,
}

/// Apply one action to the search state.
///
/// # Panics
///
/// `GoToNextMatch` and `GoToPreviousMatch` panic when the computed rank falls
/// outside `results`, which only happens if a cursor was set to a rank the
/// current results do not have.
pub fn reduce(state: SearchState, action: SearchAction) -> SearchState {
    match action {
        SearchAction::SetQuery(query) => SearchState {
            query: Some(query),
            status: Some(SearchStatus::now(SearchPhase::Loading)),
            ..state
        },
        SearchAction::SetResults {
            results,
            results_lookup,
            result_index,
            result_iterator_index,
        } => SearchState {
            results: Some(results),
            results_lookup,
            result_index,
            result_iterator_index,
            status: Some(SearchStatus::now(SearchPhase::Success)),
            ..state
        },
        SearchAction::GoToFirstMatch => {
            if state.non_empty_results().is_none() {
                return state;
            }
            state.position_at(0)
        }
        SearchAction::GoToLastMatch => {
            let Some(results) = state.non_empty_results() else {
                return state;
            };
            let last = results.len() - 1;
            state.position_at(last)
        }
        SearchAction::GoToNextMatch => {
            let Some(results) = state.non_empty_results() else {
                return state;
            };
            let len = results.len();
            let next = match state.result_iterator_index {
                None => 0,
                Some(rank) if rank + 1 >= len => 0,
                Some(rank) => rank + 1,
            };
            assert!(next < len, "search iterator index {next} out of bounds ({len} results)");
            state.position_at(next)
        }
        SearchAction::GoToPreviousMatch => {
            let Some(results) = state.non_empty_results() else {
                return state;
            };
            let len = results.len();
            let previous = match state.result_iterator_index {
                None | Some(0) => len - 1,
                Some(rank) => rank - 1,
            };
            assert!(
                previous < len,
                "search iterator index {previous} out of bounds ({len} results)"
            );
            state.position_at(previous)
        }
        SearchAction::SetSearchIteratorIndex {
            result_index,
            result_iterator_index,
        } => SearchState {
            result_index: Some(result_index),
            result_iterator_index: Some(result_iterator_index),
            ..state
        },
        // Both actions only drop the cursor; callers dispatch them at different points.
        SearchAction::ClearSearchIteratorIndex | SearchAction::Clear => state.clear_cursor(),
        SearchAction::ClearQuery => SearchState::default(),
    }
}
