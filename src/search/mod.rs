//! Trace search: query matching, the search reducer and the time-sliced scanner
pub mod matcher;
pub mod scanner;
pub mod scheduler;
pub mod session;
pub mod state;

pub use matcher::QueryMatcher;
pub use scanner::{
    search_in_trace_tree, ScanOptions, ScanOutcome, SearchHandle, DEFAULT_BATCH_BUDGET,
};
pub use scheduler::{Clock, FrameId, FrameLoop, ManualClock, Scheduler, SystemClock};
pub use session::TraceSearchSession;
pub use state::{
    reduce, ResultsLookup, SearchAction, SearchPhase, SearchResult, SearchState, SearchStatus,
};
