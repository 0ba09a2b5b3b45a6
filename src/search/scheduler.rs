//! Single-threaded frame scheduling and injectable clocks
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Identifier of a requested frame callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameId(u64);

pub type FrameCallback = Box<dyn FnOnce()>;

/// Host loop that runs callbacks on its next tick
pub trait Scheduler {
    fn request_frame(&self, callback: FrameCallback) -> FrameId;
    fn cancel_frame(&self, id: FrameId);
}

/// Monotonic time source, measured from an arbitrary origin
pub trait Clock {
    fn now(&self) -> Duration;
}

pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Clock for deterministic tests
///
/// Time only moves through `advance`, plus an optional fixed step that is
/// added after every reading.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Cell<Duration>,
    step: Duration,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_step(step: Duration) -> Self {
        Self {
            now: Cell::new(Duration::ZERO),
            step,
        }
    }

    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        let now = self.now.get();
        self.now.set(now + self.step);
        now
    }
}

/// Frame queue with animation-frame semantics
///
/// Callbacks requested while a frame is running are deferred to the next
/// frame, so a callback that keeps rescheduling itself yields between turns.
#[derive(Default)]
pub struct FrameLoop {
    queue: RefCell<VecDeque<(FrameId, FrameCallback)>>,
    next_id: Cell<u64>,
    frames_run: Cell<usize>,
}

impl FrameLoop {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> usize {
        self.queue.borrow().len()
    }

    pub fn is_idle(&self) -> bool {
        self.queue.borrow().is_empty()
    }

    /// Number of frames that ran at least one callback
    pub fn frames_run(&self) -> usize {
        self.frames_run.get()
    }

    /// Run every callback queued before this call. Returns how many ran.
    pub fn run_frame(&self) -> usize {
        let frame = std::mem::take(&mut *self.queue.borrow_mut());
        if frame.is_empty() {
            return 0;
        }

        self.frames_run.set(self.frames_run.get() + 1);
        let count = frame.len();
        for (_, callback) in frame {
            callback();
        }
        count
    }

    /// Run frames until nothing is queued. Returns the number of frames run.
    pub fn run_until_idle(&self) -> usize {
        let mut frames = 0;
        while self.run_frame() > 0 {
            frames += 1;
        }
        frames
    }
}

impl Scheduler for FrameLoop {
    fn request_frame(&self, callback: FrameCallback) -> FrameId {
        let id = FrameId(self.next_id.get());
        self.next_id.set(self.next_id.get() + 1);
        self.queue.borrow_mut().push_back((id, callback));
        id
    }

    fn cancel_frame(&self, id: FrameId) {
        self.queue.borrow_mut().retain(|(queued, _)| *queued != id);
    }
}
