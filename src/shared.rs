//! Shared session state: cancellation token, atomic request status,
//! cancellable waits.
//!
//! Every wait in the crate goes through [`wait_cancellable`], so cancelling
//! a request deterministically stops all pending timers: no poll or
//! cooldown callback can fire after the token is set.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Cancellation handle shared between a navigation request and its
/// interaction sessions.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Granularity of cancellation checks inside a wait.
const WAIT_SLICE: Duration = Duration::from_millis(5);

/// Sleep for `duration`, checking the token between slices.
///
/// Returns false if the token was set before the wait elapsed.
pub fn wait_cancellable(token: &CancelToken, duration: Duration) -> bool {
    let deadline = Instant::now() + duration;
    loop {
        if token.is_cancelled() {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        std::thread::sleep(WAIT_SLICE.min(deadline - now));
    }
}

/// Status of a navigation request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestStatus {
    Pending,
    Planning,
    Walking,
    Interacting,
    Succeeded,
    Failed,
}

impl RequestStatus {
    /// Terminal statuses never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestStatus::Succeeded | RequestStatus::Failed)
    }

    fn from_u8(v: u8) -> Self {
        match v {
            0 => RequestStatus::Pending,
            1 => RequestStatus::Planning,
            2 => RequestStatus::Walking,
            3 => RequestStatus::Interacting,
            4 => RequestStatus::Succeeded,
            _ => RequestStatus::Failed,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            RequestStatus::Pending => 0,
            RequestStatus::Planning => 1,
            RequestStatus::Walking => 2,
            RequestStatus::Interacting => 3,
            RequestStatus::Succeeded => 4,
            RequestStatus::Failed => 5,
        }
    }
}

/// Lock-free status cell readable from other threads while the request's
/// control flow is blocked in a walk or an interaction.
#[derive(Debug)]
pub struct StatusCell(AtomicU8);

impl StatusCell {
    pub fn new(status: RequestStatus) -> Self {
        Self(AtomicU8::new(status.as_u8()))
    }

    pub fn load(&self) -> RequestStatus {
        RequestStatus::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn store(&self, status: RequestStatus) {
        self.0.store(status.as_u8(), Ordering::Release);
    }
}
