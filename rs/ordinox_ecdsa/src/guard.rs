
use crate::state::mutate_state;
use crate::MessageId;

/// Maximum number of signing requests in flight at the same time.
pub const MAX_CONCURRENT: usize = 100;

#[derive(Eq, PartialEq, Debug)]
pub enum GuardError {
    AlreadyProcessing,
    TooManyConcurrentRequests,
}

/// Guards the finalization of a message from running twice concurrently and
/// limits the number of concurrent signing requests to [MAX_CONCURRENT].
#[must_use]
#[derive(Debug)]
pub struct FinalizationGuard {
    message_id: MessageId,
}

impl FinalizationGuard {
    pub fn new(message_id: MessageId) -> Result<Self, GuardError> {
        mutate_state(|s| {
            if s.pending_finalizations.contains(&message_id) {
                return Err(GuardError::AlreadyProcessing);
            }
            if s.pending_finalizations.len() >= MAX_CONCURRENT {
                return Err(GuardError::TooManyConcurrentRequests);
            }
            s.pending_finalizations.insert(message_id);
            Ok(Self { message_id })
        })
    }
}

impl Drop for FinalizationGuard {
    fn drop(&mut self) {
        mutate_state(|s| s.pending_finalizations.remove(&self.message_id));
    }
}

#[must_use]
#[derive(Debug)]
pub struct TimerGuard(());

impl TimerGuard {
    pub fn new() -> Option<Self> {
        mutate_state(|s| {
            if s.is_timer_running {
                return None;
            }
            s.is_timer_running = true;
            Some(TimerGuard(()))
        })
    }
}

impl Drop for TimerGuard {
    fn drop(&mut self) {
        mutate_state(|s| {
            s.is_timer_running = false;
        });
    }
}
