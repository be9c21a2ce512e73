use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use graphrt::{Fence, KernelResult};

use crate::error::StreamError;

#[derive(Debug, Clone, PartialEq, Eq)]
enum FenceState {
    Pending,
    Complete,
    Failed(String),
}

/// Completion signal for one job queued on a [`ComputeStream`](crate::stream::ComputeStream).
///
/// Consumers on the producing stream are ordered by the queue and never block; every other
/// consumer waits until the job has finished. A failed job is reported to every consumer.
pub struct StreamFence {
    stream: String,
    provider: String,
    state: Mutex<FenceState>,
    signal: Condvar,
}

impl StreamFence {
    pub fn new(stream: &str, provider: &str) -> Arc<Self> {
        Arc::new(StreamFence {
            stream: stream.to_string(),
            provider: provider.to_string(),
            state: Mutex::new(FenceState::Pending),
            signal: Condvar::new(),
        })
    }

    pub fn complete(&self) {
        self.settle(FenceState::Complete);
    }

    pub fn fail(&self, message: impl Into<String>) {
        self.settle(FenceState::Failed(message.into()));
    }

    fn lock_state(&self) -> Result<MutexGuard<'_, FenceState>, StreamError> {
        self.state
            .lock()
            .map_err(|_| StreamError::Poisoned(self.stream.clone()))
    }

    // The state is a plain enum, so a poisoned guard still holds a valid value.
    fn settle(&self, outcome: FenceState) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state == FenceState::Pending {
            *state = outcome;
        }
        self.signal.notify_all();
    }

    pub fn is_pending(&self) -> bool {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) == FenceState::Pending
    }

    /// Blocks until the job has finished.
    pub fn wait(&self) -> Result<(), StreamError> {
        let mut state = self.lock_state()?;
        while *state == FenceState::Pending {
            state = self
                .signal
                .wait(state)
                .map_err(|_| StreamError::Poisoned(self.stream.clone()))?;
        }
        self.outcome(&state)
    }

    fn outcome(&self, state: &FenceState) -> Result<(), StreamError> {
        match state {
            FenceState::Failed(message) => Err(StreamError::Device {
                stream: self.stream.clone(),
                message: message.clone(),
            }),
            _ => Ok(()),
        }
    }
}

impl Fence for StreamFence {
    fn before_using_as_input(&self, consumer_provider: &str, _queue_id: usize) -> KernelResult<()> {
        if consumer_provider == self.provider {
            let state = self.lock_state()?;
            return Ok(self.outcome(&state)?);
        }
        Ok(self.wait()?)
    }

    fn can_release(&self) -> bool {
        !self.is_pending()
    }
}
