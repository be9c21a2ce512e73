//! Synchronization handle attached to values produced by asynchronous providers.

use crate::error::KernelResult;

/// Guards a value whose producer may still be running on a device queue.
///
/// The session calls [`Fence::before_using_as_input`] before any consumer reads the value,
/// including the caller when the value is fetched. Implementations block until the producing
/// work has finished and report device-side failures as errors.
pub trait Fence: Send + Sync {
    /// Waits until the value may be read by `consumer_provider` on `queue_id`.
    fn before_using_as_input(&self, consumer_provider: &str, queue_id: usize) -> KernelResult<()>;

    /// Signals that the consumer on `queue_id` has finished reading the value.
    fn after_used_as_input(&self, _queue_id: usize) {}

    /// Waits until the value's storage may be overwritten by `producer_provider`.
    fn before_using_as_output(&self, _producer_provider: &str, _queue_id: usize) -> KernelResult<()> {
        Ok(())
    }

    /// Whether the value's storage can be released now.
    fn can_release(&self) -> bool {
        true
    }
}
