use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use graphrt::types::{ValueData, ValueWriter};
use graphrt::{Fence, KernelResult, Value};

/// Fence that only publishes its value once a consumer waits on it.
///
/// Reading the value without calling [`Fence::before_using_as_input`] first fails with
/// `NotReady`, which makes any path that skips the fence observable in tests.
#[derive(Default)]
pub struct StrictFence {
    pending: Mutex<Option<(ValueWriter, ValueData)>>,
    consumers: Mutex<Vec<String>>,
    released: AtomicUsize,
}

impl StrictFence {
    /// Returns a pending value that becomes readable on its first wait.
    pub fn fenced_value(data: ValueData) -> (Value, Arc<StrictFence>) {
        let fence = Arc::new(StrictFence::default());
        let (value, writer) = Value::pending(data.data_type(), Arc::clone(&fence) as Arc<dyn Fence>);
        fence
            .pending
            .lock()
            .expect("fence mutex poisoned")
            .replace((writer, data));
        (value, fence)
    }

    /// Providers that waited on the fence, in call order.
    pub fn consumers(&self) -> Vec<String> {
        self.consumers.lock().expect("fence mutex poisoned").clone()
    }

    pub fn is_fulfilled(&self) -> bool {
        self.pending.lock().expect("fence mutex poisoned").is_none()
    }

    /// Number of `after_used_as_input` signals received.
    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

impl Fence for StrictFence {
    fn before_using_as_input(&self, consumer_provider: &str, _queue_id: usize) -> KernelResult<()> {
        self.consumers
            .lock()
            .expect("fence mutex poisoned")
            .push(consumer_provider.to_string());
        let pending = self.pending.lock().expect("fence mutex poisoned").take();
        if let Some((writer, data)) = pending {
            writer.fulfill(data)?;
        }
        Ok(())
    }

    fn after_used_as_input(&self, _queue_id: usize) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}
