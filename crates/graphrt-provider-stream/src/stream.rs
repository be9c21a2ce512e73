use std::sync::mpsc;
use std::thread::{self, JoinHandle};

use tracing::{debug, error, trace};

use crate::error::StreamError;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// In-order work queue served by one worker thread.
///
/// Jobs run strictly in submission order, which is what lets kernels on the same stream consume
/// each other's pending outputs without waiting. Dropping the stream drains the queue and joins
/// the worker.
pub struct ComputeStream {
    name: String,
    sender: Option<mpsc::Sender<Job>>,
    worker: Option<JoinHandle<()>>,
}

impl ComputeStream {
    pub fn spawn(name: &str) -> Result<Self, StreamError> {
        let (sender, receiver) = mpsc::channel::<Job>();
        let worker = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                for job in receiver {
                    job();
                }
            })
            .map_err(|source| StreamError::Spawn {
                stream: name.to_string(),
                source,
            })?;
        debug!(stream = %name, "started compute stream");
        Ok(ComputeStream {
            name: name.to_string(),
            sender: Some(sender),
            worker: Some(worker),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn submit(&self, job: impl FnOnce() + Send + 'static) -> Result<(), StreamError> {
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| StreamError::Closed(self.name.clone()))?;
        sender
            .send(Box::new(job))
            .map_err(|_| StreamError::Closed(self.name.clone()))?;
        trace!(stream = %self.name, "queued job");
        Ok(())
    }
}

impl Drop for ComputeStream {
    fn drop(&mut self) {
        drop(self.sender.take());
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!(stream = %self.name, "compute stream worker panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    #[test]
    fn jobs_run_in_submission_order_and_drop_drains_the_queue() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        {
            let stream = ComputeStream::spawn("order").unwrap();
            for index in 0..16 {
                let seen = Arc::clone(&seen);
                stream
                    .submit(move || seen.lock().unwrap().push(index))
                    .unwrap();
            }
        }
        assert_eq!(*seen.lock().unwrap(), (0..16).collect::<Vec<_>>());
    }
}
