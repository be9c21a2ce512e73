//! Asynchronous stream provider for graphrt.
//!
//! Models a device that executes queued work in order on its own memory. Every output is a
//! pending value guarded by a [`StreamFence`], which exercises the session's fence and
//! cross-device transfer paths.

mod error;
mod fence;
mod kernels;
mod provider;
mod stream;

pub use error::StreamError;
pub use fence::StreamFence;
pub use kernels::register_kernels;
pub use provider::{StreamExecutionProvider, STREAM_PROVIDER};
pub use stream::ComputeStream;
