pub mod pool;
pub mod queue;

pub use pool::{FramePool, PoolStats};
pub use queue::{BoundedFrameQueue, QueueStats};
