//! Background work: thread pools draining ordered sequences of functions.

pub mod function;
pub mod pool;
pub mod queued_worker;


pub use function::{make_function, make_function_with_cancel, Function};
pub use pool::{QueuedWorkerPool, Sequence};
pub use queued_worker::QueuedWorker;
