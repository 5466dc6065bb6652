//! Clocks, alarms and the threads that drive them.

mod mock;
#[allow(clippy::module_inception)]
mod scheduler;
mod thread;
pub mod timer;


pub use mock::MockScheduler;
pub use scheduler::{AlarmFn, AlarmId, Scheduler};
pub use thread::SchedulerThread;
pub use timer::{MockTimer, SystemTimer, Timer};
