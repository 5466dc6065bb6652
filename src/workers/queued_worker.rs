use super::function::Function;
use super::pool::{QueuedWorkerPool, Sequence};

/// One thread running functions in submission order.
pub struct QueuedWorker {
    pool: QueuedWorkerPool,
    sequence: Sequence,
}

impl QueuedWorker {
    pub fn new(name: &str) -> Self {
        let pool = QueuedWorkerPool::new(1, name);
        let sequence = pool.new_sequence();
        Self { pool, sequence }
    }

    pub fn run_in_work_thread(&self, f: Box<dyn Function>) {
        self.sequence.add(f);
    }

    pub fn pending(&self) -> usize {
        self.sequence.pending()
    }

    /// Blocks until queued work has run.
    pub fn wait_idle(&self) {
        self.sequence.wait_idle();
    }

    /// Cancels pending work and stops the thread.
    pub fn shut_down(&self) {
        self.pool.shut_down();
    }
}

impl Drop for QueuedWorker {
    fn drop(&mut self) {
        self.pool.shut_down();
    }
}
