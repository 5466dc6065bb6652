//! Unit of work run by a sequence: either run or cancelled, exactly once.

pub trait Function: Send + 'static {
    fn run(self: Box<Self>);

    /// Called instead of `run` when the work is dropped by a shutdown.
    fn cancel(self: Box<Self>) {}
}

struct ClosureFunction<R, C> {
    run: R,
    cancel: C,
}

impl<R, C> Function for ClosureFunction<R, C>
where
    R: FnOnce() + Send + 'static,
    C: FnOnce() + Send + 'static,
{
    fn run(self: Box<Self>) {
        (self.run)();
    }

    fn cancel(self: Box<Self>) {
        (self.cancel)();
    }
}

/// Function from a run closure; cancellation does nothing.
pub fn make_function<R>(run: R) -> Box<dyn Function>
where
    R: FnOnce() + Send + 'static,
{
    Box::new(ClosureFunction { run, cancel: || {} })
}

pub fn make_function_with_cancel<R, C>(run: R, cancel: C) -> Box<dyn Function>
where
    R: FnOnce() + Send + 'static,
    C: FnOnce() + Send + 'static,
{
    Box::new(ClosureFunction { run, cancel })
}
