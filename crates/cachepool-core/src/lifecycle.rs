//! End-of-unit-of-work signal.
//!
//! A [`UnitOfWork`] collects hooks while one request or job runs and invokes
//! them, in registration order, when the work finishes. Dropping the unit of
//! work finishes it, so hooks still run if the host never calls
//! [`finish`](UnitOfWork::finish) explicitly.

use std::fmt;
use std::sync::{Mutex, PoisonError};
use tracing::debug;

type Hook = Box<dyn FnOnce() + Send>;

/// Host lifecycle hook registry for one unit of work.
#[derive(Default)]
pub struct UnitOfWork {
    hooks: Mutex<Vec<Hook>>,
}

impl UnitOfWork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a hook to run when the unit of work finishes.
    pub fn on_finish<F>(&self, hook: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.lock().push(Box::new(hook));
    }

    pub fn pending_hooks(&self) -> usize {
        self.lock().len()
    }

    /// Run and discard every registered hook. Returns how many ran.
    ///
    /// Hooks registered while finishing, or after, wait for the next call.
    pub fn finish(&self) -> usize {
        let hooks = std::mem::take(&mut *self.lock());
        let count = hooks.len();
        for hook in hooks {
            hook();
        }
        if count > 0 {
            debug!("Unit of work finished, ran {} hook(s)", count);
        }
        count
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Hook>> {
        self.hooks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for UnitOfWork {
    fn drop(&mut self) {
        self.finish();
    }
}

impl fmt::Debug for UnitOfWork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitOfWork")
            .field("pending_hooks", &self.pending_hooks())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_hooks_run_in_order_once() {
        let unit = UnitOfWork::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        for i in 0..3 {
            let log = Arc::clone(&log);
            unit.on_finish(move || log.lock().unwrap().push(i));
        }
        assert_eq!(unit.pending_hooks(), 3);

        assert_eq!(unit.finish(), 3);
        assert_eq!(unit.finish(), 0);
        assert_eq!(*log.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_drop_runs_pending_hooks() {
        let ran = Arc::new(AtomicUsize::new(0));
        {
            let unit = UnitOfWork::new();
            let ran = Arc::clone(&ran);
            unit.on_finish(move || {
                ran.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_hook_registered_after_finish_waits() {
        let unit = UnitOfWork::new();
        unit.finish();

        let ran = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ran);
        unit.on_finish(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(ran.load(Ordering::SeqCst), 0);
        unit.finish();
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }
}
