//! Single-flight background worker.
//!
//! Interactive front ends run one embed or detect at a time per control and
//! keep the UI responsive while it runs. A [`TaskSlot`] refuses a second
//! submission until the first one has returned.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::error::{Error, Result};

/// Runs at most one task at a time on a background thread.
#[derive(Debug, Clone, Default)]
pub struct TaskSlot {
    busy: Arc<AtomicBool>,
}

/// Clears the busy flag when the task returns or unwinds.
struct Release(Arc<AtomicBool>);

impl Drop for Release {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl TaskSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// Start `task` on a new thread, or fail with [`Error::TaskInFlight`]
    /// if the previous one has not returned yet.
    pub fn submit<T, F>(&self, task: F) -> Result<TaskHandle<T>>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        if self
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(Error::TaskInFlight);
        }

        let (tx, rx) = mpsc::channel();
        let release = Release(Arc::clone(&self.busy));
        let thread = thread::Builder::new()
            .name("hushmark-task".into())
            .spawn(move || {
                let output = {
                    let _release = release;
                    task()
                };
                // The handle may already be gone; nobody wants the result then.
                let _ = tx.send(output);
            });

        match thread {
            Ok(thread) => Ok(TaskHandle {
                rx,
                thread,
                output: None,
            }),
            Err(e) => {
                // The closure (and its `Release`) was dropped with the failed spawn.
                self.busy.store(false, Ordering::SeqCst);
                Err(Error::Io(e))
            }
        }
    }
}

/// Handle to a task started by [`TaskSlot::submit`].
pub struct TaskHandle<T> {
    rx: Receiver<T>,
    thread: JoinHandle<()>,
    output: Option<T>,
}

impl<T> TaskHandle<T> {
    pub fn is_finished(&self) -> bool {
        self.output.is_some() || self.thread.is_finished()
    }

    /// Wait up to `timeout` for the task. Returns `true` once it has finished,
    /// whether it succeeded or panicked.
    pub fn wait_timeout(&mut self, timeout: Duration) -> bool {
        if self.output.is_some() {
            return true;
        }
        match self.rx.recv_timeout(timeout) {
            Ok(output) => {
                self.output = Some(output);
                true
            }
            Err(RecvTimeoutError::Timeout) => false,
            Err(RecvTimeoutError::Disconnected) => true,
        }
    }

    /// Block until the task finishes and take its output.
    pub fn join(self) -> Result<T> {
        let output = match self.output {
            Some(output) => Some(output),
            None => self.rx.recv().ok(),
        };
        let _ = self.thread.join();
        output.ok_or(Error::TaskPanicked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runs_task_and_returns_output() {
        let slot = TaskSlot::new();
        let handle = slot.submit(|| 6 * 7).unwrap();
        assert_eq!(handle.join().unwrap(), 42);
        assert!(!slot.is_busy());
    }

    #[test]
    fn second_submit_is_refused_while_busy() {
        let slot = TaskSlot::new();
        let (go_tx, go_rx) = mpsc::channel::<()>();
        let first = slot
            .submit(move || {
                go_rx.recv().unwrap();
                "first"
            })
            .unwrap();

        assert!(slot.is_busy());
        assert!(matches!(slot.submit(|| "second"), Err(Error::TaskInFlight)));

        go_tx.send(()).unwrap();
        assert_eq!(first.join().unwrap(), "first");
        assert_eq!(slot.submit(|| "third").unwrap().join().unwrap(), "third");
    }

    #[test]
    fn wait_timeout_polls() {
        let slot = TaskSlot::new();
        let (go_tx, go_rx) = mpsc::channel::<()>();
        let mut handle = slot.submit(move || go_rx.recv().is_ok()).unwrap();

        assert!(!handle.wait_timeout(Duration::from_millis(10)));
        assert!(!handle.is_finished());

        go_tx.send(()).unwrap();
        assert!(handle.wait_timeout(Duration::from_secs(5)));
        assert!(handle.is_finished());
        assert!(handle.join().unwrap());
    }

    #[test]
    fn panicking_task_frees_the_slot() {
        let slot = TaskSlot::new();
        let handle = slot.submit(|| -> u32 { panic!("boom") }).unwrap();
        assert!(matches!(handle.join(), Err(Error::TaskPanicked)));
        assert!(!slot.is_busy());
    }
}
