//! Background rotation monitor.
//!
//! One thread per sink that wakes on a fixed interval and runs the rotation
//! check. Dropping the stop sender (or sending on it) ends the loop.

use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};

pub(crate) struct Monitor {
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

impl Monitor {
    pub(crate) fn spawn<F>(interval: Duration, mut tick: F) -> io::Result<Self>
    where
        F: FnMut() + Send + 'static,
    {
        let (stop, stopped) = mpsc::channel::<()>();
        let handle = thread::Builder::new()
            .name("rotalog-monitor".into())
            .spawn(move || {
                debug!(interval_ms = interval.as_millis() as u64, "Rotation monitor started");
                loop {
                    match stopped.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {
                            if panic::catch_unwind(AssertUnwindSafe(&mut tick)).is_err() {
                                warn!("Rotation check panicked; monitor keeps running");
                            }
                        }
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                debug!("Rotation monitor stopped");
            })?;
        Ok(Self { stop, handle })
    }

    /// Signal the thread and wait for it to exit.
    pub(crate) fn stop(self) {
        let _ = self.stop.send(());
        if self.handle.join().is_err() {
            warn!("Rotation monitor thread panicked");
        }
    }
}
