//! Releases frame slots when the GPU reports a cycle finished.
//!
//! Each committed cycle hands a [`CompletionSignal`] and its
//! [`FrameTicket`] to the [`CompletionWorker`]. A dedicated thread waits on
//! the signals in submission order and completes the tickets. Failed waits
//! still release the slot.

use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, SendError, Sender};
use tracing::{debug, trace, warn};

use crate::error::{CompositorError, CompositorResult};
use crate::scheduler::FrameTicket;

/// Blocks until the GPU work of one cycle is done.
pub trait CompletionSignal: Send {
    fn wait(&self) -> CompositorResult<()>;
}

impl<F> CompletionSignal for F
where
    F: Fn() -> CompositorResult<()> + Send,
{
    fn wait(&self) -> CompositorResult<()> {
        self()
    }
}

struct PendingCompletion {
    signal: Box<dyn CompletionSignal>,
    ticket: FrameTicket,
}

pub struct CompletionWorker {
    sender: Option<Sender<PendingCompletion>>,
    thread: Option<JoinHandle<()>>,
}

impl CompletionWorker {
    /// Starts the worker thread.
    ///
    /// # Errors
    ///
    /// Returns [`CompositorError::Init`] if the thread cannot be spawned.
    pub fn spawn(name: &str) -> CompositorResult<Self> {
        let (sender, receiver) = crossbeam_channel::unbounded();
        let thread = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || run(receiver))
            .map_err(|e| CompositorError::Init(format!("Failed to spawn {}: {}", name, e)))?;

        debug!("Completion worker '{}' started", name);

        Ok(Self {
            sender: Some(sender),
            thread: Some(thread),
        })
    }

    /// Queues `ticket` for release once `signal` fires.
    ///
    /// # Arguments
    ///
    /// * `signal` - Fires when the GPU has finished with the slot's resources
    /// * `ticket` - The slot to release afterwards
    ///
    /// # Errors
    ///
    /// Returns [`CompositorError::Shutdown`] if the worker has been shut down
    /// or its thread is gone. The signal is then waited on the calling thread
    /// before the ticket is released, so the slot is never reused while the
    /// GPU may still read it.
    pub fn submit(
        &self,
        signal: impl CompletionSignal + 'static,
        ticket: FrameTicket,
    ) -> CompositorResult<()> {
        let pending = PendingCompletion {
            signal: Box::new(signal),
            ticket,
        };
        let rejected = match self.sender.as_ref() {
            Some(sender) => match sender.send(pending) {
                Ok(()) => return Ok(()),
                Err(SendError(pending)) => pending,
            },
            None => pending,
        };

        warn!(
            "Completion worker unavailable, waiting for frame {} inline",
            rejected.ticket.sequence()
        );
        rejected.finish();
        Err(CompositorError::Shutdown)
    }

    /// Number of cycles still waiting for their signal.
    pub fn pending(&self) -> usize {
        self.sender.as_ref().map_or(0, Sender::len)
    }

    /// Drains pending completions and joins the thread.
    pub fn shutdown(&mut self) {
        self.sender.take();
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            warn!("Completion worker panicked");
        }
    }
}

impl Drop for CompletionWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl PendingCompletion {
    fn finish(self) {
        let PendingCompletion { signal, ticket } = self;
        if let Err(e) = signal.wait() {
            warn!(
                "Completion wait failed for frame {} (slot {}): {}",
                ticket.sequence(),
                ticket.slot(),
                e
            );
        }
        trace!(sequence = ticket.sequence(), "Frame completed");
        ticket.complete();
    }
}

fn run(receiver: Receiver<PendingCompletion>) {
    for pending in receiver.iter() {
        pending.finish();
    }
    debug!("Completion worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::InFlightScheduler;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    #[test]
    fn test_ticket_released_after_signal() {
        let scheduler = InFlightScheduler::new(1).expect("scheduler");
        let worker = CompletionWorker::spawn("test-completion").expect("worker");
        let (fire, fired) = crossbeam_channel::bounded::<()>(1);

        let ticket = scheduler.acquire();
        worker
            .submit(
                move || {
                    fired
                        .recv()
                        .map_err(|e| CompositorError::Backend(e.to_string()))
                },
                ticket,
            )
            .expect("submit");

        assert!(
            scheduler
                .acquire_timeout(Duration::from_millis(20))
                .is_none()
        );
        fire.send(()).expect("send");
        assert!(
            scheduler
                .acquire_timeout(Duration::from_secs(5))
                .is_some()
        );
    }

    #[test]
    fn test_failed_wait_still_releases() {
        let scheduler = InFlightScheduler::new(1).expect("scheduler");
        let worker = CompletionWorker::spawn("test-completion").expect("worker");

        worker
            .submit(
                || Err(CompositorError::Backend("device lost".into())),
                scheduler.acquire(),
            )
            .expect("submit");

        assert!(scheduler.wait_idle_timeout(Duration::from_secs(5)));
        assert_eq!(scheduler.stats().released, 1);
    }

    #[test]
    fn test_shutdown_drains_pending() {
        let scheduler = InFlightScheduler::new(3).expect("scheduler");
        let mut worker = CompletionWorker::spawn("test-completion").expect("worker");
        for _ in 0..3 {
            worker
                .submit(|| Ok(()), scheduler.acquire())
                .expect("submit");
        }

        worker.shutdown();
        assert_eq!(scheduler.in_flight(), 0);

        let result = worker.submit(|| Ok(()), scheduler.acquire());
        assert!(matches!(result, Err(CompositorError::Shutdown)));
        assert_eq!(scheduler.in_flight(), 0);
    }

    #[test]
    fn test_rejected_submit_waits_before_release() {
        let scheduler = InFlightScheduler::new(1).expect("scheduler");
        let mut worker = CompletionWorker::spawn("test-completion").expect("worker");
        worker.shutdown();

        let observer = scheduler.clone();
        let held_during_wait = Arc::new(AtomicBool::new(false));
        let held = Arc::clone(&held_during_wait);
        let result = worker.submit(
            move || {
                held.store(observer.in_flight() == 1, Ordering::SeqCst);
                Ok(())
            },
            scheduler.acquire(),
        );

        assert!(matches!(result, Err(CompositorError::Shutdown)));
        assert!(held_during_wait.load(Ordering::SeqCst));
        assert_eq!(scheduler.in_flight(), 0);
    }
}
