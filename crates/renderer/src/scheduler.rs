//! Bounded admission of frames between CPU submission and GPU completion.
//!
//! [`InFlightScheduler::acquire`] blocks while `capacity` frames are
//! outstanding. Each admission is a [`FrameTicket`]; the slot goes back to the
//! scheduler exactly once, either through [`FrameTicket::complete`] or when the
//! ticket is dropped on a skipped cycle or an error path.
//!
//! Tickets may be released in any order. The slot index only selects per-slot
//! resources; callers must not expect a particular slot back.
//!
//! # Example
//!
//! ```
//! use compositor_renderer::InFlightScheduler;
//!
//! # fn main() -> compositor_renderer::CompositorResult<()> {
//! let scheduler = InFlightScheduler::new(2)?;
//! let first = scheduler.acquire();
//! let second = scheduler.acquire();
//! assert!(scheduler.try_acquire().is_none());
//!
//! second.complete();
//! drop(first);
//! assert_eq!(scheduler.in_flight(), 0);
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::trace;

use crate::error::{CompositorError, CompositorResult};

/// Counters for observability.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Tickets handed out since creation.
    pub acquired: u64,
    /// Tickets returned since creation.
    pub released: u64,
}

struct State {
    free_slots: Vec<usize>,
    next_sequence: u64,
    stats: SchedulerStats,
}

struct Inner {
    capacity: usize,
    state: Mutex<State>,
    /// Signaled on every release.
    released: Condvar,
}

impl Inner {
    fn release(&self, slot: usize, sequence: u64) {
        let mut state = self.state.lock();
        state.free_slots.push(slot);
        state.stats.released += 1;
        let in_flight = self.capacity - state.free_slots.len();
        drop(state);

        trace!(slot, sequence, in_flight, "Released frame slot");
        self.released.notify_all();
    }
}

/// Cloneable handle; all clones share one set of slots.
#[derive(Clone)]
pub struct InFlightScheduler {
    inner: Arc<Inner>,
}

impl InFlightScheduler {
    /// Creates a scheduler with `capacity` frame slots.
    ///
    /// # Errors
    ///
    /// Returns [`CompositorError::Init`] for a capacity of zero.
    pub fn new(capacity: usize) -> CompositorResult<Self> {
        if capacity == 0 {
            return Err(CompositorError::Init(
                "in-flight capacity must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            inner: Arc::new(Inner {
                capacity,
                state: Mutex::new(State {
                    // Popped from the back, so slot 0 is handed out first.
                    free_slots: (0..capacity).rev().collect(),
                    next_sequence: 0,
                    stats: SchedulerStats::default(),
                }),
                released: Condvar::new(),
            }),
        })
    }

    /// Blocks until a slot is free. Never times out.
    pub fn acquire(&self) -> FrameTicket {
        let mut state = self.inner.state.lock();
        while state.free_slots.is_empty() {
            trace!("All {} frame slots in flight, waiting", self.inner.capacity);
            self.inner.released.wait(&mut state);
        }
        self.issue(&mut state)
    }

    /// Takes a free slot without blocking. `None` if every slot is in flight.
    pub fn try_acquire(&self) -> Option<FrameTicket> {
        let mut state = self.inner.state.lock();
        if state.free_slots.is_empty() {
            return None;
        }
        Some(self.issue(&mut state))
    }

    /// Like [`acquire`](Self::acquire), but gives up after `timeout`.
    pub fn acquire_timeout(&self, timeout: Duration) -> Option<FrameTicket> {
        let deadline = Instant::now() + timeout;
        let mut state = self.inner.state.lock();
        while state.free_slots.is_empty() {
            if self
                .inner
                .released
                .wait_until(&mut state, deadline)
                .timed_out()
            {
                break;
            }
        }
        if state.free_slots.is_empty() {
            return None;
        }
        Some(self.issue(&mut state))
    }

    /// Blocks until every ticket has been released.
    pub fn wait_idle(&self) {
        let mut state = self.inner.state.lock();
        while state.free_slots.len() < self.inner.capacity {
            self.inner.released.wait(&mut state);
        }
    }

    /// Like [`wait_idle`](Self::wait_idle); returns false on timeout.
    pub fn wait_idle_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.inner.state.lock();
        while state.free_slots.len() < self.inner.capacity {
            if self
                .inner
                .released
                .wait_until(&mut state, deadline)
                .timed_out()
            {
                break;
            }
        }
        state.free_slots.len() == self.inner.capacity
    }

    /// Tickets issued and not yet released.
    pub fn in_flight(&self) -> usize {
        self.inner.capacity - self.inner.state.lock().free_slots.len()
    }

    /// Maximum number of frames in flight.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Snapshot of the admission counters.
    pub fn stats(&self) -> SchedulerStats {
        self.inner.state.lock().stats
    }

    fn issue(&self, state: &mut State) -> FrameTicket {
        // Callers checked that a slot is free.
        let slot = state.free_slots.pop().unwrap_or_default();
        let sequence = state.next_sequence;
        state.next_sequence += 1;
        state.stats.acquired += 1;

        trace!(
            slot,
            sequence,
            in_flight = self.inner.capacity - state.free_slots.len(),
            "Acquired frame slot"
        );

        FrameTicket {
            slot,
            sequence,
            owner: Some(self.inner.clone()),
        }
    }
}

impl fmt::Debug for InFlightScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InFlightScheduler")
            .field("capacity", &self.capacity())
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

/// One admitted frame. Releases its slot exactly once.
#[must_use = "dropping a ticket releases its slot immediately"]
pub struct FrameTicket {
    slot: usize,
    sequence: u64,
    owner: Option<Arc<Inner>>,
}

impl FrameTicket {
    /// Index in `0..capacity` selecting this frame's per-slot resources.
    #[inline]
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Admission order, starting at 0.
    #[inline]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Releases the slot after the frame's GPU work has completed.
    pub fn complete(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(owner) = self.owner.take() {
            owner.release(self.slot, self.sequence);
        }
    }
}

impl Drop for FrameTicket {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for FrameTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameTicket")
            .field("slot", &self.slot)
            .field("sequence", &self.sequence)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(matches!(
            InFlightScheduler::new(0),
            Err(CompositorError::Init(_))
        ));
    }

    #[test]
    fn test_capacity_bound() {
        let scheduler = InFlightScheduler::new(3).expect("scheduler");
        let tickets: Vec<_> = (0..3).map(|_| scheduler.acquire()).collect();
        assert_eq!(scheduler.in_flight(), 3);
        assert!(scheduler.try_acquire().is_none());
        assert!(
            scheduler
                .acquire_timeout(Duration::from_millis(10))
                .is_none()
        );

        let mut slots: Vec<_> = tickets.iter().map(FrameTicket::slot).collect();
        slots.sort_unstable();
        assert_eq!(slots, vec![0, 1, 2]);

        drop(tickets);
        assert_eq!(scheduler.in_flight(), 0);
    }

    #[test]
    fn test_sequence_is_monotonic() {
        let scheduler = InFlightScheduler::new(2).expect("scheduler");
        let sequences: Vec<u64> = (0..5).map(|_| scheduler.acquire().sequence()).collect();
        assert_eq!(sequences, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_release_out_of_order() {
        let scheduler = InFlightScheduler::new(3).expect("scheduler");
        let first = scheduler.acquire();
        let second = scheduler.acquire();
        let third = scheduler.acquire();

        second.complete();
        assert_eq!(scheduler.in_flight(), 2);

        let fourth = scheduler.try_acquire().expect("a slot was released");
        assert_eq!(fourth.slot(), 1);

        third.complete();
        first.complete();
        fourth.complete();

        let stats = scheduler.stats();
        assert_eq!(stats.acquired, 4);
        assert_eq!(stats.released, 4);
        assert_eq!(scheduler.in_flight(), 0);
    }

    #[test]
    fn test_acquire_blocks_until_release() {
        let scheduler = InFlightScheduler::new(1).expect("scheduler");
        let held = scheduler.acquire();

        let waiter = {
            let scheduler = scheduler.clone();
            thread::spawn(move || scheduler.acquire().sequence())
        };

        thread::sleep(Duration::from_millis(20));
        assert!(!waiter.is_finished());

        held.complete();
        assert_eq!(waiter.join().expect("waiter panicked"), 1);
    }

    #[test]
    fn test_wait_idle_timeout() {
        let scheduler = InFlightScheduler::new(2).expect("scheduler");
        let ticket = scheduler.acquire();
        assert!(!scheduler.wait_idle_timeout(Duration::from_millis(5)));
        drop(ticket);
        assert!(scheduler.wait_idle_timeout(Duration::from_millis(5)));
    }

    #[test]
    fn test_ticket_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<FrameTicket>();
        assert_send::<InFlightScheduler>();
    }
}
