//! FIFO ordering gate for ring-buffer writes.
//!
//! Synthesis runs concurrently, but audio must enter the ring buffer in the
//! order segments were finalized. Each segment takes a [`Ticket`] when it is
//! dispatched; a worker blocks in [`OrderingGate::wait_turn`] until every
//! earlier ticket has completed. Tickets may complete out of order (a failed
//! segment completes immediately); the serving counter only advances over a
//! contiguous run of completed tickets.
//!
//! `reset` starts a new generation and wakes every waiter, which then sees
//! its ticket is stale and gives up.

use std::collections::BTreeSet;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

/// A place in the write order of one generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket {
    pub generation: u64,
    pub number: u64,
}

#[derive(Debug, Default)]
struct GateState {
    generation: u64,
    next_ticket: u64,
    now_serving: u64,
    completed: BTreeSet<u64>,
}

impl GateState {
    fn is_stale(&self, ticket: &Ticket) -> bool {
        self.generation != ticket.generation
    }
}

#[derive(Debug, Default)]
pub struct OrderingGate {
    state: Mutex<GateState>,
    turn: Condvar,
}

impl OrderingGate {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Takes the next ticket in the current generation.
    pub fn issue(&self) -> Ticket {
        let mut state = self.lock();
        let ticket = Ticket {
            generation: state.generation,
            number: state.next_ticket,
        };
        state.next_ticket += 1;
        ticket
    }

    /// Blocks until `ticket` is being served.
    ///
    /// Returns false if the gate was reset to another generation meanwhile.
    pub fn wait_turn(&self, ticket: &Ticket) -> bool {
        let guard = self.lock();
        let state = self
            .turn
            .wait_while(guard, |state| {
                !state.is_stale(ticket) && state.now_serving != ticket.number
            })
            .unwrap_or_else(PoisonError::into_inner);
        !state.is_stale(ticket)
    }

    /// Marks `ticket` done. Safe to call before its turn and more than once.
    pub fn complete(&self, ticket: &Ticket) {
        let mut state = self.lock();
        if state.is_stale(ticket) || ticket.number < state.now_serving {
            return;
        }
        state.completed.insert(ticket.number);
        let mut advanced = false;
        loop {
            let serving = state.now_serving;
            if !state.completed.remove(&serving) {
                break;
            }
            state.now_serving += 1;
            advanced = true;
        }
        drop(state);
        if advanced {
            self.turn.notify_all();
        }
    }

    /// Runs `f` under the gate lock if `ticket` is the newest one issued.
    ///
    /// Nothing can be issued while `f` runs, so `f` observes a quiescent
    /// write order. Returns whether `f` ran.
    pub fn run_if_last(&self, ticket: &Ticket, f: impl FnOnce()) -> bool {
        let state = self.lock();
        if state.is_stale(ticket) || ticket.number + 1 != state.next_ticket {
            return false;
        }
        f();
        true
    }

    /// Drops all tickets and adopts `generation`, waking every waiter.
    pub fn reset(&self, generation: u64) {
        {
            let mut state = self.lock();
            state.generation = generation;
            state.next_ticket = 0;
            state.now_serving = 0;
            state.completed.clear();
        }
        self.turn.notify_all();
    }

    /// Tickets issued but not yet completed.
    pub fn outstanding(&self) -> u64 {
        let state = self.lock();
        state.next_ticket - state.now_serving
    }
}

/// Completes its ticket when dropped, so a worker that fails, bails out or
/// panics still lets later segments through.
#[derive(Debug)]
pub struct TurnGuard {
    gate: Arc<OrderingGate>,
    ticket: Ticket,
}

impl TurnGuard {
    pub fn new(gate: Arc<OrderingGate>, ticket: Ticket) -> Self {
        Self { gate, ticket }
    }

    pub fn ticket(&self) -> Ticket {
        self.ticket
    }

    /// See [`OrderingGate::wait_turn`].
    pub fn wait_turn(&self) -> bool {
        self.gate.wait_turn(&self.ticket)
    }
}

impl Drop for TurnGuard {
    fn drop(&mut self) {
        self.gate.complete(&self.ticket);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_first_ticket_is_served_immediately() {
        let gate = OrderingGate::new();
        let ticket = gate.issue();
        assert_eq!(ticket.number, 0);
        assert!(gate.wait_turn(&ticket));
    }

    #[test]
    fn test_out_of_order_completion_advances_contiguously() {
        let gate = OrderingGate::new();
        let t0 = gate.issue();
        let t1 = gate.issue();
        let t2 = gate.issue();

        gate.complete(&t2);
        gate.complete(&t1);
        assert_eq!(gate.outstanding(), 3);

        gate.complete(&t0);
        assert_eq!(gate.outstanding(), 0);
    }

    #[test]
    fn test_waiters_are_released_in_ticket_order() {
        let gate = Arc::new(OrderingGate::new());
        let order = Arc::new(Mutex::new(Vec::new()));
        let tickets: Vec<_> = (0..5).map(|_| gate.issue()).collect();

        let handles: Vec<_> = tickets
            .into_iter()
            .rev()
            .map(|ticket| {
                let gate = Arc::clone(&gate);
                let order = Arc::clone(&order);
                thread::spawn(move || {
                    let guard = TurnGuard::new(gate, ticket);
                    assert!(guard.wait_turn());
                    order.lock().unwrap().push(ticket.number);
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_reset_wakes_stale_waiters() {
        let gate = Arc::new(OrderingGate::new());
        let _first = gate.issue();
        let second = gate.issue();

        let waiter = {
            let gate = Arc::clone(&gate);
            thread::spawn(move || gate.wait_turn(&second))
        };
        thread::sleep(Duration::from_millis(20));
        gate.reset(1);

        assert!(!waiter.join().unwrap());
        assert_eq!(gate.outstanding(), 0);
    }

    #[test]
    fn test_stale_completion_is_ignored() {
        let gate = OrderingGate::new();
        let old = gate.issue();
        gate.reset(1);
        let fresh = gate.issue();

        gate.complete(&old);
        assert_eq!(gate.outstanding(), 1);
        assert!(gate.wait_turn(&fresh));
    }

    #[test]
    fn test_guard_completes_on_panic() {
        let gate = Arc::new(OrderingGate::new());
        let t0 = gate.issue();
        let t1 = gate.issue();

        let worker = {
            let gate = Arc::clone(&gate);
            thread::spawn(move || {
                let _guard = TurnGuard::new(gate, t0);
                panic!("synthesis blew up");
            })
        };
        assert!(worker.join().is_err());
        assert!(gate.wait_turn(&t1));
    }

    #[test]
    fn test_run_if_last() {
        let gate = OrderingGate::new();
        let t0 = gate.issue();
        let t1 = gate.issue();

        let mut ran = false;
        assert!(!gate.run_if_last(&t0, || ran = true));
        assert!(!ran);
        assert!(gate.run_if_last(&t1, || ran = true));
        assert!(ran);

        gate.reset(1);
        assert!(!gate.run_if_last(&t1, || {}));
    }

    #[test]
    fn test_double_complete_is_harmless() {
        let gate = OrderingGate::new();
        let t0 = gate.issue();
        let t1 = gate.issue();
        gate.complete(&t0);
        gate.complete(&t0);
        assert_eq!(gate.outstanding(), 1);
        gate.complete(&t1);
        assert_eq!(gate.outstanding(), 0);
    }
}
