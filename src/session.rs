//src/session.rs
//! Guards for screen-level fetches: newest-wins refreshes and single-flight generation.
use std::cell::Cell;
use std::rc::Rc;

/// Identifies one refresh request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Ticket(u64);

/// Issues monotonically increasing tickets.
#[derive(Debug, Default)]
pub struct RefreshCounter {
    issued: u64,
}

impl RefreshCounter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new refresh. Every earlier ticket is now superseded.
    pub fn begin(&mut self) -> Ticket {
        self.issued += 1;
        Ticket(self.issued)
    }

    #[must_use]
    pub fn is_current(&self, ticket: Ticket) -> bool {
        ticket.0 == self.issued
    }
}

/// Holds the value produced by the newest accepted refresh.
#[derive(Debug)]
pub struct Latest<T> {
    counter: RefreshCounter,
    value: Option<T>,
}

impl<T> Default for Latest<T> {
    fn default() -> Self {
        Self {
            counter: RefreshCounter::default(),
            value: None,
        }
    }
}

impl<T> Latest<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&mut self) -> Ticket {
        self.counter.begin()
    }

    /// Stores `value` only if `ticket` is still the newest one. Returns whether it was kept.
    pub fn accept(&mut self, ticket: Ticket, value: T) -> bool {
        if !self.counter.is_current(ticket) {
            tracing::debug!(?ticket, "dropping superseded refresh result");
            return false;
        }
        self.value = Some(value);
        true
    }

    #[must_use]
    pub const fn get(&self) -> Option<&T> {
        self.value.as_ref()
    }
}

/// Allows at most one operation of a kind to be in flight.
#[derive(Debug, Default, Clone)]
pub struct SingleFlight {
    busy: Rc<Cell<bool>>,
}

impl SingleFlight {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a guard, or `None` while another guard is alive.
    #[must_use]
    pub fn try_start(&self) -> Option<InFlight> {
        if self.busy.replace(true) {
            return None;
        }
        Some(InFlight {
            busy: Rc::clone(&self.busy),
        })
    }

    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.busy.get()
    }
}

/// Releases its `SingleFlight` when dropped.
#[derive(Debug)]
pub struct InFlight {
    busy: Rc<Cell<bool>>,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.busy.set(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newer_ticket_supersedes_older() {
        let mut counter = RefreshCounter::new();
        let first = counter.begin();
        let second = counter.begin();
        assert!(first < second);
        assert!(!counter.is_current(first));
        assert!(counter.is_current(second));
    }

    #[test]
    fn stale_result_does_not_overwrite_newer_state() {
        let mut latest = Latest::new();
        let slow = latest.begin();
        let fast = latest.begin();
        assert!(latest.accept(fast, "fresh"));
        assert!(!latest.accept(slow, "stale"));
        assert_eq!(latest.get(), Some(&"fresh"));
    }

    #[test]
    fn single_flight_allows_one_guard_at_a_time() {
        let flight = SingleFlight::new();
        let guard = flight.try_start().unwrap();
        assert!(flight.is_busy());
        assert!(flight.try_start().is_none());
        drop(guard);
        assert!(!flight.is_busy());
        assert!(flight.try_start().is_some());
    }
}
