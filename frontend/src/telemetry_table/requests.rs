use std::collections::{HashMap, HashSet};
use std::fmt;
use std::time::Duration;

use tokio::time::Instant;
use tracker_shared::Direction;

/// One fetch window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestKey {
    pub direction: Direction,
    pub start_id: u64,
}

impl RequestKey {
    pub fn new(start_id: u64, direction: Direction) -> Self {
        Self {
            direction,
            start_id,
        }
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.direction, self.start_id)
    }
}

/// A key absent from the ledger is idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Requested,
    Resolved,
    Failed,
}

/// Why a load was not issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    OutOfRange,
    InFlight,
    DuplicateStart,
    AlreadyRequested,
    Coalesced,
    Exhausted,
    Destroyed,
}

#[derive(Debug, Default)]
pub struct RequestLedger {
    windows: HashMap<RequestKey, RequestState>,
    requested_ids: HashSet<u64>,
    last_up_start: Option<u64>,
    last_down_start: Option<u64>,
    in_flight: usize,
    last_started_at: Option<Instant>,
}

impl RequestLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, key: RequestKey) -> Option<RequestState> {
        self.windows.get(&key).copied()
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight > 0
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn is_requested(&self, id: u64) -> bool {
        self.requested_ids.contains(&id)
    }

    pub fn last_start(&self, direction: Direction) -> Option<u64> {
        match direction {
            Direction::Up => self.last_up_start,
            Direction::Down => self.last_down_start,
        }
    }

    fn last_start_mut(&mut self, direction: Direction) -> &mut Option<u64> {
        match direction {
            Direction::Up => &mut self.last_up_start,
            Direction::Down => &mut self.last_down_start,
        }
    }

    /// Guards that do not depend on the cache contents.
    pub fn check(&self, key: RequestKey, now: Instant, coalesce: Duration) -> Result<(), Rejection> {
        if key.start_id == 0 {
            return Err(Rejection::OutOfRange);
        }
        if self.state(key) == Some(RequestState::Requested) {
            return Err(Rejection::InFlight);
        }
        if self.last_start(key.direction) == Some(key.start_id) {
            return Err(Rejection::DuplicateStart);
        }
        if self.requested_ids.contains(&key.start_id) {
            return Err(Rejection::AlreadyRequested);
        }
        if self.is_loading()
            && self
                .last_started_at
                .is_some_and(|started| now.duration_since(started) < coalesce)
        {
            return Err(Rejection::Coalesced);
        }
        Ok(())
    }

    pub fn reserve(&mut self, key: RequestKey, now: Instant) {
        self.windows.insert(key, RequestState::Requested);
        self.requested_ids.insert(key.start_id);
        *self.last_start_mut(key.direction) = Some(key.start_id);
        self.in_flight += 1;
        self.last_started_at = Some(now);
    }

    fn finish(&mut self, key: RequestKey, state: RequestState) -> bool {
        match self.windows.get_mut(&key) {
            Some(current) if *current == RequestState::Requested => {
                *current = state;
                self.in_flight = self.in_flight.saturating_sub(1);
                true
            }
            _ => false,
        }
    }

    pub fn resolve(&mut self, key: RequestKey) {
        self.finish(key, RequestState::Resolved);
    }

    /// Marks the window failed and rolls back its reservation so the same
    /// start id can be requested again.
    pub fn fail(&mut self, key: RequestKey) {
        if self.finish(key, RequestState::Failed) {
            self.requested_ids.remove(&key.start_id);
            let last = self.last_start_mut(key.direction);
            if *last == Some(key.start_id) {
                *last = None;
            }
        }
    }

    /// Forgets settled windows starting at evicted ids. Windows still in
    /// flight are kept.
    pub fn release_ids(&mut self, ids: &[u64]) {
        for &id in ids {
            let in_flight = [Direction::Up, Direction::Down].into_iter().any(|direction| {
                self.state(RequestKey::new(id, direction)) == Some(RequestState::Requested)
            });
            if in_flight {
                continue;
            }
            self.requested_ids.remove(&id);
            for direction in [Direction::Up, Direction::Down] {
                self.windows.remove(&RequestKey::new(id, direction));
                let last = self.last_start_mut(direction);
                if *last == Some(id) {
                    *last = None;
                }
            }
        }
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
