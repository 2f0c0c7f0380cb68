use std::collections::HashMap;

/// Read operations whose results can be cached.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    Count,
}

/// Cache key: an operation and its arguments.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Query {
    pub operation: Operation,
    pub name: String,
}

impl Query {
    pub fn count(name: impl Into<String>) -> Self {
        Self {
            operation: Operation::Count,
            name: name.into(),
        }
    }
}

/// State of one cached [Query].
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum State {
    /// No server value has been read yet.
    #[default]
    Unloaded,

    /// The last server value, with no local changes on top.
    Loaded(f64),

    /// A server value with local changes that the server has not been observed to include.
    Optimistic {
        /// Last value read from the server.
        confirmed: f64,
        /// Sum of deltas of writes still in flight.
        inflight: f64,
        /// Sum of deltas of writes acknowledged after `confirmed` was read.
        acknowledged: f64,
        /// Number of writes still in flight.
        pending: usize,
    },
}

impl State {
    /// The value to show, if any.
    pub fn value(&self) -> Option<f64> {
        match self {
            Self::Unloaded => None,
            Self::Loaded(value) => Some(*value),
            Self::Optimistic {
                confirmed,
                inflight,
                acknowledged,
                ..
            } => Some(confirmed + inflight + acknowledged),
        }
    }
}

/// Position in the sequence of reads started and writes acknowledged by one [Cache].
pub type Ticket = u64;

#[derive(Default)]
struct Entry {
    state: State,

    /// Ticket of the read that produced the confirmed value.
    confirmed_at: Ticket,

    /// Acknowledged writes (with the ticket of their acknowledgement) that the confirmed value may
    /// not include.
    acknowledged: Vec<(Ticket, f64)>,
}

/// Client-local results of read operations, with optimistic writes applied on top.
///
/// Every read takes a [Ticket] from [Cache::begin] before it is issued. A write acknowledged
/// after a read began may be missing from that read's value, so its delta stays applied until a
/// later read covers it. Reads that complete out of order never replace a newer value.
///
/// Transitions:
/// - [Cache::confirm]: a server read completed (`Unloaded|Loaded -> Loaded`, and `Optimistic`
///   rebases onto the new value, becoming `Loaded` once nothing is in flight or uncovered).
/// - [Cache::apply]: a write started (`Loaded|Optimistic -> Optimistic`; ignored while
///   `Unloaded`).
/// - [Cache::settle]: a write was acknowledged (its delta waits for a read that covers it).
/// - [Cache::rollback]: a write failed (its delta is removed, returning to `Loaded(confirmed)` once
///   nothing else is outstanding).
#[derive(Default)]
pub struct Cache {
    clock: Ticket,
    entries: HashMap<Query, Entry>,
}

impl Cache {
    fn tick(&mut self) -> Ticket {
        self.clock += 1;
        self.clock
    }

    pub fn state(&self, query: &Query) -> State {
        self.entries
            .get(query)
            .map(|entry| entry.state)
            .unwrap_or_default()
    }

    pub fn value(&self, query: &Query) -> Option<f64> {
        self.state(query).value()
    }

    /// Start a read, returning the [Ticket] to [Cache::confirm] it with.
    pub fn begin(&mut self) -> Ticket {
        self.tick()
    }

    /// Record a value read from the server by the read holding `ticket`.
    ///
    /// Ignored if a read that began later has already been confirmed.
    pub fn confirm(&mut self, query: &Query, server: f64, ticket: Ticket) {
        let entry = self.entries.entry(query.clone()).or_default();
        if ticket < entry.confirmed_at {
            return;
        }
        entry.confirmed_at = ticket;
        entry.acknowledged.retain(|(acked, _)| *acked > ticket);
        let acknowledged: f64 = entry.acknowledged.iter().map(|(_, delta)| delta).sum();
        entry.state = match entry.state {
            State::Unloaded | State::Loaded(_) => State::Loaded(server),
            State::Optimistic {
                inflight, pending, ..
            } => {
                if pending == 0 && entry.acknowledged.is_empty() {
                    State::Loaded(server)
                } else {
                    State::Optimistic {
                        confirmed: server,
                        inflight,
                        acknowledged,
                        pending,
                    }
                }
            }
        };
    }

    /// Apply `delta` optimistically. Returns false (and changes nothing) if no value is loaded.
    pub fn apply(&mut self, query: &Query, delta: f64) -> bool {
        let Some(entry) = self.entries.get_mut(query) else {
            return false;
        };
        entry.state = match entry.state {
            State::Unloaded => return false,
            State::Loaded(confirmed) => State::Optimistic {
                confirmed,
                inflight: delta,
                acknowledged: 0.0,
                pending: 1,
            },
            State::Optimistic {
                confirmed,
                inflight,
                acknowledged,
                pending,
            } => State::Optimistic {
                confirmed,
                inflight: inflight + delta,
                acknowledged,
                pending: pending + 1,
            },
        };
        true
    }

    /// Mark an applied write of `delta` as acknowledged by the server.
    ///
    /// Returns true if no writes remain in flight.
    pub fn settle(&mut self, query: &Query, delta: f64) -> bool {
        let ticket = self.tick();
        let Some(entry) = self.entries.get_mut(query) else {
            return true;
        };
        let State::Optimistic {
            confirmed,
            inflight,
            acknowledged,
            pending,
        } = entry.state
        else {
            return true;
        };
        let pending = pending.saturating_sub(1);
        entry.acknowledged.push((ticket, delta));
        entry.state = State::Optimistic {
            confirmed,
            inflight: inflight - delta,
            acknowledged: acknowledged + delta,
            pending,
        };
        pending == 0
    }

    /// Undo an applied write of `delta` that the server rejected.
    ///
    /// Returns true if no writes remain in flight.
    pub fn rollback(&mut self, query: &Query, delta: f64) -> bool {
        let Some(entry) = self.entries.get_mut(query) else {
            return true;
        };
        let State::Optimistic {
            confirmed,
            inflight,
            acknowledged,
            pending,
        } = entry.state
        else {
            return true;
        };
        let pending = pending.saturating_sub(1);
        entry.state = if pending == 0 && entry.acknowledged.is_empty() {
            State::Loaded(confirmed)
        } else {
            State::Optimistic {
                confirmed,
                inflight: inflight - delta,
                acknowledged,
                pending,
            }
        };
        pending == 0
    }
}
