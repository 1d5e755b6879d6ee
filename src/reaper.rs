//! Idle connection reaper.
//!
//! Arms one timer per connection in a `TimerList`. Every time the connection shows activity its
//! timer is pushed forward by the idle timeout; a connection that stays quiet for
//! `idle_slots * timeslot` is handed to the close hook on the next tick. What "closing" means is
//! up to the hook: the reaper never touches sockets.
use std::{cell::RefCell, collections::HashMap, fmt::Debug, hash::Hash, rc::Rc};

use tracing::{debug, trace};

use crate::{
    clock::Clock,
    scheduling::{list::TimerList, timer::TimerKey},
    TimerError,
};

/// Reaper timing parameters, in clock units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaperConfig {
    /// Period at which the event loop is expected to tick.
    pub timeslot: u64,
    /// Number of timeslots a connection may stay idle.
    pub idle_slots: u64,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            timeslot: 5,
            idle_slots: 3,
        }
    }
}

impl ReaperConfig {
    pub fn with_timeslot(mut self, timeslot: u64) -> Self {
        self.timeslot = timeslot;
        self
    }

    pub fn with_idle_slots(mut self, idle_slots: u64) -> Self {
        self.idle_slots = idle_slots;
        self
    }

    pub fn validate(&self) -> Result<(), TimerError> {
        if self.timeslot == 0 {
            return Err(TimerError::InvalidConfig {
                description: "timeslot must be greater than 0".to_string(),
            });
        }
        if self.idle_slots == 0 {
            return Err(TimerError::InvalidConfig {
                description: "idle_slots must be greater than 0".to_string(),
            });
        }
        Ok(())
    }

    /// How long a connection may stay idle before it is reaped.
    pub fn idle_timeout(&self) -> u64 {
        self.timeslot.saturating_mul(self.idle_slots)
    }
}

type CloseHook<C, E> = Rc<dyn Fn(&C) -> Result<(), E>>;

/// Tracks connection idleness and reaps the ones that time out.
pub struct IdleReaper<C, E> {
    config: ReaperConfig,
    timers: TimerList<u64, C, E>,
    armed: HashMap<C, TimerKey>,
    reaped: Rc<RefCell<Vec<C>>>,
    on_idle: CloseHook<C, E>,
}

impl<C, E> IdleReaper<C, E>
where
    C: Hash + Eq + Clone + Debug + 'static,
    E: 'static,
{
    /// New reaper calling `on_idle` for every connection that times out.
    pub fn new<F>(config: ReaperConfig, on_idle: F) -> Result<Self, TimerError>
    where
        F: Fn(&C) -> Result<(), E> + 'static,
    {
        config.validate()?;
        Ok(Self {
            config,
            timers: TimerList::new(),
            armed: HashMap::new(),
            reaped: Rc::new(RefCell::new(Vec::new())),
            on_idle: Rc::new(on_idle),
        })
    }

    /// Start watching `conn`. A connection that is already watched is re-armed from `now`.
    pub fn register(&mut self, conn: C, now: u64) -> TimerKey {
        if let Some(stale) = self.armed.remove(&conn) {
            let removed = self.timers.remove(stale);
            debug_assert_eq!(removed, Ok(()), "reaper lost track of {conn:?}");
        }
        let expire = now.saturating_add(self.config.idle_timeout());
        let hook = Rc::clone(&self.on_idle);
        let reaped = Rc::clone(&self.reaped);
        let key = self.timers.insert_at(expire, conn.clone(), move |_, conn| {
            debug!(?conn, "closing idle connection");
            let closed = hook(&conn);
            reaped.borrow_mut().push(conn);
            closed
        });
        trace!(?conn, expire, "connection registered");
        self.armed.insert(conn, key);
        key
    }

    /// Activity seen on `conn`: push its deadline to `now + idle_timeout`.
    ///
    /// A `now` that would pull the deadline earlier leaves it where it is.
    pub fn touch(&mut self, conn: &C, now: u64) -> Result<(), TimerError> {
        let key = *self.armed.get(conn).ok_or(TimerError::UnknownConnection)?;
        let expire = now.saturating_add(self.config.idle_timeout());
        match self.timers.adjust(key, expire) {
            Err(TimerError::ExpiryDecreased) => Ok(()),
            adjusted => adjusted,
        }
    }

    /// Forget `conn` without invoking the close hook, e.g. when the peer hung up first.
    pub fn close(&mut self, conn: &C) -> Result<(), TimerError> {
        let key = self
            .armed
            .remove(conn)
            .ok_or(TimerError::UnknownConnection)?;
        self.timers.remove(key)
    }

    /// Reap every connection idle at `now`, returning those whose close hook ran.
    ///
    /// A failing hook stops the pass and its error is returned; connections not reached yet are
    /// reaped on the next tick.
    pub fn tick(&mut self, now: u64) -> Result<Vec<C>, E> {
        let result = self.timers.tick(now);
        let reaped: Vec<C> = self.reaped.borrow_mut().drain(..).collect();
        for conn in &reaped {
            self.armed.remove(conn);
        }
        result.map(|fired| {
            if fired > 0 {
                debug!(fired, now, "reaped idle connections");
            }
            reaped
        })
    }

    /// Tick at the clock's current time.
    pub fn poll<K: Clock>(&mut self, clock: &K) -> Result<Vec<C>, E> {
        self.tick(clock.now())
    }

    /// Soonest time at which a connection can be reaped.
    pub fn next_deadline(&self) -> Option<u64> {
        self.timers.next_expiry()
    }

    pub fn deadline(&self, conn: &C) -> Option<u64> {
        self.armed
            .get(conn)
            .and_then(|&key| self.timers.expiry(key))
    }

    pub fn is_tracked(&self, conn: &C) -> bool {
        self.armed.contains_key(conn)
    }

    /// Number of connections being watched.
    pub fn tracked(&self) -> usize {
        self.armed.len()
    }

    pub fn config(&self) -> &ReaperConfig {
        &self.config
    }
}
