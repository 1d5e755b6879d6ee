//! Ascending doubly linked timer list.
//!
//! `TimerList` keeps every pending timer in an arena, linked from the soonest expiry (`head`)
//! to the latest (`tail`). Links are versioned arena keys rather than pointers, so cancelling,
//! firing or tearing down a timer can never leave a dangling reference behind: a handle to a
//! timer that is gone is simply rejected.
//!
//! Expiring the soonest timer and cancelling any timer are O(1). Insertion is a linear scan,
//! but rescheduling a timer forward resumes the scan from its old successor, so the common
//! "extend by a fixed increment" case only walks the timers it actually overtakes.
use std::fmt;

use slotmap::SlotMap;
use tracing::{debug, trace, warn};

use crate::TimerError;

use super::{
    timer::{Timer, TimerKey},
    Deadline,
};

struct Node<T: Deadline, P, E> {
    timer: Timer<T, P, E>,
    prev: Option<TimerKey>,
    next: Option<TimerKey>,
}

/// Ascending timer list driven by an externally supplied clock.
///
/// The list never reads a clock and never blocks. It is meant to be owned by one event loop;
/// sharing it across threads requires external locking.
pub struct TimerList<T: Deadline, P, E> {
    nodes: SlotMap<TimerKey, Node<T, P, E>>,
    head: Option<TimerKey>,
    tail: Option<TimerKey>,
    last_tick: Option<T>,
}

impl<T: Deadline, P, E> TimerList<T, P, E> {
    pub fn new() -> Self {
        Self {
            nodes: SlotMap::with_key(),
            head: None,
            tail: None,
            last_tick: None,
        }
    }

    /// Link `timer` into its ordered position, taking ownership of it.
    ///
    /// A timer due strictly before the current head becomes the new head in O(1). Among timers
    /// with equal expiry, the new one is placed last; callers must not rely on tie order.
    pub fn insert(&mut self, timer: Timer<T, P, E>) -> TimerKey {
        let expire = timer.expire;
        let key = self.nodes.insert(Node {
            timer,
            prev: None,
            next: None,
        });

        match self.head {
            None => {
                self.head = Some(key);
                self.tail = Some(key);
            }
            Some(head) if expire < self.nodes[head].timer.expire => {
                self.nodes[key].next = Some(head);
                self.nodes[head].prev = Some(key);
                self.head = Some(key);
            }
            Some(head) => self.link_after(key, head),
        }
        trace!(?key, ?expire, "timer inserted");
        debug_assert_eq!(self.check_links(key), Ok(()));
        key
    }

    /// Build a timer from its parts and insert it.
    pub fn insert_at<F>(&mut self, expire: T, payload: P, callback: F) -> TimerKey
    where
        F: FnOnce(&mut TimerList<T, P, E>, P) -> Result<(), E> + 'static,
    {
        self.insert(Timer::new(expire, payload, callback))
    }

    /// Move a linked timer later, to `expire`.
    ///
    /// Only increases are accepted. If the timer is still due before its successor nothing is
    /// relinked; otherwise it is unlinked and the insertion scan resumes from its old
    /// successor, skipping the prefix that is already known to be earlier.
    pub fn adjust(&mut self, key: TimerKey, expire: T) -> Result<(), TimerError> {
        let node = self.nodes.get_mut(key).ok_or(TimerError::UnknownTimer)?;
        if expire < node.timer.expire {
            warn!(?key, from = ?node.timer.expire, to = ?expire, "rejected backwards adjust");
            return Err(TimerError::ExpiryDecreased);
        }
        node.timer.expire = expire;

        let Some(anchor) = node.next else {
            return Ok(());
        };
        if expire < self.nodes[anchor].timer.expire {
            return Ok(());
        }

        let (prev, next) = self.unlink(key);
        debug_assert_eq!(self.check_gap(prev, next), Ok(()));
        self.link_after(key, anchor);
        debug!(?key, ?expire, "timer rescheduled forward");
        debug_assert_eq!(self.check_links(key), Ok(()));
        Ok(())
    }

    /// Cancel a linked timer. Its payload is dropped and its callback never runs.
    pub fn remove(&mut self, key: TimerKey) -> Result<(), TimerError> {
        match self.take(key) {
            Some(timer) => {
                trace!(?key, expire = ?timer.expire, "timer cancelled");
                Ok(())
            }
            None => {
                warn!(?key, "remove called with a timer that is not linked");
                Err(TimerError::UnknownTimer)
            }
        }
    }

    /// Unlink a timer and hand it back without firing it.
    pub fn take(&mut self, key: TimerKey) -> Option<Timer<T, P, E>> {
        if !self.nodes.contains_key(key) {
            return None;
        }
        let (prev, next) = self.unlink(key);
        let node = self.nodes.remove(key)?;
        debug_assert_eq!(self.check_gap(prev, next), Ok(()));
        Some(node.timer)
    }

    /// Fire every timer due at `now`, soonest first, and return how many fired.
    ///
    /// Each timer is unlinked before its callback runs, so a callback may freely insert, adjust
    /// or remove other timers; a timer it inserts that is already due fires in this same pass.
    /// A callback that keeps re-arming itself at or before `now` is therefore fired again and
    /// again without returning to the event loop: re-arm with a non-zero timeout.
    /// The first callback error stops the scan and is returned as-is. Timers that were due but
    /// not yet reached stay linked for the next tick.
    pub fn tick(&mut self, now: T) -> Result<usize, E> {
        match self.last_tick {
            Some(last) if now < last => {
                warn!(?now, ?last, "tick clock moved backwards");
            }
            _ => self.last_tick = Some(now),
        }

        let mut fired = 0;
        while let Some(head) = self.head {
            if now < self.nodes[head].timer.expire {
                break;
            }
            let Some(timer) = self.take(head) else {
                break;
            };
            trace!(key = ?head, expire = ?timer.expire, ?now, "timer expired");
            fired += 1;
            timer.fire(self)?;
        }
        Ok(fired)
    }

    /// Drop every pending timer without invoking callbacks. Returns how many were dropped.
    pub fn clear(&mut self) -> usize {
        let mut dropped = 0;
        let mut cursor = self.head.take();
        self.tail = None;
        while let Some(key) = cursor {
            cursor = self.nodes.remove(key).and_then(|node| node.next);
            dropped += 1;
        }
        debug_assert!(self.nodes.is_empty());
        if dropped > 0 {
            debug!(dropped, "dropped pending timers without firing");
        }
        dropped
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, key: TimerKey) -> bool {
        self.nodes.contains_key(key)
    }

    pub fn expiry(&self, key: TimerKey) -> Option<T> {
        self.nodes.get(key).map(|node| node.timer.expire)
    }

    pub fn payload(&self, key: TimerKey) -> Option<&P> {
        self.nodes.get(key).map(|node| &node.timer.payload)
    }

    /// Latest `now` passed to `tick`. An earlier `now` never lowers it.
    pub fn last_tick(&self) -> Option<T> {
        self.last_tick
    }

    /// Expiry of the soonest timer, e.g. to bound the event loop's poll timeout.
    pub fn next_expiry(&self) -> Option<T> {
        self.head.map(|head| self.nodes[head].timer.expire)
    }

    /// Soonest-expiring timer.
    pub fn first(&self) -> Option<TimerKey> {
        self.head
    }

    /// Latest-expiring timer.
    pub fn last(&self) -> Option<TimerKey> {
        self.tail
    }

    pub fn successor(&self, key: TimerKey) -> Option<TimerKey> {
        self.nodes.get(key).and_then(|node| node.next)
    }

    pub fn predecessor(&self, key: TimerKey) -> Option<TimerKey> {
        self.nodes.get(key).and_then(|node| node.prev)
    }

    /// Walk the list head to tail.
    pub fn iter(&self) -> Iter<'_, T, P, E> {
        Iter {
            list: self,
            cursor: self.head,
        }
    }

    /// Verify ordering, link symmetry, endpoints and that every arena entry is reachable.
    pub fn check_invariants(&self) -> Result<(), TimerError> {
        let corrupted = |reason: String| Err(TimerError::Corrupted { reason });

        let mut count = 0;
        let mut prev: Option<TimerKey> = None;
        let mut cursor = self.head;
        while let Some(key) = cursor {
            let Some(node) = self.nodes.get(key) else {
                return corrupted(format!("link to missing timer {key:?}"));
            };
            if node.prev != prev {
                return corrupted(format!(
                    "{key:?} points back to {:?}, expected {prev:?}",
                    node.prev
                ));
            }
            if let Some(p) = prev {
                let before = self.nodes[p].timer.expire;
                if node.timer.expire < before {
                    return corrupted(format!(
                        "{key:?} expires at {:?}, before its predecessor at {before:?}",
                        node.timer.expire
                    ));
                }
            }
            count += 1;
            if count > self.nodes.len() {
                return corrupted("cycle in timer chain".to_string());
            }
            prev = Some(key);
            cursor = node.next;
        }

        if self.tail != prev {
            return corrupted(format!("tail is {:?} but chain ends at {prev:?}", self.tail));
        }
        if count != self.nodes.len() {
            return corrupted(format!(
                "{} timers stored but {count} reachable from head",
                self.nodes.len()
            ));
        }
        Ok(())
    }

    /// Verify the links and ordering around one linked timer, without walking the chain.
    fn check_links(&self, key: TimerKey) -> Result<(), TimerError> {
        let corrupted = |reason: String| Err(TimerError::Corrupted { reason });
        let Some(node) = self.nodes.get(key) else {
            return corrupted(format!("link to missing timer {key:?}"));
        };

        match node.prev.map(|p| (p, self.nodes.get(p))) {
            Some((p, None)) => return corrupted(format!("{key:?} points back to missing {p:?}")),
            Some((p, Some(prev))) => {
                if prev.next != Some(key) {
                    return corrupted(format!("{p:?} does not point forward to {key:?}"));
                }
                if node.timer.expire < prev.timer.expire {
                    return corrupted(format!("{key:?} expires before its predecessor {p:?}"));
                }
            }
            None if self.head != Some(key) => {
                return corrupted(format!("{key:?} has no predecessor but is not the head"));
            }
            None => {}
        }

        match node.next.map(|n| (n, self.nodes.get(n))) {
            Some((n, None)) => corrupted(format!("{key:?} points forward to missing {n:?}")),
            Some((n, Some(next))) => {
                if next.prev != Some(key) {
                    return corrupted(format!("{n:?} does not point back to {key:?}"));
                }
                if next.timer.expire < node.timer.expire {
                    return corrupted(format!("{n:?} expires before its predecessor {key:?}"));
                }
                Ok(())
            }
            None if self.tail != Some(key) => {
                corrupted(format!("{key:?} has no successor but is not the tail"))
            }
            None => Ok(()),
        }
    }

    /// Verify the seam left behind after unlinking a timer from between `prev` and `next`.
    fn check_gap(&self, prev: Option<TimerKey>, next: Option<TimerKey>) -> Result<(), TimerError> {
        match prev {
            Some(p) => self.check_links(p)?,
            None if self.head != next => {
                return Err(TimerError::Corrupted {
                    reason: format!("head is {:?} after unlinking, expected {next:?}", self.head),
                });
            }
            None => {}
        }
        match next {
            Some(n) => self.check_links(n),
            None if self.tail != prev => Err(TimerError::Corrupted {
                reason: format!("tail is {:?} after unlinking, expected {prev:?}", self.tail),
            }),
            None => Ok(()),
        }
    }

    /// Splice `key` after `anchor`, before the first timer due strictly later.
    /// `anchor` must be linked and due no later than `key`.
    fn link_after(&mut self, key: TimerKey, anchor: TimerKey) {
        let expire = self.nodes[key].timer.expire;
        let mut prev = anchor;
        let mut cursor = self.nodes[anchor].next;
        while let Some(next) = cursor {
            if expire < self.nodes[next].timer.expire {
                break;
            }
            prev = next;
            cursor = self.nodes[next].next;
        }

        let node = &mut self.nodes[key];
        node.prev = Some(prev);
        node.next = cursor;
        self.nodes[prev].next = Some(key);
        match cursor {
            Some(next) => self.nodes[next].prev = Some(key),
            None => self.tail = Some(key),
        }
    }

    /// Detach `key` from its neighbours, returning them.
    fn unlink(&mut self, key: TimerKey) -> (Option<TimerKey>, Option<TimerKey>) {
        let node = &mut self.nodes[key];
        let (prev, next) = (node.prev.take(), node.next.take());
        match prev {
            Some(p) => self.nodes[p].next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.nodes[n].prev = prev,
            None => self.tail = prev,
        }
        (prev, next)
    }
}

impl<T: Deadline, P, E> Default for TimerList<T, P, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Deadline, P, E> Drop for TimerList<T, P, E> {
    fn drop(&mut self) {
        self.clear();
    }
}

impl<T: Deadline, P, E> fmt::Debug for TimerList<T, P, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerList")
            .field("len", &self.len())
            .field("expiries", &self.iter().map(|(_, expire)| expire).collect::<Vec<_>>())
            .finish()
    }
}

/// Head-to-tail iterator over `(key, expiry)` pairs.
pub struct Iter<'a, T: Deadline, P, E> {
    list: &'a TimerList<T, P, E>,
    cursor: Option<TimerKey>,
}

impl<T: Deadline, P, E> Iterator for Iter<'_, T, P, E> {
    type Item = (TimerKey, T);

    fn next(&mut self) -> Option<Self::Item> {
        let key = self.cursor?;
        let node = self.list.nodes.get(key)?;
        self.cursor = node.next;
        Some((key, node.timer.expire))
    }
}
