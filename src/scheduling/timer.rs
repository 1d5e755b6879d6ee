//! Timer entity: an expiry time, an owned payload, and the action run on expiry.
use std::fmt;

use super::{list::TimerList, Deadline};

slotmap::new_key_type! {
    /// Stable, versioned handle to a timer linked in a `TimerList`.
    ///
    /// Once the timer fires, is removed, or the list is cleared, the handle goes stale and every
    /// list operation rejects it.
    pub struct TimerKey;
}

/// Expiry action. Receives the list it fired from, so it can re-arm or cancel other timers,
/// and takes ownership of the payload.
pub type Callback<T, P, E> = Box<dyn FnOnce(&mut TimerList<T, P, E>, P) -> Result<(), E>>;

/// A single scheduled expiry.
pub struct Timer<T: Deadline, P, E> {
    pub(crate) expire: T,
    pub(crate) payload: P,
    pub(crate) callback: Callback<T, P, E>,
}

impl<T: Deadline, P, E> Timer<T, P, E> {
    /// New unlinked timer due at `expire`.
    pub fn new<F>(expire: T, payload: P, callback: F) -> Self
    where
        F: FnOnce(&mut TimerList<T, P, E>, P) -> Result<(), E> + 'static,
    {
        Self {
            expire,
            payload,
            callback: Box::new(callback),
        }
    }

    pub fn expire(&self) -> T {
        self.expire
    }

    /// Change the expiry of a timer that is not linked in any list.
    pub fn set_expire(&mut self, expire: T) {
        self.expire = expire;
    }

    pub fn payload(&self) -> &P {
        &self.payload
    }

    /// Drop the callback and hand back the payload.
    pub fn into_payload(self) -> P {
        self.payload
    }

    /// Run the expiry action, consuming the timer.
    pub(crate) fn fire(self, list: &mut TimerList<T, P, E>) -> Result<(), E> {
        (self.callback)(list, self.payload)
    }
}

impl<T: Deadline, P: fmt::Debug, E> fmt::Debug for Timer<T, P, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timer")
            .field("expire", &self.expire)
            .field("payload", &self.payload)
            .field("callback", &"<callback>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fire_moves_payload_into_callback() {
        let mut list: TimerList<u64, String, ()> = TimerList::new();
        let timer = Timer::new(7, "conn-7".to_string(), |_, payload: String| {
            assert_eq!(payload, "conn-7");
            Ok(())
        });
        assert_eq!(timer.expire(), 7);
        assert_eq!(timer.payload(), "conn-7");
        assert!(timer.fire(&mut list).is_ok());
    }

    #[test]
    fn test_unlinked_timer_can_be_retimed() {
        let mut timer: Timer<u64, u32, ()> = Timer::new(3, 1, |_, _| Ok(()));
        timer.set_expire(9);
        assert_eq!(timer.expire(), 9);
        assert_eq!(timer.into_payload(), 1);
    }
}
