//! # Shared pin arbiter
//!
//! The left motor PWM input and the scanner servo are wired to the same GPIO pin, so only one of
//! them may drive it at a time. The arbiter grants an exclusive lease on that pin to one
//! [`PinOwner`]. A lease is held until the owner explicitly releases it, there is no expiry.
//!
//! Waiting for a lease is done against the wall clock and by polling, so that a holder on another
//! thread gets the chance to finish and release.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{
    sync::{Mutex, MutexGuard},
    thread,
    time::{Duration, Instant},
};

use log::{debug, trace};
use serde::Serialize;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Grants exclusive use of the shared PWM pin.
#[derive(Debug)]
pub struct PinArbiter {
    owner: Mutex<Option<PinOwner>>,
    poll_period: Duration,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// The users of the shared pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PinOwner {
    Motors,
    Scanner,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl PinArbiter {
    pub fn new(poll_period: Duration) -> Self {
        Self {
            owner: Mutex::new(None),
            poll_period,
        }
    }

    /// Acquire the lease for `owner`, waiting up to `timeout` for the other owner to release it.
    ///
    /// Succeeds immediately if the pin is free or already held by `owner`. At least one attempt is
    /// made even with a zero timeout. Returns `false` if the lease could not be acquired in time.
    pub fn acquire(&self, owner: PinOwner, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;

        loop {
            {
                let mut current = self.lock();
                match *current {
                    None => {
                        debug!("Shared pin acquired by {:?}", owner);
                        *current = Some(owner);
                        return true;
                    }
                    Some(o) if o == owner => return true,
                    Some(o) => trace!("Shared pin held by {:?}, {:?} waiting", o, owner),
                }
            }

            let now = Instant::now();
            if now >= deadline {
                debug!("{:?} timed out waiting for the shared pin", owner);
                return false;
            }
            thread::sleep(self.poll_period.min(deadline - now));
        }
    }

    /// Release the lease, if and only if it is held by `owner`.
    pub fn release(&self, owner: PinOwner) {
        let mut current = self.lock();
        if *current == Some(owner) {
            debug!("Shared pin released by {:?}", owner);
            *current = None;
        }
    }

    /// The current holder of the lease, if any.
    pub fn current_owner(&self) -> Option<PinOwner> {
        *self.lock()
    }

    fn lock(&self) -> MutexGuard<'_, Option<PinOwner>> {
        match self.owner.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Default for PinArbiter {
    fn default() -> Self {
        Self::new(Duration::from_millis(10))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_acquire_release() {
        let arbiter = PinArbiter::default();
        assert_eq!(arbiter.current_owner(), None);

        assert!(arbiter.acquire(PinOwner::Motors, Duration::from_millis(0)));
        assert_eq!(arbiter.current_owner(), Some(PinOwner::Motors));

        // Reentrant for the holder
        assert!(arbiter.acquire(PinOwner::Motors, Duration::from_millis(0)));

        // Held by the other owner
        let t0 = Instant::now();
        assert!(!arbiter.acquire(PinOwner::Scanner, Duration::from_millis(30)));
        assert!(t0.elapsed() >= Duration::from_millis(30));
        assert_eq!(arbiter.current_owner(), Some(PinOwner::Motors));

        // Release by a non-holder does nothing
        arbiter.release(PinOwner::Scanner);
        assert_eq!(arbiter.current_owner(), Some(PinOwner::Motors));

        arbiter.release(PinOwner::Motors);
        assert_eq!(arbiter.current_owner(), None);
        assert!(arbiter.acquire(PinOwner::Scanner, Duration::from_millis(0)));
    }

    #[test]
    fn test_acquire_waits_for_release() {
        let arbiter = Arc::new(PinArbiter::new(Duration::from_millis(1)));
        assert!(arbiter.acquire(PinOwner::Scanner, Duration::from_millis(0)));

        let releaser = {
            let arbiter = arbiter.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                arbiter.release(PinOwner::Scanner);
            })
        };

        assert!(arbiter.acquire(PinOwner::Motors, Duration::from_secs(2)));
        assert_eq!(arbiter.current_owner(), Some(PinOwner::Motors));
        releaser.join().unwrap();
    }

    #[test]
    fn test_exclusive_under_contention() {
        let arbiter = Arc::new(PinArbiter::new(Duration::from_micros(100)));
        let holders = Arc::new(Mutex::new(0u32));

        let workers: Vec<_> = [PinOwner::Motors, PinOwner::Scanner]
            .iter()
            .map(|&owner| {
                let arbiter = arbiter.clone();
                let holders = holders.clone();
                thread::spawn(move || {
                    for _ in 0..50 {
                        if arbiter.acquire(owner, Duration::from_secs(1)) {
                            {
                                let mut h = holders.lock().unwrap();
                                *h += 1;
                                assert_eq!(*h, 1);
                            }
                            thread::sleep(Duration::from_micros(50));
                            *holders.lock().unwrap() -= 1;
                            arbiter.release(owner);
                        }
                    }
                })
            })
            .collect();

        for w in workers {
            w.join().unwrap();
        }
        assert_eq!(arbiter.current_owner(), None);
    }
}
