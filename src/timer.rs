//! LPWAN Timer API
//
// https://github.com/rust-iot/rust-lpwan
// Copyright 2021 Ryan Kurte

use core::fmt::Debug;

use heapless::Vec;

use crate::Ts;
use crate::log::trace;

/// Timer trait provides mechanisms for accessing monotonic times
/// to assist with procotol implementations.
///
/// All methods are monotonic and relative to the same unknown epoc
pub trait Timer {
    /// Returns the number of millisecond ticks since some unknown epoc
    fn ticks_ms(&self) -> u64;

    /// Returns the number of microsecond ticks since some unknown epoc
    fn ticks_us(&self) -> u64;
}

/// Timer expiry behaviour
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimerKind {
    /// Fires once per `start`
    OneShot,
    /// Fires every `duration` ms until stopped
    Periodic,
}

/// Lifecycle of a software timer
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimerState {
    /// Created (or re-created) and never started since
    Created,
    Running,
    Stopped,
    /// One-shot timer fired and has not been restarted
    Expired,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimerError {
    /// No timer was created with this key
    Unknown,
    /// Timer table is full
    Full,
}

/// Expiry event produced by [`TimerService::poll`].
///
/// The generation identifies the start of the timer that fired, an expiry is
/// stale once the timer has been stopped or restarted.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Expiry<K> {
    pub key: K,
    pub generation: u32,
}

#[derive(Debug, Clone, PartialEq)]
struct Slot<K> {
    key: K,
    kind: TimerKind,
    duration: Ts,
    deadline: Ts,
    state: TimerState,
    generation: u32,
}

/// Software timer service with millisecond resolution, driven by polling
/// against a monotonic [`Timer`].
///
/// Holds up to `N` timers addressed by key `K`.
#[derive(Debug, Clone, PartialEq)]
pub struct TimerService<K, const N: usize> {
    slots: Vec<Slot<K>, N>,
}

impl <K, const N: usize> Default for TimerService<K, N> {
    fn default() -> Self {
        Self { slots: Vec::new() }
    }
}

impl <K, const N: usize> TimerService<K, N>
where
    K: Copy + PartialEq + Debug,
{
    pub fn new() -> Self {
        Self::default()
    }

    fn slot_mut(&mut self, key: K) -> Result<&mut Slot<K>, TimerError> {
        self.slots.iter_mut().find(|s| s.key == key).ok_or(TimerError::Unknown)
    }

    fn slot(&self, key: K) -> Option<&Slot<K>> {
        self.slots.iter().find(|s| s.key == key)
    }

    /// Create a timer, replacing (and invalidating) any existing timer with the same key
    pub fn create(&mut self, key: K, kind: TimerKind, duration_ms: Ts) -> Result<(), TimerError> {
        if let Ok(s) = self.slot_mut(key) {
            s.kind = kind;
            s.duration = duration_ms;
            s.deadline = 0;
            s.state = TimerState::Created;
            s.generation = s.generation.wrapping_add(1);
            return Ok(())
        }

        self.slots.push(Slot{
            key,
            kind,
            duration: duration_ms,
            deadline: 0,
            state: TimerState::Created,
            generation: 0,
        }).map_err(|_| TimerError::Full)
    }

    /// (Re)start a timer, expiring `duration` ms after `now`
    pub fn start(&mut self, key: K, now: Ts) -> Result<(), TimerError> {
        let s = self.slot_mut(key)?;

        s.deadline = now + s.duration;
        s.state = TimerState::Running;
        s.generation = s.generation.wrapping_add(1);

        trace!("Timer started at {} ms (deadline {} ms)", now, s.deadline);

        Ok(())
    }

    /// Stop a timer, pending expiries for it become stale
    pub fn stop(&mut self, key: K) -> Result<(), TimerError> {
        let s = self.slot_mut(key)?;

        match s.state {
            TimerState::Running | TimerState::Expired => {
                s.state = TimerState::Stopped;
                s.generation = s.generation.wrapping_add(1);
            },
            _ => (),
        }

        Ok(())
    }

    /// Update the duration of a timer, applied from the next `start`
    pub fn set_duration(&mut self, key: K, duration_ms: Ts) -> Result<(), TimerError> {
        self.slot_mut(key)?.duration = duration_ms;
        Ok(())
    }

    /// Fetch the state of a timer
    pub fn state(&self, key: K) -> Option<TimerState> {
        self.slot(key).map(|s| s.state)
    }

    /// Collect expiries for all timers due at `now`.
    ///
    /// One-shot timers move to `Expired`, periodic timers are re-armed
    /// from their previous deadline.
    pub fn poll(&mut self, now: Ts) -> Vec<Expiry<K>, N> {
        let mut expired = Vec::new();

        for s in self.slots.iter_mut() {
            if s.state != TimerState::Running || now < s.deadline {
                continue;
            }

            // Capacity matches the slot count so this cannot overflow
            let _ = expired.push(Expiry{ key: s.key, generation: s.generation });

            match s.kind {
                TimerKind::OneShot => {
                    s.state = TimerState::Expired;
                },
                TimerKind::Periodic => {
                    let period = s.duration.max(1);
                    s.deadline += period;

                    // Skip missed periods rather than firing a burst
                    if s.deadline <= now {
                        s.deadline = now + period;
                    }
                },
            }

            trace!("Timer expired at {} ms (generation {})", now, s.generation);
        }

        expired
    }

    /// Check whether an expiry still refers to the current start of its timer
    pub fn is_current(&self, expiry: &Expiry<K>) -> bool {
        match self.slot(expiry.key) {
            Some(s) => s.generation == expiry.generation
                && matches!(s.state, TimerState::Running | TimerState::Expired),
            None => false,
        }
    }
}

#[cfg(any(test, feature="mocks"))]
pub mod mock {
    use std::sync::{Arc, Mutex};
    use std::vec::Vec;

    /// Mock timer implementation to assist with testing
    #[derive(Clone, Debug)]
    pub struct MockTimer (Arc<Mutex<u64>>);

    impl MockTimer {
        pub fn new() -> Self {
            Self(Arc::new(Mutex::new(0)))
        }

        /// Advance the clock by `ms` milliseconds
        pub fn inc_ms(&mut self, ms: u64) {
            let mut v  = self.0.lock().unwrap();
            *v += ms * 1000;
        }
    }

    impl super::Timer for MockTimer {
        fn ticks_ms(&self) -> u64 {
            let v = self.0.lock().unwrap();
            return *v / 1000
        }

        fn ticks_us(&self) -> u64 {
            let v = self.0.lock().unwrap();
            return *v
        }
    }

    /// Mock delay, records requested delays without blocking
    #[derive(Clone, Debug, Default)]
    pub struct MockDelay (Arc<Mutex<Vec<u32>>>);

    impl MockDelay {
        pub fn new() -> Self {
            Self::default()
        }

        /// Delays requested so far, in microseconds
        pub fn delays_us(&self) -> Vec<u32> {
            self.0.lock().unwrap().clone()
        }
    }

    impl embedded_hal::delay::DelayNs for MockDelay {
        fn delay_ns(&mut self, ns: u32) {
            self.0.lock().unwrap().push(ns / 1000);
        }

        fn delay_us(&mut self, us: u32) {
            self.0.lock().unwrap().push(us);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum Id {
        A,
        B,
    }

    #[test]
    fn one_shot_expires_once() {
        let mut timers: TimerService<Id, 2> = TimerService::new();
        timers.create(Id::A, TimerKind::OneShot, 10).unwrap();

        assert_eq!(timers.state(Id::A), Some(TimerState::Created));
        assert_eq!(timers.state(Id::B), None);

        timers.start(Id::A, 100).unwrap();
        assert!(timers.poll(109).is_empty());

        let e = timers.poll(110);
        assert_eq!(e.len(), 1);
        assert_eq!(e[0].key, Id::A);
        assert!(timers.is_current(&e[0]));
        assert_eq!(timers.state(Id::A), Some(TimerState::Expired));

        // Does not fire again until restarted
        assert!(timers.poll(500).is_empty());
    }

    #[test]
    fn periodic_rearms() {
        let mut timers: TimerService<Id, 2> = TimerService::new();
        timers.create(Id::A, TimerKind::Periodic, 200).unwrap();
        timers.start(Id::A, 0).unwrap();

        assert_eq!(timers.poll(200).len(), 1);
        assert!(timers.poll(399).is_empty());
        assert_eq!(timers.poll(400).len(), 1);
        assert_eq!(timers.state(Id::A), Some(TimerState::Running));

        // Missed periods collapse into a single expiry
        assert_eq!(timers.poll(1_000).len(), 1);
        assert!(timers.poll(1_199).is_empty());
        assert_eq!(timers.poll(1_200).len(), 1);
    }

    #[test]
    fn stop_invalidates_pending_expiry() {
        let mut timers: TimerService<Id, 2> = TimerService::new();
        timers.create(Id::A, TimerKind::OneShot, 5).unwrap();
        timers.create(Id::B, TimerKind::OneShot, 5).unwrap();
        timers.start(Id::A, 0).unwrap();
        timers.start(Id::B, 0).unwrap();

        let e = timers.poll(5);
        assert_eq!(e.len(), 2);

        timers.stop(Id::A).unwrap();
        timers.start(Id::B, 5).unwrap();

        assert!(!timers.is_current(&e[0]));
        assert!(!timers.is_current(&e[1]));
        assert_eq!(timers.state(Id::A), Some(TimerState::Stopped));
    }

    #[test]
    fn create_replaces_and_limits() {
        let mut timers: TimerService<Id, 1> = TimerService::new();
        timers.create(Id::A, TimerKind::OneShot, 5).unwrap();
        timers.start(Id::A, 0).unwrap();

        timers.create(Id::A, TimerKind::OneShot, 50).unwrap();
        assert_eq!(timers.state(Id::A), Some(TimerState::Created));
        assert!(timers.poll(10).is_empty());

        // Restarted with the replacement duration
        timers.start(Id::A, 10).unwrap();
        assert!(timers.poll(59).is_empty());
        assert_eq!(timers.poll(60).len(), 1);

        assert_eq!(timers.create(Id::B, TimerKind::OneShot, 5), Err(TimerError::Full));
        assert_eq!(timers.start(Id::B, 0), Err(TimerError::Unknown));
    }
}
