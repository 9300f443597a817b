//! Single-flag reentrancy guard.
//!
//! The flag is set on acquisition and cleared when the guard drops, including
//! on early return, `?` propagation, panic unwinding and task cancellation, so
//! a failed recovery can never leave the flag stuck.

use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug)]
pub struct ReentrancyGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> ReentrancyGuard<'a> {
    /// Set `flag` if clear; `None` means another run already holds it
    pub fn try_acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for ReentrancyGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}
