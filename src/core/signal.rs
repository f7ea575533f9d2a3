//! Control signals for a running wipe job.
//!
//! The worker checks these at file boundaries only: a one-shot cancel token
//! and a resettable pause gate. Neither depends on an async runtime, so the
//! walk loop can live on a plain OS thread.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex};

/// One-shot cancellation flag. Once triggered it never resets.
#[derive(Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Outcome of a pause-point check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepControl {
    /// Keep walking.
    Continue,
    /// The job was paused and has been resumed.
    Resumed,
    /// Cancellation was requested, possibly while parked.
    Cancelled,
}

/// Resettable pause gate. The worker parks on `wait_while_paused`; the
/// control side sets and clears the gate. `interrupt` wakes a parked worker
/// without clearing the gate so a cancel is observed immediately.
#[derive(Clone, Default)]
pub struct PauseGate {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl PauseGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pause(&self) {
        let (lock, _) = &*self.inner;
        *lock.lock().expect("pause gate poisoned") = true;
    }

    pub fn resume(&self) {
        let (lock, cvar) = &*self.inner;
        *lock.lock().expect("pause gate poisoned") = false;
        cvar.notify_all();
    }

    pub fn is_paused(&self) -> bool {
        let (lock, _) = &*self.inner;
        *lock.lock().expect("pause gate poisoned")
    }

    /// Wake a parked worker without changing the pause state.
    pub fn interrupt(&self) {
        let (lock, cvar) = &*self.inner;
        let _held = lock.lock().expect("pause gate poisoned");
        cvar.notify_all();
    }

    /// File-boundary suspension point. Returns immediately when the gate is
    /// clear; otherwise blocks until resumed or cancelled. Cancellation is
    /// re-checked on every wake-up.
    pub fn wait_while_paused(&self, cancel: &CancelToken) -> StepControl {
        if cancel.is_triggered() {
            return StepControl::Cancelled;
        }

        let (lock, cvar) = &*self.inner;
        let mut paused = lock.lock().expect("pause gate poisoned");
        if !*paused {
            return StepControl::Continue;
        }

        while *paused {
            if cancel.is_triggered() {
                return StepControl::Cancelled;
            }
            paused = cvar.wait(paused).expect("pause gate poisoned");
        }

        if cancel.is_triggered() {
            StepControl::Cancelled
        } else {
            StepControl::Resumed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn cancel_token_is_one_shot() {
        let token = CancelToken::new();
        assert!(!token.is_triggered());
        token.trigger();
        assert!(token.is_triggered());
        token.trigger();
        assert!(token.is_triggered());
    }

    #[test]
    fn clear_gate_passes_through() {
        let gate = PauseGate::new();
        let cancel = CancelToken::new();
        assert_eq!(gate.wait_while_paused(&cancel), StepControl::Continue);
    }

    #[test]
    fn cancelled_before_wait_short_circuits() {
        let gate = PauseGate::new();
        let cancel = CancelToken::new();
        gate.pause();
        cancel.trigger();
        assert_eq!(gate.wait_while_paused(&cancel), StepControl::Cancelled);
    }

    #[test]
    fn resume_releases_parked_waiter() {
        let gate = PauseGate::new();
        let cancel = CancelToken::new();
        gate.pause();

        let waiter_gate = gate.clone();
        let waiter_cancel = cancel.clone();
        let waiter = thread::spawn(move || waiter_gate.wait_while_paused(&waiter_cancel));

        thread::sleep(Duration::from_millis(50));
        gate.resume();

        assert_eq!(waiter.join().unwrap(), StepControl::Resumed);
    }

    #[test]
    fn cancel_releases_parked_waiter() {
        let gate = PauseGate::new();
        let cancel = CancelToken::new();
        gate.pause();

        let waiter_gate = gate.clone();
        let waiter_cancel = cancel.clone();
        let waiter = thread::spawn(move || waiter_gate.wait_while_paused(&waiter_cancel));

        thread::sleep(Duration::from_millis(50));
        cancel.trigger();
        gate.interrupt();

        assert_eq!(waiter.join().unwrap(), StepControl::Cancelled);
    }
}
