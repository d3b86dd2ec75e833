/// Admission gate: at most N runs in flight
///
/// A bounded channel pre-filled with N tokens. Taking a token admits a run;
/// dropping the permit puts it back.
use crossbeam_channel::{bounded, Receiver, Sender};
use std::time::{Duration, Instant};

pub struct AdmissionGate {
    tokens_tx: Sender<()>,
    tokens_rx: Receiver<()>,
    capacity: usize,
}

/// Held for the duration of one run.
pub struct AdmissionPermit<'a> {
    gate: &'a AdmissionGate,
}

impl AdmissionGate {
    /// `capacity` is clamped to at least one slot.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tokens_tx, tokens_rx) = bounded(capacity);
        for _ in 0..capacity {
            // Cannot fail: the channel has exactly `capacity` free slots.
            let _ = tokens_tx.try_send(());
        }
        Self {
            tokens_tx,
            tokens_rx,
            capacity,
        }
    }

    /// Block until a slot is free.
    pub fn acquire(&self) -> AdmissionPermit<'_> {
        if let Ok(()) = self.tokens_rx.try_recv() {
            return AdmissionPermit { gate: self };
        }

        let started = Instant::now();
        log::debug!("Admission gate full ({} slots); waiting", self.capacity);
        // Both ends live in `self`, so recv only fails if the gate is gone.
        let _ = self.tokens_rx.recv();
        log::debug!("Admitted after {:?}", started.elapsed());
        AdmissionPermit { gate: self }
    }

    /// Take a slot if one frees up within `timeout`.
    pub fn try_acquire_for(&self, timeout: Duration) -> Option<AdmissionPermit<'_>> {
        self.tokens_rx
            .recv_timeout(timeout)
            .ok()
            .map(|()| AdmissionPermit { gate: self })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available(&self) -> usize {
        self.tokens_rx.len()
    }
}

impl Drop for AdmissionPermit<'_> {
    fn drop(&mut self) {
        let _ = self.gate.tokens_tx.try_send(());
    }
}
