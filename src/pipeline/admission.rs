// Admission control for exclusive execution units
//
// A counting semaphore: one slot models a single GPU, more slots model
// several interchangeable devices. Permits are RAII guards, so a slot is
// returned on every exit path including unwinding.

use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Raised when a gate has been closed and can no longer admit work.
#[derive(Debug, Clone, thiserror::Error)]
#[error("admission gate closed")]
pub struct GateClosed;

/// Shared admission gate; clones admit against the same slots.
#[derive(Clone, Debug)]
pub struct AdmissionGate {
    slots: Arc<Semaphore>,
    capacity: usize,
}

/// Proof of admission; the slot is released when this is dropped.
#[derive(Debug)]
pub struct AdmissionPermit {
    _permit: OwnedSemaphorePermit,
}

impl AdmissionGate {
    /// Gate admitting `capacity` holders at once (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Single-slot gate.
    pub fn exclusive() -> Self {
        Self::new(1)
    }

    /// Wait for a free slot.
    pub async fn acquire(&self) -> Result<AdmissionPermit, GateClosed> {
        let permit = Arc::clone(&self.slots)
            .acquire_owned()
            .await
            .map_err(|_| GateClosed)?;
        Ok(AdmissionPermit { _permit: permit })
    }

    /// Take a slot only if one is free right now.
    pub fn try_acquire(&self) -> Option<AdmissionPermit> {
        Arc::clone(&self.slots)
            .try_acquire_owned()
            .ok()
            .map(|permit| AdmissionPermit { _permit: permit })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots currently free.
    pub fn available(&self) -> usize {
        self.slots.available_permits()
    }

    /// Stop admitting; pending and future `acquire` calls fail.
    pub fn close(&self) {
        self.slots.close();
    }
}

impl Default for AdmissionGate {
    fn default() -> Self {
        Self::exclusive()
    }
}
