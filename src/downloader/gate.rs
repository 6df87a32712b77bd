use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use crate::errors::{AppError, Result};

/// Bounds the number of extractions running at once.
///
/// Waiters are admitted in FIFO order. A slot is held by a [`GatePermit`] and given back when the
/// permit is dropped, so every exit path of the guarded section (return, error, panic or the
/// owning future being dropped) releases it exactly once.
#[derive(Debug, Clone)]
pub struct ConcurrencyGate {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

#[derive(Debug)]
pub struct GatePermit {
    _permit: OwnedSemaphorePermit,
}

impl ConcurrencyGate {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    pub async fn acquire(&self) -> Result<GatePermit> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| AppError::Download("Concurrency gate closed".to_string()))?;
        log::debug!("[GATE] slot acquired ({}/{} in use)", self.in_use(), self.capacity);
        Ok(GatePermit { _permit: permit })
    }

    pub fn try_acquire(&self) -> Option<GatePermit> {
        self.semaphore
            .clone()
            .try_acquire_owned()
            .ok()
            .map(|permit| GatePermit { _permit: permit })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn in_use(&self) -> usize {
        self.capacity - self.semaphore.available_permits()
    }

    /// Stops admitting new work; pending and future `acquire` calls fail.
    pub fn close(&self) {
        self.semaphore.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn never_admits_more_than_capacity() {
        let gate = ConcurrencyGate::new(2);
        let first = gate.acquire().await.unwrap();
        let _second = gate.acquire().await.unwrap();
        assert_eq!(gate.in_use(), 2);
        assert!(gate.try_acquire().is_none());

        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.acquire().await.map(|_| ()) })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(first);
        waiter.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn slot_is_released_when_the_holder_panics() {
        let gate = ConcurrencyGate::new(1);
        let holder = {
            let gate = gate.clone();
            tokio::spawn(async move {
                let _permit = gate.acquire().await.unwrap();
                panic!("boom");
            })
        };
        assert!(holder.await.is_err());
        assert_eq!(gate.in_use(), 0);
    }

    #[tokio::test]
    async fn slot_is_released_when_the_waiting_future_is_dropped() {
        let gate = ConcurrencyGate::new(1);
        let permit = gate.acquire().await.unwrap();
        let timed_out = tokio::time::timeout(Duration::from_millis(10), gate.acquire()).await;
        assert!(timed_out.is_err());
        drop(permit);
        assert_eq!(gate.in_use(), 0);
        assert!(gate.try_acquire().is_some());
    }

    #[tokio::test]
    async fn closed_gate_rejects_acquire() {
        let gate = ConcurrencyGate::new(1);
        gate.close();
        assert!(gate.acquire().await.is_err());
    }

    #[test]
    fn zero_capacity_is_raised_to_one() {
        assert_eq!(ConcurrencyGate::new(0).capacity(), 1);
    }
}
