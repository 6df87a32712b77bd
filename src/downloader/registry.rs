use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use super::identity::collision_suffix;
use super::{JobState, RequestId};

/// One-shot cancellation cell shared between the cancel command and a running job.
#[derive(Debug, Default)]
pub struct CancellationFlag {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once [`cancel`](Self::cancel) has been called.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

#[derive(Debug)]
struct ActiveJob {
    flag: Arc<CancellationFlag>,
    url: String,
    state: JobState,
    admitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobSnapshot {
    pub id: RequestId,
    pub url: String,
    pub state: JobState,
    pub admitted_at: DateTime<Utc>,
    pub cancel_requested: bool,
}

/// Process-wide table of in-flight request ids and their cancellation flags.
///
/// An id is present exactly while its job is in flight: [`register`](Self::register) inserts it
/// and dropping the returned [`Registration`] removes it.
#[derive(Debug, Default)]
pub struct CancellationRegistry {
    entries: Mutex<HashMap<RequestId, ActiveJob>>,
}

impl CancellationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a fresh flag. If `base` is already in flight, or `always_suffix` is set, a random
    /// suffix is appended until the id is free.
    pub fn register(self: &Arc<Self>, base: RequestId, url: &str, always_suffix: bool) -> Registration {
        let flag = Arc::new(CancellationFlag::new());
        let mut entries = self.entries.lock();

        let mut id = if always_suffix {
            base.with_suffix(&collision_suffix())
        } else {
            base.clone()
        };
        while entries.contains_key(&id) {
            id = base.with_suffix(&collision_suffix());
        }

        entries.insert(
            id.clone(),
            ActiveJob {
                flag: flag.clone(),
                url: url.to_string(),
                state: JobState::Pending,
                admitted_at: Utc::now(),
            },
        );
        drop(entries);

        log::debug!("[REGISTRY] registered {}", id);
        Registration {
            registry: self.clone(),
            id,
            flag,
        }
    }

    /// Sets the flag for `id`. Unknown ids are ignored; returns whether a job was signalled.
    pub fn cancel(&self, id: &RequestId) -> bool {
        let entries = self.entries.lock();
        match entries.get(id) {
            Some(job) => {
                job.flag.cancel();
                log::info!("[REGISTRY] cancellation requested for {}", id);
                true
            }
            None => {
                log::debug!("[REGISTRY] cancel for unknown id {} ignored", id);
                false
            }
        }
    }

    pub fn contains(&self, id: &RequestId) -> bool {
        self.entries.lock().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> Vec<JobSnapshot> {
        let entries = self.entries.lock();
        let mut jobs: Vec<JobSnapshot> = entries
            .iter()
            .map(|(id, job)| JobSnapshot {
                id: id.clone(),
                url: job.url.clone(),
                state: job.state,
                admitted_at: job.admitted_at,
                cancel_requested: job.flag.is_cancelled(),
            })
            .collect();
        jobs.sort_by(|a, b| a.admitted_at.cmp(&b.admitted_at).then_with(|| a.id.cmp(&b.id)));
        jobs
    }

    fn set_state(&self, id: &RequestId, flag: &Arc<CancellationFlag>, state: JobState) {
        let mut entries = self.entries.lock();
        if let Some(job) = entries.get_mut(id) {
            if Arc::ptr_eq(&job.flag, flag) && !job.state.is_terminal() {
                job.state = state;
            }
        }
    }

    fn unregister(&self, id: &RequestId, flag: &Arc<CancellationFlag>) {
        let mut entries = self.entries.lock();
        if entries.get(id).is_some_and(|job| Arc::ptr_eq(&job.flag, flag)) {
            entries.remove(id);
            log::debug!("[REGISTRY] unregistered {}", id);
        }
    }
}

/// Ownership of one registry entry. Dropping it unregisters the id exactly once.
#[derive(Debug)]
pub struct Registration {
    registry: Arc<CancellationRegistry>,
    id: RequestId,
    flag: Arc<CancellationFlag>,
}

impl Registration {
    pub fn id(&self) -> &RequestId {
        &self.id
    }

    pub fn flag(&self) -> Arc<CancellationFlag> {
        self.flag.clone()
    }

    pub fn set_state(&self, state: JobState) {
        self.registry.set_state(&self.id, &self.flag, state);
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        // A job torn down without reaching a terminal state must not keep its extractor running.
        self.flag.cancel();
        self.registry.unregister(&self.id, &self.flag);
    }
}
