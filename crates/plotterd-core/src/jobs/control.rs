//! Job control for cancel: shared abort tokens with wakeup.
//!
//! Each running job is registered with a token. A cancel request flips the
//! flag and wakes any await parked on `cancelled()`, so an in-flight
//! command wait is interrupted instead of running to its timeout.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use tokio::sync::Notify;
use uuid::Uuid;

#[derive(Default)]
pub struct CancelToken {
    flag: AtomicBool,
    notify: Notify,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Resolve once cancellation is requested. Safe against the request
    /// landing between the flag check and the park.
    pub async fn cancelled(&self) {
        while !self.is_cancelled() {
            let notified = self.notify.notified();
            if self.is_cancelled() {
                break;
            }
            notified.await;
        }
    }
}

/// Shared registry of job id -> abort token. The manager passes a token into
/// each execution task and flips it on cancel.
#[derive(Default)]
pub struct JobControl {
    jobs: RwLock<HashMap<Uuid, Arc<CancelToken>>>,
}

impl JobControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a starting job; returns the token the execution loop observes.
    pub fn register(&self, job_id: Uuid) -> Arc<CancelToken> {
        let token = Arc::new(CancelToken::new());
        self.jobs
            .write()
            .unwrap()
            .insert(job_id, Arc::clone(&token));
        token
    }

    /// Unregister a job (call when the run finishes, whatever the outcome).
    pub fn unregister(&self, job_id: Uuid) {
        self.jobs.write().unwrap().remove(&job_id);
    }

    /// Request cancellation; the loop sees the token and stops.
    pub fn request_cancel(&self, job_id: Uuid) {
        if let Some(token) = self.jobs.read().unwrap().get(&job_id) {
            token.cancel();
        }
    }
}
