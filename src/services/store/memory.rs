use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::time::Instant;

use super::{JobStore, StoreError};
use crate::models::job::{
    Completion, Delivery, JobId, JobOptions, JobOutcome, JobState, QueuedJob,
};

struct Entry {
    job: QueuedJob,
    input: Vec<u8>,
    outcome: Option<JobOutcome>,
    deadline: Instant,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.deadline
    }
}

#[derive(Default)]
struct Inner {
    jobs: HashMap<JobId, Entry>,
    queue: VecDeque<JobId>,
    leases: HashMap<JobId, Instant>,
}

impl Inner {
    /// Drop the entry if its deadline passed. Returns whether it is still live.
    fn evict_if_expired(&mut self, job_id: JobId, now: Instant) -> bool {
        match self.jobs.get(&job_id) {
            Some(entry) if entry.is_expired(now) => {
                self.jobs.remove(&job_id);
                self.leases.remove(&job_id);
                false
            }
            Some(_) => true,
            None => false,
        }
    }

    fn take_next(&mut self, now: Instant) -> Option<Delivery> {
        while let Some(job_id) = self.queue.pop_front() {
            if !self.evict_if_expired(job_id, now) {
                continue;
            }
            let Some(entry) = self.jobs.get(&job_id) else {
                continue;
            };
            if entry.outcome.is_some() {
                continue;
            }
            self.leases.insert(job_id, now);
            return Some(Delivery {
                job_id,
                input: entry.input.clone(),
                options: entry.job.options,
            });
        }
        None
    }
}

/// Process-local job store.
///
/// Expiry runs on the tokio clock, so tests can drive it with
/// `tokio::time::pause`/`advance`. Nothing survives a restart.
pub struct MemoryJobStore {
    ttl: Duration,
    inner: Mutex<Inner>,
    available: Notify,
}

impl MemoryJobStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            inner: Mutex::new(Inner::default()),
            available: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn enqueue(&self, input: Vec<u8>, options: JobOptions) -> Result<JobId, StoreError> {
        let job = QueuedJob::new(options, self.ttl);
        let job_id = job.job_id;
        {
            let mut inner = self.lock();
            inner.jobs.insert(
                job_id,
                Entry {
                    job,
                    input,
                    outcome: None,
                    deadline: Instant::now() + self.ttl,
                },
            );
            inner.queue.push_back(job_id);
        }
        self.available.notify_one();
        Ok(job_id)
    }

    async fn dequeue(&self) -> Result<Delivery, StoreError> {
        loop {
            // Register before checking the queue so an enqueue in between
            // still wakes this consumer.
            let notified = self.available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(delivery) = self.lock().take_next(Instant::now()) {
                return Ok(delivery);
            }
            notified.await;
        }
    }

    async fn complete(&self, job_id: JobId, outcome: JobOutcome) -> Result<Completion, StoreError> {
        let mut inner = self.lock();
        inner.leases.remove(&job_id);
        if !inner.evict_if_expired(job_id, Instant::now()) {
            return Ok(Completion::Expired);
        }
        let Some(entry) = inner.jobs.get_mut(&job_id) else {
            return Ok(Completion::Expired);
        };
        if entry.outcome.is_some() {
            return Ok(Completion::AlreadyTerminal);
        }
        entry.outcome = Some(outcome);
        entry.input = Vec::new();
        Ok(Completion::Recorded)
    }

    async fn get_state(&self, job_id: JobId) -> Result<JobState, StoreError> {
        let mut inner = self.lock();
        if !inner.evict_if_expired(job_id, Instant::now()) {
            return Ok(JobState::Unknown);
        }
        Ok(match inner.jobs.get(&job_id).and_then(|e| e.outcome.clone()) {
            Some(outcome) => outcome.into(),
            None => JobState::Pending,
        })
    }

    async fn requeue_expired_leases(&self, lease_timeout: Duration) -> Result<usize, StoreError> {
        let now = Instant::now();
        let requeued = {
            let mut inner = self.lock();
            let stale: Vec<JobId> = inner
                .leases
                .iter()
                .filter(|(_, leased_at)| now.duration_since(**leased_at) >= lease_timeout)
                .map(|(job_id, _)| *job_id)
                .collect();

            let mut requeued = 0;
            for job_id in stale {
                inner.leases.remove(&job_id);
                if !inner.evict_if_expired(job_id, now) {
                    continue;
                }
                let unfinished = inner
                    .jobs
                    .get(&job_id)
                    .is_some_and(|entry| entry.outcome.is_none());
                if unfinished {
                    inner.queue.push_front(job_id);
                    requeued += 1;
                }
            }
            requeued
        };
        for _ in 0..requeued {
            self.available.notify_one();
        }
        Ok(requeued)
    }

    async fn sweep(&self) -> Result<usize, StoreError> {
        let now = Instant::now();
        let mut inner = self.lock();
        let before = inner.jobs.len();
        inner.jobs.retain(|_, entry| !entry.is_expired(now));
        let Inner { jobs, queue, leases } = &mut *inner;
        queue.retain(|job_id| jobs.contains_key(job_id));
        leases.retain(|job_id, _| jobs.contains_key(job_id));
        Ok(before - jobs.len())
    }

    async fn queue_depth(&self) -> Result<u64, StoreError> {
        Ok(self.lock().queue.len() as u64)
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
