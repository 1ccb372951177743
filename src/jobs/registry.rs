//! Job registry - the single shared view of running and recently finished jobs
//!
//! The map is guarded by one lock and every record by its own, so appends to
//! one job never contend with polls of another. Finished records are removed
//! by a one-shot timer armed at the `Completed` transition.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::id::JobId;
use crate::jobs::record::{JobRecord, JobSnapshot};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Registry slot holding one record
#[derive(Debug)]
struct JobEntry {
    record: Mutex<JobRecord>,
}

/// Shared reference to one record, handed to the supervisor for appends
#[derive(Debug, Clone)]
pub struct JobHandle {
    id: JobId,
    entry: Arc<JobEntry>,
}

impl JobHandle {
    pub fn id(&self) -> &JobId {
        &self.id
    }

    /// Append output; ignored once the record is terminal
    pub fn append(&self, chunk: &[u8]) -> usize {
        lock(&self.entry.record).append(chunk)
    }

    pub fn snapshot(&self) -> JobSnapshot {
        lock(&self.entry.record).snapshot()
    }
}

/// In-memory registry of job records
#[derive(Debug)]
pub struct JobRegistry {
    jobs: RwLock<HashMap<JobId, Arc<JobEntry>>>,
    reclaims: Mutex<HashMap<JobId, JoinHandle<()>>>,
    retention: Duration,
    max_output_bytes: usize,
}

impl JobRegistry {
    /// Create a registry that keeps finished records for `retention`
    pub fn new(retention: Duration, max_output_bytes: usize) -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            reclaims: Mutex::new(HashMap::new()),
            retention,
            max_output_bytes,
        }
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    /// Number of records currently held
    pub fn len(&self) -> usize {
        self.jobs.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Return the record for `id`, creating a running one if absent.
    ///
    /// The boolean is true only for the caller that created the record; that
    /// caller alone is responsible for spawning the process.
    pub fn get_or_create(&self, id: &JobId) -> (JobHandle, bool) {
        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(entry) = jobs.get(id) {
            return (
                JobHandle {
                    id: id.clone(),
                    entry: Arc::clone(entry),
                },
                false,
            );
        }

        let entry = Arc::new(JobEntry {
            record: Mutex::new(JobRecord::new(id.clone(), self.max_output_bytes)),
        });
        jobs.insert(id.clone(), Arc::clone(&entry));
        tracing::debug!(job_id = %id, "Job record created");
        (JobHandle { id: id.clone(), entry }, true)
    }

    /// Look up the record for `id`
    pub fn get(&self, id: &JobId) -> Option<JobHandle> {
        let jobs = self.jobs.read().unwrap_or_else(PoisonError::into_inner);
        jobs.get(id).map(|entry| JobHandle {
            id: id.clone(),
            entry: Arc::clone(entry),
        })
    }

    /// Copy of the current state, or None if never started or reclaimed
    pub fn snapshot(&self, id: &JobId) -> Option<JobSnapshot> {
        self.get(id).map(|handle| handle.snapshot())
    }

    /// Move the record to `Completed` and arm its reclamation.
    ///
    /// Returns false if the record was already terminal; the timer is then
    /// left as it was.
    pub fn complete(self: &Arc<Self>, handle: &JobHandle, exit_code: i32, timed_out: bool) -> bool {
        let transitioned = lock(&handle.entry.record).complete(exit_code, timed_out);
        if transitioned {
            tracing::info!(job_id = %handle.id, exit_code, timed_out, "Job completed");
            self.schedule_reclaim(handle, self.retention);
        }
        transitioned
    }

    /// Arm a one-shot removal of `handle`'s record after `after`.
    ///
    /// The timer removes the record only if the map still holds this exact
    /// record for the identifier.
    pub fn schedule_reclaim(self: &Arc<Self>, handle: &JobHandle, after: Duration) {
        let registry = Arc::downgrade(self);
        let id = handle.id.clone();
        let entry = Arc::clone(&handle.entry);

        let task = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            if let Some(registry) = registry.upgrade()
                && registry.remove_entry(&id, &entry)
            {
                tracing::debug!(job_id = %id, "Job record reclaimed");
            }
        });

        let mut reclaims = lock(&self.reclaims);
        reclaims.retain(|_, timer| !timer.is_finished());
        if let Some(previous) = reclaims.insert(handle.id.clone(), task) {
            previous.abort();
        }
    }

    /// Drop a record whose process never started
    pub fn discard(&self, handle: &JobHandle) -> bool {
        self.remove_entry(&handle.id, &handle.entry)
    }

    fn remove_entry(&self, id: &JobId, entry: &Arc<JobEntry>) -> bool {
        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        match jobs.get(id) {
            Some(current) if Arc::ptr_eq(current, entry) => {
                jobs.remove(id);
                true
            }
            _ => false,
        }
    }

    /// Cancel every pending reclamation timer
    pub fn shutdown(&self) -> usize {
        let mut reclaims = lock(&self.reclaims);
        let count = reclaims.len();
        for (_, timer) in reclaims.drain() {
            timer.abort();
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::record::JobStatus;

    fn registry(retention: Duration) -> Arc<JobRegistry> {
        Arc::new(JobRegistry::new(retention, 1024))
    }

    fn job(n: u32) -> JobId {
        JobId::parse(&format!("1700000000000-{:08x}", n)).unwrap()
    }

    #[test]
    fn test_get_or_create_only_first_caller_creates() {
        let reg = registry(Duration::from_secs(300));
        let (first, created) = reg.get_or_create(&job(1));
        assert!(created);
        let (second, created) = reg.get_or_create(&job(1));
        assert!(!created);

        first.append(b"shared");
        assert_eq!(second.snapshot().output, "shared");
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_get_or_create_is_atomic_across_threads() {
        let reg = registry(Duration::from_secs(300));
        let creators: usize = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..16)
                .map(|_| scope.spawn(|| reg.get_or_create(&job(7)).1 as usize))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).sum()
        });
        assert_eq!(creators, 1);
    }

    #[test]
    fn test_snapshots_never_see_partial_appends() {
        const CHUNK: &[u8] = b"abcdefgh";
        const WRITES: usize = 2_000;

        let reg = Arc::new(JobRegistry::new(Duration::from_secs(300), CHUNK.len() * WRITES));
        let (handle, _) = reg.get_or_create(&job(11));

        std::thread::scope(|scope| {
            let writer = scope.spawn(|| {
                for _ in 0..WRITES {
                    handle.append(CHUNK);
                }
            });

            let readers: Vec<_> = (0..4)
                .map(|_| {
                    scope.spawn(|| {
                        let mut last_len = 0;
                        for _ in 0..500 {
                            let snap = reg.snapshot(&job(11)).unwrap();
                            assert_eq!(snap.output.len() % CHUNK.len(), 0, "torn append observed");
                            assert!(snap.output.len() >= last_len, "output shrank");
                            assert!(snap.output.as_bytes().chunks(CHUNK.len()).all(|c| c == CHUNK));
                            last_len = snap.output.len();
                        }
                    })
                })
                .collect();

            writer.join().unwrap();
            for reader in readers {
                reader.join().unwrap();
            }
        });

        assert_eq!(reg.snapshot(&job(11)).unwrap().output.len(), CHUNK.len() * WRITES);
    }

    #[test]
    fn test_snapshot_unknown_is_none() {
        let reg = registry(Duration::from_secs(300));
        assert!(reg.snapshot(&job(99)).is_none());
        assert!(reg.is_empty());
    }

    #[test]
    fn test_records_are_independent() {
        let reg = registry(Duration::from_secs(300));
        let (a, _) = reg.get_or_create(&job(1));
        let (b, _) = reg.get_or_create(&job(2));
        a.append(b"aaa");
        b.append(b"b");
        assert_eq!(reg.snapshot(&job(1)).unwrap().output, "aaa");
        assert_eq!(reg.snapshot(&job(2)).unwrap().output, "b");
    }

    #[test]
    fn test_discard_removes_record() {
        let reg = registry(Duration::from_secs(300));
        let (handle, _) = reg.get_or_create(&job(3));
        assert!(reg.discard(&handle));
        assert!(reg.snapshot(&job(3)).is_none());
        assert!(!reg.discard(&handle));
    }

    #[tokio::test]
    async fn test_complete_transitions_once() {
        let reg = registry(Duration::from_secs(300));
        let (handle, _) = reg.get_or_create(&job(4));
        assert!(reg.complete(&handle, 0, false));
        assert!(!reg.complete(&handle, 1, true));

        let snap = reg.snapshot(&job(4)).unwrap();
        assert_eq!(snap.status, JobStatus::Completed);
        assert_eq!(snap.exit_code, Some(0));
        assert_eq!(reg.shutdown(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_record_survives_retention_window_then_vanishes() {
        let retention = Duration::from_secs(300);
        let reg = registry(retention);
        let (handle, _) = reg.get_or_create(&job(5));
        handle.append(b"done\n");
        reg.complete(&handle, 0, false);

        tokio::time::sleep(retention - Duration::from_secs(1)).await;
        assert_eq!(reg.snapshot(&job(5)).unwrap().output, "done\n");

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(reg.snapshot(&job(5)).is_none());
        assert!(reg.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_running_record_is_never_reclaimed() {
        let reg = registry(Duration::from_secs(1));
        let (_handle, _) = reg.get_or_create(&job(6));
        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert!(reg.snapshot(&job(6)).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_timer_leaves_replacement_alone() {
        let reg = registry(Duration::from_secs(10));
        let (old, _) = reg.get_or_create(&job(8));
        reg.discard(&old);
        let (fresh, created) = reg.get_or_create(&job(8));
        assert!(created);

        // A timer bound to the discarded record must not remove the new one
        reg.schedule_reclaim(&old, Duration::from_secs(1));
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(reg.snapshot(fresh.id()).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_timers() {
        let reg = registry(Duration::from_secs(5));
        let (handle, _) = reg.get_or_create(&job(9));
        reg.complete(&handle, 0, false);
        assert_eq!(reg.shutdown(), 1);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(reg.snapshot(&job(9)).is_some());
    }
}
