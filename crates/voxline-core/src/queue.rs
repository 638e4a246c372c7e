use crate::job::Job;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::{Notify, watch};

#[derive(Debug, Default)]
struct QueueState {
    pending: VecDeque<Job>,
    stop_requested: bool,
}

/// Unbounded FIFO of pending jobs shared by the session and the worker
///
/// Tracks jobs that were enqueued but not yet marked done so shutdown can wait
/// for everything to finish.
#[derive(Debug)]
pub struct JobQueue {
    state: Mutex<QueueState>,
    job_ready: Notify,
    outstanding: watch::Sender<usize>,
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl JobQueue {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            job_ready: Notify::new(),
            outstanding: watch::Sender::new(0),
        }
    }

    /// Append a job to the tail. Never blocks or rejects.
    pub fn enqueue(&self, job: Job) {
        {
            let mut state = self.lock();
            state.pending.push_back(job);
            self.outstanding.send_modify(|n| *n += 1);
        }
        self.job_ready.notify_one();
    }

    /// Take the head job, waiting up to `timeout` for one to arrive.
    ///
    /// `None` means nothing arrived in time; callers re-check the stop flag and retry.
    pub async fn dequeue(&self, timeout: Duration) -> Option<Job> {
        if let Some(job) = self.pop() {
            return Some(job);
        }
        // A stale permit from an earlier enqueue only costs an extra pop attempt
        if tokio::time::timeout(timeout, self.job_ready.notified())
            .await
            .is_err()
        {
            return None;
        }
        self.pop()
    }

    /// Record that one dequeued job has been fully processed
    pub fn mark_done(&self) {
        let _state = self.lock();
        self.outstanding.send_modify(|n| {
            if *n == 0 {
                log::error!("mark_done called with no outstanding jobs");
            } else {
                *n -= 1;
            }
        });
    }

    /// Wait until every enqueued job has been marked done
    pub async fn drain(&self) {
        let mut rx = self.outstanding.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait
        let _ = rx.wait_for(|n| *n == 0).await;
    }

    pub fn request_stop(&self) {
        self.lock().stop_requested = true;
    }

    pub fn is_stop_requested(&self) -> bool {
        self.lock().stop_requested
    }

    pub fn is_empty(&self) -> bool {
        self.lock().pending.is_empty()
    }

    pub fn len(&self) -> usize {
        self.lock().pending.len()
    }

    /// Enqueued jobs not yet marked done, including the one in flight
    pub fn outstanding(&self) -> usize {
        *self.outstanding.borrow()
    }

    fn pop(&self) -> Option<Job> {
        self.lock().pending.pop_front()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, QueueState> {
        // The state stays consistent even if a holder panicked
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SynthesisParams;
    use std::sync::Arc;

    fn job(id: u64, text: &str) -> Job {
        Job::new(id, text, SynthesisParams::default())
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let queue = JobQueue::new();
        queue.enqueue(job(1, "a"));
        queue.enqueue(job(2, "b"));
        queue.enqueue(job(3, "c"));

        let mut ids = Vec::new();
        while let Some(job) = queue.dequeue(Duration::from_millis(10)).await {
            ids.push(job.id());
        }
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(queue.outstanding(), 3);
    }

    #[tokio::test]
    async fn test_dequeue_times_out_when_empty() {
        let queue = JobQueue::new();
        let started = std::time::Instant::now();
        assert!(queue.dequeue(Duration::from_millis(30)).await.is_none());
        assert!(started.elapsed() >= Duration::from_millis(25));
    }

    #[tokio::test]
    async fn test_dequeue_wakes_on_enqueue() {
        let queue = Arc::new(JobQueue::new());
        let waiter = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.dequeue(Duration::from_secs(5)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.enqueue(job(7, "late"));

        let got = waiter.await.unwrap();
        assert_eq!(got.map(|j| j.id()), Some(7));
    }

    #[tokio::test]
    async fn test_drain_returns_immediately_when_idle() {
        let queue = JobQueue::new();
        tokio::time::timeout(Duration::from_millis(100), queue.drain())
            .await
            .expect("drain should not block on an idle queue");
    }

    #[tokio::test]
    async fn test_drain_waits_for_mark_done() {
        let queue = Arc::new(JobQueue::new());
        queue.enqueue(job(1, "a"));
        queue.enqueue(job(2, "b"));
        queue.request_stop();

        let drained = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.drain().await })
        };

        queue.dequeue(Duration::from_millis(10)).await.unwrap();
        queue.mark_done();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!drained.is_finished());

        queue.dequeue(Duration::from_millis(10)).await.unwrap();
        queue.mark_done();
        tokio::time::timeout(Duration::from_secs(1), drained)
            .await
            .expect("drain should finish once all jobs are done")
            .unwrap();
        assert_eq!(queue.outstanding(), 0);
    }

    #[test]
    fn test_stop_flag() {
        let queue = JobQueue::new();
        assert!(!queue.is_stop_requested());
        queue.request_stop();
        assert!(queue.is_stop_requested());
        assert!(queue.is_empty());
        assert_eq!(queue.len(), 0);
    }
}
