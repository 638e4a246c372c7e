use crate::consumer::{JobReport, StreamConsumer};
use crate::error::{JobError, panic_message};
use crate::queue::JobQueue;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Default wait per dequeue attempt before re-checking the stop flag
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub poll_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Totals reported when the worker exits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub completed: usize,
    pub failed: usize,
}

impl WorkerStats {
    pub fn total(&self) -> usize {
        self.completed + self.failed
    }
}

/// The single background consumer of the job queue
pub struct Worker {
    queue: Arc<JobQueue>,
    consumer: StreamConsumer,
    config: WorkerConfig,
    stats: WorkerStats,
    reports: Option<mpsc::UnboundedSender<JobReport>>,
}

pub struct WorkerHandle {
    handle: JoinHandle<WorkerStats>,
}

impl WorkerHandle {
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the worker loop to exit
    pub async fn join(self) -> Result<WorkerStats, tokio::task::JoinError> {
        self.handle.await
    }
}

impl Worker {
    pub fn spawn(
        queue: Arc<JobQueue>,
        consumer: StreamConsumer,
        config: WorkerConfig,
    ) -> WorkerHandle {
        Self::spawn_inner(queue, consumer, config, None)
    }

    /// Like [`Worker::spawn`], also sending every finished job's report on `reports`
    pub fn spawn_reporting(
        queue: Arc<JobQueue>,
        consumer: StreamConsumer,
        config: WorkerConfig,
        reports: mpsc::UnboundedSender<JobReport>,
    ) -> WorkerHandle {
        Self::spawn_inner(queue, consumer, config, Some(reports))
    }

    fn spawn_inner(
        queue: Arc<JobQueue>,
        consumer: StreamConsumer,
        config: WorkerConfig,
        reports: Option<mpsc::UnboundedSender<JobReport>>,
    ) -> WorkerHandle {
        let worker = Self {
            queue,
            consumer,
            config,
            stats: WorkerStats::default(),
            reports,
        };
        WorkerHandle {
            handle: tokio::spawn(worker.run()),
        }
    }

    async fn run(mut self) -> WorkerStats {
        log::debug!(
            "worker started with engine {}",
            self.consumer.engine_name()
        );

        // Keep going after a stop request until nothing is left
        while !self.queue.is_stop_requested() || !self.queue.is_empty() {
            let Some(job) = self.queue.dequeue(self.config.poll_interval).await else {
                continue;
            };

            log::info!("[job {}] starting: {}", job.id(), job.preview());
            let report = AssertUnwindSafe(self.consumer.consume(&job))
                .catch_unwind()
                .await
                .unwrap_or_else(|payload| JobReport {
                    job_id: job.id(),
                    outcomes: Vec::new(),
                    result: Err(JobError::Panicked(panic_message(payload))),
                });

            match &report.result {
                Ok(()) => {
                    self.stats.completed += 1;
                    log::info!("[job {}] finished after {} chunk(s)", job.id(), report.chunks());
                }
                Err(e) => {
                    self.stats.failed += 1;
                    log::error!("[job {}] failed: {}", job.id(), e);
                }
            }
            if let Some(reports) = &self.reports {
                // Nobody listening is fine
                let _ = reports.send(report);
            }
            self.queue.mark_done();
        }

        log::debug!(
            "worker exiting: {} completed, {} failed",
            self.stats.completed,
            self.stats.failed
        );
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::RawChunk;
    use crate::engine::{ChunkStream, InferenceEngine, SynthesisRequest};
    use crate::error::{EngineError, EngineResult};
    use crate::job::Job;
    use crate::playback::{PlaybackMode, PlaybackStrategy};
    use crate::types::SynthesisParams;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Fails on texts containing "fail", panics on "panic", otherwise yields one chunk
    #[derive(Default)]
    struct MoodyEngine {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl InferenceEngine for MoodyEngine {
        async fn synthesize(&self, request: SynthesisRequest) -> EngineResult<ChunkStream> {
            self.seen.lock().unwrap().push(request.text.clone());
            if request.text.contains("panic") {
                panic!("engine blew up");
            }
            if request.text.contains("fail") {
                return Err(EngineError::Construction("bad input".into(), "moody".into()));
            }
            let chunk = RawChunk::triple("done", None::<String>, Some("moody"));
            Ok(Box::pin(futures::stream::iter(vec![Ok(chunk)])))
        }

        fn name(&self) -> &str {
            "moody"
        }
    }

    fn start(engine: Arc<MoodyEngine>) -> (Arc<JobQueue>, WorkerHandle) {
        let queue = Arc::new(JobQueue::new());
        let consumer = StreamConsumer::new(
            engine,
            Arc::new(PlaybackStrategy::silent(PlaybackMode::Blocking)),
        );
        let config = WorkerConfig {
            poll_interval: Duration::from_millis(20),
        };
        let handle = Worker::spawn(queue.clone(), consumer, config);
        (queue, handle)
    }

    fn job(id: u64, text: &str) -> Job {
        Job::new(id, text, SynthesisParams::default())
    }

    #[tokio::test]
    async fn test_processes_jobs_in_fifo_order() {
        let engine = Arc::new(MoodyEngine::default());
        let (queue, handle) = start(engine.clone());
        for (id, text) in ["one", "two", "three"].iter().enumerate() {
            queue.enqueue(job(id as u64, text));
        }

        queue.request_stop();
        queue.drain().await;
        let stats = handle.join().await.unwrap();

        assert_eq!(stats.completed, 3);
        assert_eq!(
            *engine.seen.lock().unwrap(),
            vec!["[S1]one", "[S1]two", "[S1]three"]
        );
    }

    #[tokio::test]
    async fn test_survives_failing_and_panicking_jobs() {
        let engine = Arc::new(MoodyEngine::default());
        let (queue, handle) = start(engine.clone());
        queue.enqueue(job(1, "please fail"));
        queue.enqueue(job(2, "please panic"));
        queue.enqueue(job(3, "fine"));

        queue.request_stop();
        queue.drain().await;
        let stats = handle.join().await.unwrap();

        assert_eq!(stats, WorkerStats { completed: 1, failed: 2 });
        assert_eq!(engine.seen.lock().unwrap().len(), 3);
        assert_eq!(queue.outstanding(), 0);
    }

    #[tokio::test]
    async fn test_idle_worker_exits_after_stop() {
        let (queue, handle) = start(Arc::new(MoodyEngine::default()));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!handle.is_finished());

        queue.request_stop();
        let stats = tokio::time::timeout(Duration::from_secs(1), handle.join())
            .await
            .expect("worker should exit within one poll interval")
            .unwrap();
        assert_eq!(stats.total(), 0);
    }

    #[tokio::test]
    async fn test_reports_every_job_including_panics() {
        let queue = Arc::new(JobQueue::new());
        let consumer = StreamConsumer::new(
            Arc::new(MoodyEngine::default()),
            Arc::new(PlaybackStrategy::silent(PlaybackMode::Blocking)),
        );
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = Worker::spawn_reporting(
            queue.clone(),
            consumer,
            WorkerConfig {
                poll_interval: Duration::from_millis(20),
            },
            tx,
        );
        queue.enqueue(job(1, "fine"));
        queue.enqueue(job(2, "please panic"));

        queue.request_stop();
        queue.drain().await;
        handle.join().await.unwrap();

        let first = rx.recv().await.unwrap();
        assert_eq!(first.job_id, 1);
        assert!(first.is_success());
        assert_eq!(first.chunks(), 1);
        let second = rx.recv().await.unwrap();
        assert_eq!(second.job_id, 2);
        assert!(matches!(second.result, Err(JobError::Panicked(_))));
        assert!(rx.recv().await.is_none());
    }
}
