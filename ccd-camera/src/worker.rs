//! Background image finishing.
//!
//! Encode, compress and deliver can take long enough to stall the next
//! exposure, so finishing jobs can run on a dedicated thread behind a
//! bounded queue. A full queue fails fast rather than stacking frames up.

use std::thread::JoinHandle;

use crossbeam_channel::{bounded, Sender, TrySendError};
use tracing::info;

use crate::error::{CameraError, CameraResult};

type Job = Box<dyn FnOnce() + Send + 'static>;

pub struct CompletionWorker {
    sender: Sender<Job>,
    worker: Option<JoinHandle<()>>,
}

impl CompletionWorker {
    /// Spawns the finishing thread with room for `queue_depth` pending jobs.
    pub fn new(queue_depth: usize) -> Self {
        let (sender, receiver) = bounded::<Job>(queue_depth);
        let worker = std::thread::spawn(move || {
            while let Ok(job) = receiver.recv() {
                job();
            }
            info!("image finishing worker exiting");
        });
        Self {
            sender,
            worker: Some(worker),
        }
    }

    /// Queues one finishing job.
    pub fn submit(&self, job: impl FnOnce() + Send + 'static) -> CameraResult<()> {
        self.sender
            .try_send(Box::new(job))
            .map_err(|e| match e {
                TrySendError::Full(_) => {
                    CameraError::Delivery("image finishing queue is full".to_string())
                }
                TrySendError::Disconnected(_) => {
                    CameraError::Delivery("image finishing worker has shut down".to_string())
                }
            })
    }

    /// Drains the queue and joins the worker thread.
    pub fn wait_for_completion(self) {
        let CompletionWorker { sender, worker } = self;
        drop(sender);
        if let Some(handle) = worker {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn jobs_run_before_shutdown_completes() {
        let counter = Arc::new(AtomicUsize::new(0));
        let worker = CompletionWorker::new(8);
        for _ in 0..5 {
            let counter = counter.clone();
            worker
                .submit(move || {
                    std::thread::sleep(Duration::from_millis(5));
                    counter.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
        }
        worker.wait_for_completion();
        assert_eq!(counter.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn full_queue_fails_fast() {
        let worker = CompletionWorker::new(1);
        // First job occupies the thread, the rest pile into the queue.
        worker
            .submit(|| std::thread::sleep(Duration::from_millis(200)))
            .unwrap();
        let mut saw_full = false;
        for _ in 0..4 {
            if let Err(CameraError::Delivery(msg)) =
                worker.submit(|| std::thread::sleep(Duration::from_millis(200)))
            {
                assert!(msg.contains("full"));
                saw_full = true;
                break;
            }
        }
        assert!(saw_full);
        worker.wait_for_completion();
    }
}
