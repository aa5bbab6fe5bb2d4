//! Fire-and-forget job queue drained by a single worker task.

use std::future::Future;
use std::pin::Pin;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

enum Message {
    Run(Job),
    Idle(oneshot::Sender<()>),
}

/// Runs queued jobs one at a time, in submission order, outside the caller's
/// lifetime. A panicking job is logged and does not stop the worker.
///
/// Must be created inside a Tokio runtime.
#[derive(Debug, Clone)]
pub struct BackgroundQueue {
    tx: mpsc::UnboundedSender<Message>,
    cancel: CancellationToken,
}

impl BackgroundQueue {
    pub fn new() -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
        let cancel = CancellationToken::new();

        tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                match message {
                    Message::Run(job) => {
                        if let Err(e) = tokio::spawn(job).await {
                            error!(error = %e, "background job panicked");
                        }
                    }
                    Message::Idle(done) => {
                        let _ = done.send(());
                    }
                }
            }
            debug!("background queue closed");
        });

        Self { tx, cancel }
    }

    /// Queue `job`. It receives the queue's cancellation token, which fires on
    /// [`shutdown`](Self::shutdown).
    pub fn queue<F, Fut>(&self, job: F)
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let fut = job(self.cancel.child_token());
        if self.tx.send(Message::Run(Box::pin(fut))).is_err() {
            error!("background queue worker is gone; job dropped");
        }
    }

    /// Resolves once every job queued before this call has finished.
    pub async fn wait_idle(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(Message::Idle(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
    }

    /// Signal cancellation to queued and running jobs.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

impl Default for BackgroundQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[tokio::test]
    async fn jobs_run_in_submission_order() {
        let queue = BackgroundQueue::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        for i in 0..5u64 {
            let log = log.clone();
            queue.queue(move |_| async move {
                // Later jobs sleep less; order must still hold.
                tokio::time::sleep(Duration::from_millis(10 * (5 - i))).await;
                log.lock().unwrap().push(i);
            });
        }

        queue.wait_idle().await;
        assert_eq!(*log.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn panicking_job_does_not_stop_the_worker() {
        let queue = BackgroundQueue::new();
        let ran = Arc::new(Mutex::new(false));

        queue.queue(|_| async {
            if true {
                panic!("boom");
            }
        });
        let flag = ran.clone();
        queue.queue(move |_| async move {
            *flag.lock().unwrap() = true;
        });

        queue.wait_idle().await;
        assert!(*ran.lock().unwrap());
    }

    #[tokio::test]
    async fn shutdown_cancels_job_token() {
        let queue = BackgroundQueue::new();
        let observed = Arc::new(Mutex::new(false));

        let flag = observed.clone();
        queue.shutdown();
        queue.queue(move |cancel| async move {
            *flag.lock().unwrap() = cancel.is_cancelled();
        });

        queue.wait_idle().await;
        assert!(*observed.lock().unwrap());
    }

    #[tokio::test]
    async fn wait_idle_on_empty_queue_returns() {
        let queue = BackgroundQueue::new();
        tokio::time::timeout(Duration::from_secs(1), queue.wait_idle())
            .await
            .unwrap();
    }
}
