/*!
Run scheduled work on a `tokio` runtime.
*/

use std::{io, time::Duration};

use tokio::runtime::{Handle, Runtime};

use crate::queue::{DispatchQueue, Job, Scheduled};

/**
A [`DispatchQueue`] that runs jobs as `tokio` tasks.

Jobs are plain closures, so they run directly on a runtime worker once their delay elapses.
*/
pub struct TokioQueue {
    handle: Handle,
    runtime: Option<Runtime>,
}

impl TokioQueue {
    /**
    Create a queue on the `tokio` runtime.

    If the current thread is a `tokio` thread, then jobs will be spawned onto its runtime. If the current thread is not a `tokio` thread, then a runtime with a single worker thread will be set up and owned by the queue.
    */
    pub fn new() -> io::Result<Self> {
        match Handle::try_current() {
            // If we're on a `tokio` thread then spawn on it
            Ok(handle) => Ok(TokioQueue {
                handle,
                runtime: None,
            }),
            // If we're not on a `tokio` thread then set up
            // a background worker to run jobs on
            Err(_) => {
                let runtime = tokio::runtime::Builder::new_multi_thread()
                    .worker_threads(1)
                    .thread_name("satchel-queue")
                    .enable_time()
                    .build()?;

                Ok(TokioQueue {
                    handle: runtime.handle().clone(),
                    runtime: Some(runtime),
                })
            }
        }
    }

    /**
    Create a queue that spawns onto the given runtime.
    */
    pub fn with_handle(handle: Handle) -> Self {
        TokioQueue {
            handle,
            runtime: None,
        }
    }
}

impl DispatchQueue for TokioQueue {
    fn schedule(&self, delay: Duration, job: Job) -> Scheduled {
        let scheduled = Scheduled::new();

        self.handle.spawn({
            let scheduled = scheduled.clone();

            async move {
                tokio::time::sleep(delay).await;

                if !scheduled.is_cancelled() {
                    job();
                }
            }
        });

        scheduled
    }
}

impl Drop for TokioQueue {
    fn drop(&mut self) {
        // Dropping a runtime blocks, which isn't allowed
        // from within an async context
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::mpsc;

    #[tokio::test(flavor = "multi_thread")]
    async fn runs_on_current_runtime() {
        let queue = TokioQueue::new().unwrap();
        assert!(queue.runtime.is_none());

        let (tx, mut rx) = tokio::sync::oneshot::channel();

        queue.schedule(Duration::from_millis(10), Box::new(move || {
            let _ = tx.send(());
        }));

        tokio::time::timeout(Duration::from_secs(5), &mut rx)
            .await
            .unwrap()
            .unwrap();
    }

    #[test]
    fn runs_on_owned_runtime() {
        let queue = TokioQueue::new().unwrap();
        assert!(queue.runtime.is_some());

        let (tx, rx) = mpsc::channel();

        let cancelled = queue.schedule(Duration::from_millis(10), {
            let tx = tx.clone();
            Box::new(move || tx.send("cancelled").unwrap())
        });
        cancelled.cancel();

        queue.schedule(
            Duration::from_millis(50),
            Box::new(move || tx.send("kept").unwrap()),
        );

        assert_eq!("kept", rx.recv_timeout(Duration::from_secs(5)).unwrap());
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
    }
}
