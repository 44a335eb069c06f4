use std::{
    io,
    sync::Arc,
    thread::{self, JoinHandle},
};

use log::{debug, info, warn};

use crate::eval::Evaluation;

use super::WorkQueue;

/// The single thread draining a [`WorkQueue`].
///
/// Dropping the worker closes the queue and waits for the jobs already queued
/// to finish.
#[derive(Debug)]
pub struct Worker {
    queue: Arc<WorkQueue>,
    thread: Option<JoinHandle<()>>,
}

impl Worker {
    pub fn spawn<E>(queue: Arc<WorkQueue>, evaluate: E) -> io::Result<Self>
    where
        E: Fn(&str) -> Evaluation + Send + 'static,
    {
        let handle = Arc::clone(&queue);
        let thread = thread::Builder::new()
            .name(String::from("calc-worker"))
            .spawn(move || {
                debug!("worker waiting for calculations");
                handle.run_worker(evaluate);
            })?;

        info!("processing queue thread launched");
        Ok(Self {
            queue,
            thread: Some(thread),
        })
    }

    pub fn queue(&self) -> &Arc<WorkQueue> {
        &self.queue
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.queue.close();

        if let Some(thread) = self.thread.take() {
            debug!("shutting down worker");
            if thread.join().is_err() {
                warn!("worker thread panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::mpsc, time::Duration};

    use super::*;
    use crate::{eval::evaluate, protocol::CalculationRequest};

    #[test]
    fn drop_drains_pending_jobs() {
        let queue = Arc::new(WorkQueue::new());
        let (tx, rx) = mpsc::channel();

        let worker = Worker::spawn(Arc::clone(&queue), evaluate).unwrap();
        for i in 0..10 {
            let tx = tx.clone();
            queue.enqueue(CalculationRequest::new(format!("{i} * 2")), move |resp| {
                tx.send(resp.result).unwrap()
            });
        }
        drop(tx);
        drop(worker);

        let results = rx.iter().collect::<Vec<_>>();
        assert_eq!(results, (0..10).map(|i| f64::from(i * 2)).collect::<Vec<_>>());
    }

    #[test]
    fn deeply_nested_expression_leaves_worker_running() {
        let queue = Arc::new(WorkQueue::new());
        let (tx, rx) = mpsc::channel();
        let _worker = Worker::spawn(Arc::clone(&queue), evaluate).unwrap();

        for expression in ["(".repeat(1_000_000), String::from("1+1")] {
            let tx = tx.clone();
            queue.enqueue(CalculationRequest::new(expression), move |resp| {
                tx.send(resp).unwrap()
            });
        }

        let nested = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(nested.result.is_nan());
        assert_eq!(nested.error, "expression nested too deeply");

        let sum = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(sum.result, 2.0);
    }
}
