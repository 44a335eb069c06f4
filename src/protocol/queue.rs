use std::{
    collections::VecDeque,
    fmt,
    panic::{self, AssertUnwindSafe},
    sync::{Condvar, Mutex, MutexGuard, PoisonError},
};

use log::{debug, trace, warn};

use crate::eval::Evaluation;

use super::{CalculationRequest, CalculationResponse};

pub type Completion = Box<dyn FnOnce(CalculationResponse) + Send + 'static>;

/// Pending calculation and where its result goes.
pub struct Job {
    pub request: CalculationRequest,
    pub complete: Completion,
}

#[derive(Default)]
struct Jobs {
    pending: VecDeque<Job>,
    closed: bool,
}

/// FIFO of calculation jobs shared by every session and drained by a single
/// worker.
///
/// The queue is unbounded: producers never block and [`WorkQueue::enqueue`]
/// never fails.
#[derive(Default)]
pub struct WorkQueue {
    jobs: Mutex<Jobs>,
    available: Condvar,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue<F>(&self, request: CalculationRequest, complete: F)
    where
        F: FnOnce(CalculationResponse) + Send + 'static,
    {
        let was_empty = {
            let mut jobs = self.lock();
            let was_empty = jobs.pending.is_empty();
            jobs.pending.push_back(Job {
                request,
                complete: Box::new(complete),
            });
            was_empty
        };

        // The worker only ever waits on an empty queue.
        if was_empty {
            self.available.notify_one();
        }
    }

    /// Stops the worker once the jobs already queued have been processed.
    pub fn close(&self) {
        self.lock().closed = true;
        self.available.notify_all();
    }

    pub fn len(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drains the queue in arrival order, blocking while it is empty.
    ///
    /// Returns only after [`WorkQueue::close`]. Panics raised by `evaluate` or
    /// by a job's completion are contained to that job.
    pub fn run_worker<E>(&self, evaluate: E)
    where
        E: Fn(&str) -> Evaluation,
    {
        while let Some(job) = self.next_job() {
            Self::process(job, &evaluate);
        }
        debug!("work queue closed, worker exiting");
    }

    fn next_job(&self) -> Option<Job> {
        let mut jobs = self.lock();
        loop {
            if let Some(job) = jobs.pending.pop_front() {
                return Some(job);
            }
            if jobs.closed {
                return None;
            }
            jobs = self
                .available
                .wait(jobs)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn process<E>(job: Job, evaluate: &E)
    where
        E: Fn(&str) -> Evaluation,
    {
        let Job { request, complete } = job;
        trace!("evaluating {:?}", request.expression);

        let evaluation = panic::catch_unwind(AssertUnwindSafe(|| evaluate(&request.expression)))
            .unwrap_or_else(|_| {
                warn!("evaluator panicked on {:?}", request.expression);
                Evaluation::failed("internal error while evaluating expression")
            });

        if panic::catch_unwind(AssertUnwindSafe(|| complete(evaluation.into()))).is_err() {
            warn!("completion for {:?} panicked", request.expression);
        }
    }

    fn lock(&self) -> MutexGuard<'_, Jobs> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for WorkQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkQueue")
            .field("pending", &self.len())
            .finish()
    }
}
