//! Drives a batch of work items through a processing function on a bounded
//! worker pool, re-queueing failed items with exponential backoff until they
//! succeed or run out of attempts.

use std::collections::VecDeque;
use std::fmt;
use std::sync::mpsc;
use std::time::{Duration, Instant};

use log;

use crate::common::{self, Cancel};

/// How often to retry an item that keeps failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts per item, including the first.
    pub max_attempts : u32,
    pub base_delay : Duration,
    pub max_delay : Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts : 4,
            base_delay : Duration::from_secs(2),
            max_delay : Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Delay before attempt `failed_attempts + 1`.
    pub fn backoff(&self, failed_attempts : u32) -> Duration {
        let exponent = failed_attempts.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1 << exponent).min(self.max_delay)
    }
}

/// The way an item finished successfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// The item was produced by this run.
    Done,
    /// The output already existed and was left alone.
    AlreadyDone,
}

#[derive(Debug)]
pub struct Failure<T> {
    pub item : T,
    pub attempts : u32,
    pub error : String,
}

/// Terminal state of every submitted item. Entries appear in completion
/// order, not submission order.
#[derive(Debug)]
pub struct Report<T> {
    pub succeeded : Vec<(T, Completion)>,
    pub failed : Vec<Failure<T>>,
    pub cancelled : Vec<T>,
}

impl<T> Default for Report<T> {
    fn default() -> Self {
        Self { succeeded : Vec::new(), failed : Vec::new(), cancelled : Vec::new() }
    }
}

impl<T> Report<T> {
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len() + self.cancelled.len()
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.cancelled.is_empty()
    }
}

struct Pending<T> {
    item : T,
    attempts : u32,
    not_before : Instant,
}

struct Attempt<T> {
    pending : Pending<T>,
    result : common::Result<Completion>,
}

/// The work queue of one run: items waiting for a worker, oldest first.
struct Queue<T> {
    waiting : VecDeque<Pending<T>>,
    in_flight : usize,
}

impl<T> Queue<T> {
    fn new(items : Vec<T>, now : Instant) -> Self {
        let waiting = items.into_iter()
                .map(|item| Pending { item, attempts : 0, not_before : now })
                .collect();
        Self { waiting, in_flight : 0 }
    }

    fn is_finished(&self) -> bool {
        self.waiting.is_empty() && self.in_flight == 0
    }

    /// Takes the first item that is allowed to run at `now`.
    fn next_ready(&mut self, now : Instant) -> Option<Pending<T>> {
        let position = self.waiting.iter().position(|x| x.not_before <= now)?;
        self.waiting.remove(position)
    }

    /// Time until the earliest waiting item becomes ready.
    fn next_wakeup(&self, now : Instant) -> Option<Duration> {
        self.waiting.iter()
                .map(|x| x.not_before.saturating_duration_since(now))
                .min()
    }
}

pub struct Dispatcher {
    workers : usize,
    policy : RetryPolicy,
    cancel : Cancel,
}

const CANCEL_POLL : Duration = Duration::from_millis(200);

impl Dispatcher {
    pub fn new(workers : usize, policy : RetryPolicy, cancel : Cancel) -> Self {
        Self {
            workers : workers.max(1),
            policy : RetryPolicy { max_attempts : policy.max_attempts.max(1), ..policy },
            cancel,
        }
    }

    /// Processes every item and returns once each one has reached a terminal
    /// state. Errors returned by `process` never abort the batch.
    pub fn run<T, F>(&self, items : Vec<T>, process : F) -> common::Result<Report<T>>
    where
        T : fmt::Display + Send,
        F : Fn(&T) -> common::Result<Completion> + Sync,
    {
        let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.workers)
                .thread_name(|i| format!("mixtape-worker-{}", i))
                .build()
                .map_err(|err| std::io::Error::new(std::io::ErrorKind::Other, err))?;
        let total = items.len();
        let mut queue = Queue::new(items, Instant::now());
        let mut report = Report::default();
        let (sender, receiver) = mpsc::channel::<Attempt<T>>();
        let process = &process;
        pool.in_place_scope(|scope| {
            loop {
                if self.cancel.is_cancelled() {
                    for pending in queue.waiting.drain(..) {
                        log::warn!("cancelled: {}", pending.item);
                        report.cancelled.push(pending.item);
                    }
                }
                while queue.in_flight < self.workers {
                    let Some(mut pending) = queue.next_ready(Instant::now()) else {
                        break;
                    };
                    pending.attempts += 1;
                    queue.in_flight += 1;
                    let sender = sender.clone();
                    scope.spawn(move |_| {
                        let result = process(&pending.item);
                        // the receiver outlives the scope
                        let _ = sender.send(Attempt { pending, result });
                    });
                }
                if queue.is_finished() {
                    break;
                }
                let wait = queue.next_wakeup(Instant::now())
                        .unwrap_or(CANCEL_POLL)
                        .min(CANCEL_POLL);
                let attempt = match receiver.recv_timeout(wait) {
                    Ok(attempt) => attempt,
                    Err(_) => continue,
                };
                queue.in_flight -= 1;
                self.settle(attempt, &mut queue, &mut report, total);
            }
        });
        Ok(report)
    }

    fn settle<T : fmt::Display>(
        &self,
        attempt : Attempt<T>,
        queue : &mut Queue<T>,
        report : &mut Report<T>,
        total : usize,
    ) {
        let Attempt { mut pending, result } = attempt;
        match result {
            Ok(completion) => {
                report.succeeded.push((pending.item, completion));
                log::info!("finished [{} / {}]", report.total(), total);
            },
            Err(common::Error::Cancelled) => {
                log::warn!("cancelled: {}", pending.item);
                report.cancelled.push(pending.item);
            },
            Err(err) if pending.attempts < self.policy.max_attempts && !self.cancel.is_cancelled() => {
                let delay = self.policy.backoff(pending.attempts);
                log::warn!(
                    "attempt {} / {} failed for {}, retrying in {}s\n{}",
                    pending.attempts, self.policy.max_attempts, pending.item, delay.as_secs(), err
                );
                pending.not_before = Instant::now() + delay;
                queue.waiting.push_back(pending);
            },
            Err(err) => {
                log::error!("giving up on {} after {} attempt(s)\n{}", pending.item, pending.attempts, err);
                report.failed.push(Failure {
                    item : pending.item,
                    attempts : pending.attempts,
                    error : err.to_string(),
                });
            },
        }
    }
}

#[cfg(test)]
mod tests;
