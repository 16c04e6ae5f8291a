use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;

use super::*;
use crate::common::Error;

fn no_delay(max_attempts : u32) -> RetryPolicy {
    RetryPolicy { max_attempts, base_delay : Duration::ZERO, max_delay : Duration::ZERO }
}

fn fail(item : &str) -> Error {
    Error::Resolve { uri : item.to_string(), reason : "video unavailable".to_string() }
}

/// Items starting with `bad` always fail, `flaky` fails on the first attempt only.
fn run_mixed(workers : usize, policy : RetryPolicy) -> (Report<String>, HashMap<String, u32>) {
    let items = ["good-1", "bad-1", "good-2", "flaky-1", "good-3", "bad-2", "good-4"]
            .map(String::from)
            .to_vec();
    let attempts = Mutex::new(HashMap::<String, u32>::new());
    let dispatcher = Dispatcher::new(workers, policy, Cancel::new());
    let report = dispatcher.run(items, |item| {
        let attempt = {
            let mut attempts = attempts.lock().unwrap();
            let count = attempts.entry(item.clone()).or_default();
            *count += 1;
            *count
        };
        if item.starts_with("bad") || (item.starts_with("flaky") && attempt == 1) {
            Err(fail(item))
        } else {
            Ok(Completion::Done)
        }
    }).unwrap();
    (report, attempts.into_inner().unwrap())
}

fn succeeded(report : &Report<String>) -> BTreeSet<String> {
    report.succeeded.iter().map(|(x, _)| x.clone()).collect()
}

fn failed(report : &Report<String>) -> BTreeSet<String> {
    report.failed.iter().map(|x| x.item.clone()).collect()
}

#[test]
fn bounded_retries_terminate() {
    let (report, attempts) = run_mixed(1, no_delay(3));
    assert_eq!(report.total(), 7);
    assert_eq!(failed(&report), BTreeSet::from(["bad-1".to_string(), "bad-2".to_string()]));
    for failure in &report.failed {
        assert_eq!(failure.attempts, 3);
        assert!(failure.error.contains("video unavailable"));
    }
    assert_eq!(attempts["bad-1"], 3);
    assert_eq!(attempts["flaky-1"], 2);
    assert_eq!(attempts["good-1"], 1);
    assert!(!report.is_complete());
}

#[test]
fn every_success_is_reported_once() {
    let (report, _) = run_mixed(1, no_delay(2));
    assert_eq!(report.succeeded.len(), 5);
    assert_eq!(
        succeeded(&report),
        ["good-1", "good-2", "good-3", "good-4", "flaky-1"].map(String::from).into_iter().collect(),
    );
}

#[test]
fn pool_size_does_not_change_outcome() {
    let (sequential, _) = run_mixed(1, no_delay(3));
    let (concurrent, _) = run_mixed(4, no_delay(3));
    assert_eq!(succeeded(&sequential), succeeded(&concurrent));
    assert_eq!(failed(&sequential), failed(&concurrent));
    assert_eq!(concurrent.succeeded.len(), 5);
}

#[test]
fn failed_items_go_to_the_back_of_the_queue() {
    let order = Mutex::new(Vec::new());
    let dispatcher = Dispatcher::new(1, no_delay(2), Cancel::new());
    let items = vec!["a".to_string(), "b".to_string(), "c".to_string()];
    dispatcher.run(items, |item| {
        let mut order = order.lock().unwrap();
        order.push(item.clone());
        let first_try = order.iter().filter(|x| *x == item).count() == 1;
        if item == "a" && first_try { Err(fail(item)) } else { Ok(Completion::Done) }
    }).unwrap();
    assert_eq!(order.into_inner().unwrap(), ["a", "b", "c", "a"]);
}

#[test]
fn backoff_delays_only_the_failed_item() {
    let delay = Duration::from_millis(150);
    let policy = RetryPolicy { max_attempts : 2, base_delay : delay, max_delay : Duration::from_secs(1) };
    let starts = Mutex::new(Vec::<(String, Instant)>::new());
    let dispatcher = Dispatcher::new(1, policy, Cancel::new());
    let items = vec!["a".to_string(), "b".to_string(), "c".to_string()];
    let report = dispatcher.run(items, |item| {
        let mut starts = starts.lock().unwrap();
        starts.push((item.clone(), Instant::now()));
        let first_try = starts.iter().filter(|(x, _)| x == item).count() == 1;
        if item == "a" && first_try { Err(fail(item)) } else { Ok(Completion::Done) }
    }).unwrap();
    assert!(report.is_complete());
    let starts = starts.into_inner().unwrap();
    let order = starts.iter().map(|(x, _)| x.as_str()).collect::<Vec<_>>();
    assert_eq!(order, ["a", "b", "c", "a"]);
    let first_try = starts[0].1;
    // the other items ran while `a` was still backing off
    assert!(starts[1].1 - first_try < delay);
    assert!(starts[2].1 - first_try < delay);
    assert!(starts[3].1 - first_try >= delay);
}

#[test]
fn queue_skips_items_that_are_not_ready() {
    let now = Instant::now();
    let mut queue = Queue::new(vec!["b", "c"], now);
    queue.waiting.push_front(Pending { item : "a", attempts : 1, not_before : now + Duration::from_secs(5) });
    assert_eq!(queue.next_ready(now).map(|x| x.item), Some("b"));
    assert_eq!(queue.next_ready(now).map(|x| x.item), Some("c"));
    assert!(queue.next_ready(now).is_none());
    let wakeup = queue.next_wakeup(now).unwrap();
    assert!(wakeup > Duration::from_secs(4));
    assert_eq!(queue.next_ready(now + Duration::from_secs(5)).map(|x| x.item), Some("a"));
    assert!(queue.is_finished());
}

#[test]
fn already_done_is_a_success() {
    let dispatcher = Dispatcher::new(2, no_delay(1), Cancel::new());
    let report = dispatcher.run(vec!["x".to_string()], |_| Ok(Completion::AlreadyDone)).unwrap();
    assert_eq!(report.succeeded, [("x".to_string(), Completion::AlreadyDone)]);
    assert!(report.is_complete());
}

#[test]
fn cancelled_items_are_not_retried() {
    let cancel = Cancel::new();
    let dispatcher = Dispatcher::new(1, no_delay(5), cancel.clone());
    let items = (0..4).map(|x| x.to_string()).collect::<Vec<_>>();
    let report = dispatcher.run(items, |item| {
        if item == "1" {
            cancel.cancel();
            return Err(Error::Cancelled);
        }
        Ok(Completion::Done)
    }).unwrap();
    assert_eq!(report.succeeded.len(), 1);
    assert_eq!(report.cancelled.len(), 3);
    assert!(report.failed.is_empty());
}

#[test]
fn backoff_doubles_and_caps() {
    let policy = RetryPolicy {
        max_attempts : 10,
        base_delay : Duration::from_secs(2),
        max_delay : Duration::from_secs(30),
    };
    assert_eq!(policy.backoff(1), Duration::from_secs(2));
    assert_eq!(policy.backoff(2), Duration::from_secs(4));
    assert_eq!(policy.backoff(4), Duration::from_secs(16));
    assert_eq!(policy.backoff(5), Duration::from_secs(30));
    assert_eq!(policy.backoff(40), Duration::from_secs(30));
}

#[test]
fn empty_batch() {
    let dispatcher = Dispatcher::new(5, RetryPolicy::default(), Cancel::new());
    let report = dispatcher.run(Vec::<String>::new(), |_| Ok(Completion::Done)).unwrap();
    assert_eq!(report.total(), 0);
    assert!(report.is_complete());
}
