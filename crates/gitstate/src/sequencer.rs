//! Explicit concurrency combinators.
//!
//! These replace decorator-style method wrapping: a [`Sequencer`] chains
//! calls per logical key (e.g. per repository path), and a [`Throttle`]
//! caps how often a recurring action may run.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Serializes async calls per logical key.
///
/// Calls with the same key run one after another in arrival order; calls
/// with different keys do not block each other.
pub struct Sequencer<K> {
    locks: Mutex<HashMap<K, Arc<tokio::sync::Mutex<()>>>>,
}

impl<K: Eq + Hash + Clone> Sequencer<K> {
    /// Creates an empty sequencer.
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Runs `task` once every earlier call with the same key has finished.
    pub async fn enqueue<F, Fut, T>(&self, key: K, task: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let lock = {
            let mut locks = self.locks.lock().expect("sequencer lock poisoned");
            Arc::clone(
                locks
                    .entry(key)
                    .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))),
            )
        };
        let _guard = lock.lock().await;
        task().await
    }
}

impl<K: Eq + Hash + Clone> Default for Sequencer<K> {
    fn default() -> Self {
        Self::new()
    }
}

/// Caps how often an action runs.
#[derive(Debug)]
pub struct Throttle {
    min_interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl Throttle {
    /// Creates a throttle with the given minimum interval between runs.
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last: Mutex::new(None),
        }
    }

    /// Returns true when enough time has passed since the last allowed
    /// run, recording this run when it does.
    pub fn allow(&self) -> bool {
        let mut last = self.last.lock().expect("throttle lock poisoned");
        match *last {
            Some(at) if at.elapsed() < self.min_interval => false,
            _ => {
                *last = Some(Instant::now());
                true
            }
        }
    }
}
