//! Concurrent request multiplexer
//!
//! `queue` registers work without blocking; `run` drives everything queued
//! to completion with at most `max_concurrency` requests in flight.
//!
//! # Architecture
//! - Each queued future is spawned on the tokio runtime when a slot frees up
//! - Finished requests hand their completion value back to the run loop,
//!   which passes it to the caller's handler
//! - Work queued while a run is in progress (typically by the handler, e.g.
//!   "convert then upload") joins the same run
//! - `run` returns once the queue is empty and nothing is in flight

use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

pub type PendingRequest<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

pub struct Multiplexer<T> {
    pending: Arc<Mutex<VecDeque<PendingRequest<T>>>>,
    max_concurrency: usize,
}

impl<T: Send + 'static> Multiplexer<T> {
    pub fn new(max_concurrency: usize) -> Self {
        Self {
            pending: Arc::new(Mutex::new(VecDeque::new())),
            max_concurrency: max_concurrency.max(1),
        }
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    pub fn queue<F>(&self, request: F)
    where
        F: Future<Output = T> + Send + 'static,
    {
        self.lock_pending().push_back(Box::pin(request));
    }

    /// Requests waiting for a slot
    pub fn pending(&self) -> usize {
        self.lock_pending().len()
    }

    fn lock_pending(&self) -> std::sync::MutexGuard<'_, VecDeque<PendingRequest<T>>> {
        // A poisoned queue only means a handler panicked mid-push; the deque is intact
        self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn next_pending(&self) -> Option<PendingRequest<T>> {
        self.lock_pending().pop_front()
    }

    /// Drain the queue, invoking `on_complete` for every finished request
    ///
    /// Returns the number of completions delivered.
    pub async fn run<F>(&self, mut on_complete: F) -> usize
    where
        F: FnMut(T),
    {
        let mut in_flight = FuturesUnordered::new();
        let mut completed = 0usize;

        loop {
            while in_flight.len() < self.max_concurrency {
                match self.next_pending() {
                    Some(request) => in_flight.push(tokio::spawn(request)),
                    None => break,
                }
            }

            match in_flight.next().await {
                Some(Ok(completion)) => {
                    completed += 1;
                    on_complete(completion);
                }
                Some(Err(e)) => {
                    tracing::error!(error = %e, "Queued request task failed before completing");
                }
                None => break,
            }
        }

        tracing::debug!(completed, "Multiplexer run drained");
        completed
    }
}
