//! Mock transport for unit/integration testing

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use crate::{ApiRequest, ApiResponse, ApiTransport, TransportResult};

type Reply = TransportResult<ApiResponse>;

/// Scripted transport
///
/// Each path has a queue of one-shot replies and an optional sticky default
/// used once the queue is empty. Unrouted paths answer 404.
#[derive(Default)]
pub struct MockTransport {
    queued: Mutex<HashMap<String, VecDeque<Reply>>>,
    defaults: Mutex<HashMap<String, Reply>>,
    calls: Mutex<Vec<ApiRequest>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    delay: Mutex<Option<Duration>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a one-shot reply for `path`
    pub fn push(&self, path: &str, reply: Reply) {
        lock(&self.queued)
            .entry(path.to_string())
            .or_default()
            .push_back(reply);
    }

    /// Queue a 200 reply with a JSON body
    pub fn push_ok(&self, path: &str, body: Value) {
        self.push(path, Ok(ApiResponse::ok(body)));
    }

    /// Queue a bare status reply
    pub fn push_status(&self, path: &str, status: u16) {
        self.push(path, Ok(ApiResponse::status(status)));
    }

    /// Reply used for `path` whenever its queue is empty
    pub fn set_default(&self, path: &str, reply: Reply) {
        lock(&self.defaults).insert(path.to_string(), reply);
    }

    pub fn set_default_ok(&self, path: &str, body: Value) {
        self.set_default(path, Ok(ApiResponse::ok(body)));
    }

    /// Hold every call open for `delay` before answering
    pub fn set_delay(&self, delay: Option<Duration>) {
        *lock(&self.delay) = delay;
    }

    /// Every request seen so far, in order
    pub fn calls(&self) -> Vec<ApiRequest> {
        lock(&self.calls).clone()
    }

    /// Number of requests made to `path`
    pub fn calls_to(&self, path: &str) -> usize {
        lock(&self.calls).iter().filter(|r| r.path == path).count()
    }

    /// Highest number of calls that were open at the same time
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn next_reply(&self, path: &str) -> Reply {
        if let Some(reply) = lock(&self.queued).get_mut(path).and_then(VecDeque::pop_front) {
            return reply;
        }
        lock(&self.defaults)
            .get(path)
            .cloned()
            .unwrap_or_else(|| Ok(ApiResponse::status(404)))
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ApiTransport for MockTransport {
    async fn call(&self, request: ApiRequest) -> TransportResult<ApiResponse> {
        let path = request.path.clone();
        lock(&self.calls).push(request);

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        let delay = *lock(&self.delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.next_reply(&path)
    }
}
