//! Admission queue for expensive routes.
//!
//! A queue admits at most `limit` concurrent requests ("busy") and lets at
//! most `queue_limit` more wait for a busy slot. A request that cannot even
//! join the wait list is rejected immediately; one that waits longer than
//! the queue timeout is rejected when the timer fires.
//!
//! ```text
//! acquire:  wait slot? ── no ──▶ TooManyRequests (429)
//!               │ yes
//!           busy slot? ── yes ─▶ admitted
//!               │ no
//!           wait ≤ timeout ── expired ──▶ QueueingTimedOut (503)
//!               │ slot freed
//!               ▼
//!           admitted
//! ```
//!
//! Both stages are `tokio::sync::Semaphore`s; there is no other shared state.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::StatusCode;
use axum::response::Response;
use http_body_util::BodyExt;
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::handler::{handler_fn, BoxHandler};
use crate::http::response;
use crate::observability::metrics;

/// Reasons a request was not admitted.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    /// The wait list is full.
    #[error("too many requests queued")]
    TooManyRequests,

    /// No busy slot freed up before the queue timeout.
    #[error("queueing timed out")]
    QueueingTimedOut,

    /// The queue's semaphores were closed.
    #[error("queue closed")]
    Closed,
}

impl QueueError {
    fn metric_reason(&self) -> &'static str {
        match self {
            QueueError::TooManyRequests => "too_many_requests",
            QueueError::QueueingTimedOut => "queueing_timedout",
            QueueError::Closed => "closed",
        }
    }
}

#[derive(Debug)]
struct Inner {
    name: String,
    limit: usize,
    queue_limit: usize,
    timeout: Duration,
    busy: Arc<Semaphore>,
    waiting: Arc<Semaphore>,
}

impl Inner {
    fn in_flight(&self) -> usize {
        self.limit + self.queue_limit - self.waiting.available_permits()
    }

    fn busy(&self) -> usize {
        self.limit - self.busy.available_permits()
    }

    fn publish_occupancy(&self) {
        let busy = self.busy();
        metrics::record_queue_occupancy(&self.name, busy, self.in_flight().saturating_sub(busy));
    }
}

/// A named admission queue. Cheap to clone; clones share slots.
#[derive(Debug, Clone)]
pub struct Queue {
    inner: Arc<Inner>,
}

impl Queue {
    /// Queue with `limit` busy slots and room for `queue_limit` waiters.
    pub fn new(name: impl Into<String>, limit: usize, queue_limit: usize, timeout: Duration) -> Self {
        let name = name.into();
        metrics::record_queue_config(&name, limit, queue_limit, timeout);
        let inner = Inner {
            name,
            limit,
            queue_limit,
            timeout,
            busy: Arc::new(Semaphore::new(limit)),
            waiting: Arc::new(Semaphore::new(limit + queue_limit)),
        };
        inner.publish_occupancy();
        Self {
            inner: Arc::new(inner),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Requests currently holding a busy slot.
    pub fn busy(&self) -> usize {
        self.inner.busy()
    }

    /// Requests admitted to the queue, busy or still waiting.
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight()
    }

    /// Try to get a busy slot.
    ///
    /// Dropping the returned future while it waits gives the wait slot back.
    pub async fn acquire(&self) -> Result<QueueSlot, QueueError> {
        let inner = &self.inner;

        let waiting = match inner.waiting.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => return Err(self.reject(QueueError::TooManyRequests)),
        };
        inner.publish_occupancy();

        let start = Instant::now();
        let busy = match inner.busy.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                match tokio::time::timeout(inner.timeout, inner.busy.clone().acquire_owned()).await {
                    Ok(Ok(permit)) => permit,
                    Ok(Err(_)) => {
                        drop(waiting);
                        return Err(self.reject(QueueError::Closed));
                    }
                    Err(_) => {
                        drop(waiting);
                        return Err(self.reject(QueueError::QueueingTimedOut));
                    }
                }
            }
        };

        metrics::record_queue_wait(&inner.name, start.elapsed());
        inner.publish_occupancy();
        Ok(QueueSlot {
            queue: Arc::clone(inner),
            waiting: Some(waiting),
            busy: Some(busy),
        })
    }

    fn reject(&self, err: QueueError) -> QueueError {
        metrics::record_queue_error(&self.inner.name, err.metric_reason());
        self.inner.publish_occupancy();
        err
    }
}

/// An admitted request's hold on the queue. Released on drop.
#[derive(Debug)]
pub struct QueueSlot {
    queue: Arc<Inner>,
    waiting: Option<OwnedSemaphorePermit>,
    busy: Option<OwnedSemaphorePermit>,
}

impl QueueSlot {
    /// Give the slot back, waking one waiter.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for QueueSlot {
    fn drop(&mut self) {
        // Wait slot first, then the busy slot.
        drop(self.waiting.take());
        drop(self.busy.take());
        self.queue.publish_occupancy();
    }
}

/// Wrap `handler` so it only runs once admitted by a queue named `name`.
///
/// The slot is held until the response body is finished. A `limit` of zero
/// disables queueing and returns `handler` unchanged.
pub fn queue_requests(
    name: &str,
    handler: BoxHandler,
    limit: usize,
    queue_limit: usize,
    timeout: Duration,
) -> BoxHandler {
    if limit == 0 {
        return handler;
    }

    let queue = Queue::new(name, limit, queue_limit, timeout);
    tracing::info!(
        queue = name,
        limit,
        queue_limit,
        timeout_ms = timeout.as_millis() as u64,
        "Admission queue enabled"
    );

    handler_fn(move |req| {
        let queue = queue.clone();
        let handler = handler.clone();
        async move {
            let slot = match queue.acquire().await {
                Ok(slot) => slot,
                Err(QueueError::TooManyRequests) => {
                    tracing::warn!(queue = queue.name(), "Queue full, rejecting request");
                    return response::text(StatusCode::TOO_MANY_REQUESTS, "Too Many Requests");
                }
                Err(QueueError::QueueingTimedOut) => {
                    tracing::warn!(queue = queue.name(), "Queueing timed out, rejecting request");
                    return response::text(StatusCode::SERVICE_UNAVAILABLE, "Service Unavailable");
                }
                Err(e) => {
                    tracing::error!(queue = queue.name(), error = %e, "Queue failure");
                    return response::text(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "Internal Server Error",
                    );
                }
            };
            hold_until_body_done(handler(req).await, slot)
        }
    })
}

/// Tie `slot` to the response body, so the slot is released once the body
/// has been sent or dropped rather than when the head is ready.
fn hold_until_body_done(response: Response, slot: QueueSlot) -> Response {
    let (parts, body) = response.into_parts();
    let body = body.map_frame(move |frame| {
        let _held = &slot;
        frame
    });
    Response::from_parts(parts, Body::new(body))
}
