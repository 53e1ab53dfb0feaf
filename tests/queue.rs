//! Admission queue in front of `/api/`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use accel_proxy::resilience::queue::{Queue, QueueError};
use accel_proxy::Collaborators;
use axum::body::Body;
use axum::http::Request;
use bytes::Bytes;
use futures_util::{stream, StreamExt};
use tokio::sync::Notify;

mod common;

async fn wait_for_in_flight(queue: &Queue, n: usize) {
    while queue.in_flight() < n {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn two_busy_one_waiting_one_millisecond() {
    let queue = Queue::new("scenario", 2, 1, Duration::from_millis(1));

    let first = queue.acquire().await.unwrap();
    let second = queue.acquire().await.unwrap();

    let q = queue.clone();
    let third = tokio::spawn(async move {
        let start = Instant::now();
        let result = q.acquire().await.map(|_| ());
        (result, start.elapsed())
    });
    wait_for_in_flight(&queue, 3).await;

    // #1..#3 are outstanding: the wait list is full.
    assert_eq!(queue.acquire().await.unwrap_err(), QueueError::TooManyRequests);

    let (result, waited) = third.await.unwrap();
    assert_eq!(result, Err(QueueError::QueueingTimedOut));
    assert!(waited >= Duration::from_millis(1));
    assert_eq!(queue.in_flight(), 2);

    // After a release, a blocked acquire gets through.
    let relaxed = Queue::new("scenario-release", 2, 1, Duration::from_secs(5));
    let held = relaxed.acquire().await.unwrap();
    let _other = relaxed.acquire().await.unwrap();
    let q = relaxed.clone();
    let blocked = tokio::spawn(async move { q.acquire().await.map(|slot| slot.release()) });
    wait_for_in_flight(&relaxed, 3).await;
    held.release();
    assert_eq!(blocked.await.unwrap(), Ok(()));

    first.release();
    second.release();
    assert_eq!(queue.in_flight(), 0);
}

/// Control plane for the `/api/` tests.
///
/// - `/api/slow` answers once `release` is notified.
/// - `/api/stream` sends one chunk, then finishes once `release` is notified.
/// - Anything else answers at once.
fn control_plane(entered: Arc<Notify>, release: Arc<Notify>) -> axum::Router {
    axum::Router::new().fallback(move |req: Request<Body>| {
        let entered = Arc::clone(&entered);
        let release = Arc::clone(&release);
        async move {
            match req.uri().path() {
                "/api/slow" => {
                    entered.notify_one();
                    release.notified().await;
                    Body::from("done")
                }
                "/api/stream" => {
                    let head = stream::once(async {
                        Ok::<_, std::io::Error>(Bytes::from_static(b"first"))
                    });
                    let tail = stream::once(async move {
                        release.notified().await;
                        Ok::<_, std::io::Error>(Bytes::from_static(b" rest"))
                    });
                    Body::from_stream(head.chain(tail))
                }
                _ => Body::from("done"),
            }
        }
    })
}

async fn start(limit: usize) -> (common::TestProxy, Arc<Notify>, Arc<Notify>) {
    let entered = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let addr = common::start_control_plane(control_plane(entered.clone(), release.clone())).await;

    let mut config = common::config_for(addr);
    config.api_queue.limit = limit;
    config.api_queue.queue_limit = 0;
    config.api_queue.timeout_ms = 5_000;
    let proxy = common::start_proxy(config, Collaborators::new()).await;
    (proxy, entered, release)
}

/// Poll a fast API route until the queue admits it again.
async fn wait_until_admitted(client: &reqwest::Client, url: String) {
    for _ in 0..200 {
        let res = client.get(&url).send().await.unwrap();
        if res.status() != 429 {
            assert_eq!(res.status(), 200);
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("queue never freed its slot");
}

#[tokio::test]
async fn full_api_queue_answers_429() {
    let (proxy, entered, release) = start(1).await;
    let client = common::client();

    let first = tokio::spawn({
        let client = client.clone();
        let url = proxy.url("/api/slow");
        async move {
            let res = client.get(url).send().await.unwrap();
            (res.status(), res.text().await.unwrap())
        }
    });
    entered.notified().await;

    let rejected = client.get(proxy.url("/api/v4/users")).send().await.unwrap();
    assert_eq!(rejected.status(), 429);
    assert_eq!(rejected.text().await.unwrap(), "Too Many Requests\n");

    // Routes outside /api/ are not queued.
    let other = client.get(proxy.url("/group/project")).send().await.unwrap();
    assert_eq!(other.status(), 200);

    release.notify_one();
    let (status, body) = first.await.unwrap();
    assert_eq!(status, 200);
    assert_eq!(body, "done");

    wait_until_admitted(&client, proxy.url("/api/v4/users")).await;
}

#[tokio::test]
async fn slot_stays_taken_while_the_body_streams() {
    let (proxy, _entered, release) = start(1).await;
    let client = common::client();

    let mut streaming = client.get(proxy.url("/api/stream")).send().await.unwrap();
    assert_eq!(streaming.status(), 200);
    assert_eq!(streaming.chunk().await.unwrap().as_deref(), Some(&b"first"[..]));

    let rejected = client.get(proxy.url("/api/v4/users")).send().await.unwrap();
    assert_eq!(rejected.status(), 429);

    release.notify_one();
    let mut rest = Vec::new();
    while let Some(chunk) = streaming.chunk().await.unwrap() {
        rest.extend_from_slice(&chunk);
    }
    assert_eq!(rest, b" rest");

    wait_until_admitted(&client, proxy.url("/api/v4/users")).await;
}
