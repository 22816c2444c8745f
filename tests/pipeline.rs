//! Pipeline behavior tests against in-memory executors.

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderValue, StatusCode};
use requester::{
    Api, CompletionStrategy, DataResult, Decision, Endpoint, Executor, ExecutorResponse,
    LoggingPlugin, ParsedResponse, Plugin, Requester, RequesterBuilder, ServiceError, StubResponse,
    StubStrategy, TransportError, TransportRequest,
};
use serde::Deserialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Debug, Deserialize, PartialEq)]
struct Item {
    id: u32,
}

struct ItemApi;

impl Api for ItemApi {
    fn endpoint(&self) -> Endpoint {
        Endpoint::path("/items/1")
    }
}

struct PlaceholderApi;

impl Api for PlaceholderApi {
    fn endpoint(&self) -> Endpoint {
        Endpoint::path("/items/placeholder")
    }

    fn placeholder_data(&self) -> Option<Bytes> {
        Some(Bytes::from_static(br#"{"id":99}"#))
    }
}

/// Replies from a script, then repeats the last reply. Records every request.
#[derive(Clone, Default)]
struct ScriptedExecutor {
    replies: Arc<Mutex<VecDeque<(u16, &'static str)>>>,
    sent: Arc<Mutex<Vec<TransportRequest>>>,
}

impl ScriptedExecutor {
    fn new(replies: &[(u16, &'static str)]) -> Self {
        Self {
            replies: Arc::new(Mutex::new(replies.iter().copied().collect())),
            sent: Arc::default(),
        }
    }

    fn calls(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl Executor for ScriptedExecutor {
    async fn execute(&self, request: TransportRequest) -> ExecutorResponse {
        self.sent.lock().unwrap().push(request);
        let mut replies = self.replies.lock().unwrap();
        let (status, body) = if replies.len() > 1 {
            replies.pop_front().unwrap()
        } else {
            *replies.front().unwrap()
        };
        ExecutorResponse::completed(StatusCode::from_u16(status).unwrap(), body)
    }
}

/// Never completes; flags when its future is dropped.
#[derive(Clone, Default)]
struct HangingExecutor {
    calls: Arc<AtomicUsize>,
    dropped: Arc<AtomicBool>,
}

struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl Executor for HangingExecutor {
    async fn execute(&self, _request: TransportRequest) -> ExecutorResponse {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call == 0 {
            return ExecutorResponse::completed(StatusCode::SERVICE_UNAVAILABLE, "");
        }
        let _flag = DropFlag(self.dropped.clone());
        tokio::time::sleep(Duration::from_secs(30)).await;
        ExecutorResponse::completed(StatusCode::OK, r#"{"id":1}"#)
    }
}

/// Retries a 503 once.
struct RetryOnce503;

#[async_trait]
impl CompletionStrategy for RetryOnce503 {
    async fn decide(&self, result: &DataResult, _api: &dyn Api, attempt: usize) -> Decision {
        match result {
            Ok(response) if response.status == StatusCode::SERVICE_UNAVAILABLE && attempt == 1 => {
                Decision::Retry
            }
            _ => Decision::Proceed,
        }
    }
}

struct AddHeader(&'static str, &'static str);

impl Plugin for AddHeader {
    fn mutate_request(&self, mut request: TransportRequest, _api: &dyn Api) -> TransportRequest {
        request
            .headers
            .insert(self.0, HeaderValue::from_static(self.1));
        request
    }
}

fn builder_with(executor: impl Executor) -> RequesterBuilder {
    Requester::builder()
        .base_url("https://api.example.com")
        .unwrap()
        .executor(executor)
}

#[tokio::test]
async fn test_plugins_mutate_in_registration_order() {
    struct RequireHeader;
    impl Plugin for RequireHeader {
        fn mutate_request(&self, mut request: TransportRequest, _api: &dyn Api) -> TransportRequest {
            // Sees the first plugin's output.
            let seen = request.headers.contains_key("x-first");
            request
                .headers
                .insert("x-second", HeaderValue::from_static(if seen { "after-first" } else { "alone" }));
            request
        }
    }

    let executor = ScriptedExecutor::new(&[(200, r#"{"id":1}"#)]);
    let requester = builder_with(executor.clone())
        .plugin(AddHeader("x-first", "1"))
        .plugin(RequireHeader)
        .build()
        .unwrap();

    requester.send::<_, Item>(ItemApi).await.unwrap();

    let sent = executor.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].headers.get("x-first").unwrap(), "1");
    assert_eq!(sent[0].headers.get("x-second").unwrap(), "after-first");
}

#[tokio::test]
async fn test_placeholder_skips_executor() {
    let executor = ScriptedExecutor::new(&[(500, "")]);
    let requester = builder_with(executor.clone()).build().unwrap();

    let raw = requester.send_raw(PlaceholderApi).await.unwrap();
    assert_eq!(raw.status, StatusCode::OK);
    assert_eq!(&raw.body[..], br#"{"id":99}"#);

    let parsed = requester.send::<_, Item>(PlaceholderApi).await.unwrap();
    assert_eq!(parsed.data, Item { id: 99 });
    assert_eq!(executor.calls(), 0);
}

#[tokio::test]
async fn test_stub_takes_precedence_over_placeholder() {
    let executor = ScriptedExecutor::new(&[(500, "")]);
    let requester = builder_with(executor.clone())
        .stub_strategy(StubStrategy::immediate(
            |_req: &TransportRequest, _api: &dyn Api| StubResponse::network(StatusCode::ACCEPTED, r#"{"id":5}"#),
        ))
        .build()
        .unwrap();

    let parsed = requester.send::<_, Item>(PlaceholderApi).await.unwrap();
    assert_eq!(parsed.data, Item { id: 5 });
    assert_eq!(parsed.response.status, StatusCode::ACCEPTED);
    assert_eq!(executor.calls(), 0);
}

#[tokio::test]
async fn test_stub_continue_and_error() {
    let executor = ScriptedExecutor::new(&[(200, r#"{"id":3}"#)]);
    let requester = builder_with(executor.clone())
        .stub_strategy(StubStrategy::immediate(
            |request: &TransportRequest, _api: &dyn Api| {
                if request.url.path().ends_with("placeholder") {
                    StubResponse::Error(TransportError::Connection("offline".into()))
                } else {
                    StubResponse::Continue
                }
            },
        ))
        .build()
        .unwrap();

    let parsed = requester.send::<_, Item>(ItemApi).await.unwrap();
    assert_eq!(parsed.data, Item { id: 3 });
    assert_eq!(executor.calls(), 1);

    match requester.send_raw(PlaceholderApi).await {
        Err(ServiceError::Transport { error, response }) => {
            assert_eq!(error, TransportError::Connection("offline".into()));
            assert!(response.is_none());
        }
        other => panic!("Expected Transport error, got {:?}", other),
    }
    assert_eq!(executor.calls(), 1);
}

#[tokio::test]
async fn test_cancel_during_stub_delay_suppresses_completion() {
    let fired = Arc::new(AtomicBool::new(false));
    let requester = builder_with(ScriptedExecutor::new(&[(200, r#"{"id":1}"#)]))
        .stub_strategy(StubStrategy::delayed(
            Duration::from_millis(200),
            |_req: &TransportRequest, _api: &dyn Api| StubResponse::network(StatusCode::OK, r#"{"id":1}"#),
        ))
        .build()
        .unwrap();

    let fired_clone = fired.clone();
    let handle = requester.request(ItemApi, move |_result: Result<ParsedResponse<Item>, ServiceError>| {
        fired_clone.store(true, Ordering::SeqCst);
    });

    tokio::time::sleep(Duration::from_millis(20)).await;
    handle.cancel();
    tokio::time::sleep(Duration::from_millis(400)).await;

    assert!(handle.is_cancelled());
    assert!(!fired.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_delayed_stub_completes_when_not_cancelled() {
    let requester = builder_with(ScriptedExecutor::new(&[(500, "")]))
        .stub_strategy(StubStrategy::delayed(
            Duration::from_millis(20),
            |_req: &TransportRequest, _api: &dyn Api| StubResponse::network(StatusCode::OK, r#"{"id":8}"#),
        ))
        .build()
        .unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    requester.request(ItemApi, move |result: Result<ParsedResponse<Item>, ServiceError>| {
        let _ = tx.send(result.map(|r| r.data));
    });

    let result = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(result.unwrap(), Item { id: 8 });
}

#[tokio::test]
async fn test_retry_once_on_503() {
    let executor = ScriptedExecutor::new(&[(503, "busy"), (200, r#"{"id":2}"#)]);
    let sends = Arc::new(AtomicUsize::new(0));

    struct CountSends(Arc<AtomicUsize>);
    impl Plugin for CountSends {
        fn will_send(&self, _request: &TransportRequest, _api: &dyn Api) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    let requester = builder_with(executor.clone())
        .plugin(CountSends(sends.clone()))
        .completion_strategy(RetryOnce503)
        .build()
        .unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    requester.request(ItemApi, move |result: Result<ParsedResponse<Item>, ServiceError>| {
        let _ = tx.send(result);
    });

    let first = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(first.data, Item { id: 2 });
    assert_eq!(first.attempts, 2);

    // The completion is FnOnce and the sender is dropped with it.
    assert!(rx.recv().await.is_none());
    assert_eq!(executor.calls(), 2);
    assert_eq!(sends.load(Ordering::SeqCst), 2);

    // Both attempts sent the same built request.
    let sent = executor.sent.lock().unwrap();
    assert_eq!(sent[0], sent[1]);
}

#[tokio::test]
async fn test_cancel_reaches_retried_attempt() {
    let executor = HangingExecutor::default();
    let requester = builder_with(executor.clone())
        .completion_strategy(RetryOnce503)
        .build()
        .unwrap();

    let fired = Arc::new(AtomicBool::new(false));
    let fired_clone = fired.clone();
    let handle = requester.request_raw(ItemApi, move |_result| {
        fired_clone.store(true, Ordering::SeqCst);
    });

    // Wait until the retried attempt is in flight.
    tokio::time::timeout(Duration::from_secs(2), async {
        while executor.calls.load(Ordering::SeqCst) < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    handle.cancel();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(executor.dropped.load(Ordering::SeqCst));
    assert!(!fired.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_cancel_after_completion_is_noop() {
    let requester = builder_with(ScriptedExecutor::new(&[(200, r#"{"id":1}"#)]))
        .build()
        .unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let handle = requester.request_raw(ItemApi, move |result| {
        let _ = tx.send(result.is_ok());
    });

    assert_eq!(rx.recv().await, Some(true));
    handle.cancel();
    assert_eq!(rx.recv().await, None);
}

#[tokio::test]
async fn test_resolution_error_is_terminal() {
    struct Unresolvable;
    impl Api for Unresolvable {
        fn endpoint(&self) -> Endpoint {
            Endpoint::relation("missing")
        }
    }

    let executor = ScriptedExecutor::new(&[(200, "{}")]);
    let requester = builder_with(executor.clone())
        .completion_strategy(RetryOnce503)
        .build()
        .unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    requester.request(Unresolvable, move |result: Result<ParsedResponse<Item>, ServiceError>| {
        let _ = tx.send(result);
    });

    match rx.recv().await {
        Some(Err(ServiceError::Resolution(_))) => {}
        other => panic!("Expected Resolution error, got {:?}", other),
    }
    assert_eq!(executor.calls(), 0);
}

#[tokio::test]
async fn test_mutated_result_reaches_completion_strategy() {
    /// Turns 503s into transport errors.
    struct UnavailableAsTransport;
    impl Plugin for UnavailableAsTransport {
        fn mutate_result(&self, result: DataResult, _api: &dyn Api) -> DataResult {
            match result {
                Ok(response) if response.status == StatusCode::SERVICE_UNAVAILABLE => {
                    Err(ServiceError::Transport {
                        error: TransportError::Other("unavailable".into()),
                        response: Some(Box::new(response)),
                    })
                }
                other => other,
            }
        }
    }

    let executor = ScriptedExecutor::new(&[(503, "busy")]);
    let requester = builder_with(executor.clone())
        .plugin(UnavailableAsTransport)
        .completion_strategy(RetryOnce503)
        .build()
        .unwrap();

    // RetryOnce503 only matches successful 503s, which the plugin removed.
    match requester.send_raw(ItemApi).await {
        Err(ServiceError::Transport { error, response }) => {
            assert_eq!(error, TransportError::Other("unavailable".into()));
            assert_eq!(response.unwrap().text(), "busy");
        }
        other => panic!("Expected Transport error, got {:?}", other),
    }
    assert_eq!(executor.calls(), 1);
}

#[tokio::test]
async fn test_concurrent_requests_do_not_interfere() {
    let executor = ScriptedExecutor::new(&[(200, r#"{"id":4}"#)]);
    let requester = builder_with(executor.clone()).build().unwrap();

    let results = futures_join(&requester).await;
    assert!(results.iter().all(|r| r.as_ref().map(|p| p.data.id) == Ok(4)));
    assert_eq!(executor.calls(), 8);
}

async fn futures_join(requester: &Requester) -> Vec<Result<ParsedResponse<Item>, String>> {
    let mut tasks = Vec::new();
    for _ in 0..8 {
        let requester = requester.clone();
        tasks.push(tokio::spawn(async move {
            requester
                .send::<_, Item>(ItemApi)
                .await
                .map_err(|e| e.to_string())
        }));
    }

    let mut results = Vec::new();
    for task in tasks {
        results.push(task.await.unwrap());
    }
    results
}

/// Sleeps for the milliseconds named by the last path segment.
struct SleepingExecutor;

#[async_trait]
impl Executor for SleepingExecutor {
    async fn execute(&self, request: TransportRequest) -> ExecutorResponse {
        let millis = request
            .url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .and_then(|last| last.parse().ok())
            .unwrap_or(0);
        tokio::time::sleep(Duration::from_millis(millis)).await;
        ExecutorResponse::completed(StatusCode::OK, r#"{"id":1}"#)
    }
}

struct SlowApi;

impl Api for SlowApi {
    fn endpoint(&self) -> Endpoint {
        Endpoint::path("/sleep/200")
    }
}

struct FastApi;

impl Api for FastApi {
    fn endpoint(&self) -> Endpoint {
        Endpoint::path("/sleep/0")
    }
}

#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl std::io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl CapturedLogs {
    fn attempt_latencies(&self, api: &str) -> Vec<u64> {
        let text = String::from_utf8(self.0.lock().unwrap().clone()).unwrap();
        text.lines()
            .filter(|line| line.contains("Attempt completed") && line.contains(api))
            .filter_map(|line| {
                line.split("latency_ms=")
                    .nth(1)?
                    .split_whitespace()
                    .next()?
                    .parse()
                    .ok()
            })
            .collect()
    }
}

#[tokio::test]
async fn test_overlapping_requests_report_their_own_latency() {
    let logs = CapturedLogs::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let requester = builder_with(SleepingExecutor)
        .plugin(LoggingPlugin::new())
        .build()
        .unwrap();

    // The fast request starts and finishes while the slow one is in flight.
    let (slow, fast) = tokio::join!(requester.send::<_, Item>(SlowApi), async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        requester.send::<_, Item>(FastApi).await
    });
    let (slow, fast) = (slow.unwrap(), fast.unwrap());

    assert!(slow.latency >= Duration::from_millis(200));
    assert!(fast.latency < Duration::from_millis(150));

    let slow_logged = logs.attempt_latencies("SlowApi");
    let fast_logged = logs.attempt_latencies("FastApi");
    assert_eq!(slow_logged.len(), 1);
    assert_eq!(fast_logged.len(), 1);
    assert!(slow_logged[0] >= 200, "slow attempt logged {}ms", slow_logged[0]);
    assert!(fast_logged[0] < 150, "fast attempt logged {}ms", fast_logged[0]);
}
