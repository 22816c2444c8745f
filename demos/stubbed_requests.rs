//! Demonstrates the request pipeline against stubbed responses.
//!
//! This example shows how to:
//! - Describe endpoints with the `Api` trait
//! - Attach logging and header plugins
//! - Serve canned responses with a delayed stub
//! - Retry a flaky endpoint with a `RetryPolicy`
//! - Cancel an in-flight request
//!
//! Run with: `cargo run --example stubbed_requests`

use http::StatusCode;
use requester::retry::RetryOnStatus;
use requester::{
    Api, Endpoint, HeaderPlugin, LoggingPlugin, ParsedResponse, Requester, RetryPolicy,
    RetryStrategy, ServiceError, StubResponse, StubStrategy, TransportRequest,
};
use serde::Deserialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct Post {
    id: u64,
    title: String,
}

enum Posts {
    Get(u64),
    Flaky,
}

impl Api for Posts {
    fn endpoint(&self) -> Endpoint {
        match self {
            Posts::Get(id) => Endpoint::path(format!("/posts/{}", id)),
            Posts::Flaky => Endpoint::path("/posts/flaky"),
        }
    }

    fn name(&self) -> String {
        match self {
            Posts::Get(_) => "posts.get".to_string(),
            Posts::Flaky => "posts.flaky".to_string(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), ServiceError> {
    tracing_subscriber::fmt()
        .with_env_filter("requester=debug,stubbed_requests=info")
        .init();

    let flaky_calls = Arc::new(AtomicUsize::new(0));
    let counter = flaky_calls.clone();

    let requester = Requester::builder()
        .base_url("https://jsonplaceholder.typicode.com")?
        .plugin(HeaderPlugin::new().with_header("x-demo", "stubbed")?)
        .plugin(LoggingPlugin::new())
        .stub_strategy(StubStrategy::delayed(
            Duration::from_millis(100),
            move |request: &TransportRequest, _api: &dyn Api| {
                if request.url.path().ends_with("flaky")
                    && counter.fetch_add(1, Ordering::SeqCst) == 0
                {
                    return StubResponse::network(StatusCode::SERVICE_UNAVAILABLE, "try again");
                }
                StubResponse::network(StatusCode::OK, r#"{"id":1,"title":"stubbed post"}"#)
            },
        ))
        .completion_strategy(
            RetryPolicy::new(RetryStrategy::Linear {
                delay: Duration::from_millis(50),
                max_retries: 2,
            })
            .with_predicate(RetryOnStatus::new([StatusCode::SERVICE_UNAVAILABLE])),
        )
        .build()?;

    println!("=== Example 1: Async request ===");
    let post = requester.send::<_, Post>(Posts::Get(1)).await?;
    println!("Post {}: {}", post.data.id, post.data.title);
    println!();

    println!("=== Example 2: Retried request ===");
    let post = requester.send::<_, Post>(Posts::Flaky).await?;
    println!("Succeeded after {} attempts", post.attempts);
    println!();

    println!("=== Example 3: Cancelled request ===");
    let handle = requester.request(
        Posts::Get(2),
        |result: Result<ParsedResponse<Post>, ServiceError>| {
            println!("Never printed: {:?}", result.map(|p| p.data));
        },
    );
    handle.cancel();
    tokio::time::sleep(Duration::from_millis(200)).await;
    println!("Cancelled: {}", handle.is_cancelled());

    Ok(())
}
