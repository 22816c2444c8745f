//! # Requester - a typed request pipeline for HTTP APIs
//!
//! Requester turns caller-defined API descriptions into typed results. Every
//! request goes through the same pipeline:
//!
//! 1. resolve the [`Api`] into an [`ApiTarget`] (base URL, service discovery)
//! 2. build a [`TransportRequest`] with the API's parameter encoding
//! 3. run the [`Plugin`] chain's request hooks
//! 4. execute it: placeholder data, a stub, or the real [`Executor`]
//! 5. [`classify`] the raw outcome and run the plugin chain's result hooks
//! 6. ask the [`CompletionStrategy`] whether to proceed or retry
//! 7. decode the payload with the API's [`Parser`]
//!
//! ## Quick Start
//!
//! ```no_run
//! use requester::{Api, Endpoint, ParsedResponse, Requester, RetryPolicy, RetryStrategy, ServiceError};
//! use serde::Deserialize;
//! use std::time::Duration;
//!
//! #[derive(Deserialize)]
//! struct User {
//!     id: u64,
//!     name: String,
//! }
//!
//! struct GetUser(u64);
//!
//! impl Api for GetUser {
//!     fn endpoint(&self) -> Endpoint {
//!         Endpoint::path(format!("/users/{}", self.0))
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), ServiceError> {
//!     let client = Requester::builder()
//!         .base_url("https://api.example.com")?
//!         .timeout(Duration::from_secs(30))
//!         .completion_strategy(RetryPolicy::new(RetryStrategy::Linear {
//!             delay: Duration::from_millis(200),
//!             max_retries: 2,
//!         }))
//!         .build()?;
//!
//!     // Async style
//!     let user = client.send::<_, User>(GetUser(123)).await?;
//!     println!("User: {} ({} attempts)", user.data.name, user.attempts);
//!
//!     // Callback style, with a handle that cancels whichever attempt is in flight
//!     let handle = client.request(GetUser(7), |result: Result<ParsedResponse<User>, ServiceError>| {
//!         if let Ok(user) = result {
//!             println!("User: {}", user.data.id);
//!         }
//!     });
//!     handle.cancel();
//!     Ok(())
//! }
//! ```
//!
//! ## Error Handling
//!
//! Every failure is a [`ServiceError`] value carrying the best response
//! context available:
//!
//! ```no_run
//! # use requester::{Api, Endpoint, Requester, ServiceError};
//! # struct Health;
//! # impl Api for Health { fn endpoint(&self) -> Endpoint { Endpoint::path("/health") } }
//! # async fn example(requester: Requester) {
//! match requester.send::<_, serde_json::Value>(Health).await {
//!     Ok(response) => println!("Success: {:?}", response.data),
//!     Err(ServiceError::Api { body, response }) => {
//!         eprintln!("Server reported {} with status {}", body, response.status);
//!     }
//!     Err(ServiceError::Parsing { message, response }) => {
//!         eprintln!("Could not parse {}: {}", response.text(), message);
//!     }
//!     Err(ServiceError::Transport { error, .. }) => eprintln!("Transport failed: {}", error),
//!     Err(e) => eprintln!("Other error: {}", e),
//! }
//! # }
//! ```

mod api;
mod cancel;
mod classify;
pub mod completion;
mod error;
mod executor;
mod parser;
mod plugin;
pub mod rate_limit;
mod request;
mod requester;
mod response;
pub mod retry;
mod stub;
mod target;

pub use api::{Api, Endpoint, ParameterEncoding, Parameters};
pub use cancel::CancelHandle;
pub use classify::{classify, DataResult};
pub use completion::{AlwaysProceed, CompletionStrategy, Decision, RetryPolicy};
pub use error::{Result, ServiceError};
pub use executor::{Executor, ExecutorResponse, ReqwestExecutor, TransportError};
pub use parser::{
    decode, EnvelopeParser, JsonParser, Parser, ParserFactory, ParsingOutcome, SharedParser,
};
pub use plugin::{HeaderPlugin, LoggingPlugin, Plugin, PluginChain};
pub use request::{build_request, TransportRequest};
pub use requester::{Requester, RequesterBuilder};
pub use response::{DataResponse, ParsedResponse};
pub use retry::{RetryPredicate, RetryStrategy};
pub use stub::{StubProvider, StubResponse, StubStrategy};
pub use target::{ApiTarget, ServiceDiscovery, StaticDiscovery, TargetResolver};
