//! # httpcall - An HTTP request execution engine
//!
//! httpcall issues outbound HTTP requests through a fluent builder, pools the
//! underlying `reqwest` clients, and returns a uniform [`CallResult`] for any
//! payload type. Sends never return `Err`: transport failures, error statuses,
//! timeouts, cancellation and decode failures all land in [`CallResult::error`],
//! enriched with diagnostic context and routed through logging hooks.
//!
//! ## Quick Start
//!
//! ```no_run
//! use httpcall::Request;
//! use serde::{Deserialize, Serialize};
//! use std::time::Duration;
//!
//! #[derive(Serialize)]
//! struct CreateUser {
//!     name: String,
//!     email: String,
//! }
//!
//! #[derive(Deserialize, Default)]
//! struct User {
//!     id: u64,
//!     name: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), httpcall::Error> {
//!     // GET with a JSON handler
//!     let result = Request::new("https://api.example.com/users/123")
//!         .timeout(Duration::from_secs(10))
//!         .expect_json::<User>()
//!         .get()
//!         .await;
//!
//!     if let Some(user) = &result.data {
//!         println!("User: {} (took {:?})", user.name, result.latency);
//!     }
//!
//!     // POST a JSON body; only body serialization can fail up front
//!     let created = Request::new("https://api.example.com/users")
//!         .send_json(&CreateUser {
//!             name: "Alice".to_string(),
//!             email: "alice@example.com".to_string(),
//!         })?
//!         .expect_json::<User>()
//!         .post()
//!         .await;
//!
//!     println!("created: {}", created.success);
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **Typed handlers** - bool, string, bytes, JSON and protobuf decoders, or your own
//! - **Non-failing sends** - every outcome is a [`CallResult`] with an [`ErrorKind`] to branch on
//! - **Client pooling** - clients are shared per timeout and proxy
//! - **Streaming** - unbuffered requests hand the live body to the handler
//! - **Cancellation** - a [`CancellationToken`] aborts in-flight sends, distinct from timeouts
//! - **Hooks** - before-send and exception hooks on [`Settings`], pre-log hooks per request
//! - **Logging** - structured events with `tracing`
//!
//! ## Error Handling
//!
//! ```no_run
//! use httpcall::{ErrorKind, Request};
//! use http::StatusCode;
//!
//! # async fn example() {
//! let result = Request::new("https://api.example.com/maybe")
//!     .ignore_status(StatusCode::NOT_FOUND)
//!     .expect_string()
//!     .get()
//!     .await;
//!
//! match result.error.as_ref().map(|e| e.kind()) {
//!     None => println!("body: {}", result.data.unwrap_or_default()),
//!     Some(ErrorKind::NonSuccessStatus) => println!("status {:?}", result.status_code()),
//!     Some(ErrorKind::TimedOut) => println!("timed out"),
//!     Some(kind) => println!("failed: {:?}", kind),
//! }
//! # }
//! ```
//!
//! ## Settings
//!
//! Requests resolve [`Settings::current`] unless built with
//! [`Request::with_settings`]:
//!
//! ```
//! use httpcall::Settings;
//! use std::sync::Arc;
//!
//! let settings = Settings::builder()
//!     .user_agent("inventory-service/2.1")
//!     .on_before_send(|request| {
//!         request.headers.insert("x-tenant", "acme".parse().unwrap());
//!     })
//!     .on_exception(|args| eprintln!("{}: {}", args.request.uri, args.error))
//!     .build();
//!
//! let previous = Settings::set_current(Arc::new(settings));
//! # Settings::set_current(previous);
//! ```

mod builder;
mod cancel;
mod client;
mod error;
mod handler;
pub mod metadata;
pub mod pool;
mod proxy;
mod rate_limit;
mod response;
pub mod settings;

pub use builder::{Request, TypedRequest};
pub use cancel::CancellationToken;
pub use error::{BoxError, CallError, Error, ErrorContext, ErrorKind, Result};
pub use handler::{Handler, HttpResponse};
pub use pool::{ClientKey, ClientOptions, ClientPool, DefaultClientPool, PoolStats, PooledClient};
pub use proxy::{HttpProxy, ProxySettings};
pub use rate_limit::RateLimitHeaders;
pub use response::{CallResult, RequestInfo, ResponseInfo};
pub use settings::{ExceptionArgs, Settings, SettingsBuilder, SettingsConfig};
