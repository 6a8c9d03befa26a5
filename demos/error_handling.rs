//! Example demonstrating how failures surface in a call result.
//!
//! This example shows how to:
//! - Branch on the error kind of a failed call
//! - Ignore expected statuses without logging them
//! - Observe failures through exception hooks
//! - Tell cancellation apart from a timeout
//!
//! Run with: `cargo run --example error_handling`

use http::StatusCode;
use httpcall::{CancellationToken, ErrorKind, Request, Settings};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter("httpcall=info,error_handling=info")
        .init();

    let settings = Arc::new(
        Settings::builder()
            .on_exception(|args| {
                println!("[hook] {:?}: {}", args.error.kind(), args.error);
                for (key, value) in args.error.context().prefixed("HttpCall-") {
                    println!("[hook]   {} = {}", key, value);
                }
            })
            .build(),
    );

    println!("=== Non-success status ===\n");

    let result = Request::with_settings("https://httpbin.org/status/404", Arc::clone(&settings))
        .expect_string()
        .get()
        .await;

    if let Some(error) = &result.error {
        match error.kind() {
            ErrorKind::NonSuccessStatus => println!("Server said {:?}", result.status_code()),
            other => println!("Unexpected failure: {:?}", other),
        }
    }

    println!("\n=== Ignored status ===\n");

    // No hook output: the 404 is expected.
    let result = Request::with_settings("https://httpbin.org/status/404", Arc::clone(&settings))
        .ignore_status(StatusCode::NOT_FOUND)
        .expect_string()
        .get()
        .await;
    println!(
        "success={} status={:?} body={:?}",
        result.success,
        result.status_code(),
        result.data
    );

    println!("\n=== Timeout ===\n");

    let result = Request::with_settings("https://httpbin.org/delay/5", Arc::clone(&settings))
        .timeout(Duration::from_secs(1))
        .expect_string()
        .get()
        .await;
    if let Some(error) = result.error {
        println!("timed out: {} ({})", error.is_timeout(), error);
    }

    println!("\n=== Cancellation ===\n");

    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        canceller.cancel();
    });

    let result = Request::with_settings("https://httpbin.org/delay/5", settings)
        .timeout(Duration::from_secs(30))
        .expect_string()
        .with_cancellation(token)
        .get()
        .await;
    if let Some(error) = result.error {
        println!("cancelled: {} ({})", error.is_cancelled(), error);
    }
}
