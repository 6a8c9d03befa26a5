//! Basic example demonstrating simple GET and POST requests.
//!
//! This example shows how to:
//! - Configure default settings for every request
//! - Make GET requests with a JSON handler
//! - Make POST requests with a JSON body
//! - Read the result, its status and latency
//!
//! Run with: `cargo run --example basic_call`

use httpcall::{Error, Request, Settings};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Default, Deserialize)]
#[allow(dead_code)]
struct Post {
    #[serde(rename = "userId")]
    user_id: u32,
    id: u32,
    title: String,
    body: String,
}

#[derive(Debug, Serialize)]
struct NewPost {
    title: String,
    body: String,
    #[serde(rename = "userId")]
    user_id: u32,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Initialize tracing for logging
    tracing_subscriber::fmt()
        .with_env_filter("httpcall=debug,basic_call=info")
        .init();

    Settings::set_current(Arc::new(
        Settings::builder()
            .user_agent("httpcall-demo/0.1")
            .default_timeout(Duration::from_secs(10))
            .build(),
    ));

    println!("=== GET Request Example ===\n");

    let result = Request::new("https://jsonplaceholder.typicode.com/posts/1")
        .caller_name("main")
        .expect_json::<Post>()
        .get()
        .await;

    match &result.data {
        Some(post) if result.success => {
            println!("Fetched post #{}: {}", post.id, post.title);
            println!("Status: {:?}", result.status_code());
            println!("Latency: {:?}", result.latency);
        }
        _ => println!("GET failed: {:?}", result.error),
    }

    println!("\n=== POST Request Example ===\n");

    let result = Request::new("https://jsonplaceholder.typicode.com/posts")
        .send_json(&NewPost {
            title: "Hello from httpcall".to_string(),
            body: "Posted through a pooled client.".to_string(),
            user_id: 1,
        })?
        .expect_json::<Post>()
        .post()
        .await;

    if let Some(post) = result.data.filter(|_| result.success) {
        println!("Created post with ID: {}", post.id);
    }

    println!("\n=== Plain Text Example ===\n");

    let result = Request::new("https://jsonplaceholder.typicode.com/posts/1/comments")
        .header("Accept", "application/json")
        .expect_string()
        .get()
        .await;

    println!(
        "Received {} bytes of text",
        result.data.map(|body| body.len()).unwrap_or(0)
    );

    Ok(())
}
