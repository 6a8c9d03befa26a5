//! The send pipeline.
//!
//! [`send`] drives one request from its builder to a [`CallResult`]: settings
//! resolution, before-send hooks, method binding, client acquisition, the
//! transport call (raced against the caller's cancellation token), status
//! classification, decoding, error enrichment and the logging hooks. Nothing in
//! here returns an error to the caller; every failure ends up in the result.

use crate::cancel::CancellationToken;
use crate::error::{CallError, ErrorContext};
use crate::handler::{Handler, HttpResponse};
use crate::metadata::RequestMetadata;
use crate::pool::{ClientPool, PoolStats};
use crate::rate_limit::RateLimitHeaders;
use crate::response::{CallResult, RequestInfo, ResponseInfo};
use crate::settings::{ExceptionArgs, Settings};
use crate::Error;
use http::header::{CONTENT_ENCODING, CONTENT_TYPE};
use http::Method;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn, Instrument};
use url::Url;

/// What the transport and handler produced for one send.
struct Exchange<T> {
    response: Option<ResponseInfo>,
    outcome: Result<T, Error>,
    error_body: Option<String>,
}

impl<T> Exchange<T> {
    fn failed(error: Error, response: Option<ResponseInfo>) -> Self {
        Self {
            response,
            outcome: Err(error),
            error_body: None,
        }
    }
}

/// Sends `metadata` with `method` and decodes the response with `handler`.
pub(crate) async fn send<T>(
    mut metadata: RequestMetadata,
    handler: Handler<T>,
    method: Method,
    cancellation: Option<CancellationToken>,
) -> CallResult<T>
where
    T: Send + 'static,
{
    let settings = metadata.resolved_settings();
    metadata.resolve_defaults(&settings);
    settings.run_before_send(&mut metadata);
    metadata.method = method;

    let span = tracing::info_span!(
        "http_call",
        method = %metadata.method,
        uri = %metadata.uri,
    );

    execute(metadata, settings, handler, cancellation)
        .instrument(span)
        .await
}

async fn execute<T>(
    metadata: RequestMetadata,
    settings: Arc<Settings>,
    handler: Handler<T>,
    cancellation: Option<CancellationToken>,
) -> CallResult<T>
where
    T: Send + 'static,
{
    let start_time = Instant::now();
    let timeout = metadata.effective_timeout();
    let pool = metadata
        .client_pool
        .clone()
        .unwrap_or_else(|| Arc::clone(settings.client_pool()));

    let exchange = match &cancellation {
        Some(token) => tokio::select! {
            biased;
            _ = token.cancelled() => Exchange::failed(Error::Cancelled, None),
            exchange = perform(&metadata, pool.as_ref(), &handler, start_time) => exchange,
        },
        None => perform(&metadata, pool.as_ref(), &handler, start_time).await,
    };

    let latency = start_time.elapsed();
    let cancelled = cancellation.as_ref().is_some_and(|t| t.is_cancelled());
    let request = RequestInfo::from_metadata(&metadata);

    let Exchange {
        response,
        outcome,
        error_body,
    } = exchange;

    let (data, error) = match outcome {
        Ok(data) => match &response {
            Some(r) if r.status.is_success() => (Some(data), None),
            // An ignored status: decoded, but still not a success.
            Some(r) => (Some(data), Some(non_success(r))),
            None => (Some(data), None),
        },
        Err(e) => (None, Some(classify(e, timeout, latency, cancelled))),
    };

    let Some(error) = error else {
        return CallResult {
            success: true,
            data,
            error: None,
            request,
            response,
            latency,
        };
    };

    let mut error = CallError::new(error);
    enrich(
        error.context_mut(),
        &metadata,
        response.as_ref(),
        pool.stats(),
        error_body,
    );

    let ignored = response
        .as_ref()
        .is_some_and(|r| metadata.is_ignored(r.status));
    if ignored {
        debug!(
            status = response.as_ref().map(|r| r.status.as_u16()),
            "Ignoring non-success status"
        );
    } else {
        dispatch(&metadata, &settings, &error);
    }

    CallResult {
        success: false,
        data,
        error: Some(error),
        request,
        response,
        latency,
    }
}

/// Acquires a client, sends, classifies the status and runs the handler.
async fn perform<T>(
    metadata: &RequestMetadata,
    pool: &dyn ClientPool,
    handler: &Handler<T>,
    start_time: Instant,
) -> Exchange<T> {
    let url = match Url::parse(&metadata.uri) {
        Ok(url) => url,
        Err(e) => return Exchange::failed(e.into(), None),
    };

    let pooled = match pool.get(metadata) {
        Ok(pooled) => pooled,
        Err(e) => return Exchange::failed(e, None),
    };

    let mut request = pooled
        .client()
        .request(metadata.method.clone(), url)
        .headers(metadata.headers.clone());

    if let Some(version) = metadata.version {
        request = request.version(version);
    }

    if let Some(body) = &metadata.body {
        if !metadata.headers.contains_key(CONTENT_TYPE) {
            request = request.header(CONTENT_TYPE, body.content_type.clone());
        }
        if let Some(encoding) = &body.content_encoding {
            request = request.header(CONTENT_ENCODING, encoding.clone());
        }
        request = request.body(body.content.clone());
    }

    debug!(
        method = %metadata.method,
        uri = %metadata.uri,
        timeout_ms = metadata.effective_timeout().as_millis() as u64,
        buffered = metadata.buffer_response,
        "Executing HTTP request"
    );

    let raw = match request.send().await {
        Ok(raw) => raw,
        Err(e) => return Exchange::failed(Error::Transport(e), None),
    };

    // Buffered mode counts the full body as part of the send.
    let response = if metadata.buffer_response {
        match HttpResponse::buffered(raw).await {
            Ok(response) => response,
            Err((info, e)) => return Exchange::failed(Error::Transport(e), Some(info)),
        }
    } else {
        HttpResponse::streaming(raw)
    };

    let info = response.info().clone();
    let status = info.status;

    info!(
        status = status.as_u16(),
        latency_ms = start_time.elapsed().as_millis() as u64,
        "Received HTTP response"
    );

    if !status.is_success() && !metadata.is_ignored(status) {
        let error_body = if metadata.error_body_statuses.contains(&status) {
            response.text().await.ok()
        } else {
            None
        };

        return Exchange {
            outcome: Err(non_success(&info)),
            response: Some(info),
            error_body,
        };
    }

    Exchange {
        outcome: handler(response).await,
        response: Some(info),
        error_body: None,
    }
}

fn non_success(response: &ResponseInfo) -> Error {
    Error::NonSuccessStatus {
        status: response.status,
        reason: response.reason().to_string(),
        uri: response.url.to_string(),
    }
}

/// Decides between cancellation, timeout and transport failure.
///
/// Cancellation wins whenever the caller's token is set. Otherwise a transport
/// error is a timeout if the transport says so or the bound timeout has elapsed.
fn classify(error: Error, timeout: Duration, elapsed: Duration, cancelled: bool) -> Error {
    match error {
        Error::Cancelled => Error::Cancelled,
        Error::Transport(_) if cancelled => Error::Cancelled,
        Error::Transport(e) if e.is_timeout() || elapsed >= timeout => Error::TimedOut {
            timeout,
            source: Some(e),
        },
        other => other,
    }
}

/// Adds the caller site, response or request details, and pool counters.
pub(crate) fn enrich(
    context: &mut ErrorContext,
    metadata: &RequestMetadata,
    response: Option<&ResponseInfo>,
    pool: Option<PoolStats>,
    error_body: Option<String>,
) {
    match response {
        Some(response) => {
            context
                .insert("Response.Code", response.status.as_u16())
                .insert("Response.Status", response.status)
                .insert("Response.ReasonPhrase", response.reason())
                .insert("Response.ContentType", response.content_type().unwrap_or(""))
                .insert("Request.URI", &response.url);

            RateLimitHeaders::from_headers(&response.headers).record(context);

            if let Some(body) = error_body {
                context.insert("Response.Body", body);
            }
        }
        None => {
            context
                .insert("Request.URI", &metadata.uri)
                .insert(
                    "Request.Failure",
                    format!("Failed to send request for {}", metadata.uri),
                );
        }
    }

    record_caller(context, metadata);

    if let Some(stats) = pool {
        context
            .insert("ClientPool.Clients", stats.clients)
            .insert("ClientPool.Created", stats.created);
    }
}

pub(crate) fn record_caller(context: &mut ErrorContext, metadata: &RequestMetadata) {
    let caller = metadata.caller();
    context
        .insert("Caller.Name", caller.name.as_deref().unwrap_or(""))
        .insert("Caller.File", caller.file)
        .insert("Caller.Line", caller.line);
}

/// Runs the request's pre-log hooks, then logs and hands the failure to the
/// settings' exception hooks unless a pre-log hook aborted.
pub(crate) fn dispatch(metadata: &RequestMetadata, settings: &Settings, error: &CallError) {
    if !metadata.log_errors {
        return;
    }

    let mut args = ExceptionArgs::new(metadata, error);
    for hook in &metadata.before_log {
        hook(&mut args);
    }

    if args.abort_logging {
        debug!(kind = ?error.kind(), "Error logging aborted by request hook");
        return;
    }

    let context: Vec<String> = error
        .context()
        .prefixed(settings.error_data_prefix())
        .map(|(k, v)| format!("{}={}", k, v))
        .collect();

    warn!(
        kind = ?error.kind(),
        status = error.status().map(|s| s.as_u16()),
        uri = %metadata.uri,
        error = %error,
        context = ?context,
        "HTTP call failed"
    );

    settings.run_exception(&args);
}
