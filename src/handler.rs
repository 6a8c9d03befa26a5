//! Response handlers.
//!
//! A handler turns the response of a successful (or ignored-status) call into a
//! payload. It receives an [`HttpResponse`] whose body is either already in
//! memory or still streaming from the connection, depending on the request's
//! buffering mode; handlers read it through the same methods either way.

use crate::response::ResponseInfo;
use crate::{Error, Result};
use bytes::{Bytes, BytesMut};
use futures::future::BoxFuture;
use futures::FutureExt;
use http::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::debug_span;

/// A response decoder bound to a [`TypedRequest`](crate::TypedRequest).
pub type Handler<T> = Arc<dyn Fn(HttpResponse) -> BoxFuture<'static, Result<T>> + Send + Sync>;

enum Body {
    Buffered(Bytes),
    Streaming(reqwest::Response),
}

/// A received response, handed to a [`Handler`].
pub struct HttpResponse {
    info: ResponseInfo,
    body: Body,
}

impl HttpResponse {
    /// Reads the whole body before returning.
    pub(crate) async fn buffered(
        response: reqwest::Response,
    ) -> std::result::Result<Self, (ResponseInfo, reqwest::Error)> {
        let info = ResponseInfo::from_reqwest(&response);
        match response.bytes().await {
            Ok(bytes) => Ok(Self {
                info,
                body: Body::Buffered(bytes),
            }),
            Err(e) => Err((info, e)),
        }
    }

    /// Leaves the body on the connection.
    pub(crate) fn streaming(response: reqwest::Response) -> Self {
        Self {
            info: ResponseInfo::from_reqwest(&response),
            body: Body::Streaming(response),
        }
    }

    /// The status line and headers.
    pub fn info(&self) -> &ResponseInfo {
        &self.info
    }

    /// The HTTP status code.
    pub fn status(&self) -> StatusCode {
        self.info.status
    }

    /// The response headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.info.headers
    }

    /// Returns `true` if the status is in the 2xx range.
    pub fn is_success(&self) -> bool {
        self.info.status.is_success()
    }

    /// Returns `true` if the body was read in full before the handler ran.
    pub fn is_buffered(&self) -> bool {
        matches!(self.body, Body::Buffered(_))
    }

    /// Returns the next chunk of the body, or `None` once it is exhausted.
    ///
    /// # Errors
    ///
    /// Returns an error if reading from the connection fails.
    pub async fn chunk(&mut self) -> Result<Option<Bytes>> {
        match &mut self.body {
            Body::Buffered(bytes) if bytes.is_empty() => Ok(None),
            Body::Buffered(bytes) => Ok(Some(std::mem::take(bytes))),
            Body::Streaming(response) => Ok(response.chunk().await?),
        }
    }

    /// Reads the rest of the body.
    ///
    /// # Errors
    ///
    /// Returns an error if reading from the connection fails.
    pub async fn bytes(self) -> Result<Bytes> {
        match self.body {
            Body::Buffered(bytes) => Ok(bytes),
            Body::Streaming(mut response) => {
                let mut body = BytesMut::new();
                while let Some(chunk) = response.chunk().await? {
                    body.extend_from_slice(&chunk);
                }
                Ok(body.freeze())
            }
        }
    }

    /// Reads the rest of the body as text, replacing invalid UTF-8.
    ///
    /// # Errors
    ///
    /// Returns an error if reading from the connection fails.
    pub async fn text(self) -> Result<String> {
        let bytes = self.bytes().await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// Yields whether the status was in the 2xx range. The body is not read.
pub fn http_success() -> Handler<bool> {
    Arc::new(|response: HttpResponse| async move { Ok::<_, Error>(response.is_success()) }.boxed())
}

/// Yields the body as text.
pub fn string() -> Handler<String> {
    Arc::new(|response: HttpResponse| response.text().boxed())
}

/// Yields the raw body.
pub fn bytes() -> Handler<Bytes> {
    Arc::new(|response: HttpResponse| response.bytes().boxed())
}

/// Deserializes a JSON body. An empty body yields `T::default()`.
pub fn json<T>() -> Handler<T>
where
    T: DeserializeOwned + Default + Send + 'static,
{
    Arc::new(|response: HttpResponse| {
        async move {
            let status = response.status();
            let body = response.bytes().await?;
            debug_span!("deserialize", format = "json", len = body.len()).in_scope(|| {
                if body.is_empty() {
                    return Ok(T::default());
                }
                serde_json::from_slice(&body).map_err(|e| Error::decode(status, e))
            })
        }
        .boxed()
    })
}

/// Decodes a protobuf body.
pub fn protobuf<M>() -> Handler<M>
where
    M: prost::Message + Default + Send + 'static,
{
    Arc::new(|response: HttpResponse| {
        async move {
            let status = response.status();
            let body = response.bytes().await?;
            debug_span!("deserialize", format = "protobuf", len = body.len())
                .in_scope(|| M::decode(body).map_err(|e| Error::decode(status, e)))
        }
        .boxed()
    })
}
