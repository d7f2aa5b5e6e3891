//! # HTTP Streaming Bridge Module
//!
//! Turns a [`StreamingStrategy`] into an `axum` response body: send headers
//! once, then pull fixed-size chunks until EOF, cancelling the strategy on
//! any read error. Grounded in the teacher's own
//! `Body::from_stream(async_stream::stream! { ... })` pattern used for
//! chat-completion SSE (`ultrafast-gateway/src/handlers/mod.rs`); here the
//! chunks come from `read_bytes` instead of a provider's token stream.

use axum::body::{Body, Bytes};
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use playdar_resolver::StreamingStrategy;

/// Default scratch buffer size per `read_bytes` call, per spec.md §4.4.
const SCRATCH_BUFFER_SIZE: usize = 8 * 1024;

/// Build a streaming HTTP response from a resolved source.
///
/// Sends `Content-Type`/`Content-Length` up front if the strategy knows
/// them, then drives `read_bytes` to completion. A zero-length read ends
/// the body normally; any `StreamError` truncates it and calls
/// `strategy.cancel()` before the stream ends.
pub fn stream_to_response(mut strategy: Box<dyn StreamingStrategy>) -> Response {
    let mime = strategy.mime_type().map(|s| s.to_string());
    let length = strategy.content_length();

    let body_stream = async_stream::stream! {
        let mut buf = vec![0u8; SCRATCH_BUFFER_SIZE];
        loop {
            match strategy.read_bytes(&mut buf).await {
                Ok(0) => break,
                Ok(n) => yield Ok::<Bytes, std::io::Error>(Bytes::copy_from_slice(&buf[..n])),
                Err(e) => {
                    tracing::warn!(error = %e, source = %strategy.debug(), "stream read failed, truncating response");
                    strategy.cancel();
                    break;
                }
            }
        }
    };

    let mut response = Response::builder();
    if let Some(mime) = mime {
        response = response.header(CONTENT_TYPE, mime);
    }
    if let Some(length) = length {
        response = response.header(CONTENT_LENGTH, length.to_string());
    }

    response
        .body(Body::from_stream(body_stream))
        .unwrap_or_else(|e| {
            tracing::error!(error = %e, "failed to build streaming response");
            axum::http::StatusCode::INTERNAL_SERVER_ERROR.into_response()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct FixedBytes {
        data: Vec<u8>,
        pos: usize,
    }

    #[async_trait]
    impl StreamingStrategy for FixedBytes {
        async fn read_bytes(&mut self, buf: &mut [u8]) -> Result<usize, playdar_resolver::StreamError> {
            let remaining = &self.data[self.pos..];
            let n = remaining.len().min(buf.len());
            buf[..n].copy_from_slice(&remaining[..n]);
            self.pos += n;
            Ok(n)
        }

        fn mime_type(&self) -> Option<&str> {
            Some("audio/mpeg")
        }

        fn content_length(&self) -> Option<u64> {
            Some(self.data.len() as u64)
        }

        fn debug(&self) -> String {
            "FixedBytes".to_string()
        }

        fn instance(&self) -> Box<dyn StreamingStrategy> {
            Box::new(FixedBytes { data: self.data.clone(), pos: 0 })
        }

        fn cancel(&mut self) {}
    }

    #[tokio::test]
    async fn headers_and_body_round_trip() {
        let strategy = Box::new(FixedBytes { data: b"hello world".to_vec(), pos: 0 });
        let response = stream_to_response(strategy);
        assert_eq!(response.headers().get(CONTENT_TYPE).unwrap(), "audio/mpeg");
        assert_eq!(response.headers().get(CONTENT_LENGTH).unwrap(), "11");

        let collected = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&collected[..], b"hello world");
    }
}
