//! # Comet Session Module
//!
//! Turns a query's subscriber channel into a long-lived HTTP response body:
//! one `[` byte, then one `{"query":"<qid>","result":{...}},` chunk per
//! result, never a closing `]`. Grounded line-for-line on
//! `original_source/includes/playdar/CometSession.hpp`'s `m_firstWrite` /
//! `enqueue` pair; the mutex-guarded deque and the callback-into-socket
//! write function are replaced with an `async_stream` generator pulling
//! straight from the registry's per-subscriber `mpsc::Receiver`, so there is
//! no separate "writing" flag to manage — the stream itself is the single
//! in-flight write, enforced by `axum`/hyper polling it one item at a time.

use crate::gateway_error::GatewayError;
use axum::body::{Body, Bytes};
use axum::http::header::CONTENT_TYPE;
use axum::response::Response;
use playdar_resolver::{QueryId, ResolverPipeline};
use std::sync::Arc;

/// Build the `/comet?session=<qid>` response body for a query already
/// registered in the pipeline's registry.
pub async fn comet_response(
    qid: QueryId,
    pipeline: Arc<ResolverPipeline>,
) -> Result<Response, GatewayError> {
    let registry = pipeline.registry().clone();
    let (handle, mut rx) = registry.subscribe(qid, 64).await?;
    let qid_str = qid.to_string();

    let stream = async_stream::stream! {
        yield Ok::<Bytes, std::io::Error>(Bytes::from_static(b"["));
        while let Some(item) = rx.recv().await {
            let chunk = serde_json::json!({
                "query": qid_str,
                "result": item.to_json(),
            });
            let mut buf = chunk.to_string().into_bytes();
            buf.push(b',');
            yield Ok(Bytes::from(buf));
        }
        registry.unsubscribe(qid, handle).await;
    };

    Ok(Response::builder()
        .header(CONTENT_TYPE, "text/javascript")
        .body(Body::from_stream(stream))
        .expect("building a streaming response with a static header cannot fail"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use playdar_resolver::{Mode, QueryRegistry, RegistryConfig};
    use std::time::Duration;

    #[tokio::test]
    async fn emits_opening_bracket_and_the_first_result() {
        let registry = Arc::new(QueryRegistry::new(RegistryConfig::new(Duration::from_secs(60))));
        let pipeline = Arc::new(ResolverPipeline::new(registry, vec![], 8));
        let rq = pipeline.dispatch("a", "", "b", Mode::Normal).await.unwrap();
        let qid = rq.qid();

        let response = comet_response(qid, pipeline.clone()).await.unwrap();
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            "text/javascript"
        );

        let item = playdar_resolver::ResolvedItem::new(
            playdar_resolver::SourceId::new(),
            1.0,
            Default::default(),
            "test",
            0,
        );
        pipeline.report_results(qid, "test", vec![item]).await.unwrap();
        // cancel to close the subscriber channel so the stream terminates;
        // a real client just keeps the connection open indefinitely instead.
        pipeline.cancel(qid).await.unwrap();

        let body = response.into_body();
        let collected = axum::body::to_bytes(body, usize::MAX).await.unwrap();
        assert!(collected.starts_with(b"["));
        assert!(collected.windows(b"\"query\"".len()).any(|w| w == b"\"query\""));
    }
}
