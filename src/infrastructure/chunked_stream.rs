// Chunked JSON streaming utilities
use crate::application::grouping::TypeGroups;
use crate::domain::telemetry::Metric;
use async_compression::tokio::bufread::BrotliEncoder;
use axum::body::Body;
use axum::http::{header, Response, StatusCode};
use axum::response::IntoResponse;
use bytes::{BufMut, Bytes, BytesMut};
use futures::stream::Stream;
use futures::StreamExt;
use serde::Serialize;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::sync::watch;

/// One pushed snapshot of the canonical series.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesFrame {
    pub series: Arc<Vec<Metric>>,
    pub types: Vec<String>,
}

impl SeriesFrame {
    pub fn new(series: Arc<Vec<Metric>>, groups: &TypeGroups) -> Self {
        Self {
            series,
            types: groups.types().map(str::to_string).collect(),
        }
    }
}

/// Create a chunked streaming response. Each chunk is a JSON document,
/// optionally brotli-compressed, prefixed by its length.
pub async fn chunked_json_stream<S, T>(
    stream: S,
    compress: bool,
) -> Result<Response<Body>, StatusCode>
where
    S: Stream<Item = T> + Send + 'static,
    T: Serialize + Send + Sync + 'static,
{
    let byte_stream = stream.then(move |msg| async move { serialize_chunk(&msg, compress).await });

    let body = Body::from_stream(byte_stream);

    // Chunks are compressed individually, so no Content-Encoding on the response.
    let response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/x-json-chunks")
        .header(header::TRANSFER_ENCODING, "chunked");

    response
        .body(body)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

/// Serialize a single message to a length-prefixed chunk
pub async fn serialize_chunk<T: Serialize>(msg: &T, compress: bool) -> Result<Bytes, std::io::Error> {
    let buffer = serde_json::to_vec(msg).map_err(std::io::Error::other)?;

    let payload = if compress {
        let cursor = std::io::Cursor::new(buffer);
        let mut encoder = BrotliEncoder::new(cursor);
        let mut compressed = Vec::new();
        encoder.read_to_end(&mut compressed).await?;
        compressed
    } else {
        buffer
    };

    // 4 bytes, big-endian
    let length = payload.len() as u32;
    let mut chunk = BytesMut::with_capacity(4 + payload.len());
    chunk.put_u32(length);
    chunk.put_slice(&payload);

    Ok(chunk.freeze())
}

/// Stream the current series, then every replacement until the controller stops.
pub async fn stream_from_watch(
    mut series: watch::Receiver<Arc<Vec<Metric>>>,
    groups: watch::Receiver<Arc<TypeGroups>>,
    compress: bool,
) -> impl IntoResponse {
    let stream = async_stream::stream! {
        loop {
            let snapshot = series.borrow_and_update().clone();
            let frame = SeriesFrame::new(snapshot, &groups.borrow().clone());
            yield frame;
            if series.changed().await.is_err() {
                break;
            }
        }
    };

    match chunked_json_stream(stream, compress).await {
        Ok(response) => response,
        Err(status) => status.into_response(),
    }
}
