// Push channel over a newline-delimited JSON HTTP stream
use crate::application::errors::PushError;
use crate::application::metrics_repository::{PushChannel, PushEvent};
use crate::domain::telemetry::RawMetric;
use async_trait::async_trait;
use bytes::{Buf, Bytes, BytesMut};
use futures::{Stream, StreamExt};
use reqwest::header::ACCEPT;
use serde::Deserialize;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

/// Longest event line accepted before the connection is dropped.
const MAX_LINE_BYTES: usize = 1 << 20;

#[derive(Debug, Deserialize)]
#[serde(tag = "event", content = "data")]
enum WireEvent {
    MetricReceived(RawMetric),
    DataUpdated,
}

pub struct HttpPushChannel {
    client: reqwest::Client,
    url: String,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl HttpPushChannel {
    pub fn new(url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
            reader: Mutex::new(None),
        }
    }
}

#[async_trait]
impl PushChannel for HttpPushChannel {
    async fn start(&self, sink: mpsc::Sender<PushEvent>) -> Result<(), PushError> {
        let mut reader = self.reader.lock().await;
        if reader.as_ref().is_some_and(|task| !task.is_finished()) {
            return Ok(());
        }

        let response = self
            .client
            .get(&self.url)
            .header(ACCEPT, "application/x-ndjson")
            .send()
            .await
            .map_err(|e| PushError::Connect(e.to_string()))?;
        if !response.status().is_success() {
            return Err(PushError::Status(response.status().as_u16()));
        }

        tracing::info!("push channel connected to {}", self.url);
        let _ = sink.send(PushEvent::Connectivity(true)).await;
        *reader = Some(tokio::spawn(read_events(response.bytes_stream(), sink)));
        Ok(())
    }

    async fn stop(&self) {
        if let Some(task) = self.reader.lock().await.take() {
            task.abort();
            tracing::info!("push channel stopped");
        }
    }
}

async fn read_events<S, E>(stream: S, sink: mpsc::Sender<PushEvent>)
where
    S: Stream<Item = Result<Bytes, E>> + Send,
    E: std::fmt::Display + Send,
{
    let mut stream = std::pin::pin!(stream);
    let mut decoder = LineDecoder::default();

    while let Some(chunk) = stream.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                tracing::warn!("push stream error: {}", e);
                break;
            }
        };
        let lines = match decoder.push(&chunk) {
            Ok(lines) => lines,
            Err(e) => {
                tracing::warn!("dropping push connection: {}", e);
                break;
            }
        };
        for line in lines {
            if let Some(event) = parse_event(&line) {
                if sink.send(event).await.is_err() {
                    return;
                }
            }
        }
    }

    tracing::warn!("push stream closed");
    let _ = sink.send(PushEvent::Connectivity(false)).await;
}

#[derive(Debug, thiserror::Error)]
#[error("push event line exceeds {limit} bytes")]
struct LineTooLong {
    limit: usize,
}

/// Splits a byte stream into newline-terminated lines across chunk borders.
#[derive(Debug)]
struct LineDecoder {
    pending: BytesMut,
    limit: usize,
}

impl Default for LineDecoder {
    fn default() -> Self {
        Self::with_limit(MAX_LINE_BYTES)
    }
}

impl LineDecoder {
    fn with_limit(limit: usize) -> Self {
        Self {
            pending: BytesMut::new(),
            limit,
        }
    }

    fn push(&mut self, chunk: &[u8]) -> Result<Vec<Bytes>, LineTooLong> {
        self.pending.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            if pos > self.limit {
                return Err(LineTooLong { limit: self.limit });
            }
            let line = self.pending.split_to(pos).freeze();
            self.pending.advance(1);
            lines.push(line);
        }
        if self.pending.len() > self.limit {
            return Err(LineTooLong { limit: self.limit });
        }
        Ok(lines)
    }
}

fn parse_event(line: &[u8]) -> Option<PushEvent> {
    let text = std::str::from_utf8(line).ok()?.trim();
    if text.is_empty() {
        return None;
    }
    match serde_json::from_str::<WireEvent>(text) {
        Ok(WireEvent::MetricReceived(raw)) => Some(PushEvent::Metric(raw)),
        Ok(WireEvent::DataUpdated) => Some(PushEvent::Invalidate),
        Err(e) => {
            tracing::warn!("dropping unreadable push event: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_decoder_spans_chunks() {
        let mut decoder = LineDecoder::default();
        assert!(decoder.push(b"{\"event\":").unwrap().is_empty());
        let lines = decoder.push(b"\"DataUpdated\"}\n\n{\"ev").unwrap();
        assert_eq!(lines, vec![Bytes::from_static(b"{\"event\":\"DataUpdated\"}"), Bytes::new()]);
        let lines = decoder.push(b"ent\":\"DataUpdated\"}\n").unwrap();
        assert_eq!(lines.len(), 1);
    }

    #[test]
    fn test_line_decoder_caps_line_length() {
        let mut decoder = LineDecoder::with_limit(8);
        assert_eq!(decoder.push(b"12345678\n").unwrap().len(), 1);
        assert!(decoder.push(b"1234").unwrap().is_empty());
        assert!(decoder.push(b"56789").is_err());

        let mut decoder = LineDecoder::with_limit(8);
        assert!(decoder.push(b"123456789\n").is_err());
    }

    #[tokio::test]
    async fn test_read_events_drops_connection_on_unbounded_line() {
        let (tx, mut rx) = mpsc::channel(8);
        let chunks: Vec<Result<Bytes, std::io::Error>> = vec![
            Ok(Bytes::from(vec![b'x'; MAX_LINE_BYTES + 1])),
            Ok(Bytes::from_static(b"\n{\"event\":\"DataUpdated\"}\n")),
        ];
        read_events(futures::stream::iter(chunks), tx).await;

        assert!(matches!(rx.recv().await, Some(PushEvent::Connectivity(false))));
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn test_parse_event() {
        let metric = parse_event(
            br#"{"event":"MetricReceived","data":{"id":3,"type":"motion","name":"Hall","createdAt":"2024-01-01T00:00:00Z"}}"#,
        );
        assert!(matches!(metric, Some(PushEvent::Metric(RawMetric { id: Some(3), .. }))));

        assert!(matches!(
            parse_event(br#"{"event":"DataUpdated"}"#),
            Some(PushEvent::Invalidate)
        ));
        assert!(parse_event(b"   ").is_none());
        assert!(parse_event(br#"{"event":"Unknown"}"#).is_none());
    }

    #[tokio::test]
    async fn test_read_events_forwards_and_reports_close() {
        let (tx, mut rx) = mpsc::channel(8);
        let chunks: Vec<Result<Bytes, std::io::Error>> = vec![
            Ok(Bytes::from_static(b"{\"event\":\"DataUpdated\"}\n{\"event\":\"MetricRe")),
            Ok(Bytes::from_static(b"ceived\",\"data\":{\"id\":9}}\n")),
        ];
        read_events(futures::stream::iter(chunks), tx).await;

        assert!(matches!(rx.recv().await, Some(PushEvent::Invalidate)));
        assert!(matches!(rx.recv().await, Some(PushEvent::Metric(RawMetric { id: Some(9), .. }))));
        assert!(matches!(rx.recv().await, Some(PushEvent::Connectivity(false))));
    }
}
