//! SSE transport over reqwest.
//!
//! Each connection is a spawned task that streams the response body through
//! an [`SseDecoder`] and reports back on the tab's signal queue. Closing a
//! connection aborts its task.

use futures::StreamExt;
use reqwest::header::{ACCEPT, CACHE_CONTROL};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use tabsync_core::error::TransportError;
use tabsync_core::stream::model::{ConnectionId, TransportEvent};
use tabsync_core::stream::transport::{Transport, TransportFactory};

use crate::sse::SseDecoder;

/// A transport event tagged with the connection that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportSignal {
    pub connection: ConnectionId,
    pub event: TransportEvent,
}

pub type SignalSender = mpsc::UnboundedSender<TransportSignal>;
pub type SignalReceiver = mpsc::UnboundedReceiver<TransportSignal>;

pub struct SseTransportFactory {
    client: reqwest::Client,
    signals: SignalSender,
}

impl SseTransportFactory {
    pub fn new(client: reqwest::Client, signals: SignalSender) -> Self {
        Self { client, signals }
    }
}

impl TransportFactory for SseTransportFactory {
    /// Connections need a tokio runtime to run on.
    fn is_supported(&self) -> bool {
        Handle::try_current().is_ok()
    }

    fn connect(
        &mut self,
        id: ConnectionId,
        url: &str,
    ) -> Result<Box<dyn Transport>, TransportError> {
        let handle = Handle::try_current().map_err(|_| TransportError::Unsupported)?;
        let url = reqwest::Url::parse(url).map_err(|e| TransportError::Connect(e.to_string()))?;

        let task = handle.spawn(stream_events(
            self.client.clone(),
            url,
            id,
            self.signals.clone(),
        ));
        Ok(Box::new(SseTransport { id, task }))
    }
}

/// One running SSE connection.
pub struct SseTransport {
    id: ConnectionId,
    task: JoinHandle<()>,
}

impl Transport for SseTransport {
    fn close(&mut self) {
        debug!(connection = %self.id, "Aborting SSE connection");
        self.task.abort();
    }
}

impl Drop for SseTransport {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn stream_events(
    client: reqwest::Client,
    url: reqwest::Url,
    id: ConnectionId,
    signals: SignalSender,
) {
    let send = |event: TransportEvent| {
        signals
            .send(TransportSignal {
                connection: id,
                event,
            })
            .is_ok()
    };

    let response = match client
        .get(url)
        .header(ACCEPT, "text/event-stream")
        .header(CACHE_CONTROL, "no-cache")
        .send()
        .await
    {
        Ok(response) => response,
        Err(e) => {
            send(TransportEvent::error(e.to_string()));
            return;
        }
    };
    if !response.status().is_success() {
        send(TransportEvent::error(format!("HTTP {}", response.status())));
        return;
    }
    if !send(TransportEvent::Opened) {
        return;
    }

    let mut decoder = SseDecoder::new();
    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
        let bytes = match chunk {
            Ok(bytes) => bytes,
            Err(e) => {
                send(TransportEvent::error(e.to_string()));
                return;
            }
        };
        for frame in decoder.feed(&bytes) {
            if !send(TransportEvent::message(frame.event, frame.data)) {
                return;
            }
        }
    }
    send(TransportEvent::error("event stream ended"));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_outside_runtime() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut factory = SseTransportFactory::new(reqwest::Client::new(), tx);
        assert!(!factory.is_supported());
        assert!(matches!(
            factory.connect(ConnectionId(1), "http://127.0.0.1:1/events"),
            Err(TransportError::Unsupported)
        ));
    }

    #[tokio::test]
    async fn test_bad_url_rejected() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut factory = SseTransportFactory::new(reqwest::Client::new(), tx);
        assert!(factory.is_supported());
        assert!(matches!(
            factory.connect(ConnectionId(1), "not a url"),
            Err(TransportError::Connect(_))
        ));
    }
}
