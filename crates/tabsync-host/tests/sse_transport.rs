use std::convert::Infallible;
use std::time::Duration;

use axum::response::sse::{Event, Sse};
use axum::routing::get;
use axum::Router;
use futures::stream::{self, Stream, StreamExt};
use tokio::sync::mpsc;

use tabsync_core::stream::model::{ConnectionId, ConnectionState, TransportEvent};
use tabsync_core::stream::transport::TransportFactory;
use tabsync_core::{Role, SessionNotification, TabSyncConfig};
use tabsync_host::{Browser, NotificationSink, SseTransportFactory, TabNotification};

async fn events() -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let frames: Vec<Result<Event, Infallible>> = vec![
        Ok(Event::default().event("connected").data("{}")),
        Ok(Event::default().event("heartbeat").data("{}")),
        Ok(Event::default()
            .event("updated")
            .data(r#"{"issue":{"id":"bd-1","title":"Fix login","status":"in_progress"}}"#)),
    ];
    Sse::new(stream::iter(frames).chain(stream::pending()))
}

async fn serve() -> String {
    let app = Router::new().route("/events", get(events));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn config(url: String) -> TabSyncConfig {
    let mut config = TabSyncConfig::default();
    config.stream.url = url;
    config
}

async fn collect_until(
    rx: &mut mpsc::UnboundedReceiver<TabNotification>,
    done: impl Fn(&SessionNotification) -> bool,
) -> Vec<SessionNotification> {
    let mut seen = Vec::new();
    let search = async {
        while let Some(note) = rx.recv().await {
            let finished = done(&note.notification);
            seen.push(note.notification);
            if finished {
                return;
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(10), search)
        .await
        .expect("timed out");
    seen
}

#[tokio::test]
async fn test_factory_reports_open_and_frames() {
    let base = serve().await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut factory = SseTransportFactory::new(reqwest::Client::new(), tx);

    let mut transport = factory
        .connect(ConnectionId(4), &format!("{base}/events"))
        .unwrap();

    let first = rx.recv().await.unwrap();
    assert_eq!(first.connection, ConnectionId(4));
    assert_eq!(first.event, TransportEvent::Opened);
    let second = rx.recv().await.unwrap();
    assert_eq!(second.event, TransportEvent::message("connected", "{}"));

    transport.close();
}

#[tokio::test]
async fn test_leader_tab_streams_batches() {
    let base = serve().await;
    let browser = Browser::new(config(format!("{base}/events"))).unwrap();
    let (tx, mut rx) = mpsc::unbounded_channel();

    let tab = browser
        .open_tab("tab-a", NotificationSink::new("tab-a", tx))
        .unwrap();
    let seen = collect_until(&mut rx, |n| matches!(n, SessionNotification::Batch(_))).await;

    assert_eq!(seen[0], SessionNotification::RoleChanged(Role::Leader));
    assert!(seen.contains(&SessionNotification::StateChanged(ConnectionState::Open)));
    let Some(SessionNotification::Batch(batch)) = seen.last() else {
        unreachable!()
    };
    assert_eq!(batch.issue_ids, vec!["bd-1"]);
    let issue = &batch.events[0].issue;
    assert_eq!(issue.status.as_deref(), Some("in_progress"));
    assert_eq!(issue.title.as_deref(), Some("Fix login"));

    tab.shutdown().await;
    assert!(browser.storage().peek("tabsync:leader").is_none());
}

#[tokio::test]
async fn test_http_error_schedules_retry() {
    let base = serve().await;
    let browser = Browser::new(config(format!("{base}/missing"))).unwrap();
    let (tx, mut rx) = mpsc::unbounded_channel();

    let tab = browser
        .open_tab("tab-a", NotificationSink::new("tab-a", tx))
        .unwrap();
    let seen = collect_until(&mut rx, |n| {
        *n == SessionNotification::StateChanged(ConnectionState::Waiting)
    })
    .await;

    assert!(seen.contains(&SessionNotification::StateChanged(ConnectionState::Error)));
    assert!(!seen.contains(&SessionNotification::StateChanged(ConnectionState::Open)));

    tab.shutdown().await;
}
